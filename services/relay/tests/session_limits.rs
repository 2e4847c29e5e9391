
use std::time::Duration;

use harness::{single_route, EchoBackend, ProxyHandle};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

#[tokio::test]
async fn limit_one_serializes_sessions() {
    let backend = EchoBackend::spawn().await.unwrap();
    let proxy = ProxyHandle::spawn(single_route(backend.addr, 1, 8)).await;
    let addr = proxy.route_addr(0);

    // First session occupies the only slot.
    let mut first = TcpStream::connect(addr).await.unwrap();
    first.write_all(b"one").await.unwrap();
    let mut buf = [0u8; 3];
    timeout(Duration::from_secs(1), first.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"one");

    // A second connection handshakes in the OS backlog but is not admitted:
    // nothing is relayed while the first session is open.
    let mut second = TcpStream::connect(addr).await.unwrap();
    second.write_all(b"two").await.unwrap();
    let mut buf2 = [0u8; 3];
    assert!(
        timeout(Duration::from_millis(150), second.read_exact(&mut buf2))
            .await
            .is_err(),
        "second session was admitted past the limit"
    );
    assert_eq!(backend.connection_count(), 1);

    // Freeing the slot lets the queued session through.
    drop(first);
    timeout(Duration::from_secs(1), second.read_exact(&mut buf2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf2, b"two");
    assert_eq!(backend.connection_count(), 2);

    proxy.proxy.shutdown(Duration::from_secs(1)).await.unwrap();
    proxy.join().await.unwrap();
}

#[tokio::test]
async fn sessions_within_limit_run_concurrently() {
    let backend = EchoBackend::spawn().await.unwrap();
    let proxy = ProxyHandle::spawn(single_route(backend.addr, 2, 8)).await;
    let addr = proxy.route_addr(0);

    // Both sessions are held open at once; each completes its roundtrip.
    let mut first = TcpStream::connect(addr).await.unwrap();
    let mut second = TcpStream::connect(addr).await.unwrap();

    first.write_all(b"aaa").await.unwrap();
    second.write_all(b"bbb").await.unwrap();

    let mut buf = [0u8; 3];
    timeout(Duration::from_secs(1), first.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"aaa");
    timeout(Duration::from_secs(1), second.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"bbb");
    assert_eq!(backend.connection_count(), 2);
    assert_eq!(proxy.proxy.routes()[0].active_sessions(), 2);

    // A third attempt stalls until one of the first two finishes.
    let mut third = TcpStream::connect(addr).await.unwrap();
    third.write_all(b"ccc").await.unwrap();
    assert!(
        timeout(Duration::from_millis(150), third.read_exact(&mut buf))
            .await
            .is_err(),
        "third session was admitted past the limit"
    );

    drop(first);
    timeout(Duration::from_secs(1), third.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"ccc");

    proxy.proxy.shutdown(Duration::from_secs(1)).await.unwrap();
    proxy.join().await.unwrap();
}
