
use std::time::Duration;

use harness::{echo_roundtrip, single_route, EchoBackend, ProxyHandle};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

#[tokio::test]
async fn sequential_writes_relay_in_order() {
    let backend = EchoBackend::spawn().await.unwrap();
    let proxy = ProxyHandle::spawn(single_route(backend.addr, 4, 8)).await;
    let addr = proxy.route_addr(0);

    let mut client = TcpStream::connect(addr).await.unwrap();
    let mut expected = Vec::new();
    for chunk in ["a", "ab", "abc", "abcd", "abcde"] {
        client.write_all(chunk.as_bytes()).await.unwrap();
        expected.extend_from_slice(chunk.as_bytes());
    }

    let mut echoed = vec![0u8; expected.len()];
    timeout(Duration::from_secs(1), client.read_exact(&mut echoed))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(echoed, b"aababcabcdabcde");
    assert_eq!(echoed, expected);

    drop(client);
    proxy.proxy.shutdown(Duration::from_secs(1)).await.unwrap();
    proxy.join().await.unwrap();
}

#[tokio::test]
async fn large_payload_survives_small_buffer() {
    let backend = EchoBackend::spawn().await.unwrap();
    let proxy = ProxyHandle::spawn(single_route(backend.addr, 2, 32)).await;
    let addr = proxy.route_addr(0);

    // Well over ten transfer buffers' worth.
    let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    let echoed = echo_roundtrip(addr, &payload).await.unwrap();
    assert_eq!(echoed, payload);
    assert_eq!(backend.bytes_received(), 4096);

    proxy.proxy.shutdown(Duration::from_secs(1)).await.unwrap();
    proxy.join().await.unwrap();
}

#[tokio::test]
async fn routes_forward_independently() {
    let first = EchoBackend::spawn().await.unwrap();
    let second = EchoBackend::spawn().await.unwrap();

    let mut config = single_route(first.addr, 2, 16);
    config
        .routes
        .extend(single_route(second.addr, 2, 16).routes);
    let proxy = ProxyHandle::spawn(config).await;

    let from_first = echo_roundtrip(proxy.route_addr(0), b"alpha").await.unwrap();
    let from_second = echo_roundtrip(proxy.route_addr(1), b"beta").await.unwrap();
    assert_eq!(from_first, b"alpha");
    assert_eq!(from_second, b"beta");
    assert_eq!(first.connection_count(), 1);
    assert_eq!(second.connection_count(), 1);

    proxy.proxy.shutdown(Duration::from_secs(1)).await.unwrap();
    proxy.join().await.unwrap();
}

#[tokio::test]
async fn round_robin_alternates_destinations() {
    let first = EchoBackend::spawn().await.unwrap();
    let second = EchoBackend::spawn().await.unwrap();
    let proxy =
        ProxyHandle::spawn(harness::route_to(&[first.addr, second.addr], 4, 16)).await;
    let addr = proxy.route_addr(0);

    for _ in 0..3 {
        let echoed = echo_roundtrip(addr, b"ping").await.unwrap();
        assert_eq!(echoed, b"ping");
    }

    assert_eq!(first.connection_count(), 2);
    assert_eq!(second.connection_count(), 1);

    proxy.proxy.shutdown(Duration::from_secs(1)).await.unwrap();
    proxy.join().await.unwrap();
}

#[tokio::test]
async fn unreachable_destination_closes_client() {
    // Grab a free port, then close it so dialing it is refused.
    let tmp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = tmp.local_addr().unwrap();
    drop(tmp);

    let proxy = ProxyHandle::spawn(single_route(dead, 2, 8)).await;
    let addr = proxy.route_addr(0);

    let mut client = TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 1];
    match timeout(Duration::from_secs(1), client.read(&mut buf)).await {
        Ok(Ok(0)) | Ok(Err(_)) => {}
        Ok(Ok(n)) => panic!("unexpected {n} bytes from an undialed session"),
        Err(_) => panic!("client was not closed after the dial failure"),
    }

    // The failure stayed local to that session; the route keeps serving.
    let route = &proxy.proxy.routes()[0];
    timeout(Duration::from_secs(1), async {
        while route.stats().dial_errors.load(std::sync::atomic::Ordering::Relaxed) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("dial failure was not recorded");
    assert_eq!(route.active_sessions(), 0);

    proxy.proxy.shutdown(Duration::from_secs(1)).await.unwrap();
    proxy.join().await.unwrap();
}
