//! Integration tests for the TCP transport.
//!
//! These tests spin up a real listener on a random port and connect a
//! plain `TcpStream` client to it.

use runegate_transport::{Connection, Transport, TcpTransport};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn bind_random() -> TcpTransport {
    TcpTransport::bind("127.0.0.1:0")
        .await
        .expect("should bind")
}

#[tokio::test]
async fn test_tcp_accept_and_exchange_bytes() {
    let mut transport = bind_random().await;
    let addr = transport.local_addr().expect("should have local addr");

    let server_handle = tokio::spawn(async move {
        transport.accept().await.expect("should accept")
    });

    let mut client = TcpStream::connect(addr).await.expect("should connect");
    let conn = server_handle.await.expect("task should complete");

    assert!(conn.id().into_inner() > 0);
    assert_eq!(
        conn.peer_addr(),
        Some(client.local_addr().expect("client addr"))
    );

    let mut server_stream = conn.into_stream();

    client.write_all(&[14, 7]).await.expect("client write");
    let mut buf = [0u8; 2];
    server_stream
        .read_exact(&mut buf)
        .await
        .expect("server read");
    assert_eq!(buf, [14, 7]);

    server_stream.write_all(&[0; 17]).await.expect("server write");
    let mut reply = [0xffu8; 17];
    client.read_exact(&mut reply).await.expect("client read");
    assert_eq!(reply, [0; 17]);
}

#[tokio::test]
async fn test_tcp_accept_assigns_unique_ids() {
    let mut transport = bind_random().await;
    let addr = transport.local_addr().expect("should have local addr");

    let server_handle = tokio::spawn(async move {
        let first = transport.accept().await.expect("first accept");
        let second = transport.accept().await.expect("second accept");
        (first.id(), second.id())
    });

    let _a = TcpStream::connect(addr).await.expect("connect a");
    let _b = TcpStream::connect(addr).await.expect("connect b");

    let (first, second) = server_handle.await.expect("task should complete");
    assert_ne!(first, second);
}

#[tokio::test]
async fn test_tcp_client_close_reads_eof_on_server() {
    let mut transport = bind_random().await;
    let addr = transport.local_addr().expect("should have local addr");

    let server_handle = tokio::spawn(async move {
        transport.accept().await.expect("should accept")
    });

    let client = TcpStream::connect(addr).await.expect("should connect");
    let conn = server_handle.await.expect("task should complete");
    drop(client);

    let mut stream = conn.into_stream();
    let mut buf = [0u8; 8];
    let n = stream.read(&mut buf).await.expect("read should not error");
    assert_eq!(n, 0, "closed peer should read as EOF");
}

#[tokio::test]
async fn test_tcp_bind_invalid_address_fails() {
    let result = TcpTransport::bind("not-an-address").await;
    assert!(result.is_err());
}
