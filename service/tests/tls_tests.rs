//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! TLS integration tests
//!
//! The fixtures under tests/certs are two self-signed localhost
//! certificate/key pairs, the second standing in for a rotated
//! certificate.

use async_trait::async_trait;
use bytes::Bytes;
use socknet_service::{
    ClientConfig, Connection, ConnectionId, ServerConfig, ServerHandler, TcpClient, TcpServer,
    TlsContext, TlsSettings,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

fn cert_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/certs")
}

fn server_settings(cert: &str, key: &str) -> TlsSettings {
    TlsSettings::default()
        .with_cert_path(cert_dir().join(cert))
        .with_key_path(cert_dir().join(key))
}

fn client_settings(ca: &str) -> TlsSettings {
    TlsSettings::default()
        .with_ca_path(cert_dir().join(ca))
        .with_server_name("localhost")
}

struct EchoHandler;

#[async_trait]
impl ServerHandler for EchoHandler {
    async fn on_message(&self, _id: ConnectionId, conn: &Connection, message: Bytes) {
        let _ = conn.send(&message).await;
    }
}

#[tokio::test]
async fn test_tls_echo_end_to_end() {
    let config = ServerConfig::new("127.0.0.1:0".parse().unwrap())
        .with_tls(server_settings("cert.pem", "key.pem"));
    let server = TcpServer::new(config).await.unwrap();
    server.start(Arc::new(EchoHandler)).await.unwrap();

    let addr = server.bind_address();
    let config = ClientConfig::new(addr.ip().to_string(), addr.port())
        .with_tls(client_settings("cert.pem"));
    let mut client = TcpClient::connect(config).await.unwrap();

    client.send(b"over tls").await.unwrap();
    let reply = timeout(Duration::from_secs(5), client.recv())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(&reply[..], b"over tls");

    client.close().await.unwrap();
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_tls_websocket_end_to_end() {
    let config = ServerConfig::new("127.0.0.1:0".parse().unwrap())
        .with_tls(server_settings("cert.pem", "key.pem"))
        .with_websocket(true);
    let server = TcpServer::new(config).await.unwrap();
    server.start(Arc::new(EchoHandler)).await.unwrap();

    let addr = server.bind_address();
    let config = ClientConfig::new(addr.ip().to_string(), addr.port())
        .with_tls(client_settings("cert.pem"))
        .with_websocket("/secure");
    let mut client = TcpClient::connect(config).await.unwrap();

    client.send(b"framed over tls").await.unwrap();
    let reply = timeout(Duration::from_secs(5), client.recv())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(&reply[..], b"framed over tls");

    client.close().await.unwrap();
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_untrusted_certificate_is_rejected() {
    let config = ServerConfig::new("127.0.0.1:0".parse().unwrap())
        .with_tls(server_settings("cert.pem", "key.pem"));
    let server = TcpServer::new(config).await.unwrap();
    server.start(Arc::new(EchoHandler)).await.unwrap();

    // Client trusts only the rotated certificate, not the one served
    let addr = server.bind_address();
    let config = ClientConfig::new(addr.ip().to_string(), addr.port())
        .with_tls(client_settings("cert2.pem"));
    assert!(TcpClient::connect(config).await.is_err());

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_certificate_rotation_applies_to_new_handshakes() {
    let config = ServerConfig::new("127.0.0.1:0".parse().unwrap())
        .with_tls(server_settings("cert.pem", "key.pem"));
    let server = TcpServer::new(config).await.unwrap();
    server.start(Arc::new(EchoHandler)).await.unwrap();
    let addr = server.bind_address();

    // Rotate to the second certificate without restarting
    let ctx = server.tls_context().unwrap();
    ctx.reset_settings(server_settings("cert2.pem", "key2.pem"))
        .unwrap();

    // A client trusting the old certificate is now rejected
    let config = ClientConfig::new(addr.ip().to_string(), addr.port())
        .with_tls(client_settings("cert.pem"));
    assert!(TcpClient::connect(config).await.is_err());

    // A client trusting the rotated certificate succeeds
    let config = ClientConfig::new(addr.ip().to_string(), addr.port())
        .with_tls(client_settings("cert2.pem"));
    let mut client = TcpClient::connect(config).await.unwrap();
    client.send(b"rotated").await.unwrap();
    let reply = timeout(Duration::from_secs(5), client.recv())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(&reply[..], b"rotated");

    client.close().await.unwrap();
    server.shutdown().await.unwrap();
}

/// Drive a paired in-place renewal over real sockets: the server side
/// redraws while the client side resets, then traffic resumes on the
/// renewed session.
#[tokio::test]
async fn test_in_place_renewal_over_tcp() {
    let server_ctx = Arc::new(TlsContext::server(server_settings("cert.pem", "key.pem")).unwrap());
    let client_ctx = Arc::new(TlsContext::client(client_settings("cert.pem")).unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_task = {
        let ctx = server_ctx.clone();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut stream = ctx.accept(socket).await.unwrap();

            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"first");

            let mut stream = ctx.redraw(stream).await.unwrap();

            let mut buf = [0u8; 6];
            stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"second");

            // A second renewal on the same transport must work the same
            let mut stream = ctx.redraw(stream).await.unwrap();

            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"third");
        })
    };

    let socket = TcpStream::connect(addr).await.unwrap();
    let mut stream = client_ctx.connect(socket).await.unwrap();
    stream.write_all(b"first").await.unwrap();
    stream.flush().await.unwrap();

    // Give the server a moment to drain before the paired renewal
    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut stream = client_ctx.reset(stream).await.unwrap();
    assert!(!client_ctx.is_renewing());

    stream.write_all(b"second").await.unwrap();
    stream.flush().await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut stream = client_ctx.reset(stream).await.unwrap();
    assert!(!client_ctx.is_renewing());

    stream.write_all(b"third").await.unwrap();
    stream.flush().await.unwrap();

    server_task.await.unwrap();
}

#[tokio::test]
async fn test_client_reset_tls_against_cooperating_server() {
    let server_ctx = Arc::new(TlsContext::server(server_settings("cert.pem", "key.pem")).unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_task = {
        let ctx = server_ctx.clone();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut stream = ctx.accept(socket).await.unwrap();

            let mut buf = [0u8; 6];
            stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"before");

            let mut stream = ctx.redraw(stream).await.unwrap();

            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"after");
        })
    };

    let config = ClientConfig::new(addr.ip().to_string(), addr.port())
        .with_tls(client_settings("cert.pem"));
    let mut client = TcpClient::connect(config).await.unwrap();

    client.send(b"before").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    client.reset_tls().await.unwrap();
    assert!(client.is_connected());

    client.send(b"after").await.unwrap();
    server_task.await.unwrap();
}
