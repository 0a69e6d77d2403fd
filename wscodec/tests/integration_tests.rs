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

//! Integration tests exercising the codec through tokio-util `Framed`

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use socknet_wscodec::{CodecError, WebSocketCodec, WsFrame, WsOpcode, WsRole, handshake};
use tokio_util::codec::{Decoder, Encoder, Framed};

#[tokio::test]
async fn test_framed_client_to_server() {
    let (client_io, server_io) = tokio::io::duplex(16 * 1024);
    let mut client = Framed::new(client_io, WebSocketCodec::new(WsRole::Client));
    let mut server = Framed::new(server_io, WebSocketCodec::new(WsRole::Server));

    client.send(WsFrame::text("over the wire")).await.unwrap();
    let frame = server.next().await.unwrap().unwrap();
    assert_eq!(frame.opcode, WsOpcode::Text);
    assert_eq!(&frame.payload[..], b"over the wire");
}

#[tokio::test]
async fn test_framed_bidirectional_ping_pong() {
    let (client_io, server_io) = tokio::io::duplex(16 * 1024);
    let mut client = Framed::new(client_io, WebSocketCodec::new(WsRole::Client));
    let mut server = Framed::new(server_io, WebSocketCodec::new(WsRole::Server));

    server.send(WsFrame::ping("probe")).await.unwrap();
    let ping = client.next().await.unwrap().unwrap();
    assert_eq!(ping.opcode, WsOpcode::Ping);

    client.send(WsFrame::pong(ping.payload)).await.unwrap();
    let pong = server.next().await.unwrap().unwrap();
    assert_eq!(pong.opcode, WsOpcode::Pong);
    assert_eq!(&pong.payload[..], b"probe");
}

#[tokio::test]
async fn test_framed_fragmented_message() {
    let (client_io, server_io) = tokio::io::duplex(16 * 1024);
    let mut client = Framed::new(client_io, WebSocketCodec::new(WsRole::Client));
    let mut server = Framed::new(server_io, WebSocketCodec::new(WsRole::Server));

    client
        .send(WsFrame {
            fin: false,
            opcode: WsOpcode::Text,
            payload: "hel".into(),
        })
        .await
        .unwrap();
    client
        .send(WsFrame {
            fin: true,
            opcode: WsOpcode::Continuation,
            payload: "lo".into(),
        })
        .await
        .unwrap();

    let first = server.next().await.unwrap().unwrap();
    assert!(!first.fin);
    assert_eq!(first.opcode, WsOpcode::Text);
    let second = server.next().await.unwrap().unwrap();
    assert!(second.fin);
    assert_eq!(second.opcode, WsOpcode::Continuation);
    let mut message = first.payload.to_vec();
    message.extend_from_slice(&second.payload);
    assert_eq!(message, b"hello");
}

#[test]
fn test_handshake_then_frames_share_buffer() {
    // A client that pipelines its first frame right after the upgrade
    // request: the frame bytes must survive head extraction intact.
    let key = handshake::generate_key();
    let head = handshake::build_request("localhost", "/", &key);

    let mut wire = BytesMut::from(head.as_bytes());
    let mut client = WebSocketCodec::new(WsRole::Client);
    client.encode(WsFrame::text("early"), &mut wire).unwrap();

    let head_end = head.len();
    let parsed = handshake::UpgradeRequest::parse(
        std::str::from_utf8(&wire[..head_end]).unwrap(),
    )
    .unwrap();
    assert_eq!(parsed.key, key);

    let mut rest = BytesMut::from(&wire[head_end..]);
    let mut server = WebSocketCodec::new(WsRole::Server);
    let frame = server.decode(&mut rest).unwrap().unwrap();
    assert_eq!(&frame.payload[..], b"early");
}

#[test]
fn test_decode_error_is_sticky_input() {
    // Reserved bits set: the decoder reports the protocol violation
    // rather than resynchronizing.
    let mut server = WebSocketCodec::new(WsRole::Server);
    let mut buf = BytesMut::from(&[0xF1u8, 0x80, 0, 0, 0, 0, b'x'][..]);
    assert!(matches!(
        server.decode(&mut buf),
        Err(CodecError::ReservedBitsSet(_))
    ));
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_roundtrip_any_payload(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let mut client = WebSocketCodec::new(WsRole::Client);
            let mut server = WebSocketCodec::new(WsRole::Server);
            let mut buf = BytesMut::new();
            client.encode(WsFrame::binary(payload.clone()), &mut buf).unwrap();
            let frame = server.decode(&mut buf).unwrap().unwrap();
            prop_assert_eq!(&frame.payload[..], &payload[..]);
            prop_assert!(buf.is_empty());
        }
    }
}
