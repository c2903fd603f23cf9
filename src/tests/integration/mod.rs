//! Integration tests: run complete probes over `tokio::io::duplex` against the mock responder.

use bytes::BytesMut;
use tokio::io::{duplex, DuplexStream};
use tokio_test::{assert_err, assert_ok};

use crate::crypto::{NodeId, NodeKey};
use crate::network::capability::{build_hello, LocalCapability};
use crate::network::eth::tests::status_payload;
use crate::network::message::{DisconnectReason, DISCONNECT, HELLO, PING, PONG};
use crate::network::probe_stream;
use crate::node::config::ProbeConfig;
use crate::tests::responder::MockResponder;
use crate::utils::ProbeError;

const CLIENT: &str = "Geth/v1.13.0-mock/linux-amd64/go1.21";

fn config() -> ProbeConfig {
    ProbeConfig { timeout_ms: 5_000, disconnect_grace_ms: 500, ..Default::default() }
}

fn hello_from(id: NodeId) -> Vec<u8> {
    build_hello(id, CLIENT, &[LocalCapability::eth(66)]).encode_payload().to_vec()
}

/// Handshake, then consume the initiator's HELLO.
async fn accept(
    responder: &mut MockResponder,
    stream: &mut DuplexStream,
    legacy: bool,
) -> BytesMut {
    let mut buf = responder.handshake(stream, legacy).await.unwrap();
    let (code, payload) = responder.read_message(stream, &mut buf).await.unwrap().unwrap();
    assert_eq!(code, HELLO);
    let hello = crate::network::message::Hello::decode_payload(&payload).unwrap();
    assert_eq!(Some(hello.node_id), responder.initiator());
    assert_eq!(hello.capabilities[0].to_string(), "eth/66");
    buf
}

/// Every remaining frame until EOF.
async fn drain(
    responder: &mut MockResponder,
    stream: &mut DuplexStream,
    mut buf: BytesMut,
) -> Vec<(u64, Vec<u8>)> {
    let mut frames = Vec::new();
    while let Some(frame) = responder.read_message(stream, &mut buf).await.unwrap() {
        frames.push(frame);
    }
    frames
}

#[tokio::test]
async fn test_probe_reads_status_and_disconnects() {
    let (client, mut server) = duplex(64 * 1024);
    let mut responder = MockResponder::new();
    let remote_id = responder.id();
    let config = config();

    let serve = async {
        let buf = accept(&mut responder, &mut server, false).await;
        let id = responder.id();
        responder.send(&mut server, HELLO, &hello_from(id)).await.unwrap();
        responder.send(&mut server, PING, &[0xc0]).await.unwrap();
        responder.send(&mut server, 16, &status_payload()).await.unwrap();
        drain(&mut responder, &mut server, buf).await
    };
    let (result, frames) = tokio::join!(probe_stream(client, remote_id, &config), serve);

    let outcome = assert_ok!(result);
    assert_eq!(outcome.client.as_deref(), Some(CLIENT));
    assert_eq!(outcome.status.protocol_version, 66);
    assert_eq!(outcome.status.fork_id.hash, "0xfc64ec04");
    let goodbye = DisconnectReason::DisconnectRequested.to_payload().to_vec();
    assert_eq!(frames, vec![(PONG, vec![0xc0]), (DISCONNECT, goodbye)]);
}

#[tokio::test]
async fn test_legacy_handshake() {
    let (client, mut server) = duplex(64 * 1024);
    let mut responder = MockResponder::new();
    let remote_id = responder.id();
    let config = ProbeConfig { legacy_auth: true, ..config() };

    let serve = async {
        let buf = accept(&mut responder, &mut server, true).await;
        let id = responder.id();
        responder.send(&mut server, HELLO, &hello_from(id)).await.unwrap();
        responder.send(&mut server, 16, &status_payload()).await.unwrap();
        drain(&mut responder, &mut server, buf).await
    };
    let (result, frames) = tokio::join!(probe_stream(client, remote_id, &config), serve);
    assert_ok!(result);
    assert_eq!(frames.len(), 1);
}

#[tokio::test]
async fn test_remote_disconnect_after_hello() {
    let (client, mut server) = duplex(64 * 1024);
    let mut responder = MockResponder::new();
    let remote_id = responder.id();
    let config = config();

    let serve = async {
        let buf = accept(&mut responder, &mut server, false).await;
        let id = responder.id();
        responder.send(&mut server, HELLO, &hello_from(id)).await.unwrap();
        responder.send(&mut server, DISCONNECT, &[0xc1, 0x03]).await.unwrap();
        drain(&mut responder, &mut server, buf).await
    };
    let (result, frames) = tokio::join!(probe_stream(client, remote_id, &config), serve);

    let err = assert_err!(result);
    assert!(matches!(err, ProbeError::PeerDisconnected(DisconnectReason::UselessPeer)));
    assert_eq!(err.code(), "PEER_DISCONNECTED");
    // the remote already left: nothing is sent back
    assert!(frames.is_empty());
}

#[tokio::test]
async fn test_identity_mismatch_sends_invalid_identity() {
    let (client, mut server) = duplex(64 * 1024);
    let mut responder = MockResponder::new();
    let remote_id = responder.id();
    let config = config();

    let serve = async {
        let buf = accept(&mut responder, &mut server, false).await;
        responder.send(&mut server, HELLO, &hello_from(NodeKey::generate().id())).await.unwrap();
        // the hello was rejected, so nothing after it is compressed
        responder.snappy = false;
        drain(&mut responder, &mut server, buf).await
    };
    let (result, frames) = tokio::join!(probe_stream(client, remote_id, &config), serve);

    assert_eq!(assert_err!(result).code(), "INVALID_IDENTITY");
    assert_eq!(frames, vec![(DISCONNECT, vec![0xc1, 0x07])]);
}

#[tokio::test]
async fn test_status_before_hello_is_protocol_error() {
    let (client, mut server) = duplex(64 * 1024);
    let mut responder = MockResponder::new();
    responder.snappy = false;
    let remote_id = responder.id();
    let config = config();

    let serve = async {
        let buf = accept(&mut responder, &mut server, false).await;
        responder.send(&mut server, 16, &status_payload()).await.unwrap();
        drain(&mut responder, &mut server, buf).await
    };
    let (result, frames) = tokio::join!(probe_stream(client, remote_id, &config), serve);

    assert_eq!(assert_err!(result).code(), "PROTOCOL_ERROR");
    assert_eq!(frames, vec![(DISCONNECT, vec![0xc1, 0x02])]);
}

#[tokio::test]
async fn test_silent_peer_times_out() {
    let (client, mut server) = duplex(64 * 1024);
    let mut responder = MockResponder::new();
    responder.snappy = false;
    let remote_id = responder.id();
    let config = ProbeConfig { timeout_ms: 200, ..config() };

    let serve = async {
        let buf = accept(&mut responder, &mut server, false).await;
        drain(&mut responder, &mut server, buf).await
    };
    let (result, frames) = tokio::join!(probe_stream(client, remote_id, &config), serve);

    let err = assert_err!(result);
    assert_eq!(err.code(), "TIMEOUT");
    assert_eq!(frames, vec![(DISCONNECT, vec![0xc1, 0x80])]);
}

#[tokio::test]
async fn test_missing_ack_times_out_and_closes() {
    let (client, mut server) = duplex(64 * 1024);
    let mut responder = MockResponder::new();
    let remote_id = responder.id();
    let config = ProbeConfig { timeout_ms: 200, ..config() };

    // read the auth, never answer, then collect everything up to EOF
    let serve = async {
        let mut received = Vec::new();
        let read = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            tokio::io::AsyncReadExt::read_to_end(&mut server, &mut received),
        )
        .await;
        (read, received)
    };
    let (result, (read, received)) = tokio::join!(probe_stream(client, remote_id, &config), serve);

    let err = assert_err!(result);
    assert_eq!(err.code(), "TIMEOUT");
    // EOF was reached: the socket is closed
    assert_ok!(assert_ok!(read));
    // only the size-prefixed auth was written, no DISCONNECT frame after it
    let size = u16::from_be_bytes([received[0], received[1]]) as usize;
    assert_eq!(received.len(), 2 + size);
    assert_eq!(responder.initiator(), None);
    responder.accept_auth(&received, false);
    assert!(responder.initiator().is_some());
}

#[tokio::test]
async fn test_closed_socket_after_ack() {
    let (client, mut server) = duplex(64 * 1024);
    let mut responder = MockResponder::new();
    let remote_id = responder.id();
    let config = config();

    let serve = async move {
        responder.handshake(&mut server, false).await.unwrap();
        drop(server);
    };
    let (result, ()) = tokio::join!(probe_stream(client, remote_id, &config), serve);
    let err = assert_err!(result);
    assert!(
        matches!(err, ProbeError::SocketClosed | ProbeError::Socket(_) | ProbeError::SendHello(_)),
        "{err}"
    );
}

#[tokio::test]
async fn test_garbage_before_auth_is_rejected() {
    let (client, mut server) = duplex(64 * 1024);
    let remote_id = MockResponder::new().id();
    let config = config();

    // unsolicited bytes are read as a (malformed) ack
    tokio::io::AsyncWriteExt::write_all(&mut server, &[0u8; 16]).await.unwrap();
    let result = probe_stream(client, remote_id, &config).await;
    let err = assert_err!(result);
    assert!(matches!(err.code(), "HANDSHAKE_FAILED" | "INCOMING_DATA_STATE"), "{err}");
}
