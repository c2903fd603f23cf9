use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::codec::Framed;
use tracing::{debug, info, trace};

use crate::crypto::{NodeId, NodeKey};
use crate::network::capability::build_hello;
use crate::network::codec::{Incoming, Outgoing, RlpxCodec};
use crate::network::dispatch::{Dispatcher, Routed, SubprotocolMessage};
use crate::network::enode::Target;
use crate::network::eth::Status;
use crate::network::handshake::Handshake;
use crate::network::message::{DisconnectReason, DISCONNECT, HELLO, PONG};
use crate::network::transport;
use crate::node::config::ProbeConfig;
use crate::utils::metrics::{FRAMES_RECEIVED, FRAMES_SENT, PROBE_FAILURE, PROBE_SUCCESS};
use crate::utils::{ProbeError, Result, METRICS};

/// `rlp([])`, the payload of PING and PONG.
const EMPTY_LIST: &[u8] = &[0xc0];

/// What a successful probe learned about the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    pub status: Status,
}

/// One outbound RLPx session over `S`. Drives auth, HELLO and the first Status.
pub struct Connection<S> {
    framed: Framed<S, RlpxCodec>,
    dispatcher: Dispatcher,
    local_id: NodeId,
    client_id: String,
    remote_client: Option<String>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, key: NodeKey, remote_id: NodeId, config: &ProbeConfig) -> Result<Self> {
        let local_id = key.id();
        let handshake = Handshake::new(key, &remote_id)?;
        Ok(Self {
            framed: Framed::new(stream, RlpxCodec::new(handshake, config.legacy_auth)),
            dispatcher: Dispatcher::new(config.local_capabilities(), Some(remote_id)),
            local_id,
            client_id: config.client_id.clone(),
            remote_client: None,
        })
    }

    /// Run until the first Status or the first fatal error.
    pub async fn run(&mut self) -> Result<ProbeOutcome> {
        self.framed.send(Outgoing::Auth).await?;
        trace!("auth sent");

        while let Some(incoming) = self.framed.next().await {
            match incoming? {
                Incoming::Ack => {
                    trace!("session established");
                    self.send_hello().await?;
                }
                Incoming::Message { code, payload } => {
                    METRICS.inc_counter(FRAMES_RECEIVED);
                    match self.dispatcher.route(code, &payload)? {
                        Routed::Hello { client_id } => self.remote_client = Some(client_id),
                        Routed::Ping => {
                            self.send_message(PONG, Bytes::from_static(EMPTY_LIST)).await?
                        }
                        Routed::Pong | Routed::Ignored { .. } => {}
                        Routed::Subprotocol(SubprotocolMessage::EthStatus(status)) => {
                            let client = self.remote_client.clone();
                            return Ok(ProbeOutcome { client, status });
                        }
                    }
                }
            }
        }
        Err(ProbeError::SocketClosed)
    }

    async fn send_hello(&mut self) -> Result<()> {
        let hello =
            build_hello(self.local_id, &self.client_id, self.dispatcher.local_capabilities());
        self.send_message(HELLO, hello.encode_payload())
            .await
            .map_err(|e| ProbeError::SendHello(e.to_string()))
    }

    async fn send_message(&mut self, code: u64, payload: Bytes) -> Result<()> {
        let payload = if code != HELLO && self.dispatcher.compression_enabled() {
            snap::raw::Encoder::new()
                .compress_vec(&payload)
                .map(Bytes::from)
                .map_err(|e| ProbeError::Unknown(format!("snappy: {e}")))?
        } else {
            payload
        };
        self.framed.send(Outgoing::Message { code, payload }).await?;
        METRICS.inc_counter(FRAMES_SENT);
        Ok(())
    }

    /// Best-effort teardown: DISCONNECT (only once a session exists), then shutdown.
    /// Each step is bounded by `grace`; failures are swallowed.
    pub async fn close(&mut self, reason: Option<DisconnectReason>, grace: Duration) {
        if let Some(reason) = reason.filter(|_| self.framed.codec().is_established()) {
            match timeout(grace, self.send_message(DISCONNECT, reason.to_payload())).await {
                Ok(Ok(())) => debug!(%reason, "disconnect sent"),
                Ok(Err(e)) => trace!(error = %e, "disconnect not sent"),
                Err(_) => trace!("disconnect write timed out"),
            }
        }
        let _ = timeout(grace, self.framed.get_mut().shutdown()).await;
    }
}

/// Probe the node behind `target`: connect, handshake, read Status, disconnect.
pub async fn probe(target: &Target, config: &ProbeConfig) -> Result<ProbeOutcome> {
    info!(%target, "probing");
    let deadline = Instant::now() + config.timeout();
    let result = match timeout_at(deadline, transport::connect(target)).await {
        Ok(Ok(stream)) => drive(stream, target.id, config, deadline).await,
        Ok(Err(e)) => Err(ProbeError::ConnectFailed(e)),
        Err(_) => Err(ProbeError::Timeout(config.timeout())),
    };
    record(&result);
    result
}

/// Same as [`probe`] over an already connected stream.
pub async fn probe_stream<S>(
    stream: S,
    remote_id: NodeId,
    config: &ProbeConfig,
) -> Result<ProbeOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let deadline = Instant::now() + config.timeout();
    let result = drive(stream, remote_id, config, deadline).await;
    record(&result);
    result
}

async fn drive<S>(
    stream: S,
    remote_id: NodeId,
    config: &ProbeConfig,
    deadline: Instant,
) -> Result<ProbeOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let key = config.node_key().map_err(|e| ProbeError::Unknown(e.to_string()))?;
    let mut conn = Connection::new(stream, key, remote_id, config)?;

    let result = match timeout_at(deadline, conn.run()).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(config.timeout())),
    };
    let reason = match &result {
        Ok(_) => Some(DisconnectReason::DisconnectRequested),
        Err(e) => e.disconnect_reason(),
    };
    conn.close(reason, config.disconnect_grace()).await;
    result
}

fn record(result: &Result<ProbeOutcome>) {
    match result {
        Ok(outcome) => {
            METRICS.inc_counter(PROBE_SUCCESS);
            debug!(
                client = outcome.client.as_deref().unwrap_or("-"),
                network = %outcome.status.network_id,
                "status received"
            );
        }
        Err(e) => {
            METRICS.inc_counter(PROBE_FAILURE);
            debug!(code = e.code(), error = %e, "probe failed");
        }
    }
}
