//! Boundary with peer discovery: targets arrive as enode lines, and some failures are
//! transport noise that discovery tolerates rather than reports.

use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::crypto::EciesError;
use crate::network::enode::Target;
use crate::utils::{ProbeError, Result};

/// Error messages discovery traffic routinely produces and never surfaces.
pub const IGNORED_ERRORS: &[&str] = &[
    "ECONNRESET",
    "EPIPE",
    "ETIMEDOUT",
    "Hash verification failed",
    "Invalid address buffer",
    "Invalid timestamp buffer",
    "Invalid type",
    "Timeout error: ping",
    "Peer is banned",
    "Invalid MAC",
    "Handshake timed out",
    "Server already destroyed",
];

/// Read one enode per line. Blank lines and `#` comments are skipped; malformed lines
/// are kept as errors so they can be reported in order.
pub async fn read_targets<R>(reader: R) -> io::Result<Vec<(String, Result<Target>)>>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut targets = Vec::new();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        targets.push((line.to_string(), line.parse()));
    }
    Ok(targets)
}

/// Whether a probe failure is benign noise.
pub fn is_ignored_error(err: &ProbeError) -> bool {
    match err {
        ProbeError::Socket(e) | ProbeError::ConnectFailed(e)
            if matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe | io::ErrorKind::TimedOut
            ) =>
        {
            true
        }
        ProbeError::InvalidHeader(EciesError::TagCheckHeaderFailed)
        | ProbeError::InvalidBody(EciesError::TagCheckBodyFailed) => true,
        other => {
            let message = other.to_string();
            IGNORED_ERRORS.iter().any(|ignored| message.contains(ignored))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::NodeKey;
    use std::time::Duration;

    #[tokio::test]
    async fn test_read_targets_skips_comments() {
        let id = hex::encode(NodeKey::generate().id());
        let input = format!("# bootnodes\n\nenode://{id}@127.0.0.1:30303\n  not-an-enode  \n");
        let targets = read_targets(input.as_bytes()).await.unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].1.as_ref().unwrap().port, 30303);
        assert_eq!(targets[1].0, "not-an-enode");
        assert!(targets[1].1.is_err());
    }

    #[test]
    fn test_transport_noise_is_ignored() {
        let reset = ProbeError::Socket(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(is_ignored_error(&reset));
        let pipe = ProbeError::Socket(io::Error::new(io::ErrorKind::Other, "write EPIPE"));
        assert!(is_ignored_error(&pipe));
        assert!(is_ignored_error(&ProbeError::InvalidBody(EciesError::TagCheckBodyFailed)));
    }

    #[test]
    fn test_real_failures_are_reported() {
        assert!(!is_ignored_error(&ProbeError::UselessPeer));
        assert!(!is_ignored_error(&ProbeError::Timeout(Duration::from_secs(30))));
        let refused = ProbeError::ConnectFailed(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert!(!is_ignored_error(&refused));
    }
}
