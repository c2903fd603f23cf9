use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::crypto::NodeKey;
use crate::network::capability::LocalCapability;

/// Prober configuration, loadable from TOML. Every field has a default, so an empty
/// file (or no file) is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Overall budget per probe, from TCP connect to Status.
    pub timeout_ms: u64,
    /// Bound on the DISCONNECT write and socket shutdown once a probe is over.
    pub disconnect_grace_ms: u64,
    /// Client id advertised in HELLO.
    pub client_id: String,
    /// `eth` versions offered to the remote.
    pub eth_versions: Vec<u64>,
    /// Send the pre-EIP-8 fixed-size auth.
    pub legacy_auth: bool,
    /// Hex secp256k1 secret. A fresh key is generated per probe when unset.
    pub node_key: Option<String>,
    /// Concurrent probes in batch mode.
    pub concurrency: usize,
    pub log_level: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            disconnect_grace_ms: 2_000,
            client_id: default_client_id(),
            eth_versions: vec![66],
            legacy_auth: false,
            node_key: None,
            concurrency: 16,
            log_level: "warn".to_string(),
        }
    }
}

pub fn default_client_id() -> String {
    format!(
        "RLPxProber/v{}/{}-{}/rust",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

impl ProbeConfig {
    /// Load from a TOML file and validate.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let cfg: ProbeConfig =
            toml::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.eth_versions.is_empty() {
            return Err(anyhow!("eth_versions must not be empty"));
        }
        if self.concurrency == 0 {
            return Err(anyhow!("concurrency must be at least 1"));
        }
        if self.timeout_ms == 0 {
            return Err(anyhow!("timeout_ms must be positive"));
        }
        self.node_key()?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_millis(self.disconnect_grace_ms)
    }

    pub fn local_capabilities(&self) -> Vec<LocalCapability> {
        self.eth_versions.iter().copied().map(LocalCapability::eth).collect()
    }

    /// Configured static key, or a freshly generated one.
    pub fn node_key(&self) -> Result<NodeKey> {
        match &self.node_key {
            Some(secret) => {
                let raw = hex::decode(secret.trim_start_matches("0x"))
                    .context("node_key is not hex")?;
                NodeKey::from_bytes(&raw).map_err(|e| anyhow!("invalid node_key: {e}"))
            }
            None => Ok(NodeKey::generate()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let cfg: ProbeConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.disconnect_grace(), Duration::from_secs(2));
        assert_eq!(cfg.eth_versions, vec![66]);
        assert!(cfg.client_id.starts_with("RLPxProber/v"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let cfg: ProbeConfig = toml::from_str(
            r#"
            timeout_ms = 5000
            eth_versions = [66, 67, 68]
            node_key = "0x0707070707070707070707070707070707070707070707070707070707070707"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.timeout_ms, 5000);
        assert_eq!(cfg.local_capabilities().len(), 3);
        let a = cfg.node_key().unwrap();
        let b = cfg.node_key().unwrap();
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_validation_failures() {
        let cfg = ProbeConfig { eth_versions: vec![], ..Default::default() };
        assert!(cfg.validate().is_err());
        let cfg = ProbeConfig { node_key: Some("zz".into()), ..Default::default() };
        assert!(cfg.validate().is_err());
        let cfg = ProbeConfig { concurrency: 0, ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let name = format!("rlpx-prober-config-{}.toml", std::process::id());
        let path = std::env::temp_dir().join(name);
        fs::write(&path, "legacy_auth = true\nconcurrency = 4\n").unwrap();
        let cfg = ProbeConfig::load(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert!(cfg.legacy_auth);
        assert_eq!(cfg.concurrency, 4);
    }
}
