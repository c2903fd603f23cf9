use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::node::config::ProbeConfig;
use crate::node::runner;
use crate::utils::init_logging;

/// Probe Ethereum execution-layer nodes over RLPx and print their Status as JSON.
#[derive(Parser)]
#[clap(name = "rlpx-prober", version)]
pub struct Cli {
    /// Path to a TOML config file
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Overall per-probe timeout in milliseconds
    #[clap(long, global = true)]
    pub timeout_ms: Option<u64>,

    #[clap(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand)]
pub enum Cmd {
    /// Probe a single node
    Probe {
        /// enode://<id>@<host>:<port>
        enode: String,
    },
    /// Probe every enode listed in a file, one per line
    Batch {
        /// input file, or `-` for stdin
        #[clap(long, default_value = "-")]
        input: String,

        /// concurrent probes (overrides the config file)
        #[clap(long)]
        concurrency: Option<usize>,
    },
}

impl Cli {
    /// Config file (or defaults) with command line overrides applied.
    pub fn resolve_config(&self) -> Result<ProbeConfig> {
        let mut config = match &self.config {
            Some(path) => ProbeConfig::load(path)?,
            None => ProbeConfig::default(),
        };
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if let Cmd::Batch { concurrency: Some(concurrency), .. } = self.cmd {
            config.concurrency = concurrency;
        }
        config.validate()?;
        Ok(config)
    }
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    init_logging(&config.log_level);

    match cli.cmd {
        Cmd::Probe { enode } => {
            let report = runner::probe_one(&enode, &config).await;
            println!("{}", serde_json::to_string(&report)?);
            match report.error {
                Some(error) => Err(anyhow!("probe failed: {}", error.code)),
                None => Ok(()),
            }
        }
        Cmd::Batch { input, .. } => {
            runner::run_batch_input(&input, &config).await?;
            Ok(())
        }
    }
}
