//! Probe orchestration for the CLI: single probes, batches under bounded concurrency,
//! JSON reporting and shutdown on Ctrl-C.

use anyhow::Result;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::io::Write;
use tokio::io::BufReader;
use tracing::{debug, info, warn};

use crate::network::connection::{probe, ProbeOutcome};
use crate::network::discovery::{is_ignored_error, read_targets};
use crate::network::enode::Target;
use crate::node::config::ProbeConfig;
use crate::utils::metrics::{PROBE_FAILURE, PROBE_SUCCESS};
use crate::utils::{ProbeError, METRICS};

/// One line of output.
#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub enode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ProbeOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReportError>,
}

#[derive(Debug, Serialize)]
pub struct ReportError {
    pub code: &'static str,
    pub message: String,
}

impl ProbeReport {
    pub fn new(enode: impl Into<String>, result: Result<ProbeOutcome, ProbeError>) -> Self {
        let enode = enode.into();
        match result {
            Ok(outcome) => Self { enode, outcome: Some(outcome), error: None },
            Err(e) => Self {
                enode,
                outcome: None,
                error: Some(ReportError { code: e.code(), message: e.to_string() }),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_some()
    }
}

pub async fn probe_one(enode: &str, config: &ProbeConfig) -> ProbeReport {
    let result = match enode.parse::<Target>() {
        Ok(target) => probe(&target, config).await,
        Err(e) => Err(e),
    };
    ProbeReport::new(enode, result)
}

/// Totals of a finished (or interrupted) batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub reported: usize,
    pub ignored: usize,
}

/// Probe every target, writing one JSON report per line to `out` as results arrive.
/// Benign transport noise is logged at debug and left out of the output.
pub async fn run_batch<W: Write>(
    targets: Vec<(String, Result<Target, ProbeError>)>,
    config: &ProbeConfig,
    out: &mut W,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();
    let mut results = stream::iter(targets)
        .map(|(line, target)| async move {
            let result = match target {
                Ok(target) => probe(&target, config).await,
                Err(e) => Err(e),
            };
            (line, result)
        })
        .buffer_unordered(config.concurrency);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted, stopping batch");
                break;
            }
            next = results.next() => {
                let Some((line, result)) = next else { break };
                if let Err(e) = &result {
                    if is_ignored_error(e) {
                        debug!(
                            enode = %line,
                            code = e.code(),
                            error = %e,
                            "ignoring benign failure"
                        );
                        summary.ignored += 1;
                        continue;
                    }
                }
                serde_json::to_writer(&mut *out, &ProbeReport::new(line, result))?;
                writeln!(out)?;
                out.flush()?;
                summary.reported += 1;
            }
        }
    }

    info!(
        reported = summary.reported,
        ignored = summary.ignored,
        succeeded = METRICS.counter(PROBE_SUCCESS),
        failed = METRICS.counter(PROBE_FAILURE),
        "batch finished"
    );
    Ok(summary)
}

/// Batch over enode lines read from `input` (`-` for stdin), reporting to stdout.
pub async fn run_batch_input(input: &str, config: &ProbeConfig) -> Result<BatchSummary> {
    let targets = if input == "-" {
        read_targets(BufReader::new(tokio::io::stdin())).await?
    } else {
        read_targets(BufReader::new(tokio::fs::File::open(input).await?)).await?
    };
    info!(count = targets.len(), concurrency = config.concurrency, "starting batch");
    run_batch(targets, config, &mut std::io::stdout().lock()).await
}
