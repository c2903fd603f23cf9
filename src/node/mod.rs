pub mod config;
pub mod runner;
pub mod cli;

pub use config::ProbeConfig;
pub use runner::{probe_one, run_batch, ProbeReport};
pub use cli::run_cli;
