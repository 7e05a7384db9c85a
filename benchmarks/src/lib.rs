//! Tickbench: storage engine benchmark sessions
//!
//! This crate drives storage engines through a fixed benchmark lifecycle and records
//! throughput and memory statistics for every measured phase:
//!
//! - Init prepares the engine for a number of concurrent flows
//! - Write pushes generated tick flows through one worker per flow
//! - Read and SecondaryRead stream the content back and verify key order
//! - Finish measures the final engine size and releases it
//!
//! Sessions run sequentially inside a [`BenchmarkSuite`], which isolates failures and
//! publishes events to registered observers.

pub mod backends;
pub mod config;
pub mod engine;
pub mod error;
pub mod generator;
pub mod metrics;
pub mod monitoring;
pub mod report;
pub mod session;
pub mod statistics;
pub mod suite;
pub mod utils;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

pub use backends::{EngineKind, FlowFileEngine, MemoryEngine};
pub use config::Config;
pub use engine::{Record, RecordStream, StorageEngine, Tick};
pub use error::{BenchmarkError, StorageError};
pub use metrics::BenchmarkMetrics;
pub use report::SessionReport;
pub use session::{
    BenchmarkSession, Phase, PhaseKind, PhaseOutcome, SessionMonitor, SessionParams,
    SessionState,
};
pub use statistics::{InstrumentSnapshot, PerformanceInstrument, INTERVAL_COUNT};
pub use suite::{BenchmarkSuite, LoggingObserver, SuiteObserver};

/// Initialize logging with the default `tickbench=info` filter
pub fn init() -> Result<()> {
    init_with_filter("tickbench=info")
}

/// Initialize logging. `RUST_LOG` takes precedence over `filter`.
pub fn init_with_filter(filter: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

/// One session per enabled engine, all sharing children of `cancellation`.
pub fn build_sessions(config: &Config, cancellation: &CancellationToken) -> Vec<BenchmarkSession> {
    config
        .engines
        .enabled
        .iter()
        .map(|kind| {
            BenchmarkSession::new(
                kind.create(&config.engines.data_directory),
                config.session_params(),
                cancellation.child_token(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_sessions_follows_config() {
        let mut config = Config::default();
        config.engines.enabled = vec![EngineKind::Memory];
        config.session.record_count = 10;

        let root = CancellationToken::new();
        let sessions = build_sessions(&config, &root);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].engine_name(), "Memory");
        assert_eq!(sessions[0].params().record_count, 10);

        root.cancel();
        assert!(sessions[0].is_cancelled());
    }
}
