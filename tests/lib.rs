//! Tickbench Test Suite
//!
//! Mock storage engines and observers for exercising benchmark sessions end to end:
//!
//! - engines that return unordered keys, fail on demand, cancel mid-phase or fail to close
//! - an observer that records every suite event
//!
//! # Usage
//!
//! ```bash
//! cargo test -p tickbench-tests
//! ```

pub mod mocks;

use std::sync::{Arc, Once};

use tickbench::monitoring::FixedMemoryProbe;
use tickbench::{BenchmarkSession, SessionParams, StorageEngine};
use tokio_util::sync::CancellationToken;

pub use mocks::{
    CancelDuring, CancellingEngine, CloseFailingEngine, FailingEngine, FailurePoint,
    ObservedEvent, RecordingObserver, ShufflingEngine,
};

/// Working set reported by sessions built with [`test_session`]
pub const TEST_WORKING_SET: u64 = 32 * 1024 * 1024;

pub const DEFAULT_TEST_SEED: u64 = 20_130_101;

static INIT: Once = Once::new();

/// Initialize the test environment
/// This should be called once before running any tests
pub fn init_test_environment() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tickbench=debug")),
            )
            .with_test_writer()
            .try_init();

        tracing::info!("Tickbench test environment initialized");
    });
}

/// Seeded session with a constant memory probe, so memory assertions are exact.
pub fn test_session(
    engine: Arc<dyn StorageEngine>,
    flow_count: usize,
    record_count: u64,
    randomness: f32,
    cancellation: CancellationToken,
) -> BenchmarkSession {
    BenchmarkSession::with_memory_probe(
        engine,
        SessionParams::new(flow_count, record_count, randomness).with_seed(DEFAULT_TEST_SEED),
        cancellation,
        || Box::new(FixedMemoryProbe(TEST_WORKING_SET)),
    )
}

/// Common test setup macro
#[macro_export]
macro_rules! test_setup {
    () => {
        $crate::init_test_environment();
        let _guard = tracing::info_span!("test").entered();
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickbench::{MemoryEngine, PhaseKind};

    #[test]
    fn test_setup_macro() {
        test_setup!();
    }

    #[test]
    fn test_session_uses_fixed_probe() {
        init_test_environment();
        let session = test_session(
            Arc::new(MemoryEngine::new()),
            1,
            10,
            0.0,
            CancellationToken::new(),
        );
        assert_eq!(session.params().seed, Some(DEFAULT_TEST_SEED));
        assert_eq!(session.peak_working_set(PhaseKind::Write), 0);
    }
}
