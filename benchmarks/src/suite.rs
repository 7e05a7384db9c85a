//! Sequential execution of benchmark sessions
//!
//! The suite is the failure boundary: whatever a phase returns, the error is logged,
//! published to the observers together with the session, and the suite moves on.

use std::sync::Arc;

use tracing::{error, info};

use crate::error::BenchmarkError;
use crate::session::{BenchmarkSession, Phase, PhaseOutcome};

/// Receives suite events. Every method has an empty default so observers only implement
/// what they care about.
pub trait SuiteObserver: Send + Sync {
    fn on_phase_started(&self, _session: &BenchmarkSession, _phase: Phase) {}

    /// Raised after Write, Read and SecondaryRead, whatever their outcome.
    fn on_phase_completed(&self, _session: &BenchmarkSession, _phase: Phase, _outcome: PhaseOutcome) {}

    fn on_exception(&self, _error: &BenchmarkError, _session: &BenchmarkSession) {}

    fn on_session_finished(&self, _session: &BenchmarkSession) {}
}

/// Mirrors suite events into the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl SuiteObserver for LoggingObserver {
    fn on_phase_started(&self, session: &BenchmarkSession, phase: Phase) {
        info!("{} {} started", session.engine_name(), phase);
    }

    fn on_phase_completed(&self, session: &BenchmarkSession, phase: Phase, outcome: PhaseOutcome) {
        let kind = phase.kind();
        info!(
            "{} {} completed as {:?}: {} records, {:.0} rec/s",
            session.engine_name(),
            phase,
            outcome,
            session.records(kind),
            session.average_speed(kind)
        );
    }

    fn on_session_finished(&self, session: &BenchmarkSession) {
        info!(
            "{} session finished, size {} bytes",
            session.engine_name(),
            session.engine_size()
        );
    }
}

pub struct BenchmarkSuite {
    observers: Vec<Arc<dyn SuiteObserver>>,
}

impl BenchmarkSuite {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub fn with_observers(observers: Vec<Arc<dyn SuiteObserver>>) -> Self {
        Self { observers }
    }

    pub fn subscribe(&mut self, observer: Arc<dyn SuiteObserver>) {
        self.observers.push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Run every session to completion, one after another, and hand them back for
    /// reporting.
    pub async fn run(&self, sessions: Vec<BenchmarkSession>) -> Vec<BenchmarkSession> {
        let mut finished = Vec::with_capacity(sessions.len());
        for mut session in sessions {
            self.run_session(&mut session).await;
            finished.push(session);
        }
        finished
    }

    /// Drive one session through all of its phases.
    pub async fn run_session(&self, session: &mut BenchmarkSession) {
        info!(
            "Running {} with {} flows, {} records, {} keys",
            session.engine_name(),
            session.params().flow_count,
            session.params().record_count,
            session.keys_type()
        );

        for phase in Phase::ALL {
            self.execute(session, phase).await;
        }

        for observer in &self.observers {
            observer.on_session_finished(session);
        }
    }

    /// Execute a single phase. Never fails: errors are reported to the observers and
    /// turned into the matching outcome.
    pub async fn execute(&self, session: &mut BenchmarkSession, phase: Phase) -> PhaseOutcome {
        for observer in &self.observers {
            observer.on_phase_started(session, phase);
        }

        let result = match phase {
            Phase::Init => session.init().await,
            Phase::Write => session.write().await,
            Phase::Read => session.read().await,
            Phase::SecondaryRead => session.secondary_read().await,
            Phase::Finish => session.finish().await.map(|_| PhaseOutcome::Completed),
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(failure) => {
                self.report(session, phase, &failure);
                PhaseOutcome::from_error(&failure)
            }
        };

        if matches!(phase, Phase::Write | Phase::Read | Phase::SecondaryRead) {
            for observer in &self.observers {
                observer.on_phase_completed(session, phase, outcome);
            }
        }

        outcome
    }

    fn report(&self, session: &BenchmarkSession, phase: Phase, failure: &BenchmarkError) {
        let name = session.engine_name();
        if failure.is_ordering_violation() {
            error!(
                "{} does not return the records ordered by key, the test is invalid: {}",
                name, failure
            );
        } else {
            error!("{} {} failed: {}", name, phase, failure);
        }

        for observer in &self.observers {
            observer.on_exception(failure, session);
        }
    }
}

impl Default for BenchmarkSuite {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryEngine;
    use crate::monitoring::FixedMemoryProbe;
    use crate::session::{PhaseKind, SessionParams, SessionState};
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct Counter {
        started: Mutex<Vec<Phase>>,
        completed: Mutex<Vec<(Phase, PhaseOutcome)>>,
        finished: Mutex<usize>,
    }

    impl SuiteObserver for Counter {
        fn on_phase_started(&self, _session: &BenchmarkSession, phase: Phase) {
            self.started.lock().unwrap().push(phase);
        }

        fn on_phase_completed(&self, _session: &BenchmarkSession, phase: Phase, outcome: PhaseOutcome) {
            self.completed.lock().unwrap().push((phase, outcome));
        }

        fn on_session_finished(&self, _session: &BenchmarkSession) {
            *self.finished.lock().unwrap() += 1;
        }
    }

    fn session(records: u64) -> BenchmarkSession {
        BenchmarkSession::with_memory_probe(
            Arc::new(MemoryEngine::new()),
            SessionParams::new(2, records, 0.0).with_seed(1),
            CancellationToken::new(),
            || Box::new(FixedMemoryProbe(1)),
        )
    }

    #[tokio::test]
    async fn test_suite_publishes_phase_events() {
        let counter = Arc::new(Counter::default());
        let mut suite = BenchmarkSuite::new();
        suite.subscribe(counter.clone());
        suite.subscribe(Arc::new(LoggingObserver));
        assert_eq!(suite.observer_count(), 2);

        let sessions = suite.run(vec![session(200), session(300)]).await;

        assert_eq!(sessions.len(), 2);
        for session in &sessions {
            assert_eq!(session.state(), SessionState::Finished);
            assert_eq!(session.outcome(PhaseKind::SecondaryRead), Some(PhaseOutcome::Completed));
        }
        assert_eq!(counter.started.lock().unwrap().len(), 10);
        assert_eq!(*counter.finished.lock().unwrap(), 2);

        let completed = counter.completed.lock().unwrap();
        assert_eq!(completed.len(), 6);
        assert!(completed.iter().all(|(_, outcome)| *outcome == PhaseOutcome::Completed));
    }

    #[test]
    fn test_out_of_order_phase_is_reported_not_raised() {
        let suite = BenchmarkSuite::new();
        let mut session = session(10);

        let outcome = tokio_test::block_on(suite.execute(&mut session, Phase::Read));
        assert_eq!(outcome, PhaseOutcome::Failed);
        assert_eq!(session.state(), SessionState::Idle);
    }
}
