//! Observer that keeps every suite event for later assertions

use std::sync::{Mutex, MutexGuard, PoisonError};

use tickbench::{BenchmarkError, BenchmarkSession, Phase, PhaseOutcome, SuiteObserver};

#[derive(Debug, Clone, PartialEq)]
pub enum ObservedEvent {
    PhaseStarted {
        engine: String,
        phase: Phase,
    },
    PhaseCompleted {
        engine: String,
        phase: Phase,
        outcome: PhaseOutcome,
        records: u64,
    },
    Exception {
        engine: String,
        kind: &'static str,
        message: String,
    },
    SessionFinished {
        engine: String,
    },
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ObservedEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.lock().clone()
    }

    /// `(engine, kind)` of every published exception
    pub fn exceptions(&self) -> Vec<(String, &'static str)> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                ObservedEvent::Exception { engine, kind, .. } => Some((engine.clone(), *kind)),
                _ => None,
            })
            .collect()
    }

    /// `(phase, outcome)` of every completed phase of `engine`
    pub fn completed(&self, engine: &str) -> Vec<(Phase, PhaseOutcome)> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                ObservedEvent::PhaseCompleted {
                    engine: name,
                    phase,
                    outcome,
                    ..
                } if name == engine => Some((*phase, *outcome)),
                _ => None,
            })
            .collect()
    }

    pub fn finished_sessions(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                ObservedEvent::SessionFinished { engine } => Some(engine.clone()),
                _ => None,
            })
            .collect()
    }
}

impl SuiteObserver for RecordingObserver {
    fn on_phase_started(&self, session: &BenchmarkSession, phase: Phase) {
        self.lock().push(ObservedEvent::PhaseStarted {
            engine: session.engine_name().to_string(),
            phase,
        });
    }

    fn on_phase_completed(&self, session: &BenchmarkSession, phase: Phase, outcome: PhaseOutcome) {
        self.lock().push(ObservedEvent::PhaseCompleted {
            engine: session.engine_name().to_string(),
            phase,
            outcome,
            records: session.records(phase.kind()),
        });
    }

    fn on_exception(&self, error: &BenchmarkError, session: &BenchmarkSession) {
        self.lock().push(ObservedEvent::Exception {
            engine: session.engine_name().to_string(),
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    fn on_session_finished(&self, session: &BenchmarkSession) {
        self.lock().push(ObservedEvent::SessionFinished {
            engine: session.engine_name().to_string(),
        });
    }
}
