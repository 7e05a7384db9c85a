//! Prometheus metrics for Tickbench sessions
//!
//! [`BenchmarkMetrics`] owns its registry; nothing is registered globally. It is fed as a
//! suite observer and exported in the Prometheus text format.

use anyhow::Result;
use prometheus::{GaugeVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry};

use crate::error::BenchmarkError;
use crate::session::{BenchmarkSession, Phase, PhaseOutcome};
use crate::suite::SuiteObserver;

pub struct BenchmarkMetrics {
    registry: Registry,

    phase_speed: GaugeVec,
    phase_elapsed: GaugeVec,
    phase_records: IntGaugeVec,
    phase_peak_working_set: IntGaugeVec,

    engine_size: IntGaugeVec,
    errors: IntCounterVec,
    sessions: IntCounter,
}

impl BenchmarkMetrics {
    pub fn new() -> Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Register every metric on `registry`.
    pub fn with_registry(registry: Registry) -> Result<Self> {
        let phase_speed = GaugeVec::new(
            Opts::new(
                "tickbench_phase_records_per_second",
                "Average speed of a measured phase in records per second",
            ),
            &["engine", "phase"],
        )?;
        registry.register(Box::new(phase_speed.clone()))?;

        let phase_elapsed = GaugeVec::new(
            Opts::new(
                "tickbench_phase_elapsed_seconds",
                "Elapsed time of a measured phase in seconds",
            ),
            &["engine", "phase"],
        )?;
        registry.register(Box::new(phase_elapsed.clone()))?;

        let phase_records = IntGaugeVec::new(
            Opts::new("tickbench_phase_records", "Records processed by a measured phase"),
            &["engine", "phase"],
        )?;
        registry.register(Box::new(phase_records.clone()))?;

        let phase_peak_working_set = IntGaugeVec::new(
            Opts::new(
                "tickbench_phase_peak_working_set_bytes",
                "Peak process working set observed during a phase",
            ),
            &["engine", "phase"],
        )?;
        registry.register(Box::new(phase_peak_working_set.clone()))?;

        let engine_size = IntGaugeVec::new(
            Opts::new("tickbench_engine_size_bytes", "Engine size measured at finish"),
            &["engine"],
        )?;
        registry.register(Box::new(engine_size.clone()))?;

        let errors = IntCounterVec::new(
            Opts::new("tickbench_errors_total", "Errors reported by benchmark sessions"),
            &["engine", "kind"],
        )?;
        registry.register(Box::new(errors.clone()))?;

        let sessions = IntCounter::new("tickbench_sessions_total", "Finished benchmark sessions")?;
        registry.register(Box::new(sessions.clone()))?;

        Ok(Self {
            registry,
            phase_speed,
            phase_elapsed,
            phase_records,
            phase_peak_working_set,
            engine_size,
            errors,
            sessions,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record the instrument of `phase`. Phases without instrument are ignored.
    pub fn record_phase(&self, session: &BenchmarkSession, phase: Phase) {
        let Some(snapshot) = session.snapshot(phase.kind()) else {
            return;
        };

        let phase_label = phase.to_string();
        let labels = [session.engine_name(), phase_label.as_str()];

        self.phase_speed
            .with_label_values(&labels)
            .set(snapshot.average_speed);
        self.phase_elapsed
            .with_label_values(&labels)
            .set(snapshot.elapsed.as_secs_f64());
        self.phase_records
            .with_label_values(&labels)
            .set(saturating_i64(snapshot.records));
        self.phase_peak_working_set
            .with_label_values(&labels)
            .set(saturating_i64(snapshot.peak_working_set));
    }

    pub fn record_error(&self, engine: &str, error: &BenchmarkError) {
        self.errors.with_label_values(&[engine, error.kind()]).inc();
    }

    pub fn error_count(&self, engine: &str, kind: &str) -> u64 {
        self.errors.with_label_values(&[engine, kind]).get()
    }

    pub fn session_count(&self) -> u64 {
        self.sessions.get()
    }

    /// Export metrics in Prometheus format
    pub fn export_prometheus(&self) -> Result<String> {
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        Ok(encoder.encode_to_string(&metric_families)?)
    }

    /// Reset all metrics
    pub fn reset(&self) {
        self.phase_speed.reset();
        self.phase_elapsed.reset();
        self.phase_records.reset();
        self.phase_peak_working_set.reset();
        self.engine_size.reset();
        self.errors.reset();
        self.sessions.reset();
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl SuiteObserver for BenchmarkMetrics {
    fn on_phase_completed(&self, session: &BenchmarkSession, phase: Phase, _outcome: PhaseOutcome) {
        self.record_phase(session, phase);
    }

    fn on_exception(&self, error: &BenchmarkError, session: &BenchmarkSession) {
        self.record_error(session.engine_name(), error);
    }

    fn on_session_finished(&self, session: &BenchmarkSession) {
        self.engine_size
            .with_label_values(&[session.engine_name()])
            .set(saturating_i64(session.engine_size()));
        self.sessions.inc();
    }
}
