//! Result export for finished sessions

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::generator::KeysType;
use crate::session::{BenchmarkSession, PhaseKind, PhaseOutcome, SessionState};

/// Serializable copy of one measured phase.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub kind: PhaseKind,
    pub name: String,
    pub outcome: Option<PhaseOutcome>,
    pub records: u64,
    pub elapsed_seconds: f64,
    pub average_speed: f64,
    pub peak_working_set: u64,
    /// `(records, records per second)` at every sample
    pub average_speeds: Vec<(u64, f64)>,
    /// `(records, records per second)` between consecutive samples
    pub moment_speeds: Vec<(u64, f64)>,
    /// `(records, bytes)`
    pub working_sets: Vec<(u64, u64)>,
}

/// Serializable copy of a session, taken once it is finished.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub engine: String,
    pub flow_count: usize,
    pub record_count: u64,
    pub randomness: f32,
    pub seed: Option<u64>,
    pub keys_type: KeysType,
    pub state: SessionState,
    pub cancelled: bool,
    pub failed: bool,
    pub init_elapsed_seconds: f64,
    pub records_read: u64,
    pub engine_size: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub phases: Vec<PhaseReport>,
}

impl SessionReport {
    pub fn from_session(session: &BenchmarkSession) -> Self {
        let phases = PhaseKind::MEASURED
            .iter()
            .filter_map(|&kind| {
                let snapshot = session.snapshot(kind)?;
                Some(PhaseReport {
                    kind,
                    name: snapshot.name.clone(),
                    outcome: session.outcome(kind),
                    records: snapshot.records,
                    elapsed_seconds: snapshot.elapsed.as_secs_f64(),
                    average_speed: snapshot.average_speed,
                    peak_working_set: snapshot.peak_working_set,
                    average_speeds: snapshot.average_speeds(),
                    moment_speeds: snapshot.moment_speeds(),
                    working_sets: snapshot.working_sets(),
                })
            })
            .collect();

        let params = session.params();
        Self {
            engine: session.engine_name().to_string(),
            flow_count: params.flow_count,
            record_count: params.record_count,
            randomness: params.randomness,
            seed: params.seed,
            keys_type: session.keys_type(),
            state: session.state(),
            cancelled: session.is_cancelled(),
            failed: session.has_failed(),
            init_elapsed_seconds: session.init_elapsed().as_secs_f64(),
            records_read: session.records_read(),
            engine_size: session.engine_size(),
            started_at: session.started_at(),
            finished_at: session.finished_at(),
            phases,
        }
    }

    pub fn phase(&self, kind: PhaseKind) -> Option<&PhaseReport> {
        self.phases.iter().find(|phase| phase.kind == kind)
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    engine: &'a str,
    keys_type: KeysType,
    flow_count: usize,
    record_count: u64,
    phase: &'a str,
    outcome: String,
    records: u64,
    elapsed_seconds: f64,
    average_speed: f64,
    peak_working_set: u64,
    engine_size: u64,
}

pub fn to_json(reports: &[SessionReport]) -> Result<String> {
    Ok(serde_json::to_string_pretty(reports)?)
}

/// One row per session and measured phase.
pub fn to_csv(reports: &[SessionReport]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    for report in reports {
        for phase in &report.phases {
            writer.serialize(CsvRow {
                engine: &report.engine,
                keys_type: report.keys_type,
                flow_count: report.flow_count,
                record_count: report.record_count,
                phase: &phase.name,
                outcome: phase
                    .outcome
                    .map(|outcome| format!("{:?}", outcome))
                    .unwrap_or_default(),
                records: phase.records,
                elapsed_seconds: phase.elapsed_seconds,
                average_speed: phase.average_speed,
                peak_working_set: phase.peak_working_set,
                engine_size: report.engine_size,
            })?;
        }
    }

    let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}

/// Default file name for a report written at `at`.
pub fn file_name(at: DateTime<Utc>, extension: &str) -> String {
    format!("tickbench_{}.{}", at.format("%Y%m%d_%H%M%S"), extension)
}
