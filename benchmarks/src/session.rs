//! Benchmark session: one engine driven through Init, Write, Read, SecondaryRead, Finish
//!
//! Every measured phase owns a [`PerformanceInstrument`]. Workers run on tokio's blocking
//! pool because the engine contract is synchronous; the session itself stays async so it
//! can watch the cancellation token while it waits for them.
//!
//! A phase that ends early (cancellation, unordered read stream, engine failure) never
//! leaves partial samples behind: its instrument is reset before the session moves on.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::{Record, StorageEngine};
use crate::error::{BenchmarkError, Result, StorageError, StorageResult};
use crate::generator::{self, KeysType};
use crate::monitoring::ProcessMemoryProbe;
use crate::statistics::{InstrumentSnapshot, PerformanceInstrument, Probe};

/// Instrument slot of a session. `None` means no measured phase is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseKind {
    None,
    Write,
    Read,
    SecondaryRead,
}

impl PhaseKind {
    /// Every kind that owns an instrument, in execution order.
    pub const MEASURED: [PhaseKind; 3] = [PhaseKind::Write, PhaseKind::Read, PhaseKind::SecondaryRead];

    fn slot(self) -> Option<usize> {
        match self {
            PhaseKind::None => None,
            PhaseKind::Write => Some(0),
            PhaseKind::Read => Some(1),
            PhaseKind::SecondaryRead => Some(2),
        }
    }

    /// Instrument name, as shown in reports.
    pub fn title(self) -> &'static str {
        match self {
            PhaseKind::None => "None",
            PhaseKind::Write => "Full Write",
            PhaseKind::Read => "Full Read",
            PhaseKind::SecondaryRead => "Full Secondary Read",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            PhaseKind::None => 0,
            PhaseKind::Write => 1,
            PhaseKind::Read => 2,
            PhaseKind::SecondaryRead => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => PhaseKind::Write,
            2 => PhaseKind::Read,
            3 => PhaseKind::SecondaryRead,
            _ => PhaseKind::None,
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseKind::None => write!(f, "none"),
            PhaseKind::Write => write!(f, "write"),
            PhaseKind::Read => write!(f, "read"),
            PhaseKind::SecondaryRead => write!(f, "secondary_read"),
        }
    }
}

/// A named stage of a session, including the unmeasured Init and Finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Init,
    Write,
    Read,
    SecondaryRead,
    Finish,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Init,
        Phase::Write,
        Phase::Read,
        Phase::SecondaryRead,
        Phase::Finish,
    ];

    /// Instrument the stage is timed under. Init shares the Write instrument.
    pub fn kind(self) -> PhaseKind {
        match self {
            Phase::Init | Phase::Write => PhaseKind::Write,
            Phase::Read => PhaseKind::Read,
            Phase::SecondaryRead => PhaseKind::SecondaryRead,
            Phase::Finish => PhaseKind::None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Init => write!(f, "init"),
            Phase::Write => write!(f, "write"),
            Phase::Read => write!(f, "read"),
            Phase::SecondaryRead => write!(f, "secondary_read"),
            Phase::Finish => write!(f, "finish"),
        }
    }
}

/// Last stage a session went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Init,
    Write,
    Read,
    SecondaryRead,
    Finished,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Init => write!(f, "init"),
            SessionState::Write => write!(f, "write"),
            SessionState::Read => write!(f, "read"),
            SessionState::SecondaryRead => write!(f, "secondary_read"),
            SessionState::Finished => write!(f, "finished"),
        }
    }
}

/// How a measured phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseOutcome {
    Completed,
    Cancelled,
    /// Not run because an earlier phase of the session failed.
    Skipped,
    OrderingViolation,
    Failed,
}

impl PhaseOutcome {
    pub(crate) fn from_error(error: &BenchmarkError) -> Self {
        if error.is_ordering_violation() {
            PhaseOutcome::OrderingViolation
        } else {
            PhaseOutcome::Failed
        }
    }
}

/// Workload parameters of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionParams {
    pub flow_count: usize,
    /// Total number of records, split across flows
    pub record_count: u64,
    /// 0 for strictly ascending keys, up to 1 for fully random keys
    pub randomness: f32,
    /// Makes the generated flows reproducible
    pub seed: Option<u64>,
}

impl SessionParams {
    pub fn new(flow_count: usize, record_count: u64, randomness: f32) -> Self {
        Self {
            flow_count,
            record_count,
            randomness,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn keys_type(&self) -> KeysType {
        KeysType::from_randomness(self.randomness)
    }
}

pub type SharedInstrument = Arc<Mutex<PerformanceInstrument>>;

/// Lock an instrument, recovering it if a worker panicked while holding the lock.
pub(crate) fn lock(instrument: &Mutex<PerformanceInstrument>) -> MutexGuard<'_, PerformanceInstrument> {
    instrument.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Iterator adapter between a record source and its consumer.
///
/// Before handing out a record it checks the cancellation token; once the consumer asks
/// for the following record (or drops the adapter) the previous record is counted on the
/// instrument. This is the only place where worker threads take the instrument lock.
pub struct InstrumentedFlow<I> {
    inner: I,
    cancellation: CancellationToken,
    instrument: SharedInstrument,
    pending: bool,
}

impl<I> InstrumentedFlow<I> {
    pub fn new(inner: I, cancellation: CancellationToken, instrument: SharedInstrument) -> Self {
        Self {
            inner,
            cancellation,
            instrument,
            pending: false,
        }
    }

    fn account(&mut self) {
        if std::mem::take(&mut self.pending) {
            lock(&self.instrument).add();
        }
    }
}

impl<I: Iterator> Iterator for InstrumentedFlow<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        self.account();

        if self.cancellation.is_cancelled() {
            return None;
        }

        let item = self.inner.next()?;
        self.pending = true;
        Some(item)
    }
}

impl<I> Drop for InstrumentedFlow<I> {
    fn drop(&mut self) {
        self.account();
    }
}

/// Count the records of a read stream, failing on the first key that is not strictly
/// greater than its predecessor.
pub fn verify_order<I>(phase: Phase, records: I) -> Result<u64>
where
    I: Iterator<Item = StorageResult<Record>>,
{
    let mut previous: Option<i64> = None;
    let mut count = 0u64;

    for record in records {
        let (key, _) = record.map_err(|source| BenchmarkError::Backend { phase, source })?;

        if let Some(previous) = previous {
            if key <= previous {
                return Err(BenchmarkError::KeyOrderingViolation {
                    previous,
                    key,
                    records_read: count,
                });
            }
        }

        previous = Some(key);
        count += 1;
    }

    Ok(count)
}

/// Read-only view of a running session, safe to poll from another task.
#[derive(Clone)]
pub struct SessionMonitor {
    engine_name: String,
    record_count: u64,
    current: Arc<AtomicU8>,
    instruments: [SharedInstrument; 3],
}

impl SessionMonitor {
    pub fn engine_name(&self) -> &str {
        &self.engine_name
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub fn current_phase(&self) -> PhaseKind {
        PhaseKind::from_u8(self.current.load(Ordering::Acquire))
    }

    pub fn snapshot(&self, kind: PhaseKind) -> Option<InstrumentSnapshot> {
        kind.slot().map(|slot| lock(&self.instruments[slot]).snapshot())
    }

    /// Snapshot of the running phase, if any.
    pub fn current(&self) -> Option<InstrumentSnapshot> {
        self.snapshot(self.current_phase())
    }
}

/// Benchmark of a single storage engine.
pub struct BenchmarkSession {
    engine: Arc<dyn StorageEngine>,
    params: SessionParams,
    instruments: [SharedInstrument; 3],
    cancellation: CancellationToken,
    state: SessionState,
    current: Arc<AtomicU8>,
    outcomes: [Option<PhaseOutcome>; 3],
    failed: bool,
    engine_size: u64,
    records_read: u64,
    init_elapsed: Duration,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl BenchmarkSession {
    pub fn new(
        engine: Arc<dyn StorageEngine>,
        params: SessionParams,
        cancellation: CancellationToken,
    ) -> Self {
        Self::with_memory_probe(engine, params, cancellation, || {
            Box::new(ProcessMemoryProbe::new())
        })
    }

    /// Build a session whose memory statistics read from probes made by `probe`.
    pub fn with_memory_probe<F>(
        engine: Arc<dyn StorageEngine>,
        params: SessionParams,
        cancellation: CancellationToken,
        probe: F,
    ) -> Self
    where
        F: Fn() -> Box<dyn Probe<Value = u64>>,
    {
        let record_count = params.record_count;
        let instruments = PhaseKind::MEASURED.map(|kind| {
            Arc::new(Mutex::new(PerformanceInstrument::with_memory_probe(
                kind.title(),
                record_count,
                probe(),
            )))
        });

        Self {
            engine,
            params,
            instruments,
            cancellation,
            state: SessionState::Idle,
            current: Arc::new(AtomicU8::new(PhaseKind::None.to_u8())),
            outcomes: [None; 3],
            failed: false,
            engine_size: 0,
            records_read: 0,
            init_elapsed: Duration::ZERO,
            started_at: None,
            finished_at: None,
        }
    }

    /// Prepare the engine. Timed under the Write instrument.
    pub async fn init(&mut self) -> Result<PhaseOutcome> {
        self.advance(SessionState::Idle, SessionState::Init)?;
        self.started_at = Some(Utc::now());

        let instrument = self.shared(PhaseKind::Write);
        if self.cancellation.is_cancelled() {
            lock(&instrument).reset();
            return Ok(PhaseOutcome::Cancelled);
        }

        info!(
            "{} Init() started: {} flows, {} records",
            self.engine.name(),
            self.params.flow_count,
            self.params.record_count
        );

        lock(&instrument).start();
        self.enter(PhaseKind::Write);

        let engine = Arc::clone(&self.engine);
        let (flow_count, record_count) = (self.params.flow_count, self.params.record_count);
        let joined = self
            .wait(tokio::task::spawn_blocking(move || engine.init(flow_count, record_count)))
            .await;

        let mut guard = lock(&instrument);
        guard.stop();
        self.init_elapsed = guard.elapsed();
        self.enter(PhaseKind::None);

        let result = match joined {
            Ok(Ok(())) if self.cancellation.is_cancelled() => Ok(PhaseOutcome::Cancelled),
            Ok(Ok(())) => Ok(PhaseOutcome::Completed),
            Ok(Err(source)) => Err(BenchmarkError::Backend {
                phase: Phase::Init,
                source,
            }),
            Err(source) => Err(BenchmarkError::Worker {
                phase: Phase::Init,
                source,
            }),
        };

        if !matches!(result, Ok(PhaseOutcome::Completed)) {
            guard.reset();
        }
        drop(guard);

        if result.is_err() {
            self.failed = true;
        }

        info!("{} Init() ended in {:.2?}", self.engine.name(), self.init_elapsed);
        result
    }

    /// Write every flow concurrently, one blocking worker per flow.
    pub async fn write(&mut self) -> Result<PhaseOutcome> {
        self.advance(SessionState::Init, SessionState::Write)?;

        let instrument = self.shared(PhaseKind::Write);
        if let Some(outcome) = self.short_circuit() {
            return self.close_phase(Phase::Write, &instrument, Ok(outcome));
        }

        let flows = generator::flows(
            self.params.record_count,
            self.params.flow_count,
            self.params.randomness,
            self.params.seed,
        );

        self.enter(PhaseKind::Write);
        lock(&instrument).start();
        info!(
            "{} Write() started: {} flows, {} keys",
            self.engine.name(),
            flows.len(),
            self.params.keys_type()
        );

        let handles: Vec<_> = flows
            .into_iter()
            .enumerate()
            .map(|(index, flow)| {
                let engine = Arc::clone(&self.engine);
                let mut flow =
                    InstrumentedFlow::new(flow, self.cancellation.clone(), Arc::clone(&instrument));

                tokio::task::spawn_blocking(move || {
                    debug!("Writer for flow {} started", index);
                    let result = engine.write(index, &mut flow);
                    debug!("Writer for flow {} finished", index);
                    result
                })
            })
            .collect();

        let joined = self.wait(join_all(handles)).await;

        let mut result = Ok(PhaseOutcome::Completed);
        for (index, outcome) in joined.into_iter().enumerate() {
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(source)) => BenchmarkError::Backend {
                    phase: Phase::Write,
                    source,
                },
                Err(source) => BenchmarkError::Worker {
                    phase: Phase::Write,
                    source,
                },
            };

            if result.is_ok() {
                result = Err(failure);
            } else {
                error!("{} flow {} also failed: {}", self.engine.name(), index, failure);
            }
        }

        let result = result.and_then(|outcome| self.measure_size(Phase::Write).map(|_| outcome));
        self.close_phase(Phase::Write, &instrument, result)
    }

    /// First read pass over the engine content.
    pub async fn read(&mut self) -> Result<PhaseOutcome> {
        self.advance(SessionState::Write, SessionState::Read)?;
        self.read_phase(Phase::Read).await
    }

    /// Second read pass, measured separately to observe warmed-up behavior.
    pub async fn secondary_read(&mut self) -> Result<PhaseOutcome> {
        self.advance(SessionState::Read, SessionState::SecondaryRead)?;
        self.read_phase(Phase::SecondaryRead).await
    }

    /// Measure the final size and release the engine. Returns the size in bytes.
    ///
    /// The engine is released even if the session was cancelled; a failure to release it
    /// is reported as [`BenchmarkError::ResourceRelease`].
    pub async fn finish(&mut self) -> Result<u64> {
        self.advance(SessionState::SecondaryRead, SessionState::Finished)?;

        if self.cancellation.is_cancelled() {
            warn!(
                "{} session was cancelled, releasing the engine anyway",
                self.engine.name()
            );
        }

        let engine = Arc::clone(&self.engine);
        let joined = tokio::task::spawn_blocking(move || {
            let size = engine.size();
            let closed = engine.finish();
            (size, closed)
        })
        .await;

        self.finished_at = Some(Utc::now());

        let (size, closed) = joined.map_err(|source| BenchmarkError::Worker {
            phase: Phase::Finish,
            source,
        })?;

        closed.map_err(BenchmarkError::ResourceRelease)?;

        self.engine_size = size.map_err(|source| BenchmarkError::Backend {
            phase: Phase::Finish,
            source,
        })?;

        info!(
            "{} Finish() ended, final size {} bytes",
            self.engine.name(),
            self.engine_size
        );
        Ok(self.engine_size)
    }

    async fn read_phase(&mut self, phase: Phase) -> Result<PhaseOutcome> {
        let kind = phase.kind();
        let instrument = self.shared(kind);
        if let Some(outcome) = self.short_circuit() {
            return self.close_phase(phase, &instrument, Ok(outcome));
        }

        self.records_read = 0;
        self.enter(kind);
        lock(&instrument).start();
        info!("{} {} started", self.engine.name(), kind.title());

        let engine = Arc::clone(&self.engine);
        let cancellation = self.cancellation.clone();
        let reader_instrument = Arc::clone(&instrument);
        let handle = tokio::task::spawn_blocking(move || {
            let stream = engine
                .read()
                .map_err(|source| BenchmarkError::Backend { phase, source })?;
            verify_order(
                phase,
                InstrumentedFlow::new(stream, cancellation, reader_instrument),
            )
        });

        let joined = self.wait(handle).await;
        let result = match joined {
            Ok(Ok(count)) => {
                self.records_read = count;
                self.measure_size(phase).map(|_| PhaseOutcome::Completed)
            }
            Ok(Err(failure)) => {
                if let BenchmarkError::KeyOrderingViolation { records_read, .. } = &failure {
                    self.records_read = *records_read;
                }
                Err(failure)
            }
            Err(source) => Err(BenchmarkError::Worker { phase, source }),
        };

        info!("{} records read: {}", self.engine.name(), self.records_read);
        self.close_phase(phase, &instrument, result)
    }

    /// Await `future`, noting when cancellation is requested in the meantime.
    ///
    /// Workers only observe the token between records, so the future is always driven to
    /// completion; phases never overlap.
    async fn wait<F: Future>(&self, future: F) -> F::Output {
        tokio::pin!(future);

        tokio::select! {
            output = &mut future => output,
            _ = self.cancellation.cancelled() => {
                warn!("{} cancellation requested, waiting for workers to stop", self.engine.name());
                future.await
            }
        }
    }

    fn close_phase(
        &mut self,
        phase: Phase,
        instrument: &SharedInstrument,
        result: Result<PhaseOutcome>,
    ) -> Result<PhaseOutcome> {
        let result = match result {
            Ok(PhaseOutcome::Completed) if self.cancellation.is_cancelled() => {
                Ok(PhaseOutcome::Cancelled)
            }
            other => other,
        };

        let mut guard = lock(instrument);
        guard.stop();
        if !matches!(result, Ok(PhaseOutcome::Completed)) {
            guard.reset();
        }
        let summary = guard.snapshot().summary();
        drop(guard);

        let outcome = match &result {
            Ok(outcome) => *outcome,
            Err(failure) => {
                if !failure.is_ordering_violation() {
                    self.failed = true;
                }
                PhaseOutcome::from_error(failure)
            }
        };

        if let Some(slot) = phase.kind().slot() {
            self.outcomes[slot] = Some(outcome);
        }
        self.enter(PhaseKind::None);

        match outcome {
            PhaseOutcome::Completed => info!(
                "{} {} ended: {} records in {:.3}s ({:.0} rec/s)",
                self.engine.name(),
                summary.name,
                summary.records,
                summary.elapsed_seconds,
                summary.average_speed
            ),
            PhaseOutcome::Skipped => warn!(
                "{} {} skipped after an earlier failure",
                self.engine.name(),
                summary.name
            ),
            _ => warn!("{} {} ended as {:?}", self.engine.name(), summary.name, outcome),
        }

        result
    }

    fn measure_size(&mut self, phase: Phase) -> Result<()> {
        if self.cancellation.is_cancelled() {
            return Ok(());
        }
        self.engine_size = self
            .engine
            .size()
            .map_err(|source: StorageError| BenchmarkError::Backend { phase, source })?;
        Ok(())
    }

    fn short_circuit(&self) -> Option<PhaseOutcome> {
        if self.failed {
            Some(PhaseOutcome::Skipped)
        } else if self.cancellation.is_cancelled() {
            Some(PhaseOutcome::Cancelled)
        } else {
            None
        }
    }

    fn advance(&mut self, expected: SessionState, next: SessionState) -> Result<()> {
        if self.state != expected {
            return Err(BenchmarkError::InvalidTransition {
                expected,
                actual: self.state,
            });
        }
        self.state = next;
        Ok(())
    }

    fn enter(&self, kind: PhaseKind) {
        self.current.store(kind.to_u8(), Ordering::Release);
    }

    fn shared(&self, kind: PhaseKind) -> SharedInstrument {
        let slot = kind.slot().unwrap_or(0);
        Arc::clone(&self.instruments[slot])
    }

    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    pub fn keys_type(&self) -> KeysType {
        self.params.keys_type()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_phase(&self) -> PhaseKind {
        PhaseKind::from_u8(self.current.load(Ordering::Acquire))
    }

    pub fn outcome(&self, kind: PhaseKind) -> Option<PhaseOutcome> {
        kind.slot().and_then(|slot| self.outcomes[slot])
    }

    /// Copy of the instrument of `kind`; `None` for [`PhaseKind::None`].
    pub fn snapshot(&self, kind: PhaseKind) -> Option<InstrumentSnapshot> {
        kind.slot().map(|slot| lock(&self.instruments[slot]).snapshot())
    }

    pub fn elapsed(&self, kind: PhaseKind) -> Duration {
        self.snapshot(kind).map(|s| s.elapsed).unwrap_or_default()
    }

    pub fn records(&self, kind: PhaseKind) -> u64 {
        self.snapshot(kind).map(|s| s.records).unwrap_or(0)
    }

    pub fn average_speed(&self, kind: PhaseKind) -> f64 {
        self.snapshot(kind).map(|s| s.average_speed).unwrap_or(0.0)
    }

    pub fn peak_working_set(&self, kind: PhaseKind) -> u64 {
        self.snapshot(kind).map(|s| s.peak_working_set).unwrap_or(0)
    }

    /// Records returned by the last read phase, up to the first ordering violation.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Engine size measured after the last completed phase or by `finish()`.
    pub fn engine_size(&self) -> u64 {
        self.engine_size
    }

    pub fn init_elapsed(&self) -> Duration {
        self.init_elapsed
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Request cooperative cancellation of the running and all later phases.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn monitor(&self) -> SessionMonitor {
        SessionMonitor {
            engine_name: self.engine.name().to_string(),
            record_count: self.params.record_count,
            current: Arc::clone(&self.current),
            instruments: self.instruments.clone(),
        }
    }
}

impl fmt::Debug for BenchmarkSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BenchmarkSession")
            .field("engine", &self.engine.name())
            .field("params", &self.params)
            .field("state", &self.state)
            .field("failed", &self.failed)
            .finish()
    }
}
