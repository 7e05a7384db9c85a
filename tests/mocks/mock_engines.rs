//! Storage engines with injected misbehavior, all backed by a `MemoryEngine`

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tickbench::engine::{Record, RecordStream, StorageEngine};
use tickbench::error::{StorageError, StorageResult};
use tickbench::MemoryEngine;
use tokio_util::sync::CancellationToken;

/// Returns the stored records with two adjacent keys swapped.
pub struct ShufflingEngine {
    inner: MemoryEngine,
    swap_at: usize,
}

impl ShufflingEngine {
    /// Swap the records at positions `swap_at` and `swap_at + 1` of every read.
    pub fn new(swap_at: usize) -> Self {
        Self {
            inner: MemoryEngine::with_name("Shuffling"),
            swap_at,
        }
    }
}

impl StorageEngine for ShufflingEngine {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn init(&self, flow_count: usize, record_count: u64) -> StorageResult<()> {
        self.inner.init(flow_count, record_count)
    }

    fn write(&self, flow_index: usize, flow: &mut dyn Iterator<Item = Record>) -> StorageResult<()> {
        self.inner.write(flow_index, flow)
    }

    fn read(&self) -> StorageResult<RecordStream<'_>> {
        let mut records = self.inner.read()?.collect::<StorageResult<Vec<_>>>()?;
        if self.swap_at + 1 < records.len() {
            records.swap(self.swap_at, self.swap_at + 1);
        }
        Ok(Box::new(records.into_iter().map(Ok)))
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn finish(&self) -> StorageResult<()> {
        self.inner.finish()
    }
}

/// Where a [`FailingEngine`] reports its error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    Init,
    /// Fails the given flow after it wrote its first ten records
    Write { flow_index: usize },
    Read,
    Size,
}

pub struct FailingEngine {
    inner: MemoryEngine,
    point: FailurePoint,
    finished: AtomicBool,
}

impl FailingEngine {
    pub fn new(point: FailurePoint) -> Self {
        Self {
            inner: MemoryEngine::with_name("Failing"),
            point,
            finished: AtomicBool::new(false),
        }
    }

    /// Whether `finish()` has been called.
    pub fn was_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn injected(&self) -> StorageError {
        StorageError::engine(format!("injected failure at {:?}", self.point))
    }
}

impl StorageEngine for FailingEngine {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn init(&self, flow_count: usize, record_count: u64) -> StorageResult<()> {
        if self.point == FailurePoint::Init {
            return Err(self.injected());
        }
        self.inner.init(flow_count, record_count)
    }

    fn write(&self, flow_index: usize, flow: &mut dyn Iterator<Item = Record>) -> StorageResult<()> {
        if self.point == (FailurePoint::Write { flow_index }) {
            let mut head = flow.take(10);
            self.inner.write(flow_index, &mut head)?;
            return Err(self.injected());
        }
        self.inner.write(flow_index, flow)
    }

    fn read(&self) -> StorageResult<RecordStream<'_>> {
        if self.point == FailurePoint::Read {
            return Err(self.injected());
        }
        self.inner.read()
    }

    fn size(&self) -> StorageResult<u64> {
        if self.point == FailurePoint::Size {
            return Err(self.injected());
        }
        self.inner.size()
    }

    fn finish(&self) -> StorageResult<()> {
        self.finished.store(true, Ordering::SeqCst);
        self.inner.finish()
    }
}

/// Phase during which a [`CancellingEngine`] pulls the plug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelDuring {
    Write,
    Read,
}

/// Cancels the session token once a number of records went through the engine, the way an
/// operator pressing Ctrl-C would.
pub struct CancellingEngine {
    inner: MemoryEngine,
    token: CancellationToken,
    during: CancelDuring,
    cancel_after: u64,
    seen: AtomicU64,
}

impl CancellingEngine {
    pub fn new(token: CancellationToken, during: CancelDuring, cancel_after: u64) -> Self {
        Self {
            inner: MemoryEngine::with_name("Cancelling"),
            token,
            during,
            cancel_after,
            seen: AtomicU64::new(0),
        }
    }

    fn observe(&self) {
        if self.seen.fetch_add(1, Ordering::SeqCst) + 1 == self.cancel_after {
            self.token.cancel();
        }
    }
}

impl StorageEngine for CancellingEngine {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn init(&self, flow_count: usize, record_count: u64) -> StorageResult<()> {
        self.inner.init(flow_count, record_count)
    }

    fn write(&self, flow_index: usize, flow: &mut dyn Iterator<Item = Record>) -> StorageResult<()> {
        if self.during != CancelDuring::Write {
            return self.inner.write(flow_index, flow);
        }
        let mut observed = flow.inspect(|_| self.observe());
        self.inner.write(flow_index, &mut observed)
    }

    fn read(&self) -> StorageResult<RecordStream<'_>> {
        let stream = self.inner.read()?;
        if self.during != CancelDuring::Read {
            return Ok(stream);
        }
        Ok(Box::new(stream.inspect(move |_| self.observe())))
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn finish(&self) -> StorageResult<()> {
        self.inner.finish()
    }
}

/// Fails to release its resources.
pub struct CloseFailingEngine {
    inner: MemoryEngine,
}

impl CloseFailingEngine {
    pub fn new() -> Self {
        Self {
            inner: MemoryEngine::with_name("CloseFailing"),
        }
    }
}

impl Default for CloseFailingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine for CloseFailingEngine {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn init(&self, flow_count: usize, record_count: u64) -> StorageResult<()> {
        self.inner.init(flow_count, record_count)
    }

    fn write(&self, flow_index: usize, flow: &mut dyn Iterator<Item = Record>) -> StorageResult<()> {
        self.inner.write(flow_index, flow)
    }

    fn read(&self) -> StorageResult<RecordStream<'_>> {
        self.inner.read()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn finish(&self) -> StorageResult<()> {
        self.inner.finish()?;
        Err(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "handle still in use",
        )))
    }
}
