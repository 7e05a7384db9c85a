//! The storage engine contract consumed by benchmark sessions
//!
//! A session never looks inside a [`Tick`]; it only needs the `i64` key to verify read
//! ordering. Engines receive each flow as a lazy iterator and hand back their whole content
//! as another lazy iterator, so neither side has to buffer the dataset.

use crate::error::{StorageError, StorageResult};

/// A market quote, the record type pushed through every engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub symbol: &'static str,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    pub bid: f64,
    pub ask: f64,
    pub bid_size: i32,
    pub ask_size: i32,
    pub provider: &'static str,
}

/// A keyed record as it travels between generator, session and engine.
pub type Record = (i64, Tick);

/// Lazy stream returned by [`StorageEngine::read`].
pub type RecordStream<'a> = Box<dyn Iterator<Item = StorageResult<Record>> + 'a>;

/// Capability interface every benchmarked engine implements.
///
/// The session shares one engine across all writer workers, so implementations must be
/// `Send + Sync` and do any serialization they need internally.
pub trait StorageEngine: Send + Sync {
    /// Human readable engine name used in logs and reports
    fn name(&self) -> &str;

    /// Prepare per-flow resources before any record is written.
    fn init(&self, flow_count: usize, record_count: u64) -> StorageResult<()>;

    /// Consume one flow completely. Called concurrently, once per flow index.
    fn write(&self, flow_index: usize, flow: &mut dyn Iterator<Item = Record>) -> StorageResult<()>;

    /// Stream back every stored record. The session expects strictly ascending keys.
    fn read(&self) -> StorageResult<RecordStream<'_>>;

    /// Current durable footprint in bytes. Must not modify the engine.
    fn size(&self) -> StorageResult<u64>;

    /// Release every resource held by the engine. Called once.
    fn finish(&self) -> StorageResult<()>;
}

/// Reject a flow index outside of what `init` prepared.
pub fn check_flow_index(index: usize, flow_count: usize) -> StorageResult<()> {
    if index >= flow_count {
        return Err(StorageError::InvalidFlow { index, flow_count });
    }
    Ok(())
}
