//! Sorted in-memory engine

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::codec::RECORD_WIDTH;
use crate::engine::{check_flow_index, Record, RecordStream, StorageEngine, Tick};
use crate::error::{StorageError, StorageResult};

/// Records are inserted and read back under the lock in batches of this size.
const BATCH_SIZE: usize = 4096;

#[derive(Default)]
struct MemoryState {
    records: BTreeMap<i64, Tick>,
    flow_count: Option<usize>,
    closed: bool,
}

/// `BTreeMap` backed engine. Reads are always key ordered; a duplicated key keeps the last
/// written tick.
pub struct MemoryEngine {
    name: String,
    state: Mutex<MemoryState>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::with_name("Memory")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_state(&self) -> StorageResult<MutexGuard<'_, MemoryState>> {
        let state = self.state();
        if state.closed {
            return Err(StorageError::Closed);
        }
        Ok(state)
    }

    fn insert(&self, batch: &mut Vec<Record>) -> StorageResult<()> {
        let mut state = self.open_state()?;
        state.records.extend(batch.drain(..));
        Ok(())
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine for MemoryEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&self, flow_count: usize, _record_count: u64) -> StorageResult<()> {
        let mut state = self.open_state()?;
        state.records.clear();
        state.flow_count = Some(flow_count);
        Ok(())
    }

    fn write(&self, flow_index: usize, flow: &mut dyn Iterator<Item = Record>) -> StorageResult<()> {
        let flow_count = self.open_state()?.flow_count.ok_or(StorageError::NotInitialized)?;
        check_flow_index(flow_index, flow_count)?;

        let mut batch = Vec::with_capacity(BATCH_SIZE);
        let mut written = 0u64;
        for record in flow {
            batch.push(record);
            written += 1;
            if batch.len() == BATCH_SIZE {
                self.insert(&mut batch)?;
            }
        }
        self.insert(&mut batch)?;

        debug!("{} flow {} wrote {} records", self.name, flow_index, written);
        Ok(())
    }

    fn read(&self) -> StorageResult<RecordStream<'_>> {
        drop(self.open_state()?);
        Ok(Box::new(BatchCursor {
            engine: self,
            batch: Vec::new().into_iter(),
            from: Bound::Unbounded,
            done: false,
        }))
    }

    fn size(&self) -> StorageResult<u64> {
        Ok((self.len() * RECORD_WIDTH) as u64)
    }

    fn finish(&self) -> StorageResult<()> {
        let mut state = self.open_state()?;
        state.closed = true;
        state.records.clear();
        Ok(())
    }
}

/// Walks the map by key range, holding the lock for one batch at a time.
struct BatchCursor<'a> {
    engine: &'a MemoryEngine,
    batch: std::vec::IntoIter<Record>,
    from: Bound<i64>,
    done: bool,
}

impl BatchCursor<'_> {
    fn refill(&mut self) -> StorageResult<()> {
        let state = self.engine.open_state()?;
        let batch: Vec<Record> = state
            .records
            .range((self.from, Bound::Unbounded))
            .take(BATCH_SIZE)
            .map(|(key, tick)| (*key, *tick))
            .collect();
        drop(state);

        match batch.last() {
            Some((key, _)) => self.from = Bound::Excluded(*key),
            None => self.done = true,
        }
        self.batch = batch.into_iter();
        Ok(())
    }
}

impl Iterator for BatchCursor<'_> {
    type Item = StorageResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.batch.next() {
                return Some(Ok(record));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.refill() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}
