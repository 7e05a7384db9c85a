//! File-per-flow engine
//!
//! Every flow is appended to its own file in the data directory. Reading merges the flow
//! files by key, so the stream is ordered only when every flow was written in key order.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};
use walkdir::WalkDir;

use super::codec::{self, RECORD_WIDTH};
use crate::engine::{check_flow_index, Record, RecordStream, StorageEngine};
use crate::error::{StorageError, StorageResult};

const FLOW_FILE_EXTENSION: &str = "tick";

#[derive(Default)]
struct FlowFileState {
    flow_count: Option<usize>,
    closed: bool,
}

pub struct FlowFileEngine {
    name: String,
    directory: PathBuf,
    state: Mutex<FlowFileState>,
}

impl FlowFileEngine {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self::with_name("FlowFile", directory)
    }

    pub fn with_name(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
            state: Mutex::new(FlowFileState::default()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn flow_path(&self, flow_index: usize) -> PathBuf {
        self.directory
            .join(format!("flow-{:04}.{}", flow_index, FLOW_FILE_EXTENSION))
    }

    fn is_flow_file(path: &Path) -> bool {
        path.extension().and_then(|ext| ext.to_str()) == Some(FLOW_FILE_EXTENSION)
    }

    /// Removes flow files left in the directory by an earlier run.
    fn remove_stale_flows(&self) -> StorageResult<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if path.is_file() && Self::is_flow_file(&path) {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn state(&self) -> MutexGuard<'_, FlowFileState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flow_count(&self) -> StorageResult<usize> {
        let state = self.state();
        if state.closed {
            return Err(StorageError::Closed);
        }
        state.flow_count.ok_or(StorageError::NotInitialized)
    }
}

impl StorageEngine for FlowFileEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&self, flow_count: usize, _record_count: u64) -> StorageResult<()> {
        let mut state = self.state();
        if state.closed {
            return Err(StorageError::Closed);
        }

        fs::create_dir_all(&self.directory)?;
        let removed = self.remove_stale_flows()?;
        if removed > 0 {
            debug!("{} removed {} stale flow files", self.name, removed);
        }
        for index in 0..flow_count {
            File::create(self.flow_path(index))?;
        }

        info!(
            "{} prepared {} flow files in {}",
            self.name,
            flow_count,
            self.directory.display()
        );
        state.flow_count = Some(flow_count);
        Ok(())
    }

    fn write(&self, flow_index: usize, flow: &mut dyn Iterator<Item = Record>) -> StorageResult<()> {
        check_flow_index(flow_index, self.flow_count()?)?;

        let file = fs::OpenOptions::new()
            .append(true)
            .open(self.flow_path(flow_index))?;
        let mut writer = BufWriter::new(file);

        let mut buf = [0u8; RECORD_WIDTH];
        let mut written = 0u64;
        for record in flow {
            codec::encode(&record, &mut buf)?;
            writer.write_all(&buf)?;
            written += 1;
        }
        writer.flush()?;

        debug!("{} flow {} wrote {} records", self.name, flow_index, written);
        Ok(())
    }

    fn read(&self) -> StorageResult<RecordStream<'_>> {
        let flow_count = self.flow_count()?;

        let mut readers = Vec::with_capacity(flow_count);
        for index in 0..flow_count {
            let path = self.flow_path(index);
            let file = File::open(&path)?;
            readers.push(FlowReader {
                reader: BufReader::new(file),
                location: path.display().to_string(),
            });
        }

        Ok(Box::new(MergedFlows::new(readers)))
    }

    fn size(&self) -> StorageResult<u64> {
        if !self.directory.exists() {
            return Ok(0);
        }

        let mut total = 0u64;
        for entry in WalkDir::new(&self.directory) {
            let entry = entry.map_err(|e| StorageError::engine(e.to_string()))?;
            if entry.file_type().is_file() && Self::is_flow_file(entry.path()) {
                let metadata = entry.metadata().map_err(|e| StorageError::engine(e.to_string()))?;
                total += metadata.len();
            }
        }
        Ok(total)
    }

    fn finish(&self) -> StorageResult<()> {
        let mut state = self.state();
        if state.closed {
            return Err(StorageError::Closed);
        }
        state.closed = true;
        Ok(())
    }
}

struct FlowReader {
    reader: BufReader<File>,
    location: String,
}

impl FlowReader {
    /// Next record of the file; `None` at a clean end of file.
    fn next_record(&mut self) -> Option<StorageResult<Record>> {
        let mut buf = [0u8; RECORD_WIDTH];
        let mut filled = 0;

        while filled < RECORD_WIDTH {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }

        match filled {
            0 => None,
            RECORD_WIDTH => Some(codec::decode(&buf, &self.location)),
            partial => Some(Err(StorageError::Corrupted {
                location: self.location.clone(),
                reason: format!("truncated record of {} bytes", partial),
            })),
        }
    }
}

/// k-way merge of the flow files on the record key.
struct MergedFlows {
    readers: Vec<FlowReader>,
    heads: Vec<Option<Record>>,
    heap: BinaryHeap<Reverse<(i64, usize)>>,
    primed: bool,
    pending_error: Option<StorageError>,
    failed: bool,
}

impl MergedFlows {
    fn new(readers: Vec<FlowReader>) -> Self {
        let heads = vec![None; readers.len()];
        Self {
            readers,
            heads,
            heap: BinaryHeap::new(),
            primed: false,
            pending_error: None,
            failed: false,
        }
    }

    fn advance(&mut self, index: usize) -> StorageResult<()> {
        if let Some(record) = self.readers[index].next_record().transpose()? {
            self.heap.push(Reverse((record.0, index)));
            self.heads[index] = Some(record);
        }
        Ok(())
    }

    fn prime(&mut self) -> StorageResult<()> {
        self.primed = true;
        for index in 0..self.readers.len() {
            self.advance(index)?;
        }
        Ok(())
    }
}

impl Iterator for MergedFlows {
    type Item = StorageResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending_error.take() {
            self.failed = true;
            return Some(Err(e));
        }
        if self.failed {
            return None;
        }

        if !self.primed {
            if let Err(e) = self.prime() {
                self.failed = true;
                return Some(Err(e));
            }
        }

        let Reverse((_, index)) = self.heap.pop()?;
        let record = self.heads[index].take()?;

        // The failure belongs after the record already taken.
        if let Err(e) = self.advance(index) {
            self.pending_error = Some(e);
        }

        Some(Ok(record))
    }
}
