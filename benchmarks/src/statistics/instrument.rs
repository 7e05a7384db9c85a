use std::time::Duration;

use serde::Serialize;

use super::{
    ElapsedProbe, IntervalStatistic, MemorySample, MemoryStatistic, Probe, SpeedSample,
    SpeedStatistic,
};
use crate::monitoring::ProcessMemoryProbe;

/// Speed and memory statistics of one phase, driven through a single lifecycle.
pub struct PerformanceInstrument {
    name: String,
    speed: SpeedStatistic,
    memory: MemoryStatistic,
}

impl PerformanceInstrument {
    /// Instrument sampling the working set of the current process.
    pub fn new(name: impl Into<String>, record_count: u64) -> Self {
        Self::with_memory_probe(name, record_count, Box::new(ProcessMemoryProbe::new()))
    }

    pub fn with_memory_probe(
        name: impl Into<String>,
        record_count: u64,
        memory_probe: Box<dyn Probe<Value = u64>>,
    ) -> Self {
        Self {
            name: name.into(),
            speed: IntervalStatistic::new(ElapsedProbe, record_count),
            memory: IntervalStatistic::new(memory_probe, record_count),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&mut self) {
        self.speed.start();
        self.memory.start();
    }

    pub fn stop(&mut self) {
        self.speed.stop();
        self.memory.stop();
    }

    pub fn add(&mut self) {
        self.speed.add();
        self.memory.add();
    }

    pub fn reset(&mut self) {
        self.speed.reset();
        self.memory.reset();
    }

    pub fn is_running(&self) -> bool {
        self.speed.is_running()
    }

    pub fn speed(&self) -> &SpeedStatistic {
        &self.speed
    }

    pub fn memory(&self) -> &MemoryStatistic {
        &self.memory
    }

    pub fn elapsed(&self) -> Duration {
        self.speed.elapsed()
    }

    pub fn records(&self) -> u64 {
        self.speed.count()
    }

    pub fn average_speed(&self) -> f64 {
        self.speed.average_speed()
    }

    pub fn peak_working_set(&self) -> u64 {
        self.memory.peak_working_set()
    }

    /// Copy the current state out so it can be inspected without holding the lock.
    pub fn snapshot(&self) -> InstrumentSnapshot {
        InstrumentSnapshot {
            name: self.name.clone(),
            running: self.is_running(),
            records: self.records(),
            elapsed: self.elapsed(),
            average_speed: self.average_speed(),
            peak_working_set: self.peak_working_set(),
            speed_samples: self.speed.samples().to_vec(),
            memory_samples: self.memory.samples().to_vec(),
        }
    }
}

/// Point-in-time copy of an instrument.
#[derive(Debug, Clone)]
pub struct InstrumentSnapshot {
    pub name: String,
    pub running: bool,
    pub records: u64,
    pub elapsed: Duration,
    pub average_speed: f64,
    pub peak_working_set: u64,
    pub speed_samples: Vec<SpeedSample>,
    pub memory_samples: Vec<MemorySample>,
}

impl InstrumentSnapshot {
    pub fn is_empty(&self) -> bool {
        self.records == 0 && self.speed_samples.is_empty() && self.memory_samples.is_empty()
    }

    pub fn average_speeds(&self) -> Vec<(u64, f64)> {
        super::average_speeds(&self.speed_samples)
    }

    pub fn moment_speeds(&self) -> Vec<(u64, f64)> {
        super::moment_speeds(&self.speed_samples)
    }

    pub fn working_sets(&self) -> Vec<(u64, u64)> {
        self.memory_samples
            .iter()
            .map(|sample| (sample.records, sample.value))
            .collect()
    }

    pub fn summary(&self) -> InstrumentSummary {
        InstrumentSummary {
            name: self.name.clone(),
            records: self.records,
            elapsed_seconds: self.elapsed.as_secs_f64(),
            average_speed: self.average_speed,
            peak_working_set: self.peak_working_set,
            samples: self.speed_samples.len(),
        }
    }
}

/// Flat numbers of a snapshot, suitable for logs and CSV rows.
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentSummary {
    pub name: String,
    pub records: u64,
    pub elapsed_seconds: f64,
    pub average_speed: f64,
    pub peak_working_set: u64,
    pub samples: usize,
}
