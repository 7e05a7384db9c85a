//! Bounded interval statistics for benchmark phases
//!
//! A phase may push millions of records through an engine, but only a fixed number of
//! observations is kept per phase: the sampler stores one [`Sample`] every
//! `record_count / INTERVAL_COUNT` records and never more than [`INTERVAL_COUNT`] of them.
//! Speed and memory samplers share that policy and differ only in the [`Probe`] that
//! produces the observed value.

pub mod instrument;
pub mod interval;

use std::fmt;
use std::time::Duration;

pub use instrument::{InstrumentSnapshot, PerformanceInstrument};
pub use interval::IntervalStatistic;

/// Maximum number of samples stored by one statistic.
pub const INTERVAL_COUNT: usize = 100;

/// One stored observation: cumulative record count at the sampling boundary and the
/// value the probe reported there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample<V> {
    pub records: u64,
    pub value: V,
}

impl<V> Sample<V> {
    pub fn new(records: u64, value: V) -> Self {
        Self { records, value }
    }
}

/// Speed samples carry the elapsed time since the phase started.
pub type SpeedSample = Sample<Duration>;

/// Memory samples carry the process working set in bytes.
pub type MemorySample = Sample<u64>;

/// Source of the value recorded at a sampling boundary.
pub trait Probe: Send {
    type Value: Copy + fmt::Debug + Send + 'static;

    /// Observe the current value. `elapsed` is the time since the statistic was started.
    fn observe(&mut self, elapsed: Duration) -> Self::Value;
}

impl<P: Probe + ?Sized> Probe for Box<P> {
    type Value = P::Value;

    fn observe(&mut self, elapsed: Duration) -> Self::Value {
        (**self).observe(elapsed)
    }
}

/// Probe for the speed statistic: the sample value is the elapsed time itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct ElapsedProbe;

impl Probe for ElapsedProbe {
    type Value = Duration;

    fn observe(&mut self, elapsed: Duration) -> Duration {
        elapsed
    }
}

pub type SpeedStatistic = IntervalStatistic<ElapsedProbe>;

pub type MemoryStatistic = IntervalStatistic<Box<dyn Probe<Value = u64>>>;

/// Cumulative throughput at sample `index`: `records[i] / elapsed[i]`, in records/sec.
///
/// Returns `None` when the index is out of range or the sample carries no elapsed time.
pub fn average_speed_at(samples: &[SpeedSample], index: usize) -> Option<f64> {
    let sample = samples.get(index)?;
    let seconds = sample.value.as_secs_f64();
    if seconds <= 0.0 {
        return None;
    }
    Some(sample.records as f64 / seconds)
}

/// Throughput between sample `index - 1` and `index`, in records/sec.
///
/// Not defined for the first sample; returns `None` there, out of range, or when two
/// samples share the same timestamp.
pub fn moment_speed_at(samples: &[SpeedSample], index: usize) -> Option<f64> {
    if index == 0 {
        return None;
    }
    let current = samples.get(index)?;
    let previous = samples.get(index - 1)?;

    let seconds = current.value.as_secs_f64() - previous.value.as_secs_f64();
    if seconds <= 0.0 {
        return None;
    }
    Some(current.records.saturating_sub(previous.records) as f64 / seconds)
}

/// `(records, average speed)` for every sample where the speed is defined.
pub fn average_speeds(samples: &[SpeedSample]) -> Vec<(u64, f64)> {
    (0..samples.len())
        .filter_map(|i| average_speed_at(samples, i).map(|speed| (samples[i].records, speed)))
        .collect()
}

/// `(records, moment speed)` from the second sample on.
pub fn moment_speeds(samples: &[SpeedSample]) -> Vec<(u64, f64)> {
    (1..samples.len())
        .filter_map(|i| moment_speed_at(samples, i).map(|speed| (samples[i].records, speed)))
        .collect()
}

/// Largest working set ever sampled, or 0 with no samples.
pub fn peak_working_set(samples: &[MemorySample]) -> u64 {
    samples.iter().map(|s| s.value).max().unwrap_or(0)
}
