use std::time::{Duration, Instant};

use super::{
    average_speeds, moment_speeds, peak_working_set, MemorySample, Probe, Sample, SpeedSample,
    INTERVAL_COUNT,
};

/// Fixed-capacity time series fed one record at a time.
///
/// `add()` is not synchronized; an instrument shared by several writers must sit behind a
/// lock so samples are appended in increasing record order.
pub struct IntervalStatistic<P: Probe> {
    probe: P,
    capacity: usize,
    step: u64,
    count: u64,
    samples: Vec<Sample<P::Value>>,
    started_at: Option<Instant>,
    frozen: Option<Duration>,
}

impl<P: Probe> IntervalStatistic<P> {
    /// Create a statistic sized for a phase of `record_count` records.
    pub fn new(probe: P, record_count: u64) -> Self {
        Self::with_capacity(probe, record_count, INTERVAL_COUNT)
    }

    pub fn with_capacity(probe: P, record_count: u64, capacity: usize) -> Self {
        let step = if capacity == 0 {
            0
        } else {
            record_count / capacity as u64
        };

        Self {
            probe,
            capacity,
            step,
            count: 0,
            samples: Vec::with_capacity(capacity),
            started_at: None,
            frozen: None,
        }
    }

    /// Mark the elapsed-time origin and restart the running count.
    ///
    /// Samples stored by a previous run are kept.
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
        self.frozen = None;
        self.count = 0;
    }

    /// Freeze elapsed time; later `add()` calls are ignored until the next `start()`.
    pub fn stop(&mut self) {
        if let Some(started_at) = self.started_at {
            if self.frozen.is_none() {
                self.frozen = Some(started_at.elapsed());
            }
        }
    }

    /// Count one record and sample at the interval boundary.
    pub fn add(&mut self) {
        if !self.is_running() {
            return;
        }

        self.count += 1;

        if self.samples.len() >= self.capacity {
            return;
        }

        if self.step == 0 || self.count % self.step == 0 {
            let value = self.probe.observe(self.elapsed());
            self.samples.push(Sample::new(self.count, value));
        }
    }

    /// Drop every stored sample and the running count.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.count = 0;
        self.started_at = None;
        self.frozen = None;
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some() && self.frozen.is_none()
    }

    pub fn elapsed(&self) -> Duration {
        match (self.frozen, self.started_at) {
            (Some(frozen), _) => frozen,
            (None, Some(started_at)) => started_at.elapsed(),
            (None, None) => Duration::ZERO,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn samples(&self) -> &[Sample<P::Value>] {
        &self.samples
    }
}

impl<P: Probe<Value = Duration>> IntervalStatistic<P> {
    /// Records per second over the whole run.
    pub fn average_speed(&self) -> f64 {
        let seconds = self.elapsed().as_secs_f64();
        if seconds > 0.0 {
            self.count as f64 / seconds
        } else {
            0.0
        }
    }

    pub fn average_speeds(&self) -> Vec<(u64, f64)> {
        average_speeds(self.speed_samples())
    }

    pub fn moment_speeds(&self) -> Vec<(u64, f64)> {
        moment_speeds(self.speed_samples())
    }

    fn speed_samples(&self) -> &[SpeedSample] {
        &self.samples
    }
}

impl<P: Probe<Value = u64>> IntervalStatistic<P> {
    pub fn peak_working_set(&self) -> u64 {
        peak_working_set(self.memory_samples())
    }

    fn memory_samples(&self) -> &[MemorySample] {
        &self.samples
    }
}
