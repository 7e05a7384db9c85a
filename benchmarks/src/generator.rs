//! Tick flow generation
//!
//! A session's records are split into one contiguous key range per flow. Inside its range
//! a flow walks the keys in ascending order; with a non-zero randomness some keys are
//! replaced by a random key of the same range, which is what makes a workload "random"
//! for the engine under test.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::engine::{Record, Tick};

pub const SYMBOLS: &[&str] = &[
    "EURUSD", "GBPUSD", "USDJPY", "USDCHF", "AUDUSD", "USDCAD", "NZDUSD", "EURGBP",
];

pub const PROVIDERS: &[&str] = &["eSignal", "Gain Capital", "Dukascopy", "FXCM", "Oanda"];

/// 2013-01-01T00:00:00Z, the timestamp of key 0.
const BASE_TIMESTAMP_MS: i64 = 1_356_998_400_000;

/// Key distribution of a workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeysType {
    Sequential,
    Random,
}

impl KeysType {
    pub fn from_randomness(randomness: f32) -> Self {
        if randomness > 0.0 {
            KeysType::Random
        } else {
            KeysType::Sequential
        }
    }
}

impl fmt::Display for KeysType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeysType::Sequential => write!(f, "sequential"),
            KeysType::Random => write!(f, "random"),
        }
    }
}

/// Key range and size assigned to one flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowPlan {
    pub index: usize,
    pub first_key: i64,
    pub record_count: u64,
}

/// Split `record_count` records into `flow_count` contiguous, disjoint key ranges.
///
/// The first `record_count % flow_count` flows receive one extra record.
pub fn partition(record_count: u64, flow_count: usize) -> Vec<FlowPlan> {
    if flow_count == 0 {
        return Vec::new();
    }

    let base = record_count / flow_count as u64;
    let extra = record_count % flow_count as u64;

    let mut first_key = 0i64;
    (0..flow_count)
        .map(|index| {
            let count = base + u64::from((index as u64) < extra);
            let plan = FlowPlan {
                index,
                first_key,
                record_count: count,
            };
            first_key += count as i64;
            plan
        })
        .collect()
}

/// Seeds of the two independent random sources behind a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowSeed {
    pub keys: u64,
    pub payload: u64,
}

impl FlowSeed {
    /// Fresh seeds from the thread-local entropy source.
    pub fn random() -> Self {
        Self {
            keys: rand::random(),
            payload: rand::random(),
        }
    }

    /// Reproducible seeds for flow `flow_index` of a seeded session.
    pub fn derived(seed: u64, flow_index: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(flow_index as u64));
        Self {
            keys: rng.gen(),
            payload: rng.gen(),
        }
    }
}

/// Semi-random key generator over `[first_key, first_key + span)`.
pub struct KeyGenerator {
    rng: StdRng,
    first_key: i64,
    span: u64,
    next: i64,
    randomness: f32,
}

impl KeyGenerator {
    pub fn new(seed: u64, first_key: i64, span: u64, randomness: f32) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            first_key,
            span,
            next: first_key,
            randomness: randomness.clamp(0.0, 1.0),
        }
    }

    pub fn next_key(&mut self) -> i64 {
        let sequential = self.next;
        self.next += 1;

        if self.randomness > 0.0 && self.span > 0 && self.rng.gen::<f32>() < self.randomness {
            self.first_key + self.rng.gen_range(0..self.span) as i64
        } else {
            sequential
        }
    }
}

/// Lazy stream of generated ticks for one flow.
pub struct TickFlow {
    keys: KeyGenerator,
    rng: StdRng,
    remaining: u64,
}

impl TickFlow {
    pub fn new(plan: FlowPlan, seed: FlowSeed, randomness: f32) -> Self {
        Self {
            keys: KeyGenerator::new(seed.keys, plan.first_key, plan.record_count, randomness),
            rng: StdRng::seed_from_u64(seed.payload),
            remaining: plan.record_count,
        }
    }

    fn tick(&mut self, key: i64) -> Tick {
        let bid = (self.rng.gen_range(0.5..2.0f64) * 100_000.0).round() / 100_000.0;
        let spread = f64::from(self.rng.gen_range(1u32..20)) / 100_000.0;

        Tick {
            symbol: SYMBOLS[self.rng.gen_range(0..SYMBOLS.len())],
            timestamp: BASE_TIMESTAMP_MS + key,
            bid,
            ask: bid + spread,
            bid_size: self.rng.gen_range(1..1_000),
            ask_size: self.rng.gen_range(1..1_000),
            provider: PROVIDERS[self.rng.gen_range(0..PROVIDERS.len())],
        }
    }
}

impl Iterator for TickFlow {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let key = self.keys.next_key();
        Some((key, self.tick(key)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

/// Build the flows of a session, one per plan.
pub fn flows(record_count: u64, flow_count: usize, randomness: f32, seed: Option<u64>) -> Vec<TickFlow> {
    partition(record_count, flow_count)
        .into_iter()
        .map(|plan| {
            let flow_seed = match seed {
                Some(seed) => FlowSeed::derived(seed, plan.index),
                None => FlowSeed::random(),
            };
            TickFlow::new(plan, flow_seed, randomness)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_is_contiguous_and_complete() {
        let plans = partition(10, 3);

        assert_eq!(plans.len(), 3);
        assert_eq!(plans.iter().map(|p| p.record_count).collect::<Vec<_>>(), vec![4, 3, 3]);
        assert_eq!(plans.iter().map(|p| p.first_key).collect::<Vec<_>>(), vec![0, 4, 7]);
        assert!(partition(10, 0).is_empty());
    }

    #[test]
    fn test_sequential_flow_is_strictly_ascending() {
        let plan = partition(1_000, 4)[2];
        let flow = TickFlow::new(plan, FlowSeed::derived(7, 2), 0.0);

        let keys: Vec<i64> = flow.map(|(key, _)| key).collect();
        assert_eq!(keys.len(), 250);
        assert_eq!(keys[0], 500);
        assert_eq!(keys[249], 749);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_random_flow_stays_in_its_range() {
        let plan = FlowPlan {
            index: 1,
            first_key: 1_000,
            record_count: 500,
        };
        let keys: Vec<i64> = TickFlow::new(plan, FlowSeed::derived(3, 1), 1.0)
            .map(|(key, _)| key)
            .collect();

        assert_eq!(keys.len(), 500);
        assert!(keys.iter().all(|k| (1_000..1_500).contains(k)));
        assert!(keys.windows(2).any(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_seeded_flows_are_reproducible() {
        let a: Vec<Record> = flows(100, 2, 0.5, Some(11)).into_iter().flatten().collect();
        let b: Vec<Record> = flows(100, 2, 0.5, Some(11)).into_iter().flatten().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_ticks_are_well_formed() {
        for (key, tick) in flows(50, 1, 0.0, Some(1)).into_iter().flatten() {
            assert!(tick.ask > tick.bid);
            assert_eq!(tick.timestamp, BASE_TIMESTAMP_MS + key);
            assert!(SYMBOLS.contains(&tick.symbol));
            assert!(PROVIDERS.contains(&tick.provider));
        }
    }

    #[test]
    fn test_keys_type() {
        assert_eq!(KeysType::from_randomness(0.0), KeysType::Sequential);
        assert_eq!(KeysType::from_randomness(0.2), KeysType::Random);
        assert_eq!(KeysType::Random.to_string(), "random");
    }
}
