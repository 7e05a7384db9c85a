//! Formatting and summary helpers for benchmark output

/// Statistical utilities over speed series
pub mod stats {
    pub fn mean(values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }

    pub fn percentile(values: &[f64], p: f64) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let len = sorted.len();
        let index = ((len as f64 - 1.0) * p / 100.0).round() as usize;
        sorted[index.min(len - 1)]
    }

    pub fn median(values: &[f64]) -> f64 {
        percentile(values, 50.0)
    }

    /// Spread of the moment speeds of a phase.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct SpeedProfile {
        pub min: f64,
        pub mean: f64,
        pub median: f64,
        pub p95: f64,
        pub max: f64,
    }

    impl SpeedProfile {
        /// Profile of the second element of each `(records, speed)` pair.
        pub fn from_series(series: &[(u64, f64)]) -> Option<Self> {
            if series.is_empty() {
                return None;
            }
            let speeds: Vec<f64> = series.iter().map(|(_, speed)| *speed).collect();
            Some(Self {
                min: speeds.iter().copied().fold(f64::INFINITY, f64::min),
                mean: mean(&speeds),
                median: median(&speeds),
                p95: percentile(&speeds, 95.0),
                max: speeds.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            })
        }
    }
}

/// Format utilities
pub mod format {
    use std::time::Duration;

    pub fn duration_human(duration: Duration) -> String {
        let total_secs = duration.as_secs();
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;
        let millis = duration.subsec_millis();

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else if seconds > 0 {
            format!("{}.{:03}s", seconds, millis)
        } else {
            format!("{}ms", duration.as_millis())
        }
    }

    pub fn bytes_human(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

        let mut size = bytes as f64;
        let mut unit = 0;
        while size >= 1024.0 && unit < UNITS.len() - 1 {
            size /= 1024.0;
            unit += 1;
        }

        if unit == 0 {
            format!("{} B", bytes)
        } else {
            format!("{:.2} {}", size, UNITS[unit])
        }
    }

    pub fn rate_human(rate: f64, unit: &str) -> String {
        if rate >= 1_000_000.0 {
            format!("{:.2}M {}/s", rate / 1_000_000.0, unit)
        } else if rate >= 1_000.0 {
            format!("{:.2}K {}/s", rate / 1_000.0, unit)
        } else {
            format!("{:.2} {}/s", rate, unit)
        }
    }
}
