//! Configuration management for Tickbench

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::backends::EngineKind;
use crate::session::SessionParams;

/// Main benchmark configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub session: SessionSettings,
    pub engines: EngineSettings,
    pub output: OutputSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    pub flow_count: usize,
    pub record_count: u64,
    pub randomness: f32,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    pub enabled: Vec<EngineKind>,
    pub data_directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    pub format: OutputFormat,
    pub directory: PathBuf,
    pub progress: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Csv,
    Prometheus,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session: SessionSettings {
                flow_count: 4,
                record_count: 1_000_000,
                randomness: 0.0,
                seed: None,
            },
            engines: EngineSettings {
                enabled: vec![EngineKind::Memory, EngineKind::FlowFile],
                data_directory: PathBuf::from("./tickbench_data"),
            },
            output: OutputSettings {
                format: OutputFormat::Json,
                directory: PathBuf::from("./benchmark_results"),
                progress: true,
            },
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Override settings from `TICKBENCH_*` variables resolved through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(flows) = lookup("TICKBENCH_FLOWS") {
            self.session.flow_count = flows.parse()?;
        }

        if let Some(records) = lookup("TICKBENCH_RECORDS") {
            self.session.record_count = records.parse()?;
        }

        if let Some(randomness) = lookup("TICKBENCH_RANDOMNESS") {
            self.session.randomness = randomness.parse()?;
        }

        if let Some(seed) = lookup("TICKBENCH_SEED") {
            self.session.seed = Some(seed.parse()?);
        }

        if let Some(dir) = lookup("TICKBENCH_DATA_DIR") {
            self.engines.data_directory = PathBuf::from(dir);
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.session.flow_count == 0 {
            return Err(anyhow::anyhow!("Flow count must be greater than 0"));
        }

        if self.session.record_count == 0 {
            return Err(anyhow::anyhow!("Record count must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&self.session.randomness) {
            return Err(anyhow::anyhow!(
                "Randomness must be between 0 and 1, got {}",
                self.session.randomness
            ));
        }

        if self.engines.enabled.is_empty() {
            return Err(anyhow::anyhow!("At least one engine must be enabled"));
        }

        Ok(())
    }

    pub fn session_params(&self) -> SessionParams {
        SessionParams {
            flow_count: self.session.flow_count,
            record_count: self.session.record_count,
            randomness: self.session.randomness,
            seed: self.session.seed,
        }
    }
}
