//! Reference storage engines

pub mod codec;
pub mod flow_file;
pub mod memory;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::StorageEngine;

pub use flow_file::FlowFileEngine;
pub use memory::MemoryEngine;

/// Engines that can be selected from configuration or the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Memory,
    FlowFile,
}

impl EngineKind {
    pub const ALL: [EngineKind; 2] = [EngineKind::Memory, EngineKind::FlowFile];

    /// Build a fresh engine. File based engines get their own subdirectory of `data_directory`.
    pub fn create(self, data_directory: &Path) -> Arc<dyn StorageEngine> {
        match self {
            EngineKind::Memory => Arc::new(MemoryEngine::new()),
            EngineKind::FlowFile => Arc::new(FlowFileEngine::new(data_directory.join("flow_file"))),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Memory => write!(f, "memory"),
            EngineKind::FlowFile => write!(f, "flow_file"),
        }
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(EngineKind::Memory),
            "flow_file" | "flowfile" | "file" => Ok(EngineKind::FlowFile),
            other => Err(format!("Unknown engine: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_kind_parsing() {
        assert_eq!("memory".parse::<EngineKind>().unwrap(), EngineKind::Memory);
        assert_eq!("FLOW_FILE".parse::<EngineKind>().unwrap(), EngineKind::FlowFile);
        assert!("rocksdb".parse::<EngineKind>().is_err());

        for kind in EngineKind::ALL {
            assert_eq!(kind.to_string().parse::<EngineKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_create_names_engines() {
        let dir = std::env::temp_dir();
        assert_eq!(EngineKind::Memory.create(&dir).name(), "Memory");
        assert_eq!(EngineKind::FlowFile.create(&dir).name(), "FlowFile");
    }
}
