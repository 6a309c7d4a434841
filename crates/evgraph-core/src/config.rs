//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default number of partitions a dataset range is split into.
    pub npartitions: usize,

    /// Execution parallelism. The worker pool never runs more partitions at once.
    pub max_parallel_tasks: usize,

    /// Directory that snapshot outputs are written under.
    pub output_dir: String,

    /// Directory that file-backed datasets are read from.
    pub data_dir: String,

    /// Provenance only: copied into run manifests. Execution is
    /// deterministic and draws no random numbers.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            npartitions: 2,
            max_parallel_tasks: 4,
            output_dir: "/tmp/evgraph-out".to_string(),
            data_dir: ".".to_string(),
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `EVGRAPH_NPARTITIONS`: default partition count
    /// - `EVGRAPH_MAX_PARALLEL_TASKS`: max concurrent partition passes
    /// - `EVGRAPH_OUTPUT_DIR`: snapshot output directory
    /// - `EVGRAPH_DATA_DIR`: dataset directory
    /// - `EVGRAPH_SEED`: seed
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("EVGRAPH_NPARTITIONS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.npartitions = v;
            }
        }

        if let Ok(s) = std::env::var("EVGRAPH_MAX_PARALLEL_TASKS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_parallel_tasks = v;
            }
        }

        if let Ok(s) = std::env::var("EVGRAPH_OUTPUT_DIR") {
            cfg.output_dir = s;
        }

        if let Ok(s) = std::env::var("EVGRAPH_DATA_DIR") {
            cfg.data_dir = s;
        }

        if let Ok(s) = std::env::var("EVGRAPH_SEED") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.seed = Some(v);
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<()> {
        if self.npartitions == 0 {
            return Err(Error::Config("npartitions must be at least 1".into()));
        }
        if self.max_parallel_tasks == 0 {
            return Err(Error::Config("max_parallel_tasks must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_partitions_rejected() {
        let cfg = EngineConfig {
            npartitions: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }
}
