//! Run manifest for audit/replay.
//!
//! The scheduler records one manifest per successful trigger; re-running the
//! same program hash against the same spec hash and partition plan reproduces
//! the merged results exactly.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hash::Hash256;
use crate::id::BindingId;
use crate::spec::SpecVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestId(pub Uuid);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub id: ManifestId,

    pub binding: BindingId,

    /// Stable hash of the lowered program (nodes, slots, actions).
    pub program_hash: Hash256,

    /// Stable hash of the dataset spec and the partition plan.
    pub spec_hash: Hash256,

    pub spec_version: SpecVersion,

    pub partitions: usize,

    pub actions: usize,

    /// Engine version string for provenance.
    pub engine_version: String,

    pub seed: Option<u64>,

    /// Milliseconds since Unix epoch (UTC).
    pub started_ms: u64,
    pub finished_ms: u64,
}

impl RunManifest {
    pub fn new(
        binding: BindingId,
        program_hash: Hash256,
        spec_hash: Hash256,
        spec_version: SpecVersion,
        started_ms: u64,
    ) -> Self {
        Self {
            id: ManifestId(Uuid::new_v4()),
            binding,
            program_hash,
            spec_hash,
            spec_version,
            partitions: 0,
            actions: 0,
            engine_version: crate::VERSION.to_string(),
            seed: None,
            started_ms,
            finished_ms: started_ms,
        }
    }

    pub fn finish(mut self, finished_ms: u64, partitions: usize, actions: usize) -> Self {
        self.finished_ms = finished_ms;
        self.partitions = partitions;
        self.actions = actions;
        self
    }
}
