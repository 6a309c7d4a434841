//! Deterministic replay & provenance helpers.
//!
//! A trigger is reproducible from three inputs: the lowered program, the
//! dataset spec it ran against, and the partition plan. The manifest stores a
//! hash of the first and a combined hash of the other two.

use std::time::{SystemTime, UNIX_EPOCH};

use evgraph_core::error::Result;
use evgraph_core::hash::{hash_serde, Hash256};
use evgraph_core::spec::VersionedSpec;
use evgraph_planner::{Partition, Program};

pub fn hash_program(program: &Program) -> Result<Hash256> {
    program.hash()
}

/// Hash the spec contents together with the partition plan. The version
/// number is left out: two versions with equal contents replay identically.
pub fn hash_spec(spec: &VersionedSpec, partitions: &[Partition]) -> Result<Hash256> {
    let s = hash_serde(&spec.spec)?;
    let p = hash_serde(&partitions)?;
    Ok(s.chain(&p))
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use evgraph_core::spec::DatasetSpec;
    use evgraph_planner::{plan_partitions, PartitionPolicy};

    #[test]
    fn spec_hash_depends_on_plan_not_version() {
        let v0 = VersionedSpec::initial(DatasetSpec::empty(10));
        let v1 = v0.succeed(DatasetSpec::empty(10));
        let two = plan_partitions(&(0..10), &PartitionPolicy::Count(2)).unwrap();
        let four = plan_partitions(&(0..10), &PartitionPolicy::Count(4)).unwrap();
        assert_eq!(hash_spec(&v0, &two).unwrap(), hash_spec(&v1, &two).unwrap());
        assert_ne!(hash_spec(&v0, &two).unwrap(), hash_spec(&v0, &four).unwrap());
    }
}
