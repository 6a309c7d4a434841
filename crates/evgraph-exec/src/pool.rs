//! Worker pools: where partition passes run.
//!
//! A pool maps a pass function over the partitions of a plan and hands back
//! the outcomes in partition order. The scheduler never depends on the order
//! passes actually ran in.

use evgraph_core::error::{Error, Result};
use evgraph_planner::Partition;
use rayon::prelude::*;

use crate::worker::PartialResults;

pub type PassFn<'a> = dyn Fn(&Partition) -> Result<PartialResults> + Sync + 'a;

pub trait WorkerPool: Send + Sync {
    fn name(&self) -> &'static str;

    /// Outcomes in partition order. A pool may stop early after a failure;
    /// the returned vector then ends with that failure.
    fn map_partitions(&self, partitions: &[Partition], pass: &PassFn<'_>) -> Vec<Result<PartialResults>>;
}

/// Runs partitions one after another on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlinePool;

impl WorkerPool for InlinePool {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn map_partitions(&self, partitions: &[Partition], pass: &PassFn<'_>) -> Vec<Result<PartialResults>> {
        let mut out = Vec::with_capacity(partitions.len());
        for p in partitions {
            let r = pass(p);
            let failed = r.is_err();
            out.push(r);
            if failed {
                break;
            }
        }
        out
    }
}

/// Dedicated rayon pool; at most `threads` partitions run at once.
pub struct RayonPool {
    pool: rayon::ThreadPool,
}

impl RayonPool {
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("evgraph-worker-{}", i))
            .build()
            .map_err(|e| Error::Config(format!("worker pool: {}", e)))?;
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl WorkerPool for RayonPool {
    fn name(&self) -> &'static str {
        "rayon"
    }

    fn map_partitions(&self, partitions: &[Partition], pass: &PassFn<'_>) -> Vec<Result<PartialResults>> {
        self.pool
            .install(|| partitions.par_iter().map(|p| pass(p)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evgraph_core::id::PartitionId;

    fn parts(n: u64) -> Vec<Partition> {
        (0..n)
            .map(|i| Partition {
                id: PartitionId::new(i),
                range: i * 10..(i + 1) * 10,
            })
            .collect()
    }

    fn fail_on_two(p: &Partition) -> Result<PartialResults> {
        if p.id == PartitionId::new(2) {
            Err(Error::Invariant("bad".into()).in_partition(p.id))
        } else {
            Ok(PartialResults::new())
        }
    }

    #[test]
    fn inline_pool_stops_at_first_failure() {
        let out = InlinePool.map_partitions(&parts(5), &fail_on_two);
        assert_eq!(out.len(), 3);
        assert!(out[2].is_err());
    }

    #[test]
    fn rayon_pool_keeps_partition_order() {
        let pool = RayonPool::new(3).unwrap();
        assert_eq!(pool.threads(), 3);
        let out = pool.map_partitions(&parts(5), &fail_on_two);
        assert_eq!(out.len(), 5);
        assert!(out[0].is_ok() && out[4].is_ok());
        assert!(matches!(
            out[2],
            Err(Error::PartitionFailure { partition, .. }) if partition == PartitionId::new(2)
        ));
    }
}
