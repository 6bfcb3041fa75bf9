//! Chain following and size reconciliation.
//!
//! The walker claims every cluster it follows in the `ClusterMap`. A cluster
//! that is already claimed stops the walk, which is also what keeps a
//! circular chain from being followed forever.

use crate::clusters::{ClusterMap, ClusterStatus};
use crate::disk::{DiskAccess, DiskIO};
use crate::error::CheckResult;
use crate::table::{AllocationTable, FatEntry};

/// How a chain walk ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStatus {
    /// Reached an end-of-chain marker
    Intact,
    /// Ran into a free, reserved, bad or out-of-range value. `last_good` is
    /// the cluster the chain was truncated at; None if the start cluster
    /// itself was not a data cluster.
    Broken { last_good: Option<u32>, found: FatEntry },
    /// Reached `cluster`, which is already claimed by the entry starting at
    /// `owner`. The owner may be the walking entry itself (a loop).
    CrossLinked { cluster: u32, owner: Option<u32> },
}

impl ChainStatus {
    pub fn is_intact(&self) -> bool {
        *self == ChainStatus::Intact
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileResult {
    pub status: ChainStatus,
    /// Data clusters claimed for the file
    pub visited_count: u32,
    pub declared_size: u32,
    /// New size for the entry, when the declared size disagrees with the
    /// chain length
    pub corrected_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryChain {
    pub clusters: Vec<u32>,
    pub status: ChainStatus,
}

pub struct ChainWalker<'a, D: DiskIO> {
    table: &'a AllocationTable,
    disk: &'a mut DiskAccess<D>,
    map: &'a mut ClusterMap,
}

impl<'a, D: DiskIO> ChainWalker<'a, D> {
    pub fn new(table: &'a AllocationTable, disk: &'a mut DiskAccess<D>, map: &'a mut ClusterMap) -> Self {
        Self { table, disk, map }
    }

    /// Follow a file's chain, claim its clusters, and work out whether its
    /// declared size has to change. The chain is trusted over the size: a
    /// declared size whose cluster count (rounded up) differs from the
    /// number of clusters claimed is replaced by `visited * cluster_size`.
    pub fn reconcile(&mut self, start: u32, declared_size: u32) -> CheckResult<ReconcileResult> {
        let cluster_size = self.table.bytes_per_cluster();

        let (clusters, status) = if start == 0 && declared_size == 0 {
            (Vec::new(), ChainStatus::Intact)
        } else {
            self.follow(start, ClusterStatus::FileOwned)?
        };
        if let Some(&last) = clusters.last() {
            self.map.terminate(last);
        }

        let visited_count = clusters.len() as u32;
        let expected = declared_size.div_ceil(cluster_size);
        let corrected_size = (expected != visited_count).then(|| visited_count * cluster_size);

        tracing::debug!(start, declared_size, visited_count, ?status, "reconciled chain");

        Ok(ReconcileResult {
            status,
            visited_count,
            declared_size,
            corrected_size,
        })
    }

    /// Claim every cluster of a subdirectory's chain.
    pub fn claim_directory(&mut self, start: u32) -> CheckResult<DirectoryChain> {
        let (clusters, status) = self.follow(start, ClusterStatus::DirectoryOwned)?;
        Ok(DirectoryChain { clusters, status })
    }

    fn follow(&mut self, start: u32, claim_as: ClusterStatus) -> CheckResult<(Vec<u32>, ChainStatus)> {
        let mut clusters = Vec::new();
        if !self.table.geometry().is_data_cluster(start) {
            let found = FatEntry::classify(start as u16, self.table.max_cluster());
            return Ok((clusters, ChainStatus::Broken { last_good: None, found }));
        }

        let mut current = start;
        loop {
            if let Err(conflict) = self.map.claim(current, claim_as, start) {
                return Ok((
                    clusters,
                    ChainStatus::CrossLinked {
                        cluster: current,
                        owner: conflict.owner,
                    },
                ));
            }
            clusters.push(current);

            match self.table.get_entry(current, self.disk)? {
                FatEntry::EndOfChain => return Ok((clusters, ChainStatus::Intact)),
                FatEntry::Next(next) => {
                    self.map.set_next(current, next);
                    current = next;
                }
                found => {
                    return Ok((
                        clusters,
                        ChainStatus::Broken {
                            last_good: Some(current),
                            found,
                        },
                    ))
                }
            }
        }
    }
}
