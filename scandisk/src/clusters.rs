//! The in-memory cluster status map.
//!
//! One record per data cluster (`2..=max_cluster`). Built once per check,
//! filled in by the tree walk, finished by the lost-cluster scan, and thrown
//! away afterwards.

use std::ops::RangeInclusive;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClusterStatus {
    #[default]
    Unvisited,
    Free,
    /// Marked bad in the FAT; never part of a chain or a recovered run
    Bad,
    DirectoryOwned,
    FileOwned,
    /// Last cluster of a file chain (possibly truncated there)
    EndOfChain,
    /// Part of a lost run turned into a recovered entry
    Reclaimed,
}

impl ClusterStatus {
    /// Claimed by a directory entry during the tree walk
    pub fn is_owned(self) -> bool {
        matches!(
            self,
            ClusterStatus::DirectoryOwned | ClusterStatus::FileOwned | ClusterStatus::EndOfChain
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClusterRecord {
    pub status: ClusterStatus,
    /// Start cluster of the entry that claimed this cluster
    pub owner: Option<u32>,
    /// Next cluster of the owner's chain, as found during the walk
    pub chain_next: Option<u32>,
}

/// A second claim on an already-claimed cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimConflict {
    pub cluster: u32,
    pub owner: Option<u32>,
    pub status: ClusterStatus,
}

pub struct ClusterMap {
    records: Vec<ClusterRecord>,
}

impl ClusterMap {
    pub fn new(total_clusters: u32) -> Self {
        Self {
            records: vec![ClusterRecord::default(); total_clusters as usize],
        }
    }

    pub fn total_clusters(&self) -> u32 {
        self.records.len() as u32
    }

    pub fn data_clusters(&self) -> RangeInclusive<u32> {
        2..=self.total_clusters() + 1
    }

    pub fn contains(&self, cluster: u32) -> bool {
        self.data_clusters().contains(&cluster)
    }

    fn index(&self, cluster: u32) -> Option<usize> {
        if self.contains(cluster) {
            Some((cluster - 2) as usize)
        } else {
            None
        }
    }

    pub fn get(&self, cluster: u32) -> Option<&ClusterRecord> {
        self.index(cluster).map(|i| &self.records[i])
    }

    /// Status of `cluster`; reserved and out-of-range numbers read as
    /// Unvisited.
    pub fn status(&self, cluster: u32) -> ClusterStatus {
        self.get(cluster).map_or(ClusterStatus::Unvisited, |r| r.status)
    }

    /// Claim an unvisited cluster for the entry starting at `owner`. A
    /// cluster is claimed at most once; a later claim leaves the first
    /// claimant in place and returns the conflict.
    pub fn claim(&mut self, cluster: u32, status: ClusterStatus, owner: u32) -> Result<(), ClaimConflict> {
        let Some(i) = self.index(cluster) else {
            return Err(ClaimConflict {
                cluster,
                owner: None,
                status: ClusterStatus::Unvisited,
            });
        };
        let record = &mut self.records[i];
        if record.status != ClusterStatus::Unvisited {
            return Err(ClaimConflict {
                cluster,
                owner: record.owner,
                status: record.status,
            });
        }
        record.status = status;
        record.owner = Some(owner);
        Ok(())
    }

    pub fn set_next(&mut self, cluster: u32, next: u32) {
        if let Some(i) = self.index(cluster) {
            self.records[i].chain_next = Some(next);
        }
    }

    /// Force a claimed file cluster to be the end of its chain.
    pub fn terminate(&mut self, cluster: u32) {
        if let Some(i) = self.index(cluster) {
            let record = &mut self.records[i];
            if record.status == ClusterStatus::FileOwned {
                record.status = ClusterStatus::EndOfChain;
            }
            record.chain_next = None;
        }
    }

    /// Give an unvisited cluster its final status during the lost-cluster
    /// scan. Clusters that already have a status are left alone.
    pub fn settle(&mut self, cluster: u32, status: ClusterStatus) {
        if let Some(i) = self.index(cluster) {
            let record = &mut self.records[i];
            if record.status == ClusterStatus::Unvisited {
                record.status = status;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &ClusterRecord)> + '_ {
        self.records
            .iter()
            .enumerate()
            .map(|(i, record)| (i as u32 + 2, record))
    }

    pub fn count(&self, status: ClusterStatus) -> u32 {
        self.records.iter().filter(|r| r.status == status).count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering_starts_at_two() {
        let map = ClusterMap::new(10);
        assert_eq!(map.data_clusters(), 2..=11);
        assert!(!map.contains(0));
        assert!(!map.contains(1));
        assert!(map.contains(11));
        assert!(!map.contains(12));
        assert_eq!(map.count(ClusterStatus::Unvisited), 10);
    }

    #[test]
    fn second_claim_keeps_first_owner() {
        let mut map = ClusterMap::new(10);
        map.claim(5, ClusterStatus::FileOwned, 5).unwrap();

        let conflict = map.claim(5, ClusterStatus::FileOwned, 8).unwrap_err();
        assert_eq!(conflict.owner, Some(5));
        assert_eq!(conflict.status, ClusterStatus::FileOwned);
        assert_eq!(map.get(5).unwrap().owner, Some(5));
    }

    #[test]
    fn reserved_clusters_cannot_be_claimed() {
        let mut map = ClusterMap::new(10);
        assert!(map.claim(0, ClusterStatus::FileOwned, 0).is_err());
        assert!(map.claim(1, ClusterStatus::FileOwned, 1).is_err());
        assert!(map.claim(12, ClusterStatus::FileOwned, 12).is_err());
    }

    #[test]
    fn terminate_and_settle() {
        let mut map = ClusterMap::new(10);
        map.claim(3, ClusterStatus::FileOwned, 3).unwrap();
        map.set_next(3, 4);
        map.terminate(3);
        assert_eq!(map.status(3), ClusterStatus::EndOfChain);
        assert_eq!(map.get(3).unwrap().chain_next, None);

        map.settle(3, ClusterStatus::Free);
        assert_eq!(map.status(3), ClusterStatus::EndOfChain);
        map.settle(4, ClusterStatus::Free);
        assert_eq!(map.status(4), ClusterStatus::Free);
        assert_eq!(
            map.iter().find(|(c, _)| *c == 4).map(|(_, r)| r.status),
            Some(ClusterStatus::Free)
        );
    }
}
