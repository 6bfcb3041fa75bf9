//! Lost-cluster recovery.
//!
//! After the tree walk every cluster reachable from a directory entry has a
//! status. Whatever is still unvisited is either free, bad, or allocated
//! in the FAT without anything pointing at it. Consecutive runs of the
//! latter are handed back to the user as new root directory entries.

use crate::clusters::{ClusterMap, ClusterStatus};
use crate::dir::{DirEntry, RootDirectory, ATTR_NORMAL};
use crate::disk::{DiskAccess, DiskIO};
use crate::error::{CheckError, CheckResult};
use crate::report::{Event, Report};
use crate::table::{AllocationTable, FatEntry};

const RECOVERED_EXT: &[u8; 3] = b"REC";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveredRun {
    pub start_cluster: u32,
    pub clusters: u32,
    pub size_bytes: u32,
}

pub struct Reclaimer<'a, D: DiskIO> {
    table: &'a AllocationTable,
    disk: &'a mut DiskAccess<D>,
    map: &'a mut ClusterMap,
}

impl<'a, D: DiskIO> Reclaimer<'a, D> {
    pub fn new(table: &'a AllocationTable, disk: &'a mut DiskAccess<D>, map: &'a mut ClusterMap) -> Self {
        Self { table, disk, map }
    }

    /// Single pass over every data cluster. Leaves no cluster `Unvisited`.
    pub fn reclaim(&mut self) -> CheckResult<Vec<RecoveredRun>> {
        let cluster_size = self.table.bytes_per_cluster();
        let mut runs = Vec::new();
        let mut run: Option<(u32, u32)> = None;

        let close = |run: &mut Option<(u32, u32)>, runs: &mut Vec<RecoveredRun>| {
            if let Some((start, length)) = run.take() {
                runs.push(RecoveredRun {
                    start_cluster: start,
                    clusters: length,
                    size_bytes: length * cluster_size,
                });
            }
        };

        for cluster in self.map.data_clusters() {
            if self.map.status(cluster) != ClusterStatus::Unvisited {
                close(&mut run, &mut runs);
                continue;
            }
            match self.table.get_entry(cluster, self.disk)? {
                FatEntry::Free => {
                    self.map.settle(cluster, ClusterStatus::Free);
                    close(&mut run, &mut runs);
                }
                FatEntry::Bad => {
                    self.map.settle(cluster, ClusterStatus::Bad);
                    close(&mut run, &mut runs);
                }
                _ => {
                    self.map.settle(cluster, ClusterStatus::Reclaimed);
                    match run.as_mut() {
                        Some((_, length)) => *length += 1,
                        None => run = Some((cluster, 1)),
                    }
                }
            }
        }
        close(&mut run, &mut runs);

        if !runs.is_empty() {
            tracing::info!(runs = runs.len(), "found lost cluster runs");
        }
        Ok(runs)
    }
}

/// Short name for the `n`th recovered file.
fn recovered_name(n: u32) -> [u8; 8] {
    let text = if n <= 999 {
        format!("FOUND{:03}", n)
    } else {
        format!("F{:07}", n)
    };
    let mut name = [0x20; 8];
    for (dst, src) in name.iter_mut().zip(text.bytes()) {
        *dst = src;
    }
    name
}

/// Write one root directory entry per run into the root's free slots, in
/// slot order. Runs left over when the slots run out are reported as
/// `RootDirectoryFull`; entries written before that stay written.
pub fn recover_runs<D: DiskIO>(
    runs: &[RecoveredRun],
    root: &RootDirectory,
    disk: &mut DiskAccess<D>,
    report: &mut Report,
    dry_run: bool,
) -> CheckResult {
    if runs.is_empty() {
        return Ok(());
    }

    let mut slots = root.free_slots(disk)?.into_iter();
    let mut counter = 0;

    for (done, run) in runs.iter().enumerate() {
        let Some(offset) = slots.next() else {
            let unrecovered = runs.len() - done;
            tracing::warn!(unrecovered, "root directory is full");
            return Err(CheckError::RootDirectoryFull { unrecovered });
        };

        let filename = loop {
            counter += 1;
            let candidate = recovered_name(counter);
            if !root.contains_name(&candidate, RECOVERED_EXT, disk)? {
                break candidate;
            }
        };

        let mut entry = DirEntry::new();
        entry.set_filename(&filename, RECOVERED_EXT);
        entry.set_attributes(ATTR_NORMAL);
        entry.set_first_cluster(run.start_cluster as u16);
        entry.set_size(run.size_bytes);
        if !dry_run {
            disk.write_struct(offset, &entry)?;
        }

        let name = entry.get_full_name();
        tracing::info!(%name, start = run.start_cluster, clusters = run.clusters, "recovered lost clusters");
        report.push(Event::Recovered {
            name,
            start_cluster: run.start_cluster,
            clusters: run.clusters,
            size: run.size_bytes,
            applied: !dry_run,
        });
    }
    Ok(())
}
