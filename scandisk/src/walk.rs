//! Depth-first traversal of the directory tree.
//!
//! The root directory region is entered once at depth 0. Subdirectories are
//! entered through the clusters claimed for them, in on-disk slot order, so
//! the report lists the tree pre-order.

use crate::chain::{ChainStatus, ChainWalker};
use crate::clusters::ClusterMap;
use crate::config::CheckOptions;
use crate::dir::{AnyDirectory, DirEntry, EntryKind, SubDirectory};
use crate::disk::DiskIO;
use crate::error::CheckResult;
use crate::fs::FatVolume;
use crate::report::{Event, Report};

pub struct TreeWalker<'a, D: DiskIO> {
    volume: &'a mut FatVolume<D>,
    map: &'a mut ClusterMap,
    report: &'a mut Report,
    options: &'a CheckOptions,
}

impl<'a, D: DiskIO> TreeWalker<'a, D> {
    pub fn new(
        volume: &'a mut FatVolume<D>,
        map: &'a mut ClusterMap,
        report: &'a mut Report,
        options: &'a CheckOptions,
    ) -> Self {
        Self {
            volume,
            map,
            report,
            options,
        }
    }

    pub fn walk_root(&mut self) -> CheckResult {
        let root = AnyDirectory::Root(self.volume.get_root_directory());
        self.walk(&root, 0, "")
    }

    fn walk(&mut self, dir: &AnyDirectory, depth: usize, path: &str) -> CheckResult {
        tracing::debug!(cluster = dir.first_cluster(), depth, path, "entering directory");

        for offset in dir.slot_offsets(&self.volume.table) {
            let entry = DirEntry::read_at(offset, &mut self.volume.disk)?;
            match entry.kind() {
                EntryKind::Empty | EntryKind::Deleted | EntryKind::Dot | EntryKind::LongName => {}
                EntryKind::Volume => {
                    self.report.push(Event::Volume {
                        label: entry.volume_label(),
                    });
                }
                EntryKind::Directory { hidden: true } => {
                    tracing::debug!(name = entry.get_full_name(), "skipping hidden directory");
                }
                EntryKind::Directory { hidden: false } => {
                    self.visit_directory(&entry, depth, path)?;
                }
                EntryKind::File => {
                    self.visit_file(&entry, offset, depth, path)?;
                }
            }
        }
        Ok(())
    }

    fn visit_directory(&mut self, entry: &DirEntry, depth: usize, parent: &str) -> CheckResult {
        let name = entry.get_full_name();
        let path = join(parent, &name);
        let start = entry.first_file_cluster() as u32;
        self.report.push(Event::Directory { depth, name });

        let chain = ChainWalker::new(&self.volume.table, &mut self.volume.disk, self.map)
            .claim_directory(start)?;
        self.report_chain_fault(&path, start, chain.status, chain.clusters.len() as u32);

        if chain.clusters.is_empty() {
            return Ok(());
        }
        if depth + 1 > self.options.max_depth {
            tracing::warn!(%path, max_depth = self.options.max_depth, "directory too deep");
            self.report.push(Event::DepthLimit {
                path,
                max_depth: self.options.max_depth,
            });
            return self.claim_unlisted(chain.clusters);
        }

        let sub = AnyDirectory::Sub(SubDirectory::new(chain.clusters));
        self.walk(&sub, depth + 1, &path)
    }

    fn visit_file(&mut self, entry: &DirEntry, offset: u32, depth: usize, parent: &str) -> CheckResult {
        let name = entry.get_full_name();
        let path = join(parent, &name);
        let start = entry.first_file_cluster() as u32;
        let size = entry.byte_size();
        self.report.push(Event::File {
            depth,
            name,
            size,
            start_cluster: start,
            flags: entry.attribute_flags(),
        });

        let result = ChainWalker::new(&self.volume.table, &mut self.volume.disk, self.map)
            .reconcile(start, size)?;
        self.report_chain_fault(&path, start, result.status, result.visited_count);

        if let Some(corrected) = result.corrected_size {
            let applied = !self.options.dry_run;
            if applied {
                let mut updated = *entry;
                updated.set_size(corrected);
                self.volume.disk.write_struct(offset, &updated)?;
            }
            tracing::warn!(%path, from = size, to = corrected, applied, "size mismatch");
            self.report.push(Event::SizeCorrected {
                path,
                from: size,
                to: corrected,
                applied,
            });
        }
        Ok(())
    }

    /// Claim every chain below a directory that is too deep to list, so the
    /// lost-cluster scan does not hand its live files out a second time.
    /// Uses a work list instead of recursion; each directory cluster can only
    /// be claimed once, so the list drains.
    fn claim_unlisted(&mut self, clusters: Vec<u32>) -> CheckResult {
        let mut pending = vec![clusters];
        while let Some(clusters) = pending.pop() {
            let dir = AnyDirectory::Sub(SubDirectory::new(clusters));
            for offset in dir.slot_offsets(&self.volume.table) {
                let entry = DirEntry::read_at(offset, &mut self.volume.disk)?;
                let start = entry.first_file_cluster() as u32;
                let mut walker = ChainWalker::new(&self.volume.table, &mut self.volume.disk, self.map);
                match entry.kind() {
                    EntryKind::Directory { hidden: false } => {
                        let chain = walker.claim_directory(start)?;
                        if !chain.clusters.is_empty() {
                            pending.push(chain.clusters);
                        }
                    }
                    EntryKind::File => {
                        walker.reconcile(start, entry.byte_size())?;
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn report_chain_fault(&mut self, path: &str, start: u32, status: ChainStatus, clusters: u32) {
        match status {
            ChainStatus::Intact => {}
            ChainStatus::Broken { last_good, found } => {
                tracing::warn!(path, start, ?last_good, ?found, "broken chain");
                self.report.push(Event::BrokenChain {
                    path: path.to_string(),
                    last_good,
                    clusters,
                });
            }
            ChainStatus::CrossLinked { cluster, owner } => {
                tracing::warn!(path, start, cluster, ?owner, "cross-linked chain");
                self.report.push(Event::CrossLinked {
                    path: path.to_string(),
                    start,
                    cluster,
                    owner,
                });
            }
        }
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}
