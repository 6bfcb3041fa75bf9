use std::fmt;

use crate::clusters::{ClusterMap, ClusterStatus};
use crate::error::CheckError;

/// One line of the human-readable report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Volume {
        label: String,
    },
    Directory {
        depth: usize,
        name: String,
    },
    File {
        depth: usize,
        name: String,
        size: u32,
        start_cluster: u32,
        flags: String,
    },
    SizeCorrected {
        path: String,
        from: u32,
        to: u32,
        applied: bool,
    },
    BrokenChain {
        path: String,
        last_good: Option<u32>,
        clusters: u32,
    },
    CrossLinked {
        path: String,
        start: u32,
        cluster: u32,
        owner: Option<u32>,
    },
    DepthLimit {
        path: String,
        max_depth: usize,
    },
    FatCopyMismatch {
        copy: u32,
        bytes: u32,
    },
    Recovered {
        name: String,
        start_cluster: u32,
        clusters: u32,
        size: u32,
        applied: bool,
    },
}

impl Event {
    /// Anything other than the listing itself
    pub fn is_finding(&self) -> bool {
        !matches!(
            self,
            Event::Volume { .. } | Event::Directory { .. } | Event::File { .. }
        )
    }
}

fn indent(f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    write!(f, "{:width$}", "", width = depth * 4)
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Volume { label } => write!(f, "Volume: {}", label),
            Event::Directory { depth, name } => {
                indent(f, *depth)?;
                write!(f, "{}/ (directory)", name)
            }
            Event::File {
                depth,
                name,
                size,
                start_cluster,
                flags,
            } => {
                indent(f, *depth)?;
                write!(
                    f,
                    "{} ({} bytes) (starting cluster {}) {}",
                    name, size, start_cluster, flags
                )
            }
            Event::SizeCorrected {
                path,
                from,
                to,
                applied,
            } => {
                let verb = if *applied { "corrected" } else { "would correct" };
                write!(
                    f,
                    "{}: size {} does not match its chain, {} to {} bytes",
                    path, from, verb, to
                )
            }
            Event::BrokenChain {
                path,
                last_good: Some(cluster),
                clusters,
            } => write!(
                f,
                "{}: broken chain, truncated at cluster {} after {} cluster(s)",
                path, cluster, clusters
            ),
            Event::BrokenChain {
                path,
                last_good: None,
                ..
            } => write!(f, "{}: broken chain, start cluster is not a data cluster", path),
            Event::CrossLinked {
                path,
                start,
                cluster,
                owner,
            } => match owner {
                Some(owner) if owner == start => {
                    write!(f, "{}: chain loops back to cluster {}", path, cluster)
                }
                Some(owner) => write!(
                    f,
                    "{}: cross-linked at cluster {} with the chain starting at cluster {}",
                    path, cluster, owner
                ),
                None => write!(f, "{}: cross-linked at cluster {}", path, cluster),
            },
            Event::DepthLimit { path, max_depth } => write!(
                f,
                "{}: nested deeper than {} levels, not entered",
                path, max_depth
            ),
            Event::FatCopyMismatch { copy, bytes } => write!(
                f,
                "FAT copy {} differs from the first FAT in {} byte(s)",
                copy + 1,
                bytes
            ),
            Event::Recovered {
                name,
                start_cluster,
                clusters,
                size,
                applied,
            } => {
                let verb = if *applied { "Recovered" } else { "Would recover" };
                write!(
                    f,
                    "{} {} lost cluster(s) at cluster {} as {} ({} bytes)",
                    verb, clusters, start_cluster, name, size
                )
            }
        }
    }
}

/// Cluster and finding totals for the end of the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    pub total_clusters: u32,
    pub directory_clusters: u32,
    pub file_clusters: u32,
    pub free_clusters: u32,
    pub bad_clusters: u32,
    pub lost_clusters: u32,
    /// Only nonzero if a check stopped before the lost-cluster scan finished
    pub unvisited_clusters: u32,
    pub size_corrections: u32,
    pub broken_chains: u32,
    pub cross_links: u32,
    pub recovered_entries: u32,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  {:>5} data clusters", self.total_clusters)?;
        writeln!(f, "  {:>5} directory clusters", self.directory_clusters)?;
        writeln!(f, "  {:>5} file clusters", self.file_clusters)?;
        writeln!(f, "  {:>5} free clusters", self.free_clusters)?;
        writeln!(f, "  {:>5} bad clusters", self.bad_clusters)?;
        writeln!(f, "  {:>5} lost clusters", self.lost_clusters)?;
        if self.unvisited_clusters > 0 {
            writeln!(f, "  {:>5} unchecked clusters", self.unvisited_clusters)?;
        }
        writeln!(f, "  {:>5} size corrections", self.size_corrections)?;
        writeln!(f, "  {:>5} broken chains", self.broken_chains)?;
        writeln!(f, "  {:>5} cross-linked chains", self.cross_links)?;
        writeln!(f, "  {:>5} recovered entries", self.recovered_entries)
    }
}

/// Process outcome of a check. Both non-fatal outcomes exit with 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Clean,
    Repaired,
    Fatal,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Clean | ExitStatus::Repaired => 0,
            ExitStatus::Fatal => 1,
        }
    }
}

#[derive(Debug, Default)]
pub struct Report {
    pub events: Vec<Event>,
    pub summary: Summary,
    /// Set when the check stopped early but the report up to that point is
    /// still meaningful
    pub fatal: Option<CheckError>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        match &event {
            Event::SizeCorrected { .. } => self.summary.size_corrections += 1,
            Event::BrokenChain { .. } => self.summary.broken_chains += 1,
            Event::CrossLinked { .. } => self.summary.cross_links += 1,
            Event::Recovered { .. } => self.summary.recovered_entries += 1,
            _ => {}
        }
        self.events.push(event);
    }

    pub fn findings(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(|e| e.is_finding())
    }

    /// Fill in the cluster totals from the finished cluster map.
    pub fn tally(&mut self, map: &ClusterMap) {
        let summary = &mut self.summary;
        summary.total_clusters = map.total_clusters();
        summary.directory_clusters = map.count(ClusterStatus::DirectoryOwned);
        summary.file_clusters =
            map.count(ClusterStatus::FileOwned) + map.count(ClusterStatus::EndOfChain);
        summary.free_clusters = map.count(ClusterStatus::Free);
        summary.bad_clusters = map.count(ClusterStatus::Bad);
        summary.lost_clusters = map.count(ClusterStatus::Reclaimed);
        summary.unvisited_clusters = map.count(ClusterStatus::Unvisited);
    }

    pub fn exit_status(&self) -> ExitStatus {
        if self.fatal.is_some() {
            ExitStatus::Fatal
        } else if self.findings().next().is_some() {
            ExitStatus::Repaired
        } else {
            ExitStatus::Clean
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for event in &self.events {
            writeln!(f, "{}", event)?;
        }
        writeln!(f)?;
        write!(f, "{}", self.summary)
    }
}
