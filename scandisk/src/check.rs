//! One full pass over an image: FAT copy comparison, tree walk, lost-cluster
//! recovery, summary.

use std::path::Path;

use crate::clusters::ClusterMap;
use crate::config::CheckOptions;
use crate::disk::DiskIO;
use crate::error::{CheckError, CheckResult};
use crate::fs::FatVolume;
use crate::image::FileDisk;
use crate::reclaim::{recover_runs, Reclaimer};
use crate::report::{Event, ExitStatus, Report};
use crate::walk::TreeWalker;

/// Check and repair the image behind `disk_io`.
///
/// Geometry and I/O failures are returned as errors. Running out of root
/// directory slots during recovery is recorded as `report.fatal` instead, so
/// the report of everything done up to that point is still available; the
/// corrections made before it are flushed either way.
pub fn check<D: DiskIO>(disk_io: D, options: &CheckOptions) -> CheckResult<Report> {
    let mut volume = FatVolume::open(disk_io, options.dry_run)?;
    let mut map = ClusterMap::new(volume.geometry.total_clusters());
    let mut report = Report::new();

    for (copy, bytes) in volume.table.compare_copies(&mut volume.disk)? {
        tracing::warn!(copy, bytes, "FAT copies differ");
        report.push(Event::FatCopyMismatch { copy, bytes });
    }

    TreeWalker::new(&mut volume, &mut map, &mut report, options).walk_root()?;

    let runs = Reclaimer::new(&volume.table, &mut volume.disk, &mut map).reclaim()?;
    let root = volume.get_root_directory();
    match recover_runs(&runs, &root, &mut volume.disk, &mut report, options.dry_run) {
        Ok(()) => {}
        Err(err @ CheckError::RootDirectoryFull { .. }) => report.fatal = Some(err),
        Err(err) => return Err(err),
    }

    report.tally(&map);
    volume.disk.flush()?;

    let summary = &report.summary;
    tracing::info!(
        corrections = summary.size_corrections,
        broken = summary.broken_chains,
        cross_links = summary.cross_links,
        recovered = summary.recovered_entries,
        lost = summary.lost_clusters,
        "check finished"
    );
    Ok(report)
}

/// Check the image file at `path`, print the report to stdout and any
/// fatal diagnostic to stderr.
pub fn run_check(path: &Path, options: &CheckOptions) -> ExitStatus {
    let disk = match FileDisk::open(path, options.dry_run) {
        Ok(disk) => disk,
        Err(err) => {
            tracing::error!(path = %path.display(), %err, "cannot open image");
            eprintln!("scandisk: {}: {}", path.display(), err);
            return ExitStatus::Fatal;
        }
    };

    match check(disk, options) {
        Ok(report) => {
            print!("{}", report);
            if let Some(err) = &report.fatal {
                tracing::error!(%err, "check stopped");
                eprintln!("scandisk: {}", err);
            }
            report.exit_status()
        }
        Err(err) => {
            tracing::error!(%err, "check failed");
            eprintln!("scandisk: {}: {}", path.display(), err);
            ExitStatus::Fatal
        }
    }
}
