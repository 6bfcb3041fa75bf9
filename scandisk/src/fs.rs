use std::io;

use crate::bpb::Geometry;
use crate::dir::RootDirectory;
use crate::disk::{DiskAccess, DiskIO};
use crate::error::CheckResult;
use crate::table::AllocationTable;

/// Cache size for the sector cache, in bytes. Covers the FATs and root
/// directory of a 1.44MB floppy several times over.
const CACHE_SIZE: usize = 64 * 1024;

/// An opened FAT12 image: the cached disk, its validated geometry, and the
/// allocation table accessor built from it.
pub struct FatVolume<D: DiskIO> {
    pub disk: DiskAccess<D>,
    pub geometry: Geometry,
    pub table: AllocationTable,
}

impl<D: DiskIO> FatVolume<D> {
    pub fn open(disk_io: D, read_only: bool) -> CheckResult<Self> {
        let mut disk = DiskAccess::new(disk_io, CACHE_SIZE, read_only);
        let geometry = Geometry::read(&mut disk)?;

        // Blocks past the end of the image read as zero, which would make a
        // truncated image look like one full of empty directories.
        let image_size = disk.image_size()?;
        if image_size < geometry.volume_bytes() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "image is {} bytes but its boot sector describes {} bytes",
                    image_size,
                    geometry.volume_bytes()
                ),
            )
            .into());
        }
        let table = AllocationTable::from_geometry(geometry);

        tracing::info!(
            bytes_per_sector = geometry.bytes_per_sector,
            sectors_per_cluster = geometry.sectors_per_cluster,
            total_sectors = geometry.total_sectors,
            root_entries = geometry.root_dir_entries,
            clusters = geometry.total_clusters(),
            "parsed boot sector"
        );

        Ok(Self {
            disk,
            geometry,
            table,
        })
    }

    pub fn get_root_directory(&self) -> RootDirectory {
        RootDirectory::new(
            self.geometry.root_directory_offset(),
            self.geometry.root_dir_entries,
        )
    }
}
