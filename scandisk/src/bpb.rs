use crate::disk::{DiskAccess, DiskIO, OnDisk};
use crate::error::{CheckError, CheckResult};

/// Byte offset of the BIOS Parameter Block within the boot sector
pub const BPB_OFFSET: u32 = 0x0b;

const SIGNATURE_OFFSET: u32 = 510;
const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xaa];

/// FAT12 volumes have fewer than this many data clusters
pub const FAT12_MAX_CLUSTERS: u32 = 4085;

/// Size of one directory entry
pub const DIR_ENTRY_SIZE: u32 = 32;

/// Bytes a FAT needs to describe the largest FAT12 volume, reserved entries
/// included
const FAT12_MAX_FAT_BYTES: u32 = ((FAT12_MAX_CLUSTERS + 2) * 3).div_ceil(2);

#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct BiosParamBlock {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    pub root_directory_entries: u16,
    pub total_sectors: u16,
    pub media_descriptor: u8,
    pub sectors_per_fat: u16,
    pub sectors_per_track: u16,
    pub head_count: u16,
    pub hidden_sectors: u32,
    pub total_sectors_large: u32,
}

unsafe impl OnDisk for BiosParamBlock {}

impl BiosParamBlock {
    pub fn new() -> Self {
        Self {
            bytes_per_sector: 0,
            sectors_per_cluster: 0,
            reserved_sectors: 0,
            fat_count: 0,
            root_directory_entries: 0,
            total_sectors: 0,
            media_descriptor: 0,
            sectors_per_fat: 0,
            sectors_per_track: 0,
            head_count: 0,
            hidden_sectors: 0,
            total_sectors_large: 0,
        }
    }
}

impl Default for BiosParamBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Validated volume layout, derived from the BPB. All offsets are in bytes
/// from the start of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub reserved_sectors: u32,
    pub fat_count: u32,
    pub sectors_per_fat: u32,
    pub root_dir_entries: u32,
    pub total_sectors: u32,
}

impl Geometry {
    /// Read the boot sector and validate it.
    pub fn read<D: DiskIO>(disk: &mut DiskAccess<D>) -> CheckResult<Self> {
        let mut signature = [0u8; 2];
        disk.read_bytes(SIGNATURE_OFFSET, &mut signature)?;
        if signature != BOOT_SIGNATURE {
            return Err(CheckError::InvalidGeometry(format!(
                "missing boot signature (found {:02x} {:02x})",
                signature[0], signature[1]
            )));
        }

        let mut bpb = BiosParamBlock::new();
        disk.read_struct(BPB_OFFSET, &mut bpb)?;
        Self::from_bpb(&bpb)
    }

    pub fn from_bpb(bpb: &BiosParamBlock) -> CheckResult<Self> {
        let bytes_per_sector = bpb.bytes_per_sector as u32;
        let sectors_per_cluster = bpb.sectors_per_cluster as u32;
        let total_small = bpb.total_sectors;
        let total_large = bpb.total_sectors_large;

        let geometry = Self {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors: bpb.reserved_sectors as u32,
            fat_count: bpb.fat_count as u32,
            sectors_per_fat: bpb.sectors_per_fat as u32,
            root_dir_entries: bpb.root_directory_entries as u32,
            total_sectors: if total_small != 0 {
                total_small as u32
            } else {
                total_large
            },
        };
        geometry.validate()?;
        Ok(geometry)
    }

    fn validate(&self) -> CheckResult {
        let invalid = |msg: String| Err(CheckError::InvalidGeometry(msg));

        if !matches!(self.bytes_per_sector, 512 | 1024 | 2048 | 4096) {
            return invalid(format!("bytes per sector is {}", self.bytes_per_sector));
        }
        if !self.sectors_per_cluster.is_power_of_two() {
            return invalid(format!(
                "sectors per cluster {} is not a power of 2",
                self.sectors_per_cluster
            ));
        }
        if self.reserved_sectors == 0 {
            return invalid("no reserved sectors".into());
        }
        if self.fat_count == 0 {
            return invalid("FAT count is 0".into());
        }
        if self.sectors_per_fat == 0 {
            return invalid("sectors per FAT is 0".into());
        }
        if self.root_dir_entries == 0 {
            return invalid("root directory has no entries".into());
        }
        let max_fat_sectors = FAT12_MAX_FAT_BYTES.div_ceil(self.bytes_per_sector);
        if self.sectors_per_fat > max_fat_sectors {
            return invalid(format!(
                "{} sectors per FAT is more than a FAT12 volume uses",
                self.sectors_per_fat
            ));
        }
        // Every byte offset into the volume is a u32.
        if self.volume_bytes() > u32::MAX as u64 {
            return invalid(format!("volume of {} bytes is too large", self.volume_bytes()));
        }
        if self.total_sectors <= self.first_data_sector() {
            return invalid(format!(
                "{} total sectors do not cover the {} metadata sectors",
                self.total_sectors,
                self.first_data_sector()
            ));
        }

        let clusters = self.total_clusters();
        if clusters == 0 || clusters >= FAT12_MAX_CLUSTERS {
            return invalid(format!("{} data clusters is not a FAT12 volume", clusters));
        }
        let fat_capacity = self.bytes_per_fat() * 2 / 3;
        if fat_capacity < clusters + 2 {
            return invalid(format!(
                "FAT holds {} entries but the volume has {} clusters",
                fat_capacity, clusters
            ));
        }
        Ok(())
    }

    /// Size of the whole volume as described by the boot sector
    pub fn volume_bytes(&self) -> u64 {
        self.total_sectors as u64 * self.bytes_per_sector as u64
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        self.sectors_per_cluster * self.bytes_per_sector
    }

    pub fn bytes_per_fat(&self) -> u32 {
        self.sectors_per_fat * self.bytes_per_sector
    }

    /// Offset of FAT copy `index` (0-based)
    pub fn fat_offset(&self, index: u32) -> u32 {
        (self.reserved_sectors + index * self.sectors_per_fat) * self.bytes_per_sector
    }

    pub fn first_root_directory_sector(&self) -> u32 {
        self.reserved_sectors + self.fat_count * self.sectors_per_fat
    }

    pub fn root_directory_offset(&self) -> u32 {
        self.first_root_directory_sector() * self.bytes_per_sector
    }

    pub fn root_directory_sectors(&self) -> u32 {
        (self.root_dir_entries * DIR_ENTRY_SIZE).div_ceil(self.bytes_per_sector)
    }

    pub fn first_data_sector(&self) -> u32 {
        self.first_root_directory_sector() + self.root_directory_sectors()
    }

    pub fn data_offset(&self) -> u32 {
        self.first_data_sector() * self.bytes_per_sector
    }

    pub fn total_clusters(&self) -> u32 {
        self.total_sectors.saturating_sub(self.first_data_sector()) / self.sectors_per_cluster
    }

    /// Highest valid data cluster number. Data clusters are `2..=max_cluster`.
    pub fn max_cluster(&self) -> u32 {
        self.total_clusters() + 1
    }

    pub fn is_data_cluster(&self, cluster: u32) -> bool {
        cluster >= 2 && cluster <= self.max_cluster()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floppy() -> BiosParamBlock {
        let mut bpb = BiosParamBlock::new();
        bpb.bytes_per_sector = 512;
        bpb.sectors_per_cluster = 1;
        bpb.reserved_sectors = 1;
        bpb.fat_count = 2;
        bpb.root_directory_entries = 224;
        bpb.total_sectors = 2880;
        bpb.media_descriptor = 0xf0;
        bpb.sectors_per_fat = 9;
        bpb
    }

    #[test]
    fn floppy_layout() {
        let geometry = Geometry::from_bpb(&floppy()).unwrap();
        assert_eq!(geometry.fat_offset(0), 512);
        assert_eq!(geometry.fat_offset(1), 512 + 9 * 512);
        assert_eq!(geometry.first_root_directory_sector(), 19);
        assert_eq!(geometry.root_directory_sectors(), 14);
        assert_eq!(geometry.data_offset(), 33 * 512);
        assert_eq!(geometry.total_clusters(), 2847);
        assert_eq!(geometry.max_cluster(), 2848);
        assert!(geometry.is_data_cluster(2));
        assert!(!geometry.is_data_cluster(1));
        assert!(!geometry.is_data_cluster(2849));
    }

    #[test]
    fn large_sector_count_field() {
        let mut bpb = floppy();
        bpb.total_sectors = 0;
        bpb.total_sectors_large = 2880;
        assert_eq!(Geometry::from_bpb(&bpb).unwrap().total_sectors, 2880);
    }

    #[test]
    fn rejects_bad_fields() {
        let mut bpb = floppy();
        bpb.sectors_per_cluster = 3;
        assert!(matches!(Geometry::from_bpb(&bpb), Err(CheckError::InvalidGeometry(_))));

        let mut bpb = floppy();
        bpb.bytes_per_sector = 500;
        assert!(Geometry::from_bpb(&bpb).is_err());

        let mut bpb = floppy();
        bpb.fat_count = 0;
        assert!(Geometry::from_bpb(&bpb).is_err());

        let mut bpb = floppy();
        bpb.total_sectors = 20;
        assert!(Geometry::from_bpb(&bpb).is_err());
    }

    #[test]
    fn rejects_fat16_sized_volume() {
        let mut bpb = floppy();
        bpb.total_sectors = 0;
        bpb.total_sectors_large = 65536;
        bpb.sectors_per_fat = 200;
        assert!(Geometry::from_bpb(&bpb).is_err());
    }

    #[test]
    fn rejects_oversized_metadata_without_overflowing() {
        let mut bpb = floppy();
        bpb.bytes_per_sector = 4096;
        bpb.sectors_per_cluster = 128;
        bpb.fat_count = 255;
        bpb.sectors_per_fat = 65535;
        bpb.root_directory_entries = 16;
        bpb.total_sectors = 0;
        bpb.total_sectors_large = u32::MAX;
        assert!(matches!(Geometry::from_bpb(&bpb), Err(CheckError::InvalidGeometry(_))));

        // Small FATs, but more bytes than a u32 offset can reach.
        bpb.fat_count = 2;
        bpb.sectors_per_fat = 2;
        bpb.sectors_per_cluster = 1;
        bpb.total_sectors_large = 1_100_000;
        assert!(matches!(Geometry::from_bpb(&bpb), Err(CheckError::InvalidGeometry(_))));
    }

    #[test]
    fn largest_fat12_fat_is_accepted() {
        let mut bpb = floppy();
        bpb.sectors_per_fat = 12;
        assert!(Geometry::from_bpb(&bpb).is_ok());
        bpb.sectors_per_fat = 13;
        assert!(Geometry::from_bpb(&bpb).is_err());
    }

    #[test]
    fn rejects_undersized_fat() {
        let mut bpb = floppy();
        bpb.sectors_per_fat = 1;
        assert!(Geometry::from_bpb(&bpb).is_err());
    }
}
