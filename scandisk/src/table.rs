use byteorder::{ByteOrder, LittleEndian};

use crate::bpb::Geometry;
use crate::disk::{DiskAccess, DiskIO};
use crate::error::CheckResult;

const FAT12_MASK: u16 = 0xfff;
const BAD_CLUSTER: u16 = 0xff7;
const END_OF_CHAIN_MIN: u16 = 0xff8;

/// Meaning of one 12-bit FAT entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatEntry {
    Free,
    Reserved,
    Next(u32),
    /// Points past the last data cluster of the volume
    OutOfRange(u16),
    Bad,
    EndOfChain,
}

impl FatEntry {
    pub fn classify(value: u16, max_cluster: u32) -> Self {
        match value & FAT12_MASK {
            0 => FatEntry::Free,
            1 => FatEntry::Reserved,
            BAD_CLUSTER => FatEntry::Bad,
            v if v >= END_OF_CHAIN_MIN => FatEntry::EndOfChain,
            v if (v as u32) <= max_cluster => FatEntry::Next(v as u32),
            v => FatEntry::OutOfRange(v),
        }
    }
}

/// Read access to the packed 12-bit allocation table, plus the cluster to
/// byte-offset translation.
#[derive(Debug, Copy, Clone)]
pub struct AllocationTable {
    geometry: Geometry,
}

impl AllocationTable {
    pub fn from_geometry(geometry: Geometry) -> Self {
        Self { geometry }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        self.geometry.bytes_per_cluster()
    }

    pub fn max_cluster(&self) -> u32 {
        self.geometry.max_cluster()
    }

    /// Byte offset of a cluster's data. Cluster 0 stands for the root
    /// directory region.
    pub fn get_cluster_location(&self, cluster: u32) -> u32 {
        if cluster == 0 {
            return self.geometry.root_directory_offset();
        }
        self.geometry.data_offset() + self.bytes_per_cluster() * (cluster - 2)
    }

    /// Raw 12-bit value stored for `cluster` in FAT copy `fat_index`
    pub fn read_raw<D: DiskIO>(
        &self,
        cluster: u32,
        fat_index: u32,
        disk: &mut DiskAccess<D>,
    ) -> CheckResult<u16> {
        let pair_offset = (cluster / 2) * 3;
        let mut pair_bytes = [0u8; 3];
        disk.read_bytes(self.geometry.fat_offset(fat_index) + pair_offset, &mut pair_bytes)?;
        let pair_value = LittleEndian::read_u24(&pair_bytes);
        let value = if cluster & 1 == 0 {
            pair_value & 0xfff
        } else {
            pair_value >> 12
        };
        Ok(value as u16)
    }

    pub fn get_entry<D: DiskIO>(&self, cluster: u32, disk: &mut DiskAccess<D>) -> CheckResult<FatEntry> {
        let raw = self.read_raw(cluster, 0, disk)?;
        Ok(FatEntry::classify(raw, self.max_cluster()))
    }

    /// Compare every FAT copy against the first. Returns `(copy, differing
    /// bytes)` for each copy that does not match.
    pub fn compare_copies<D: DiskIO>(&self, disk: &mut DiskAccess<D>) -> CheckResult<Vec<(u32, u32)>> {
        let size = self.geometry.bytes_per_fat() as usize;
        let mut primary = vec![0u8; size];
        disk.read_bytes(self.geometry.fat_offset(0), &mut primary)?;

        let mut mismatches = Vec::new();
        let mut copy = vec![0u8; size];
        for index in 1..self.geometry.fat_count {
            disk.read_bytes(self.geometry.fat_offset(index), &mut copy)?;
            let differing = primary.iter().zip(&copy).filter(|(a, b)| a != b).count() as u32;
            if differing > 0 {
                mismatches.push((index, differing));
            }
        }
        Ok(mismatches)
    }
}
