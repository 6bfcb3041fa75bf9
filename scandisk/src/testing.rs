//! Builder for small synthetic FAT12 images used by the tests. Only depends
//! on std so it can be shared between unit tests and the scenario tests.

#![allow(dead_code)]

pub const SECTOR: usize = 512;
pub const CLUSTER: u32 = 512;
pub const ENTRIES_PER_CLUSTER: u32 = CLUSTER / 32;

const RESERVED: usize = 1;
const FATS: usize = 2;
const SECTORS_PER_FAT: usize = 9;
const TOTAL_SECTORS: usize = 2880;

pub const ATTR_READONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
pub const ATTR_LONG_NAME: u8 = 0x0f;

/// A 1.44MB floppy layout: 512-byte sectors, one sector per cluster, two
/// FATs of nine sectors each.
pub struct TestImage {
    bytes: Vec<u8>,
    root_entries: usize,
}

impl TestImage {
    pub fn floppy() -> Self {
        Self::with_root_entries(224)
    }

    pub fn with_root_entries(root_entries: u16) -> Self {
        let mut bytes = vec![0u8; TOTAL_SECTORS * SECTOR];
        bytes[0..3].copy_from_slice(&[0xeb, 0x3c, 0x90]);
        bytes[3..11].copy_from_slice(b"MSDOS5.0");
        bytes[11..13].copy_from_slice(&(SECTOR as u16).to_le_bytes());
        bytes[13] = 1;
        bytes[14..16].copy_from_slice(&(RESERVED as u16).to_le_bytes());
        bytes[16] = FATS as u8;
        bytes[17..19].copy_from_slice(&root_entries.to_le_bytes());
        bytes[19..21].copy_from_slice(&(TOTAL_SECTORS as u16).to_le_bytes());
        bytes[21] = 0xf0;
        bytes[22..24].copy_from_slice(&(SECTORS_PER_FAT as u16).to_le_bytes());
        bytes[24..26].copy_from_slice(&18u16.to_le_bytes());
        bytes[26..28].copy_from_slice(&2u16.to_le_bytes());
        bytes[510] = 0x55;
        bytes[511] = 0xaa;

        let mut image = Self {
            bytes,
            root_entries: root_entries as usize,
        };
        image.set_fat(0, 0xff0);
        image.set_fat(1, 0xfff);
        image
    }

    /// Wrap an image produced by the checker so its entries can be inspected.
    pub fn reopen(bytes: Vec<u8>, root_entries: u16) -> Self {
        Self {
            bytes,
            root_entries: root_entries as usize,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    fn root_dir_offset(&self) -> usize {
        (RESERVED + FATS * SECTORS_PER_FAT) * SECTOR
    }

    fn data_offset(&self) -> usize {
        let root_sectors = (self.root_entries * 32).div_ceil(SECTOR);
        self.root_dir_offset() + root_sectors * SECTOR
    }

    pub fn max_cluster(&self) -> u32 {
        ((TOTAL_SECTORS * SECTOR - self.data_offset()) / SECTOR) as u32 + 1
    }

    pub fn root_slot_offset(&self, slot: usize) -> usize {
        self.root_dir_offset() + slot * 32
    }

    pub fn cluster_offset(&self, cluster: u32) -> usize {
        self.data_offset() + (cluster as usize - 2) * CLUSTER as usize
    }

    pub fn sub_slot_offset(&self, cluster: u32, slot: usize) -> usize {
        self.cluster_offset(cluster) + slot * 32
    }

    pub fn set_fat_copy(&mut self, copy: usize, cluster: u32, value: u16) {
        let base = (RESERVED + copy * SECTORS_PER_FAT) * SECTOR;
        let offset = base + (cluster as usize / 2) * 3;
        let mut pair = u32::from_le_bytes([
            self.bytes[offset],
            self.bytes[offset + 1],
            self.bytes[offset + 2],
            0,
        ]);
        let value = (value & 0xfff) as u32;
        if cluster & 1 == 0 {
            pair = (pair & 0xfff000) | value;
        } else {
            pair = (pair & 0x000fff) | (value << 12);
        }
        self.bytes[offset..offset + 3].copy_from_slice(&pair.to_le_bytes()[..3]);
    }

    pub fn set_fat(&mut self, cluster: u32, value: u16) {
        for copy in 0..FATS {
            self.set_fat_copy(copy, cluster, value);
        }
    }

    pub fn fat(&self, cluster: u32) -> u16 {
        let offset = RESERVED * SECTOR + (cluster as usize / 2) * 3;
        let pair = u32::from_le_bytes([
            self.bytes[offset],
            self.bytes[offset + 1],
            self.bytes[offset + 2],
            0,
        ]);
        if cluster & 1 == 0 {
            (pair & 0xfff) as u16
        } else {
            (pair >> 12) as u16
        }
    }

    /// Link clusters into a chain terminated by an end-of-chain marker.
    pub fn link(&mut self, clusters: &[u32]) {
        for pair in clusters.windows(2) {
            self.set_fat(pair[0], pair[1] as u16);
        }
        if let Some(&last) = clusters.last() {
            self.set_fat(last, 0xfff);
        }
    }

    pub fn put_entry(&mut self, offset: usize, name: &str, ext: &str, attributes: u8, start: u32, size: u32) {
        let entry = &mut self.bytes[offset..offset + 32];
        entry.fill(0);
        entry[0..8].fill(b' ');
        entry[8..11].fill(b' ');
        entry[0..name.len()].copy_from_slice(name.as_bytes());
        entry[8..8 + ext.len()].copy_from_slice(ext.as_bytes());
        entry[11] = attributes;
        entry[26..28].copy_from_slice(&(start as u16).to_le_bytes());
        entry[28..32].copy_from_slice(&size.to_le_bytes());
    }

    /// Write a root directory entry into `slot`.
    pub fn root_entry(&mut self, slot: usize, name: &str, ext: &str, attributes: u8, start: u32, size: u32) {
        let offset = self.root_slot_offset(slot);
        self.put_entry(offset, name, ext, attributes, start, size);
    }

    /// Chain `clusters` together and point a root file entry at them.
    pub fn add_file(&mut self, slot: usize, name: &str, ext: &str, clusters: &[u32], size: u32) {
        self.link(clusters);
        let start = clusters.first().copied().unwrap_or(0);
        self.root_entry(slot, name, ext, ATTR_ARCHIVE, start, size);
    }

    /// Chain `clusters` and write a file entry into a subdirectory's first
    /// cluster.
    pub fn add_sub_file(&mut self, dir: u32, slot: usize, name: &str, ext: &str, clusters: &[u32], size: u32) {
        self.link(clusters);
        let start = clusters.first().copied().unwrap_or(0);
        let offset = self.sub_slot_offset(dir, slot);
        self.put_entry(offset, name, ext, ATTR_ARCHIVE, start, size);
    }

    /// Create a subdirectory occupying `clusters`, with "." and ".." entries,
    /// referenced from root slot `slot` (or from `parent`'s slot when given).
    pub fn add_dir(&mut self, parent: Option<u32>, slot: usize, name: &str, attributes: u8, clusters: &[u32]) {
        self.link(clusters);
        let start = clusters[0];
        let offset = match parent {
            Some(dir) => self.sub_slot_offset(dir, slot),
            None => self.root_slot_offset(slot),
        };
        self.put_entry(offset, name, "", ATTR_DIRECTORY | attributes, start, 0);

        let dot = self.sub_slot_offset(start, 0);
        self.put_entry(dot, ".", "", ATTR_DIRECTORY, start, 0);
        let dotdot = self.sub_slot_offset(start, 1);
        self.put_entry(dotdot, "..", "", ATTR_DIRECTORY, parent.unwrap_or(0), 0);
    }

    /// Mark the entry at `offset` as deleted.
    pub fn mark_deleted(&mut self, offset: usize) {
        self.bytes[offset] = 0xe5;
    }

    pub fn entry_size(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.bytes[offset + 28..offset + 32].try_into().unwrap())
    }

    pub fn entry_start(&self, offset: usize) -> u32 {
        u16::from_le_bytes(self.bytes[offset + 26..offset + 28].try_into().unwrap()) as u32
    }

    /// `NAME.EXT`, start cluster and size of every used root slot.
    pub fn root_listing(&self) -> Vec<(String, u32, u32)> {
        Self::root_listing_of(&self.bytes, self.root_entries)
    }

    /// Same as `root_listing`, for an image that went through the checker.
    pub fn root_listing_of(bytes: &[u8], root_entries: usize) -> Vec<(String, u32, u32)> {
        let root = (RESERVED + FATS * SECTORS_PER_FAT) * SECTOR;
        let mut listing = Vec::new();
        for chunk in bytes[root..].chunks_exact(32).take(root_entries) {
            if chunk[0] == 0x00 || chunk[0] == 0xe5 {
                continue;
            }
            let name = String::from_utf8_lossy(&chunk[0..8]).trim_end().to_string();
            let ext = String::from_utf8_lossy(&chunk[8..11]).trim_end().to_string();
            let full = if ext.is_empty() { name } else { format!("{}.{}", name, ext) };
            let start = u16::from_le_bytes([chunk[26], chunk[27]]) as u32;
            let size = u32::from_le_bytes([chunk[28], chunk[29], chunk[30], chunk[31]]);
            listing.push((full, start, size));
        }
        listing
    }
}
