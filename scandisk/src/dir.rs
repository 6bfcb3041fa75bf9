use crate::bpb::DIR_ENTRY_SIZE;
use crate::disk::{DiskAccess, DiskIO, OnDisk};
use crate::error::CheckResult;
use crate::table::AllocationTable;

pub const ATTR_READONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
/// Long-filename fragments set all four low attribute bits
pub const ATTR_LONG_NAME: u8 = 0x0f;
pub const ATTR_NORMAL: u8 = 0x00;

const SLOT_EMPTY: u8 = 0x00;
const SLOT_DELETED: u8 = 0xe5;
const DOT: u8 = 0x2e;

/// On-disk representation of a file or subdirectory
#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct DirEntry {
    /// Short filename
    file_name: [u8; 8],
    /// File extension
    ext: [u8; 3],
    /// File attributes
    attributes: u8,
    /// Reserved byte used for various nonstandard things
    nonstandard_attributes: u8,
    /// Fine resolution of creation time, in 10ms units
    fine_create_time: u8,
    creation_time: u16,
    creation_date: u16,
    access_date: u16,
    /// Extended attributes
    extended_attributes: u16,
    last_modify_time: u16,
    last_modify_date: u16,
    /// First cluster of file data
    first_file_cluster: u16,
    /// File size in bytes
    byte_size: u32,
}

unsafe impl OnDisk for DirEntry {}

/// What a directory slot holds. Attributes are read as a capability set;
/// the first matching kind wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Never used
    Empty,
    Deleted,
    /// "." or ".."
    Dot,
    LongName,
    Volume,
    Directory { hidden: bool },
    File,
}

impl DirEntry {
    pub fn new() -> Self {
        Self {
            file_name: [0x20; 8],
            ext: [0x20; 3],
            attributes: 0,
            nonstandard_attributes: 0,
            fine_create_time: 0,
            creation_time: 0,
            creation_date: 0,
            access_date: 0,
            extended_attributes: 0,
            last_modify_time: 0,
            last_modify_date: 0,
            first_file_cluster: 0,
            byte_size: 0,
        }
    }

    pub fn read_at<D: DiskIO>(offset: u32, disk: &mut DiskAccess<D>) -> CheckResult<Self> {
        let mut entry = Self::new();
        disk.read_struct(offset, &mut entry)?;
        Ok(entry)
    }

    pub fn kind(&self) -> EntryKind {
        let attributes = self.attributes;
        match self.file_name[0] {
            SLOT_EMPTY => EntryKind::Empty,
            SLOT_DELETED => EntryKind::Deleted,
            DOT => EntryKind::Dot,
            _ if attributes & ATTR_LONG_NAME == ATTR_LONG_NAME => EntryKind::LongName,
            _ if attributes & ATTR_VOLUME != 0 => EntryKind::Volume,
            _ if attributes & ATTR_DIRECTORY != 0 => EntryKind::Directory {
                hidden: attributes & ATTR_HIDDEN != 0,
            },
            _ => EntryKind::File,
        }
    }

    pub fn is_free_slot(&self) -> bool {
        matches!(self.file_name[0], SLOT_EMPTY | SLOT_DELETED)
    }

    pub fn get_filename(&self) -> &str {
        let len = self.file_name.iter().rposition(|&b| b != 0x20).map_or(0, |i| i + 1);
        std::str::from_utf8(&self.file_name[..len]).unwrap_or("!!!!!!!!")
    }

    pub fn get_ext(&self) -> &str {
        let len = self.ext.iter().rposition(|&b| b != 0x20).map_or(0, |i| i + 1);
        std::str::from_utf8(&self.ext[..len]).unwrap_or("!!!")
    }

    pub fn get_full_name(&self) -> String {
        let mut name = String::from(self.get_filename());
        let ext = self.get_ext();
        if !ext.is_empty() {
            name.push('.');
            name.push_str(ext);
        }
        name
    }

    /// Volume labels use all eleven name bytes without a dot.
    pub fn volume_label(&self) -> String {
        let mut label = [0u8; 11];
        label[..8].copy_from_slice(&self.file_name);
        label[8..].copy_from_slice(&self.ext);
        String::from_utf8_lossy(&label).trim_end().to_string()
    }

    /// `r h s a` column, blank where the attribute is unset
    pub fn attribute_flags(&self) -> String {
        let attributes = self.attributes;
        [
            (ATTR_READONLY, 'r'),
            (ATTR_HIDDEN, 'h'),
            (ATTR_SYSTEM, 's'),
            (ATTR_ARCHIVE, 'a'),
        ]
        .iter()
        .map(|&(bit, c)| if attributes & bit != 0 { c } else { ' ' })
        .collect()
    }

    pub fn byte_size(&self) -> u32 {
        self.byte_size
    }

    pub fn set_size(&mut self, size: u32) {
        self.byte_size = size;
    }

    pub fn first_file_cluster(&self) -> u16 {
        self.first_file_cluster
    }

    pub fn set_first_cluster(&mut self, cluster: u16) {
        self.first_file_cluster = cluster;
    }

    pub fn set_filename(&mut self, filename: &[u8; 8], ext: &[u8; 3]) {
        self.file_name = *filename;
        self.ext = *ext;
    }

    pub fn set_attributes(&mut self, attributes: u8) {
        self.attributes = attributes;
    }

    pub fn matches_name(&self, filename: &[u8; 8], ext: &[u8; 3]) -> bool {
        self.file_name
            .iter()
            .zip(filename)
            .chain(self.ext.iter().zip(ext))
            .all(|(&a, &b)| ascii_char_matches(a, b))
    }
}

impl Default for DirEntry {
    fn default() -> Self {
        Self::new()
    }
}

fn ascii_char_matches(a: u8, b: u8) -> bool {
    a.eq_ignore_ascii_case(&b)
}

/// The fixed-size root directory region between the FATs and the data area
pub struct RootDirectory {
    first_offset: u32,
    max_entries: u32,
}

impl RootDirectory {
    pub fn new(first_offset: u32, max_entries: u32) -> Self {
        Self {
            first_offset,
            max_entries,
        }
    }

    pub fn slot_offsets(&self) -> Vec<u32> {
        (0..self.max_entries)
            .map(|i| self.first_offset + i * DIR_ENTRY_SIZE)
            .collect()
    }

    /// Offsets of every free (never used or deleted) slot, in on-disk order
    pub fn free_slots<D: DiskIO>(&self, disk: &mut DiskAccess<D>) -> CheckResult<Vec<u32>> {
        let mut free = Vec::new();
        for offset in self.slot_offsets() {
            if DirEntry::read_at(offset, disk)?.is_free_slot() {
                free.push(offset);
            }
        }
        Ok(free)
    }

    pub fn contains_name<D: DiskIO>(
        &self,
        filename: &[u8; 8],
        ext: &[u8; 3],
        disk: &mut DiskAccess<D>,
    ) -> CheckResult<bool> {
        for offset in self.slot_offsets() {
            let entry = DirEntry::read_at(offset, disk)?;
            if !entry.is_free_slot() && entry.matches_name(filename, ext) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// A subdirectory stored in a cluster chain. Holds the clusters the checker
/// claimed for it, which may stop short of the FAT chain when that chain is
/// cross-linked.
pub struct SubDirectory {
    clusters: Vec<u32>,
}

impl SubDirectory {
    pub fn new(clusters: Vec<u32>) -> Self {
        Self { clusters }
    }

    pub fn slot_offsets(&self, table: &AllocationTable) -> Vec<u32> {
        let entries_per_cluster = table.bytes_per_cluster() / DIR_ENTRY_SIZE;
        self.clusters
            .iter()
            .flat_map(|&cluster| {
                let location = table.get_cluster_location(cluster);
                (0..entries_per_cluster).map(move |i| location + i * DIR_ENTRY_SIZE)
            })
            .collect()
    }
}

/// Either the root directory or a subdirectory
pub enum AnyDirectory {
    Root(RootDirectory),
    Sub(SubDirectory),
}

impl AnyDirectory {
    /// Cluster 0 stands for the root directory.
    pub fn first_cluster(&self) -> u32 {
        match self {
            AnyDirectory::Root(_) => 0,
            AnyDirectory::Sub(sub) => sub.clusters.first().copied().unwrap_or(0),
        }
    }

    pub fn slot_offsets(&self, table: &AllocationTable) -> Vec<u32> {
        match self {
            AnyDirectory::Root(root) => root.slot_offsets(),
            AnyDirectory::Sub(sub) => sub.slot_offsets(table),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Uppercase, space-padded 8.3 name
    fn parse_short_name(name: &str) -> ([u8; 8], [u8; 3]) {
        let (filename, ext) = match name.rsplit_once('.') {
            Some(pair) => pair,
            None => (name, ""),
        };
        let mut short_filename: [u8; 8] = [0x20; 8];
        let mut short_ext: [u8; 3] = [0x20; 3];
        for (dst, src) in short_filename.iter_mut().zip(filename.bytes()) {
            *dst = src.to_ascii_uppercase();
        }
        for (dst, src) in short_ext.iter_mut().zip(ext.bytes()) {
            *dst = src.to_ascii_uppercase();
        }
        (short_filename, short_ext)
    }

    fn named(name: &str, attributes: u8) -> DirEntry {
        let (filename, ext) = parse_short_name(name);
        let mut entry = DirEntry::new();
        entry.set_filename(&filename, &ext);
        entry.set_attributes(attributes);
        entry
    }

    #[test]
    fn entry_is_32_bytes() {
        assert_eq!(std::mem::size_of::<DirEntry>(), DIR_ENTRY_SIZE as usize);
    }

    #[test]
    fn filename_matching() {
        let mut direntry = DirEntry::new();
        direntry.file_name.copy_from_slice("MYFILE  ".as_bytes());
        direntry.ext.copy_from_slice("TXT".as_bytes());

        assert!(direntry.matches_name(b"MYFILE  ", b"TXT"));
        assert!(direntry.matches_name(b"MyFile  ", b"txt"));
        assert!(!direntry.matches_name(b"OTHER   ", b"TXT"));
    }

    #[test]
    fn classification() {
        assert_eq!(DirEntry::new().kind(), EntryKind::File);
        assert_eq!(named("README.TXT", ATTR_ARCHIVE).kind(), EntryKind::File);
        assert_eq!(named("LABEL", ATTR_VOLUME).kind(), EntryKind::Volume);
        assert_eq!(
            named("DOCS", ATTR_DIRECTORY).kind(),
            EntryKind::Directory { hidden: false }
        );
        assert_eq!(
            named("TRASHES", ATTR_DIRECTORY | ATTR_HIDDEN).kind(),
            EntryKind::Directory { hidden: true }
        );
        assert_eq!(named("A", ATTR_LONG_NAME).kind(), EntryKind::LongName);

        let mut dot = named("X", ATTR_DIRECTORY);
        dot.set_filename(b"..      ", b"   ");
        assert_eq!(dot.kind(), EntryKind::Dot);

        let mut deleted = named("GONE.TXT", ATTR_ARCHIVE);
        deleted.file_name[0] = SLOT_DELETED;
        assert_eq!(deleted.kind(), EntryKind::Deleted);
        assert!(deleted.is_free_slot());

        let mut empty = DirEntry::new();
        empty.file_name = [0; 8];
        assert_eq!(empty.kind(), EntryKind::Empty);
    }

    #[test]
    fn names_and_flags() {
        let entry = named("notes.md", ATTR_READONLY | ATTR_ARCHIVE);
        assert_eq!(entry.get_filename(), "NOTES");
        assert_eq!(entry.get_ext(), "MD");
        assert_eq!(entry.get_full_name(), "NOTES.MD");
        assert_eq!(entry.attribute_flags(), "r  a");

        let label = named("BACKUPDISK1", ATTR_VOLUME);
        assert_eq!(label.volume_label(), "BACKUPDI");

        let dir = named("SUBDIR", ATTR_DIRECTORY);
        assert_eq!(dir.get_full_name(), "SUBDIR");
        assert_eq!(dir.attribute_flags(), "    ");
    }
}
