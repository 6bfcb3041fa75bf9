use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::disk::DiskIO;

/// DiskIO implementation backed by an image file on the host
pub struct FileDisk {
    file: File,
}

impl FileDisk {
    pub fn open(path: &Path, read_only: bool) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(path)?;
        Ok(Self { file })
    }
}

impl DiskIO for FileDisk {
    fn read(&mut self, buffer: &mut [u8], offset: u32) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset as u64))?;
        let mut total = 0;
        while total < buffer.len() {
            match self.file.read(&mut buffer[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    fn write(&mut self, buffer: &[u8], offset: u32) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.write_all(buffer)
    }

    fn size(&mut self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }
}

/// An image held entirely in memory. Writes past the end fail rather than
/// growing the image.
pub struct MemoryDisk {
    bytes: Vec<u8>,
}

impl MemoryDisk {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl DiskIO for MemoryDisk {
    fn read(&mut self, buffer: &mut [u8], offset: u32) -> io::Result<usize> {
        let start = (offset as usize).min(self.bytes.len());
        let n = buffer.len().min(self.bytes.len() - start);
        buffer[..n].copy_from_slice(&self.bytes[start..start + n]);
        Ok(n)
    }

    fn write(&mut self, buffer: &[u8], offset: u32) -> io::Result<()> {
        let start = offset as usize;
        let end = start + buffer.len();
        if end > self.bytes.len() {
            // The cache writes whole blocks; only the part inside the image
            // may carry data.
            let inside = self.bytes.len().saturating_sub(start);
            if buffer[inside..].iter().any(|&b| b != 0) {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "write past the end of the image",
                ));
            }
            if inside > 0 {
                self.bytes[start..].copy_from_slice(&buffer[..inside]);
            }
            return Ok(());
        }
        self.bytes[start..end].copy_from_slice(buffer);
        Ok(())
    }

    fn size(&mut self) -> io::Result<u64> {
        Ok(self.bytes.len() as u64)
    }
}
