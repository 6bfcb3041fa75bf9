use std::collections::HashMap;
use std::io;

use crate::error::CheckResult;

/// Size of one cache block. Independent of the volume's sector size; the
/// cache only ever presents the image as a byte stream.
pub const BLOCK_SIZE: usize = 512;

/// Trait abstracting raw image read/write operations.
/// Backed by a file on the host, or by a byte vector in tests.
pub trait DiskIO {
    /// Read up to `buffer.len()` bytes at `offset`. Returns the number of
    /// bytes read; a short read means the image ended.
    fn read(&mut self, buffer: &mut [u8], offset: u32) -> io::Result<usize>;

    fn write(&mut self, buffer: &[u8], offset: u32) -> io::Result<()>;

    /// Length of the image in bytes
    fn size(&mut self) -> io::Result<u64>;

    /// Make previous writes durable.
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<T: DiskIO + ?Sized> DiskIO for &mut T {
    fn read(&mut self, buffer: &mut [u8], offset: u32) -> io::Result<usize> {
        (**self).read(buffer, offset)
    }

    fn write(&mut self, buffer: &[u8], offset: u32) -> io::Result<()> {
        (**self).write(buffer, offset)
    }

    fn size(&mut self) -> io::Result<u64> {
        (**self).size()
    }

    fn sync(&mut self) -> io::Result<()> {
        (**self).sync()
    }
}

/// Types that can be copied to and from the image byte-for-byte.
///
/// # Safety
///
/// Implementors must be `repr(C, packed)` (or otherwise padding-free) and
/// valid for every bit pattern.
pub unsafe trait OnDisk: Copy {}

/// How many consecutive blocks to read on a cache miss.
const READAHEAD_BLOCKS: usize = 16;

/// Blocks reachable with a u32 byte offset
const ADDRESSABLE_BLOCKS: u32 = ((u32::MAX as u64 + 1) / BLOCK_SIZE as u64) as u32;

/// DiskAccess provides a read/write interface to the underlying image. It
/// fetches, caches, and flushes fixed-size blocks, so the rest of the checker
/// can treat the image as a continuous byte stream and access subsets of
/// bytes at arbitrary offsets.
///
/// Writes are held in the cache until `flush` is called or the DiskAccess is
/// dropped.
pub struct DiskAccess<D: DiskIO> {
    disk_io: D,
    slots: Vec<CacheSlot>,
    /// Maps block number to cache slot.
    index: HashMap<u32, usize>,
    capacity: usize,
    /// Incremented on every access for LRU.
    global_age: u64,
    read_only: bool,
}

struct CacheSlot {
    block: u32,
    data: Box<[u8; BLOCK_SIZE]>,
    last_access: u64,
    dirty: bool,
}

impl<D: DiskIO> DiskAccess<D> {
    /// `cache_size` is in bytes and is rounded up to whole blocks.
    pub fn new(disk_io: D, cache_size: usize, read_only: bool) -> Self {
        let capacity = cache_size.div_ceil(BLOCK_SIZE).max(READAHEAD_BLOCKS);
        Self {
            disk_io,
            slots: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            capacity,
            global_age: 0,
            read_only,
        }
    }

    fn cache_block(&mut self, block: u32) -> CheckResult<usize> {
        self.global_age += 1;

        if let Some(&slot) = self.index.get(&block) {
            self.slots[slot].last_access = self.global_age;
            return Ok(slot);
        }

        self.readahead(block)?;
        match self.index.get(&block) {
            Some(&slot) => Ok(slot),
            None => Err(io::Error::new(io::ErrorKind::Other, "block missing after readahead").into()),
        }
    }

    /// Read a batch of consecutive uncached blocks starting at `start` and
    /// distribute them into cache slots. Bytes beyond the end of the image
    /// read as zero.
    fn readahead(&mut self, start: u32) -> CheckResult {
        let count = (0..READAHEAD_BLOCKS as u32)
            .map(|i| start.saturating_add(i))
            .take_while(|block| *block < ADDRESSABLE_BLOCKS && !self.index.contains_key(block))
            .count();
        if count == 0 {
            return Ok(());
        }

        let mut staging = vec![0u8; count * BLOCK_SIZE];
        let mut filled = 0;
        while filled < staging.len() {
            let offset = start as u64 * BLOCK_SIZE as u64 + filled as u64;
            let n = self.disk_io.read(&mut staging[filled..], offset as u32)?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        for (i, chunk) in staging.chunks_exact(BLOCK_SIZE).enumerate() {
            let slot = self.allocate_slot(start + i as u32)?;
            self.slots[slot].data.copy_from_slice(chunk);
        }
        Ok(())
    }

    /// Grab a free slot, or evict the least-recently-used one (writing it
    /// back first if dirty).
    fn allocate_slot(&mut self, block: u32) -> CheckResult<usize> {
        if self.slots.len() < self.capacity {
            self.slots.push(CacheSlot {
                block,
                data: Box::new([0; BLOCK_SIZE]),
                last_access: self.global_age,
                dirty: false,
            });
            let slot = self.slots.len() - 1;
            self.index.insert(block, slot);
            return Ok(slot);
        }

        let oldest = self
            .slots
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.last_access)
            .map(|(i, _)| i)
            .unwrap_or(0);

        self.write_back(oldest)?;
        let evicted = self.slots[oldest].block;
        self.index.remove(&evicted);
        self.index.insert(block, oldest);

        let slot = &mut self.slots[oldest];
        slot.block = block;
        slot.last_access = self.global_age;
        slot.dirty = false;
        Ok(oldest)
    }

    fn write_back(&mut self, slot: usize) -> CheckResult {
        let entry = &mut self.slots[slot];
        if entry.dirty {
            self.disk_io
                .write(&entry.data[..], entry.block * BLOCK_SIZE as u32)?;
            entry.dirty = false;
        }
        Ok(())
    }

    pub fn image_size(&mut self) -> CheckResult<u64> {
        Ok(self.disk_io.size()?)
    }

    pub fn read_bytes(&mut self, offset: u32, buffer: &mut [u8]) -> CheckResult {
        let mut done = 0usize;
        while done < buffer.len() {
            let position = offset as usize + done;
            let block = (position / BLOCK_SIZE) as u32;
            let within = position % BLOCK_SIZE;
            let n = (buffer.len() - done).min(BLOCK_SIZE - within);

            let slot = self.cache_block(block)?;
            buffer[done..done + n].copy_from_slice(&self.slots[slot].data[within..within + n]);
            done += n;
        }
        Ok(())
    }

    pub fn write_bytes(&mut self, offset: u32, data: &[u8]) -> CheckResult {
        if self.read_only {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "image is opened read-only",
            )
            .into());
        }

        let mut done = 0usize;
        while done < data.len() {
            let position = offset as usize + done;
            let block = (position / BLOCK_SIZE) as u32;
            let within = position % BLOCK_SIZE;
            let n = (data.len() - done).min(BLOCK_SIZE - within);

            let slot = self.cache_block(block)?;
            let entry = &mut self.slots[slot];
            entry.data[within..within + n].copy_from_slice(&data[done..done + n]);
            entry.dirty = true;
            done += n;
        }
        Ok(())
    }

    pub fn read_struct<S: OnDisk>(&mut self, offset: u32, s: &mut S) -> CheckResult {
        let size = std::mem::size_of::<S>();
        // Safety: OnDisk types are padding-free and valid for any bytes.
        let buffer = unsafe { std::slice::from_raw_parts_mut(s as *mut S as *mut u8, size) };
        self.read_bytes(offset, buffer)
    }

    pub fn write_struct<S: OnDisk>(&mut self, offset: u32, s: &S) -> CheckResult {
        let size = std::mem::size_of::<S>();
        // Safety: OnDisk types are padding-free.
        let buffer = unsafe { std::slice::from_raw_parts(s as *const S as *const u8, size) };
        self.write_bytes(offset, buffer)
    }

    pub fn dirty_blocks(&self) -> usize {
        self.slots.iter().filter(|s| s.dirty).count()
    }

    /// Write every dirty block back and sync the underlying image.
    pub fn flush(&mut self) -> CheckResult {
        let dirty = self.dirty_blocks();
        for slot in 0..self.slots.len() {
            self.write_back(slot)?;
        }
        if dirty > 0 {
            self.disk_io.sync()?;
            tracing::debug!(blocks = dirty, "flushed dirty blocks");
        }
        Ok(())
    }
}

impl<D: DiskIO> Drop for DiskAccess<D> {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            tracing::error!(%err, "failed to flush image on release");
        }
    }
}
