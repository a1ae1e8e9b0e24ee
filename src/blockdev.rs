// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Uniform block I/O over the substrates a sampler volume can
//! live on.
//!
//! Everything above this layer deals in 512-byte blocks and
//! linear block indices; the substrate decides how a block range
//! turns into physical transfers.  A plain image file or a
//! byte-granular block device is the simple case.  Optical-media
//! style devices only accept 2048-byte aligned transfers, so any
//! request is split into an aligned middle and buffered partial
//! chunks at either end.  Floppies are handled by the track
//! layer in `floppy.rs`, which implements this same trait.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::result::{Error, Result};

/// The size of a volume block, in bytes.  The unit of all
/// addressing in this crate.
pub const BLOCK_SIZE: usize = 512;

/// Transfer granularity of coarse (optical-media style) devices,
/// in bytes and in blocks.
pub const CHUNK_SIZE: usize = 2048;
pub const CHUNK_BLOCKS: usize = CHUNK_SIZE / BLOCK_SIZE;

/// Uniform access to a block-addressable medium.
///
/// `buf` lengths must be multiples of [`BLOCK_SIZE`]; the block
/// count of a transfer is implied by the buffer length.
pub trait BlockDev {
    fn read_blocks(&mut self, start: u32, buf: &mut [u8]) -> Result<()>;
    fn write_blocks(&mut self, start: u32, buf: &[u8]) -> Result<()>;

    /// Total capacity of the medium, in blocks.
    fn total_blocks(&self) -> u32;

    /// True when per-byte seeks are cheap.  Decides whether the
    /// allocation table is accessed directly or through the
    /// in-memory cache.
    fn is_byte_addressable(&self) -> bool {
        true
    }

    /// Low-level formats the medium, where the medium has such a
    /// notion.  A no-op everywhere but the floppy substrate.
    fn format_medium(&mut self) -> Result<()> {
        Ok(())
    }

    /// Pushes out any buffered writes.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Tracks that failed to read during this invocation, as
    /// (track, head) pairs.  Empty everywhere but the floppy
    /// substrate.
    fn take_track_errors(&mut self) -> Vec<(u16, u8)> {
        Vec::new()
    }
}

fn check_range(start: u32, len: usize, total: u32) -> Result<()> {
    if len % BLOCK_SIZE != 0 {
        return Err(Error::BadArgs);
    }
    let nblocks = (len / BLOCK_SIZE) as u64;
    if u64::from(start) + nblocks > u64::from(total) {
        return Err(Error::Corrupt("block address out of range"));
    }
    Ok(())
}

/// A volume held in an image file or on a byte-granular block
/// device.
pub struct FileDev {
    file: File,
    blocks: u32,
}

impl FileDev {
    /// Opens an existing image or device.
    pub fn open(path: &Path, writable: bool) -> Result<FileDev> {
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(path)?;
        let len = file.metadata()?.len();
        let blocks = (len / BLOCK_SIZE as u64) as u32;
        Ok(FileDev { file, blocks })
    }

    /// Creates a fresh image of the given capacity, truncating
    /// anything already at `path`.
    pub fn create(path: &Path, blocks: u32) -> Result<FileDev> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(u64::from(blocks) * BLOCK_SIZE as u64)?;
        Ok(FileDev { file, blocks })
    }
}

impl BlockDev for FileDev {
    fn read_blocks(&mut self, start: u32, buf: &mut [u8]) -> Result<()> {
        check_range(start, buf.len(), self.blocks)?;
        self.file
            .seek(SeekFrom::Start(u64::from(start) * BLOCK_SIZE as u64))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_blocks(&mut self, start: u32, buf: &[u8]) -> Result<()> {
        check_range(start, buf.len(), self.blocks)?;
        self.file
            .seek(SeekFrom::Start(u64::from(start) * BLOCK_SIZE as u64))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn total_blocks(&self) -> u32 {
        self.blocks
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

/// A volume on a device that only accepts 2048-byte aligned
/// transfers in 2048-byte multiples.
///
/// Any block range is split into a partial prefix, an aligned
/// middle, and a partial suffix.  The partials go through a
/// chunk-sized bounce buffer; writes to a partial chunk are
/// read-modify-write.
pub struct CoarseDev {
    file: File,
    blocks: u32,
}

impl CoarseDev {
    pub fn open(path: &Path, writable: bool) -> Result<CoarseDev> {
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(path)?;
        let len = file.metadata()?.len();
        let blocks = (len / BLOCK_SIZE as u64) as u32;
        Ok(CoarseDev { file, blocks })
    }

    fn read_chunk(&mut self, chunk: u32, buf: &mut [u8]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(u64::from(chunk) * CHUNK_SIZE as u64))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_chunk(&mut self, chunk: u32, buf: &[u8]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(u64::from(chunk) * CHUNK_SIZE as u64))?;
        self.file.write_all(buf)?;
        Ok(())
    }
}

impl BlockDev for CoarseDev {
    fn read_blocks(&mut self, start: u32, buf: &mut [u8]) -> Result<()> {
        check_range(start, buf.len(), self.blocks)?;
        let mut block = start;
        let mut buf = buf;
        // Partial prefix up to the next chunk boundary.
        let head = block as usize % CHUNK_BLOCKS;
        if head != 0 {
            let nb = usize::min(CHUNK_BLOCKS - head, buf.len() / BLOCK_SIZE);
            let mut chunk = [0u8; CHUNK_SIZE];
            self.read_chunk(block / CHUNK_BLOCKS as u32, &mut chunk)?;
            let off = head * BLOCK_SIZE;
            let (dst, rest) = buf.split_at_mut(nb * BLOCK_SIZE);
            dst.copy_from_slice(&chunk[off..off + nb * BLOCK_SIZE]);
            block += nb as u32;
            buf = rest;
        }
        // Aligned middle, as one transfer.
        let mid = buf.len() / CHUNK_SIZE * CHUNK_SIZE;
        if mid != 0 {
            let (dst, rest) = buf.split_at_mut(mid);
            self.read_chunk(block / CHUNK_BLOCKS as u32, dst)?;
            block += (mid / BLOCK_SIZE) as u32;
            buf = rest;
        }
        // Partial suffix.
        if !buf.is_empty() {
            let mut chunk = [0u8; CHUNK_SIZE];
            self.read_chunk(block / CHUNK_BLOCKS as u32, &mut chunk)?;
            let n = buf.len();
            buf.copy_from_slice(&chunk[..n]);
        }
        Ok(())
    }

    fn write_blocks(&mut self, start: u32, buf: &[u8]) -> Result<()> {
        check_range(start, buf.len(), self.blocks)?;
        let mut block = start;
        let mut buf = buf;
        let head = block as usize % CHUNK_BLOCKS;
        if head != 0 {
            let nb = usize::min(CHUNK_BLOCKS - head, buf.len() / BLOCK_SIZE);
            let chunkno = block / CHUNK_BLOCKS as u32;
            let mut chunk = [0u8; CHUNK_SIZE];
            self.read_chunk(chunkno, &mut chunk)?;
            let off = head * BLOCK_SIZE;
            let (src, rest) = buf.split_at(nb * BLOCK_SIZE);
            chunk[off..off + nb * BLOCK_SIZE].copy_from_slice(src);
            self.write_chunk(chunkno, &chunk)?;
            block += nb as u32;
            buf = rest;
        }
        let mid = buf.len() / CHUNK_SIZE * CHUNK_SIZE;
        if mid != 0 {
            let (src, rest) = buf.split_at(mid);
            self.write_chunk(block / CHUNK_BLOCKS as u32, src)?;
            block += (mid / BLOCK_SIZE) as u32;
            buf = rest;
        }
        if !buf.is_empty() {
            let chunkno = block / CHUNK_BLOCKS as u32;
            let mut chunk = [0u8; CHUNK_SIZE];
            self.read_chunk(chunkno, &mut chunk)?;
            chunk[..buf.len()].copy_from_slice(buf);
            self.write_chunk(chunkno, &chunk)?;
        }
        Ok(())
    }

    fn total_blocks(&self) -> u32 {
        self.blocks
    }

    fn is_byte_addressable(&self) -> bool {
        false
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

/// An in-memory volume, the test double for every substrate.
#[cfg(test)]
pub struct MemDev {
    pub data: Vec<u8>,
}

#[cfg(test)]
impl MemDev {
    pub fn new(blocks: u32) -> MemDev {
        MemDev { data: vec![0u8; blocks as usize * BLOCK_SIZE] }
    }
}

#[cfg(test)]
impl BlockDev for MemDev {
    fn read_blocks(&mut self, start: u32, buf: &mut [u8]) -> Result<()> {
        check_range(start, buf.len(), self.total_blocks())?;
        let off = start as usize * BLOCK_SIZE;
        buf.copy_from_slice(&self.data[off..off + buf.len()]);
        Ok(())
    }

    fn write_blocks(&mut self, start: u32, buf: &[u8]) -> Result<()> {
        check_range(start, buf.len(), self.total_blocks())?;
        let off = start as usize * BLOCK_SIZE;
        self.data[off..off + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn total_blocks(&self) -> u32 {
        (self.data.len() / BLOCK_SIZE) as u32
    }
}
