// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Ensoniq EPS/ASR volume format.
//!
//! A volume is a linear sequence of 512-byte blocks with a
//! fixed prologue: block 0 carries a filler pattern, block 1
//! identifies the medium, block 2 holds the free-block counter,
//! blocks 3 and 4 hold the root directory, and the file
//! allocation table follows from block 5, one three-byte entry
//! per block on the volume.  Everything after the table is file
//! data, reached through per-file chains in the table.
//!
//! All multi-byte integers on the volume are big-endian, as the
//! sampler's 68k-era firmware left them.  Each header structure
//! ends in a two-character ASCII signature; a medium missing the
//! `"ID"` signature is not an Ensoniq volume at all, while a
//! missing table or directory signature on an identified volume
//! means corruption.
//!
//! [`Volume`] is the per-invocation session state: the open
//! substrate, the parsed identity and OS blocks, and the chosen
//! allocation-table access mode.  It is created by one operation
//! and consumed by [`Volume::close`], which writes back any
//! cached state.

use byteorder::{BigEndian, ByteOrder};

use crate::blockdev::{BLOCK_SIZE, BlockDev};
use crate::result::{Error, Result};

pub mod check;
pub mod dir;
pub mod fat;
pub mod file;
pub mod format;
#[cfg(test)]
pub(crate) mod testutil;

/// Fixed block addresses of the volume prologue.
pub const FILLER_BLOCK: u32 = 0;
pub const ID_BLOCK: u32 = 1;
pub const OS_BLOCK: u32 = 2;
pub const DIR_BLOCK: u32 = 3;
pub const FAT_BLOCK: u32 = 5;

/// Identifier-block layout.
const ID_DEVICE_TYPE: usize = 1;
const ID_REMOVABLE: usize = 2;
const ID_VERSION: usize = 3;
const ID_SECTORS: usize = 5;
const ID_HEADS: usize = 6;
const ID_TRACKS: usize = 8;
const ID_BLOCK_SIZE: usize = 10;
const ID_TOTAL_BLOCKS: usize = 14;
const ID_MEDIUM: usize = 18;
const ID_DENSITY: usize = 19;
const ID_LABEL_LEADER: usize = 30;
const ID_LABEL: usize = 31;
const ID_SIG: usize = 38;

/// OS-block layout.
const OS_FREE_BLOCKS: usize = 0;
const OS_VERSION: usize = 4;
const OS_SIG: usize = 28;

/// Length of a disk label, in bytes.
pub const LABEL_LEN: usize = 7;

/// The filler pattern carried by block 0 and by blocks a
/// skip-table container omits.
pub const FILLER: [u8; 2] = [0x6D, 0xB6];

/// Returns one block of the alternating filler pattern.
pub fn filler_block() -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    for (i, b) in block.iter_mut().enumerate() {
        *b = FILLER[i % 2];
    }
    block
}

/// Fields of the identifier block that the rest of the crate
/// cares about.
#[derive(Clone, Copy, Debug)]
pub struct IdFields {
    pub sectors: u8,
    pub heads: u16,
    pub tracks: u16,
    pub total_blocks: u32,
    pub label: [u8; LABEL_LEN],
}

/// Builds an identifier block.
pub fn build_id_block(id: &IdFields) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    block[ID_DEVICE_TYPE] = 0x01;
    block[ID_REMOVABLE] = 0x80;
    block[ID_VERSION] = 0x01;
    block[ID_SECTORS] = id.sectors;
    BigEndian::write_u16(&mut block[ID_HEADS..ID_HEADS + 2], id.heads);
    BigEndian::write_u16(&mut block[ID_TRACKS..ID_TRACKS + 2], id.tracks);
    BigEndian::write_u32(
        &mut block[ID_BLOCK_SIZE..ID_BLOCK_SIZE + 4],
        BLOCK_SIZE as u32,
    );
    BigEndian::write_u32(
        &mut block[ID_TOTAL_BLOCKS..ID_TOTAL_BLOCKS + 4],
        id.total_blocks,
    );
    block[ID_MEDIUM] = 0x1E;
    block[ID_DENSITY] = 0x02;
    block[ID_LABEL_LEADER] = 0xFF;
    block[ID_LABEL..ID_LABEL + LABEL_LEN].copy_from_slice(&id.label);
    block[ID_SIG..ID_SIG + 2].copy_from_slice(b"ID");
    block
}

/// Parses an identifier block, validating the signature.
pub fn parse_id_block(block: &[u8]) -> Result<IdFields> {
    if &block[ID_SIG..ID_SIG + 2] != b"ID" {
        return Err(Error::NotEnsoniq);
    }
    let mut label = [0u8; LABEL_LEN];
    label.copy_from_slice(&block[ID_LABEL..ID_LABEL + LABEL_LEN]);
    Ok(IdFields {
        sectors: block[ID_SECTORS],
        heads: BigEndian::read_u16(&block[ID_HEADS..ID_HEADS + 2]),
        tracks: BigEndian::read_u16(&block[ID_TRACKS..ID_TRACKS + 2]),
        total_blocks: BigEndian::read_u32(
            &block[ID_TOTAL_BLOCKS..ID_TOTAL_BLOCKS + 4],
        ),
        label,
    })
}

/// Builds an OS block.
pub fn build_os_block(free_blocks: u32, version: [u8; 4]) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    BigEndian::write_u32(
        &mut block[OS_FREE_BLOCKS..OS_FREE_BLOCKS + 4],
        free_blocks,
    );
    block[OS_VERSION..OS_VERSION + 4].copy_from_slice(&version);
    block[OS_SIG..OS_SIG + 2].copy_from_slice(b"OS");
    block
}

/// Parses an OS block, validating the signature.
pub fn parse_os_block(block: &[u8]) -> Result<(u32, [u8; 4])> {
    if &block[OS_SIG..OS_SIG + 2] != b"OS" {
        return Err(Error::NotEnsoniq);
    }
    let free = BigEndian::read_u32(&block[OS_FREE_BLOCKS..OS_FREE_BLOCKS + 4]);
    let mut version = [0u8; 4];
    version.copy_from_slice(&block[OS_VERSION..OS_VERSION + 4]);
    Ok((free, version))
}

/// Number of allocation-table blocks needed to cover a volume.
pub fn fat_blocks_for(total_blocks: u32) -> u32 {
    total_blocks.div_ceil(fat::ENTRIES_PER_BLOCK)
}

/// An open volume: the substrate plus the parsed header state.
/// One invocation owns exactly one of these.
pub struct Volume {
    pub(crate) dev: Box<dyn BlockDev>,
    pub sectors: u8,
    pub heads: u16,
    pub tracks: u16,
    pub total_blocks: u32,
    pub label: [u8; LABEL_LEN],
    pub free_blocks: u32,
    pub os_version: [u8; 4],
    pub(crate) fat: fat::Fat,
}

impl Volume {
    /// Opens a volume on the given substrate, parsing and
    /// validating the identifier and OS blocks.
    pub fn open(mut dev: Box<dyn BlockDev>) -> Result<Volume> {
        let mut block = [0u8; BLOCK_SIZE];
        dev.read_blocks(ID_BLOCK, &mut block)?;
        let id = parse_id_block(&block)?;
        if id.total_blocks > dev.total_blocks() {
            return Err(Error::Corrupt("volume larger than its medium"));
        }
        if id.total_blocks <= FAT_BLOCK + fat_blocks_for(id.total_blocks) {
            return Err(Error::Corrupt("volume has no data region"));
        }
        dev.read_blocks(OS_BLOCK, &mut block)?;
        let (free_blocks, os_version) = parse_os_block(&block)?;
        let fat =
            fat::Fat::open(dev.as_mut(), fat_blocks_for(id.total_blocks))?;
        Ok(Volume {
            dev,
            sectors: id.sectors,
            heads: id.heads,
            tracks: id.tracks,
            total_blocks: id.total_blocks,
            label: id.label,
            free_blocks,
            os_version,
            fat,
        })
    }

    /// Number of allocation-table blocks on this volume.
    pub fn fat_blocks(&self) -> u32 {
        fat_blocks_for(self.total_blocks)
    }

    /// First block of the data region.
    pub fn first_data_block(&self) -> u32 {
        FAT_BLOCK + self.fat_blocks()
    }

    /// The disk label with trailing padding removed.
    pub fn label_str(&self) -> String {
        String::from_utf8_lossy(&self.label).trim_end().to_string()
    }

    /// Reads the allocation-table entry for `block`.
    pub fn fat_get(&mut self, block: u32) -> Result<u32> {
        if block >= self.total_blocks {
            return Err(Error::Corrupt("block address out of range"));
        }
        self.fat.get(self.dev.as_mut(), block)
    }

    /// Writes the allocation-table entry for `block`.
    pub fn fat_put(&mut self, block: u32, value: u32) -> Result<()> {
        if block >= self.total_blocks {
            return Err(Error::Corrupt("block address out of range"));
        }
        self.fat.put(self.dev.as_mut(), block, value)
    }

    /// Rewrites the OS block from the in-memory free counter and
    /// version field.
    pub fn save_os_block(&mut self) -> Result<()> {
        let block = build_os_block(self.free_blocks, self.os_version);
        self.dev.write_blocks(OS_BLOCK, &block)
    }

    /// Writes back any cached allocation table, flushes the
    /// substrate, and surfaces the per-track error list if the
    /// medium had unreadable tracks.
    pub fn close(mut self) -> Result<()> {
        self.fat.writeback(self.dev.as_mut())?;
        self.dev.flush()?;
        let errors = self.dev.take_track_errors();
        if !errors.is_empty() {
            return Err(Error::TrackErrors(errors));
        }
        Ok(())
    }
}
