// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Directories.
//!
//! A directory is 1024 bytes spread over two blocks: 39 entries
//! of 26 bytes, a zeroed tail, and the `"DR"` signature in the
//! last two bytes.  The root directory always occupies blocks 3
//! and 4; a sub-directory is a two-block chain anywhere in the
//! data region, so its second block comes from the allocation
//! table and the pair may not be adjacent.
//!
//! Slot 0 of a non-root directory is reserved for the parent
//! pointer, a type-8 entry whose start field names the parent
//! directory's first block and whose contiguous-count field
//! holds the slot this directory occupies in the parent.  A
//! sub-directory's own entry in its parent keeps a live count of
//! the children in its size field; the engines maintain that
//! count on every insert and erase.

use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use static_assertions::const_assert;

use crate::blockdev::BLOCK_SIZE;
use crate::efe;
use crate::efs::{DIR_BLOCK, Volume, fat};
use crate::result::{Error, Result};

/// Slots per directory.
pub const SLOTS: usize = 39;

/// Bytes per directory entry.
pub const ENTRY_SIZE: usize = 26;

/// Bytes per directory: two blocks.
pub const DIR_BYTES: usize = 2 * BLOCK_SIZE;

/// Where the `"DR"` signature lives within the two-block pair.
pub const SIG_OFFSET: usize = 1022;

// The entry array must leave room for the zeroed tail and the
// signature.
const_assert!(SLOTS * ENTRY_SIZE <= SIG_OFFSET);

/// Length of an entry name.
pub const NAME_LEN: usize = 12;

/// Entry layout.
const E_KIND: usize = 1;
const E_NAME: usize = 2;
const E_SIZE: usize = 14;
const E_CONTIG: usize = 16;
const E_START: usize = 18;
const E_PART: usize = 22;

/// One directory entry.
///
/// `size` is the chain length in blocks for file entries and the
/// child count for sub-directory entries.  `contig` is the
/// length of the leading contiguous run for file entries and the
/// parent's slot index for parent-pointer entries.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Entry {
    pub kind: u8,
    pub name: [u8; NAME_LEN],
    pub size: u16,
    pub contig: u16,
    pub start: u32,
    pub part: u8,
}

impl Entry {
    pub fn decode(raw: &[u8]) -> Entry {
        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&raw[E_NAME..E_NAME + NAME_LEN]);
        Entry {
            kind: raw[E_KIND],
            name,
            size: BigEndian::read_u16(&raw[E_SIZE..E_SIZE + 2]),
            contig: BigEndian::read_u16(&raw[E_CONTIG..E_CONTIG + 2]),
            start: BigEndian::read_u32(&raw[E_START..E_START + 4]),
            part: raw[E_PART],
        }
    }

    pub fn encode(&self, raw: &mut [u8]) {
        raw[..ENTRY_SIZE].fill(0);
        raw[E_KIND] = self.kind;
        raw[E_NAME..E_NAME + NAME_LEN].copy_from_slice(&self.name);
        BigEndian::write_u16(&mut raw[E_SIZE..E_SIZE + 2], self.size);
        BigEndian::write_u16(&mut raw[E_CONTIG..E_CONTIG + 2], self.contig);
        BigEndian::write_u32(&mut raw[E_START..E_START + 4], self.start);
        raw[E_PART] = self.part;
    }

    pub fn is_empty(&self) -> bool {
        self.kind == efe::KIND_EMPTY
    }

    pub fn is_subdir(&self) -> bool {
        self.kind == efe::KIND_SUBDIR
    }

    pub fn is_parent_pointer(&self) -> bool {
        self.kind == efe::KIND_PARENT
    }

    /// The entry name with trailing padding removed.
    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.name).trim_end().to_string()
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:7} {:12} {:5} blocks  start {:<6} contig {}",
            efe::kind_name(self.kind),
            self.name_str(),
            self.size,
            self.start,
            self.contig,
        )?;
        if self.part != 0 {
            write!(f, "  part {}", self.part)?;
        }
        Ok(())
    }
}

/// An in-memory directory, tied to the blocks it was read from.
#[derive(Clone)]
pub struct Directory {
    pub start: u32,
    pub blocks: [u32; 2],
    pub entries: [Entry; SLOTS],
}

impl Directory {
    /// A blank directory to be placed at the given block pair.
    pub fn empty(blocks: [u32; 2]) -> Directory {
        Directory { start: blocks[0], blocks, entries: [Entry::default(); SLOTS] }
    }

    /// The parent pointer, when this is a sub-directory:
    /// (parent start block, slot index in the parent).
    pub fn parent(&self) -> Option<(u32, usize)> {
        let e = &self.entries[0];
        e.is_parent_pointer().then_some((e.start, e.contig as usize))
    }

    /// First unused slot at or after `from`.
    pub fn free_slot(&self, from: usize) -> Result<usize> {
        (from..SLOTS)
            .find(|&i| self.entries[i].is_empty())
            .ok_or(Error::DirectoryFull)
    }

    /// Occupied slots, not counting the parent pointer; the
    /// number a parent's child count must agree with.
    pub fn live_entries(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| !e.is_empty() && !e.is_parent_pointer())
            .count()
    }

    /// Iterates over the occupied slots as (index, entry).
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Entry)> {
        self.entries.iter().enumerate().filter(|(_, e)| !e.is_empty())
    }

    pub(crate) fn decode(
        start: u32,
        blocks: [u32; 2],
        raw: &[u8],
    ) -> Result<Directory> {
        if &raw[SIG_OFFSET..SIG_OFFSET + 2] != b"DR" {
            return Err(Error::Corrupt("directory signature missing"));
        }
        let mut entries = [Entry::default(); SLOTS];
        for (i, e) in entries.iter_mut().enumerate() {
            *e = Entry::decode(&raw[i * ENTRY_SIZE..(i + 1) * ENTRY_SIZE]);
        }
        Ok(Directory { start, blocks, entries })
    }

    /// Encodes the entries, zero-fills the tail up to the
    /// signature, and signs the pair.
    fn encode(&self) -> [u8; DIR_BYTES] {
        let mut raw = [0u8; DIR_BYTES];
        for (i, e) in self.entries.iter().enumerate() {
            e.encode(&mut raw[i * ENTRY_SIZE..(i + 1) * ENTRY_SIZE]);
        }
        raw[SIG_OFFSET..SIG_OFFSET + 2].copy_from_slice(b"DR");
        raw
    }
}

impl Volume {
    /// Loads the root directory.
    pub fn load_root(&mut self) -> Result<Directory> {
        self.load_dir_at(DIR_BLOCK)
    }

    /// Loads the directory whose first block is `start`.  The
    /// block pair is read in one transfer when adjacent, and
    /// through the allocation table otherwise.
    pub fn load_dir_at(&mut self, start: u32) -> Result<Directory> {
        let blocks = self.dir_blocks(start)?;
        let mut raw = [0u8; DIR_BYTES];
        if blocks[1] == blocks[0] + 1 {
            self.dev.read_blocks(blocks[0], &mut raw)?;
        } else {
            let (a, b) = raw.split_at_mut(BLOCK_SIZE);
            self.dev.read_blocks(blocks[0], a)?;
            self.dev.read_blocks(blocks[1], b)?;
        }
        Directory::decode(start, blocks, &raw)
    }

    /// Writes a directory back to its block pair.
    pub fn save_dir(&mut self, dir: &Directory) -> Result<()> {
        let raw = dir.encode();
        if dir.blocks[1] == dir.blocks[0] + 1 {
            self.dev.write_blocks(dir.blocks[0], &raw)
        } else {
            let (a, b) = raw.split_at(BLOCK_SIZE);
            self.dev.write_blocks(dir.blocks[0], a)?;
            self.dev.write_blocks(dir.blocks[1], b)
        }
    }

    /// Resolves a path of slot indices from the root.
    pub fn resolve_path(&mut self, path: &[usize]) -> Result<Directory> {
        let mut dir = self.load_root()?;
        for &slot in path {
            if slot >= SLOTS {
                return Err(Error::BadSelector);
            }
            let entry = dir.entries[slot];
            if !entry.is_subdir() {
                return Err(Error::BadSelector);
            }
            dir = self.load_dir_at(entry.start)?;
        }
        Ok(dir)
    }

    /// Adjusts the child count kept in the parent's entry for
    /// `dir`.  The child directory must already be saved; the
    /// parent is reloaded, updated, and saved after it.
    pub fn adjust_child_count(
        &mut self,
        dir: &Directory,
        delta: i32,
    ) -> Result<()> {
        let Some((pstart, pslot)) = dir.parent() else {
            return Ok(());
        };
        if pslot >= SLOTS {
            return Err(Error::Corrupt("parent pointer slot out of range"));
        }
        let mut parent = self.load_dir_at(pstart)?;
        let entry = &mut parent.entries[pslot];
        if !entry.is_subdir() {
            return Err(Error::Corrupt("parent pointer names a non-directory"));
        }
        entry.size = (i32::from(entry.size) + delta) as u16;
        self.save_dir(&parent)
    }

    fn dir_blocks(&mut self, start: u32) -> Result<[u32; 2]> {
        if start == DIR_BLOCK {
            return Ok([DIR_BLOCK, DIR_BLOCK + 1]);
        }
        let second = self.fat_get(start)?;
        if second == fat::FREE
            || second == fat::END_OF_CHAIN
            || second >= self.total_blocks
        {
            return Err(Error::Corrupt("directory chain broken"));
        }
        Ok([start, second])
    }
}
