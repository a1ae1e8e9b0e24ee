// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The file operations: insert, extract, erase, mkdir.
//!
//! Every mutation persists in the same order: data blocks, then
//! allocation-table entries, then the directory slot, then the
//! free-block counter in the OS block.  A crash mid-operation
//! can only leave chained-but-unreachable space, never a
//! directory entry naming unwritten blocks.
//!
//! Placement prefers a single contiguous run and falls back to
//! fragments starting at the first free block.  Either way the
//! data moves in maximal contiguous runs, one transfer per run;
//! per-block transfers would make fragmented inserts unusable on
//! track- and chunk-granular media.

use std::io::Write;

use log::debug;

use crate::blockdev::BLOCK_SIZE;
use crate::efe;
use crate::efs::dir::{Directory, Entry};
use crate::efs::{Volume, fat};
use crate::result::{Error, Result};

/// A file bound for the volume: directory metadata plus the
/// payload.
pub struct NewFile<'a> {
    pub kind: u8,
    pub name: [u8; 12],
    pub blocks: u16,
    pub part: u8,
    pub data: &'a [u8],
    /// OS version bytes, when inserting an operating-system
    /// file.
    pub os_version: Option<[u8; 4]>,
}

/// An allocation plan: the blocks a new chain will occupy, in
/// chain order, and the length of its leading contiguous run.
struct Plan {
    blocks: Vec<u32>,
    contig: u16,
}

/// Scans the table for `needed` free blocks: a single
/// contiguous run when one exists, otherwise the first `needed`
/// free blocks in index order.
fn plan_allocation(vol: &mut Volume, needed: u32) -> Result<Plan> {
    let first_data = vol.first_data_block();
    let mut run_start = 0u32;
    let mut run_len = 0u32;
    let mut frag: Vec<u32> = Vec::new();
    for block in first_data..vol.total_blocks {
        if vol.fat_get(block)? != fat::FREE {
            run_len = 0;
            continue;
        }
        if run_len == 0 {
            run_start = block;
        }
        run_len += 1;
        if (frag.len() as u32) < needed {
            frag.push(block);
        }
        if run_len == needed {
            debug!("allocating {needed} contiguous blocks at {run_start}");
            return Ok(Plan {
                blocks: (run_start..run_start + needed).collect(),
                contig: needed as u16,
            });
        }
    }
    if (frag.len() as u32) < needed {
        // The free counter promised more than the table holds.
        return Err(Error::Corrupt("free count disagrees with table"));
    }
    let mut contig = 1u16;
    while usize::from(contig) < frag.len()
        && frag[usize::from(contig)] == frag[0] + u32::from(contig)
    {
        contig += 1;
    }
    debug!(
        "allocating {needed} fragmented blocks from {}, leading run {contig}",
        frag[0]
    );
    Ok(Plan { blocks: frag, contig })
}

/// Groups a chain-ordered block list into maximal contiguous
/// runs.
fn runs(blocks: &[u32]) -> Vec<(u32, u32)> {
    let mut out: Vec<(u32, u32)> = Vec::new();
    for &b in blocks {
        match out.last_mut() {
            Some((start, len)) if *start + *len == b => *len += 1,
            _ => out.push((b, 1)),
        }
    }
    out
}

/// Links a block list into a chain.
fn link(vol: &mut Volume, blocks: &[u32]) -> Result<()> {
    for pair in blocks.windows(2) {
        vol.fat_put(pair[0], pair[1])?;
    }
    if let Some(&last) = blocks.last() {
        vol.fat_put(last, fat::END_OF_CHAIN)?;
    }
    Ok(())
}

/// Inserts a file into `dir` at the first free slot at or after
/// `start_slot`, returning the slot used.
pub fn insert(
    vol: &mut Volume,
    dir: &mut Directory,
    start_slot: usize,
    file: &NewFile<'_>,
) -> Result<usize> {
    if !efe::is_extractable(file.kind) {
        return Err(Error::BadArgs);
    }
    // Slot allocation comes first: a full directory must fail
    // before any block or table mutation.
    let slot = dir.free_slot(start_slot)?;
    let needed = u32::from(file.blocks);
    if needed == 0 || file.data.len() != needed as usize * BLOCK_SIZE {
        return Err(Error::LengthMismatch);
    }
    if needed > vol.free_blocks {
        return Err(Error::InsufficientSpace);
    }
    let plan = plan_allocation(vol, needed)?;

    let mut off = 0usize;
    for (start, len) in runs(&plan.blocks) {
        let n = len as usize * BLOCK_SIZE;
        vol.dev.write_blocks(start, &file.data[off..off + n])?;
        off += n;
    }
    link(vol, &plan.blocks)?;

    dir.entries[slot] = Entry {
        kind: file.kind,
        name: file.name,
        size: file.blocks,
        contig: plan.contig,
        start: plan.blocks[0],
        part: file.part,
    };
    vol.save_dir(dir)?;
    vol.adjust_child_count(dir, 1)?;

    vol.free_blocks -= needed;
    if efe::is_os(file.kind) {
        if let Some(version) = file.os_version {
            vol.os_version = version;
        }
    }
    vol.save_os_block()?;
    Ok(slot)
}

/// Extracts the file behind a directory entry: the synthesized
/// archival header, then the payload, one transfer per
/// contiguous run.
pub fn extract(
    vol: &mut Volume,
    entry: &Entry,
    out: &mut dyn Write,
) -> Result<()> {
    let header = efe::build_header(&efe::Header::from_entry(entry));
    out.write_all(&header)?;
    let mut walker = fat::RunWalker::new(entry.start);
    let mut copied = 0u32;
    while let Some((start, len)) = vol.next_run(&mut walker)? {
        let mut buf = vec![0u8; len as usize * BLOCK_SIZE];
        vol.dev.read_blocks(start, &mut buf)?;
        out.write_all(&buf)?;
        copied += len;
    }
    if copied != u32::from(entry.size) {
        return Err(Error::Corrupt("chain length disagrees with directory"));
    }
    Ok(())
}

/// Frees the file in `slot`, returning its blocks to the
/// volume.
pub fn erase(vol: &mut Volume, dir: &mut Directory, slot: usize) -> Result<()> {
    let entry = dir.entries[slot];
    if entry.is_empty() || entry.is_parent_pointer() {
        return Err(Error::BadSelector);
    }
    if entry.is_subdir() && entry.size > 0 {
        return Err(Error::DirectoryNotEmpty);
    }
    // Walk before mutating, so a corrupt chain aborts cleanly.
    let blocks = vol.chain_blocks(entry.start)?;
    for &block in &blocks {
        vol.fat_put(block, fat::FREE)?;
    }
    dir.entries[slot] = Entry::default();
    vol.save_dir(dir)?;
    vol.adjust_child_count(dir, -1)?;

    vol.free_blocks += blocks.len() as u32;
    if efe::is_os(entry.kind) {
        vol.os_version = [0u8; 4];
    }
    vol.save_os_block()?;
    Ok(())
}

/// Creates a sub-directory in `dir`, returning the slot used.
pub fn mkdir(
    vol: &mut Volume,
    dir: &mut Directory,
    name: [u8; 12],
) -> Result<usize> {
    let slot = dir.free_slot(1)?;
    if vol.free_blocks < 2 {
        return Err(Error::InsufficientSpace);
    }
    let plan = plan_allocation(vol, 2)?;
    let blocks = [plan.blocks[0], plan.blocks[1]];

    let mut child = Directory::empty(blocks);
    child.entries[0] = Entry {
        kind: efe::KIND_PARENT,
        name: [b' '; 12],
        size: 0,
        contig: slot as u16,
        start: dir.start,
        part: 0,
    };
    vol.save_dir(&child)?;
    link(vol, &blocks)?;

    dir.entries[slot] = Entry {
        kind: efe::KIND_SUBDIR,
        name,
        size: 0,
        contig: plan.contig,
        start: blocks[0],
        part: 0,
    };
    vol.save_dir(dir)?;
    vol.adjust_child_count(dir, 1)?;

    vol.free_blocks -= 2;
    vol.save_os_block()?;
    Ok(slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::efs::dir::SLOTS;
    use crate::efs::testutil::fresh_volume;

    fn payload(blocks: u16) -> Vec<u8> {
        let mut data = vec![0u8; usize::from(blocks) * BLOCK_SIZE];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i / BLOCK_SIZE) as u8 ^ (i % 251) as u8;
        }
        data
    }

    fn instrument<'a>(name: &[u8; 12], data: &'a [u8]) -> NewFile<'a> {
        NewFile {
            kind: efe::KIND_INSTRUMENT,
            name: *name,
            blocks: (data.len() / BLOCK_SIZE) as u16,
            part: 0,
            data,
            os_version: None,
        }
    }

    #[test]
    fn contiguous_insert() {
        let mut vol = fresh_volume(true);
        let mut root = vol.load_root().unwrap();
        let data = payload(3);
        let file = instrument(b"BASS        ", &data);
        let slot = insert(&mut vol, &mut root, 1, &file).unwrap();
        assert_eq!(slot, 1);
        let e = root.entries[1];
        assert_eq!(e.start, 15);
        assert_eq!(e.contig, 3);
        assert_eq!(e.size, 3);
        assert_eq!(vol.fat_get(15).unwrap(), 16);
        assert_eq!(vol.fat_get(16).unwrap(), 17);
        assert_eq!(vol.fat_get(17).unwrap(), fat::END_OF_CHAIN);
        assert_eq!(vol.free_blocks, 1585 - 3);
        // And the counter went to the medium.
        let reopened = vol.load_root().unwrap();
        assert_eq!(reopened.entries[1], e);
    }

    #[test]
    fn fragmented_insert() {
        let mut vol = fresh_volume(true);
        // Only blocks 15, 17, 19, 21 free.
        for block in 15..vol.total_blocks {
            if !matches!(block, 15 | 17 | 19 | 21) {
                vol.fat_put(block, fat::END_OF_CHAIN).unwrap();
            }
        }
        vol.free_blocks = 4;
        vol.save_os_block().unwrap();
        let mut root = vol.load_root().unwrap();
        let data = payload(4);
        let file = instrument(b"FRAG        ", &data);
        insert(&mut vol, &mut root, 1, &file).unwrap();
        let e = root.entries[1];
        assert_eq!(e.start, 15);
        assert_eq!(e.contig, 1);
        assert_eq!(vol.fat_get(15).unwrap(), 17);
        assert_eq!(vol.fat_get(17).unwrap(), 19);
        assert_eq!(vol.fat_get(19).unwrap(), 21);
        assert_eq!(vol.fat_get(21).unwrap(), fat::END_OF_CHAIN);
        assert_eq!(vol.free_blocks, 0);
        // The payload landed block by block.
        let mut out = Vec::new();
        extract(&mut vol, &e, &mut out).unwrap();
        assert_eq!(&out[BLOCK_SIZE..], &data[..]);
    }

    #[test]
    fn extract_roundtrip() {
        let mut vol = fresh_volume(true);
        let mut root = vol.load_root().unwrap();
        let data = payload(5);
        let file = instrument(b"KEYS        ", &data);
        let slot = insert(&mut vol, &mut root, 1, &file).unwrap();
        let mut out = Vec::new();
        extract(&mut vol, &root.entries[slot], &mut out).unwrap();
        let header = efe::parse_header(&out).unwrap();
        assert_eq!(header.blocks, 5);
        assert_eq!(header.name, *b"KEYS        ");
        assert_eq!(&out[BLOCK_SIZE..], &data[..]);
    }

    #[test]
    fn full_directory_fails_before_mutation() {
        let mut vol = fresh_volume(true);
        let mut root = vol.load_root().unwrap();
        for slot in 1..SLOTS {
            root.entries[slot].kind = efe::KIND_INSTRUMENT;
        }
        let free_before = vol.free_blocks;
        let data = payload(1);
        let file = instrument(b"NOPE        ", &data);
        assert!(matches!(
            insert(&mut vol, &mut root, 1, &file),
            Err(Error::DirectoryFull)
        ));
        assert_eq!(vol.free_blocks, free_before);
        assert_eq!(vol.fat_get(15).unwrap(), fat::FREE);
    }

    #[test]
    fn exact_fit_and_overflow() {
        let mut vol = fresh_volume(true);
        let mut root = vol.load_root().unwrap();
        let free = vol.free_blocks;
        let data = payload((free + 1) as u16);
        let file = instrument(b"TOO BIG     ", &data);
        assert!(matches!(
            insert(&mut vol, &mut root, 1, &file),
            Err(Error::InsufficientSpace)
        ));
        let data = payload(free as u16);
        let file = instrument(b"EXACT       ", &data);
        insert(&mut vol, &mut root, 1, &file).unwrap();
        assert_eq!(vol.free_blocks, 0);
    }

    #[test]
    fn length_mismatch_rejected() {
        let mut vol = fresh_volume(true);
        let mut root = vol.load_root().unwrap();
        let data = payload(2);
        let mut file = instrument(b"LIAR        ", &data);
        file.blocks = 3;
        assert!(matches!(
            insert(&mut vol, &mut root, 1, &file),
            Err(Error::LengthMismatch)
        ));
    }

    #[test]
    fn erase_returns_blocks() {
        let mut vol = fresh_volume(true);
        let mut root = vol.load_root().unwrap();
        let data = payload(4);
        let file = instrument(b"GONE        ", &data);
        let slot = insert(&mut vol, &mut root, 1, &file).unwrap();
        let free_after_insert = vol.free_blocks;
        erase(&mut vol, &mut root, slot).unwrap();
        assert_eq!(vol.free_blocks, free_after_insert + 4);
        assert!(root.entries[slot].is_empty());
        for block in 15..19 {
            assert_eq!(vol.fat_get(block).unwrap(), fat::FREE);
        }
    }

    #[test]
    fn erase_of_os_file_clears_version() {
        let mut vol = fresh_volume(true);
        let mut root = vol.load_root().unwrap();
        let data = payload(3);
        let file = NewFile {
            kind: efe::KIND_EPS_OS,
            name: *b"EPS OS 2.40 ",
            blocks: 3,
            part: 0,
            data: &data,
            os_version: Some([2, 4, 0, 0]),
        };
        let slot = insert(&mut vol, &mut root, 0, &file).unwrap();
        assert_eq!(slot, 0);
        assert_eq!(vol.os_version, [2, 4, 0, 0]);
        erase(&mut vol, &mut root, slot).unwrap();
        assert_eq!(vol.os_version, [0, 0, 0, 0]);
    }

    #[test]
    fn erase_of_plain_file_keeps_version() {
        let mut vol = fresh_volume(true);
        vol.os_version = [2, 4, 0, 0];
        vol.save_os_block().unwrap();
        let mut root = vol.load_root().unwrap();
        let data = payload(1);
        let file = instrument(b"SOUND       ", &data);
        let slot = insert(&mut vol, &mut root, 1, &file).unwrap();
        erase(&mut vol, &mut root, slot).unwrap();
        assert_eq!(vol.os_version, [2, 4, 0, 0]);
    }

    #[test]
    fn mkdir_and_child_counts() {
        let mut vol = fresh_volume(true);
        let mut root = vol.load_root().unwrap();
        let slot = mkdir(&mut vol, &mut root, *b"SOUNDS      ").unwrap();
        assert_eq!(slot, 1);
        let e = root.entries[slot];
        assert!(e.is_subdir());
        assert_eq!(e.size, 0);
        assert_eq!(vol.free_blocks, 1585 - 2);

        let mut sub = vol.load_dir_at(e.start).unwrap();
        assert_eq!(sub.parent(), Some((3, 1)));

        // Insert into the sub-directory and watch the parent
        // count move.
        let data = payload(2);
        let file = instrument(b"PAD         ", &data);
        insert(&mut vol, &mut sub, 1, &file).unwrap();
        let root = vol.load_root().unwrap();
        assert_eq!(root.entries[slot].size, 1);
        assert_eq!(sub.live_entries(), 1);

        let mut sub = vol.load_dir_at(e.start).unwrap();
        erase(&mut vol, &mut sub, 1).unwrap();
        let root = vol.load_root().unwrap();
        assert_eq!(root.entries[slot].size, 0);
    }

    #[test]
    fn erase_non_empty_directory_refused() {
        let mut vol = fresh_volume(true);
        let mut root = vol.load_root().unwrap();
        let slot = mkdir(&mut vol, &mut root, *b"SOUNDS      ").unwrap();
        let start = root.entries[slot].start;
        let mut sub = vol.load_dir_at(start).unwrap();
        let data = payload(1);
        let file = instrument(b"PAD         ", &data);
        insert(&mut vol, &mut sub, 1, &file).unwrap();

        let mut root = vol.load_root().unwrap();
        let free_before = vol.free_blocks;
        assert!(matches!(
            erase(&mut vol, &mut root, slot),
            Err(Error::DirectoryNotEmpty)
        ));
        assert_eq!(vol.free_blocks, free_before);
        assert!(root.entries[slot].is_subdir());

        // Empty it out and the erase goes through.
        let mut sub = vol.load_dir_at(start).unwrap();
        erase(&mut vol, &mut sub, 1).unwrap();
        let mut root = vol.load_root().unwrap();
        erase(&mut vol, &mut root, slot).unwrap();
        assert_eq!(vol.free_blocks, 1585);
    }

    #[test]
    fn extract_reads_once_per_run() {
        use crate::blockdev::{BlockDev, MemDev};
        use crate::efs::{Volume, format};
        use std::cell::Cell;
        use std::rc::Rc;

        struct Counting {
            inner: MemDev,
            reads: Rc<Cell<usize>>,
        }

        impl BlockDev for Counting {
            fn read_blocks(&mut self, start: u32, buf: &mut [u8]) -> Result<()> {
                self.reads.set(self.reads.get() + 1);
                self.inner.read_blocks(start, buf)
            }
            fn write_blocks(&mut self, start: u32, buf: &[u8]) -> Result<()> {
                self.inner.write_blocks(start, buf)
            }
            fn total_blocks(&self) -> u32 {
                self.inner.total_blocks()
            }
            fn is_byte_addressable(&self) -> bool {
                // Forces the cached table, so data transfers are
                // the only reads counted below.
                false
            }
        }

        let mut inner = MemDev::new(1600);
        format::format_volume(&mut inner, 1600, *b"COUNT  ", None).unwrap();
        let reads = Rc::new(Cell::new(0));
        let dev = Counting { inner, reads: Rc::clone(&reads) };
        let mut vol = Volume::open(Box::new(dev)).unwrap();
        let mut root = vol.load_root().unwrap();

        let data = payload(5);
        let file = instrument(b"ONE RUN     ", &data);
        let contiguous = insert(&mut vol, &mut root, 1, &file).unwrap();

        // Leave only four scattered blocks free so the next
        // insert fragments into four runs.
        for block in 20..vol.total_blocks {
            if !matches!(block, 21 | 23 | 25 | 27) {
                vol.fat_put(block, fat::END_OF_CHAIN).unwrap();
            }
        }
        vol.free_blocks = 4;
        let data = payload(4);
        let file = instrument(b"FOUR RUNS   ", &data);
        let fragged = insert(&mut vol, &mut root, 2, &file).unwrap();

        reads.set(0);
        let mut out = Vec::new();
        extract(&mut vol, &root.entries[contiguous], &mut out).unwrap();
        assert_eq!(reads.get(), 1);

        reads.set(0);
        let mut out = Vec::new();
        extract(&mut vol, &root.entries[fragged], &mut out).unwrap();
        assert_eq!(reads.get(), 4);
    }

    #[test]
    fn free_count_mismatch_is_corrupt() {
        let mut vol = fresh_volume(true);
        let mut root = vol.load_root().unwrap();
        // Lie about free space: counter says plenty, table says
        // none.
        for block in 15..vol.total_blocks {
            vol.fat_put(block, fat::END_OF_CHAIN).unwrap();
        }
        let data = payload(1);
        let file = instrument(b"LOST        ", &data);
        assert!(matches!(
            insert(&mut vol, &mut root, 1, &file),
            Err(Error::Corrupt("free count disagrees with table"))
        ));
    }
}
