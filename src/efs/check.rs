// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Structural diagnostics.
//!
//! The checker never goes through [`Volume::open`]: its whole
//! point is to describe media that would fail to open.  It
//! reads the prologue raw, reports every header field, walks
//! the allocation table counting free and allocated entries,
//! compares the count against the declared free counter, and
//! verifies each sub-directory's child count against its
//! contents.  At the verbose level it also dumps every
//! root-directory slot, raw and decoded.
//!
//! [`Volume::open`]: super::Volume::open

use bitflags::bitflags;
use byteorder::{BigEndian, ByteOrder};

use crate::blockdev::{BLOCK_SIZE, BlockDev};
use crate::efs::dir::{DIR_BYTES, Directory, ENTRY_SIZE, Entry, SIG_OFFSET, SLOTS};
use crate::efs::{
    DIR_BLOCK, FAT_BLOCK, ID_BLOCK, IdFields, OS_BLOCK, fat, fat_blocks_for,
    parse_id_block, parse_os_block,
};
use crate::result::Result;

bitflags! {
    /// Everything the checker can hold against a volume.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Defects: u32 {
        const ID_SIG = 1 << 0;
        const OS_SIG = 1 << 1;
        const DIR_SIG = 1 << 2;
        const FAT_SIG = 1 << 3;
        const FREE_COUNT = 1 << 4;
        const LINK_RANGE = 1 << 5;
        const CHILD_COUNT = 1 << 6;
    }
}

/// What a check pass found.
pub struct Report {
    pub id: Option<IdFields>,
    pub declared_free: u32,
    pub counted_free: u32,
    pub counted_used: u32,
    pub defects: Defects,
}

impl Report {
    pub fn is_clean(&self) -> bool {
        self.defects.is_empty()
    }
}

fn read_entry(table: &[u8], block: u32) -> u32 {
    let off = (block / fat::ENTRIES_PER_BLOCK) as usize * BLOCK_SIZE
        + (block % fat::ENTRIES_PER_BLOCK) as usize * 3;
    BigEndian::read_u24(&table[off..off + 3])
}

/// Runs the diagnostics, printing as it goes.  `verbose` adds
/// the root-directory dump.
pub fn check(dev: &mut dyn BlockDev, verbose: bool) -> Result<Report> {
    let mut defects = Defects::empty();
    let mut block = [0u8; BLOCK_SIZE];

    dev.read_blocks(ID_BLOCK, &mut block)?;
    let id = match parse_id_block(&block) {
        Ok(id) => Some(id),
        Err(_) => {
            defects |= Defects::ID_SIG;
            None
        }
    };
    match id {
        Some(id) => {
            println!("identifier block:");
            println!("  sectors per track  {}", id.sectors);
            println!("  heads              {}", id.heads);
            println!("  tracks             {}", id.tracks);
            println!("  total blocks       {}", id.total_blocks);
            println!(
                "  label              {:?}",
                String::from_utf8_lossy(&id.label)
            );
        }
        None => println!("identifier block: \"ID\" signature missing"),
    }

    dev.read_blocks(OS_BLOCK, &mut block)?;
    let mut declared_free = 0;
    match parse_os_block(&block) {
        Ok((free, version)) => {
            declared_free = free;
            println!("os block:");
            println!("  free blocks        {free}");
            println!("  os version         {version:?}");
        }
        Err(_) => {
            defects |= Defects::OS_SIG;
            println!("os block: \"OS\" signature missing");
        }
    }

    let mut dirs = [0u8; DIR_BYTES];
    dev.read_blocks(DIR_BLOCK, &mut dirs)?;
    let root_signed = &dirs[SIG_OFFSET..SIG_OFFSET + 2] == b"DR";
    if root_signed {
        println!("root directory:      \"DR\" signature present");
    } else {
        defects |= Defects::DIR_SIG;
        println!("root directory:      \"DR\" signature missing");
    }

    // Walk the table.  Without a believable identifier block,
    // size the walk from the medium itself.
    let total = match id {
        Some(id) if id.total_blocks <= dev.total_blocks() => id.total_blocks,
        _ => dev.total_blocks(),
    };
    let fat_blocks = fat_blocks_for(total);
    let mut table = vec![0u8; fat_blocks as usize * BLOCK_SIZE];
    dev.read_blocks(FAT_BLOCK, &mut table)?;
    for (fatno, tb) in table.chunks(BLOCK_SIZE).enumerate() {
        if &tb[510..512] != b"FB" {
            defects |= Defects::FAT_SIG;
            println!("table block {fatno}: \"FB\" signature missing");
        }
    }
    let mut counted_free = 0u32;
    let mut counted_used = 0u32;
    for entry in 0..total {
        let link = read_entry(&table, entry);
        if link == fat::FREE {
            counted_free += 1;
        } else {
            counted_used += 1;
            if link != fat::END_OF_CHAIN && link >= total {
                defects |= Defects::LINK_RANGE;
            }
        }
    }
    println!("allocation table:    {counted_used} used, {counted_free} free");
    if !defects.contains(Defects::OS_SIG) && counted_free != declared_free {
        defects |= Defects::FREE_COUNT;
        println!(
            "free count mismatch: declared {declared_free}, counted \
             {counted_free}"
        );
    }

    // Child counts of the root's sub-directories.
    if root_signed {
        for slot in 0..SLOTS {
            let entry =
                Entry::decode(&dirs[slot * ENTRY_SIZE..(slot + 1) * ENTRY_SIZE]);
            if !entry.is_subdir() || entry.start >= total {
                continue;
            }
            let second = read_entry(&table, entry.start);
            if second <= fat::END_OF_CHAIN || second >= total {
                defects |= Defects::LINK_RANGE;
                continue;
            }
            let mut raw = [0u8; DIR_BYTES];
            dev.read_blocks(entry.start, &mut raw[..BLOCK_SIZE])?;
            dev.read_blocks(second, &mut raw[BLOCK_SIZE..])?;
            let Ok(sub) = Directory::decode(entry.start, [entry.start, second], &raw)
            else {
                defects |= Defects::DIR_SIG;
                println!("slot {slot}: sub-directory signature missing");
                continue;
            };
            let live = sub.live_entries();
            if live != usize::from(entry.size) {
                defects |= Defects::CHILD_COUNT;
                println!(
                    "slot {slot}: child count {} but {live} entries",
                    entry.size
                );
            }
        }
    }

    if verbose {
        for slot in 0..SLOTS {
            let raw = &dirs[slot * ENTRY_SIZE..(slot + 1) * ENTRY_SIZE];
            let hex: String = raw.iter().map(|b| format!("{b:02x} ")).collect();
            println!("slot {slot:2}: {hex}");
            let e = Entry::decode(raw);
            if !e.is_empty() {
                println!("         {e}");
            }
        }
    }

    if defects.is_empty() {
        println!("no defects found");
    } else {
        println!("defects: {defects:?}");
    }
    Ok(Report { id, declared_free, counted_free, counted_used, defects })
}
