// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The skip-table archival containers.
//!
//! Both flavours wrap a whole volume as one header block
//! followed by only the blocks worth keeping.  The header
//! carries an ASCII label, a bitmap of one bit per volume block
//! with set bits marking blocks omitted from the stream, and a
//! disk-type byte; the block stream ends with a single `0x1A`
//! sentinel.  The EPS flavour covers 1600 blocks with a 200-byte
//! table, the ASR flavour 3200 blocks with a 400-byte table at a
//! lower offset.
//!
//! Encoding consults the volume's allocation table: a free
//! block is skipped, everything else is appended.  Decoding
//! replays the bitmap, emitting the stock filler pattern for
//! skipped blocks, and so is bit-exact for any image whose free
//! blocks carry the filler.
//!
//! A few of these files circulate with every `0x0A` doubled to
//! `0x0D 0x0A` by some Mac transfer tool of the nineties.  The
//! damage is recognizable from the first three bytes and
//! reversible by streaming the file back through
//! [`repair_mac_damage`].

use std::io::{Read, Write};

use bit_field::BitField;
use log::{debug, warn};
use static_assertions::const_assert_eq;

use crate::blockdev::{BLOCK_SIZE, BlockDev};
use crate::efs::{fat, fat_blocks_for, filler_block};
use crate::result::{Error, Result};

/// End-of-stream sentinel.
const SENTINEL: u8 = 0x1A;

/// Header offset of the label text.
const LABEL_OFFSET: usize = 2;

/// Header offset of the disk-type byte.
const DISK_TYPE_OFFSET: usize = 511;

const EPS_LABEL: &[u8] = b"Ensoniq EPS disk image";
const ASR_LABEL: &[u8] = b"Ensoniq ASR disk image";

// Each table byte covers eight blocks; the two tables must
// cover their volumes exactly.
const_assert_eq!(200 * 8, 1600);
const_assert_eq!(400 * 8, 3200);

/// The two container flavours.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flavour {
    Eps,
    Asr,
}

impl Flavour {
    pub fn blocks(self) -> u32 {
        match self {
            Flavour::Eps => 1600,
            Flavour::Asr => 3200,
        }
    }

    fn label(self) -> &'static [u8] {
        match self {
            Flavour::Eps => EPS_LABEL,
            Flavour::Asr => ASR_LABEL,
        }
    }

    fn table_offset(self) -> usize {
        match self {
            Flavour::Eps => 0xA0,
            Flavour::Asr => 0x60,
        }
    }

    fn table_len(self) -> usize {
        match self {
            Flavour::Eps => 200,
            Flavour::Asr => 400,
        }
    }

    fn disk_type(self) -> u8 {
        match self {
            Flavour::Eps => 0x01,
            Flavour::Asr => 0x02,
        }
    }

    /// The flavour able to wrap a volume of `total` blocks, if
    /// any.
    pub fn for_total(total: u32) -> Option<Flavour> {
        match total {
            1600 => Some(Flavour::Eps),
            3200 => Some(Flavour::Asr),
            _ => None,
        }
    }

    /// Recognizes a container header.
    pub fn detect(header: &[u8]) -> Option<Flavour> {
        if header.len() < BLOCK_SIZE || header[0] != 0x0D || header[1] != 0x0A {
            return None;
        }
        [Flavour::Eps, Flavour::Asr].into_iter().find(|f| {
            header[LABEL_OFFSET..].starts_with(f.label())
        })
    }

    /// Picks a flavour from a file extension (`ede` or `eda`).
    pub fn from_extension(ext: &str) -> Option<Flavour> {
        match ext.to_ascii_lowercase().as_str() {
            "ede" => Some(Flavour::Eps),
            "eda" => Some(Flavour::Asr),
            _ => None,
        }
    }
}

/// Reads the allocation table straight off the medium and
/// returns the skip bitmap: one set bit per free block.
fn skip_table(dev: &mut dyn BlockDev, flavour: Flavour) -> Result<Vec<u8>> {
    let total = flavour.blocks();
    let fat_blocks = fat_blocks_for(total);
    let mut table = vec![0u8; fat_blocks as usize * BLOCK_SIZE];
    dev.read_blocks(crate::efs::FAT_BLOCK, &mut table)?;
    let mut skips = vec![0u8; flavour.table_len()];
    for block in 0..total as usize {
        let sig = block / fat::ENTRIES_PER_BLOCK as usize * BLOCK_SIZE + 510;
        if &table[sig..sig + 2] != b"FB" {
            return Err(Error::Corrupt("allocation table signature missing"));
        }
        let off = block / fat::ENTRIES_PER_BLOCK as usize * BLOCK_SIZE
            + block % fat::ENTRIES_PER_BLOCK as usize * 3;
        let free = table[off] == 0 && table[off + 1] == 0 && table[off + 2] == 0;
        skips[block / 8].set_bit(block % 8, free);
    }
    Ok(skips)
}

/// Wraps the volume on `dev` as a skip-table container.
pub fn encode(dev: &mut dyn BlockDev, out: &mut dyn Write) -> Result<Flavour> {
    let flavour =
        Flavour::for_total(dev.total_blocks()).ok_or(Error::WrongMedium)?;
    let skips = skip_table(dev, flavour)?;

    let mut header = [0u8; BLOCK_SIZE];
    header[0] = 0x0D;
    header[1] = 0x0A;
    header[LABEL_OFFSET..LABEL_OFFSET + flavour.label().len()]
        .copy_from_slice(flavour.label());
    let toff = flavour.table_offset();
    header[toff..toff + skips.len()].copy_from_slice(&skips);
    header[DISK_TYPE_OFFSET] = flavour.disk_type();
    out.write_all(&header)?;

    // Stream the present blocks, one transfer per contiguous
    // run.
    let total = flavour.blocks();
    let mut kept = 0u32;
    let mut block = 0u32;
    while block < total {
        if skips[block as usize / 8].get_bit(block as usize % 8) {
            block += 1;
            continue;
        }
        let mut run = 1u32;
        while block + run < total
            && !skips[(block + run) as usize / 8].get_bit((block + run) as usize % 8)
        {
            run += 1;
        }
        let mut buf = vec![0u8; run as usize * BLOCK_SIZE];
        dev.read_blocks(block, &mut buf)?;
        out.write_all(&buf)?;
        kept += run;
        block += run;
    }
    out.write_all(&[SENTINEL])?;
    debug!("kept {kept} of {total} blocks");
    Ok(flavour)
}

/// Unwraps a skip-table container onto `dev`, which must have
/// the flavour's exact capacity.
pub fn decode(input: &mut dyn Read, dev: &mut dyn BlockDev) -> Result<Flavour> {
    let mut header = [0u8; BLOCK_SIZE];
    input.read_exact(&mut header)?;
    let flavour = Flavour::detect(&header).ok_or(Error::NotEnsoniq)?;
    let total = flavour.blocks();
    if dev.total_blocks() != total {
        return Err(Error::WrongMedium);
    }
    let toff = flavour.table_offset();
    let skips = &header[toff..toff + flavour.table_len()];

    let filler = filler_block();
    let mut image = vec![0u8; total as usize * BLOCK_SIZE];
    for block in 0..total as usize {
        let dst = &mut image[block * BLOCK_SIZE..(block + 1) * BLOCK_SIZE];
        if skips[block / 8].get_bit(block % 8) {
            dst.copy_from_slice(&filler);
        } else {
            input.read_exact(dst)?;
        }
    }
    dev.write_blocks(0, &image)?;

    let mut sentinel = [0u8; 1];
    match input.read_exact(&mut sentinel) {
        Ok(()) if sentinel[0] == SENTINEL => {}
        _ => warn!("container stream missing its end sentinel"),
    }
    Ok(flavour)
}

/// True when the first three bytes of a file show the doubled
/// line endings some Mac transfer tools left behind: the
/// leading CRLF arrives as `0D 0D 0A`.
pub fn is_mac_damaged(first: &[u8]) -> bool {
    first.len() >= 3 && first[0] == 0x0D && first[1] == 0x0D && first[2] == 0x0A
}

/// Undoes the doubled line endings, streaming: every `0D 0A`
/// pair collapses back to `0A`.
pub fn repair_mac_damage(
    input: &mut dyn Read,
    out: &mut dyn Write,
) -> Result<u64> {
    let mut written = 0u64;
    let mut pending_cr = false;
    let mut buf = [0u8; 8192];
    loop {
        let n = input.read(&mut buf)?;
        if n == 0 {
            break;
        }
        for &b in &buf[..n] {
            if pending_cr {
                if b == 0x0A {
                    out.write_all(&[0x0A])?;
                    written += 1;
                    pending_cr = false;
                    continue;
                }
                out.write_all(&[0x0D])?;
                written += 1;
                pending_cr = false;
            }
            if b == 0x0D {
                pending_cr = true;
            } else {
                out.write_all(&[b])?;
                written += 1;
            }
        }
    }
    if pending_cr {
        out.write_all(&[0x0D])?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockdev::MemDev;
    use crate::efs::FAT_BLOCK;
    use byteorder::{BigEndian, ByteOrder};

    /// A contrived 1600-block image: filler everywhere, a valid
    /// allocation table marking only the table itself (5..=14)
    /// and one file at 500..=510 allocated, and a recognizable
    /// pattern in the file blocks.
    fn contrived_image() -> MemDev {
        let mut dev = MemDev::new(1600);
        let filler = filler_block();
        for block in 0..1600usize {
            dev.data[block * BLOCK_SIZE..(block + 1) * BLOCK_SIZE]
                .copy_from_slice(&filler);
        }
        let mut table = vec![0u8; 10 * BLOCK_SIZE];
        for block in (5u32..=14).chain(500..=510) {
            let off = (block / fat::ENTRIES_PER_BLOCK) as usize * BLOCK_SIZE
                + (block % fat::ENTRIES_PER_BLOCK) as usize * 3;
            BigEndian::write_u24(&mut table[off..off + 3], fat::END_OF_CHAIN);
        }
        for fatb in table.chunks_mut(BLOCK_SIZE) {
            fatb[510..512].copy_from_slice(b"FB");
        }
        dev.write_blocks(FAT_BLOCK, &table).unwrap();
        for block in 500..=510usize {
            let pattern = vec![block as u8; BLOCK_SIZE];
            dev.write_blocks(block as u32, &pattern).unwrap();
        }
        dev
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut dev = contrived_image();
        let original = dev.data.clone();
        let mut container = Vec::new();
        assert_eq!(encode(&mut dev, &mut container).unwrap(), Flavour::Eps);

        // Header, 21 present blocks, sentinel.
        assert_eq!(container.len(), 512 + 21 * 512 + 1);
        assert_eq!(*container.last().unwrap(), SENTINEL);
        assert_eq!(Flavour::detect(&container), Some(Flavour::Eps));

        // The bitmap has zeros exactly at the present blocks.
        let table = &container[0xA0..0xA0 + 200];
        for block in 0..1600usize {
            let present = (5..=14).contains(&block) || (500..=510).contains(&block);
            assert_eq!(!table[block / 8].get_bit(block % 8), present, "{block}");
        }

        let mut back = MemDev::new(1600);
        let mut input = &container[..];
        assert_eq!(decode(&mut input, &mut back).unwrap(), Flavour::Eps);
        assert_eq!(back.data, original);
    }

    #[test]
    fn decode_rejects_wrong_capacity() {
        let mut dev = contrived_image();
        let mut container = Vec::new();
        encode(&mut dev, &mut container).unwrap();
        let mut hd = MemDev::new(3200);
        let mut input = &container[..];
        assert!(matches!(
            decode(&mut input, &mut hd),
            Err(Error::WrongMedium)
        ));
    }

    #[test]
    fn odd_sized_volume_has_no_flavour() {
        let mut dev = MemDev::new(2000);
        let mut out = Vec::new();
        assert!(matches!(
            encode(&mut dev, &mut out),
            Err(Error::WrongMedium)
        ));
    }

    #[test]
    fn mac_damage_detect_and_repair() {
        let clean: Vec<u8> =
            vec![0x0D, 0x0A, b'E', 0x0A, 0x00, 0x0D, b'x', 0x0A, 0x1A];
        // Double every 0A into 0D 0A.
        let mut damaged = Vec::new();
        for &b in &clean {
            if b == 0x0A {
                damaged.push(0x0D);
            }
            damaged.push(b);
        }
        assert!(is_mac_damaged(&damaged));
        assert!(!is_mac_damaged(&clean));
        let mut repaired = Vec::new();
        let n =
            repair_mac_damage(&mut &damaged[..], &mut repaired).unwrap();
        assert_eq!(repaired, clean);
        assert_eq!(n as usize, clean.len());
    }
}
