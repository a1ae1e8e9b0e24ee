// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The tagged archival container.
//!
//! A small little-endian header: an eight-byte prelude whose
//! last two bytes are the tag count, then ten-byte tag records.
//! One tag kind carries the disk geometry, another the byte
//! offset and length of the raw block image that follows the
//! tags; unknown kinds are skipped.  An ASCII annotation may
//! trail the image and is ignored.
//!
//! Only unwrapping is supported.  Nothing modern produces this
//! container, so the encode direction is refused as an
//! unsupported conversion by the operation layer.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, warn};

use crate::blockdev::{BLOCK_SIZE, BlockDev};
use crate::result::{Error, Result};

/// Prelude: magic plus a format version.
const MAGIC: [u8; 5] = *b"TDDFI";
const VERSION: u8 = 0x01;

/// Tag kinds with meaning.
const TAG_GEOMETRY: u16 = 1;
const TAG_IMAGE: u16 = 10;

const TAG_SIZE: usize = 10;

/// True when the first bytes of a file look like this
/// container.
pub fn is_gkh(prefix: &[u8]) -> bool {
    prefix.len() >= MAGIC.len() && prefix[..MAGIC.len()] == MAGIC
}

/// Everything the header says about the wrapped image.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Info {
    pub sectors: u16,
    pub heads: u16,
    pub tracks: u16,
    pub image_len: u32,
    pub image_offset: u32,
}

impl Info {
    pub fn total_blocks(&self) -> u32 {
        u32::from(self.sectors) * u32::from(self.heads) * u32::from(self.tracks)
    }
}

/// Parses the header, leaving the reader position unspecified.
pub fn parse_header<R: Read + Seek>(input: &mut R) -> Result<Info> {
    input.seek(SeekFrom::Start(0))?;
    let mut prelude = [0u8; 8];
    input.read_exact(&mut prelude)?;
    if !is_gkh(&prelude) {
        return Err(Error::NotEnsoniq);
    }
    if prelude[5] != VERSION {
        warn!("unrecognized container version {}", prelude[5]);
    }
    let ntags = LittleEndian::read_u16(&prelude[6..8]);
    let mut info = Info {
        sectors: 0,
        heads: 0,
        tracks: 0,
        image_len: 0,
        image_offset: 0,
    };
    for _ in 0..ntags {
        let mut tag = [0u8; TAG_SIZE];
        input.read_exact(&mut tag)?;
        match LittleEndian::read_u16(&tag[0..2]) {
            TAG_GEOMETRY => {
                info.sectors = LittleEndian::read_u16(&tag[2..4]);
                info.heads = LittleEndian::read_u16(&tag[4..6]);
                info.tracks = LittleEndian::read_u16(&tag[6..8]);
            }
            TAG_IMAGE => {
                info.image_len = LittleEndian::read_u32(&tag[2..6]);
                info.image_offset = LittleEndian::read_u32(&tag[6..10]);
            }
            kind => debug!("skipping unknown tag kind {kind}"),
        }
    }
    if info.total_blocks() == 0 || info.image_offset == 0 {
        return Err(Error::Corrupt("container header incomplete"));
    }
    Ok(info)
}

/// Unwraps the container onto `dev` as a raw image.
pub fn decode<R: Read + Seek>(
    input: &mut R,
    dev: &mut dyn BlockDev,
) -> Result<Info> {
    let info = parse_header(input)?;
    let total = info.total_blocks();
    if dev.total_blocks() < total {
        return Err(Error::WrongMedium);
    }
    if info.image_len != 0 && info.image_len != total * BLOCK_SIZE as u32 {
        warn!(
            "image length tag {} disagrees with geometry ({} blocks)",
            info.image_len, total
        );
    }
    input.seek(SeekFrom::Start(u64::from(info.image_offset)))?;
    let mut image = vec![0u8; total as usize * BLOCK_SIZE];
    input.read_exact(&mut image)?;
    dev.write_blocks(0, &image)?;
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockdev::MemDev;
    use std::io::Cursor;

    fn container(sectors: u16, heads: u16, tracks: u16) -> Vec<u8> {
        let total = u32::from(sectors) * u32::from(heads) * u32::from(tracks);
        let image_offset = 8 + 3 * TAG_SIZE as u32;
        let mut raw = Vec::new();
        raw.extend_from_slice(&MAGIC);
        raw.push(VERSION);
        raw.extend_from_slice(&3u16.to_le_bytes());
        // An unknown tag first, to exercise the skip.
        let mut tag = [0u8; TAG_SIZE];
        LittleEndian::write_u16(&mut tag[0..2], 99);
        raw.extend_from_slice(&tag);
        let mut tag = [0u8; TAG_SIZE];
        LittleEndian::write_u16(&mut tag[0..2], TAG_GEOMETRY);
        LittleEndian::write_u16(&mut tag[2..4], sectors);
        LittleEndian::write_u16(&mut tag[4..6], heads);
        LittleEndian::write_u16(&mut tag[6..8], tracks);
        raw.extend_from_slice(&tag);
        let mut tag = [0u8; TAG_SIZE];
        LittleEndian::write_u16(&mut tag[0..2], TAG_IMAGE);
        LittleEndian::write_u32(&mut tag[2..6], total * BLOCK_SIZE as u32);
        LittleEndian::write_u32(&mut tag[6..10], image_offset);
        raw.extend_from_slice(&tag);
        for block in 0..total {
            raw.extend(std::iter::repeat_n(block as u8, BLOCK_SIZE));
        }
        raw.extend_from_slice(b"dumped from a well-loved diskette");
        raw
    }

    #[test]
    fn decode_restores_the_image() {
        let raw = container(10, 2, 80);
        let mut dev = MemDev::new(1600);
        let info = decode(&mut Cursor::new(&raw), &mut dev).unwrap();
        assert_eq!(info.total_blocks(), 1600);
        for block in [0usize, 1, 799, 1599] {
            assert!(
                dev.data[block * BLOCK_SIZE..(block + 1) * BLOCK_SIZE]
                    .iter()
                    .all(|&b| b == block as u8)
            );
        }
    }

    #[test]
    fn rejects_foreign_and_truncated_files() {
        let mut dev = MemDev::new(1600);
        let mut raw = container(10, 2, 80);
        raw[0] = b'X';
        assert!(matches!(
            decode(&mut Cursor::new(&raw), &mut dev),
            Err(Error::NotEnsoniq)
        ));
        let raw = container(10, 2, 80);
        let truncated = &raw[..raw.len() / 2];
        assert!(decode(&mut Cursor::new(truncated), &mut dev).is_err());
    }

    #[test]
    fn rejects_undersized_target() {
        let raw = container(20, 2, 80);
        let mut dev = MemDev::new(1600);
        assert!(matches!(
            decode(&mut Cursor::new(&raw), &mut dev),
            Err(Error::WrongMedium)
        ));
    }
}
