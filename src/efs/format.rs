// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Volume creation.
//!
//! Formatting lays down the fixed prologue on a blank medium:
//! the filler block, the identifier block, an OS block whose
//! free counter already excludes the overhead, the empty root
//! directory, and an allocation table with the overhead blocks
//! marked allocated.  On a floppy the medium is low-level
//! formatted first, track by track, with the skew the sampler
//! expects.
//!
//! Sizes come either from a named preset (the four sampler
//! geometries) or from a byte count with an optional `K` or `M`
//! suffix, which must land on a block boundary.

use log::info;

use crate::blockdev::{BLOCK_SIZE, BlockDev};
use crate::efs::dir;
use crate::efs::{
    DIR_BLOCK, FAT_BLOCK, FILLER_BLOCK, ID_BLOCK, IdFields, LABEL_LEN,
    OS_BLOCK, build_id_block, build_os_block, fat, fat_blocks_for,
    filler_block,
};
use crate::floppy::Geometry;
use crate::result::{Error, Result};

/// Resolves a size specification to a block count and, for the
/// preset names, the matching floppy geometry.
pub fn parse_size(spec: &str) -> Result<(u32, Option<Geometry>)> {
    let geom = match spec.to_ascii_lowercase().as_str() {
        "eps" => Some(Geometry::DD),
        "asr" => Some(Geometry::HD),
        "eps-super" => Some(Geometry::DD_SUPER),
        "asr-super" => Some(Geometry::HD_SUPER),
        _ => None,
    };
    if let Some(geom) = geom {
        return Ok((geom.total_blocks(), Some(geom)));
    }
    let spec = spec.trim();
    let (digits, scale) = match spec.as_bytes().last() {
        Some(b'k') | Some(b'K') => (&spec[..spec.len() - 1], 1024u64),
        Some(b'm') | Some(b'M') => (&spec[..spec.len() - 1], 1024 * 1024),
        _ => (spec, 1),
    };
    let bytes = digits
        .parse::<u64>()
        .map_err(|_| Error::BadSize)?
        .checked_mul(scale)
        .ok_or(Error::BadSize)?;
    if bytes == 0 || bytes % BLOCK_SIZE as u64 != 0 || bytes > u64::from(u32::MAX) * 512
    {
        return Err(Error::BadSize);
    }
    let total = (bytes / BLOCK_SIZE as u64) as u32;
    Ok((total, Geometry::for_total(total)))
}

/// Formats a volume of `total` blocks onto the medium.
pub fn format_volume(
    dev: &mut dyn BlockDev,
    total: u32,
    label: [u8; LABEL_LEN],
    geom: Option<Geometry>,
) -> Result<()> {
    let fat_blocks = fat_blocks_for(total);
    let overhead = FAT_BLOCK + fat_blocks;
    if total <= overhead || total > dev.total_blocks() {
        return Err(Error::BadSize);
    }
    info!(
        "formatting {total} blocks, {fat_blocks} table blocks, label {:?}",
        String::from_utf8_lossy(&label)
    );
    dev.format_medium()?;

    dev.write_blocks(FILLER_BLOCK, &filler_block())?;

    let id = IdFields {
        sectors: geom.map_or(0, |g| g.sectors),
        heads: 2,
        tracks: geom.map_or(0, |g| g.tracks),
        total_blocks: total,
        label,
    };
    dev.write_blocks(ID_BLOCK, &build_id_block(&id))?;
    dev.write_blocks(OS_BLOCK, &build_os_block(total - overhead, [0u8; 4]))?;

    let mut dirs = [0u8; 2 * BLOCK_SIZE];
    dirs[dir::SIG_OFFSET..dir::SIG_OFFSET + 2].copy_from_slice(b"DR");
    dev.write_blocks(DIR_BLOCK, &dirs)?;

    let mut table = vec![0u8; fat_blocks as usize * BLOCK_SIZE];
    for block in 0..overhead {
        let off = (block / fat::ENTRIES_PER_BLOCK) as usize * BLOCK_SIZE
            + (block % fat::ENTRIES_PER_BLOCK) as usize * 3;
        table[off + 2] = fat::END_OF_CHAIN as u8;
    }
    for block in table.chunks_mut(BLOCK_SIZE) {
        block[510..512].copy_from_slice(b"FB");
    }
    dev.write_blocks(FAT_BLOCK, &table)?;
    dev.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockdev::MemDev;
    use crate::efs::Volume;
    use crate::floppy::{FloppyDev, ImageDrive};

    #[test]
    fn parse_named_and_numeric_sizes() {
        assert_eq!(parse_size("eps").unwrap(), (1600, Some(Geometry::DD)));
        assert_eq!(parse_size("ASR").unwrap(), (3200, Some(Geometry::HD)));
        assert_eq!(
            parse_size("eps-super").unwrap(),
            (5100, Some(Geometry::DD_SUPER))
        );
        assert_eq!(
            parse_size("asr-super").unwrap(),
            (10200, Some(Geometry::HD_SUPER))
        );
        assert_eq!(parse_size("800K").unwrap(), (1600, Some(Geometry::DD)));
        assert_eq!(parse_size("1024000").unwrap(), (2000, None));
        assert_eq!(parse_size("1m").unwrap().0, 2048);
        assert!(parse_size("800").is_err());
        assert!(parse_size("zero").is_err());
        assert!(parse_size("0").is_err());
    }

    #[test]
    fn fresh_eps_floppy_layout() {
        let mut dev = MemDev::new(1600);
        format_volume(&mut dev, 1600, *b"EPSWRK ", Some(Geometry::DD)).unwrap();

        let mut block = [0u8; BLOCK_SIZE];
        dev.read_blocks(0, &mut block).unwrap();
        assert!(block.chunks(2).all(|p| p == [0x6D, 0xB6]));

        dev.read_blocks(1, &mut block).unwrap();
        assert_eq!(block[5], 0x0A);
        assert_eq!(block[9], 0x50);
        assert_eq!(&block[14..18], &[0x00, 0x00, 0x06, 0x40]);
        assert_eq!(&block[31..38], b"EPSWRK ");
        assert_eq!(&block[38..40], b"ID");

        dev.read_blocks(2, &mut block).unwrap();
        assert_eq!(&block[0..4], &[0x00, 0x00, 0x06, 0x31]);
        assert_eq!(&block[28..30], b"OS");

        // Ten table blocks, each signed, overhead marked used.
        for fatno in 0..10u32 {
            dev.read_blocks(5 + fatno, &mut block).unwrap();
            assert_eq!(&block[510..512], b"FB");
        }
        dev.read_blocks(5, &mut block).unwrap();
        for entry in 0..15 {
            assert_eq!(
                &block[entry * 3..entry * 3 + 3],
                &[0x00, 0x00, 0x01],
                "entry {entry}"
            );
        }
        assert_eq!(&block[15 * 3..16 * 3], &[0x00, 0x00, 0x00]);

        let vol = Volume::open(Box::new(dev)).unwrap();
        assert_eq!(vol.free_blocks, 1585);
        assert_eq!(vol.first_data_block(), 15);
    }

    #[test]
    fn at_block_count_at_boundary() {
        // A multiple of 170 needs exactly total/170 table blocks.
        let mut dev = MemDev::new(1700);
        format_volume(&mut dev, 1700, *b"EVEN   ", None).unwrap();
        let vol = Volume::open(Box::new(dev)).unwrap();
        assert_eq!(vol.fat_blocks(), 10);
        assert_eq!(vol.free_blocks, 1700 - 15);

        let mut dev = MemDev::new(1701);
        format_volume(&mut dev, 1701, *b"ODD    ", None).unwrap();
        let vol = Volume::open(Box::new(dev)).unwrap();
        assert_eq!(vol.fat_blocks(), 11);
        assert_eq!(vol.free_blocks, 1701 - 16);
    }

    #[test]
    fn format_through_the_track_layer() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("floppy.img");
        let drive = ImageDrive::create(&path, Geometry::DD).unwrap();
        let mut dev = FloppyDev::with_geometry(drive, Geometry::DD);
        format_volume(&mut dev, 1600, *b"FLOPPY ", Some(Geometry::DD)).unwrap();

        let drive = ImageDrive::open(&path, false).unwrap();
        let dev = FloppyDev::open(drive).unwrap();
        let mut vol = Volume::open(Box::new(dev)).unwrap();
        assert_eq!(vol.label_str(), "FLOPPY");
        assert_eq!(vol.free_blocks, 1585);
        // The cached table is in force on a floppy substrate.
        assert!(matches!(vol.fat, fat::Fat::Cached { .. }));
        assert_eq!(vol.fat_get(14).unwrap(), fat::END_OF_CHAIN);
        assert_eq!(vol.fat_get(15).unwrap(), fat::FREE);
    }
}
