// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Splitting oversized instruments across diskettes, and
//! putting them back together.
//!
//! An instrument bigger than a diskette is carried as several
//! archival files, each a slice of the payload under a copy of
//! the original header with the block count and multi-part
//! index rewritten.  The sampler loads each part independently;
//! nothing on the volume chains the parts together.
//!
//! Slice sizes leave room for the volume overhead: 1585 blocks
//! on an EPS diskette, 3176 on an ASR.  The 255-track images
//! could theoretically hold far larger slices, but the hardware
//! refuses loads past the ASR figure, so the ASR slice is the
//! ceiling everywhere.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::blockdev::BLOCK_SIZE;
use crate::efe;
use crate::result::{Error, Result};

/// Slice sizes, in blocks.
pub const EPS_SLICE_BLOCKS: u16 = 1585;
pub const ASR_SLICE_BLOCKS: u16 = 3176;

/// Resolves a slice-size name.
pub fn slice_blocks(name: &str) -> Result<u16> {
    match name.to_ascii_lowercase().as_str() {
        "eps" | "eps-super" => Ok(EPS_SLICE_BLOCKS),
        "asr" | "asr-super" => Ok(ASR_SLICE_BLOCKS),
        _ => Err(Error::BadArgs),
    }
}

/// Loads an archival file, insisting it is an instrument whose
/// declared block count matches its actual length.
fn load_instrument(path: &Path) -> Result<(efe::Header, Vec<u8>)> {
    let bytes = fs::read(path)?;
    let header = efe::parse_header(&bytes)?;
    if header.kind != efe::KIND_INSTRUMENT {
        return Err(Error::NotAnInstrument);
    }
    if bytes.len() != efe::HEADER_SIZE + header.payload_len() {
        return Err(Error::LengthMismatch);
    }
    Ok((header, bytes[efe::HEADER_SIZE..].to_vec()))
}

/// The output path for one part: two-digit part number appended
/// to the stem, directory and extension preserved.
fn part_path(src: &Path, part: usize) -> PathBuf {
    let stem = src
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match src.extension() {
        Some(ext) => format!("{stem}{part:02}.{}", ext.to_string_lossy()),
        None => format!("{stem}{part:02}"),
    };
    src.with_file_name(name)
}

/// Splits an instrument archive into disk-sized parts,
/// returning the paths written.
pub fn split(src: &Path, slice: u16) -> Result<Vec<PathBuf>> {
    let (header, payload) = load_instrument(src)?;
    if header.blocks <= slice {
        return Err(Error::BadArgs);
    }
    let mut paths = Vec::new();
    let mut remaining = header.blocks;
    let mut offset = 0usize;
    while remaining > 0 {
        let blocks = remaining.min(slice);
        let part = paths.len() + 1;
        let sliced = efe::Header {
            blocks,
            part: part as u8,
            ..header
        };
        let path = part_path(src, part);
        let len = usize::from(blocks) * BLOCK_SIZE;
        let mut out = Vec::with_capacity(efe::HEADER_SIZE + len);
        out.extend_from_slice(&efe::build_header(&sliced));
        out.extend_from_slice(&payload[offset..offset + len]);
        fs::write(&path, out)?;
        info!("wrote part {part}, {blocks} blocks, to {}", path.display());
        paths.push(path);
        remaining -= blocks;
        offset += len;
    }
    Ok(paths)
}

/// Joins multi-part archives back into one instrument at `out`.
pub fn join(parts: &[PathBuf], out: &Path) -> Result<()> {
    let mut joined: Option<(efe::Header, Vec<u8>)> = None;
    for path in parts {
        let (header, payload) = load_instrument(path)?;
        if let Some((first, data)) = joined.as_mut() {
            let total = u32::from(first.blocks) + u32::from(header.blocks);
            if total > u32::from(u16::MAX) {
                return Err(Error::LengthMismatch);
            }
            first.blocks = total as u16;
            data.extend_from_slice(&payload);
        } else {
            joined = Some((header, payload));
        }
    }
    let Some((mut header, payload)) = joined else {
        return Err(Error::BadArgs);
    };
    header.part = 0;
    let mut bytes = Vec::with_capacity(efe::HEADER_SIZE + payload.len());
    bytes.extend_from_slice(&efe::build_header(&header));
    bytes.extend_from_slice(&payload);
    fs::write(out, bytes)?;
    info!("joined {} parts, {} blocks, into {}", parts.len(), header.blocks, out.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instrument_file(dir: &Path, blocks: u16) -> PathBuf {
        let header = efe::Header {
            kind: efe::KIND_INSTRUMENT,
            name: *b"GRAND PIANO ",
            blocks,
            contig: blocks,
            start_lo: 15,
            part: 0,
        };
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&efe::build_header(&header));
        for block in 0..u32::from(blocks) {
            bytes.extend(std::iter::repeat_n(block as u8, BLOCK_SIZE));
        }
        let path = dir.join("GRAND.efe");
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn split_then_join_is_identity() {
        let tmp = tempfile::tempdir().unwrap();
        let src = instrument_file(tmp.path(), 4000);
        let original = fs::read(&src).unwrap();

        let parts = split(&src, ASR_SLICE_BLOCKS).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], tmp.path().join("GRAND01.efe"));
        assert_eq!(parts[1], tmp.path().join("GRAND02.efe"));

        let one = fs::read(&parts[0]).unwrap();
        let two = fs::read(&parts[1]).unwrap();
        let h1 = efe::parse_header(&one).unwrap();
        let h2 = efe::parse_header(&two).unwrap();
        assert_eq!((h1.blocks, h1.part), (3176, 1));
        assert_eq!((h2.blocks, h2.part), (824, 2));

        // Payload concatenation matches the original payload.
        let mut payload = one[efe::HEADER_SIZE..].to_vec();
        payload.extend_from_slice(&two[efe::HEADER_SIZE..]);
        assert_eq!(payload, original[efe::HEADER_SIZE..]);

        let out = tmp.path().join("JOINED.efe");
        join(&parts, &out).unwrap();
        assert_eq!(fs::read(&out).unwrap(), original);
    }

    #[test]
    fn split_refuses_non_instruments() {
        let tmp = tempfile::tempdir().unwrap();
        let header = efe::Header {
            kind: 4,
            name: *b"SOME BANK   ",
            blocks: 1,
            contig: 1,
            start_lo: 0,
            part: 0,
        };
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&efe::build_header(&header));
        bytes.extend_from_slice(&[0u8; BLOCK_SIZE]);
        let path = tmp.path().join("BANK.efe");
        fs::write(&path, bytes).unwrap();
        assert!(matches!(
            split(&path, EPS_SLICE_BLOCKS),
            Err(Error::NotAnInstrument)
        ));
    }

    #[test]
    fn split_refuses_short_archives() {
        let tmp = tempfile::tempdir().unwrap();
        let src = instrument_file(tmp.path(), 100);
        assert!(split(&src, EPS_SLICE_BLOCKS).is_err());
    }

    #[test]
    fn length_mismatch_detected() {
        let tmp = tempfile::tempdir().unwrap();
        let src = instrument_file(tmp.path(), 4000);
        let mut bytes = fs::read(&src).unwrap();
        bytes.truncate(bytes.len() - BLOCK_SIZE);
        fs::write(&src, bytes).unwrap();
        assert!(matches!(
            split(&src, ASR_SLICE_BLOCKS),
            Err(Error::LengthMismatch)
        ));
    }

    #[test]
    fn slice_names() {
        assert_eq!(slice_blocks("eps").unwrap(), 1585);
        assert_eq!(slice_blocks("ASR").unwrap(), 3176);
        assert_eq!(slice_blocks("asr-super").unwrap(), 3176);
        assert!(slice_blocks("huge").is_err());
    }
}
