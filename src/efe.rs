// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Archival files.
//!
//! A single sampler file travels between volumes wrapped in a
//! 512-byte header (the EFE of historical usage): a CRLF, an
//! ASCII tag, the file name and a human-readable type string for
//! anyone who types the file on a terminal, an EOF mark so DOS
//! `type` stops there, and then the directory metadata the
//! insert engine needs to reconstruct the entry.  The payload
//! follows, `blocks * 512` bytes of it.
//!
//! The one-byte type codes are shared with directory entries;
//! the EPS, EPS-16 and ASR families each carry their own codes
//! for several kinds.

use byteorder::{BigEndian, ByteOrder};

use crate::blockdev::BLOCK_SIZE;
use crate::efs::dir;
use crate::result::{Error, Result};

/// Type codes with fixed structural meaning.
pub const KIND_EMPTY: u8 = 0;
pub const KIND_SUBDIR: u8 = 2;
pub const KIND_INSTRUMENT: u8 = 3;
pub const KIND_PARENT: u8 = 8;

/// Operating-system files, per family.
pub const KIND_EPS_OS: u8 = 1;
pub const KIND_EPS16_OS: u8 = 27;
pub const KIND_ASR_OS: u8 = 32;

/// The archival header is one block.
pub const HEADER_SIZE: usize = BLOCK_SIZE;

const TAG: &[u8; 16] = b"Eps File:       ";

/// Header layout.
const H_NAME: usize = 18;
const H_TYPE: usize = 30;
const H_TRAILER: usize = 47;
const H_KIND: usize = 50;
const H_BLOCKS: usize = 52;
const H_CONTIG: usize = 54;
const H_START_LO: usize = 56;
const H_PART: usize = 58;

/// True for the operating-system kinds.
pub fn is_os(kind: u8) -> bool {
    matches!(kind, KIND_EPS_OS | KIND_EPS16_OS | KIND_ASR_OS)
}

/// True for the instrument-bank kinds.
pub fn is_bank(kind: u8) -> bool {
    matches!(kind, 4 | 23 | 30)
}

/// True for kinds that can leave the volume as an archival
/// file.  Directories and the parent pointer cannot.
pub fn is_extractable(kind: u8) -> bool {
    !matches!(kind, KIND_EMPTY | KIND_SUBDIR | KIND_PARENT)
}

/// Byte offset of the OS version within an OS archival file,
/// by family.
pub fn os_version_offset(kind: u8) -> Option<usize> {
    match kind {
        KIND_EPS_OS => Some(0x3A8),
        KIND_EPS16_OS => Some(0x390),
        KIND_ASR_OS => Some(0x6F2),
        _ => None,
    }
}

/// The human-readable name of a type code, at most seven
/// characters.
pub fn kind_name(kind: u8) -> &'static str {
    match kind {
        KIND_EMPTY => "(empty)",
        KIND_EPS_OS => "EPS-OS",
        KIND_SUBDIR => "SubDir",
        KIND_INSTRUMENT => "Instr",
        4 | 23 | 30 => "Bank",
        5 | 25 | 28 => "Seq",
        6 | 26 | 29 => "Song",
        7 => "SysEx",
        KIND_PARENT => "Parent",
        9 | 34 => "Macro",
        24 | 33 => "Effect",
        KIND_EPS16_OS => "E16-OS",
        31 => "A-Trk",
        KIND_ASR_OS => "ASR-OS",
        35..=43 => "WS-File",
        _ => "Unknown",
    }
}

/// The directory metadata carried in an archival header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Header {
    pub kind: u8,
    pub name: [u8; dir::NAME_LEN],
    pub blocks: u16,
    pub contig: u16,
    pub start_lo: u16,
    pub part: u8,
}

impl Header {
    /// The header an extraction synthesizes for a directory
    /// entry.
    pub fn from_entry(e: &dir::Entry) -> Header {
        Header {
            kind: e.kind,
            name: e.name,
            blocks: e.size,
            contig: e.contig,
            start_lo: e.start as u16,
            part: e.part,
        }
    }

    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.name).trim_end().to_string()
    }

    /// Payload length implied by the declared block count.
    pub fn payload_len(&self) -> usize {
        usize::from(self.blocks) * BLOCK_SIZE
    }
}

/// Builds the 512-byte archival header.
pub fn build_header(h: &Header) -> [u8; HEADER_SIZE] {
    let mut raw = [0u8; HEADER_SIZE];
    raw[0] = 0x0D;
    raw[1] = 0x0A;
    raw[2..18].copy_from_slice(TAG);
    raw[H_NAME..H_NAME + dir::NAME_LEN].copy_from_slice(&h.name);
    let mut kind = [b' '; 7];
    let name = kind_name(h.kind).as_bytes();
    kind[..name.len()].copy_from_slice(name);
    raw[H_TYPE..H_TYPE + 7].copy_from_slice(&kind);
    raw[H_TYPE + 7..H_TRAILER].fill(b' ');
    raw[H_TRAILER..H_TRAILER + 3].copy_from_slice(&[0x0D, 0x0A, 0x1A]);
    raw[H_KIND] = h.kind;
    BigEndian::write_u16(&mut raw[H_BLOCKS..H_BLOCKS + 2], h.blocks);
    BigEndian::write_u16(&mut raw[H_CONTIG..H_CONTIG + 2], h.contig);
    BigEndian::write_u16(&mut raw[H_START_LO..H_START_LO + 2], h.start_lo);
    raw[H_PART] = h.part;
    raw
}

/// Parses an archival header, validating the leading CRLF and
/// tag.
pub fn parse_header(raw: &[u8]) -> Result<Header> {
    if raw.len() < HEADER_SIZE {
        return Err(Error::NotEnsoniq);
    }
    if raw[0] != 0x0D || raw[1] != 0x0A || !raw[2..].starts_with(b"Eps File:") {
        return Err(Error::NotEnsoniq);
    }
    let mut name = [0u8; dir::NAME_LEN];
    name.copy_from_slice(&raw[H_NAME..H_NAME + dir::NAME_LEN]);
    Ok(Header {
        kind: raw[H_KIND],
        name,
        blocks: BigEndian::read_u16(&raw[H_BLOCKS..H_BLOCKS + 2]),
        contig: BigEndian::read_u16(&raw[H_CONTIG..H_CONTIG + 2]),
        start_lo: BigEndian::read_u16(&raw[H_START_LO..H_START_LO + 2]),
        part: raw[H_PART],
    })
}
