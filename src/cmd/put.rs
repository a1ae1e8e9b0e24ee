// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Inserting archival files.

use std::fs;
use std::path::{Path, PathBuf};

use log::warn;

use crate::cmd::{self, Media};
use crate::efe;
use crate::efs::file::{self, NewFile};
use crate::result::{Error, Result};
use crate::sel;

pub fn run(
    image: &Path,
    media: Media,
    files: &[String],
    at: usize,
    path: &str,
) -> Result<()> {
    let files = expand(files)?;
    let mut vol = cmd::open_volume(image, media, true)?;
    let mut dir = vol.resolve_path(&sel::parse_path(path)?)?;
    let mut next = at;
    for path in &files {
        let bytes = fs::read(path)?;
        let header = match efe::parse_header(&bytes) {
            Ok(header) => header,
            Err(e) => {
                warn!("{}: {e}", path.display());
                continue;
            }
        };
        let new = NewFile {
            kind: header.kind,
            name: header.name,
            blocks: header.blocks,
            part: header.part,
            data: &bytes[efe::HEADER_SIZE..],
            os_version: os_version(header.kind, &bytes),
        };
        let slot = file::insert(&mut vol, &mut dir, next, &new)?;
        println!(
            "inserted {} at slot {slot} ({} blocks)",
            header.name_str(),
            header.blocks
        );
        next = slot + 1;
    }
    cmd::dir::listing(&mut vol, &dir);
    vol.close()
}

/// A lone `all` selects every EFE in the working directory,
/// sorted by name.
fn expand(files: &[String]) -> Result<Vec<PathBuf>> {
    if files.len() != 1 || !files[0].eq_ignore_ascii_case("all") {
        if files.is_empty() {
            return Err(Error::BadArgs);
        }
        return Ok(files.iter().map(PathBuf::from).collect());
    }
    let mut found = Vec::new();
    for entry in fs::read_dir(".")? {
        let path = entry?.path();
        let is_efe = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("efe"));
        if is_efe {
            found.push(path);
        }
    }
    found.sort();
    if found.is_empty() {
        return Err(Error::BadArgs);
    }
    Ok(found)
}

/// The OS-version bytes an operating-system archive carries,
/// at its family's fixed offset within the file.
fn os_version(kind: u8, bytes: &[u8]) -> Option<[u8; 4]> {
    let off = efe::os_version_offset(kind)?;
    let raw = bytes.get(off..off + 4)?;
    let mut version = [0u8; 4];
    version.copy_from_slice(raw);
    Some(version)
}
