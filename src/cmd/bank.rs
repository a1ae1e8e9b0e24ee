// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Listing the contents of an instrument-bank archive.
//!
//! Banks store copies of the directory references the sampler
//! needs to reload a performance.  The records are
//! directory-entry shaped; the listing decodes every record in
//! the first payload block that carries a known type code and a
//! printable name.

use std::fs;
use std::path::Path;

use crate::blockdev::BLOCK_SIZE;
use crate::efe;
use crate::efs::dir::{ENTRY_SIZE, Entry};
use crate::result::{Error, Result};

pub fn run(file: &Path) -> Result<()> {
    let bytes = fs::read(file)?;
    let header = efe::parse_header(&bytes)?;
    if !efe::is_bank(header.kind) {
        return Err(Error::NotABank);
    }
    if bytes.len() < efe::HEADER_SIZE + BLOCK_SIZE {
        return Err(Error::LengthMismatch);
    }
    println!(
        "{} ({}, {} blocks)",
        header.name_str(),
        efe::kind_name(header.kind),
        header.blocks
    );
    let payload = &bytes[efe::HEADER_SIZE..efe::HEADER_SIZE + BLOCK_SIZE];
    let mut found = 0;
    for raw in payload.chunks_exact(ENTRY_SIZE) {
        let entry = Entry::decode(raw);
        if plausible(&entry) {
            println!("  {entry}");
            found += 1;
        }
    }
    if found == 0 {
        println!("  no file references found");
    }
    Ok(())
}

fn plausible(entry: &Entry) -> bool {
    !entry.is_empty()
        && !entry.is_parent_pointer()
        && efe::kind_name(entry.kind) != "Unknown"
        && entry.name.iter().all(|&b| (0x20..0x7F).contains(&b))
}
