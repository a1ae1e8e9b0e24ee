// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Extracting slots to archival files.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use log::warn;

use crate::cmd::{self, Media};
use crate::efe;
use crate::efs::dir::Entry;
use crate::efs::file;
use crate::result::Result;
use crate::sel;

pub fn run(image: &Path, media: Media, slots: &str, path: &str) -> Result<()> {
    let mut vol = cmd::open_volume(image, media, false)?;
    let dir = vol.resolve_path(&sel::parse_path(path)?)?;
    for slot in sel::parse_slots(slots)? {
        let entry = dir.entries[slot];
        if entry.is_empty() {
            continue;
        }
        if !efe::is_extractable(entry.kind) {
            warn!(
                "slot {slot}: skipping {} ({})",
                entry.name_str(),
                efe::kind_name(entry.kind)
            );
            continue;
        }
        let name = output_name(&entry, slot);
        let mut out = BufWriter::new(File::create(&name)?);
        match file::extract(&mut vol, &entry, &mut out) {
            Ok(()) => println!("extracted slot {slot} to {name}"),
            Err(e) => warn!("slot {slot}: {e}"),
        }
    }
    cmd::dir::listing(&mut vol, &dir);
    vol.close()
}

/// A filesystem-safe output name in the working directory.
fn output_name(entry: &Entry, slot: usize) -> String {
    let mut name: String = entry
        .name_str()
        .chars()
        .map(|c| if c == ' ' || c == '/' { '_' } else { c })
        .collect();
    if name.is_empty() {
        name = format!("SLOT{slot}");
    }
    format!("{name}.efe")
}
