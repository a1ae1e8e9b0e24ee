// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Freeing slots.

use std::path::Path;

use log::warn;

use crate::cmd::{self, Media};
use crate::efs::file;
use crate::result::{Error, Result};
use crate::sel;

pub fn run(image: &Path, media: Media, slots: &str, path: &str) -> Result<()> {
    let mut vol = cmd::open_volume(image, media, true)?;
    let mut dir = vol.resolve_path(&sel::parse_path(path)?)?;
    for slot in sel::parse_slots(slots)? {
        if dir.entries[slot].is_empty() {
            continue;
        }
        let name = dir.entries[slot].name_str();
        match file::erase(&mut vol, &mut dir, slot) {
            Ok(()) => println!("erased slot {slot} ({name})"),
            // A populated sub-directory is a warning, not the
            // end of the batch.
            Err(Error::DirectoryNotEmpty) => {
                warn!("slot {slot} ({name}): {}", Error::DirectoryNotEmpty);
            }
            Err(e) => return Err(e),
        }
    }
    cmd::dir::listing(&mut vol, &dir);
    vol.close()
}
