// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Volume listing.

use std::path::Path;

use crate::cmd::{self, Media};
use crate::efs::Volume;
use crate::efs::dir::Directory;
use crate::result::Result;
use crate::sel;

pub fn run(image: &Path, media: Media, path: &str) -> Result<()> {
    let mut vol = cmd::open_volume(image, media, false)?;
    let dir = vol.resolve_path(&sel::parse_path(path)?)?;
    listing(&mut vol, &dir);
    vol.close()
}

/// Prints a directory the way the sampler's own display orders
/// it: label and usage first, then one line per occupied slot.
pub fn listing(vol: &mut Volume, dir: &Directory) {
    println!(
        "{:8} {} of {} blocks free",
        vol.label_str(),
        vol.free_blocks,
        vol.total_blocks
    );
    for (slot, entry) in dir.iter() {
        println!(" [{slot:2}] {entry}");
    }
}
