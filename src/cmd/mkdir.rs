// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Creating sub-directories.

use std::path::Path;

use crate::cmd::{self, Media};
use crate::efs::dir::NAME_LEN;
use crate::efs::file;
use crate::result::{Error, Result};
use crate::sel;

pub fn run(image: &Path, media: Media, name: &str, path: &str) -> Result<()> {
    if name.is_empty() || name.len() > NAME_LEN || !name.is_ascii() {
        return Err(Error::BadArgs);
    }
    let mut vol = cmd::open_volume(image, media, true)?;
    let mut dir = vol.resolve_path(&sel::parse_path(path)?)?;
    let slot = file::mkdir(&mut vol, &mut dir, cmd::pad_name(name))?;
    println!("created directory {name} at slot {slot}");
    cmd::dir::listing(&mut vol, &dir);
    vol.close()
}
