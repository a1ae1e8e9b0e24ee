// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Structural diagnostics.

use std::path::Path;

use crate::cmd::{self, Media};
use crate::efs::check;
use crate::result::{Error, Result};

pub fn run(image: &Path, media: Media, level: u8) -> Result<()> {
    let mut dev = cmd::open_dev(image, media, false)?;
    let report = check::check(dev.as_mut(), level > 0)?;
    let errors = dev.take_track_errors();
    if !errors.is_empty() {
        return Err(Error::TrackErrors(errors));
    }
    if !report.is_clean() {
        return Err(Error::Corrupt("defects found"));
    }
    Ok(())
}
