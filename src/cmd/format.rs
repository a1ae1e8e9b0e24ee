// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Creating empty volumes.

use std::path::Path;

use crate::blockdev::{BlockDev, FileDev};
use crate::cmd::{self, Media};
use crate::efs::format::{format_volume, parse_size};
use crate::efs::{FAT_BLOCK, LABEL_LEN, fat_blocks_for};
use crate::floppy::{FloppyDev, ImageDrive};
use crate::result::{Error, Result};

pub fn run(
    target: &Path,
    kind: &str,
    size: Option<&str>,
    label: Option<&str>,
    media: Media,
    quiet: bool,
) -> Result<()> {
    let size = match (kind, size) {
        ("e", None) => "eps",
        ("a", None) => "asr",
        (_, Some(size)) => size,
        // An image format needs an explicit size.
        ("i", None) => return Err(Error::BadSize),
        _ => return Err(Error::BadArgs),
    };
    let (total, geom) = parse_size(size)?;
    let label = label.unwrap_or("");
    if label.len() > LABEL_LEN || !label.is_ascii() {
        return Err(Error::BadArgs);
    }
    cmd::confirm(
        &format!(
            "format {} as {total} blocks, erasing everything on it?",
            target.display()
        ),
        quiet,
    )?;

    let floppy = kind != "i" && media == Media::Floppy;
    let mut dev: Box<dyn BlockDev> = if floppy {
        let geom = geom.ok_or(Error::BadSize)?;
        Box::new(FloppyDev::with_geometry(
            ImageDrive::create(target, geom)?,
            geom,
        ))
    } else {
        Box::new(FileDev::create(target, total)?)
    };
    format_volume(dev.as_mut(), total, cmd::pad_name(label), geom)?;
    println!(
        "formatted {} as {total} blocks ({} free)",
        target.display(),
        total - FAT_BLOCK - fat_blocks_for(total)
    );
    Ok(())
}
