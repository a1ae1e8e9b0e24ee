// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Dumping a floppy to an image file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::blockdev::{BLOCK_SIZE, BlockDev};
use crate::floppy::{FloppyDev, ImageDrive};
use crate::giebler::{self, Flavour};
use crate::result::{Error, Result};

pub fn run(device: &Path, output: &Path) -> Result<()> {
    let mut dev = FloppyDev::open(ImageDrive::open(device, false)?)?;
    let ext = output
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    if let Some(wanted) = Flavour::from_extension(&ext) {
        let mut out = BufWriter::new(File::create(output)?);
        let flavour = giebler::encode(&mut dev, &mut out)?;
        if flavour != wanted {
            return Err(Error::WrongMedium);
        }
        out.flush()?;
    } else {
        let total = dev.total_blocks();
        let mut image = vec![0u8; total as usize * BLOCK_SIZE];
        dev.read_blocks(0, &mut image)?;
        let mut out = BufWriter::new(File::create(output)?);
        out.write_all(&image)?;
        out.flush()?;
    }
    let errors = dev.take_track_errors();
    if !errors.is_empty() {
        return Err(Error::TrackErrors(errors));
    }
    println!("dumped {} to {}", device.display(), output.display());
    Ok(())
}
