// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Restoring an image file to a floppy.
//!
//! The density comes from the medium itself (the calibration
//! step); an image that does not fit the sensed geometry is a
//! flavour mismatch, not a resize.

use std::io::Cursor;
use std::path::Path;

use crate::blockdev::{BLOCK_SIZE, BlockDev};
use crate::cmd::convert::{self, Kind};
use crate::floppy::{FloppyDev, ImageDrive};
use crate::giebler;
use crate::gkh;
use crate::result::{Error, Result};

pub fn run(device: &Path, input: &Path) -> Result<()> {
    let bytes = convert::load_repaired(input)?;
    let mut dev = FloppyDev::open(ImageDrive::open(device, true)?)?;
    match convert::classify(&bytes) {
        Kind::Skip(_) => {
            giebler::decode(&mut Cursor::new(&bytes), &mut dev)?;
        }
        Kind::Gkh => {
            let info = gkh::parse_header(&mut Cursor::new(&bytes))?;
            if info.total_blocks() != dev.total_blocks() {
                return Err(Error::WrongMedium);
            }
            gkh::decode(&mut Cursor::new(&bytes), &mut dev)?;
        }
        Kind::Raw => {
            if bytes.len() != dev.total_blocks() as usize * BLOCK_SIZE {
                return Err(Error::WrongMedium);
            }
            dev.write_blocks(0, &bytes)?;
        }
    }
    dev.flush()?;
    println!("wrote {} to {}", input.display(), device.display());
    Ok(())
}
