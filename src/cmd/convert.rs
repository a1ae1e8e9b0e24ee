// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Container translation.
//!
//! The source format is sniffed from its bytes, after undoing
//! Mac line-ending damage when present; the target format comes
//! from the target extension.  Supported directions are
//! skip-table to raw, tagged to raw, and raw to skip-table;
//! anything else is refused.

use std::fs::{self, File};
use std::io::{BufWriter, Cursor};
use std::path::Path;

use log::info;

use crate::blockdev::{BLOCK_SIZE, BlockDev, FileDev};
use crate::giebler::{self, Flavour};
use crate::gkh;
use crate::result::{Error, Result};

/// What a file turned out to hold.
pub enum Kind {
    Skip(Flavour),
    Gkh,
    Raw,
}

/// Sniffs a container format from file content.
pub fn classify(bytes: &[u8]) -> Kind {
    if gkh::is_gkh(bytes) {
        Kind::Gkh
    } else if let Some(flavour) = Flavour::detect(bytes) {
        Kind::Skip(flavour)
    } else {
        Kind::Raw
    }
}

/// Loads a container file, undoing Mac line-ending damage when
/// the leading bytes show it.
pub fn load_repaired(path: &Path) -> Result<Vec<u8>> {
    let bytes = fs::read(path)?;
    if !giebler::is_mac_damaged(&bytes) {
        return Ok(bytes);
    }
    info!("{}: repairing doubled line endings", path.display());
    let mut repaired = Vec::with_capacity(bytes.len());
    giebler::repair_mac_damage(&mut &bytes[..], &mut repaired)?;
    Ok(repaired)
}

fn target_kind(path: &Path) -> Kind {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    if ext.eq_ignore_ascii_case("gkh") {
        Kind::Gkh
    } else if let Some(flavour) = Flavour::from_extension(&ext) {
        Kind::Skip(flavour)
    } else {
        Kind::Raw
    }
}

pub fn run(source: &Path, target: &Path) -> Result<()> {
    let bytes = load_repaired(source)?;
    match (classify(&bytes), target_kind(target)) {
        (Kind::Skip(flavour), Kind::Raw) => {
            let mut dev = FileDev::create(target, flavour.blocks())?;
            giebler::decode(&mut Cursor::new(&bytes), &mut dev)?;
            println!(
                "unwrapped {:?} container into {} blocks",
                flavour,
                flavour.blocks()
            );
            Ok(())
        }
        (Kind::Gkh, Kind::Raw) => {
            let info = gkh::parse_header(&mut Cursor::new(&bytes))?;
            let mut dev = FileDev::create(target, info.total_blocks())?;
            gkh::decode(&mut Cursor::new(&bytes), &mut dev)?;
            println!(
                "unwrapped tagged container into {} blocks",
                info.total_blocks()
            );
            Ok(())
        }
        (Kind::Raw, Kind::Skip(wanted)) => {
            if bytes.len() % BLOCK_SIZE != 0 {
                return Err(Error::NotEnsoniq);
            }
            let mut dev = FileDev::open(source, false)?;
            let flavour = Flavour::for_total(dev.total_blocks())
                .ok_or(Error::WrongMedium)?;
            if flavour != wanted {
                return Err(Error::WrongMedium);
            }
            let mut out = BufWriter::new(File::create(target)?);
            giebler::encode(&mut dev, &mut out)?;
            println!("wrapped {} blocks as {flavour:?}", flavour.blocks());
            Ok(())
        }
        // Nothing produces the tagged container, and the rest
        // are identities.
        _ => Err(Error::UnsupportedConversion),
    }
}
