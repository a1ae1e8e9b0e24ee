// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Splitting oversized instrument archives.

use std::path::Path;

use crate::result::Result;
use crate::split;

pub fn run(file: &Path, size: &str) -> Result<()> {
    let slice = split::slice_blocks(size)?;
    let parts = split::split(file, slice)?;
    println!("split {} into {} parts:", file.display(), parts.len());
    for part in parts {
        println!("  {}", part.display());
    }
    Ok(())
}
