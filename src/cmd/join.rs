// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Joining multi-part instrument archives.

use std::path::{Path, PathBuf};

use crate::result::{Error, Result};
use crate::split;

pub fn run(parts: &[PathBuf], output: &Path) -> Result<()> {
    if parts.is_empty() {
        return Err(Error::BadArgs);
    }
    split::join(parts, output)?;
    println!("joined {} parts into {}", parts.len(), output.display());
    Ok(())
}
