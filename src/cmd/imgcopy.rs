// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Byte-copying one image to another.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use log::debug;

use crate::cmd;
use crate::result::Result;

pub fn run(source: &Path, target: &Path, quiet: bool) -> Result<()> {
    cmd::confirm(
        &format!("copy {} over {}?", source.display(), target.display()),
        quiet,
    )?;
    let mut input = BufReader::new(File::open(source)?);
    let mut out = BufWriter::new(File::create(target)?);
    let mut buf = [0u8; 64 * 1024];
    let mut copied = 0u64;
    loop {
        let n = input.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        copied += n as u64;
        debug!("copied {copied} bytes");
    }
    out.flush()?;
    println!(
        "copied {copied} bytes from {} to {}",
        source.display(),
        target.display()
    );
    Ok(())
}
