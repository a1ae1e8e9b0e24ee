// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared fixtures for the volume-level tests.

use crate::blockdev::{BlockDev, MemDev};
use crate::efs::{self, Volume};
use crate::result::Result;

/// A [`MemDev`] that reports itself non-byte-addressable, so
/// tests can force the cached allocation table.
pub(crate) struct CoarseMem(pub MemDev);

impl BlockDev for CoarseMem {
    fn read_blocks(&mut self, start: u32, buf: &mut [u8]) -> Result<()> {
        self.0.read_blocks(start, buf)
    }

    fn write_blocks(&mut self, start: u32, buf: &[u8]) -> Result<()> {
        self.0.write_blocks(start, buf)
    }

    fn total_blocks(&self) -> u32 {
        self.0.total_blocks()
    }

    fn is_byte_addressable(&self) -> bool {
        false
    }
}

/// A freshly formatted 1600-block volume on an in-memory
/// substrate.
pub(crate) fn fresh_volume(byte_addressable: bool) -> Volume {
    let mut dev = MemDev::new(1600);
    efs::format::format_volume(&mut dev, 1600, *b"TEST   ", None).unwrap();
    if byte_addressable {
        Volume::open(Box::new(dev)).unwrap()
    } else {
        Volume::open(Box::new(CoarseMem(dev))).unwrap()
    }
}
