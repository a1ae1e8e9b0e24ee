// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The floppy substrate.
//!
//! Sampler diskettes are plain MFM media: 512-byte sectors, two
//! heads, 80 tracks, 10 sectors per track and head for
//! double-density or 20 for high-density.  The "super" variants
//! keep the per-track geometry and extend the track count to
//! 255; they only ever exist as image files.
//!
//! The controller itself is outside this crate.  Its effective
//! contract is the [`Drive`] trait: calibrate, read a whole
//! track, write a contiguous sector range, format a track.  The
//! [`FloppyDev`] adapter turns that contract into the uniform
//! [`BlockDev`] surface: reads fetch the enclosing track into a
//! scratch buffer, writes are coalesced per track and head and
//! issued as one sector-range transfer.
//!
//! A track that will not read after ten attempts is reported in
//! the per-track error list and the operation carries on; a
//! track that will not write aborts the operation, since that
//! almost always means a write-protected diskette.
//!
//! [`ImageDrive`] implements the contract over an ordinary image
//! file, so every floppy code path is exercisable without
//! hardware.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, warn};

use crate::blockdev::{BLOCK_SIZE, BlockDev};
use crate::result::{Error, Result};

/// How many times an unreadable track is retried before it goes
/// on the error list.
pub const READ_RETRIES: usize = 10;

/// Physical layout of a floppy medium.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Geometry {
    /// Sectors per track and head: 10 double-density, 20
    /// high-density.
    pub sectors: u8,
    pub heads: u8,
    pub tracks: u16,
}

impl Geometry {
    /// 800 KB double-density diskette.
    pub const DD: Geometry = Geometry { sectors: 10, heads: 2, tracks: 80 };
    /// 1.6 MB high-density diskette.
    pub const HD: Geometry = Geometry { sectors: 20, heads: 2, tracks: 80 };
    /// Software-defined 255-track extensions of the two.
    pub const DD_SUPER: Geometry =
        Geometry { sectors: 10, heads: 2, tracks: 255 };
    pub const HD_SUPER: Geometry =
        Geometry { sectors: 20, heads: 2, tracks: 255 };

    pub fn total_blocks(&self) -> u32 {
        u32::from(self.sectors) * u32::from(self.heads) * u32::from(self.tracks)
    }

    /// Recognizes a geometry from a total block count.
    pub fn for_total(blocks: u32) -> Option<Geometry> {
        [Self::DD, Self::HD, Self::DD_SUPER, Self::HD_SUPER]
            .into_iter()
            .find(|g| g.total_blocks() == blocks)
    }

    /// Maps a linear block index to (track, head, sector).
    pub fn chs(&self, block: u32) -> (u16, u8, u8) {
        let n = u32::from(self.sectors);
        let track = block / (2 * n);
        let head = (block - 2 * n * track) / n;
        let sector = block - 2 * n * track - n * head;
        (track as u16, head as u8, sector as u8)
    }

    fn track_bytes(&self) -> usize {
        usize::from(self.sectors) * BLOCK_SIZE
    }
}

/// The effective contract of a floppy controller driver.
///
/// Sector indices here are zero-based positions within one track
/// and head; the driver owns the mapping to physical sector IDs.
pub trait Drive {
    /// Seeks to track zero and senses the medium, returning its
    /// geometry.
    fn calibrate(&mut self) -> Result<Geometry>;

    /// Reads one whole track (`sectors * 512` bytes).
    fn read_track(&mut self, track: u16, head: u8, buf: &mut [u8])
    -> Result<()>;

    /// Writes a contiguous sector range starting at `first`.
    fn write_track(
        &mut self,
        track: u16,
        head: u8,
        first: u8,
        buf: &[u8],
    ) -> Result<()>;

    /// Low-level formats one track.  `order` gives the physical
    /// sector layout, one entry per sector slot.
    fn format_track(&mut self, track: u16, head: u8, order: &[u8])
    -> Result<()>;
}

/// Pending coalesced write: consecutive blocks on one track and
/// head, not yet issued to the drive.
struct Pending {
    track: u16,
    head: u8,
    first: u8,
    data: Vec<u8>,
}

impl Pending {
    fn next_sector(&self) -> u8 {
        self.first + (self.data.len() / BLOCK_SIZE) as u8
    }
}

/// [`BlockDev`] over a [`Drive`].
pub struct FloppyDev<D> {
    drive: D,
    geom: Geometry,
    pending: Option<Pending>,
    errors: Vec<(u16, u8)>,
}

impl<D: Drive> FloppyDev<D> {
    /// Opens a drive, calibrating to sense the medium.
    pub fn open(mut drive: D) -> Result<FloppyDev<D>> {
        let geom = drive.calibrate()?;
        Ok(FloppyDev { drive, geom, pending: None, errors: Vec::new() })
    }

    /// Opens a drive for formatting to a chosen geometry,
    /// skipping the density sense.
    pub fn with_geometry(drive: D, geom: Geometry) -> FloppyDev<D> {
        FloppyDev { drive, geom, pending: None, errors: Vec::new() }
    }

    fn read_whole_track(
        &mut self,
        track: u16,
        head: u8,
        buf: &mut [u8],
    ) -> Result<()> {
        for attempt in 1..=READ_RETRIES {
            match self.drive.read_track(track, head, buf) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!(
                        "track {track}/{head}: read attempt {attempt} \
                         failed: {e}"
                    );
                }
            }
        }
        Err(Error::TrackErrors(vec![(track, head)]))
    }

    fn flush_pending(&mut self) -> Result<()> {
        let Some(p) = self.pending.take() else {
            return Ok(());
        };
        self.drive
            .write_track(p.track, p.head, p.first, &p.data)
            .map_err(|e| match e {
                Error::Io(_) => Error::WriteProtected,
                e => e,
            })
    }

    /// The sector layout for one track, skewed against the
    /// previous track and head so that sequential reads do not
    /// wait out a full revolution: track skew `n - 2`, head skew
    /// `n - 1`.
    fn interleave(&self, track: u16, head: u8) -> Vec<u8> {
        let n = usize::from(self.geom.sectors);
        let skew = (usize::from(track) * (n - 2) + usize::from(head) * (n - 1))
            % n;
        (0..n).map(|i| ((i + skew) % n) as u8).collect()
    }
}

impl<D: Drive> BlockDev for FloppyDev<D> {
    fn read_blocks(&mut self, start: u32, buf: &mut [u8]) -> Result<()> {
        if buf.len() % BLOCK_SIZE != 0 {
            return Err(Error::BadArgs);
        }
        self.flush_pending()?;
        let n = u32::from(self.geom.sectors);
        let mut block = start;
        let mut buf = buf;
        let mut scratch = vec![0u8; self.geom.track_bytes()];
        while !buf.is_empty() {
            let (track, head, sector) = self.geom.chs(block);
            if track >= self.geom.tracks {
                return Err(Error::Corrupt("block address out of range"));
            }
            let avail = (n - u32::from(sector)) as usize;
            let want = usize::min(avail, buf.len() / BLOCK_SIZE);
            match self.read_whole_track(track, head, &mut scratch) {
                Ok(()) => {
                    let off = usize::from(sector) * BLOCK_SIZE;
                    buf[..want * BLOCK_SIZE]
                        .copy_from_slice(&scratch[off..off + want * BLOCK_SIZE]);
                }
                Err(_) => {
                    // Keep going; the caller collects the error
                    // list when the operation completes.
                    warn!("track {track}/{head}: unreadable, substituting zeros");
                    buf[..want * BLOCK_SIZE].fill(0);
                    if !self.errors.contains(&(track, head)) {
                        self.errors.push((track, head));
                    }
                }
            }
            block += want as u32;
            buf = &mut buf[want * BLOCK_SIZE..];
        }
        Ok(())
    }

    fn write_blocks(&mut self, start: u32, buf: &[u8]) -> Result<()> {
        if buf.len() % BLOCK_SIZE != 0 {
            return Err(Error::BadArgs);
        }
        let n = u32::from(self.geom.sectors);
        let mut block = start;
        let mut buf = buf;
        while !buf.is_empty() {
            let (track, head, sector) = self.geom.chs(block);
            if track >= self.geom.tracks {
                return Err(Error::Corrupt("block address out of range"));
            }
            let avail = (n - u32::from(sector)) as usize;
            let want = usize::min(avail, buf.len() / BLOCK_SIZE);
            let (src, rest) = buf.split_at(want * BLOCK_SIZE);
            let coalesces = matches!(
                &self.pending,
                Some(p) if p.track == track
                    && p.head == head
                    && p.next_sector() == sector
            );
            if coalesces {
                if let Some(p) = self.pending.as_mut() {
                    p.data.extend_from_slice(src);
                }
            } else {
                self.flush_pending()?;
                self.pending = Some(Pending {
                    track,
                    head,
                    first: sector,
                    data: src.to_vec(),
                });
            }
            block += want as u32;
            buf = rest;
        }
        Ok(())
    }

    fn total_blocks(&self) -> u32 {
        self.geom.total_blocks()
    }

    fn is_byte_addressable(&self) -> bool {
        false
    }

    fn format_medium(&mut self) -> Result<()> {
        self.pending = None;
        for track in 0..self.geom.tracks {
            for head in 0..self.geom.heads {
                let order = self.interleave(track, head);
                self.drive
                    .format_track(track, head, &order)
                    .map_err(|e| match e {
                        Error::Io(_) => Error::WriteProtected,
                        e => e,
                    })?;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flush_pending()
    }

    fn take_track_errors(&mut self) -> Vec<(u16, u8)> {
        std::mem::take(&mut self.errors)
    }
}

/// [`Drive`] over an ordinary image file: the stand-in for a
/// physical controller.
pub struct ImageDrive {
    file: File,
    geom: Geometry,
}

impl ImageDrive {
    /// Opens an image, sensing the geometry from its size.
    pub fn open(path: &Path, writable: bool) -> Result<ImageDrive> {
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(path)?;
        let len = file.metadata()?.len();
        let blocks = (len / BLOCK_SIZE as u64) as u32;
        let geom = Geometry::for_total(blocks).ok_or(Error::NotEnsoniq)?;
        Ok(ImageDrive { file, geom })
    }

    /// Creates a fresh image of the given geometry.
    pub fn create(path: &Path, geom: Geometry) -> Result<ImageDrive> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(
            u64::from(geom.total_blocks()) * BLOCK_SIZE as u64,
        )?;
        Ok(ImageDrive { file, geom })
    }

    fn seek_to(&mut self, track: u16, head: u8, sector: u8) -> Result<()> {
        let n = u64::from(self.geom.sectors);
        let block =
            u64::from(track) * 2 * n + u64::from(head) * n + u64::from(sector);
        self.file.seek(SeekFrom::Start(block * BLOCK_SIZE as u64))?;
        Ok(())
    }
}

impl Drive for ImageDrive {
    fn calibrate(&mut self) -> Result<Geometry> {
        Ok(self.geom)
    }

    fn read_track(
        &mut self,
        track: u16,
        head: u8,
        buf: &mut [u8],
    ) -> Result<()> {
        self.seek_to(track, head, 0)?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_track(
        &mut self,
        track: u16,
        head: u8,
        first: u8,
        buf: &[u8],
    ) -> Result<()> {
        self.seek_to(track, head, first)?;
        self.file.write_all(buf)?;
        self.file.flush()?;
        Ok(())
    }

    fn format_track(&mut self, track: u16, head: u8, order: &[u8])
    -> Result<()> {
        // An image file has no physical layout; formatting just
        // blanks the track.
        let zeros = vec![0u8; order.len() * BLOCK_SIZE];
        self.write_track(track, head, 0, &zeros)
    }
}
