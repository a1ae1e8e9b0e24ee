// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The operation surface: one subcommand per operation, one
//! module per subcommand.
//!
//! Each invocation performs exactly one operation against one
//! target.  The modules here parse nothing themselves; they take
//! the already-parsed arguments, open the substrate, run the
//! engines, print the listing, and close the volume.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

use crate::blockdev::{BlockDev, CoarseDev, FileDev};
use crate::efs::Volume;
use crate::floppy::{FloppyDev, ImageDrive};
use crate::result::{Error, Result};

mod bank;
mod check;
mod convert;
mod dir;
mod erase;
mod format;
mod get;
mod imgcopy;
mod join;
mod mkdir;
mod put;
mod rdisk;
mod split;
mod wdisk;

/// Substrate selection for the target medium.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum Media {
    /// Image file or byte-granular block device.
    #[default]
    File,
    /// Block device restricted to 2048-byte transfers.
    Coarse,
    /// Floppy drive (or a floppy image standing in for one).
    Floppy,
}

#[derive(Parser)]
#[command(
    name = "ensdisk",
    about = "Read, write, and maintain Ensoniq EPS/ASR disk volumes",
    version
)]
pub struct Cli {
    /// Answer every confirmation prompt with yes.
    #[arg(long, short, global = true)]
    quiet: bool,

    /// How to access the target medium.
    #[arg(long, global = true, value_enum, default_value_t)]
    media: Media,

    #[command(subcommand)]
    op: Op,
}

#[derive(Subcommand)]
enum Op {
    /// Dump a floppy to an image file (raw, or skip-table by
    /// extension).
    ReadImage { device: PathBuf, output: PathBuf },
    /// Restore an image file to a floppy, sniffing the
    /// container format.
    WriteImage { device: PathBuf, input: PathBuf },
    /// Create an empty volume.
    Format {
        target: PathBuf,
        /// Disk type: e = EPS floppy, a = ASR floppy, i = image
        /// file.
        #[arg(value_parser = ["e", "a", "i"])]
        kind: String,
        /// Size: a preset name (eps, asr, eps-super, asr-super)
        /// or a byte count with optional K/M suffix.
        #[arg(long)]
        size: Option<String>,
        /// Disk label, at most seven characters.
        #[arg(long)]
        label: Option<String>,
    },
    /// Print the volume listing and usage.
    Dir {
        image: PathBuf,
        /// Directory path of slot indices, e.g. 3/1.
        #[arg(long, default_value = "")]
        path: String,
    },
    /// Extract slots to archival files in the working
    /// directory.
    Get {
        image: PathBuf,
        /// Slot selector: N, a-b, a-, comma lists, or all.
        slots: String,
        #[arg(long, default_value = "")]
        path: String,
    },
    /// Insert archival files into the volume.
    Put {
        image: PathBuf,
        /// Files to insert, or a single `all` for every EFE in
        /// the working directory.
        files: Vec<String>,
        /// First slot to try.
        #[arg(long, default_value_t = 1)]
        at: usize,
        #[arg(long, default_value = "")]
        path: String,
    },
    /// Free the selected slots.
    Erase {
        image: PathBuf,
        slots: String,
        #[arg(long, default_value = "")]
        path: String,
    },
    /// Create a sub-directory.
    Mkdir {
        image: PathBuf,
        name: String,
        #[arg(long, default_value = "")]
        path: String,
    },
    /// Report structural diagnostics.
    Check {
        image: PathBuf,
        /// 0 = summary, 1 = adds the root-directory dump.
        #[arg(default_value_t = 0)]
        level: u8,
    },
    /// Partition a large instrument archive into disk-sized
    /// parts.
    Split {
        file: PathBuf,
        /// Slice size name: eps or asr.
        #[arg(long, default_value = "eps")]
        size: String,
    },
    /// Concatenate multi-part archives back into one.
    Join {
        parts: Vec<PathBuf>,
        #[arg(long)]
        output: PathBuf,
    },
    /// Translate between archival containers and raw images.
    Convert { source: PathBuf, target: PathBuf },
    /// Print the contents of an instrument-bank archive.
    BankInfo { file: PathBuf },
    /// Byte-copy one image to another.
    ImageCopy { source: PathBuf, target: PathBuf },
}

/// Parses the command line and runs the one requested
/// operation.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let quiet = cli.quiet;
    let media = cli.media;
    match cli.op {
        Op::ReadImage { device, output } => rdisk::run(&device, &output),
        Op::WriteImage { device, input } => wdisk::run(&device, &input),
        Op::Format { target, kind, size, label } => {
            format::run(&target, &kind, size.as_deref(), label.as_deref(), media, quiet)
        }
        Op::Dir { image, path } => dir::run(&image, media, &path),
        Op::Get { image, slots, path } => get::run(&image, media, &slots, &path),
        Op::Put { image, files, at, path } => {
            put::run(&image, media, &files, at, &path)
        }
        Op::Erase { image, slots, path } => {
            erase::run(&image, media, &slots, &path)
        }
        Op::Mkdir { image, name, path } => {
            mkdir::run(&image, media, &name, &path)
        }
        Op::Check { image, level } => check::run(&image, media, level),
        Op::Split { file, size } => split::run(&file, &size),
        Op::Join { parts, output } => join::run(&parts, &output),
        Op::Convert { source, target } => convert::run(&source, &target),
        Op::BankInfo { file } => bank::run(&file),
        Op::ImageCopy { source, target } => {
            imgcopy::run(&source, &target, quiet)
        }
    }
}

/// Opens the target medium as the selected substrate.
pub fn open_dev(
    path: &Path,
    media: Media,
    writable: bool,
) -> Result<Box<dyn BlockDev>> {
    Ok(match media {
        Media::File => Box::new(FileDev::open(path, writable)?),
        Media::Coarse => Box::new(CoarseDev::open(path, writable)?),
        Media::Floppy => {
            Box::new(FloppyDev::open(ImageDrive::open(path, writable)?)?)
        }
    })
}

/// Opens the target medium and mounts the volume on it.
pub fn open_volume(path: &Path, media: Media, writable: bool) -> Result<Volume> {
    Volume::open(open_dev(path, media, writable)?)
}

/// Asks before doing something destructive.  `quiet` answers
/// yes.
pub fn confirm(prompt: &str, quiet: bool) -> Result<()> {
    if quiet {
        return Ok(());
    }
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    if line.trim().eq_ignore_ascii_case("y") {
        Ok(())
    } else {
        Err(Error::Cancelled)
    }
}

/// Pads or truncates a user-supplied name to a fixed-width
/// field.
pub fn pad_name<const N: usize>(name: &str) -> [u8; N] {
    let mut out = [b' '; N];
    for (dst, &src) in out.iter_mut().zip(name.as_bytes()) {
        *dst = src;
    }
    out
}
