// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;
use std::io;

/// Various errors.
#[derive(Debug)]
pub enum Error {
    BadArgs,
    BadSelector,
    BadSize,
    NotEnsoniq,
    WrongMedium,
    DirectoryFull,
    DirectoryNotEmpty,
    InsufficientSpace,
    Corrupt(&'static str),
    NotAnInstrument,
    NotABank,
    LengthMismatch,
    UnsupportedConversion,
    WriteProtected,
    Cancelled,
    TrackErrors(Vec<(u16, u8)>),
    Io(io::Error),
}

impl Error {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadArgs => "Bad command arguments",
            Self::BadSelector => "Malformed slot selector",
            Self::BadSize => "Bad size (not a multiple of 512 or unknown name)",
            Self::NotEnsoniq => "Expected Ensoniq signatures missing",
            Self::WrongMedium => "Container flavour does not match the medium",
            Self::DirectoryFull => "Directory is full (39 entries)",
            Self::DirectoryNotEmpty => "Sub-directory is not empty",
            Self::InsufficientSpace => "Not enough free blocks on the volume",
            Self::Corrupt(_) => "Filesystem is corrupt",
            Self::NotAnInstrument => "Archive is not an instrument file",
            Self::NotABank => "Archive is not an instrument bank",
            Self::LengthMismatch => {
                "Declared block count does not match the data length"
            }
            Self::UnsupportedConversion => "Unsupported conversion direction",
            Self::WriteProtected => "Medium is write-protected",
            Self::Cancelled => "Cancelled",
            Self::TrackErrors(_) => "Unreadable tracks on medium",
            Self::Io(_) => "I/O error",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupt(what) => {
                write!(f, "{}: {}", self.as_str(), what)
            }
            Self::TrackErrors(tracks) => {
                write!(f, "{}:", self.as_str())?;
                for &(track, head) in tracks {
                    write!(f, " {track}/{head}")?;
                }
                Ok(())
            }
            Self::Io(e) => write!(f, "{}: {}", self.as_str(), e),
            _ => write!(f, "{}", self.as_str()),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
