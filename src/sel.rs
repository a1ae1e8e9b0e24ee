// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Slot selectors and directory paths.
//!
//! Slots are addressed as a single index, an inclusive range
//! `a-b`, an open range `a-` running to the last slot, a
//! comma-separated list of those, or `a`/`all` for every slot
//! from 1 up.  Slot 0 is reserved for deliberate use (an
//! operating-system file in the root, the parent pointer
//! elsewhere) and never selected in bulk.
//!
//! Directories are addressed by slot indices joined with `/`,
//! resolved from the root.

use crate::efs::dir::SLOTS;
use crate::result::{Error, Result};

const LAST_SLOT: usize = SLOTS - 1;

fn parse_slot(s: &str) -> Result<usize> {
    let slot = s.trim().parse::<usize>().map_err(|_| Error::BadSelector)?;
    if slot >= SLOTS {
        return Err(Error::BadSelector);
    }
    Ok(slot)
}

/// Parses a slot selector into slot indices, in selector order,
/// duplicates dropped.
pub fn parse_slots(spec: &str) -> Result<Vec<usize>> {
    let spec = spec.trim();
    if spec.eq_ignore_ascii_case("a") || spec.eq_ignore_ascii_case("all") {
        return Ok((1..=LAST_SLOT).collect());
    }
    let mut slots = Vec::new();
    let mut push = |slot: usize| {
        if !slots.contains(&slot) {
            slots.push(slot);
        }
    };
    for piece in spec.split(',') {
        let piece = piece.trim();
        match piece.split_once('-') {
            None => push(parse_slot(piece)?),
            Some((lo, hi)) => {
                let lo = parse_slot(lo)?;
                let hi = if hi.trim().is_empty() {
                    LAST_SLOT
                } else {
                    parse_slot(hi)?
                };
                if lo > hi {
                    return Err(Error::BadSelector);
                }
                for slot in lo..=hi {
                    push(slot);
                }
            }
        }
    }
    if slots.is_empty() {
        return Err(Error::BadSelector);
    }
    Ok(slots)
}

/// Parses a directory path of slot indices joined by `/`.  An
/// empty path is the root.
pub fn parse_path(spec: &str) -> Result<Vec<usize>> {
    let spec = spec.trim().trim_matches('/');
    if spec.is_empty() {
        return Ok(Vec::new());
    }
    spec.split('/').map(parse_slot).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_and_list() {
        assert_eq!(parse_slots("5").unwrap(), vec![5]);
        assert_eq!(parse_slots("1,3,2").unwrap(), vec![1, 3, 2]);
        assert_eq!(parse_slots("1,3,1").unwrap(), vec![1, 3]);
    }

    #[test]
    fn ranges() {
        assert_eq!(parse_slots("2-5").unwrap(), vec![2, 3, 4, 5]);
        assert_eq!(parse_slots("36-").unwrap(), vec![36, 37, 38]);
        assert_eq!(parse_slots("1,5-7").unwrap(), vec![1, 5, 6, 7]);
        assert!(parse_slots("7-5").is_err());
    }

    #[test]
    fn all_starts_at_one() {
        let all = parse_slots("all").unwrap();
        assert_eq!(all.len(), 38);
        assert_eq!(all[0], 1);
        assert_eq!(*all.last().unwrap(), 38);
        assert_eq!(parse_slots("A").unwrap(), all);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_slots("").is_err());
        assert!(parse_slots("39").is_err());
        assert!(parse_slots("x").is_err());
        assert!(parse_slots("1,,2").is_err());
    }

    #[test]
    fn paths() {
        assert_eq!(parse_path("").unwrap(), Vec::<usize>::new());
        assert_eq!(parse_path("/").unwrap(), Vec::<usize>::new());
        assert_eq!(parse_path("0/3/12").unwrap(), vec![0, 3, 12]);
        assert!(parse_path("3/x").is_err());
        assert!(parse_path("40").is_err());
    }
}
