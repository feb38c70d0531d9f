//! Module `rids` implement row identifiers and their ordered set.

use binread::BinRead;

use std::{cmp, ffi, fmt, result};

use crate::{err_at, util, Error, Result};

/// Rid type, the 64-bit row identifier pair.
///
/// Persisted in the `-rids` file as raw 8-byte little-endian pairs,
/// one per row, in row order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, BinRead)]
pub struct Rid {
    pub run: u32,
    pub event: u32,
}

impl Rid {
    pub fn new(run: u32, event: u32) -> Rid {
        Rid { run, event }
    }

    fn as_u64(&self) -> u64 {
        ((self.run as u64) << 32) | (self.event as u64)
    }
}

impl PartialOrd for Rid {
    fn partial_cmp(&self, other: &Rid) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rid {
    fn cmp(&self, other: &Rid) -> cmp::Ordering {
        self.as_u64().cmp(&other.as_u64())
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "({},{})", self.run, self.event)
    }
}

/// RidSet type, a list of row identifiers, ordered after [RidSet::sort].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RidSet {
    rids: Vec<Rid>,
}

// Threshold below which sorting falls back to insertion sort.
const SORT_CUTOFF: usize = 33;

impl From<Vec<Rid>> for RidSet {
    fn from(rids: Vec<Rid>) -> RidSet {
        RidSet { rids }
    }
}

impl RidSet {
    pub fn len(&self) -> usize {
        self.rids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rids.is_empty()
    }

    pub fn push(&mut self, rid: Rid) {
        self.rids.push(rid)
    }

    pub fn as_rids(&self) -> &[Rid] {
        &self.rids
    }

    /// Sort the identifiers in ascending order. Insertion sort below
    /// [SORT_CUTOFF] elements, unstable pattern-defeating quicksort
    /// otherwise. Not stable in either case.
    pub fn sort(&mut self) {
        if self.rids.len() < SORT_CUTOFF {
            for i in 1..self.rids.len() {
                let mut j = i;
                while j > 0 && self.rids[j - 1] > self.rids[j] {
                    self.rids.swap(j - 1, j);
                    j -= 1;
                }
            }
        } else {
            self.rids.sort_unstable();
        }
    }

    /// Persist to the `-rids` file at `loc`, replacing any existing
    /// file.
    pub fn write_file(&self, loc: &ffi::OsStr) -> Result<()> {
        let mut data = Vec::with_capacity(self.rids.len() * 8);
        for rid in self.rids.iter() {
            data.extend_from_slice(&rid.run.to_le_bytes());
            data.extend_from_slice(&rid.event.to_le_bytes());
        }
        let mut fd = util::create_file_a(loc)?;
        util::sync_write(&mut fd, &data)?;
        Ok(())
    }

    /// Load the `-rids` file at `loc`. Return None when the file is
    /// missing.
    pub fn read_file(loc: &ffi::OsStr) -> Result<Option<RidSet>> {
        use binread::BinReaderExt;
        use std::io::Read;

        let mut fd = match util::open_file_r(loc) {
            Ok(fd) => fd,
            Err(_) => return Ok(None),
        };
        let mut buf = vec![];
        err_at!(IOError, fd.read_to_end(&mut buf))?;
        if buf.len() % 8 != 0 {
            err_at!(InvalidFormat, msg: "rid file {:?} size {}", loc, buf.len())?
        }

        let mut br = binread::io::Cursor::new(&buf);
        let mut rids = Vec::with_capacity(buf.len() / 8);
        for _ in 0..(buf.len() / 8) {
            let rid: Rid = err_at!(InvalidFormat, br.read_le())?;
            rids.push(rid);
        }
        Ok(Some(RidSet { rids }))
    }

    /// Synthesize default identifiers `(run, 0..n)` for a partition
    /// without a `-rids` file.
    pub fn fill(run: u32, n: usize) -> RidSet {
        let rids = (0..n).map(|i| Rid::new(run, i as u32)).collect();
        RidSet { rids }
    }
}

#[cfg(test)]
#[path = "rids_test.rs"]
mod rids_test;
