//! Module `dict` implement the string dictionary for category columns.

use std::{collections::HashMap, convert::TryFrom, ffi, fmt, result};

use crate::{err_at, util, util::CityHasher, Error, Result};

/// Dictionary type, a bidirectional mapping between distinct strings
/// and 32-bit identifiers.
///
/// Identifier ZERO is reserved for NULL. Live entries are numbered
/// 1..N in insertion order. Lookup is case-insensitive while the
/// stored spelling is the one first inserted. The on-disk form is the
/// sequence of entries, each a u32 little-endian byte-length followed
/// by the raw bytes, in insertion order, the reader assigns ids 1..N
/// in that order.
#[derive(Clone, Default)]
pub struct Dictionary {
    entries: Vec<String>,
    lookup: HashMap<String, u32, CityHasher>,
}

impl fmt::Display for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "dictionary<{}>", self.entries.len())
    }
}

impl Dictionary {
    pub fn new() -> Dictionary {
        Dictionary {
            entries: Vec::default(),
            lookup: HashMap::with_hasher(CityHasher::new()),
        }
    }

    /// Insert a string, returning its identifier. The empty string maps
    /// to the NULL identifier ZERO. Re-inserting an existing string,
    /// under case-insensitive comparison, returns the original
    /// identifier.
    pub fn insert(&mut self, s: &str) -> u32 {
        if s.is_empty() {
            return 0;
        }
        let key = s.to_lowercase();
        match self.lookup.get(&key) {
            Some(id) => *id,
            None => {
                self.entries.push(s.to_string());
                let id = self.entries.len() as u32;
                self.lookup.insert(key, id);
                id
            }
        }
    }

    /// Case-insensitive lookup.
    pub fn to_id(&self, s: &str) -> Option<u32> {
        if s.is_empty() {
            return Some(0);
        }
        self.lookup.get(&s.to_lowercase()).copied()
    }

    /// Map an identifier back to its string. Identifier ZERO and
    /// out-of-range identifiers return None.
    pub fn to_str(&self, id: u32) -> Option<&str> {
        match id {
            0 => None,
            id => self.entries.get((id - 1) as usize).map(|s| s.as_str()),
        }
    }

    /// Number of live entries, NULL excluded.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(id, entry)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, s)| ((i + 1) as u32, s.as_str()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut data = vec![];
        for entry in self.entries.iter() {
            let n = err_at!(FailConvert, u32::try_from(entry.len()))?;
            data.extend_from_slice(&n.to_le_bytes());
            data.extend_from_slice(entry.as_bytes());
        }
        Ok(data)
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Dictionary> {
        use std::convert::TryInto;
        use std::str::from_utf8;

        let mut val = Dictionary::new();
        let mut off = 0;
        while off < buf.len() {
            if off + 4 > buf.len() {
                err_at!(InvalidFormat, msg: "dictionary entry header at {}", off)?
            }
            let n = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()) as usize;
            off += 4;
            if off + n > buf.len() {
                err_at!(InvalidFormat, msg: "dictionary entry {}/{}", buf.len(), off + n)?
            }
            let s = err_at!(FailConvert, from_utf8(&buf[off..off + n]))?;
            val.insert(s);
            off += n;
        }
        Ok(val)
    }

    /// Persist to the `.dic` file at `loc`, replacing any existing file.
    pub fn write_file(&self, loc: &ffi::OsStr) -> Result<()> {
        let mut fd = util::create_file_a(loc)?;
        util::sync_write(&mut fd, &self.to_bytes()?)?;
        Ok(())
    }

    /// Load from the `.dic` file at `loc`. A missing file yields an
    /// empty dictionary.
    pub fn read_file(loc: &ffi::OsStr) -> Result<Dictionary> {
        use std::io::Read;

        match util::open_file_r(loc) {
            Ok(mut fd) => {
                let mut buf = vec![];
                err_at!(IOError, fd.read_to_end(&mut buf))?;
                Dictionary::from_bytes(&buf)
            }
            Err(_) => Ok(Dictionary::new()),
        }
    }
}

#[cfg(test)]
#[path = "dict_test.rs"]
mod dict_test;
