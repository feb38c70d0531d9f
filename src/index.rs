//! Module `index` define the bitmap-index contract consumed by query
//! evaluation.
//!
//! The physical index algorithms live outside this crate. The core
//! talks to them through the [BitmapIndex] trait and caches a built
//! index in the column's `.idx` file, a checksummed frame holding the
//! implementation's serialized payload. A corrupt frame is purged and
//! the index rebuilt on the next query.

use cbordata::Cborize;
use crc::{Crc, CRC_32_ISCSI};

use std::{collections::BTreeMap, ffi, io::Read};

use crate::{
    column::Values,
    err_at,
    qexpr::{ContinuousRange, DiscreteRange},
    util, BitVector, Error, Result,
};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

const FRAME_VER: u32 = 0x00010001;

/// Contract between the core and a bitmap-index implementation.
pub trait BitmapIndex {
    /// Implementation identifier stored in the `.idx` frame.
    fn to_kind(&self) -> String;

    /// Number of rows covered.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evaluate a continuous-range predicate into the exact bitmap of
    /// matching rows.
    fn evaluate(&self, range: &ContinuousRange) -> Result<BitVector>;

    /// Evaluate a membership predicate.
    fn evaluate_discrete(&self, range: &DiscreteRange) -> Result<BitVector>;

    /// Estimated number of rows matching `range`, an upper bound.
    fn estimate(&self, range: &ContinuousRange) -> f64;

    /// Extend the index with freshly appended values.
    fn append(&mut self, values: &Values) -> Result<()>;

    /// Serialize into the payload carried by the `.idx` frame.
    fn to_payload(&self) -> Result<Vec<u8>>;

    /// The bitmap recorded for a distinct key, None when the key is
    /// unknown.
    fn get_bitvector(&self, key: u32) -> Option<BitVector>;
}

// Checksummed envelope persisted as `<column>.idx`.
#[derive(Clone, Debug, Cborize)]
struct Frame {
    kind: String,
    payload: Vec<u8>,
    crc: u32,
}

impl Frame {
    const ID: u32 = FRAME_VER;
}

/// Persist an index into its `.idx` file.
pub fn write_index(loc: &ffi::OsStr, index: &dyn BitmapIndex) -> Result<()> {
    let payload = index.to_payload()?;
    let frame = Frame {
        kind: index.to_kind(),
        crc: CRC32.checksum(&payload),
        payload,
    };
    let data = util::into_cbor_bytes(frame)?;
    let mut fd = util::create_file_a(loc)?;
    util::sync_write(&mut fd, &data)?;
    Ok(())
}

/// Read back a `.idx` frame, verifying its checksum. Return the kind
/// and the payload.
pub fn read_index(loc: &ffi::OsStr) -> Result<(String, Vec<u8>)> {
    let mut fd = util::open_file_r(loc)?;
    let mut data = vec![];
    err_at!(IOError, fd.read_to_end(&mut data))?;
    let (frame, _) = util::from_cbor_bytes::<Frame>(&data)?;
    if CRC32.checksum(&frame.payload) != frame.crc {
        err_at!(IndexFail, msg: "checksum mismatch in {:?}", loc)?
    }
    Ok((frame.kind, frame.payload))
}

/// KeyIndex type, an exact equality index mapping each distinct
/// 32-bit key to the bitmap of rows holding it.
///
/// This is the index kept for category columns, dictionary
/// identifiers are the keys. A category with a single dictionary
/// entry degenerates to one bitmap with a bit set per non-null row.
#[derive(Clone, Default)]
pub struct KeyIndex {
    n_rows: usize,
    bitmaps: BTreeMap<u32, BitVector>,
}

#[derive(Cborize)]
struct KeyIndexShadow {
    n_rows: u64,
    keys: Vec<u32>,
    bitmaps: Vec<Vec<u8>>,
}

impl KeyIndexShadow {
    const ID: u32 = FRAME_VER;
}

impl KeyIndex {
    pub const KIND: &'static str = "keyindex";

    /// Build from per-row keys.
    pub fn build(keys: &[u32]) -> KeyIndex {
        let mut val = KeyIndex {
            n_rows: 0,
            bitmaps: BTreeMap::new(),
        };
        val.extend(keys);
        val
    }

    fn extend(&mut self, keys: &[u32]) {
        let n_rows = self.n_rows + keys.len();
        for (i, key) in keys.iter().enumerate() {
            let bv = self
                .bitmaps
                .entry(*key)
                .or_insert_with(|| BitVector::zeros(0));
            bv.adjust_size(0, n_rows);
            bv.set(self.n_rows + i);
        }
        for bv in self.bitmaps.values_mut() {
            bv.adjust_size(0, n_rows);
        }
        self.n_rows = n_rows;
    }

    pub fn from_payload(payload: &[u8]) -> Result<KeyIndex> {
        let (shadow, _) = util::from_cbor_bytes::<KeyIndexShadow>(payload)?;
        let mut bitmaps = BTreeMap::new();
        for (key, data) in shadow.keys.iter().zip(shadow.bitmaps.iter()) {
            let (bv, _) = BitVector::from_bytes(data)?;
            bitmaps.insert(*key, bv);
        }
        Ok(KeyIndex {
            n_rows: shadow.n_rows as usize,
            bitmaps,
        })
    }

    pub fn read_file(loc: &ffi::OsStr) -> Result<KeyIndex> {
        let (kind, payload) = read_index(loc)?;
        if kind != Self::KIND {
            err_at!(IndexFail, msg: "frame kind {:?} expected {:?}", kind, Self::KIND)?
        }
        KeyIndex::from_payload(&payload)
    }
}

impl BitmapIndex for KeyIndex {
    fn to_kind(&self) -> String {
        Self::KIND.to_string()
    }

    fn len(&self) -> usize {
        self.n_rows
    }

    fn evaluate(&self, range: &ContinuousRange) -> Result<BitVector> {
        let mut hits = BitVector::zeros(self.n_rows);
        for (key, bv) in self.bitmaps.iter() {
            if range.in_range(*key as f64) {
                hits.or_assign(bv);
            }
        }
        Ok(hits)
    }

    fn evaluate_discrete(&self, range: &DiscreteRange) -> Result<BitVector> {
        let mut hits = BitVector::zeros(self.n_rows);
        for (key, bv) in self.bitmaps.iter() {
            if range.in_range(*key as f64) {
                hits.or_assign(bv);
            }
        }
        Ok(hits)
    }

    fn estimate(&self, range: &ContinuousRange) -> f64 {
        self.bitmaps
            .iter()
            .filter(|(key, _)| range.in_range(**key as f64))
            .map(|(_, bv)| bv.cnt() as f64)
            .sum()
    }

    fn append(&mut self, values: &Values) -> Result<()> {
        let keys = match values {
            Values::UInt(keys) => keys.clone(),
            values => {
                err_at!(IndexFail, msg: "keyindex append over {} values", values.len())?
            }
        };
        self.extend(&keys);
        Ok(())
    }

    fn to_payload(&self) -> Result<Vec<u8>> {
        let mut keys = vec![];
        let mut bitmaps = vec![];
        for (key, bv) in self.bitmaps.iter() {
            keys.push(*key);
            bitmaps.push(bv.to_bytes()?);
        }
        let shadow = KeyIndexShadow {
            n_rows: self.n_rows as u64,
            keys,
            bitmaps,
        };
        util::into_cbor_bytes(shadow)
    }

    fn get_bitvector(&self, key: u32) -> Option<BitVector> {
        self.bitmaps.get(&key).cloned()
    }
}

/// NoIndex type, the null implementation. Every estimate is the full
/// row count and evaluation defers to a data scan.
#[derive(Clone, Default)]
pub struct NoIndex {
    n_rows: usize,
}

impl NoIndex {
    pub fn new(n_rows: usize) -> NoIndex {
        NoIndex { n_rows }
    }
}

impl BitmapIndex for NoIndex {
    fn to_kind(&self) -> String {
        "noindex".to_string()
    }

    fn len(&self) -> usize {
        self.n_rows
    }

    fn evaluate(&self, _range: &ContinuousRange) -> Result<BitVector> {
        err_at!(IndexFail, msg: "noindex cannot evaluate, scan the column")
    }

    fn evaluate_discrete(&self, _range: &DiscreteRange) -> Result<BitVector> {
        err_at!(IndexFail, msg: "noindex cannot evaluate, scan the column")
    }

    fn estimate(&self, _range: &ContinuousRange) -> f64 {
        self.n_rows as f64
    }

    fn append(&mut self, values: &Values) -> Result<()> {
        self.n_rows += values.len();
        Ok(())
    }

    fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(vec![])
    }

    fn get_bitvector(&self, _key: u32) -> Option<BitVector> {
        None
    }
}

#[cfg(test)]
#[path = "index_test.rs"]
mod index_test;
