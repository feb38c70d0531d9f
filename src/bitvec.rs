//! Module `bitvec` implement the compressed bitmap used for row masks
//! and query results.
//!
//! [BitVector] wraps a [roaring bitmap][roaring-bitmap] along with an
//! explicit logical size. The roaring container only stores set
//! positions, while most call-sites here, active-row masks, null
//! masks, query hits, need a bit-per-row semantic where the universe
//! size matters, `cnt()` counts set bits and `size()` is the number of
//! rows the mask covers.
//!
//! [roaring-bitmap]: https://roaringbitmap.org

use croaring::Bitmap;

use std::{convert::TryFrom, ffi, fmt, io, result};

use crate::{err_at, util, Error, Result};

/// BitVector type, a compressed bitmap with a logical size.
///
/// Bit positions beyond the logical size are never set. The on-disk
/// format is a 12-byte header, logical-size as u64 little-endian
/// followed by payload length as u32 little-endian, and then the
/// roaring-serialized payload.
#[derive(Clone)]
pub struct BitVector {
    size: usize,
    bits: Bitmap,
}

impl fmt::Display for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "bitvector<{}/{}>", self.bits.cardinality(), self.size)
    }
}

impl fmt::Debug for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

impl PartialEq for BitVector {
    fn eq(&self, other: &BitVector) -> bool {
        self.size == other.size && self.bits == other.bits
    }
}

impl BitVector {
    /// Create a bitmap of `size` bits, all clear.
    pub fn zeros(size: usize) -> BitVector {
        BitVector {
            size,
            bits: Bitmap::create(),
        }
    }

    /// Create a bitmap of `size` bits, all set.
    pub fn ones(size: usize) -> BitVector {
        let mut bits = Bitmap::create();
        bits.flip_inplace(0..(size as u32));
        BitVector { size, bits }
    }

    /// Create a bitmap of `size` bits with the listed positions set.
    pub fn from_rows(rows: &[u32], size: usize) -> BitVector {
        let mut val = BitVector::zeros(size);
        for row in rows.iter() {
            if (*row as usize) < size {
                val.bits.add(*row)
            }
        }
        val
    }

    /// Set bit `i`.
    pub fn set(&mut self, i: usize) {
        if i < self.size {
            self.bits.add(i as u32)
        }
    }

    /// Clear bit `i`.
    pub fn clear(&mut self, i: usize) {
        self.bits.remove(i as u32)
    }

    /// Return whether bit `i` is set.
    pub fn is_set(&self, i: usize) -> bool {
        self.bits.contains(i as u32)
    }

    /// Return the number of set bits.
    pub fn cnt(&self) -> usize {
        self.bits.cardinality() as usize
    }

    /// Return the logical size in bits.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Grow or shrink the bitmap. Bits in `[old_size, ones_upto)` are
    /// set, the logical size becomes `size` and any bit at or beyond it
    /// is cleared.
    pub fn adjust_size(&mut self, ones_upto: usize, size: usize) {
        if ones_upto > self.size {
            self.bits.flip_inplace((self.size as u32)..(ones_upto as u32));
        }
        if size < self.size {
            let mut keep = Bitmap::create();
            keep.flip_inplace(0..(size as u32));
            self.bits.and_inplace(&keep);
        }
        self.size = size;
    }

    /// Bitwise a AND b.
    pub fn and(&self, other: &BitVector) -> BitVector {
        BitVector {
            size: self.size.max(other.size),
            bits: self.bits.and(&other.bits),
        }
    }

    /// Bitwise a OR b.
    pub fn or(&self, other: &BitVector) -> BitVector {
        BitVector {
            size: self.size.max(other.size),
            bits: self.bits.or(&other.bits),
        }
    }

    /// Bitwise a XOR b.
    pub fn xor(&self, other: &BitVector) -> BitVector {
        BitVector {
            size: self.size.max(other.size),
            bits: self.bits.xor(&other.bits),
        }
    }

    /// Bitwise a AND (NOT b).
    pub fn minus(&self, other: &BitVector) -> BitVector {
        BitVector {
            size: self.size.max(other.size),
            bits: self.bits.andnot(&other.bits),
        }
    }

    /// Complement within the logical size.
    pub fn complement(&self) -> BitVector {
        let mut bits = self.bits.clone();
        bits.flip_inplace(0..(self.size as u32));
        BitVector {
            size: self.size,
            bits,
        }
    }

    pub fn and_assign(&mut self, other: &BitVector) {
        self.bits.and_inplace(&other.bits)
    }

    pub fn or_assign(&mut self, other: &BitVector) {
        self.bits.or_inplace(&other.bits)
    }

    pub fn minus_assign(&mut self, other: &BitVector) {
        self.bits.andnot_inplace(&other.bits)
    }

    /// Iterate the set positions in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter().map(|n| n as usize)
    }

    /// Return the set positions grouped into `(start, len)` runs of
    /// consecutive bits.
    pub fn to_runs(&self) -> Vec<(usize, usize)> {
        let mut runs: Vec<(usize, usize)> = vec![];
        for n in self.bits.iter() {
            let n = n as usize;
            match runs.last_mut() {
                Some((start, len)) if *start + *len == n => *len += 1,
                _ => runs.push((n, 1)),
            }
        }
        runs
    }

    /// Return the set positions as a vector of row numbers.
    pub fn to_rows(&self) -> Vec<u32> {
        self.bits.to_vec()
    }

    /// Serialize into the on-disk form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = self.bits.serialize();
        let n = err_at!(FailConvert, u32::try_from(payload.len()))?;

        let mut data = Vec::with_capacity(12 + payload.len());
        data.extend_from_slice(&(self.size as u64).to_le_bytes());
        data.extend_from_slice(&n.to_le_bytes());
        data.extend_from_slice(&payload);
        Ok(data)
    }

    /// Deserialize from the on-disk form. Return the value and the
    /// number of bytes consumed.
    pub fn from_bytes(buf: &[u8]) -> Result<(BitVector, usize)> {
        use std::convert::TryInto;

        if buf.len() < 12 {
            err_at!(InvalidFormat, msg: "bitvector header {}/12", buf.len())?
        }
        let size = u64::from_le_bytes(buf[..8].try_into().unwrap()) as usize;
        let n = u32::from_le_bytes(buf[8..12].try_into().unwrap()) as usize;
        if buf.len() < 12 + n {
            err_at!(InvalidFormat, msg: "bitvector payload {}/{}", buf.len(), 12 + n)?
        }
        let bits = Bitmap::deserialize(&buf[12..12 + n]);
        Ok((BitVector { size, bits }, 12 + n))
    }

    /// Persist to `loc`, replacing any existing file.
    pub fn write_file(&self, loc: &ffi::OsStr) -> Result<()> {
        let mut fd = util::create_file_a(loc)?;
        let data = self.to_bytes()?;
        util::sync_write(&mut fd, &data)?;
        Ok(())
    }

    /// Load from `loc`.
    pub fn read_file(loc: &ffi::OsStr) -> Result<BitVector> {
        use std::io::Read;

        let mut fd = util::open_file_r(loc)?;
        let mut buf = vec![];
        err_at!(IOError, fd.read_to_end(&mut buf))?;
        let (val, _) = BitVector::from_bytes(&buf)?;
        Ok(val)
    }

    /// Write the on-disk form into an open file descriptor.
    pub fn write_to(&self, fd: &mut dyn io::Write) -> Result<usize> {
        let data = self.to_bytes()?;
        err_at!(IOError, fd.write_all(&data))?;
        Ok(data.len())
    }
}

#[cfg(test)]
#[path = "bitvec_test.rs"]
mod bitvec_test;
