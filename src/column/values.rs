//! Module `values` implement typed access to fixed-width column data.

use std::{cmp::Ordering, convert::TryInto, ffi};

use crate::{column::ColumnType, err_at, util, BitVector, Error, Result};

/// Trait implemented by every fixed-width element type.
pub trait Scalar: Copy + PartialOrd {
    /// Serialized size in bytes, little-endian.
    const SIZE: usize;

    fn from_le(buf: &[u8]) -> Self;
    fn to_le(self, out: &mut Vec<u8>);
    fn as_f64(self) -> f64;
    fn from_f64(val: f64) -> Self;
    /// Sentinel stored for rows outside the mask during column
    /// addition.
    fn null_value() -> Self;
}

macro_rules! impl_scalar_int {
    ($($t:ty, $null:expr);*) => {$(
        impl Scalar for $t {
            const SIZE: usize = std::mem::size_of::<$t>();

            fn from_le(buf: &[u8]) -> $t {
                <$t>::from_le_bytes(buf[..Self::SIZE].try_into().unwrap())
            }

            fn to_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes())
            }

            fn as_f64(self) -> f64 {
                self as f64
            }

            fn from_f64(val: f64) -> $t {
                val as $t
            }

            fn null_value() -> $t {
                $null
            }
        }
    )*};
}

impl_scalar_int!(
    i8, 0;
    u8, 0;
    i16, 0x7FFF;
    u16, 0xFFFF;
    i32, 0x7FFF_FFFF;
    u32, 0xFFFF_FFFF;
    i64, 0x7FFF_FFFF_FFFF_FFFF;
    u64, 0xFFFF_FFFF_FFFF_FFFF;
    f32, f32::NAN;
    f64, f64::NAN
);

/// Values type, a dynamically typed vector of fixed-width elements.
#[derive(Clone, Debug)]
pub enum Values {
    Byte(Vec<i8>),
    UByte(Vec<u8>),
    Short(Vec<i16>),
    UShort(Vec<u16>),
    Int(Vec<i32>),
    UInt(Vec<u32>),
    Long(Vec<i64>),
    ULong(Vec<u64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

macro_rules! dispatch {
    ($self:expr, $vals:ident, $body:expr) => {
        match $self {
            Values::Byte($vals) => $body,
            Values::UByte($vals) => $body,
            Values::Short($vals) => $body,
            Values::UShort($vals) => $body,
            Values::Int($vals) => $body,
            Values::UInt($vals) => $body,
            Values::Long($vals) => $body,
            Values::ULong($vals) => $body,
            Values::Float($vals) => $body,
            Values::Double($vals) => $body,
        }
    };
}

impl Values {
    /// An empty vector of the element type backing `ctype`.
    pub fn empty(ctype: ColumnType) -> Result<Values> {
        let val = match ctype {
            ColumnType::Byte => Values::Byte(vec![]),
            ColumnType::UByte => Values::UByte(vec![]),
            ColumnType::Short => Values::Short(vec![]),
            ColumnType::UShort => Values::UShort(vec![]),
            ColumnType::Int => Values::Int(vec![]),
            ColumnType::UInt | ColumnType::Category => Values::UInt(vec![]),
            ColumnType::Long => Values::Long(vec![]),
            ColumnType::ULong | ColumnType::Oid => Values::ULong(vec![]),
            ColumnType::Float => Values::Float(vec![]),
            ColumnType::Double => Values::Double(vec![]),
            _ => err_at!(TypeFail, msg: "no fixed-width values for {}", ctype)?,
        };
        Ok(val)
    }

    /// Decode the raw little-endian data file at `loc`.
    pub fn read_file(loc: &ffi::OsStr, ctype: ColumnType) -> Result<Values> {
        use std::io::Read;

        let mut fd = util::open_file_r(loc)?;
        let mut buf = vec![];
        err_at!(IOError, fd.read_to_end(&mut buf))?;
        Values::from_bytes(&buf, ctype)
    }

    pub fn from_bytes(buf: &[u8], ctype: ColumnType) -> Result<Values> {
        fn decode<T: Scalar>(buf: &[u8]) -> Result<Vec<T>> {
            if buf.len() % T::SIZE != 0 {
                err_at!(InvalidFormat, msg: "data file {} % {}", buf.len(), T::SIZE)?
            }
            Ok(buf.chunks(T::SIZE).map(T::from_le).collect())
        }

        let val = match ctype {
            ColumnType::Byte => Values::Byte(decode(buf)?),
            ColumnType::UByte => Values::UByte(decode(buf)?),
            ColumnType::Short => Values::Short(decode(buf)?),
            ColumnType::UShort => Values::UShort(decode(buf)?),
            ColumnType::Int => Values::Int(decode(buf)?),
            ColumnType::UInt | ColumnType::Category => Values::UInt(decode(buf)?),
            ColumnType::Long => Values::Long(decode(buf)?),
            ColumnType::ULong | ColumnType::Oid => Values::ULong(decode(buf)?),
            ColumnType::Float => Values::Float(decode(buf)?),
            ColumnType::Double => Values::Double(decode(buf)?),
            _ => err_at!(TypeFail, msg: "no fixed-width values for {}", ctype)?,
        };
        Ok(val)
    }

    pub fn len(&self) -> usize {
        dispatch!(self, vals, vals.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The ith element widened to f64.
    pub fn get(&self, i: usize) -> Option<f64> {
        dispatch!(self, vals, vals.get(i).map(|v| v.as_f64()))
    }

    /// Minimum and maximum over the elements, None when empty or all
    /// NaN.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        let mut bounds: Option<(f64, f64)> = None;
        for i in 0..self.len() {
            let v = self.get(i).unwrap();
            if v.is_nan() {
                continue;
            }
            bounds = Some(match bounds {
                None => (v, v),
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
            });
        }
        bounds
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        dispatch!(self, vals, {
            let mut out = vec![];
            for v in vals.iter() {
                Scalar::to_le(*v, &mut out)
            }
            out
        })
    }

    /// Persist as a raw little-endian data file, replacing `loc`.
    pub fn write_file(&self, loc: &ffi::OsStr) -> Result<()> {
        let mut fd = util::create_file_a(loc)?;
        util::sync_write(&mut fd, &self.to_bytes())?;
        Ok(())
    }

    /// Elements selected by the set bits of `mask`, in row order.
    pub fn filter(&self, mask: &BitVector) -> Values {
        fn filt<T: Scalar>(vals: &[T], mask: &BitVector) -> Vec<T> {
            mask.iter().filter_map(|i| vals.get(i).copied()).collect()
        }
        match self {
            Values::Byte(vals) => Values::Byte(filt(vals, mask)),
            Values::UByte(vals) => Values::UByte(filt(vals, mask)),
            Values::Short(vals) => Values::Short(filt(vals, mask)),
            Values::UShort(vals) => Values::UShort(filt(vals, mask)),
            Values::Int(vals) => Values::Int(filt(vals, mask)),
            Values::UInt(vals) => Values::UInt(filt(vals, mask)),
            Values::Long(vals) => Values::Long(filt(vals, mask)),
            Values::ULong(vals) => Values::ULong(filt(vals, mask)),
            Values::Float(vals) => Values::Float(filt(vals, mask)),
            Values::Double(vals) => Values::Double(filt(vals, mask)),
        }
    }

    /// Elements rearranged so that position `k` holds element
    /// `ind[k]`.
    pub fn permute(&self, ind: &[u32]) -> Values {
        fn perm<T: Scalar>(vals: &[T], ind: &[u32]) -> Vec<T> {
            ind.iter().map(|i| vals[*i as usize]).collect()
        }
        match self {
            Values::Byte(vals) => Values::Byte(perm(vals, ind)),
            Values::UByte(vals) => Values::UByte(perm(vals, ind)),
            Values::Short(vals) => Values::Short(perm(vals, ind)),
            Values::UShort(vals) => Values::UShort(perm(vals, ind)),
            Values::Int(vals) => Values::Int(perm(vals, ind)),
            Values::UInt(vals) => Values::UInt(perm(vals, ind)),
            Values::Long(vals) => Values::Long(perm(vals, ind)),
            Values::ULong(vals) => Values::ULong(perm(vals, ind)),
            Values::Float(vals) => Values::Float(perm(vals, ind)),
            Values::Double(vals) => Values::Double(perm(vals, ind)),
        }
    }

    /// Within each `[starts[i], starts[i+1])` segment of the current
    /// permutation `ind`, stable-sort this column's values and compose
    /// the refined permutation. `starts` is replaced with the strict
    /// boundaries of equal runs in the new order. Return the refined
    /// permutation.
    pub fn sort_segments(
        &self,
        starts: &mut Vec<u32>,
        ind: &[u32],
        ascending: bool,
    ) -> Vec<u32> {
        fn sortseg<T: Scalar>(
            vals: &[T],
            starts: &mut Vec<u32>,
            ind: &[u32],
            ascending: bool,
        ) -> Vec<u32> {
            let nrows = ind.len();
            let mut out = Vec::with_capacity(nrows);
            let mut starts2: Vec<u32> = vec![];

            for w in starts.windows(2) {
                let (seg0, seg1) = (w[0] as usize, w[1] as usize);
                let mut order: Vec<u32> = (seg0..seg1).map(|i| i as u32).collect();
                order.sort_by(|a, b| {
                    let va = &vals[ind[*a as usize] as usize];
                    let vb = &vals[ind[*b as usize] as usize];
                    va.partial_cmp(vb).unwrap_or(Ordering::Equal)
                });
                if !ascending {
                    order.reverse();
                }

                let mut last: Option<&T> = None;
                for k in order.into_iter() {
                    let v = &vals[ind[k as usize] as usize];
                    let bump = match last {
                        None => true,
                        Some(prev) => {
                            matches!(prev.partial_cmp(v), Some(Ordering::Less))
                                || matches!(v.partial_cmp(prev), Some(Ordering::Less))
                        }
                    };
                    if bump {
                        starts2.push(out.len() as u32);
                    }
                    last = Some(v);
                    out.push(ind[k as usize]);
                }
            }
            starts2.push(nrows as u32);
            *starts = starts2;
            out
        }

        dispatch!(self, vals, sortseg(vals, starts, ind, ascending))
    }

    /// Narrow a f64 vector into `ctype` elements, writing the type's
    /// null sentinel for rows outside `mask`.
    pub fn cast_from(vals: &[f64], mask: &BitVector, ctype: ColumnType) -> Result<Values> {
        fn cast<T: Scalar>(vals: &[f64], mask: &BitVector) -> Vec<T> {
            vals.iter()
                .enumerate()
                .map(|(i, v)| {
                    if mask.is_set(i) {
                        T::from_f64(*v)
                    } else {
                        T::null_value()
                    }
                })
                .collect()
        }

        let val = match ctype {
            ColumnType::Byte => Values::Byte(cast(vals, mask)),
            ColumnType::UByte => Values::UByte(cast(vals, mask)),
            ColumnType::Short => Values::Short(cast(vals, mask)),
            ColumnType::UShort => Values::UShort(cast(vals, mask)),
            ColumnType::Int => Values::Int(cast(vals, mask)),
            ColumnType::UInt => Values::UInt(cast(vals, mask)),
            ColumnType::Long => Values::Long(cast(vals, mask)),
            ColumnType::ULong | ColumnType::Oid => Values::ULong(cast(vals, mask)),
            ColumnType::Float => Values::Float(cast(vals, mask)),
            ColumnType::Double => Values::Double(cast(vals, mask)),
            _ => err_at!(TypeFail, msg: "cannot cast to {}", ctype)?,
        };
        Ok(val)
    }
}

#[cfg(test)]
#[path = "values_test.rs"]
mod values_test;
