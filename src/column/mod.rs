//! Module `column` implement typed column storage.
//!
//! Each column of a partition persists as a raw little-endian data
//! file named after the column, with side files sharing the stem,
//!
//! * `<name>.msk`, null-mask bitmap, absent means all rows non-null,
//! * `<name>.idx`, cached bitmap index,
//! * `<name>.sp`, start positions for variable-length data,
//! * `<name>.dic`, dictionary for category columns,
//! * `<name>.int`, dictionary identifiers for category columns.
//!
//! Fixed-width types are handled here, the text, blob and category
//! specializations live in their own sub-modules.

use std::{convert::TryFrom, ffi, fmt, fs, result, sync::Arc};

use crate::{err_at, util, BitVector, BitmapIndex, Error, FileMgr, Result};

pub mod blob;
pub mod category;
pub mod flush;
pub mod text;
pub mod values;

pub use flush::Flusher;
pub use values::{Scalar, Values};

/// Logical column types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Byte,
    UByte,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    /// Row identifier pairs.
    Oid,
    /// Dictionary-coded text.
    Category,
    /// Raw NUL-terminated text.
    Text,
    /// Opaque byte payloads.
    Blob,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self.to_name())
    }
}

impl ColumnType {
    pub fn from_name(name: &str) -> Result<ColumnType> {
        let ct = match name.to_uppercase().as_str() {
            "BYTE" => ColumnType::Byte,
            "UBYTE" => ColumnType::UByte,
            "SHORT" => ColumnType::Short,
            "USHORT" => ColumnType::UShort,
            "INT" => ColumnType::Int,
            "UINT" => ColumnType::UInt,
            "LONG" => ColumnType::Long,
            "ULONG" => ColumnType::ULong,
            "FLOAT" => ColumnType::Float,
            "DOUBLE" => ColumnType::Double,
            "OID" => ColumnType::Oid,
            "CATEGORY" => ColumnType::Category,
            "TEXT" => ColumnType::Text,
            "BLOB" => ColumnType::Blob,
            _ => err_at!(InvalidFormat, msg: "unknown data_type {}", name)?,
        };
        Ok(ct)
    }

    pub fn to_name(&self) -> &'static str {
        match self {
            ColumnType::Byte => "BYTE",
            ColumnType::UByte => "UBYTE",
            ColumnType::Short => "SHORT",
            ColumnType::UShort => "USHORT",
            ColumnType::Int => "INT",
            ColumnType::UInt => "UINT",
            ColumnType::Long => "LONG",
            ColumnType::ULong => "ULONG",
            ColumnType::Float => "FLOAT",
            ColumnType::Double => "DOUBLE",
            ColumnType::Oid => "OID",
            ColumnType::Category => "CATEGORY",
            ColumnType::Text => "TEXT",
            ColumnType::Blob => "BLOB",
        }
    }

    /// Element size in bytes for fixed-width types, None for the
    /// variable-length ones.
    pub fn elem_size(&self) -> Option<usize> {
        let n = match self {
            ColumnType::Byte | ColumnType::UByte => 1,
            ColumnType::Short | ColumnType::UShort => 2,
            ColumnType::Int | ColumnType::UInt | ColumnType::Float => 4,
            ColumnType::Long | ColumnType::ULong | ColumnType::Double => 8,
            ColumnType::Oid => 8,
            ColumnType::Category | ColumnType::Text | ColumnType::Blob => return None,
        };
        Some(n)
    }

    pub fn is_fixed(&self) -> bool {
        self.elem_size().is_some()
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(
            self,
            ColumnType::Oid | ColumnType::Category | ColumnType::Text | ColumnType::Blob
        )
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            ColumnType::UByte | ColumnType::UShort | ColumnType::UInt | ColumnType::ULong
        )
    }

    /// Text-valued on the query surface.
    pub fn is_string(&self) -> bool {
        matches!(self, ColumnType::Category | ColumnType::Text)
    }
}

/// Column type, a named typed attribute of one partition.
///
/// Columns do not hold a reference to their partition, operations
/// take the data directory and row count as arguments, the partition
/// owns both.
#[derive(Clone)]
pub struct Column {
    name: String,
    description: String,
    ctype: ColumnType,
    // actual value bounds, lower > upper means not yet computed
    lower: f64,
    upper: f64,
    index_spec: Option<String>,
    sorted: bool,
    index: Option<Arc<dyn BitmapIndex + Send + Sync>>,
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "column<{}:{}>", self.name, self.ctype)
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

impl Column {
    pub fn new(name: &str, ctype: ColumnType) -> Column {
        Column {
            name: name.to_string(),
            description: String::default(),
            ctype,
            lower: f64::INFINITY,
            upper: f64::NEG_INFINITY,
            index_spec: None,
            sorted: false,
            index: None,
        }
    }

    pub fn set_description(&mut self, description: &str) -> &mut Self {
        self.description = description.to_string();
        self
    }

    pub fn set_bounds(&mut self, lower: f64, upper: f64) -> &mut Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    pub fn set_index_spec(&mut self, spec: &str) -> &mut Self {
        self.index_spec = Some(spec.to_string());
        self
    }

    pub fn set_sorted(&mut self, sorted: bool) -> &mut Self {
        self.sorted = sorted;
        self
    }

    pub fn to_name(&self) -> String {
        self.name.to_string()
    }

    pub fn to_description(&self) -> String {
        self.description.to_string()
    }

    pub fn to_type(&self) -> ColumnType {
        self.ctype
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn to_index_spec(&self) -> Option<String> {
        self.index_spec.clone()
    }

    /// Actual `(min, max)` bounds, None until computed.
    pub fn to_bounds(&self) -> Option<(f64, f64)> {
        if self.lower <= self.upper {
            Some((self.lower, self.upper))
        } else {
            None
        }
    }

    // ---- file locations

    pub fn data_file(&self, dir: &ffi::OsStr) -> ffi::OsString {
        util::file_path(dir, &self.name)
    }

    pub fn mask_file(&self, dir: &ffi::OsStr) -> ffi::OsString {
        util::file_path(dir, &format!("{}.msk", self.name))
    }

    pub fn index_file(&self, dir: &ffi::OsStr) -> ffi::OsString {
        util::file_path(dir, &format!("{}.idx", self.name))
    }

    pub fn sp_file(&self, dir: &ffi::OsStr) -> ffi::OsString {
        util::file_path(dir, &format!("{}.sp", self.name))
    }

    pub fn dic_file(&self, dir: &ffi::OsStr) -> ffi::OsString {
        util::file_path(dir, &format!("{}.dic", self.name))
    }

    pub fn int_file(&self, dir: &ffi::OsStr) -> ffi::OsString {
        util::file_path(dir, &format!("{}.int", self.name))
    }

    // ---- metadata stanza

    /// Emit this column's `Begin Column .. End Column` stanza.
    pub fn write_meta(&self, out: &mut String) {
        out.push_str("Begin Column\n");
        out.push_str(&format!("name = {}\n", self.name));
        if !self.description.is_empty() {
            out.push_str(&format!("description = {}\n", self.description));
        }
        out.push_str(&format!("data_type = {}\n", self.ctype));
        if let Some((lo, hi)) = self.to_bounds() {
            out.push_str(&format!("minimum = {}\n", lo));
            out.push_str(&format!("maximum = {}\n", hi));
        }
        if let Some(spec) = &self.index_spec {
            out.push_str(&format!("index = {}\n", spec));
        }
        if self.sorted {
            out.push_str("sorted = true\n");
        }
        out.push_str("End Column\n");
    }

    // ---- null mask

    /// Read the null mask, absent file means every row is non-null. A
    /// mask of the wrong size is adjusted with a warning.
    pub fn null_mask(&self, dir: &ffi::OsStr, n_rows: usize) -> Result<BitVector> {
        let loc = self.mask_file(dir);
        match util::file_size(&loc)? {
            0 => Ok(BitVector::ones(n_rows)),
            _ => {
                let mut mask = BitVector::read_file(&loc)?;
                if mask.size() != n_rows {
                    log::warn!(
                        "null mask {:?} size {} adjusted to {}",
                        loc,
                        mask.size(),
                        n_rows
                    );
                    mask.adjust_size(n_rows, n_rows);
                }
                Ok(mask)
            }
        }
    }

    /// Persist the null mask, deleting the file when every row is
    /// non-null.
    pub fn write_null_mask(&self, dir: &ffi::OsStr, mask: &BitVector) -> Result<()> {
        let loc = self.mask_file(dir);
        if mask.cnt() < mask.size() {
            mask.write_file(&loc)
        } else {
            fs::remove_file(&loc).ok();
            Ok(())
        }
    }

    // ---- cached index

    pub fn as_index(&self) -> Option<&Arc<dyn BitmapIndex + Send + Sync>> {
        self.index.as_ref()
    }

    pub fn set_index(&mut self, index: Arc<dyn BitmapIndex + Send + Sync>) {
        self.index = Some(index);
    }

    /// Drop the in-memory index.
    pub fn unload_index(&mut self) {
        self.index = None;
    }

    /// Delete the cached `.idx` file and flush its file-manager view.
    pub fn purge_index(&self, dir: &ffi::OsStr, fileman: &FileMgr) -> Result<()> {
        let loc = self.index_file(dir);
        fs::remove_file(&loc).ok();
        fileman.flush_file(&loc);
        Ok(())
    }

    // ---- data access

    /// Read the fixed-width data file into typed values.
    pub fn read_values(&self, dir: &ffi::OsStr) -> Result<Values> {
        Values::read_file(&self.data_file(dir), self.ctype)
    }

    /// Fixed-width values of the rows marked 1 in `mask`.
    pub fn get_values(&self, dir: &ffi::OsStr, mask: &BitVector) -> Result<Values> {
        Ok(self.read_values(dir)?.filter(mask))
    }

    /// Recompute and record the actual min/max bounds.
    pub fn compute_min_max(&mut self, dir: &ffi::OsStr) -> Result<()> {
        if !self.ctype.is_numeric() {
            return Ok(());
        }
        if let Some((lo, hi)) = self.read_values(dir)?.min_max() {
            self.lower = lo;
            self.upper = hi;
        }
        Ok(())
    }

    // ---- append / save

    /// Copy `n_new` rows of this column from `src_dir` onto the end of
    /// `dest_dir`, which holds `n_old` rows. A column absent from the
    /// source directory appends null sentinels. Return the number of
    /// rows appended.
    pub fn append(
        &self,
        dest_dir: &ffi::OsStr,
        src_dir: &ffi::OsStr,
        n_old: usize,
        n_new: usize,
        buf: &mut Vec<u8>,
    ) -> Result<usize> {
        match self.ctype {
            ColumnType::Text => text::append(self, dest_dir, src_dir, n_old, n_new, buf),
            ColumnType::Blob => blob::append(self, dest_dir, src_dir, n_old, n_new, buf),
            ColumnType::Category => {
                category::append(self, dest_dir, src_dir, n_old, n_new, buf)
            }
            _ => self.append_fixed(dest_dir, src_dir, n_old, n_new, buf),
        }?;

        self.append_null_mask(dest_dir, src_dir, n_old, n_new)?;
        Ok(n_new)
    }

    pub(crate) fn append_fixed(
        &self,
        dest_dir: &ffi::OsStr,
        src_dir: &ffi::OsStr,
        n_old: usize,
        n_new: usize,
        buf: &mut Vec<u8>,
    ) -> Result<usize> {
        use std::io::Read;

        let esize = match self.ctype.elem_size() {
            Some(esize) => esize,
            None => err_at!(Fatal, msg: "append_fixed on {}", self.ctype)?,
        };

        let dest = self.data_file(dest_dir);
        adjust_file_size(&dest, (n_old * esize) as u64)?;

        let mut fd = util::open_file_a(&dest)?;
        let want = n_new * esize;
        let mut written = 0;
        match util::open_file_r(&self.data_file(src_dir)) {
            Ok(mut src) => {
                buf.resize(crate::part::BUFFER_SIZE, 0);
                while written < want {
                    let n = err_at!(IOError, src.read(buf))?;
                    if n == 0 {
                        break;
                    }
                    let n = n.min(want - written);
                    write_file!(fd, &buf[..n], &dest, "append_fixed")?;
                    written += n;
                }
            }
            Err(_) => (),
        }
        if written < want {
            // source fell short, pad with the type's null sentinel
            let pad = self.null_bytes((want - written) / esize)?;
            write_file!(fd, &pad, &dest, "append_fixed pad")?;
        }
        err_at!(IOError, fd.sync_all())?;
        Ok(n_new)
    }

    fn null_bytes(&self, n: usize) -> Result<Vec<u8>> {
        let vals = match self.ctype {
            // category null is dictionary id ZERO
            ColumnType::Category => Values::UInt(vec![0; n]),
            ctype => Values::cast_from(&vec![0.0; n], &BitVector::zeros(n), ctype)?,
        };
        Ok(vals.to_bytes())
    }

    fn append_null_mask(
        &self,
        dest_dir: &ffi::OsStr,
        src_dir: &ffi::OsStr,
        n_old: usize,
        n_new: usize,
    ) -> Result<()> {
        let dest_mask = self.null_mask(dest_dir, n_old)?;
        let src_mask = match util::file_size(&self.data_file(src_dir))? {
            0 => BitVector::zeros(n_new), // absent column, all null
            _ => self.null_mask(src_dir, n_new)?,
        };

        let mut mask = BitVector::zeros(n_old + n_new);
        for i in dest_mask.iter() {
            mask.set(i);
        }
        for i in src_mask.iter() {
            mask.set(n_old + i);
        }
        self.write_null_mask(dest_dir, &mask)
    }

    /// Write only the rows marked 1 in `mask` into `dest_dir`,
    /// producing a fresh data file and side files. Return the number
    /// of rows written.
    pub fn save_selected(
        &self,
        mask: &BitVector,
        src_dir: &ffi::OsStr,
        dest_dir: &ffi::OsStr,
        buf: &mut Vec<u8>,
    ) -> Result<usize> {
        let n = match self.ctype {
            ColumnType::Text => text::save_selected(self, mask, src_dir, dest_dir, buf)?,
            ColumnType::Category => {
                category::save_selected(self, mask, src_dir, dest_dir, buf)?
            }
            ColumnType::Blob => blob::save_selected(self, mask, src_dir, dest_dir, buf)?,
            _ => {
                let vals = self.read_values(src_dir)?.filter(mask);
                let n = vals.len();
                vals.write_file(&self.data_file(dest_dir))?;
                n
            }
        };

        // null mask follows the surviving rows
        let old_mask = self.null_mask(src_dir, mask.size())?;
        let mut new_mask = BitVector::zeros(n);
        for (k, i) in mask.iter().enumerate() {
            if old_mask.is_set(i) {
                new_mask.set(k);
            }
        }
        self.write_null_mask(dest_dir, &new_mask)?;

        Ok(n)
    }
}

// Repair a data file whose size disagrees with the expected row
// count, truncating excess or padding with zero bytes.
pub(crate) fn adjust_file_size(loc: &ffi::OsStr, expected: u64) -> Result<()> {
    let actual = util::file_size(loc)?;
    if actual == expected {
        return Ok(());
    }
    log::warn!("file {:?} size {} expected {}, adjusting", loc, actual, expected);
    if actual > expected {
        let fd = util::open_file_rw(loc)?;
        err_at!(IOError, fd.set_len(expected))?;
    } else {
        let mut fd = util::open_file_a(loc)?;
        let pad = vec![0_u8; usize::try_from(expected - actual).unwrap()];
        util::sync_write(&mut fd, &pad)?;
    }
    Ok(())
}
