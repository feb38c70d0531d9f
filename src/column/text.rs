//! Module `text` implement the raw-text column specialization.
//!
//! Values are concatenated NUL-terminated byte strings in the data
//! file. The `.sp` side file holds `n_rows + 1` signed 64-bit start
//! offsets, `sp[i]` is the byte position of row i's string and
//! `sp[n_rows]` equals the data file size.

use regex::Regex;

use std::{ffi, io::Read};

use crate::{
    column::{flush::Flusher, Column},
    err_at, util, BitVector, Error, Result,
};

/// Read the `.sp` offsets at `loc`. Missing file yields an empty
/// vector.
pub fn read_sp(loc: &ffi::OsStr) -> Result<Vec<i64>> {
    use std::convert::TryInto;

    let mut fd = match util::open_file_r(loc) {
        Ok(fd) => fd,
        Err(_) => return Ok(vec![]),
    };
    let mut buf = vec![];
    err_at!(IOError, fd.read_to_end(&mut buf))?;
    if buf.len() % 8 != 0 {
        err_at!(InvalidFormat, msg: "sp file {:?} size {}", loc, buf.len())?
    }
    Ok(buf
        .chunks(8)
        .map(|bs| i64::from_le_bytes(bs.try_into().unwrap()))
        .collect())
}

pub fn write_sp(loc: &ffi::OsStr, offsets: &[i64]) -> Result<()> {
    let mut data = Vec::with_capacity(offsets.len() * 8);
    for off in offsets.iter() {
        data.extend_from_slice(&off.to_le_bytes());
    }
    let mut fd = util::create_file_a(loc)?;
    util::sync_write(&mut fd, &data)?;
    Ok(())
}

/// Locate the starting position of each string in the column's data
/// file and rewrite the `.sp` side file for `expected_rows` rows.
///
/// An existing `.sp` with a valid trailing offset is resumed from
/// that point rather than rescanned. Fewer strings than expected pad
/// the tail with the data size, each missing row reads back as an
/// empty string. More strings than expected truncate both files.
pub fn start_positions(
    col: &Column,
    dir: &ffi::OsStr,
    expected_rows: usize,
    buf: &mut Vec<u8>,
) -> Result<()> {
    let dfile = col.data_file(dir);
    let spfile = col.sp_file(dir);
    let dsize = util::file_size(&dfile)? as i64;

    // resume from the previous final offset when it is still valid
    let old = read_sp(&spfile)?;
    let (mut starts, mut pos) = match old.split_last() {
        Some((last, head))
            if *last > 0 && *last <= dsize && head.len() <= expected_rows =>
        {
            (head.to_vec(), *last)
        }
        _ => (vec![], 0),
    };

    if pos < dsize {
        let mut fd = util::open_file_r(&dfile)?;
        err_at!(IOError, std::io::Seek::seek(&mut fd, std::io::SeekFrom::Start(pos as u64)))?;
        buf.resize(crate::part::BUFFER_SIZE, 0);
        let mut last = pos;
        loop {
            let n = err_at!(IOError, fd.read(buf))?;
            if n == 0 {
                break;
            }
            for b in buf[..n].iter() {
                if *b == 0 {
                    starts.push(last);
                    last = pos + 1;
                }
                pos += 1;
            }
        }
        if last < dsize {
            // unterminated tail, treat as one more string
            starts.push(last);
        }
    }

    if starts.len() < expected_rows {
        if !starts.is_empty() || expected_rows > 0 {
            log::warn!(
                "column {} has {} strings for {} rows, padding",
                col.to_name(),
                starts.len(),
                expected_rows
            );
        }
        while starts.len() < expected_rows {
            starts.push(dsize);
        }
    } else if starts.len() > expected_rows {
        log::warn!(
            "column {} has {} strings for {} rows, truncating",
            col.to_name(),
            starts.len(),
            expected_rows
        );
        let cut = starts[expected_rows];
        starts.truncate(expected_rows);
        let fd = util::open_file_rw(&dfile)?;
        err_at!(IOError, fd.set_len(cut as u64))?;
        starts.push(cut);
        return write_sp(&spfile, &starts);
    }

    starts.push(dsize);
    write_sp(&spfile, &starts)
}

/// Append the source directory's strings onto the destination column
/// and rebuild the destination `.sp`. A missing source file appends
/// `n_new` empty strings.
pub fn append(
    col: &Column,
    dest_dir: &ffi::OsStr,
    src_dir: &ffi::OsStr,
    n_old: usize,
    n_new: usize,
    buf: &mut Vec<u8>,
) -> Result<usize> {
    // bring the destination's side file in line with n_old first
    start_positions(col, dest_dir, n_old, buf)?;

    let dest = col.data_file(dest_dir);
    let mut fd = util::open_file_a(&dest)?;
    match util::open_file_r(&col.data_file(src_dir)) {
        Ok(mut src) => {
            buf.resize(crate::part::BUFFER_SIZE, 0);
            loop {
                let n = err_at!(IOError, src.read(buf))?;
                if n == 0 {
                    break;
                }
                write_file!(fd, &buf[..n], &dest, "text append")?;
            }
        }
        Err(_) => {
            let nuls = vec![0_u8; n_new];
            write_file!(fd, &nuls, &dest, "text append nulls")?;
        }
    }
    err_at!(IOError, fd.sync_all())?;

    start_positions(col, dest_dir, n_old + n_new, buf)?;
    Ok(n_new)
}

/// Write the rows marked 1 in `mask` as a fresh data file and `.sp`
/// under `dest_dir`. Return the number of rows written.
pub fn save_selected(
    col: &Column,
    mask: &BitVector,
    src_dir: &ffi::OsStr,
    dest_dir: &ffi::OsStr,
    buf: &mut Vec<u8>,
) -> Result<usize> {
    // bring the side file in line before selecting through it
    start_positions(col, src_dir, mask.size(), buf)?;
    let sp = read_sp(&col.sp_file(src_dir))?;
    let data = {
        let mut fd = util::open_file_r(&col.data_file(src_dir))?;
        let mut data = vec![];
        err_at!(IOError, fd.read_to_end(&mut data))?;
        data
    };
    let n_rows = sp.len().saturating_sub(1);

    // stage into memory, the destination may be the source
    let mut out = vec![];
    let mut starts = vec![];
    let mut count = 0;
    for i in mask.iter().filter(|i| *i < n_rows) {
        let (from, to) = (sp[i] as usize, sp[i + 1] as usize);
        starts.push(out.len() as i64);
        out.extend_from_slice(&data[from..to]);
        if out.last() != Some(&0) {
            out.push(0);
        }
        count += 1;
    }
    starts.push(out.len() as i64);

    let mut flusher = Flusher::new(&col.data_file(dest_dir), true)?;
    flusher.flush(out)?;
    flusher.close()?;
    write_sp(&col.sp_file(dest_dir), &starts)?;
    Ok(count)
}

/// Replace the column's data file and `.sp` with the given strings.
pub fn write_strings(col: &Column, dir: &ffi::OsStr, vals: &[String]) -> Result<()> {
    let mut out = vec![];
    let mut starts = vec![];
    for val in vals.iter() {
        starts.push(out.len() as i64);
        out.extend_from_slice(val.as_bytes());
        out.push(0);
    }
    starts.push(out.len() as i64);

    let mut flusher = Flusher::new(&col.data_file(dir), true)?;
    flusher.flush(out)?;
    flusher.close()?;
    write_sp(&col.sp_file(dir), &starts)
}

/// Read the string value of the ith row.
pub fn read_string(col: &Column, dir: &ffi::OsStr, i: usize) -> Result<String> {
    use std::io::{Seek, SeekFrom};

    let sp = read_sp(&col.sp_file(dir))?;
    if i + 1 >= sp.len() {
        err_at!(InvalidInput, msg: "row {} of {}", i, sp.len().saturating_sub(1))?
    }
    let (from, to) = (sp[i], sp[i + 1]);
    let mut fd = util::open_file_r(&col.data_file(dir))?;
    let data = read_file!(fd, SeekFrom::Start(from as u64), to - from, "read_string")?;
    let data = match data.split_last() {
        Some((0, head)) => head.to_vec(),
        _ => data,
    };
    err_at!(FailConvert, String::from_utf8(data))
}

// Iterate rows of the data file, applying `f` on each string slice.
fn scan_rows<F>(col: &Column, dir: &ffi::OsStr, mut f: F) -> Result<BitVector>
where
    F: FnMut(&[u8]) -> bool,
{
    let sp = read_sp(&col.sp_file(dir))?;
    let n_rows = sp.len().saturating_sub(1);
    let mut data = vec![];
    {
        let mut fd = util::open_file_r(&col.data_file(dir))?;
        err_at!(IOError, fd.read_to_end(&mut data))?;
    }

    let mut hits = BitVector::zeros(n_rows);
    for i in 0..n_rows {
        let (from, to) = (sp[i] as usize, (sp[i + 1] as usize).min(data.len()));
        let mut s = &data[from.min(to)..to];
        if let Some((0, head)) = s.split_last() {
            s = head;
        }
        if f(s) {
            hits.set(i);
        }
    }
    Ok(hits)
}

/// Case-insensitive exact match, one bit per row, 1 iff the row's
/// string equals `needle`.
pub fn string_search(col: &Column, dir: &ffi::OsStr, needle: &str) -> Result<BitVector> {
    scan_rows(col, dir, |s| match std::str::from_utf8(s) {
        Ok(s) => s.eq_ignore_ascii_case(needle),
        Err(_) => false,
    })
}

/// Case-insensitive match against any of the needles.
pub fn multi_search(col: &Column, dir: &ffi::OsStr, needles: &[String]) -> Result<BitVector> {
    scan_rows(col, dir, |s| match std::str::from_utf8(s) {
        Ok(s) => needles.iter().any(|n| s.eq_ignore_ascii_case(n)),
        Err(_) => false,
    })
}

/// Glob-style pattern match, `%` matches any run of characters, `_`
/// any single character.
pub fn pattern_search(col: &Column, dir: &ffi::OsStr, pattern: &str) -> Result<BitVector> {
    let re = like_to_regex(pattern)?;
    scan_rows(col, dir, |s| match std::str::from_utf8(s) {
        Ok(s) => re.is_match(s),
        Err(_) => false,
    })
}

// Translate a LIKE pattern into an anchored regular expression.
pub(crate) fn like_to_regex(pattern: &str) -> Result<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            ch => expr.push_str(&regex::escape(&ch.to_string())),
        }
    }
    expr.push('$');
    err_at!(InvalidInput, Regex::new(&expr), "bad pattern {:?}", pattern)
}

#[cfg(test)]
#[path = "text_test.rs"]
mod text_test;
