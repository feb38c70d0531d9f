//! Module `category` implement the dictionary-coded text column
//! specialization.
//!
//! Three files back a category column, the raw NUL-terminated text
//! data (with its `.sp` side file), the `.dic` dictionary of distinct
//! values and the `.int` cache of per-row dictionary identifiers.
//! Identifier ZERO marks a NULL entry.

use std::{ffi, io::Read};

use crate::{
    column::{text, Column},
    err_at, util, BitVector, Dictionary, Error, Result,
};

/// Read the raw strings of a category or text column, preferring the
/// `.sp` side file and falling back to a NUL scan of the data file.
pub fn read_strings(col: &Column, dir: &ffi::OsStr) -> Result<Vec<String>> {
    let mut data = vec![];
    match util::open_file_r(&col.data_file(dir)) {
        Ok(mut fd) => err_at!(IOError, fd.read_to_end(&mut data))?,
        Err(_) => return Ok(vec![]),
    };

    let sp = text::read_sp(&col.sp_file(dir))?;
    let mut vals = vec![];
    if sp.len() >= 2 && *sp.last().unwrap() == data.len() as i64 {
        for w in sp.windows(2) {
            let (from, to) = (w[0] as usize, w[1] as usize);
            let mut s = &data[from..to];
            if let Some((0, head)) = s.split_last() {
                s = head;
            }
            vals.push(err_at!(FailConvert, String::from_utf8(s.to_vec()))?);
        }
    } else {
        for s in data.split(|b| *b == 0) {
            vals.push(err_at!(FailConvert, String::from_utf8(s.to_vec()))?);
        }
        // a trailing terminator leaves one spurious empty tail
        if data.last() == Some(&0) {
            vals.pop();
        }
    }
    Ok(vals)
}

/// Per-row dictionary identifiers. The `.int` cache is used when its
/// size matches, otherwise the identifiers are derived from the data
/// file through the dictionary and the cache rewritten.
pub fn read_ids(col: &Column, dir: &ffi::OsStr, n_rows: usize) -> Result<Vec<u32>> {
    use std::convert::TryInto;

    let loc = col.int_file(dir);
    if util::file_size(&loc)? == (n_rows * 4) as u64 {
        let mut fd = util::open_file_r(&loc)?;
        let mut buf = vec![];
        err_at!(IOError, fd.read_to_end(&mut buf))?;
        return Ok(buf
            .chunks(4)
            .map(|bs| u32::from_le_bytes(bs.try_into().unwrap()))
            .collect());
    }

    let mut dic = Dictionary::read_file(&col.dic_file(dir))?;
    let mut ids: Vec<u32> = read_strings(col, dir)?
        .iter()
        .map(|s| dic.insert(s))
        .collect();
    ids.resize(n_rows, 0);
    write_ids(&loc, &ids)?;
    dic.write_file(&col.dic_file(dir))?;
    Ok(ids)
}

pub fn write_ids(loc: &ffi::OsStr, ids: &[u32]) -> Result<()> {
    let mut data = Vec::with_capacity(ids.len() * 4);
    for id in ids.iter() {
        data.extend_from_slice(&id.to_le_bytes());
    }
    let mut fd = util::create_file_a(loc)?;
    util::sync_write(&mut fd, &data)?;
    Ok(())
}

/// Append the source directory's values, merging its distinct values
/// into the destination dictionary and extending the `.int` cache
/// with the remapped identifiers.
pub fn append(
    col: &Column,
    dest_dir: &ffi::OsStr,
    src_dir: &ffi::OsStr,
    n_old: usize,
    n_new: usize,
    buf: &mut Vec<u8>,
) -> Result<usize> {
    let mut ids = read_ids(col, dest_dir, n_old)?;
    let mut dic = Dictionary::read_file(&col.dic_file(dest_dir))?;

    let mut vals = read_strings(col, src_dir)?;
    vals.resize(n_new, String::default());
    for val in vals.iter() {
        ids.push(dic.insert(val));
    }

    // raw text payload follows the text column mechanics
    text::append(col, dest_dir, src_dir, n_old, n_new, buf)?;

    write_ids(&col.int_file(dest_dir), &ids)?;
    dic.write_file(&col.dic_file(dest_dir))?;
    Ok(n_new)
}

/// Write the rows marked 1 in `mask` into `dest_dir`, filtering the
/// identifier cache alongside the data file and carrying the
/// dictionary over unchanged.
pub fn save_selected(
    col: &Column,
    mask: &BitVector,
    src_dir: &ffi::OsStr,
    dest_dir: &ffi::OsStr,
    buf: &mut Vec<u8>,
) -> Result<usize> {
    let ids = read_ids(col, src_dir, mask.size())?;
    let dic = Dictionary::read_file(&col.dic_file(src_dir))?;

    let n = text::save_selected(col, mask, src_dir, dest_dir, buf)?;

    let kept: Vec<u32> = mask
        .iter()
        .filter_map(|i| ids.get(i).copied())
        .collect();
    write_ids(&col.int_file(dest_dir), &kept)?;
    dic.write_file(&col.dic_file(dest_dir))?;
    Ok(n)
}

/// Case-insensitive equality through the dictionary, one bit per row.
pub fn string_search(
    col: &Column,
    dir: &ffi::OsStr,
    n_rows: usize,
    needle: &str,
) -> Result<BitVector> {
    let ids = read_ids(col, dir, n_rows)?;
    let dic = Dictionary::read_file(&col.dic_file(dir))?;
    let mut hits = BitVector::zeros(n_rows);
    let id = match dic.to_id(needle) {
        Some(id) if id > 0 => id,
        _ => return Ok(hits),
    };
    for (i, v) in ids.iter().enumerate() {
        if *v == id {
            hits.set(i);
        }
    }
    Ok(hits)
}

/// Equality against any of the needles.
pub fn multi_search(
    col: &Column,
    dir: &ffi::OsStr,
    n_rows: usize,
    needles: &[String],
) -> Result<BitVector> {
    let ids = read_ids(col, dir, n_rows)?;
    let dic = Dictionary::read_file(&col.dic_file(dir))?;
    let wanted: Vec<u32> = needles
        .iter()
        .filter_map(|s| dic.to_id(s))
        .filter(|id| *id > 0)
        .collect();

    let mut hits = BitVector::zeros(n_rows);
    if wanted.is_empty() {
        return Ok(hits);
    }
    for (i, v) in ids.iter().enumerate() {
        if wanted.contains(v) {
            hits.set(i);
        }
    }
    Ok(hits)
}

/// Glob-style pattern match against the dictionary entries.
pub fn pattern_search(
    col: &Column,
    dir: &ffi::OsStr,
    n_rows: usize,
    pattern: &str,
) -> Result<BitVector> {
    let re = text::like_to_regex(pattern)?;
    let ids = read_ids(col, dir, n_rows)?;
    let dic = Dictionary::read_file(&col.dic_file(dir))?;
    let wanted: Vec<u32> = dic
        .iter()
        .filter(|(_, s)| re.is_match(s))
        .map(|(id, _)| id)
        .collect();

    let mut hits = BitVector::zeros(n_rows);
    if wanted.is_empty() {
        return Ok(hits);
    }
    for (i, v) in ids.iter().enumerate() {
        if wanted.contains(v) {
            hits.set(i);
        }
    }
    Ok(hits)
}

#[cfg(test)]
#[path = "category_test.rs"]
mod category_test;
