//! Module `blob` implement the opaque byte-string column
//! specialization.
//!
//! Structurally identical to a text column, a raw data file of
//! concatenated payloads plus a `.sp` side file of `n_rows + 1` start
//! offsets, except that values carry no terminator and are never
//! interpreted.

use std::{ffi, io::Read};

use crate::{
    column::{flush::Flusher, text, Column},
    err_at, util, BitVector, Error, Result,
};

/// Append the source directory's payloads onto the destination
/// column. The destination `.sp` grows by the source's offsets
/// shifted to the end of the existing data.
pub fn append(
    col: &Column,
    dest_dir: &ffi::OsStr,
    src_dir: &ffi::OsStr,
    n_old: usize,
    n_new: usize,
    buf: &mut Vec<u8>,
) -> Result<usize> {
    let dest = col.data_file(dest_dir);
    let spfile = col.sp_file(dest_dir);

    let mut sp = text::read_sp(&spfile)?;
    let dsize = util::file_size(&dest)? as i64;
    if sp.len() != n_old + 1 || sp.last() != Some(&dsize) {
        log::warn!(
            "column {} sp {}/{} rebuilt from offsets",
            col.to_name(),
            sp.len(),
            n_old + 1
        );
        sp = repair_sp(sp, n_old, dsize);
    }

    let src_sp = text::read_sp(&col.sp_file(src_dir))?;
    let mut fd = util::open_file_a(&dest)?;
    match util::open_file_r(&col.data_file(src_dir)) {
        Ok(mut src) => {
            buf.resize(crate::part::BUFFER_SIZE, 0);
            loop {
                let n = err_at!(IOError, src.read(buf))?;
                if n == 0 {
                    break;
                }
                write_file!(fd, &buf[..n], &dest, "blob append")?;
            }
        }
        Err(_) => (),
    }
    err_at!(IOError, fd.sync_all())?;

    // shift the source start positions past the old payloads
    sp.pop();
    for i in 0..n_new {
        let off = src_sp.get(i).copied().unwrap_or_else(|| {
            src_sp.last().copied().unwrap_or(0)
        });
        sp.push(dsize + off);
    }
    sp.push(util::file_size(&dest)? as i64);
    text::write_sp(&spfile, &sp)?;
    Ok(n_new)
}

// force the offset list to shape (n_old + 1, last == dsize)
fn repair_sp(mut sp: Vec<i64>, n_old: usize, dsize: i64) -> Vec<i64> {
    sp.pop();
    sp.retain(|off| *off <= dsize);
    while sp.len() < n_old {
        sp.push(dsize);
    }
    sp.truncate(n_old);
    sp.push(dsize);
    sp
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
    let _ = buf;
    let sp = text::read_sp(&col.sp_file(src_dir))?;
    let data = {
        let mut fd = util::open_file_r(&col.data_file(src_dir))?;
        let mut data = vec![];
        err_at!(IOError, fd.read_to_end(&mut data))?;
        data
    };
    let n_rows = sp.len().saturating_sub(1);

    let mut out = vec![];
    let mut starts = vec![];
    let mut count = 0;
    for i in mask.iter().filter(|i| *i < n_rows) {
        let (from, to) = (sp[i] as usize, sp[i + 1] as usize);
        starts.push(out.len() as i64);
        out.extend_from_slice(&data[from..to]);
        count += 1;
    }
    starts.push(out.len() as i64);

    let mut flusher = Flusher::new(&col.data_file(dest_dir), true)?;
    flusher.flush(out)?;
    flusher.close()?;
    text::write_sp(&col.sp_file(dest_dir), &starts)?;
    Ok(count)
}

/// Read the payload of the ith row.
pub fn read_blob(col: &Column, dir: &ffi::OsStr, i: usize) -> Result<Vec<u8>> {
    use std::io::{Seek, SeekFrom};

    let sp = text::read_sp(&col.sp_file(dir))?;
    if i + 1 >= sp.len() {
        err_at!(InvalidInput, msg: "row {} of {}", i, sp.len().saturating_sub(1))?
    }
    let (from, to) = (sp[i], sp[i + 1]);
    let mut fd = util::open_file_r(&col.data_file(dir))?;
    read_file!(fd, SeekFrom::Start(from as u64), to - from, "read_blob")
}

#[cfg(test)]
#[path = "blob_test.rs"]
mod blob_test;
