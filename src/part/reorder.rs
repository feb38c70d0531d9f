//! Module `reorder` implement multi-key physical reordering of a
//! partition's rows.
//!
//! The sort runs key by key. The first key orders the whole row set
//! and yields segments of equal values, each following key re-sorts
//! rows only within those segments, refining the permutation, exactly
//! the behavior of a lexicographic sort over the key tuple. Every
//! column, the null masks and the row identifiers are then rewritten
//! in permuted order.

use rayon::prelude::*;

use std::ffi;

use crate::{
    column::{category, text, ColumnType},
    err_at,
    part::{Partition, RIDS_FILE},
    util, BitVector, Column, Error, Result, RidSet,
};

impl Partition {
    /// Reorder the rows on the given sort keys. `directions[i]` false
    /// sorts the ith key descending. Inactive rows are purged first.
    /// Return the number of rows reordered.
    pub fn reorder(&self, keys: &[&str], directions: &[bool]) -> Result<usize> {
        if self.is_read_only() {
            err_at!(StateFail, msg: "partition {} is read-only", self.to_name())?
        }
        if self.len() == 0 || self.n_columns() == 0 {
            return Ok(0);
        }

        self.purge_inactive()?;

        let _guard = self.lock_writers();

        // gather usable sort keys
        let mut key_cols = vec![];
        for name in keys.iter() {
            match self.to_column(name) {
                Some(col) if col.to_type().is_numeric() => key_cols.push(col),
                Some(col) => {
                    log::warn!(
                        "column {} of type {} is not usable as a sort key",
                        name,
                        col.to_type()
                    );
                }
                None => log::warn!("no column named {} to sort on", name),
            }
        }
        if key_cols.is_empty() {
            log::warn!(
                "partition {} reorder without usable sort keys",
                self.to_name()
            );
            return Ok(0);
        }

        let (active, backup, columns, n_rows, rids) = {
            let mut inner = self.as_inner().write();
            let fileman = self.as_fileman().clone();
            let dir = inner.active_dir.clone();
            for col in inner.columns.iter_mut() {
                col.unload_index();
                col.purge_index(&dir, &fileman)?;
            }
            (
                inner.active_dir.clone(),
                inner.backup_dir.clone(),
                inner.columns.clone(),
                inner.n_rows,
                inner.rids.clone(),
            )
        };
        self.as_fileman().flush_dir(&active);
        if let Some(backup) = &backup {
            self.as_fileman().flush_dir(backup);
        }
        log::info!("partition {} start sorting {} rows", self.to_name(), n_rows);

        // the sorting loop
        let mut starts: Vec<u32> = vec![0, n_rows as u32];
        let mut ind: Vec<u32> = (0..n_rows as u32).collect();
        for (i, col) in key_cols.iter().enumerate() {
            let ascending = directions.get(i).copied().unwrap_or(true);
            let vals = col.read_values(&active)?;
            if vals.len() != n_rows {
                err_at!(
                    Fatal,
                    msg: "column {} holds {}/{} values",
                    col.to_name(),
                    vals.len(),
                    n_rows
                )?
            }
            ind = vals.sort_segments(&mut starts, &ind, ascending);
        }

        // rewrite every column in the new order
        let errs: Vec<Error> = columns
            .par_iter()
            .filter_map(|col| rewrite_column(col, &active, &ind).err())
            .collect();
        if let Some(err) = errs.into_iter().next() {
            return Err(err);
        }

        if let Some(rids) = &rids {
            let permuted: Vec<crate::Rid> = ind
                .iter()
                .filter_map(|i| rids.as_rids().get(*i as usize).copied())
                .collect();
            RidSet::from(permuted).write_file(&util::file_path(&active, RIDS_FILE))?;
        }

        {
            let mut inner = self.as_inner().write();
            let first = key_cols[0].to_name();
            for col in inner.columns.iter_mut() {
                let sorted = col.to_name().eq_ignore_ascii_case(&first);
                col.set_sorted(sorted);
            }
            let note = format!(
                " -- reorder({}) on {}",
                key_cols
                    .iter()
                    .map(|c| c.to_name())
                    .collect::<Vec<String>>()
                    .join(", "),
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
            );
            inner.description.push_str(&note);
            let dir = inner.active_dir.clone();
            inner.to_metadata().write(&dir)?;
            inner.rids = RidSet::read_file(&util::file_path(&dir, RIDS_FILE))?;
        }

        log::info!("partition {} reorder completed", self.to_name());
        Ok(n_rows)
    }
}

// rewrite one column's files in permuted order
fn rewrite_column(col: &Column, dir: &ffi::OsStr, ind: &[u32]) -> Result<()> {
    let n_rows = ind.len();
    match col.to_type() {
        ColumnType::Text => {
            let vals = category::read_strings(col, dir)?;
            let permuted = permute_strings(vals, ind);
            text::write_strings(col, dir, &permuted)?;
        }
        ColumnType::Category => {
            let vals = category::read_strings(col, dir)?;
            let permuted = permute_strings(vals, ind);
            text::write_strings(col, dir, &permuted)?;
            let ids = category::read_ids(col, dir, n_rows)?;
            let ids: Vec<u32> = ind
                .iter()
                .map(|i| ids.get(*i as usize).copied().unwrap_or(0))
                .collect();
            category::write_ids(&col.int_file(dir), &ids)?;
        }
        ColumnType::Blob => {
            use std::io::Read;

            let sp = text::read_sp(&col.sp_file(dir))?;
            let mut data = vec![];
            let mut fd = util::open_file_r(&col.data_file(dir))?;
            err_at!(IOError, fd.read_to_end(&mut data))?;

            let mut out = vec![];
            let mut starts = vec![];
            for i in ind.iter() {
                let i = *i as usize;
                starts.push(out.len() as i64);
                if i + 1 < sp.len() {
                    out.extend_from_slice(&data[sp[i] as usize..sp[i + 1] as usize]);
                }
            }
            starts.push(out.len() as i64);
            let mut fd = util::create_file_a(&col.data_file(dir))?;
            util::sync_write(&mut fd, &out)?;
            text::write_sp(&col.sp_file(dir), &starts)?;
        }
        _ => {
            let vals = col.read_values(dir)?;
            vals.permute(ind).write_file(&col.data_file(dir))?;
        }
    }

    // the null mask follows the same permutation
    let mask = col.null_mask(dir, n_rows)?;
    if mask.cnt() < mask.size() {
        let mut permuted = BitVector::zeros(n_rows);
        for (k, i) in ind.iter().enumerate() {
            if mask.is_set(*i as usize) {
                permuted.set(k);
            }
        }
        col.write_null_mask(dir, &permuted)?;
    }
    Ok(())
}

fn permute_strings(vals: Vec<String>, ind: &[u32]) -> Vec<String> {
    ind.iter()
        .map(|i| vals.get(*i as usize).cloned().unwrap_or_default())
        .collect()
}

#[cfg(test)]
#[path = "reorder_test.rs"]
mod reorder_test;
