//! Module `append` implement the append/commit/rollback protocol.
//!
//! With two directories configured the protocol is crash safe, new
//! rows are first integrated into the backup directory, the two
//! directories swap roles and the partition enters the transition
//! state. Committing appends the same rows once more into the new
//! backup so both directories converge, rolling back swaps the
//! directories again and restores the previous image. With a single
//! directory the swap is elided and a failure mid-append is not
//! recoverable.

use std::{ffi, fs};

use crate::{
    column::ColumnType,
    err_at,
    part::{meta::MetaData, Partition, TableState, MASK_FILE, RIDS_FILE},
    util, Column, Error, Result,
};

impl Partition {
    /// Append the rows staged in `src_dir` to this partition. The
    /// source directory carries its own `-part.txt` describing the
    /// slice. Return the number of rows appended.
    pub fn append(&self, src_dir: &ffi::OsStr) -> Result<usize> {
        if self.is_read_only() {
            err_at!(StateFail, msg: "partition {} is read-only", self.to_name())?
        }
        let _guard = self.lock_writers();

        {
            let mut inner = self.as_inner().write();
            if inner.state == TableState::Stable {
                inner.state = TableState::Receiving;
            }
            if inner.state != TableState::Receiving {
                log::warn!(
                    "partition {} cannot accept data from {:?} in state {}",
                    inner.name,
                    src_dir,
                    inner.state
                );
                return Ok(0);
            }
        }

        let two_dirs = self.to_backup_dir().is_some();
        let res = if two_dirs {
            self.append2(src_dir)
        } else {
            self.append1(src_dir)
        };

        match res {
            Ok(n) => Ok(n),
            Err(err) => {
                log::warn!(
                    "partition {} append failed, reversing changes, {}",
                    self.to_name(),
                    err
                );
                self.as_inner().write().state = TableState::Unknown;
                if two_dirs {
                    make_backup_copy(self).ok();
                }
                Err(err)
            }
        }
    }

    // two-directory append, integrate into the backup then swap
    fn append2(&self, src_dir: &ffi::OsStr) -> Result<usize> {
        let (active, backup, n_rows, base, name) = {
            let inner = self.as_inner().read();
            (
                inner.active_dir.clone(),
                inner.backup_dir.clone().unwrap(),
                inner.n_rows,
                inner.to_metadata(),
                inner.name.clone(),
            )
        };
        self.as_fileman().flush_dir(&backup);

        // make sure the backup holds the current snapshot
        if !util::dirs_identical(&active, &backup, &[crate::part::META_FILE])? {
            if n_rows > 0 {
                self.as_inner().write().state = TableState::Unknown;
                make_backup_copy(self)?;
            } else {
                util::clean_dir(&backup)?;
            }
        }
        self.as_inner().write().state = TableState::PreTransition;

        let (n_new, _) = append_to_dir(&base, &backup, src_dir, n_rows, self)?;
        if n_new == 0 {
            log::info!("partition {} appended no new rows from {:?}", name, src_dir);
            self.as_inner().write().state = TableState::Stable;
            return Ok(0);
        }

        // the rid file, when present, must agree with the row count
        let n_rids = util::file_size(&util::file_path(&backup, RIDS_FILE))? / 8;
        if n_rids > 0 && n_rids as usize != n_rows + n_new {
            self.as_inner().write().state = TableState::Unknown;
            make_backup_copy(self)?;
            err_at!(
                Fatal,
                msg: "expected {} rids after switch, got {}", n_rows + n_new, n_rids
            )?
        }

        {
            let mut inner = self.as_inner().write();
            for col in inner.columns.iter_mut() {
                col.unload_index();
            }
            self.as_fileman().flush_dir(&inner.active_dir);

            let backup = inner.backup_dir.take().unwrap();
            let active = std::mem::replace(&mut inner.active_dir, backup);
            inner.backup_dir = Some(active);
            inner.reload()?;

            if inner.n_rows != n_rows + n_new {
                err_at!(
                    Fatal,
                    msg: "expected {} rows, metadata says {}",
                    n_rows + n_new,
                    inner.n_rows
                )?
            }
            inner.state = TableState::Transition;
            let dir = inner.active_dir.clone();
            inner.to_metadata().write(&dir)?;
            inner.write_amask(&dir)?;
        }

        log::info!(
            "partition {} switched, with possibility of rollback, to {} rows",
            name,
            n_rows + n_new
        );
        Ok(n_new)
    }

    // single-directory append, not recoverable on failure
    fn append1(&self, src_dir: &ffi::OsStr) -> Result<usize> {
        let mut inner = self.as_inner().write();
        for col in inner.columns.iter_mut() {
            col.unload_index();
        }
        self.as_fileman().flush_dir(&inner.active_dir);

        let (name, active, n_rows) =
            (inner.name.clone(), inner.active_dir.clone(), inner.n_rows);
        let base = inner.to_metadata();
        let (n_new, _) = append_to_dir(&base, &active, src_dir, n_rows, self)?;

        inner.reload()?;
        inner.state = TableState::Stable;
        let dir = inner.active_dir.clone();
        inner.to_metadata().write(&dir)?;
        inner.write_amask(&dir)?;
        log::info!("partition {} committed to {} rows", name, inner.n_rows);
        Ok(n_new)
    }

    /// Make the pending append permanent. Appends the source rows
    /// once more into the new backup directory so both directories
    /// converge, then returns to the stable state. Return the number
    /// of rows committed.
    pub fn commit(&self, src_dir: &ffi::OsStr) -> Result<usize> {
        if self.is_read_only() {
            err_at!(StateFail, msg: "partition {} is read-only", self.to_name())?
        }
        match self.to_state() {
            TableState::Stable => return Ok(0),
            TableState::Receiving => {
                // switch to the new data first
                self.append(src_dir)?;
            }
            _ => (),
        }
        if self.to_backup_dir().is_none() {
            return Ok(0);
        }

        let _guard = self.lock_writers();
        if self.to_state() != TableState::Transition {
            log::warn!(
                "partition {} commit in state {}, nothing to do",
                self.to_name(),
                self.to_state()
            );
            return Ok(0);
        }

        let (backup, n_rows, base, name) = {
            let inner = self.as_inner().read();
            (
                inner.backup_dir.clone().unwrap(),
                inner.n_rows,
                inner.to_metadata(),
                inner.name.clone(),
            )
        };
        let n_new = match MetaData::read(src_dir)? {
            Some(md) => md.n_rows,
            None => 0,
        };
        let n_old = n_rows - n_new;

        let res = append_to_dir(&base, &backup, src_dir, n_old, self);
        self.as_inner().write().state = TableState::PostTransition;
        match res {
            Ok(_) => (),
            Err(err) => {
                self.as_inner().write().state = TableState::Unknown;
                make_backup_copy(self)?;
                return Err(err);
            }
        }

        let active = self.to_active_dir();
        if util::dirs_identical(&active, &backup, &[crate::part::META_FILE])? {
            self.as_fileman().flush_dir(&backup);
            let mut inner = self.as_inner().write();
            inner.state = TableState::Stable;
            let md = inner.to_metadata();
            md.write(&inner.active_dir)?;
            md.write(&backup)?;
            if inner.amask.cnt() < inner.amask.size() {
                inner.amask.write_file(&util::file_path(&backup, MASK_FILE))?;
            }
            log::info!(
                "partition {} committed new data from {:?}, n_rows = {}",
                inner.name,
                src_dir,
                inner.n_rows
            );
        } else {
            log::warn!(
                "partition {} failed to integrate new data into the backup, \
                 copying {:?} to {:?}",
                name,
                active,
                backup
            );
            self.as_inner().write().state = TableState::Unknown;
            make_backup_copy(self)?;
        }
        Ok(n_new)
    }

    /// Undo the pending append, restoring the pre-append image. Only
    /// possible from the transition state.
    pub fn rollback(&self) -> Result<()> {
        if self.is_read_only() {
            err_at!(StateFail, msg: "partition {} is read-only", self.to_name())?
        }
        if self.to_backup_dir().is_none() {
            return Ok(());
        }
        let _guard = self.lock_writers();
        if self.to_state() != TableState::Transition {
            log::warn!(
                "partition {} rollback in state {}, nothing to do",
                self.to_name(),
                self.to_state()
            );
            return Ok(());
        }

        {
            let mut inner = self.as_inner().write();
            for col in inner.columns.iter_mut() {
                col.unload_index();
            }
            self.as_fileman().clear();

            let backup = inner.backup_dir.take().unwrap();
            let active = std::mem::replace(&mut inner.active_dir, backup);
            inner.backup_dir = Some(active);
            inner.reload()?;

            if let Some(rids) = &inner.rids {
                if rids.len() != inner.n_rows {
                    inner.n_rows = rids.len();
                }
            }
            let n_rows = inner.n_rows;
            inner.amask.adjust_size(n_rows, n_rows);
            let dir = inner.active_dir.clone();
            inner.write_amask(&dir)?;
            inner.state = TableState::Unknown;
            log::info!(
                "partition {} switched back to the previous dataset with {} rows",
                inner.name,
                inner.n_rows
            );
        }

        make_backup_copy(self)?;
        self.as_inner().write().state = TableState::Stable;
        Ok(())
    }
}

/// Bring the backup directory in sync by copying every file from the
/// active directory.
pub(crate) fn make_backup_copy(part: &Partition) -> Result<()> {
    let (active, backup) = {
        let inner = part.as_inner().read();
        match &inner.backup_dir {
            Some(backup) => (inner.active_dir.clone(), backup.clone()),
            None => return Ok(()),
        }
    };
    part.as_fileman().flush_dir(&backup);
    util::clean_dir(&backup)?;
    util::copy_dir(&active, &backup)?;
    Ok(())
}

// Integrate the rows of `src_dir` into `dest_dir` which currently
// holds `n_old` rows. Columns present on either side take part,
// columns absent from the source append null sentinels. Return the
// number of rows appended and the combined column list.
fn append_to_dir(
    base: &MetaData,
    dest_dir: &ffi::OsStr,
    src_dir: &ffi::OsStr,
    n_old: usize,
    part: &Partition,
) -> Result<(usize, Vec<Column>)> {
    let src_md = match MetaData::read(src_dir)? {
        Some(md) if md.n_rows > 0 => md,
        _ => {
            log::info!("no data in source directory {:?}", src_dir);
            return Ok((0, base.columns.clone()));
        }
    };
    let n_new = src_md.n_rows;
    log::info!(
        "partition {} appending {} rows from {:?} to {:?}",
        base.name,
        n_new,
        src_dir,
        dest_dir
    );

    // combined column list, destination types win on conflict
    let mut combined = base.columns.clone();
    for scol in src_md.columns.into_iter() {
        match combined
            .iter_mut()
            .find(|col| col.to_name().eq_ignore_ascii_case(&scol.to_name()))
        {
            Some(col) => {
                if col.to_type() != scol.to_type() {
                    err_at!(
                        TypeFail,
                        msg: "column {} is {} in source, {} here",
                        scol.to_name(),
                        scol.to_type(),
                        col.to_type()
                    )?
                }
                if let (Some((lo1, hi1)), Some((lo2, hi2))) =
                    (col.to_bounds(), scol.to_bounds())
                {
                    col.set_bounds(lo1.min(lo2), hi1.max(hi2));
                }
            }
            None => combined.push(scol),
        }
    }

    let mut buf = vec![];

    // row identifiers travel as a raw fixed-width pseudo column
    let src_rids = util::file_size(&util::file_path(src_dir, RIDS_FILE))? as usize / 8;
    if src_rids > 0 {
        let rid_col = Column::new(RIDS_FILE, ColumnType::Oid);
        if src_rids != n_new {
            log::warn!(
                "source {:?} holds {} rids for {} rows",
                src_dir,
                src_rids,
                n_new
            );
        }
        rid_col.append_fixed(dest_dir, src_dir, n_old, n_new, &mut buf)?;
    } else if util::file_size(&util::file_path(dest_dir, RIDS_FILE))? > 0 {
        log::warn!("source {:?} has no rids, removing {:?} rid file", src_dir, dest_dir);
        fs::remove_file(util::file_path(dest_dir, RIDS_FILE)).ok();
    }

    for col in combined.iter_mut() {
        let n = col.append(dest_dir, src_dir, n_old, n_new, &mut buf)?;
        if n != n_new {
            err_at!(Fatal, msg: "column {} appended {}/{} rows", col.to_name(), n, n_new)?
        }
        if col.to_bounds().is_none() && col.to_type().is_numeric() {
            col.compute_min_max(dest_dir)?;
        }
        part.as_fileman().flush_file(&col.data_file(dest_dir));
    }

    let md = MetaData {
        name: base.name.clone(),
        description: base.description.clone(),
        n_rows: n_old + n_new,
        index: base.index.clone().or(src_md.index),
        metatags: base.metatags.clone().or(src_md.metatags),
        timestamp: 0,
        columns: combined.clone(),
    };
    md.write(dest_dir)?;
    Ok((n_new, combined))
}

#[cfg(test)]
#[path = "append_test.rs"]
mod append_test;
