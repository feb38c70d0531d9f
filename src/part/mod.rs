//! Module `part` implement the data partition and its life-cycle.
//!
//! A partition is a horizontally independent table fragment backed by
//! one or two on-disk directories. The active directory holds the
//! authoritative data, the optional backup directory the previous
//! snapshot. Appends land in the backup first, the directories swap
//! roles, and a commit brings both back in sync, see [append]. A
//! persistent active-row mask supports logical deletion, and rows can
//! be physically reordered on multiple sort keys, see [reorder].
//!
//! Concurrency follows a two-level scheme, a per-partition mutex
//! serializes the writers among themselves while a latch-and-spin
//! read/write lock lets queries observe a consistent snapshot, either
//! the pre-swap or the post-swap view.

use serde::Deserialize;

use std::{
    ffi, fmt, fs, path, result,
    sync::{Mutex, MutexGuard},
};

use crate::{
    column::ColumnType,
    err_at,
    qexpr::MathTerm,
    query::Schema,
    util,
    util::spinlock::{self, Spinlock},
    BitVector, Column, Error, FileMgr, Result, RidSet,
};

pub mod append;
pub mod eval;
pub mod meta;
pub mod reorder;

pub use meta::{MetaData, MASK_FILE, META_FILE, RIDS_FILE};

/// Unit of buffered file copying.
pub const BUFFER_SIZE: usize = 1024 * 1024;

/// Life-cycle states of a partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableState {
    Stable,
    Receiving,
    PreTransition,
    Transition,
    PostTransition,
    Unknown,
}

impl fmt::Display for TableState {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        let s = match self {
            TableState::Stable => "stable",
            TableState::Receiving => "receiving",
            TableState::PreTransition => "pre-transition",
            TableState::Transition => "transition",
            TableState::PostTransition => "post-transition",
            TableState::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Configuration for a [Partition].
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Uniquely name the partition.
    pub name: String,
    /// Directory holding the authoritative data.
    pub dir: String,
    /// Optional directory holding the previous snapshot, enables
    /// rollback after append.
    #[serde(default)]
    pub backup_dir: Option<String>,
    /// Refuse every mutating operation.
    #[serde(default)]
    pub read_only: bool,
    /// I/O copy buffer size in bytes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_buffer_size() -> usize {
    BUFFER_SIZE
}

impl<'a> arbitrary::Arbitrary<'a> for Config {
    fn arbitrary(u: &mut arbitrary::Unstructured) -> arbitrary::Result<Self> {
        use std::env;

        let name: String = u.arbitrary()?;
        let dir = env::temp_dir().join("ibis-arb").to_string_lossy().to_string();

        let config = Config {
            name,
            dir,
            backup_dir: None,
            read_only: u.arbitrary()?,
            buffer_size: *u.choose(&[1024, 4096, BUFFER_SIZE])?,
        };
        Ok(config)
    }
}

impl Config {
    pub fn new(dir: &str, name: &str) -> Config {
        Config {
            name: name.to_string(),
            dir: dir.to_string(),
            backup_dir: None,
            read_only: false,
            buffer_size: BUFFER_SIZE,
        }
    }

    /// Load a configuration from a TOML file.
    pub fn from_file<P: AsRef<path::Path>>(loc: P) -> Result<Config> {
        util::load_toml(loc)
    }

    pub fn set_backup_dir(&mut self, dir: &str) -> &mut Self {
        self.backup_dir = Some(dir.to_string());
        self
    }

    pub fn set_read_only(&mut self, read_only: bool) -> &mut Self {
        self.read_only = read_only;
        self
    }

    pub fn set_buffer_size(&mut self, buffer_size: usize) -> &mut Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn to_active_dir(&self) -> ffi::OsString {
        ffi::OsString::from(self.dir.clone())
    }

    pub fn to_backup_dir(&self) -> Option<ffi::OsString> {
        self.backup_dir.as_ref().map(ffi::OsString::from)
    }
}

// Mutable snapshot of the partition, guarded by the spinlock.
pub(crate) struct Inner {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) n_rows: usize,
    pub(crate) state: TableState,
    pub(crate) active_dir: ffi::OsString,
    pub(crate) backup_dir: Option<ffi::OsString>,
    pub(crate) columns: Vec<Column>,
    pub(crate) amask: BitVector,
    pub(crate) rids: Option<RidSet>,
    pub(crate) index: Option<String>,
    pub(crate) metatags: Option<String>,
}

impl Inner {
    pub(crate) fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|col| col.to_name().eq_ignore_ascii_case(name))
    }

    pub(crate) fn to_metadata(&self) -> MetaData {
        MetaData {
            name: self.name.clone(),
            description: self.description.clone(),
            n_rows: self.n_rows,
            index: self.index.clone(),
            metatags: self.metatags.clone(),
            timestamp: 0,
            columns: self.columns.clone(),
        }
    }

    // re-read metadata, row mask and rids from the active directory
    pub(crate) fn reload(&mut self) -> Result<()> {
        let md = match MetaData::read(&self.active_dir)? {
            Some(md) => md,
            None => MetaData {
                name: self.name.clone(),
                ..MetaData::default()
            },
        };
        self.description = md.description;
        self.n_rows = md.n_rows;
        self.columns = md.columns;
        self.index = md.index;
        self.metatags = md.metatags;

        let mskfile = util::file_path(&self.active_dir, MASK_FILE);
        self.amask = match util::file_size(&mskfile)? {
            0 => BitVector::ones(self.n_rows),
            _ => {
                let mut amask = BitVector::read_file(&mskfile)?;
                if amask.size() != self.n_rows {
                    log::warn!(
                        "row mask {:?} size {} adjusted to {}",
                        mskfile,
                        amask.size(),
                        self.n_rows
                    );
                    amask.adjust_size(self.n_rows, self.n_rows);
                }
                amask
            }
        };

        let ridfile = util::file_path(&self.active_dir, RIDS_FILE);
        self.rids = RidSet::read_file(&ridfile)?;
        if let Some(rids) = &self.rids {
            if rids.len() != self.n_rows {
                log::warn!(
                    "rid file {:?} holds {} rids for {} rows",
                    ridfile,
                    rids.len(),
                    self.n_rows
                );
            }
        }
        Ok(())
    }

    // persist the active-row mask, deleting the file when all rows
    // are active
    pub(crate) fn write_amask(&self, dir: &ffi::OsStr) -> Result<()> {
        let loc = util::file_path(dir, MASK_FILE);
        if self.amask.cnt() < self.amask.size() {
            self.amask.write_file(&loc)
        } else {
            fs::remove_file(&loc).ok();
            Ok(())
        }
    }
}

/// Partition type, a named table fragment owning its columns.
pub struct Partition {
    config: Config,
    // serializes append/commit/rollback/reorder/purge among themselves
    mu: Mutex<()>,
    inner: Spinlock<Inner>,
    fileman: FileMgr,
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        let inner = self.inner.read();
        write!(f, "partition<{}:{}>", inner.name, inner.n_rows)
    }
}

impl Partition {
    /// Open a partition by scanning its active directory. A directory
    /// without metadata yields an empty partition ready to receive
    /// its first append.
    pub fn open(config: Config) -> Result<Partition> {
        let mut inner = Inner {
            name: config.name.clone(),
            description: String::default(),
            n_rows: 0,
            state: TableState::Stable,
            active_dir: config.to_active_dir(),
            backup_dir: config.to_backup_dir(),
            columns: vec![],
            amask: BitVector::zeros(0),
            rids: None,
            index: None,
            metatags: None,
        };
        err_at!(IOError, fs::create_dir_all(&inner.active_dir))?;
        if let Some(backup) = &inner.backup_dir {
            err_at!(IOError, fs::create_dir_all(backup))?;
        }
        inner.reload()?;

        Ok(Partition {
            config,
            mu: Mutex::new(()),
            inner: Spinlock::new(inner),
            fileman: FileMgr::new(),
        })
    }

    pub(crate) fn as_inner(&self) -> &Spinlock<Inner> {
        &self.inner
    }

    pub(crate) fn lock_writers(&self) -> MutexGuard<()> {
        match self.mu.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn as_fileman(&self) -> &FileMgr {
        &self.fileman
    }

    pub fn as_config(&self) -> &Config {
        &self.config
    }

    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    pub fn to_name(&self) -> String {
        self.inner.read().name.clone()
    }

    pub fn to_description(&self) -> String {
        self.inner.read().description.clone()
    }

    /// Current row count.
    pub fn len(&self) -> usize {
        self.inner.read().n_rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_state(&self) -> TableState {
        self.inner.read().state
    }

    pub fn to_active_dir(&self) -> ffi::OsString {
        self.inner.read().active_dir.clone()
    }

    pub fn to_backup_dir(&self) -> Option<ffi::OsString> {
        self.inner.read().backup_dir.clone()
    }

    /// Copy of the active-row mask.
    pub fn to_mask(&self) -> BitVector {
        self.inner.read().amask.clone()
    }

    pub fn to_rids(&self) -> Option<RidSet> {
        self.inner.read().rids.clone()
    }

    /// Mesh shape recorded in the metatags, `shape = 2x3x4`.
    pub fn to_shape(&self) -> Option<Vec<usize>> {
        let inner = self.inner.read();
        let metatags = inner.metatags.as_ref()?;
        for tag in metatags.split(',') {
            let mut parts = tag.splitn(2, '=');
            let key = parts.next()?.trim();
            let value = parts.next()?.trim();
            if key.eq_ignore_ascii_case("shape") {
                let mut shape = vec![];
                for d in value.split('x') {
                    shape.push(d.trim().parse::<usize>().ok()?);
                }
                return Some(shape);
            }
        }
        None
    }

    pub fn n_columns(&self) -> usize {
        self.inner.read().columns.len()
    }

    pub fn to_columns(&self) -> Vec<Column> {
        self.inner.read().columns.clone()
    }

    /// Case-insensitive column lookup.
    pub fn to_column(&self, name: &str) -> Option<Column> {
        self.inner.read().column(name).cloned()
    }

    /// Spinlock contention counters, for diagnostics.
    pub fn to_lock_stats(&self) -> Result<spinlock::Stats> {
        self.inner.to_stats()
    }

    /// Drop every cached in-memory index.
    pub fn unload_indexes(&self) {
        let mut inner = self.inner.write();
        for col in inner.columns.iter_mut() {
            col.unload_index();
        }
    }

    /// Synthesize row identifiers `(run, 0..n)` when the `-rids` file
    /// is missing.
    pub fn fill_rids(&self, run: u32) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.rids.is_some() {
            return Ok(());
        }
        let rids = RidSet::fill(run, inner.n_rows);
        rids.write_file(&util::file_path(&inner.active_dir, RIDS_FILE))?;
        inner.rids = Some(rids);
        Ok(())
    }

    // ---- active-row mask

    /// Mark the rows set in `rows` inactive. Inactive rows no longer
    /// participate in query evaluation. Return the number of inactive
    /// rows.
    pub fn deactivate(&self, rows: &BitVector) -> Result<usize> {
        if self.is_read_only() {
            err_at!(StateFail, msg: "partition {} is read-only", self.to_name())?
        }
        let mut inner = self.inner.write();
        inner.amask.minus_assign(rows);
        let dir = inner.active_dir.clone();
        inner.write_amask(&dir)?;
        log::info!(
            "partition {} deactivated {} rows, {} active of {}",
            inner.name,
            rows.cnt(),
            inner.amask.cnt(),
            inner.amask.size()
        );
        Ok(inner.amask.size() - inner.amask.cnt())
    }

    /// Make the rows set in `rows` active again. Return the number of
    /// active rows.
    pub fn reactivate(&self, rows: &BitVector) -> Result<usize> {
        if self.is_read_only() {
            err_at!(StateFail, msg: "partition {} is read-only", self.to_name())?
        }
        let mut inner = self.inner.write();
        inner.amask.or_assign(rows);
        let n_rows = inner.n_rows;
        inner.amask.adjust_size(0, n_rows);
        let dir = inner.active_dir.clone();
        inner.write_amask(&dir)?;
        Ok(inner.amask.cnt())
    }

    /// Deactivate by row numbers.
    pub fn deactivate_rows(&self, rows: &[u32]) -> Result<usize> {
        let mask = BitVector::from_rows(rows, self.len());
        self.deactivate(&mask)
    }

    /// Reactivate by row numbers.
    pub fn reactivate_rows(&self, rows: &[u32]) -> Result<usize> {
        let mask = BitVector::from_rows(rows, self.len());
        self.reactivate(&mask)
    }

    /// Deactivate every row satisfying `conds`.
    pub fn deactivate_where(&self, conds: &str) -> Result<usize> {
        let mask = eval::rows_matching(self, conds)?;
        log::info!(
            "partition {} translated {:?} into {} rows",
            self.to_name(),
            conds,
            mask.cnt()
        );
        self.deactivate(&mask)
    }

    /// Reactivate every row satisfying `conds`.
    pub fn reactivate_where(&self, conds: &str) -> Result<usize> {
        let mask = eval::rows_matching(self, conds)?;
        self.reactivate(&mask)
    }

    /// Physically remove the inactive rows. Permanent and
    /// irreversible. Return the number of surviving rows.
    pub fn purge_inactive(&self) -> Result<usize> {
        if self.is_read_only() {
            err_at!(StateFail, msg: "partition {} is read-only", self.to_name())?
        }
        let _guard = self.lock_writers();
        self.do_purge_inactive()
    }

    fn do_purge_inactive(&self) -> Result<usize> {
        let (amask, columns, active_dir, backup_dir, rids) = {
            let inner = self.inner.read();
            if inner.amask.cnt() == inner.amask.size() {
                return Ok(inner.n_rows);
            }
            (
                inner.amask.clone(),
                inner.columns.clone(),
                inner.active_dir.clone(),
                inner.backup_dir.clone(),
                inner.rids.clone(),
            )
        };
        let n_live = amask.cnt();
        log::info!(
            "partition {} purging {} of {} rows",
            self.to_name(),
            amask.size() - n_live,
            amask.size()
        );

        let mut buf = vec![];
        let dest = backup_dir.clone().unwrap_or_else(|| active_dir.clone());
        if backup_dir.is_some() {
            self.fileman.flush_dir(&dest);
        }

        for col in columns.iter() {
            let n = col.save_selected(&amask, &active_dir, &dest, &mut buf)?;
            if n != n_live {
                err_at!(Fatal, msg: "column {} saved {}/{} rows", col.to_name(), n, n_live)?
            }
        }
        if let Some(rids) = &rids {
            let kept: Vec<crate::Rid> = amask
                .iter()
                .filter_map(|i| rids.as_rids().get(i).copied())
                .collect();
            RidSet::from(kept).write_file(&util::file_path(&dest, RIDS_FILE))?;
        }
        fs::remove_file(util::file_path(&dest, MASK_FILE)).ok();

        {
            let mut inner = self.inner.write();
            for col in inner.columns.iter_mut() {
                col.unload_index();
            }
            self.fileman.flush_dir(&inner.active_dir);
            let md = MetaData {
                n_rows: n_live,
                ..inner.to_metadata()
            };
            md.write(&dest)?;

            if inner.backup_dir.is_some() {
                fs::remove_file(util::file_path(&inner.active_dir, MASK_FILE)).ok();
                let backup = inner.backup_dir.take().unwrap();
                let active = std::mem::replace(&mut inner.active_dir, backup);
                inner.backup_dir = Some(active);
            }
            inner.reload()?;
        }

        if backup_dir.is_some() {
            append::make_backup_copy(self)?;
        }
        Ok(n_live)
    }

    // ---- column addition

    /// Add a column computed from an arithmetic expression over the
    /// existing columns. The expression is evaluated in f64 and cast
    /// to `ctype`, rows with any NULL input receive the type's NULL
    /// sentinel. Return the number of rows written.
    pub fn add_column(&self, term: &MathTerm, name: &str, ctype: ColumnType) -> Result<usize> {
        use crate::column::Values;

        if self.is_read_only() {
            err_at!(StateFail, msg: "partition {} is read-only", self.to_name())?
        }
        if self.to_column(name).is_some() {
            err_at!(InvalidInput, msg: "column {} already exists", name)?
        }
        let _guard = self.lock_writers();

        let mask = eval::term_mask(self, term)?;
        let vals = eval::calculate(self, term, &mask)?;

        let (active_dir, n_rows) = {
            let inner = self.inner.read();
            (inner.active_dir.clone(), inner.n_rows)
        };
        if vals.len() != n_rows {
            err_at!(Fatal, msg: "calculated {}/{} rows", vals.len(), n_rows)?
        }

        let mut col = Column::new(name, ctype);
        col.set_description(&format!("Select {} From {}", term, self.to_name()));
        let values = Values::cast_from(&vals, &mask, ctype)?;
        values.write_file(&col.data_file(&active_dir))?;
        col.write_null_mask(&active_dir, &mask)?;
        if let Some((lo, hi)) = values.filter(&mask).min_max() {
            col.set_bounds(lo, hi);
        }

        let mut inner = self.inner.write();
        inner.columns.push(col);
        inner.to_metadata().write(&active_dir)?;
        log::info!(
            "partition {} added column {} over {} rows",
            inner.name,
            name,
            n_rows
        );
        Ok(n_rows)
    }
}

impl Schema for Partition {
    fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.inner.read().column(name).map(|col| col.to_type())
    }

    fn column_bounds(&self, name: &str) -> Option<(f64, f64)> {
        let (mut col, dir) = {
            let inner = self.inner.read();
            (inner.column(name)?.clone(), inner.active_dir.clone())
        };
        match col.to_bounds() {
            Some(bounds) => Some(bounds),
            None => {
                col.compute_min_max(&dir).ok()?;
                col.to_bounds()
            }
        }
    }

    fn column_names(&self) -> Vec<String> {
        self.inner
            .read()
            .columns
            .iter()
            .map(|col| col.to_name())
            .collect()
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
