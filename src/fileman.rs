//! Module `fileman` implement the shared file manager.
//!
//! [FileMgr] hands out read-only byte views over data files and caches
//! them, so that concurrent readers of the same column data share one
//! in-memory copy. Writers flush affected files/directories before
//! mutating them on disk. A view that is still referenced refuses to
//! flush, the entry is retained until its last reader drops.

use lazy_static::lazy_static;

use std::{
    collections::HashMap,
    ffi, fmt, path, result,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{err_at, util, util::Spinlock, Error, Result};

lazy_static! {
    static ref ENV_LOCK: Mutex<()> = Mutex::new(());
}

/// Serialize mutations of process-wide state, logging setup, global
/// parameters, file-manager accounting resets.
pub fn env_lock() -> MutexGuard<'static, ()> {
    match ENV_LOCK.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// FileMgr type, a cloneable handle over the shared file cache.
#[derive(Clone)]
pub struct FileMgr {
    inner: Arc<Spinlock<Inner>>,
}

#[derive(Default)]
struct Inner {
    files: HashMap<ffi::OsString, Arc<Vec<u8>>>,
    pages_recorded: u64,
}

impl Default for FileMgr {
    fn default() -> FileMgr {
        FileMgr::new()
    }
}

impl fmt::Display for FileMgr {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        let inner = self.inner.read();
        write!(f, "filemgr<{}>", inner.files.len())
    }
}

impl FileMgr {
    pub fn new() -> FileMgr {
        FileMgr {
            inner: Arc::new(Spinlock::new(Inner::default())),
        }
    }

    /// Return a shared read-only view over the file at `loc`, reading
    /// and caching it on first access.
    pub fn get_file(&self, loc: &ffi::OsStr) -> Result<Arc<Vec<u8>>> {
        use std::io::Read;

        if let Some(data) = self.inner.read().files.get(loc) {
            return Ok(Arc::clone(data));
        }

        let mut fd = util::open_file_r(loc)?;
        let mut buf = vec![];
        err_at!(IOError, fd.read_to_end(&mut buf))?;

        let data = Arc::new(buf);
        let mut inner = self.inner.write();
        inner.files.insert(loc.to_os_string(), Arc::clone(&data));
        Ok(data)
    }

    /// Drop the cached view for `loc`. A view still referenced by a
    /// reader is retained, the call reports whether the entry is gone.
    pub fn flush_file(&self, loc: &ffi::OsStr) -> bool {
        let mut inner = self.inner.write();
        match inner.files.get(loc) {
            Some(data) if Arc::strong_count(data) > 1 => {
                log::warn!("filemgr refusing to flush referenced file {:?}", loc);
                false
            }
            Some(_) => {
                inner.files.remove(loc);
                true
            }
            None => true,
        }
    }

    /// Drop every cached view under directory `dir`, subject to the
    /// same referenced-entry rule as [FileMgr::flush_file].
    pub fn flush_dir(&self, dir: &ffi::OsStr) {
        let locs: Vec<ffi::OsString> = {
            let inner = self.inner.read();
            inner
                .files
                .keys()
                .filter(|loc| path::Path::new(loc).starts_with(dir))
                .cloned()
                .collect()
        };
        for loc in locs.iter() {
            self.flush_file(loc);
        }
    }

    /// Drop every unreferenced cached view.
    pub fn clear(&self) {
        let _guard = env_lock();
        let locs: Vec<ffi::OsString> = {
            let inner = self.inner.read();
            inner.files.keys().cloned().collect()
        };
        for loc in locs.iter() {
            self.flush_file(loc);
        }
    }

    /// Available memory, in bytes, for admission decisions.
    pub fn bytes_free(&self) -> u64 {
        match sys_info::mem_info() {
            Ok(m) => m.avail.saturating_mul(1024),
            Err(_) => 0,
        }
    }

    /// Account a page range touched by a reader.
    pub fn record_pages(&self, start: u64, end: u64) {
        let mut inner = self.inner.write();
        inner.pages_recorded += end.saturating_sub(start);
    }

    pub fn to_pages_recorded(&self) -> u64 {
        self.inner.read().pages_recorded
    }

    /// Number of cached views.
    pub fn len(&self) -> usize {
        self.inner.read().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "fileman_test.rs"]
mod fileman_test;
