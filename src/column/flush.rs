//! Module `flush` implement the background writer used when column
//! data files are rewritten in bulk.

use fs2::FileExt;

use std::{convert::TryFrom, ffi, fs, mem};

use crate::{err_at, util, write_file, Error, Result};

/// Flusher type, a gen-server thread that appends byte batches to one
/// data file and syncs it on close.
pub enum Flusher {
    File {
        loc: ffi::OsString,
        fpos: u64,
        th: Option<util::Thread<Vec<u8>, u64, Result<u64>>>,
        tx: Option<util::thread::Tx<Vec<u8>, u64>>,
    },
    None,
}

impl Drop for Flusher {
    fn drop(&mut self) {
        match self {
            Flusher::None => (),
            Flusher::File { tx, .. } => mem::drop(tx.take()),
        }
    }
}

// Channel buffer for the flusher thread.
const SYNC_BUFFER: usize = 1024;

impl Flusher {
    /// Create a flusher over `loc`. `create` truncates any existing
    /// file, otherwise batches append at the current end.
    pub fn new(loc: &ffi::OsStr, create: bool) -> Result<Flusher> {
        let (fd, fpos) = if create {
            (util::create_file_a(loc)?, 0)
        } else {
            let fpos = err_at!(IOError, fs::metadata(loc))?.len();
            (util::open_file_a(loc)?, fpos)
        };

        let ffpp = loc.to_os_string();
        let (th, tx) = {
            let th = util::Thread::new_sync(
                "flusher",
                SYNC_BUFFER,
                move |rx: util::thread::Rx<Vec<u8>, u64>| {
                    move || thread_flush(ffpp, fd, rx, fpos)
                },
            );
            let tx = th.to_tx();
            (th, tx)
        };

        let val = Flusher::File {
            loc: loc.to_os_string(),
            fpos,
            th: Some(th),
            tx: Some(tx),
        };

        Ok(val)
    }

    pub fn empty() -> Flusher {
        Flusher::None
    }

    pub fn to_location(&self) -> Option<ffi::OsString> {
        match self {
            Flusher::File { loc, .. } => Some(loc.clone()),
            Flusher::None => None,
        }
    }

    /// Latest file position.
    pub fn to_fpos(&self) -> Option<u64> {
        match self {
            Flusher::File { fpos, .. } => Some(*fpos),
            Flusher::None => None,
        }
    }

    /// Queue a batch of bytes for writing.
    pub fn flush(&mut self, data: Vec<u8>) -> Result<()> {
        match self {
            Flusher::File { fpos, tx, .. } => {
                *fpos = tx.as_ref().unwrap().request(data)?
            }
            Flusher::None => (),
        };
        Ok(())
    }

    /// Close this flusher and its thread, after syncing data to disk.
    pub fn close(&mut self) -> Result<u64> {
        match self {
            Flusher::File { tx, th, .. } => {
                mem::drop(tx.take());
                th.take().unwrap().join()?
            }
            Flusher::None => Ok(0),
        }
    }
}

fn thread_flush(
    loc: ffi::OsString,
    mut fd: fs::File,
    rx: util::thread::Rx<Vec<u8>, u64>,
    mut fpos: u64,
) -> Result<u64> {
    err_at!(IOError, fd.lock_shared(), "fail read lock for {:?}", loc)?;

    for (data, res_tx) in rx {
        write_file!(fd, &data, &loc, "flushing column data")?;

        fpos += u64::try_from(data.len()).unwrap();
        if let Some(tx) = res_tx {
            tx.send(fpos).ok();
        }
    }

    err_at!(IOError, fd.sync_all(), "fail sync_all {:?}", loc)?;
    err_at!(IOError, fd.unlock(), "fail read unlock {:?}", loc)?;

    Ok(fpos)
}

#[cfg(test)]
#[path = "flush_test.rs"]
mod flush_test;
