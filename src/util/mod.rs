//! Module implement common utility functions and types.

use cbordata::{Cbor, FromCbor, IntoCbor};
use serde::de::DeserializeOwned;

use std::{convert::TryFrom, ffi, fs, io::Read, path};

use crate::{err_at, Error, Result};

pub mod hash;
pub mod spinlock;
pub mod thread;

pub use hash::CityHasher;
pub use spinlock::Spinlock;
pub use thread::Thread;

#[macro_export]
macro_rules! read_file {
    ($fd:expr, $seek:expr, $n:expr, $msg:expr) => {{
        use std::convert::TryFrom;

        match $fd.seek($seek) {
            Ok(_) => {
                let mut buf = vec![0; usize::try_from($n).unwrap()];
                match $fd.read(&mut buf) {
                    Ok(n) if buf.len() == n => Ok(buf),
                    Ok(n) => {
                        let m = buf.len();
                        err_at!(Fatal, msg: concat!($msg, " {}/{} at {:?}"), m, n, $seek)
                    }
                    Err(err) => err_at!(IOError, Err(err)),
                }
            }
            Err(err) => err_at!(IOError, Err(err)),
        }
    }};
}

#[macro_export]
macro_rules! write_file {
    ($fd:expr, $buffer:expr, $file:expr, $msg:expr) => {{
        use std::io::Write;

        match err_at!(IOError, $fd.write($buffer))? {
            n if $buffer.len() == n => Ok(n),
            n => err_at!(
                Fatal, msg: "partial-wr {}, {:?}, {}/{}", $msg, $file, $buffer.len(), n
            ),
        }
    }};
}

/// Helper function to serialize value `T` implementing IntoCbor, into
/// byte-string.
pub fn into_cbor_bytes<T>(val: T) -> Result<Vec<u8>>
where
    T: IntoCbor,
{
    let mut data: Vec<u8> = vec![];
    let n = err_at!(
        FailCbor,
        err_at!(FailCbor, val.into_cbor())?.encode(&mut data)
    )?;
    if n != data.len() {
        err_at!(Fatal, msg: "cbor encoding len mistmatch {} {}", n, data.len())
    } else {
        Ok(data)
    }
}

/// Helper function to deserialize value `T` implementing FromCbor,
/// from byte-string. Return `(value, bytes-consumed)`.
pub fn from_cbor_bytes<T>(mut data: &[u8]) -> Result<(T, usize)>
where
    T: FromCbor,
{
    let (val, n) = err_at!(FailCbor, Cbor::decode(&mut data))?;
    Ok((err_at!(FailCbor, T::from_cbor(val))?, n))
}

/// Create a file in append mode for writing, remove the file if it
/// already exists.
pub fn create_file_a(file: &ffi::OsStr) -> Result<fs::File> {
    let os_file = {
        let os_file = path::Path::new(file);
        fs::remove_file(os_file).ok(); // NOTE: ignore remove errors.
        os_file
    };

    {
        let parent = match os_file.parent() {
            Some(parent) => Ok(parent),
            None => err_at!(InvalidFile, msg: "{:?}", file),
        }?;
        err_at!(IOError, fs::create_dir_all(parent))?;
    };

    let mut opts = fs::OpenOptions::new();
    Ok(err_at!(
        IOError,
        opts.append(true).create_new(true).open(os_file)
    )?)
}

/// Open an existing file in append mode for writing.
pub fn open_file_a(file: &ffi::OsStr) -> Result<fs::File> {
    let os_file = path::Path::new(file);
    let mut opts = fs::OpenOptions::new();
    Ok(err_at!(IOError, opts.append(true).create(true).open(os_file))?)
}

/// Open file for reading.
pub fn open_file_r(file: &ffi::OsStr) -> Result<fs::File> {
    let os_file = path::Path::new(file);
    Ok(err_at!(
        IOError,
        fs::OpenOptions::new().read(true).open(os_file)
    )?)
}

/// Open file for reading and writing in place.
pub fn open_file_rw(file: &ffi::OsStr) -> Result<fs::File> {
    let os_file = path::Path::new(file);
    Ok(err_at!(
        IOError,
        fs::OpenOptions::new().read(true).write(true).open(os_file)
    )?)
}

pub fn sync_write(file: &mut fs::File, data: &[u8]) -> Result<usize> {
    use std::io::Write;

    let n = err_at!(IOError, file.write(data))?;
    if n != data.len() {
        err_at!(IOError, msg: "partial write to file {} {}", n, data.len())?
    }
    err_at!(IOError, file.sync_all())?;
    Ok(n)
}

/// Return the size of file in bytes, ZERO if file is missing.
pub fn file_size(file: &ffi::OsStr) -> Result<u64> {
    match fs::metadata(file) {
        Ok(m) => Ok(m.len()),
        Err(_) => Ok(0),
    }
}

/// Join `dir` and `file` into a single location.
pub fn file_path(dir: &ffi::OsStr, file: &str) -> ffi::OsString {
    let loc: path::PathBuf = [dir, ffi::OsStr::new(file)].iter().collect();
    loc.into_os_string()
}

/// Copy every regular file under `src` into `dst`, creating `dst` if
/// required. Sub-directories are skipped. Return the number of files
/// copied.
pub fn copy_dir(src: &ffi::OsStr, dst: &ffi::OsStr) -> Result<usize> {
    err_at!(IOError, fs::create_dir_all(dst))?;

    let mut count = 0;
    let entries = err_at!(IOError, fs::read_dir(src), "read_dir({:?})", src)?;
    for entry in entries {
        let entry = err_at!(IOError, entry)?;
        if err_at!(IOError, entry.file_type())?.is_file() {
            let from = entry.path();
            let to: path::PathBuf = [dst, entry.file_name().as_os_str()].iter().collect();
            err_at!(IOError, fs::copy(&from, &to), "copy {:?} {:?}", from, to)?;
            count += 1;
        }
    }
    Ok(count)
}

/// Remove every regular file under `dir`, leave the directory itself
/// in place.
pub fn clean_dir(dir: &ffi::OsStr) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };
    for entry in entries {
        let entry = err_at!(IOError, entry)?;
        if err_at!(IOError, entry.file_type())?.is_file() {
            err_at!(IOError, fs::remove_file(entry.path()))?;
        }
    }
    Ok(())
}

/// Compare the regular files under directories `a` and `b`, byte for
/// byte. File names listed in `ignore` are exempt from the content
/// comparison but must exist on both sides. Return true when the two
/// directories hold the same set of files with identical contents.
pub fn dirs_identical(a: &ffi::OsStr, b: &ffi::OsStr, ignore: &[&str]) -> Result<bool> {
    let list = |dir: &ffi::OsStr| -> Result<Vec<String>> {
        let mut files = vec![];
        let entries = err_at!(IOError, fs::read_dir(dir), "read_dir({:?})", dir)?;
        for entry in entries {
            let entry = err_at!(IOError, entry)?;
            if err_at!(IOError, entry.file_type())?.is_file() {
                match entry.file_name().to_str() {
                    Some(name) => files.push(name.to_string()),
                    None => err_at!(InvalidFile, msg: "{:?}", entry.file_name())?,
                }
            }
        }
        files.sort();
        Ok(files)
    };

    let (files_a, files_b) = (list(a)?, list(b)?);
    if files_a != files_b {
        return Ok(false);
    }

    for name in files_a.iter() {
        if ignore.contains(&name.as_str()) {
            continue;
        }
        let fa = file_path(a, name);
        let fb = file_path(b, name);
        if file_size(&fa)? != file_size(&fb)? {
            return Ok(false);
        }
        let mut da = vec![];
        let mut db = vec![];
        err_at!(IOError, open_file_r(&fa)?.read_to_end(&mut da))?;
        err_at!(IOError, open_file_r(&fb)?.read_to_end(&mut db))?;
        if da != db {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Load toml file and parse it into type `T`.
pub fn load_toml<P, T>(loc: P) -> Result<T>
where
    P: AsRef<path::Path>,
    T: DeserializeOwned,
{
    use std::str::from_utf8;

    let ploc: &path::Path = loc.as_ref();
    let data = err_at!(IOError, fs::read(ploc))?;
    let s = err_at!(FailConvert, from_utf8(&data), "not utf8 for {:?}", ploc)?;
    err_at!(FailConvert, toml::from_str(s), "file:{:?}", ploc)
}

/// Convert u64 to usize, failing with FailConvert on narrow targets.
pub fn to_usize(n: u64) -> Result<usize> {
    err_at!(FailConvert, usize::try_from(n))
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
