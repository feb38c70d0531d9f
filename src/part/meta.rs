//! Module `meta` implement reading and writing the `-part.txt`
//! metadata file.
//!
//! The format is plain ASCII, `key = value` lines at partition scope
//! with one `Begin Column .. End Column` stanza per column. Keys
//! recognized at partition scope, `name`, `description`,
//! `number_of_rows`, `index`, `columns`, `timestamp`, `metatags`.

use std::{ffi, io::Read};

use crate::{column::ColumnType, err_at, util, Column, Error, Result};

pub const META_FILE: &str = "-part.txt";
pub const MASK_FILE: &str = "-part.msk";
pub const RIDS_FILE: &str = "-rids";

/// Parsed content of a `-part.txt` file.
#[derive(Clone, Debug, Default)]
pub struct MetaData {
    pub name: String,
    pub description: String,
    pub n_rows: usize,
    pub index: Option<String>,
    pub metatags: Option<String>,
    pub timestamp: i64,
    pub columns: Vec<Column>,
}

impl MetaData {
    /// Read `dir/-part.txt`. Return None when the file is absent.
    pub fn read(dir: &ffi::OsStr) -> Result<Option<MetaData>> {
        let loc = util::file_path(dir, META_FILE);
        let text = match util::open_file_r(&loc) {
            Ok(mut fd) => {
                let mut buf = vec![];
                err_at!(IOError, fd.read_to_end(&mut buf))?;
                err_at!(FailConvert, String::from_utf8(buf), "{:?}", loc)?
            }
            Err(_) => return Ok(None),
        };

        let mut md = MetaData::default();
        let mut n_columns: Option<usize> = None;
        let mut lines = text.lines();
        while let Some(line) = lines.next() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.eq_ignore_ascii_case("Begin Column") {
                md.columns.push(read_column(&mut lines, &loc)?);
                continue;
            }
            let (key, value) = match split_kv(line) {
                Some(kv) => kv,
                None => err_at!(InvalidFormat, msg: "bad line {:?} in {:?}", line, loc)?,
            };
            match key.to_lowercase().as_str() {
                "name" => md.name = value.to_string(),
                "description" => md.description = value.to_string(),
                "number_of_rows" => {
                    md.n_rows = err_at!(FailConvert, value.parse::<usize>())?
                }
                "columns" => {
                    n_columns = Some(err_at!(FailConvert, value.parse::<usize>())?)
                }
                "timestamp" => md.timestamp = err_at!(FailConvert, value.parse::<i64>())?,
                "index" => md.index = Some(value.to_string()),
                "metatags" => md.metatags = Some(value.to_string()),
                key => log::warn!("unknown key {:?} in {:?}", key, loc),
            }
        }

        if let Some(n) = n_columns {
            if n != md.columns.len() {
                log::warn!(
                    "{:?} declares {} columns, found {}",
                    loc,
                    n,
                    md.columns.len()
                );
            }
        }
        Ok(Some(md))
    }

    /// Write `dir/-part.txt`, replacing any existing file.
    pub fn write(&self, dir: &ffi::OsStr) -> Result<()> {
        let mut out = String::new();
        out.push_str(&format!("name = {}\n", self.name));
        if !self.description.is_empty() {
            out.push_str(&format!("description = {}\n", self.description));
        }
        out.push_str(&format!("number_of_rows = {}\n", self.n_rows));
        out.push_str(&format!("columns = {}\n", self.columns.len()));
        out.push_str(&format!("timestamp = {}\n", chrono::Utc::now().timestamp()));
        if let Some(index) = &self.index {
            out.push_str(&format!("index = {}\n", index));
        }
        if let Some(metatags) = &self.metatags {
            out.push_str(&format!("metatags = {}\n", metatags));
        }
        for col in self.columns.iter() {
            col.write_meta(&mut out);
        }

        let loc = util::file_path(dir, META_FILE);
        let mut fd = util::create_file_a(&loc)?;
        util::sync_write(&mut fd, out.as_bytes())?;
        Ok(())
    }
}

fn split_kv(line: &str) -> Option<(&str, &str)> {
    let mut parts = line.splitn(2, '=');
    let key = parts.next()?.trim();
    let value = parts.next()?.trim();
    Some((key, value))
}

fn read_column<'a, I>(lines: &mut I, loc: &ffi::OsStr) -> Result<Column>
where
    I: Iterator<Item = &'a str>,
{
    let mut name: Option<String> = None;
    let mut ctype: Option<ColumnType> = None;
    let mut description: Option<String> = None;
    let mut lower: Option<f64> = None;
    let mut upper: Option<f64> = None;
    let mut index: Option<String> = None;
    let mut sorted = false;

    for line in lines {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.eq_ignore_ascii_case("End Column") {
            let name = match name {
                Some(name) => name,
                None => err_at!(InvalidFormat, msg: "column without name in {:?}", loc)?,
            };
            let ctype = match ctype {
                Some(ctype) => ctype,
                None => err_at!(InvalidFormat, msg: "column {} without type", name)?,
            };
            let mut col = Column::new(&name, ctype);
            if let Some(description) = description {
                col.set_description(&description);
            }
            if let (Some(lo), Some(hi)) = (lower, upper) {
                col.set_bounds(lo, hi);
            }
            if let Some(index) = index {
                col.set_index_spec(&index);
            }
            col.set_sorted(sorted);
            return Ok(col);
        }
        let (key, value) = match split_kv(line) {
            Some(kv) => kv,
            None => err_at!(InvalidFormat, msg: "bad line {:?} in {:?}", line, loc)?,
        };
        match key.to_lowercase().as_str() {
            "name" => name = Some(value.to_string()),
            "description" => description = Some(value.to_string()),
            "data_type" => ctype = Some(ColumnType::from_name(value)?),
            "minimum" => lower = Some(err_at!(FailConvert, value.parse::<f64>())?),
            "maximum" => upper = Some(err_at!(FailConvert, value.parse::<f64>())?),
            "index" => index = Some(value.to_string()),
            "sorted" => sorted = value.eq_ignore_ascii_case("true"),
            key => log::warn!("unknown column key {:?} in {:?}", key, loc),
        }
    }
    err_at!(InvalidFormat, msg: "missing End Column in {:?}", loc)
}

#[cfg(test)]
#[path = "meta_test.rs"]
mod meta_test;
