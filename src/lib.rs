//! Package implement a column-oriented analytical store built around
//! compressed bitmap row masks.
//!
//! Data is organised into [Partition] values, each a horizontally
//! independent table fragment backed by one or two on-disk directories.
//! Every attribute of a partition is a [Column] persisted as a raw
//! little-endian data file along with side files, start-position file
//! for variable length data, null-mask bitmap, dictionary for category
//! columns.
//!
//! Queries arrive as SELECT/FROM/WHERE strings, are parsed into a
//! [QExpr] tree, algebraically simplified, verified against a
//! partition's schema and evaluated into a [BitVector] of matching
//! row-ids. Appends follow a two-directory protocol, new rows land in
//! the backup directory, directories swap roles and a subsequent
//! commit brings both directories back in sync, rollback from the
//! transition state restores the pre-append image.
//!
//! **Inventory of sub-systems**
//!
//! * [qexpr], query expression tree and its rewrite rules.
//! * [query], clause parsers producing the expression tree along with
//!   projection/aggregation plan.
//! * [column], typed column storage with text/category/blob
//!   specialization.
//! * [part], partition life-cycle, append/commit/rollback, physical
//!   reorder and the active-row mask.
//! * Support types, [BitVector], [Dictionary], [RidSet], [FileMgr].

use std::{error, fmt, result};

/// Type alias for Result returns from functions defined in this package.
pub type Result<T> = result::Result<T, Error>;

/// Error variants that are returned by this package's API.
///
/// Each variant carries a prefix, typically identifying the error
/// location, and a message.
#[derive(Clone)]
pub enum Error {
    Fatal(String, String),
    FailConvert(String, String),
    FailCbor(String, String),
    IOError(String, String),
    IPCFail(String, String),
    ThreadFail(String, String),
    InvalidFile(String, String),
    InvalidInput(String, String),
    InvalidFormat(String, String),
    ParseFail(String, String),
    NameFail(String, String),
    TypeFail(String, String),
    StateFail(String, String),
    IndexFail(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            Fatal(p, msg) => write!(f, "{} Fatal: {}", p, msg),
            FailConvert(p, msg) => write!(f, "{} FailConvert: {}", p, msg),
            FailCbor(p, msg) => write!(f, "{} FailCbor: {}", p, msg),
            IOError(p, msg) => write!(f, "{} IOError: {}", p, msg),
            IPCFail(p, msg) => write!(f, "{} IPCFail: {}", p, msg),
            ThreadFail(p, msg) => write!(f, "{} ThreadFail: {}", p, msg),
            InvalidFile(p, msg) => write!(f, "{} InvalidFile: {}", p, msg),
            InvalidInput(p, msg) => write!(f, "{} InvalidInput: {}", p, msg),
            InvalidFormat(p, msg) => write!(f, "{} InvalidFormat: {}", p, msg),
            ParseFail(p, msg) => write!(f, "{} ParseFail: {}", p, msg),
            NameFail(p, msg) => write!(f, "{} NameFail: {}", p, msg),
            TypeFail(p, msg) => write!(f, "{} TypeFail: {}", p, msg),
            StateFail(p, msg) => write!(f, "{} StateFail: {}", p, msg),
            IndexFail(p, msg) => write!(f, "{} IndexFail: {}", p, msg),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

impl error::Error for Error {}

/// Macro to capture the error location while creating [Error] values.
///
/// Invoked as `err_at!(Variant, msg: "...", ..)` to create an error
/// from scratch, `err_at!(Variant, expr)` to annotate the Err variant
/// of `expr`, or `err_at!(Variant, expr, "...", ..)` to annotate with
/// an additional message.
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err(Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err(Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err(Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

#[macro_use]
pub mod util;

pub mod bitvec;
pub mod column;
pub mod dict;
pub mod fileman;
pub mod index;
pub mod part;
pub mod qexpr;
pub mod query;
pub mod rids;

pub use crate::bitvec::BitVector;
pub use crate::column::{Column, ColumnType};
pub use crate::dict::Dictionary;
pub use crate::fileman::FileMgr;
pub use crate::index::BitmapIndex;
pub use crate::part::{Config, Partition, TableState};
pub use crate::qexpr::QExpr;
pub use crate::query::{FromClause, SelectClause, WhereClause};
pub use crate::rids::{Rid, RidSet};
