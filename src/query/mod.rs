//! Module `query` implement the clause parsers and their products.
//!
//! Three little grammars cover the supported SELECT, FROM and WHERE
//! clauses. Each parses independently into [SelectClause],
//! [FromClause] and [WhereClause]. The WHERE product owns a [QExpr]
//! tree; verification resolves every referenced name against a data
//! partition's schema, substituting select-clause aliases where
//! column names do not match.

use std::{collections::HashMap, fmt, result};

use crate::{
    err_at,
    qexpr::{CompRange, MathTerm, QExpr},
    Error, Result,
};

pub mod lex;
mod parse;
mod verify;

pub use verify::{amplify, verify};

/// Schema view consulted while verifying clauses against a partition.
pub trait Schema {
    /// Logical type of the named column, None when the column does
    /// not exist. Lookup is case-insensitive.
    fn column_type(&self, name: &str) -> Option<crate::column::ColumnType>;

    /// Actual `(min, max)` bounds of the named column.
    fn column_bounds(&self, name: &str) -> Option<(f64, f64)>;

    /// Every column name, used for any-match-any prefix expansion.
    fn column_names(&self) -> Vec<String>;
}

/// Aggregation functions usable in a select term.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregator {
    Nil,
    Avg,
    Cnt,
    Max,
    Min,
    Sum,
    Distinct,
    VarPop,
    VarSamp,
    StdPop,
    StdSamp,
    Median,
}

impl Aggregator {
    pub fn from_name(name: &str) -> Option<Aggregator> {
        let agg = match name.to_uppercase().as_str() {
            "AVG" => Aggregator::Avg,
            "COUNT" | "CNT" => Aggregator::Cnt,
            "MAX" => Aggregator::Max,
            "MIN" => Aggregator::Min,
            "SUM" => Aggregator::Sum,
            "DISTINCT" | "COUNTDISTINCT" => Aggregator::Distinct,
            "VARPOP" | "VARP" => Aggregator::VarPop,
            "VARSAMP" | "VARIANCE" | "VAR" => Aggregator::VarSamp,
            "STDPOP" | "STDEVP" => Aggregator::StdPop,
            "STDSAMP" | "STDDEV" | "STDEV" => Aggregator::StdSamp,
            "MEDIAN" => Aggregator::Median,
            _ => return None,
        };
        Some(agg)
    }

    pub fn to_name(&self) -> &'static str {
        match self {
            Aggregator::Nil => "",
            Aggregator::Avg => "AVG",
            Aggregator::Cnt => "COUNT",
            Aggregator::Max => "MAX",
            Aggregator::Min => "MIN",
            Aggregator::Sum => "SUM",
            Aggregator::Distinct => "COUNTDISTINCT",
            Aggregator::VarPop => "VARPOP",
            Aggregator::VarSamp => "VARSAMP",
            Aggregator::StdPop => "STDPOP",
            Aggregator::StdSamp => "STDSAMP",
            Aggregator::Median => "MEDIAN",
        }
    }
}

/// One term of a select clause.
#[derive(Clone, Debug)]
pub struct SelectTerm {
    pub agg: Aggregator,
    pub term: MathTerm,
    pub alias: Option<String>,
}

/// SelectClause type, an ordered list of aggregated arithmetic terms.
#[derive(Clone, Debug, Default)]
pub struct SelectClause {
    clause: String,
    terms: Vec<SelectTerm>,
    names: Vec<String>,
    // alias, lower-cased, to term offset
    alias: HashMap<String, usize>,
}

impl fmt::Display for SelectClause {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        for (i, st) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match st.agg {
                Aggregator::Nil => write!(f, "{}", st.term)?,
                agg => write!(f, "{}({})", agg.to_name(), st.term)?,
            }
            if let Some(alias) = &st.alias {
                write!(f, " AS {}", alias)?;
            }
        }
        Ok(())
    }
}

impl SelectClause {
    /// Parse a select clause, e.g. `"temperature, avg(vx*vx) as ke"`.
    pub fn parse(clause: &str) -> Result<SelectClause> {
        let mut val = parse::parse_select(clause)?;
        val.clause = clause.to_string();
        let terms = std::mem::take(&mut val.terms);
        val.terms = terms
            .into_iter()
            .map(|mut st| {
                st.term = st.term.reduce();
                st
            })
            .collect();
        val.fill_names();
        Ok(val)
    }

    pub(crate) fn from_terms(terms: Vec<SelectTerm>) -> SelectClause {
        let mut val = SelectClause {
            clause: String::default(),
            terms,
            names: vec![],
            alias: HashMap::new(),
        };
        for (i, st) in val.terms.iter().enumerate() {
            if let Some(alias) = &st.alias {
                val.alias.insert(alias.to_lowercase(), i);
            }
        }
        val
    }

    pub fn as_str(&self) -> &str {
        &self.clause
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn as_terms(&self) -> &[SelectTerm] {
        &self.terms
    }

    /// Fetch the ith term, None when out of bounds.
    pub fn term(&self, i: usize) -> Option<&SelectTerm> {
        self.terms.get(i)
    }

    /// Number of terms without an aggregation function.
    pub fn n_plain(&self) -> usize {
        self.terms
            .iter()
            .filter(|st| st.agg == Aggregator::Nil)
            .count()
    }

    /// Offset of the term carrying `key` as its alias or canonical
    /// name. Case-insensitive.
    pub fn find(&self, key: &str) -> Option<usize> {
        match self.alias.get(&key.to_lowercase()) {
            Some(i) => Some(*i),
            None => self
                .names
                .iter()
                .position(|name| name.eq_ignore_ascii_case(key)),
        }
    }

    /// Canonical name of the ith term, either its alias or a name
    /// derived from the aggregator and the printed expression.
    pub fn to_name(&self, i: usize) -> Option<&str> {
        self.names.get(i).map(|s| s.as_str())
    }

    // derive a canonical name for every term without an alias
    fn fill_names(&mut self) {
        self.names = self
            .terms
            .iter()
            .map(|st| match (&st.alias, st.agg) {
                (Some(alias), _) => alias.clone(),
                (None, Aggregator::Nil) => st.term.to_string(),
                (None, agg) => format!("{}({})", agg.to_name(), st.term),
            })
            .collect();
        self.alias = HashMap::new();
        for (i, st) in self.terms.iter().enumerate() {
            if let Some(alias) = &st.alias {
                self.alias.insert(alias.to_lowercase(), i);
            }
        }
    }
}

/// FromClause type, ordered table names with optional aliases and an
/// optional join condition.
#[derive(Clone, Debug, Default)]
pub struct FromClause {
    clause: String,
    names: Vec<String>,
    aliases: Vec<Option<String>>,
    jcond: Option<CompRange>,
}

impl fmt::Display for FromClause {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        for (i, name) in self.names.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", name)?;
            if let Some(alias) = &self.aliases[i] {
                write!(f, " AS {}", alias)?;
            }
        }
        Ok(())
    }
}

impl FromClause {
    /// Parse a from clause, e.g. `"t1 JOIN t2 USING(k)"`.
    pub fn parse(clause: &str) -> Result<FromClause> {
        let mut val = parse::parse_from(clause)?;
        val.clause = clause.to_string();
        if val.jcond.is_some() && val.names.len() > 2 {
            err_at!(ParseFail, msg: "join condition with {} tables", val.names.len())?
        }
        Ok(val)
    }

    pub(crate) fn new(
        names: Vec<String>,
        aliases: Vec<Option<String>>,
        jcond: Option<CompRange>,
    ) -> FromClause {
        FromClause {
            clause: String::default(),
            names,
            aliases,
            jcond,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.clause
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn as_names(&self) -> &[String] {
        &self.names
    }

    /// Resolve `key`, a table name or alias, to the table name.
    /// Case-insensitive.
    pub fn to_table(&self, key: &str) -> Option<&str> {
        for (i, name) in self.names.iter().enumerate() {
            if name.eq_ignore_ascii_case(key) {
                return Some(name);
            }
            if let Some(alias) = &self.aliases[i] {
                if alias.eq_ignore_ascii_case(key) {
                    return Some(name);
                }
            }
        }
        None
    }

    pub fn as_join_condition(&self) -> Option<&CompRange> {
        self.jcond.as_ref()
    }
}

/// WhereClause type, owns the expression tree along with the original
/// string.
#[derive(Clone, Debug)]
pub struct WhereClause {
    clause: String,
    expr: QExpr,
}

impl fmt::Display for WhereClause {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self.expr)
    }
}

impl WhereClause {
    /// Parse a where clause, e.g. `"a < 5 and b in (1, 3)"`. The tree
    /// is simplified before being returned.
    pub fn parse(clause: &str) -> Result<WhereClause> {
        let mut expr = parse::parse_where(clause)?;
        expr.simplify();
        Ok(WhereClause {
            clause: clause.to_string(),
            expr,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.clause
    }

    pub fn as_expr(&self) -> &QExpr {
        &self.expr
    }

    pub fn as_mut_expr(&mut self) -> &mut QExpr {
        &mut self.expr
    }

    pub fn into_expr(self) -> QExpr {
        self.expr
    }

    /// Resolve every column reference against `schema`, rewriting
    /// alias references through `sel`. Return the number of names
    /// that could not be resolved.
    pub fn verify(&mut self, schema: &dyn Schema, sel: Option<&SelectClause>) -> usize {
        self.expr.simplify();
        verify::amplify(&mut self.expr, schema);
        verify::verify(&mut self.expr, schema, sel)
    }
}
