//! Module `eval` implement query evaluation over one partition.
//!
//! An expression tree evaluates bottom-up into a [BitVector] of hit
//! rows. Leaf predicates scan the column data, category equality goes
//! through the cached key index when one is loaded. Only rows set in
//! the partition's active-row mask participate. A predicate naming a
//! missing column degrades into the empty bitmap with a warning, a
//! predicate over an incompatible column type rejects the query.

use std::sync::Arc;

use crate::{
    column::{category, text, ColumnType, Values},
    err_at,
    index::KeyIndex,
    part::Partition,
    qexpr::{CompRange, ContinuousRange, DiscreteRange, MathTerm, QExpr, Scope},
    query::{Aggregator, Schema, SelectClause, WhereClause},
    util, BitVector, BitmapIndex, Column, Error, Result,
};

// Column values loaded for arithmetic evaluation.
struct Loaded {
    name: String,
    values: Values,
}

struct RowScope<'a> {
    cols: &'a [Loaded],
    row: usize,
}

impl<'a> Scope for RowScope<'a> {
    fn value(&self, name: &str) -> Option<f64> {
        self.cols
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(name))
            .and_then(|l| l.values.get(self.row))
    }
}

impl Partition {
    /// Evaluate an expression tree into the bitmap of matching active
    /// rows.
    pub fn evaluate(&self, expr: &QExpr) -> Result<BitVector> {
        let hits = self.eval_expr(expr)?;
        Ok(hits.and(&self.to_mask()))
    }

    /// Parse, verify and evaluate a WHERE string. Unresolved names
    /// reject the query.
    pub fn rows_matching(&self, conds: &str) -> Result<BitVector> {
        rows_matching(self, conds)
    }

    /// Number of active rows satisfying `conds`.
    pub fn count_hits(&self, conds: &str) -> Result<usize> {
        Ok(self.rows_matching(conds)?.cnt())
    }

    /// Evaluation cost of a node, used as the reorder weight. Ranges
    /// served by a loaded index report the index estimate, everything
    /// else costs a full scan.
    pub fn estimate_cost(&self, expr: &QExpr) -> f64 {
        match expr {
            QExpr::Range(range) => match self.to_column(&range.name) {
                Some(col) => match col.as_index() {
                    Some(index) => index.estimate(range),
                    None => self.len() as f64,
                },
                None => 0.0,
            },
            _ => self.len() as f64,
        }
    }

    fn eval_expr(&self, expr: &QExpr) -> Result<BitVector> {
        match expr {
            QExpr::And(l, r) => Ok(self.eval_expr(l)?.and(&self.eval_expr(r)?)),
            QExpr::Or(l, r) => Ok(self.eval_expr(l)?.or(&self.eval_expr(r)?)),
            QExpr::Xor(l, r) => Ok(self.eval_expr(l)?.xor(&self.eval_expr(r)?)),
            QExpr::Minus(l, r) => Ok(self.eval_expr(l)?.minus(&self.eval_expr(r)?)),
            QExpr::Not(e) => Ok(self.eval_expr(e)?.complement()),
            QExpr::Range(range) => self.eval_range(range),
            QExpr::Discrete(range) => self.eval_discrete(range),
            QExpr::StringEq(s) => self.eval_string_eq(&s.name, &s.value),
            QExpr::Strings(ms) => self.eval_strings(&ms.name, &ms.values),
            QExpr::Like(like) => self.eval_like(&like.name, &like.pattern),
            QExpr::Cmp(cr) => self.eval_cmp(cr),
            QExpr::Join(join) => {
                log::warn!("join {} is not evaluated at partition level", join);
                Ok(BitVector::zeros(self.len()))
            }
            QExpr::AnyAny(any) => {
                let prefix = any.prefix.to_lowercase();
                let mut hits = BitVector::zeros(self.len());
                for name in self.column_names() {
                    if name.to_lowercase().starts_with(&prefix) {
                        let range = DiscreteRange::new(&name, any.values.clone());
                        hits.or_assign(&self.eval_discrete(&range)?);
                    }
                }
                Ok(hits)
            }
        }
    }

    // missing column degrades into zero hits
    fn column_or_empty(&self, name: &str) -> Result<Option<Column>> {
        match self.to_column(name) {
            Some(col) => Ok(Some(col)),
            None => {
                log::warn!(
                    "partition {} has no column {}, empty result",
                    self.to_name(),
                    name
                );
                Ok(None)
            }
        }
    }

    fn eval_range(&self, range: &ContinuousRange) -> Result<BitVector> {
        let n_rows = self.len();
        let col = match self.column_or_empty(&range.name)? {
            Some(col) => col,
            None => return Ok(BitVector::zeros(n_rows)),
        };
        let dir = self.to_active_dir();

        match col.to_type() {
            ColumnType::Text | ColumnType::Blob => {
                err_at!(TypeFail, msg: "range condition on {} column {}", col.to_type(), range.name)
            }
            ColumnType::Category => {
                // ranges over a category compare dictionary ids
                let index = self.category_index(&col)?;
                index.evaluate(range)
            }
            _ => {
                let vals = col.read_values(&dir)?;
                let nulls = col.null_mask(&dir, n_rows)?;
                let mut hits = BitVector::zeros(n_rows);
                for i in 0..n_rows.min(vals.len()) {
                    if nulls.is_set(i) && range.in_range(vals.get(i).unwrap()) {
                        hits.set(i);
                    }
                }
                Ok(hits)
            }
        }
    }

    fn eval_discrete(&self, range: &DiscreteRange) -> Result<BitVector> {
        let n_rows = self.len();
        let col = match self.column_or_empty(&range.name)? {
            Some(col) => col,
            None => return Ok(BitVector::zeros(n_rows)),
        };
        let dir = self.to_active_dir();

        match col.to_type() {
            ColumnType::Text | ColumnType::Blob => {
                err_at!(TypeFail, msg: "IN condition on {} column {}", col.to_type(), range.name)
            }
            ColumnType::Category => {
                let index = self.category_index(&col)?;
                index.evaluate_discrete(range)
            }
            _ => {
                let vals = col.read_values(&dir)?;
                let nulls = col.null_mask(&dir, n_rows)?;
                let mut hits = BitVector::zeros(n_rows);
                for i in 0..n_rows.min(vals.len()) {
                    if nulls.is_set(i) && range.in_range(vals.get(i).unwrap()) {
                        hits.set(i);
                    }
                }
                Ok(hits)
            }
        }
    }

    fn eval_string_eq(&self, name: &str, value: &str) -> Result<BitVector> {
        let n_rows = self.len();
        let col = match self.column_or_empty(name)? {
            Some(col) => col,
            None => return Ok(BitVector::zeros(n_rows)),
        };
        let dir = self.to_active_dir();

        match col.to_type() {
            ColumnType::Text => text::string_search(&col, &dir, value),
            ColumnType::Category => {
                let index = self.category_index(&col)?;
                let dic = crate::Dictionary::read_file(&col.dic_file(&dir))?;
                match dic.to_id(value) {
                    Some(id) if id > 0 => match index.get_bitvector(id) {
                        Some(hits) => Ok(hits),
                        None => category::string_search(&col, &dir, n_rows, value),
                    },
                    _ => Ok(BitVector::zeros(n_rows)),
                }
            }
            ct => err_at!(TypeFail, msg: "string equality on {} column {}", ct, name),
        }
    }

    fn eval_strings(&self, name: &str, values: &[String]) -> Result<BitVector> {
        let n_rows = self.len();
        let col = match self.column_or_empty(name)? {
            Some(col) => col,
            None => return Ok(BitVector::zeros(n_rows)),
        };
        let dir = self.to_active_dir();

        match col.to_type() {
            ColumnType::Text => text::multi_search(&col, &dir, values),
            ColumnType::Category => category::multi_search(&col, &dir, n_rows, values),
            ct => err_at!(TypeFail, msg: "string IN on {} column {}", ct, name),
        }
    }

    fn eval_like(&self, name: &str, pattern: &str) -> Result<BitVector> {
        let n_rows = self.len();
        let col = match self.column_or_empty(name)? {
            Some(col) => col,
            None => return Ok(BitVector::zeros(n_rows)),
        };
        let dir = self.to_active_dir();

        match col.to_type() {
            ColumnType::Text => text::pattern_search(&col, &dir, pattern),
            ColumnType::Category => category::pattern_search(&col, &dir, n_rows, pattern),
            ct => err_at!(TypeFail, msg: "LIKE on {} column {}", ct, name),
        }
    }

    fn eval_cmp(&self, cr: &CompRange) -> Result<BitVector> {
        let n_rows = self.len();
        let mut names = vec![];
        cr.term1.variables(&mut names);
        cr.term2.variables(&mut names);
        if let Some(t3) = &cr.term3 {
            t3.variables(&mut names);
        }

        let (cols, nulls) = self.load_columns(&names)?;
        let mut hits = BitVector::zeros(n_rows);
        for row in 0..n_rows {
            if !nulls.is_set(row) {
                continue;
            }
            let scope = RowScope { cols: &cols, row };
            let v1 = cr.term1.eval(&scope);
            let v2 = cr.term2.eval(&scope);
            let ok = cr.op12.compare(v1, v2)
                && match &cr.term3 {
                    Some(t3) => cr.op23.compare(v2, t3.eval(&scope)),
                    None => true,
                };
            if ok {
                hits.set(row);
            }
        }
        Ok(hits)
    }

    // values and combined null mask of the named columns
    fn load_columns(&self, names: &[String]) -> Result<(Vec<Loaded>, BitVector)> {
        let n_rows = self.len();
        let dir = self.to_active_dir();
        let mut cols = vec![];
        let mut nulls = BitVector::ones(n_rows);
        for name in names.iter() {
            if name == "*" {
                continue;
            }
            let col = match self.to_column(name) {
                Some(col) => col,
                None => err_at!(NameFail, msg: "no column named {}", name)?,
            };
            let values = match col.to_type() {
                ColumnType::Category => {
                    Values::UInt(category::read_ids(&col, &dir, n_rows)?)
                }
                ct if ct.is_fixed() && ct != ColumnType::Oid => col.read_values(&dir)?,
                ct => err_at!(TypeFail, msg: "arithmetic over {} column {}", ct, name)?,
            };
            nulls.and_assign(&col.null_mask(&dir, n_rows)?);
            cols.push(Loaded {
                name: name.clone(),
                values,
            });
        }
        Ok((cols, nulls))
    }

    // load, or build and cache, the key index of a category column
    fn category_index(&self, col: &Column) -> Result<Arc<dyn BitmapIndex + Send + Sync>> {
        if let Some(index) = col.as_index() {
            return Ok(Arc::clone(index));
        }

        let n_rows = self.len();
        let dir = self.to_active_dir();
        let loc = col.index_file(&dir);
        let index = match KeyIndex::read_file(&loc) {
            Ok(index) if index.len() == n_rows => index,
            Ok(index) => {
                log::warn!(
                    "index {:?} covers {}/{} rows, rebuilding",
                    loc,
                    index.len(),
                    n_rows
                );
                self.rebuild_category_index(col, n_rows)?
            }
            Err(_) if util::file_size(&loc)? > 0 => {
                // corrupt frame, purge and rebuild
                log::warn!("purging corrupt index file {:?}", loc);
                col.purge_index(&dir, self.as_fileman())?;
                self.rebuild_category_index(col, n_rows)?
            }
            Err(_) => self.rebuild_category_index(col, n_rows)?,
        };

        let index: Arc<dyn BitmapIndex + Send + Sync> = Arc::new(index);
        let mut inner = self.as_inner().write();
        if let Some(c) = inner
            .columns
            .iter_mut()
            .find(|c| c.to_name().eq_ignore_ascii_case(&col.to_name()))
        {
            c.set_index(Arc::clone(&index));
        }
        Ok(index)
    }

    fn rebuild_category_index(&self, col: &Column, n_rows: usize) -> Result<KeyIndex> {
        let dir = self.to_active_dir();
        let ids = category::read_ids(col, &dir, n_rows)?;
        let index = KeyIndex::build(&ids);
        crate::index::write_index(&col.index_file(&dir), &index)?;
        Ok(index)
    }

    // ---- projection and aggregation

    /// Active rows with non-null values in every column referenced by
    /// the select terms.
    pub fn select_mask(&self, sel: &SelectClause) -> Result<BitVector> {
        let mut names = vec![];
        for st in sel.as_terms() {
            st.term.variables(&mut names);
        }
        names.retain(|n| n != "*");
        let (_, nulls) = self.load_columns(&names)?;
        Ok(nulls.and(&self.to_mask()))
    }

    /// Evaluate an arithmetic term for every row set in `hits`, in
    /// row order.
    pub fn project(&self, term: &MathTerm, hits: &BitVector) -> Result<Vec<f64>> {
        let mut names = vec![];
        term.variables(&mut names);
        names.retain(|n| n != "*");
        let (cols, _) = self.load_columns(&names)?;

        let mut out = Vec::with_capacity(hits.cnt());
        for row in hits.iter() {
            let scope = RowScope { cols: &cols, row };
            out.push(term.eval(&scope));
        }
        Ok(out)
    }

    /// Compute every select term over the hit rows. Aggregated terms
    /// reduce to a single value, plain terms report NaN, fetch those
    /// with [Partition::project].
    pub fn aggregate(&self, sel: &SelectClause, hits: &BitVector) -> Result<Vec<f64>> {
        let mut out = vec![];
        for st in sel.as_terms() {
            let val = match st.agg {
                Aggregator::Nil => f64::NAN,
                Aggregator::Cnt if st.term.as_variable() == Some("*") => hits.cnt() as f64,
                agg => reduce_values(agg, &self.project(&st.term, hits)?),
            };
            out.push(val);
        }
        Ok(out)
    }
}

fn reduce_values(agg: Aggregator, vals: &[f64]) -> f64 {
    let n = vals.len() as f64;
    match agg {
        Aggregator::Cnt => n,
        Aggregator::Sum => vals.iter().sum(),
        Aggregator::Avg => vals.iter().sum::<f64>() / n,
        Aggregator::Max => vals.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        Aggregator::Min => vals.iter().cloned().fold(f64::INFINITY, f64::min),
        Aggregator::Distinct => {
            let mut sorted = vals.to_vec();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            sorted.dedup();
            sorted.len() as f64
        }
        Aggregator::Median => {
            let mut sorted = vals.to_vec();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            match sorted.len() {
                0 => f64::NAN,
                m if m % 2 == 1 => sorted[m / 2],
                m => (sorted[m / 2 - 1] + sorted[m / 2]) / 2.0,
            }
        }
        Aggregator::VarPop | Aggregator::VarSamp | Aggregator::StdPop
        | Aggregator::StdSamp => {
            let mean = vals.iter().sum::<f64>() / n;
            let ssq: f64 = vals.iter().map(|v| (v - mean) * (v - mean)).sum();
            let var = match agg {
                Aggregator::VarPop | Aggregator::StdPop => ssq / n,
                _ => ssq / (n - 1.0),
            };
            match agg {
                Aggregator::StdPop | Aggregator::StdSamp => var.sqrt(),
                _ => var,
            }
        }
        Aggregator::Nil => f64::NAN,
    }
}

/// Parse, verify and evaluate a WHERE string against the partition.
pub fn rows_matching(part: &Partition, conds: &str) -> Result<BitVector> {
    let mut wc = WhereClause::parse(conds)?;
    let unresolved = wc.verify(part, None);
    if unresolved > 0 {
        err_at!(NameFail, msg: "{} unresolved names in {:?}", unresolved, conds)?
    }
    part.evaluate(wc.as_expr())
}

/// Active rows with non-null values in every column the term
/// references.
pub(crate) fn term_mask(part: &Partition, term: &MathTerm) -> Result<BitVector> {
    let mut names = vec![];
    term.variables(&mut names);
    names.retain(|n| n != "*");
    let (_, nulls) = part.load_columns(&names)?;
    Ok(nulls.and(&part.to_mask()))
}

/// Evaluate an arithmetic term for every row, producing a full-length
/// vector, rows outside `mask` evaluate to ZERO.
pub(crate) fn calculate(
    part: &Partition,
    term: &MathTerm,
    mask: &BitVector,
) -> Result<Vec<f64>> {
    let mut names = vec![];
    term.variables(&mut names);
    names.retain(|n| n != "*");
    let (cols, _) = part.load_columns(&names)?;

    let n_rows = part.len();
    let mut out = Vec::with_capacity(n_rows);
    for row in 0..n_rows {
        if mask.is_set(row) {
            let scope = RowScope { cols: &cols, row };
            out.push(term.eval(&scope));
        } else {
            out.push(0.0);
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "eval_test.rs"]
mod eval_test;
