//! Module `range` implement the leaf predicates of the query
//! expression tree.

use std::{fmt, result};

use crate::qexpr::math::MathTerm;

/// Comparison operators supported in range predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompOp {
    Undef,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl fmt::Display for CompOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        let s = match self {
            CompOp::Undef => "??",
            CompOp::Lt => "<",
            CompOp::Le => "<=",
            CompOp::Gt => ">",
            CompOp::Ge => ">=",
            CompOp::Eq => "==",
        };
        write!(f, "{}", s)
    }
}

impl CompOp {
    /// Apply as `a op b`.
    pub fn compare(&self, a: f64, b: f64) -> bool {
        match self {
            CompOp::Undef => true,
            CompOp::Lt => a < b,
            CompOp::Le => a <= b,
            CompOp::Gt => a > b,
            CompOp::Ge => a >= b,
            CompOp::Eq => (a - b) == 0.0,
        }
    }

    /// The operator obtained by swapping the operand order, `a op b`
    /// iff `b op.swap() a`.
    pub fn swap(&self) -> CompOp {
        match self {
            CompOp::Lt => CompOp::Gt,
            CompOp::Le => CompOp::Ge,
            CompOp::Gt => CompOp::Lt,
            CompOp::Ge => CompOp::Le,
            op => *op,
        }
    }

    pub fn is_upper_type(&self) -> bool {
        matches!(self, CompOp::Lt | CompOp::Le)
    }
}

/// A range defined with one or two boundaries on a single column,
/// canonically `lower left_op column right_op upper`.
#[derive(Clone, Debug, PartialEq)]
pub struct ContinuousRange {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
    pub left_op: CompOp,
    pub right_op: CompOp,
}

impl fmt::Display for ContinuousRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        if self.name.is_empty()
            || (self.left_op == CompOp::Undef && self.right_op == CompOp::Undef)
        {
            return write!(f, "ILL-DEFINED-RANGE");
        }
        if self.left_op != CompOp::Undef {
            write!(f, "{} {} ", self.lower, self.left_op)?;
        }
        write!(f, "{}", self.name)?;
        if self.right_op != CompOp::Undef {
            write!(f, " {} {}", self.right_op, self.upper)?;
        }
        Ok(())
    }
}

impl ContinuousRange {
    /// Two-sided range `lower left_op name right_op upper`.
    pub fn new(
        lower: f64,
        left_op: CompOp,
        name: &str,
        right_op: CompOp,
        upper: f64,
    ) -> ContinuousRange {
        ContinuousRange {
            name: name.to_string(),
            lower,
            upper,
            left_op,
            right_op,
        }
    }

    /// One-sided range `name op bound`, normalized so that `>`/`>=`
    /// appear as a reversed left bound.
    pub fn one_sided(name: &str, op: CompOp, bound: f64) -> ContinuousRange {
        let (lower, left_op, right_op, upper) = match op {
            CompOp::Lt => (0.0, CompOp::Undef, CompOp::Lt, bound),
            CompOp::Le => (0.0, CompOp::Undef, CompOp::Le, bound),
            CompOp::Gt => (bound, CompOp::Lt, CompOp::Undef, 0.0),
            CompOp::Ge => (bound, CompOp::Le, CompOp::Undef, 0.0),
            CompOp::Eq => (bound, CompOp::Eq, CompOp::Undef, bound),
            CompOp::Undef => (0.0, CompOp::Undef, CompOp::Undef, 0.0),
        };
        ContinuousRange {
            name: name.to_string(),
            lower,
            upper,
            left_op,
            right_op,
        }
    }

    /// A constant-false range on `name`.
    pub fn empty_range(name: &str) -> ContinuousRange {
        ContinuousRange::new(1.0, CompOp::Le, name, CompOp::Le, 0.0)
    }

    /// Return true if the incoming value is within the range.
    pub fn in_range(&self, val: f64) -> bool {
        let res0 = match self.left_op {
            CompOp::Undef => true,
            op => op.compare(self.lower, val),
        };
        let res1 = match self.right_op {
            CompOp::Undef => true,
            op => op.compare(val, self.upper),
        };
        res0 && res1
    }

    /// Detect ranges that no value can satisfy.
    pub fn is_empty(&self) -> bool {
        let lo = self.left_op;
        let ro = self.right_op;
        if lo.is_upper_type() && ro.is_upper_type() {
            self.lower > self.upper
                || (self.lower == self.upper
                    && (lo != CompOp::Le || ro != CompOp::Le))
        } else if lo == CompOp::Eq && ro == CompOp::Eq {
            self.lower != self.upper
        } else if matches!(lo, CompOp::Gt | CompOp::Ge)
            && matches!(ro, CompOp::Gt | CompOp::Ge)
        {
            self.upper > self.lower
                || (self.lower == self.upper
                    && (lo != CompOp::Ge || ro != CompOp::Ge))
        } else {
            false
        }
    }

    /// Clamp the range to `[left, right]`, first normalizing reversed
    /// `>`/`>=` operator pairs by swapping the bounds.
    pub fn restrict_range(&mut self, left: f64, right: f64) {
        if matches!(self.left_op, CompOp::Gt | CompOp::Ge)
            && matches!(self.right_op, CompOp::Gt | CompOp::Ge)
        {
            self.left_op = match self.left_op {
                CompOp::Gt => CompOp::Lt,
                _ => CompOp::Le,
            };
            self.right_op = match self.right_op {
                CompOp::Gt => CompOp::Lt,
                _ => CompOp::Le,
            };
            std::mem::swap(&mut self.lower, &mut self.upper);
        }

        if (self.left_op.is_upper_type() && self.lower < left)
            || (self.left_op == CompOp::Undef && self.right_op.is_upper_type())
        {
            self.lower = left;
            self.left_op = CompOp::Le;
        }
        if (self.right_op.is_upper_type() && self.upper > right)
            || (self.left_op.is_upper_type() && self.right_op == CompOp::Undef)
        {
            self.upper = right;
            self.right_op = CompOp::Le;
        }
        if (self.left_op == CompOp::Eq
            && self.right_op == CompOp::Undef
            && (self.lower < left || self.lower > right))
            || (self.left_op == CompOp::Undef
                && self.right_op == CompOp::Eq
                && (self.upper < left || self.upper > right))
        {
            // out-of-bound equality, force an empty range
            self.left_op = CompOp::Eq;
            self.right_op = CompOp::Eq;
            self.lower = left;
            self.upper = if right > left { right } else { left + 1.0 };
        }
    }

    /// The effective left boundary for amplification purposes.
    pub fn left_bound(&self) -> f64 {
        match self.left_op {
            CompOp::Undef => f64::NEG_INFINITY,
            _ => self.lower,
        }
    }

    /// The effective right boundary for amplification purposes.
    pub fn right_bound(&self) -> f64 {
        match self.right_op {
            CompOp::Undef => f64::INFINITY,
            _ => self.upper,
        }
    }
}

// Membership probes switch from linear scan to binary search at this
// many values.
const BSEARCH_CUTOFF: usize = 32;

/// A membership predicate `column IN (v1, .., vn)`, values sorted
/// with duplicates removed.
#[derive(Clone, Debug, PartialEq)]
pub struct DiscreteRange {
    pub name: String,
    pub values: Vec<f64>,
}

impl fmt::Display for DiscreteRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{} IN (", self.name)?;
        for (i, val) in self.values.iter().enumerate() {
            match i {
                0 => write!(f, "{}", val)?,
                _ => write!(f, ", {}", val)?,
            }
        }
        write!(f, ")")
    }
}

impl DiscreteRange {
    pub fn new(name: &str, mut values: Vec<f64>) -> DiscreteRange {
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        values.dedup();
        DiscreteRange {
            name: name.to_string(),
            values,
        }
    }

    pub fn in_range(&self, val: f64) -> bool {
        if self.values.len() >= BSEARCH_CUTOFF {
            self.values
                .binary_search_by(|v| v.partial_cmp(&val).unwrap())
                .is_ok()
        } else {
            self.values.iter().any(|v| *v == val)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Clamp the member list to `[left, right]`.
    pub fn restrict_range(&mut self, left: f64, right: f64) {
        self.values.retain(|v| *v >= left && *v <= right)
    }

    pub fn left_bound(&self) -> f64 {
        self.values.first().copied().unwrap_or(f64::INFINITY)
    }

    pub fn right_bound(&self) -> f64 {
        self.values.last().copied().unwrap_or(f64::NEG_INFINITY)
    }
}

/// An equality predicate between a string column and a literal.
#[derive(Clone, Debug, PartialEq)]
pub struct StringEq {
    pub name: String,
    pub value: String,
}

impl fmt::Display for StringEq {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{} == \"{}\"", self.name, self.value)
    }
}

impl StringEq {
    pub fn new(name: &str, value: &str) -> StringEq {
        StringEq {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// A membership predicate over string literals, values sorted with
/// duplicates removed.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiString {
    pub name: String,
    pub values: Vec<String>,
}

impl fmt::Display for MultiString {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{} IN (", self.name)?;
        for (i, val) in self.values.iter().enumerate() {
            match i {
                0 => write!(f, "\"{}\"", val)?,
                _ => write!(f, ", \"{}\"", val)?,
            }
        }
        write!(f, ")")
    }
}

impl MultiString {
    pub fn new(name: &str, mut values: Vec<String>) -> MultiString {
        values.sort();
        values.dedup();
        MultiString {
            name: name.to_string(),
            values,
        }
    }
}

/// A glob-style pattern predicate, `column LIKE "pattern"`, where `%`
/// matches any run of characters and `_` a single character.
#[derive(Clone, Debug, PartialEq)]
pub struct LikeExpr {
    pub name: String,
    pub pattern: String,
}

impl fmt::Display for LikeExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{} LIKE \"{}\"", self.name, self.pattern)
    }
}

impl LikeExpr {
    pub fn new(name: &str, pattern: &str) -> LikeExpr {
        LikeExpr {
            name: name.to_string(),
            pattern: pattern.to_string(),
        }
    }
}

/// A comparison involving arithmetic expressions, two or three terms.
#[derive(Clone, Debug, PartialEq)]
pub struct CompRange {
    pub term1: MathTerm,
    pub op12: CompOp,
    pub term2: MathTerm,
    pub op23: CompOp,
    pub term3: Option<MathTerm>,
}

impl fmt::Display for CompRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{} {} {}", self.term1, self.op12, self.term2)?;
        if let Some(t3) = &self.term3 {
            write!(f, " {} {}", self.op23, t3)?;
        }
        Ok(())
    }
}

impl CompRange {
    pub fn new(term1: MathTerm, op12: CompOp, term2: MathTerm) -> CompRange {
        CompRange {
            term1,
            op12,
            term2,
            op23: CompOp::Undef,
            term3: None,
        }
    }

    pub fn between(
        term1: MathTerm,
        op12: CompOp,
        term2: MathTerm,
        op23: CompOp,
        term3: MathTerm,
    ) -> CompRange {
        CompRange {
            term1,
            op12,
            term2,
            op23,
            term3: Some(term3),
        }
    }

    /// Whether the comparison reduces to a plain range on one column.
    pub fn is_simple_range(&self) -> bool {
        match &self.term3 {
            None => {
                (self.term1.is_variable() && self.term2.is_number())
                    || (self.term1.is_number() && self.term2.is_variable())
            }
            Some(t3) => {
                self.term1.is_number() && self.term2.is_variable() && t3.is_number()
            }
        }
    }

    /// Whether this could be a string comparison, `var1 = var2` with
    /// both sides parsed as identifiers.
    pub fn maybe_string_compare(&self) -> bool {
        self.term3.is_none()
            && self.op12 == CompOp::Eq
            && self.term1.is_variable()
            && self.term2.is_variable()
    }

    /// Convert to [ContinuousRange]; call only after
    /// [CompRange::is_simple_range] returns true.
    pub fn to_simple_range(&self) -> Option<ContinuousRange> {
        match &self.term3 {
            None => match (&self.term1, &self.term2) {
                (MathTerm::Variable(name), MathTerm::Number(val)) => {
                    Some(ContinuousRange::one_sided(name, self.op12, *val))
                }
                (MathTerm::Number(val), MathTerm::Variable(name)) => {
                    Some(ContinuousRange::one_sided(name, self.op12.swap(), *val))
                }
                _ => None,
            },
            Some(t3) => match (&self.term1, &self.term2, t3) {
                (MathTerm::Number(lo), MathTerm::Variable(name), MathTerm::Number(hi)) => {
                    Some(ContinuousRange::new(*lo, self.op12, name, self.op23, *hi))
                }
                _ => None,
            },
        }
    }
}

/// A join between two named columns, optionally within a range
/// expression, `join(a.x, b.y, delta)` meaning
/// `a.x between b.y - delta and b.y + delta`.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinExpr {
    pub name1: String,
    pub name2: String,
    pub range: Option<MathTerm>,
}

impl fmt::Display for JoinExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match &self.range {
            Some(range) => write!(f, "join({}, {}, {})", self.name1, self.name2, range),
            None => write!(f, "join({}, {})", self.name1, self.name2),
        }
    }
}

impl JoinExpr {
    pub fn new(name1: &str, name2: &str, range: Option<MathTerm>) -> JoinExpr {
        JoinExpr {
            name1: name1.to_string(),
            name2: name2.to_string(),
            range,
        }
    }
}

/// An any-match-any predicate, `any(prefix) op value`, satisfied when
/// any column whose name starts with `prefix` matches.
#[derive(Clone, Debug, PartialEq)]
pub struct AnyAny {
    pub prefix: String,
    pub values: Vec<f64>,
}

impl fmt::Display for AnyAny {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self.values.len() {
            1 => write!(f, "any({}) = {}", self.prefix, self.values[0]),
            _ => {
                write!(f, "any({}) in (", self.prefix)?;
                for (i, val) in self.values.iter().enumerate() {
                    match i {
                        0 => write!(f, "{}", val)?,
                        _ => write!(f, ", {}", val)?,
                    }
                }
                write!(f, ")")
            }
        }
    }
}

impl AnyAny {
    pub fn new(prefix: &str, mut values: Vec<f64>) -> AnyAny {
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        values.dedup();
        AnyAny {
            prefix: prefix.to_string(),
            values,
        }
    }
}

#[cfg(test)]
#[path = "range_test.rs"]
mod range_test;
