//! Module `qexpr` implement the query expression tree.
//!
//! A WHERE clause parses into a [QExpr] tree, logical operators over
//! leaf predicates, ranges, string equalities, pattern matches,
//! arithmetic comparisons, joins. The tree supports algebraic
//! rewriting via [QExpr::simplify], cost-driven reordering of
//! commutative chains via [QExpr::reorder], separation of simple from
//! complex conditions and join extraction.
//!
//! Rewrites never fail. A predicate that can never be satisfied is
//! collapsed into an empty [ContinuousRange], which evaluates to the
//! empty bitmap.

use std::{fmt, result};

pub mod math;
pub mod range;

pub use math::{MathOp, MathTerm, Scope, StdFun1, StdFun2};
pub use range::{
    AnyAny, CompOp, CompRange, ContinuousRange, DiscreteRange, JoinExpr, LikeExpr,
    MultiString, StringEq,
};

/// QExpr type, a node of the query expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum QExpr {
    And(Box<QExpr>, Box<QExpr>),
    Or(Box<QExpr>, Box<QExpr>),
    Xor(Box<QExpr>, Box<QExpr>),
    /// A AND (NOT B).
    Minus(Box<QExpr>, Box<QExpr>),
    Not(Box<QExpr>),
    Range(ContinuousRange),
    Discrete(DiscreteRange),
    StringEq(StringEq),
    Strings(MultiString),
    Like(LikeExpr),
    Cmp(CompRange),
    Join(JoinExpr),
    AnyAny(AnyAny),
}

impl fmt::Display for QExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self {
            QExpr::And(l, r) => write!(f, "({} AND {})", l, r),
            QExpr::Or(l, r) => write!(f, "({} OR {})", l, r),
            QExpr::Xor(l, r) => write!(f, "({} XOR {})", l, r),
            QExpr::Minus(l, r) => write!(f, "({} MINUS {})", l, r),
            QExpr::Not(e) => write!(f, "(NOT {})", e),
            QExpr::Range(e) => write!(f, "{}", e),
            QExpr::Discrete(e) => write!(f, "{}", e),
            QExpr::StringEq(e) => write!(f, "{}", e),
            QExpr::Strings(e) => write!(f, "{}", e),
            QExpr::Like(e) => write!(f, "{}", e),
            QExpr::Cmp(e) => write!(f, "{}", e),
            QExpr::Join(e) => write!(f, "{}", e),
            QExpr::AnyAny(e) => write!(f, "{}", e),
        }
    }
}

impl QExpr {
    pub fn and(l: QExpr, r: QExpr) -> QExpr {
        QExpr::And(Box::new(l), Box::new(r))
    }

    pub fn or(l: QExpr, r: QExpr) -> QExpr {
        QExpr::Or(Box::new(l), Box::new(r))
    }

    pub fn xor(l: QExpr, r: QExpr) -> QExpr {
        QExpr::Xor(Box::new(l), Box::new(r))
    }

    pub fn minus(l: QExpr, r: QExpr) -> QExpr {
        QExpr::Minus(Box::new(l), Box::new(r))
    }

    pub fn not(e: QExpr) -> QExpr {
        match e {
            // NOT(NOT e) cancels
            QExpr::Not(inner) => *inner,
            e => QExpr::Not(Box::new(e)),
        }
    }

    /// A node with no children.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            QExpr::And(..) | QExpr::Or(..) | QExpr::Xor(..) | QExpr::Minus(..) | QExpr::Not(..)
        )
    }

    /// A node that evaluates directly to a bitmap without combining
    /// children.
    pub fn direct_eval(&self) -> bool {
        match self {
            QExpr::Range(_)
            | QExpr::Discrete(_)
            | QExpr::StringEq(_)
            | QExpr::Strings(_)
            | QExpr::Like(_)
            | QExpr::Cmp(_)
            | QExpr::AnyAny(_) => true,
            QExpr::Not(e) => e.direct_eval(),
            _ => false,
        }
    }

    /// A tree of simple range conditions joined with logical operators.
    pub fn is_simple(&self) -> bool {
        match self {
            QExpr::And(l, r) | QExpr::Or(l, r) | QExpr::Xor(l, r) | QExpr::Minus(l, r) => {
                l.is_simple() && r.is_simple()
            }
            QExpr::Not(e) => e.is_simple(),
            QExpr::Cmp(cr) => cr.is_simple_range(),
            QExpr::Join(_) => false,
            _ => true,
        }
    }

    pub fn has_join(&self) -> bool {
        match self {
            QExpr::Join(_) => true,
            QExpr::And(l, r) | QExpr::Or(l, r) | QExpr::Xor(l, r) | QExpr::Minus(l, r) => {
                l.has_join() || r.has_join()
            }
            QExpr::Not(e) => e.has_join(),
            _ => false,
        }
    }

    // A leaf that no value can satisfy, a constant false.
    fn is_empty_leaf(&self) -> bool {
        match self {
            QExpr::Range(r) => r.is_empty(),
            QExpr::Discrete(d) => d.is_empty(),
            QExpr::Strings(ms) => ms.values.is_empty(),
            _ => false,
        }
    }

    /// Rewrite the tree in place into an equivalent, usually smaller,
    /// form. Specifically,
    ///
    /// * logical operators collapse around constant-false children,
    /// * two continuous ranges on the same column under AND merge into
    ///   one tighter range,
    /// * multi-string membership becomes a cascade of equalities
    ///   joined with OR,
    /// * arithmetic comparisons constant-fold their terms, shift
    ///   constants across linear operator chains and, when reduced to
    ///   a `(variable, number)` shape, become continuous ranges.
    pub fn simplify(&mut self) {
        let expr = std::mem::replace(self, QExpr::placeholder());
        *self = do_simplify(expr);
    }

    fn placeholder() -> QExpr {
        QExpr::Range(ContinuousRange::empty_range(""))
    }

    /// Rearrange commutative AND/OR/XOR chains so that an in-order
    /// traversal meets terminal and cheap predicates first. `wt`
    /// assigns the evaluation cost of a node. Return the aggregate
    /// cost of the tree.
    pub fn reorder(&mut self, wt: &dyn Fn(&QExpr) -> f64) -> f64 {
        if self.direct_eval() {
            return wt(self);
        }

        match self {
            QExpr::And(..) | QExpr::Or(..) | QExpr::Xor(..) => (),
            QExpr::Minus(l, r) => return l.reorder(wt) + r.reorder(wt),
            _ => return 0.0,
        }

        let expr = std::mem::replace(self, QExpr::placeholder());
        let kind = LogicalKind::of(&expr);
        let mut terms = vec![];
        flatten_chain(kind, expr, &mut terms);

        let mut total = 0.0;
        let mut weighted: Vec<(f64, QExpr)> = vec![];
        for mut term in terms.into_iter() {
            let w = if term.direct_eval() {
                wt(&term)
            } else {
                term.reorder(wt)
            };
            total += w;
            weighted.push((w, term));
        }

        // terminals first, then cheapest first within each group
        weighted.sort_by(|(wa, ta), (wb, tb)| {
            let ka = !ta.is_terminal();
            let kb = !tb.is_terminal();
            ka.cmp(&kb).then(wa.partial_cmp(wb).unwrap())
        });

        let mut iter = weighted.into_iter().map(|(_, t)| t);
        let mut acc = iter.next().unwrap();
        for term in iter {
            acc = kind.join(acc, term);
        }
        *self = acc;
        total
    }

    /// For an AND chain, split the terms into simple range/string
    /// predicates versus the rest. Returns,
    ///
    /// * `(Some(simple), None)` when every term is simple,
    /// * `(None, Some(complex))` when none is,
    /// * `(Some(simple), Some(complex))` for a mixture.
    pub fn separate_simple(&self) -> (Option<QExpr>, Option<QExpr>) {
        let mut terms = vec![];
        collect_and_chain(self, &mut terms);

        let (simple, complex): (Vec<&QExpr>, Vec<&QExpr>) =
            terms.iter().partition(|t| t.is_simple());

        let join = |terms: Vec<&QExpr>| -> Option<QExpr> {
            let mut iter = terms.into_iter().cloned();
            let first = iter.next()?;
            Some(iter.fold(first, QExpr::and))
        };

        match (simple.is_empty(), complex.is_empty()) {
            (false, true) => (Some(self.clone()), None),
            (true, false) => (None, Some(self.clone())),
            (false, false) => (join(simple), join(complex)),
            (true, true) => (None, None),
        }
    }

    /// Collect the join predicates found along top-level AND chains.
    pub fn extract_joins(&self) -> Vec<&JoinExpr> {
        let mut terms = vec![];
        self.do_extract_joins(&mut terms);
        terms
    }

    fn do_extract_joins<'a>(&'a self, terms: &mut Vec<&'a JoinExpr>) {
        match self {
            QExpr::And(l, r) => {
                l.do_extract_joins(terms);
                r.do_extract_joins(terms);
            }
            QExpr::Join(j) => terms.push(j),
            _ => (),
        }
    }

    /// First range predicate on the named variable along AND chains.
    pub fn find_range(&self, name: &str) -> Option<RangeRef> {
        match self {
            QExpr::Range(r) if r.name.eq_ignore_ascii_case(name) => Some(RangeRef::Cont(r)),
            QExpr::Discrete(d) if d.name.eq_ignore_ascii_case(name) => {
                Some(RangeRef::Disc(d))
            }
            QExpr::And(l, r) => l.find_range(name).or_else(|| r.find_range(name)),
            _ => None,
        }
    }

    /// Mutable variant of [QExpr::find_range].
    pub fn find_range_mut(&mut self, name: &str) -> Option<RangeMut> {
        match self {
            QExpr::Range(r) if r.name.eq_ignore_ascii_case(name) => {
                Some(RangeMut::Cont(r))
            }
            QExpr::Discrete(d) if d.name.eq_ignore_ascii_case(name) => {
                Some(RangeMut::Disc(d))
            }
            QExpr::And(l, r) => match l.find_range_mut(name) {
                found @ Some(_) => found,
                None => r.find_range_mut(name),
            },
            _ => None,
        }
    }
}

/// Shared reference to a range predicate, continuous or discrete.
pub enum RangeRef<'a> {
    Cont(&'a ContinuousRange),
    Disc(&'a DiscreteRange),
}

impl<'a> RangeRef<'a> {
    pub fn left_bound(&self) -> f64 {
        match self {
            RangeRef::Cont(r) => r.left_bound(),
            RangeRef::Disc(d) => d.left_bound(),
        }
    }

    pub fn right_bound(&self) -> f64 {
        match self {
            RangeRef::Cont(r) => r.right_bound(),
            RangeRef::Disc(d) => d.right_bound(),
        }
    }
}

/// Exclusive reference to a range predicate, continuous or discrete.
pub enum RangeMut<'a> {
    Cont(&'a mut ContinuousRange),
    Disc(&'a mut DiscreteRange),
}

impl<'a> RangeMut<'a> {
    pub fn restrict_range(&mut self, left: f64, right: f64) {
        match self {
            RangeMut::Cont(r) => r.restrict_range(left, right),
            RangeMut::Disc(d) => d.restrict_range(left, right),
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum LogicalKind {
    And,
    Or,
    Xor,
}

impl LogicalKind {
    fn of(expr: &QExpr) -> LogicalKind {
        match expr {
            QExpr::And(..) => LogicalKind::And,
            QExpr::Or(..) => LogicalKind::Or,
            QExpr::Xor(..) => LogicalKind::Xor,
            _ => unreachable!(),
        }
    }

    fn join(&self, l: QExpr, r: QExpr) -> QExpr {
        match self {
            LogicalKind::And => QExpr::and(l, r),
            LogicalKind::Or => QExpr::or(l, r),
            LogicalKind::Xor => QExpr::xor(l, r),
        }
    }
}

fn flatten_chain(kind: LogicalKind, expr: QExpr, out: &mut Vec<QExpr>) {
    match (kind, expr) {
        (LogicalKind::And, QExpr::And(l, r))
        | (LogicalKind::Or, QExpr::Or(l, r))
        | (LogicalKind::Xor, QExpr::Xor(l, r)) => {
            flatten_chain(kind, *l, out);
            flatten_chain(kind, *r, out);
        }
        (_, expr) => out.push(expr),
    }
}

fn collect_and_chain<'a>(expr: &'a QExpr, out: &mut Vec<&'a QExpr>) {
    match expr {
        QExpr::And(l, r) => {
            collect_and_chain(l, out);
            collect_and_chain(r, out);
        }
        expr => out.push(expr),
    }
}

fn do_simplify(expr: QExpr) -> QExpr {
    match expr {
        QExpr::Not(e) => QExpr::Not(Box::new(do_simplify(*e))),
        QExpr::And(l, r) => {
            let l = do_simplify(*l);
            let r = do_simplify(*r);
            // a constant-false child dominates the conjunction
            if l.is_empty_leaf() {
                return l;
            }
            if r.is_empty_leaf() {
                return r;
            }
            match (l, r) {
                (QExpr::Range(a), QExpr::Range(b))
                    if a.name.eq_ignore_ascii_case(&b.name) =>
                {
                    merge_and(a, b)
                }
                (l, r) => QExpr::and(l, r),
            }
        }
        QExpr::Or(l, r) => {
            let l = do_simplify(*l);
            let r = do_simplify(*r);
            match (l.is_empty_leaf(), r.is_empty_leaf()) {
                (true, false) => r,
                (_, true) => l,
                (false, false) => QExpr::or(l, r),
            }
        }
        QExpr::Xor(l, r) => {
            let l = do_simplify(*l);
            let r = do_simplify(*r);
            match (l.is_empty_leaf(), r.is_empty_leaf()) {
                (true, false) => r,
                (_, true) => l,
                (false, false) => QExpr::xor(l, r),
            }
        }
        QExpr::Minus(l, r) => {
            let l = do_simplify(*l);
            let r = do_simplify(*r);
            // empty left kills the result, empty right is a no-op,
            // either way the left child is the answer
            if l.is_empty_leaf() || r.is_empty_leaf() {
                l
            } else {
                QExpr::minus(l, r)
            }
        }
        QExpr::Cmp(cr) => simplify_cmp(cr),
        QExpr::Strings(ms) if ms.values.is_empty() => {
            QExpr::Range(ContinuousRange::empty_range(&ms.name))
        }
        QExpr::Strings(ms) => {
            // break multi-string membership into an OR cascade
            let name = ms.name;
            let mut iter = ms.values.into_iter();
            let first = QExpr::StringEq(StringEq::new(&name, &iter.next().unwrap()));
            iter.fold(first, |acc, val| {
                QExpr::or(acc, QExpr::StringEq(StringEq::new(&name, &val)))
            })
        }
        QExpr::Join(mut j) => {
            j.range = j.range.map(|t| t.reduce());
            QExpr::Join(j)
        }
        expr => expr,
    }
}

// Merge two continuous ranges on the same column under AND.
fn merge_and(mut a: ContinuousRange, mut b: ContinuousRange) -> QExpr {
    let two_sided =
        |r: &ContinuousRange| r.left_op.is_upper_type() && r.right_op.is_upper_type();
    let left_only =
        |r: &ContinuousRange| r.left_op.is_upper_type() && r.right_op == CompOp::Undef;
    let right_only =
        |r: &ContinuousRange| r.left_op == CompOp::Undef && r.right_op.is_upper_type();
    let equality = |r: &ContinuousRange| {
        (r.left_op == CompOp::Eq && r.right_op == CompOp::Undef)
            || (r.left_op == CompOp::Undef && r.right_op == CompOp::Eq)
    };
    let eq_value = |r: &ContinuousRange| -> f64 {
        if r.left_op == CompOp::Eq {
            r.lower
        } else {
            r.upper
        }
    };

    let empty = |name: &str| QExpr::Range(ContinuousRange::empty_range(name));

    if two_sided(&a) && two_sided(&b) {
        merge_lower(&mut a, &b);
        merge_upper(&mut a, &b);
        QExpr::Range(a)
    } else if two_sided(&a) && left_only(&b) {
        merge_lower(&mut a, &b);
        QExpr::Range(a)
    } else if left_only(&a) && two_sided(&b) {
        merge_lower(&mut b, &a);
        QExpr::Range(b)
    } else if two_sided(&a) && right_only(&b) {
        merge_upper(&mut a, &b);
        QExpr::Range(a)
    } else if right_only(&a) && two_sided(&b) {
        merge_upper(&mut b, &a);
        QExpr::Range(b)
    } else if left_only(&a) && left_only(&b) {
        merge_lower(&mut a, &b);
        QExpr::Range(a)
    } else if right_only(&a) && right_only(&b) {
        merge_upper(&mut a, &b);
        QExpr::Range(a)
    } else if left_only(&a) && right_only(&b) {
        a.right_op = b.right_op;
        a.upper = b.upper;
        QExpr::Range(a)
    } else if right_only(&a) && left_only(&b) {
        a.left_op = b.left_op;
        a.lower = b.lower;
        QExpr::Range(a)
    } else if equality(&a) && equality(&b) {
        if eq_value(&a) == eq_value(&b) {
            QExpr::Range(a)
        } else {
            empty(&a.name)
        }
    } else if equality(&b) {
        if a.in_range(eq_value(&b)) {
            QExpr::Range(b)
        } else {
            empty(&a.name)
        }
    } else if equality(&a) {
        if b.in_range(eq_value(&a)) {
            QExpr::Range(a)
        } else {
            empty(&b.name)
        }
    } else {
        QExpr::and(QExpr::Range(a), QExpr::Range(b))
    }
}

// Tighten dst's lower boundary with src's.
fn merge_lower(dst: &mut ContinuousRange, src: &ContinuousRange) {
    if dst.lower < src.lower {
        dst.left_op = src.left_op;
        dst.lower = src.lower;
    } else if dst.lower == src.lower
        && dst.left_op == CompOp::Le
        && src.left_op == CompOp::Lt
    {
        dst.left_op = CompOp::Lt;
    }
}

// Tighten dst's upper boundary with src's.
fn merge_upper(dst: &mut ContinuousRange, src: &ContinuousRange) {
    if dst.upper > src.upper {
        dst.right_op = src.right_op;
        dst.upper = src.upper;
    } else if dst.upper == src.upper
        && dst.right_op == CompOp::Le
        && src.right_op == CompOp::Lt
    {
        dst.right_op = CompOp::Lt;
    }
}

// Simplify an arithmetic comparison, constant-fold its terms, shift
// constants out of the compared expression and convert the
// `(variable, number)` shapes into a continuous range.
fn simplify_cmp(cr: CompRange) -> QExpr {
    let term1 = cr.term1.reduce();
    let term2 = cr.term2.reduce();
    let term3 = cr.term3.map(|t| t.reduce());
    let (op12, op23) = (cr.op12, cr.op23);

    // `a op (k ? x) op b`, three terms with a linear middle
    if let (Some(a), MathTerm::Op(op, kterm, rest), Some(t3)) =
        (term1.as_number(), &term2, &term3)
    {
        if let (Some(k), Some(name), Some(b)) =
            (kterm.as_number(), rest.as_variable(), t3.as_number())
        {
            match op {
                MathOp::Add => {
                    let range = ContinuousRange::new(a - k, op12, name, op23, b - k);
                    return QExpr::Range(range);
                }
                MathOp::Sub => {
                    let range = ContinuousRange::new(k - b, op23, name, op12, k - a);
                    return QExpr::Range(range);
                }
                MathOp::Mul if k > 0.0 => {
                    let range = ContinuousRange::new(a / k, op12, name, op23, b / k);
                    return QExpr::Range(range);
                }
                MathOp::Mul if k < 0.0 => {
                    let range = ContinuousRange::new(b / k, op23, name, op12, a / k);
                    return QExpr::Range(range);
                }
                _ => (),
            }
        }
    }

    // `k1 op (k2 ? t)` and mirrored shapes, two terms
    if term3.is_none() {
        if let (Some(a), MathTerm::Op(op, l, r)) = (term1.as_number(), &term2) {
            if let Some(k) = l.as_number() {
                let rest = r.as_ref().clone();
                match op {
                    MathOp::Add => {
                        return do_simplify(QExpr::Cmp(CompRange::new(
                            MathTerm::num(a - k),
                            op12,
                            rest,
                        )))
                    }
                    MathOp::Sub => {
                        return do_simplify(QExpr::Cmp(CompRange::new(
                            rest,
                            op12,
                            MathTerm::num(k - a),
                        )))
                    }
                    MathOp::Mul if k > 0.0 => {
                        return do_simplify(QExpr::Cmp(CompRange::new(
                            MathTerm::num(a / k),
                            op12,
                            rest,
                        )))
                    }
                    MathOp::Mul if k < 0.0 => {
                        return do_simplify(QExpr::Cmp(CompRange::new(
                            rest,
                            op12,
                            MathTerm::num(a / k),
                        )))
                    }
                    MathOp::Div if a != 0.0 => {
                        return do_simplify(QExpr::Cmp(CompRange::new(
                            rest,
                            op12,
                            MathTerm::num(k / a),
                        )))
                    }
                    _ => (),
                }
            } else if let Some(k) = r.as_number() {
                let rest = l.as_ref().clone();
                match op {
                    MathOp::Add => {
                        return do_simplify(QExpr::Cmp(CompRange::new(
                            MathTerm::num(a - k),
                            op12,
                            rest,
                        )))
                    }
                    MathOp::Sub => {
                        return do_simplify(QExpr::Cmp(CompRange::new(
                            MathTerm::num(a + k),
                            op12,
                            rest,
                        )))
                    }
                    MathOp::Mul if k > 0.0 => {
                        return do_simplify(QExpr::Cmp(CompRange::new(
                            MathTerm::num(a / k),
                            op12,
                            rest,
                        )))
                    }
                    MathOp::Mul if k < 0.0 => {
                        return do_simplify(QExpr::Cmp(CompRange::new(
                            rest,
                            op12,
                            MathTerm::num(a / k),
                        )))
                    }
                    MathOp::Div => {
                        return do_simplify(QExpr::Cmp(CompRange::new(
                            MathTerm::num(a * k),
                            op12,
                            rest,
                        )))
                    }
                    _ => (),
                }
            }
        } else if let (MathTerm::Op(op, l, r), Some(b)) = (&term1, term2.as_number()) {
            if let Some(k) = l.as_number() {
                let rest = r.as_ref().clone();
                match op {
                    MathOp::Add => {
                        return do_simplify(QExpr::Cmp(CompRange::new(
                            rest,
                            op12,
                            MathTerm::num(b - k),
                        )))
                    }
                    MathOp::Sub => {
                        return do_simplify(QExpr::Cmp(CompRange::new(
                            MathTerm::num(k - b),
                            op12,
                            rest,
                        )))
                    }
                    MathOp::Mul if k > 0.0 => {
                        return do_simplify(QExpr::Cmp(CompRange::new(
                            rest,
                            op12,
                            MathTerm::num(b / k),
                        )))
                    }
                    MathOp::Mul if k < 0.0 => {
                        return do_simplify(QExpr::Cmp(CompRange::new(
                            MathTerm::num(b / k),
                            op12,
                            rest,
                        )))
                    }
                    MathOp::Div if b > 0.0 => {
                        return do_simplify(QExpr::Cmp(CompRange::new(
                            MathTerm::num(k / b),
                            op12,
                            rest,
                        )))
                    }
                    _ => (),
                }
            }
        }
    }

    let cr = CompRange {
        term1,
        op12,
        term2,
        op23,
        term3,
    };
    match cr.is_simple_range() {
        true => match cr.to_simple_range() {
            Some(range) => QExpr::Range(range),
            None => QExpr::Cmp(cr),
        },
        false => QExpr::Cmp(cr),
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
