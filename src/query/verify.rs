//! Module `verify` implement name resolution of a parsed expression
//! tree against a partition schema.

use crate::{
    column::ColumnType,
    qexpr::{CompOp, CompRange, ContinuousRange, DiscreteRange, MathTerm, QExpr, StringEq},
    query::{Schema, SelectClause},
};

/// Walk the tree and resolve every column reference against `schema`.
///
/// A name that is not a column is looked up among the select-clause
/// aliases and the node rewritten to the alias's target, a real column
/// name, a constant, or a full arithmetic expression substituted in
/// place. `var1 = var2` with exactly one side naming a string column
/// is rewritten into string equality, the unquoted right hand side
/// treated as the literal. Range bounds on unsigned integer columns
/// are clamped at ZERO. Return the number of unresolved names.
pub fn verify(expr: &mut QExpr, schema: &dyn Schema, sel: Option<&SelectClause>) -> usize {
    match expr {
        QExpr::And(l, r) | QExpr::Or(l, r) | QExpr::Xor(l, r) | QExpr::Minus(l, r) => {
            verify(l, schema, sel) + verify(r, schema, sel)
        }
        QExpr::Not(e) => verify(e, schema, sel),
        QExpr::Range(_) => verify_range(expr, schema, sel),
        QExpr::Discrete(range) => match schema.column_type(&range.name) {
            Some(ColumnType::Float) => {
                // match the column's reduced precision
                for val in range.values.iter_mut() {
                    *val = *val as f32 as f64;
                }
                0
            }
            Some(_) => 0,
            None => missing(&range.name),
        },
        QExpr::StringEq(s) => match schema.column_type(&s.name) {
            Some(ct) if ct.is_string() => 0,
            Some(ct) => {
                log::warn!("string equality on {} typed {}", s.name, ct);
                0
            }
            None => missing(&s.name),
        },
        QExpr::Strings(ms) => match schema.column_type(&ms.name) {
            Some(_) => 0,
            None => missing(&ms.name),
        },
        QExpr::Like(like) => match schema.column_type(&like.name) {
            Some(_) => 0,
            None => missing(&like.name),
        },
        QExpr::Cmp(_) => verify_cmp(expr, schema, sel),
        QExpr::Join(join) => {
            let mut n = 0;
            if schema.column_type(&join.name1).is_none() {
                n += missing(&join.name1);
            }
            if schema.column_type(&join.name2).is_none() {
                n += missing(&join.name2);
            }
            if let Some(term) = join.range.as_mut() {
                n += verify_term(term, schema, sel);
            }
            n
        }
        QExpr::AnyAny(any) => {
            // expand against every column carrying the prefix
            let prefix = any.prefix.to_lowercase();
            let names: Vec<String> = schema
                .column_names()
                .into_iter()
                .filter(|name| name.to_lowercase().starts_with(&prefix))
                .collect();
            match names.split_first() {
                None => missing(&any.prefix),
                Some((first, rest)) => {
                    let values = any.values.clone();
                    let mut acc =
                        QExpr::Discrete(DiscreteRange::new(first, values.clone()));
                    for name in rest {
                        let d = QExpr::Discrete(DiscreteRange::new(name, values.clone()));
                        acc = QExpr::or(acc, d);
                    }
                    *expr = acc;
                    0
                }
            }
        }
    }
}

fn missing(name: &str) -> usize {
    log::warn!("data partition does not contain a column named {}", name);
    1
}

// continuous range, with alias fall-back
fn verify_range(expr: &mut QExpr, schema: &dyn Schema, sel: Option<&SelectClause>) -> usize {
    let range = match expr {
        QExpr::Range(range) => range,
        _ => unreachable!(),
    };
    if range.name.is_empty() {
        return 0;
    }

    if let Some(ct) = schema.column_type(&range.name) {
        if ct.is_unsigned() {
            standardize_range(range, None);
        }
        return 0;
    }

    let target = sel
        .and_then(|sel| sel.find(&range.name))
        .and_then(|i| sel.unwrap().term(i))
        .map(|st| st.term.clone());
    match target {
        Some(MathTerm::Variable(real)) => match schema.column_type(&real) {
            Some(ct) => {
                range.name = real;
                if ct.is_unsigned() {
                    standardize_range(range, None);
                }
                0
            }
            None => missing(&range.name),
        },
        Some(MathTerm::Number(_)) => 0,
        Some(MathTerm::Literal(real)) => match schema.column_type(&real) {
            Some(ct) => {
                range.name = real;
                if ct.is_unsigned() {
                    standardize_range(range, None);
                }
                0
            }
            None => missing(&range.name),
        },
        Some(term) => {
            // substitute the aliased expression back into a comparison
            let cr = match (range.left_op, range.right_op) {
                (CompOp::Undef, rop) => {
                    CompRange::new(term, rop, MathTerm::num(range.upper))
                }
                (lop, CompOp::Undef) => {
                    CompRange::new(MathTerm::num(range.lower), lop, term)
                }
                (lop, rop) => CompRange::between(
                    MathTerm::num(range.lower),
                    lop,
                    term,
                    rop,
                    MathTerm::num(range.upper),
                ),
            };
            *expr = QExpr::Cmp(cr);
            let n = verify(expr, schema, sel);
            expr.simplify();
            n
        }
        None => missing(&range.name),
    }
}

// arithmetic comparison, including the string-equality rewrite
fn verify_cmp(expr: &mut QExpr, schema: &dyn Schema, sel: Option<&SelectClause>) -> usize {
    let cr = match expr {
        QExpr::Cmp(cr) => cr,
        _ => unreachable!(),
    };

    if cr.maybe_string_compare() {
        let v1 = cr.term1.as_variable().unwrap().to_string();
        let v2 = cr.term2.as_variable().unwrap().to_string();
        let c1 = schema.column_type(&v1);
        let c2 = schema.column_type(&v2);
        return match (c1, c2) {
            (Some(_), Some(_)) => {
                verify_term(&mut cr.term1, schema, sel)
                    + verify_term(&mut cr.term2, schema, sel)
            }
            (Some(ct), None) if ct.is_string() => {
                log::debug!("replacing ({} = {}) with ({} = \"{}\")", v1, v2, v1, v2);
                *expr = QExpr::StringEq(StringEq::new(&v1, &v2));
                0
            }
            (Some(ct), None) => {
                log::warn!("expected column {} to be of string type, not {}", v1, ct);
                1
            }
            (None, Some(ct)) if ct.is_string() => {
                log::debug!("replacing ({} = {}) with ({} = \"{}\")", v1, v2, v2, v1);
                *expr = QExpr::StringEq(StringEq::new(&v2, &v1));
                0
            }
            (None, Some(ct)) => {
                log::warn!("expected column {} to be of string type, not {}", v2, ct);
                1
            }
            (None, None) => {
                log::warn!("neither {} nor {} are column names", v1, v2);
                2
            }
        };
    }

    let mut n = verify_term(&mut cr.term1, schema, sel);
    n += verify_term(&mut cr.term2, schema, sel);
    if let Some(t3) = cr.term3.as_mut() {
        n += verify_term(t3, schema, sel);
    }
    n
}

// resolve variables inside arithmetic, substituting aliases
fn verify_term(term: &mut MathTerm, schema: &dyn Schema, sel: Option<&SelectClause>) -> usize {
    match term {
        MathTerm::Number(_) | MathTerm::Literal(_) => 0,
        MathTerm::Variable(name) if name == "*" => 0,
        MathTerm::Variable(name) => {
            if schema.column_type(name).is_some() {
                return 0;
            }
            let target = sel
                .and_then(|sel| sel.find(name))
                .and_then(|i| sel.unwrap().term(i))
                .map(|st| st.term.clone());
            match target {
                Some(MathTerm::Variable(real)) if schema.column_type(&real).is_some() => {
                    *term = MathTerm::Variable(real);
                    0
                }
                Some(MathTerm::Variable(_)) => missing(name),
                Some(MathTerm::Number(val)) => {
                    *term = MathTerm::Number(val);
                    0
                }
                Some(MathTerm::Literal(real)) if schema.column_type(&real).is_some() => {
                    *term = MathTerm::Variable(real);
                    0
                }
                Some(sub) => {
                    *term = sub;
                    verify_term(term, schema, sel)
                }
                _ => missing(name),
            }
        }
        MathTerm::Neg(t) => verify_term(t, schema, sel),
        MathTerm::Op(_, l, r) => {
            verify_term(l, schema, sel) + verify_term(r, schema, sel)
        }
        MathTerm::Fun1(_, a) => verify_term(a, schema, sel),
        MathTerm::Fun2(_, a, b) => {
            verify_term(a, schema, sel) + verify_term(b, schema, sel)
        }
    }
}

/// Clamp negative query boundaries at ZERO for unsigned integer
/// columns, optionally renaming the column, `x >= -1` passes every
/// value while `x == -1` can match none.
pub fn standardize_range(range: &mut ContinuousRange, new_name: Option<&str>) {
    if range.lower < 0.0 {
        match range.left_op {
            CompOp::Lt | CompOp::Le => {
                range.left_op = CompOp::Le;
                range.lower = 0.0;
            }
            CompOp::Gt | CompOp::Ge => {
                range.left_op = CompOp::Gt;
                range.lower = 0.0;
            }
            CompOp::Eq => {
                // no unsigned value equals a negative number
                range.lower = 0.5;
            }
            CompOp::Undef => (),
        }
    }
    if range.upper < 0.0 {
        match range.right_op {
            CompOp::Lt | CompOp::Le => {
                range.right_op = CompOp::Lt;
                range.upper = 0.0;
            }
            CompOp::Gt | CompOp::Ge => {
                range.right_op = CompOp::Ge;
                range.upper = 0.0;
            }
            CompOp::Eq => {
                range.upper = 0.5;
            }
            CompOp::Undef => (),
        }
    }
    if let Some(name) = new_name {
        range.name = name.to_string();
    }
}

/// Derive implied range constraints from join predicates. For every
/// `join(a, b, delta)` along top-level ANDs, intersect the known
/// bounds of `a` with `[min(b)-delta, max(b)+delta]` and vice-versa,
/// tightening existing ranges or adding new conservative ones.
pub fn amplify(expr: &mut QExpr, schema: &dyn Schema) {
    let joins: Vec<(String, String, f64)> = expr
        .extract_joins()
        .into_iter()
        .filter_map(|j| {
            let delta = match &j.range {
                None => 0.0,
                Some(MathTerm::Number(val)) => *val,
                Some(_) => return None,
            };
            Some((j.name1.clone(), j.name2.clone(), delta))
        })
        .collect();
    if joins.is_empty() {
        return;
    }

    for (name1, name2, delta) in joins.into_iter() {
        let bounds1 = schema.column_bounds(&name1);
        let bounds2 = schema.column_bounds(&name2);
        let ((mut cmin1, mut cmax1), (mut cmin2, mut cmax2)) = match (bounds1, bounds2) {
            (Some(b1), Some(b2)) => (b1, b2),
            _ => continue,
        };

        if let Some(cur) = expr.find_range(&name1) {
            cmin1 = cmin1.max(cur.left_bound());
            cmax1 = cmax1.min(cur.right_bound());
        }
        if let Some(cur) = expr.find_range(&name2) {
            cmin2 = cmin2.max(cur.left_bound());
            cmax2 = cmax2.min(cur.right_bound());
        }

        if cmin1 < cmin2 - delta || cmax1 > cmax2 + delta {
            let bd1 = cmin1.max(cmin2 - delta);
            let bd2 = cmax1.min(cmax2 + delta);
            tighten(expr, &name1, bd1, bd2);
        }
        if cmin2 < cmin1 - delta || cmax2 > cmax1 + delta {
            let bd1 = cmin2.max(cmin1 - delta);
            let bd2 = cmax2.min(cmax1 + delta);
            tighten(expr, &name2, bd1, bd2);
        }
    }

    expr.simplify();
}

// restrict an existing range on `name`, or conjoin a new one
fn tighten(expr: &mut QExpr, name: &str, bd1: f64, bd2: f64) {
    match expr.find_range_mut(name) {
        Some(mut cur) => cur.restrict_range(bd1, bd2),
        None => {
            let range = ContinuousRange::new(bd1, CompOp::Le, name, CompOp::Le, bd2);
            let old = std::mem::replace(
                expr,
                QExpr::Range(ContinuousRange::empty_range("")),
            );
            *expr = QExpr::and(QExpr::Range(range), old);
        }
    }
}

#[cfg(test)]
#[path = "verify_test.rs"]
mod verify_test;
