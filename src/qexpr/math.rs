//! Module `math` implement the arithmetic terms that appear inside
//! comparison predicates and select expressions.

use std::{fmt, result};

use crate::{err_at, Error, Result};

/// Value resolution for variables during term evaluation.
///
/// Implemented by row cursors during scans and by plain maps in tests.
pub trait Scope {
    fn value(&self, name: &str) -> Option<f64>;
}

impl Scope for std::collections::HashMap<String, f64> {
    fn value(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
}

/// Binary arithmetic operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MathOp {
    BitOr,
    BitAnd,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl fmt::Display for MathOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        let s = match self {
            MathOp::BitOr => "|",
            MathOp::BitAnd => "&",
            MathOp::Add => "+",
            MathOp::Sub => "-",
            MathOp::Mul => "*",
            MathOp::Div => "/",
            MathOp::Rem => "%",
            MathOp::Pow => "^",
        };
        write!(f, "{}", s)
    }
}

impl MathOp {
    /// Whether operand order is irrelevant, such chains are linearized
    /// during reduction.
    pub fn is_commutative(&self) -> bool {
        matches!(
            self,
            MathOp::BitOr | MathOp::BitAnd | MathOp::Add | MathOp::Mul
        )
    }

    fn identity(&self) -> Option<f64> {
        match self {
            MathOp::Add => Some(0.0),
            MathOp::Mul => Some(1.0),
            _ => None,
        }
    }
}

/// One-argument standard functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StdFun1 {
    Acos,
    Asin,
    Atan,
    Ceil,
    Cos,
    Cosh,
    Exp,
    Fabs,
    Floor,
    Frexp,
    Log10,
    Log,
    Modf,
    Sin,
    Sinh,
    Sqrt,
    Tan,
    Tanh,
}

impl StdFun1 {
    pub fn from_name(name: &str) -> Result<StdFun1> {
        let fun = match name.to_lowercase().as_str() {
            "acos" => StdFun1::Acos,
            "asin" => StdFun1::Asin,
            "atan" => StdFun1::Atan,
            "ceil" => StdFun1::Ceil,
            "cos" => StdFun1::Cos,
            "cosh" => StdFun1::Cosh,
            "exp" => StdFun1::Exp,
            "fabs" | "abs" => StdFun1::Fabs,
            "floor" => StdFun1::Floor,
            "frexp" => StdFun1::Frexp,
            "log10" => StdFun1::Log10,
            "log" => StdFun1::Log,
            "modf" => StdFun1::Modf,
            "sin" => StdFun1::Sin,
            "sinh" => StdFun1::Sinh,
            "sqrt" => StdFun1::Sqrt,
            "tan" => StdFun1::Tan,
            "tanh" => StdFun1::Tanh,
            _ => err_at!(ParseFail, msg: "unknown function {}", name)?,
        };
        Ok(fun)
    }

    pub fn to_name(&self) -> &'static str {
        match self {
            StdFun1::Acos => "acos",
            StdFun1::Asin => "asin",
            StdFun1::Atan => "atan",
            StdFun1::Ceil => "ceil",
            StdFun1::Cos => "cos",
            StdFun1::Cosh => "cosh",
            StdFun1::Exp => "exp",
            StdFun1::Fabs => "fabs",
            StdFun1::Floor => "floor",
            StdFun1::Frexp => "frexp",
            StdFun1::Log10 => "log10",
            StdFun1::Log => "log",
            StdFun1::Modf => "modf",
            StdFun1::Sin => "sin",
            StdFun1::Sinh => "sinh",
            StdFun1::Sqrt => "sqrt",
            StdFun1::Tan => "tan",
            StdFun1::Tanh => "tanh",
        }
    }

    pub fn apply(&self, arg: f64) -> f64 {
        match self {
            StdFun1::Acos => arg.acos(),
            StdFun1::Asin => arg.asin(),
            StdFun1::Atan => arg.atan(),
            StdFun1::Ceil => arg.ceil(),
            StdFun1::Cos => arg.cos(),
            StdFun1::Cosh => arg.cosh(),
            StdFun1::Exp => arg.exp(),
            StdFun1::Fabs => arg.abs(),
            StdFun1::Floor => arg.floor(),
            StdFun1::Frexp => frexp_mantissa(arg),
            StdFun1::Log10 => arg.log10(),
            StdFun1::Log => arg.ln(),
            StdFun1::Modf => arg.fract(),
            StdFun1::Sin => arg.sin(),
            StdFun1::Sinh => arg.sinh(),
            StdFun1::Sqrt => arg.sqrt(),
            StdFun1::Tan => arg.tan(),
            StdFun1::Tanh => arg.tanh(),
        }
    }

    // Inverse-function pairs that cancel when composed.
    fn inverse(&self) -> Option<StdFun1> {
        match self {
            StdFun1::Acos => Some(StdFun1::Cos),
            StdFun1::Cos => Some(StdFun1::Acos),
            StdFun1::Asin => Some(StdFun1::Sin),
            StdFun1::Sin => Some(StdFun1::Asin),
            StdFun1::Atan => Some(StdFun1::Tan),
            StdFun1::Tan => Some(StdFun1::Atan),
            StdFun1::Exp => Some(StdFun1::Log),
            StdFun1::Log => Some(StdFun1::Exp),
            _ => None,
        }
    }
}

// Mantissa part of frexp(3), the return value of the C function.
fn frexp_mantissa(arg: f64) -> f64 {
    if arg == 0.0 || !arg.is_finite() {
        arg
    } else {
        let exp = arg.abs().log2().floor() as i32 + 1;
        arg / (2f64).powi(exp)
    }
}

/// Two-argument standard functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StdFun2 {
    Atan2,
    Fmod,
    Ldexp,
    Pow,
}

impl StdFun2 {
    pub fn from_name(name: &str) -> Result<StdFun2> {
        let fun = match name.to_lowercase().as_str() {
            "atan2" => StdFun2::Atan2,
            "fmod" => StdFun2::Fmod,
            "ldexp" => StdFun2::Ldexp,
            "pow" | "power" => StdFun2::Pow,
            _ => err_at!(ParseFail, msg: "unknown function {}", name)?,
        };
        Ok(fun)
    }

    pub fn to_name(&self) -> &'static str {
        match self {
            StdFun2::Atan2 => "atan2",
            StdFun2::Fmod => "fmod",
            StdFun2::Ldexp => "ldexp",
            StdFun2::Pow => "pow",
        }
    }

    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            StdFun2::Atan2 => a.atan2(b),
            StdFun2::Fmod => a % b,
            StdFun2::Ldexp => a * (2f64).powi(b as i32),
            StdFun2::Pow => a.powf(b),
        }
    }
}

/// MathTerm type, the arithmetic sub-tree of a query expression.
#[derive(Clone, Debug, PartialEq)]
pub enum MathTerm {
    /// A column name, or a select-clause alias until verification
    /// substitutes it.
    Variable(String),
    /// A numeric constant, all arithmetic is carried out in f64.
    Number(f64),
    /// A string literal, meaningful only in equality context.
    Literal(String),
    /// Unary negation.
    Neg(Box<MathTerm>),
    /// Binary operator.
    Op(MathOp, Box<MathTerm>, Box<MathTerm>),
    /// One-argument standard function.
    Fun1(StdFun1, Box<MathTerm>),
    /// Two-argument standard function.
    Fun2(StdFun2, Box<MathTerm>, Box<MathTerm>),
}

impl fmt::Display for MathTerm {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self {
            MathTerm::Variable(name) => write!(f, "{}", name),
            MathTerm::Number(val) => write!(f, "{}", val),
            MathTerm::Literal(s) => write!(f, "\"{}\"", s),
            MathTerm::Neg(t) => write!(f, "-({})", t),
            MathTerm::Op(op, l, r) => write!(f, "({} {} {})", l, op, r),
            MathTerm::Fun1(fun, a) => write!(f, "{}({})", fun.to_name(), a),
            MathTerm::Fun2(fun, a, b) => write!(f, "{}({}, {})", fun.to_name(), a, b),
        }
    }
}

impl MathTerm {
    pub fn num(val: f64) -> MathTerm {
        MathTerm::Number(val)
    }

    pub fn var(name: &str) -> MathTerm {
        MathTerm::Variable(name.to_string())
    }

    pub fn is_number(&self) -> bool {
        matches!(self, MathTerm::Number(_))
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, MathTerm::Variable(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            MathTerm::Number(val) => Some(*val),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<&str> {
        match self {
            MathTerm::Variable(name) => Some(name),
            _ => None,
        }
    }

    /// Collect every variable name in the term, depth first.
    pub fn variables(&self, out: &mut Vec<String>) {
        match self {
            MathTerm::Variable(name) => {
                if !out.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                    out.push(name.clone())
                }
            }
            MathTerm::Number(_) | MathTerm::Literal(_) => (),
            MathTerm::Neg(t) => t.variables(out),
            MathTerm::Op(_, l, r) => {
                l.variables(out);
                r.variables(out);
            }
            MathTerm::Fun1(_, a) => a.variables(out),
            MathTerm::Fun2(_, a, b) => {
                a.variables(out);
                b.variables(out);
            }
        }
    }

    /// Evaluate the term against `scope`. Unresolvable variables
    /// evaluate to f64::MAX, string literals to ZERO.
    pub fn eval(&self, scope: &dyn Scope) -> f64 {
        match self {
            MathTerm::Variable(name) => scope.value(name).unwrap_or(f64::MAX),
            MathTerm::Number(val) => *val,
            MathTerm::Literal(_) => 0.0,
            MathTerm::Neg(t) => -t.eval(scope),
            MathTerm::Op(op, l, r) => apply_op(*op, l.eval(scope), r.eval(scope)),
            MathTerm::Fun1(fun, a) => fun.apply(a.eval(scope)),
            MathTerm::Fun2(fun, a, b) => fun.apply(a.eval(scope), b.eval(scope)),
        }
    }

    /// Shorten the term by evaluating constant sub-trees, cancelling
    /// inverse function compositions and folding constants across
    /// commutative operator chains.
    pub fn reduce(self) -> MathTerm {
        match self {
            term @ MathTerm::Variable(_)
            | term @ MathTerm::Number(_)
            | term @ MathTerm::Literal(_) => term,
            MathTerm::Neg(t) => match t.reduce() {
                MathTerm::Number(val) => MathTerm::Number(-val),
                t => MathTerm::Neg(Box::new(t)),
            },
            MathTerm::Op(op, l, r) => reduce_op(op, l.reduce(), r.reduce()),
            MathTerm::Fun1(fun, a) => match a.reduce() {
                MathTerm::Number(val) => MathTerm::Number(fun.apply(val)),
                MathTerm::Fun1(inner, arg) if fun.inverse() == Some(inner) => *arg,
                a => MathTerm::Fun1(fun, Box::new(a)),
            },
            MathTerm::Fun2(fun, a, b) => match (a.reduce(), b.reduce()) {
                (MathTerm::Number(x), MathTerm::Number(y)) => {
                    MathTerm::Number(fun.apply(x, y))
                }
                (a, b) => MathTerm::Fun2(fun, Box::new(a), Box::new(b)),
            },
        }
    }
}

// Reduce a binary operator node whose operands are already reduced.
fn reduce_op(op: MathOp, lhs: MathTerm, rhs: MathTerm) -> MathTerm {
    // `t - k` becomes `t + (-k)`, `t / k` becomes `t * (1/k)`, so that
    // the commutative folding below sees them.
    match (op, &rhs) {
        (MathOp::Sub, MathTerm::Number(k)) => {
            return reduce_op(MathOp::Add, lhs, MathTerm::Number(-k))
        }
        (MathOp::Div, MathTerm::Number(k)) if *k != 0.0 => {
            return reduce_op(MathOp::Mul, lhs, MathTerm::Number(1.0 / k))
        }
        _ => (),
    }

    if op.is_commutative() {
        return reduce_linear(op, lhs, rhs);
    }

    match (op, lhs, rhs) {
        (op, MathTerm::Number(a), MathTerm::Number(b)) => {
            MathTerm::Number(apply_op(op, a, b))
        }
        // x - x cancels
        (MathOp::Sub, MathTerm::Variable(a), MathTerm::Variable(b))
            if a.eq_ignore_ascii_case(&b) =>
        {
            MathTerm::Number(0.0)
        }
        // 0 / x is ZERO
        (MathOp::Div, MathTerm::Number(a), _) if a == 0.0 => MathTerm::Number(0.0),
        // x ^ 0 is ONE, 0 ^ x is ZERO
        (MathOp::Pow, _, MathTerm::Number(b)) if b == 0.0 => MathTerm::Number(1.0),
        (MathOp::Pow, MathTerm::Number(a), _) if a == 0.0 => MathTerm::Number(0.0),
        (op, lhs, rhs) => MathTerm::Op(op, Box::new(lhs), Box::new(rhs)),
    }
}

fn apply_op(op: MathOp, a: f64, b: f64) -> f64 {
    match op {
        MathOp::BitOr => ((a as u64) | (b as u64)) as f64,
        MathOp::BitAnd => ((a as u64) & (b as u64)) as f64,
        MathOp::Add => a + b,
        MathOp::Sub => a - b,
        MathOp::Mul => a * b,
        MathOp::Div => a / b,
        MathOp::Rem => a % b,
        MathOp::Pow => a.powf(b),
    }
}

// Flatten a commutative operator chain, fold all numeric members into
// one constant and rebuild with the constant in evaluation-first
// position, `k + (a + x)` becomes `(k+a) + x`.
fn reduce_linear(op: MathOp, lhs: MathTerm, rhs: MathTerm) -> MathTerm {
    let mut terms = vec![];
    linearize(op, lhs, &mut terms);
    linearize(op, rhs, &mut terms);

    let mut constant: Option<f64> = None;
    let mut rest: Vec<MathTerm> = vec![];
    for term in terms.into_iter() {
        match term {
            MathTerm::Number(val) => {
                constant = Some(match (constant, op) {
                    (None, _) => val,
                    (Some(acc), MathOp::Add) => acc + val,
                    (Some(acc), MathOp::Mul) => acc * val,
                    (Some(acc), MathOp::BitOr) => ((acc as u64) | (val as u64)) as f64,
                    (Some(acc), MathOp::BitAnd) => ((acc as u64) & (val as u64)) as f64,
                    _ => unreachable!(),
                });
            }
            term => rest.push(term),
        }
    }

    // absorbing and identity constants
    if op == MathOp::Mul && constant == Some(0.0) {
        return MathTerm::Number(0.0);
    }
    let constant = match constant {
        Some(k) if op.identity() == Some(k) => None,
        c => c,
    };

    // x + x is 2 * x
    if op == MathOp::Add && rest.len() == 2 {
        if let (Some(a), Some(b)) = (rest[0].as_variable(), rest[1].as_variable()) {
            if a.eq_ignore_ascii_case(b) {
                let two_x = MathTerm::Op(
                    MathOp::Mul,
                    Box::new(MathTerm::num(2.0)),
                    Box::new(rest.pop().unwrap()),
                );
                rest.clear();
                rest.push(two_x);
            }
        }
    }

    let mut iter = rest.into_iter();
    let chain = match iter.next() {
        Some(first) => {
            let mut acc = first;
            for term in iter {
                acc = MathTerm::Op(op, Box::new(acc), Box::new(term));
            }
            Some(acc)
        }
        None => None,
    };

    match (constant, chain) {
        (Some(k), Some(chain)) => {
            MathTerm::Op(op, Box::new(MathTerm::num(k)), Box::new(chain))
        }
        (Some(k), None) => MathTerm::Number(k),
        (None, Some(chain)) => chain,
        (None, None) => MathTerm::Number(op.identity().unwrap_or(0.0)),
    }
}

fn linearize(op: MathOp, term: MathTerm, out: &mut Vec<MathTerm>) {
    match term {
        MathTerm::Op(o, l, r) if o == op => {
            linearize(op, *l, out);
            linearize(op, *r, out);
        }
        term => out.push(term),
    }
}

#[cfg(test)]
#[path = "math_test.rs"]
mod math_test;
