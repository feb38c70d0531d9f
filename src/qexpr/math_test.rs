use std::collections::HashMap;

use super::*;

fn num(v: f64) -> MathTerm {
    MathTerm::num(v)
}

fn var(n: &str) -> MathTerm {
    MathTerm::var(n)
}

fn add(l: MathTerm, r: MathTerm) -> MathTerm {
    MathTerm::Op(MathOp::Add, Box::new(l), Box::new(r))
}

fn mul(l: MathTerm, r: MathTerm) -> MathTerm {
    MathTerm::Op(MathOp::Mul, Box::new(l), Box::new(r))
}

#[test]
fn test_math_eval() {
    let mut scope = HashMap::new();
    scope.insert("x".to_string(), 4.0);
    scope.insert("y".to_string(), 3.0);

    let t = add(var("x"), mul(num(2.0), var("y")));
    assert_eq!(t.eval(&scope), 10.0);

    let t = MathTerm::Op(MathOp::Pow, Box::new(var("x")), Box::new(num(2.0)));
    assert_eq!(t.eval(&scope), 16.0);

    let t = MathTerm::Fun2(StdFun2::Pow, Box::new(var("y")), Box::new(num(2.0)));
    assert_eq!(t.eval(&scope), 9.0);

    let t = MathTerm::Neg(Box::new(var("y")));
    assert_eq!(t.eval(&scope), -3.0);

    // unresolvable variables evaluate to f64::MAX
    assert_eq!(var("zz").eval(&scope), f64::MAX);
}

#[test]
fn test_math_constant_fold() {
    let t = add(num(2.0), num(3.0)).reduce();
    assert_eq!(t, num(5.0));

    let t = MathTerm::Fun1(StdFun1::Sqrt, Box::new(num(9.0))).reduce();
    assert_eq!(t, num(3.0));

    let t = MathTerm::Fun2(StdFun2::Pow, Box::new(num(2.0)), Box::new(num(10.0))).reduce();
    assert_eq!(t, num(1024.0));

    let t = MathTerm::Neg(Box::new(num(7.0))).reduce();
    assert_eq!(t, num(-7.0));
}

#[test]
fn test_math_linear_chain() {
    // k + (a + x) folds the constants to the front
    let t = add(num(2.0), add(num(3.0), var("x"))).reduce();
    assert_eq!(t, add(num(5.0), var("x")));

    // 2 * (3 * x) likewise
    let t = mul(num(2.0), mul(num(3.0), var("x"))).reduce();
    assert_eq!(t, mul(num(6.0), var("x")));

    // identities fall away
    assert_eq!(add(var("x"), num(0.0)).reduce(), var("x"));
    assert_eq!(mul(num(1.0), var("x")).reduce(), var("x"));
    assert_eq!(mul(var("x"), num(0.0)).reduce(), num(0.0));

    // subtraction and division against constants convert
    let t = MathTerm::Op(MathOp::Sub, Box::new(var("x")), Box::new(num(3.0))).reduce();
    assert_eq!(t, add(num(-3.0), var("x")));

    let t = MathTerm::Op(MathOp::Div, Box::new(var("x")), Box::new(num(4.0))).reduce();
    assert_eq!(t, mul(num(0.25), var("x")));
}

#[test]
fn test_math_same_variable() {
    let t = add(var("x"), var("x")).reduce();
    assert_eq!(t, mul(num(2.0), var("x")));

    let t = MathTerm::Op(MathOp::Sub, Box::new(var("x")), Box::new(var("x"))).reduce();
    assert_eq!(t, num(0.0));
}

#[test]
fn test_math_inverse_cancel() {
    for (f, g) in [
        (StdFun1::Exp, StdFun1::Log),
        (StdFun1::Log, StdFun1::Exp),
        (StdFun1::Asin, StdFun1::Sin),
        (StdFun1::Acos, StdFun1::Cos),
        (StdFun1::Atan, StdFun1::Tan),
    ]
    .iter()
    {
        let inner = MathTerm::Fun1(*g, Box::new(var("x")));
        let t = MathTerm::Fun1(*f, Box::new(inner)).reduce();
        assert_eq!(t, var("x"), "{:?} {:?}", f, g);
    }

    // no cancellation across unrelated functions
    let inner = MathTerm::Fun1(StdFun1::Sin, Box::new(var("x")));
    let t = MathTerm::Fun1(StdFun1::Cos, Box::new(inner.clone())).reduce();
    assert_eq!(t, MathTerm::Fun1(StdFun1::Cos, Box::new(inner)));
}

#[test]
fn test_math_pow_identities() {
    let t = MathTerm::Op(MathOp::Pow, Box::new(var("x")), Box::new(num(0.0))).reduce();
    assert_eq!(t, num(1.0));

    let t = MathTerm::Op(MathOp::Pow, Box::new(num(0.0)), Box::new(var("x"))).reduce();
    assert_eq!(t, num(0.0));
}

#[test]
fn test_math_function_names() {
    assert_eq!(StdFun1::from_name("SQRT").unwrap(), StdFun1::Sqrt);
    assert_eq!(StdFun1::from_name("abs").unwrap(), StdFun1::Fabs);
    assert!(StdFun1::from_name("nosuch").is_err());

    assert_eq!(StdFun2::from_name("power").unwrap(), StdFun2::Pow);
    assert!(StdFun2::from_name("nosuch").is_err());
}

#[test]
fn test_math_variables() {
    let t = add(var("x"), mul(var("Y"), add(var("x"), var("z"))));
    let mut names = vec![];
    t.variables(&mut names);
    assert_eq!(names, vec!["x".to_string(), "Y".to_string(), "z".to_string()]);
}

#[test]
fn test_math_print() {
    let t = add(num(2.0), var("x"));
    assert_eq!(t.to_string(), "(2 + x)");
    let t = MathTerm::Fun1(StdFun1::Sqrt, Box::new(var("x")));
    assert_eq!(t.to_string(), "sqrt(x)");
    let t = MathTerm::Literal("joe".to_string());
    assert_eq!(t.to_string(), "\"joe\"");
}
