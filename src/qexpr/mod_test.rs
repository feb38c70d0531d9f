use super::*;

fn range(lower: f64, lop: CompOp, name: &str, rop: CompOp, upper: f64) -> QExpr {
    QExpr::Range(ContinuousRange::new(lower, lop, name, rop, upper))
}

fn one_sided(name: &str, op: CompOp, bound: f64) -> QExpr {
    QExpr::Range(ContinuousRange::one_sided(name, op, bound))
}

#[test]
fn test_simplify_two_sided_merge() {
    // (x > 3 AND x <= 10) AND (x >= 5 AND x < 20)
    let lhs = QExpr::and(
        one_sided("x", CompOp::Gt, 3.0),
        one_sided("x", CompOp::Le, 10.0),
    );
    let rhs = QExpr::and(
        one_sided("x", CompOp::Ge, 5.0),
        one_sided("x", CompOp::Lt, 20.0),
    );
    let mut expr = QExpr::and(lhs, rhs);
    expr.simplify();

    match expr {
        QExpr::Range(r) => {
            assert_eq!(r.lower, 5.0);
            assert_eq!(r.left_op, CompOp::Le);
            assert_eq!(r.upper, 10.0);
            assert_eq!(r.right_op, CompOp::Le);
        }
        expr => panic!("expected merged range, got {}", expr),
    }
}

#[test]
fn test_simplify_strict_bound_wins() {
    // x <= 10 AND x < 10 tightens to x < 10
    let mut expr = QExpr::and(
        range(0.0, CompOp::Le, "x", CompOp::Le, 10.0),
        range(0.0, CompOp::Le, "x", CompOp::Lt, 10.0),
    );
    expr.simplify();
    match expr {
        QExpr::Range(r) => {
            assert_eq!(r.upper, 10.0);
            assert_eq!(r.right_op, CompOp::Lt);
        }
        expr => panic!("expected range, got {}", expr),
    }
}

#[test]
fn test_simplify_empty_and() {
    // (x > 5 AND x < 3) AND (y = 7) collapses to an empty range
    let lhs = QExpr::and(
        one_sided("x", CompOp::Gt, 5.0),
        one_sided("x", CompOp::Lt, 3.0),
    );
    let rhs = one_sided("y", CompOp::Eq, 7.0);
    let mut expr = QExpr::and(lhs, rhs);
    expr.simplify();

    match expr {
        QExpr::Range(r) => assert!(r.is_empty(), "{}", r),
        expr => panic!("expected empty range, got {}", expr),
    }
}

#[test]
fn test_simplify_equality_cases() {
    // equality inside the range keeps the equality
    let mut expr = QExpr::and(
        range(0.0, CompOp::Le, "x", CompOp::Le, 10.0),
        one_sided("x", CompOp::Eq, 7.0),
    );
    expr.simplify();
    match expr {
        QExpr::Range(r) => {
            assert_eq!(r.left_op, CompOp::Eq);
            assert_eq!(r.lower, 7.0);
        }
        expr => panic!("expected equality, got {}", expr),
    }

    // equality outside the range is empty
    let mut expr = QExpr::and(
        range(0.0, CompOp::Le, "x", CompOp::Le, 10.0),
        one_sided("x", CompOp::Eq, 70.0),
    );
    expr.simplify();
    match expr {
        QExpr::Range(r) => assert!(r.is_empty()),
        expr => panic!("expected empty range, got {}", expr),
    }

    // equality against equality
    let mut expr = QExpr::and(
        one_sided("x", CompOp::Eq, 7.0),
        one_sided("x", CompOp::Eq, 7.0),
    );
    expr.simplify();
    match &expr {
        QExpr::Range(r) => assert!(!r.is_empty()),
        expr => panic!("expected range, got {}", expr),
    }

    let mut expr = QExpr::and(
        one_sided("x", CompOp::Eq, 7.0),
        one_sided("x", CompOp::Eq, 8.0),
    );
    expr.simplify();
    match &expr {
        QExpr::Range(r) => assert!(r.is_empty()),
        expr => panic!("expected empty range, got {}", expr),
    }
}

#[test]
fn test_simplify_or_drops_empty() {
    let mut expr = QExpr::or(
        QExpr::Range(ContinuousRange::empty_range("x")),
        one_sided("y", CompOp::Lt, 3.0),
    );
    expr.simplify();
    match expr {
        QExpr::Range(r) => assert_eq!(r.name, "y"),
        expr => panic!("expected y range, got {}", expr),
    }

    // minus with an empty right child keeps the left
    let mut expr = QExpr::minus(
        one_sided("y", CompOp::Lt, 3.0),
        QExpr::Range(ContinuousRange::empty_range("x")),
    );
    expr.simplify();
    match expr {
        QExpr::Range(r) => assert_eq!(r.name, "y"),
        expr => panic!("expected y range, got {}", expr),
    }
}

#[test]
fn test_simplify_multi_string() {
    let ms = MultiString::new("s", vec!["b".to_string(), "a".to_string()]);
    let mut expr = QExpr::Strings(ms);
    expr.simplify();
    match expr {
        QExpr::Or(l, r) => {
            assert_eq!(*l, QExpr::StringEq(StringEq::new("s", "a")));
            assert_eq!(*r, QExpr::StringEq(StringEq::new("s", "b")));
        }
        expr => panic!("expected OR cascade, got {}", expr),
    }

    // a single member becomes plain equality
    let mut expr = QExpr::Strings(MultiString::new("s", vec!["a".to_string()]));
    expr.simplify();
    assert_eq!(expr, QExpr::StringEq(StringEq::new("s", "a")));
}

#[test]
fn test_simplify_comp_range() {
    // 2 < (3 + x) < 10 becomes -1 < x < 7
    let term2 = MathTerm::Op(
        MathOp::Add,
        Box::new(MathTerm::num(3.0)),
        Box::new(MathTerm::var("x")),
    );
    let cr = CompRange::between(
        MathTerm::num(2.0),
        CompOp::Lt,
        term2,
        CompOp::Lt,
        MathTerm::num(10.0),
    );
    let mut expr = QExpr::Cmp(cr);
    expr.simplify();
    match expr {
        QExpr::Range(r) => {
            assert_eq!(r.lower, -1.0);
            assert_eq!(r.upper, 7.0);
            assert_eq!(r.left_op, CompOp::Lt);
            assert_eq!(r.right_op, CompOp::Lt);
        }
        expr => panic!("expected range, got {}", expr),
    }

    // (2 * x) < 10 becomes x < 5
    let term1 = MathTerm::Op(
        MathOp::Mul,
        Box::new(MathTerm::num(2.0)),
        Box::new(MathTerm::var("x")),
    );
    let mut expr = QExpr::Cmp(CompRange::new(term1, CompOp::Lt, MathTerm::num(10.0)));
    expr.simplify();
    match expr {
        QExpr::Range(r) => {
            assert!(r.in_range(4.9));
            assert!(!r.in_range(5.0));
        }
        expr => panic!("expected range, got {}", expr),
    }

    // negative factor swaps the direction, (-2 * x) < 10 is x > -5
    let term1 = MathTerm::Op(
        MathOp::Mul,
        Box::new(MathTerm::num(-2.0)),
        Box::new(MathTerm::var("x")),
    );
    let mut expr = QExpr::Cmp(CompRange::new(term1, CompOp::Lt, MathTerm::num(10.0)));
    expr.simplify();
    match expr {
        QExpr::Range(r) => {
            assert!(r.in_range(0.0));
            assert!(!r.in_range(-6.0));
        }
        expr => panic!("expected range, got {}", expr),
    }
}

#[test]
fn test_simplify_idempotent() {
    let lhs = QExpr::and(
        one_sided("x", CompOp::Gt, 3.0),
        one_sided("x", CompOp::Le, 10.0),
    );
    let rhs = QExpr::Strings(MultiString::new(
        "s",
        vec!["a".to_string(), "b".to_string()],
    ));
    let mut once = QExpr::and(lhs, rhs);
    once.simplify();
    let mut twice = once.clone();
    twice.simplify();
    assert_eq!(once, twice);
}

#[test]
fn test_reorder() {
    // weight by name, ranges are cheap
    let wt = |e: &QExpr| -> f64 {
        match e {
            QExpr::Range(_) => 1.0,
            _ => 5.0,
        }
    };

    let cmp = QExpr::Cmp(CompRange::new(
        MathTerm::var("x"),
        CompOp::Lt,
        MathTerm::var("y"),
    ));
    let mut expr = QExpr::and(cmp.clone(), one_sided("a", CompOp::Lt, 1.0));
    let total = expr.reorder(&wt);
    assert_eq!(total, 6.0);

    // the cheap range moves to the evaluated-first position
    match expr {
        QExpr::And(l, r) => {
            assert!(matches!(*l, QExpr::Range(_)));
            assert_eq!(*r, cmp);
        }
        expr => panic!("expected AND, got {}", expr),
    }
}

#[test]
fn test_reorder_chain() {
    let wt = |e: &QExpr| -> f64 {
        match e {
            QExpr::Range(r) => r.upper,
            _ => 100.0,
        }
    };

    let expr3 = one_sided("a", CompOp::Lt, 3.0);
    let expr1 = one_sided("b", CompOp::Lt, 1.0);
    let expr2 = one_sided("c", CompOp::Lt, 2.0);
    let mut expr = QExpr::and(QExpr::and(expr3, expr1), expr2);
    let total = expr.reorder(&wt);
    assert_eq!(total, 6.0);

    // in-order traversal meets b, c, a
    match expr {
        QExpr::And(l, r) => {
            match *l {
                QExpr::And(ll, lr) => {
                    assert_eq!(*ll, one_sided("b", CompOp::Lt, 1.0));
                    assert_eq!(*lr, one_sided("c", CompOp::Lt, 2.0));
                }
                l => panic!("expected AND, got {}", l),
            }
            assert_eq!(*r, one_sided("a", CompOp::Lt, 3.0));
        }
        expr => panic!("expected AND, got {}", expr),
    }
}

#[test]
fn test_separate_simple() {
    let simple1 = one_sided("a", CompOp::Lt, 1.0);
    let simple2 = one_sided("b", CompOp::Gt, 2.0);
    let complex = QExpr::Join(JoinExpr::new("a", "b", None));

    // all simple
    let expr = QExpr::and(simple1.clone(), simple2.clone());
    let (s, c) = expr.separate_simple();
    assert_eq!(s, Some(expr.clone()));
    assert!(c.is_none());

    // all complex
    let (s, c) = complex.separate_simple();
    assert!(s.is_none());
    assert_eq!(c, Some(complex.clone()));

    // mixed
    let expr = QExpr::and(QExpr::and(simple1.clone(), complex.clone()), simple2.clone());
    let (s, c) = expr.separate_simple();
    assert_eq!(s, Some(QExpr::and(simple1, simple2)));
    assert_eq!(c, Some(complex));
}

#[test]
fn test_extract_joins_and_find_range() {
    let join = JoinExpr::new("a.x", "b.y", Some(MathTerm::num(1.0)));
    let expr = QExpr::and(
        QExpr::Join(join.clone()),
        QExpr::and(
            one_sided("a.x", CompOp::Lt, 9.0),
            QExpr::Discrete(DiscreteRange::new("z", vec![1.0])),
        ),
    );

    let joins = expr.extract_joins();
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0], &join);
    assert!(expr.has_join());

    let r = expr.find_range("A.X").unwrap();
    assert_eq!(r.right_bound(), 9.0);
    let r = expr.find_range("z").unwrap();
    assert_eq!(r.left_bound(), 1.0);
    assert!(expr.find_range("nosuch").is_none());

    // joins are not found below OR
    let expr = QExpr::or(QExpr::Join(join), one_sided("q", CompOp::Lt, 1.0));
    assert!(expr.extract_joins().is_empty());
    assert!(expr.has_join());
}

#[test]
fn test_not_not_cancels() {
    let inner = one_sided("x", CompOp::Lt, 5.0);
    let expr = QExpr::not(QExpr::not(inner.clone()));
    assert_eq!(expr, inner);
}
