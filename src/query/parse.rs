//! Module `parse` implement recursive-descent parsers for the three
//! clause grammars.

use crate::{
    err_at,
    qexpr::{
        AnyAny, CompOp, CompRange, DiscreteRange, JoinExpr, LikeExpr, MathOp, MathTerm,
        MultiString, QExpr, StdFun1, StdFun2, StringEq,
    },
    query::{
        lex::{Keyword, Lex, Token},
        Aggregator, FromClause, SelectClause, SelectTerm,
    },
    Error, Result,
};

pub fn parse_where(clause: &str) -> Result<QExpr> {
    let mut p = P::new(clause)?;
    let expr = p.or_expr()?;
    p.expect_eof()?;
    Ok(expr)
}

pub fn parse_select(clause: &str) -> Result<SelectClause> {
    let mut p = P::new(clause)?;
    let mut terms = vec![p.select_term()?];
    while p.eat(&Token::Comma) {
        terms.push(p.select_term()?);
    }
    p.expect_eof()?;
    Ok(SelectClause::from_terms(terms))
}

pub fn parse_from(clause: &str) -> Result<FromClause> {
    let mut p = P::new(clause)?;
    let (mut names, mut aliases) = (vec![], vec![]);

    let (name, alias) = p.from_entry()?;
    names.push(name);
    aliases.push(alias);

    let mut jcond = None;
    if p.eat_kw(Keyword::Join) {
        let (name, alias) = p.from_entry()?;
        names.push(name);
        aliases.push(alias);

        if p.eat_kw(Keyword::On) {
            jcond = Some(p.comparison()?);
        } else if p.eat_kw(Keyword::Using) {
            p.expect(&Token::LParen)?;
            let col = p.ident()?;
            p.expect(&Token::RParen)?;
            let q = |i: usize, names: &[String], aliases: &[Option<String>]| {
                let t = aliases[i].as_ref().unwrap_or(&names[i]);
                format!("{}.{}", t, col)
            };
            let t1 = MathTerm::var(&q(0, &names, &aliases));
            let t2 = MathTerm::var(&q(1, &names, &aliases));
            jcond = Some(CompRange::between(t1, CompOp::Eq, t2, CompOp::Undef, MathTerm::var(&col)));
        }
    } else {
        while p.eat(&Token::Comma) {
            let (name, alias) = p.from_entry()?;
            names.push(name);
            aliases.push(alias);
        }
    }
    p.expect_eof()?;
    Ok(FromClause::new(names, aliases, jcond))
}

struct P {
    toks: Vec<Token>,
    off: usize,
}

impl P {
    fn new(clause: &str) -> Result<P> {
        let toks = Lex::new(clause).tokenize()?;
        Ok(P { toks, off: 0 })
    }

    fn peek(&self) -> Option<&Token> {
        self.toks.get(self.off)
    }

    fn peek2(&self) -> Option<&Token> {
        self.toks.get(self.off + 1)
    }

    fn next(&mut self) -> Result<Token> {
        match self.toks.get(self.off) {
            Some(tok) => {
                self.off += 1;
                Ok(tok.clone())
            }
            None => err_at!(ParseFail, msg: "unexpected end of clause"),
        }
    }

    fn eat(&mut self, tok: &Token) -> bool {
        match self.peek() {
            Some(t) if t == tok => {
                self.off += 1;
                true
            }
            _ => false,
        }
    }

    fn eat_kw(&mut self, kw: Keyword) -> bool {
        self.eat(&Token::Kw(kw))
    }

    fn expect(&mut self, tok: &Token) -> Result<()> {
        if self.eat(tok) {
            Ok(())
        } else {
            err_at!(ParseFail, msg: "expected {}, found {:?}", tok, self.peek())
        }
    }

    fn expect_eof(&self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(tok) => err_at!(ParseFail, msg: "trailing input at {}", tok),
        }
    }

    // bare identifier, or a quoted one
    fn ident(&mut self) -> Result<String> {
        match self.next()? {
            Token::Ident(name) => Ok(name),
            Token::Str(name) => Ok(name),
            tok => err_at!(ParseFail, msg: "expected identifier, found {}", tok),
        }
    }

    fn comp_op(&mut self) -> Option<CompOp> {
        let op = match self.peek()? {
            Token::Lt => CompOp::Lt,
            Token::Le => CompOp::Le,
            Token::Gt => CompOp::Gt,
            Token::Ge => CompOp::Ge,
            Token::Eq => CompOp::Eq,
            _ => return None,
        };
        self.off += 1;
        Some(op)
    }

    // ---- WHERE grammar

    fn or_expr(&mut self) -> Result<QExpr> {
        let mut acc = self.and_expr()?;
        loop {
            if self.eat_kw(Keyword::Or) {
                acc = QExpr::or(acc, self.and_expr()?);
            } else if self.eat_kw(Keyword::Xor) {
                acc = QExpr::xor(acc, self.and_expr()?);
            } else {
                break Ok(acc);
            }
        }
    }

    fn and_expr(&mut self) -> Result<QExpr> {
        let mut acc = self.not_expr()?;
        loop {
            if self.eat_kw(Keyword::And) {
                acc = QExpr::and(acc, self.not_expr()?);
            } else if self.eat(&Token::Minus) {
                // '-' after a complete predicate is the AND-NOT form
                acc = QExpr::minus(acc, self.not_expr()?);
            } else {
                break Ok(acc);
            }
        }
    }

    fn not_expr(&mut self) -> Result<QExpr> {
        if self.eat_kw(Keyword::Not) {
            Ok(QExpr::not(self.not_expr()?))
        } else {
            self.primary()
        }
    }

    fn primary(&mut self) -> Result<QExpr> {
        match self.peek() {
            Some(Token::Kw(Keyword::Any)) => self.any_any(),
            Some(Token::Kw(Keyword::Join)) => self.join_term(),
            Some(Token::LParen) => {
                // either a parenthesised predicate or a parenthesised
                // arithmetic term, try the predicate first
                let save = self.off;
                self.off += 1;
                match self.or_expr() {
                    Ok(expr) if self.eat(&Token::RParen) => Ok(expr),
                    _ => {
                        self.off = save;
                        self.predicate()
                    }
                }
            }
            _ => self.predicate(),
        }
    }

    fn any_any(&mut self) -> Result<QExpr> {
        self.expect(&Token::Kw(Keyword::Any))?;
        self.expect(&Token::LParen)?;
        let prefix = self.ident()?;
        self.expect(&Token::RParen)?;

        if self.eat(&Token::Eq) {
            let val = self.signed_number()?;
            Ok(QExpr::AnyAny(AnyAny::new(&prefix, vec![val])))
        } else if self.eat_kw(Keyword::In) {
            let values = self.number_list()?;
            Ok(QExpr::AnyAny(AnyAny::new(&prefix, values)))
        } else {
            err_at!(ParseFail, msg: "any(..) expects = or IN")
        }
    }

    fn join_term(&mut self) -> Result<QExpr> {
        self.expect(&Token::Kw(Keyword::Join))?;
        self.expect(&Token::LParen)?;
        let name1 = self.ident()?;
        self.expect(&Token::Comma)?;
        let name2 = self.ident()?;
        let range = match self.eat(&Token::Comma) {
            true => Some(self.math_expr()?),
            false => None,
        };
        self.expect(&Token::RParen)?;
        Ok(QExpr::Join(JoinExpr::new(&name1, &name2, range)))
    }

    fn signed_number(&mut self) -> Result<f64> {
        let neg = self.eat(&Token::Minus);
        match self.next()? {
            Token::Number(val) => Ok(if neg { -val } else { val }),
            tok => err_at!(ParseFail, msg: "expected number, found {}", tok),
        }
    }

    fn number_list(&mut self) -> Result<Vec<f64>> {
        self.expect(&Token::LParen)?;
        let mut values = vec![self.signed_number()?];
        while self.eat(&Token::Comma) {
            values.push(self.signed_number()?);
        }
        self.expect(&Token::RParen)?;
        Ok(values)
    }

    // one side of a comparison, a string literal or an arithmetic term
    fn cmp_side(&mut self) -> Result<MathTerm> {
        match self.peek() {
            Some(Token::Str(_)) => match self.next()? {
                Token::Str(s) => Ok(MathTerm::Literal(s)),
                _ => unreachable!(),
            },
            _ => self.math_expr(),
        }
    }

    fn predicate(&mut self) -> Result<QExpr> {
        let term1 = self.cmp_side()?;

        // `name IN (..)`, `name LIKE "pat"`
        if let Some(name) = term1.as_variable().map(|s| s.to_string()) {
            if self.eat_kw(Keyword::In) {
                return self.in_list(&name);
            }
            if self.eat_kw(Keyword::Like) {
                return match self.next()? {
                    Token::Str(pat) => Ok(QExpr::Like(LikeExpr::new(&name, &pat))),
                    tok => err_at!(ParseFail, msg: "LIKE expects pattern, found {}", tok),
                };
            }
        }

        // `term BETWEEN low AND high`
        if self.eat_kw(Keyword::Between) {
            let lo = self.math_expr()?;
            self.expect(&Token::Kw(Keyword::And))?;
            let hi = self.math_expr()?;
            let cr = CompRange::between(lo, CompOp::Le, term1, CompOp::Le, hi);
            return Ok(QExpr::Cmp(cr));
        }

        let op12 = match self.comp_op() {
            Some(op) => op,
            None => err_at!(ParseFail, msg: "expected comparison at {:?}", self.peek())?,
        };
        let term2 = self.cmp_side()?;

        if let Some(op23) = self.comp_op() {
            let term3 = self.cmp_side()?;
            check_no_literal(&term1)?;
            check_no_literal(&term2)?;
            check_no_literal(&term3)?;
            return Ok(QExpr::Cmp(CompRange::between(term1, op12, term2, op23, term3)));
        }

        // a quoted or unquoted string against a string column parses
        // into direct string equality
        match (op12, &term1, &term2) {
            (CompOp::Eq, MathTerm::Variable(name), MathTerm::Literal(val)) => {
                Ok(QExpr::StringEq(StringEq::new(name, val)))
            }
            (CompOp::Eq, MathTerm::Literal(val), MathTerm::Variable(name)) => {
                Ok(QExpr::StringEq(StringEq::new(name, val)))
            }
            _ => {
                check_no_literal(&term1)?;
                check_no_literal(&term2)?;
                Ok(QExpr::Cmp(CompRange::new(term1, op12, term2)))
            }
        }
    }

    fn in_list(&mut self, name: &str) -> Result<QExpr> {
        self.expect(&Token::LParen)?;
        let (mut nums, mut strs) = (vec![], vec![]);
        loop {
            match self.next()? {
                Token::Number(val) => nums.push(val),
                Token::Minus => match self.next()? {
                    Token::Number(val) => nums.push(-val),
                    tok => err_at!(ParseFail, msg: "bad IN member {}", tok)?,
                },
                Token::Str(s) => strs.push(s),
                tok => err_at!(ParseFail, msg: "bad IN member {}", tok)?,
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen)?;

        match (nums.is_empty(), strs.is_empty()) {
            (false, true) => Ok(QExpr::Discrete(DiscreteRange::new(name, nums))),
            (true, false) => Ok(QExpr::Strings(MultiString::new(name, strs))),
            (true, true) => Ok(QExpr::Discrete(DiscreteRange::new(name, nums))),
            (false, false) => {
                err_at!(ParseFail, msg: "IN list mixes numbers and strings")
            }
        }
    }

    // a single comparison, used by the FROM clause ON condition
    fn comparison(&mut self) -> Result<CompRange> {
        let term1 = self.math_expr()?;
        let op12 = match self.comp_op() {
            Some(op) => op,
            None => err_at!(ParseFail, msg: "expected comparison at {:?}", self.peek())?,
        };
        let term2 = self.math_expr()?;
        match self.comp_op() {
            Some(op23) => {
                let term3 = self.math_expr()?;
                Ok(CompRange::between(term1, op12, term2, op23, term3))
            }
            None => Ok(CompRange::new(term1, op12, term2)),
        }
    }

    // ---- arithmetic grammar

    fn math_expr(&mut self) -> Result<MathTerm> {
        self.bitor_expr()
    }

    fn bitor_expr(&mut self) -> Result<MathTerm> {
        let mut acc = self.bitand_expr()?;
        while self.eat(&Token::Pipe) {
            let rhs = self.bitand_expr()?;
            acc = MathTerm::Op(MathOp::BitOr, Box::new(acc), Box::new(rhs));
        }
        Ok(acc)
    }

    fn bitand_expr(&mut self) -> Result<MathTerm> {
        let mut acc = self.add_expr()?;
        while self.eat(&Token::Amp) {
            let rhs = self.add_expr()?;
            acc = MathTerm::Op(MathOp::BitAnd, Box::new(acc), Box::new(rhs));
        }
        Ok(acc)
    }

    fn add_expr(&mut self) -> Result<MathTerm> {
        let mut acc = self.mul_expr()?;
        loop {
            if self.eat(&Token::Plus) {
                let rhs = self.mul_expr()?;
                acc = MathTerm::Op(MathOp::Add, Box::new(acc), Box::new(rhs));
            } else if self.peek() == Some(&Token::Minus) && self.starts_math_after_minus()
            {
                self.off += 1;
                let rhs = self.mul_expr()?;
                acc = MathTerm::Op(MathOp::Sub, Box::new(acc), Box::new(rhs));
            } else {
                break Ok(acc);
            }
        }
    }

    // distinguish arithmetic subtraction from the logical AND-NOT
    // form, `a - b` at predicate level; inside arithmetic the next
    // token after '-' always begins another term
    fn starts_math_after_minus(&self) -> bool {
        matches!(
            self.peek2(),
            Some(Token::Number(_))
                | Some(Token::Ident(_))
                | Some(Token::LParen)
                | Some(Token::Minus)
                | Some(Token::Plus)
        )
    }

    fn mul_expr(&mut self) -> Result<MathTerm> {
        let mut acc = self.unary_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => MathOp::Mul,
                Some(Token::Slash) => MathOp::Div,
                Some(Token::Percent) => MathOp::Rem,
                _ => break Ok(acc),
            };
            self.off += 1;
            let rhs = self.unary_expr()?;
            acc = MathTerm::Op(op, Box::new(acc), Box::new(rhs));
        }
    }

    fn unary_expr(&mut self) -> Result<MathTerm> {
        if self.eat(&Token::Minus) {
            Ok(MathTerm::Neg(Box::new(self.unary_expr()?)))
        } else if self.eat(&Token::Plus) {
            self.unary_expr()
        } else {
            self.power_expr()
        }
    }

    fn power_expr(&mut self) -> Result<MathTerm> {
        let base = self.atom()?;
        if self.eat(&Token::Caret) {
            // right associative
            let exp = self.unary_expr()?;
            Ok(MathTerm::Op(MathOp::Pow, Box::new(base), Box::new(exp)))
        } else {
            Ok(base)
        }
    }

    fn atom(&mut self) -> Result<MathTerm> {
        match self.next()? {
            Token::Number(val) => Ok(MathTerm::Number(val)),
            Token::LParen => {
                let term = self.math_expr()?;
                self.expect(&Token::RParen)?;
                Ok(term)
            }
            Token::Ident(name) => {
                if self.peek() == Some(&Token::LParen) {
                    self.function(&name)
                } else {
                    Ok(MathTerm::Variable(name))
                }
            }
            tok => err_at!(ParseFail, msg: "expected term, found {}", tok),
        }
    }

    // standard function application, unrecognized names fail parsing
    fn function(&mut self, name: &str) -> Result<MathTerm> {
        self.expect(&Token::LParen)?;
        let arg1 = self.math_expr()?;
        if self.eat(&Token::Comma) {
            let arg2 = self.math_expr()?;
            self.expect(&Token::RParen)?;
            let fun = StdFun2::from_name(name)?;
            Ok(MathTerm::Fun2(fun, Box::new(arg1), Box::new(arg2)))
        } else {
            self.expect(&Token::RParen)?;
            let fun = StdFun1::from_name(name)?;
            Ok(MathTerm::Fun1(fun, Box::new(arg1)))
        }
    }

    // ---- SELECT grammar

    fn select_term(&mut self) -> Result<SelectTerm> {
        let (agg, term) = match (self.peek(), self.peek2()) {
            (Some(Token::Ident(name)), Some(Token::LParen))
                if Aggregator::from_name(name).is_some() =>
            {
                let agg = Aggregator::from_name(name).unwrap();
                self.off += 2;
                let (agg, term) = match (agg, self.peek()) {
                    (Aggregator::Cnt, Some(Token::Star)) => {
                        self.off += 1;
                        (Aggregator::Cnt, MathTerm::var("*"))
                    }
                    (Aggregator::Cnt, Some(Token::Ident(inner)))
                        if inner.eq_ignore_ascii_case("distinct") =>
                    {
                        self.off += 1;
                        (Aggregator::Distinct, self.math_expr()?)
                    }
                    _ => (agg, self.math_expr()?),
                };
                self.expect(&Token::RParen)?;
                (agg, term)
            }
            _ => (Aggregator::Nil, self.math_expr()?),
        };

        let alias = if self.eat_kw(Keyword::As) {
            Some(self.ident()?)
        } else {
            None
        };
        Ok(SelectTerm { agg, term, alias })
    }

    // ---- FROM grammar

    fn from_entry(&mut self) -> Result<(String, Option<String>)> {
        let name = self.ident()?;
        let alias = if self.eat_kw(Keyword::As) {
            Some(self.ident()?)
        } else {
            match self.peek() {
                Some(Token::Ident(_)) => Some(self.ident()?),
                _ => None,
            }
        };
        Ok((name, alias))
    }
}

fn check_no_literal(term: &MathTerm) -> Result<()> {
    match term {
        MathTerm::Literal(s) => {
            err_at!(ParseFail, msg: "string {:?} outside equality/LIKE/IN", s)
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
#[path = "parse_test.rs"]
mod parse_test;
