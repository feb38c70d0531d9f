//! Module `lex` implement the tokenizer shared by the clause parsers.

use lazy_static::lazy_static;
use regex::Regex;

use std::{fmt, result};

use crate::{err_at, Error, Result};

/// Keywords recognized case-insensitively in clause strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Keyword {
    And,
    Or,
    Xor,
    Not,
    In,
    Like,
    Between,
    Join,
    Using,
    On,
    As,
    Any,
    Order,
    By,
    Limit,
    Asc,
    Desc,
}

impl Keyword {
    fn from_name(name: &str) -> Option<Keyword> {
        let kw = match name.to_uppercase().as_str() {
            "AND" => Keyword::And,
            "OR" => Keyword::Or,
            "XOR" => Keyword::Xor,
            "NOT" => Keyword::Not,
            "IN" => Keyword::In,
            "LIKE" => Keyword::Like,
            "BETWEEN" => Keyword::Between,
            "JOIN" => Keyword::Join,
            "USING" => Keyword::Using,
            "ON" => Keyword::On,
            "AS" => Keyword::As,
            "ANY" => Keyword::Any,
            "ORDER" => Keyword::Order,
            "BY" => Keyword::By,
            "LIMIT" => Keyword::Limit,
            "ASC" => Keyword::Asc,
            "DESC" => Keyword::Desc,
            _ => return None,
        };
        Some(kw)
    }
}

/// Tokens produced by [Lex].
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    /// Bare or quoted identifier, possibly dotted.
    Ident(String),
    /// Integer, float or hexadecimal numeral, held as f64.
    Number(f64),
    /// Single or double quoted string literal, quotes and escapes
    /// stripped.
    Str(String),
    Kw(Keyword),
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Pipe,
    Amp,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self {
            Token::Ident(s) => write!(f, "{}", s),
            Token::Number(n) => write!(f, "{}", n),
            Token::Str(s) => write!(f, "{:?}", s),
            Token::Kw(kw) => write!(f, "{:?}", kw),
            token => {
                let s = match token {
                    Token::Lt => "<",
                    Token::Le => "<=",
                    Token::Gt => ">",
                    Token::Ge => ">=",
                    Token::Eq => "==",
                    Token::LParen => "(",
                    Token::RParen => ")",
                    Token::Comma => ",",
                    Token::Plus => "+",
                    Token::Minus => "-",
                    Token::Star => "*",
                    Token::Slash => "/",
                    Token::Percent => "%",
                    Token::Caret => "^",
                    Token::Pipe => "|",
                    Token::Amp => "&",
                    _ => unreachable!(),
                };
                write!(f, "{}", s)
            }
        }
    }
}

lazy_static! {
    static ref RE_HEX: Regex = Regex::new(r"^0[xX][0-9a-fA-F]+").unwrap();
    static ref RE_NUM: Regex =
        Regex::new(r"^(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?").unwrap();
    static ref RE_IDENT: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*").unwrap();
}

/// Lex type, scans a clause string into its token list.
pub struct Lex<'a> {
    text: &'a str,
    cursor: usize,
}

impl<'a> Lex<'a> {
    pub fn new(text: &'a str) -> Lex<'a> {
        Lex { text, cursor: 0 }
    }

    fn as_str(&self) -> &'a str {
        &self.text[self.cursor..]
    }

    /// Scan the full text, failing on the first unrecognizable byte.
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = vec![];
        loop {
            self.skip_ws();
            if self.as_str().is_empty() {
                break Ok(tokens);
            }
            tokens.push(self.scan_token()?);
        }
    }

    fn skip_ws(&mut self) {
        let n = self
            .as_str()
            .chars()
            .take_while(|ch| ch.is_whitespace())
            .map(|ch| ch.len_utf8())
            .sum::<usize>();
        self.cursor += n;
    }

    fn scan_token(&mut self) -> Result<Token> {
        let text = self.as_str();
        let mut chars = text.chars();
        let ch = chars.next().unwrap();
        let ch2 = chars.next();

        let (token, n) = match (ch, ch2) {
            ('<', Some('=')) => (Token::Le, 2),
            ('<', _) => (Token::Lt, 1),
            ('>', Some('=')) => (Token::Ge, 2),
            ('>', _) => (Token::Gt, 1),
            ('=', Some('=')) => (Token::Eq, 2),
            ('=', _) => (Token::Eq, 1),
            ('&', Some('&')) => (Token::Kw(Keyword::And), 2),
            ('&', _) => (Token::Amp, 1),
            ('|', Some('|')) => (Token::Kw(Keyword::Or), 2),
            ('|', _) => (Token::Pipe, 1),
            ('!', _) => (Token::Kw(Keyword::Not), 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            (',', _) => (Token::Comma, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', Some('*')) => (Token::Caret, 2),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('^', _) => (Token::Caret, 1),
            ('\'', _) | ('"', _) => return self.scan_string(ch),
            _ => return self.scan_word(),
        };
        self.cursor += n;
        Ok(token)
    }

    // quoted string literal, `\` escapes the next character
    fn scan_string(&mut self, quote: char) -> Result<Token> {
        let text = self.as_str();
        let mut val = String::new();
        let mut iter = text.char_indices().skip(1);
        loop {
            match iter.next() {
                Some((_, '\\')) => match iter.next() {
                    Some((_, ch)) => val.push(ch),
                    None => break err_at!(ParseFail, msg: "unterminated escape"),
                },
                Some((i, ch)) if ch == quote => {
                    self.cursor += i + ch.len_utf8();
                    break Ok(Token::Str(val));
                }
                Some((_, ch)) => val.push(ch),
                None => break err_at!(ParseFail, msg: "unterminated string"),
            }
        }
    }

    fn scan_word(&mut self) -> Result<Token> {
        let text = self.as_str();
        if let Some(m) = RE_HEX.find(text) {
            self.cursor += m.end();
            let val = err_at!(
                ParseFail,
                i64::from_str_radix(&m.as_str()[2..], 16),
                "numeral {}",
                m.as_str()
            )?;
            return Ok(Token::Number(val as f64));
        }
        if let Some(m) = RE_NUM.find(text) {
            self.cursor += m.end();
            let val =
                err_at!(ParseFail, m.as_str().parse::<f64>(), "numeral {}", m.as_str())?;
            return Ok(Token::Number(val));
        }
        if let Some(m) = RE_IDENT.find(text) {
            self.cursor += m.end();
            let token = match Keyword::from_name(m.as_str()) {
                Some(kw) => Token::Kw(kw),
                None => Token::Ident(m.as_str().to_string()),
            };
            return Ok(token);
        }
        err_at!(ParseFail, msg: "bad token at {:?}", text.chars().take(10).collect::<String>())
    }
}

#[cfg(test)]
#[path = "lex_test.rs"]
mod lex_test;
