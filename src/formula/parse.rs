//! Formula parsing.
//!
//! Supported grammar (a small subset of the Wilkinson–Rogers notation):
//!
//! ```text
//! formula := [response] "~" sum
//! sum     := ["-"] product (("+" | "-") product)*
//! product := inter ("*" inter)*
//! inter   := atom (":" atom)*
//! atom    := name | "C(" name ")" | "0" | "1"
//! ```
//!
//! `a * b` expands to `a + b + a:b`; `1` / `0` toggle the intercept, as does `- 1`.

use crate::error::AppError;

/// A single factor inside a term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Factor {
    /// Column used by value.
    Numeric(String),
    /// Column used as a categorical (`C(column)`).
    Categorical(String),
}

impl Factor {
    pub fn column(&self) -> &str {
        match self {
            Factor::Numeric(c) | Factor::Categorical(c) => c,
        }
    }

    /// Label used in design column names.
    pub fn label(&self) -> String {
        match self {
            Factor::Numeric(c) => c.clone(),
            Factor::Categorical(c) => format!("C({c})"),
        }
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self, Factor::Categorical(_))
    }
}

/// A product of factors (`a:b`). The empty term is the intercept.
#[derive(Debug, Clone)]
pub struct Term {
    pub factors: Vec<Factor>,
}

impl Term {
    fn single(factor: Factor) -> Self {
        Self { factors: vec![factor] }
    }

    pub fn degree(&self) -> usize {
        self.factors.len()
    }

    /// Order-insensitive identity: `a:b` and `b:a` are the same term.
    pub fn key(&self) -> Vec<String> {
        let mut key: Vec<String> = self.factors.iter().map(Factor::label).collect();
        key.sort();
        key.dedup();
        key
    }

    fn interact(&self, other: &Term) -> Term {
        let mut factors = self.factors.clone();
        for f in &other.factors {
            if !factors.contains(f) {
                factors.push(f.clone());
            }
        }
        Term { factors }
    }

    /// Same factors minus `factor`.
    pub fn without(&self, factor: &Factor) -> Term {
        Term {
            factors: self.factors.iter().filter(|f| *f != factor).cloned().collect(),
        }
    }

    pub fn label(&self) -> String {
        if self.factors.is_empty() {
            return "Intercept".to_string();
        }
        self.factors.iter().map(Factor::label).collect::<Vec<_>>().join(":")
    }
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

/// A parsed formula.
///
/// `terms` never contains the intercept; it is tracked by `intercept`.
/// Terms are ordered by degree, then by first appearance.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    pub response: Option<String>,
    pub intercept: bool,
    pub terms: Vec<Term>,
}

impl Formula {
    pub fn contains(&self, term: &Term) -> bool {
        if term.factors.is_empty() {
            return self.intercept;
        }
        self.terms.iter().any(|t| t == term)
    }
}

/// Parse a formula such as `test_scores ~ hours_studying + C(school) * air_quality`.
///
/// A one-sided formula (`~air_quality`) has no response.
pub fn parse_formula(src: &str) -> Result<Formula, AppError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens: &tokens, pos: 0, src };

    let response = match parser.peek() {
        Some(Token::Ident(name)) => {
            let name = name.clone();
            parser.pos += 1;
            Some(name)
        }
        _ => None,
    };
    if parser.next() != Some(&Token::Tilde) {
        return Err(AppError::input(format!("Formula '{src}' is missing '~'.")));
    }

    let (intercept, terms) = parser.sum()?;
    if parser.pos != tokens.len() {
        return Err(AppError::input(format!(
            "Unexpected trailing input in formula '{src}'."
        )));
    }

    // Stable sort keeps first-appearance order within each degree.
    let mut terms = terms;
    terms.sort_by_key(Term::degree);

    Ok(Formula { response, intercept, terms })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    Tilde,
    Plus,
    Minus,
    Star,
    Colon,
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<Token>, AppError> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '~' | '+' | '-' | '*' | ':' | '(' | ')' => {
                chars.next();
                tokens.push(match c {
                    '~' => Token::Tilde,
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    ':' => Token::Colon,
                    '(' => Token::LParen,
                    _ => Token::RParen,
                });
            }
            c if c.is_ascii_digit() => {
                let mut num = String::new();
                while let Some(&d) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    num.push(d);
                    chars.next();
                }
                tokens.push(Token::Number(num));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if !(d.is_alphanumeric() || d == '_') {
                        break;
                    }
                    ident.push(d);
                    chars.next();
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(AppError::input(format!(
                    "Unexpected character '{other}' in formula '{src}'."
                )));
            }
        }
    }
    if tokens.is_empty() {
        return Err(AppError::input("Formula is empty."));
    }
    Ok(tokens)
}

enum Piece {
    Intercept(bool),
    Terms(Vec<Term>),
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    src: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        self.pos += 1;
        tok
    }

    fn unsupported(&self, what: &str) -> AppError {
        AppError::input(format!("Unsupported {what} in formula '{}'.", self.src))
    }

    fn sum(&mut self) -> Result<(bool, Vec<Term>), AppError> {
        let mut intercept = true;
        let mut terms: Vec<Term> = Vec::new();
        let mut negate = false;
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            negate = true;
        }

        loop {
            match (self.product()?, negate) {
                (Piece::Intercept(on), false) => intercept = on,
                (Piece::Intercept(on), true) => {
                    if on {
                        intercept = false;
                    }
                }
                (Piece::Terms(new), false) => {
                    for t in new {
                        if !terms.contains(&t) {
                            terms.push(t);
                        }
                    }
                }
                (Piece::Terms(removed), true) => terms.retain(|t| !removed.contains(t)),
            }

            match self.peek() {
                Some(Token::Plus) => negate = false,
                Some(Token::Minus) => negate = true,
                _ => break,
            }
            self.pos += 1;
        }

        Ok((intercept, terms))
    }

    fn product(&mut self) -> Result<Piece, AppError> {
        let first = self.interaction()?;
        if self.peek() != Some(&Token::Star) {
            return Ok(first);
        }

        let Piece::Terms(mut acc) = first else {
            return Err(self.unsupported("intercept inside '*'"));
        };
        while self.peek() == Some(&Token::Star) {
            self.pos += 1;
            let Piece::Terms(rhs) = self.interaction()? else {
                return Err(self.unsupported("intercept inside '*'"));
            };
            let mut expanded = acc.clone();
            for t in &rhs {
                if !expanded.contains(t) {
                    expanded.push(t.clone());
                }
            }
            for a in &acc {
                for b in &rhs {
                    let ab = a.interact(b);
                    if !expanded.contains(&ab) {
                        expanded.push(ab);
                    }
                }
            }
            acc = expanded;
        }
        Ok(Piece::Terms(acc))
    }

    fn interaction(&mut self) -> Result<Piece, AppError> {
        let first = self.atom()?;
        if self.peek() != Some(&Token::Colon) {
            return Ok(first);
        }

        let Piece::Terms(first) = first else {
            return Err(self.unsupported("intercept inside ':'"));
        };
        let mut acc = first;
        while self.peek() == Some(&Token::Colon) {
            self.pos += 1;
            let Piece::Terms(rhs) = self.atom()? else {
                return Err(self.unsupported("intercept inside ':'"));
            };
            acc = acc
                .iter()
                .flat_map(|a| rhs.iter().map(move |b| a.interact(b)))
                .collect();
        }
        Ok(Piece::Terms(acc))
    }

    fn atom(&mut self) -> Result<Piece, AppError> {
        match self.next().cloned() {
            Some(Token::Number(n)) => match n.as_str() {
                "0" => Ok(Piece::Intercept(false)),
                "1" => Ok(Piece::Intercept(true)),
                _ => Err(self.unsupported(&format!("constant '{n}'"))),
            },
            Some(Token::Ident(name)) if name == "C" && self.peek() == Some(&Token::LParen) => {
                self.pos += 1;
                let Some(Token::Ident(column)) = self.next().cloned() else {
                    return Err(self.unsupported("argument to C()"));
                };
                if self.next() != Some(&Token::RParen) {
                    return Err(self.unsupported("argument to C()"));
                }
                Ok(Piece::Terms(vec![Term::single(Factor::Categorical(column))]))
            }
            Some(Token::Ident(name)) => Ok(Piece::Terms(vec![Term::single(Factor::Numeric(name))])),
            Some(tok) => Err(self.unsupported(&format!("token {tok:?}"))),
            None => Err(AppError::input(format!(
                "Formula '{}' ends unexpectedly.",
                self.src
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(f: &Formula) -> Vec<String> {
        f.terms.iter().map(Term::label).collect()
    }

    #[test]
    fn parses_pooled_formula() {
        let f = parse_formula("test_scores ~ hours_studying").unwrap();
        assert_eq!(f.response.as_deref(), Some("test_scores"));
        assert!(f.intercept);
        assert_eq!(labels(&f), vec!["hours_studying"]);
    }

    #[test]
    fn star_expands_and_duplicates_are_dropped() {
        let f = parse_formula("test_scores ~ hours_studying + C(school) * air_quality + C(school)")
            .unwrap();
        assert_eq!(
            labels(&f),
            vec!["hours_studying", "C(school)", "air_quality", "C(school):air_quality"]
        );
    }

    #[test]
    fn interaction_order_does_not_matter_for_identity() {
        let f = parse_formula("y ~ a:b + b:a").unwrap();
        assert_eq!(f.terms.len(), 1);
    }

    #[test]
    fn one_sided_and_intercept_controls() {
        let f = parse_formula("~air_quality").unwrap();
        assert!(f.response.is_none());
        assert!(f.intercept);

        let f = parse_formula("~1").unwrap();
        assert!(f.intercept);
        assert!(f.terms.is_empty());

        let f = parse_formula("y ~ x - 1").unwrap();
        assert!(!f.intercept);
        let f = parse_formula("y ~ 0 + x").unwrap();
        assert!(!f.intercept);
    }

    #[test]
    fn rejects_malformed_formulas() {
        for bad in ["", "y + x", "y ~ x +", "y ~ C(x", "y ~ 2", "y ~ x $ z", "y ~ 1:x"] {
            assert!(parse_formula(bad).is_err(), "{bad:?} should fail");
        }
    }
}
