// healthdq-core/src/domain/rules/formula.rs

//! Arithmetic over record fields: `+ - * /`, power (`^` or `**`),
//! parentheses, unary minus, numeric literals and field names.
//! A [`Condition`] joins comparisons of two formulas with `and`.

use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

use crate::domain::dataset::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Field(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("cannot parse formula: {0}")]
    Parse(String),
    #[error("input '{0}' is missing")]
    MissingInput(String),
    #[error("input '{0}' is not numeric")]
    NotNumeric(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NonFinite,
}

/// A parsed formula with its sorted input fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
    inputs: Vec<String>,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expr()?;
        if let Some(tok) = parser.peek() {
            return Err(FormulaError::Parse(format!("unexpected token {}", tok)));
        }

        let mut inputs = BTreeSet::new();
        collect_fields(&expr, &mut inputs);

        Ok(Self {
            source: source.trim().to_string(),
            expr,
            inputs: inputs.into_iter().collect(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Field names read by the formula, sorted and deduplicated.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn missing_inputs<'a>(&'a self, record: &'a Record) -> impl Iterator<Item = &'a String> {
        self.inputs.iter().filter(move |f| record.is_missing(f))
    }

    pub fn eval(&self, record: &Record) -> Result<f64, FormulaError> {
        let out = eval_expr(&self.expr, record)?;
        if out.is_finite() {
            Ok(out)
        } else {
            Err(FormulaError::NonFinite)
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    // Two-character operators first so `<=` is not read as `<`.
    const SYMBOLS: [(&'static str, Comparison); 6] = [
        ("<=", Comparison::Le),
        (">=", Comparison::Ge),
        ("==", Comparison::Eq),
        ("!=", Comparison::Ne),
        ("<", Comparison::Lt),
        (">", Comparison::Gt),
    ];

    fn holds(self, l: f64, r: f64) -> bool {
        match self {
            Comparison::Lt => l < r,
            Comparison::Le => l <= r,
            Comparison::Gt => l > r,
            Comparison::Ge => l >= r,
            Comparison::Eq => l == r,
            Comparison::Ne => l != r,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Clause {
    lhs: Formula,
    op: Comparison,
    rhs: Formula,
}

fn re_and() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+and\s+").unwrap_or_else(|_| unreachable!()))
}

/// Guard of a conditional imputation, e.g. `if weight_kg > 0 and height_cm > 0`.
/// The leading `if` is optional.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    clauses: Vec<Clause>,
    inputs: Vec<String>,
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        let trimmed = source.trim();
        let body = trimmed.strip_prefix("if ").unwrap_or(trimmed).trim();
        if body.is_empty() {
            return Err(FormulaError::Parse("empty condition".into()));
        }

        let mut clauses = Vec::new();
        for part in re_and().split(body) {
            let (at, symbol, op) = Comparison::SYMBOLS
                .iter()
                .filter_map(|(sym, op)| part.find(sym).map(|at| (at, *sym, *op)))
                .min_by_key(|(at, sym, _)| (*at, std::cmp::Reverse(sym.len())))
                .ok_or_else(|| {
                    FormulaError::Parse(format!("no comparison in '{}'", part.trim()))
                })?;
            clauses.push(Clause {
                lhs: Formula::parse(&part[..at])?,
                op,
                rhs: Formula::parse(&part[at + symbol.len()..])?,
            });
        }

        let inputs: BTreeSet<String> = clauses
            .iter()
            .flat_map(|c| c.lhs.inputs().iter().chain(c.rhs.inputs()))
            .cloned()
            .collect();

        Ok(Self {
            source: trimmed.to_string(),
            clauses,
            inputs: inputs.into_iter().collect(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// True when every clause holds for the record.
    pub fn holds(&self, record: &Record) -> Result<bool, FormulaError> {
        for clause in &self.clauses {
            if !clause.op.holds(clause.lhs.eval(record)?, clause.rhs.eval(record)?) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

fn collect_fields(expr: &Expr, out: &mut BTreeSet<String>) {
    match expr {
        Expr::Number(_) => {}
        Expr::Field(name) => {
            out.insert(name.clone());
        }
        Expr::Neg(inner) => collect_fields(inner, out),
        Expr::Binary { lhs, rhs, .. } => {
            collect_fields(lhs, out);
            collect_fields(rhs, out);
        }
    }
}

fn eval_expr(expr: &Expr, record: &Record) -> Result<f64, FormulaError> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Field(name) => {
            let value = record.value(name);
            if value.is_missing() {
                return Err(FormulaError::MissingInput(name.clone()));
            }
            value
                .as_f64()
                .ok_or_else(|| FormulaError::NotNumeric(name.clone()))
        }
        Expr::Neg(inner) => Ok(-eval_expr(inner, record)?),
        Expr::Binary { op, lhs, rhs } => {
            let l = eval_expr(lhs, record)?;
            let r = eval_expr(rhs, record)?;
            match op {
                BinaryOp::Add => Ok(l + r),
                BinaryOp::Sub => Ok(l - r),
                BinaryOp::Mul => Ok(l * r),
                BinaryOp::Div if r == 0.0 => Err(FormulaError::DivisionByZero),
                BinaryOp::Div => Ok(l / r),
                BinaryOp::Pow => Ok(l.powf(r)),
            }
        }
    }
}

// --- LEXER ---

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(BinaryOp),
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "'{}'", n),
            Token::Ident(s) => write!(f, "'{}'", s),
            Token::Op(op) => write!(f, "'{:?}'", op),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, FormulaError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => {
                tokens.push(Token::Op(BinaryOp::Add));
                i += 1;
            }
            '-' => {
                tokens.push(Token::Op(BinaryOp::Sub));
                i += 1;
            }
            '/' => {
                tokens.push(Token::Op(BinaryOp::Div));
                i += 1;
            }
            '^' => {
                tokens.push(Token::Op(BinaryOp::Pow));
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::Op(BinaryOp::Pow));
                    i += 2;
                } else {
                    tokens.push(Token::Op(BinaryOp::Mul));
                    i += 1;
                }
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| FormulaError::Parse(format!("invalid number '{}'", text)))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(FormulaError::Parse(format!(
                    "unexpected character '{}'",
                    other
                )));
            }
        }
    }

    if tokens.is_empty() {
        return Err(FormulaError::Parse("empty formula".into()));
    }
    Ok(tokens)
}

// --- PARSER (recursive descent) ---
//
// expr  := term (('+' | '-') term)*
// term  := unary (('*' | '/') unary)*
// unary := '-' unary | power
// power := atom ('^' unary)?

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expr(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        while let Some(Token::Op(op @ (BinaryOp::Add | BinaryOp::Sub))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(op @ (BinaryOp::Mul | BinaryOp::Div))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        if let Some(Token::Op(BinaryOp::Sub)) = self.peek() {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.atom()?;
        if let Some(Token::Op(BinaryOp::Pow)) = self.peek() {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr, FormulaError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Ident(name)) => Ok(Expr::Field(name)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(FormulaError::Parse("missing ')'".into())),
                }
            }
            Some(tok) => Err(FormulaError::Parse(format!("unexpected token {}", tok))),
            None => Err(FormulaError::Parse("unexpected end of formula".into())),
        }
    }
}
