// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Evaluator for the relational conditions that appear in
//! instrumented logs once variable values have been substituted in.
//!
//! Supported: number, string, boolean and null literals, the `NotNone`
//! sentinel, `==` `!=` `<` `<=` `>` `>=`, `&&`/`and`, `||`/`or`, `!`/`not`,
//! unary minus and parentheses. Anything else is an [`EvalError`].

use std::cmp::Ordering;
use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use thiserror::Error;

use crate::bindings::{NOT_NULL_SENTINEL, NULL_SENTINEL};

#[derive(Clone, Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("unbound name `{0}`")]
    UnboundName(String),

    #[error("unexpected token `{0}`")]
    UnexpectedToken(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unsupported operator `{0}`")]
    UnsupportedOperator(String),

    #[error("invalid number `{0}`")]
    InvalidNumber(String),

    #[error("cannot apply `{op}` to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("cannot compare a non-null value of unknown content with {0}")]
    Indeterminate(&'static str),

    #[error("expression evaluated to {0}, not a boolean")]
    NotBoolean(&'static str),

    #[error("expression nests deeper than {0} levels")]
    TooDeep(usize),
}

/// Nesting limit for parentheses and prefix operators.
pub const MAX_DEPTH: usize = 64;

/// Evaluates `text` to a boolean.
pub fn evaluate(text: &str) -> Result<bool, EvalError> {
    let tokens = tokenize(text)?;
    let mut parser = Parser {
        tokens: tokens.into_iter().peekable(),
        depth: 0,
    };

    let expr = parser.parse_or()?;
    if let Some(token) = parser.tokens.next() {
        return Err(EvalError::UnexpectedToken(token.to_string()));
    }

    match expr.eval()? {
        Value::Bool(value) => Ok(value),
        other => Err(EvalError::NotBoolean(other.kind())),
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Value {
    Null,
    NotNull,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::NotNull => "non-null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
        }
    }

    fn as_number(&self) -> Option<Number> {
        match self {
            Self::Bool(b) => Some(Number::Int(i64::from(*b))),
            Self::Int(i) => Some(Number::Int(*i)),
            Self::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }
}

#[derive(Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

fn equals(left: &Value, right: &Value) -> Result<bool, EvalError> {
    use Value::*;

    let eq = match (left, right) {
        (Null, Null) => true,
        (NotNull, Null) | (Null, NotNull) => false,
        (NotNull, other) | (other, NotNull) => {
            return Err(EvalError::Indeterminate(other.kind()));
        }
        (Str(a), Str(b)) => a == b,
        (a, b) => match (a.as_number(), b.as_number()) {
            (Some(a), Some(b)) => a.compare(b) == Some(Ordering::Equal),
            _ => false,
        },
    };

    Ok(eq)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    fn apply(self, left: &Value, right: &Value) -> Result<bool, EvalError> {
        match self {
            Self::Eq => equals(left, right),
            Self::Ne => equals(left, right).map(|eq| !eq),
            _ => {
                let (Some(a), Some(b)) = (left.as_number(), right.as_number()) else {
                    return Err(EvalError::TypeMismatch {
                        op: self.symbol(),
                        left: left.kind(),
                        right: right.kind(),
                    });
                };

                let ordering = a.compare(b);
                Ok(match self {
                    Self::Lt => ordering == Some(Ordering::Less),
                    Self::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                    Self::Gt => ordering == Some(Ordering::Greater),
                    _ => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
                })
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Literal(Value),
    Name(String),
    Cmp(CmpOp),
    And,
    Or,
    Not,
    Minus,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal(Value::Null) => write!(f, "{NULL_SENTINEL}"),
            Token::Literal(Value::NotNull) => write!(f, "{NOT_NULL_SENTINEL}"),
            Token::Literal(Value::Bool(b)) => write!(f, "{b}"),
            Token::Literal(Value::Int(i)) => write!(f, "{i}"),
            Token::Literal(Value::Float(x)) => write!(f, "{x}"),
            Token::Literal(Value::Str(s)) => write!(f, "{s:?}"),
            Token::Name(name) => write!(f, "{name}"),
            Token::Cmp(op) => write!(f, "{}", op.symbol()),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),
            Token::Not => write!(f, "!"),
            Token::Minus => write!(f, "-"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_name_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn tokenize(text: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = vec![];
    let mut chars = text.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let token = match c {
            '(' => {
                chars.next();
                Token::LParen
            }
            ')' => {
                chars.next();
                Token::RParen
            }
            '-' => {
                chars.next();
                Token::Minus
            }
            '=' | '!' | '<' | '>' => {
                chars.next();
                let followed_by_eq = matches!(chars.peek(), Some((_, '=')));
                if followed_by_eq {
                    chars.next();
                }

                match (c, followed_by_eq) {
                    ('=', true) => Token::Cmp(CmpOp::Eq),
                    ('!', true) => Token::Cmp(CmpOp::Ne),
                    ('<', true) => Token::Cmp(CmpOp::Le),
                    ('>', true) => Token::Cmp(CmpOp::Ge),
                    ('<', false) => Token::Cmp(CmpOp::Lt),
                    ('>', false) => Token::Cmp(CmpOp::Gt),
                    ('!', false) => Token::Not,
                    _ => return Err(EvalError::UnsupportedOperator("=".into())),
                }
            }
            '&' | '|' => {
                chars.next();
                if matches!(chars.peek(), Some(&(_, next)) if next == c) {
                    chars.next();
                    if c == '&' {
                        Token::And
                    } else {
                        Token::Or
                    }
                } else {
                    return Err(EvalError::UnsupportedOperator(c.to_string()));
                }
            }
            '"' | '\'' => Token::Literal(Value::Str(read_string(&mut chars)?)),
            c if c.is_ascii_digit() => {
                let negated = tokens.last() == Some(&Token::Minus);
                let (token, folded) = read_number(text, &mut chars, negated)?;
                if folded {
                    tokens.pop();
                }
                token
            }
            c if is_name_start(c) => {
                let mut end = start;
                while let Some(&(ix, c)) = chars.peek() {
                    if !is_name_continue(c) {
                        break;
                    }
                    end = ix + c.len_utf8();
                    chars.next();
                }
                keyword_or_name(&text[start..end])
            }
            '+' | '*' | '/' | '%' | '^' | '~' | '?' | ':' => {
                return Err(EvalError::UnsupportedOperator(c.to_string()));
            }
            _ => return Err(EvalError::UnexpectedToken(c.to_string())),
        };

        tokens.push(token);
    }

    Ok(tokens)
}

fn keyword_or_name(word: &str) -> Token {
    match word {
        "true" | "True" => Token::Literal(Value::Bool(true)),
        "false" | "False" => Token::Literal(Value::Bool(false)),
        "null" => Token::Literal(Value::Null),
        w if w == NULL_SENTINEL => Token::Literal(Value::Null),
        w if w == NOT_NULL_SENTINEL => Token::Literal(Value::NotNull),
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        _ => Token::Name(word.to_owned()),
    }
}

fn read_string(chars: &mut Peekable<CharIndices<'_>>) -> Result<String, EvalError> {
    let Some((_, quote)) = chars.next() else {
        return Err(EvalError::UnexpectedEnd);
    };

    let mut value = String::new();
    while let Some((_, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, escaped)) => value.push(escaped),
                None => return Err(EvalError::UnexpectedEnd),
            },
            c if c == quote => return Ok(value),
            c => value.push(c),
        }
    }

    Err(EvalError::UnexpectedEnd)
}

// Returns the literal and whether a preceding minus was folded into it, which
// only happens for `i64::MIN`, whose magnitude does not fit in an `i64`.
fn read_number(
    text: &str,
    chars: &mut Peekable<CharIndices<'_>>,
    negated: bool,
) -> Result<(Token, bool), EvalError> {
    let bytes = text.as_bytes();
    let digits_end = |mut ix: usize| {
        while bytes.get(ix).is_some_and(u8::is_ascii_digit) {
            ix += 1;
        }
        ix
    };

    let start = chars.peek().map(|(ix, _)| *ix).unwrap_or(text.len());
    let mut end = digits_end(start);
    let mut is_float = false;

    if bytes.get(end) == Some(&b'.') {
        is_float = true;
        end = digits_end(end + 1);
    }

    // `Double.toString` switches to exponent form, e.g. `1.0E-6` or `1.0E10`.
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exponent = end + 1;
        if matches!(bytes.get(exponent), Some(b'+' | b'-')) {
            exponent += 1;
        }
        let exponent_end = digits_end(exponent);
        if exponent_end > exponent {
            is_float = true;
            end = exponent_end;
        }
    }

    while chars.next_if(|&(ix, _)| ix < end).is_some() {}
    let digits = &text[start..end];

    // Jimple constants carry a type suffix, e.g. `0L` or `1.5F`.
    if let Some(&(_, suffix)) = chars.peek() {
        match suffix {
            'L' | 'l' => {
                chars.next();
            }
            'F' | 'f' | 'D' | 'd' => {
                chars.next();
                is_float = true;
            }
            c if is_name_continue(c) => {
                return Err(EvalError::InvalidNumber(format!("{digits}{c}")));
            }
            _ => {}
        }
    }

    let invalid = || EvalError::InvalidNumber(digits.to_owned());

    if is_float {
        let value = digits.parse().map_err(|_| invalid())?;
        return Ok((Token::Literal(Value::Float(value)), false));
    }

    if let Ok(value) = digits.parse() {
        return Ok((Token::Literal(Value::Int(value)), false));
    }

    if negated {
        if let Ok(value) = format!("-{digits}").parse() {
            return Ok((Token::Literal(Value::Int(value)), true));
        }
    }

    Err(invalid())
}

#[derive(Debug)]
enum Expr {
    Literal(Value),
    Name(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    // Chains of `&&` and `||` stay flat so they add no nesting.
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self) -> Result<Value, EvalError> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => Err(EvalError::UnboundName(name.clone())),
            Expr::Neg(inner) => match inner.eval()? {
                Value::Int(i) => i
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| EvalError::InvalidNumber(format!("-{i}"))),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(EvalError::TypeMismatch {
                    op: "-",
                    left: other.kind(),
                    right: "number",
                }),
            },
            Expr::Not(inner) => Ok(Value::Bool(!inner.eval_bool("!")?)),
            Expr::And(operands) => {
                for operand in operands {
                    if !operand.eval_bool("&&")? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Expr::Or(operands) => {
                for operand in operands {
                    if operand.eval_bool("||")? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Expr::Cmp(op, left, right) => {
                let left = left.eval()?;
                let right = right.eval()?;
                Ok(Value::Bool(op.apply(&left, &right)?))
            }
        }
    }

    fn eval_bool(&self, op: &'static str) -> Result<bool, EvalError> {
        match self.eval()? {
            Value::Bool(b) => Ok(b),
            other => Err(EvalError::TypeMismatch {
                op,
                left: other.kind(),
                right: "boolean",
            }),
        }
    }
}

struct Parser {
    tokens: Peekable<std::vec::IntoIter<Token>>,

    /// Open parentheses and prefix operators above the current token.
    depth: usize,
}

impl Parser {
    fn next(&mut self) -> Result<Token, EvalError> {
        self.tokens.next().ok_or(EvalError::UnexpectedEnd)
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, EvalError>,
    ) -> Result<T, EvalError> {
        if self.depth >= MAX_DEPTH {
            return Err(EvalError::TooDeep(MAX_DEPTH));
        }

        self.depth += 1;
        let parsed = parse(self);
        self.depth -= 1;
        parsed
    }

    fn parse_or(&mut self) -> Result<Expr, EvalError> {
        let mut operands = vec![self.parse_and()?];
        while self.tokens.next_if_eq(&Token::Or).is_some() {
            operands.push(self.parse_and()?);
        }

        Ok(if operands.len() == 1 {
            operands.remove(0)
        } else {
            Expr::Or(operands)
        })
    }

    fn parse_and(&mut self) -> Result<Expr, EvalError> {
        let mut operands = vec![self.parse_not()?];
        while self.tokens.next_if_eq(&Token::And).is_some() {
            operands.push(self.parse_not()?);
        }

        Ok(if operands.len() == 1 {
            operands.remove(0)
        } else {
            Expr::And(operands)
        })
    }

    fn parse_not(&mut self) -> Result<Expr, EvalError> {
        if self.tokens.next_if_eq(&Token::Not).is_some() {
            let inner = self.nested(Self::parse_not)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    // Comparisons do not chain: `a < b < c` is rejected.
    fn parse_comparison(&mut self) -> Result<Expr, EvalError> {
        let left = self.parse_unary()?;

        let Some(Token::Cmp(op)) = self.tokens.peek().cloned() else {
            return Ok(left);
        };
        self.tokens.next();

        let right = self.parse_unary()?;
        if let Some(Token::Cmp(next)) = self.tokens.peek() {
            return Err(EvalError::UnexpectedToken(next.symbol().to_owned()));
        }

        Ok(Expr::Cmp(op, Box::new(left), Box::new(right)))
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        if self.tokens.next_if_eq(&Token::Minus).is_some() {
            let inner = self.nested(Self::parse_unary)?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        match self.next()? {
            Token::Literal(value) => Ok(Expr::Literal(value)),
            Token::Name(name) => Ok(Expr::Name(name)),
            Token::LParen => {
                let inner = self.nested(Self::parse_or)?;
                match self.next()? {
                    Token::RParen => Ok(inner),
                    token => Err(EvalError::UnexpectedToken(token.to_string())),
                }
            }
            token => Err(EvalError::UnexpectedToken(token.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_integer_comparisons() {
        assert_eq!(evaluate("1 < 2"), Ok(true));
        assert_eq!(evaluate("2 <= 2"), Ok(true));
        assert_eq!(evaluate("3 > 4"), Ok(false));
        assert_eq!(evaluate("-3 >= -4"), Ok(true));
        assert_eq!(evaluate("5 == 5"), Ok(true));
        assert_eq!(evaluate("5 != 5"), Ok(false));
    }

    #[test]
    fn test_jimple_suffixes() {
        assert_eq!(evaluate("10L > 9"), Ok(true));
        assert_eq!(evaluate("1.5F < 2.0"), Ok(true));
        assert_eq!(evaluate("1 == 1.0D"), Ok(true));
    }

    #[test]
    fn test_exponent_literals() {
        assert_eq!(evaluate("1.0E10 > 5"), Ok(true));
        assert_eq!(evaluate("1.0E-6 < 1"), Ok(true));
        assert_eq!(evaluate("1.0e+3 == 1000"), Ok(true));
        assert_eq!(evaluate("1.0E10F > 5"), Ok(true));
        assert_eq!(evaluate("-2.5E-3D < 0"), Ok(true));
        assert_eq!(evaluate("1E == 1"), Err(EvalError::InvalidNumber("1E".into())));
    }

    #[test]
    fn test_long_min_value() {
        assert_eq!(evaluate("-9223372036854775808L < 0"), Ok(true));
        assert_eq!(evaluate("-9223372036854775808 == -9223372036854775808L"), Ok(true));
        assert_eq!(
            evaluate("9223372036854775808 > 0"),
            Err(EvalError::InvalidNumber("9223372036854775808".into()))
        );
        assert_eq!(
            evaluate("--9223372036854775808 > 0"),
            Err(EvalError::InvalidNumber("--9223372036854775808".into()))
        );
    }

    #[test]
    fn test_null_sentinels() {
        assert_eq!(evaluate("None == None"), Ok(true));
        assert_eq!(evaluate("None == null"), Ok(true));
        assert_eq!(evaluate("NotNone != None"), Ok(true));
        assert_eq!(evaluate("NotNone == null"), Ok(false));
        assert_eq!(evaluate("None == 0"), Ok(false));
        assert_eq!(evaluate("NotNone == 0"), Err(EvalError::Indeterminate("integer")));
    }

    #[test]
    fn test_booleans() {
        assert_eq!(evaluate("true"), Ok(true));
        assert_eq!(evaluate("True == 1"), Ok(true));
        assert_eq!(evaluate("!(1 < 2)"), Ok(false));
        assert_eq!(evaluate("not False"), Ok(true));
        assert_eq!(evaluate("1 < 2 && 2 < 3"), Ok(true));
        assert_eq!(evaluate("1 > 2 || 2 < 3"), Ok(true));
        assert_eq!(evaluate("1 > 2 or 2 > 3 and 1 == 1"), Ok(false));
    }

    #[test]
    fn test_short_circuit_skips_unbound_name() {
        assert_eq!(evaluate("1 > 2 && y == 0"), Ok(false));
        assert_eq!(evaluate("1 < 2 || y == 0"), Ok(true));
    }

    #[test]
    fn test_strings() {
        assert_eq!(evaluate(r#""abc" == 'abc'"#), Ok(true));
        assert_eq!(evaluate(r#""a\"b" != "a""#), Ok(true));
        assert_eq!(evaluate(r#""abc" == 1"#), Ok(false));
        assert_eq!(
            evaluate(r#""abc" < "abd""#),
            Err(EvalError::TypeMismatch {
                op: "<",
                left: "string",
                right: "string"
            })
        );
    }

    #[test]
    fn test_unbound_name() {
        assert_eq!(
            evaluate("None == y"),
            Err(EvalError::UnboundName("y".into()))
        );
        assert_eq!(
            evaluate("$i0 < 3"),
            Err(EvalError::UnboundName("$i0".into()))
        );
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(evaluate(""), Err(EvalError::UnexpectedEnd));
        assert_eq!(evaluate("1 <"), Err(EvalError::UnexpectedEnd));
        assert_eq!(evaluate("(1 < 2"), Err(EvalError::UnexpectedEnd));
        assert_eq!(evaluate("1 < 2)"), Err(EvalError::UnexpectedToken(")".into())));
        assert_eq!(evaluate("1 < 2 < 3"), Err(EvalError::UnexpectedToken("<".into())));
        assert_eq!(evaluate("\"open"), Err(EvalError::UnexpectedEnd));
        assert_eq!(evaluate("12ab == 1"), Err(EvalError::InvalidNumber("12a".into())));
    }

    #[test]
    fn test_unsupported_operators() {
        assert_eq!(
            evaluate("1 + 2 == 3"),
            Err(EvalError::UnsupportedOperator("+".into()))
        );
        assert_eq!(evaluate("x = 1"), Err(EvalError::UnsupportedOperator("=".into())));
        assert_eq!(evaluate("1 & 2"), Err(EvalError::UnsupportedOperator("&".into())));
    }

    #[test]
    fn test_non_boolean_result() {
        assert_eq!(evaluate("42"), Err(EvalError::NotBoolean("integer")));
        assert_eq!(evaluate("None"), Err(EvalError::NotBoolean("null")));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let parens = format!("{}1 < 2{}", "(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(evaluate(&parens), Err(EvalError::TooDeep(MAX_DEPTH)));

        let nots = format!("{}true", "!".repeat(10_000));
        assert_eq!(evaluate(&nots), Err(EvalError::TooDeep(MAX_DEPTH)));

        let minuses = format!("{}1 < 0", "-".repeat(10_000));
        assert_eq!(evaluate(&minuses), Err(EvalError::TooDeep(MAX_DEPTH)));
    }

    #[test]
    fn test_nesting_at_the_limit_evaluates() {
        let inside = format!("{}1 < 2{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert_eq!(evaluate(&inside), Ok(true));

        let over = format!("({inside})");
        assert_eq!(evaluate(&over), Err(EvalError::TooDeep(MAX_DEPTH)));
    }

    #[test]
    fn test_long_chains_stay_flat() {
        let chain = vec!["1 > 2"; 10_000].join(" || ");
        assert_eq!(evaluate(&chain), Ok(false));

        let chain = vec!["1 < 2"; 10_000].join(" && ");
        assert_eq!(evaluate(&chain), Ok(true));
    }
}
