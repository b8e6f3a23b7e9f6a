//! Arithmetic evaluator behind `calculate_expression`.
//!
//! Accepts numbers, `+ - * / **`, unary minus and parentheses. Integers stay
//! integers until they meet a float or a division; `/` always yields a float.

use std::fmt;

/// Evaluate an expression and render the result the way the tool reports it:
/// the value on success, `Error: ...` otherwise.
pub fn calculate(expression: &str) -> String {
    match evaluate(expression) {
        Ok(value) => value.to_string(),
        Err(e) => format!("Error: {e}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(n) => n as f64,
            Self::Float(x) => x,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => f.write_str(&format_float(*x)),
        }
    }
}

/// Floats print like `2.0`, `0.30000000000000004` or `1e+20`.
fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".into();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf".into() } else { "-inf".into() };
    }
    let repr = format!("{x:?}");
    match repr.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or_default();
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exponent.abs())
        }
        None => repr,
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalcError {
    #[error("invalid syntax at position {0}")]
    Syntax(usize),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unsupported character {0:?} at position {1}")]
    UnsupportedCharacter(char, usize),
    #[error("unsupported operator {0:?}")]
    UnsupportedOperator(&'static str),
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("0.0 cannot be raised to a negative power")]
    ZeroToNegativePower,
    #[error("integer overflow")]
    Overflow,
    #[error("result is not a real number")]
    NotReal,
    #[error("expression nested too deeply")]
    TooDeep,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Number),
    Plus,
    Minus,
    Star,
    Slash,
    Power,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, CalcError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        let token = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '0'..='9' | '.' => {
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.' || chars[i] == '_') {
                    i += 1;
                }
                if i < chars.len() && matches!(chars[i], 'e' | 'E') {
                    i += 1;
                    if i < chars.len() && matches!(chars[i], '+' | '-') {
                        i += 1;
                    }
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push((start, Token::Number(parse_number(&text)?)));
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' if chars.get(i + 1) == Some(&'*') => {
                i += 1;
                Token::Power
            }
            '*' => Token::Star,
            '/' if chars.get(i + 1) == Some(&'/') => {
                return Err(CalcError::UnsupportedOperator("//"));
            }
            '/' => Token::Slash,
            '%' => return Err(CalcError::UnsupportedOperator("%")),
            '(' => Token::LParen,
            ')' => Token::RParen,
            other => return Err(CalcError::UnsupportedCharacter(other, start)),
        };
        tokens.push((start, token));
        i += 1;
    }

    Ok(tokens)
}

fn parse_number(text: &str) -> Result<Number, CalcError> {
    let invalid = || CalcError::InvalidNumber(text.to_string());
    if text.starts_with('_') || text.ends_with('_') || text.contains("__") {
        return Err(invalid());
    }
    let digits = text.replace('_', "");
    if digits.contains(['.', 'e', 'E']) {
        digits.parse().map(Number::Float).map_err(|_| invalid())
    } else {
        if digits.len() > 1 && digits.starts_with('0') && digits.bytes().any(|b| b != b'0') {
            return Err(invalid());
        }
        digits
            .parse()
            .map(Number::Int)
            .map_err(|_| CalcError::Overflow)
    }
}

/// Recursive-descent parser that evaluates as it goes.
///
/// ```text
/// expr  := term (('+' | '-') term)*
/// term  := unary (('*' | '/') unary)*
/// unary := ('-' | '+') unary | power
/// power := atom ('**' unary)?
/// atom  := number | '(' expr ')'
/// ```
/// Deepest nesting of parentheses, unary minus and exponents accepted.
const MAX_DEPTH: usize = 256;

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Result<(usize, Token), CalcError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(CalcError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn expr(&mut self) -> Result<Number, CalcError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value = add(value, self.term()?)?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value = sub(value, self.term()?)?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<Number, CalcError> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    value = mul(value, self.unary()?)?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    value = div(value, self.unary()?)?;
                }
                _ => return Ok(value),
            }
        }
    }

    /// Every recursive path passes through here, so the depth check lives here.
    fn unary(&mut self) -> Result<Number, CalcError> {
        if self.depth >= MAX_DEPTH {
            return Err(CalcError::TooDeep);
        }
        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    fn signed(&mut self) -> Result<Number, CalcError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                neg(self.unary()?)
            }
            Some(Token::Plus) => Err(CalcError::UnsupportedOperator("unary +")),
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Number, CalcError> {
        let base = self.atom()?;
        if self.peek() == Some(&Token::Power) {
            self.pos += 1;
            let exponent = self.unary()?;
            return pow(base, exponent);
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Number, CalcError> {
        match self.next()? {
            (_, Token::Number(n)) => Ok(n),
            (_, Token::LParen) => {
                let value = self.expr()?;
                match self.next()? {
                    (_, Token::RParen) => Ok(value),
                    (pos, _) => Err(CalcError::Syntax(pos)),
                }
            }
            (pos, _) => Err(CalcError::Syntax(pos)),
        }
    }
}

pub fn evaluate(expression: &str) -> Result<Number, CalcError> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    match parser.tokens.get(parser.pos) {
        None => Ok(value),
        Some((pos, _)) => Err(CalcError::Syntax(*pos)),
    }
}

fn add(a: Number, b: Number) -> Result<Number, CalcError> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => x.checked_add(y).map(Number::Int).ok_or(CalcError::Overflow),
        _ => Ok(Number::Float(a.as_f64() + b.as_f64())),
    }
}

fn sub(a: Number, b: Number) -> Result<Number, CalcError> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => x.checked_sub(y).map(Number::Int).ok_or(CalcError::Overflow),
        _ => Ok(Number::Float(a.as_f64() - b.as_f64())),
    }
}

fn mul(a: Number, b: Number) -> Result<Number, CalcError> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => x.checked_mul(y).map(Number::Int).ok_or(CalcError::Overflow),
        _ => Ok(Number::Float(a.as_f64() * b.as_f64())),
    }
}

fn div(a: Number, b: Number) -> Result<Number, CalcError> {
    let divisor = b.as_f64();
    if divisor == 0.0 {
        return Err(CalcError::DivisionByZero);
    }
    Ok(Number::Float(a.as_f64() / divisor))
}

fn neg(a: Number) -> Result<Number, CalcError> {
    match a {
        Number::Int(x) => x.checked_neg().map(Number::Int).ok_or(CalcError::Overflow),
        Number::Float(x) => Ok(Number::Float(-x)),
    }
}

fn pow(base: Number, exponent: Number) -> Result<Number, CalcError> {
    if let (Number::Int(b), Number::Int(e)) = (base, exponent) {
        if e >= 0 {
            let e = u32::try_from(e).map_err(|_| CalcError::Overflow)?;
            return b.checked_pow(e).map(Number::Int).ok_or(CalcError::Overflow);
        }
    }

    let (b, e) = (base.as_f64(), exponent.as_f64());
    if b == 0.0 && e < 0.0 {
        return Err(CalcError::ZeroToNegativePower);
    }
    if b < 0.0 && e.fract() != 0.0 {
        return Err(CalcError::NotReal);
    }
    Ok(Number::Float(b.powf(e)))
}
