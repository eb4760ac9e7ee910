//! Parser for transfer-function text such as `10 / (s^2 + 2*s + 10)`.
//!
//! The grammar is deliberately small: real numbers, the variable `s`,
//! parentheses, `+ - * /`, and integer powers written `^` or `**`.
//! Multiplication may be implicit (`2s`, `(s+1)(s+2)`, `s(s+3)`).
//!
//! ```text
//! expr  := term (('+' | '-') term)*
//! term  := unary (('*' | '/') unary | <implicit> power)*
//! unary := ('-' | '+') unary | power
//! power := atom (('^' | '**') ['-' | '+'] integer)?
//! atom  := number | 's' | '(' expr ')'
//! ```

use crate::error::ParseError;
use crate::rational::RationalFunction;

/// Exponents beyond this are rejected rather than expanded.
const MAX_EXPONENT: f64 = 64.0;
/// Highest polynomial degree an intermediate result may reach.
pub const MAX_DEGREE: usize = 64;
/// Deepest nesting of parentheses and unary signs.
pub const MAX_NESTING: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Var,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {}", n),
            Token::Var => "`s`".to_string(),
            Token::Plus => "`+`".to_string(),
            Token::Minus => "`-`".to_string(),
            Token::Star => "`*`".to_string(),
            Token::Slash => "`/`".to_string(),
            Token::Caret => "`^`".to_string(),
            Token::LParen => "`(`".to_string(),
            Token::RParen => "`)`".to_string(),
        }
    }
}

/// Parse an expression into a rational function.
pub fn parse_expression(text: &str) -> Result<RationalFunction, ParseError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(ParseError::new(text, 0, "empty expression"));
    }
    let mut parser = Parser {
        text,
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some((tok, at)) = parser.peek_with_offset() {
        return Err(parser.error(at, format!("unexpected {}", tok.describe())));
    }
    Ok(value)
}

/// Parse an expression into numerator and denominator coefficients, highest
/// power first.
pub fn parse_coefficients(text: &str) -> Result<(Vec<f64>, Vec<f64>), ParseError> {
    let value = parse_expression(text)?;
    Ok((
        value.numerator().descending(),
        value.denominator().descending(),
    ))
}

fn tokenize(text: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        let start = i;
        match c {
            c if c.is_ascii_whitespace() => {
                i += 1;
                continue;
            }
            '0'..='9' | '.' => {
                i = scan_number(bytes, i);
                let literal = &text[start..i];
                let value: f64 = literal.parse().map_err(|_| {
                    ParseError::new(text, start, format!("invalid number `{}`", literal))
                })?;
                tokens.push((Token::Number(value), start));
                continue;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                while i < bytes.len() && ((bytes[i] as char).is_ascii_alphabetic() || bytes[i] == b'_') {
                    i += 1;
                }
                let ident = &text[start..i];
                if ident != "s" {
                    return Err(ParseError::new(
                        text,
                        start,
                        format!("unknown identifier `{}` (the only variable is `s`)", ident),
                    ));
                }
                tokens.push((Token::Var, start));
                continue;
            }
            '+' => tokens.push((Token::Plus, start)),
            '-' => tokens.push((Token::Minus, start)),
            '*' if bytes.get(i + 1) == Some(&b'*') => {
                tokens.push((Token::Caret, start));
                i += 1;
            }
            '*' => tokens.push((Token::Star, start)),
            '/' => tokens.push((Token::Slash, start)),
            '^' => tokens.push((Token::Caret, start)),
            '(' => tokens.push((Token::LParen, start)),
            ')' => tokens.push((Token::RParen, start)),
            other => {
                let ch = text[start..].chars().next().unwrap_or(other);
                return Err(ParseError::new(
                    text,
                    start,
                    format!("unexpected character `{}`", ch),
                ));
            }
        }
        i += 1;
    }
    Ok(tokens)
}

/// Advance past `digits [. digits] [(e|E) [+-] digits]`.
fn scan_number(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
        i += 1;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }
    i
}

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
}

fn degree(value: &RationalFunction) -> usize {
    let num = value.numerator().degree().unwrap_or(0);
    let den = value.denominator().degree().unwrap_or(0);
    num.max(den)
}

impl Parser<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).map(|(t, _)| *t)
    }

    fn peek_with_offset(&self) -> Option<(Token, usize)> {
        self.tokens.get(self.pos).copied()
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, at)| *at)
            .unwrap_or(self.text.len())
    }

    fn previous(&self) -> Option<Token> {
        self.pos.checked_sub(1).and_then(|p| self.tokens.get(p)).map(|(t, _)| *t)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn error(&self, at: usize, message: impl Into<String>) -> ParseError {
        ParseError::new(self.text, at, message)
    }

    fn bounded(&self, at: usize, value: RationalFunction) -> Result<RationalFunction, ParseError> {
        if degree(&value) > MAX_DEGREE {
            return Err(self.error(at, format!("degree exceeds {}", MAX_DEGREE)));
        }
        Ok(value)
    }

    /// Run `inner` one nesting level down.
    fn nested<T>(
        &mut self,
        inner: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(self.offset(), format!("nesting deeper than {}", MAX_NESTING)));
        }
        self.depth += 1;
        let result = inner(self);
        self.depth -= 1;
        result
    }

    fn expr(&mut self) -> Result<RationalFunction, ParseError> {
        let mut acc = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    let at = self.offset();
                    self.advance();
                    let sum = &acc + &self.term()?;
                    acc = self.bounded(at, sum)?;
                }
                Some(Token::Minus) => {
                    let at = self.offset();
                    self.advance();
                    let difference = &acc - &self.term()?;
                    acc = self.bounded(at, difference)?;
                }
                _ => return Ok(acc),
            }
        }
    }

    fn term(&mut self) -> Result<RationalFunction, ParseError> {
        let mut acc = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    let at = self.offset();
                    self.advance();
                    let product = &acc * &self.unary()?;
                    acc = self.bounded(at, product)?;
                }
                Some(Token::Slash) => {
                    let at = self.offset();
                    self.advance();
                    let rhs = self.unary()?;
                    let quotient = acc
                        .checked_div(&rhs)
                        .ok_or_else(|| self.error(at, "division by the zero polynomial"))?;
                    acc = self.bounded(at, quotient)?;
                }
                Some(next) if self.implicit_product(next) => {
                    let at = self.offset();
                    let product = &acc * &self.power()?;
                    acc = self.bounded(at, product)?;
                }
                _ => return Ok(acc),
            }
        }
    }

    /// `2s`, `s(...)`, `(...)(...)`, `s 2` multiply; `2 3` does not.
    fn implicit_product(&self, next: Token) -> bool {
        match next {
            Token::Var | Token::LParen => true,
            Token::Number(_) => matches!(self.previous(), Some(Token::Var | Token::RParen)),
            _ => false,
        }
    }

    fn unary(&mut self) -> Result<RationalFunction, ParseError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                Ok(-&self.nested(Self::unary)?)
            }
            Some(Token::Plus) => {
                self.advance();
                self.nested(Self::unary)
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<RationalFunction, ParseError> {
        let base = self.atom()?;
        if self.peek() != Some(Token::Caret) {
            return Ok(base);
        }
        self.advance();
        let at = self.offset();
        let negative = match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                true
            }
            Some(Token::Plus) => {
                self.advance();
                false
            }
            _ => false,
        };
        let exponent = match self.peek() {
            Some(Token::Number(n)) if n.fract() == 0.0 && n <= MAX_EXPONENT => n as i32,
            Some(Token::Number(n)) if n.fract() == 0.0 => {
                return Err(self.error(at, format!("exponent {} is too large", n)));
            }
            Some(_) | None => {
                return Err(self.error(at, "exponent must be an integer"));
            }
        };
        self.advance();
        let exponent = if negative { -exponent } else { exponent };
        // Reject before expanding.
        if degree(&base) * exponent.unsigned_abs() as usize > MAX_DEGREE {
            return Err(self.error(at, format!("degree exceeds {}", MAX_DEGREE)));
        }
        base.powi(exponent)
            .ok_or_else(|| self.error(at, "zero raised to a negative power"))
    }

    fn atom(&mut self) -> Result<RationalFunction, ParseError> {
        let at = self.offset();
        match self.peek() {
            Some(Token::Number(n)) => {
                self.advance();
                Ok(RationalFunction::constant(n))
            }
            Some(Token::Var) => {
                self.advance();
                Ok(RationalFunction::s())
            }
            Some(Token::LParen) => {
                self.advance();
                let inner = self.nested(Self::expr)?;
                if self.peek() != Some(Token::RParen) {
                    return Err(self.error(self.offset(), "expected `)`"));
                }
                self.advance();
                Ok(inner)
            }
            Some(tok) => Err(self.error(
                at,
                format!("expected a number, `s` or `(`, found {}", tok.describe()),
            )),
            None => Err(self.error(at, "unexpected end of input")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn coeffs(text: &str) -> (Vec<f64>, Vec<f64>) {
        parse_coefficients(text).unwrap()
    }

    #[test]
    fn test_accepted_formats() {
        assert_eq!(coeffs("10 / (s^2 + 2*s + 10)"), (vec![10.0], vec![1.0, 2.0, 10.0]));
        assert_eq!(coeffs("5 / (s^2 + 5)"), (vec![5.0], vec![1.0, 0.0, 5.0]));
        assert_eq!(coeffs("1 / (s + 1)"), (vec![1.0], vec![1.0, 1.0]));
        assert_eq!(coeffs("s / (s^2 + 3*s + 2)"), (vec![1.0, 0.0], vec![1.0, 3.0, 2.0]));
    }

    #[test]
    fn test_power_spellings() {
        assert_eq!(coeffs("s**2"), (vec![1.0, 0.0, 0.0], vec![1.0]));
        assert_eq!(coeffs("s*s*s"), (vec![1.0, 0.0, 0.0, 0.0], vec![1.0]));
        assert_eq!(coeffs("s^-1"), (vec![1.0], vec![1.0, 0.0]));
    }

    #[test]
    fn test_implicit_multiplication() {
        assert_eq!(coeffs("2s + 1"), (vec![2.0, 1.0], vec![1.0]));
        assert_eq!(coeffs("(s+1)(s+2)"), (vec![1.0, 3.0, 2.0], vec![1.0]));
        assert_eq!(coeffs("s(s+3)"), (vec![1.0, 3.0, 0.0], vec![1.0]));
    }

    #[test]
    fn test_unary_minus_and_exponent_literals() {
        let g = parse_expression("-s^2 + 1e-1*s").unwrap();
        assert_relative_eq!(g.eval(2.0), -4.0 + 0.2);
        let g = parse_expression("-(s + 1)").unwrap();
        assert_relative_eq!(g.eval(1.0), -2.0);
    }

    #[test]
    fn test_division_by_zero_polynomial() {
        let err = parse_expression("1 / (s - s)").unwrap_err();
        assert_eq!(err.offset, 2);
        assert!(err.message.contains("zero polynomial"));
        assert_eq!(err.text, "1 / (s - s)");
    }

    #[test]
    fn test_malformed_input() {
        assert!(parse_expression("").is_err());
        assert!(parse_expression("1/(s+").is_err());
        assert!(parse_expression("2 3").is_err());
        assert!(parse_expression("s^1.5").is_err());
        assert!(parse_expression("s^100").is_err());
        assert!(parse_expression("(s+1").is_err());
        assert!(parse_expression("s $ 1").is_err());

        let err = parse_expression("x + 1").unwrap_err();
        assert_eq!(err.offset, 0);
        assert!(err.message.contains("unknown identifier `x`"));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let deep = format!("{}s{}", "(".repeat(5000), ")".repeat(5000));
        let err = parse_expression(&deep).unwrap_err();
        assert!(err.message.contains("nesting"), "{}", err.message);
        assert!(parse_expression(&"-".repeat(5000)).is_err());

        let fine = format!("{}s{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(coeffs(&fine), (vec![1.0, 0.0], vec![1.0]));
    }

    #[test]
    fn test_degree_is_bounded() {
        let err = parse_expression("((s+1)^64)^64").unwrap_err();
        assert!(err.message.contains("degree exceeds 64"), "{}", err.message);
        assert!(parse_expression("(s^40)(s^40)").is_err());
        assert!(parse_expression("s^40 / (1/s^40)").is_err());
        assert!(parse_expression("1/(s^40 + 1) + 1/(s^40 + 2)").is_err());

        assert_eq!(parse_expression("(s+1)^64").unwrap().numerator().degree(), Some(64));
        assert_eq!(parse_expression("s^40 + s^39").unwrap().numerator().degree(), Some(40));
    }

    #[test]
    fn test_code_is_never_evaluated() {
        assert!(parse_expression("__import__").is_err());
        assert!(parse_expression("exp(s)").is_err());
    }
}
