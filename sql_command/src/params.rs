//! Caller payload parsing
//!
//! Payloads arrive as a literal string such as `("alice",)` or
//! `['bob', 1200, None]`. The parser accepts a tuple or list of scalars, or
//! a single bare scalar, and nothing else. It never evaluates anything: an
//! identifier, call, operator or nested container is a parse error.

use crate::error::{Error, Result};
use crate::value::SqlValue;

/// Parse a payload into positional parameters.
///
/// A blank payload is an empty parameter list.
pub fn parse_parameters(input: &str) -> Result<Vec<SqlValue>> {
    let mut parser = LiteralParser::new(input);
    parser.skip_whitespace();
    if parser.at_end() {
        return Ok(Vec::new());
    }

    let values = match parser.peek() {
        Some('(') => parser.parse_sequence(')')?,
        Some('[') => parser.parse_sequence(']')?,
        _ => vec![parser.parse_scalar()?],
    };

    parser.skip_whitespace();
    if !parser.at_end() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(values)
}

/// Parse an optional payload; `None` means no parameters
pub fn parse_optional(input: Option<&str>) -> Result<Vec<SqlValue>> {
    input.map_or_else(|| Ok(Vec::new()), parse_parameters)
}

struct LiteralParser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> LiteralParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: &str) -> Error {
        Error::ParameterParseError(format!(
            "{} at position {} in {:?}",
            message, self.pos, self.input
        ))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().map_or(false, char::is_whitespace) {
            self.pos += 1;
        }
    }

    /// `(a, b,)` / `[a, b]`; a trailing comma is allowed, nesting is not.
    fn parse_sequence(&mut self, close: char) -> Result<Vec<SqlValue>> {
        self.bump();
        let mut values = Vec::new();

        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(c) if c == close => {
                    self.bump();
                    return Ok(values);
                }
                None => return Err(self.error(&format!("missing closing '{}'", close))),
                _ => {}
            }

            values.push(self.parse_scalar()?);

            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some(c) if c == close => return Ok(values),
                Some(_) => {
                    self.pos -= 1;
                    return Err(self.error(&format!("expected ',' or '{}'", close)));
                }
                None => return Err(self.error(&format!("missing closing '{}'", close))),
            }
        }
    }

    fn parse_scalar(&mut self) -> Result<SqlValue> {
        self.skip_whitespace();
        match self.peek() {
            Some('\'') | Some('"') => self.parse_string(),
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.parse_number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.parse_keyword(),
            Some('(') | Some('[') | Some('{') => Err(self.error("nested containers are not allowed")),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("expected a value")),
        }
    }

    fn parse_keyword(&mut self) -> Result<SqlValue> {
        let start = self.pos;
        while self.peek().map_or(false, |c| c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();

        match word.as_str() {
            "None" | "null" => Ok(SqlValue::Null),
            "True" | "true" => Ok(SqlValue::Bool(true)),
            "False" | "false" => Ok(SqlValue::Bool(false)),
            _ => {
                self.pos = start;
                Err(self.error(&format!("'{}' is not a literal", word)))
            }
        }
    }

    fn parse_number(&mut self) -> Result<SqlValue> {
        let start = self.pos;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.pos += 1;
        }

        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {}
                '.' => is_float = true,
                'e' | 'E' => {
                    is_float = true;
                    if matches!(self.chars.get(self.pos + 1), Some('-') | Some('+')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
            self.pos += 1;
        }

        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();

        let value = if is_float {
            text.parse::<f64>().ok().filter(|v| v.is_finite()).map(SqlValue::Float)
        } else {
            text.parse::<i64>().ok().map(SqlValue::Int)
        };

        value.ok_or_else(|| {
            self.pos = start;
            self.error(&format!("'{}' is not a valid number", text))
        })
    }

    fn parse_string(&mut self) -> Result<SqlValue> {
        let quote = self.bump().ok_or_else(|| self.error("expected a string"))?;
        let mut value = String::new();

        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => break,
                Some('\\') => value.push(self.parse_escape()?),
                Some(c) => value.push(c),
            }
        }

        Ok(SqlValue::Text(value))
    }

    fn parse_escape(&mut self) -> Result<char> {
        let c = self.bump().ok_or_else(|| self.error("unterminated escape"))?;
        let escaped = match c {
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '0' => '\0',
            'x' => self.parse_code_point(2)?,
            'u' => self.parse_code_point(4)?,
            'U' => self.parse_code_point(8)?,
            other => return Err(self.error(&format!("unknown escape '\\{}'", other))),
        };
        Ok(escaped)
    }

    fn parse_code_point(&mut self, digits: usize) -> Result<char> {
        let end = self.pos + digits;
        if end > self.chars.len() {
            return Err(self.error("truncated escape"));
        }
        let hex: String = self.chars[self.pos..end].iter().collect();
        let code = u32::from_str_radix(&hex, 16).map_err(|_| self.error("invalid hex escape"))?;
        self.pos = end;
        char::from_u32(code).ok_or_else(|| self.error("escape is not a valid character"))
    }
}
