//! Restricted evaluator for directive argument expressions.
//!
//! Accepts a side-effect-free superset of JSON: bare identifier keys,
//! single-quoted strings, trailing commas and `undefined`. Nothing is ever
//! executed; the text is only parsed into a [`Value`].

use serde_json::{Map, Number, Value};
use std::iter::Peekable;
use std::str::CharIndices;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ExprError {
    #[error("Unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    #[error("Invalid number '{0}'")]
    InvalidNumber(String),

    #[error("Unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("Trailing input at offset {0}")]
    TrailingInput(usize),

    #[error("Nesting deeper than {max} levels at offset {0}", max = MAX_NESTING)]
    TooDeep(usize),
}

/// Deepest bracket nesting accepted by the expression and declaration parsers.
pub const MAX_NESTING: usize = 128;

/// Parse an argument expression into a JSON value.
pub fn evaluate(source: &str) -> Result<Value, ExprError> {
    let mut parser = ExprParser {
        chars: source.char_indices().peekable(),
        depth: 0,
    };
    let value = parser.value()?;
    parser.skip_whitespace();
    match parser.chars.peek() {
        Some(&(offset, _)) => Err(ExprError::TrailingInput(offset)),
        None => Ok(value),
    }
}

/// Parse a comma separated argument list, e.g. `1, 10`.
///
/// A single argument is returned unwrapped; several become an array.
pub fn evaluate_args(source: &str) -> Result<Value, ExprError> {
    let mut parser = ExprParser {
        chars: source.char_indices().peekable(),
        depth: 0,
    };
    let mut items = Vec::new();
    loop {
        items.push(parser.value()?);
        parser.skip_whitespace();
        match parser.chars.next() {
            None => break,
            Some((_, ',')) => {
                parser.skip_whitespace();
                if parser.chars.peek().is_none() {
                    break;
                }
            }
            Some((offset, ch)) => return Err(ExprError::UnexpectedChar { ch, offset }),
        }
    }

    if items.len() == 1 {
        Ok(items.remove(0))
    } else {
        Ok(Value::Array(items))
    }
}

struct ExprParser<'a> {
    chars: Peekable<CharIndices<'a>>,
    depth: usize,
}

impl<'a> ExprParser<'a> {
    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some((_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn peek_char(&mut self) -> Result<(usize, char), ExprError> {
        self.skip_whitespace();
        self.chars.peek().copied().ok_or(ExprError::UnexpectedEnd)
    }

    fn expect(&mut self, expected: char) -> Result<(), ExprError> {
        let (offset, ch) = self.peek_char()?;
        if ch != expected {
            return Err(ExprError::UnexpectedChar { ch, offset });
        }
        self.chars.next();
        Ok(())
    }

    fn value(&mut self) -> Result<Value, ExprError> {
        let (offset, ch) = self.peek_char()?;
        match ch {
            '{' | '[' => {
                if self.depth >= MAX_NESTING {
                    return Err(ExprError::TooDeep(offset));
                }
                self.depth += 1;
                let nested = if ch == '{' { self.object() } else { self.array() };
                self.depth -= 1;
                nested
            }
            '"' | '\'' => self.string().map(Value::String),
            '-' | '+' | '.' | '0'..='9' => self.number(),
            c if is_ident_start(c) => {
                let ident = self.identifier();
                match ident.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    "null" | "undefined" => Ok(Value::Null),
                    _ => Err(ExprError::UnknownIdentifier(ident)),
                }
            }
            _ => Err(ExprError::UnexpectedChar { ch, offset }),
        }
    }

    fn object(&mut self) -> Result<Value, ExprError> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            let (offset, ch) = self.peek_char()?;
            if ch == '}' {
                self.chars.next();
                break;
            }

            let key = match ch {
                '"' | '\'' => self.string()?,
                c if is_ident_start(c) => self.identifier(),
                '0'..='9' => self.identifier(),
                _ => return Err(ExprError::UnexpectedChar { ch, offset }),
            };
            self.expect(':')?;
            let value = self.value()?;
            map.insert(key, value);

            let (offset, ch) = self.peek_char()?;
            match ch {
                ',' => {
                    self.chars.next();
                }
                '}' => {}
                _ => return Err(ExprError::UnexpectedChar { ch, offset }),
            }
        }
        Ok(Value::Object(map))
    }

    fn array(&mut self) -> Result<Value, ExprError> {
        self.expect('[')?;
        let mut items = Vec::new();
        loop {
            if self.peek_char()?.1 == ']' {
                self.chars.next();
                break;
            }

            items.push(self.value()?);

            let (offset, ch) = self.peek_char()?;
            match ch {
                ',' => {
                    self.chars.next();
                }
                ']' => {}
                _ => return Err(ExprError::UnexpectedChar { ch, offset }),
            }
        }
        Ok(Value::Array(items))
    }

    fn string(&mut self) -> Result<String, ExprError> {
        let (_, quote) = self.chars.next().ok_or(ExprError::UnexpectedEnd)?;
        let mut out = String::new();
        loop {
            let (offset, ch) = self.chars.next().ok_or(ExprError::UnexpectedEnd)?;
            match ch {
                c if c == quote => return Ok(out),
                '\\' => {
                    let (_, escaped) = self.chars.next().ok_or(ExprError::UnexpectedEnd)?;
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        'u' => out.push(self.unicode_escape(offset)?),
                        other => out.push(other),
                    }
                }
                c => out.push(c),
            }
        }
    }

    fn unicode_escape(&mut self, offset: usize) -> Result<char, ExprError> {
        let mut code = 0u32;
        for _ in 0..4 {
            let (_, ch) = self.chars.next().ok_or(ExprError::UnexpectedEnd)?;
            let digit = ch
                .to_digit(16)
                .ok_or(ExprError::UnexpectedChar { ch, offset })?;
            code = code * 16 + digit;
        }
        char::from_u32(code).ok_or(ExprError::UnexpectedChar { ch: 'u', offset })
    }

    fn number(&mut self) -> Result<Value, ExprError> {
        let mut text = String::new();
        while let Some(&(_, ch)) = self.chars.peek() {
            if ch.is_ascii_digit() || matches!(ch, '-' | '+' | '.' | 'e' | 'E' | '_') {
                if ch != '_' {
                    text.push(ch);
                }
                self.chars.next();
            } else {
                break;
            }
        }

        let trimmed = text.strip_prefix('+').unwrap_or(&text);
        if let Ok(int) = trimmed.parse::<i64>() {
            return Ok(Value::Number(int.into()));
        }
        trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or(ExprError::InvalidNumber(text))
    }

    fn identifier(&mut self) -> String {
        let mut ident = String::new();
        while let Some(&(_, ch)) = self.chars.peek() {
            if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                ident.push(ch);
                self.chars.next();
            } else {
                break;
            }
        }
        ident
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}
