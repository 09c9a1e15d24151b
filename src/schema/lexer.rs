//! Tokenizer for type declaration files.

use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Str(String),
    /// Numeric literal kept as written.
    Num(String),
    Punct(char),
    /// Body of a `/** ... */` comment.
    Doc(String),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

const PUNCTUATION: &[char] = &['{', '}', '[', ']', '(', ')', '<', '>', ';', ':', ',', '|', '&', '?', '=', '.'];

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, SyntaxError> {
    let mut lexer = Lexer {
        chars: source.chars().peekable(),
        line: 1,
        column: 1,
    };
    let mut tokens = Vec::new();
    loop {
        let spanned = lexer.next_token()?;
        let done = spanned.token == Token::Eof;
        tokens.push(spanned);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next()
    }

    fn next_token(&mut self) -> Result<Spanned, SyntaxError> {
        loop {
            while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
                self.bump();
            }

            let (line, column) = (self.line, self.column);
            let Some(&ch) = self.chars.peek() else {
                return Ok(Spanned { token: Token::Eof, line, column });
            };

            let token = match ch {
                '/' if self.peek_second() == Some('/') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                    continue;
                }
                '/' if self.peek_second() == Some('*') => match self.block_comment(line, column)? {
                    Some(doc) => Token::Doc(doc),
                    None => continue,
                },
                '"' | '\'' | '`' => Token::Str(self.string(line, column)?),
                c if c.is_ascii_digit() || (c == '-' && self.peek_second().is_some_and(|d| d.is_ascii_digit())) => {
                    Token::Num(self.number())
                }
                c if c.is_alphabetic() || c == '_' || c == '$' => Token::Ident(self.identifier()),
                c if PUNCTUATION.contains(&c) => {
                    self.bump();
                    Token::Punct(c)
                }
                c => {
                    return Err(SyntaxError::new(line, column, format!("unexpected character '{}'", c)));
                }
            };

            return Ok(Spanned { token, line, column });
        }
    }

    /// Consumes a block comment; returns its text when it is a doc comment.
    fn block_comment(&mut self, line: usize, column: usize) -> Result<Option<String>, SyntaxError> {
        self.bump();
        self.bump();
        let is_doc = self.chars.peek() == Some(&'*') && self.peek_second() != Some('/');
        if is_doc {
            self.bump();
        }

        let mut body = String::new();
        loop {
            match self.bump() {
                Some('*') if self.chars.peek() == Some(&'/') => {
                    self.bump();
                    break;
                }
                Some(c) => body.push(c),
                None => return Err(SyntaxError::new(line, column, "unterminated comment")),
            }
        }

        Ok(is_doc.then_some(body))
    }

    fn string(&mut self, line: usize, column: usize) -> Result<String, SyntaxError> {
        let quote = self.bump().unwrap_or('"');
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c) => out.push(c),
                    None => break,
                },
                Some('\n') if quote != '`' => break,
                Some(c) => out.push(c),
                None => break,
            }
        }
        Err(SyntaxError::new(line, column, "unterminated string literal"))
    }

    fn number(&mut self) -> String {
        let mut text = String::new();
        if self.chars.peek() == Some(&'-') {
            text.push('-');
            self.bump();
        }
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || c == '.' || c == '_' {
                if c != '_' {
                    text.push(c);
                }
                self.bump();
            } else {
                break;
            }
        }
        text
    }

    fn identifier(&mut self) -> String {
        let mut ident = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                ident.push(c);
                self.bump();
            } else {
                break;
            }
        }
        ident
    }
}
