//! Recursive-descent parser for TypeScript-style type declarations.
//!
//! Only the declarative subset is understood: interfaces (with `extends`),
//! type aliases, literal types, unions, intersections, arrays and inline
//! object types. Imports are skipped.

use super::expr::MAX_NESTING;
use super::lexer::{tokenize, Spanned, SyntaxError, Token};
use crate::domain::schema::GenerationDirective;
use serde_json::{Number, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    String,
    Number,
    Boolean,
    BigInt,
    Undefined,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    Keyword(Keyword),
    Literal(Value),
    Reference { name: String, line: usize },
    Object(Vec<Member>),
    Array(Box<TypeExpr>),
    Union(Vec<TypeExpr>),
    Intersection(Vec<TypeExpr>),
}

/// Tags recognised inside a doc comment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocTags {
    pub directive: Option<GenerationDirective>,
    /// `Some("")` for a bare `@id`.
    pub id: Option<String>,
}

impl DocTags {
    pub fn parse(doc: &str) -> Self {
        let mut tags = DocTags::default();
        for line in doc.lines() {
            let line = line.trim().trim_start_matches('*').trim();
            if let Some(rest) = strip_tag(line, "@mock").or_else(|| strip_tag(line, "@faker")) {
                tags.directive = GenerationDirective::parse(rest);
            } else if let Some(rest) = strip_tag(line, "@id") {
                tags.id = Some(rest.trim().to_string());
            }
        }
        tags
    }
}

fn strip_tag<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(tag)?;
    (rest.is_empty() || rest.starts_with(char::is_whitespace)).then_some(rest)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    pub ty: TypeExpr,
    pub optional: bool,
    pub tags: DocTags,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclarationBody {
    Interface { extends: Vec<String>, members: Vec<Member> },
    Alias(TypeExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub line: usize,
    pub tags: DocTags,
    pub body: DeclarationBody,
}

pub fn parse_declarations(source: &str) -> Result<Vec<Declaration>, SyntaxError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0, depth: 0 };
    parser.program()
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Spanned {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Spanned {
        let spanned = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        spanned
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        let at = self.peek();
        SyntaxError::new(at.line, at.column, message)
    }

    fn is_punct(&self, ch: char) -> bool {
        self.peek().token == Token::Punct(ch)
    }

    fn eat_punct(&mut self, ch: char) -> bool {
        if self.is_punct(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, ch: char) -> Result<(), SyntaxError> {
        if self.eat_punct(ch) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}', found {}", ch, describe(&self.peek().token))))
        }
    }

    fn is_ident(&self, word: &str) -> bool {
        matches!(&self.peek().token, Token::Ident(s) if s == word)
    }

    fn expect_ident(&mut self) -> Result<String, SyntaxError> {
        let start = self.pos;
        match self.advance().token {
            Token::Ident(name) => Ok(name),
            other => {
                self.pos = start;
                Err(self.error(format!("expected identifier, found {}", describe(&other))))
            }
        }
    }

    /// Collects any doc comments at the cursor; the last one wins.
    fn take_docs(&mut self) -> DocTags {
        let mut tags = DocTags::default();
        while let Token::Doc(doc) = &self.peek().token {
            tags = DocTags::parse(doc);
            self.advance();
        }
        tags
    }

    fn program(&mut self) -> Result<Vec<Declaration>, SyntaxError> {
        let mut declarations = Vec::new();
        loop {
            let tags = self.take_docs();
            if self.peek().token == Token::Eof {
                return Ok(declarations);
            }

            if self.is_ident("import") || (self.is_ident("export") && self.next_is_punct('{')) {
                self.skip_statement();
                continue;
            }

            while self.is_ident("export") || self.is_ident("declare") || self.is_ident("default") {
                self.advance();
            }

            if self.is_ident("interface") {
                declarations.push(self.interface(tags)?);
            } else if self.is_ident("type") {
                declarations.push(self.alias(tags)?);
            } else if self.eat_punct(';') {
                continue;
            } else {
                return Err(self.error(format!(
                    "expected 'interface' or 'type', found {}",
                    describe(&self.peek().token)
                )));
            }
        }
    }

    fn next_is_punct(&self, ch: char) -> bool {
        self.tokens
            .get(self.pos + 1)
            .is_some_and(|s| s.token == Token::Punct(ch))
    }

    fn skip_statement(&mut self) {
        while !matches!(self.peek().token, Token::Punct(';') | Token::Eof) {
            self.advance();
        }
        self.eat_punct(';');
    }

    fn interface(&mut self, tags: DocTags) -> Result<Declaration, SyntaxError> {
        let line = self.advance().line;
        let name = self.expect_ident()?;
        if self.is_punct('<') {
            return Err(self.error(format!("generic interface '{}' is not supported", name)));
        }

        let mut extends = Vec::new();
        if self.is_ident("extends") {
            self.advance();
            loop {
                extends.push(self.expect_ident()?);
                if !self.eat_punct(',') {
                    break;
                }
            }
        }

        let members = self.object_body()?;
        Ok(Declaration {
            name,
            line,
            tags,
            body: DeclarationBody::Interface { extends, members },
        })
    }

    fn alias(&mut self, tags: DocTags) -> Result<Declaration, SyntaxError> {
        let line = self.advance().line;
        let name = self.expect_ident()?;
        if self.is_punct('<') {
            return Err(self.error(format!("generic type '{}' is not supported", name)));
        }
        self.expect_punct('=')?;
        let ty = self.type_expr()?;
        self.eat_punct(';');
        Ok(Declaration {
            name,
            line,
            tags,
            body: DeclarationBody::Alias(ty),
        })
    }

    fn object_body(&mut self) -> Result<Vec<Member>, SyntaxError> {
        self.expect_punct('{')?;
        let mut members = Vec::new();
        loop {
            let tags = self.take_docs();
            if self.eat_punct('}') {
                return Ok(members);
            }

            while self.is_ident("readonly") && !self.next_is_punct(':') && !self.next_is_punct('?') {
                self.advance();
            }

            let start = self.pos;
            let name = match self.advance().token {
                Token::Ident(name) | Token::Str(name) | Token::Num(name) => name,
                other => {
                    self.pos = start;
                    return Err(self.error(format!("expected property name, found {}", describe(&other))));
                }
            };
            let optional = self.eat_punct('?');
            self.expect_punct(':')?;
            let ty = self.type_expr()?;

            if !self.eat_punct(';') && !self.eat_punct(',') && !self.is_punct('}') {
                return Err(self.error(format!(
                    "expected ';' or '}}' after property '{}', found {}",
                    name,
                    describe(&self.peek().token)
                )));
            }

            members.push(Member { name, ty, optional, tags });
        }
    }

    fn type_expr(&mut self) -> Result<TypeExpr, SyntaxError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(format!("type nested deeper than {} levels", MAX_NESTING)));
        }
        self.depth += 1;
        let ty = self.union();
        self.depth -= 1;
        ty
    }

    fn union(&mut self) -> Result<TypeExpr, SyntaxError> {
        self.eat_punct('|');
        let mut members = vec![self.intersection()?];
        while self.eat_punct('|') {
            members.push(self.intersection()?);
        }
        Ok(collapse(members, TypeExpr::Union))
    }

    fn intersection(&mut self) -> Result<TypeExpr, SyntaxError> {
        self.eat_punct('&');
        let mut members = vec![self.postfix()?];
        while self.eat_punct('&') {
            members.push(self.postfix()?);
        }
        Ok(collapse(members, TypeExpr::Intersection))
    }

    fn postfix(&mut self) -> Result<TypeExpr, SyntaxError> {
        let mut ty = self.primary()?;
        while self.is_punct('[') && self.next_is_punct(']') {
            self.advance();
            self.advance();
            ty = TypeExpr::Array(Box::new(ty));
        }
        Ok(ty)
    }

    fn primary(&mut self) -> Result<TypeExpr, SyntaxError> {
        let start = self.pos;
        let spanned = self.advance();
        match spanned.token {
            Token::Punct('(') => {
                let inner = self.type_expr()?;
                self.expect_punct(')')?;
                Ok(inner)
            }
            Token::Punct('{') => {
                self.pos = start;
                Ok(TypeExpr::Object(self.object_body()?))
            }
            Token::Str(s) => Ok(TypeExpr::Literal(Value::String(s))),
            Token::Num(raw) => number_literal(&raw)
                .map(TypeExpr::Literal)
                .ok_or_else(|| SyntaxError::new(spanned.line, spanned.column, format!("invalid number '{}'", raw))),
            Token::Ident(word) => self.named(word, spanned.line),
            other => {
                self.pos = start;
                Err(self.error(format!("expected a type, found {}", describe(&other))))
            }
        }
    }

    fn named(&mut self, word: String, line: usize) -> Result<TypeExpr, SyntaxError> {
        let ty = match word.as_str() {
            "string" => TypeExpr::Keyword(Keyword::String),
            "number" => TypeExpr::Keyword(Keyword::Number),
            "boolean" => TypeExpr::Keyword(Keyword::Boolean),
            "bigint" => TypeExpr::Keyword(Keyword::BigInt),
            "undefined" | "null" | "void" => TypeExpr::Keyword(Keyword::Undefined),
            "true" => TypeExpr::Literal(Value::Bool(true)),
            "false" => TypeExpr::Literal(Value::Bool(false)),
            "Array" | "ReadonlyArray" if self.is_punct('<') => {
                self.advance();
                let element = self.type_expr()?;
                self.expect_punct('>')?;
                TypeExpr::Array(Box::new(element))
            }
            _ => {
                let mut name = word;
                while self.is_punct('.') {
                    self.advance();
                    name.push('.');
                    name.push_str(&self.expect_ident()?);
                }
                if self.is_punct('<') {
                    return Err(self.error(format!("generic type '{}' is not supported", name)));
                }
                TypeExpr::Reference { name, line }
            }
        };
        Ok(ty)
    }
}

fn collapse(mut members: Vec<TypeExpr>, wrap: fn(Vec<TypeExpr>) -> TypeExpr) -> TypeExpr {
    if members.len() == 1 {
        members.remove(0)
    } else {
        wrap(members)
    }
}

fn number_literal(raw: &str) -> Option<Value> {
    if let Ok(int) = raw.parse::<i64>() {
        return Some(Value::Number(int.into()));
    }
    raw.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
}

fn describe(token: &Token) -> String {
    match token {
        Token::Ident(s) => format!("'{}'", s),
        Token::Str(s) => format!("string \"{}\"", s),
        Token::Num(n) => format!("number {}", n),
        Token::Punct(c) => format!("'{}'", c),
        Token::Doc(_) => "doc comment".to_string(),
        Token::Eof => "end of file".to_string(),
    }
}
