//! Language-agnostic description of a declared shape.
//!
//! A [`TypeSchema`] is built once during extraction and never mutated
//! afterwards. Object fields keep their declaration order, which is the order
//! generated objects are emitted in.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Recursive shape description.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TypeSchema {
    String,
    Number,
    Boolean,
    #[serde(rename = "bigint")]
    BigInt,
    Literal {
        value: Value,
    },
    Undefined,
    Array {
        element: Box<TypeSchema>,
    },
    Object {
        fields: Vec<Field>,
    },
    Union {
        members: Vec<TypeSchema>,
    },
    Intersection {
        members: Vec<TypeSchema>,
    },
}

/// Discriminant of a [`TypeSchema`], used for logging and introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    String,
    Number,
    Boolean,
    #[serde(rename = "bigint")]
    BigInt,
    Literal,
    Undefined,
    Array,
    Object,
    Union,
    Intersection,
}

impl SchemaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaKind::String => "string",
            SchemaKind::Number => "number",
            SchemaKind::Boolean => "boolean",
            SchemaKind::BigInt => "bigint",
            SchemaKind::Literal => "literal",
            SchemaKind::Undefined => "undefined",
            SchemaKind::Array => "array",
            SchemaKind::Object => "object",
            SchemaKind::Union => "union",
            SchemaKind::Intersection => "intersection",
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single named member of an object schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub schema: TypeSchema,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directive: Option<GenerationDirective>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, schema: TypeSchema) -> Self {
        Self {
            name: name.into(),
            schema,
            directive: None,
            optional: false,
        }
    }

    pub fn with_directive(mut self, directive: GenerationDirective) -> Self {
        self.directive = Some(directive);
        self
    }
}

/// Per-field instruction naming the generator function to use instead of the
/// kind default.
///
/// `args` holds the raw argument expression exactly as written in the
/// annotation. It is evaluated lazily by the engine so a malformed expression
/// only degrades that one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationDirective {
    pub function_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
}

impl GenerationDirective {
    pub fn new(function_path: impl Into<String>) -> Self {
        Self {
            function_path: function_path.into(),
            args: None,
        }
    }

    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = Some(args.into());
        self
    }

    /// Parse the text following an `@mock` tag, e.g.
    /// `number.int({ min: 1, max: 10 })`.
    ///
    /// Returns `None` when no function path is present.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let (path, args) = match text.find('(') {
            Some(open) => {
                let close = text.rfind(')').filter(|close| *close > open)?;
                let inner = text[open + 1..close].trim();
                let args = (!inner.is_empty()).then(|| inner.to_string());
                (text[..open].trim(), args)
            }
            None => (text.split_whitespace().next().unwrap_or(""), None),
        };

        if path.is_empty() {
            return None;
        }

        Some(Self {
            function_path: path.to_string(),
            args,
        })
    }
}

impl TypeSchema {
    pub fn literal(value: impl Into<Value>) -> Self {
        TypeSchema::Literal {
            value: value.into(),
        }
    }

    pub fn array(element: TypeSchema) -> Self {
        TypeSchema::Array {
            element: Box::new(element),
        }
    }

    pub fn object(fields: Vec<Field>) -> Self {
        TypeSchema::Object { fields }
    }

    pub fn union(members: Vec<TypeSchema>) -> Self {
        TypeSchema::Union { members }
    }

    pub fn intersection(members: Vec<TypeSchema>) -> Self {
        TypeSchema::Intersection { members }
    }

    pub fn kind(&self) -> SchemaKind {
        match self {
            TypeSchema::String => SchemaKind::String,
            TypeSchema::Number => SchemaKind::Number,
            TypeSchema::Boolean => SchemaKind::Boolean,
            TypeSchema::BigInt => SchemaKind::BigInt,
            TypeSchema::Literal { .. } => SchemaKind::Literal,
            TypeSchema::Undefined => SchemaKind::Undefined,
            TypeSchema::Array { .. } => SchemaKind::Array,
            TypeSchema::Object { .. } => SchemaKind::Object,
            TypeSchema::Union { .. } => SchemaKind::Union,
            TypeSchema::Intersection { .. } => SchemaKind::Intersection,
        }
    }

    /// Nested schemas in declaration order.
    pub fn children(&self) -> Vec<&TypeSchema> {
        match self {
            TypeSchema::Array { element } => vec![element.as_ref()],
            TypeSchema::Object { fields } => fields.iter().map(|f| &f.schema).collect(),
            TypeSchema::Union { members } | TypeSchema::Intersection { members } => {
                members.iter().collect()
            }
            _ => Vec::new(),
        }
    }

    /// Object fields, empty for every other kind.
    pub fn fields(&self) -> &[Field] {
        match self {
            TypeSchema::Object { fields } => fields,
            _ => &[],
        }
    }

    /// Maximum nesting depth of the tree (a leaf has depth 1).
    pub fn depth(&self) -> usize {
        1 + self
            .children()
            .into_iter()
            .map(TypeSchema::depth)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_directive_parse_path_only() {
        let directive = GenerationDirective::parse(" person.firstName ").unwrap();
        assert_eq!(directive.function_path, "person.firstName");
        assert!(directive.args.is_none());
    }

    #[test]
    fn test_directive_parse_with_args() {
        let directive = GenerationDirective::parse("number.int({ min: 1, max: 10 })").unwrap();
        assert_eq!(directive.function_path, "number.int");
        assert_eq!(directive.args.as_deref(), Some("{ min: 1, max: 10 }"));
    }

    #[test]
    fn test_directive_parse_empty_parens() {
        let directive = GenerationDirective::parse("lorem.word()").unwrap();
        assert_eq!(directive.function_path, "lorem.word");
        assert!(directive.args.is_none());
    }

    #[test]
    fn test_directive_parse_rejects_empty() {
        assert!(GenerationDirective::parse("   ").is_none());
        assert!(GenerationDirective::parse("(1)").is_none());
    }

    #[test]
    fn test_children_and_depth() {
        let schema = TypeSchema::object(vec![
            Field::new("tags", TypeSchema::array(TypeSchema::String)),
            Field::new(
                "status",
                TypeSchema::union(vec![TypeSchema::literal("a"), TypeSchema::literal("b")]),
            ),
        ]);

        assert_eq!(schema.kind(), SchemaKind::Object);
        assert_eq!(schema.children().len(), 2);
        assert_eq!(schema.depth(), 3);
    }

    #[test]
    fn test_serializes_with_kind_tag() {
        let schema = TypeSchema::array(TypeSchema::BigInt);
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value, json!({ "kind": "array", "element": { "kind": "bigint" } }));
    }
}
