use super::parser::{Declaration, DeclarationBody, Keyword, Member, TypeExpr};
use super::ExtractError;
use crate::domain::schema::{Field, TypeSchema};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A declaration together with the file it came from.
pub struct SourcedDeclaration {
    pub path: PathBuf,
    pub declaration: Declaration,
}

/// Inlines named references into self-contained [`TypeSchema`] trees.
///
/// A declaration may appear inside its own expansion at most
/// `recursion_limit` extra times; deeper self references become `Undefined`.
/// Each entity also gets a fixed budget of expanded references and a maximum
/// reference depth, so densely linked models stay linear in size.
pub struct Resolver<'a> {
    declarations: HashMap<&'a str, &'a SourcedDeclaration>,
    recursion_limit: usize,
    stack: Vec<&'a str>,
    expanded: usize,
}

/// References inlined into a single entity before the rest become `Undefined`.
pub const MAX_EXPANDED_REFERENCES: usize = 512;

/// Deepest chain of nested references inlined into a single entity.
pub const MAX_REFERENCE_DEPTH: usize = 32;

impl<'a> Resolver<'a> {
    pub fn new(
        declarations: &'a [SourcedDeclaration],
        recursion_limit: usize,
    ) -> Result<Self, ExtractError> {
        let mut index: HashMap<&str, &SourcedDeclaration> = HashMap::new();
        for sourced in declarations {
            let name = sourced.declaration.name.as_str();
            if let Some(previous) = index.insert(name, sourced) {
                return Err(ExtractError::DuplicateEntity {
                    name: name.to_string(),
                    first: previous.path.clone(),
                    second: sourced.path.clone(),
                });
            }
        }

        Ok(Self {
            declarations: index,
            recursion_limit,
            stack: Vec::new(),
            expanded: 0,
        })
    }

    pub fn resolve(&mut self, sourced: &'a SourcedDeclaration) -> Result<TypeSchema, ExtractError> {
        let name = sourced.declaration.name.as_str();
        if self.stack.is_empty() {
            self.expanded = 0;
        }
        self.stack.push(name);
        let result = self.resolve_body(sourced);
        self.stack.pop();
        result
    }

    fn resolve_body(&mut self, sourced: &'a SourcedDeclaration) -> Result<TypeSchema, ExtractError> {
        match &sourced.declaration.body {
            DeclarationBody::Alias(ty) => self.resolve_expr(ty, &sourced.path),
            DeclarationBody::Interface { extends, members } => {
                let mut fields = Vec::new();
                for base in extends {
                    let base_schema = self.resolve_reference(base, &sourced.path)?;
                    match base_schema {
                        TypeSchema::Object { fields: inherited } => merge_fields(&mut fields, inherited),
                        TypeSchema::Undefined => {}
                        other => {
                            return Err(ExtractError::InvalidExtends {
                                name: sourced.declaration.name.clone(),
                                base: base.clone(),
                                kind: other.kind().to_string(),
                            })
                        }
                    }
                }
                let own = self.resolve_members(members, &sourced.path)?;
                merge_fields(&mut fields, own);
                Ok(TypeSchema::object(fields))
            }
        }
    }

    fn resolve_members(&mut self, members: &'a [Member], path: &Path) -> Result<Vec<Field>, ExtractError> {
        members
            .iter()
            .map(|member| {
                Ok(Field {
                    name: member.name.clone(),
                    schema: self.resolve_expr(&member.ty, path)?,
                    directive: member.tags.directive.clone(),
                    optional: member.optional,
                })
            })
            .collect()
    }

    fn resolve_expr(&mut self, expr: &'a TypeExpr, path: &Path) -> Result<TypeSchema, ExtractError> {
        let schema = match expr {
            TypeExpr::Keyword(keyword) => match keyword {
                Keyword::String => TypeSchema::String,
                Keyword::Number => TypeSchema::Number,
                Keyword::Boolean => TypeSchema::Boolean,
                Keyword::BigInt => TypeSchema::BigInt,
                Keyword::Undefined => TypeSchema::Undefined,
            },
            TypeExpr::Literal(value) => TypeSchema::literal(value.clone()),
            TypeExpr::Reference { name, line } => {
                return self
                    .resolve_reference(name, path)
                    .map_err(|e| match e {
                        ExtractError::UnknownType { name, path, line: 0 } => ExtractError::UnknownType {
                            name,
                            path,
                            line: *line,
                        },
                        other => other,
                    });
            }
            TypeExpr::Object(members) => TypeSchema::object(self.resolve_members(members, path)?),
            TypeExpr::Array(element) => TypeSchema::array(self.resolve_expr(element, path)?),
            TypeExpr::Union(members) => TypeSchema::union(self.resolve_all(members, path)?),
            TypeExpr::Intersection(members) => {
                TypeSchema::intersection(self.resolve_all(members, path)?)
            }
        };
        Ok(schema)
    }

    fn resolve_all(&mut self, members: &'a [TypeExpr], path: &Path) -> Result<Vec<TypeSchema>, ExtractError> {
        members.iter().map(|m| self.resolve_expr(m, path)).collect()
    }

    fn resolve_reference(&mut self, name: &str, path: &Path) -> Result<TypeSchema, ExtractError> {
        let Some(&target) = self.declarations.get(name) else {
            return builtin(name).ok_or_else(|| ExtractError::UnknownType {
                name: name.to_string(),
                path: path.to_path_buf(),
                line: 0,
            });
        };

        let depth = self.stack.iter().filter(|entry| **entry == name).count();
        if depth > self.recursion_limit {
            debug!("Recursion limit reached for '{}', emitting undefined", name);
            return Ok(TypeSchema::Undefined);
        }
        if self.stack.len() > MAX_REFERENCE_DEPTH || self.expanded >= MAX_EXPANDED_REFERENCES {
            debug!(
                "Expansion bound reached in '{}' at '{}', emitting undefined",
                self.stack.first().copied().unwrap_or(name),
                name
            );
            return Ok(TypeSchema::Undefined);
        }
        self.expanded += 1;

        self.resolve(target)
    }
}

/// Appends `incoming`, replacing same-named fields in place.
fn merge_fields(fields: &mut Vec<Field>, incoming: Vec<Field>) {
    for field in incoming {
        match fields.iter_mut().find(|existing| existing.name == field.name) {
            Some(existing) => *existing = field,
            None => fields.push(field),
        }
    }
}

fn builtin(name: &str) -> Option<TypeSchema> {
    match name {
        "Date" | "any" | "unknown" => Some(TypeSchema::String),
        "never" => Some(TypeSchema::Undefined),
        _ => None,
    }
}
