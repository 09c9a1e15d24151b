//! Schema extraction: declaration files in, [`EntityRegistry`] out.

pub mod expr;
pub mod lexer;
pub mod parser;
pub mod resolve;

use crate::domain::entity::{EntityDescriptor, EntityRegistry, IdStrategy};
use parser::parse_declarations;
use resolve::{Resolver, SourcedDeclaration};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}:{column}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Unknown type '{name}' referenced in {path}:{line}")]
    UnknownType {
        name: String,
        path: PathBuf,
        line: usize,
    },

    #[error("Duplicate declaration '{name}' in {first} and {second}")]
    DuplicateEntity {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("'{name}' extends '{base}', which is a {kind} rather than an object")]
    InvalidExtends {
        name: String,
        base: String,
        kind: String,
    },

    #[error("Invalid source pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },
}

/// Reads declaration files and builds a fresh registry from them.
#[derive(Debug, Clone)]
pub struct SchemaExtractor {
    recursion_limit: usize,
}

impl Default for SchemaExtractor {
    fn default() -> Self {
        Self { recursion_limit: 1 }
    }
}

impl SchemaExtractor {
    pub fn new(recursion_limit: usize) -> Self {
        Self { recursion_limit }
    }

    /// Expand glob patterns and extract every matching file.
    pub fn extract_patterns(&self, patterns: &[String]) -> Result<EntityRegistry, ExtractError> {
        let files = expand_patterns(patterns)?;
        let mut sources = Vec::with_capacity(files.len());
        for path in files {
            let content = std::fs::read_to_string(&path).map_err(|source| ExtractError::Io {
                path: path.clone(),
                source,
            })?;
            sources.push((path, content));
        }
        self.extract_sources(&sources)
    }

    /// Extract from already loaded `(path, content)` pairs.
    pub fn extract_sources(&self, sources: &[(PathBuf, String)]) -> Result<EntityRegistry, ExtractError> {
        let mut declarations = Vec::new();
        for (path, content) in sources {
            let parsed = parse_declarations(content).map_err(|e| ExtractError::Parse {
                path: path.clone(),
                line: e.line,
                column: e.column,
                message: e.message,
            })?;
            debug!("Parsed {} declarations from {}", parsed.len(), path.display());
            declarations.extend(parsed.into_iter().map(|declaration| SourcedDeclaration {
                path: path.clone(),
                declaration,
            }));
        }

        let mut resolver = Resolver::new(&declarations, self.recursion_limit)?;
        let mut registry = EntityRegistry::new();
        for sourced in &declarations {
            let schema = resolver.resolve(sourced)?;
            let mut entity = EntityDescriptor::new(&sourced.declaration.name, schema, sourced.path.clone());
            if let Some(strategy) = &sourced.declaration.tags.id {
                entity = entity.with_id_strategy(IdStrategy::parse(strategy));
            }

            registry.insert(entity).map_err(|rejected| ExtractError::DuplicateEntity {
                name: rejected.name.clone(),
                first: registry
                    .get(&rejected.name)
                    .map(|e| e.source_file_path.clone())
                    .unwrap_or_default(),
                second: rejected.source_file_path,
            })?;
        }

        info!(
            "Extracted {} entities from {} source files",
            registry.len(),
            sources.len()
        );
        Ok(registry)
    }
}

/// Resolve glob patterns to a sorted, de-duplicated file list.
pub fn expand_patterns(patterns: &[String]) -> Result<Vec<PathBuf>, ExtractError> {
    let mut files = Vec::new();
    for pattern in patterns {
        let entries = glob::glob(pattern).map_err(|e| ExtractError::Pattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                Err(e) => tracing::warn!("Failed to read glob entry: {}", e),
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Directory a watcher has to observe to see changes matching `pattern`:
/// the longest leading run of path components without glob syntax.
pub fn watch_root(pattern: &str) -> PathBuf {
    let mut root = PathBuf::new();
    for component in Path::new(pattern).components() {
        let text = component.as_os_str().to_string_lossy();
        if text.contains(['*', '?', '[', '{']) {
            break;
        }
        root.push(component);
    }

    if root.as_os_str().is_empty() {
        PathBuf::from(".")
    } else if root.is_file() || (root == Path::new(pattern) && root.extension().is_some()) {
        root.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    } else {
        root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::{SchemaKind, TypeSchema};
    use serde_json::json;

    fn extract(source: &str) -> EntityRegistry {
        SchemaExtractor::default()
            .extract_sources(&[(PathBuf::from("types.ts"), source.to_string())])
            .unwrap()
    }

    #[test]
    fn test_every_declaration_becomes_an_entity() {
        let registry = extract(
            r#"
            export interface User { id: string; name: string; age: number; active: boolean }
            export type Status = "active" | "inactive";
            "#,
        );

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["status", "user"]);
        let user = registry.get("user").unwrap();
        let names: Vec<_> = user.schema.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "age", "active"]);
        assert_eq!(
            registry.get("status").unwrap().schema,
            TypeSchema::union(vec![TypeSchema::literal("active"), TypeSchema::literal("inactive")])
        );
    }

    #[test]
    fn test_references_are_inlined() {
        let registry = extract(
            r#"
            interface Address { city: string }
            interface Person { home: Address; tags: string[]; born: Date }
            "#,
        );
        let person = registry.get("person").unwrap();
        let fields = person.schema.fields();
        assert_eq!(fields[0].schema.kind(), SchemaKind::Object);
        assert_eq!(fields[0].schema.fields()[0].name, "city");
        assert_eq!(fields[1].schema, TypeSchema::array(TypeSchema::String));
        assert_eq!(fields[2].schema, TypeSchema::String);
    }

    #[test]
    fn test_self_reference_is_bounded() {
        let registry = extract("interface Node { value: number; children: Node[] }");
        let node = registry.get("node").unwrap();

        let TypeSchema::Array { element } = &node.schema.fields()[1].schema else {
            panic!("children should be an array");
        };
        let TypeSchema::Array { element: innermost } = &element.fields()[1].schema else {
            panic!("nested children should be an array");
        };
        assert_eq!(**innermost, TypeSchema::Undefined);
    }

    #[test]
    fn test_mutual_recursion_terminates() {
        let registry = extract("interface A { b: B }\ninterface B { a: A }");
        assert!(registry.get("a").unwrap().schema.depth() < 10);
    }

    fn node_count(schema: &TypeSchema) -> usize {
        1 + schema.children().into_iter().map(node_count).sum::<usize>()
    }

    #[test]
    fn test_densely_linked_models_stay_bounded() {
        let names: Vec<String> = (0..8).map(|i| format!("T{}", i)).collect();
        let body: String = names.iter().map(|n| format!("{}: {}; ", n.to_lowercase(), n)).collect();
        let source: String = names
            .iter()
            .map(|n| format!("interface {} {{ {}}}\n", n, body))
            .collect();

        let registry = SchemaExtractor::new(3)
            .extract_sources(&[(PathBuf::from("graph.ts"), source)])
            .unwrap();
        assert_eq!(registry.len(), 8);
        for entity in registry.iter() {
            let nodes = node_count(&entity.schema);
            assert!(nodes <= (resolve::MAX_EXPANDED_REFERENCES + 1) * 9, "{} nodes", nodes);
            assert!(entity.schema.depth() <= resolve::MAX_REFERENCE_DEPTH + 2);
        }
    }

    #[test]
    fn test_extends_merges_fields_in_order() {
        let registry = extract(
            r#"
            interface Base { id: string; created: string }
            /** @id uuid */
            interface Post extends Base { created: number; title: string }
            "#,
        );
        let post = registry.get("post").unwrap();
        let fields = post.schema.fields();
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "created", "title"]);
        assert_eq!(fields[1].schema, TypeSchema::Number);
        assert_eq!(post.id_strategy, Some(IdStrategy::Uuid));
    }

    #[test]
    fn test_directives_are_attached() {
        let registry = extract(
            r#"
            interface Player {
                /** @mock number.int({ min: 1, max: 99 }) */
                level: number;
            }
            "#,
        );
        let binding = registry.get("player").unwrap();
        let field = &binding.schema.fields()[0];
        let directive = field.directive.as_ref().unwrap();
        assert_eq!(directive.function_path, "number.int");
        assert_eq!(
            crate::schema::expr::evaluate(directive.args.as_deref().unwrap()).unwrap(),
            json!({ "min": 1, "max": 99 })
        );
    }

    #[test]
    fn test_unknown_reference_is_an_error() {
        let err = SchemaExtractor::default()
            .extract_sources(&[(PathBuf::from("a.ts"), "interface A {\n b: Missing }".to_string())])
            .unwrap_err();
        assert!(matches!(err, ExtractError::UnknownType { ref name, line: 2, .. } if name == "Missing"));
    }

    #[test]
    fn test_duplicate_declarations_across_files() {
        let err = SchemaExtractor::default()
            .extract_sources(&[
                (PathBuf::from("a.ts"), "interface A { x: string }".to_string()),
                (PathBuf::from("b.ts"), "type A = number;".to_string()),
            ])
            .unwrap_err();
        assert!(matches!(err, ExtractError::DuplicateEntity { .. }));
    }

    #[test]
    fn test_case_insensitive_duplicates() {
        let err = SchemaExtractor::default()
            .extract_sources(&[(
                PathBuf::from("a.ts"),
                "interface User { x: string }\ntype user = string;".to_string(),
            )])
            .unwrap_err();
        assert!(matches!(err, ExtractError::DuplicateEntity { ref name, .. } if name == "user"));
    }

    #[test]
    fn test_parse_errors_carry_the_path() {
        let err = SchemaExtractor::default()
            .extract_sources(&[(PathBuf::from("bad.ts"), "interface {".to_string())])
            .unwrap_err();
        assert!(err.to_string().starts_with("bad.ts:1:"));
    }

    #[test]
    fn test_watch_root() {
        assert_eq!(watch_root("types/**/*.ts"), PathBuf::from("types"));
        assert_eq!(watch_root("*.ts"), PathBuf::from("."));
        assert_eq!(watch_root("schema/models.ts"), PathBuf::from("schema"));
    }
}
