//! Schema-driven value generation.

pub mod generators;

use crate::domain::entity::IdStrategy;
use crate::domain::schema::{GenerationDirective, TypeSchema};
use crate::schema::expr;
use fake::faker::lorem::en::Word;
use fake::Fake;
use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use generators::GeneratorLibrary;
use rand::Rng;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_MAX_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generator path '{path}' could not be resolved: no member '{segment}'")]
    UnresolvedPath { path: String, segment: String },

    #[error("Generator path '{path}' is a namespace, not a function")]
    NotCallable { path: String },
}

/// Options for [`GenerationEngine::forge`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ForgeOptions {
    /// `None` or `0` yields one unwrapped value, `n > 0` an array of `n`,
    /// `n < 0` an empty array.
    pub count: Option<i64>,
    pub id_strategy: Option<IdStrategy>,
}

/// Walks a [`TypeSchema`] and produces a JSON value shaped like it.
#[derive(Clone)]
pub struct GenerationEngine {
    library: Arc<GeneratorLibrary>,
    max_depth: usize,
}

impl Default for GenerationEngine {
    fn default() -> Self {
        Self::new(Arc::new(GeneratorLibrary::standard()))
    }
}

impl GenerationEngine {
    pub fn new(library: Arc<GeneratorLibrary>) -> Self {
        Self {
            library,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn library(&self) -> &GeneratorLibrary {
        &self.library
    }

    /// Generate one value for `schema`.
    pub async fn generate(
        &self,
        schema: &TypeSchema,
        directive: Option<&GenerationDirective>,
    ) -> Result<Value, GenerationError> {
        self.generate_at(schema, directive, 0).await
    }

    /// Generate `count` independent values concurrently.
    pub async fn generate_many(
        &self,
        schema: &TypeSchema,
        count: usize,
    ) -> Result<Vec<Value>, GenerationError> {
        try_join_all((0..count).map(|_| self.generate(schema, None))).await
    }

    /// Top-level entry point used by the request handler.
    pub async fn forge(&self, schema: &TypeSchema, options: ForgeOptions) -> Result<Value, GenerationError> {
        match options.count {
            Some(n) if n < 0 => Ok(Value::Array(Vec::new())),
            Some(n) if n > 0 => {
                let values = self.generate_many(schema, n as usize).await?;
                let values = values
                    .into_iter()
                    .enumerate()
                    .map(|(i, value)| inject_id(value, options.id_strategy, i + 1))
                    .collect();
                Ok(Value::Array(values))
            }
            _ => {
                let value = self.generate(schema, None).await?;
                Ok(inject_id(value, options.id_strategy, 1))
            }
        }
    }

    fn generate_at<'a>(
        &'a self,
        schema: &'a TypeSchema,
        directive: Option<&'a GenerationDirective>,
        depth: usize,
    ) -> BoxFuture<'a, Result<Value, GenerationError>> {
        async move {
            if depth > self.max_depth {
                debug!("Depth guard reached at {}, emitting null", depth);
                return Ok(Value::Null);
            }

            match schema {
                TypeSchema::String | TypeSchema::Number | TypeSchema::Boolean | TypeSchema::BigInt => {
                    match directive {
                        Some(directive) => self.call_directive(directive),
                        None => Ok(default_value(schema)),
                    }
                }
                TypeSchema::Literal { value } => Ok(value.clone()),
                TypeSchema::Undefined => Ok(Value::Null),
                TypeSchema::Array { element } => {
                    let value = self.generate_at(element, directive, depth + 1).await?;
                    Ok(Value::Array(vec![value]))
                }
                TypeSchema::Object { fields } => {
                    let values = try_join_all(
                        fields
                            .iter()
                            .map(|field| self.generate_at(&field.schema, field.directive.as_ref(), depth + 1)),
                    )
                    .await?;

                    let mut object = Map::with_capacity(fields.len());
                    for (field, value) in fields.iter().zip(values) {
                        object.insert(field.name.clone(), value);
                    }
                    Ok(Value::Object(object))
                }
                TypeSchema::Union { members } | TypeSchema::Intersection { members } => {
                    let mut candidates =
                        try_join_all(members.iter().map(|m| self.generate_at(m, directive, depth + 1))).await?;
                    if candidates.is_empty() {
                        return Ok(Value::Null);
                    }
                    let index = rand::thread_rng().gen_range(0..candidates.len());
                    Ok(candidates.swap_remove(index))
                }
            }
        }
        .boxed()
    }

    fn call_directive(&self, directive: &GenerationDirective) -> Result<Value, GenerationError> {
        let function = self.library.resolve(&directive.function_path)?;

        let args = match directive.args.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => match expr::evaluate_args(raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(
                        "Invalid arguments for '{}' ({}), calling without arguments: {}",
                        directive.function_path, raw, e
                    );
                    None
                }
            },
        };

        Ok(function(args.as_ref()))
    }
}

fn default_value(schema: &TypeSchema) -> Value {
    let mut rng = rand::thread_rng();
    match schema {
        TypeSchema::String => json!(Word().fake::<String>()),
        TypeSchema::Number => json!(rng.gen_range(0..=1000)),
        TypeSchema::Boolean => json!(rng.gen_bool(0.5)),
        TypeSchema::BigInt => json!(rng.gen::<u64>().to_string()),
        _ => Value::Null,
    }
}

/// Prepend an `id` field to objects; other values pass through untouched.
pub fn inject_id(value: Value, strategy: Option<IdStrategy>, index: usize) -> Value {
    let (Some(strategy), Value::Object(fields)) = (strategy, &value) else {
        return value;
    };

    let id = match strategy {
        IdStrategy::Uuid => json!(uuid::Uuid::new_v4().to_string()),
        IdStrategy::Sequential => json!(index),
    };

    let mut object = Map::with_capacity(fields.len() + 1);
    object.insert("id".to_string(), id);
    for (key, field) in fields {
        if key != "id" {
            object.insert(key.clone(), field.clone());
        }
    }
    Value::Object(object)
}
