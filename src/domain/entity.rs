use crate::adapters::table_store::TableHandle;
use crate::domain::schema::TypeSchema;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// How an `id` field is injected into generated objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// Random UUID v4 string.
    Uuid,
    /// 1-based index of the object within its batch.
    Sequential,
}

impl IdStrategy {
    /// `uuid` selects [`IdStrategy::Uuid`]; anything else is sequential.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("uuid") {
            IdStrategy::Uuid
        } else {
            IdStrategy::Sequential
        }
    }
}

/// A named, schema-backed data source.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    pub name: String,
    pub schema: TypeSchema,
    pub source_file_path: PathBuf,
    pub id_strategy: Option<IdStrategy>,
    pub table: Option<TableHandle>,
}

impl EntityDescriptor {
    /// Create a descriptor; the name is lowercased.
    pub fn new(name: &str, schema: TypeSchema, source_file_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_lowercase(),
            schema,
            source_file_path: source_file_path.into(),
            id_strategy: None,
            table: None,
        }
    }

    pub fn with_id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = Some(strategy);
        self
    }
}

/// Summary row used by the introspection endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EntitySummary {
    pub name: String,
    pub kind: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_strategy: Option<IdStrategy>,
    pub persisted: bool,
}

/// The set of entities served by one serving table.
///
/// Built fresh on every rebuild and never mutated once published.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<String, Arc<EntityDescriptor>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity. Returns the rejected descriptor if the name is taken.
    pub fn insert(&mut self, entity: EntityDescriptor) -> Result<(), EntityDescriptor> {
        if self.entities.contains_key(&entity.name) {
            return Err(entity);
        }
        self.entities.insert(entity.name.clone(), Arc::new(entity));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<EntityDescriptor>> {
        self.entities.get(&name.to_lowercase()).cloned()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntityDescriptor>> {
        self.entities.values()
    }

    /// Attach a fresh persisted table to every entity.
    pub fn with_tables(self) -> Self {
        let entities = self
            .entities
            .into_iter()
            .map(|(name, entity)| {
                let mut entity = Arc::unwrap_or_clone(entity);
                entity.table = Some(TableHandle::new());
                (name, Arc::new(entity))
            })
            .collect();
        Self { entities }
    }

    pub fn summaries(&self) -> Vec<EntitySummary> {
        self.entities
            .values()
            .map(|e| EntitySummary {
                name: e.name.clone(),
                kind: e.schema.kind().to_string(),
                source: e.source_file_path.display().to_string(),
                id_strategy: e.id_strategy,
                persisted: e.table.is_some(),
            })
            .collect()
    }
}
