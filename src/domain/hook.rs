use crate::domain::events::EventName;
use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

type TransformFn = dyn Fn(Value) -> anyhow::Result<Value> + Send + Sync;

/// Payload rewrite applied before a webhook delivery.
#[derive(Clone)]
pub struct HookTransform(Arc<TransformFn>);

impl HookTransform {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn apply(&self, payload: Value) -> anyhow::Result<Value> {
        (self.0)(payload)
    }

    /// Build a transform from its declarative config form.
    ///
    /// Steps run in order: `pick`, then `set`, then `wrap`.
    pub fn declarative(spec: TransformSpec) -> Self {
        Self::new(move |payload| spec.apply(payload))
    }
}

impl fmt::Debug for HookTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HookTransform(..)")
    }
}

/// Declarative transform as written in the config file.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TransformSpec {
    /// Keep only these top-level fields; a missing field is an error.
    #[serde(default)]
    pub pick: Option<Vec<String>>,
    /// Insert or override fields.
    #[serde(default)]
    pub set: Option<Map<String, Value>>,
    /// Nest the result under this key.
    #[serde(default)]
    pub wrap: Option<String>,
}

impl TransformSpec {
    fn apply(&self, payload: Value) -> anyhow::Result<Value> {
        let mut payload = payload;

        if let Some(keys) = &self.pick {
            let source = payload
                .as_object()
                .ok_or_else(|| anyhow!("pick requires an object payload"))?;
            let mut picked = Map::new();
            for key in keys {
                let value = source
                    .get(key)
                    .ok_or_else(|| anyhow!("payload has no field '{}'", key))?;
                picked.insert(key.clone(), value.clone());
            }
            payload = Value::Object(picked);
        }

        if let Some(fields) = &self.set {
            let Some(target) = payload.as_object_mut() else {
                bail!("set requires an object payload");
            };
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
        }

        if let Some(key) = &self.wrap {
            let mut wrapped = Map::new();
            wrapped.insert(key.clone(), payload);
            payload = Value::Object(wrapped);
        }

        Ok(payload)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum HookValidationError {
    #[error("Hook name must not be empty")]
    EmptyName,

    #[error("Unsupported method '{0}', only POST is allowed")]
    InvalidMethod(String),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unknown trigger event '{0}'")]
    UnknownEvent(String),
}

/// Declarative rule mapping a lifecycle event to an outbound HTTP delivery.
#[derive(Debug, Clone)]
pub struct Hook {
    pub name: String,
    pub trigger_event: String,
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub enabled: bool,
    pub transform: Option<HookTransform>,
}

impl Hook {
    pub fn new(name: impl Into<String>, trigger_event: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trigger_event: trigger_event.into(),
            url: url.into(),
            method: "POST".to_string(),
            headers: BTreeMap::new(),
            enabled: true,
            transform: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_transform(mut self, transform: HookTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Check method, URL and trigger event; returns the parsed event.
    pub fn validate(&self) -> Result<EventName, HookValidationError> {
        if self.name.trim().is_empty() {
            return Err(HookValidationError::EmptyName);
        }

        if !self.method.eq_ignore_ascii_case("POST") {
            return Err(HookValidationError::InvalidMethod(self.method.clone()));
        }

        let url = reqwest::Url::parse(&self.url).map_err(|e| HookValidationError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(HookValidationError::InvalidUrl {
                url: self.url.clone(),
                reason: format!("scheme '{}' is not http or https", url.scheme()),
            });
        }

        self.trigger_event
            .parse::<EventName>()
            .map_err(|_| HookValidationError::UnknownEvent(self.trigger_event.clone()))
    }
}
