#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use clap::Parser;
use forgery::adapters::table_builder::SourceTableBuilder;
use forgery::adapters::webhook::{DeliveryError, HookDelivery, HookTransport};
use forgery::cli::Cli;
use forgery::config::Settings;
use forgery::AppContext;
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

pub const USER_TYPES: &str = r#"
/** @id */
export interface User {
    /** @faker person.firstName */
    name: string;
    /** @faker internet.email */
    email: string;
    age: number;
    active: boolean;
}

export type Status = "active" | "inactive";
"#;

/// Collects deliveries instead of sending them.
#[derive(Default)]
pub struct RecordingTransport {
    pub deliveries: Mutex<Vec<HookDelivery>>,
}

#[async_trait]
impl HookTransport for RecordingTransport {
    async fn deliver(&self, delivery: &HookDelivery) -> Result<u16, DeliveryError> {
        self.deliveries.lock().unwrap().push(delivery.clone());
        Ok(200)
    }
}

/// A project directory with a config file and a `types/` folder.
pub struct Project {
    pub dir: TempDir,
}

impl Project {
    pub fn new(config: &str) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("types")).unwrap();
        std::fs::write(dir.path().join("forgery.toml"), config).unwrap();
        Self { dir }
    }

    pub fn with_types(config: &str, types: &str) -> Self {
        let project = Self::new(config);
        project.write_types("models.ts", types);
        project
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("forgery.toml")
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_types(&self, file: &str, content: &str) {
        std::fs::write(self.dir.path().join("types").join(file), content).unwrap();
    }

    pub fn cli(&self) -> Cli {
        Cli::parse_from(["forgery", "--config", self.config_path().to_str().unwrap()])
    }

    pub fn settings(&self) -> Settings {
        Settings::new_with_cli(&self.cli()).unwrap()
    }

    /// Build the initial table and wire the app around it.
    pub fn start(&self, transport: Arc<dyn HookTransport>) -> AppContext {
        let settings = self.settings();
        let reload = settings.reload.clone();
        let initial = SourceTableBuilder::from_settings(settings, 1).unwrap();
        AppContext::start(
            initial,
            Arc::new(SourceTableBuilder::new(self.cli())),
            transport,
            &reload,
        )
        .unwrap()
    }
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = get_text(app, uri).await;
    let value = serde_json::from_str(&body).unwrap_or(Value::Null);
    (status, value)
}

pub async fn get_text(app: &Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}
