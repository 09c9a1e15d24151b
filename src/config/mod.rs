use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

pub mod validator;
pub mod watcher;

use crate::cli::Cli;
use crate::domain::fault::{Delay, FaultProfile};
use crate::domain::hook::{Hook, HookTransform, TransformSpec};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub sources: SourceSettings,
    #[serde(default)]
    pub network: NetworkSettings,
    #[serde(default)]
    pub webhook: WebhookSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub reload: ReloadSettings,
    /// File the settings were read from; relative source patterns resolve
    /// against its directory.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Largest `count` a single request may ask for.
    #[serde(default = "default_max_count")]
    pub max_count: usize,
}

pub const DEFAULT_MAX_COUNT: usize = 1000;

fn default_max_count() -> usize {
    DEFAULT_MAX_COUNT
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceSettings {
    /// Glob patterns of declaration files.
    #[serde(default = "default_source_paths")]
    pub paths: Vec<String>,
    /// Extra times a declaration may appear inside its own expansion.
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: usize,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            paths: default_source_paths(),
            recursion_limit: default_recursion_limit(),
        }
    }
}

fn default_source_paths() -> Vec<String> {
    vec!["types/**/*.ts".to_string()]
}

fn default_recursion_limit() -> usize {
    1
}

/// Fixed milliseconds or an inclusive `[min, max]` range.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DelaySetting {
    Fixed(u64),
    Range(u64, u64),
}

impl From<DelaySetting> for Delay {
    fn from(value: DelaySetting) -> Self {
        match value {
            DelaySetting::Fixed(0) => Delay::None,
            DelaySetting::Fixed(ms) => Delay::Fixed(ms),
            DelaySetting::Range(min, max) => Delay::Range(min, max),
        }
    }
}

/// A partial fault profile. Unset fields leave the layer below untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct NetworkPreset {
    #[serde(default)]
    pub delay: Option<DelaySetting>,
    #[serde(default)]
    pub error_rate: Option<f64>,
    #[serde(default)]
    pub timeout_rate: Option<f64>,
    #[serde(default)]
    pub offline: Option<bool>,
    #[serde(default)]
    pub error_status_codes: Option<Vec<u16>>,
    /// Status code (as a string key) to message.
    #[serde(default)]
    pub error_messages: HashMap<String, String>,
}

impl NetworkPreset {
    /// Layer `self` over `profile`.
    fn apply_to(&self, profile: &mut FaultProfile) -> Result<(), String> {
        if let Some(delay) = self.delay {
            profile.delay = delay.into();
        }
        if let Some(rate) = self.error_rate {
            profile.error_rate = rate;
        }
        if let Some(rate) = self.timeout_rate {
            profile.timeout_rate = rate;
        }
        if let Some(offline) = self.offline {
            profile.offline = offline;
        }
        if let Some(codes) = &self.error_status_codes {
            profile.error_status_codes = codes.clone();
        }
        for (code, message) in &self.error_messages {
            let code: u16 = code
                .trim()
                .parse()
                .map_err(|_| format!("'{}' is not a status code", code))?;
            profile.error_messages.insert(code, message.clone());
        }
        Ok(())
    }
}

/// Built-in network presets.
pub fn builtin_preset(name: &str) -> Option<NetworkPreset> {
    let preset = match name {
        "slow3g" => NetworkPreset {
            delay: Some(DelaySetting::Range(400, 1200)),
            ..Default::default()
        },
        "fast3g" => NetworkPreset {
            delay: Some(DelaySetting::Range(100, 300)),
            ..Default::default()
        },
        "flaky" => NetworkPreset {
            delay: Some(DelaySetting::Range(50, 500)),
            error_rate: Some(0.2),
            timeout_rate: Some(0.05),
            ..Default::default()
        },
        "offline" => NetworkPreset {
            offline: Some(true),
            ..Default::default()
        },
        _ => return None,
    };
    Some(preset)
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NetworkSettings {
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub delay: Option<DelaySetting>,
    #[serde(default)]
    pub error_rate: Option<f64>,
    #[serde(default)]
    pub timeout_rate: Option<f64>,
    #[serde(default)]
    pub offline: Option<bool>,
    #[serde(default)]
    pub error_status_codes: Option<Vec<u16>>,
    #[serde(default)]
    pub error_messages: HashMap<String, String>,
    /// User-defined presets, layered over a built-in of the same name.
    #[serde(default)]
    pub presets: HashMap<String, NetworkPreset>,
}

impl NetworkSettings {
    fn explicit(&self) -> NetworkPreset {
        NetworkPreset {
            delay: self.delay,
            error_rate: self.error_rate,
            timeout_rate: self.timeout_rate,
            offline: self.offline,
            error_status_codes: self.error_status_codes.clone(),
            error_messages: self.error_messages.clone(),
        }
    }

    /// Resolve to a concrete profile: built-in preset, then the user preset
    /// of the same name, then the explicit fields of this section.
    pub fn resolve(&self) -> anyhow::Result<FaultProfile> {
        let mut profile = FaultProfile::default();

        if let Some(name) = self.preset.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            let builtin = builtin_preset(name);
            let custom = self.presets.get(name);
            if builtin.is_none() && custom.is_none() {
                anyhow::bail!("Unknown network preset '{}'", name);
            }
            for layer in builtin.iter().chain(custom) {
                layer.apply_to(&mut profile).map_err(anyhow::Error::msg)?;
            }
        }

        self.explicit()
            .apply_to(&mut profile)
            .map_err(anyhow::Error::msg)?;
        Ok(profile)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub hooks: Vec<HookSettings>,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_webhook_timeout(),
            hooks: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_webhook_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HookSettings {
    pub name: String,
    pub event: String,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub transform: Option<TransformSpec>,
}

fn default_method() -> String {
    "POST".to_string()
}

impl HookSettings {
    pub fn to_hook(&self) -> Hook {
        Hook {
            name: self.name.clone(),
            trigger_event: self.event.clone(),
            url: self.url.clone(),
            method: self.method.clone(),
            headers: self.headers.clone(),
            enabled: self.enabled,
            transform: self.transform.clone().map(HookTransform::declarative),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Rows generated the first time an entity is requested.
    #[serde(default = "default_seed_count")]
    pub seed_count: usize,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            seed_count: default_seed_count(),
        }
    }
}

fn default_seed_count() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReloadSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

impl Default for ReloadSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    250
}

fn default_heartbeat_secs() -> u64 {
    25
}

impl Settings {
    /// Read `path` (optional) with defaults, without CLI overrides.
    pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
        let s = Config::builder()
            .add_source(File::from(path.to_path_buf()).required(false))
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.max_count", default_max_count() as u64)?
            .build()?;

        let mut settings: Settings = s.try_deserialize()?;
        settings.config_path = Some(path.to_path_buf());
        Ok(settings)
    }

    /// Create settings from CLI arguments (config file, then CLI overrides),
    /// validated.
    pub fn new_with_cli(cli: &Cli) -> Result<Self, anyhow::Error> {
        let mut settings = Self::load(&cli.config)?;

        // CLI > env vars > config file
        settings.apply_cli_overrides(cli);

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        validator::ConfigValidator::validate(self).map_err(|errors| {
            let error_messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            anyhow::anyhow!(
                "Configuration validation failed:\n{}",
                error_messages.join("\n")
            )
        })
    }

    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        for pattern in &cli.sources {
            if !self.sources.paths.contains(pattern) {
                self.sources.paths.push(pattern.clone());
            }
        }
        if let Some(preset) = &cli.network {
            self.network.preset = Some(preset.clone());
        }
        if cli.no_watch {
            self.reload.enabled = false;
        }
    }

    /// Directory relative source patterns are resolved against.
    pub fn root(&self) -> PathBuf {
        self.config_path
            .as_deref()
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Source patterns with relative entries anchored at [`root`](Self::root).
    pub fn source_patterns(&self) -> Vec<String> {
        let root = self.root();
        self.sources
            .paths
            .iter()
            .map(|pattern| {
                if Path::new(pattern).is_absolute() || root == Path::new(".") {
                    pattern.clone()
                } else {
                    root.join(pattern).to_string_lossy().into_owned()
                }
            })
            .collect()
    }

    pub fn hooks(&self) -> Vec<Hook> {
        self.webhook.hooks.iter().map(HookSettings::to_hook).collect()
    }

    pub fn fault_profile(&self) -> anyhow::Result<FaultProfile> {
        self.network.resolve()
    }
}
