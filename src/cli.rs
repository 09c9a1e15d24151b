use clap::Parser;
use std::path::PathBuf;

/// Forgery - a mock data server driven by type declarations
#[derive(Parser, Debug, Clone)]
#[command(name = "forgery", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "FORGERY_CONFIG", default_value = "forgery.toml")]
    pub config: PathBuf,

    /// Server host address
    #[arg(long, env = "FORGERY_HOST")]
    pub host: Option<String>,

    /// Server port
    #[arg(long, env = "FORGERY_PORT")]
    pub port: Option<u16>,

    /// Additional source glob, appended to `sources.paths`
    #[arg(long = "source", env = "FORGERY_SOURCES", value_delimiter = ',')]
    pub sources: Vec<String>,

    /// Network preset to apply (slow3g, fast3g, flaky, offline or a custom preset)
    #[arg(long, env = "FORGERY_NETWORK")]
    pub network: Option<String>,

    /// Disable watching sources and the config file
    #[arg(long, env = "FORGERY_NO_WATCH", default_value_t = false)]
    pub no_watch: bool,
}

impl Cli {
    /// Whether any flag overrides a value from the config file.
    pub fn has_overrides(&self) -> bool {
        self.host.is_some()
            || self.port.is_some()
            || !self.sources.is_empty()
            || self.network.is_some()
            || self.no_watch
    }
}
