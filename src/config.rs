use std::path::Path;
use std::time::Duration;

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;

/// Default greeting rendered on page load.
pub const DEFAULT_GREETING: &str = "Hello there! Type in a message.";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Host to bind
    #[arg(long, env = "BIND_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Base URL of the remote query service
    #[arg(long, env = "RELAY_BASE_URL")]
    pub relay_base_url: Option<String>,

    /// Require the response endpoint to echo the correlation id.
    /// Response services that do not send the header need `false`.
    #[arg(long, env = "RELAY_REQUIRE_CORRELATION")]
    pub require_correlation: Option<bool>,

    /// Serve the demo query service on /query and /response
    #[arg(long, env = "DEMO_BACKEND")]
    pub demo_backend: Option<bool>,

    /// Disable timeout middleware
    #[arg(long, env = "TIMEOUT_DISABLED")]
    pub timeout_disabled: Option<bool>,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    pub log_json: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub relay: RelayConfig,
    pub widget: WidgetConfig,
    pub backend: BackendConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub timeout_disabled: bool,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    pub base_url: String,
    pub query_path: String,
    pub response_path: String,
    pub require_correlation: bool,
    /// Client-side timeout for each request; `0` leaves it to the transport.
    pub request_timeout_secs: u64,
}

impl RelayConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WidgetConfig {
    pub send_delay_ms: u64,
    pub scroll_duration_ms: u64,
    pub greeting: String,
    pub idle_timeout_secs: u64,
}

impl WidgetConfig {
    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            send_delay_ms: 300,
            scroll_duration_ms: 300,
            greeting: DEFAULT_GREETING.to_string(),
            idle_timeout_secs: 30 * 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub enabled: bool,
    pub fallback_answer: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub json: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        // 1. Defaults
        let widget = WidgetConfig::default();
        builder = builder
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.timeout_disabled", false)?
            .set_default("server.request_timeout_secs", 30)?
            .set_default("relay.base_url", "http://localhost:8080")?
            .set_default("relay.query_path", "/query")?
            .set_default("relay.response_path", "/response")?
            .set_default("relay.require_correlation", true)?
            .set_default("relay.request_timeout_secs", 0)?
            .set_default("widget.send_delay_ms", widget.send_delay_ms)?
            .set_default("widget.scroll_duration_ms", widget.scroll_duration_ms)?
            .set_default("widget.greeting", widget.greeting)?
            .set_default("widget.idle_timeout_secs", widget.idle_timeout_secs)?
            .set_default("backend.enabled", false)?
            .set_default("backend.fallback_answer", crate::backend::DEFAULT_FALLBACK_ANSWER)?
            .set_default("log.json", false)?;

        // 2. Config file: explicit path, else ./config.yaml when present
        if let Some(path) = &cli.config {
            builder = builder.add_source(File::with_name(path));
        } else if Path::new("config.yaml").exists() {
            builder = builder.add_source(File::with_name("config.yaml"));
        }

        // 3. Environment variables, e.g. CHAT_SERVER__PORT=8000
        builder = builder.add_source(
            Environment::with_prefix("CHAT")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags (and their env aliases) win over everything else
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(url) = cli.relay_base_url {
            builder = builder.set_override("relay.base_url", url)?;
        }
        if let Some(strict) = cli.require_correlation {
            builder = builder.set_override("relay.require_correlation", strict)?;
        }
        if let Some(enabled) = cli.demo_backend {
            builder = builder.set_override("backend.enabled", enabled)?;
        }
        if let Some(td) = cli.timeout_disabled {
            builder = builder.set_override("server.timeout_disabled", td)?;
        }
        if let Some(json) = cli.log_json {
            builder = builder.set_override("log.json", json)?;
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }

    /// Address the server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
