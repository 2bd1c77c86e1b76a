// SPDX-FileCopyrightText: © 2025 RouteKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use routekit_core::sdk::Bandwidth;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::Level;

/// Log level for filtering messages.
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Log file format options.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain text format (faster, lower CPU overhead)
    #[default]
    Text,
    /// Structured JSON lines, for log shippers
    Json,
}

const fn default_true() -> bool {
    true
}

fn default_log_file_path() -> String {
    "logs/rkit.log".to_string()
}

/// Logging configuration.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct LogConfig {
    #[serde(default = "default_true")]
    pub console_enable: bool,
    #[serde(default)]
    pub console_level: LogLevel,
    #[serde(default)]
    pub file_enable: bool,
    #[serde(default)]
    pub file_level: LogLevel,
    #[serde(default = "default_log_file_path")]
    pub file_path: String,
    #[serde(default)]
    pub file_format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enable: true,
            console_level: LogLevel::default(),
            file_enable: false,
            file_level: LogLevel::default(),
            file_path: default_log_file_path(),
            file_format: LogFormat::default(),
        }
    }
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8080
}

/// HTTP server configuration.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ServerConfig {
    /// Interface to bind the control API to.
    #[serde(default = "default_address")]
    pub address: String,
    /// TCP port of the control API. Overridable by the CLI positional
    /// argument.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { address: default_address(), port: default_port() }
    }
}

/// Routing engine configuration.
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
pub struct RoutingConfig {
    /// Receive bandwidth for pooled routing receivers. `highest` preserves
    /// native quality; `lowest` trades quality for link headroom on wide
    /// fan-out. Preview capture always runs at `lowest` regardless.
    #[serde(default)]
    pub bandwidth: Bandwidth,
}

/// Media SDK backend configuration.
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
pub struct SdkConfig {
    /// Source names pre-registered with the loopback backend at startup.
    /// Useful for demos and tests; irrelevant once a vendor backend is
    /// wired in.
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Top-level configuration.
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub sdk: SdkConfig,
}

/// Result of loading configuration, tracking whether the file was present.
pub struct ConfigLoadResult {
    pub config: Config,
    /// Set to the missing path when the config file was not found and
    /// defaults were used.
    pub file_missing: Option<String>,
}

/// Loads configuration by layering: defaults, then the TOML file (if it
/// exists), then `RK_`-prefixed environment variables.
///
/// # Errors
///
/// Returns an error if the file or environment contain values that do not
/// match the schema.
pub fn load(config_path: &str) -> Result<ConfigLoadResult, Box<figment::Error>> {
    let mut figment =
        Figment::new().merge(figment::providers::Serialized::defaults(Config::default()));

    let file_missing = if std::path::Path::new(config_path).exists() {
        figment = figment.merge(Toml::file(config_path));
        None
    } else {
        Some(config_path.to_string())
    };

    let config: Config =
        figment.merge(Env::prefixed("RK_").split("__")).extract().map_err(Box::new)?;

    Ok(ConfigLoadResult { config, file_missing })
}

/// Generates the default configuration as a pretty-printed TOML string.
///
/// # Errors
///
/// Returns an error if the default configuration cannot be serialized,
/// which would indicate a programming error.
pub fn generate_default() -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(&Config::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_all_interfaces_on_8080() {
        let config = Config::default();
        assert_eq!(config.server.address, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert!(matches!(config.routing.bandwidth, Bandwidth::Highest));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let result = load("definitely-not-here.toml").unwrap();
        assert_eq!(result.file_missing.as_deref(), Some("definitely-not-here.toml"));
        assert_eq!(result.config.server.port, 8080);
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let toml_string = generate_default().unwrap();
        let parsed: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(parsed.server.port, Config::default().server.port);
    }
}
