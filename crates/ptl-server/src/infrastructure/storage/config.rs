//! TOML-based configuration for the server binary.
//!
//! The file is looked up at an explicit path (`--config`) or at the
//! platform-appropriate location:
//! - Windows:  `%APPDATA%\Projectile\server.toml`
//! - Linux:    `~/.config/projectile/server.toml`
//! - macOS:    `~/Library/Application Support/Projectile/server.toml`
//!
//! ```toml
//! [server]
//! bind_address = "127.0.0.1"
//! port = 8080
//! endpoint_path = "/ptl"
//! protocol_version = "0.0.1"
//!
//! [logging]
//! log_level = "info"
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent from the TOML file, so a missing
//! or partial file still yields a complete configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: EndpointConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where and how the batch endpoint is served.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointConfig {
    /// IP address to bind to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port of the HTTP endpoint.
    #[serde(default = "default_port")]
    pub port: u16,
    /// URL path the endpoint is mounted at.
    #[serde(default = "default_endpoint_path")]
    pub endpoint_path: String,
    /// Protocol version; requests must be tagged `req@<version>`.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_endpoint_path() -> String {
    "/ptl".to_string()
}
fn default_protocol_version() -> String {
    ptl_core::PROTOCOL_VERSION.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            endpoint_path: default_endpoint_path(),
            protocol_version: default_protocol_version(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the platform config file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("server.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config at `path`, returning defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &ServerConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the `Projectile`
/// subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Projectile"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("projectile"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("Projectile")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default_values() {
        // Arrange / Act
        let cfg = ServerConfig::default();

        // Assert
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.endpoint_path, "/ptl");
        assert_eq!(cfg.server.protocol_version, "0.0.1");
        assert_eq!(cfg.logging.log_level, "info");
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: ServerConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_partial_section_overrides_only_given_fields() {
        // Arrange
        let toml_str = r#"
[server]
port = 9999
"#;

        // Act
        let cfg: ServerConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.server.port, 9999);
        assert_eq!(cfg.server.bind_address, "127.0.0.1");
        assert_eq!(cfg.logging.log_level, "info");
    }

    #[test]
    fn test_load_config_returns_default_when_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_load_config_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        let err = load_config(&path).unwrap_err();

        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("server.toml");
        let mut cfg = ServerConfig::default();
        cfg.server.port = 12345;
        cfg.logging.log_level = "debug".to_string();

        // Act
        save_config(&cfg, &path).unwrap();
        let loaded = load_config(&path).unwrap();

        // Assert
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn test_config_file_path_ends_with_server_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("server.toml"), "got {path:?}");
        }
        // NoPlatformConfigDir is acceptable in a stripped CI environment.
    }
}
