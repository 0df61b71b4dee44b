//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.parley/config.json`) and environment.
//! Selects the server dialect and auth mode; credentials themselves live in the credential store.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Remote chat server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Local storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Which API dialect the server speaks, and how to authenticate against it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// "openai" (default) or "chats".
    #[serde(default)]
    pub dialect: Dialect,

    /// "apiKey" (default) = the key is sent as the bearer token. "login" = username/password exchange.
    #[serde(default)]
    pub auth: AuthMode,

    /// Server URL prefilled in the connect form. Overridden by PARLEY_SERVER_URL env.
    pub default_base: Option<String>,
}

/// Server API dialect. Decides endpoint paths, request payloads and response decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// OpenAI-compatible: /models, /chat/completions with `choices`. No history endpoint.
    #[default]
    Openai,

    /// Simple chat server: /models, /chats history, /message with `{content}` and a `messages` reply.
    Chats,
}

impl Dialect {
    /// True if the dialect exposes a history endpoint fetched on entering Ready.
    pub fn supports_history(self) -> bool {
        matches!(self, Dialect::Chats)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Openai => "openai",
            Dialect::Chats => "chats",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthMode {
    /// The stored API key is sent as `Authorization: Bearer <key>`.
    #[default]
    ApiKey,

    /// POST /login with username and password; the returned token is stored and used as the key.
    Login,
}

/// Where the credential file lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Override the credential file. Relative paths are resolved against the config file's parent.
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
}

/// Resolve the prefilled server URL: env PARLEY_SERVER_URL overrides config.
pub fn resolve_default_base(config: &Config) -> Option<String> {
    std::env::var("PARLEY_SERVER_URL")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config
                .server
                .default_base
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("PARLEY_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".parley").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, or the default path (or PARLEY_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used (for resolving the credential file).
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Resolve the credential file: `storage.credentialsPath` if set, otherwise `credentials.json` beside the config file.
pub fn resolve_credentials_path(config: &Config, config_path: &Path) -> PathBuf {
    let config_parent = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    match &config.storage.credentials_path {
        Some(p) if !p.as_os_str().is_empty() => {
            if p.is_absolute() {
                p.clone()
            } else {
                config_parent.join(p)
            }
        }
        _ => config_parent.join("credentials.json"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_openai_with_api_key() {
        let c = Config::default();
        assert_eq!(c.server.dialect, Dialect::Openai);
        assert_eq!(c.server.auth, AuthMode::ApiKey);
        assert!(!c.server.dialect.supports_history());
    }

    #[test]
    fn parses_camel_case_keys() {
        let c: Config = serde_json::from_str(
            r#"{"server":{"dialect":"chats","auth":"login","defaultBase":"https://chat.example"}}"#,
        )
        .unwrap();
        assert_eq!(c.server.dialect, Dialect::Chats);
        assert_eq!(c.server.auth, AuthMode::Login);
        assert_eq!(c.server.default_base.as_deref(), Some("https://chat.example"));
        assert!(c.server.dialect.supports_history());
    }

    #[test]
    fn credentials_path_default() {
        let config = Config::default();
        let path = Path::new("/home/user/.parley/config.json");
        assert_eq!(
            resolve_credentials_path(&config, path),
            PathBuf::from("/home/user/.parley/credentials.json")
        );
    }

    #[test]
    fn credentials_path_override_relative() {
        let mut config = Config::default();
        config.storage.credentials_path = Some(PathBuf::from("secrets/creds.json"));
        let path = Path::new("/home/user/.parley/config.json");
        assert_eq!(
            resolve_credentials_path(&config, path),
            PathBuf::from("/home/user/.parley/secrets/creds.json")
        );
    }

    #[test]
    fn credentials_path_override_absolute() {
        let mut config = Config::default();
        config.storage.credentials_path = Some(PathBuf::from("/var/lib/parley/creds.json"));
        let path = Path::new("/home/user/.parley/config.json");
        assert_eq!(
            resolve_credentials_path(&config, path),
            PathBuf::from("/var/lib/parley/creds.json")
        );
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.server.dialect, Dialect::Openai);
    }
}
