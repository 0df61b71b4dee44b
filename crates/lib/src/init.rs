//! Initialize the configuration directory: create ~/.parley and a default config.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG: &str = r#"{
  "server": {
    "dialect": "openai",
    "auth": "apiKey"
  }
}
"#;

/// Create the config directory and default config file if they do not exist.
/// Returns the config directory.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        std::fs::write(config_path, DEFAULT_CONFIG)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    } else {
        log::debug!("config already exists at {}, skipping", config_path.display());
    }

    Ok(config_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config, Dialect};

    #[test]
    fn writes_loadable_default_config_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley").join("config.json");
        let out = init_config_dir(&path).unwrap();
        assert_eq!(out, dir.path().join("parley"));
        let (config, _) = load_config(Some(path.clone())).unwrap();
        assert_eq!(config.server.dialect, Dialect::Openai);

        std::fs::write(&path, r#"{"server":{"dialect":"chats"}}"#).unwrap();
        init_config_dir(&path).unwrap();
        let (config, _) = load_config(Some(path)).unwrap();
        assert_eq!(config.server.dialect, Dialect::Chats);
    }
}
