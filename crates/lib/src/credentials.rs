//! Credential store: server URL and API key persisted as a flat JSON key/value file
//! (e.g. `~/.parley/credentials.json`).
//!
//! Loading never fails: a missing or corrupt file reads as "nothing saved".

use anyhow::{Context, Result};
use fs2::FileExt;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};

const SERVER_BASE_KEY: &str = "serverBase";
const API_KEY_KEY: &str = "apiKey";

/// Server URL plus the key sent as bearer token. Both non-empty once accepted by the session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub server_base: String,
    pub api_key: String,
}

impl Credential {
    pub fn new(server_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            server_base: server_base.into(),
            api_key: api_key.into(),
        }
    }
}

// Keeps the key out of logs and panics.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("server_base", &self.server_base)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// What `load` found. Either value is `None` when never saved, empty, or unreadable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredCredential {
    pub server_base: Option<String>,
    pub api_key: Option<String>,
}

impl StoredCredential {
    /// Both values present.
    pub fn complete(&self) -> Option<Credential> {
        match (&self.server_base, &self.api_key) {
            (Some(base), Some(key)) => Some(Credential::new(base.clone(), key.clone())),
            _ => None,
        }
    }
}

/// File-backed key/value store for the credential.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist both values (trimmed), overwriting prior ones. Other keys in the file are kept.
    pub fn save(&self, server_base: &str, api_key: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating credential directory {}", parent.display()))?;
        }
        let mut entries = self.read_entries().unwrap_or_default();
        entries.insert(
            SERVER_BASE_KEY.to_string(),
            Value::String(server_base.trim().to_string()),
        );
        entries.insert(
            API_KEY_KEY.to_string(),
            Value::String(api_key.trim().to_string()),
        );
        let body = serde_json::to_vec_pretty(&Value::Object(entries))
            .context("serializing credentials")?;

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("locking {}", self.path.display()))?;
        file.set_len(0)?;
        file.write_all(&body)
            .with_context(|| format!("writing credentials to {}", self.path.display()))?;
        file.sync_all()?;
        FileExt::unlock(&file)?;
        log::debug!("saved credentials to {}", self.path.display());
        Ok(())
    }

    /// Last saved values, or `None` per missing/corrupt entry.
    pub fn load(&self) -> StoredCredential {
        let Some(entries) = self.read_entries() else {
            return StoredCredential::default();
        };
        let field = |key: &str| {
            entries
                .get(key)
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        StoredCredential {
            server_base: field(SERVER_BASE_KEY),
            api_key: field(API_KEY_KEY),
        }
    }

    fn read_entries(&self) -> Option<Map<String, Value>> {
        let s = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<Value>(&s) {
            Ok(Value::Object(map)) => Some(map),
            _ => {
                log::warn!("ignoring unreadable credential file {}", self.path.display());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, CredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("nested").join("credentials.json"));
        (dir, store)
    }

    #[test]
    fn load_without_save_is_empty() {
        let (_dir, store) = store();
        assert_eq!(store.load(), StoredCredential::default());
        assert!(store.load().complete().is_none());
    }

    #[test]
    fn save_then_load_roundtrips_trimmed() {
        let (_dir, store) = store();
        store.save("  https://chat.example  ", " sk-123\n").unwrap();
        let loaded = store.load();
        assert_eq!(loaded.server_base.as_deref(), Some("https://chat.example"));
        assert_eq!(loaded.api_key.as_deref(), Some("sk-123"));
        assert_eq!(
            loaded.complete(),
            Some(Credential::new("https://chat.example", "sk-123"))
        );
    }

    #[test]
    fn save_overwrites_previous_values() {
        let (_dir, store) = store();
        store.save("https://a.example", "key-a").unwrap();
        store.save("https://b.example", "key-b-longer-than-before").unwrap();
        assert_eq!(
            store.load().complete(),
            Some(Credential::new("https://b.example", "key-b-longer-than-before"))
        );
    }

    #[test]
    fn corrupt_file_loads_as_empty() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), b"{not json").unwrap();
        assert_eq!(store.load(), StoredCredential::default());
    }

    #[test]
    fn non_string_entry_is_absent() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), br#"{"serverBase":"https://x","apiKey":42}"#).unwrap();
        let loaded = store.load();
        assert_eq!(loaded.server_base.as_deref(), Some("https://x"));
        assert_eq!(loaded.api_key, None);
    }

    #[test]
    fn debug_hides_api_key() {
        let c = Credential::new("https://x", "secret");
        assert!(!format!("{:?}", c).contains("secret"));
    }
}
