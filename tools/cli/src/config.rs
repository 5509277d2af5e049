//! CLI configuration file and flag overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use fieldsync_sync::{ProbeConfig, SyncConfig};

/// Default directory for the file-backed store.
pub const DEFAULT_DATA_DIR: &str = ".fieldsync";

/// Which key-value substrate to open, by registry name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    pub kind: String,
    #[serde(default)]
    pub options: Value,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self::file(Path::new(DEFAULT_DATA_DIR))
    }
}

impl StoreSettings {
    pub fn file(root: &Path) -> Self {
        Self {
            kind: "file".to_string(),
            options: json!({ "root": root.to_string_lossy() }),
        }
    }
}

/// Contents of the `--config` JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub store: StoreSettings,
    pub remote_url: Option<String>,
    /// Overrides the probe target derived from `remote_url`.
    pub probe: Option<ProbeConfig>,
    pub request_timeout_secs: Option<u64>,
    pub sync: SyncConfig,
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Apply command-line flags on top of file values.
    pub fn with_overrides(mut self, data_dir: Option<PathBuf>, remote_url: Option<String>) -> Self {
        if let Some(dir) = data_dir {
            self.store = StoreSettings::file(&dir);
        }
        if remote_url.is_some() {
            self.remote_url = remote_url;
        }
        self
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Probe settings: explicit ones, else the remote's `host:port`.
    pub fn probe_config(&self) -> Result<Option<ProbeConfig>> {
        if let Some(probe) = &self.probe {
            return Ok(Some(probe.clone()));
        }
        let Some(remote) = &self.remote_url else {
            return Ok(None);
        };
        let url = Url::parse(remote).with_context(|| format!("Invalid remote URL: {}", remote))?;
        let host = url
            .host_str()
            .with_context(|| format!("Remote URL has no host: {}", remote))?;
        let port = url
            .port_or_known_default()
            .with_context(|| format!("Remote URL has no port: {}", remote))?;
        Ok(Some(ProbeConfig::new(format!("{}:{}", host, port))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_sync::SyncMode;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CliConfig::default();
        assert_eq!(config.store.kind, "file");
        assert_eq!(config.store.options["root"], DEFAULT_DATA_DIR);
        assert!(config.remote_url.is_none());
        assert!(config.probe_config().unwrap().is_none());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"remote_url": "https://api.example.com/v1", "store": {{"kind": "memory"}}}}"#
        )
        .unwrap();

        let config = CliConfig::load(file.path()).unwrap();
        assert_eq!(config.store.kind, "memory");
        assert_eq!(config.remote_url.as_deref(), Some("https://api.example.com/v1"));
        assert_eq!(config.sync.sync_mode, SyncMode::OnReconnect);
    }

    #[test]
    fn test_flags_override_file() {
        let config = CliConfig {
            remote_url: Some("http://old.example.com".to_string()),
            ..CliConfig::default()
        }
        .with_overrides(
            Some(PathBuf::from("/tmp/site-a")),
            Some("http://new.example.com".to_string()),
        );

        assert_eq!(config.store, StoreSettings::file(Path::new("/tmp/site-a")));
        assert_eq!(config.remote_url.as_deref(), Some("http://new.example.com"));
    }

    #[test]
    fn test_probe_target_from_remote() {
        let config = CliConfig::default()
            .with_overrides(None, Some("https://api.example.com/v1".to_string()));
        let probe = config.probe_config().unwrap().unwrap();
        assert_eq!(probe.address, "api.example.com:443");

        let config = CliConfig::default()
            .with_overrides(None, Some("http://localhost:8080".to_string()));
        assert_eq!(config.probe_config().unwrap().unwrap().address, "localhost:8080");
    }

    #[test]
    fn test_invalid_remote_url() {
        let config = CliConfig::default().with_overrides(None, Some("not a url".to_string()));
        assert!(config.probe_config().is_err());
    }
}
