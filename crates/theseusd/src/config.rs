//! theseusd.toml configuration.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration. Command-line flags override file values.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Address the REST API listens on.
    pub listen: SocketAddr,
    /// Directory holding the store file.
    pub data_dir: PathBuf,
    /// Store file name inside `data_dir`.
    pub db_file: String,
    /// How long to wait for another process to release the store file.
    pub lock_timeout_ms: u64,
    /// Upper bound on a single deploy (pull + create + start + record).
    pub deploy_timeout_secs: u64,
    pub log_format: LogFormat,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            data_dir: PathBuf::from("/var/lib/theseus"),
            db_file: "theseus.redb".to_string(),
            lock_timeout_ms: 1000,
            deploy_timeout_secs: 600,
            log_format: LogFormat::Text,
        }
    }
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply command-line overrides on top of file values.
    pub fn with_overrides(mut self, port: Option<u16>, data_dir: Option<PathBuf>) -> Self {
        if let Some(port) = port {
            self.listen.set_port(port);
        }
        if let Some(data_dir) = data_dir {
            self.data_dir = data_dir;
        }
        self
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn deploy_timeout(&self) -> Duration {
        Duration::from_secs(self.deploy_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = DaemonConfig::from_toml("").unwrap();
        assert_eq!(config, DaemonConfig::default());
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/theseus/theseus.redb"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = DaemonConfig::from_toml(
            r#"
listen = "127.0.0.1:9000"
lock_timeout_ms = 250
log_format = "json"
"#,
        )
        .unwrap();
        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.lock_timeout(), Duration::from_millis(250));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.deploy_timeout_secs, 600);
    }

    #[test]
    fn overrides_win() {
        let config = DaemonConfig::default().with_overrides(Some(9999), Some("/tmp/t".into()));
        assert_eq!(config.listen.port(), 9999);
        assert_eq!(config.db_path(), PathBuf::from("/tmp/t/theseus.redb"));
    }

    #[test]
    fn round_trips_through_toml() {
        let config = DaemonConfig::default();
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("deploy_timeout_secs"));
        assert_eq!(DaemonConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        assert!(DaemonConfig::from_toml("log_format = \"xml\"").is_err());
    }
}
