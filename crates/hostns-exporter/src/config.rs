//! Exporter configuration

use anyhow::{Context, bail};
use hostns_core::BootstrapConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the exporter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Listener address and the namespace to bind it in
    #[serde(flatten)]
    pub bootstrap: BootstrapConfig,

    /// HTTP path metrics are served on
    pub metrics_path: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            bootstrap: BootstrapConfig::default(),
            metrics_path: "/metrics".into(),
            request_timeout_secs: 60,
        }
    }
}

impl ExporterConfig {
    /// Load a JSON config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open config file {}", path.display()))?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.metrics_path.starts_with('/') {
            bail!("metrics path must start with '/': {:?}", self.metrics_path);
        }
        if self.request_timeout_secs == 0 {
            bail!("request timeout must be at least one second");
        }
        Ok(())
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_flattened_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"netns_path": "/run/netns/host", "listen_address": "127.0.0.1:9101", "metrics_path": "/m"}}"#
        )
        .unwrap();

        let config = ExporterConfig::load(file.path()).unwrap();
        assert_eq!(config.bootstrap.netns_path, Path::new("/run/netns/host"));
        assert_eq!(config.bootstrap.listen_address.to_string(), "127.0.0.1:9101");
        assert_eq!(config.metrics_path, "/m");
        assert_eq!(config.request_timeout_secs, 60);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_bad_listen_address_in_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"listen_address": "7082"}}"#).unwrap();

        let err = ExporterConfig::load(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("missing port"), "{err:#}");
    }

    #[test]
    fn validate_rejects_relative_metrics_path() {
        let config = ExporterConfig {
            metrics_path: "metrics".into(),
            ..ExporterConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
