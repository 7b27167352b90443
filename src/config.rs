//! Orchestrator configuration.
//!
//! Loaded from TOML with defaults that work without any file. Validation
//! runs before any resource is touched so a bad limit never gets as far as
//! a half-provisioned workspace.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::launch::ResourceLimits;

/// Default sandbox image.
const DEFAULT_IMAGE: &str = "substrate-agent:latest";

/// Orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base directory holding one workspace per session.
    pub workspace_root: PathBuf,

    /// Sandbox image to launch.
    pub image: String,

    /// CPU/memory limits applied to every sandbox.
    pub limits: ResourceLimits,

    /// Credential files staged into each workspace.
    pub credential_paths: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            image: DEFAULT_IMAGE.to_string(),
            limits: ResourceLimits::default(),
            credential_paths: default_credential_paths(),
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

fn default_workspace_root() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".substrate").join("workspaces"),
        None => std::env::temp_dir().join("substrate-workspaces"),
    }
}

fn default_credential_paths() -> Vec<PathBuf> {
    match home_dir() {
        Some(home) => vec![
            home.join(".claude").join(".credentials.json"),
            home.join(".claude").join("settings.json"),
        ],
        None => Vec::new(),
    }
}

/// Default config file location.
pub fn default_config_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".config").join("substrate").join("config.toml"))
}

impl Config {
    /// Loads configuration.
    ///
    /// An explicit path must exist and parse; the default location is used
    /// only when present. No file at all means built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(explicit) => Self::from_file(explicit)?,
            None => match default_config_path() {
                Some(default) if default.is_file() => Self::from_file(&default)?,
                _ => Self::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("cannot parse config {}: {e}", path.display())))
    }

    /// Rejects configurations that cannot possibly work.
    pub fn validate(&self) -> Result<()> {
        if self.image.trim().is_empty() {
            return Err(Error::Config("image cannot be empty".to_string()));
        }
        if !self.limits.cpus.is_finite() || self.limits.cpus <= 0.0 {
            return Err(Error::Config(format!(
                "cpus must be positive, got {}",
                self.limits.cpus
            )));
        }
        if self.limits.memory.trim().is_empty() {
            return Err(Error::Config("memory limit cannot be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.image, "substrate-agent:latest");
    }

    #[test]
    fn loads_partial_toml_over_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "image = \"custom:1\"\n\n[limits]\ncpus = 4.0\nmemory = \"8g\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.image, "custom:1");
        assert_eq!(config.limits.cpus, 4.0);
        assert_eq!(config.limits.memory, "8g");
        // Untouched fields keep their defaults.
        assert_eq!(config.workspace_root, Config::default().workspace_root);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/config.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn zero_cpus_is_rejected() {
        let config = Config {
            limits: ResourceLimits {
                cpus: 0.0,
                memory: "4g".to_string(),
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_image_is_rejected() {
        let config = Config {
            image: "  ".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
