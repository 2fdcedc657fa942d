//! JSON config file adapter.
//!
//! Implements [`ConfigPort`] on a single JSON file. A missing file means
//! defaults; anything present is validated on load and before save.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::SystemConfig;

pub struct JsonConfigFile {
    path: PathBuf,
}

impl JsonConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigPort for JsonConfigFile {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("CONFIG: {} not found, using defaults", self.path.display());
                return Ok(SystemConfig::default());
            }
            Err(e) => {
                warn!("CONFIG: cannot read {}: {}", self.path.display(), e);
                return Err(ConfigError::IoError);
            }
        };
        let cfg: SystemConfig = serde_json::from_str(&text).map_err(|e| {
            warn!("CONFIG: {} is not valid: {}", self.path.display(), e);
            ConfigError::Corrupted
        })?;
        cfg.validate()?;
        info!("CONFIG: loaded {}", self.path.display());
        Ok(cfg)
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let text = serde_json::to_string_pretty(config).map_err(|_| ConfigError::IoError)?;
        // Write beside the target and rename so a crash never leaves half a file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text)
            .and_then(|()| fs::rename(&tmp, &self.path))
            .map_err(|e| {
                warn!("CONFIG: cannot write {}: {}", self.path.display(), e);
                ConfigError::IoError
            })?;
        info!("CONFIG: saved {}", self.path.display());
        Ok(())
    }
}
