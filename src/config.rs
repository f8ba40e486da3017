//! Bridge configuration
//!
//! Persisted as JSON next to the user's other application settings. Every
//! field has a default, so a partial file (or no file at all) is fine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::{MAX_RANK, MAX_TENSORS};
use crate::error::{BridgeError, Result};

/// Name and signature of one foreign entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSignature {
    pub name: String,
    pub signature: String,
}

impl MethodSignature {
    fn new(name: &str, signature: &str) -> Self {
        Self {
            name: name.to_string(),
            signature: signature.to_string(),
        }
    }
}

/// Entry points the bridge resolves on a foreign instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryPoints {
    pub state_changed: MethodSignature,
    pub new_data: MethodSignature,
    pub invoke: MethodSignature,
}

impl Default for EntryPoints {
    fn default() -> Self {
        Self {
            state_changed: MethodSignature::new("stateChanged", "(state: i32)"),
            new_data: MethodSignature::new("newDataReceived", "(name: string, data: tensors)"),
            invoke: MethodSignature::new("invoke", "(data: tensors) -> tensors?"),
        }
    }
}

/// Descriptor limits applied before anything reaches the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TensorLimits {
    pub max_tensors: usize,
    pub max_rank: usize,
}

impl Default for TensorLimits {
    fn default() -> Self {
        Self {
            max_tensors: MAX_TENSORS,
            max_rank: MAX_RANK,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// `env_logger` filter used when no `RUST_LOG` is set.
    pub log_filter: String,
    pub entry_points: EntryPoints,
    pub limits: TensorLimits,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            entry_points: EntryPoints::default(),
            limits: TensorLimits::default(),
        }
    }
}

impl BridgeConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("tensor-bridge").join("bridge.json"))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.check()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Load from the default location, falling back to defaults when the
    /// file is missing or unreadable.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        match Self::load_from(&path) {
            Ok(config) => {
                log::info!("Loaded bridge config from {}", path.display());
                config
            }
            Err(BridgeError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                log::warn!("Ignoring bridge config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn check(&self) -> Result<()> {
        if self.limits.max_tensors == 0 || self.limits.max_tensors > MAX_TENSORS {
            return Err(BridgeError::Config(format!(
                "limits.max_tensors must be 1..={}",
                MAX_TENSORS
            )));
        }
        if self.limits.max_rank == 0 || self.limits.max_rank > MAX_RANK {
            return Err(BridgeError::Config(format!(
                "limits.max_rank must be 1..={}",
                MAX_RANK
            )));
        }
        Ok(())
    }
}
