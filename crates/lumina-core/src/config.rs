//! Configuration for shader specialization
//!
//! Provides configuration file handling and validation. Supports JSON and
//! TOML files, selected by extension.
//!
//! Configuration is organized into:
//! - Source settings (GLSL version header, extra fragment directory)
//! - Registry policy (whether fragments may be replaced at runtime)
//! - Limits (upper bounds on every specialization parameter)

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upper bounds on specialization parameters
///
/// Requests beyond these are rejected, never truncated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum material textures (`MAT_TEXTURES`)
    pub max_textures: usize,
    /// Maximum bone influencers per vertex (`BONE_INFLUENCERS`)
    pub max_bone_influencers: usize,
    /// Maximum size of the bone matrix array (`TOTAL_BONES`)
    pub max_total_bones: usize,
    /// Maximum morph targets (`MORPHTARGETS`)
    pub max_morph_targets: usize,
    /// Maximum lights in any single category
    pub max_lights_per_category: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_textures: 3,
            max_bone_influencers: 4,
            max_total_bones: 128,
            max_morph_targets: 8,
            max_lights_per_category: 16,
        }
    }
}

/// Complete shader subsystem configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// Text following `#version` in every assembled stage
    pub glsl_version: String,
    /// Allow registering a fragment name twice (hot reload)
    pub allow_fragment_overwrite: bool,
    /// Optional directory of `*.glsl` fragments loaded after the built-ins
    pub fragment_dir: Option<PathBuf>,
    /// Specialization limits
    pub limits: Limits,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            glsl_version: "330 core".to_string(),
            allow_fragment_overwrite: true,
            fragment_dir: None,
            limits: Limits::default(),
        }
    }
}

impl ShaderConfig {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Corrupted(format!("Failed to read config file: {}", e))
        })?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content)
                .map_err(|e| ConfigError::Corrupted(format!("Invalid JSON config: {}", e)))?
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content)
                .map_err(|e| ConfigError::Corrupted(format!("Invalid TOML config: {}", e)))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.display().to_string()));
        };

        config.validate()?;
        tracing::debug!("Loaded shader config from {}", path.display());
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> ConfigResult<()> {
        self.validate()?;

        let content = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::to_string_pretty(self)
                .map_err(|e| ConfigError::Corrupted(format!("Failed to serialize config: {}", e)))?
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            toml::to_string_pretty(self)
                .map_err(|e| ConfigError::Corrupted(format!("Failed to serialize config: {}", e)))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.display().to_string()));
        };

        std::fs::write(path, content).map_err(|e| {
            ConfigError::Corrupted(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.glsl_version.trim().is_empty() {
            return Err(ConfigError::ValueOutOfRange {
                key: "glsl_version".to_string(),
                value: "(empty)".to_string(),
            });
        }

        if self.glsl_version.contains('\n') {
            return Err(ConfigError::ValueOutOfRange {
                key: "glsl_version".to_string(),
                value: self.glsl_version.escape_debug().to_string(),
            });
        }

        // The built-in fragment shaders unroll at most three material textures.
        if self.limits.max_textures > 3 {
            return Err(ConfigError::ValueOutOfRange {
                key: "limits.max_textures".to_string(),
                value: self.limits.max_textures.to_string(),
            });
        }

        // The built-in skinning code unrolls at most four influencers.
        if self.limits.max_bone_influencers > 4 {
            return Err(ConfigError::ValueOutOfRange {
                key: "limits.max_bone_influencers".to_string(),
                value: self.limits.max_bone_influencers.to_string(),
            });
        }

        if self.limits.max_total_bones == 0 {
            return Err(ConfigError::ValueOutOfRange {
                key: "limits.max_total_bones".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(())
    }
}
