//! # Lumina Core
//!
//! Core types shared by every Lumina crate: the shader error taxonomy,
//! subsystem configuration, and pipeline stage identifiers.

pub mod config;
pub mod error;
pub mod stage;

pub use config::{Limits, ShaderConfig};
pub use error::{ConfigError, ConfigResult, Result, ShaderError};
pub use stage::ShaderStage;
