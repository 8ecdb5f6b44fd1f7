//! Shader pipeline stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A programmable pipeline stage a source fragment can be compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderStage {
    /// Vertex stage
    Vertex,
    /// Geometry stage (optional in a program)
    Geometry,
    /// Fragment stage
    Fragment,
}

impl ShaderStage {
    /// Stages in link order.
    pub const ALL: [ShaderStage; 3] = [Self::Vertex, Self::Geometry, Self::Fragment];
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => write!(f, "vertex"),
            Self::Geometry => write!(f, "geometry"),
            Self::Fragment => write!(f, "fragment"),
        }
    }
}
