//! Error handling for Lumina
//!
//! Provides the error taxonomy for every stage of shader specialization:
//! - Source errors (unknown or cyclic fragments, malformed directives)
//! - Configuration errors (specialization parameters outside supported limits)
//! - Driver errors (compile and link failures with their diagnostics)
//! - Binding errors (host data that disagrees with the compiled layout)
//!
//! All error types use `thiserror` for ergonomic error handling.

use crate::stage::ShaderStage;
use std::io;
use thiserror::Error;

/// Shader specialization error type
///
/// Every variant is terminal for the call that produced it: nothing is cached
/// or partially bound on failure, so callers may fall back to another program
/// and keep rendering.
#[derive(Error, Debug)]
pub enum ShaderError {
    /// An include or program stage names a fragment that was never registered
    #[error("Unknown fragment: {name}")]
    UnknownFragment {
        /// The missing fragment name.
        name: String,
    },

    /// The include graph loops back on itself
    #[error("Cyclic include: {}", .cycle.join(" -> "))]
    CyclicInclude {
        /// The expansion path, starting and ending with the repeated name.
        cycle: Vec<String>,
    },

    /// A fragment was registered twice while overwriting is disabled
    #[error("Fragment '{0}' is already registered")]
    DuplicateName(String),

    /// No program descriptor exists under this base name
    #[error("Unknown program: {0}")]
    UnknownProgram(String),

    /// An `#include` line that cannot be parsed or evaluated
    #[error("Malformed directive in '{fragment}' at line {line}: {reason}")]
    MalformedDirective {
        /// Fragment containing the directive.
        fragment: String,
        /// One-based line number within that fragment.
        line: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// A specialization parameter exceeds what the shader set supports
    #[error("Unsupported configuration: {parameter} = {value} (maximum {max})")]
    UnsupportedConfiguration {
        /// The offending parameter.
        parameter: String,
        /// The requested value.
        value: String,
        /// The supported bound.
        max: String,
    },

    /// The driver rejected one stage
    #[error("Failed to compile {stage} shader of '{program}': {log}")]
    ShaderCompileError {
        /// Base program name.
        program: String,
        /// The stage that failed.
        stage: ShaderStage,
        /// The fully assembled source handed to the driver.
        assembled: String,
        /// Native compiler diagnostic.
        log: String,
    },

    /// The driver rejected the linked program
    #[error("Failed to link program '{program}': {log}")]
    ShaderLinkError {
        /// Base program name.
        program: String,
        /// Every assembled stage source, in link order.
        stages: Vec<(ShaderStage, String)>,
        /// Native linker diagnostic.
        log: String,
    },

    /// Host-side uniform data disagrees with the layout the program was built for
    #[error("Uniform layout mismatch for {block}: expected {expected}, got {actual}")]
    UniformLayoutMismatch {
        /// The uniform block or category being written.
        block: String,
        /// What the compiled program expects.
        expected: String,
        /// What the caller supplied.
        actual: String,
    },

    /// The graphics backend failed to create an object
    #[error("Backend error: {0}")]
    Backend(String),

    /// I/O error while loading fragment sources
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration could not be loaded or is invalid
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl ShaderError {
    /// Shorthand for an out-of-range specialization parameter.
    pub fn unsupported(
        parameter: impl Into<String>,
        value: impl ToString,
        max: impl ToString,
    ) -> Self {
        Self::UnsupportedConfiguration {
            parameter: parameter.into(),
            value: value.to_string(),
            max: max.to_string(),
        }
    }

    /// Shorthand for a binding that disagrees with the compiled layout.
    pub fn layout_mismatch(
        block: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::UniformLayoutMismatch {
            block: block.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// The assembled source attached to a compile error, if any.
    pub fn assembled_source(&self) -> Option<&str> {
        match self {
            Self::ShaderCompileError { assembled, .. } => Some(assembled),
            _ => None,
        }
    }
}

/// Errors related to configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file format is not supported.
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// A configuration value is out of valid range.
    #[error("Value out of range for '{key}': {value}")]
    ValueOutOfRange { key: String, value: String },

    /// The configuration file could not be parsed.
    #[error("Corrupted configuration: {0}")]
    Corrupted(String),
}

/// Result type alias for shader operations.
pub type Result<T> = std::result::Result<T, ShaderError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cyclic_include_display() {
        let err = ShaderError::CyclicInclude {
            cycle: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(err.to_string(), "Cyclic include: a -> b -> a");
    }

    #[test]
    fn test_unsupported_display() {
        let err = ShaderError::unsupported("MAT_TEXTURES", 5, 3);
        assert_eq!(
            err.to_string(),
            "Unsupported configuration: MAT_TEXTURES = 5 (maximum 3)"
        );
    }

    #[test]
    fn test_compile_error_keeps_source() {
        let err = ShaderError::ShaderCompileError {
            program: "standard".to_string(),
            stage: ShaderStage::Fragment,
            assembled: "#version 330 core\nvoid main() {}".to_string(),
            log: "0:1: syntax error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to compile fragment shader of 'standard': 0:1: syntax error"
        );
        assert!(err.assembled_source().unwrap().starts_with("#version"));
    }

    #[test]
    fn test_error_conversion() {
        let config_err = ConfigError::UnsupportedFormat("yaml".to_string());
        let err: ShaderError = config_err.into();
        assert!(matches!(err, ShaderError::Config(_)));

        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: ShaderError = io_err.into();
        assert!(matches!(err, ShaderError::Io(_)));
    }
}
