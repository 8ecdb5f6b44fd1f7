//! # Lumina
//!
//! GLSL shader specialization and program caching for scene renderers:
//! - Named source fragments with `#include` and index-templated repetition
//! - Specialization keys derived from light, texture, skinning and morph state
//! - One compiled program per key, cached until invalidated
//! - A single uniform layout table shared by shader macros and host uploads
//!
//! ## Architecture
//!
//! 1. **lumina-core** - Error taxonomy, configuration, shader stages
//! 2. **lumina-shaders** - Registry, resolver, keys, layout, cache, binder
//! 3. **lumina** - Logging setup and the variant dump/validate binary

pub use lumina_core::{
    ConfigError, Limits, Result, ShaderConfig, ShaderError, ShaderStage,
};

pub use lumina_shaders::{
    AssembledProgram, CompiledProgram, DirectionalLight, Feature, FragmentRegistry,
    GlowBackend, HeadlessBackend, KeyBuilder, LightCounts, LightKind, LightState,
    MaterialModel, MaterialState, PanelState, PhongMaterial, PhysicalMaterial, PointLight,
    ProgramDescriptor, ShaderBackend, ShaderContext, SpecializationKey, SpotLight,
    TextureSlot,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Pretty console output on stderr, so stdout stays clean for shader dumps
/// - RUST_LOG environment variable support
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
