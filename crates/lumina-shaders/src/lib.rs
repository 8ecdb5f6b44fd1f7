//! # Lumina Shaders
//!
//! Assembles GLSL programs from named source fragments, specializes them with
//! scene-dependent preprocessor defines, and caches one linked program per
//! specialization key.
//!
//! ## Layout
//!
//! - [`registry`]: name to fragment text
//! - [`resolver`]: `#include <name>` and `#include <name> [N]` expansion
//! - [`key`]: specialization keys and their `#define` blocks
//! - [`layout`]: the uniform array layout shared by GLSL and host code
//! - [`cache`]: assembly, compile/link and memoization
//! - [`binder`]: per-draw uniform uploads
//! - [`context`]: owns all of the above for one graphics context

pub mod backend;
pub mod binder;
pub mod cache;
pub mod context;
pub mod descriptor;
pub mod key;
pub mod layout;
pub mod registry;
pub mod resolver;
pub mod sources;

pub use backend::{BackendError, GlowBackend, HeadlessBackend, ShaderBackend, UniformValue};
pub use binder::{
    DirectionalLight, LightState, MaterialState, PanelState, PhongMaterial, PhysicalMaterial,
    PointLight, SpotLight, TextureSlot, UniformBinder,
};
pub use cache::{AssembledProgram, CompiledProgram, ProgramCache};
pub use context::ShaderContext;
pub use descriptor::{MaterialModel, ProgramDescriptor};
pub use key::{Feature, KeyBuilder, LightCounts, LightKind, SpecializationKey};
pub use layout::UniformArray;
pub use registry::FragmentRegistry;
pub use resolver::IncludeResolver;
