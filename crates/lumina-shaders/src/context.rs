//! Shader context
//!
//! Owns the fragment registry, program descriptors, program cache and uniform
//! binder for one graphics context. Constructed explicitly; several may
//! coexist, each with its own backend.

use crate::backend::ShaderBackend;
use crate::binder::{LightState, MaterialState, UniformBinder};
use crate::cache::{self, AssembledProgram, CompiledProgram, ProgramCache};
use crate::descriptor::ProgramDescriptor;
use crate::key::{KeyBuilder, SpecializationKey};
use crate::registry::FragmentRegistry;
use crate::sources;
use lumina_core::{Limits, Result, ShaderConfig, ShaderError};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub struct ShaderContext<B: ShaderBackend> {
    config: ShaderConfig,
    registry: FragmentRegistry,
    programs: BTreeMap<String, ProgramDescriptor>,
    cache: ProgramCache<B>,
    binder: UniformBinder,
}

impl<B: ShaderBackend> ShaderContext<B> {
    /// Validate `config`, load the built-in source set plus any configured
    /// fragment directory, and check every built-in program.
    pub fn new(backend: B, config: ShaderConfig) -> Result<Self> {
        config.validate()?;

        let mut registry = FragmentRegistry::with_policy(config.allow_fragment_overwrite);
        sources::register_builtin(&mut registry)?;
        if let Some(dir) = &config.fragment_dir {
            registry.load_dir(dir)?;
        }

        let mut context = Self {
            config,
            registry,
            programs: BTreeMap::new(),
            cache: ProgramCache::new(backend),
            binder: UniformBinder::new(),
        };
        for descriptor in sources::builtin_programs() {
            context.register_program(descriptor)?;
        }

        info!(
            "Shader context ready: {} fragments, {} programs, GLSL {}",
            context.registry.len(),
            context.programs.len(),
            context.config.glsl_version
        );
        Ok(context)
    }

    /// Context with default configuration
    pub fn with_defaults(backend: B) -> Result<Self> {
        Self::new(backend, ShaderConfig::default())
    }

    pub fn config(&self) -> &ShaderConfig {
        &self.config
    }

    pub fn limits(&self) -> &Limits {
        &self.config.limits
    }

    pub fn registry(&self) -> &FragmentRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &ProgramCache<B> {
        &self.cache
    }

    pub fn backend(&self) -> &B {
        self.cache.backend()
    }

    pub fn binder(&self) -> &UniformBinder {
        &self.binder
    }

    /// Register or replace a fragment and drop every cached program built from it.
    ///
    /// The new text must only include registered fragments and must not close
    /// an include cycle; otherwise the previous text is kept and the cache is
    /// left alone. Returns the number of programs invalidated.
    pub fn register_fragment(&mut self, name: impl Into<String>, text: impl Into<String>) -> Result<usize> {
        let name = name.into();
        let previous = self.registry.lookup(&name).ok().map(str::to_string);
        self.registry.register(name.clone(), text)?;
        if let Err(err) = self.registry.check_includes(&name) {
            warn!("Rejected fragment '{}': {}", name, err);
            self.registry.restore(&name, previous);
            return Err(err);
        }

        let dropped = self.cache.invalidate_dependents(&name);
        if dropped > 0 {
            info!("Fragment '{}' changed, invalidated {} programs", name, dropped);
        }
        Ok(dropped)
    }

    /// Register a program after checking its stage fragments exist and
    /// include no cycles.
    pub fn register_program(&mut self, descriptor: ProgramDescriptor) -> Result<()> {
        if descriptor.name.is_empty() {
            return Err(ShaderError::UnknownProgram(descriptor.name));
        }
        for (_, fragment) in descriptor.stages() {
            self.registry.check_includes(fragment)?;
        }

        if self.programs.contains_key(&descriptor.name) {
            if !self.config.allow_fragment_overwrite {
                return Err(ShaderError::DuplicateName(descriptor.name));
            }
            self.cache.invalidate_program(&descriptor.name);
        }
        debug!("Registered program '{}'", descriptor.name);
        self.programs.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    pub fn program(&self, name: &str) -> Option<&ProgramDescriptor> {
        self.programs.get(name)
    }

    pub fn program_names(&self) -> impl Iterator<Item = &str> {
        self.programs.keys().map(|s| s.as_str())
    }

    /// Start a key for the registered program `name`
    pub fn key(&self, name: &str) -> Result<KeyBuilder> {
        if !self.programs.contains_key(name) {
            return Err(ShaderError::UnknownProgram(name.to_string()));
        }
        Ok(SpecializationKey::builder(name))
    }

    /// Validate a builder against this context's limits
    pub fn build_key(&self, builder: KeyBuilder) -> Result<SpecializationKey> {
        builder.build(&self.config.limits)
    }

    fn descriptor(&self, key: &SpecializationKey) -> Result<&ProgramDescriptor> {
        self.programs
            .get(key.program())
            .ok_or_else(|| ShaderError::UnknownProgram(key.program().to_string()))
    }

    /// Assembled stage sources for `key`, without touching the GPU
    pub fn assemble(&self, key: &SpecializationKey) -> Result<AssembledProgram> {
        let descriptor = self.descriptor(key)?;
        cache::assemble(&self.registry, descriptor, key, &self.config.glsl_version)
    }

    /// The program for `key`, compiled and linked on first use
    pub fn get_program(&mut self, key: &SpecializationKey) -> Result<&CompiledProgram<B>> {
        let descriptor = self
            .programs
            .get(key.program())
            .ok_or_else(|| ShaderError::UnknownProgram(key.program().to_string()))?;
        self.cache
            .get_or_compile(key, &self.registry, descriptor, &self.config.glsl_version)
    }

    /// Bind the program for `key` and upload `material` and `lights` into it
    pub fn bind_uniforms(
        &mut self,
        key: &SpecializationKey,
        material: &MaterialState,
        lights: &LightState,
    ) -> Result<()> {
        self.get_program(key)?;
        let program = self
            .cache
            .get(key)
            .ok_or_else(|| ShaderError::UnknownProgram(key.program().to_string()))?;
        self.binder
            .bind(self.cache.backend(), program, material, lights)
    }

    /// Delete every GPU program. The context stays usable.
    pub fn teardown(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;

    #[test]
    fn test_builtins_registered() {
        let context = ShaderContext::with_defaults(HeadlessBackend::new()).unwrap();
        let names: Vec<&str> = context.program_names().collect();
        assert_eq!(names, vec!["basic", "panel", "physical", "point", "standard"]);
        assert!(context.registry().contains("lights"));
        assert!(context.registry().contains("material_layout"));
    }

    #[test]
    fn test_key_for_unknown_program() {
        let context = ShaderContext::with_defaults(HeadlessBackend::new()).unwrap();
        assert!(matches!(
            context.key("toon"),
            Err(ShaderError::UnknownProgram(name)) if name == "toon"
        ));
    }

    #[test]
    fn test_register_program_rejects_missing_stage() {
        let mut context = ShaderContext::with_defaults(HeadlessBackend::new()).unwrap();
        let err = context
            .register_program(ProgramDescriptor::new("toon", "toon_vertex", "standard_fragment"))
            .unwrap_err();
        assert!(matches!(err, ShaderError::UnknownFragment { name } if name == "toon_vertex"));
        assert!(context.program("toon").is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ShaderConfig {
            glsl_version: String::new(),
            ..ShaderConfig::default()
        };
        assert!(matches!(
            ShaderContext::new(HeadlessBackend::new(), config),
            Err(ShaderError::Config(_))
        ));
    }

    #[test]
    fn test_fragment_with_unknown_include_is_rolled_back() {
        let mut context = ShaderContext::with_defaults(HeadlessBackend::new()).unwrap();
        let original = context.registry().lookup("attributes").unwrap().to_string();

        let err = context
            .register_fragment("attributes", "#include <no_such_fragment>\n")
            .unwrap_err();
        assert!(matches!(err, ShaderError::UnknownFragment { name } if name == "no_such_fragment"));
        assert_eq!(context.registry().lookup("attributes").unwrap(), original);

        assert!(context.register_fragment("fog", "#include <missing>\n").is_err());
        assert!(!context.registry().contains("fog"));
    }

    #[test]
    fn test_teardown_deletes_programs() {
        let mut context = ShaderContext::with_defaults(HeadlessBackend::new()).unwrap();
        let key = context.build_key(context.key("basic").unwrap()).unwrap();
        context.get_program(&key).unwrap();
        assert_eq!(context.backend().live_programs(), 1);

        context.teardown();
        assert_eq!(context.backend().live_programs(), 0);
        assert!(context.cache().is_empty());
    }
}
