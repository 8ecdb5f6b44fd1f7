//! Program compiler and cache
//!
//! One linked program per [`SpecializationKey`], built on first use and kept
//! until it is invalidated or the cache is torn down.

use crate::backend::{BackendError, ShaderBackend};
use crate::descriptor::{MaterialModel, ProgramDescriptor};
use crate::key::SpecializationKey;
use crate::layout;
use crate::registry::FragmentRegistry;
use crate::resolver::IncludeResolver;
use lumina_core::{Result, ShaderError, ShaderStage};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Fully assembled stage sources for one key, before any GPU work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledProgram {
    pub key: SpecializationKey,
    /// Stage sources in link order, each starting with the macro block
    pub stages: Vec<(ShaderStage, String)>,
    /// Every fragment the stages were built from
    pub dependencies: BTreeSet<String>,
}

impl AssembledProgram {
    pub fn source(&self, stage: ShaderStage) -> Option<&str> {
        self.stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, src)| src.as_str())
    }
}

/// Prefix the key's macro block to each resolved stage of `descriptor`
pub fn assemble(
    registry: &FragmentRegistry,
    descriptor: &ProgramDescriptor,
    key: &SpecializationKey,
    glsl_version: &str,
) -> Result<AssembledProgram> {
    let macros = key.macro_block(glsl_version);
    let defines = key.define_values();
    let resolver = IncludeResolver::new(registry).with_defines(&defines);

    let mut stages = Vec::with_capacity(3);
    let mut dependencies = BTreeSet::new();
    for (stage, fragment) in descriptor.stages() {
        let resolved = resolver.resolve(fragment)?;
        let mut source = String::with_capacity(macros.len() + resolved.text.len());
        source.push_str(&macros);
        source.push_str(&resolved.text);
        stages.push((stage, source));
        dependencies.extend(resolved.dependencies);
    }

    Ok(AssembledProgram {
        key: key.clone(),
        stages,
        dependencies,
    })
}

/// A linked program and its resolved uniform locations
#[derive(Debug)]
pub struct CompiledProgram<B: ShaderBackend> {
    handle: B::Program,
    material: MaterialModel,
    assembled: AssembledProgram,
    uniforms: HashMap<&'static str, Option<B::Location>>,
}

impl<B: ShaderBackend> CompiledProgram<B> {
    pub fn handle(&self) -> B::Program {
        self.handle
    }

    pub fn key(&self) -> &SpecializationKey {
        &self.assembled.key
    }

    pub fn material(&self) -> MaterialModel {
        self.material
    }

    pub fn source(&self, stage: ShaderStage) -> Option<&str> {
        self.assembled.source(stage)
    }

    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.assembled.dependencies
    }

    pub fn depends_on(&self, fragment: &str) -> bool {
        self.assembled.dependencies.contains(fragment)
    }

    /// Location resolved at link time; `None` if the program does not use it
    pub fn uniform(&self, name: &str) -> Option<&B::Location> {
        self.uniforms.get(name).and_then(|l| l.as_ref())
    }
}

/// Memoizes compiled programs by specialization key
pub struct ProgramCache<B: ShaderBackend> {
    backend: B,
    programs: HashMap<SpecializationKey, CompiledProgram<B>>,
    compile_count: usize,
}

impl<B: ShaderBackend> ProgramCache<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            programs: HashMap::new(),
            compile_count: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Cached program for `key`, without compiling
    pub fn get(&self, key: &SpecializationKey) -> Option<&CompiledProgram<B>> {
        self.programs.get(key)
    }

    /// Cached program for `key`, compiling and linking it on first use.
    ///
    /// On any failure nothing is cached and no GPU objects are leaked.
    pub fn get_or_compile(
        &mut self,
        key: &SpecializationKey,
        registry: &FragmentRegistry,
        descriptor: &ProgramDescriptor,
        glsl_version: &str,
    ) -> Result<&CompiledProgram<B>> {
        if self.programs.contains_key(key) {
            debug!("Program cache hit: {}", key);
            return Ok(&self.programs[key]);
        }

        debug!("Program cache miss: {}", key);
        let assembled = assemble(registry, descriptor, key, glsl_version)?;
        let program = self.build(assembled, descriptor.material)?;
        self.compile_count += 1;
        info!("Compiled program {}", key);

        Ok(self.programs.entry(key.clone()).or_insert(program))
    }

    fn build(&self, assembled: AssembledProgram, material: MaterialModel) -> Result<CompiledProgram<B>> {
        let program_name = assembled.key.program().to_string();

        let mut shaders = Vec::with_capacity(assembled.stages.len());
        for (stage, source) in &assembled.stages {
            match self.backend.compile_shader(*stage, source) {
                Ok(shader) => shaders.push(shader),
                Err(err) => {
                    for shader in shaders {
                        self.backend.delete_shader(shader);
                    }
                    return Err(match err {
                        BackendError::Rejected(log) => {
                            warn!("{} shader of {} failed to compile: {}", stage, assembled.key, log);
                            ShaderError::ShaderCompileError {
                                program: program_name,
                                stage: *stage,
                                assembled: source.clone(),
                                log,
                            }
                        }
                        BackendError::Create(msg) => ShaderError::Backend(msg),
                    });
                }
            }
        }

        let linked = self.backend.link_program(&shaders);
        for shader in shaders {
            self.backend.delete_shader(shader);
        }
        let handle = match linked {
            Ok(handle) => handle,
            Err(BackendError::Rejected(log)) => {
                warn!("Program {} failed to link: {}", assembled.key, log);
                return Err(ShaderError::ShaderLinkError {
                    program: program_name,
                    stages: assembled.stages,
                    log,
                });
            }
            Err(BackendError::Create(msg)) => return Err(ShaderError::Backend(msg)),
        };

        let uniforms = layout::uniform_names()
            .into_iter()
            .map(|name| (name, self.backend.uniform_location(handle, name)))
            .collect();

        Ok(CompiledProgram {
            handle,
            material,
            assembled,
            uniforms,
        })
    }

    pub fn contains(&self, key: &SpecializationKey) -> bool {
        self.programs.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Programs successfully compiled and linked over the cache's lifetime
    pub fn compile_count(&self) -> usize {
        self.compile_count
    }

    /// Drop every program built from `fragment`. Returns how many were dropped.
    pub fn invalidate_dependents(&mut self, fragment: &str) -> usize {
        self.evict(|program| program.depends_on(fragment))
    }

    /// Drop every variant of the base program `name`
    pub fn invalidate_program(&mut self, name: &str) -> usize {
        self.evict(|program| program.key().program() == name)
    }

    fn evict(&mut self, mut pred: impl FnMut(&CompiledProgram<B>) -> bool) -> usize {
        let stale: Vec<SpecializationKey> = self
            .programs
            .iter()
            .filter(|(_, program)| pred(program))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            if let Some(program) = self.programs.remove(key) {
                debug!("Invalidated program {}", key);
                self.backend.delete_program(program.handle);
            }
        }
        stale.len()
    }

    /// Delete every GPU program and empty the cache
    pub fn clear(&mut self) {
        if self.programs.is_empty() {
            return;
        }
        self.backend.use_program(None);
        for (_, program) in self.programs.drain() {
            self.backend.delete_program(program.handle);
        }
        debug!("Program cache cleared");
    }
}

impl<B: ShaderBackend> Drop for ProgramCache<B> {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use lumina_core::Limits;

    fn registry() -> FragmentRegistry {
        let mut registry = FragmentRegistry::new();
        registry
            .register("common", "uniform vec3 AmbientLightColor[AMB_LIGHTS];\n")
            .unwrap();
        registry
            .register("tiny_vertex", "#include <common>\nuniform mat4 MVP;\nvoid main() {}\n")
            .unwrap();
        registry
            .register("tiny_fragment", "out vec4 FragColor;\nvoid main() {}\n")
            .unwrap();
        registry
    }

    fn tiny() -> ProgramDescriptor {
        ProgramDescriptor::new("tiny", "tiny_vertex", "tiny_fragment")
    }

    fn key(ambient: usize) -> SpecializationKey {
        SpecializationKey::builder("tiny")
            .ambient(ambient)
            .build(&Limits::default())
            .unwrap()
    }

    #[test]
    fn test_assemble_puts_macros_first() {
        let assembled = assemble(&registry(), &tiny(), &key(1), "330 core").unwrap();
        let vertex = assembled.source(ShaderStage::Vertex).unwrap();
        assert!(vertex.starts_with("#version 330 core\n#define AMB_LIGHTS 1\n"));
        assert!(vertex.contains("uniform vec3 AmbientLightColor[AMB_LIGHTS];"));
        assert!(assembled.source(ShaderStage::Geometry).is_none());
        assert!(assembled.dependencies.contains("common"));
    }

    #[test]
    fn test_cache_hit_does_not_recompile() {
        let registry = registry();
        let mut cache = ProgramCache::new(HeadlessBackend::new());

        let first = cache
            .get_or_compile(&key(1), &registry, &tiny(), "330 core")
            .unwrap()
            .handle();
        let second = cache
            .get_or_compile(&key(1), &registry, &tiny(), "330 core")
            .unwrap()
            .handle();

        assert_eq!(first, second);
        assert_eq!(cache.compile_count(), 1);
        assert_eq!(cache.backend().compile_calls(), 2);
        assert_eq!(cache.backend().live_shaders(), 0);
    }

    #[test]
    fn test_locations_resolved_once() {
        let registry = registry();
        let mut cache = ProgramCache::new(HeadlessBackend::new());
        let program = cache
            .get_or_compile(&key(1), &registry, &tiny(), "330 core")
            .unwrap();

        assert!(program.uniform("AmbientLightColor").is_some());
        assert!(program.uniform("MVP").is_some());
        assert!(program.uniform("Material").is_none());
    }

    #[test]
    fn test_invalidate_dependents() {
        let registry = registry();
        let mut cache = ProgramCache::new(HeadlessBackend::new());
        cache.get_or_compile(&key(1), &registry, &tiny(), "330 core").unwrap();
        cache.get_or_compile(&key(2), &registry, &tiny(), "330 core").unwrap();
        assert_eq!(cache.backend().live_programs(), 2);

        assert_eq!(cache.invalidate_dependents("unrelated"), 0);
        assert_eq!(cache.invalidate_dependents("common"), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.backend().live_programs(), 0);
    }
}
