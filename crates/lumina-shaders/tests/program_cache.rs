//! Integration tests for program compilation and caching

use lumina_core::{Limits, ShaderConfig, ShaderError, ShaderStage};
use lumina_shaders::{HeadlessBackend, ShaderContext, SpecializationKey};

fn context() -> ShaderContext<HeadlessBackend> {
    ShaderContext::with_defaults(HeadlessBackend::new()).unwrap()
}

fn key(context: &ShaderContext<HeadlessBackend>, program: &str, ambient: usize) -> SpecializationKey {
    context
        .build_key(context.key(program).unwrap().ambient(ambient))
        .unwrap()
}

#[test]
fn test_second_request_is_a_cache_hit() {
    let mut context = context();
    let key = key(&context, "standard", 1);

    let first = context.get_program(&key).unwrap().handle();
    let compiles = context.backend().compile_calls();
    let second = context.get_program(&key).unwrap().handle();

    assert_eq!(first, second);
    assert_eq!(context.backend().compile_calls(), compiles);
    assert_eq!(context.backend().link_calls(), 1);
    assert_eq!(context.cache().compile_count(), 1);
    assert_eq!(context.cache().len(), 1);
}

#[test]
fn test_distinct_keys_get_distinct_programs() {
    let mut context = context();
    let one = key(&context, "standard", 1);
    let two = key(&context, "standard", 2);

    let a = context.get_program(&one).unwrap().handle();
    let b = context.get_program(&two).unwrap().handle();

    assert_ne!(a, b);
    assert_eq!(context.cache().len(), 2);
    assert_eq!(context.backend().live_programs(), 2);
}

#[test]
fn test_compile_failure_is_not_cached() {
    let mut context = context();
    let key = key(&context, "standard", 1);

    context.backend().fail_stage(Some(ShaderStage::Fragment));
    let err = context.get_program(&key).unwrap_err();
    match &err {
        ShaderError::ShaderCompileError { program, stage, assembled, log } => {
            assert_eq!(program, "standard");
            assert_eq!(*stage, ShaderStage::Fragment);
            assert!(assembled.starts_with("#version 330 core\n#define AMB_LIGHTS 1\n"));
            assert!(log.contains("fragment"));
        }
        other => panic!("expected compile error, got {}", other),
    }
    assert!(err.assembled_source().is_some());
    assert!(!context.cache().contains(&key));
    assert_eq!(context.backend().live_shaders(), 0);

    context.backend().fail_stage(None);
    assert!(context.get_program(&key).is_ok());
    assert_eq!(context.cache().compile_count(), 1);
}

#[test]
fn test_link_failure_is_not_cached() {
    let mut context = context();
    let key = key(&context, "basic", 0);

    context.backend().fail_link(true);
    match context.get_program(&key) {
        Err(ShaderError::ShaderLinkError { program, stages, log }) => {
            assert_eq!(program, "basic");
            let order: Vec<ShaderStage> = stages.iter().map(|(s, _)| *s).collect();
            assert_eq!(order, vec![ShaderStage::Vertex, ShaderStage::Fragment]);
            assert!(stages.iter().all(|(_, src)| src.starts_with("#version")));
            assert!(!log.is_empty());
        }
        Err(other) => panic!("expected link error, got {}", other),
        Ok(_) => panic!("link should have failed"),
    }
    assert!(context.cache().is_empty());
    assert_eq!(context.backend().live_shaders(), 0);
    assert_eq!(context.backend().live_programs(), 0);
}

#[test]
fn test_unknown_program() {
    let mut context = context();
    let key = SpecializationKey::builder("toon")
        .build(&Limits::default())
        .unwrap();

    assert!(matches!(
        context.get_program(&key),
        Err(ShaderError::UnknownProgram(name)) if name == "toon"
    ));
    assert_eq!(context.backend().compile_calls(), 0);
}

#[test]
fn test_limits_are_enforced() {
    let context = context();
    let err = context
        .build_key(context.key("standard").unwrap().textures(4))
        .unwrap_err();
    assert!(matches!(
        err,
        ShaderError::UnsupportedConfiguration { parameter, value, .. }
            if parameter == "MAT_TEXTURES" && value == "4"
    ));

    let err = context
        .build_key(context.key("physical").unwrap().skinning(5, 32))
        .unwrap_err();
    assert!(matches!(err, ShaderError::UnsupportedConfiguration { .. }));
}

#[test]
fn test_fragment_reload_invalidates_dependents_only() {
    let mut context = context();
    let standard = key(&context, "standard", 1);
    let basic = key(&context, "basic", 0);
    context.get_program(&standard).unwrap();
    context.get_program(&basic).unwrap();

    let replacement = context.registry().lookup("phong_model").unwrap().replace("EPS = 0.00001", "EPS = 0.0001");
    let dropped = context.register_fragment("phong_model", replacement).unwrap();

    assert_eq!(dropped, 1);
    assert!(!context.cache().contains(&standard));
    assert!(context.cache().contains(&basic));

    let program = context.get_program(&standard).unwrap();
    assert!(program.source(ShaderStage::Fragment).unwrap().contains("EPS = 0.0001;"));
    assert_eq!(context.cache().compile_count(), 3);
}

#[test]
fn test_cyclic_fragment_reload_is_rejected() {
    let mut context = context();
    let standard = key(&context, "standard", 1);
    context.get_program(&standard).unwrap();
    let lights = context.registry().lookup("lights").unwrap().to_string();

    match context.register_fragment("lights", "#include <standard_fragment>\n") {
        Err(ShaderError::CyclicInclude { cycle }) => {
            assert_eq!(cycle.first().map(String::as_str), Some("lights"));
            assert_eq!(cycle.last().map(String::as_str), Some("lights"));
        }
        other => panic!("expected cyclic include, got {:?}", other),
    }

    assert_eq!(context.registry().lookup("lights").unwrap(), lights);
    assert!(context.cache().contains(&standard));
    assert_eq!(context.cache().compile_count(), 1);
    assert!(context.get_program(&standard).is_ok());
}

#[test]
fn test_texture_limit_beyond_builtin_shaders_rejected() {
    let mut config = ShaderConfig::default();
    config.limits.max_textures = 5;
    assert!(matches!(
        ShaderContext::new(HeadlessBackend::new(), config),
        Err(ShaderError::Config(_))
    ));
}

#[test]
fn test_strict_overwrite_policy() {
    let config = ShaderConfig {
        allow_fragment_overwrite: false,
        ..ShaderConfig::default()
    };
    let mut context = ShaderContext::new(HeadlessBackend::new(), config).unwrap();

    assert!(matches!(
        context.register_fragment("lights", "// none\n"),
        Err(ShaderError::DuplicateName(name)) if name == "lights"
    ));
}

#[test]
fn test_config_file_and_fragment_dir() {
    let dir = tempfile::tempdir().unwrap();
    let fragments = dir.path().join("glsl");
    std::fs::create_dir(&fragments).unwrap();
    std::fs::write(
        fragments.join("unlit_vertex.glsl"),
        "#include <attributes>\nuniform mat4 MVP;\nvoid main() { gl_Position = MVP * vec4(VertexPosition, 1.0); }\n",
    )
    .unwrap();
    std::fs::write(
        fragments.join("unlit_fragment.glsl"),
        "out vec4 FragColor;\nvoid main() { FragColor = vec4(1.0); }\n",
    )
    .unwrap();

    let config_path = dir.path().join("lumina.toml");
    std::fs::write(
        &config_path,
        format!(
            "glsl_version = \"300 es\"\nfragment_dir = {:?}\n\n[limits]\nmax_textures = 2\n",
            fragments.display().to_string()
        ),
    )
    .unwrap();

    let config = ShaderConfig::load_from_file(&config_path).unwrap();
    assert_eq!(config.limits.max_textures, 2);
    assert_eq!(config.limits.max_lights_per_category, 16);

    let mut context = ShaderContext::new(HeadlessBackend::new(), config).unwrap();
    context
        .register_program(lumina_shaders::ProgramDescriptor::conventional(
            "unlit",
            lumina_shaders::MaterialModel::None,
        ))
        .unwrap();

    let key = context.build_key(context.key("unlit").unwrap()).unwrap();
    let program = context.get_program(&key).unwrap();
    assert!(program
        .source(ShaderStage::Vertex)
        .unwrap()
        .starts_with("#version 300 es\n"));
    assert!(program.uniform("MVP").is_some());

    assert!(context
        .build_key(context.key("standard").unwrap().textures(3))
        .is_err());
}
