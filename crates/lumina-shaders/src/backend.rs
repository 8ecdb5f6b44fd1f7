//! Graphics backend seam
//!
//! The program cache is the only component that touches the GPU, and it does
//! so through [`ShaderBackend`]. [`GlowBackend`] drives a live OpenGL context;
//! [`HeadlessBackend`] records calls for tests and offline validation.

use lumina_core::ShaderStage;
use regex::Regex;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;
use std::sync::OnceLock;
use thiserror::Error;

/// Failure reported by a backend call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The driver could not allocate the object
    #[error("cannot create {0}")]
    Create(String),

    /// The driver compiled or linked and rejected the input; carries the native log
    #[error("{0}")]
    Rejected(String),
}

/// Borrowed uniform data for one upload
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue<'a> {
    Int(&'a [i32]),
    Float(&'a [f32]),
    Vec2(&'a [f32]),
    Vec3(&'a [f32]),
    Vec4(&'a [f32]),
    Mat3(&'a [f32]),
    Mat4(&'a [f32]),
}

impl UniformValue<'_> {
    pub fn to_recorded(&self) -> RecordedUniform {
        match *self {
            Self::Int(v) => RecordedUniform::Int(v.to_vec()),
            Self::Float(v) => RecordedUniform::Float(v.to_vec()),
            Self::Vec2(v) => RecordedUniform::Vec2(v.to_vec()),
            Self::Vec3(v) => RecordedUniform::Vec3(v.to_vec()),
            Self::Vec4(v) => RecordedUniform::Vec4(v.to_vec()),
            Self::Mat3(v) => RecordedUniform::Mat3(v.to_vec()),
            Self::Mat4(v) => RecordedUniform::Mat4(v.to_vec()),
        }
    }
}

/// Owned copy of an upload, as kept by [`HeadlessBackend`]
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedUniform {
    Int(Vec<i32>),
    Float(Vec<f32>),
    Vec2(Vec<f32>),
    Vec3(Vec<f32>),
    Vec4(Vec<f32>),
    Mat3(Vec<f32>),
    Mat4(Vec<f32>),
}

impl RecordedUniform {
    /// Float payload, empty for integer uploads
    pub fn floats(&self) -> &[f32] {
        match self {
            Self::Int(_) => &[],
            Self::Float(v)
            | Self::Vec2(v)
            | Self::Vec3(v)
            | Self::Vec4(v)
            | Self::Mat3(v)
            | Self::Mat4(v) => v,
        }
    }

    /// Integer payload, empty for float uploads
    pub fn ints(&self) -> &[i32] {
        match self {
            Self::Int(v) => v,
            _ => &[],
        }
    }
}

/// GPU operations needed to build, bind and destroy programs
pub trait ShaderBackend {
    type Shader: Copy + fmt::Debug;
    type Program: Copy + fmt::Debug + PartialEq;
    type Location: Clone + fmt::Debug;

    fn compile_shader(&self, stage: ShaderStage, source: &str) -> Result<Self::Shader, BackendError>;

    /// Link `shaders` into a program. The shaders stay owned by the caller.
    fn link_program(&self, shaders: &[Self::Shader]) -> Result<Self::Program, BackendError>;

    fn delete_shader(&self, shader: Self::Shader);

    fn delete_program(&self, program: Self::Program);

    /// `None` when the uniform is absent or optimized out
    fn uniform_location(&self, program: Self::Program, name: &str) -> Option<Self::Location>;

    fn use_program(&self, program: Option<Self::Program>);

    /// Upload to the currently bound program
    fn upload(&self, location: &Self::Location, value: UniformValue<'_>);
}

/// OpenGL backend over a shared `glow` context
///
/// Holds an `Rc`, so it (and any cache built on it) stays on the context thread.
pub struct GlowBackend {
    gl: Rc<glow::Context>,
}

impl GlowBackend {
    pub fn new(gl: Rc<glow::Context>) -> Self {
        Self { gl }
    }

    pub fn context(&self) -> &Rc<glow::Context> {
        &self.gl
    }
}

fn gl_stage(stage: ShaderStage) -> u32 {
    match stage {
        ShaderStage::Vertex => glow::VERTEX_SHADER,
        ShaderStage::Geometry => glow::GEOMETRY_SHADER,
        ShaderStage::Fragment => glow::FRAGMENT_SHADER,
    }
}

impl ShaderBackend for GlowBackend {
    type Shader = glow::Shader;
    type Program = glow::Program;
    type Location = glow::UniformLocation;

    fn compile_shader(&self, stage: ShaderStage, source: &str) -> Result<glow::Shader, BackendError> {
        use glow::HasContext;
        unsafe {
            let shader = self
                .gl
                .create_shader(gl_stage(stage))
                .map_err(|e| BackendError::Create(format!("{} shader: {}", stage, e)))?;
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);

            if !self.gl.get_shader_compile_status(shader) {
                let log = self.gl.get_shader_info_log(shader);
                self.gl.delete_shader(shader);
                return Err(BackendError::Rejected(log));
            }
            Ok(shader)
        }
    }

    fn link_program(&self, shaders: &[glow::Shader]) -> Result<glow::Program, BackendError> {
        use glow::HasContext;
        unsafe {
            let program = self
                .gl
                .create_program()
                .map_err(|e| BackendError::Create(format!("program: {}", e)))?;
            for shader in shaders {
                self.gl.attach_shader(program, *shader);
            }
            self.gl.link_program(program);
            let linked = self.gl.get_program_link_status(program);
            for shader in shaders {
                self.gl.detach_shader(program, *shader);
            }

            if !linked {
                let log = self.gl.get_program_info_log(program);
                self.gl.delete_program(program);
                return Err(BackendError::Rejected(log));
            }
            Ok(program)
        }
    }

    fn delete_shader(&self, shader: glow::Shader) {
        use glow::HasContext;
        unsafe { self.gl.delete_shader(shader) }
    }

    fn delete_program(&self, program: glow::Program) {
        use glow::HasContext;
        unsafe { self.gl.delete_program(program) }
    }

    fn uniform_location(&self, program: glow::Program, name: &str) -> Option<glow::UniformLocation> {
        use glow::HasContext;
        unsafe { self.gl.get_uniform_location(program, name) }
    }

    fn use_program(&self, program: Option<glow::Program>) {
        use glow::HasContext;
        unsafe { self.gl.use_program(program) }
    }

    fn upload(&self, location: &glow::UniformLocation, value: UniformValue<'_>) {
        use glow::HasContext;
        let location = Some(location);
        unsafe {
            match value {
                UniformValue::Int(v) => self.gl.uniform_1_i32_slice(location, v),
                UniformValue::Float(v) => self.gl.uniform_1_f32_slice(location, v),
                UniformValue::Vec2(v) => self.gl.uniform_2_f32_slice(location, v),
                UniformValue::Vec3(v) => self.gl.uniform_3_f32_slice(location, v),
                UniformValue::Vec4(v) => self.gl.uniform_4_f32_slice(location, v),
                UniformValue::Mat3(v) => self.gl.uniform_matrix_3_f32_slice(location, false, v),
                UniformValue::Mat4(v) => self.gl.uniform_matrix_4_f32_slice(location, false, v),
            }
        }
    }
}

/// Shader handle issued by [`HeadlessBackend`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadlessShader(u32);

/// Program handle issued by [`HeadlessBackend`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeadlessProgram(u32);

/// Uniform location issued by [`HeadlessBackend`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeadlessLocation {
    program: HeadlessProgram,
    name: String,
}

impl HeadlessLocation {
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn uniform_decl_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*uniform\s+(?:(?:lowp|mediump|highp)\s+)?\w+\s+(\w+)")
            .expect("Invalid regex")
    })
}

#[derive(Debug, Default)]
struct HeadlessState {
    next_id: u32,
    shaders: HashMap<u32, (ShaderStage, String)>,
    /// Uniform names declared by each live program
    programs: HashMap<u32, BTreeSet<String>>,
    bound: Option<HeadlessProgram>,
    uploads: HashMap<(HeadlessProgram, String), RecordedUniform>,
}

/// Backend that validates and records instead of talking to a driver
///
/// A stage "compiles" when its first line is a `#version` directive. Linked
/// programs expose every `uniform` declared in their sources; preprocessor
/// conditionals are not evaluated. Failures can be injected per stage or at
/// link time.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    state: RefCell<HeadlessState>,
    compile_calls: Cell<usize>,
    link_calls: Cell<usize>,
    upload_calls: Cell<usize>,
    fail_stage: Cell<Option<ShaderStage>>,
    fail_link: Cell<bool>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every compile of `stage` until cleared with `None`
    pub fn fail_stage(&self, stage: Option<ShaderStage>) {
        self.fail_stage.set(stage);
    }

    /// Reject every link until cleared
    pub fn fail_link(&self, fail: bool) {
        self.fail_link.set(fail);
    }

    /// Native compiles attempted, successful or not
    pub fn compile_calls(&self) -> usize {
        self.compile_calls.get()
    }

    pub fn link_calls(&self) -> usize {
        self.link_calls.get()
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.get()
    }

    pub fn live_shaders(&self) -> usize {
        self.state.borrow().shaders.len()
    }

    pub fn live_programs(&self) -> usize {
        self.state.borrow().programs.len()
    }

    pub fn bound_program(&self) -> Option<HeadlessProgram> {
        self.state.borrow().bound
    }

    /// Uniform names a live program declares
    pub fn declared_uniforms(&self, program: HeadlessProgram) -> Option<BTreeSet<String>> {
        self.state.borrow().programs.get(&program.0).cloned()
    }

    /// Last value uploaded to `name` while `program` was bound
    pub fn uploaded(&self, program: HeadlessProgram, name: &str) -> Option<RecordedUniform> {
        self.state
            .borrow()
            .uploads
            .get(&(program, name.to_string()))
            .cloned()
    }

    fn issue_id(state: &mut HeadlessState) -> u32 {
        state.next_id += 1;
        state.next_id
    }
}

impl ShaderBackend for HeadlessBackend {
    type Shader = HeadlessShader;
    type Program = HeadlessProgram;
    type Location = HeadlessLocation;

    fn compile_shader(&self, stage: ShaderStage, source: &str) -> Result<HeadlessShader, BackendError> {
        self.compile_calls.set(self.compile_calls.get() + 1);

        if self.fail_stage.get() == Some(stage) {
            return Err(BackendError::Rejected(format!(
                "0:1(1): error: {} stage rejected",
                stage
            )));
        }
        let first = source.lines().next().unwrap_or_default();
        if !first.trim_start().starts_with("#version") {
            return Err(BackendError::Rejected(
                "0:1(1): error: #version must be the first directive".to_string(),
            ));
        }

        let mut state = self.state.borrow_mut();
        let id = Self::issue_id(&mut state);
        state.shaders.insert(id, (stage, source.to_string()));
        Ok(HeadlessShader(id))
    }

    fn link_program(&self, shaders: &[HeadlessShader]) -> Result<HeadlessProgram, BackendError> {
        self.link_calls.set(self.link_calls.get() + 1);

        if self.fail_link.get() {
            return Err(BackendError::Rejected(
                "error: linking failed (injected)".to_string(),
            ));
        }

        let mut state = self.state.borrow_mut();
        let mut uniforms = BTreeSet::new();
        let mut has_vertex = false;
        for shader in shaders {
            let (stage, source) = state
                .shaders
                .get(&shader.0)
                .ok_or_else(|| BackendError::Rejected(format!("unknown shader {}", shader.0)))?;
            has_vertex |= *stage == ShaderStage::Vertex;
            for caps in uniform_decl_regex().captures_iter(source) {
                uniforms.insert(caps[1].to_string());
            }
        }
        if !has_vertex {
            return Err(BackendError::Rejected(
                "error: program has no vertex stage".to_string(),
            ));
        }

        let id = Self::issue_id(&mut state);
        state.programs.insert(id, uniforms);
        Ok(HeadlessProgram(id))
    }

    fn delete_shader(&self, shader: HeadlessShader) {
        self.state.borrow_mut().shaders.remove(&shader.0);
    }

    fn delete_program(&self, program: HeadlessProgram) {
        let mut state = self.state.borrow_mut();
        state.programs.remove(&program.0);
        state.uploads.retain(|(p, _), _| *p != program);
        if state.bound == Some(program) {
            state.bound = None;
        }
    }

    fn uniform_location(&self, program: HeadlessProgram, name: &str) -> Option<HeadlessLocation> {
        let state = self.state.borrow();
        state
            .programs
            .get(&program.0)
            .filter(|uniforms| uniforms.contains(name))
            .map(|_| HeadlessLocation {
                program,
                name: name.to_string(),
            })
    }

    fn use_program(&self, program: Option<HeadlessProgram>) {
        self.state.borrow_mut().bound = program;
    }

    fn upload(&self, location: &HeadlessLocation, value: UniformValue<'_>) {
        self.upload_calls.set(self.upload_calls.get() + 1);
        let mut state = self.state.borrow_mut();
        debug_assert_eq!(
            state.bound,
            Some(location.program),
            "upload to {} while another program is bound",
            location.name
        );
        state
            .uploads
            .insert((location.program, location.name.clone()), value.to_recorded());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = "#version 330 core\nuniform mat4 MVP;\nuniform vec3 DirLight[2*DIR_LIGHTS];\nvoid main() {}\n";
    const FS: &str = "#version 330 core\nuniform highp vec4 Panel[8];\nvoid main() {}\n";

    #[test]
    fn test_headless_link_collects_uniforms() {
        let backend = HeadlessBackend::new();
        let vs = backend.compile_shader(ShaderStage::Vertex, VS).unwrap();
        let fs = backend.compile_shader(ShaderStage::Fragment, FS).unwrap();
        let program = backend.link_program(&[vs, fs]).unwrap();

        let uniforms = backend.declared_uniforms(program).unwrap();
        let names: Vec<&str> = uniforms.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["DirLight", "MVP", "Panel"]);
        assert!(backend.uniform_location(program, "Panel").is_some());
        assert!(backend.uniform_location(program, "Material").is_none());
    }

    #[test]
    fn test_headless_requires_version_line() {
        let backend = HeadlessBackend::new();
        let err = backend
            .compile_shader(ShaderStage::Vertex, "void main() {}\n")
            .unwrap_err();
        assert!(matches!(err, BackendError::Rejected(log) if log.contains("#version")));
        assert_eq!(backend.compile_calls(), 1);
        assert_eq!(backend.live_shaders(), 0);
    }

    #[test]
    fn test_headless_failure_injection() {
        let backend = HeadlessBackend::new();
        backend.fail_stage(Some(ShaderStage::Fragment));
        assert!(backend.compile_shader(ShaderStage::Vertex, VS).is_ok());
        assert!(backend.compile_shader(ShaderStage::Fragment, FS).is_err());

        backend.fail_stage(None);
        backend.fail_link(true);
        let vs = backend.compile_shader(ShaderStage::Vertex, VS).unwrap();
        assert!(backend.link_program(&[vs]).is_err());
        assert_eq!(backend.live_programs(), 0);
    }

    #[test]
    fn test_headless_records_uploads() {
        let backend = HeadlessBackend::new();
        let vs = backend.compile_shader(ShaderStage::Vertex, VS).unwrap();
        let program = backend.link_program(&[vs]).unwrap();
        let location = backend.uniform_location(program, "MVP").unwrap();

        backend.use_program(Some(program));
        backend.upload(&location, UniformValue::Mat4(&[1.0; 16]));
        assert_eq!(backend.upload_calls(), 1);
        assert_eq!(
            backend.uploaded(program, "MVP").unwrap().floats(),
            &[1.0; 16][..]
        );

        backend.delete_program(program);
        assert!(backend.uploaded(program, "MVP").is_none());
        assert_eq!(backend.bound_program(), None);
    }
}
