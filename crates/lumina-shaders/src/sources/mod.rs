//! Built-in shader source set
//!
//! Static fragments are embedded from `glsl/`. The uniform layout fragments
//! (`lights`, `material_layout`, `physical_material_layout`, `panel_layout`)
//! are generated from [`crate::layout`] at registration time.

use crate::descriptor::{MaterialModel, ProgramDescriptor};
use crate::key::LightKind;
use crate::layout;
use crate::registry::FragmentRegistry;
use lumina_core::Result;
use tracing::debug;

/// Embedded include fragments
pub const FRAGMENTS: &[(&str, &str)] = &[
    ("attributes", include_str!("glsl/attributes.glsl")),
    ("bones_vertex", include_str!("glsl/bones_vertex.glsl")),
    (
        "bones_vertex_declaration",
        include_str!("glsl/bones_vertex_declaration.glsl"),
    ),
    ("material", include_str!("glsl/material.glsl")),
    ("morphtarget_vertex", include_str!("glsl/morphtarget_vertex.glsl")),
    ("morphtarget_vertex2", include_str!("glsl/morphtarget_vertex2.glsl")),
    (
        "morphtarget_vertex_declaration",
        include_str!("glsl/morphtarget_vertex_declaration.glsl"),
    ),
    (
        "morphtarget_vertex_declaration2",
        include_str!("glsl/morphtarget_vertex_declaration2.glsl"),
    ),
    ("phong_model", include_str!("glsl/phong_model.glsl")),
];

/// Embedded program stage sources
pub const PROGRAM_SOURCES: &[(&str, &str)] = &[
    ("basic_vertex", include_str!("glsl/basic_vertex.glsl")),
    ("basic_fragment", include_str!("glsl/basic_fragment.glsl")),
    ("panel_vertex", include_str!("glsl/panel_vertex.glsl")),
    ("panel_fragment", include_str!("glsl/panel_fragment.glsl")),
    ("physical_vertex", include_str!("glsl/physical_vertex.glsl")),
    ("physical_fragment", include_str!("glsl/physical_fragment.glsl")),
    ("point_vertex", include_str!("glsl/point_vertex.glsl")),
    ("point_fragment", include_str!("glsl/point_fragment.glsl")),
    ("standard_vertex", include_str!("glsl/standard_vertex.glsl")),
    ("standard_fragment", include_str!("glsl/standard_fragment.glsl")),
];

/// Layout fragments rendered from the uniform layout table
pub fn generated_fragments() -> Vec<(&'static str, String)> {
    let lights: String = LightKind::ALL
        .iter()
        .map(|kind| layout::light_block(*kind).glsl())
        .collect::<Vec<_>>()
        .join("\n");

    vec![
        ("lights", lights),
        (
            "material_layout",
            format!(
                "{}\n{}",
                layout::PHONG_MATERIAL.glsl(),
                layout::MATERIAL_TEXINFO.glsl()
            ),
        ),
        (
            "physical_material_layout",
            layout::PHYSICAL_MATERIAL.glsl(),
        ),
        (
            "panel_layout",
            format!("{}\n{}", layout::PANEL.glsl(), layout::PANEL_TEXINFO.glsl()),
        ),
    ]
}

/// Register every built-in fragment and program stage
pub fn register_builtin(registry: &mut FragmentRegistry) -> Result<()> {
    for (name, text) in FRAGMENTS.iter().chain(PROGRAM_SOURCES) {
        registry.register(*name, *text)?;
    }
    for (name, text) in generated_fragments() {
        registry.register(name, text)?;
    }
    debug!("Registered {} built-in fragments", registry.len());
    Ok(())
}

/// Descriptors of the built-in programs
pub fn builtin_programs() -> Vec<ProgramDescriptor> {
    vec![
        ProgramDescriptor::conventional("basic", MaterialModel::None),
        ProgramDescriptor::conventional("panel", MaterialModel::Panel),
        ProgramDescriptor::conventional("physical", MaterialModel::Physical),
        ProgramDescriptor::conventional("point", MaterialModel::Phong),
        ProgramDescriptor::conventional("standard", MaterialModel::Phong),
    ]
}
