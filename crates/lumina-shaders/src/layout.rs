//! Uniform layouts
//!
//! Per-draw uniforms are packed into flat vector arrays (`Material[6]`,
//! `DirLight[2*DIR_LIGHTS]`, ...) and shader code reads them back through
//! accessor macros such as `#define MatShininess Material[4].x`.
//!
//! Each block below is described once. The GLSL accessor macros are generated
//! from it ([`UniformBlock::glsl`]) and the host side writes through the same
//! fields ([`UniformArray`]), so both views of a slot always agree.

use crate::key::{LightKind, MAT_TEXTURES};
use std::fmt::Write;

/// GLSL vector type of a block's array elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlslType {
    Vec2,
    Vec3,
    Vec4,
}

impl GlslType {
    pub fn components(self) -> usize {
        match self {
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
        }
    }
}

/// Vector component addressed by a scalar field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    X,
    Y,
    Z,
    W,
}

impl Component {
    pub fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
            Self::W => 3,
        }
    }

    fn swizzle(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
            Self::W => "w",
        }
    }
}

/// How a field occupies its slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// The whole vector
    Vector,
    /// One float component
    Scalar(Component),
    /// One component read as `bool(...)` (0.0 or 1.0 on the host)
    Flag(Component),
}

/// A named position inside a block element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformField {
    /// Accessor macro name in GLSL
    pub name: &'static str,
    /// Vector slot within one element
    pub slot: usize,
    pub kind: FieldKind,
}

impl UniformField {
    pub const fn vector(name: &'static str, slot: usize) -> Self {
        Self {
            name,
            slot,
            kind: FieldKind::Vector,
        }
    }

    pub const fn scalar(name: &'static str, slot: usize, component: Component) -> Self {
        Self {
            name,
            slot,
            kind: FieldKind::Scalar(component),
        }
    }

    pub const fn flag(name: &'static str, slot: usize, component: Component) -> Self {
        Self {
            name,
            slot,
            kind: FieldKind::Flag(component),
        }
    }
}

/// How many elements a block's array holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCount {
    /// A fixed number of elements
    Fixed(usize),
    /// As many elements as the named specialization macro; the whole block
    /// is wrapped in `#if MACRO>0`
    Macro(&'static str),
}

/// One flat uniform array and the fields laid over it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformBlock {
    /// Array uniform name
    pub uniform: &'static str,
    pub glsl_type: GlslType,
    /// Vector slots per element
    pub stride: usize,
    pub count: BlockCount,
    /// Accessor macros take an element index argument
    pub indexed: bool,
    pub fields: &'static [UniformField],
}

impl UniformBlock {
    /// Floats occupied by `elements` elements
    pub fn float_len(&self, elements: usize) -> usize {
        elements * self.stride * self.glsl_type.components()
    }

    /// Offset of `field`'s first float within the flat array
    pub fn offset(&self, element: usize, field: &UniformField) -> usize {
        let component = match field.kind {
            FieldKind::Vector => 0,
            FieldKind::Scalar(c) | FieldKind::Flag(c) => c.index(),
        };
        (element * self.stride + field.slot) * self.glsl_type.components() + component
    }

    /// Generated declaration plus accessor macros
    pub fn glsl(&self) -> String {
        let mut out = String::new();
        let size = match self.count {
            BlockCount::Fixed(n) => (n * self.stride).to_string(),
            BlockCount::Macro(m) if self.stride == 1 => m.to_string(),
            BlockCount::Macro(m) => format!("{}*{}", self.stride, m),
        };

        if let BlockCount::Macro(m) = self.count {
            let _ = writeln!(out, "#if {}>0", m);
        }
        let _ = writeln!(out, "uniform {} {}[{}];", self.glsl_type.name(), self.uniform, size);
        for field in self.fields {
            let _ = writeln!(out, "#define {} {}", self.macro_signature(field), self.accessor(field));
        }
        if let BlockCount::Macro(_) = self.count {
            let _ = writeln!(out, "#endif");
        }
        out
    }

    fn macro_signature(&self, field: &UniformField) -> String {
        if self.indexed {
            format!("{}(a)", field.name)
        } else {
            field.name.to_string()
        }
    }

    fn accessor(&self, field: &UniformField) -> String {
        let index = match (self.indexed, self.stride, field.slot) {
            (true, 1, 0) => "(a)".to_string(),
            (true, stride, 0) => format!("{}*(a)", stride),
            (true, stride, slot) => format!("{}*(a)+{}", stride, slot),
            (false, _, slot) => slot.to_string(),
        };
        let element = format!("{}[{}]", self.uniform, index);
        match field.kind {
            FieldKind::Vector => element,
            FieldKind::Scalar(c) => format!("{}.{}", element, c.swizzle()),
            FieldKind::Flag(c) => format!("bool({}.{})", element, c.swizzle()),
        }
    }
}

// Phong material (standard and point programs)

pub const MAT_AMBIENT_COLOR: UniformField = UniformField::vector("MatAmbientColor", 0);
pub const MAT_DIFFUSE_COLOR: UniformField = UniformField::vector("MatDiffuseColor", 1);
pub const MAT_SPECULAR_COLOR: UniformField = UniformField::vector("MatSpecularColor", 2);
pub const MAT_EMISSIVE_COLOR: UniformField = UniformField::vector("MatEmissiveColor", 3);
pub const MAT_SHININESS: UniformField = UniformField::scalar("MatShininess", 4, Component::X);
pub const MAT_OPACITY: UniformField = UniformField::scalar("MatOpacity", 4, Component::Y);
pub const MAT_POINT_SIZE: UniformField = UniformField::scalar("MatPointSize", 4, Component::Z);
pub const MAT_POINT_ROTATION_Z: UniformField =
    UniformField::scalar("MatPointRotationZ", 5, Component::X);

pub const PHONG_MATERIAL: UniformBlock = UniformBlock {
    uniform: "Material",
    glsl_type: GlslType::Vec3,
    stride: 6,
    count: BlockCount::Fixed(1),
    indexed: false,
    fields: &[
        MAT_AMBIENT_COLOR,
        MAT_DIFFUSE_COLOR,
        MAT_SPECULAR_COLOR,
        MAT_EMISSIVE_COLOR,
        MAT_SHININESS,
        MAT_OPACITY,
        MAT_POINT_SIZE,
        MAT_POINT_ROTATION_Z,
    ],
};

// Per-texture parameters, shared field set for material and panel textures

pub const TEX_OFFSET: UniformField = UniformField::vector("MatTexOffset", 0);
pub const TEX_REPEAT: UniformField = UniformField::vector("MatTexRepeat", 1);
pub const TEX_FLIP_Y: UniformField = UniformField::flag("MatTexFlipY", 2, Component::X);
pub const TEX_VISIBLE: UniformField = UniformField::flag("MatTexVisible", 2, Component::Y);

const TEXINFO_FIELDS: &[UniformField] = &[TEX_OFFSET, TEX_REPEAT, TEX_FLIP_Y, TEX_VISIBLE];

pub const MATERIAL_TEXINFO: UniformBlock = UniformBlock {
    uniform: "MatTexinfo",
    glsl_type: GlslType::Vec2,
    stride: 3,
    count: BlockCount::Macro(MAT_TEXTURES),
    indexed: true,
    fields: TEXINFO_FIELDS,
};

/// Sampler array of the Phong programs, one unit per texture
pub const MATERIAL_SAMPLERS: &str = "MatTexture";

// Lights

pub const AMBIENT_LIGHT_COLOR: UniformField = UniformField::vector("AmbLightColor", 0);

pub const AMBIENT_LIGHTS: UniformBlock = UniformBlock {
    uniform: "AmbientLightColor",
    glsl_type: GlslType::Vec3,
    stride: 1,
    count: BlockCount::Macro("AMB_LIGHTS"),
    indexed: true,
    fields: &[AMBIENT_LIGHT_COLOR],
};

pub const DIR_LIGHT_COLOR: UniformField = UniformField::vector("DirLightColor", 0);
pub const DIR_LIGHT_POSITION: UniformField = UniformField::vector("DirLightPosition", 1);

pub const DIRECTIONAL_LIGHTS: UniformBlock = UniformBlock {
    uniform: "DirLight",
    glsl_type: GlslType::Vec3,
    stride: 2,
    count: BlockCount::Macro("DIR_LIGHTS"),
    indexed: true,
    fields: &[DIR_LIGHT_COLOR, DIR_LIGHT_POSITION],
};

pub const POINT_LIGHT_COLOR: UniformField = UniformField::vector("PointLightColor", 0);
pub const POINT_LIGHT_POSITION: UniformField = UniformField::vector("PointLightPosition", 1);
pub const POINT_LIGHT_LINEAR_DECAY: UniformField =
    UniformField::scalar("PointLightLinearDecay", 2, Component::X);
pub const POINT_LIGHT_QUADRATIC_DECAY: UniformField =
    UniformField::scalar("PointLightQuadraticDecay", 2, Component::Y);

pub const POINT_LIGHTS: UniformBlock = UniformBlock {
    uniform: "PointLight",
    glsl_type: GlslType::Vec3,
    stride: 3,
    count: BlockCount::Macro("POINT_LIGHTS"),
    indexed: true,
    fields: &[
        POINT_LIGHT_COLOR,
        POINT_LIGHT_POSITION,
        POINT_LIGHT_LINEAR_DECAY,
        POINT_LIGHT_QUADRATIC_DECAY,
    ],
};

pub const SPOT_LIGHT_COLOR: UniformField = UniformField::vector("SpotLightColor", 0);
pub const SPOT_LIGHT_POSITION: UniformField = UniformField::vector("SpotLightPosition", 1);
pub const SPOT_LIGHT_DIRECTION: UniformField = UniformField::vector("SpotLightDirection", 2);
pub const SPOT_LIGHT_ANGULAR_DECAY: UniformField =
    UniformField::scalar("SpotLightAngularDecay", 3, Component::X);
pub const SPOT_LIGHT_CUTOFF_ANGLE: UniformField =
    UniformField::scalar("SpotLightCutoffAngle", 3, Component::Y);
pub const SPOT_LIGHT_LINEAR_DECAY: UniformField =
    UniformField::scalar("SpotLightLinearDecay", 3, Component::Z);
pub const SPOT_LIGHT_QUADRATIC_DECAY: UniformField =
    UniformField::scalar("SpotLightQuadraticDecay", 4, Component::X);

pub const SPOT_LIGHTS: UniformBlock = UniformBlock {
    uniform: "SpotLight",
    glsl_type: GlslType::Vec3,
    stride: 5,
    count: BlockCount::Macro("SPOT_LIGHTS"),
    indexed: true,
    fields: &[
        SPOT_LIGHT_COLOR,
        SPOT_LIGHT_POSITION,
        SPOT_LIGHT_DIRECTION,
        SPOT_LIGHT_ANGULAR_DECAY,
        SPOT_LIGHT_CUTOFF_ANGLE,
        SPOT_LIGHT_LINEAR_DECAY,
        SPOT_LIGHT_QUADRATIC_DECAY,
    ],
};

/// The uniform block holding lights of `kind`
pub fn light_block(kind: LightKind) -> &'static UniformBlock {
    match kind {
        LightKind::Ambient => &AMBIENT_LIGHTS,
        LightKind::Directional => &DIRECTIONAL_LIGHTS,
        LightKind::Point => &POINT_LIGHTS,
        LightKind::Spot => &SPOT_LIGHTS,
    }
}

// Physically based material

pub const PBR_BASE_COLOR: UniformField = UniformField::vector("uBaseColor", 0);
pub const PBR_EMISSIVE_COLOR: UniformField = UniformField::vector("uEmissiveColor", 1);
pub const PBR_METALLIC_FACTOR: UniformField =
    UniformField::scalar("uMetallicFactor", 2, Component::X);
pub const PBR_ROUGHNESS_FACTOR: UniformField =
    UniformField::scalar("uRoughnessFactor", 2, Component::Y);

pub const PHYSICAL_MATERIAL: UniformBlock = UniformBlock {
    uniform: "Material",
    glsl_type: GlslType::Vec4,
    stride: 3,
    count: BlockCount::Fixed(1),
    indexed: false,
    fields: &[
        PBR_BASE_COLOR,
        PBR_EMISSIVE_COLOR,
        PBR_METALLIC_FACTOR,
        PBR_ROUGHNESS_FACTOR,
    ],
};

/// Occlusion strength uniform of the physical program
pub const PBR_OCCLUSION_STRENGTH: &str = "uOcclusionStrength";

// GUI panel

pub const PANEL_BOUNDS: UniformField = UniformField::vector("Bounds", 0);
pub const PANEL_BORDER: UniformField = UniformField::vector("Border", 1);
pub const PANEL_PADDING: UniformField = UniformField::vector("Padding", 2);
pub const PANEL_CONTENT: UniformField = UniformField::vector("Content", 3);
pub const PANEL_BORDER_COLOR: UniformField = UniformField::vector("BorderColor", 4);
pub const PANEL_PADDING_COLOR: UniformField = UniformField::vector("PaddingColor", 5);
pub const PANEL_CONTENT_COLOR: UniformField = UniformField::vector("ContentColor", 6);
pub const PANEL_TEXTURE_VALID: UniformField =
    UniformField::flag("TextureValid", 7, Component::X);

pub const PANEL: UniformBlock = UniformBlock {
    uniform: "Panel",
    glsl_type: GlslType::Vec4,
    stride: 8,
    count: BlockCount::Fixed(1),
    indexed: false,
    fields: &[
        PANEL_BOUNDS,
        PANEL_BORDER,
        PANEL_PADDING,
        PANEL_CONTENT,
        PANEL_BORDER_COLOR,
        PANEL_PADDING_COLOR,
        PANEL_CONTENT_COLOR,
        PANEL_TEXTURE_VALID,
    ],
};

pub const PANEL_TEXINFO: UniformBlock = UniformBlock {
    uniform: "MatTexinfo",
    glsl_type: GlslType::Vec2,
    stride: 3,
    count: BlockCount::Fixed(1),
    indexed: false,
    fields: TEXINFO_FIELDS,
};

/// Every array block, for uniform location resolution
pub const ALL_BLOCKS: [&UniformBlock; 9] = [
    &PHONG_MATERIAL,
    &MATERIAL_TEXINFO,
    &AMBIENT_LIGHTS,
    &DIRECTIONAL_LIGHTS,
    &POINT_LIGHTS,
    &SPOT_LIGHTS,
    &PHYSICAL_MATERIAL,
    &PANEL,
    &PANEL_TEXINFO,
];

/// Non-block uniforms a program may declare
pub const STANDALONE_UNIFORMS: &[&str] = &[
    "MVP",
    "MV",
    "ModelMatrix",
    "ModelViewMatrix",
    "NormalMatrix",
    MATERIAL_SAMPLERS,
    PBR_OCCLUSION_STRENGTH,
    "uBaseColorSampler",
    "uMetallicRoughnessSampler",
    "uNormalSampler",
    "uEmissiveSampler",
    "uOcclusionSampler",
    "mBones",
    "morphTargetInfluences",
];

/// Every uniform name a compiled program resolves once after linking
pub fn uniform_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = ALL_BLOCKS.iter().map(|b| b.uniform).collect();
    names.extend_from_slice(STANDALONE_UNIFORMS);
    names.sort_unstable();
    names.dedup();
    names
}

/// Host-side staging copy of one block, written through its fields
#[derive(Debug, Clone, PartialEq)]
pub struct UniformArray {
    block: &'static UniformBlock,
    elements: usize,
    data: Vec<f32>,
}

impl UniformArray {
    /// Zeroed storage for `elements` elements of `block`
    pub fn new(block: &'static UniformBlock, elements: usize) -> Self {
        Self {
            block,
            elements,
            data: vec![0.0; block.float_len(elements)],
        }
    }

    pub fn block(&self) -> &'static UniformBlock {
        self.block
    }

    pub fn elements(&self) -> usize {
        self.elements
    }

    /// Flat data in upload order
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Write a whole-vector field; extra values are ignored, missing ones stay zero
    pub fn set_vector(&mut self, element: usize, field: &UniformField, values: &[f32]) {
        debug_assert_eq!(field.kind, FieldKind::Vector, "{} is not a vector field", field.name);
        let start = self.block.offset(element, field);
        let width = self.block.glsl_type.components().min(values.len());
        self.data[start..start + width].copy_from_slice(&values[..width]);
    }

    pub fn set_scalar(&mut self, element: usize, field: &UniformField, value: f32) {
        debug_assert!(matches!(field.kind, FieldKind::Scalar(_)), "{} is not a scalar field", field.name);
        let at = self.block.offset(element, field);
        self.data[at] = value;
    }

    pub fn set_flag(&mut self, element: usize, field: &UniformField, value: bool) {
        debug_assert!(matches!(field.kind, FieldKind::Flag(_)), "{} is not a flag field", field.name);
        let at = self.block.offset(element, field);
        self.data[at] = if value { 1.0 } else { 0.0 };
    }

    /// Read back a whole-vector field
    pub fn vector(&self, element: usize, field: &UniformField) -> &[f32] {
        let start = self.block.offset(element, field);
        &self.data[start..start + self.block.glsl_type.components()]
    }

    /// Read back a scalar or flag field
    pub fn scalar(&self, element: usize, field: &UniformField) -> f32 {
        self.data[self.block.offset(element, field)]
    }
}
