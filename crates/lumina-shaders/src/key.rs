//! Specialization keys
//!
//! A [`SpecializationKey`] is the complete, validated set of parameters that
//! selects one shader variant. It is the only input to macro generation, so
//! two equal keys always produce byte-identical source, and it is the only
//! index of the program cache.

use lumina_core::{Limits, Result, ShaderError};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write};

/// Macro holding the material texture count
pub const MAT_TEXTURES: &str = "MAT_TEXTURES";
/// Macro holding the bone influencer count (emitted only when skinning)
pub const BONE_INFLUENCERS: &str = "BONE_INFLUENCERS";
/// Macro holding the bone matrix array size (emitted only when skinning)
pub const TOTAL_BONES: &str = "TOTAL_BONES";
/// Macro holding the morph target count (emitted only when morphing)
pub const MORPHTARGETS: &str = "MORPHTARGETS";

/// Light categories with their own uniform arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LightKind {
    Ambient,
    Directional,
    Point,
    Spot,
}

impl LightKind {
    /// Categories in macro emission order
    pub const ALL: [LightKind; 4] = [Self::Ambient, Self::Directional, Self::Point, Self::Spot];

    /// The count macro guarding this category's code
    pub fn macro_name(self) -> &'static str {
        match self {
            Self::Ambient => "AMB_LIGHTS",
            Self::Directional => "DIR_LIGHTS",
            Self::Point => "POINT_LIGHTS",
            Self::Spot => "SPOT_LIGHTS",
        }
    }
}

impl fmt::Display for LightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ambient => write!(f, "ambient"),
            Self::Directional => write!(f, "directional"),
            Self::Point => write!(f, "point"),
            Self::Spot => write!(f, "spot"),
        }
    }
}

/// Number of lights per category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LightCounts {
    pub ambient: usize,
    pub directional: usize,
    pub point: usize,
    pub spot: usize,
}

impl LightCounts {
    pub fn new(ambient: usize, directional: usize, point: usize, spot: usize) -> Self {
        Self {
            ambient,
            directional,
            point,
            spot,
        }
    }

    pub fn get(&self, kind: LightKind) -> usize {
        match kind {
            LightKind::Ambient => self.ambient,
            LightKind::Directional => self.directional,
            LightKind::Point => self.point,
            LightKind::Spot => self.spot,
        }
    }
}

/// Boolean shader features, each mapped to a presence-only define
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    BaseColorMap,
    MetalRoughnessMap,
    NormalMap,
    EmissiveMap,
    OcclusionMap,
    /// Morph targets also displace normals
    MorphTargetNormals,
}

impl Feature {
    pub const ALL: [Feature; 6] = [
        Self::BaseColorMap,
        Self::MetalRoughnessMap,
        Self::NormalMap,
        Self::EmissiveMap,
        Self::OcclusionMap,
        Self::MorphTargetNormals,
    ];

    pub fn macro_name(self) -> &'static str {
        match self {
            Self::BaseColorMap => "HAS_BASECOLORMAP",
            Self::MetalRoughnessMap => "HAS_METALROUGHNESSMAP",
            Self::NormalMap => "HAS_NORMALMAP",
            Self::EmissiveMap => "HAS_EMISSIVEMAP",
            Self::OcclusionMap => "HAS_OCCLUSIONMAP",
            Self::MorphTargetNormals => "MORPHTARGETS_NORMAL",
        }
    }
}

fn is_reserved(name: &str) -> bool {
    LightKind::ALL.iter().any(|k| k.macro_name() == name)
        || Feature::ALL.iter().any(|f| f.macro_name() == name)
        || [MAT_TEXTURES, BONE_INFLUENCERS, TOTAL_BONES, MORPHTARGETS].contains(&name)
        || name.starts_with("GL_")
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The canonical parameter tuple identifying one shader variant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpecializationKey {
    program: String,
    lights: LightCounts,
    textures: usize,
    bone_influencers: usize,
    total_bones: usize,
    morph_targets: usize,
    features: BTreeSet<Feature>,
    defines: BTreeMap<String, String>,
}

impl SpecializationKey {
    /// Start building a key for the base program `program`
    pub fn builder(program: impl Into<String>) -> KeyBuilder {
        KeyBuilder::new(program)
    }

    /// Base program name
    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn lights(&self) -> LightCounts {
        self.lights
    }

    pub fn textures(&self) -> usize {
        self.textures
    }

    pub fn bone_influencers(&self) -> usize {
        self.bone_influencers
    }

    pub fn total_bones(&self) -> usize {
        self.total_bones
    }

    pub fn morph_targets(&self) -> usize {
        self.morph_targets
    }

    pub fn features(&self) -> &BTreeSet<Feature> {
        &self.features
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    /// Every define in emission order; `None` values are presence-only.
    pub fn defines(&self) -> Vec<(String, Option<String>)> {
        let mut out = Vec::with_capacity(8 + self.features.len() + self.defines.len());
        for kind in LightKind::ALL {
            out.push((
                kind.macro_name().to_string(),
                Some(self.lights.get(kind).to_string()),
            ));
        }
        out.push((MAT_TEXTURES.to_string(), Some(self.textures.to_string())));
        if self.bone_influencers > 0 {
            out.push((
                BONE_INFLUENCERS.to_string(),
                Some(self.bone_influencers.to_string()),
            ));
            out.push((TOTAL_BONES.to_string(), Some(self.total_bones.to_string())));
        }
        if self.morph_targets > 0 {
            out.push((MORPHTARGETS.to_string(), Some(self.morph_targets.to_string())));
        }
        for feature in &self.features {
            out.push((feature.macro_name().to_string(), None));
        }
        for (name, value) in &self.defines {
            let value = (!value.is_empty()).then(|| value.clone());
            out.push((name.clone(), value));
        }
        out
    }

    /// Define values by name, as consulted by repeated includes
    pub fn define_values(&self) -> BTreeMap<String, String> {
        self.defines()
            .into_iter()
            .map(|(name, value)| (name, value.unwrap_or_default()))
            .collect()
    }

    /// The `#version` line followed by every define, one per line
    pub fn macro_block(&self, glsl_version: &str) -> String {
        let mut block = String::with_capacity(256);
        let _ = writeln!(block, "#version {}", glsl_version);
        for (name, value) in self.defines() {
            match value {
                Some(value) => {
                    let _ = writeln!(block, "#define {} {}", name, value);
                }
                None => {
                    let _ = writeln!(block, "#define {}", name);
                }
            }
        }
        block
    }
}

impl fmt::Display for SpecializationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[amb={} dir={} point={} spot={} tex={}",
            self.program,
            self.lights.ambient,
            self.lights.directional,
            self.lights.point,
            self.lights.spot,
            self.textures
        )?;
        if self.bone_influencers > 0 {
            write!(f, " bones={}/{}", self.bone_influencers, self.total_bones)?;
        }
        if self.morph_targets > 0 {
            write!(f, " morphs={}", self.morph_targets)?;
        }
        for feature in &self.features {
            write!(f, " {}", feature.macro_name())?;
        }
        for name in self.defines.keys() {
            write!(f, " {}", name)?;
        }
        write!(f, "]")
    }
}

/// Collects scene parameters and validates them into a [`SpecializationKey`]
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    key: SpecializationKey,
}

impl KeyBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            key: SpecializationKey {
                program: program.into(),
                lights: LightCounts::default(),
                textures: 0,
                bone_influencers: 0,
                total_bones: 0,
                morph_targets: 0,
                features: BTreeSet::new(),
                defines: BTreeMap::new(),
            },
        }
    }

    pub fn lights(mut self, lights: LightCounts) -> Self {
        self.key.lights = lights;
        self
    }

    pub fn ambient(mut self, count: usize) -> Self {
        self.key.lights.ambient = count;
        self
    }

    pub fn directional(mut self, count: usize) -> Self {
        self.key.lights.directional = count;
        self
    }

    pub fn point(mut self, count: usize) -> Self {
        self.key.lights.point = count;
        self
    }

    pub fn spot(mut self, count: usize) -> Self {
        self.key.lights.spot = count;
        self
    }

    pub fn textures(mut self, count: usize) -> Self {
        self.key.textures = count;
        self
    }

    /// Enable skinning with `influencers` bones per vertex out of `total_bones`
    pub fn skinning(mut self, influencers: usize, total_bones: usize) -> Self {
        self.key.bone_influencers = influencers;
        self.key.total_bones = total_bones;
        self
    }

    pub fn morph_targets(mut self, count: usize) -> Self {
        self.key.morph_targets = count;
        self
    }

    pub fn feature(mut self, feature: Feature) -> Self {
        self.key.features.insert(feature);
        self
    }

    pub fn features(mut self, features: impl IntoIterator<Item = Feature>) -> Self {
        self.key.features.extend(features);
        self
    }

    /// Extra program-specific define; an empty value emits a presence-only define
    pub fn define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.key.defines.insert(name.into(), value.into());
        self
    }

    /// Validate every parameter against `limits`
    pub fn build(self, limits: &Limits) -> Result<SpecializationKey> {
        let key = self.key;

        if key.program.is_empty() {
            return Err(ShaderError::UnknownProgram(String::new()));
        }

        for kind in LightKind::ALL {
            let count = key.lights.get(kind);
            if count > limits.max_lights_per_category {
                return Err(ShaderError::unsupported(
                    kind.macro_name(),
                    count,
                    limits.max_lights_per_category,
                ));
            }
        }

        if key.textures > limits.max_textures {
            return Err(ShaderError::unsupported(
                MAT_TEXTURES,
                key.textures,
                limits.max_textures,
            ));
        }

        if key.bone_influencers > limits.max_bone_influencers {
            return Err(ShaderError::unsupported(
                BONE_INFLUENCERS,
                key.bone_influencers,
                limits.max_bone_influencers,
            ));
        }
        if key.bone_influencers > 0
            && (key.total_bones == 0 || key.total_bones > limits.max_total_bones)
        {
            return Err(ShaderError::unsupported(
                TOTAL_BONES,
                key.total_bones,
                limits.max_total_bones,
            ));
        }

        if key.morph_targets > limits.max_morph_targets {
            return Err(ShaderError::unsupported(
                MORPHTARGETS,
                key.morph_targets,
                limits.max_morph_targets,
            ));
        }

        for (name, value) in &key.defines {
            if !is_identifier(name) || is_reserved(name) {
                return Err(ShaderError::unsupported(
                    "define name",
                    name,
                    "a non-reserved GLSL identifier",
                ));
            }
            if value.contains(['\n', '\r']) {
                return Err(ShaderError::unsupported(
                    format!("define {}", name),
                    value.escape_debug(),
                    "a single-line value",
                ));
            }
        }

        // Skinning off: normalize so keys differing only in an unused total compare equal.
        let total_bones = if key.bone_influencers == 0 {
            0
        } else {
            key.total_bones
        };

        Ok(SpecializationKey {
            total_bones,
            ..key
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> Limits {
        Limits::default()
    }

    #[test]
    fn test_macro_block_order_and_zero_counts() {
        let key = SpecializationKey::builder("standard")
            .ambient(1)
            .directional(2)
            .textures(1)
            .build(&limits())
            .unwrap();

        assert_eq!(
            key.macro_block("330 core"),
            "#version 330 core\n\
             #define AMB_LIGHTS 1\n\
             #define DIR_LIGHTS 2\n\
             #define POINT_LIGHTS 0\n\
             #define SPOT_LIGHTS 0\n\
             #define MAT_TEXTURES 1\n"
        );
    }

    #[test]
    fn test_skinning_morphing_and_features() {
        let key = SpecializationKey::builder("physical")
            .skinning(4, 32)
            .morph_targets(2)
            .feature(Feature::NormalMap)
            .feature(Feature::BaseColorMap)
            .define("USE_FOG", "")
            .build(&limits())
            .unwrap();

        let block = key.macro_block("330 core");
        assert!(block.contains("#define BONE_INFLUENCERS 4\n#define TOTAL_BONES 32\n"));
        assert!(block.contains("#define MORPHTARGETS 2\n"));
        // Features follow declaration order regardless of insertion order.
        assert!(block.ends_with("#define HAS_BASECOLORMAP\n#define HAS_NORMALMAP\n#define USE_FOG\n"));
        assert_eq!(key.define_values()["MORPHTARGETS"], "2");
    }

    #[test]
    fn test_equal_keys_hash_equal() {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let a = SpecializationKey::builder("standard")
            .feature(Feature::NormalMap)
            .feature(Feature::EmissiveMap)
            .build(&limits())
            .unwrap();
        let b = SpecializationKey::builder("standard")
            .feature(Feature::EmissiveMap)
            .feature(Feature::NormalMap)
            .build(&limits())
            .unwrap();
        assert_eq!(a, b);

        let hash = |k: &SpecializationKey| {
            let mut h = DefaultHasher::new();
            k.hash(&mut h);
            h.finish()
        };
        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn test_rejects_too_many_textures() {
        let err = SpecializationKey::builder("standard")
            .textures(4)
            .build(&limits())
            .unwrap_err();
        assert!(matches!(
            err,
            ShaderError::UnsupportedConfiguration { ref parameter, .. } if parameter == MAT_TEXTURES
        ));
    }

    #[test]
    fn test_rejects_invalid_skinning() {
        assert!(SpecializationKey::builder("standard")
            .skinning(5, 16)
            .build(&limits())
            .is_err());
        assert!(SpecializationKey::builder("standard")
            .skinning(2, 0)
            .build(&limits())
            .is_err());
    }

    #[test]
    fn test_rejects_too_many_lights() {
        assert!(SpecializationKey::builder("standard")
            .spot(17)
            .build(&limits())
            .is_err());
    }

    #[test]
    fn test_rejects_reserved_or_invalid_defines() {
        assert!(SpecializationKey::builder("standard")
            .define("DIR_LIGHTS", "3")
            .build(&limits())
            .is_err());
        assert!(SpecializationKey::builder("standard")
            .define("2FAST", "")
            .build(&limits())
            .is_err());
        assert!(SpecializationKey::builder("standard")
            .define("FOG", "1\n#define X")
            .build(&limits())
            .is_err());
    }

    #[test]
    fn test_display() {
        let key = SpecializationKey::builder("point")
            .textures(2)
            .build(&limits())
            .unwrap();
        assert_eq!(key.to_string(), "point[amb=0 dir=0 point=0 spot=0 tex=2]");
    }
}
