//! Program descriptors

use lumina_core::ShaderStage;
use std::fmt;

/// Which per-draw material layout a program reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialModel {
    /// No material uniforms (vertex colors only)
    None,
    /// `Material[6]` vec3 plus `MatTexture[]` / `MatTexinfo[]`
    Phong,
    /// `Material[3]` vec4 plus named `u*Sampler` maps
    Physical,
    /// `Panel[8]` vec4 plus a single texture
    Panel,
}

impl fmt::Display for MaterialModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Phong => "phong",
            Self::Physical => "physical",
            Self::Panel => "panel",
        };
        write!(f, "{}", name)
    }
}

/// A base program name and the fragments making up its stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramDescriptor {
    pub name: String,
    pub vertex: String,
    pub fragment: String,
    pub geometry: Option<String>,
    pub material: MaterialModel,
}

impl ProgramDescriptor {
    /// Descriptor named `name` using the `<name>_vertex` / `<name>_fragment` convention
    pub fn conventional(name: impl Into<String>, material: MaterialModel) -> Self {
        let name = name.into();
        Self {
            vertex: format!("{}_vertex", name),
            fragment: format!("{}_fragment", name),
            geometry: None,
            material,
            name,
        }
    }

    pub fn new(
        name: impl Into<String>,
        vertex: impl Into<String>,
        fragment: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            vertex: vertex.into(),
            fragment: fragment.into(),
            geometry: None,
            material: MaterialModel::None,
        }
    }

    pub fn with_geometry(mut self, geometry: impl Into<String>) -> Self {
        self.geometry = Some(geometry.into());
        self
    }

    pub fn with_material(mut self, material: MaterialModel) -> Self {
        self.material = material;
        self
    }

    /// Stage fragments in link order
    pub fn stages(&self) -> Vec<(ShaderStage, &str)> {
        let mut stages = vec![(ShaderStage::Vertex, self.vertex.as_str())];
        if let Some(geometry) = &self.geometry {
            stages.push((ShaderStage::Geometry, geometry.as_str()));
        }
        stages.push((ShaderStage::Fragment, self.fragment.as_str()));
        stages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conventional_names() {
        let desc = ProgramDescriptor::conventional("standard", MaterialModel::Phong);
        assert_eq!(desc.vertex, "standard_vertex");
        assert_eq!(desc.fragment, "standard_fragment");
        assert_eq!(desc.material, MaterialModel::Phong);
    }

    #[test]
    fn test_stage_order_with_geometry() {
        let desc = ProgramDescriptor::new("outline", "outline_vs", "outline_fs").with_geometry("outline_gs");
        let stages: Vec<ShaderStage> = desc.stages().into_iter().map(|(s, _)| s).collect();
        assert_eq!(
            stages,
            vec![ShaderStage::Vertex, ShaderStage::Geometry, ShaderStage::Fragment]
        );
    }
}
