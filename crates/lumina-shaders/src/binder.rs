//! Uniform layout binder
//!
//! Stages per-draw material and light state into the flat arrays described
//! by [`crate::layout`], checks it against the key the program was compiled
//! for, and uploads it. Nothing is uploaded when a check fails.

use crate::backend::{ShaderBackend, UniformValue};
use crate::cache::CompiledProgram;
use crate::descriptor::MaterialModel;
use crate::key::{Feature, LightCounts, LightKind};
use crate::layout::{self, GlslType, UniformArray, UniformBlock};
use glam::{Vec2, Vec3, Vec4};
use lumina_core::{Result, ShaderError};
use std::collections::BTreeSet;
use tracing::trace;

/// Per-texture placement parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureSlot {
    pub offset: Vec2,
    pub repeat: Vec2,
    pub flip_y: bool,
    pub visible: bool,
}

impl Default for TextureSlot {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            repeat: Vec2::ONE,
            flip_y: true,
            visible: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhongMaterial {
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub emissive: Vec3,
    pub shininess: f32,
    pub opacity: f32,
    pub point_size: f32,
    pub point_rotation_z: f32,
    /// One entry per `MAT_TEXTURES`, bound to units `0..n`
    pub textures: Vec<TextureSlot>,
}

impl Default for PhongMaterial {
    fn default() -> Self {
        Self {
            ambient: Vec3::ONE,
            diffuse: Vec3::ONE,
            specular: Vec3::splat(0.5),
            emissive: Vec3::ZERO,
            shininess: 30.0,
            opacity: 1.0,
            point_size: 1.0,
            point_rotation_z: 0.0,
            textures: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalMaterial {
    pub base_color: Vec4,
    pub emissive: Vec3,
    pub metallic: f32,
    pub roughness: f32,
    pub occlusion_strength: f32,
    /// Bound texture maps; must equal the key's `HAS_*MAP` features
    pub maps: BTreeSet<Feature>,
}

impl Default for PhysicalMaterial {
    fn default() -> Self {
        Self {
            base_color: Vec4::ONE,
            emissive: Vec3::ZERO,
            metallic: 1.0,
            roughness: 1.0,
            occlusion_strength: 1.0,
            maps: BTreeSet::new(),
        }
    }
}

/// GUI panel geometry and colors, all in texture coordinates
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PanelState {
    /// (xmin, ymin, xmax, ymax)
    pub bounds: Vec4,
    /// (x, y, width, height)
    pub border: Vec4,
    pub padding: Vec4,
    pub content: Vec4,
    pub border_color: Vec4,
    pub padding_color: Vec4,
    pub content_color: Vec4,
    pub texture: Option<TextureSlot>,
}

/// Material state for one draw, matching the program's [`MaterialModel`]
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialState {
    None,
    Phong(PhongMaterial),
    Physical(PhysicalMaterial),
    Panel(PanelState),
}

impl MaterialState {
    pub fn model(&self) -> MaterialModel {
        match self {
            Self::None => MaterialModel::None,
            Self::Phong(_) => MaterialModel::Phong,
            Self::Physical(_) => MaterialModel::Physical,
            Self::Panel(_) => MaterialModel::Panel,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub color: Vec3,
    /// Direction toward the light, camera space
    pub direction: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub color: Vec3,
    pub position: Vec3,
    pub linear_decay: f32,
    pub quadratic_decay: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    pub color: Vec3,
    pub position: Vec3,
    pub direction: Vec3,
    pub angular_decay: f32,
    /// Degrees, clamped to [0, 90] by the shader
    pub cutoff_angle: f32,
    pub linear_decay: f32,
    pub quadratic_decay: f32,
}

/// Scene lights for one draw
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightState {
    pub ambient: Vec<Vec3>,
    pub directional: Vec<DirectionalLight>,
    pub point: Vec<PointLight>,
    pub spot: Vec<SpotLight>,
}

impl LightState {
    pub fn counts(&self) -> LightCounts {
        LightCounts::new(
            self.ambient.len(),
            self.directional.len(),
            self.point.len(),
            self.spot.len(),
        )
    }
}

/// Sampler uniform of a physical texture map
fn physical_sampler(feature: Feature) -> Option<&'static str> {
    match feature {
        Feature::BaseColorMap => Some("uBaseColorSampler"),
        Feature::MetalRoughnessMap => Some("uMetallicRoughnessSampler"),
        Feature::NormalMap => Some("uNormalSampler"),
        Feature::EmissiveMap => Some("uEmissiveSampler"),
        Feature::OcclusionMap => Some("uOcclusionSampler"),
        Feature::MorphTargetNormals => None,
    }
}

fn describe_maps(maps: &BTreeSet<Feature>) -> String {
    let names: Vec<&str> = maps.iter().map(|f| f.macro_name()).collect();
    format!("{{{}}}", names.join(", "))
}

/// Stages and uploads per-draw uniforms
#[derive(Debug, Default)]
pub struct UniformBinder {
    staged: Vec<UniformArray>,
    samplers: Vec<(&'static str, Vec<i32>)>,
    scalars: Vec<(&'static str, f32)>,
}

impl UniformBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Array staged by the last bind, by uniform name
    pub fn staged(&self, uniform: &str) -> Option<&UniformArray> {
        self.staged.iter().find(|a| a.block().uniform == uniform)
    }

    /// Sampler units assigned by the last bind
    pub fn sampler_units(&self, uniform: &str) -> Option<&[i32]> {
        self.samplers
            .iter()
            .find(|(name, _)| *name == uniform)
            .map(|(_, units)| units.as_slice())
    }

    /// Validate `material` and `lights` against `program` and upload them.
    pub fn bind<B: ShaderBackend>(
        &mut self,
        backend: &B,
        program: &CompiledProgram<B>,
        material: &MaterialState,
        lights: &LightState,
    ) -> Result<()> {
        // Stage into a fresh binder so a rejected bind leaves the last one visible.
        let mut next = Self::new();
        next.stage_lights(program.key().lights(), lights)?;
        next.stage_material(program, material)?;
        *self = next;

        backend.use_program(Some(program.handle()));
        for array in &self.staged {
            let block = array.block();
            let Some(location) = program.uniform(block.uniform) else {
                trace!("{} not active in {}, skipping", block.uniform, program.key());
                continue;
            };
            backend.upload(location, array_value(block, array.as_slice()));
        }
        for (name, units) in &self.samplers {
            match program.uniform(name) {
                Some(location) => backend.upload(location, UniformValue::Int(units)),
                None => trace!("{} not active in {}, skipping", name, program.key()),
            }
        }
        for (name, value) in &self.scalars {
            match program.uniform(name) {
                Some(location) => backend.upload(location, UniformValue::Float(std::slice::from_ref(value))),
                None => trace!("{} not active in {}, skipping", name, program.key()),
            }
        }
        Ok(())
    }

    fn stage_lights(&mut self, expected: LightCounts, lights: &LightState) -> Result<()> {
        let actual = lights.counts();
        for kind in LightKind::ALL {
            if actual.get(kind) != expected.get(kind) {
                return Err(ShaderError::layout_mismatch(
                    layout::light_block(kind).uniform,
                    format!("{} {} lights", expected.get(kind), kind),
                    format!("{} {} lights", actual.get(kind), kind),
                ));
            }
        }

        if !lights.ambient.is_empty() {
            let mut array = UniformArray::new(&layout::AMBIENT_LIGHTS, lights.ambient.len());
            for (i, color) in lights.ambient.iter().enumerate() {
                array.set_vector(i, &layout::AMBIENT_LIGHT_COLOR, &color.to_array());
            }
            self.staged.push(array);
        }

        if !lights.directional.is_empty() {
            let mut array = UniformArray::new(&layout::DIRECTIONAL_LIGHTS, lights.directional.len());
            for (i, light) in lights.directional.iter().enumerate() {
                array.set_vector(i, &layout::DIR_LIGHT_COLOR, &light.color.to_array());
                array.set_vector(i, &layout::DIR_LIGHT_POSITION, &light.direction.to_array());
            }
            self.staged.push(array);
        }

        if !lights.point.is_empty() {
            let mut array = UniformArray::new(&layout::POINT_LIGHTS, lights.point.len());
            for (i, light) in lights.point.iter().enumerate() {
                array.set_vector(i, &layout::POINT_LIGHT_COLOR, &light.color.to_array());
                array.set_vector(i, &layout::POINT_LIGHT_POSITION, &light.position.to_array());
                array.set_scalar(i, &layout::POINT_LIGHT_LINEAR_DECAY, light.linear_decay);
                array.set_scalar(i, &layout::POINT_LIGHT_QUADRATIC_DECAY, light.quadratic_decay);
            }
            self.staged.push(array);
        }

        if !lights.spot.is_empty() {
            let mut array = UniformArray::new(&layout::SPOT_LIGHTS, lights.spot.len());
            for (i, light) in lights.spot.iter().enumerate() {
                array.set_vector(i, &layout::SPOT_LIGHT_COLOR, &light.color.to_array());
                array.set_vector(i, &layout::SPOT_LIGHT_POSITION, &light.position.to_array());
                array.set_vector(i, &layout::SPOT_LIGHT_DIRECTION, &light.direction.to_array());
                array.set_scalar(i, &layout::SPOT_LIGHT_ANGULAR_DECAY, light.angular_decay);
                array.set_scalar(i, &layout::SPOT_LIGHT_CUTOFF_ANGLE, light.cutoff_angle);
                array.set_scalar(i, &layout::SPOT_LIGHT_LINEAR_DECAY, light.linear_decay);
                array.set_scalar(i, &layout::SPOT_LIGHT_QUADRATIC_DECAY, light.quadratic_decay);
            }
            self.staged.push(array);
        }
        Ok(())
    }

    fn stage_material<B: ShaderBackend>(
        &mut self,
        program: &CompiledProgram<B>,
        material: &MaterialState,
    ) -> Result<()> {
        if material.model() != program.material() {
            return Err(ShaderError::layout_mismatch(
                "material",
                program.material(),
                material.model(),
            ));
        }

        match material {
            MaterialState::None => {}
            MaterialState::Phong(phong) => self.stage_phong(program.key().textures(), phong)?,
            MaterialState::Physical(physical) => {
                let expected: BTreeSet<Feature> = program
                    .key()
                    .features()
                    .iter()
                    .copied()
                    .filter(|f| physical_sampler(*f).is_some())
                    .collect();
                self.stage_physical(&expected, physical)?;
            }
            MaterialState::Panel(panel) => self.stage_panel(panel),
        }
        Ok(())
    }

    fn stage_phong(&mut self, textures: usize, phong: &PhongMaterial) -> Result<()> {
        if phong.textures.len() != textures {
            return Err(ShaderError::layout_mismatch(
                layout::MATERIAL_TEXINFO.uniform,
                format!("{} textures", textures),
                format!("{} textures", phong.textures.len()),
            ));
        }

        let mut material = UniformArray::new(&layout::PHONG_MATERIAL, 1);
        material.set_vector(0, &layout::MAT_AMBIENT_COLOR, &phong.ambient.to_array());
        material.set_vector(0, &layout::MAT_DIFFUSE_COLOR, &phong.diffuse.to_array());
        material.set_vector(0, &layout::MAT_SPECULAR_COLOR, &phong.specular.to_array());
        material.set_vector(0, &layout::MAT_EMISSIVE_COLOR, &phong.emissive.to_array());
        material.set_scalar(0, &layout::MAT_SHININESS, phong.shininess);
        material.set_scalar(0, &layout::MAT_OPACITY, phong.opacity);
        material.set_scalar(0, &layout::MAT_POINT_SIZE, phong.point_size);
        material.set_scalar(0, &layout::MAT_POINT_ROTATION_Z, phong.point_rotation_z);
        self.staged.push(material);

        if !phong.textures.is_empty() {
            let mut texinfo = UniformArray::new(&layout::MATERIAL_TEXINFO, phong.textures.len());
            for (i, slot) in phong.textures.iter().enumerate() {
                write_texinfo(&mut texinfo, i, slot);
            }
            self.staged.push(texinfo);
            let units = (0..phong.textures.len() as i32).collect();
            self.samplers.push((layout::MATERIAL_SAMPLERS, units));
        }
        Ok(())
    }

    fn stage_physical(&mut self, expected: &BTreeSet<Feature>, physical: &PhysicalMaterial) -> Result<()> {
        let supplied: BTreeSet<Feature> = physical
            .maps
            .iter()
            .copied()
            .filter(|f| physical_sampler(*f).is_some())
            .collect();
        if supplied != *expected || supplied.len() != physical.maps.len() {
            return Err(ShaderError::layout_mismatch(
                "texture maps",
                describe_maps(expected),
                describe_maps(&physical.maps),
            ));
        }

        let mut material = UniformArray::new(&layout::PHYSICAL_MATERIAL, 1);
        material.set_vector(0, &layout::PBR_BASE_COLOR, &physical.base_color.to_array());
        material.set_vector(0, &layout::PBR_EMISSIVE_COLOR, &physical.emissive.extend(1.0).to_array());
        material.set_scalar(0, &layout::PBR_METALLIC_FACTOR, physical.metallic);
        material.set_scalar(0, &layout::PBR_ROUGHNESS_FACTOR, physical.roughness);
        self.staged.push(material);

        // Units follow feature order
        for (unit, feature) in supplied.iter().enumerate() {
            if let Some(sampler) = physical_sampler(*feature) {
                self.samplers.push((sampler, vec![unit as i32]));
            }
        }
        if supplied.contains(&Feature::OcclusionMap) {
            self.scalars
                .push((layout::PBR_OCCLUSION_STRENGTH, physical.occlusion_strength));
        }
        Ok(())
    }

    fn stage_panel(&mut self, panel: &PanelState) {
        let mut array = UniformArray::new(&layout::PANEL, 1);
        array.set_vector(0, &layout::PANEL_BOUNDS, &panel.bounds.to_array());
        array.set_vector(0, &layout::PANEL_BORDER, &panel.border.to_array());
        array.set_vector(0, &layout::PANEL_PADDING, &panel.padding.to_array());
        array.set_vector(0, &layout::PANEL_CONTENT, &panel.content.to_array());
        array.set_vector(0, &layout::PANEL_BORDER_COLOR, &panel.border_color.to_array());
        array.set_vector(0, &layout::PANEL_PADDING_COLOR, &panel.padding_color.to_array());
        array.set_vector(0, &layout::PANEL_CONTENT_COLOR, &panel.content_color.to_array());
        array.set_flag(0, &layout::PANEL_TEXTURE_VALID, panel.texture.is_some());
        self.staged.push(array);

        let mut texinfo = UniformArray::new(&layout::PANEL_TEXINFO, 1);
        write_texinfo(&mut texinfo, 0, &panel.texture.unwrap_or_default());
        self.staged.push(texinfo);
        if panel.texture.is_some() {
            self.samplers.push((layout::MATERIAL_SAMPLERS, vec![0]));
        }
    }
}

fn write_texinfo(array: &mut UniformArray, i: usize, slot: &TextureSlot) {
    array.set_vector(i, &layout::TEX_OFFSET, &slot.offset.to_array());
    array.set_vector(i, &layout::TEX_REPEAT, &slot.repeat.to_array());
    array.set_flag(i, &layout::TEX_FLIP_Y, slot.flip_y);
    array.set_flag(i, &layout::TEX_VISIBLE, slot.visible);
}

fn array_value<'a>(block: &UniformBlock, data: &'a [f32]) -> UniformValue<'a> {
    match block.glsl_type {
        GlslType::Vec2 => UniformValue::Vec2(data),
        GlslType::Vec3 => UniformValue::Vec3(data),
        GlslType::Vec4 => UniformValue::Vec4(data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_state_counts() {
        let lights = LightState {
            ambient: vec![Vec3::ONE],
            directional: vec![
                DirectionalLight {
                    color: Vec3::ONE,
                    direction: Vec3::Z,
                };
                2
            ],
            ..Default::default()
        };
        assert_eq!(lights.counts(), LightCounts::new(1, 2, 0, 0));
    }

    #[test]
    fn test_stage_spot_light_slots() {
        let mut binder = UniformBinder::new();
        let lights = LightState {
            spot: vec![SpotLight {
                color: Vec3::new(1.0, 0.5, 0.25),
                position: Vec3::new(0.0, 5.0, 0.0),
                direction: Vec3::NEG_Y,
                angular_decay: 15.0,
                cutoff_angle: 45.0,
                linear_decay: 0.1,
                quadratic_decay: 0.01,
            }],
            ..Default::default()
        };
        binder
            .stage_lights(LightCounts::new(0, 0, 0, 1), &lights)
            .unwrap();

        let array = binder.staged("SpotLight").unwrap();
        assert_eq!(array.as_slice().len(), 15);
        assert_eq!(array.vector(0, &layout::SPOT_LIGHT_DIRECTION), &[0.0, -1.0, 0.0]);
        // slot 3 = (angular, cutoff, linear), slot 4.x = quadratic
        assert_eq!(&array.as_slice()[9..13], &[15.0, 45.0, 0.1, 0.01]);
        assert!(binder.staged("PointLight").is_none());
    }

    #[test]
    fn test_light_count_mismatch() {
        let mut binder = UniformBinder::new();
        let err = binder
            .stage_lights(LightCounts::new(0, 2, 0, 0), &LightState::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ShaderError::UniformLayoutMismatch { block, .. } if block == "DirLight"
        ));
    }

    #[test]
    fn test_panel_without_texture() {
        let mut binder = UniformBinder::new();
        binder.stage_panel(&PanelState {
            bounds: Vec4::new(0.0, 0.0, 1.0, 1.0),
            content_color: Vec4::new(0.2, 0.2, 0.2, 1.0),
            ..Default::default()
        });

        let panel = binder.staged("Panel").unwrap();
        assert_eq!(panel.scalar(0, &layout::PANEL_TEXTURE_VALID), 0.0);
        assert_eq!(panel.vector(0, &layout::PANEL_CONTENT_COLOR), &[0.2, 0.2, 0.2, 1.0]);
        assert!(binder.sampler_units("MatTexture").is_none());
    }
}
