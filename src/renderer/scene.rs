//! Drawable objects and the loop that draws them under any program
//!
//! The scene does not know which pass is running. Each object sets
//! `u_model`, then material uniforms and texture maps only when the active
//! program declares them, so the same scene feeds the shadow passes, the
//! depth pre-pass and the main pass.

use glam::Mat4;

use super::backend::RenderBackend;
use super::material::Material;
use super::mesh::Mesh;
use super::shader::ShaderProgram;
use super::units::{BoundTexture, TextureUnits, DIFFUSE_TEXTURE_UNIT, NORMAL_TEXTURE_UNIT};
use crate::error::RenderResult;

pub const MODEL_UNIFORM: &str = "u_model";
pub const DIFFUSE_SAMPLER: &str = "s_textureDiffuse";
pub const NORMAL_SAMPLER: &str = "s_textureNormal";

/// One mesh instance
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub name: String,
    pub mesh: Mesh,
    /// Model-to-world transform
    pub transform: Mat4,
    pub material: Material,
}

impl SceneObject {
    #[must_use]
    pub fn new(name: impl Into<String>, mesh: Mesh, transform: Mat4, material: Material) -> Self {
        Self {
            name: name.into(),
            mesh,
            transform,
            material,
        }
    }
}

/// Textures used when a material leaves a map empty
#[derive(Debug, Clone, Copy)]
pub struct DefaultTextures {
    pub diffuse: BoundTexture,
    pub normal: BoundTexture,
}

/// Ordered list of drawable objects
#[derive(Debug, Clone, Default)]
pub struct Scene {
    objects: Vec<SceneObject>,
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an object; returns its index
    pub fn add(&mut self, object: SceneObject) -> usize {
        self.objects.push(object);
        self.objects.len() - 1
    }

    #[must_use]
    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut SceneObject> {
        self.objects.get_mut(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }

    /// Draw every object with `program`, which must already hold its
    /// per-pass uniforms and samplers. Returns the number of draws.
    pub fn render<B: RenderBackend + ?Sized>(
        &self,
        backend: &mut B,
        program: &mut ShaderProgram,
        units: &mut TextureUnits,
        defaults: &DefaultTextures,
    ) -> RenderResult<u32> {
        let textured = program.has_sampler(DIFFUSE_SAMPLER);
        let normal_mapped = program.has_sampler(NORMAL_SAMPLER);

        let mut draws = 0;
        for object in &self.objects {
            program.set_uniform(MODEL_UNIFORM, object.transform)?;
            object.material.apply(program)?;
            if textured {
                let diffuse = object.material.diffuse.unwrap_or(defaults.diffuse);
                program.bind_sampler(units, DIFFUSE_SAMPLER, DIFFUSE_TEXTURE_UNIT, diffuse)?;
            }
            if normal_mapped {
                let normal = object.material.normal.unwrap_or(defaults.normal);
                program.bind_sampler(units, NORMAL_SAMPLER, NORMAL_TEXTURE_UNIT, normal)?;
            }
            program.validate(units)?;
            program.draw(backend, units, object.mesh.handle)?;
            draws += 1;
        }
        Ok(draws)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::{Command, PassDesc, PassTarget, RecordingBackend, SamplerType, TextureKind, Viewport};
    use crate::renderer::mesh::MeshData;
    use crate::renderer::shader::{UniformType, UniformValue};

    fn defaults(backend: &mut RecordingBackend) -> DefaultTextures {
        DefaultTextures {
            diffuse: backend.fake_texture(TextureKind::Color2d),
            normal: backend.fake_texture(TextureKind::Color2d),
        }
    }

    #[test]
    fn test_scene_draws_under_any_program() {
        let mut backend = RecordingBackend::new(64, 64);
        let cube = MeshData::cube().upload(&mut backend, "cube").unwrap();
        let mut scene = Scene::new();
        let moved = Mat4::from_translation(glam::Vec3::X);
        scene.add(SceneObject::new("a", cube, Mat4::IDENTITY, Material::shiny()));
        scene.add(SceneObject::new("b", cube, moved, Material::dull()));

        let mut shadow = ShaderProgram::compile(&mut backend, "shadow", "").unwrap();
        shadow.register_uniform(UniformType::Mat4, MODEL_UNIFORM).unwrap();
        shadow.link(&mut backend).unwrap();

        let defaults = defaults(&mut backend);
        let mut units = TextureUnits::new();
        backend.begin_frame().unwrap();
        backend
            .begin_pass(&PassDesc::new("test", PassTarget::Screen, Viewport::full(64, 64)))
            .unwrap();
        let draws = scene.render(&mut backend, &mut shadow, &mut units, &defaults).unwrap();
        backend.end_pass().unwrap();
        backend.end_frame().unwrap();

        assert_eq!(draws, 2);
        assert_eq!(shadow.read_uniform(MODEL_UNIFORM), Some(UniformValue::Mat4(moved)));
        assert_eq!(units.bound_count(), 0);
    }

    #[test]
    fn test_lit_program_gets_default_maps() {
        let mut backend = RecordingBackend::new(64, 64);
        let quad = MeshData::plane(2.0, 1.0).upload(&mut backend, "plane").unwrap();
        let mut scene = Scene::new();
        scene.add(SceneObject::new("floor", quad, Mat4::IDENTITY, Material::dull()));

        let mut lit = ShaderProgram::compile(&mut backend, "lit", "").unwrap();
        lit.register_uniform(UniformType::Mat4, MODEL_UNIFORM).unwrap();
        lit.register_sampler(SamplerType::Texture2d, DIFFUSE_SAMPLER).unwrap();
        lit.register_sampler(SamplerType::Texture2d, NORMAL_SAMPLER).unwrap();
        lit.link(&mut backend).unwrap();

        let defaults = defaults(&mut backend);
        let mut units = TextureUnits::new();
        backend.begin_frame().unwrap();
        backend
            .begin_pass(&PassDesc::new("test", PassTarget::Screen, Viewport::full(64, 64)))
            .unwrap();
        scene.render(&mut backend, &mut lit, &mut units, &defaults).unwrap();
        backend.end_pass().unwrap();

        assert_eq!(units.get(DIFFUSE_TEXTURE_UNIT), Some(defaults.diffuse));
        assert_eq!(units.get(NORMAL_TEXTURE_UNIT), Some(defaults.normal));
        let drew = backend.commands().iter().any(|c| {
            matches!(c, Command::Draw { textures, .. } if textures.as_slice() == [defaults.diffuse.handle, defaults.normal.handle])
        });
        assert!(drew);
    }
}
