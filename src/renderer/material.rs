//! Surface materials

use super::shader::ShaderProgram;
use super::units::BoundTexture;
use crate::error::RenderResult;

pub const SPECULAR_INTENSITY_UNIFORM: &str = "u_material.specularIntensity";
pub const SHININESS_UNIFORM: &str = "u_material.shininess";

/// Specular response plus optional texture maps
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Strength of the specular highlight
    pub specular_intensity: f32,
    /// Specular exponent
    pub shininess: f32,
    /// Diffuse map; the engine's white texture is used when absent
    pub diffuse: Option<BoundTexture>,
    /// Tangent-space normal map; a flat normal is used when absent
    pub normal: Option<BoundTexture>,
}

impl Material {
    #[must_use]
    pub const fn new(specular_intensity: f32, shininess: f32) -> Self {
        Self {
            specular_intensity,
            shininess,
            diffuse: None,
            normal: None,
        }
    }

    #[must_use]
    pub const fn shiny() -> Self {
        Self::new(1.0, 32.0)
    }

    #[must_use]
    pub const fn dull() -> Self {
        Self::new(0.3, 4.0)
    }

    #[must_use]
    pub const fn with_diffuse(mut self, texture: BoundTexture) -> Self {
        self.diffuse = Some(texture);
        self
    }

    #[must_use]
    pub const fn with_normal(mut self, texture: BoundTexture) -> Self {
        self.normal = Some(texture);
        self
    }

    /// Write material uniforms the program registered; others are skipped
    pub fn apply(&self, program: &mut ShaderProgram) -> RenderResult<()> {
        if program.has_uniform(SPECULAR_INTENSITY_UNIFORM) {
            program.set_uniform(SPECULAR_INTENSITY_UNIFORM, self.specular_intensity)?;
        }
        if program.has_uniform(SHININESS_UNIFORM) {
            program.set_uniform(SHININESS_UNIFORM, self.shininess)?;
        }
        Ok(())
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::dull()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::RecordingBackend;
    use crate::renderer::shader::{UniformType, UniformValue};

    #[test]
    fn test_apply_only_touches_registered_uniforms() {
        let mut backend = RecordingBackend::new(8, 8);
        let mut depth_only = ShaderProgram::compile(&mut backend, "depth", "").unwrap();
        depth_only.register_uniform(UniformType::Mat4, "u_model").unwrap();
        depth_only.link(&mut backend).unwrap();
        Material::shiny().apply(&mut depth_only).unwrap();

        let mut lit = ShaderProgram::compile(&mut backend, "lit", "").unwrap();
        lit.register_uniform(UniformType::Float, SPECULAR_INTENSITY_UNIFORM).unwrap();
        lit.register_uniform(UniformType::Float, SHININESS_UNIFORM).unwrap();
        lit.link(&mut backend).unwrap();
        Material::shiny().apply(&mut lit).unwrap();
        assert_eq!(lit.read_uniform(SHININESS_UNIFORM), Some(UniformValue::Float(32.0)));
    }
}
