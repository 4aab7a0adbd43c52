//! Scene-level shader programs and their interface registration
//!
//! Each `create_*` function compiles one WGSL module and registers every
//! uniform and sampler it declares, in declaration order, then links it.

use super::backend::{RenderBackend, SamplerType};
use super::shader::{ShaderProgram, UniformType};
use super::units::{MAX_POINT_LIGHTS, MAX_SPOT_LIGHTS, OMNI_SHADOW_SLOTS};
use crate::error::RenderResult;

const MAIN_SHADER: &str = include_str!("shaders/main.wgsl");
const DIRECTIONAL_SHADOW_SHADER: &str = include_str!("shaders/directional_shadow.wgsl");
const OMNI_SHADOW_SHADER: &str = include_str!("shaders/omni_shadow.wgsl");
const DEPTH_SHADER: &str = include_str!("shaders/depth.wgsl");
const SCREEN_SHADER: &str = include_str!("shaders/screen.wgsl");

/// Sampler name of omni shadow slot `slot` in the main program
#[must_use]
pub fn omni_shadow_sampler(slot: usize) -> String {
    format!("u_omniShadowMaps[{slot}].shadowMap")
}

/// Far-plane uniform of omni shadow slot `slot` in the main program
#[must_use]
pub fn omni_far_plane_uniform(slot: usize) -> String {
    format!("u_omniShadowMaps[{slot}].farPlane")
}

/// Depth-comparison bias of omni shadow slot `slot` in the main program
#[must_use]
pub fn omni_bias_uniform(slot: usize) -> String {
    format!("u_omniShadowMaps[{slot}].bias")
}

fn register_light_base(program: &mut ShaderProgram, prefix: &str) -> RenderResult<()> {
    program.register_uniform(UniformType::Vec3, &format!("{prefix}.color"))?;
    program.register_uniform(UniformType::Float, &format!("{prefix}.ambientIntensity"))?;
    program.register_uniform(UniformType::Float, &format!("{prefix}.diffuseIntensity"))?;
    Ok(())
}

fn register_point_fields(program: &mut ShaderProgram, prefix: &str) -> RenderResult<()> {
    register_light_base(program, &format!("{prefix}.base"))?;
    program.register_uniform(UniformType::Vec3, &format!("{prefix}.position"))?;
    program.register_uniform(UniformType::Float, &format!("{prefix}.constant"))?;
    program.register_uniform(UniformType::Float, &format!("{prefix}.linear"))?;
    program.register_uniform(UniformType::Float, &format!("{prefix}.exponent"))?;
    Ok(())
}

/// Forward-lit scene program
pub fn create_main<B: RenderBackend + ?Sized>(backend: &mut B) -> RenderResult<ShaderProgram> {
    let mut p = ShaderProgram::compile(backend, "main", MAIN_SHADER)?;
    p.register_uniform(UniformType::Mat4, "u_projection")?;
    p.register_uniform(UniformType::Mat4, "u_model")?;
    p.register_uniform(UniformType::Mat4, "u_view")?;
    p.register_uniform(UniformType::Vec3, "u_cameraPosition")?;
    p.register_uniform(UniformType::Mat4, "u_directionalLightTransform")?;
    register_light_base(&mut p, "u_directionalLight.base")?;
    p.register_uniform(UniformType::Vec3, "u_directionalLight.direction")?;
    p.register_uniform(UniformType::Float, "u_directionalLight.shadowBias")?;

    p.register_uniform(UniformType::Int, "u_pointLightCount")?;
    for i in 0..MAX_POINT_LIGHTS {
        register_point_fields(&mut p, &format!("u_pointLights[{i}]"))?;
    }

    p.register_uniform(UniformType::Int, "u_spotLightCount")?;
    for i in 0..MAX_SPOT_LIGHTS {
        let prefix = format!("u_spotLights[{i}]");
        register_point_fields(&mut p, &format!("{prefix}.base"))?;
        p.register_uniform(UniformType::Vec3, &format!("{prefix}.direction"))?;
        p.register_uniform(UniformType::Float, &format!("{prefix}.edge"))?;
    }

    for slot in 0..OMNI_SHADOW_SLOTS {
        p.register_sampler(SamplerType::DepthCube, &omni_shadow_sampler(slot))?;
        p.register_uniform(UniformType::Float, &omni_far_plane_uniform(slot))?;
        p.register_uniform(UniformType::Float, &omni_bias_uniform(slot))?;
    }
    p.register_sampler(SamplerType::Depth2d, "s_directionalShadowMap")?;
    p.register_sampler(SamplerType::Texture2d, "s_textureDiffuse")?;
    p.register_sampler(SamplerType::Texture2d, "s_textureNormal")?;
    p.register_uniform(UniformType::Float, "u_material.specularIntensity")?;
    p.register_uniform(UniformType::Float, "u_material.shininess")?;
    p.link(backend)?;
    Ok(p)
}

/// Depth-only program for the directional shadow map
pub fn create_directional_shadow<B: RenderBackend + ?Sized>(backend: &mut B) -> RenderResult<ShaderProgram> {
    let mut p = ShaderProgram::compile(backend, "directional_shadow", DIRECTIONAL_SHADOW_SHADER)?;
    p.register_uniform(UniformType::Mat4, "u_model")?;
    p.register_uniform(UniformType::Mat4, "u_directionalLightTransform")?;
    p.link(backend)?;
    Ok(p)
}

/// Distance-to-light program for omni shadow cube faces
pub fn create_omni_shadow<B: RenderBackend + ?Sized>(backend: &mut B) -> RenderResult<ShaderProgram> {
    let mut p = ShaderProgram::compile(backend, "omni_shadow", OMNI_SHADOW_SHADER)?;
    p.register_uniform(UniformType::Mat4, "u_model")?;
    p.register_uniform(UniformType::Vec3, "u_lightPos")?;
    p.register_uniform(UniformType::Float, "u_farPlane")?;
    p.register_uniform_array(UniformType::Mat4, "u_lightMatrices", 6, "")?;
    p.register_uniform(UniformType::Int, "u_face")?;
    p.link(backend)?;
    Ok(p)
}

/// Depth pre-pass program writing depth as color
pub fn create_depth<B: RenderBackend + ?Sized>(backend: &mut B) -> RenderResult<ShaderProgram> {
    let mut p = ShaderProgram::compile(backend, "depth", DEPTH_SHADER)?;
    p.register_uniform(UniformType::Mat4, "u_model")?;
    p.register_uniform(UniformType::Mat4, "u_view")?;
    p.register_uniform(UniformType::Mat4, "u_projection")?;
    p.register_uniform(UniformType::Float, "u_nearPlane")?;
    p.register_uniform(UniformType::Float, "u_farPlane")?;
    p.link(backend)?;
    Ok(p)
}

/// Final blit to the surface
pub fn create_screen<B: RenderBackend + ?Sized>(backend: &mut B) -> RenderResult<ShaderProgram> {
    let mut p = ShaderProgram::compile(backend, "screen", SCREEN_SHADER)?;
    p.register_sampler(SamplerType::Texture2d, "s_screenTexture")?;
    p.link(backend)?;
    Ok(p)
}

/// Programs every frame uses regardless of scene content
#[derive(Debug)]
pub struct Programs {
    pub main: ShaderProgram,
    pub directional_shadow: ShaderProgram,
    pub omni_shadow: ShaderProgram,
    pub depth: ShaderProgram,
    pub screen: ShaderProgram,
}

impl Programs {
    pub fn new<B: RenderBackend + ?Sized>(backend: &mut B) -> RenderResult<Self> {
        Ok(Self {
            main: create_main(backend)?,
            directional_shadow: create_directional_shadow(backend)?,
            omni_shadow: create_omni_shadow(backend)?,
            depth: create_depth(backend)?,
            screen: create_screen(backend)?,
        })
    }

    pub fn destroy<B: RenderBackend + ?Sized>(self, backend: &mut B) -> RenderResult<()> {
        self.main.destroy(backend)?;
        self.directional_shadow.destroy(backend)?;
        self.omni_shadow.destroy(backend)?;
        self.depth.destroy(backend)?;
        self.screen.destroy(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::RecordingBackend;

    fn offset(p: &ShaderProgram, name: &str) -> u32 {
        p.uniform_location(name).map(|l| l.offset).unwrap_or(u32::MAX)
    }

    #[test]
    fn test_main_layout_matches_wgsl_struct() {
        let mut backend = RecordingBackend::new(8, 8);
        let p = create_main(&mut backend).unwrap();

        assert_eq!(offset(&p, "u_cameraPosition"), 192);
        assert_eq!(offset(&p, "u_directionalLightTransform"), 208);
        assert_eq!(offset(&p, "u_directionalLight.base.color"), 272);
        assert_eq!(offset(&p, "u_directionalLight.direction"), 304);
        assert_eq!(offset(&p, "u_directionalLight.shadowBias"), 316);
        assert_eq!(offset(&p, "u_pointLightCount"), 320);
        assert_eq!(offset(&p, "u_pointLights[0].base.color"), 336);
        assert_eq!(offset(&p, "u_pointLights[1].base.color"), 400);
        assert_eq!(offset(&p, "u_pointLights[0].exponent"), 336 + 52);
        assert_eq!(offset(&p, "u_spotLightCount"), 528);
        assert_eq!(offset(&p, "u_spotLights[0].base.base.color"), 544);
        assert_eq!(offset(&p, "u_spotLights[0].base.position"), 576);
        assert_eq!(offset(&p, "u_spotLights[0].direction"), 608);
        assert_eq!(offset(&p, "u_spotLights[0].edge"), 620);
        assert_eq!(offset(&p, "u_spotLights[1].base.base.color"), 624);
        assert_eq!(offset(&p, &omni_far_plane_uniform(0)), 784);
        assert_eq!(offset(&p, &omni_bias_uniform(0)), 788);
        assert_eq!(offset(&p, &omni_far_plane_uniform(5)), 864);
        assert_eq!(offset(&p, "u_material.specularIntensity"), 880);
        assert_eq!(p.uniform_block_size(), 896);
        assert_eq!(p.layout().samplers.len(), OMNI_SHADOW_SLOTS + 3);
    }

    #[test]
    fn test_shadow_layouts() {
        let mut backend = RecordingBackend::new(8, 8);
        let omni = create_omni_shadow(&mut backend).unwrap();
        assert_eq!(offset(&omni, "u_farPlane"), 76);
        assert_eq!(offset(&omni, "u_lightMatrices[0]"), 80);
        assert_eq!(offset(&omni, "u_lightMatrices[5]"), 400);
        assert_eq!(offset(&omni, "u_face"), 464);
        assert_eq!(omni.uniform_block_size(), 480);

        let depth = create_depth(&mut backend).unwrap();
        assert_eq!(offset(&depth, "u_farPlane"), 196);
        assert_eq!(depth.uniform_block_size(), 208);
    }

    #[test]
    fn test_all_programs_link() {
        let mut backend = RecordingBackend::new(8, 8);
        let programs = Programs::new(&mut backend).unwrap();
        assert!(programs.screen.is_linked());
        assert_eq!(programs.screen.uniform_block_size(), 16);
        programs.destroy(&mut backend).unwrap();
        assert_eq!(backend.stats().live_programs, 0);
    }
}
