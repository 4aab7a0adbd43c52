//! Frame scheduler
//!
//! [`RenderEngine`] owns every GPU resource the renderer creates and runs the
//! passes of a frame in a fixed order:
//!
//! 1. depth pre-pass, when the depth-visualization effect will run
//! 2. directional shadow
//! 3. six omni shadow faces per active point light, then per spot light
//! 4. main pass: skybox, terrain, then the lit scene
//! 5. post-processing chain
//! 6. screen blit

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::backend::RenderBackend;
use super::camera::Camera;
use super::lights::LightSet;
use super::mesh::{Mesh, MeshData};
use super::passes::{self, PassScope};
use super::postprocess::{PostFrame, PostProcessChain, PostProcessEffect, PostProcessSettings, SCREEN_SAMPLER};
use super::programs::{omni_bias_uniform, omni_far_plane_uniform, omni_shadow_sampler, Programs};
use super::scene::{DefaultTextures, Scene};
use super::shadow::{ShadowConfig, ShadowTargets};
use super::skybox::{SkySource, Skybox};
use super::target::{BufferId, RenderTargets};
use super::terrain::{Terrain, TerrainSettings};
use super::texture::Texture;
use super::units::{
    omni_shadow_unit, TextureUnits, DIRECTIONAL_SHADOW_TEXTURE_UNIT, OMNI_SHADOW_SLOTS, SCREEN_TEXTURE_UNIT,
};
use crate::error::RenderResult;

const DIRECTIONAL_SHADOW_SAMPLER: &str = "s_directionalShadowMap";

/// Far plane written for omni slots no light occupies
const UNUSED_OMNI_FAR_PLANE: f32 = 1.0;

/// Settings the host may change between frames
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    pub post: PostProcessSettings,
    pub show_skybox: bool,
    /// Draw the main pass as lines where the adapter supports it
    pub wireframe: bool,
    /// Overrides the terrain's base patch resolution when set
    pub terrain_tessellation: Option<u32>,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            post: PostProcessSettings::default(),
            show_skybox: true,
            wireframe: false,
            terrain_tessellation: None,
        }
    }
}

/// Resources fixed at engine creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Allocate the depth-visualization target
    pub depth_visualization: bool,
    /// Initial directional shadow map size; lights built with
    /// [`RenderOptions::directional_shadow`] keep it
    pub directional_shadow_resolution: u32,
    /// Cube face size for lights built with [`RenderOptions::omni_shadow`]
    pub omni_shadow_resolution: u32,
    /// Logo overlay image; a generated one is used when absent
    pub logo_path: Option<PathBuf>,
    pub sky: Option<SkySource>,
    pub terrain: Option<TerrainSettings>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            depth_visualization: true,
            directional_shadow_resolution: ShadowConfig::directional().resolution,
            omni_shadow_resolution: ShadowConfig::omni().resolution,
            logo_path: None,
            sky: Some(SkySource::default()),
            terrain: Some(TerrainSettings::default()),
        }
    }
}

impl RenderOptions {
    /// No depth visualization, sky or terrain
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            depth_visualization: false,
            sky: None,
            terrain: None,
            ..Self::default()
        }
    }

    /// Directional shadow camera at the configured resolution
    #[must_use]
    pub fn directional_shadow(&self) -> ShadowConfig {
        ShadowConfig::directional().with_resolution(self.directional_shadow_resolution)
    }

    /// Omni shadow camera at the configured resolution
    #[must_use]
    pub fn omni_shadow(&self) -> ShadowConfig {
        ShadowConfig::omni().with_resolution(self.omni_shadow_resolution)
    }
}

/// Everything one frame reads
#[derive(Debug, Clone, Copy)]
pub struct FrameInput<'a> {
    pub scene: &'a Scene,
    pub camera: &'a Camera,
    pub lights: &'a LightSet,
    pub settings: &'a RendererSettings,
    /// Current drawable size in pixels
    pub framebuffer_size: (u32, u32),
}

/// What a frame did
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// The surface was unavailable or zero-sized and nothing was drawn
    pub skipped: bool,
    /// The framebuffer-sized targets were recreated
    pub resized: bool,
    pub passes: u32,
    pub omni_lights: u32,
    /// Omni cube-face passes
    pub omni_passes: u32,
    pub effects: u32,
    pub final_source: BufferId,
    pub draw_calls: u32,
}

impl FrameReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            resized: false,
            passes: 0,
            omni_lights: 0,
            omni_passes: 0,
            effects: 0,
            final_source: BufferId::Main,
            draw_calls: 0,
        }
    }

    /// One-line summary for the periodic log
    #[must_use]
    pub fn summary(&self) -> String {
        if self.skipped {
            return "frame skipped".to_string();
        }
        format!(
            "{} passes ({} omni faces for {} lights), {} effects, final {}, {} draws",
            self.passes,
            self.omni_passes,
            self.omni_lights,
            self.effects,
            self.final_source.name(),
            self.draw_calls
        )
    }
}

/// Multi-pass renderer over a [`RenderBackend`]
#[derive(Debug)]
pub struct RenderEngine<B: RenderBackend> {
    backend: B,
    programs: Programs,
    targets: RenderTargets,
    shadows: ShadowTargets,
    units: TextureUnits,
    post: PostProcessChain,
    skybox: Option<Skybox>,
    terrain: Option<Terrain>,
    quad: Mesh,
    white: Texture,
    flat_normal: Texture,
    defaults: DefaultTextures,
    warned_wireframe: bool,
    frame_index: u64,
}

impl<B: RenderBackend> RenderEngine<B> {
    /// Compile every program and allocate targets at the backend's surface size
    pub fn new(mut backend: B, options: &RenderOptions) -> RenderResult<Self> {
        let programs = Programs::new(&mut backend)?;

        let (width, height) = backend.surface_size();
        let mut targets = RenderTargets::new(options.depth_visualization);
        targets.create_render_buffers(&mut backend, width, height)?;

        let shadows = ShadowTargets::new(&mut backend, options.directional_shadow_resolution)?;
        let post = PostProcessChain::new(&mut backend, options.logo_path.as_deref())?;
        let skybox = options
            .sky
            .as_ref()
            .map(|source| Skybox::new(&mut backend, source))
            .transpose()?;
        let terrain = options
            .terrain
            .clone()
            .map(|settings| Terrain::new(&mut backend, settings))
            .transpose()?;

        let quad = MeshData::fullscreen_quad().upload(&mut backend, "fullscreen_quad")?;
        let white = Texture::solid(&mut backend, [255, 255, 255, 255], "white")?;
        let flat_normal = Texture::flat_normal(&mut backend)?;
        let defaults = DefaultTextures {
            diffuse: white.bound(),
            normal: flat_normal.bound(),
        };

        log::info!(
            "Render engine ready at {}x{} (wireframe {})",
            width,
            height,
            if backend.supports_wireframe() { "supported" } else { "unsupported" }
        );

        Ok(Self {
            backend,
            programs,
            targets,
            shadows,
            units: TextureUnits::new(),
            post,
            skybox,
            terrain,
            quad,
            white,
            flat_normal,
            defaults,
            warned_wireframe: false,
            frame_index: 0,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn targets(&self) -> &RenderTargets {
        &self.targets
    }

    pub fn shadows(&self) -> &ShadowTargets {
        &self.shadows
    }

    pub fn units(&self) -> &TextureUnits {
        &self.units
    }

    /// Frames rendered so far, skipped ones excluded
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Change the terrain's base patch resolution
    fn set_terrain_tessellation(&mut self, factor: u32) -> RenderResult<()> {
        match self.terrain.as_mut() {
            Some(terrain) => terrain.set_tessellation_factor(&mut self.backend, factor),
            None => Ok(()),
        }
    }

    /// Reconfigure the surface; offscreen targets follow on the next frame
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.backend.resize_surface(width, height);
    }

    fn wireframe_enabled(&mut self, requested: bool) -> bool {
        if !requested {
            return false;
        }
        if self.backend.supports_wireframe() {
            return true;
        }
        if !self.warned_wireframe {
            log::warn!("Wireframe requested but the adapter has no line polygon mode; drawing filled");
            self.warned_wireframe = true;
        }
        false
    }

    /// Render one frame
    pub fn render_frame(&mut self, input: &FrameInput<'_>) -> RenderResult<FrameReport> {
        let (width, height) = input.framebuffer_size;
        if width == 0 || height == 0 {
            return Ok(FrameReport::skipped());
        }
        if self.backend.surface_size() != (width, height) {
            self.backend.resize_surface(width, height);
        }
        let resized = self.targets.ensure_size(&mut self.backend, width, height)?;
        self.shadows.sync(&mut self.backend, input.lights)?;
        if let Some(factor) = input.settings.terrain_tessellation {
            self.set_terrain_tessellation(factor)?;
        }
        self.units.clear();

        if !self.backend.begin_frame()? {
            log::debug!("Surface unavailable; skipping frame");
            return Ok(FrameReport::skipped());
        }

        let mut report = FrameReport {
            resized,
            ..FrameReport::skipped()
        };
        report.skipped = false;

        let settings = input.settings;
        if self.targets.depth_vis().is_some() && settings.post.will_run(PostProcessEffect::DepthVisualize) {
            report.draw_calls += self.depth_prepass(input)?;
            report.passes += 1;
        }

        report.draw_calls += self.directional_shadow_pass(input)?;
        report.passes += 1;

        let (omni_passes, omni_draws) = self.omni_shadow_passes(input)?;
        report.omni_lights = input.lights.omni_count() as u32;
        report.omni_passes = omni_passes;
        report.passes += omni_passes;
        report.draw_calls += omni_draws;

        let wireframe = self.wireframe_enabled(settings.wireframe);
        report.draw_calls += self.main_pass(input, wireframe)?;
        report.passes += 1;

        let frame = PostFrame {
            camera_near: input.camera.near,
            camera_far: input.camera.far,
        };
        report.effects = self.post.run(
            &mut self.backend,
            &mut self.units,
            &self.targets,
            &self.quad,
            &settings.post,
            frame,
        )?;
        report.passes += report.effects;
        report.draw_calls += report.effects;

        report.final_source = self.post.ping_pong().final_source();
        self.screen_pass(report.final_source, width, height)?;
        report.passes += 1;
        report.draw_calls += 1;

        self.backend.end_frame()?;
        self.frame_index += 1;
        log::trace!("Frame {}: {}", self.frame_index, report.summary());
        Ok(report)
    }

    fn depth_prepass(&mut self, input: &FrameInput<'_>) -> RenderResult<u32> {
        let Some(target) = self.targets.depth_vis() else {
            return Ok(0);
        };
        let desc = passes::depth_prepass(target);
        let window = &input.settings.post.depth_visualize;

        let program = &mut self.programs.depth;
        program.set_uniform("u_view", input.camera.view_matrix())?;
        program.set_uniform("u_projection", input.camera.projection_matrix())?;
        program.set_uniform("u_nearPlane", window.near)?;
        program.set_uniform("u_farPlane", window.far)?;

        let mut scope = PassScope::begin(&mut self.backend, &desc)?;
        let draws = input
            .scene
            .render(scope.backend(), program, &mut self.units, &self.defaults)?;
        scope.finish()?;
        Ok(draws)
    }

    fn directional_shadow_pass(&mut self, input: &FrameInput<'_>) -> RenderResult<u32> {
        let desc = passes::directional_shadow(&self.shadows.directional);
        let program = &mut self.programs.directional_shadow;
        program.set_uniform(
            "u_directionalLightTransform",
            input.lights.directional.calculate_light_transform(),
        )?;

        let mut scope = PassScope::begin(&mut self.backend, &desc)?;
        let draws = input
            .scene
            .render(scope.backend(), program, &mut self.units, &self.defaults)?;
        scope.finish()?;
        Ok(draws)
    }

    /// Returns (face passes, draws)
    fn omni_shadow_passes(&mut self, input: &FrameInput<'_>) -> RenderResult<(u32, u32)> {
        let mut faces = 0;
        let mut draws = 0;
        for (slot, light) in input.lights.omni_lights() {
            let map = self.shadows.omni(slot)?;
            let program = &mut self.programs.omni_shadow;
            program.set_uniform("u_lightPos", light.position())?;
            program.set_uniform("u_farPlane", light.far_plane())?;
            for (face, matrix) in light.calculate_light_transforms().into_iter().enumerate() {
                program.set_uniform(&format!("u_lightMatrices[{face}]"), matrix)?;
            }

            for face in 0..6 {
                program.set_uniform("u_face", face as i32)?;
                let mut scope = PassScope::begin(&mut self.backend, &passes::omni_shadow_face(map, face))?;
                draws += input
                    .scene
                    .render(scope.backend(), program, &mut self.units, &self.defaults)?;
                scope.finish()?;
                faces += 1;
            }
        }
        Ok((faces, draws))
    }

    fn main_pass(&mut self, input: &FrameInput<'_>, wireframe: bool) -> RenderResult<u32> {
        let camera = input.camera;
        let lights = input.lights;
        let view = camera.view_matrix();
        let projection = camera.projection_matrix();
        let desc = passes::main_pass(self.targets.get(BufferId::Main)?, wireframe);

        let mut scope = PassScope::begin(&mut self.backend, &desc)?;
        let mut draws = 0;

        if input.settings.show_skybox {
            if let Some(skybox) = self.skybox.as_mut() {
                skybox.draw(scope.backend(), &mut self.units, view, projection)?;
                draws += 1;
            }
        }
        if let Some(terrain) = self.terrain.as_mut() {
            draws += terrain.render(scope.backend(), &mut self.units, camera, lights.directional.direction)?;
        }

        let program = &mut self.programs.main;
        program.set_uniform("u_projection", projection)?;
        program.set_uniform("u_view", view)?;
        program.set_uniform("u_cameraPosition", camera.position)?;

        lights.directional.apply(program)?;
        program.bind_sampler(
            &mut self.units,
            DIRECTIONAL_SHADOW_SAMPLER,
            DIRECTIONAL_SHADOW_TEXTURE_UNIT,
            self.shadows.directional_depth()?.bound(),
        )?;

        let points = lights.active_point_lights();
        program.set_uniform("u_pointLightCount", points.len() as i32)?;
        for (i, light) in points.iter().enumerate() {
            light.apply(program, i)?;
        }
        let spots = lights.active_spot_lights();
        program.set_uniform("u_spotLightCount", spots.len() as i32)?;
        for (j, light) in spots.iter().enumerate() {
            light.apply(program, j)?;
        }

        let mut omni_params = [(UNUSED_OMNI_FAR_PLANE, 0.0); OMNI_SHADOW_SLOTS];
        for (slot, light) in lights.omni_lights() {
            omni_params[slot] = (light.far_plane(), light.shadow.bias);
        }
        for (slot, (far, bias)) in omni_params.into_iter().enumerate() {
            program.bind_sampler(
                &mut self.units,
                &omni_shadow_sampler(slot),
                omni_shadow_unit(slot),
                self.shadows.omni_binding(slot),
            )?;
            program.set_uniform(&omni_far_plane_uniform(slot), far)?;
            program.set_uniform(&omni_bias_uniform(slot), bias)?;
        }

        draws += input
            .scene
            .render(scope.backend(), program, &mut self.units, &self.defaults)?;
        scope.finish()?;
        Ok(draws)
    }

    fn screen_pass(&mut self, source: BufferId, width: u32, height: u32) -> RenderResult<()> {
        let texture = self.targets.get(source)?.color_texture()?.bound();
        let program = &mut self.programs.screen;
        program.bind_sampler(&mut self.units, SCREEN_SAMPLER, SCREEN_TEXTURE_UNIT, texture)?;
        program.validate(&self.units)?;

        let mut scope = PassScope::begin(&mut self.backend, &passes::screen(width, height))?;
        program.draw(scope.backend(), &self.units, self.quad.handle)?;
        scope.finish()
    }

    /// Release every resource and hand the backend back
    pub fn shutdown(self) -> RenderResult<B> {
        let Self {
            mut backend,
            programs,
            mut targets,
            shadows,
            post,
            skybox,
            terrain,
            quad,
            white,
            flat_normal,
            ..
        } = self;

        programs.destroy(&mut backend)?;
        targets.delete_render_buffers(&mut backend)?;
        shadows.destroy(&mut backend)?;
        post.destroy(&mut backend)?;
        if let Some(skybox) = skybox {
            skybox.destroy(&mut backend)?;
        }
        if let Some(terrain) = terrain {
            terrain.destroy(&mut backend)?;
        }
        quad.destroy(&mut backend)?;
        white.destroy(&mut backend)?;
        flat_normal.destroy(&mut backend)?;
        log::info!("Render engine shut down");
        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Vec3};

    use super::*;
    use crate::renderer::backend::{Command, PassTarget, RecordingBackend, TextureHandle};
    use crate::renderer::lights::{LightBase, PointLight, SpotLight};
    use crate::renderer::material::Material;
    use crate::renderer::passes::{DIRECTIONAL_SHADOW_PASS, MAIN_PASS, OMNI_FACE_PASSES, SCREEN_PASS};
    use crate::renderer::scene::SceneObject;
    use crate::renderer::shader::UniformValue;
    use crate::renderer::units::MAX_POINT_LIGHTS;

    struct Fixture {
        engine: RenderEngine<RecordingBackend>,
        scene: Scene,
        camera: Camera,
        lights: LightSet,
        settings: RendererSettings,
    }

    impl Fixture {
        fn with(backend: RecordingBackend, options: &RenderOptions) -> Self {
            let mut engine = RenderEngine::new(backend, options).unwrap();
            let cube = MeshData::cube().upload(engine.backend_mut(), "cube").unwrap();
            let floor = MeshData::plane(20.0, 4.0).upload(engine.backend_mut(), "floor").unwrap();
            let mut scene = Scene::new();
            scene.add(SceneObject::new(
                "cube",
                cube,
                Mat4::from_translation(Vec3::new(-3.0, 0.5, -3.0)),
                Material::shiny(),
            ));
            scene.add(SceneObject::new("floor", floor, Mat4::IDENTITY, Material::dull()));
            Self {
                engine,
                scene,
                camera: Camera::default(),
                lights: LightSet::default(),
                settings: RendererSettings {
                    post: PostProcessSettings::none(),
                    ..RendererSettings::default()
                },
            }
        }

        fn new() -> Self {
            Self::with(RecordingBackend::new(320, 240), &RenderOptions::minimal())
        }

        fn frame_at(&mut self, width: u32, height: u32) -> FrameReport {
            let input = FrameInput {
                scene: &self.scene,
                camera: &self.camera,
                lights: &self.lights,
                settings: &self.settings,
                framebuffer_size: (width, height),
            };
            self.engine.render_frame(&input).unwrap()
        }

        fn frame(&mut self) -> FrameReport {
            self.frame_at(320, 240)
        }

        fn labels(&self) -> Vec<&'static str> {
            self.engine.backend().pass_labels()
        }

        fn color_of(&self, id: BufferId) -> TextureHandle {
            self.engine.targets().get(id).unwrap().color_texture().unwrap().handle
        }

        /// Textures of the draw issued in the screen pass
        fn screen_draw_textures(&self) -> Vec<TextureHandle> {
            let commands = self.engine.backend().commands();
            let start = commands
                .iter()
                .rposition(|c| matches!(c, Command::BeginPass(d) if d.label == SCREEN_PASS))
                .unwrap();
            commands[start..]
                .iter()
                .find_map(|c| match c {
                    Command::Draw { textures, .. } => Some(textures.clone()),
                    _ => None,
                })
                .unwrap()
        }
    }

    fn point_light(x: f32) -> PointLight {
        PointLight::new(LightBase::new(Vec3::new(1.0, 0.8, 0.6), 0.1, 0.8), Vec3::new(x, 2.0, 0.0))
            .with_shadow(ShadowConfig::omni().with_resolution(64))
    }

    fn spot_light(x: f32) -> SpotLight {
        SpotLight::new(point_light(x), Vec3::NEG_Y, 20.0)
    }

    #[test]
    fn test_point_lights_add_six_face_passes_each() {
        let mut fx = Fixture::new();
        fx.lights.add_point_light(point_light(1.0));
        fx.lights.add_point_light(point_light(-1.0));
        let report = fx.frame();

        assert_eq!(report.omni_lights, 2);
        assert_eq!(report.omni_passes, 12);

        let mut expected = vec![DIRECTIONAL_SHADOW_PASS];
        expected.extend(OMNI_FACE_PASSES);
        expected.extend(OMNI_FACE_PASSES);
        expected.extend([MAIN_PASS, SCREEN_PASS]);
        assert_eq!(fx.labels(), expected);
        assert_eq!(report.passes, expected.len() as u32);
    }

    #[test]
    fn test_excess_lights_are_truncated() {
        let mut fx = Fixture::new();
        for i in 0..5 {
            fx.lights.add_point_light(point_light(i as f32));
        }
        let report = fx.frame();
        assert_eq!(report.omni_passes, 18);
        assert_eq!(fx.engine.shadows().omni_count(), 3);

        let count = fx.engine.programs.main.read_uniform("u_pointLightCount");
        assert_eq!(count, Some(UniformValue::Int(3)));
    }

    #[test]
    fn test_excess_spot_lights_are_truncated() {
        let mut fx = Fixture::new();
        for i in 0..4 {
            fx.lights.add_point_light(point_light(i as f32));
        }
        for i in 0..5 {
            fx.lights.add_spot_light(spot_light(-(i as f32)));
        }
        let report = fx.frame();
        assert_eq!(report.omni_lights, 6);
        assert_eq!(report.omni_passes, 36);
        assert_eq!(fx.lights.spot_slot(0), MAX_POINT_LIGHTS);

        let main = &fx.engine.programs.main;
        assert_eq!(main.read_uniform("u_pointLightCount"), Some(UniformValue::Int(3)));
        assert_eq!(main.read_uniform("u_spotLightCount"), Some(UniformValue::Int(3)));

        let shadows = fx.engine.shadows();
        let units = fx.engine.units();
        for slot in 0..OMNI_SHADOW_SLOTS {
            let map = shadows.omni(slot).unwrap();
            assert_eq!(units.get(omni_shadow_unit(slot)), Some(map.texture.bound()));
            assert_ne!(map.texture.bound(), shadows.placeholder.bound());
        }
    }

    #[test]
    fn test_shadow_bias_reaches_main_program() {
        let mut fx = Fixture::new();
        fx.lights.directional.shadow.bias = 0.02;
        let mut light = point_light(1.0);
        light.shadow.bias = 0.5;
        fx.lights.add_point_light(light);
        fx.frame();

        let main = &fx.engine.programs.main;
        assert_eq!(
            main.read_uniform("u_directionalLight.shadowBias"),
            Some(UniformValue::Float(0.02))
        );
        assert_eq!(main.read_uniform(&omni_bias_uniform(0)), Some(UniformValue::Float(0.5)));
        assert_eq!(main.read_uniform(&omni_bias_uniform(1)), Some(UniformValue::Float(0.0)));

        fx.lights.point_lights_mut()[0].shadow.bias = 0.1;
        fx.frame();
        let main = &fx.engine.programs.main;
        assert_eq!(main.read_uniform(&omni_bias_uniform(0)), Some(UniformValue::Float(0.1)));
    }

    #[test]
    fn test_omni_units_for_two_point_and_two_spot_lights() {
        let mut fx = Fixture::new();
        fx.lights.add_point_light(point_light(1.0));
        fx.lights.add_point_light(point_light(-1.0));
        fx.lights.add_spot_light(spot_light(2.0));
        fx.lights.add_spot_light(spot_light(-2.0));
        let report = fx.frame();
        assert_eq!(report.omni_passes, 24);

        let shadows = fx.engine.shadows();
        let units = fx.engine.units();
        for slot in 0..4 {
            let map = shadows.omni(slot).unwrap();
            assert_eq!(units.get(omni_shadow_unit(slot)), Some(map.texture.bound()));
            assert_eq!(
                fx.engine.programs.main.sampler_unit(&omni_shadow_sampler(slot)),
                Some(omni_shadow_unit(slot))
            );
        }
        for slot in 4..OMNI_SHADOW_SLOTS {
            assert_eq!(units.get(omni_shadow_unit(slot)), Some(shadows.placeholder.bound()));
        }
        assert_eq!(fx.lights.spot_slot(0), 2);
        assert_eq!(fx.lights.spot_slot(1), 3);
    }

    #[test]
    fn test_directional_light_reaches_main_program() {
        let mut fx = Fixture::new();
        fx.frame();
        let main = &fx.engine.programs.main;
        assert_eq!(
            main.read_uniform("u_directionalLight.base.ambientIntensity"),
            Some(UniformValue::Float(0.2))
        );
        assert_eq!(
            main.read_uniform("u_directionalLight.base.diffuseIntensity"),
            Some(UniformValue::Float(0.7))
        );
        assert_eq!(
            main.read_uniform("u_directionalLight.direction"),
            Some(UniformValue::Vec3(Vec3::new(-45.0, -35.0, -45.0)))
        );
        assert_eq!(
            main.read_uniform("u_directionalLightTransform"),
            Some(UniformValue::Mat4(fx.lights.directional.calculate_light_transform()))
        );
        assert_eq!(
            fx.engine.units().get(DIRECTIONAL_SHADOW_TEXTURE_UNIT),
            Some(fx.engine.shadows().directional_depth().unwrap().bound())
        );
    }

    #[test]
    fn test_resize_recreates_targets_once() {
        let mut fx = Fixture::new();
        let report = fx.frame();
        assert!(!report.resized);
        let before = fx.engine.backend().stats();

        let report = fx.frame_at(640, 480);
        assert!(report.resized);
        let after = fx.engine.backend().stats();
        // main color + depth and two ping-pong colors
        assert_eq!(after.textures_destroyed - before.textures_destroyed, 4);
        assert_eq!(after.framebuffers_destroyed - before.framebuffers_destroyed, 3);
        assert_eq!(after.live_textures, before.live_textures);

        let main = fx.engine.targets().get(BufferId::Main).unwrap();
        assert_eq!((main.width, main.height), (640, 480));
        let screen = fx.engine.backend().passes().into_iter().last().unwrap().clone();
        assert_eq!((screen.viewport.width, screen.viewport.height), (640, 480));
        assert_eq!(fx.engine.backend().surface_size(), (640, 480));

        let report = fx.frame_at(640, 480);
        assert!(!report.resized);
        assert_eq!(fx.engine.backend().stats().textures_destroyed, after.textures_destroyed);
    }

    #[test]
    fn test_effect_parity_selects_final_buffer() {
        let mut fx = Fixture::new();
        fx.settings.post.set_enabled(PostProcessEffect::Invert, true);
        fx.settings.post.set_enabled(PostProcessEffect::Grayscale, true);
        fx.settings.post.set_enabled(PostProcessEffect::Vignette, true);
        let report = fx.frame();
        assert_eq!(report.effects, 3);
        assert_eq!(report.final_source, BufferId::PingPongA);
        assert_eq!(fx.screen_draw_textures(), vec![fx.color_of(BufferId::PingPongA)]);

        fx.settings.post.set_enabled(PostProcessEffect::Grayscale, false);
        let report = fx.frame();
        assert_eq!(report.effects, 2);
        assert_eq!(report.final_source, BufferId::PingPongB);
        assert_eq!(fx.screen_draw_textures(), vec![fx.color_of(BufferId::PingPongB)]);
    }

    #[test]
    fn test_master_off_blits_main_buffer() {
        let mut fx = Fixture::new();
        fx.settings.post = PostProcessSettings::default();
        fx.settings.post.enabled = false;
        let report = fx.frame();
        assert_eq!(report.effects, 0);
        assert_eq!(report.final_source, BufferId::Main);
        assert!(!fx.labels().iter().any(|l| l.starts_with("post_")));
        assert_eq!(fx.screen_draw_textures(), vec![fx.color_of(BufferId::Main)]);
    }

    #[test]
    fn test_post_passes_never_read_their_target() {
        let mut fx = Fixture::new();
        for effect in [PostProcessEffect::Invert, PostProcessEffect::EdgeDetection, PostProcessEffect::LogoOverlay] {
            fx.settings.post.set_enabled(effect, true);
        }
        fx.frame();

        let targets = fx.engine.targets();
        let commands = fx.engine.backend().commands();
        let mut current = None;
        for command in commands {
            match command {
                Command::BeginPass(desc) if desc.label.starts_with("post_") => current = Some(desc.target),
                Command::Draw { textures, .. } => {
                    if let Some(PassTarget::Framebuffer(fb)) = current {
                        let written = [BufferId::PingPongA, BufferId::PingPongB]
                            .into_iter()
                            .find(|&id| targets.get(id).unwrap().framebuffer == fb)
                            .unwrap();
                        assert_ne!(textures[0], fx.color_of(written));
                    }
                }
                Command::EndPass => current = None,
                _ => {}
            }
        }
    }

    #[test]
    fn test_lost_surface_skips_frame() {
        let mut fx = Fixture::new();
        fx.engine.backend_mut().lose_surface();
        let report = fx.frame();
        assert!(report.skipped);
        assert!(fx.labels().is_empty());
        assert_eq!(fx.engine.frame_index(), 0);

        let report = fx.frame();
        assert!(!report.skipped);
        assert_eq!(fx.engine.frame_index(), 1);
    }

    #[test]
    fn test_minimized_window_skips_frame() {
        let mut fx = Fixture::new();
        assert!(fx.frame_at(0, 240).skipped);
        assert!(fx.engine.targets().get(BufferId::Main).is_ok());
    }

    #[test]
    fn test_unsupported_wireframe_warns_once_and_fills() {
        let mut fx = Fixture::with(RecordingBackend::new(320, 240).without_wireframe(), &RenderOptions::minimal());
        fx.settings.wireframe = true;
        fx.frame();
        fx.frame();
        assert!(fx.engine.warned_wireframe);
        let passes = fx.engine.backend().passes();
        assert!(passes.iter().filter(|p| p.label == MAIN_PASS).all(|p| !p.wireframe));

        let mut supported = Fixture::new();
        supported.settings.wireframe = true;
        supported.frame();
        let passes = supported.engine.backend().passes();
        assert!(passes.iter().any(|p| p.label == MAIN_PASS && p.wireframe));
        assert!(!supported.engine.warned_wireframe);
    }

    #[test]
    fn test_depth_prepass_follows_depth_visualize() {
        let options = RenderOptions {
            depth_visualization: true,
            ..RenderOptions::minimal()
        };
        let mut fx = Fixture::with(RecordingBackend::new(320, 240), &options);
        fx.frame();
        assert!(!fx.labels().contains(&passes::DEPTH_PREPASS));

        fx.settings
            .post
            .set_enabled(PostProcessEffect::DepthVisualize, true);
        fx.engine.backend_mut().clear_commands();
        let report = fx.frame();
        assert_eq!(fx.labels().first(), Some(&passes::DEPTH_PREPASS));
        assert!(fx.labels().contains(&"post_depth_visualize"));
        assert_eq!(report.effects, 1);
    }

    #[test]
    fn test_skybox_and_terrain_draw_before_scene() {
        let mut fx = Fixture::with(RecordingBackend::new(320, 240), &RenderOptions::default());
        fx.settings.post = PostProcessSettings::default();
        let report = fx.frame();
        // vignette and logo overlay are on by default
        assert_eq!(report.effects, 2);
        assert_eq!(report.final_source, BufferId::PingPongB);

        fx.settings.show_skybox = false;
        fx.engine.backend_mut().clear_commands();
        let without_sky = fx.frame();
        assert_eq!(report.draw_calls - without_sky.draw_calls, 1);
    }

    #[test]
    fn test_tessellation_setting_rebuilds_terrain_patches() {
        let mut fx = Fixture::with(RecordingBackend::new(320, 240), &RenderOptions::default());
        let first = fx.frame();
        let meshes = fx.engine.backend().stats().live_meshes;

        fx.settings.terrain_tessellation = Some(4);
        let second = fx.frame();
        let terrain = fx.engine.terrain.as_ref().unwrap();
        assert_eq!(terrain.settings().tessellation_factor, 4);
        assert_eq!(fx.engine.backend().stats().live_meshes, meshes);
        assert_eq!(second.draw_calls, first.draw_calls);
    }

    #[test]
    fn test_shutdown_releases_everything() {
        let mut fx = Fixture::with(RecordingBackend::new(320, 240), &RenderOptions::default());
        fx.lights.add_point_light(point_light(1.0));
        fx.lights.add_spot_light(spot_light(-1.0));
        fx.frame();

        let scene_meshes: Vec<_> = fx.scene.objects().iter().map(|o| o.mesh).collect();
        let mut backend = fx.engine.shutdown().unwrap();
        for mesh in scene_meshes {
            mesh.destroy(&mut backend).unwrap();
        }
        let stats = backend.stats();
        assert_eq!(stats.live_textures, 0);
        assert_eq!(stats.live_framebuffers, 0);
        assert_eq!(stats.live_programs, 0);
        assert_eq!(stats.live_meshes, 0);
    }
}
