//! Post-processing chain over two ping-pong buffers
//!
//! Effects run in a fixed order. An enabled effect reads the buffer written
//! last (the main buffer for the first one) and writes the other ping-pong
//! buffer; a disabled one is skipped without touching the counter. Where the
//! final image lives follows from the counter alone.

use std::path::Path;

use glam::{Vec2, Vec4};
use serde::{Deserialize, Serialize};

use super::backend::{RenderBackend, SamplerType, TextureFormat};
use super::mesh::Mesh;
use super::passes::{self, PassScope};
use super::shader::{ShaderProgram, UniformType};
use super::target::{BufferId, RenderTargets};
use super::texture::Texture;
use super::units::{TextureUnits, POST_AUX_TEXTURE_UNIT, SCREEN_TEXTURE_UNIT};
use crate::error::{RenderError, RenderResult};

const FULLSCREEN_VERTEX: &str = include_str!("shaders/post/fullscreen.wgsl");

/// Sampler every effect (and the screen blit) reads its source from
pub const SCREEN_SAMPLER: &str = "s_screenTexture";
const DEPTH_SAMPLER: &str = "s_depthTexture";
const LOGO_SAMPLER: &str = "s_logoOverlayTexture";
const DEPTH_VIS_SAMPLER: &str = "s_depthVisTexture";

/// Post effects in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PostProcessEffect {
    AmbientOcclusion,
    Invert,
    Grayscale,
    EdgeDetection,
    ColorCorrection,
    Vignette,
    LogoOverlay,
    DepthVisualize,
}

impl PostProcessEffect {
    /// Every effect, in the order the chain runs them
    pub const ALL: [Self; 8] = [
        Self::AmbientOcclusion,
        Self::Invert,
        Self::Grayscale,
        Self::EdgeDetection,
        Self::ColorCorrection,
        Self::Vignette,
        Self::LogoOverlay,
        Self::DepthVisualize,
    ];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Pass label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::AmbientOcclusion => "post_ambient_occlusion",
            Self::Invert => "post_invert",
            Self::Grayscale => "post_grayscale",
            Self::EdgeDetection => "post_edge_detection",
            Self::ColorCorrection => "post_color_correction",
            Self::Vignette => "post_vignette",
            Self::LogoOverlay => "post_logo_overlay",
            Self::DepthVisualize => "post_depth_visualize",
        }
    }

    const fn fragment_source(self) -> &'static str {
        match self {
            Self::AmbientOcclusion => include_str!("shaders/post/ambient_occlusion.wgsl"),
            Self::Invert => include_str!("shaders/post/invert.wgsl"),
            Self::Grayscale => include_str!("shaders/post/grayscale.wgsl"),
            Self::EdgeDetection => include_str!("shaders/post/edge_detection.wgsl"),
            Self::ColorCorrection => include_str!("shaders/post/color_correction.wgsl"),
            Self::Vignette => include_str!("shaders/post/vignette.wgsl"),
            Self::LogoOverlay => include_str!("shaders/post/logo_overlay.wgsl"),
            Self::DepthVisualize => include_str!("shaders/post/depth_visualize.wgsl"),
        }
    }

    /// Compile and register this effect's program
    fn create_program<B: RenderBackend + ?Sized>(self, backend: &mut B) -> RenderResult<ShaderProgram> {
        let source = format!("{FULLSCREEN_VERTEX}\n{}", self.fragment_source());
        let mut p = ShaderProgram::compile(backend, self.label(), &source)?;
        match self {
            Self::AmbientOcclusion => {
                p.register_uniform(UniformType::Float, "u_radius")?;
                p.register_uniform(UniformType::Float, "u_intensity")?;
                p.register_uniform(UniformType::Float, "u_bias")?;
                p.register_uniform(UniformType::Float, "u_nearPlane")?;
                p.register_uniform(UniformType::Float, "u_farPlane")?;
                p.register_uniform(UniformType::Vec2, "u_texelSize")?;
                p.register_sampler(SamplerType::Texture2d, SCREEN_SAMPLER)?;
                p.register_sampler(SamplerType::Depth2d, DEPTH_SAMPLER)?;
            }
            Self::Invert | Self::Grayscale => {
                p.register_sampler(SamplerType::Texture2d, SCREEN_SAMPLER)?;
            }
            Self::EdgeDetection => {
                p.register_uniform(UniformType::Float, "u_offset")?;
                p.register_sampler(SamplerType::Texture2d, SCREEN_SAMPLER)?;
            }
            Self::ColorCorrection => {
                p.register_uniform(UniformType::Float, "u_brightness")?;
                p.register_uniform(UniformType::Float, "u_contrast")?;
                p.register_uniform(UniformType::Float, "u_saturation")?;
                p.register_sampler(SamplerType::Texture2d, SCREEN_SAMPLER)?;
            }
            Self::Vignette => {
                p.register_uniform(UniformType::Vec2, "u_resolution")?;
                p.register_uniform(UniformType::Float, "u_radius")?;
                p.register_uniform(UniformType::Float, "u_softness")?;
                p.register_uniform(UniformType::Float, "u_intensity")?;
                p.register_sampler(SamplerType::Texture2d, SCREEN_SAMPLER)?;
            }
            Self::LogoOverlay => {
                p.register_uniform(UniformType::Vec4, "u_tint")?;
                p.register_uniform(UniformType::Vec2, "u_framebufferDimensions")?;
                p.register_uniform(UniformType::Vec2, "u_logoOverlayTextureDimensions")?;
                p.register_sampler(SamplerType::Texture2d, SCREEN_SAMPLER)?;
                p.register_sampler(SamplerType::Texture2d, LOGO_SAMPLER)?;
            }
            Self::DepthVisualize => {
                p.register_uniform(UniformType::Float, "u_opacity")?;
                p.register_sampler(SamplerType::Texture2d, SCREEN_SAMPLER)?;
                p.register_sampler(SamplerType::Texture2d, DEPTH_VIS_SAMPLER)?;
            }
        }
        p.link(backend)?;
        Ok(p)
    }
}

// ============================================================================
// Settings
// ============================================================================

/// On/off switch for effects without parameters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToggleSetting {
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientOcclusionSettings {
    pub enabled: bool,
    /// Sample ring radius in pixels
    pub radius: f32,
    pub intensity: f32,
    /// View-space depth difference ignored as noise
    pub bias: f32,
}

impl Default for AmbientOcclusionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            radius: 4.0,
            intensity: 0.8,
            bias: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeDetectionSettings {
    pub enabled: bool,
    /// Kernel tap distance in UV units
    pub offset: f32,
}

impl Default for EdgeDetectionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            offset: 1.0 / 300.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorCorrectionSettings {
    pub enabled: bool,
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
}

impl Default for ColorCorrectionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            brightness: 0.0,
            contrast: 1.1,
            saturation: 1.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VignetteSettings {
    pub enabled: bool,
    pub radius: f32,
    pub softness: f32,
    pub intensity: f32,
}

impl Default for VignetteSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            radius: 0.75,
            softness: 0.45,
            intensity: 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogoOverlaySettings {
    pub enabled: bool,
    /// Added to the logo color before blending
    pub tint: [f32; 4],
}

impl Default for LogoOverlaySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            tint: [0.2, 0.2, 0.2, 0.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthVisualizeSettings {
    pub enabled: bool,
    /// Depth mapped to black
    pub near: f32,
    /// Depth mapped to white
    pub far: f32,
    pub opacity: f32,
}

impl Default for DepthVisualizeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            near: 0.1,
            far: 50.0,
            opacity: 1.0,
        }
    }
}

/// Master flag plus one setting per effect
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessSettings {
    /// When off no effect pass runs
    pub enabled: bool,
    pub ambient_occlusion: AmbientOcclusionSettings,
    pub invert: ToggleSetting,
    pub grayscale: ToggleSetting,
    pub edge_detection: EdgeDetectionSettings,
    pub color_correction: ColorCorrectionSettings,
    pub vignette: VignetteSettings,
    pub logo_overlay: LogoOverlaySettings,
    pub depth_visualize: DepthVisualizeSettings,
}

impl Default for PostProcessSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ambient_occlusion: AmbientOcclusionSettings::default(),
            invert: ToggleSetting::default(),
            grayscale: ToggleSetting::default(),
            edge_detection: EdgeDetectionSettings::default(),
            color_correction: ColorCorrectionSettings::default(),
            vignette: VignetteSettings::default(),
            logo_overlay: LogoOverlaySettings::default(),
            depth_visualize: DepthVisualizeSettings::default(),
        }
    }
}

impl PostProcessSettings {
    /// Every effect off, master on
    #[must_use]
    pub fn none() -> Self {
        let mut settings = Self::default();
        for effect in PostProcessEffect::ALL {
            settings.set_enabled(effect, false);
        }
        settings
    }

    fn flag_mut(&mut self, effect: PostProcessEffect) -> &mut bool {
        match effect {
            PostProcessEffect::AmbientOcclusion => &mut self.ambient_occlusion.enabled,
            PostProcessEffect::Invert => &mut self.invert.enabled,
            PostProcessEffect::Grayscale => &mut self.grayscale.enabled,
            PostProcessEffect::EdgeDetection => &mut self.edge_detection.enabled,
            PostProcessEffect::ColorCorrection => &mut self.color_correction.enabled,
            PostProcessEffect::Vignette => &mut self.vignette.enabled,
            PostProcessEffect::LogoOverlay => &mut self.logo_overlay.enabled,
            PostProcessEffect::DepthVisualize => &mut self.depth_visualize.enabled,
        }
    }

    /// The effect's own flag, ignoring the master flag
    #[must_use]
    pub const fn is_enabled(&self, effect: PostProcessEffect) -> bool {
        match effect {
            PostProcessEffect::AmbientOcclusion => self.ambient_occlusion.enabled,
            PostProcessEffect::Invert => self.invert.enabled,
            PostProcessEffect::Grayscale => self.grayscale.enabled,
            PostProcessEffect::EdgeDetection => self.edge_detection.enabled,
            PostProcessEffect::ColorCorrection => self.color_correction.enabled,
            PostProcessEffect::Vignette => self.vignette.enabled,
            PostProcessEffect::LogoOverlay => self.logo_overlay.enabled,
            PostProcessEffect::DepthVisualize => self.depth_visualize.enabled,
        }
    }

    pub fn set_enabled(&mut self, effect: PostProcessEffect, enabled: bool) {
        *self.flag_mut(effect) = enabled;
    }

    /// Flip one effect; returns the new state
    pub fn toggle(&mut self, effect: PostProcessEffect) -> bool {
        let flag = self.flag_mut(effect);
        *flag = !*flag;
        *flag
    }

    /// Whether the chain will run `effect` this frame
    #[must_use]
    pub const fn will_run(&self, effect: PostProcessEffect) -> bool {
        self.enabled && self.is_enabled(effect)
    }

    /// Effects that will run, in order
    pub fn active_effects(&self) -> impl Iterator<Item = PostProcessEffect> + '_ {
        PostProcessEffect::ALL.into_iter().filter(|&e| self.will_run(e))
    }
}

// ============================================================================
// Ping-pong counter
// ============================================================================

/// Number of effects executed so far this frame.
///
/// | count | source | destination |
/// |-------|--------|-------------|
/// | 0     | main   | A           |
/// | odd   | A      | B           |
/// | even  | B      | A           |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PingPong {
    count: u32,
}

impl PingPong {
    #[must_use]
    pub const fn new() -> Self {
        Self { count: 0 }
    }

    #[must_use]
    pub const fn count(self) -> u32 {
        self.count
    }

    /// Buffer the next effect reads
    #[must_use]
    pub const fn source(self) -> BufferId {
        match self.count {
            0 => BufferId::Main,
            n if n % 2 == 1 => BufferId::PingPongA,
            _ => BufferId::PingPongB,
        }
    }

    /// Buffer the next effect writes
    #[must_use]
    pub const fn destination(self) -> BufferId {
        if self.count % 2 == 1 {
            BufferId::PingPongB
        } else {
            BufferId::PingPongA
        }
    }

    /// Buffer holding the finished image: main when no effect ran, otherwise
    /// the last one written
    #[must_use]
    pub const fn final_source(self) -> BufferId {
        if self.count == 0 {
            return BufferId::Main;
        }
        if self.count % 2 == 1 {
            BufferId::PingPongA
        } else {
            BufferId::PingPongB
        }
    }

    pub fn advance(&mut self) {
        self.count += 1;
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

// ============================================================================
// Chain
// ============================================================================

/// Per-frame values effects read besides their settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostFrame {
    pub camera_near: f32,
    pub camera_far: f32,
}

/// Effect programs, logo texture and the ping-pong counter
#[derive(Debug)]
pub struct PostProcessChain {
    programs: Vec<ShaderProgram>,
    logo: Texture,
    ping_pong: PingPong,
    warned_missing_depth_vis: bool,
}

impl PostProcessChain {
    /// Compile every effect; load the logo from `logo_path` or generate one
    pub fn new<B: RenderBackend + ?Sized>(backend: &mut B, logo_path: Option<&Path>) -> RenderResult<Self> {
        let programs = PostProcessEffect::ALL
            .into_iter()
            .map(|effect| effect.create_program(backend))
            .collect::<RenderResult<Vec<_>>>()?;

        let logo = match logo_path {
            Some(path) => Texture::from_path(backend, path, TextureFormat::Rgba8UnormSrgb)?,
            None => {
                let img = placeholder_logo();
                let (width, height) = img.dimensions();
                Texture::from_rgba(backend, &img, width, height, "logo_placeholder", TextureFormat::Rgba8UnormSrgb)?
            }
        };
        log::info!("Post-processing ready: {} effects, logo {}x{}", programs.len(), logo.width, logo.height);

        Ok(Self {
            programs,
            logo,
            ping_pong: PingPong::new(),
            warned_missing_depth_vis: false,
        })
    }

    /// Counter state after the last run
    #[must_use]
    pub const fn ping_pong(&self) -> PingPong {
        self.ping_pong
    }

    /// Run every enabled effect; returns how many ran
    pub fn run<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        units: &mut TextureUnits,
        targets: &RenderTargets,
        quad: &Mesh,
        settings: &PostProcessSettings,
        frame: PostFrame,
    ) -> RenderResult<u32> {
        self.ping_pong.reset();
        if !settings.enabled {
            return Ok(0);
        }
        for effect in settings.active_effects() {
            if effect == PostProcessEffect::DepthVisualize && targets.depth_vis().is_none() {
                if !self.warned_missing_depth_vis {
                    log::warn!("Depth visualization is enabled but no depth-visualization target exists; skipping");
                    self.warned_missing_depth_vis = true;
                }
                continue;
            }
            self.run_effect(backend, units, targets, quad, settings, frame, effect)?;
            self.ping_pong.advance();
        }
        Ok(self.ping_pong.count())
    }

    #[allow(clippy::too_many_arguments)]
    fn run_effect<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        units: &mut TextureUnits,
        targets: &RenderTargets,
        quad: &Mesh,
        settings: &PostProcessSettings,
        frame: PostFrame,
        effect: PostProcessEffect,
    ) -> RenderResult<()> {
        let source_id = self.ping_pong.source();
        let destination_id = self.ping_pong.destination();
        if source_id == destination_id {
            return Err(RenderError::PassState(format!(
                "{} would read and write {}",
                effect.label(),
                source_id.name()
            )));
        }
        let source = targets.get(source_id)?.color_texture()?.bound();
        let destination = targets.get(destination_id)?;
        let resolution = Vec2::new(destination.width as f32, destination.height as f32);

        let program = self
            .programs
            .get_mut(effect.index())
            .ok_or_else(|| RenderError::PassState(format!("no program for {}", effect.label())))?;
        program.bind_sampler(units, SCREEN_SAMPLER, SCREEN_TEXTURE_UNIT, source)?;

        match effect {
            PostProcessEffect::AmbientOcclusion => {
                let s = &settings.ambient_occlusion;
                let depth = targets.get(BufferId::Main)?.depth_texture()?.bound();
                program.bind_sampler(units, DEPTH_SAMPLER, POST_AUX_TEXTURE_UNIT, depth)?;
                program.set_uniform("u_radius", s.radius)?;
                program.set_uniform("u_intensity", s.intensity)?;
                program.set_uniform("u_bias", s.bias)?;
                program.set_uniform("u_nearPlane", frame.camera_near)?;
                program.set_uniform("u_farPlane", frame.camera_far)?;
                program.set_uniform("u_texelSize", resolution.recip())?;
            }
            PostProcessEffect::Invert | PostProcessEffect::Grayscale => {}
            PostProcessEffect::EdgeDetection => {
                program.set_uniform("u_offset", settings.edge_detection.offset)?;
            }
            PostProcessEffect::ColorCorrection => {
                let s = &settings.color_correction;
                program.set_uniform("u_brightness", s.brightness)?;
                program.set_uniform("u_contrast", s.contrast)?;
                program.set_uniform("u_saturation", s.saturation)?;
            }
            PostProcessEffect::Vignette => {
                let s = &settings.vignette;
                program.set_uniform("u_resolution", resolution)?;
                program.set_uniform("u_radius", s.radius)?;
                program.set_uniform("u_softness", s.softness)?;
                program.set_uniform("u_intensity", s.intensity)?;
            }
            PostProcessEffect::LogoOverlay => {
                program.bind_sampler(units, LOGO_SAMPLER, POST_AUX_TEXTURE_UNIT, self.logo.bound())?;
                program.set_uniform("u_tint", Vec4::from(settings.logo_overlay.tint))?;
                program.set_uniform("u_framebufferDimensions", resolution)?;
                program.set_uniform(
                    "u_logoOverlayTextureDimensions",
                    Vec2::new(self.logo.width as f32, self.logo.height as f32),
                )?;
            }
            PostProcessEffect::DepthVisualize => {
                let vis = targets
                    .depth_vis()
                    .ok_or_else(|| RenderError::PassState("depth-visualization target missing".to_string()))?
                    .color_texture()?
                    .bound();
                program.bind_sampler(units, DEPTH_VIS_SAMPLER, POST_AUX_TEXTURE_UNIT, vis)?;
                program.set_uniform("u_opacity", settings.depth_visualize.opacity)?;
            }
        }
        program.validate(units)?;

        let mut scope = PassScope::begin(backend, &passes::post_effect(effect.label(), destination))?;
        program.draw(scope.backend(), units, quad.handle)?;
        scope.finish()?;
        log::trace!("{}: {} -> {}", effect.label(), source_id.name(), destination_id.name());
        Ok(())
    }

    pub fn destroy<B: RenderBackend + ?Sized>(self, backend: &mut B) -> RenderResult<()> {
        for program in self.programs {
            program.destroy(backend)?;
        }
        self.logo.destroy(backend)
    }
}

/// Lantern glyph drawn in code when no logo file is configured
fn placeholder_logo() -> image::RgbaImage {
    const W: u32 = 48;
    const H: u32 = 64;
    image::RgbaImage::from_fn(W, H, |x, y| {
        let (fx, fy) = (x as f32 - W as f32 / 2.0, y as f32);
        let handle = fy < 10.0 && (fx.abs() - 8.0).abs() < 2.5;
        let cap = (10.0..16.0).contains(&fy) && fx.abs() < 16.0;
        let body = (16.0..56.0).contains(&fy) && fx.abs() < 14.0 - (fy - 36.0).abs() * 0.15;
        let base = (56.0..62.0).contains(&fy) && fx.abs() < 18.0;
        if body {
            let glow = 1.0 - (fx.abs() / 14.0);
            image::Rgba([255, (180.0 + 60.0 * glow) as u8, 80, 230])
        } else if handle || cap || base {
            image::Rgba([60, 60, 60, 255])
        } else {
            image::Rgba([0, 0, 0, 0])
        }
    })
}
