//! Pass state for each stage of the frame and the scope guard that brackets it

use super::backend::{CullMode, PassDesc, PassTarget, RenderBackend, Viewport};
use super::shadow::OmniShadowMap;
use super::target::RenderTarget;
use crate::error::RenderResult;

pub const DEPTH_PREPASS: &str = "depth_prepass";
pub const DIRECTIONAL_SHADOW_PASS: &str = "directional_shadow";
pub const MAIN_PASS: &str = "main";
pub const SCREEN_PASS: &str = "screen";

/// Pass labels of the six omni cube faces
pub const OMNI_FACE_PASSES: [&str; 6] = [
    "omni_shadow_+x",
    "omni_shadow_-x",
    "omni_shadow_+y",
    "omni_shadow_-y",
    "omni_shadow_+z",
    "omni_shadow_-z",
];

const BLACK: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

/// Depth written as color into the visualization target
#[must_use]
pub fn depth_prepass(target: &RenderTarget) -> PassDesc {
    PassDesc::new(DEPTH_PREPASS, target.pass_target(), target.viewport())
        .with_clear_color(WHITE)
        .with_clear_depth(1.0)
        .with_depth(true, true)
}

/// Depth only, no color target
#[must_use]
pub fn directional_shadow(target: &RenderTarget) -> PassDesc {
    PassDesc::new(DIRECTIONAL_SHADOW_PASS, target.pass_target(), target.viewport())
        .with_clear_depth(1.0)
        .with_depth(true, true)
        .with_color_write(false)
        .with_cull(CullMode::None)
}

/// One cube face of an omni shadow map.
///
/// Culling is off because the face projection mirrors Y.
#[must_use]
pub fn omni_shadow_face(map: &OmniShadowMap, face: usize) -> PassDesc {
    PassDesc::new(OMNI_FACE_PASSES[face], map.face_target(face), map.viewport())
        .with_clear_depth(1.0)
        .with_depth(true, true)
        .with_color_write(false)
        .with_cull(CullMode::None)
}

/// Forward-lit scene into the main target
#[must_use]
pub fn main_pass(target: &RenderTarget, wireframe: bool) -> PassDesc {
    PassDesc::new(MAIN_PASS, target.pass_target(), target.viewport())
        .with_clear_color(BLACK)
        .with_clear_depth(1.0)
        .with_depth(true, true)
        .with_cull(CullMode::Back)
        .with_wireframe(wireframe)
}

/// Full-screen post effect; depth testing off
#[must_use]
pub fn post_effect(label: &'static str, target: &RenderTarget) -> PassDesc {
    PassDesc::new(label, target.pass_target(), target.viewport())
        .with_clear_color(WHITE)
        .with_cull(CullMode::None)
}

/// Final blit to the surface
#[must_use]
pub fn screen(width: u32, height: u32) -> PassDesc {
    PassDesc::new(SCREEN_PASS, PassTarget::Screen, Viewport::full(width, height))
        .with_clear_color(WHITE)
        .with_cull(CullMode::None)
}

/// An open pass; dropping it ends the pass.
///
/// Use [`PassScope::finish`] on the success path to surface `end_pass`
/// errors; a scope dropped during error propagation still closes the pass
/// and only logs.
pub struct PassScope<'a, B: RenderBackend + ?Sized> {
    backend: &'a mut B,
    label: &'static str,
    open: bool,
}

impl<'a, B: RenderBackend + ?Sized> PassScope<'a, B> {
    /// Begin `desc` on `backend`
    pub fn begin(backend: &'a mut B, desc: &PassDesc) -> RenderResult<Self> {
        backend.begin_pass(desc)?;
        log::trace!("Begin pass `{}`", desc.label);
        Ok(Self {
            backend,
            label: desc.label,
            open: true,
        })
    }

    /// Backend to issue draws against
    pub fn backend(&mut self) -> &mut B {
        self.backend
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        self.label
    }

    /// End the pass and report failure
    pub fn finish(mut self) -> RenderResult<()> {
        self.open = false;
        self.backend.end_pass()
    }
}

impl<B: RenderBackend + ?Sized> Drop for PassScope<'_, B> {
    fn drop(&mut self) {
        if self.open {
            if let Err(err) = self.backend.end_pass() {
                log::error!("Failed to end pass `{}`: {}", self.label, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::{Command, RecordingBackend};
    use crate::error::RenderError;

    fn failing_body<B: RenderBackend + ?Sized>(backend: &mut B) -> RenderResult<()> {
        let _scope = PassScope::begin(backend, &screen(32, 32))?;
        Err(RenderError::PassState("draw failed".into()))
    }

    #[test]
    fn test_scope_closes_pass_on_error() {
        let mut backend = RecordingBackend::new(32, 32);
        backend.begin_frame().unwrap();
        assert!(failing_body(&mut backend).is_err());
        assert_eq!(backend.commands().last(), Some(&Command::EndPass));
        // the next pass can open, so nothing leaked
        let scope = PassScope::begin(&mut backend, &screen(32, 32)).unwrap();
        scope.finish().unwrap();
        backend.end_frame().unwrap();
    }

    #[test]
    fn test_shadow_passes_skip_color() {
        let mut backend = RecordingBackend::new(32, 32);
        let target = RenderTarget::new(&mut backend, "shadow", 64, 64, false, true).unwrap();
        let desc = directional_shadow(&target);
        assert!(!desc.color_write);
        assert!(desc.depth_test && desc.depth_write);
        assert_eq!(desc.viewport, Viewport::full(64, 64));

        let main_target = RenderTarget::new(&mut backend, "main", 32, 32, true, true).unwrap();
        let main = main_pass(&main_target, true);
        assert_eq!(main.clear_color, Some(BLACK));
        assert!(main.wireframe);
    }
}
