//! Offscreen render targets: the main scene buffer, the post-processing
//! ping-pong pair and the optional depth-visualization buffer

use super::backend::{
    Attachment, FramebufferDesc, FramebufferHandle, PassTarget, RenderBackend, TextureDesc, TextureFormat,
    Viewport,
};
use super::texture::Texture;
use crate::error::{RenderError, RenderResult};

/// Color format of every offscreen color target
pub const COLOR_FORMAT: TextureFormat = TextureFormat::Rgba8UnormSrgb;
/// Depth format of every depth attachment
pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// A complete framebuffer and the textures attached to it
#[derive(Debug)]
pub struct RenderTarget {
    pub label: &'static str,
    pub framebuffer: FramebufferHandle,
    pub color: Option<Texture>,
    pub depth: Option<Texture>,
    pub width: u32,
    pub height: u32,
}

impl RenderTarget {
    /// Allocate attachments and build a complete framebuffer.
    ///
    /// Nothing is leaked if any step fails.
    pub fn new<B: RenderBackend + ?Sized>(
        backend: &mut B,
        label: &'static str,
        width: u32,
        height: u32,
        with_color: bool,
        with_depth: bool,
    ) -> RenderResult<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidSize {
                label: label.to_string(),
                width,
                height,
            });
        }

        let mut color = None;
        let mut depth = None;
        let result = (|| {
            if with_color {
                color = Some(Self::attachment(backend, label, "color", width, height, COLOR_FORMAT)?);
            }
            if with_depth {
                depth = Some(Self::attachment(backend, label, "depth", width, height, DEPTH_FORMAT)?);
            }
            backend.create_framebuffer(&FramebufferDesc {
                label: label.to_string(),
                color: color.as_ref().map(|t: &Texture| Attachment::new(t.handle)),
                depth: depth.as_ref().map(|t: &Texture| Attachment::new(t.handle)),
            })
        })();

        match result {
            Ok(framebuffer) => Ok(Self {
                label,
                framebuffer,
                color,
                depth,
                width,
                height,
            }),
            Err(err) => {
                for texture in color.into_iter().chain(depth) {
                    if let Err(cleanup) = texture.destroy(backend) {
                        log::error!("Failed to release `{}` after error: {}", label, cleanup);
                    }
                }
                Err(err)
            }
        }
    }

    fn attachment<B: RenderBackend + ?Sized>(
        backend: &mut B,
        label: &str,
        role: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> RenderResult<Texture> {
        let desc = TextureDesc::attachment(format!("{label}_{role}"), width, height, format);
        let handle = backend.create_texture(&desc, None)?;
        Ok(Texture {
            handle,
            kind: desc.kind(),
            width,
            height,
            label: desc.label,
        })
    }

    #[must_use]
    pub fn pass_target(&self) -> PassTarget {
        PassTarget::Framebuffer(self.framebuffer)
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        Viewport::full(self.width, self.height)
    }

    /// Color attachment, or an error naming the target
    pub fn color_texture(&self) -> RenderResult<&Texture> {
        self.color
            .as_ref()
            .ok_or_else(|| RenderError::PassState(format!("`{}` has no color attachment", self.label)))
    }

    /// Depth attachment, or an error naming the target
    pub fn depth_texture(&self) -> RenderResult<&Texture> {
        self.depth
            .as_ref()
            .ok_or_else(|| RenderError::PassState(format!("`{}` has no depth attachment", self.label)))
    }

    /// Release the framebuffer, then its attachments
    pub fn destroy<B: RenderBackend + ?Sized>(self, backend: &mut B) -> RenderResult<()> {
        backend.destroy_framebuffer(self.framebuffer)?;
        for texture in self.color.into_iter().chain(self.depth) {
            texture.destroy(backend)?;
        }
        Ok(())
    }
}

/// Offscreen buffers addressable by the post-processing chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferId {
    Main,
    PingPongA,
    PingPongB,
}

impl BufferId {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::PingPongA => "ping_pong_a",
            Self::PingPongB => "ping_pong_b",
        }
    }
}

/// Owner of every framebuffer-sized target
#[derive(Debug, Default)]
pub struct RenderTargets {
    main: Option<RenderTarget>,
    ping_pong_a: Option<RenderTarget>,
    ping_pong_b: Option<RenderTarget>,
    depth_vis: Option<RenderTarget>,
    with_depth_vis: bool,
    size: Option<(u32, u32)>,
}

impl RenderTargets {
    /// Empty manager; `with_depth_vis` adds the depth-visualization buffer
    #[must_use]
    pub fn new(with_depth_vis: bool) -> Self {
        Self {
            with_depth_vis,
            ..Self::default()
        }
    }

    /// Create every target at `width` x `height`, replacing existing ones
    pub fn create_render_buffers<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidSize {
                label: "render buffers".to_string(),
                width,
                height,
            });
        }
        self.delete_render_buffers(backend)?;

        if let Err(err) = self.build(backend, width, height) {
            log::error!("Render buffer creation failed: {}", err);
            self.delete_render_buffers(backend)?;
            return Err(err);
        }
        self.size = Some((width, height));
        log::info!(
            "Render buffers created at {}x{}{}",
            width,
            height,
            if self.with_depth_vis { " with depth visualization" } else { "" }
        );
        Ok(())
    }

    fn build<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, width: u32, height: u32) -> RenderResult<()> {
        self.main = Some(RenderTarget::new(backend, "main_target", width, height, true, true)?);
        self.ping_pong_a = Some(RenderTarget::new(backend, "ping_pong_a", width, height, true, false)?);
        self.ping_pong_b = Some(RenderTarget::new(backend, "ping_pong_b", width, height, true, false)?);
        if self.with_depth_vis {
            self.depth_vis = Some(RenderTarget::new(backend, "depth_vis_target", width, height, true, true)?);
        }
        Ok(())
    }

    /// Release every target exactly once
    pub fn delete_render_buffers<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) -> RenderResult<()> {
        let targets = [
            self.main.take(),
            self.ping_pong_a.take(),
            self.ping_pong_b.take(),
            self.depth_vis.take(),
        ];
        self.size = None;
        for target in targets.into_iter().flatten() {
            target.destroy(backend)?;
        }
        Ok(())
    }

    /// Recreate the targets if the framebuffer size changed.
    ///
    /// Returns whether anything was recreated.
    pub fn ensure_size<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> RenderResult<bool> {
        if self.size == Some((width, height)) {
            return Ok(false);
        }
        log::debug!("Framebuffer size changed to {}x{}", width, height);
        self.create_render_buffers(backend, width, height)?;
        Ok(true)
    }

    /// One of the chain buffers
    pub fn get(&self, id: BufferId) -> RenderResult<&RenderTarget> {
        let target = match id {
            BufferId::Main => &self.main,
            BufferId::PingPongA => &self.ping_pong_a,
            BufferId::PingPongB => &self.ping_pong_b,
        };
        target
            .as_ref()
            .ok_or_else(|| RenderError::PassState(format!("{} buffer has not been created", id.name())))
    }

    /// Depth-visualization buffer, if configured and created
    #[must_use]
    pub fn depth_vis(&self) -> Option<&RenderTarget> {
        self.depth_vis.as_ref()
    }

    /// Current size, if created
    #[must_use]
    pub fn size(&self) -> Option<(u32, u32)> {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::RecordingBackend;

    #[test]
    fn test_buffers_match_requested_size() {
        let mut backend = RecordingBackend::new(800, 600);
        let mut targets = RenderTargets::new(true);
        targets.create_render_buffers(&mut backend, 800, 600).unwrap();

        for id in [BufferId::Main, BufferId::PingPongA, BufferId::PingPongB] {
            let target = targets.get(id).unwrap();
            assert_eq!((target.width, target.height), (800, 600));
            let info = backend.framebuffer_info(target.framebuffer).unwrap();
            assert_eq!((info.width, info.height), (800, 600));
        }
        assert!(targets.get(BufferId::Main).unwrap().depth.is_some());
        assert!(targets.get(BufferId::PingPongA).unwrap().depth.is_none());
        assert!(targets.depth_vis().is_some());
    }

    #[test]
    fn test_resize_frees_each_resource_once() {
        let mut backend = RecordingBackend::new(800, 600);
        let mut targets = RenderTargets::new(false);
        assert!(targets.ensure_size(&mut backend, 800, 600).unwrap());
        let before = backend.stats();
        // main color+depth, two ping-pong colors
        assert_eq!(before.live_textures, 4);
        assert_eq!(before.live_framebuffers, 3);

        assert!(!targets.ensure_size(&mut backend, 800, 600).unwrap());
        assert!(targets.ensure_size(&mut backend, 1024, 768).unwrap());

        let after = backend.stats();
        assert_eq!(after.textures_destroyed, 4);
        assert_eq!(after.framebuffers_destroyed, 3);
        assert_eq!(after.live_textures, 4);
        assert_eq!(targets.get(BufferId::PingPongB).unwrap().width, 1024);

        targets.delete_render_buffers(&mut backend).unwrap();
        targets.delete_render_buffers(&mut backend).unwrap();
        assert_eq!(backend.stats().textures_destroyed, 8);
        assert_eq!(backend.stats().live_framebuffers, 0);
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let mut backend = RecordingBackend::new(800, 600);
        let mut targets = RenderTargets::new(false);
        let err = targets.create_render_buffers(&mut backend, 0, 600).unwrap_err();
        assert!(matches!(err, RenderError::InvalidSize { .. }));
        assert!(targets.get(BufferId::Main).is_err());
        assert_eq!(backend.stats().live_textures, 0);
    }
}
