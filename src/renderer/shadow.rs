//! Shadow map targets
//!
//! The directional light renders into one 2D depth target. Every omni light
//! (point or spot) renders into a depth cube map with one framebuffer per
//! face; the fragment stage writes `distance / far_plane` as depth so the
//! main pass can compare linear distances.

use super::backend::{Attachment, FramebufferDesc, FramebufferHandle, PassTarget, RenderBackend, TextureDesc, Viewport};
use super::lights::LightSet;
use super::target::{RenderTarget, DEPTH_FORMAT};
use super::texture::Texture;
use super::units::{BoundTexture, OMNI_SHADOW_SLOTS};
use crate::error::{RenderError, RenderResult};

/// Shadow camera parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowConfig {
    /// Shadow map resolution (width and height, or cube face size)
    pub resolution: u32,
    /// Near plane for shadow camera
    pub near: f32,
    /// Far plane for shadow camera
    pub far: f32,
    /// Half-extent of the orthographic frustum; directional only
    pub frustum_size: f32,
    /// Depth bias subtracted before the main pass compares against the map;
    /// the directional light scales it up on surfaces facing away
    pub bias: f32,
}

impl ShadowConfig {
    /// Defaults for the directional light
    #[must_use]
    pub const fn directional() -> Self {
        Self {
            resolution: 2048,
            near: 0.1,
            far: 100.0,
            frustum_size: 20.0,
            bias: 0.005,
        }
    }

    /// Defaults for point and spot lights
    #[must_use]
    pub const fn omni() -> Self {
        Self {
            resolution: 1024,
            near: 0.1,
            far: 100.0,
            frustum_size: 0.0,
            bias: 0.05,
        }
    }

    #[must_use]
    pub const fn with_resolution(mut self, resolution: u32) -> Self {
        self.resolution = resolution;
        self
    }
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self::directional()
    }
}

/// Depth cube map plus a framebuffer per face
#[derive(Debug)]
pub struct OmniShadowMap {
    pub texture: Texture,
    faces: [FramebufferHandle; 6],
    pub size: u32,
}

impl OmniShadowMap {
    pub fn new<B: RenderBackend + ?Sized>(backend: &mut B, slot: usize, size: u32) -> RenderResult<Self> {
        if size == 0 {
            return Err(RenderError::InvalidSize {
                label: format!("omni_shadow_{slot}"),
                width: size,
                height: size,
            });
        }
        let desc = TextureDesc::cube(format!("omni_shadow_{slot}"), size, DEPTH_FORMAT, true);
        let handle = backend.create_texture(&desc, None)?;
        let texture = Texture {
            handle,
            kind: desc.kind(),
            width: size,
            height: size,
            label: desc.label,
        };

        let mut faces = Vec::with_capacity(6);
        for face in 0..6 {
            let created = backend.create_framebuffer(&FramebufferDesc {
                label: format!("{}_face{face}", texture.label),
                color: None,
                depth: Some(Attachment::face(texture.handle, face)),
            });
            match created {
                Ok(fb) => faces.push(fb),
                Err(err) => {
                    for fb in faces {
                        backend.destroy_framebuffer(fb)?;
                    }
                    texture.destroy(backend)?;
                    return Err(err);
                }
            }
        }
        let faces: [FramebufferHandle; 6] = faces
            .try_into()
            .map_err(|_| RenderError::PassState("omni shadow map needs six faces".to_string()))?;

        Ok(Self { texture, faces, size })
    }

    /// Render target of one cube face, in +X, -X, +Y, -Y, +Z, -Z order
    #[must_use]
    pub fn face_target(&self, face: usize) -> PassTarget {
        PassTarget::Framebuffer(self.faces[face])
    }

    #[must_use]
    pub const fn viewport(&self) -> Viewport {
        Viewport::full(self.size, self.size)
    }

    pub fn destroy<B: RenderBackend + ?Sized>(self, backend: &mut B) -> RenderResult<()> {
        for fb in self.faces {
            backend.destroy_framebuffer(fb)?;
        }
        self.texture.destroy(backend)
    }
}

/// Every shadow texture in the engine
#[derive(Debug)]
pub struct ShadowTargets {
    pub directional: RenderTarget,
    /// Indexed by omni slot
    omni: Vec<OmniShadowMap>,
    /// Sampled by omni units no light occupies
    pub placeholder: Texture,
}

impl ShadowTargets {
    pub fn new<B: RenderBackend + ?Sized>(backend: &mut B, directional_resolution: u32) -> RenderResult<Self> {
        let directional = Self::directional_target(backend, directional_resolution)?;
        let placeholder = Texture::placeholder_depth_cube(backend)?;
        Ok(Self {
            directional,
            omni: Vec::new(),
            placeholder,
        })
    }

    fn directional_target<B: RenderBackend + ?Sized>(backend: &mut B, resolution: u32) -> RenderResult<RenderTarget> {
        RenderTarget::new(backend, "directional_shadow", resolution, resolution, false, true)
    }

    /// Match the shadow textures to the current lights.
    ///
    /// Slots whose light changed resolution are rebuilt; slots no light uses
    /// any more are released.
    pub fn sync<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, lights: &LightSet) -> RenderResult<()> {
        let resolution = lights.directional.shadow.resolution;
        if self.directional.width != resolution {
            let rebuilt = Self::directional_target(backend, resolution)?;
            std::mem::replace(&mut self.directional, rebuilt).destroy(backend)?;
            log::debug!("Directional shadow map resized to {}", resolution);
        }

        let wanted: Vec<u32> = lights.omni_lights().map(|(_, l)| l.shadow.resolution).collect();
        while self.omni.len() > wanted.len() {
            if let Some(map) = self.omni.pop() {
                map.destroy(backend)?;
            }
        }
        for (slot, &size) in wanted.iter().enumerate().take(OMNI_SHADOW_SLOTS) {
            match self.omni.get(slot).map(|map| map.size) {
                Some(current) if current == size => {}
                Some(_) => {
                    let rebuilt = OmniShadowMap::new(backend, slot, size)?;
                    std::mem::replace(&mut self.omni[slot], rebuilt).destroy(backend)?;
                }
                None => {
                    self.omni.push(OmniShadowMap::new(backend, slot, size)?);
                    log::debug!("Created omni shadow map for slot {} ({}x{})", slot, size, size);
                }
            }
        }
        Ok(())
    }

    /// Shadow map for an omni slot
    pub fn omni(&self, slot: usize) -> RenderResult<&OmniShadowMap> {
        self.omni
            .get(slot)
            .ok_or_else(|| RenderError::PassState(format!("omni shadow slot {slot} has no shadow map")))
    }

    /// Texture an omni unit should hold: the slot's map, or the placeholder
    #[must_use]
    pub fn omni_binding(&self, slot: usize) -> BoundTexture {
        self.omni
            .get(slot)
            .map_or_else(|| self.placeholder.bound(), |map| map.texture.bound())
    }

    #[must_use]
    pub fn omni_count(&self) -> usize {
        self.omni.len()
    }

    pub fn directional_depth(&self) -> RenderResult<&Texture> {
        self.directional.depth_texture()
    }

    pub fn destroy<B: RenderBackend + ?Sized>(self, backend: &mut B) -> RenderResult<()> {
        self.directional.destroy(backend)?;
        for map in self.omni {
            map.destroy(backend)?;
        }
        self.placeholder.destroy(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::{RecordingBackend, TextureKind};
    use crate::renderer::lights::{LightBase, PointLight};
    use glam::Vec3;

    fn point(resolution: u32) -> PointLight {
        PointLight::new(LightBase::default(), Vec3::ZERO).with_shadow(ShadowConfig::omni().with_resolution(resolution))
    }

    #[test]
    fn test_omni_map_has_six_complete_faces() {
        let mut backend = RecordingBackend::new(64, 64);
        let map = OmniShadowMap::new(&mut backend, 0, 256).unwrap();
        assert_eq!(map.texture.kind, TextureKind::DepthCube);
        for face in 0..6 {
            let PassTarget::Framebuffer(fb) = map.face_target(face) else {
                panic!("face {face} targets the screen");
            };
            let info = backend.framebuffer_info(fb).unwrap();
            assert_eq!((info.width, info.height), (256, 256));
            assert_eq!(info.color_format, None);
        }
        map.destroy(&mut backend).unwrap();
        assert_eq!(backend.stats().live_framebuffers, 0);
        assert_eq!(backend.stats().live_textures, 0);
    }

    #[test]
    fn test_sync_follows_lights() {
        let mut backend = RecordingBackend::new(64, 64);
        let mut shadows = ShadowTargets::new(&mut backend, 512).unwrap();
        let mut lights = LightSet::default();
        lights.directional.shadow.resolution = 512;
        lights.add_point_light(point(128));
        lights.add_point_light(point(128));

        shadows.sync(&mut backend, &lights).unwrap();
        assert_eq!(shadows.omni_count(), 2);
        assert_ne!(shadows.omni_binding(1), shadows.placeholder.bound());
        assert_eq!(shadows.omni_binding(2), shadows.placeholder.bound());

        lights.point_lights_mut()[1].shadow.resolution = 64;
        shadows.sync(&mut backend, &lights).unwrap();
        assert_eq!(shadows.omni(1).unwrap().size, 64);

        lights.clear_omni();
        shadows.sync(&mut backend, &lights).unwrap();
        assert_eq!(shadows.omni_count(), 0);
        assert!(shadows.omni(0).is_err());

        shadows.destroy(&mut backend).unwrap();
        assert_eq!(backend.stats().live_textures, 0);
        assert_eq!(backend.stats().live_framebuffers, 0);
    }
}
