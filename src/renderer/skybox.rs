//! Cube-mapped skybox
//!
//! The sky is either six face images or a procedural gradient baked into a
//! cube map at startup. It is drawn first in the main pass, at the far plane,
//! without writing depth.

use std::path::PathBuf;

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use super::backend::{DepthCompare, DepthState, RenderBackend, SamplerType};
use super::mesh::{Mesh, MeshData};
use super::shader::{ShaderProgram, UniformType};
use super::texture::Texture;
use super::units::{TextureUnits, SCREEN_TEXTURE_UNIT};
use crate::error::{RenderError, RenderResult};

const SKYBOX_SHADER: &str = include_str!("shaders/skybox.wgsl");
const SKYBOX_SAMPLER: &str = "s_skybox";

/// Gradient skybox colors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientSky {
    /// Top/zenith color
    pub zenith_color: [f32; 3],
    /// Horizon color
    pub horizon_color: [f32; 3],
    /// Ground/nadir color
    pub ground_color: [f32; 3],
}

impl Default for GradientSky {
    fn default() -> Self {
        Self {
            zenith_color: [0.1, 0.2, 0.5],
            horizon_color: [0.5, 0.7, 1.0],
            ground_color: [0.3, 0.25, 0.2],
        }
    }
}

impl GradientSky {
    /// Color seen along `direction`
    #[must_use]
    pub fn sample(&self, direction: Vec3) -> Vec3 {
        let y = direction.normalize_or(Vec3::Y).y;
        let horizon = Vec3::from(self.horizon_color);
        if y >= 0.0 {
            horizon.lerp(Vec3::from(self.zenith_color), y.powf(0.6))
        } else {
            horizon.lerp(Vec3::from(self.ground_color), (-y).powf(0.4))
        }
    }

    /// RGBA8 texels for six `size` x `size` faces in +X, -X, +Y, -Y, +Z, -Z order
    #[must_use]
    pub fn bake(&self, size: u32) -> [Vec<u8>; 6] {
        std::array::from_fn(|face| {
            let mut texels = Vec::with_capacity((size * size * 4) as usize);
            for row in 0..size {
                for col in 0..size {
                    let u = 2.0 * (col as f32 + 0.5) / size as f32 - 1.0;
                    let v = 2.0 * (row as f32 + 0.5) / size as f32 - 1.0;
                    let color = self.sample(face_direction(face, u, v));
                    texels.extend(color.to_array().map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8));
                    texels.push(255);
                }
            }
            texels
        })
    }
}

/// Direction through texel (u, v) in [-1, 1]² of a cube face; v grows downward
fn face_direction(face: usize, u: f32, v: f32) -> Vec3 {
    match face {
        0 => Vec3::new(1.0, -v, -u),
        1 => Vec3::new(-1.0, -v, u),
        2 => Vec3::new(u, 1.0, v),
        3 => Vec3::new(u, -1.0, -v),
        4 => Vec3::new(u, -v, 1.0),
        _ => Vec3::new(-u, -v, -1.0),
    }
}

/// Where the sky comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SkySource {
    /// Procedural gradient baked at `face_size`
    Gradient { sky: GradientSky, face_size: u32 },
    /// Six images in +X, -X, +Y, -Y, +Z, -Z order
    Faces([PathBuf; 6]),
}

impl Default for SkySource {
    fn default() -> Self {
        Self::Gradient {
            sky: GradientSky::default(),
            face_size: 64,
        }
    }
}

/// Skybox program, cube map and cube mesh
#[derive(Debug)]
pub struct Skybox {
    program: ShaderProgram,
    cube_map: Texture,
    mesh: Mesh,
}

impl Skybox {
    pub fn new<B: RenderBackend + ?Sized>(backend: &mut B, source: &SkySource) -> RenderResult<Self> {
        let mut program = ShaderProgram::compile(backend, "skybox", SKYBOX_SHADER)?;
        program.register_uniform(UniformType::Mat4, "u_projection")?;
        program.register_uniform(UniformType::Mat4, "u_view")?;
        program.register_sampler(SamplerType::TextureCube, SKYBOX_SAMPLER)?;
        program.set_depth_state(DepthState {
            write: false,
            compare: DepthCompare::LessEqual,
        })?;
        program.link(backend)?;

        let cube_map = match source {
            SkySource::Gradient { sky, face_size } => {
                Texture::cube_from_faces(backend, &sky.bake(*face_size), *face_size, "skybox")?
            }
            SkySource::Faces(paths) => Self::load_faces(backend, paths)?,
        };
        let mesh = MeshData::cube().flip_winding().upload(backend, "skybox_cube")?;
        log::info!("Skybox ready ({}x{} faces)", cube_map.width, cube_map.height);

        Ok(Self {
            program,
            cube_map,
            mesh,
        })
    }

    fn load_faces<B: RenderBackend + ?Sized>(backend: &mut B, paths: &[PathBuf; 6]) -> RenderResult<Texture> {
        let mut size = None;
        let mut faces: [Vec<u8>; 6] = Default::default();
        for (face, path) in faces.iter_mut().zip(paths) {
            let img = image::open(path).map_err(|e| RenderError::TextureLoad(format!("{}: {e}", path.display())))?;
            let rgba = img.to_rgba8();
            let (w, h) = rgba.dimensions();
            if w != h || size.is_some_and(|s| s != w) {
                return Err(RenderError::TextureLoad(format!(
                    "{}: skybox faces must be square and equal in size, got {}x{}",
                    path.display(),
                    w,
                    h
                )));
            }
            size = Some(w);
            *face = rgba.into_raw();
        }
        let size = size.unwrap_or(1);
        Texture::cube_from_faces(backend, &faces, size, "skybox")
    }

    /// Draw into the open main pass
    pub fn draw<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        units: &mut TextureUnits,
        view: Mat4,
        projection: Mat4,
    ) -> RenderResult<()> {
        self.program.set_uniform("u_projection", projection)?;
        self.program.set_uniform("u_view", view)?;
        self.program
            .bind_sampler(units, SKYBOX_SAMPLER, SCREEN_TEXTURE_UNIT, self.cube_map.bound())?;
        self.program.validate(units)?;
        self.program.draw(backend, units, self.mesh.handle)
    }

    pub fn destroy<B: RenderBackend + ?Sized>(self, backend: &mut B) -> RenderResult<()> {
        self.program.destroy(backend)?;
        self.cube_map.destroy(backend)?;
        self.mesh.destroy(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::{PassDesc, PassTarget, RecordingBackend, TextureKind, Viewport};

    #[test]
    fn test_face_directions_point_along_their_axis() {
        let axes = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];
        for (face, axis) in axes.iter().enumerate() {
            assert_eq!(face_direction(face, 0.0, 0.0).normalize(), *axis);
        }
        // the top row of a side face looks upward
        assert!(face_direction(4, 0.0, -1.0).y > 0.0);
    }

    #[test]
    fn test_gradient_bakes_zenith_on_top_face() {
        let sky = GradientSky::default();
        let faces = sky.bake(4);
        assert!(faces.iter().all(|f| f.len() == 4 * 4 * 4));

        let top_center = &faces[2][(2 * 4 + 2) * 4..(2 * 4 + 2) * 4 + 3];
        let bottom_center = &faces[3][(2 * 4 + 2) * 4..(2 * 4 + 2) * 4 + 3];
        // zenith is bluer than the ground
        assert!(top_center[2] > bottom_center[2]);
    }

    #[test]
    fn test_skybox_draws_cube_map_at_unit_zero() {
        let mut backend = RecordingBackend::new(32, 32);
        let mut skybox = Skybox::new(&mut backend, &SkySource::default()).unwrap();
        let mut units = TextureUnits::new();

        backend.begin_frame().unwrap();
        backend
            .begin_pass(&PassDesc::new("main", PassTarget::Screen, Viewport::full(32, 32)))
            .unwrap();
        skybox
            .draw(&mut backend, &mut units, Mat4::IDENTITY, Mat4::IDENTITY)
            .unwrap();
        backend.end_pass().unwrap();
        backend.end_frame().unwrap();

        assert_eq!(units.get(SCREEN_TEXTURE_UNIT).map(|b| b.kind), Some(TextureKind::ColorCube));
        skybox.destroy(&mut backend).unwrap();
        assert_eq!(backend.stats().live_textures, 0);
    }
}
