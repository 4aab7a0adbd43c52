//! Height-mapped terrain split into square patches
//!
//! The terrain covers `scale_xz` x `scale_xz` world units centered on the
//! origin and is cut into `root_patches`² patches. Each frame every patch
//! picks a level of detail from its distance to the camera: LOD `k` is the
//! number of configured ranges the distance has passed, and the patch draws
//! a grid of `tessellation_factor >> k` quads per side.

use std::path::{Path, PathBuf};

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use super::backend::{RenderBackend, SamplerType, TextureFormat};
use super::camera::Camera;
use super::mesh::{Mesh, MeshData};
use super::scene::NORMAL_SAMPLER;
use super::shader::{ShaderProgram, UniformType};
use super::texture::Texture;
use super::units::{TextureUnits, HEIGHTMAP_TEXTURE_UNIT, NORMAL_TEXTURE_UNIT};
use crate::error::{RenderError, RenderResult};

const TERRAIN_SHADER: &str = include_str!("shaders/terrain.wgsl");
const HEIGHTMAP_SAMPLER: &str = "s_heightmap";

/// Number of LOD distance thresholds
pub const LOD_LEVELS: usize = 8;

/// Size of the height map generated when no file is configured
const GENERATED_HEIGHTMAP_SIZE: u32 = 128;

pub const DEFAULT_TESSELLATION_FACTOR: u32 = 8;
pub const MAX_TESSELLATION_FACTOR: u32 = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainSettings {
    /// Patches per side
    pub root_patches: u32,
    /// World extent on X and Z
    pub scale_xz: f32,
    /// World height of a white height-map texel
    pub scale_y: f32,
    /// Distance thresholds, finest first; zero entries are unused
    pub lod_ranges: [u32; LOD_LEVELS],
    /// Quads per patch side at LOD 0
    pub tessellation_factor: u32,
    /// Grayscale height map; generated when absent
    pub heightmap: Option<PathBuf>,
    /// Normal map; derived from the height map when absent
    pub normal_map: Option<PathBuf>,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            root_patches: 8,
            scale_xz: 100.0,
            scale_y: 30.0,
            lod_ranges: [30, 15, 5, 2, 0, 0, 0, 0],
            tessellation_factor: DEFAULT_TESSELLATION_FACTOR,
            heightmap: None,
            normal_map: None,
        }
    }
}

/// LOD for a patch `distance` away from the camera
#[must_use]
pub fn select_lod(lod_ranges: &[u32; LOD_LEVELS], distance: f32) -> usize {
    lod_ranges
        .iter()
        .filter(|&&range| range > 0 && distance >= range as f32)
        .count()
}

/// Quads per side drawn at `lod`; never below one
#[must_use]
pub fn lod_resolution(tessellation_factor: u32, lod: usize) -> u32 {
    tessellation_factor
        .checked_shr(lod as u32)
        .unwrap_or(0)
        .max(1)
}

/// Heights in [0, 1], row-major
#[derive(Debug, Clone)]
struct HeightField {
    size: u32,
    heights: Vec<f32>,
}

impl HeightField {
    fn generated(size: u32) -> Self {
        let mut heights = Vec::with_capacity((size * size) as usize);
        for z in 0..size {
            for x in 0..size {
                let (u, v) = (x as f32 / size as f32, z as f32 / size as f32);
                let tau = std::f32::consts::TAU;
                let h = 0.5
                    + 0.25 * (u * tau * 1.5).sin() * (v * tau).cos()
                    + 0.12 * (u * tau * 4.0 + v * tau * 3.0).sin()
                    + 0.05 * (v * tau * 9.0).cos();
                heights.push(h.clamp(0.0, 1.0));
            }
        }
        Self { size, heights }
    }

    fn from_path(path: &Path) -> RenderResult<Self> {
        let img = image::open(path)
            .map_err(|e| RenderError::TextureLoad(format!("{}: {e}", path.display())))?
            .to_luma8();
        let (width, height) = img.dimensions();
        if width != height || width == 0 {
            return Err(RenderError::TextureLoad(format!(
                "{}: height map must be square, got {}x{}",
                path.display(),
                width,
                height
            )));
        }
        Ok(Self {
            size: width,
            heights: img.pixels().map(|p| f32::from(p.0[0]) / 255.0).collect(),
        })
    }

    fn at(&self, x: i64, z: i64) -> f32 {
        let max = i64::from(self.size) - 1;
        let (x, z) = (x.clamp(0, max), z.clamp(0, max));
        self.heights[(z * i64::from(self.size) + x) as usize]
    }

    fn to_rgba(&self) -> Vec<u8> {
        self.heights
            .iter()
            .flat_map(|&h| {
                let c = (h * 255.0).round() as u8;
                [c, c, c, 255]
            })
            .collect()
    }

    /// Central-difference normals encoded with +Y in the blue channel
    fn normals_rgba(&self, scale_xz: f32, scale_y: f32) -> Vec<u8> {
        let texel = scale_xz / self.size as f32;
        let mut out = Vec::with_capacity(self.heights.len() * 4);
        for z in 0..i64::from(self.size) {
            for x in 0..i64::from(self.size) {
                let dx = (self.at(x + 1, z) - self.at(x - 1, z)) * scale_y;
                let dz = (self.at(x, z + 1) - self.at(x, z - 1)) * scale_y;
                let n = Vec3::new(-dx, 2.0 * texel, -dz).normalize_or(Vec3::Y);
                let encode = |c: f32| ((c * 0.5 + 0.5) * 255.0).round() as u8;
                out.extend_from_slice(&[encode(n.x), encode(n.z), encode(n.y), 255]);
            }
        }
        out
    }
}

/// Terrain program, maps and per-LOD patch meshes
#[derive(Debug)]
pub struct Terrain {
    settings: TerrainSettings,
    program: ShaderProgram,
    heightmap: Texture,
    normal_map: Texture,
    /// Indexed by LOD
    meshes: Vec<Mesh>,
}

impl Terrain {
    pub fn new<B: RenderBackend + ?Sized>(backend: &mut B, settings: TerrainSettings) -> RenderResult<Self> {
        let mut program = ShaderProgram::compile(backend, "terrain", TERRAIN_SHADER)?;
        program.register_uniform(UniformType::Mat4, "u_viewProjection")?;
        program.register_uniform(UniformType::Mat4, "u_worldMatrix")?;
        program.register_uniform(UniformType::Mat4, "u_localMatrix")?;
        program.register_uniform(UniformType::Vec3, "u_lightDirection")?;
        program.register_uniform(UniformType::Float, "u_scaleY")?;
        program.register_uniform(UniformType::Int, "u_lod")?;
        program.register_sampler(SamplerType::Texture2d, HEIGHTMAP_SAMPLER)?;
        program.register_sampler(SamplerType::Texture2d, NORMAL_SAMPLER)?;
        program.link(backend)?;

        let field = match &settings.heightmap {
            Some(path) => HeightField::from_path(path)?,
            None => HeightField::generated(GENERATED_HEIGHTMAP_SIZE),
        };
        let heightmap = Texture::from_rgba(
            backend,
            &field.to_rgba(),
            field.size,
            field.size,
            "terrain_heightmap",
            TextureFormat::Rgba8Unorm,
        )?;
        let normal_map = match &settings.normal_map {
            Some(path) => Texture::from_path(backend, path, TextureFormat::Rgba8Unorm)?,
            None => Texture::from_rgba(
                backend,
                &field.normals_rgba(settings.scale_xz, settings.scale_y),
                field.size,
                field.size,
                "terrain_normal",
                TextureFormat::Rgba8Unorm,
            )?,
        };

        let meshes = Self::build_meshes(backend, settings.tessellation_factor)?;
        log::info!(
            "Terrain ready: {}x{} patches, tessellation factor {}",
            settings.root_patches,
            settings.root_patches,
            settings.tessellation_factor
        );

        Ok(Self {
            settings,
            program,
            heightmap,
            normal_map,
            meshes,
        })
    }

    fn build_meshes<B: RenderBackend + ?Sized>(backend: &mut B, factor: u32) -> RenderResult<Vec<Mesh>> {
        (0..=LOD_LEVELS)
            .map(|lod| MeshData::patch_grid(lod_resolution(factor, lod)).upload(backend, "terrain_patch"))
            .collect()
    }

    #[must_use]
    pub fn settings(&self) -> &TerrainSettings {
        &self.settings
    }

    /// Change the base patch resolution, regenerating the patch meshes
    pub fn set_tessellation_factor<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        factor: u32,
    ) -> RenderResult<()> {
        if factor == self.settings.tessellation_factor {
            return Ok(());
        }
        let rebuilt = Self::build_meshes(backend, factor)?;
        for mesh in std::mem::replace(&mut self.meshes, rebuilt) {
            mesh.destroy(backend)?;
        }
        self.settings.tessellation_factor = factor;
        log::debug!("Terrain tessellation factor set to {}", factor);
        Ok(())
    }

    fn world_matrix(&self) -> Mat4 {
        let half = self.settings.scale_xz / 2.0;
        Mat4::from_translation(Vec3::new(-half, 0.0, -half))
            * Mat4::from_scale(Vec3::new(self.settings.scale_xz, 1.0, self.settings.scale_xz))
    }

    /// Placement of patch (`i`, `j`) inside the unit square
    fn local_matrix(&self, i: u32, j: u32) -> Mat4 {
        let step = 1.0 / self.settings.root_patches.max(1) as f32;
        Mat4::from_translation(Vec3::new(i as f32 * step, 0.0, j as f32 * step))
            * Mat4::from_scale(Vec3::new(step, 1.0, step))
    }

    /// LOD of every patch for a camera at `eye`, row-major by `j`
    #[must_use]
    pub fn patch_lods(&self, eye: Vec3) -> Vec<usize> {
        let world = self.world_matrix();
        let n = self.settings.root_patches;
        let mut lods = Vec::with_capacity((n * n) as usize);
        for j in 0..n {
            for i in 0..n {
                let center = (world * self.local_matrix(i, j)).transform_point3(Vec3::new(0.5, 0.0, 0.5));
                lods.push(select_lod(&self.settings.lod_ranges, center.distance(eye)));
            }
        }
        lods
    }

    /// Draw every patch into the open main pass; returns the number of draws
    pub fn render<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        units: &mut TextureUnits,
        camera: &Camera,
        light_direction: Vec3,
    ) -> RenderResult<u32> {
        self.program
            .set_uniform("u_viewProjection", camera.view_projection_matrix())?;
        self.program.set_uniform("u_worldMatrix", self.world_matrix())?;
        self.program.set_uniform("u_lightDirection", light_direction)?;
        self.program.set_uniform("u_scaleY", self.settings.scale_y)?;
        self.program
            .bind_sampler(units, HEIGHTMAP_SAMPLER, HEIGHTMAP_TEXTURE_UNIT, self.heightmap.bound())?;
        self.program
            .bind_sampler(units, NORMAL_SAMPLER, NORMAL_TEXTURE_UNIT, self.normal_map.bound())?;
        self.program.validate(units)?;

        let lods = self.patch_lods(camera.position);
        let n = self.settings.root_patches;
        let mut draws = 0;
        for j in 0..n {
            for i in 0..n {
                let lod = lods[(j * n + i) as usize];
                let mesh = self.meshes[lod.min(LOD_LEVELS)];
                self.program.set_uniform("u_localMatrix", self.local_matrix(i, j))?;
                self.program.set_uniform("u_lod", lod as i32)?;
                self.program.draw(backend, units, mesh.handle)?;
                draws += 1;
            }
        }
        Ok(draws)
    }

    pub fn destroy<B: RenderBackend + ?Sized>(self, backend: &mut B) -> RenderResult<()> {
        self.program.destroy(backend)?;
        self.heightmap.destroy(backend)?;
        self.normal_map.destroy(backend)?;
        for mesh in self.meshes {
            mesh.destroy(backend)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::{PassDesc, PassTarget, RecordingBackend, Viewport};

    #[test]
    fn test_lod_grows_with_distance() {
        let ranges = TerrainSettings::default().lod_ranges;
        assert_eq!(select_lod(&ranges, 1.0), 0);
        assert_eq!(select_lod(&ranges, 3.0), 1);
        assert_eq!(select_lod(&ranges, 10.0), 2);
        assert_eq!(select_lod(&ranges, 20.0), 3);
        assert_eq!(select_lod(&ranges, 500.0), 4);
    }

    #[test]
    fn test_resolution_halves_per_lod() {
        assert_eq!(lod_resolution(8, 0), 8);
        assert_eq!(lod_resolution(8, 1), 4);
        assert_eq!(lod_resolution(8, 3), 1);
        assert_eq!(lod_resolution(8, 4), 1);
        assert_eq!(lod_resolution(0, 0), 1);
    }

    #[test]
    fn test_factor_change_regenerates_meshes() {
        let mut backend = RecordingBackend::new(32, 32);
        let mut terrain = Terrain::new(&mut backend, TerrainSettings::default()).unwrap();
        let meshes = backend.stats().live_meshes;
        assert_eq!(meshes, LOD_LEVELS + 1);

        terrain.set_tessellation_factor(&mut backend, 4).unwrap();
        assert_eq!(terrain.settings().tessellation_factor, 4);
        assert_eq!(backend.stats().live_meshes, meshes);

        terrain.destroy(&mut backend).unwrap();
        assert_eq!(backend.stats().live_meshes, 0);
        assert_eq!(backend.stats().live_textures, 0);
    }

    #[test]
    fn test_render_binds_maps_and_draws_every_patch() {
        let mut backend = RecordingBackend::new(32, 32);
        let settings = TerrainSettings {
            root_patches: 2,
            ..TerrainSettings::default()
        };
        let mut terrain = Terrain::new(&mut backend, settings).unwrap();
        let mut units = TextureUnits::new();
        let camera = Camera::default();

        let lods = terrain.patch_lods(Vec3::new(-25.0, 0.0, -25.0));
        // the camera sits over the first patch
        assert_eq!(lods[0], 0);
        assert!(lods[3] > lods[0]);

        backend.begin_frame().unwrap();
        backend
            .begin_pass(&PassDesc::new("main", PassTarget::Screen, Viewport::full(32, 32)))
            .unwrap();
        let draws = terrain
            .render(&mut backend, &mut units, &camera, Vec3::NEG_Y)
            .unwrap();
        backend.end_pass().unwrap();
        backend.end_frame().unwrap();

        assert_eq!(draws, 4);
        assert_eq!(units.get(HEIGHTMAP_TEXTURE_UNIT), Some(terrain.heightmap.bound()));
        assert_eq!(units.get(NORMAL_TEXTURE_UNIT), Some(terrain.normal_map.bound()));
    }
}
