//! Rendering module
//!
//! A multi-pass forward renderer written against the [`RenderBackend`] trait.
//! [`WgpuBackend`] draws to a window; [`RecordingBackend`] records commands
//! and validates the frame protocol without a GPU.

pub mod backend;
mod camera;
mod engine;
mod lights;
mod material;
mod mesh;
pub mod passes;
mod pool;
pub mod postprocess;
pub mod programs;
mod scene;
mod shader;
mod shadow;
mod skybox;
mod target;
pub mod terrain;
mod texture;
pub mod units;

pub use backend::{RecordingBackend, RenderBackend, WgpuBackend};
pub use camera::Camera;
pub use engine::{FrameInput, FrameReport, RenderEngine, RenderOptions, RendererSettings};
pub use lights::{DirectionalLight, LightBase, LightSet, PointLight, SpotLight};
pub use material::Material;
pub use mesh::{Mesh, MeshData, Vertex};
pub use pool::{PoolIndex, ResourcePool};
pub use postprocess::{PingPong, PostProcessEffect, PostProcessSettings};
pub use scene::{Scene, SceneObject};
pub use shader::{ShaderProgram, UniformType, UniformValue};
pub use shadow::{ShadowConfig, ShadowTargets};
pub use skybox::{GradientSky, SkySource};
pub use target::{BufferId, RenderTarget, RenderTargets};
pub use terrain::TerrainSettings;
pub use texture::Texture;
