//! Multi-pass forward renderer
//!
//! This crate provides:
//! - a frame scheduler running depth, shadow, main, post-processing and blit passes
//! - a shader program registry with named uniforms and samplers
//! - a wgpu backend for windows and a recording backend for headless runs
//! - a winit engine loop with keyboard bindings for the renderer settings

pub mod config;
pub mod core;
pub mod demo;
pub mod error;
pub mod input;
pub mod logging;
pub mod renderer;

// Re-exports for convenience
pub use glam;
pub use wgpu;
pub use winit;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::config::{ConfigError, EngineConfig};
    pub use crate::core::{DebugInfo, Engine, EngineContext, FrameStats, Game, Time, WindowRenderer};
    pub use crate::error::{RenderError, RenderResult};
    pub use crate::input::Input;
    pub use crate::renderer::{
        Camera, DirectionalLight, FrameReport, LightBase, LightSet, Material, Mesh, MeshData, PointLight,
        PostProcessEffect, RenderOptions, RendererSettings, Scene, SceneObject, SpotLight, Vertex,
    };
    pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
    pub use winit::keyboard::KeyCode;
}
