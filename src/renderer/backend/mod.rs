//! GPU backend abstraction
//!
//! The pass scheduler never talks to wgpu directly. Everything it needs from
//! the GPU goes through [`RenderBackend`]:
//!
//! - resource lifetime (textures, framebuffers, programs, meshes)
//! - frame and pass bracketing
//! - draws with a staged uniform block and resolved sampler textures
//!
//! [`WgpuBackend`] drives a real device. [`RecordingBackend`] keeps the same
//! bookkeeping without a GPU and records every call, which is what the frame
//! tests and the `--dry-run` mode run against.

mod recording;
mod wgpu_backend;

pub use recording::{Command, RecordingBackend, ResourceStats};
pub use wgpu_backend::WgpuBackend;

use smallvec::SmallVec;

use super::pool::PoolIndex;
use crate::error::{RenderError, RenderResult};

macro_rules! resource_handle {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) PoolIndex);

        impl $name {
            pub(crate) const KIND: &'static str = $kind;

            pub(crate) fn unknown() -> RenderError {
                RenderError::UnknownHandle { kind: Self::KIND }
            }
        }
    };
}

resource_handle!(
    /// Handle to a backend texture
    TextureHandle,
    "texture"
);
resource_handle!(
    /// Handle to a set of render attachments
    FramebufferHandle,
    "framebuffer"
);
resource_handle!(
    /// Handle to a compiled shader program
    ProgramHandle,
    "program"
);
resource_handle!(
    /// Handle to an uploaded vertex/index buffer pair
    MeshHandle,
    "mesh"
);

// ============================================================================
// Textures
// ============================================================================

/// Texel formats the renderer allocates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// Linear 8-bit RGBA, for data textures such as normal and height maps
    Rgba8Unorm,
    /// sRGB 8-bit RGBA, for color render targets and images
    Rgba8UnormSrgb,
    /// 32-bit float depth
    Depth32Float,
}

impl TextureFormat {
    /// Whether this is a depth format
    #[must_use]
    pub const fn is_depth(self) -> bool {
        matches!(self, Self::Depth32Float)
    }

    /// Bytes per texel
    #[must_use]
    pub const fn bytes_per_texel(self) -> u32 {
        4
    }

    pub(crate) const fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            Self::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            Self::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            Self::Depth32Float => wgpu::TextureFormat::Depth32Float,
        }
    }
}

/// 2D texture or cube map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D2,
    Cube,
}

impl TextureDimension {
    /// Number of array layers
    #[must_use]
    pub const fn layers(self) -> u32 {
        match self {
            Self::D2 => 1,
            Self::Cube => 6,
        }
    }
}

/// What kind of texture a unit holds, as seen by sampler validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Color2d,
    ColorCube,
    Depth2d,
    DepthCube,
}

impl TextureKind {
    /// Human-readable name for error messages
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Color2d => "2D color texture",
            Self::ColorCube => "color cube map",
            Self::Depth2d => "2D depth texture",
            Self::DepthCube => "depth cube map",
        }
    }
}

/// Addressing outside [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Repeat,
    ClampToEdge,
}

/// Texture creation parameters
#[derive(Debug, Clone)]
pub struct TextureDesc {
    /// Debug label
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub dimension: TextureDimension,
    /// Can be attached to a framebuffer
    pub render_target: bool,
    /// Wrapping used by the sampler created alongside the texture
    pub address_mode: AddressMode,
}

impl TextureDesc {
    /// Sampled 2D texture with repeat addressing
    #[must_use]
    pub fn sampled_2d(label: impl Into<String>, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            format,
            dimension: TextureDimension::D2,
            render_target: false,
            address_mode: AddressMode::Repeat,
        }
    }

    /// Renderable 2D attachment with clamped addressing
    #[must_use]
    pub fn attachment(label: impl Into<String>, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            format,
            dimension: TextureDimension::D2,
            render_target: true,
            address_mode: AddressMode::ClampToEdge,
        }
    }

    /// Cube map with square faces
    #[must_use]
    pub fn cube(label: impl Into<String>, size: u32, format: TextureFormat, render_target: bool) -> Self {
        Self {
            label: label.into(),
            width: size,
            height: size,
            format,
            dimension: TextureDimension::Cube,
            render_target,
            address_mode: AddressMode::ClampToEdge,
        }
    }

    /// Kind used for sampler validation
    #[must_use]
    pub fn kind(&self) -> TextureKind {
        self.info().kind()
    }

    /// Expected byte length of initial data (all layers)
    #[must_use]
    pub const fn data_len(&self) -> usize {
        (self.width * self.height * self.format.bytes_per_texel() * self.dimension.layers()) as usize
    }

    pub(crate) fn info(&self) -> TextureInfo {
        TextureInfo {
            width: self.width,
            height: self.height,
            format: self.format,
            dimension: self.dimension,
            render_target: self.render_target,
        }
    }
}

/// Properties of a live texture that framebuffer checks need
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub dimension: TextureDimension,
    pub render_target: bool,
}

impl TextureInfo {
    /// Kind used for sampler validation
    #[must_use]
    pub const fn kind(&self) -> TextureKind {
        match (self.format.is_depth(), self.dimension) {
            (false, TextureDimension::D2) => TextureKind::Color2d,
            (false, TextureDimension::Cube) => TextureKind::ColorCube,
            (true, TextureDimension::D2) => TextureKind::Depth2d,
            (true, TextureDimension::Cube) => TextureKind::DepthCube,
        }
    }
}

// ============================================================================
// Framebuffers
// ============================================================================

/// One texture layer attached to a framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    pub texture: TextureHandle,
    /// Array layer; cube faces are layers 0..6
    pub layer: u32,
}

impl Attachment {
    /// First layer of a texture
    #[must_use]
    pub const fn new(texture: TextureHandle) -> Self {
        Self { texture, layer: 0 }
    }

    /// A specific cube face
    #[must_use]
    pub const fn face(texture: TextureHandle, face: u32) -> Self {
        Self {
            texture,
            layer: face,
        }
    }
}

/// Framebuffer attachments
#[derive(Debug, Clone)]
pub struct FramebufferDesc {
    pub label: String,
    pub color: Option<Attachment>,
    pub depth: Option<Attachment>,
}

/// Formats and size of a complete framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferInfo {
    pub width: u32,
    pub height: u32,
    pub color_format: Option<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
}

/// Completeness check shared by every backend.
///
/// `lookup` resolves a texture handle to its properties, or `None` if the
/// handle is not live.
pub fn check_completeness(
    desc: &FramebufferDesc,
    lookup: impl Fn(TextureHandle) -> Option<TextureInfo>,
) -> RenderResult<FramebufferInfo> {
    if desc.color.is_none() && desc.depth.is_none() {
        return Err(RenderError::incomplete(&desc.label, "no attachments"));
    }

    let mut size: Option<(u32, u32)> = None;
    let mut check = |attachment: &Attachment, want_depth: bool| -> RenderResult<TextureFormat> {
        let role = if want_depth { "depth" } else { "color" };
        let info = lookup(attachment.texture).ok_or_else(|| {
            RenderError::incomplete(&desc.label, format!("{role} attachment references a released texture"))
        })?;
        if info.format.is_depth() != want_depth {
            return Err(RenderError::incomplete(
                &desc.label,
                format!("{role} attachment has format {:?}", info.format),
            ));
        }
        if !info.render_target {
            return Err(RenderError::incomplete(
                &desc.label,
                format!("{role} attachment was not created as a render target"),
            ));
        }
        if attachment.layer >= info.dimension.layers() {
            return Err(RenderError::incomplete(
                &desc.label,
                format!("{role} attachment layer {} out of range", attachment.layer),
            ));
        }
        if info.width == 0 || info.height == 0 {
            return Err(RenderError::incomplete(&desc.label, format!("{role} attachment is zero-sized")));
        }
        match size {
            None => size = Some((info.width, info.height)),
            Some((w, h)) if (w, h) != (info.width, info.height) => {
                return Err(RenderError::incomplete(
                    &desc.label,
                    format!(
                        "attachment sizes differ ({}x{} vs {}x{})",
                        w, h, info.width, info.height
                    ),
                ));
            }
            Some(_) => {}
        }
        Ok(info.format)
    };

    let color_format = desc.color.as_ref().map(|a| check(a, false)).transpose()?;
    let depth_format = desc.depth.as_ref().map(|a| check(a, true)).transpose()?;
    let (width, height) = size.unwrap_or((0, 0));

    Ok(FramebufferInfo {
        width,
        height,
        color_format,
        depth_format,
    })
}

// ============================================================================
// Programs
// ============================================================================

/// Sampler kinds a program can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerType {
    /// `texture_2d<f32>` with a filtering sampler
    Texture2d,
    /// `texture_cube<f32>` with a filtering sampler
    TextureCube,
    /// `texture_depth_2d` with a non-filtering sampler
    Depth2d,
    /// `texture_depth_cube` with a non-filtering sampler
    DepthCube,
}

impl SamplerType {
    /// Texture kind this sampler can read
    #[must_use]
    pub const fn accepts(self) -> TextureKind {
        match self {
            Self::Texture2d => TextureKind::Color2d,
            Self::TextureCube => TextureKind::ColorCube,
            Self::Depth2d => TextureKind::Depth2d,
            Self::DepthCube => TextureKind::DepthCube,
        }
    }
}

/// Depth comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthCompare {
    Less,
    LessEqual,
    Always,
}

/// Per-program depth override, e.g. a skybox drawn at the far plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub write: bool,
    pub compare: DepthCompare,
}

/// Final interface of a linked program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramLayout {
    /// Size of the uniform block in bytes (multiple of 16)
    pub uniform_size: u32,
    /// Sampler types in binding order
    pub samplers: Vec<SamplerType>,
    /// Overrides the pass depth state when set
    pub depth: Option<DepthState>,
}

// ============================================================================
// Passes and draws
// ============================================================================

/// Where a pass renders to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTarget {
    Framebuffer(FramebufferHandle),
    /// The presentable surface
    Screen,
}

/// Viewport rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Full-size viewport at the origin
    #[must_use]
    pub const fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// Face culling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Back,
    Front,
}

/// Complete fixed-function state of one pass.
///
/// Everything a draw depends on is in here, so nothing leaks from one pass
/// into the next.
#[derive(Debug, Clone, PartialEq)]
pub struct PassDesc {
    pub label: &'static str,
    pub target: PassTarget,
    pub viewport: Viewport,
    /// Clear color, or load the existing contents
    pub clear_color: Option<[f32; 4]>,
    /// Clear depth, or load the existing contents
    pub clear_depth: Option<f32>,
    pub depth_test: bool,
    pub depth_write: bool,
    pub cull: CullMode,
    pub color_write: bool,
    /// Line rasterization, if the device supports it
    pub wireframe: bool,
}

impl PassDesc {
    /// Pass with depth testing off, back-face culling and color writes on
    #[must_use]
    pub const fn new(label: &'static str, target: PassTarget, viewport: Viewport) -> Self {
        Self {
            label,
            target,
            viewport,
            clear_color: None,
            clear_depth: None,
            depth_test: false,
            depth_write: false,
            cull: CullMode::Back,
            color_write: true,
            wireframe: false,
        }
    }

    #[must_use]
    pub const fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = Some(color);
        self
    }

    #[must_use]
    pub const fn with_clear_depth(mut self, depth: f32) -> Self {
        self.clear_depth = Some(depth);
        self
    }

    #[must_use]
    pub const fn with_depth(mut self, test: bool, write: bool) -> Self {
        self.depth_test = test;
        self.depth_write = write;
        self
    }

    #[must_use]
    pub const fn with_cull(mut self, cull: CullMode) -> Self {
        self.cull = cull;
        self
    }

    #[must_use]
    pub const fn with_color_write(mut self, enabled: bool) -> Self {
        self.color_write = enabled;
        self
    }

    #[must_use]
    pub const fn with_wireframe(mut self, enabled: bool) -> Self {
        self.wireframe = enabled;
        self
    }
}

/// Textures resolved for a draw, in sampler binding order
pub type DrawTextures = SmallVec<[TextureHandle; 12]>;

/// A single indexed draw
#[derive(Debug, Clone)]
pub struct DrawCall<'a> {
    pub program: ProgramHandle,
    pub mesh: MeshHandle,
    /// Uniform block bytes, exactly `ProgramLayout::uniform_size` long
    pub uniforms: &'a [u8],
    pub textures: &'a [TextureHandle],
}

// ============================================================================
// Backend trait
// ============================================================================

/// GPU operations the renderer is built on.
///
/// Calls follow a strict protocol: `begin_frame`, then any number of
/// `begin_pass` / `draw` / `end_pass` brackets, then `end_frame`. Resource
/// creation and destruction may happen outside a pass at any time.
pub trait RenderBackend {
    /// Allocate a texture, optionally with initial RGBA8 data (layer-major)
    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> RenderResult<TextureHandle>;

    /// Free a texture. Fails if the handle was already released.
    fn destroy_texture(&mut self, texture: TextureHandle) -> RenderResult<()>;

    /// Properties of a live texture
    fn texture_info(&self, texture: TextureHandle) -> Option<TextureInfo>;

    /// Attach textures and run the completeness check
    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> RenderResult<FramebufferHandle>;

    /// Free a framebuffer. Its textures are left alone.
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) -> RenderResult<()>;

    /// Compile WGSL with `vs_main` / `fs_main` entry points
    fn compile_program(&mut self, label: &str, source: &str) -> RenderResult<ProgramHandle>;

    /// Fix the uniform block size and sampler bindings of a program
    fn link_program(&mut self, program: ProgramHandle, layout: &ProgramLayout) -> RenderResult<()>;

    /// Free a program and everything cached for it
    fn destroy_program(&mut self, program: ProgramHandle) -> RenderResult<()>;

    /// Upload vertex and index data
    fn create_mesh(&mut self, label: &str, vertices: &[crate::renderer::Vertex], indices: &[u32])
        -> RenderResult<MeshHandle>;

    /// Free a mesh
    fn destroy_mesh(&mut self, mesh: MeshHandle) -> RenderResult<()>;

    /// Reconfigure the presentable surface
    fn resize_surface(&mut self, width: u32, height: u32);

    /// Current surface size
    fn surface_size(&self) -> (u32, u32);

    /// Whether `PassDesc::wireframe` is honored
    fn supports_wireframe(&self) -> bool;

    /// Start a frame. `Ok(false)` means the surface is unavailable and the
    /// frame should be skipped.
    fn begin_frame(&mut self) -> RenderResult<bool>;

    /// Open a pass: bind target, set viewport, clear
    fn begin_pass(&mut self, desc: &PassDesc) -> RenderResult<()>;

    /// Draw under the open pass
    fn draw(&mut self, call: &DrawCall<'_>) -> RenderResult<()>;

    /// Close the open pass
    fn end_pass(&mut self) -> RenderResult<()>;

    /// Submit and present
    fn end_frame(&mut self) -> RenderResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::pool::ResourcePool;

    fn pool_with(infos: &[TextureInfo]) -> (ResourcePool<TextureInfo>, Vec<TextureHandle>) {
        let mut pool = ResourcePool::new();
        let handles = infos.iter().map(|i| TextureHandle(pool.insert(*i))).collect();
        (pool, handles)
    }

    fn info(width: u32, height: u32, format: TextureFormat, dimension: TextureDimension) -> TextureInfo {
        TextureInfo {
            width,
            height,
            format,
            dimension,
            render_target: true,
        }
    }

    #[test]
    fn test_complete_color_depth_framebuffer() {
        let (pool, h) = pool_with(&[
            info(640, 480, TextureFormat::Rgba8UnormSrgb, TextureDimension::D2),
            info(640, 480, TextureFormat::Depth32Float, TextureDimension::D2),
        ]);
        let desc = FramebufferDesc {
            label: "main".into(),
            color: Some(Attachment::new(h[0])),
            depth: Some(Attachment::new(h[1])),
        };
        let fb = check_completeness(&desc, |t| pool.get(t.0).copied()).unwrap();
        assert_eq!((fb.width, fb.height), (640, 480));
        assert_eq!(fb.depth_format, Some(TextureFormat::Depth32Float));
    }

    #[test]
    fn test_size_mismatch_is_incomplete() {
        let (pool, h) = pool_with(&[
            info(640, 480, TextureFormat::Rgba8UnormSrgb, TextureDimension::D2),
            info(320, 240, TextureFormat::Depth32Float, TextureDimension::D2),
        ]);
        let desc = FramebufferDesc {
            label: "main".into(),
            color: Some(Attachment::new(h[0])),
            depth: Some(Attachment::new(h[1])),
        };
        let err = check_completeness(&desc, |t| pool.get(t.0).copied()).unwrap_err();
        assert!(matches!(err, RenderError::IncompleteFramebuffer { .. }));
        assert!(err.to_string().contains("sizes differ"));
    }

    #[test]
    fn test_wrong_format_and_layer_are_incomplete() {
        let (pool, h) = pool_with(&[
            info(64, 64, TextureFormat::Depth32Float, TextureDimension::D2),
            info(64, 64, TextureFormat::Depth32Float, TextureDimension::Cube),
        ]);
        let as_color = FramebufferDesc {
            label: "bad_color".into(),
            color: Some(Attachment::new(h[0])),
            depth: None,
        };
        assert!(check_completeness(&as_color, |t| pool.get(t.0).copied()).is_err());

        let face_six = FramebufferDesc {
            label: "bad_face".into(),
            color: None,
            depth: Some(Attachment::face(h[1], 6)),
        };
        assert!(check_completeness(&face_six, |t| pool.get(t.0).copied()).is_err());

        let face_five = FramebufferDesc {
            label: "good_face".into(),
            color: None,
            depth: Some(Attachment::face(h[1], 5)),
        };
        assert!(check_completeness(&face_five, |t| pool.get(t.0).copied()).is_ok());
    }

    #[test]
    fn test_empty_framebuffer_is_incomplete() {
        let desc = FramebufferDesc {
            label: "empty".into(),
            color: None,
            depth: None,
        };
        assert!(check_completeness(&desc, |_| None).is_err());
    }
}
