//! Headless backend that records every call
//!
//! Tracks resources with the same generational pools as the GPU backend and
//! enforces the same frame protocol, so misuse shows up as an error instead
//! of silently passing. Used by the frame tests and by `--dry-run`.

use rustc_hash::FxHashSet;

use super::{
    DrawCall, FramebufferDesc, FramebufferHandle, FramebufferInfo, MeshHandle, PassDesc,
    ProgramHandle, ProgramLayout, RenderBackend, TextureDesc, TextureHandle, TextureInfo,
    TextureKind, check_completeness,
};
use crate::error::{RenderError, RenderResult};
use crate::renderer::Vertex;
use crate::renderer::pool::ResourcePool;
use crate::renderer::units::BoundTexture;

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateTexture { handle: TextureHandle, label: String },
    DestroyTexture(TextureHandle),
    CreateFramebuffer { handle: FramebufferHandle, label: String },
    DestroyFramebuffer(FramebufferHandle),
    CompileProgram { handle: ProgramHandle, label: String },
    LinkProgram { handle: ProgramHandle, layout: ProgramLayout },
    DestroyProgram(ProgramHandle),
    CreateMesh { handle: MeshHandle, label: String },
    DestroyMesh(MeshHandle),
    ResizeSurface { width: u32, height: u32 },
    BeginFrame,
    BeginPass(PassDesc),
    Draw {
        program: ProgramHandle,
        mesh: MeshHandle,
        uniforms: Vec<u8>,
        textures: Vec<TextureHandle>,
    },
    EndPass,
    EndFrame,
}

/// Allocation counters per resource kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceStats {
    pub textures_created: u64,
    pub textures_destroyed: u64,
    pub framebuffers_created: u64,
    pub framebuffers_destroyed: u64,
    pub live_textures: usize,
    pub live_framebuffers: usize,
    pub live_programs: usize,
    pub live_meshes: usize,
}

#[derive(Debug)]
struct ProgramRecord {
    label: String,
    layout: Option<ProgramLayout>,
}

/// Backend with no GPU behind it
#[derive(Debug)]
pub struct RecordingBackend {
    textures: ResourcePool<TextureInfo>,
    framebuffers: ResourcePool<FramebufferInfo>,
    programs: ResourcePool<ProgramRecord>,
    meshes: ResourcePool<u32>,
    commands: Vec<Command>,
    surface: (u32, u32),
    in_frame: bool,
    in_pass: bool,
    wireframe: bool,
    failing_shaders: FxHashSet<String>,
    surface_lost: bool,
}

impl RecordingBackend {
    /// Create a backend with a surface of the given size
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            textures: ResourcePool::new(),
            framebuffers: ResourcePool::new(),
            programs: ResourcePool::new(),
            meshes: ResourcePool::new(),
            commands: Vec::new(),
            surface: (width, height),
            in_frame: false,
            in_pass: false,
            wireframe: true,
            failing_shaders: FxHashSet::default(),
            surface_lost: false,
        }
    }

    /// Report wireframe as unsupported
    #[must_use]
    pub fn without_wireframe(mut self) -> Self {
        self.wireframe = false;
        self
    }

    /// Make compilation of `label` fail
    pub fn fail_shader(&mut self, label: impl Into<String>) {
        self.failing_shaders.insert(label.into());
    }

    /// Make the next `begin_frame` report an unavailable surface
    pub fn lose_surface(&mut self) {
        self.surface_lost = true;
    }

    /// Everything recorded so far
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Forget recorded commands, keep resources
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Labels of passes begun, in order
    #[must_use]
    pub fn pass_labels(&self) -> Vec<&'static str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::BeginPass(desc) => Some(desc.label),
                _ => None,
            })
            .collect()
    }

    /// Pass descriptions, in order
    #[must_use]
    pub fn passes(&self) -> Vec<&PassDesc> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::BeginPass(desc) => Some(desc),
                _ => None,
            })
            .collect()
    }

    /// Allocation counters
    #[must_use]
    pub fn stats(&self) -> ResourceStats {
        ResourceStats {
            textures_created: self.textures.inserted(),
            textures_destroyed: self.textures.removed(),
            framebuffers_created: self.framebuffers.inserted(),
            framebuffers_destroyed: self.framebuffers.removed(),
            live_textures: self.textures.len(),
            live_framebuffers: self.framebuffers.len(),
            live_programs: self.programs.len(),
            live_meshes: self.meshes.len(),
        }
    }

    /// Size of a live framebuffer
    #[must_use]
    pub fn framebuffer_info(&self, framebuffer: FramebufferHandle) -> Option<FramebufferInfo> {
        self.framebuffers.get(framebuffer.0).copied()
    }

    /// Label a program was compiled with
    #[must_use]
    pub fn program_label(&self, program: ProgramHandle) -> Option<&str> {
        self.programs.get(program.0).map(|p| p.label.as_str())
    }

    /// Allocate a 1x1 texture of the given kind without recording it
    pub fn fake_texture(&mut self, kind: TextureKind) -> BoundTexture {
        let (format, dimension) = match kind {
            TextureKind::Color2d => (super::TextureFormat::Rgba8UnormSrgb, super::TextureDimension::D2),
            TextureKind::ColorCube => (super::TextureFormat::Rgba8UnormSrgb, super::TextureDimension::Cube),
            TextureKind::Depth2d => (super::TextureFormat::Depth32Float, super::TextureDimension::D2),
            TextureKind::DepthCube => (super::TextureFormat::Depth32Float, super::TextureDimension::Cube),
        };
        let handle = TextureHandle(self.textures.insert(TextureInfo {
            width: 1,
            height: 1,
            format,
            dimension,
            render_target: false,
        }));
        BoundTexture { handle, kind }
    }

    fn require_frame(&self, what: &str) -> RenderResult<()> {
        if !self.in_frame {
            return Err(RenderError::PassState(format!("{what} outside a frame")));
        }
        Ok(())
    }
}

impl RenderBackend for RecordingBackend {
    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> RenderResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::InvalidSize {
                label: desc.label.clone(),
                width: desc.width,
                height: desc.height,
            });
        }
        if let Some(data) = data {
            if data.len() != desc.data_len() {
                return Err(RenderError::TextureLoad(format!(
                    "`{}` expects {} bytes, got {}",
                    desc.label,
                    desc.data_len(),
                    data.len()
                )));
            }
        }
        let handle = TextureHandle(self.textures.insert(desc.info()));
        self.commands.push(Command::CreateTexture {
            handle,
            label: desc.label.clone(),
        });
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) -> RenderResult<()> {
        self.textures.remove(texture.0).ok_or_else(TextureHandle::unknown)?;
        self.commands.push(Command::DestroyTexture(texture));
        Ok(())
    }

    fn texture_info(&self, texture: TextureHandle) -> Option<TextureInfo> {
        self.textures.get(texture.0).copied()
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> RenderResult<FramebufferHandle> {
        let info = check_completeness(desc, |t| self.textures.get(t.0).copied())?;
        let handle = FramebufferHandle(self.framebuffers.insert(info));
        self.commands.push(Command::CreateFramebuffer {
            handle,
            label: desc.label.clone(),
        });
        Ok(handle)
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) -> RenderResult<()> {
        self.framebuffers
            .remove(framebuffer.0)
            .ok_or_else(FramebufferHandle::unknown)?;
        self.commands.push(Command::DestroyFramebuffer(framebuffer));
        Ok(())
    }

    fn compile_program(&mut self, label: &str, _source: &str) -> RenderResult<ProgramHandle> {
        if self.failing_shaders.contains(label) {
            return Err(RenderError::ShaderCompile {
                label: label.to_string(),
                message: "compilation forced to fail".to_string(),
            });
        }
        let handle = ProgramHandle(self.programs.insert(ProgramRecord {
            label: label.to_string(),
            layout: None,
        }));
        self.commands.push(Command::CompileProgram {
            handle,
            label: label.to_string(),
        });
        Ok(handle)
    }

    fn link_program(&mut self, program: ProgramHandle, layout: &ProgramLayout) -> RenderResult<()> {
        let record = self.programs.get_mut(program.0).ok_or_else(ProgramHandle::unknown)?;
        if record.layout.is_some() {
            return Err(RenderError::AlreadyLinked(record.label.clone()));
        }
        record.layout = Some(layout.clone());
        self.commands.push(Command::LinkProgram {
            handle: program,
            layout: layout.clone(),
        });
        Ok(())
    }

    fn destroy_program(&mut self, program: ProgramHandle) -> RenderResult<()> {
        self.programs.remove(program.0).ok_or_else(ProgramHandle::unknown)?;
        self.commands.push(Command::DestroyProgram(program));
        Ok(())
    }

    fn create_mesh(&mut self, label: &str, vertices: &[Vertex], indices: &[u32]) -> RenderResult<MeshHandle> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(RenderError::Device(format!("mesh `{label}` has no geometry")));
        }
        let handle = MeshHandle(self.meshes.insert(indices.len() as u32));
        self.commands.push(Command::CreateMesh {
            handle,
            label: label.to_string(),
        });
        Ok(handle)
    }

    fn destroy_mesh(&mut self, mesh: MeshHandle) -> RenderResult<()> {
        self.meshes.remove(mesh.0).ok_or_else(MeshHandle::unknown)?;
        self.commands.push(Command::DestroyMesh(mesh));
        Ok(())
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.surface = (width, height);
            self.commands.push(Command::ResizeSurface { width, height });
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface
    }

    fn supports_wireframe(&self) -> bool {
        self.wireframe
    }

    fn begin_frame(&mut self) -> RenderResult<bool> {
        if self.in_frame {
            return Err(RenderError::PassState("frame already open".into()));
        }
        if std::mem::take(&mut self.surface_lost) {
            return Ok(false);
        }
        self.in_frame = true;
        self.commands.push(Command::BeginFrame);
        Ok(true)
    }

    fn begin_pass(&mut self, desc: &PassDesc) -> RenderResult<()> {
        self.require_frame("begin_pass")?;
        if self.in_pass {
            return Err(RenderError::PassState(format!(
                "`{}` begun while another pass is open",
                desc.label
            )));
        }
        if let super::PassTarget::Framebuffer(fb) = desc.target {
            let info = self.framebuffers.get(fb.0).ok_or_else(FramebufferHandle::unknown)?;
            if desc.viewport.x + desc.viewport.width > info.width
                || desc.viewport.y + desc.viewport.height > info.height
            {
                return Err(RenderError::PassState(format!(
                    "`{}` viewport exceeds its {}x{} target",
                    desc.label, info.width, info.height
                )));
            }
        }
        self.in_pass = true;
        self.commands.push(Command::BeginPass(desc.clone()));
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> RenderResult<()> {
        if !self.in_pass {
            return Err(RenderError::PassState("draw outside a pass".into()));
        }
        let record = self.programs.get(call.program.0).ok_or_else(ProgramHandle::unknown)?;
        let layout = record
            .layout
            .as_ref()
            .ok_or_else(|| RenderError::ProgramNotLinked(record.label.clone()))?;
        if !self.meshes.contains(call.mesh.0) {
            return Err(MeshHandle::unknown());
        }
        if call.uniforms.len() != layout.uniform_size as usize {
            return Err(RenderError::PassState(format!(
                "`{}` uniform block is {} bytes, expected {}",
                record.label,
                call.uniforms.len(),
                layout.uniform_size
            )));
        }
        if call.textures.len() != layout.samplers.len() {
            return Err(RenderError::PassState(format!(
                "`{}` got {} textures for {} samplers",
                record.label,
                call.textures.len(),
                layout.samplers.len()
            )));
        }
        for (texture, sampler) in call.textures.iter().zip(&layout.samplers) {
            let info = self.textures.get(texture.0).ok_or_else(TextureHandle::unknown)?;
            if info.kind() != sampler.accepts() {
                return Err(RenderError::validation(
                    &record.label,
                    format!("bound {} where a {} is declared", info.kind().name(), sampler.accepts().name()),
                ));
            }
        }
        self.commands.push(Command::Draw {
            program: call.program,
            mesh: call.mesh,
            uniforms: call.uniforms.to_vec(),
            textures: call.textures.to_vec(),
        });
        Ok(())
    }

    fn end_pass(&mut self) -> RenderResult<()> {
        if !self.in_pass {
            return Err(RenderError::PassState("end_pass without an open pass".into()));
        }
        self.in_pass = false;
        self.commands.push(Command::EndPass);
        Ok(())
    }

    fn end_frame(&mut self) -> RenderResult<()> {
        self.require_frame("end_frame")?;
        if self.in_pass {
            return Err(RenderError::PassState("end_frame with a pass still open".into()));
        }
        self.in_frame = false;
        self.commands.push(Command::EndFrame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::{
        Attachment, PassTarget, SamplerType, TextureFormat, Viewport,
    };

    fn quad(backend: &mut RecordingBackend) -> MeshHandle {
        let v = Vertex::new([0.0; 3], [0.0, 0.0, 1.0], [0.0; 2]);
        backend.create_mesh("quad", &[v, v, v], &[0, 1, 2]).unwrap()
    }

    #[test]
    fn test_double_destroy_is_rejected() {
        let mut backend = RecordingBackend::new(32, 32);
        let desc = TextureDesc::attachment("color", 32, 32, TextureFormat::Rgba8UnormSrgb);
        let tex = backend.create_texture(&desc, None).unwrap();

        backend.destroy_texture(tex).unwrap();
        let err = backend.destroy_texture(tex).unwrap_err();
        assert!(matches!(err, RenderError::UnknownHandle { kind: "texture" }));
        assert_eq!(backend.stats().textures_destroyed, 1);
    }

    #[test]
    fn test_pass_protocol_is_enforced() {
        let mut backend = RecordingBackend::new(32, 32);
        let pass = PassDesc::new("p", PassTarget::Screen, Viewport::full(32, 32));

        assert!(backend.begin_pass(&pass).is_err());
        assert!(backend.begin_frame().unwrap());
        backend.begin_pass(&pass).unwrap();
        assert!(backend.begin_pass(&pass).is_err());
        assert!(backend.end_frame().is_err());
        backend.end_pass().unwrap();
        backend.end_frame().unwrap();
        assert_eq!(backend.pass_labels(), vec!["p"]);
    }

    #[test]
    fn test_draw_checks_sampler_kinds() {
        let mut backend = RecordingBackend::new(32, 32);
        let program = backend.compile_program("cube_reader", "").unwrap();
        backend
            .link_program(
                program,
                &ProgramLayout {
                    uniform_size: 16,
                    samplers: vec![SamplerType::DepthCube],
                    depth: None,
                },
            )
            .unwrap();
        let mesh = quad(&mut backend);
        let flat = backend.fake_texture(TextureKind::Depth2d);

        backend.begin_frame().unwrap();
        backend
            .begin_pass(&PassDesc::new("p", PassTarget::Screen, Viewport::full(32, 32)))
            .unwrap();
        let err = backend
            .draw(&DrawCall {
                program,
                mesh,
                uniforms: &[0; 16],
                textures: &[flat.handle],
            })
            .unwrap_err();
        assert!(matches!(err, RenderError::Validation { .. }));
    }

    #[test]
    fn test_viewport_must_fit_target() {
        let mut backend = RecordingBackend::new(32, 32);
        let depth = backend
            .create_texture(&TextureDesc::attachment("d", 16, 16, TextureFormat::Depth32Float), None)
            .unwrap();
        let fb = backend
            .create_framebuffer(&FramebufferDesc {
                label: "small".into(),
                color: None,
                depth: Some(Attachment::new(depth)),
            })
            .unwrap();

        backend.begin_frame().unwrap();
        let pass = PassDesc::new("too_big", PassTarget::Framebuffer(fb), Viewport::full(32, 32));
        assert!(backend.begin_pass(&pass).is_err());
    }
}
