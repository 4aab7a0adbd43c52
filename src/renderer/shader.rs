//! Shader program registry
//!
//! A [`ShaderProgram`] goes through three stages:
//!
//! 1. `compile` the WGSL module,
//! 2. `register_uniform` / `register_sampler` for every name the shader
//!    declares, in declaration order,
//! 3. `link`, which fixes the uniform block and sampler bindings.
//!
//! Uniform locations are byte offsets into the program's uniform block,
//! computed with WGSL uniform-buffer layout rules. Names are dotted paths
//! (`u_pointLights[1].base.color`); whenever the struct path before the last
//! `.` changes, the next member starts on a 16-byte boundary. Scalar-only
//! structs in WGSL are padded to 16 bytes and struct members carry
//! `@align(16)` so both sides agree.
//!
//! Sampler `k` (registration order) lives at `@group(1) @binding(2k)` for the
//! texture and `@binding(2k + 1)` for the sampler.

use glam::{Mat4, Vec2, Vec3, Vec4};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::backend::{
    DepthState, DrawCall, DrawTextures, MeshHandle, ProgramHandle, ProgramLayout, RenderBackend,
    SamplerType,
};
use super::units::{BoundTexture, TextureUnits};
use crate::error::{RenderError, RenderResult};

/// Uniform value types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Float,
    Int,
    UInt,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

impl UniformType {
    /// Size in bytes
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            Self::Float | Self::Int | Self::UInt => 4,
            Self::Vec2 => 8,
            Self::Vec3 => 12,
            Self::Vec4 => 16,
            Self::Mat4 => 64,
        }
    }

    /// Alignment in the uniform address space
    #[must_use]
    pub const fn align(self) -> u32 {
        match self {
            Self::Float | Self::Int | Self::UInt => 4,
            Self::Vec2 => 8,
            Self::Vec3 | Self::Vec4 | Self::Mat4 => 16,
        }
    }

    /// WGSL spelling, used in error messages
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Float => "f32",
            Self::Int => "i32",
            Self::UInt => "u32",
            Self::Vec2 => "vec2<f32>",
            Self::Vec3 => "vec3<f32>",
            Self::Vec4 => "vec4<f32>",
            Self::Mat4 => "mat4x4<f32>",
        }
    }
}

/// A typed uniform value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    UInt(u32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl UniformValue {
    /// Type of the value
    #[must_use]
    pub const fn ty(&self) -> UniformType {
        match self {
            Self::Float(_) => UniformType::Float,
            Self::Int(_) => UniformType::Int,
            Self::UInt(_) => UniformType::UInt,
            Self::Vec2(_) => UniformType::Vec2,
            Self::Vec3(_) => UniformType::Vec3,
            Self::Vec4(_) => UniformType::Vec4,
            Self::Mat4(_) => UniformType::Mat4,
        }
    }

    fn write(&self, out: &mut [u8]) {
        match self {
            Self::Float(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            Self::Int(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            Self::UInt(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            Self::Vec2(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            Self::Vec3(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            Self::Vec4(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
            Self::Mat4(v) => out.copy_from_slice(bytemuck::bytes_of(v)),
        }
    }

    fn read(ty: UniformType, bytes: &[u8]) -> Self {
        let f = |i: usize| -> f32 { bytemuck::pod_read_unaligned(&bytes[i * 4..i * 4 + 4]) };
        match ty {
            UniformType::Float => Self::Float(f(0)),
            UniformType::Int => Self::Int(bytemuck::pod_read_unaligned(&bytes[..4])),
            UniformType::UInt => Self::UInt(bytemuck::pod_read_unaligned(&bytes[..4])),
            UniformType::Vec2 => Self::Vec2(Vec2::new(f(0), f(1))),
            UniformType::Vec3 => Self::Vec3(Vec3::new(f(0), f(1), f(2))),
            UniformType::Vec4 => Self::Vec4(Vec4::new(f(0), f(1), f(2), f(3))),
            UniformType::Mat4 => {
                let cols: [f32; 16] = std::array::from_fn(f);
                Self::Mat4(Mat4::from_cols_array(&cols))
            }
        }
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for UniformValue {
    fn from(v: u32) -> Self {
        Self::UInt(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        Self::Vec2(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        Self::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        Self::Vec4(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        Self::Mat4(v)
    }
}

/// Resolved location of a uniform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLocation {
    /// Byte offset in the uniform block
    pub offset: u32,
    pub ty: UniformType,
}

#[derive(Debug, Clone)]
struct SamplerSlot {
    name: String,
    ty: SamplerType,
    /// Texture unit the sampler reads; 0 until bound, like GL
    unit: u32,
}

/// Running layout cursor used during registration
#[derive(Debug, Default)]
struct LayoutCursor {
    offset: u32,
    scope: String,
}

impl LayoutCursor {
    fn place(&mut self, name: &str, ty: UniformType) -> u32 {
        let scope = name.rsplit_once('.').map_or("", |(scope, _)| scope);
        if scope != self.scope {
            self.offset = align_to(self.offset, 16);
            self.scope = scope.to_string();
        }
        let offset = align_to(self.offset, ty.align());
        self.offset = offset + ty.size();
        offset
    }

    fn block_size(&self) -> u32 {
        align_to(self.offset, 16).max(16)
    }
}

const fn align_to(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

/// A compiled program plus its name → location caches.
#[derive(Debug)]
pub struct ShaderProgram {
    label: String,
    handle: ProgramHandle,
    uniforms: FxHashMap<String, UniformLocation>,
    sampler_index: FxHashMap<String, usize>,
    samplers: Vec<SamplerSlot>,
    cursor: LayoutCursor,
    depth: Option<DepthState>,
    /// Staged uniform block, allocated at link
    staging: Vec<u8>,
    linked: bool,
}

impl ShaderProgram {
    /// Compile WGSL source through the backend
    pub fn compile<B: RenderBackend + ?Sized>(backend: &mut B, label: &str, source: &str) -> RenderResult<Self> {
        let handle = backend.compile_program(label, source)?;
        log::debug!("Compiled program `{}`", label);
        Ok(Self {
            label: label.to_string(),
            handle,
            uniforms: FxHashMap::default(),
            sampler_index: FxHashMap::default(),
            samplers: Vec::new(),
            cursor: LayoutCursor::default(),
            depth: None,
            staging: Vec::new(),
            linked: false,
        })
    }

    /// Program label
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Backend handle
    #[must_use]
    pub const fn handle(&self) -> ProgramHandle {
        self.handle
    }

    /// Whether `link` has run
    #[must_use]
    pub const fn is_linked(&self) -> bool {
        self.linked
    }

    fn ensure_unlinked(&self) -> RenderResult<()> {
        if self.linked {
            return Err(RenderError::AlreadyLinked(self.label.clone()));
        }
        Ok(())
    }

    fn ensure_new_name(&self, name: &str) -> RenderResult<()> {
        if self.uniforms.contains_key(name) || self.sampler_index.contains_key(name) {
            return Err(RenderError::DuplicateRegistration {
                program: self.label.clone(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Register a uniform and resolve its location
    pub fn register_uniform(&mut self, ty: UniformType, name: &str) -> RenderResult<UniformLocation> {
        self.ensure_unlinked()?;
        self.ensure_new_name(name)?;
        let location = UniformLocation {
            offset: self.cursor.place(name, ty),
            ty,
        };
        self.uniforms.insert(name.to_string(), location);
        Ok(location)
    }

    /// Register `name[0]..name[count]`, each element followed by `suffix`
    pub fn register_uniform_array(
        &mut self,
        ty: UniformType,
        name: &str,
        count: usize,
        suffix: &str,
    ) -> RenderResult<()> {
        for i in 0..count {
            self.register_uniform(ty, &format!("{name}[{i}]{suffix}"))?;
        }
        Ok(())
    }

    /// Register a sampler; it takes the next binding slot
    pub fn register_sampler(&mut self, ty: SamplerType, name: &str) -> RenderResult<()> {
        self.ensure_unlinked()?;
        self.ensure_new_name(name)?;
        self.sampler_index.insert(name.to_string(), self.samplers.len());
        self.samplers.push(SamplerSlot {
            name: name.to_string(),
            ty,
            unit: 0,
        });
        Ok(())
    }

    /// Override pass depth state for this program's draws
    pub fn set_depth_state(&mut self, depth: DepthState) -> RenderResult<()> {
        self.ensure_unlinked()?;
        self.depth = Some(depth);
        Ok(())
    }

    /// Size of the uniform block the registrations describe
    #[must_use]
    pub fn uniform_block_size(&self) -> u32 {
        self.cursor.block_size()
    }

    /// Interface handed to the backend at link time
    #[must_use]
    pub fn layout(&self) -> ProgramLayout {
        ProgramLayout {
            uniform_size: self.uniform_block_size(),
            samplers: self.samplers.iter().map(|s| s.ty).collect(),
            depth: self.depth,
        }
    }

    /// Freeze the interface and allocate the uniform block
    pub fn link<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) -> RenderResult<()> {
        self.ensure_unlinked()?;
        let layout = self.layout();
        backend.link_program(self.handle, &layout)?;
        self.staging = vec![0; layout.uniform_size as usize];
        self.linked = true;
        log::debug!(
            "Linked program `{}`: {} uniforms ({} bytes), {} samplers",
            self.label,
            self.uniforms.len(),
            layout.uniform_size,
            self.samplers.len()
        );
        Ok(())
    }

    /// Location of a registered uniform
    #[must_use]
    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms.get(name).copied()
    }

    /// Whether the program registered this uniform
    #[must_use]
    pub fn has_uniform(&self, name: &str) -> bool {
        self.uniforms.contains_key(name)
    }

    /// Whether the program registered this sampler
    #[must_use]
    pub fn has_sampler(&self, name: &str) -> bool {
        self.sampler_index.contains_key(name)
    }

    /// Stage a uniform value
    pub fn set_uniform(&mut self, name: &str, value: impl Into<UniformValue>) -> RenderResult<()> {
        let value = value.into();
        if !self.linked {
            return Err(RenderError::ProgramNotLinked(self.label.clone()));
        }
        let location = self.uniforms.get(name).copied().ok_or_else(|| RenderError::UnknownUniform {
            program: self.label.clone(),
            name: name.to_string(),
        })?;
        if location.ty != value.ty() {
            return Err(RenderError::UniformTypeMismatch {
                program: self.label.clone(),
                name: name.to_string(),
                expected: location.ty.name(),
                actual: value.ty().name(),
            });
        }
        let start = location.offset as usize;
        value.write(&mut self.staging[start..start + location.ty.size() as usize]);
        Ok(())
    }

    /// Read a staged value back
    #[must_use]
    pub fn read_uniform(&self, name: &str) -> Option<UniformValue> {
        let location = self.uniforms.get(name)?;
        let start = location.offset as usize;
        let bytes = self.staging.get(start..start + location.ty.size() as usize)?;
        Some(UniformValue::read(location.ty, bytes))
    }

    /// Bind `texture` to `unit` and point the sampler at that unit
    pub fn bind_sampler(
        &mut self,
        units: &mut TextureUnits,
        name: &str,
        unit: u32,
        texture: BoundTexture,
    ) -> RenderResult<()> {
        let index = *self.sampler_index.get(name).ok_or_else(|| RenderError::UnknownSampler {
            program: self.label.clone(),
            name: name.to_string(),
        })?;
        units.bind(unit, texture)?;
        self.samplers[index].unit = unit;
        Ok(())
    }

    /// Unit a sampler currently reads
    #[must_use]
    pub fn sampler_unit(&self, name: &str) -> Option<u32> {
        self.sampler_index.get(name).map(|&i| self.samplers[i].unit)
    }

    /// Check that every sampler can be read as declared.
    ///
    /// Fails when a sampler's unit is empty, holds a texture of another kind,
    /// or when two samplers of different types share a unit.
    pub fn validate(&self, units: &TextureUnits) -> RenderResult<()> {
        if !self.linked {
            return Err(RenderError::ProgramNotLinked(self.label.clone()));
        }
        for (i, slot) in self.samplers.iter().enumerate() {
            let Some(bound) = units.get(slot.unit) else {
                return Err(RenderError::validation(
                    &self.label,
                    format!("sampler `{}` reads empty texture unit {}", slot.name, slot.unit),
                ));
            };
            if bound.kind != slot.ty.accepts() {
                return Err(RenderError::validation(
                    &self.label,
                    format!(
                        "sampler `{}` expects a {} but unit {} holds a {}",
                        slot.name,
                        slot.ty.accepts().name(),
                        slot.unit,
                        bound.kind.name()
                    ),
                ));
            }
            if let Some(other) = self.samplers[..i]
                .iter()
                .find(|o| o.unit == slot.unit && o.ty != slot.ty)
            {
                return Err(RenderError::validation(
                    &self.label,
                    format!(
                        "samplers `{}` and `{}` have different types but share unit {}",
                        other.name, slot.name, slot.unit
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Textures for each sampler in binding order
    pub fn resolve_bindings(&self, units: &TextureUnits) -> RenderResult<DrawTextures> {
        let mut textures: DrawTextures = SmallVec::new();
        for slot in &self.samplers {
            let bound = units.get(slot.unit).ok_or_else(|| {
                RenderError::validation(
                    &self.label,
                    format!("sampler `{}` reads empty texture unit {}", slot.name, slot.unit),
                )
            })?;
            textures.push(bound.handle);
        }
        Ok(textures)
    }

    /// Issue a draw with the staged uniforms and current unit bindings
    pub fn draw<B: RenderBackend + ?Sized>(
        &self,
        backend: &mut B,
        units: &TextureUnits,
        mesh: MeshHandle,
    ) -> RenderResult<()> {
        if !self.linked {
            return Err(RenderError::ProgramNotLinked(self.label.clone()));
        }
        let textures = self.resolve_bindings(units)?;
        backend.draw(&DrawCall {
            program: self.handle,
            mesh,
            uniforms: &self.staging,
            textures: &textures,
        })
    }

    /// Release the backend program
    pub fn destroy<B: RenderBackend + ?Sized>(self, backend: &mut B) -> RenderResult<()> {
        backend.destroy_program(self.handle)
    }
}
