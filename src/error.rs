//! Error types shared by the renderer

use thiserror::Error;

/// Convenience alias used throughout the renderer
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors raised while building or executing render passes.
///
/// Everything here is setup-fatal: the engine logs it and aborts
/// initialization or the frame loop.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A shader module failed to compile or validate
    #[error("shader `{label}` failed to compile: {message}")]
    ShaderCompile { label: String, message: String },

    /// A uniform was set that the program never registered
    #[error("program `{program}` has no registered uniform `{name}`")]
    UnknownUniform { program: String, name: String },

    /// A sampler was bound that the program never registered
    #[error("program `{program}` has no registered sampler `{name}`")]
    UnknownSampler { program: String, name: String },

    /// The same uniform or sampler name was registered twice
    #[error("program `{program}` already registered `{name}`")]
    DuplicateRegistration { program: String, name: String },

    /// A value of the wrong type was written to a uniform
    #[error("uniform `{name}` on `{program}` expects {expected}, got {actual}")]
    UniformTypeMismatch {
        program: String,
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Values were staged or a draw was issued before `link`
    #[error("program `{0}` has not been linked")]
    ProgramNotLinked(String),

    /// Registration was attempted after `link`
    #[error("program `{0}` is already linked")]
    AlreadyLinked(String),

    /// A framebuffer failed its completeness check
    #[error("framebuffer `{label}` is incomplete: {reason}")]
    IncompleteFramebuffer { label: String, reason: String },

    /// Sampler/texture-unit state is not drawable
    #[error("program `{program}` failed validation: {reason}")]
    Validation { program: String, reason: String },

    /// A zero-sized target or texture was requested
    #[error("invalid size {width}x{height} for `{label}`")]
    InvalidSize {
        label: String,
        width: u32,
        height: u32,
    },

    /// A handle did not refer to a live resource
    #[error("unknown or released {kind} handle")]
    UnknownHandle { kind: &'static str },

    /// A texture unit outside the fixed unit table was addressed
    #[error("texture unit {0} is out of range")]
    TextureUnitOutOfRange(u32),

    /// Backend calls arrived in an order the frame protocol forbids
    #[error("invalid pass state: {0}")]
    PassState(String),

    /// Image decoding or file IO failed
    #[error("texture load failed: {0}")]
    TextureLoad(String),

    /// Adapter, device or surface setup failed
    #[error("device error: {0}")]
    Device(String),
}

impl RenderError {
    pub(crate) fn incomplete(label: &str, reason: impl Into<String>) -> Self {
        Self::IncompleteFramebuffer {
            label: label.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn validation(program: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            program: program.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<image::ImageError> for RenderError {
    fn from(err: image::ImageError) -> Self {
        Self::TextureLoad(err.to_string())
    }
}
