//! Error types for the display compositor.
//!
//! Failures come from building or presenting resources and from reading
//! command streams. Drawing operations never fail on bad coordinates; they
//! drop or clamp them.

use thiserror::Error;

use crate::profile::FontId;

/// Errors raised while building or driving a rendering backend.
#[derive(Debug, Error)]
pub enum CompositorError {
    /// The shader library has no source for the requested program.
    #[error("no shader source registered for `{0}`")]
    MissingShader(String),

    /// Shader compilation or pipeline linking failed.
    #[error("failed to build shader program `{name}`: {message}")]
    ShaderBuild { name: String, message: String },

    /// No GPU adapter compatible with the presentation surface.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// The adapter refused to create a device.
    #[error("GPU device request failed: {0}")]
    DeviceRequest(String),

    /// The presentation surface could not provide a frame.
    #[error("surface error: {0}")]
    Surface(String),

    /// The asset collaborator has no glyph atlas for a font.
    #[error("glyph atlas for font {0:?} is unavailable: {1}")]
    MissingAsset(FontId, String),

    /// The glyph atlas image could not be decoded.
    #[error("failed to decode glyph atlas for font {font:?}: {source}")]
    AtlasDecode {
        font: FontId,
        #[source]
        source: png::DecodingError,
    },

    /// The decoded glyph atlas does not have the dimensions the font expects.
    #[error("glyph atlas for font {font:?} is {actual:?}, expected {expected:?}")]
    AtlasSize {
        font: FontId,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// The CPU surface could not be allocated.
    #[error("cannot allocate a {0}x{1} drawing surface")]
    SurfaceAlloc(u32, u32),

    /// A line of a draw-command stream is not a valid command.
    #[error("invalid draw command on line {line}: {source}")]
    CommandParse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Reading a draw-command stream failed.
    #[error("failed to read draw commands: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, CompositorError>;
