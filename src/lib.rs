//! # trackscreen
//!
//! Display compositor for an emulated hardware tracker screen. The device
//! draws three kinds of primitives: solid rects over a background color, a
//! monospace character grid, and a single oscilloscope trace. This crate
//! keeps their state, coalesces any burst of changes into one redraw per host
//! refresh, and renders through one of two interchangeable backends.
//!
//! ## Architecture
//!
//! - `profile`: hardware revision and font metrics
//! - `primitives`: rect queue, text grid, waveform buffer
//! - `compositor`: the [`Compositor`] contract and [`DisplayCompositor`]
//! - `renderer`: damage tracking, frame scheduling and the backends
//!   (`accelerated` on wgpu, `fallback` on tiny-skia)
//! - `command`: JSON-lines draw command streams
//! - `config`: TOML configuration
//!
//! ## Usage
//!
//! ```rust
//! use std::cell::Cell;
//! use trackscreen::renderer::fallback::FallbackBackend;
//! use trackscreen::renderer::scheduler::RedrawRequester;
//! use trackscreen::{Compositor, DisplayCompositor, HostSurface, Rgb};
//!
//! #[derive(Default)]
//! struct Host(Cell<bool>);
//! impl RedrawRequester for Host {
//!     fn request_redraw(&self) {
//!         self.0.set(true);
//!     }
//! }
//! impl HostSurface for Host {
//!     fn set_logical_size(&self, _width: u32, _height: u32) {}
//! }
//!
//! # fn main() -> trackscreen::Result<()> {
//! let mut screen = DisplayCompositor::new(
//!     FallbackBackend::new()?,
//!     Box::new(Host::default()),
//!     Rgb::BLACK,
//!     Box::new(|color| println!("background is now {:?}", color)),
//! )?;
//!
//! screen.draw_rect(10, 10, 40, 8, Rgb::new(0, 128, 255))?;
//! screen.draw_text(b'A', 16, 30, Rgb::WHITE);
//!
//! // When the host's refresh callback fires
//! screen.render_frame()?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod compositor;
pub mod config;
pub mod error;
pub mod primitives;
pub mod profile;
pub mod renderer;

// Re-export main types for easy access
pub use command::DrawCommand;
pub use compositor::{Compositor, DisplayCompositor, HostSurface};
pub use config::TrackscreenConfig;
pub use error::{CompositorError, Result};
pub use primitives::Rgb;
pub use profile::{DisplayProfile, FontProfile, HardwareRevision};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build metadata recorded by the build script.
pub mod build_info {
    pub const BUILD_DATE: &str = env!("BUILD_DATE");
    pub const TARGET_TRIPLE: &str = env!("TARGET_TRIPLE");
    pub const GIT_COMMIT: Option<&str> = option_env!("GIT_COMMIT");
}
