//! Rendering backends for the display compositor
//!
//! Two interchangeable implementations of [`RenderBackend`] exist:
//! - `accelerated`: wgpu pipeline with an offscreen rect target, an instanced
//!   character grid sampled from a glyph atlas, and a point-list scope
//! - `fallback`: tiny-skia surface for rects and scope, plus a retained text
//!   overlay with one node per cell
//!
//! The compositor owns the layer state and decides what is dirty; a backend
//! only turns that state into pixels.

use crate::error::Result;
use crate::primitives::{Rect, Rgb, TextGrid, WaveformBuffer};
use crate::profile::{DisplayProfile, FontProfile, GridShape};

pub mod atlas;
pub mod damage;
pub mod fallback;
pub mod scheduler;
pub mod shaders;

#[cfg(feature = "accelerated")]
pub mod accelerated;

/// Rect work for one pass over the rect layer.
#[derive(Debug, Clone, Copy)]
pub struct RectPass<'a> {
    /// Current background color
    pub background: Rgb,
    /// Clear the whole surface to `background` before painting `rects`
    pub clear: bool,
    /// Queued rects, oldest first
    pub rects: &'a [Rect],
}

/// A concrete renderer behind the compositor contract.
///
/// Layer methods are called in compositing order (rects, text, wave) and
/// then [`present`](Self::present), once per redraw. `draw_rects` may also be
/// called on its own when the rect queue overflows between frames.
pub trait RenderBackend {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Maximum rects accepted between two rect passes, `None` if unbounded.
    fn rect_capacity(&self) -> Option<usize>;

    /// Character grid this backend renders for a profile.
    fn grid_shape(&self, display: &DisplayProfile, font: &FontProfile) -> GridShape;

    /// Rebuilds every resource for a display profile and font.
    fn configure(&mut self, display: &DisplayProfile, font: &FontProfile) -> Result<()>;

    /// Rebuilds text resources for a new font.
    fn configure_font(&mut self, font: &FontProfile) -> Result<()>;

    /// Adapts to a new host surface size in physical pixels.
    fn resize_surface(&mut self, width: u32, height: u32) -> Result<()>;

    /// Paints queued rects, clearing first if requested.
    fn draw_rects(&mut self, pass: RectPass<'_>) -> Result<()>;

    /// Brings the text layer up to date. `dirty` is false when the grid is
    /// unchanged since the last call.
    fn draw_text(&mut self, grid: &TextGrid, dirty: bool) -> Result<()>;

    /// Brings the scope layer up to date. `dirty` is false when the
    /// waveform is unchanged since the last call.
    fn draw_wave(&mut self, wave: &WaveformBuffer, dirty: bool) -> Result<()>;

    /// Finishes the frame and shows it.
    fn present(&mut self) -> Result<()>;

    /// Completes pending asynchronous asset loads.
    ///
    /// Returns `true` when a load finished and the screen needs a redraw.
    fn poll_assets(&mut self) -> Result<bool> {
        Ok(false)
    }
}
