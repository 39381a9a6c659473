//! Fallback backend (tiny-skia)
//!
//! Rects and the scope are painted straight onto a CPU pixmap the size of
//! the panel. Text lives in a separate [`TextOverlay`] of retained per-cell
//! nodes. A [`PresentTarget`] receives both each frame and decides how to
//! show them; [`FallbackFrame::composite`] flattens them into one image for
//! hosts without a native text layer.

use log::{debug, info, trace};
use std::sync::Arc;
use tiny_skia::{Color, Paint, Pixmap, PremultipliedColorU8, Transform};

use crate::error::{CompositorError, Result};
use crate::primitives::{Rgb, TextGrid, WaveformBuffer};
use crate::profile::{DisplayProfile, FontProfile, GridShape};
use crate::renderer::atlas::{AtlasLoader, FontAssets, GlyphAtlas};
use crate::renderer::{RectPass, RenderBackend};

pub mod overlay;

pub use overlay::{OverlayNode, TextOverlay};

/// Coverage above which an atlas texel counts as ink.
const INK_THRESHOLD: u8 = 128;

/// Receives finished fallback frames.
pub trait PresentTarget {
    fn present(&mut self, frame: &FallbackFrame<'_>) -> Result<()>;
}

/// Borrowed view of everything the fallback backend shows.
pub struct FallbackFrame<'a> {
    pub surface: &'a Pixmap,
    pub overlay: &'a TextOverlay,
    /// `None` until the glyph atlas has been decoded
    pub atlas: Option<&'a GlyphAtlas>,
}

impl FallbackFrame<'_> {
    /// Paints the overlay's glyphs onto a copy of the surface.
    pub fn composite(&self) -> Pixmap {
        let mut out = self.surface.clone();
        let Some(atlas) = self.atlas else {
            return out;
        };
        let (glyph_w, glyph_h) = self.overlay.font().glyph_size();
        let (width, height) = (out.width() as i32, out.height() as i32);
        let pixels = out.pixels_mut();

        for node in self.overlay.nodes() {
            let Some(glyph) = GlyphAtlas::glyph_index(node.ch) else {
                continue;
            };
            let Some(ink) = PremultipliedColorU8::from_rgba(node.fill.r, node.fill.g, node.fill.b, 0xFF)
            else {
                continue;
            };
            for gy in 0..glyph_h {
                for gx in 0..glyph_w {
                    let (x, y) = (node.origin.0 + gx as i32, node.origin.1 + gy as i32);
                    if x < 0 || y < 0 || x >= width || y >= height {
                        continue;
                    }
                    if atlas.coverage(glyph, gx, gy) >= INK_THRESHOLD {
                        pixels[(y * width + x) as usize] = ink;
                    }
                }
            }
        }
        out
    }
}

fn solid_paint(color: Rgb) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, 0xFF);
    paint.anti_alias = false;
    paint
}

fn allocate(display: &DisplayProfile) -> Result<Pixmap> {
    Pixmap::new(display.width, display.height)
        .ok_or(CompositorError::SurfaceAlloc(display.width, display.height))
}

pub struct FallbackBackend {
    display: DisplayProfile,
    font: FontProfile,
    surface: Pixmap,
    overlay: TextOverlay,
    background: Rgb,
    loader: Option<AtlasLoader>,
    atlas: Option<GlyphAtlas>,
    target: Option<Box<dyn PresentTarget>>,
    frames_presented: u64,
}

impl FallbackBackend {
    /// Headless backend without glyph assets or a present target.
    pub fn new() -> Result<Self> {
        let display = DisplayProfile::default();
        let font = FontProfile::default();
        Ok(Self {
            surface: allocate(&display)?,
            overlay: TextOverlay::new(GridShape::fallback(&display, &font), font),
            display,
            font,
            background: Rgb::BLACK,
            loader: None,
            atlas: None,
            target: None,
            frames_presented: 0,
        })
    }

    /// Loads glyph atlases from `assets` whenever the font changes.
    pub fn with_assets(mut self, assets: Arc<dyn FontAssets>) -> Self {
        self.loader = Some(AtlasLoader::new(assets));
        self
    }

    pub fn with_target(mut self, target: Box<dyn PresentTarget>) -> Self {
        self.target = Some(target);
        self
    }

    pub fn surface(&self) -> &Pixmap {
        &self.surface
    }

    pub fn overlay(&self) -> &TextOverlay {
        &self.overlay
    }

    pub fn atlas(&self) -> Option<&GlyphAtlas> {
        self.atlas.as_ref()
    }

    pub fn frame(&self) -> FallbackFrame<'_> {
        FallbackFrame {
            surface: &self.surface,
            overlay: &self.overlay,
            atlas: self.atlas.as_ref(),
        }
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Color of a surface pixel, ignoring the text overlay.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb> {
        self.surface
            .pixel(x, y)
            .map(|p| Rgb::new(p.red(), p.green(), p.blue()))
    }

    fn fill(&mut self, x: i32, y: i32, w: u32, h: u32, color: Rgb) {
        let Some(rect) = tiny_skia::Rect::from_xywh(x as f32, y as f32, w as f32, h as f32) else {
            return;
        };
        self.surface
            .fill_rect(rect, &solid_paint(color), Transform::identity(), None);
    }

    fn rebuild_overlay(&mut self) {
        let shape = GridShape::fallback(&self.display, &self.font);
        self.overlay = TextOverlay::new(shape, self.font);
        self.atlas = None;
        if let Some(loader) = &mut self.loader {
            loader.request(&self.font);
        }
    }
}

impl RenderBackend for FallbackBackend {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn rect_capacity(&self) -> Option<usize> {
        None
    }

    fn grid_shape(&self, display: &DisplayProfile, font: &FontProfile) -> GridShape {
        GridShape::fallback(display, font)
    }

    fn configure(&mut self, display: &DisplayProfile, font: &FontProfile) -> Result<()> {
        info!(
            "🎨 Building {}x{} drawing surface (revision {})",
            display.width,
            display.height,
            display.revision.get()
        );
        self.surface = allocate(display)?;
        self.display = *display;
        self.font = *font;
        self.rebuild_overlay();
        Ok(())
    }

    fn configure_font(&mut self, font: &FontProfile) -> Result<()> {
        debug!("Rebuilding text overlay for {}", font.font.asset_name());
        self.font = *font;
        self.rebuild_overlay();
        Ok(())
    }

    fn resize_surface(&mut self, _width: u32, _height: u32) -> Result<()> {
        // The pixmap keeps the panel resolution; scaling is the target's job
        Ok(())
    }

    fn draw_rects(&mut self, pass: RectPass<'_>) -> Result<()> {
        self.background = pass.background;
        if pass.clear {
            let bg = pass.background;
            self.surface.fill(Color::from_rgba8(bg.r, bg.g, bg.b, 0xFF));
        }
        for rect in pass.rects {
            let y = self.font.rect_y(rect.y);
            self.fill(
                i32::from(rect.x),
                i32::from(y),
                u32::from(rect.w),
                u32::from(rect.h),
                rect.color,
            );
        }
        trace!("Painted {} rects (clear: {})", pass.rects.len(), pass.clear);
        Ok(())
    }

    fn draw_text(&mut self, grid: &TextGrid, dirty: bool) -> Result<()> {
        if dirty {
            let patched = self.overlay.sync(grid);
            trace!("Patched {} overlay nodes", patched);
        }
        Ok(())
    }

    fn draw_wave(&mut self, wave: &WaveformBuffer, dirty: bool) -> Result<()> {
        if !dirty {
            return Ok(());
        }
        let max_scope = self.display.max_scope_height;
        self.fill(0, 0, self.display.width, max_scope + 1, self.background);
        if !wave.is_on() {
            return Ok(());
        }

        let color = wave.color();
        for (x, sample) in wave.samples().iter().enumerate() {
            let Some(height) = sample else {
                continue;
            };
            let y = self.font.wave_y(*height, max_scope);
            self.fill(x as i32, y, 1, 1, color);
        }
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.frames_presented += 1;
        if let Some(mut target) = self.target.take() {
            let result = target.present(&self.frame());
            self.target = Some(target);
            result?;
        }
        Ok(())
    }

    fn poll_assets(&mut self) -> Result<bool> {
        let Some(loader) = &mut self.loader else {
            return Ok(false);
        };
        let Some(atlas) = loader.poll()? else {
            return Ok(false);
        };
        if atlas.font() != self.font.font {
            return Ok(false);
        }
        debug!("Glyph atlas {} ready", atlas.font().asset_name());
        self.atlas = Some(atlas);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{Cell, Rect};
    use crate::profile::FontId;
    use crate::renderer::atlas::MemoryAssets;

    const RED: Rgb = Rgb::new(255, 0, 0);
    const BLUE: Rgb = Rgb::new(0, 0, 255);

    #[test]
    fn test_rects_painted_in_order() {
        let mut backend = FallbackBackend::new().unwrap();
        let rects = [Rect::new(10, 0, 4, 4, RED), Rect::new(12, 0, 4, 4, BLUE)];
        backend
            .draw_rects(RectPass {
                background: Rgb::BLACK,
                clear: true,
                rects: &rects,
            })
            .unwrap();

        assert_eq!(backend.pixel(10, 0), Some(RED));
        assert_eq!(backend.pixel(13, 0), Some(BLUE));
        assert_eq!(backend.pixel(20, 0), Some(Rgb::BLACK));
    }

    #[test]
    fn test_clear_fills_background() {
        let mut backend = FallbackBackend::new().unwrap();
        backend
            .draw_rects(RectPass {
                background: BLUE,
                clear: true,
                rects: &[],
            })
            .unwrap();
        assert_eq!(backend.pixel(0, 0), Some(BLUE));
        assert_eq!(backend.pixel(319, 239), Some(BLUE));
    }

    #[test]
    fn test_zero_sized_rect_ignored() {
        let mut backend = FallbackBackend::new().unwrap();
        let rects = [Rect::new(5, 5, 0, 3, RED)];
        backend
            .draw_rects(RectPass {
                background: Rgb::BLACK,
                clear: false,
                rects: &rects,
            })
            .unwrap();
        assert_eq!(backend.pixel(5, 5), Some(Rgb::BLACK));
    }

    #[test]
    fn test_wave_band_cleared_and_plotted() {
        let mut backend = FallbackBackend::new().unwrap();
        backend
            .draw_rects(RectPass {
                background: BLUE,
                clear: true,
                rects: &[Rect::new(0, 5, 320, 30, RED)],
            })
            .unwrap();

        let mut wave = WaveformBuffer::new(320);
        wave.apply(Rgb::WHITE, &[3, 250]);
        backend.draw_wave(&wave, true).unwrap();

        assert_eq!(backend.pixel(318, 3), Some(Rgb::WHITE));
        // Clamped to the scope band
        assert_eq!(backend.pixel(319, 20), Some(Rgb::WHITE));
        // Band reset to background, rows below it untouched
        assert_eq!(backend.pixel(0, 5), Some(BLUE));
        assert_eq!(backend.pixel(0, 21), Some(RED));
    }

    #[test]
    fn test_clean_wave_untouched() {
        let mut backend = FallbackBackend::new().unwrap();
        let mut wave = WaveformBuffer::new(320);
        wave.apply(Rgb::WHITE, &[3]);
        backend.draw_wave(&wave, false).unwrap();
        assert_eq!(backend.pixel(319, 3), Some(Rgb::BLACK));
    }

    #[test]
    fn test_composite_waits_for_atlas() {
        let font = FontProfile::default();
        let mut assets = MemoryAssets::new();
        assets.insert(font.font, crate::renderer::atlas::tests::encode_atlas(&font));
        let mut backend = FallbackBackend::new().unwrap().with_assets(Arc::new(assets));
        backend.configure(&DisplayProfile::default(), &font).unwrap();

        let mut grid = TextGrid::new(backend.overlay().shape());
        grid.put(1, 0, Cell { ch: b'#', color: RED });
        backend.draw_text(&grid, true).unwrap();

        // Blank until decode completes
        let image = backend.frame().composite();
        assert_eq!(image.pixel(8, 3).map(|p| p.red()), Some(0));

        while !backend.poll_assets().unwrap() {
            std::thread::yield_now();
        }
        let image = backend.frame().composite();
        let px = image.pixel(8, 3).unwrap();
        assert_eq!((px.red(), px.green(), px.blue()), (255, 0, 0));
    }

    #[test]
    fn test_font_change_rebuilds_overlay() {
        let mut backend = FallbackBackend::new().unwrap();
        let font = FontProfile::for_font(FontId::new(1).unwrap());
        backend.configure_font(&font).unwrap();
        assert_eq!(backend.overlay().shape(), GridShape { cols: 39, rows: 20 });
        assert_eq!(backend.overlay().patch_count(), 0);
    }
}
