//! Display compositor
//!
//! `DisplayCompositor` accepts the device's draw primitives, keeps them in the
//! primitive store, tracks which layers changed and coalesces every change into
//! one redraw at the next host refresh. The actual pixels come from a
//! [`RenderBackend`] chosen when the compositor is built.

use log::{debug, info, trace, warn};
use std::rc::Rc;
use std::sync::Arc;

use crate::error::Result;
use crate::primitives::{Cell, PrimitiveStore, Rect, Rgb};
use crate::profile::{DisplayProfile, FontId, FontProfile, HardwareRevision};
use crate::renderer::damage::{Layer, LayerDamage};
use crate::renderer::scheduler::{FrameScheduler, FrameStats, RedrawRequester};
use crate::renderer::{RectPass, RenderBackend};

/// Called with the new color whenever a full-surface rect changes the background.
pub type BackgroundListener = Box<dyn FnMut(Rgb)>;

/// The host display surface the compositor presents into.
pub trait HostSurface: RedrawRequester {
    /// Asks the host to size its surface for a new panel resolution.
    fn set_logical_size(&self, width: u32, height: u32);
}

impl<T: HostSurface + ?Sized> HostSurface for Rc<T> {
    fn set_logical_size(&self, width: u32, height: u32) {
        (**self).set_logical_size(width, height);
    }
}

impl<T: HostSurface + ?Sized> HostSurface for Arc<T> {
    fn set_logical_size(&self, width: u32, height: u32) {
        (**self).set_logical_size(width, height);
    }
}

/// Operations every compositor exposes, whatever backend draws the pixels.
///
/// Mutating calls return immediately; the screen is updated by the next
/// [`render_frame`](Self::render_frame), which the host runs when the redraw
/// it was asked for comes due.
pub trait Compositor {
    /// Switches the emulated hardware revision (0..=3).
    ///
    /// Rebuilds everything sized to the panel. Unknown revisions are ignored.
    fn set_hardware_revision(&mut self, revision: u8) -> Result<()>;

    /// Selects a glyph set (0..=3, remapped on revision 3).
    ///
    /// Rebuilds text resources and blanks the text layer. Unknown fonts are
    /// ignored.
    fn set_font(&mut self, font: u8) -> Result<()>;

    /// Queues a solid rect, or changes the background if it covers the panel.
    fn draw_rect(&mut self, x: u16, y: u16, w: u16, h: u16, color: Rgb) -> Result<()>;

    /// Writes a character into the grid cell containing pixel (x, y).
    fn draw_text(&mut self, ch: u8, x: u16, y: u16, color: Rgb);

    /// Replaces the oscilloscope trace. Empty `samples` turn the scope off.
    fn draw_wave(&mut self, color: Rgb, samples: &[u8]);

    /// Blanks every layer.
    fn clear(&mut self);

    /// Runs the redraw pass the host was asked for.
    fn render_frame(&mut self) -> Result<()>;

    /// Finishes pending asset loads, scheduling a redraw if any completed.
    fn poll_assets(&mut self) -> Result<()>;

    /// Follows a change of the host surface's physical size.
    fn resize_surface(&mut self, width: u32, height: u32) -> Result<()>;

    fn display(&self) -> DisplayProfile;

    fn background(&self) -> Rgb;

    fn stats(&self) -> &FrameStats;
}

/// Compositor state shared by both backends.
pub struct DisplayCompositor<B: RenderBackend> {
    backend: B,
    host: Box<dyn HostSurface>,
    on_background_changed: BackgroundListener,

    display: DisplayProfile,
    font: FontProfile,
    /// Font index as last requested by the device, before revision remapping
    requested_font: u8,
    revision_applied: bool,
    font_applied: bool,

    store: PrimitiveStore,
    damage: LayerDamage,
    scheduler: FrameScheduler,
}

impl<B: RenderBackend> DisplayCompositor<B> {
    /// Builds initial resources for revision 0 and font 0, then schedules the
    /// first frame.
    pub fn new(
        mut backend: B,
        host: Box<dyn HostSurface>,
        background: Rgb,
        on_background_changed: BackgroundListener,
    ) -> Result<Self> {
        let display = DisplayProfile::default();
        let font = FontProfile::default();

        info!("🎨 Building {} compositor at {}x{}", backend.name(), display.width, display.height);
        backend.configure(&display, &font)?;
        host.set_logical_size(display.width, display.height);

        let store = PrimitiveStore::new(
            background,
            backend.rect_capacity(),
            backend.grid_shape(&display, &font),
            display.width as usize,
        );

        let mut compositor = Self {
            backend,
            host,
            on_background_changed,
            display,
            font,
            requested_font: 0,
            revision_applied: false,
            font_applied: false,
            store,
            damage: LayerDamage::new(),
            scheduler: FrameScheduler::new(),
        };
        compositor.damage.mark_all();
        compositor.request_redraw();
        Ok(compositor)
    }

    pub fn store(&self) -> &PrimitiveStore {
        &self.store
    }

    pub fn damage(&self) -> &LayerDamage {
        &self.damage
    }

    pub fn font(&self) -> FontProfile {
        self.font
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn is_frame_queued(&self) -> bool {
        self.scheduler.is_frame_queued()
    }

    fn request_redraw(&mut self) {
        self.scheduler.request(self.host.as_ref());
    }

    /// Draws the queued rects right away to make room in the queue.
    fn flush_rects(&mut self) -> Result<()> {
        debug!("Rect queue full ({} rects), flushing", self.store.rects.len());
        let clear = self.damage.take_full_clear();
        self.backend.draw_rects(RectPass {
            background: self.store.background,
            clear,
            rects: self.store.rects.as_slice(),
        })?;
        self.store.rects.clear();
        self.scheduler.record_forced_flush();
        Ok(())
    }

    /// Matches the text grid to what the backend renders for the current
    /// profile. A new shape always starts blank; an unchanged one is only
    /// blanked when `blank` is set.
    fn rebuild_text_grid(&mut self, blank: bool) {
        let shape = self.backend.grid_shape(&self.display, &self.font);
        if shape == self.store.text.shape() {
            if blank {
                self.store.text.reset();
            }
        } else {
            debug!("Text grid reshaped to {}x{}", shape.cols, shape.rows);
            self.store.text.reshape(shape);
        }
    }

    fn resolve_font(&self, requested: u8, revision: HardwareRevision) -> FontId {
        FontId::resolve(requested, revision).unwrap_or_else(|| {
            warn!(
                "Font {} has no glyph set on revision {}, using the first one",
                requested,
                revision.get()
            );
            FontId::resolve(0, revision).unwrap_or_default()
        })
    }

    fn draw_layers(&mut self) -> Result<()> {
        if self.damage.is_dirty(Layer::Rects) {
            self.backend.draw_rects(RectPass {
                background: self.store.background,
                clear: self.damage.needs_full_clear(),
                rects: self.store.rects.as_slice(),
            })?;
            self.store.rects.clear();
            self.damage.take(Layer::Rects);
        }

        let text_dirty = self.damage.is_dirty(Layer::Text);
        self.backend.draw_text(&self.store.text, text_dirty)?;
        self.damage.take(Layer::Text);

        let wave_dirty = self.damage.is_dirty(Layer::Wave);
        self.backend.draw_wave(&self.store.wave, wave_dirty)?;
        self.damage.take(Layer::Wave);

        self.backend.present()
    }
}

impl<B: RenderBackend> Compositor for DisplayCompositor<B> {
    fn set_hardware_revision(&mut self, revision: u8) -> Result<()> {
        let Some(revision) = HardwareRevision::new(revision) else {
            warn!("Ignoring unknown hardware revision {}", revision);
            return Ok(());
        };
        if self.revision_applied && revision == self.display.revision {
            return Ok(());
        }

        let display = DisplayProfile::for_revision(revision);
        let font = FontProfile::for_font(self.resolve_font(self.requested_font, revision));
        info!(
            "🔄 Hardware revision {}: {}x{} panel, font {}",
            revision.get(),
            display.width,
            display.height,
            font.font.index()
        );
        self.backend.configure(&display, &font)?;

        let panel_changed = (display.width, display.height) != (self.display.width, self.display.height);
        let font_changed = font.font != self.font.font;
        self.display = display;
        self.font = font;
        self.revision_applied = true;
        self.host
            .set_logical_size(self.display.width, self.display.height);

        // Layer content survives a rebuild unless its geometry changed
        if panel_changed {
            self.store.rects.clear();
            self.store.wave.resize(self.display.width as usize);
        }
        self.rebuild_text_grid(font_changed);
        self.damage.mark_all();
        self.request_redraw();
        Ok(())
    }

    fn set_font(&mut self, font: u8) -> Result<()> {
        let Some(resolved) = FontId::resolve(font, self.display.revision) else {
            warn!("Ignoring unknown font {}", font);
            return Ok(());
        };
        if self.font_applied && resolved == self.font.font {
            return Ok(());
        }
        let profile = FontProfile::for_font(resolved);
        info!("🔤 Font {} ({})", resolved.index(), resolved.asset_name());
        self.backend.configure_font(&profile)?;

        self.font = profile;
        self.font_applied = true;
        self.requested_font = font;

        self.rebuild_text_grid(true);
        self.damage.mark(Layer::Text);
        // The scope is drawn with the font's vertical offset
        self.damage.mark(Layer::Wave);
        self.request_redraw();
        Ok(())
    }

    fn draw_rect(&mut self, x: u16, y: u16, w: u16, h: u16, color: Rgb) -> Result<()> {
        let rect = Rect::new(x, y, w, h, color);

        if self.display.covers(&rect) {
            trace!("Background changed to {:?}", color);
            self.store.background = color;
            self.store.rects.clear();
            self.damage.mark_full_clear();
            (self.on_background_changed)(color);
            self.request_redraw();
            return Ok(());
        }

        if self.store.rects.is_full() {
            self.flush_rects()?;
        }
        self.store.rects.push(rect);
        self.damage.mark(Layer::Rects);
        self.request_redraw();
        Ok(())
    }

    fn draw_text(&mut self, ch: u8, x: u16, y: u16, color: Rgb) {
        let (col, row) = self.font.cell_at(x, y);
        if !self.store.text.put(col, row, Cell { ch, color }) {
            return;
        }
        self.damage.mark(Layer::Text);
        self.request_redraw();
    }

    fn draw_wave(&mut self, color: Rgb, samples: &[u8]) {
        if !self.store.wave.apply(color, samples) {
            return;
        }
        self.damage.mark(Layer::Wave);
        self.request_redraw();
    }

    fn clear(&mut self) {
        self.store.reset();
        self.damage.mark_all();
        self.request_redraw();
    }

    fn render_frame(&mut self) -> Result<()> {
        self.scheduler.begin_frame();
        let result = self.draw_layers();
        self.scheduler.complete_frame(self.host.as_ref());
        result
    }

    fn poll_assets(&mut self) -> Result<()> {
        if self.backend.poll_assets()? {
            debug!("Glyph atlas ready, redrawing text");
            self.damage.mark(Layer::Text);
            self.request_redraw();
        }
        Ok(())
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> Result<()> {
        self.backend.resize_surface(width, height)?;
        self.request_redraw();
        Ok(())
    }

    fn display(&self) -> DisplayProfile {
        self.display
    }

    fn background(&self) -> Rgb {
        self.store.background
    }

    fn stats(&self) -> &FrameStats {
        self.scheduler.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompositorError;
    use crate::primitives::{TextGrid, WaveformBuffer};
    use crate::profile::GridShape;
    use std::cell::{Cell as StdCell, RefCell};

    #[derive(Default)]
    struct NullHost {
        redraws: StdCell<u32>,
        size: StdCell<(u32, u32)>,
    }

    impl RedrawRequester for NullHost {
        fn request_redraw(&self) {
            self.redraws.set(self.redraws.get() + 1);
        }
    }

    impl HostSurface for NullHost {
        fn set_logical_size(&self, width: u32, height: u32) {
            self.size.set((width, height));
        }
    }

    #[derive(Default)]
    struct CountingBackend {
        configures: u32,
        font_builds: u32,
        rect_passes: Vec<(bool, usize)>,
        fail_builds: bool,
    }

    impl RenderBackend for CountingBackend {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn rect_capacity(&self) -> Option<usize> {
            Some(4)
        }
        fn grid_shape(&self, _: &DisplayProfile, _: &FontProfile) -> GridShape {
            GridShape::ACCELERATED
        }
        fn configure(&mut self, _: &DisplayProfile, _: &FontProfile) -> Result<()> {
            self.configures += 1;
            if self.fail_builds {
                return Err(CompositorError::MissingShader("rect_v2".into()));
            }
            Ok(())
        }
        fn configure_font(&mut self, _: &FontProfile) -> Result<()> {
            self.font_builds += 1;
            if self.fail_builds {
                return Err(CompositorError::MissingShader("text2".into()));
            }
            Ok(())
        }
        fn resize_surface(&mut self, _: u32, _: u32) -> Result<()> {
            Ok(())
        }
        fn draw_rects(&mut self, pass: RectPass<'_>) -> Result<()> {
            self.rect_passes.push((pass.clear, pass.rects.len()));
            Ok(())
        }
        fn draw_text(&mut self, _: &TextGrid, _: bool) -> Result<()> {
            Ok(())
        }
        fn draw_wave(&mut self, _: &WaveformBuffer, _: bool) -> Result<()> {
            Ok(())
        }
        fn present(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn build() -> (DisplayCompositor<CountingBackend>, Rc<NullHost>, Rc<RefCell<Vec<Rgb>>>) {
        let host = Rc::new(NullHost::default());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let compositor = DisplayCompositor::new(
            CountingBackend::default(),
            Box::new(Rc::clone(&host)),
            Rgb::BLACK,
            Box::new(move |c| sink.borrow_mut().push(c)),
        )
        .unwrap();
        (compositor, host, seen)
    }

    #[test]
    fn test_construction_builds_and_schedules_first_frame() {
        let (compositor, host, _) = build();
        assert_eq!(compositor.backend().configures, 1);
        assert_eq!(host.size.get(), (320, 240));
        assert_eq!(host.redraws.get(), 1);
        assert!(compositor.damage().needs_full_clear());
        assert_eq!(compositor.store().wave.len(), 320);
    }

    #[test]
    fn test_background_rect_never_queued() {
        let (mut compositor, _, seen) = build();
        let red = Rgb::new(200, 0, 0);
        compositor.draw_rect(10, 10, 5, 5, red).unwrap();
        compositor.draw_rect(0, 0, 320, 240, red).unwrap();

        assert!(compositor.store().rects.is_empty());
        assert_eq!(compositor.background(), red);
        assert_eq!(*seen.borrow(), vec![red]);
    }

    #[test]
    fn test_overflow_flushes_before_append() {
        let (mut compositor, _, _) = build();
        compositor.render_frame().unwrap();
        for i in 0..5 {
            compositor.draw_rect(i, 1, 1, 1, Rgb::WHITE).unwrap();
        }
        assert_eq!(compositor.store().rects.len(), 1);
        assert_eq!(compositor.backend().rect_passes.last(), Some(&(false, 4)));
        assert_eq!(compositor.stats().forced_flushes, 1);
    }

    #[test]
    fn test_revision_change_resizes_host_and_scope() {
        let (mut compositor, host, _) = build();
        compositor.set_hardware_revision(3).unwrap();

        assert_eq!(host.size.get(), (480, 320));
        assert_eq!(compositor.store().wave.len(), 480);
        assert_eq!(compositor.font().font, FontId::new(2).unwrap());

        compositor.set_hardware_revision(3).unwrap();
        assert_eq!(compositor.backend().configures, 2);
    }

    #[test]
    fn test_invalid_selections_ignored() {
        let (mut compositor, _, _) = build();
        compositor.set_hardware_revision(7).unwrap();
        compositor.set_font(9).unwrap();
        assert_eq!(compositor.backend().configures, 1);
        assert_eq!(compositor.backend().font_builds, 0);
    }

    #[test]
    fn test_failed_rebuild_can_be_retried() {
        let (mut compositor, _, _) = build();
        compositor.backend_mut().fail_builds = true;
        assert!(compositor.set_hardware_revision(3).is_err());
        assert!(compositor.set_font(1).is_err());
        assert_eq!(compositor.display().width, 320);
        assert_eq!(compositor.font().font, FontId::new(0).unwrap());

        compositor.backend_mut().fail_builds = false;
        compositor.set_hardware_revision(3).unwrap();
        assert_eq!(compositor.display().width, 480);
        assert_eq!(compositor.backend().configures, 3);

        compositor.set_font(1).unwrap();
        assert_eq!(compositor.font().font, FontId::new(3).unwrap());
    }

    #[test]
    fn test_same_panel_revision_keeps_layers() {
        let (mut compositor, _, _) = build();
        compositor.draw_text(b'A', 8, 0, Rgb::WHITE);
        compositor.draw_wave(Rgb::WHITE, &[1, 2, 3]);
        compositor.render_frame().unwrap();
        compositor.draw_rect(4, 4, 2, 2, Rgb::WHITE).unwrap();
        assert!(!compositor.damage().needs_full_clear());

        compositor.set_hardware_revision(1).unwrap();

        assert_eq!(compositor.backend().configures, 2);
        assert_eq!(compositor.store().rects.len(), 1);
        assert_eq!(compositor.store().text.get(1, 0).unwrap().ch, b'A');
        assert!(compositor.store().wave.is_on());
        assert!(compositor.damage().needs_full_clear());
    }
}
