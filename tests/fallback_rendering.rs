//! Integration tests for the CPU fallback backend
//!
//! Drives a full compositor over the tiny-skia surface and checks the pixels
//! and overlay nodes it produces.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tiny_skia::Pixmap;
use trackscreen::profile::{FontId, GLYPH_COUNT};
use trackscreen::renderer::atlas::MemoryAssets;
use trackscreen::renderer::fallback::{FallbackBackend, FallbackFrame, PresentTarget};
use trackscreen::renderer::scheduler::RedrawRequester;
use trackscreen::{Compositor, DisplayCompositor, FontProfile, HostSurface, Result, Rgb};

const RED: Rgb = Rgb::new(255, 0, 0);
const GREEN: Rgb = Rgb::new(0, 255, 0);
const BLUE: Rgb = Rgb::new(0, 0, 255);

#[derive(Default)]
struct TestHost {
    armed: Cell<bool>,
}

impl RedrawRequester for TestHost {
    fn request_redraw(&self) {
        self.armed.set(true);
    }
}

impl HostSurface for TestHost {
    fn set_logical_size(&self, _width: u32, _height: u32) {}
}

/// Keeps the last composited frame.
struct CaptureTarget {
    last: Rc<RefCell<Option<Pixmap>>>,
}

impl PresentTarget for CaptureTarget {
    fn present(&mut self, frame: &FallbackFrame<'_>) -> Result<()> {
        *self.last.borrow_mut() = Some(frame.composite());
        Ok(())
    }
}

/// PNG atlas whose glyphs each have a single inked top-left pixel.
fn dotted_atlas(font: FontId) -> Vec<u8> {
    let profile = FontProfile::for_font(font);
    let (w, h) = profile.atlas_size;
    let glyph_w = w / GLYPH_COUNT;
    let mut data = vec![0u8; (w * h * 4) as usize];
    for glyph in 0..GLYPH_COUNT {
        let offset = (glyph * glyph_w * 4) as usize;
        data[offset..offset + 4].copy_from_slice(&[255, 255, 255, 255]);
    }

    let mut out = Vec::new();
    let mut encoder = png::Encoder::new(&mut out, w, h);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    encoder
        .write_header()
        .and_then(|mut writer| writer.write_image_data(&data))
        .expect("encode atlas");
    out
}

fn headless() -> (DisplayCompositor<FallbackBackend>, Rc<TestHost>) {
    let host = Rc::new(TestHost::default());
    let compositor = DisplayCompositor::new(
        FallbackBackend::new().expect("allocate surface"),
        Box::new(Rc::clone(&host)),
        Rgb::BLACK,
        Box::new(|_| {}),
    )
    .expect("construct compositor");
    (compositor, host)
}

fn refresh(compositor: &mut DisplayCompositor<FallbackBackend>, host: &TestHost) {
    if host.armed.replace(false) {
        compositor.render_frame().expect("render frame");
    }
}

/// Polls until the glyph atlas for the current font is in place.
fn wait_for_atlas(compositor: &mut DisplayCompositor<FallbackBackend>) {
    for _ in 0..500 {
        compositor.poll_assets().expect("poll assets");
        if compositor.backend().atlas().is_some() {
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("glyph atlas never arrived");
}

#[test]
fn test_background_and_rects_are_painted_in_order() {
    let (mut compositor, host) = headless();
    compositor.draw_rect(0, 0, 320, 240, BLUE).unwrap();
    compositor.draw_rect(10, 50, 20, 20, RED).unwrap();
    compositor.draw_rect(20, 60, 20, 20, GREEN).unwrap();
    refresh(&mut compositor, &host);

    let backend = compositor.backend();
    assert_eq!(backend.pixel(100, 200), Some(BLUE));
    assert_eq!(backend.pixel(12, 52), Some(RED));
    // Later rects paint over earlier ones
    assert_eq!(backend.pixel(25, 65), Some(GREEN));
    assert_eq!(backend.pixel(35, 75), Some(GREEN));
}

#[test]
fn test_rects_accumulate_until_background_change() {
    let (mut compositor, host) = headless();
    compositor.draw_rect(10, 50, 4, 4, RED).unwrap();
    refresh(&mut compositor, &host);
    compositor.draw_rect(40, 50, 4, 4, GREEN).unwrap();
    refresh(&mut compositor, &host);

    assert_eq!(compositor.backend().pixel(11, 51), Some(RED));
    assert_eq!(compositor.backend().pixel(41, 51), Some(GREEN));

    compositor.draw_rect(0, 0, 320, 240, BLUE).unwrap();
    refresh(&mut compositor, &host);
    assert_eq!(compositor.backend().pixel(11, 51), Some(BLUE));
    assert_eq!(compositor.backend().pixel(41, 51), Some(BLUE));
}

#[test]
fn test_rects_shift_by_font_offset() {
    let (mut compositor, host) = headless();
    // Font 1 draws everything 20 rows higher
    compositor.set_font(1).unwrap();
    compositor.draw_rect(0, 100, 10, 10, RED).unwrap();
    refresh(&mut compositor, &host);

    assert_eq!(compositor.backend().pixel(5, 85), Some(RED));
    assert_eq!(compositor.backend().pixel(5, 105), Some(Rgb::BLACK));
}

#[test]
fn test_wave_plots_one_point_per_column() {
    let (mut compositor, host) = headless();
    compositor.draw_wave(GREEN, &[3, 7, 250]);
    refresh(&mut compositor, &host);

    let backend = compositor.backend();
    assert_eq!(backend.pixel(317, 3), Some(GREEN));
    assert_eq!(backend.pixel(318, 7), Some(GREEN));
    // Clamped to the scope band
    assert_eq!(backend.pixel(319, 20), Some(GREEN));
    // Columns without samples stay empty
    assert!((0..=20).all(|y| backend.pixel(316, y) == Some(Rgb::BLACK)));
}

#[test]
fn test_wave_switch_off_clears_band() {
    let (mut compositor, host) = headless();
    compositor.draw_rect(0, 0, 320, 240, BLUE).unwrap();
    compositor.draw_wave(GREEN, &[3]);
    refresh(&mut compositor, &host);
    assert_eq!(compositor.backend().pixel(319, 3), Some(GREEN));

    compositor.draw_wave(GREEN, &[]);
    refresh(&mut compositor, &host);
    assert_eq!(compositor.backend().pixel(319, 3), Some(BLUE));
}

#[test]
fn test_overlay_only_patches_changed_cells() {
    let (mut compositor, host) = headless();
    refresh(&mut compositor, &host);
    let baseline = compositor.backend().overlay().patch_count();

    compositor.draw_text(b'A', 8, 10, RED);
    compositor.draw_text(b'B', 16, 10, RED);
    refresh(&mut compositor, &host);
    assert_eq!(compositor.backend().overlay().patch_count(), baseline + 2);

    // Rewriting identical content marks the layer but patches nothing
    compositor.draw_text(b'A', 8, 10, RED);
    refresh(&mut compositor, &host);
    assert_eq!(compositor.backend().overlay().patch_count(), baseline + 2);

    let node = compositor.backend().overlay().node(1, 1).unwrap();
    assert_eq!(node.ch, b'A');
    assert_eq!(node.fill, RED);
}

#[test]
fn test_overlay_grid_follows_profile() {
    let (mut compositor, _host) = headless();
    let shape = compositor.backend().overlay().shape();
    assert_eq!((shape.cols, shape.rows), (39, 24));

    compositor.set_hardware_revision(3).unwrap();
    let shape = compositor.backend().overlay().shape();
    // 14 px cells on a 320 px panel
    assert_eq!((shape.cols, shape.rows), (39, 23));
    assert_eq!(compositor.store().text.shape(), shape);
}

#[test]
fn test_top_rows_stay_addressable_under_lifted_font() {
    let (mut compositor, host) = headless();
    compositor.set_font(1).unwrap();
    let shape = compositor.backend().overlay().shape();
    assert_eq!((shape.cols, shape.rows), (39, 20));

    compositor.draw_text(b'Q', 20, 24, RED);
    compositor.draw_text(b'Z', 0, 0, RED);
    refresh(&mut compositor, &host);

    let overlay = compositor.backend().overlay();
    // Row 2 of font 1: y = 3 * 12 - 20 - 9
    let node = overlay.node(2, 2).unwrap();
    assert_eq!(node.ch, b'Q');
    assert_eq!(node.origin, (20, 7));
    // Row 0 is kept but lifted above the panel
    let node = overlay.node(0, 0).unwrap();
    assert_eq!(node.ch, b'Z');
    assert_eq!(node.origin, (0, -17));
}

#[test]
fn test_same_panel_revision_keeps_overlay() {
    let (mut compositor, host) = headless();
    compositor.set_hardware_revision(0).unwrap();
    compositor.set_font(0).unwrap();
    compositor.draw_text(b'A', 8, 0, RED);
    compositor.draw_wave(GREEN, &[1, 2, 3]);
    refresh(&mut compositor, &host);

    compositor.set_hardware_revision(1).unwrap();
    refresh(&mut compositor, &host);

    assert_eq!(compositor.backend().overlay().node(1, 0).unwrap().ch, b'A');
    assert_eq!(compositor.backend().pixel(319, 3), Some(GREEN));
}

#[test]
fn test_composite_draws_glyphs_from_atlas() {
    let mut assets = MemoryAssets::new();
    assets.insert(FontId::new(0).unwrap(), dotted_atlas(FontId::new(0).unwrap()));
    let last = Rc::new(RefCell::new(None));
    let backend = FallbackBackend::new()
        .unwrap()
        .with_assets(Arc::new(assets))
        .with_target(Box::new(CaptureTarget {
            last: Rc::clone(&last),
        }));
    let host = Rc::new(TestHost::default());
    let mut compositor =
        DisplayCompositor::new(backend, Box::new(Rc::clone(&host)), Rgb::BLACK, Box::new(|_| {}))
            .unwrap();

    wait_for_atlas(&mut compositor);
    compositor.draw_text(b'A', 8, 10, GREEN);
    compositor.draw_text(b' ', 16, 10, GREEN);
    refresh(&mut compositor, &host);

    let frame = last.borrow_mut().take().expect("frame presented");
    // Cell (1, 1) of font 0: x = 8, y = 2 * 10 - 7
    let ink = frame.pixel(8, 13).unwrap();
    assert_eq!((ink.red(), ink.green(), ink.blue()), (0, 255, 0));
    let beside = frame.pixel(9, 13).unwrap();
    assert_eq!((beside.red(), beside.green(), beside.blue()), (0, 0, 0));
    // Spaces have no glyph
    let space = frame.pixel(16, 13).unwrap();
    assert_eq!((space.red(), space.green(), space.blue()), (0, 0, 0));
}

#[test]
fn test_missing_atlas_is_reported() {
    let backend = FallbackBackend::new()
        .unwrap()
        .with_assets(Arc::new(MemoryAssets::new()));
    let host = Rc::new(TestHost::default());
    let mut compositor =
        DisplayCompositor::new(backend, Box::new(Rc::clone(&host)), Rgb::BLACK, Box::new(|_| {}))
            .unwrap();

    let mut outcome = Ok(());
    for _ in 0..500 {
        outcome = compositor.poll_assets();
        if outcome.is_err() {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert!(matches!(
        outcome,
        Err(trackscreen::CompositorError::MissingAsset(..))
    ));
}
