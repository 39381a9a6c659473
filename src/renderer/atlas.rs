//! Glyph atlases
//!
//! A font's glyphs live in one PNG strip of 94 equally wide cells (character
//! codes 33..=126). Decoding happens off the render thread: [`AtlasLoader`]
//! hands the work to a worker thread and the backend polls for the result,
//! so the texture only becomes usable once decode has finished.

use log::{debug, warn};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;

use crate::error::{CompositorError, Result};
use crate::profile::{FontId, FontProfile, FIRST_GLYPH, GLYPH_COUNT};

/// Source of encoded glyph atlas images.
pub trait FontAssets: Send + Sync {
    /// Returns the PNG bytes of a font's atlas.
    fn load(&self, font: FontId) -> Result<Vec<u8>>;
}

/// Atlases read from `font1.png` .. `font4.png` in a directory.
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
    dir: PathBuf,
}

impl DirectoryAssets {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, font: FontId) -> PathBuf {
        self.dir.join(format!("{}.png", font.asset_name()))
    }
}

impl FontAssets for DirectoryAssets {
    fn load(&self, font: FontId) -> Result<Vec<u8>> {
        let path = self.path_for(font);
        std::fs::read(&path)
            .map_err(|e| CompositorError::MissingAsset(font, format!("{}: {}", path.display(), e)))
    }
}

/// Atlases kept in memory, keyed by font.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssets {
    images: HashMap<FontId, Vec<u8>>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, font: FontId, png: Vec<u8>) {
        self.images.insert(font, png);
    }
}

impl FontAssets for MemoryAssets {
    fn load(&self, font: FontId) -> Result<Vec<u8>> {
        self.images
            .get(&font)
            .cloned()
            .ok_or_else(|| CompositorError::MissingAsset(font, "not registered".into()))
    }
}

/// Decoded RGBA8 glyph strip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphAtlas {
    font: FontId,
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl GlyphAtlas {
    /// A fully transparent atlas with the font's dimensions.
    pub fn blank(font: &FontProfile) -> Self {
        let (width, height) = font.atlas_size;
        Self {
            font: font.font,
            width,
            height,
            rgba: vec![0; (width * height * 4) as usize],
        }
    }

    /// Decodes a PNG and checks it against the font's expected atlas size.
    pub fn decode_png(font: &FontProfile, bytes: &[u8]) -> Result<Self> {
        let decode_err = |source| CompositorError::AtlasDecode {
            font: font.font,
            source,
        };

        let mut decoder = png::Decoder::new(bytes);
        decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
        let mut reader = decoder.read_info().map_err(decode_err)?;
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf).map_err(decode_err)?;
        buf.truncate(info.buffer_size());

        if (info.width, info.height) != font.atlas_size {
            return Err(CompositorError::AtlasSize {
                font: font.font,
                expected: font.atlas_size,
                actual: (info.width, info.height),
            });
        }

        let rgba = match info.color_type {
            png::ColorType::Rgba => buf,
            png::ColorType::Rgb => buf
                .chunks_exact(3)
                .flat_map(|p| [p[0], p[1], p[2], 0xFF])
                .collect(),
            png::ColorType::GrayscaleAlpha => buf
                .chunks_exact(2)
                .flat_map(|p| [p[0], p[0], p[0], p[1]])
                .collect(),
            // EXPAND turns indexed images into RGB(A), leaving plain grayscale
            png::ColorType::Grayscale | png::ColorType::Indexed => {
                buf.iter().flat_map(|&v| [v, v, v, 0xFF]).collect()
            }
        };

        Ok(Self {
            font: font.font,
            width: info.width,
            height: info.height,
            rgba,
        })
    }

    pub fn font(&self) -> FontId {
        self.font
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    /// Atlas slot of a character, `None` for space and non-printable codes.
    pub fn glyph_index(ch: u8) -> Option<u32> {
        let index = u32::from(ch.checked_sub(FIRST_GLYPH)?);
        (index < GLYPH_COUNT).then_some(index)
    }

    /// Ink coverage (0..=255) of pixel (gx, gy) inside a glyph.
    pub fn coverage(&self, glyph: u32, gx: u32, gy: u32) -> u8 {
        let glyph_w = self.width / GLYPH_COUNT;
        if glyph >= GLYPH_COUNT || gx >= glyph_w || gy >= self.height {
            return 0;
        }
        let offset = ((gy * self.width + glyph * glyph_w + gx) * 4) as usize;
        let (r, a) = (self.rgba[offset], self.rgba[offset + 3]);
        ((u16::from(r) * u16::from(a)) / 255) as u8
    }
}

/// One-shot asynchronous atlas decode.
///
/// Only the most recent request is kept; a result for a font that has been
/// replaced in the meantime is dropped.
pub struct AtlasLoader {
    assets: Arc<dyn FontAssets>,
    pending: Option<(FontId, Receiver<Result<GlyphAtlas>>)>,
}

impl AtlasLoader {
    pub fn new(assets: Arc<dyn FontAssets>) -> Self {
        Self {
            assets,
            pending: None,
        }
    }

    /// Starts decoding the atlas for `font` on a worker thread.
    pub fn request(&mut self, font: &FontProfile) {
        if let Some((stale, _)) = self.pending.take() {
            debug!("Discarding pending atlas load for font {}", stale.index());
        }

        let (tx, rx) = mpsc::channel();
        let assets = Arc::clone(&self.assets);
        let profile = *font;
        std::thread::spawn(move || {
            let result = assets
                .load(profile.font)
                .and_then(|bytes| GlyphAtlas::decode_png(&profile, &bytes));
            // The receiver is gone if a newer font was requested
            let _ = tx.send(result);
        });
        self.pending = Some((font.font, rx));
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Returns the decoded atlas once the worker has finished.
    pub fn poll(&mut self) -> Result<Option<GlyphAtlas>> {
        let Some((font, rx)) = &self.pending else {
            return Ok(None);
        };
        let font = *font;
        match rx.try_recv() {
            Ok(result) => {
                self.pending = None;
                result.map(Some)
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                self.pending = None;
                warn!("Atlas worker for font {} exited without a result", font.index());
                Err(CompositorError::MissingAsset(font, "decode worker exited".into()))
            }
        }
    }

    /// Blocks until the pending load finishes.
    pub fn wait(&mut self) -> Result<Option<GlyphAtlas>> {
        let Some((font, rx)) = self.pending.take() else {
            return Ok(None);
        };
        match rx.recv() {
            Ok(result) => result.map(Some),
            Err(_) => Err(CompositorError::MissingAsset(font, "decode worker exited".into())),
        }
    }
}
