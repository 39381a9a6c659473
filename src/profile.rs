//! Hardware and font profiles.
//!
//! Everything that depends on the emulated hardware revision or on the
//! selected font is resolved here: display resolution, scope band height,
//! glyph cell metrics and offsets, glyph atlas dimensions and the shader
//! variant to build.

use serde::{Deserialize, Serialize};

use crate::primitives::Rect;

/// Number of glyphs in a font atlas (printable ASCII without space).
pub const GLYPH_COUNT: u32 = 94;

/// Character code of the first glyph stored in an atlas.
pub const FIRST_GLYPH: u8 = 33;

/// Hardware revision of the emulated device (0..=3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct HardwareRevision(u8);

impl HardwareRevision {
    /// Highest revision known to the compositor.
    pub const MAX: u8 = 3;

    /// Returns `None` for unknown revisions.
    pub const fn new(value: u8) -> Option<Self> {
        if value <= Self::MAX {
            Some(Self(value))
        } else {
            None
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    /// Revision 3 has the 480x320 panel and its own glyph sets.
    pub const fn has_large_display(self) -> bool {
        self.0 == 3
    }

    /// Suffix used to look up resolution-specific shader programs.
    pub const fn shader_variant(self) -> u8 {
        if self.has_large_display() {
            2
        } else {
            1
        }
    }
}

impl TryFrom<u8> for HardwareRevision {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("unknown hardware revision {value}"))
    }
}

impl From<HardwareRevision> for u8 {
    fn from(rev: HardwareRevision) -> Self {
        rev.0
    }
}

/// Resolved display geometry for a hardware revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayProfile {
    pub width: u32,
    pub height: u32,
    pub revision: HardwareRevision,
    /// Lowest row (exclusive bound) the oscilloscope may draw into.
    pub max_scope_height: u32,
}

impl DisplayProfile {
    pub const fn for_revision(revision: HardwareRevision) -> Self {
        if revision.has_large_display() {
            Self {
                width: 480,
                height: 320,
                revision,
                max_scope_height: 38,
            }
        } else {
            Self {
                width: 320,
                height: 240,
                revision,
                max_scope_height: 20,
            }
        }
    }

    /// Whether a rect paints the whole visible area.
    ///
    /// Such rects are background changes, never queued fills.
    pub fn covers(&self, rect: &Rect) -> bool {
        rect.x == 0
            && rect.y == 0
            && u32::from(rect.w) >= self.width
            && u32::from(rect.h) >= self.height
    }
}

impl Default for DisplayProfile {
    fn default() -> Self {
        Self::for_revision(HardwareRevision::default())
    }
}

/// One of the four glyph sets (0..=3).
///
/// Fonts 0 and 1 belong to the small-display revisions, 2 and 3 to revision 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FontId(u8);

impl FontId {
    pub const fn new(index: u8) -> Option<Self> {
        if index <= 3 {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Maps a font selection from the device to the glyph set for `revision`.
    pub fn resolve(requested: u8, revision: HardwareRevision) -> Option<Self> {
        let index = if revision.has_large_display() {
            requested.checked_add(2)?
        } else {
            requested
        };
        Self::new(index)
    }

    pub const fn index(self) -> u8 {
        self.0
    }

    /// Asset and shader name for this font (`font1` .. `font4`).
    pub fn asset_name(self) -> String {
        format!("font{}", self.0 + 1)
    }
}

// cell width, cell height, horizontal offset, vertical offset, atlas width, atlas height
const FONT_TABLE: [(u32, u32, i32, i32, u32, u32); 4] = [
    (8, 10, 0, 0, 470, 7),
    (10, 12, 0, -20, 752, 9),
    (12, 14, 0, -2, 846, 9),
    (12, 14, 0, -2, 940, 10),
];

/// Glyph cell metrics for a font.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontProfile {
    pub font: FontId,
    pub cell_width: u32,
    pub cell_height: u32,
    pub horizontal_offset: i32,
    pub vertical_offset: i32,
    /// Dimensions of the glyph atlas image in pixels.
    pub atlas_size: (u32, u32),
}

impl FontProfile {
    pub fn for_font(font: FontId) -> Self {
        let (cell_width, cell_height, horizontal_offset, vertical_offset, aw, ah) =
            FONT_TABLE[usize::from(font.index())];
        Self {
            font,
            cell_width,
            cell_height,
            horizontal_offset,
            vertical_offset,
            atlas_size: (aw, ah),
        }
    }

    /// Size of a single glyph inside the atlas.
    pub fn glyph_size(&self) -> (u32, u32) {
        (self.atlas_size.0 / GLYPH_COUNT, self.atlas_size.1)
    }

    /// Grid cell (column, row) containing a pixel coordinate.
    pub fn cell_at(&self, x: u16, y: u16) -> (u32, u32) {
        (
            u32::from(x) / self.cell_width,
            u32::from(y) / self.cell_height,
        )
    }

    /// Top-left pixel of the glyph drawn in a cell.
    ///
    /// Glyphs sit on the cell baseline, shifted by the font offsets.
    pub fn glyph_origin(&self, col: u32, row: u32) -> (i32, i32) {
        let (_, glyph_h) = self.glyph_size();
        let x = (col * self.cell_width) as i32 + self.horizontal_offset;
        let y = ((row + 1) * self.cell_height) as i32 + self.vertical_offset - glyph_h as i32;
        (x, y)
    }

    /// Screen row at which a rect starting at `y` is painted.
    ///
    /// Rects anchored to the top edge are not shifted.
    pub fn rect_y(&self, y: u16) -> u16 {
        if y == 0 {
            return 0;
        }
        let shifted = i32::from(y) + self.vertical_offset;
        shifted.clamp(0, i32::from(u16::MAX)) as u16
    }

    /// Screen row of a scope sample, clamped to the scope band.
    pub fn wave_y(&self, sample: u8, max_scope_height: u32) -> i32 {
        u32::from(sample).min(max_scope_height) as i32 + self.vertical_offset
    }
}

impl Default for FontProfile {
    fn default() -> Self {
        Self::for_font(FontId::default())
    }
}

/// Shape of the character grid a backend maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    pub cols: u32,
    pub rows: u32,
}

impl GridShape {
    /// Fixed instance grid of the accelerated backend.
    pub const ACCELERATED: Self = Self { cols: 40, rows: 24 };

    const FALLBACK_COLS: u32 = 39;
    const FALLBACK_MAX_ROWS: u32 = 25;

    /// Overlay grid of the fallback backend, bounded by the panel height.
    pub fn fallback(display: &DisplayProfile, font: &FontProfile) -> Self {
        let rows = display
            .height
            .div_ceil(font.cell_height)
            .min(Self::FALLBACK_MAX_ROWS);
        Self {
            cols: Self::FALLBACK_COLS,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        (self.cols * self.rows) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Linear index of a cell, or `None` outside the grid.
    pub fn index(&self, col: u32, row: u32) -> Option<usize> {
        (col < self.cols && row < self.rows).then(|| (row * self.cols + col) as usize)
    }
}
