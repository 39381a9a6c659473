//! Primitive store: the retained state of the three drawable layers.
//!
//! The store only holds data. Deciding what is dirty and when to redraw is
//! left to the damage tracker and the frame scheduler.

use serde::{Deserialize, Serialize};

use crate::profile::GridShape;

/// An 8-bit RGB color as sent by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Normalized channels in 0.0..=1.0.
    pub fn to_f32(self) -> [f32; 3] {
        [
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
        ]
    }

    /// Opaque RGBA8 packed little-endian (R in the low byte), as read by
    /// `unpack4x8unorm` in WGSL.
    pub fn to_rgba_u32(self) -> u32 {
        u32::from_le_bytes([self.r, self.g, self.b, 0xFF])
    }
}

/// A solid rectangle in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub w: u16,
    pub h: u16,
    pub color: Rgb,
}

impl Rect {
    pub const fn new(x: u16, y: u16, w: u16, h: u16, color: Rgb) -> Self {
        Self { x, y, w, h, color }
    }
}

/// Rects accepted since the last redraw, in arrival order.
#[derive(Debug, Clone)]
pub struct RectQueue {
    rects: Vec<Rect>,
    capacity: Option<usize>,
}

impl RectQueue {
    /// `None` means the queue grows without bound within a frame.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            rects: Vec::with_capacity(capacity.unwrap_or(64)),
            capacity,
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.capacity.is_some_and(|cap| self.rects.len() >= cap)
    }

    /// Appends a rect. Returns `false` and leaves the queue untouched when full.
    pub fn push(&mut self, rect: Rect) -> bool {
        if self.is_full() {
            return false;
        }
        self.rects.push(rect);
        true
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn as_slice(&self) -> &[Rect] {
        &self.rects
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }
}

/// Content of one character cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub ch: u8,
    pub color: Rgb,
}

impl Cell {
    /// Space on black.
    pub const BLANK: Self = Self {
        ch: b' ',
        color: Rgb::BLACK,
    };
}

impl Default for Cell {
    fn default() -> Self {
        Self::BLANK
    }
}

/// Fixed grid of character cells.
///
/// The cell array is allocated once per shape and mutated in place.
#[derive(Debug, Clone)]
pub struct TextGrid {
    shape: GridShape,
    cells: Vec<Cell>,
}

impl TextGrid {
    pub fn new(shape: GridShape) -> Self {
        Self {
            shape,
            cells: vec![Cell::BLANK; shape.len()],
        }
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    /// Overwrites a cell. Returns `false` when (col, row) is outside the grid.
    pub fn put(&mut self, col: u32, row: u32, cell: Cell) -> bool {
        match self.shape.index(col, row) {
            Some(i) => {
                self.cells[i] = cell;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, col: u32, row: u32) -> Option<&Cell> {
        self.shape.index(col, row).map(|i| &self.cells[i])
    }

    /// Cells in row-major order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Resets every cell to blank.
    pub fn reset(&mut self) {
        self.cells.fill(Cell::BLANK);
    }

    /// Reallocates for a new shape. All content is lost.
    pub fn reshape(&mut self, shape: GridShape) {
        self.shape = shape;
        self.cells = vec![Cell::BLANK; shape.len()];
    }
}

/// Per-column scope heights plus color and on/off state.
///
/// Columns without a sample hold `None`; every `Some` value is drawable.
#[derive(Debug, Clone)]
pub struct WaveformBuffer {
    samples: Vec<Option<u8>>,
    color: Rgb,
    on: bool,
}

impl WaveformBuffer {
    pub fn new(len: usize) -> Self {
        Self {
            samples: vec![None; len],
            color: Rgb::WHITE,
            on: false,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn color(&self) -> Rgb {
        self.color
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn samples(&self) -> &[Option<u8>] {
        &self.samples
    }

    /// Applies an incoming scope frame.
    ///
    /// Samples are right-aligned so the most recent one lands in the last
    /// column; an empty frame switches the scope off but keeps the retained
    /// samples. Returns whether the layer changed visibly and needs a redraw.
    pub fn apply(&mut self, color: Rgb, data: &[u8]) -> bool {
        self.color = color;

        if data.is_empty() {
            let was_on = self.on;
            self.on = false;
            return was_on;
        }

        let len = self.samples.len();
        let data = &data[data.len().saturating_sub(len)..];
        let start = len - data.len();
        self.samples[..start].fill(None);
        for (slot, &sample) in self.samples[start..].iter_mut().zip(data) {
            *slot = Some(sample);
        }
        self.on = true;
        true
    }

    pub fn turn_off(&mut self) {
        self.on = false;
    }

    /// Resizes to a new column count, dropping retained samples.
    pub fn resize(&mut self, len: usize) {
        self.samples = vec![None; len];
        self.on = false;
    }
}

/// The three layers plus the background color.
#[derive(Debug, Clone)]
pub struct PrimitiveStore {
    pub background: Rgb,
    pub rects: RectQueue,
    pub text: TextGrid,
    pub wave: WaveformBuffer,
}

impl PrimitiveStore {
    pub fn new(
        background: Rgb,
        rect_capacity: Option<usize>,
        grid: GridShape,
        wave_columns: usize,
    ) -> Self {
        Self {
            background,
            rects: RectQueue::new(rect_capacity),
            text: TextGrid::new(grid),
            wave: WaveformBuffer::new(wave_columns),
        }
    }

    /// Blanks every layer. The background color is kept.
    pub fn reset(&mut self) {
        self.rects.clear();
        self.text.reset();
        self.wave.turn_off();
    }
}
