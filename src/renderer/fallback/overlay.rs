//! Retained text overlay
//!
//! One node per grid cell, allocated when the overlay is built for a
//! font/profile configuration and never resized afterwards. Syncing against
//! the text grid only touches nodes whose character or color changed.

use crate::primitives::{Rgb, TextGrid};
use crate::profile::{FontProfile, GridShape};

/// A positioned character in the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayNode {
    pub ch: u8,
    pub fill: Rgb,
    /// Top-left pixel of the glyph on the panel
    pub origin: (i32, i32),
}

#[derive(Debug, Clone)]
pub struct TextOverlay {
    shape: GridShape,
    font: FontProfile,
    nodes: Vec<OverlayNode>,
    patches: u64,
}

impl TextOverlay {
    pub fn new(shape: GridShape, font: FontProfile) -> Self {
        let nodes = (0..shape.rows)
            .flat_map(|row| (0..shape.cols).map(move |col| (col, row)))
            .map(|(col, row)| OverlayNode {
                ch: b' ',
                fill: Rgb::BLACK,
                origin: font.glyph_origin(col, row),
            })
            .collect();
        Self {
            shape,
            font,
            nodes,
            patches: 0,
        }
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn font(&self) -> &FontProfile {
        &self.font
    }

    pub fn nodes(&self) -> &[OverlayNode] {
        &self.nodes
    }

    pub fn node(&self, col: u32, row: u32) -> Option<&OverlayNode> {
        self.shape.index(col, row).map(|i| &self.nodes[i])
    }

    /// Total node updates since the overlay was built.
    pub fn patch_count(&self) -> u64 {
        self.patches
    }

    /// Applies the grid's content, returning how many nodes changed.
    ///
    /// Cells outside the overlay's shape are ignored.
    pub fn sync(&mut self, grid: &TextGrid) -> usize {
        let grid_shape = grid.shape();
        let mut patched = 0;
        for (i, cell) in grid.cells().iter().enumerate() {
            let (col, row) = (i as u32 % grid_shape.cols, i as u32 / grid_shape.cols);
            let Some(slot) = self.shape.index(col, row) else {
                continue;
            };
            let node = &mut self.nodes[slot];
            if node.ch != cell.ch || node.fill != cell.color {
                node.ch = cell.ch;
                node.fill = cell.color;
                patched += 1;
            }
        }
        self.patches += patched as u64;
        patched
    }
}
