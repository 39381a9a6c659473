//! CPU-side packing of layer state into GPU instance data.

use bytemuck::{Pod, Zeroable};

use crate::primitives::{Rect, Rgb, TextGrid, WaveformBuffer};
use crate::profile::{DisplayProfile, FontProfile, GridShape};
use crate::renderer::atlas::GlyphAtlas;

/// Glyph slot of a blank cell.
pub const NO_GLYPH: u32 = u32::MAX;

/// Scope column without a sample.
pub const WAVE_NO_SAMPLE: i32 = i32::MAX;

/// One instanced rect quad.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RectInstance {
    pub origin: [f32; 2],
    pub extent: [f32; 2],
    pub color: u32,
}

impl RectInstance {
    const ATTRIBS: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2, 2 => Uint32];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// One character cell of the instanced grid.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct CellInstance {
    pub glyph: u32,
    pub color: u32,
}

impl CellInstance {
    pub const BLANK: Self = Self {
        glyph: NO_GLYPH,
        color: 0,
    };

    const ATTRIBS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Uint32, 1 => Uint32];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Per-column scope heights, one vertex each.
pub fn wave_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Sint32];
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<i32>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBS,
    }
}

/// Uniform block of the scope program.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct WaveParams {
    pub color: [f32; 4],
}

impl WaveParams {
    pub fn new(color: Rgb) -> Self {
        let [r, g, b] = color.to_f32();
        Self {
            color: [r, g, b, 1.0],
        }
    }
}

/// Packs queued rects, applying the font's vertical offset.
pub fn stage_rects(rects: &[Rect], font: &FontProfile, out: &mut Vec<RectInstance>) {
    out.clear();
    out.extend(rects.iter().map(|rect| RectInstance {
        origin: [f32::from(rect.x), f32::from(font.rect_y(rect.y))],
        extent: [f32::from(rect.w), f32::from(rect.h)],
        color: rect.color.to_rgba_u32(),
    }));
}

/// Packs the text grid into the fixed instance grid.
///
/// Cells the grid does not have stay blank.
pub fn stage_cells(grid: &TextGrid, out: &mut Vec<CellInstance>) {
    let target = GridShape::ACCELERATED;
    out.clear();
    out.resize(target.len(), CellInstance::BLANK);

    let shape = grid.shape();
    for (i, cell) in grid.cells().iter().enumerate() {
        let (col, row) = (i as u32 % shape.cols, i as u32 / shape.cols);
        let Some(slot) = target.index(col, row) else {
            continue;
        };
        out[slot] = match GlyphAtlas::glyph_index(cell.ch) {
            Some(glyph) => CellInstance {
                glyph,
                color: cell.color.to_rgba_u32(),
            },
            None => CellInstance::BLANK,
        };
    }
}

/// Packs scope samples as screen rows.
pub fn stage_wave(
    wave: &WaveformBuffer,
    display: &DisplayProfile,
    font: &FontProfile,
    out: &mut Vec<i32>,
) {
    out.clear();
    out.extend(wave.samples().iter().map(|sample| match sample {
        Some(height) => font.wave_y(*height, display.max_scope_height),
        None => WAVE_NO_SAMPLE,
    }));
}
