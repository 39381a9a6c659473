//! Shader programs for the accelerated backend
//!
//! Programs are looked up by name through a [`ShaderLibrary`]. Names follow
//! the device's layout:
//! - `rect_v1` / `rect_v2`: instanced rect quads (small / large panel)
//! - `blit_v1` / `blit_v2`: offscreen target to surface
//! - `text1` .. `text4`: character grid, one per glyph set
//! - `wave_v1` / `wave_v2`: scope points
//!
//! [`BuiltinShaders`] generates WGSL for every name, baking the panel and
//! glyph metrics of the variant into constants.

use crate::profile::{
    DisplayProfile, FontId, FontProfile, GridShape, HardwareRevision, GLYPH_COUNT,
};

/// The program for one stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKey {
    Rect,
    Blit,
    Text(FontId),
    Wave,
}

impl ShaderKey {
    /// Library name of this program on a hardware revision.
    pub fn name(self, revision: HardwareRevision) -> String {
        let variant = revision.shader_variant();
        match self {
            ShaderKey::Rect => format!("rect_v{}", variant),
            ShaderKey::Blit => format!("blit_v{}", variant),
            ShaderKey::Text(font) => format!("text{}", font.index() + 1),
            ShaderKey::Wave => format!("wave_v{}", variant),
        }
    }
}

/// Source text lookup keyed by program name.
pub trait ShaderLibrary {
    /// WGSL source for `name`, or `None` if the library has no such program.
    fn source(&self, name: &str) -> Option<String>;
}

/// WGSL programs shipped with the crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinShaders;

impl BuiltinShaders {
    fn variant_display(variant: &str) -> Option<DisplayProfile> {
        let revision = match variant {
            "1" => HardwareRevision::default(),
            "2" => HardwareRevision::new(HardwareRevision::MAX)?,
            _ => return None,
        };
        Some(DisplayProfile::for_revision(revision))
    }

    fn screen_prelude(display: &DisplayProfile) -> String {
        format!(
            "const SCREEN: vec2<f32> = vec2<f32>({:.1}, {:.1});\n",
            display.width as f32, display.height as f32
        )
    }

    fn text_prelude(font: &FontProfile) -> String {
        // Glyph sets 3 and 4 belong to the large panel
        let display = if font.font.index() >= 2 {
            Self::variant_display("2")
        } else {
            Self::variant_display("1")
        }
        .unwrap_or_default();
        let (glyph_w, glyph_h) = font.glyph_size();
        format!(
            "{}const CELL: vec2<f32> = vec2<f32>({:.1}, {:.1});\n\
             const GLYPH: vec2<f32> = vec2<f32>({:.1}, {:.1});\n\
             const OFFSET: vec2<f32> = vec2<f32>({:.1}, {:.1});\n\
             const GRID_COLS: u32 = {}u;\n\
             const GLYPHS: f32 = {:.1};\n",
            Self::screen_prelude(&display),
            font.cell_width as f32,
            font.cell_height as f32,
            glyph_w as f32,
            glyph_h as f32,
            font.horizontal_offset as f32,
            font.vertical_offset as f32,
            GridShape::ACCELERATED.cols,
            GLYPH_COUNT as f32,
        )
    }
}

impl ShaderLibrary for BuiltinShaders {
    fn source(&self, name: &str) -> Option<String> {
        let (prelude, body) = if let Some(variant) = name.strip_prefix("rect_v") {
            (Self::screen_prelude(&Self::variant_display(variant)?), RECT_SHADER)
        } else if let Some(variant) = name.strip_prefix("blit_v") {
            (Self::screen_prelude(&Self::variant_display(variant)?), BLIT_SHADER)
        } else if let Some(variant) = name.strip_prefix("wave_v") {
            (Self::screen_prelude(&Self::variant_display(variant)?), WAVE_SHADER)
        } else if let Some(number) = name.strip_prefix("text") {
            let index = number.parse::<u8>().ok()?.checked_sub(1)?;
            let font = FontProfile::for_font(FontId::new(index)?);
            (Self::text_prelude(&font), TEXT_SHADER)
        } else {
            return None;
        };
        Some(format!("{}{}{}", prelude, COMMON, body))
    }
}

#[cfg(feature = "accelerated")]
pub use gpu::compile;

#[cfg(feature = "accelerated")]
mod gpu {
    use log::debug;

    use super::{ShaderKey, ShaderLibrary};
    use crate::error::{CompositorError, Result};
    use crate::profile::HardwareRevision;

    /// Looks up and compiles a program.
    ///
    /// Missing sources and validation failures are both fatal.
    pub fn compile(
        device: &wgpu::Device,
        library: &dyn ShaderLibrary,
        key: ShaderKey,
        revision: HardwareRevision,
    ) -> Result<wgpu::ShaderModule> {
        let name = key.name(revision);
        let source = library
            .source(&name)
            .ok_or_else(|| CompositorError::MissingShader(name.clone()))?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name.as_str()),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(CompositorError::ShaderBuild {
                name,
                message: error.to_string(),
            });
        }

        debug!("✨ Compiled shader: {}", name);
        Ok(module)
    }
}

/// Helpers shared by every program.
const COMMON: &str = r#"
// Device pixels to clip space, origin top-left
fn to_clip(p: vec2<f32>) -> vec4<f32> {
    return vec4<f32>(p.x / SCREEN.x * 2.0 - 1.0, 1.0 - p.y / SCREEN.y * 2.0, 0.0, 1.0);
}

// Unit quad as two triangles
fn corner(index: u32) -> vec2<f32> {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(0.0, 0.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(1.0, 1.0),
    );
    return corners[index];
}

// Vertex position the rasterizer discards
const OFF_SCREEN: vec4<f32> = vec4<f32>(2.0, 2.0, 0.0, 1.0);
"#;

const RECT_SHADER: &str = r#"
struct RectInstance {
    @location(0) origin: vec2<f32>,
    @location(1) extent: vec2<f32>,
    @location(2) color: u32,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32, rect: RectInstance) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = to_clip(rect.origin + corner(vertex_index) * rect.extent);
    out.color = unpack4x8unorm(rect.color);
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return input.color;
}
"#;

const BLIT_SHADER: &str = r#"
@group(0) @binding(0) var source_texture: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var out: VertexOutput;
    let c = corner(vertex_index);
    out.clip_position = to_clip(c * SCREEN);
    out.uv = c;
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(source_texture, source_sampler, input.uv);
}
"#;

const TEXT_SHADER: &str = r#"
const NO_GLYPH: u32 = 0xffffffffu;

@group(0) @binding(0) var glyph_atlas: texture_2d<f32>;
@group(0) @binding(1) var glyph_sampler: sampler;

struct CellInstance {
    @location(0) glyph: u32,
    @location(1) color: u32,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) color: vec4<f32>,
}

@vertex
fn vs_main(
    @builtin(vertex_index) vertex_index: u32,
    @builtin(instance_index) instance_index: u32,
    cell: CellInstance,
) -> VertexOutput {
    var out: VertexOutput;
    out.color = unpack4x8unorm(cell.color);
    if (cell.glyph == NO_GLYPH) {
        out.clip_position = OFF_SCREEN;
        out.uv = vec2<f32>(0.0, 0.0);
        return out;
    }

    let col = f32(instance_index % GRID_COLS);
    let row = f32(instance_index / GRID_COLS);
    // Glyphs sit on the cell baseline
    let origin = vec2<f32>(
        col * CELL.x + OFFSET.x,
        (row + 1.0) * CELL.y + OFFSET.y - GLYPH.y,
    );
    let c = corner(vertex_index);
    out.clip_position = to_clip(origin + c * GLYPH);
    out.uv = vec2<f32>((f32(cell.glyph) + c.x) / GLYPHS, c.y);
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let texel = textureSample(glyph_atlas, glyph_sampler, input.uv);
    if (texel.r * texel.a < 0.5) {
        discard;
    }
    return vec4<f32>(input.color.rgb, 1.0);
}
"#;

const WAVE_SHADER: &str = r#"
const NO_SAMPLE: i32 = 2147483647i;

struct WaveParams {
    color: vec4<f32>,
}

@group(0) @binding(0) var<uniform> params: WaveParams;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) column: u32, @location(0) y: i32) -> VertexOutput {
    var out: VertexOutput;
    if (y == NO_SAMPLE) {
        out.clip_position = OFF_SCREEN;
        return out;
    }
    out.clip_position = to_clip(vec2<f32>(f32(column) + 0.5, f32(y) + 0.5));
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    return params.color;
}
"#;
