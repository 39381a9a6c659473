//! Accelerated backend (wgpu)
//!
//! Frame structure:
//! 1. Rects are drawn as instanced quads into an offscreen target the size of
//!    the panel. A background change is a single clear of that target.
//! 2. `present` blits the target to the surface, then draws the 40x24 cell
//!    grid sampled from the glyph atlas and the scope as a point list on top.
//!
//! Text and scope buffers are only uploaded when their layer changed; the
//! draws themselves are repeated every frame because the surface is not
//! retained between presents.

use log::{debug, info, trace};
use std::sync::Arc;
use wgpu::util::DeviceExt;

use crate::error::Result;
use crate::primitives::{TextGrid, WaveformBuffer};
use crate::profile::{DisplayProfile, FontProfile, GridShape};
use crate::renderer::atlas::{AtlasLoader, FontAssets, GlyphAtlas};
use crate::renderer::shaders::{self, ShaderKey, ShaderLibrary};
use crate::renderer::{RectPass, RenderBackend};

pub mod gpu;
pub mod staging;

pub use gpu::GpuContext;

use gpu::{BlitPipeline, PipelineDesc};
use staging::{CellInstance, RectInstance, WaveParams};

/// Rects accepted between two rect passes.
pub const MAX_RECTS: usize = 1024;

/// Resources sized to the display profile.
struct PanelResources {
    display: DisplayProfile,
    _target: wgpu::Texture,
    target_view: wgpu::TextureView,
    rect_pipeline: wgpu::RenderPipeline,
    rect_buffer: wgpu::Buffer,
    blit: BlitPipeline,
    blit_source: wgpu::BindGroup,
    wave_pipeline: wgpu::RenderPipeline,
    wave_buffer: wgpu::Buffer,
    wave_params: wgpu::Buffer,
    wave_bind_group: wgpu::BindGroup,
}

/// Resources that depend on the font.
struct TextResources {
    font: FontProfile,
    pipeline: wgpu::RenderPipeline,
    cell_buffer: wgpu::Buffer,
    atlas: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

pub struct AcceleratedBackend {
    gpu: GpuContext,
    shaders: Box<dyn ShaderLibrary>,
    loader: AtlasLoader,
    panel: Option<PanelResources>,
    text: Option<TextResources>,
    rect_staging: Vec<RectInstance>,
    cell_staging: Vec<CellInstance>,
    wave_staging: Vec<i32>,
    wave_columns: u32,
}

impl AcceleratedBackend {
    /// Creates the backend. GPU resources are built by the first `configure`.
    pub fn new(gpu: GpuContext, shaders: Box<dyn ShaderLibrary>, assets: Arc<dyn FontAssets>) -> Self {
        Self {
            gpu,
            shaders,
            loader: AtlasLoader::new(assets),
            panel: None,
            text: None,
            rect_staging: Vec::with_capacity(MAX_RECTS),
            cell_staging: Vec::with_capacity(GridShape::ACCELERATED.len()),
            wave_staging: Vec::new(),
            wave_columns: 0,
        }
    }

    fn build_panel(&self, display: &DisplayProfile) -> Result<PanelResources> {
        let device = self.gpu.device();
        let revision = display.revision;
        let format = self.gpu.format();

        let (target, target_view) = gpu::create_texture(
            device,
            "panel target",
            (display.width, display.height),
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        );

        let rect_module = shaders::compile(device, self.shaders.as_ref(), ShaderKey::Rect, revision)?;
        let rect_pipeline = gpu::build_pipeline(
            device,
            PipelineDesc {
                label: "rects",
                module: &rect_module,
                bind_group_layouts: &[],
                buffers: &[RectInstance::layout()],
                format: wgpu::TextureFormat::Rgba8Unorm,
                topology: wgpu::PrimitiveTopology::TriangleList,
            },
        )?;
        let rect_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("rect instances"),
            size: (MAX_RECTS * std::mem::size_of::<RectInstance>()) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let blit_module = shaders::compile(device, self.shaders.as_ref(), ShaderKey::Blit, revision)?;
        let blit = BlitPipeline::new(device, &blit_module, format)?;
        let blit_source = blit.bind(device, &target_view);

        let wave_module = shaders::compile(device, self.shaders.as_ref(), ShaderKey::Wave, revision)?;
        let wave_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("wave params"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let wave_pipeline = gpu::build_pipeline(
            device,
            PipelineDesc {
                label: "wave",
                module: &wave_module,
                bind_group_layouts: &[&wave_layout],
                buffers: &[staging::wave_layout()],
                format,
                topology: wgpu::PrimitiveTopology::PointList,
            },
        )?;
        let wave_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("wave columns"),
            size: (display.width as usize * std::mem::size_of::<i32>()) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let wave_params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("wave params"),
            contents: bytemuck::bytes_of(&WaveParams::new(crate::primitives::Rgb::WHITE)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let wave_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("wave params"),
            layout: &wave_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wave_params.as_entire_binding(),
            }],
        });

        Ok(PanelResources {
            display: *display,
            _target: target,
            target_view,
            rect_pipeline,
            rect_buffer,
            blit,
            blit_source,
            wave_pipeline,
            wave_buffer,
            wave_params,
            wave_bind_group,
        })
    }

    fn build_text(&mut self, font: &FontProfile) -> Result<TextResources> {
        let revision = self
            .panel
            .as_ref()
            .map(|panel| panel.display.revision)
            .unwrap_or_default();
        let device = self.gpu.device();

        let module = shaders::compile(device, self.shaders.as_ref(), ShaderKey::Text(font.font), revision)?;
        let layout = gpu::texture_bind_group_layout(device, "glyph atlas");
        let pipeline = gpu::build_pipeline(
            device,
            PipelineDesc {
                label: "text",
                module: &module,
                bind_group_layouts: &[&layout],
                buffers: &[CellInstance::layout()],
                format: self.gpu.format(),
                topology: wgpu::PrimitiveTopology::TriangleList,
            },
        )?;

        let blank = vec![CellInstance::BLANK; GridShape::ACCELERATED.len()];
        let cell_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("text cells"),
            contents: bytemuck::cast_slice(&blank),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });

        // Blank until the decoded image arrives
        let placeholder = GlyphAtlas::blank(font);
        let (atlas, atlas_view) = gpu::create_texture(
            device,
            "glyph atlas",
            placeholder.size(),
            wgpu::TextureUsages::COPY_DST,
        );
        gpu::write_rgba(self.gpu.queue(), &atlas, placeholder.size(), placeholder.rgba());
        let sampler = gpu::nearest_sampler(device);
        let bind_group = gpu::texture_bind_group(device, &layout, &atlas_view, &sampler);

        self.loader.request(font);

        Ok(TextResources {
            font: *font,
            pipeline,
            cell_buffer,
            atlas,
            bind_group,
        })
    }
}

impl RenderBackend for AcceleratedBackend {
    fn name(&self) -> &'static str {
        "accelerated"
    }

    fn rect_capacity(&self) -> Option<usize> {
        Some(MAX_RECTS)
    }

    fn grid_shape(&self, _display: &DisplayProfile, _font: &FontProfile) -> GridShape {
        GridShape::ACCELERATED
    }

    fn configure(&mut self, display: &DisplayProfile, font: &FontProfile) -> Result<()> {
        info!(
            "🎨 Building GPU resources for {}x{} (revision {})",
            display.width,
            display.height,
            display.revision.get()
        );
        // Old resources go first so nothing refers to the previous profile
        self.panel = None;
        self.text = None;
        self.panel = Some(self.build_panel(display)?);
        self.wave_columns = 0;
        self.configure_font(font)
    }

    fn configure_font(&mut self, font: &FontProfile) -> Result<()> {
        debug!("Building text resources for {}", font.font.asset_name());
        self.text = None;
        self.text = Some(self.build_text(font)?);
        Ok(())
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> Result<()> {
        self.gpu.resize(width, height);
        Ok(())
    }

    fn draw_rects(&mut self, pass: RectPass<'_>) -> Result<()> {
        let (Some(panel), Some(text)) = (&self.panel, &self.text) else {
            return Ok(());
        };
        staging::stage_rects(pass.rects, &text.font, &mut self.rect_staging);
        let count = self.rect_staging.len().min(MAX_RECTS);
        if count > 0 {
            self.gpu.queue().write_buffer(
                &panel.rect_buffer,
                0,
                bytemuck::cast_slice(&self.rect_staging[..count]),
            );
        }

        let clear = pass.clear.then(|| {
            let [r, g, b] = pass.background.to_f32();
            wgpu::Color {
                r: f64::from(r),
                g: f64::from(g),
                b: f64::from(b),
                a: 1.0,
            }
        });

        let mut encoder = self
            .gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("rect encoder"),
            });
        {
            let mut rpass = gpu::begin_pass(&mut encoder, "rect pass", &panel.target_view, clear);
            if count > 0 {
                let bytes = (count * std::mem::size_of::<RectInstance>()) as wgpu::BufferAddress;
                rpass.set_pipeline(&panel.rect_pipeline);
                rpass.set_vertex_buffer(0, panel.rect_buffer.slice(..bytes));
                rpass.draw(0..6, 0..count as u32);
            }
        }
        self.gpu.queue().submit(std::iter::once(encoder.finish()));
        trace!("Drew {} rects (clear: {})", count, pass.clear);
        Ok(())
    }

    fn draw_text(&mut self, grid: &TextGrid, dirty: bool) -> Result<()> {
        if !dirty {
            return Ok(());
        }
        let Some(text) = &self.text else {
            return Ok(());
        };
        staging::stage_cells(grid, &mut self.cell_staging);
        self.gpu
            .queue()
            .write_buffer(&text.cell_buffer, 0, bytemuck::cast_slice(&self.cell_staging));
        Ok(())
    }

    fn draw_wave(&mut self, wave: &WaveformBuffer, dirty: bool) -> Result<()> {
        if !dirty {
            return Ok(());
        }
        let (Some(panel), Some(text)) = (&self.panel, &self.text) else {
            return Ok(());
        };
        if !wave.is_on() {
            self.wave_columns = 0;
            return Ok(());
        }

        staging::stage_wave(wave, &panel.display, &text.font, &mut self.wave_staging);
        self.wave_staging.truncate(panel.display.width as usize);
        self.wave_columns = self.wave_staging.len() as u32;
        let queue = self.gpu.queue();
        queue.write_buffer(&panel.wave_buffer, 0, bytemuck::cast_slice(&self.wave_staging));
        queue.write_buffer(&panel.wave_params, 0, bytemuck::bytes_of(&WaveParams::new(wave.color())));
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        let Some(frame) = self.gpu.acquire()? else {
            return Ok(());
        };
        let (Some(panel), Some(text)) = (&self.panel, &self.text) else {
            frame.present();
            return Ok(());
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("present encoder"),
            });
        {
            let mut rpass = gpu::begin_pass(&mut encoder, "present pass", &view, Some(wgpu::Color::BLACK));
            panel.blit.draw(&mut rpass, &panel.blit_source);

            rpass.set_pipeline(&text.pipeline);
            rpass.set_bind_group(0, &text.bind_group, &[]);
            rpass.set_vertex_buffer(0, text.cell_buffer.slice(..));
            rpass.draw(0..6, 0..GridShape::ACCELERATED.len() as u32);

            if self.wave_columns > 0 {
                rpass.set_pipeline(&panel.wave_pipeline);
                rpass.set_bind_group(0, &panel.wave_bind_group, &[]);
                rpass.set_vertex_buffer(0, panel.wave_buffer.slice(..));
                rpass.draw(0..self.wave_columns, 0..1);
            }
        }
        self.gpu.queue().submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }

    fn poll_assets(&mut self) -> Result<bool> {
        let Some(atlas) = self.loader.poll()? else {
            return Ok(false);
        };
        let Some(text) = &self.text else {
            return Ok(false);
        };
        if atlas.font() != text.font.font {
            debug!("Dropping stale atlas for {}", atlas.font().asset_name());
            return Ok(false);
        }
        gpu::write_rgba(self.gpu.queue(), &text.atlas, atlas.size(), atlas.rgba());
        debug!("Glyph atlas {} uploaded", atlas.font().asset_name());
        Ok(true)
    }
}
