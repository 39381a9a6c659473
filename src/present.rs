//! Window presentation for the fallback backend
//!
//! The fallback backend draws on the CPU. This target flattens each frame,
//! uploads it to a texture the size of the panel and scales it onto the
//! window surface with the shared blit pipeline.

use log::{debug, info};
use std::sync::Arc;
use winit::window::Window;

use trackscreen::error::Result;
use trackscreen::renderer::accelerated::gpu::{self, BlitPipeline};
use trackscreen::renderer::accelerated::GpuContext;
use trackscreen::renderer::fallback::{FallbackFrame, PresentTarget};
use trackscreen::renderer::shaders::{self, ShaderKey, ShaderLibrary};
use trackscreen::{DisplayProfile, HardwareRevision};

struct PanelUpload {
    size: (u32, u32),
    texture: wgpu::Texture,
    blit: BlitPipeline,
    source: wgpu::BindGroup,
}

pub struct WgpuPresenter {
    gpu: GpuContext,
    window: Arc<Window>,
    shaders: Box<dyn ShaderLibrary>,
    upload: Option<PanelUpload>,
}

impl WgpuPresenter {
    pub fn new(gpu: GpuContext, window: Arc<Window>, shaders: Box<dyn ShaderLibrary>) -> Self {
        Self {
            gpu,
            window,
            shaders,
            upload: None,
        }
    }

    /// Revision whose panel matches a frame of `width` pixels.
    fn revision_for(width: u32) -> HardwareRevision {
        HardwareRevision::new(HardwareRevision::MAX)
            .filter(|large| DisplayProfile::for_revision(*large).width == width)
            .unwrap_or_default()
    }

    fn prepare(&mut self, size: (u32, u32)) -> Result<()> {
        if self.upload.as_ref().is_some_and(|u| u.size == size) {
            return Ok(());
        }
        info!("🖼️ Preparing {}x{} panel upload", size.0, size.1);
        let device = self.gpu.device();
        let revision = Self::revision_for(size.0);
        let module = shaders::compile(device, self.shaders.as_ref(), ShaderKey::Blit, revision)?;
        let blit = BlitPipeline::new(device, &module, self.gpu.format())?;
        let (texture, view) = gpu::create_texture(device, "fallback panel", size, wgpu::TextureUsages::COPY_DST);
        let source = blit.bind(device, &view);
        self.upload = Some(PanelUpload {
            size,
            texture,
            blit,
            source,
        });
        Ok(())
    }

    fn track_window_size(&mut self) {
        let inner = self.window.inner_size();
        if (inner.width, inner.height) != self.gpu.size() {
            self.gpu.resize(inner.width, inner.height);
        }
    }
}

impl PresentTarget for WgpuPresenter {
    fn present(&mut self, frame: &FallbackFrame<'_>) -> Result<()> {
        let image = frame.composite();
        let size = (image.width(), image.height());
        self.prepare(size)?;
        self.track_window_size();

        let Some(upload) = &self.upload else {
            return Ok(());
        };
        gpu::write_rgba(self.gpu.queue(), &upload.texture, size, image.data());

        let Some(output) = self.gpu.acquire()? else {
            debug!("No surface texture, dropping fallback frame");
            return Ok(());
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("fallback present"),
            });
        {
            let mut pass = gpu::begin_pass(&mut encoder, "fallback blit", &view, Some(wgpu::Color::BLACK));
            upload.blit.draw(&mut pass, &upload.source);
        }
        self.gpu.queue().submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}
