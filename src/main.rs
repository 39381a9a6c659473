//! # trackscreen viewer
//!
//! Opens a window showing the emulated tracker panel and optionally replays a
//! captured stream of draw commands into it.

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::dpi::PhysicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Window, WindowBuilder};

use trackscreen::command::{read_commands, Replay};
use trackscreen::config::{expand_home, DEFAULT_CONFIG_PATH};
use trackscreen::renderer::accelerated::gpu::backends_from_str;
use trackscreen::renderer::accelerated::{AcceleratedBackend, GpuContext};
use trackscreen::renderer::atlas::{DirectoryAssets, FontAssets};
use trackscreen::renderer::fallback::FallbackBackend;
use trackscreen::renderer::scheduler::RedrawRequester;
use trackscreen::renderer::shaders::BuiltinShaders;
use trackscreen::{Compositor, DisplayCompositor, DisplayProfile, HostSurface, Rgb, TrackscreenConfig};

mod present;

use present::WgpuPresenter;

/// How often pending glyph atlases are polled while the window is idle.
const ASSET_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "trackscreen")]
#[command(about = "Display compositor for an emulated tracker screen")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Rendering backend: accelerated, fallback
    #[arg(long)]
    backend: Option<String>,

    /// Select GPU backend: auto, vulkan, gl, metal, dx12
    #[arg(long)]
    gpu_backend: Option<String>,

    /// Present mode: auto|fifo|mailbox|immediate (honored if supported)
    #[arg(long)]
    present_mode: Option<String>,

    /// Integer window scale
    #[arg(long)]
    scale: Option<u32>,

    /// Directory containing the glyph atlases
    #[arg(long)]
    font_dir: Option<PathBuf>,

    /// JSON-lines command stream to replay
    #[arg(long)]
    replay: Option<PathBuf>,
}

impl Cli {
    fn apply_overrides(&self, config: &mut TrackscreenConfig) {
        if self.debug {
            config.general.debug = true;
        }
        if let Some(backend) = &self.backend {
            config.renderer.backend = backend.clone();
        }
        if let Some(gpu_backend) = &self.gpu_backend {
            config.renderer.gpu_backend = gpu_backend.clone();
        }
        if let Some(present_mode) = &self.present_mode {
            config.renderer.present_mode = present_mode.clone();
        }
        if let Some(scale) = self.scale {
            config.renderer.window_scale = scale;
        }
        if let Some(font_dir) = &self.font_dir {
            config.assets.font_dir = font_dir.clone();
        }
    }
}

/// The viewer window as seen by the compositor.
struct WindowHost {
    window: Arc<Window>,
    scale: u32,
}

impl RedrawRequester for WindowHost {
    fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

impl HostSurface for WindowHost {
    fn set_logical_size(&self, width: u32, height: u32) {
        let size = PhysicalSize::new(width * self.scale, height * self.scale);
        debug!("Resizing window to {}x{}", size.width, size.height);
        // The platform may apply the size later and report it via Resized
        let _ = self.window.request_inner_size(size);
    }
}

fn build_compositor(
    config: &TrackscreenConfig,
    window: Arc<Window>,
    gpu: GpuContext,
) -> Result<Box<dyn Compositor>> {
    let background = config.background()?;
    let assets: Arc<dyn FontAssets> = Arc::new(DirectoryAssets::new(expand_home(&config.assets.font_dir)?));
    let host = Box::new(WindowHost {
        window: window.clone(),
        scale: config.renderer.window_scale,
    });
    let listener = Box::new(|color: Rgb| debug!("Background is now {:?}", color));

    let compositor: Box<dyn Compositor> = match config.renderer.backend.as_str() {
        "fallback" => {
            let presenter = WgpuPresenter::new(gpu, window, Box::new(BuiltinShaders));
            let backend = FallbackBackend::new()?
                .with_assets(assets)
                .with_target(Box::new(presenter));
            Box::new(DisplayCompositor::new(backend, host, background, listener)?)
        }
        _ => {
            let backend = AcceleratedBackend::new(gpu, Box::new(BuiltinShaders), assets);
            Box::new(DisplayCompositor::new(backend, host, background, listener)?)
        }
    };
    Ok(compositor)
}

fn load_replay(path: &Path, per_frame: usize) -> Result<Replay> {
    let file = File::open(path).with_context(|| format!("Failed to open replay: {}", path.display()))?;
    let commands = read_commands(BufReader::new(file))
        .with_context(|| format!("Failed to read replay: {}", path.display()))?;
    info!("📼 Replaying {} commands from {}", commands.len(), path.display());
    Ok(Replay::new(commands, per_frame))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config may enable debug logging
    let loaded = TrackscreenConfig::load(&cli.config);
    let debug = cli.debug || loaded.as_ref().is_ok_and(|c| c.general.debug);

    // Initialize logging
    if debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    info!("🚀 Starting trackscreen");
    info!(
        "📄 Version: {} ({}, built {})",
        trackscreen::VERSION,
        trackscreen::build_info::GIT_COMMIT.unwrap_or("unknown"),
        trackscreen::build_info::BUILD_DATE
    );

    let mut config = match loaded {
        Ok(config) => {
            info!("✅ Configuration loaded from: {}", cli.config);
            config
        }
        Err(e) => {
            warn!("❌ Failed to load configuration: {:#}", e);
            info!("📝 Using default configuration");
            TrackscreenConfig::default()
        }
    };
    cli.apply_overrides(&mut config);
    config.validate().context("Invalid configuration after command-line overrides")?;

    let mut replay = match &cli.replay {
        Some(path) => Some(load_replay(path, config.replay.commands_per_frame)?),
        None => None,
    };

    let scale = config.renderer.window_scale;
    let panel = DisplayProfile::default();
    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("trackscreen")
            .with_inner_size(PhysicalSize::new(panel.width * scale, panel.height * scale))
            .build(&event_loop)?,
    );

    info!("🎛️ WGPU backend selection: {}", config.renderer.gpu_backend);
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: backends_from_str(&config.renderer.gpu_backend),
        ..Default::default()
    });
    let surface = instance.create_surface(window.clone())?;
    let size = window.inner_size();
    let gpu = pollster::block_on(GpuContext::new(
        &instance,
        surface,
        size.width,
        size.height,
        &config.renderer.present_mode,
    ))?;

    let mut compositor = build_compositor(&config, window.clone(), gpu)?;
    compositor.set_hardware_revision(config.display.hardware_revision)?;
    compositor.set_font(config.display.font)?;
    info!("✨ trackscreen is ready ({} backend)", config.renderer.backend);

    event_loop.run(|event, elwt| {
        let result = match event {
            Event::WindowEvent {
                event: WindowEvent::CloseRequested,
                ..
            } => {
                elwt.exit();
                Ok(())
            }
            Event::WindowEvent {
                event: WindowEvent::Resized(new_size),
                ..
            } => compositor.resize_surface(new_size.width, new_size.height),
            Event::WindowEvent {
                event: WindowEvent::RedrawRequested,
                ..
            } => compositor.render_frame().and_then(|()| match replay.as_mut() {
                Some(replay) if !replay.is_finished() => replay.step(compositor.as_mut()).map(|_| ()),
                _ => Ok(()),
            }),
            Event::AboutToWait => {
                if replay.as_ref().is_some_and(|r| !r.is_finished()) {
                    window.request_redraw();
                }
                elwt.set_control_flow(ControlFlow::WaitUntil(Instant::now() + ASSET_POLL_INTERVAL));
                compositor.poll_assets()
            }
            _ => Ok(()),
        };
        if let Err(e) = result {
            error!("❌ Compositor error: {}", e);
            elwt.exit();
        }
    })?;

    let stats = compositor.stats();
    info!(
        "👋 Exiting after {} frames ({} forced flushes)",
        stats.frames_rendered, stats.forced_flushes
    );
    Ok(())
}
