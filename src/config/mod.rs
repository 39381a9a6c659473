//! Configuration management for trackscreen
//!
//! Settings are read from a TOML file. Every section is optional and falls
//! back to its defaults, so an empty file is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::primitives::Rgb;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "~/.config/trackscreen/trackscreen.toml";

/// Main configuration struct containing all trackscreen settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TrackscreenConfig {
    /// Emulated panel
    #[serde(default)]
    pub display: DisplayConfig,

    /// Backend selection and presentation
    #[serde(default)]
    pub renderer: RendererConfig,

    /// Glyph atlas location
    #[serde(default)]
    pub assets: AssetsConfig,

    /// Command-stream replay
    #[serde(default)]
    pub replay: ReplayConfig,

    #[serde(default)]
    pub general: GeneralConfig,
}

/// Initial state of the emulated panel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    /// Hardware revision (0..=3); 3 selects the 480x320 panel
    pub hardware_revision: u8,

    /// Glyph set (0..=3, remapped on revision 3)
    pub font: u8,

    /// Background color as `#RRGGBB`
    pub background: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RendererConfig {
    /// `accelerated` or `fallback`
    pub backend: String,

    /// wgpu backend: auto|vulkan|gl|metal|dx12
    pub gpu_backend: String,

    /// Present mode: auto|fifo|mailbox|immediate (honored if supported)
    pub present_mode: String,

    /// Integer window scale applied to the panel resolution
    pub window_scale: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssetsConfig {
    /// Directory containing `font1.png` .. `font4.png`
    pub font_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReplayConfig {
    /// Commands applied per displayed frame
    pub commands_per_frame: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable debug logging
    pub debug: bool,
}

/// Backend names accepted in `[renderer] backend`.
pub const BACKENDS: [&str; 2] = ["accelerated", "fallback"];

const GPU_BACKENDS: [&str; 5] = ["auto", "vulkan", "gl", "metal", "dx12"];
const PRESENT_MODES: [&str; 4] = ["auto", "fifo", "mailbox", "immediate"];

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            hardware_revision: 0,
            font: 0,
            background: "#000000".to_string(),
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            backend: "accelerated".to_string(),
            gpu_backend: "auto".to_string(),
            present_mode: "auto".to_string(),
            window_scale: 2,
        }
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            font_dir: PathBuf::from("assets"),
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            commands_per_frame: 256,
        }
    }
}

/// Parses `#RRGGBB` (the leading `#` is optional).
pub fn parse_hex_color(s: &str) -> Result<Rgb> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        anyhow::bail!("Invalid color {:?}: expected #RRGGBB", s);
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16).with_context(|| format!("Invalid color {:?}", s))
    };
    Ok(Rgb::new(channel(0)?, channel(2)?, channel(4)?))
}

/// Expands a leading `~` to `$HOME`.
pub fn expand_home(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            Ok(Path::new(&home).join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}

impl TrackscreenConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let expanded_path = expand_home(path.as_ref())?;

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: TrackscreenConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.display.hardware_revision > 3 {
            anyhow::bail!(
                "Invalid hardware_revision {}: must be between 0 and 3",
                self.display.hardware_revision
            );
        }
        if self.display.font > 3 {
            anyhow::bail!("Invalid font {}: must be between 0 and 3", self.display.font);
        }
        parse_hex_color(&self.display.background)?;

        if !BACKENDS.contains(&self.renderer.backend.as_str()) {
            anyhow::bail!("Invalid renderer backend: {}", self.renderer.backend);
        }
        if !GPU_BACKENDS.contains(&self.renderer.gpu_backend.as_str()) {
            anyhow::bail!("Invalid gpu_backend: {}", self.renderer.gpu_backend);
        }
        if !PRESENT_MODES.contains(&self.renderer.present_mode.as_str()) {
            anyhow::bail!("Invalid present_mode: {}", self.renderer.present_mode);
        }
        if !(1..=8).contains(&self.renderer.window_scale) {
            anyhow::bail!("Invalid window_scale: must be between 1 and 8");
        }

        if self.replay.commands_per_frame == 0 {
            anyhow::bail!("Invalid commands_per_frame: must be at least 1");
        }

        Ok(())
    }

    /// Background color as configured. Only valid after `validate`.
    pub fn background(&self) -> Result<Rgb> {
        parse_hex_color(&self.display.background)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }

    /// Merge a partial configuration into this one
    /// Sections of the partial config that differ from the defaults override this config
    pub fn merge_partial(mut self, partial: TrackscreenConfig) -> Self {
        let default_config = TrackscreenConfig::default();

        if partial.display != default_config.display {
            self.display = partial.display;
        }
        if partial.renderer != default_config.renderer {
            self.renderer = partial.renderer;
        }
        if partial.assets != default_config.assets {
            self.assets = partial.assets;
        }
        if partial.replay != default_config.replay {
            self.replay = partial.replay;
        }
        if partial.general != default_config.general {
            self.general = partial.general;
        }

        self
    }
}

#[cfg(test)]
mod tests;

#[cfg(test)]
mod property_tests;
