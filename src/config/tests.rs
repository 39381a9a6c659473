//! Unit tests for configuration module
//!
//! Tests configuration parsing, validation, file round-trips and merging.

use super::*;
use anyhow::Result;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_default_configuration_is_valid() {
    let config = TrackscreenConfig::default();

    assert!(config.validate().is_ok());
    assert_eq!(config.display.hardware_revision, 0);
    assert_eq!(config.renderer.backend, "accelerated");
    assert!(config.replay.commands_per_frame > 0);
    assert_eq!(config.background().unwrap(), Rgb::BLACK);
}

#[test]
fn test_configuration_serialization_roundtrip() -> Result<()> {
    let mut original = TrackscreenConfig::default();
    original.display.hardware_revision = 3;
    original.renderer.backend = "fallback".to_string();

    let toml_string = toml::to_string(&original)?;
    let deserialized: TrackscreenConfig = toml::from_str(&toml_string)?;

    assert_eq!(original, deserialized);
    Ok(())
}

#[test]
fn test_configuration_from_file() -> Result<()> {
    let dir = tempdir()?;
    let file_path = dir.path().join("trackscreen.toml");

    let test_config = r##"
[display]
hardware_revision = 3
font = 1
background = "#102030"

[renderer]
backend = "fallback"
window_scale = 3

[assets]
font_dir = "/opt/trackscreen/fonts"
"##;
    fs::write(&file_path, test_config)?;

    let config = TrackscreenConfig::load(&file_path)?;

    assert_eq!(config.display.hardware_revision, 3);
    assert_eq!(config.display.font, 1);
    assert_eq!(config.background()?, Rgb::new(0x10, 0x20, 0x30));
    assert_eq!(config.renderer.backend, "fallback");
    assert_eq!(config.renderer.window_scale, 3);
    // Unset keys keep their defaults
    assert_eq!(config.renderer.present_mode, "auto");
    assert_eq!(config.assets.font_dir, PathBuf::from("/opt/trackscreen/fonts"));
    assert_eq!(config.replay, ReplayConfig::default());

    Ok(())
}

#[test]
fn test_empty_file_uses_defaults() -> Result<()> {
    let dir = tempdir()?;
    let file_path = dir.path().join("empty.toml");
    fs::write(&file_path, "")?;

    assert_eq!(TrackscreenConfig::load(&file_path)?, TrackscreenConfig::default());
    Ok(())
}

#[test]
fn test_missing_file_reports_path() {
    let err = TrackscreenConfig::load("/nonexistent/trackscreen.toml").unwrap_err();
    assert!(err.to_string().contains("/nonexistent/trackscreen.toml"));
}

#[test]
fn test_malformed_toml_rejected() -> Result<()> {
    let dir = tempdir()?;
    let file_path = dir.path().join("bad.toml");
    fs::write(&file_path, "[display\nfont = 1")?;

    assert!(TrackscreenConfig::load(&file_path).is_err());
    Ok(())
}

#[test]
fn test_validation_rejects_out_of_range_values() {
    let mut config = TrackscreenConfig::default();
    config.display.hardware_revision = 4;
    assert!(config.validate().is_err());

    let mut config = TrackscreenConfig::default();
    config.display.font = 7;
    assert!(config.validate().is_err());

    let mut config = TrackscreenConfig::default();
    config.renderer.window_scale = 0;
    assert!(config.validate().is_err());

    let mut config = TrackscreenConfig::default();
    config.replay.commands_per_frame = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_unknown_names() {
    let mut config = TrackscreenConfig::default();
    config.renderer.backend = "canvas".to_string();
    assert!(config.validate().is_err());

    let mut config = TrackscreenConfig::default();
    config.renderer.gpu_backend = "opengl".to_string();
    assert!(config.validate().is_err());

    let mut config = TrackscreenConfig::default();
    config.renderer.present_mode = "vsync".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_parse_hex_color() {
    assert_eq!(parse_hex_color("#ff8000").unwrap(), Rgb::new(255, 128, 0));
    assert_eq!(parse_hex_color("00FF00").unwrap(), Rgb::new(0, 255, 0));
    assert!(parse_hex_color("#fff").is_err());
    assert!(parse_hex_color("#gg0000").is_err());
    assert!(parse_hex_color("#ff80001").is_err());
}

#[test]
fn test_save_then_load() -> Result<()> {
    let dir = tempdir()?;
    let file_path = dir.path().join("saved.toml");

    let mut config = TrackscreenConfig::default();
    config.display.background = "#abcdef".to_string();
    config.general.debug = true;
    config.save(&file_path)?;

    assert_eq!(TrackscreenConfig::load(&file_path)?, config);
    Ok(())
}

#[test]
fn test_merge_partial_overrides_changed_sections() {
    let base = TrackscreenConfig::default();
    let mut partial = TrackscreenConfig::default();
    partial.renderer.backend = "fallback".to_string();

    let merged = base.merge_partial(partial);
    assert_eq!(merged.renderer.backend, "fallback");
    assert_eq!(merged.display, DisplayConfig::default());
}

#[test]
fn test_merge_partial_keeps_base_for_default_sections() {
    let mut base = TrackscreenConfig::default();
    base.display.hardware_revision = 3;

    let merged = base.clone().merge_partial(TrackscreenConfig::default());
    assert_eq!(merged, base);
}

#[test]
fn test_expand_home() -> Result<()> {
    let home = std::env::var("HOME")?;
    let expanded = expand_home(Path::new("~/.config/trackscreen/trackscreen.toml"))?;
    assert_eq!(expanded, Path::new(&home).join(".config/trackscreen/trackscreen.toml"));

    let absolute = expand_home(Path::new("/etc/trackscreen.toml"))?;
    assert_eq!(absolute, PathBuf::from("/etc/trackscreen.toml"));
    Ok(())
}
