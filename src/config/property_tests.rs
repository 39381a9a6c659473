//! Property-based tests for configuration module
//!
//! These tests use proptest to generate random configurations and verify
//! validation boundaries, serialization round-trips and merge behavior.

use super::*;
use proptest::prelude::*;

prop_compose! {
    fn valid_display_config()(
        hardware_revision in 0u8..=3,
        font in 0u8..=3,
        background in "#[0-9A-Fa-f]{6}",
    ) -> DisplayConfig {
        DisplayConfig {
            hardware_revision,
            font,
            background,
        }
    }
}

prop_compose! {
    fn valid_renderer_config()(
        backend in prop_oneof![
            Just("accelerated".to_string()),
            Just("fallback".to_string()),
        ],
        gpu_backend in prop_oneof![
            Just("auto".to_string()),
            Just("vulkan".to_string()),
            Just("gl".to_string()),
            Just("metal".to_string()),
            Just("dx12".to_string()),
        ],
        present_mode in prop_oneof![
            Just("auto".to_string()),
            Just("fifo".to_string()),
            Just("mailbox".to_string()),
            Just("immediate".to_string()),
        ],
        window_scale in 1u32..=8,
    ) -> RendererConfig {
        RendererConfig {
            backend,
            gpu_backend,
            present_mode,
            window_scale,
        }
    }
}

prop_compose! {
    fn valid_config()(
        display in valid_display_config(),
        renderer in valid_renderer_config(),
        font_dir in "[a-z/]{1,24}",
        commands_per_frame in 1usize..10_000,
        debug in any::<bool>(),
    ) -> TrackscreenConfig {
        TrackscreenConfig {
            display,
            renderer,
            assets: AssetsConfig { font_dir: PathBuf::from(font_dir) },
            replay: ReplayConfig { commands_per_frame },
            general: GeneralConfig { debug },
        }
    }
}

proptest! {
    #[test]
    fn test_valid_configs_pass_validation(config in valid_config()) {
        prop_assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_roundtrip_preserves_config(config in valid_config()) {
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: TrackscreenConfig = toml::from_str(&toml_str).unwrap();
        prop_assert_eq!(parsed, config);
    }

    #[test]
    fn test_revision_out_of_range_rejected(
        mut config in valid_config(),
        revision in 4u8..=u8::MAX,
    ) {
        config.display.hardware_revision = revision;
        prop_assert!(config.validate().is_err());
    }

    #[test]
    fn test_window_scale_out_of_range_rejected(
        mut config in valid_config(),
        scale in prop_oneof![Just(0u32), 9u32..1000],
    ) {
        config.renderer.window_scale = scale;
        prop_assert!(config.validate().is_err());
    }

    #[test]
    fn test_hex_color_parses_every_channel(r in any::<u8>(), g in any::<u8>(), b in any::<u8>()) {
        let text = format!("#{:02x}{:02X}{:02x}", r, g, b);
        prop_assert_eq!(parse_hex_color(&text).unwrap(), Rgb::new(r, g, b));
    }

    #[test]
    fn test_malformed_colors_rejected(color in "[^#0-9A-Fa-f]{1,8}") {
        prop_assert!(parse_hex_color(&color).is_err());
    }

    #[test]
    fn test_merge_with_defaults_is_identity(config in valid_config()) {
        let merged = config.clone().merge_partial(TrackscreenConfig::default());
        prop_assert_eq!(merged, config);
    }

    #[test]
    fn test_merge_takes_changed_renderer(
        base in valid_config(),
        renderer in valid_renderer_config(),
    ) {
        let partial = TrackscreenConfig {
            renderer: renderer.clone(),
            ..TrackscreenConfig::default()
        };
        let merged = base.clone().merge_partial(partial);
        if renderer != RendererConfig::default() {
            prop_assert_eq!(merged.renderer, renderer);
        } else {
            prop_assert_eq!(merged.renderer, base.renderer);
        }
        prop_assert_eq!(merged.display, base.display);
    }
}
