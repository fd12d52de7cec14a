use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use backdrop::ControllerOptions;
use backdropconfig::{BackdropConfig, ImageEntry, ResolvedImage};
use directories_next::ProjectDirs;
use winit::dpi::PhysicalSize;

use crate::cli::Cli;

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "Backdrop";
const APPLICATION: &str = "Coverview";

/// Configuration file merged with command-line overrides.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: BackdropConfig,
    pub images: Vec<ResolvedImage>,
    pub state_dir: PathBuf,
}

pub fn resolve(cli: &Cli) -> Result<Settings> {
    let mut config = match cli.config.as_deref() {
        Some(path) => BackdropConfig::from_path(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => BackdropConfig::default(),
    };

    let background = &mut config.background;
    if let Some(transition) = cli.transition {
        background.transition = transition;
    }
    if let Some(blur) = cli.blur {
        background.blur = blur;
    }
    if let Some(hue) = cli.hue {
        background.hue_shift = hue;
    }
    if let Some(speed) = cli.speed {
        background.rotation_speed = speed;
    }
    if let Some(interval) = cli.interval {
        config.playlist.interval = interval;
    }
    if !cli.images.is_empty() {
        config.playlist.images = cli.images.iter().cloned().map(ImageEntry::Handle).collect();
    }
    config
        .validate()
        .context("command-line overrides produced an invalid configuration")?;

    let images = (0..config.playlist.images.len())
        .filter_map(|index| config.resolved_image(index))
        .collect();

    let state_dir = match cli.state_dir.clone() {
        Some(dir) => dir,
        None => default_state_dir()?,
    };

    Ok(Settings {
        config,
        images,
        state_dir,
    })
}

fn default_state_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
        .ok_or_else(|| anyhow!("failed to determine user directories"))?;
    Ok(dirs.data_dir().to_path_buf())
}

impl Settings {
    pub fn controller_options(&self) -> ControllerOptions {
        let background = &self.config.background;
        ControllerOptions {
            transition: background.transition,
            blur_radius: background.blur,
            rotation_speed: background.rotation_speed,
            min_size: PhysicalSize::new(background.min_size[0], background.min_size[1]),
            frame_interval: background.frame_interval(),
        }
    }

    /// Human-readable summary printed by `--check`.
    pub fn describe(&self) -> String {
        let background = &self.config.background;
        let mut out = String::new();
        let _ = writeln!(out, "transition: {}", format_duration(background.transition));
        let _ = writeln!(out, "blur: {}", background.blur);
        let _ = writeln!(out, "hue_shift: {}", background.hue_shift);
        let _ = writeln!(out, "rotation_speed: {}", background.rotation_speed);
        let _ = writeln!(
            out,
            "min_size: {}x{}",
            background.min_size[0], background.min_size[1]
        );
        let _ = writeln!(out, "fps: {}", background.fps);
        let _ = writeln!(
            out,
            "interval: {}",
            format_duration(self.config.playlist.interval)
        );
        let _ = writeln!(
            out,
            "failure_ttl: {}",
            format_duration(self.config.store.failure_ttl)
        );
        let _ = writeln!(out, "state_dir: {}", self.state_dir.display());
        if self.images.is_empty() {
            let _ = writeln!(out, "images: (none)");
        } else {
            let _ = writeln!(out, "images:");
            for image in &self.images {
                let _ = writeln!(
                    out,
                    "  {} (hue {}, blur {}, speed {})",
                    image.handle, image.hue_shift, image.blur, image.rotation_speed
                );
            }
        }
        out
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        "0s".to_string()
    } else {
        humantime::format_duration(duration).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["coverview", "--state-dir", "/tmp/coverview-test"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn defaults_without_config() {
        let settings = resolve(&parse(&["a.png"])).unwrap();
        assert_eq!(settings.config.background.transition, Duration::from_millis(800));
        assert_eq!(settings.images.len(), 1);
        assert_eq!(settings.images[0].handle, "a.png");
        assert_eq!(settings.images[0].blur, 40.0);
        assert_eq!(settings.state_dir, PathBuf::from("/tmp/coverview-test"));
    }

    #[test]
    fn cli_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backdrop.toml");
        fs::write(
            &path,
            r#"
version = 1

[background]
blur = 10.0
hue_shift = 5.0

[playlist]
interval = "30s"
images = [{ handle = "from-config.png", blur = 2.0 }]
"#,
        )
        .unwrap();

        let from_file = resolve(&parse(&["--config", path.to_str().unwrap()])).unwrap();
        assert_eq!(from_file.images[0].handle, "from-config.png");
        assert_eq!(from_file.images[0].blur, 2.0);
        assert_eq!(from_file.images[0].hue_shift, 5.0);

        let overridden = resolve(&parse(&[
            "--config",
            path.to_str().unwrap(),
            "--hue",
            "90",
            "--interval",
            "5s",
            "cli.png",
        ]))
        .unwrap();
        assert_eq!(overridden.images.len(), 1);
        assert_eq!(overridden.images[0].handle, "cli.png");
        assert_eq!(overridden.images[0].blur, 10.0);
        assert_eq!(overridden.images[0].hue_shift, 90.0);
        assert_eq!(overridden.config.playlist.interval, Duration::from_secs(5));
    }

    #[test]
    fn invalid_override_is_rejected() {
        let err = resolve(&parse(&["--blur", "-3", "a.png"])).unwrap_err();
        assert!(format!("{err:#}").contains("blur"));
    }

    #[test]
    fn controller_options_follow_background_section() {
        let settings = resolve(&parse(&["--transition", "0s", "a.png"])).unwrap();
        let options = settings.controller_options();
        assert_eq!(options.transition, Duration::ZERO);
        assert_eq!(options.min_size, PhysicalSize::new(500, 500));
        assert_eq!(options.frame_interval, Duration::from_secs_f32(1.0 / 60.0));
    }

    #[test]
    fn describe_lists_images_and_durations() {
        let settings = resolve(&parse(&["a.png", "b.png"])).unwrap();
        let text = settings.describe();
        assert!(text.contains("transition: 800ms"));
        assert!(text.contains("interval: 20s"));
        assert!(text.contains("  a.png (hue 0, blur 40, speed 1)"));
        assert!(text.contains("  b.png"));
    }
}
