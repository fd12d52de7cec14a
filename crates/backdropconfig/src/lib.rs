use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// Lowest non-zero frame rate accepted by `validate`.
pub const MIN_FPS: f32 = 1.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read configuration at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackdropConfig {
    pub version: u32,
    #[serde(default)]
    pub background: BackgroundSettings,
    #[serde(default)]
    pub playlist: Playlist,
    #[serde(default)]
    pub store: StoreSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackgroundSettings {
    #[serde(deserialize_with = "deserialize_duration")]
    pub transition: Duration,
    pub blur: f32,
    pub hue_shift: f32,
    pub rotation_speed: f32,
    pub min_size: [u32; 2],
    pub fps: f32,
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        Self {
            transition: default_transition(),
            blur: 40.0,
            hue_shift: 0.0,
            rotation_speed: 1.0,
            min_size: [500, 500],
            fps: 60.0,
        }
    }
}

impl BackgroundSettings {
    /// Interval between animation frames; zero or unusable fps falls back to 60.
    pub fn frame_interval(&self) -> Duration {
        let fallback = Duration::from_secs(1) / 60;
        if self.fps > 0.0 {
            Duration::try_from_secs_f32(1.0 / self.fps).unwrap_or(fallback)
        } else {
            fallback
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Playlist {
    #[serde(
        default = "default_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub interval: Duration,
    #[serde(default)]
    pub images: Vec<ImageEntry>,
}

impl Default for Playlist {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            images: Vec::new(),
        }
    }
}

/// A playlist entry: either a bare handle or a table with per-image
/// overrides.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ImageEntry {
    Handle(String),
    Detailed {
        handle: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hue_shift: Option<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        blur: Option<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rotation_speed: Option<f32>,
    },
}

impl ImageEntry {
    pub fn handle(&self) -> &str {
        match self {
            ImageEntry::Handle(handle) => handle,
            ImageEntry::Detailed { handle, .. } => handle,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedImage {
    pub handle: String,
    pub hue_shift: f32,
    pub blur: f32,
    pub rotation_speed: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreSettings {
    #[serde(
        default = "default_failure_ttl",
        deserialize_with = "deserialize_duration"
    )]
    pub failure_ttl: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            failure_ttl: default_failure_ttl(),
        }
    }
}

fn default_transition() -> Duration {
    Duration::from_millis(800)
}

fn default_interval() -> Duration {
    Duration::from_secs(20)
}

fn default_failure_ttl() -> Duration {
    Duration::from_secs(600)
}

/// Accepts a duration as a number of seconds or a human-readable string such
/// as `"800ms"` or `"2m"`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl Default for BackdropConfig {
    fn default() -> Self {
        Self {
            version: 1,
            background: BackgroundSettings::default(),
            playlist: Playlist::default(),
            store: StoreSettings::default(),
        }
    }
}

impl BackdropConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: BackdropConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        let background = &self.background;
        check_blur("background.blur", background.blur)?;
        check_finite("background.hue_shift", background.hue_shift)?;
        check_finite("background.rotation_speed", background.rotation_speed)?;
        if !background.fps.is_finite()
            || background.fps < 0.0
            || (background.fps > 0.0 && background.fps < MIN_FPS)
        {
            return Err(ConfigError::Invalid(format!(
                "background.fps must be 0 or at least {MIN_FPS}"
            )));
        }
        if background.min_size.iter().any(|side| *side == 0) {
            return Err(ConfigError::Invalid(
                "background.min_size components must be greater than zero".into(),
            ));
        }

        if self.playlist.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "playlist.interval must be greater than zero".into(),
            ));
        }

        for (index, entry) in self.playlist.images.iter().enumerate() {
            if entry.handle().trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "playlist image {index} has an empty handle"
                )));
            }
            if let ImageEntry::Detailed {
                handle,
                hue_shift,
                blur,
                rotation_speed,
            } = entry
            {
                if let Some(blur) = blur {
                    check_blur(&format!("image '{handle}' blur"), *blur)?;
                }
                if let Some(hue) = hue_shift {
                    check_finite(&format!("image '{handle}' hue_shift"), *hue)?;
                }
                if let Some(speed) = rotation_speed {
                    check_finite(&format!("image '{handle}' rotation_speed"), *speed)?;
                }
            }
        }

        Ok(())
    }

    /// Resolves playlist entry `index`, filling unset overrides from
    /// `[background]`.
    pub fn resolved_image(&self, index: usize) -> Option<ResolvedImage> {
        let entry = self.playlist.images.get(index)?;
        let background = &self.background;
        let resolved = match entry {
            ImageEntry::Handle(handle) => ResolvedImage {
                handle: handle.clone(),
                hue_shift: background.hue_shift,
                blur: background.blur,
                rotation_speed: background.rotation_speed,
            },
            ImageEntry::Detailed {
                handle,
                hue_shift,
                blur,
                rotation_speed,
            } => ResolvedImage {
                handle: handle.clone(),
                hue_shift: hue_shift.unwrap_or(background.hue_shift),
                blur: blur.unwrap_or(background.blur),
                rotation_speed: rotation_speed.unwrap_or(background.rotation_speed),
            },
        };
        Some(resolved)
    }
}

fn check_blur(name: &str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Invalid(format!("{name} must be >= 0")));
    }
    Ok(())
}

fn check_finite(name: &str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::Invalid(format!("{name} must be a finite number")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
version = 1

[background]
transition = "1500ms"
blur = 24.0
hue_shift = 30.0
min_size = [640, 480]
fps = 30

[playlist]
interval = "2m"
images = [
    "covers/a.jpg",
    { handle = "https://example.com/b.png", hue_shift = 90.0, blur = 0.0 },
]

[store]
failure_ttl = 300
"#;

    #[test]
    fn parses_sample_config() {
        let config = BackdropConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.version, 1);
        assert_eq!(config.background.transition, Duration::from_millis(1500));
        assert_eq!(config.background.rotation_speed, 1.0);
        assert_eq!(config.background.min_size, [640, 480]);
        assert_eq!(config.playlist.interval, Duration::from_secs(120));
        assert_eq!(config.playlist.images.len(), 2);
        assert_eq!(config.playlist.images[0].handle(), "covers/a.jpg");
        assert_eq!(config.store.failure_ttl, Duration::from_secs(300));
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = BackdropConfig::from_toml_str("version = 1").unwrap();
        assert_eq!(config.background.transition, Duration::from_millis(800));
        assert_eq!(config.background.blur, 40.0);
        assert_eq!(config.background.min_size, [500, 500]);
        assert_eq!(config.playlist.interval, Duration::from_secs(20));
        assert!(config.playlist.images.is_empty());
        assert_eq!(config.store.failure_ttl, Duration::from_secs(600));
    }

    #[test]
    fn resolves_image_overrides_against_background() {
        let config = BackdropConfig::from_toml_str(SAMPLE).unwrap();

        let plain = config.resolved_image(0).unwrap();
        assert_eq!(plain.handle, "covers/a.jpg");
        assert_eq!(plain.hue_shift, 30.0);
        assert_eq!(plain.blur, 24.0);

        let detailed = config.resolved_image(1).unwrap();
        assert_eq!(detailed.hue_shift, 90.0);
        assert_eq!(detailed.blur, 0.0);
        assert_eq!(detailed.rotation_speed, 1.0);

        assert!(config.resolved_image(2).is_none());
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = BackdropConfig::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_negative_blur() {
        let err = BackdropConfig::from_toml_str(
            r#"
version = 1

[background]
blur = -1.0
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("blur")));
    }

    #[test]
    fn rejects_empty_handle_and_zero_interval() {
        let empty = BackdropConfig::from_toml_str(
            r#"
version = 1

[playlist]
images = ["  "]
"#,
        )
        .unwrap_err();
        assert!(matches!(empty, ConfigError::Invalid(_)));

        let zero = BackdropConfig::from_toml_str(
            r#"
version = 1

[playlist]
interval = 0
images = ["a.png"]
"#,
        )
        .unwrap_err();
        assert!(matches!(zero, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_min_size() {
        let err = BackdropConfig::from_toml_str(
            r#"
version = 1

[background]
min_size = [0, 500]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_duration() {
        let err = BackdropConfig::from_toml_str(
            r#"
version = 1

[background]
transition = "soon"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn frame_interval_falls_back_for_zero_fps() {
        let mut settings = BackgroundSettings::default();
        settings.fps = 0.0;
        assert_eq!(settings.frame_interval(), Duration::from_secs(1) / 60);
        settings.fps = 30.0;
        assert_eq!(settings.frame_interval(), Duration::from_secs_f32(1.0 / 30.0));
        // 1 / fps overflows to infinity.
        settings.fps = f32::MIN_POSITIVE / 4.0;
        assert_eq!(settings.frame_interval(), Duration::from_secs(1) / 60);
    }

    #[test]
    fn rejects_fps_below_minimum() {
        let err = BackdropConfig::from_toml_str(
            r#"
version = 1

[background]
fps = 1e-40
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("fps")));

        let idle = BackdropConfig::from_toml_str("version = 1\n\n[background]\nfps = 0\n").unwrap();
        assert_eq!(idle.background.fps, 0.0);
    }

    #[test]
    fn loads_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = BackdropConfig::from_path(file.path()).unwrap();
        assert_eq!(config.playlist.images.len(), 2);

        let missing = file.path().with_extension("missing");
        let err = BackdropConfig::from_path(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
