use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "coverview",
    author,
    version,
    about = "Blurred cover-art backdrop viewer"
)]
pub struct Cli {
    /// Images to cycle through: local paths or http(s) URLs. Replaces the
    /// playlist from the config file when given.
    #[arg(value_name = "IMAGES")]
    pub images: Vec<String>,

    /// TOML configuration file.
    #[arg(long, value_name = "FILE", env = "COVERVIEW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Crossfade length (e.g. `800ms`, `2s`; `0s` swaps instantly).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub transition: Option<Duration>,

    /// Gaussian blur radius in pixels.
    #[arg(long, value_name = "PX", allow_negative_numbers = true)]
    pub blur: Option<f32>,

    /// Hue rotation in degrees.
    #[arg(long, value_name = "DEG", allow_negative_numbers = true)]
    pub hue: Option<f32>,

    /// Rotation speed multiplier.
    #[arg(long, value_name = "X", allow_negative_numbers = true)]
    pub speed: Option<f32>,

    /// Time each image stays on screen before the next one.
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub interval: Option<Duration>,

    /// Directory for remembered state and failed images.
    #[arg(long, value_name = "DIR", env = "COVERVIEW_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Print the effective settings and exit without opening a window.
    #[arg(long)]
    pub check: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("duration must not be empty".to_string());
    }
    if let Ok(seconds) = trimmed.parse::<f64>() {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(format!("invalid duration '{trimmed}'; must be non-negative"));
        }
        return Ok(Duration::from_secs_f64(seconds));
    }
    humantime::parse_duration(trimmed).map_err(|err| format!("invalid duration '{trimmed}': {err}"))
}
