//! Environment configuration.

use crate::emulator::GameMode;
use crate::{AleZooError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// What each agent observes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum ObsType {
    /// The 128 bytes of console RAM
    Ram,
    /// `[height, width, 3]` colour frame
    #[default]
    RgbImage,
    /// `[height, width, 1]` luminance frame
    GrayscaleImage,
}

impl ObsType {
    pub fn as_str(self) -> &'static str {
        match self {
            ObsType::Ram => "ram",
            ObsType::RgbImage => "rgb_image",
            ObsType::GrayscaleImage => "grayscale_image",
        }
    }
}

impl FromStr for ObsType {
    type Err = AleZooError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ram" => Ok(ObsType::Ram),
            "rgb_image" => Ok(ObsType::RgbImage),
            "grayscale_image" => Ok(ObsType::GrayscaleImage),
            other => Err(AleZooError::Validation(format!(
                "obs_type must be one of 'ram', 'rgb_image' or 'grayscale_image', got '{other}'"
            ))),
        }
    }
}

impl TryFrom<String> for ObsType {
    type Error = String;

    fn try_from(s: String) -> core::result::Result<Self, String> {
        parse_field(&s)
    }
}

impl fmt::Display for ObsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How `render` presents frames
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum RenderMode {
    /// Draw into a display surface
    Human,
    /// Return the RGB frame to the caller
    RgbArray,
}

impl RenderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderMode::Human => "human",
            RenderMode::RgbArray => "rgb_array",
        }
    }
}

impl FromStr for RenderMode {
    type Err = AleZooError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "human" => Ok(RenderMode::Human),
            "rgb_array" => Ok(RenderMode::RgbArray),
            other => Err(AleZooError::Validation(format!(
                "{other} is not a valid render mode"
            ))),
        }
    }
}

impl TryFrom<String> for RenderMode {
    type Error = String;

    fn try_from(s: String) -> core::result::Result<Self, String> {
        parse_field(&s)
    }
}

/// Parse a config field, keeping only the validation message so serde can
/// attach its own position
fn parse_field<T: FromStr<Err = AleZooError>>(s: &str) -> core::result::Result<T, String> {
    s.parse().map_err(|err| match err {
        AleZooError::Validation(msg) => msg,
        other => other.to_string(),
    })
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-facing metadata, passed through untouched
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvMetadata {
    pub name: String,
    pub render_modes: Vec<RenderMode>,
    pub render_fps: u32,
}

impl EnvMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            render_modes: vec![RenderMode::Human, RenderMode::RgbArray],
            render_fps: 60,
        }
    }
}

/// Configuration for a multi-agent Atari environment
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AtariConfig {
    /// ROM basename, e.g. `pong` for `pong.bin`
    pub game: String,
    /// Number of agents; must match the selected mode
    pub num_players: usize,
    /// Game mode; the first supported mode when unset
    pub mode: Option<GameMode>,
    /// Seed applied at construction
    pub seed: Option<u64>,
    pub obs_type: ObsType,
    /// Expose all 18 actions instead of the ROM's minimal set
    pub full_action_space: bool,
    /// Environment name; `custom_<game>` when unset
    pub env_name: Option<String>,
    /// Truncate every agent once this many steps have run
    pub max_cycles: u64,
    pub render_mode: Option<RenderMode>,
    /// Root of the ROM search; the working directory when unset
    pub rom_dir: Option<PathBuf>,
}

impl Default for AtariConfig {
    fn default() -> Self {
        Self {
            game: String::new(),
            num_players: 2,
            mode: None,
            seed: None,
            obs_type: ObsType::RgbImage,
            full_action_space: false,
            env_name: None,
            max_cycles: 100_000,
            render_mode: None,
            rom_dir: None,
        }
    }
}

impl AtariConfig {
    pub fn new(game: impl Into<String>, num_players: usize) -> Self {
        Self {
            game: game.into(),
            num_players,
            ..Default::default()
        }
    }

    /// Parse a JSON config; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| AleZooError::Validation(e.to_string()))
    }

    pub fn with_mode(mut self, mode: GameMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_obs_type(mut self, obs_type: ObsType) -> Self {
        self.obs_type = obs_type;
        self
    }

    pub fn with_full_action_space(mut self, full: bool) -> Self {
        self.full_action_space = full;
        self
    }

    pub fn with_env_name(mut self, name: impl Into<String>) -> Self {
        self.env_name = Some(name.into());
        self
    }

    pub fn with_max_cycles(mut self, max_cycles: u64) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    pub fn with_render_mode(mut self, mode: RenderMode) -> Self {
        self.render_mode = Some(mode);
        self
    }

    pub fn with_rom_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.rom_dir = Some(dir.into());
        self
    }

    /// Name reported in the environment metadata
    pub fn resolved_name(&self) -> String {
        self.env_name
            .clone()
            .unwrap_or_else(|| format!("custom_{}", self.game))
    }
}
