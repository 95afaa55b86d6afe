//! Controller configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{AvatarError, AvatarResult};

pub const ENV_CACHE_DIR: &str = "MINT_AVATAR_CACHE_DIR";
pub const ENV_VTUBER: &str = "MINT_AVATAR_VTUBER";
pub const ENV_ADAPTIVE_FPS: &str = "MINT_AVATAR_ADAPTIVE_FPS";
pub const ENV_STATE_EVENTS: &str = "MINT_AVATAR_STATE_EVENTS";
pub const ENV_SEED: &str = "MINT_AVATAR_SEED";

/// Frame pacing in milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    pub normal_ms: u64,
    pub boost_ms: u64,
    pub medium_ms: u64,
    pub heavy_ms: u64,
    /// Boost window used when a caller does not pass an explicit duration.
    pub default_boost_ms: u64,
    /// Shorter boost requests are raised to this.
    pub min_boost_ms: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            normal_ms: 33,
            boost_ms: 16,
            medium_ms: 40,
            heavy_ms: 50,
            default_boost_ms: 1200,
            min_boost_ms: 200,
        }
    }
}

/// Top-level configuration for [`crate::AvatarController`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    pub tick: TickConfig,

    /// Degrade the frame rate under sustained render load.
    pub adaptive_fps: bool,

    /// Procedural idle layer (sway, noise, blink, saccade, idle gestures).
    pub vtuber_enabled: bool,

    /// Accept semantic state events from [`crate::StateEventSender`].
    pub state_events_enabled: bool,

    /// Base expression applied after every model load, if the model ships it.
    pub default_expression: Option<String>,

    /// Where sanitized model copies are written.
    pub cache_dir: PathBuf,

    /// Left-press travel in pixels before it becomes a pan instead of a tap.
    pub pan_threshold_px: f32,

    /// Fixed seed for every random draw; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            tick: TickConfig::default(),
            adaptive_fps: true,
            vtuber_enabled: true,
            state_events_enabled: true,
            default_expression: Some("手势 抱娃娃.exp3.json".to_string()),
            cache_dir: PathBuf::from("data").join("live2d_cache"),
            pan_threshold_px: 6.0,
            seed: None,
        }
    }
}

impl AvatarConfig {
    pub fn from_json_str(json: &str) -> AvatarResult<Self> {
        serde_json::from_str(json).map_err(|e| AvatarError::Config(e.to_string()))
    }

    /// Apply `MINT_AVATAR_*` environment overrides on top of `self`.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::with_env_overrides`] with an explicit lookup, so tests
    /// do not have to mutate the process environment.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(ENV_CACHE_DIR).filter(|s| !s.trim().is_empty()) {
            self.cache_dir = PathBuf::from(dir.trim());
        }
        if let Some(v) = lookup(ENV_VTUBER).as_deref().and_then(parse_bool) {
            self.vtuber_enabled = v;
        }
        if let Some(v) = lookup(ENV_ADAPTIVE_FPS).as_deref().and_then(parse_bool) {
            self.adaptive_fps = v;
        }
        if let Some(v) = lookup(ENV_STATE_EVENTS).as_deref().and_then(parse_bool) {
            self.state_events_enabled = v;
        }
        if let Some(seed) = lookup(ENV_SEED).and_then(|s| s.trim().parse::<u64>().ok()) {
            self.seed = Some(seed);
        }
        self
    }
}

/// Lenient boolean parsing for environment values.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" | "enable" | "enabled" => Some(true),
        "0" | "false" | "no" | "n" | "off" | "disable" | "disabled" => Some(false),
        _ => None,
    }
}
