//! Frame scheduling: pause sources, boost window, adaptive load modes and the
//! frame clock.
//!
//! The host calls the controller's `tick(now)` as often as it likes; the
//! scheduler decides whether a frame is due at the current interval.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TickConfig;

/// Upper bound on a frame's dt, seconds.
pub const MAX_FRAME_DT: f64 = 0.1;
/// dt used before any frame has been measured.
pub const DEFAULT_FRAME_DT: f64 = 1.0 / 30.0;

pub const LOAD_EMA_KEEP: f64 = 0.85;
pub const LOAD_EVAL_PERIOD_S: f64 = 0.35;
const ESCALATE_HOLD_S: f64 = 1.25;
const DEESCALATE_HOLD_S: f64 = 0.6;
const LOADED_EXTENSION_S: f64 = 0.75;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    #[default]
    Normal,
    Medium,
    Heavy,
}

impl LoadMode {
    /// Mode suggested by the smoothed render cost and the last frame gap.
    pub fn suggested(ema_ms: f64, dt_ms: f64) -> LoadMode {
        if ema_ms > 28.0 || dt_ms > 90.0 {
            LoadMode::Heavy
        } else if ema_ms > 20.0 || dt_ms > 60.0 {
            LoadMode::Medium
        } else {
            LoadMode::Normal
        }
    }

    /// Whether measurements are good enough to leave this mode.
    fn may_leave(self, ema_ms: f64, dt_ms: f64) -> bool {
        match self {
            LoadMode::Heavy => ema_ms < 22.0 && dt_ms < 70.0,
            LoadMode::Medium => ema_ms < 18.0 && dt_ms < 55.0,
            LoadMode::Normal => false,
        }
    }
}

/// Render-cost tracker with hysteresis between load modes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadMonitor {
    ema_ms: f64,
    last_eval: Option<f64>,
    mode: LoadMode,
    hold_until: f64,
}

impl LoadMonitor {
    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    pub fn ema_ms(&self) -> f64 {
        self.ema_ms
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Feed one frame. Returns the new mode when it changed.
    pub fn record(&mut self, now: f64, dt_s: f64, render_ms: f64) -> Option<LoadMode> {
        if !(render_ms > 0.0) || !now.is_finite() {
            return None;
        }
        self.ema_ms = if self.ema_ms <= 0.0 {
            render_ms
        } else {
            LOAD_EMA_KEEP * self.ema_ms + (1.0 - LOAD_EMA_KEEP) * render_ms
        };
        if self.last_eval.is_some_and(|t| now - t < LOAD_EVAL_PERIOD_S) {
            return None;
        }
        self.last_eval = Some(now);

        let dt_ms = (dt_s * 1000.0).max(0.0);
        let suggested = LoadMode::suggested(self.ema_ms, dt_ms);
        if suggested > self.mode {
            self.mode = suggested;
            self.hold_until = now + ESCALATE_HOLD_S;
            return Some(suggested);
        }
        if suggested < self.mode {
            if now < self.hold_until || !self.mode.may_leave(self.ema_ms, dt_ms) {
                return None;
            }
            self.mode = suggested;
            self.hold_until = now + DEESCALATE_HOLD_S;
            return Some(suggested);
        }
        if self.mode != LoadMode::Normal {
            self.hold_until = self.hold_until.max(now + LOADED_EXTENSION_S);
        }
        None
    }
}

/// Independent reasons to stop ticking.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseSources {
    pub requested: bool,
    pub hidden: bool,
    pub not_ready: bool,
}

impl PauseSources {
    pub fn is_paused(&self) -> bool {
        self.requested || self.hidden || self.not_ready
    }
}

/// Wall-clock delta between rendered frames.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameClock {
    last: Option<f64>,
    last_dt: f64,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self {
            last: None,
            last_dt: DEFAULT_FRAME_DT,
        }
    }
}

impl FrameClock {
    /// The next frame reuses the previous dt instead of measuring the gap.
    pub fn restart(&mut self) {
        self.last = None;
    }

    pub fn advance(&mut self, now: f64) -> f64 {
        let dt = match self.last {
            Some(prev) if now.is_finite() => (now - prev).clamp(0.0, MAX_FRAME_DT),
            _ => self.last_dt,
        };
        self.last = Some(now);
        self.last_dt = dt;
        dt
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameStats {
    pub frame: u64,
    pub dt: f64,
    pub interval_ms: u64,
    pub load_mode: LoadMode,
    /// Parameter writes that reached the native model.
    pub writes: usize,
    /// Native calls that failed during the frame.
    pub errors: usize,
    pub cost_ms: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TickOutcome {
    Paused,
    NotDue,
    Rendered(FrameStats),
}

impl TickOutcome {
    pub fn rendered(&self) -> Option<&FrameStats> {
        match self {
            TickOutcome::Rendered(stats) => Some(stats),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FrameScheduler {
    config: TickConfig,
    adaptive: bool,
    pause: PauseSources,
    boost_until: f64,
    load: LoadMonitor,
    clock: FrameClock,
    last_frame: Option<f64>,
    frames: u64,
}

impl FrameScheduler {
    pub fn new(config: TickConfig, adaptive: bool) -> Self {
        Self {
            config,
            adaptive,
            pause: PauseSources {
                not_ready: true,
                ..Default::default()
            },
            boost_until: f64::NEG_INFINITY,
            load: LoadMonitor::default(),
            clock: FrameClock::default(),
            last_frame: None,
            frames: 0,
        }
    }

    pub fn config(&self) -> &TickConfig {
        &self.config
    }

    pub fn pause_sources(&self) -> PauseSources {
        self.pause
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    fn update_pause(&mut self, f: impl FnOnce(&mut PauseSources)) -> bool {
        let was = self.pause.is_paused();
        f(&mut self.pause);
        let now_paused = self.pause.is_paused();
        if was && !now_paused {
            self.clock.restart();
            self.last_frame = None;
            debug!("frame scheduler resumed");
        } else if !was && now_paused {
            debug!(sources = ?self.pause, "frame scheduler paused");
        }
        was != now_paused
    }

    /// Returns whether the effective paused state changed.
    pub fn set_requested_pause(&mut self, paused: bool) -> bool {
        self.update_pause(|p| p.requested = paused)
    }

    pub fn set_hidden(&mut self, hidden: bool) -> bool {
        self.update_pause(|p| p.hidden = hidden)
    }

    pub fn set_ready(&mut self, ready: bool) -> bool {
        self.update_pause(|p| p.not_ready = !ready)
    }

    /// Run at the boost interval until `now + duration_s`; later requests extend.
    /// Ignored while paused.
    pub fn boost(&mut self, now: f64, duration_s: f64) {
        if self.is_paused() || !now.is_finite() {
            return;
        }
        let min = self.config.min_boost_ms as f64 / 1000.0;
        let d = if duration_s.is_finite() { duration_s.max(min) } else { min };
        self.boost_until = self.boost_until.max(now + d);
    }

    pub fn boost_default(&mut self, now: f64) {
        self.boost(now, self.config.default_boost_ms as f64 / 1000.0);
    }

    pub fn is_boosted(&self, now: f64) -> bool {
        now < self.boost_until
    }

    pub fn load_mode(&self) -> LoadMode {
        self.load.mode()
    }

    pub fn load(&self) -> &LoadMonitor {
        &self.load
    }

    pub fn interval_ms(&self, now: f64) -> u64 {
        let base = if self.is_boosted(now) {
            self.config.boost_ms
        } else {
            self.config.normal_ms
        };
        match self.load.mode() {
            LoadMode::Normal => base,
            LoadMode::Medium => base.max(self.config.medium_ms),
            LoadMode::Heavy => base.max(self.config.heavy_ms),
        }
    }

    pub fn due(&self, now: f64) -> bool {
        if self.is_paused() {
            return false;
        }
        match self.last_frame {
            None => true,
            Some(prev) => (now - prev) * 1000.0 + 1e-6 >= self.interval_ms(now) as f64,
        }
    }

    /// Start a frame; returns its dt.
    pub fn begin_frame(&mut self, now: f64) -> f64 {
        self.last_frame = Some(now);
        self.frames += 1;
        self.clock.advance(now)
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Feed the frame's render cost into load adaptation.
    pub fn end_frame(&mut self, now: f64, dt: f64, cost_ms: f64) {
        if !self.adaptive {
            return;
        }
        if let Some(mode) = self.load.record(now, dt, cost_ms) {
            debug!(?mode, ema_ms = self.load.ema_ms(), dt_ms = dt * 1000.0, "load mode changed");
        }
    }
}
