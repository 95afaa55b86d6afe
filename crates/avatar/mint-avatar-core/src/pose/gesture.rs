//! Idle and forced head/body gestures.

use std::f32::consts::{PI, TAU};
use std::fmt;
use std::str::FromStr;

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::Pose;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    Nod,
    Shake,
    Tilt,
    LookLeft,
    LookRight,
    LookUp,
    LookDown,
    Lean,
}

impl GestureKind {
    pub const ALL: [GestureKind; 8] = [
        GestureKind::Nod,
        GestureKind::Shake,
        GestureKind::Tilt,
        GestureKind::LookLeft,
        GestureKind::LookRight,
        GestureKind::LookUp,
        GestureKind::LookDown,
        GestureKind::Lean,
    ];

    /// Idle weights, in [`Self::ALL`] order.
    pub const IDLE_WEIGHTS: [f32; 8] = [1.2, 1.0, 0.9, 0.8, 0.8, 0.7, 0.7, 0.9];
    /// Weights while speaking: nods and shakes dominate.
    pub const SPEAKING_WEIGHTS: [f32; 8] = [1.8, 1.3, 0.8, 0.55, 0.55, 0.45, 0.45, 0.7];

    pub fn as_str(self) -> &'static str {
        match self {
            GestureKind::Nod => "nod",
            GestureKind::Shake => "shake",
            GestureKind::Tilt => "tilt",
            GestureKind::LookLeft => "look_left",
            GestureKind::LookRight => "look_right",
            GestureKind::LookUp => "look_up",
            GestureKind::LookDown => "look_down",
            GestureKind::Lean => "lean",
        }
    }

    /// Carrier cycles over the whole gesture.
    fn cycles(self) -> f32 {
        match self {
            GestureKind::Nod => 2.0,
            GestureKind::Shake => 3.0,
            GestureKind::Tilt | GestureKind::Lean => 1.15,
            _ => 1.0,
        }
    }

    fn idle_duration(self) -> (f64, f64) {
        match self {
            GestureKind::Nod => (1.0, 1.35),
            GestureKind::Shake => (1.05, 1.45),
            GestureKind::Tilt => (1.0, 1.3),
            GestureKind::Lean => (1.4, 2.1),
            _ => (1.2, 1.7),
        }
    }

    fn forced_duration(self) -> (f64, f64) {
        match self {
            GestureKind::Nod => (0.95, 1.25),
            GestureKind::Shake => (0.95, 1.30),
            GestureKind::Tilt => (0.95, 1.25),
            GestureKind::Lean => (1.2, 1.85),
            _ => (1.05, 1.55),
        }
    }

    /// Peak offsets before the envelope and carrier are applied.
    fn amplitudes<R: Rng + ?Sized>(self, rng: &mut R) -> Pose {
        let sign = |rng: &mut R| if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        let mut a = Pose::ZERO;
        match self {
            GestureKind::Nod => a.angle_y = rng.gen_range(10.0..=15.0),
            GestureKind::Shake => a.angle_x = rng.gen_range(12.0..=18.0),
            GestureKind::Tilt => a.angle_z = sign(rng) * rng.gen_range(6.0..=10.0),
            GestureKind::LookLeft => {
                a.eye_x = -rng.gen_range(0.42..=0.68);
                a.angle_x = -rng.gen_range(5.0..=9.0);
            }
            GestureKind::LookRight => {
                a.eye_x = rng.gen_range(0.42..=0.68);
                a.angle_x = rng.gen_range(5.0..=9.0);
            }
            GestureKind::LookUp => {
                a.eye_y = rng.gen_range(0.28..=0.50);
                a.angle_y = rng.gen_range(7.0..=11.0);
            }
            GestureKind::LookDown => {
                a.eye_y = -rng.gen_range(0.26..=0.48);
                a.angle_y = -rng.gen_range(8.0..=12.0);
            }
            GestureKind::Lean => {
                a.body_x = rng.gen_range(-10.0..=10.0);
                a.body_y = rng.gen_range(-4.0..=4.0);
                a.body_z = rng.gen_range(-7.0..=7.0);
                a.angle_z = rng.gen_range(-5.0..=5.0);
            }
        }
        a
    }
}

impl fmt::Display for GestureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GestureKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        GestureKind::ALL
            .into_iter()
            .find(|k| k.as_str() == key)
            .ok_or(())
    }
}

/// One active gesture.
#[derive(Clone, Debug, PartialEq)]
pub struct Gesture {
    pub kind: GestureKind,
    pub start: f64,
    pub end: f64,
    pub amplitude: Pose,
    /// Carrier cycles across the gesture.
    pub freq: f32,
    pub phase: f32,
}

impl Gesture {
    fn build<R: Rng + ?Sized>(
        kind: GestureKind,
        now: f64,
        duration: f64,
        amp_scale: f32,
        rng: &mut R,
    ) -> Self {
        Self {
            kind,
            start: now,
            end: now + duration.max(1e-3),
            amplitude: kind.amplitudes(rng).scale(amp_scale),
            freq: kind.cycles() * rng.gen_range(0.92..=1.08),
            phase: rng.gen_range(-0.45..=0.45),
        }
    }

    /// Idle gesture with its natural duration and amplitude.
    pub fn idle<R: Rng + ?Sized>(kind: GestureKind, now: f64, rng: &mut R) -> Self {
        let (lo, hi) = kind.idle_duration();
        let duration = rng.gen_range(lo..=hi);
        Self::build(kind, now, duration, 1.0, rng)
    }

    /// Gesture requested by a state event. `intensity` in `[0, 1]` scales the
    /// amplitude by `0.62 + 0.8 * intensity`; `hold` overrides the duration,
    /// clamped to `[0.35, 4.0]` s.
    pub fn forced<R: Rng + ?Sized>(
        kind: GestureKind,
        now: f64,
        intensity: f32,
        hold: Option<f64>,
        rng: &mut R,
    ) -> Self {
        let duration = match hold {
            Some(h) => h.clamp(0.35, 4.0),
            None => {
                let (lo, hi) = kind.forced_duration();
                rng.gen_range(lo..=hi)
            }
        };
        let amp_scale = 0.62 + 0.80 * intensity.clamp(0.0, 1.0);
        Self::build(kind, now, duration, amp_scale, rng)
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_finished(&self, now: f64) -> bool {
        now >= self.end
    }

    pub fn progress(&self, now: f64) -> f32 {
        ((now - self.start) / self.duration()).clamp(0.0, 1.0) as f32
    }

    /// `sin(pi * progress)`: zero at both ends, one at the midpoint.
    pub fn envelope(&self, now: f64) -> f32 {
        (PI * self.progress(now)).sin().max(0.0)
    }

    /// Pose offsets contributed at `now`.
    pub fn offsets(&self, now: f64) -> Pose {
        let p = self.progress(now);
        let env = self.envelope(now);
        let carrier = |f: f32, extra: f32| (TAU * f * p + self.phase + extra).sin();
        let a = &self.amplitude;
        let mut o = Pose::ZERO;
        match self.kind {
            GestureKind::Nod => {
                o.angle_y = a.angle_y * carrier(self.freq, 0.0) * env;
                o.angle_z = 0.18 * a.angle_y * carrier(0.55 * self.freq, 1.3) * env;
            }
            GestureKind::Shake => {
                o.angle_x = a.angle_x * carrier(self.freq, 0.0) * env;
                o.angle_z = 0.08 * a.angle_x * carrier(0.5 * self.freq, 0.7) * env;
            }
            GestureKind::Tilt => {
                o.angle_z = a.angle_z * env;
            }
            GestureKind::LookLeft
            | GestureKind::LookRight
            | GestureKind::LookUp
            | GestureKind::LookDown => {
                o.eye_x = a.eye_x * env;
                o.eye_y = a.eye_y * env;
                o.angle_x = a.angle_x * env;
                o.angle_y = a.angle_y * env;
            }
            GestureKind::Lean => {
                o.body_x = a.body_x * env;
                o.body_y = a.body_y * env;
                o.body_z = a.body_z * env;
                o.angle_z = a.angle_z * carrier(self.freq, 0.0) * env;
            }
        }
        o
    }
}

/// Picks idle gestures on a randomized cadence and holds the active one.
#[derive(Clone, Debug)]
pub struct GestureScheduler {
    pub next: f64,
    active: Option<Gesture>,
}

impl GestureScheduler {
    /// First idle gesture 4-7 s after `t0`.
    pub fn new<R: Rng + ?Sized>(t0: f64, rng: &mut R) -> Self {
        Self {
            next: t0 + rng.gen_range(4.0..7.0),
            active: None,
        }
    }

    pub fn active(&self) -> Option<&Gesture> {
        self.active.as_ref()
    }

    pub fn is_active(&self, now: f64) -> bool {
        self.active.as_ref().is_some_and(|g| !g.is_finished(now))
    }

    /// Advance to `now`; returns the offsets of the active gesture.
    /// `idle` gates new idle gestures; forced ones always play out.
    pub fn update<R: Rng + ?Sized>(&mut self, now: f64, speaking: bool, idle: bool, rng: &mut R) -> Pose {
        if self.active.as_ref().is_some_and(|g| g.is_finished(now)) {
            self.active = None;
        }
        if self.active.is_none() && idle && now >= self.next {
            let kind = pick_kind(speaking, rng);
            let g = Gesture::idle(kind, now, rng);
            self.next = g.end + rng.gen_range(4.0..7.5);
            self.active = Some(g);
        }
        self.active
            .as_ref()
            .map(|g| g.offsets(now))
            .unwrap_or(Pose::ZERO)
    }

    /// Replace any active gesture with a forced one.
    pub fn force<R: Rng + ?Sized>(
        &mut self,
        kind: GestureKind,
        now: f64,
        intensity: f32,
        hold: Option<f64>,
        rng: &mut R,
    ) {
        let g = Gesture::forced(kind, now, intensity, hold, rng);
        self.next = g.end + rng.gen_range(3.6..6.8);
        self.active = Some(g);
    }
}

pub fn pick_kind<R: Rng + ?Sized>(speaking: bool, rng: &mut R) -> GestureKind {
    let weights = if speaking {
        &GestureKind::SPEAKING_WEIGHTS
    } else {
        &GestureKind::IDLE_WEIGHTS
    };
    WeightedIndex::new(weights)
        .map(|d| GestureKind::ALL[d.sample(rng)])
        .unwrap_or(GestureKind::Nod)
}
