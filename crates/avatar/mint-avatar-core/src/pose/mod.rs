//! Procedural pose engine.
//!
//! Each frame the engine sums an idle sway, per-axis OU noise, the active
//! gesture, a speaking bob and eye saccades into a target pose, scales it by a
//! gain that depends on setter capabilities and view mode, clamps it to the
//! Cubism ranges, then eases the smoothed pose toward the target with
//! critically-damped filters. Blink and micro-expression writes ride along.

pub mod blink;
pub mod filters;
pub mod gesture;
pub mod noise;
pub mod saccade;

use std::ops::Add;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::params;
use crate::writes::WriteBatch;

pub use blink::BlinkState;
pub use filters::{smooth_to, smoothstep};
pub use gesture::{Gesture, GestureKind, GestureScheduler};
pub use noise::NoiseState;
pub use saccade::SaccadeState;

use filters::wave;

pub const HEAD_LIMIT: f32 = 30.0;
pub const BODY_LIMIT: f32 = 20.0;
pub const EYE_LIMIT: f32 = 1.0;

/// Blend weight for pose writes when the setter takes one.
pub const WEIGHTED_BLEND: f32 = 0.72;
/// Idle amplitude scale while the pointer hovers or drags.
pub const HOVER_SUPPRESSION: f32 = 0.55;
/// Lip-sync level above which gestures use the speaking weights.
pub const SPEAKING_GESTURE_LEVEL: f32 = 0.08;
/// Lip-sync level above which head and body smoothing tighten.
pub const SPEAKING_SMOOTH_LEVEL: f32 = 0.05;
/// Lip-sync level above which the speaking bob is added.
pub const SPEAKING_BOB_LEVEL: f32 = 0.02;

const MICRO_INTERVAL_S: f64 = 0.09;

/// Head, body, breath and eye-ball values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub angle_x: f32,
    pub angle_y: f32,
    pub angle_z: f32,
    pub body_x: f32,
    pub body_y: f32,
    pub body_z: f32,
    pub breath: f32,
    pub eye_x: f32,
    pub eye_y: f32,
}

impl Pose {
    pub const ZERO: Pose = Pose {
        angle_x: 0.0,
        angle_y: 0.0,
        angle_z: 0.0,
        body_x: 0.0,
        body_y: 0.0,
        body_z: 0.0,
        breath: 0.0,
        eye_x: 0.0,
        eye_y: 0.0,
    };

    /// Resting pose: centred, half breath.
    pub const REST: Pose = Pose {
        breath: 0.5,
        ..Pose::ZERO
    };

    /// Scale every axis except breath.
    pub fn scale(self, k: f32) -> Pose {
        Pose {
            angle_x: self.angle_x * k,
            angle_y: self.angle_y * k,
            angle_z: self.angle_z * k,
            body_x: self.body_x * k,
            body_y: self.body_y * k,
            body_z: self.body_z * k,
            breath: self.breath,
            eye_x: self.eye_x * k,
            eye_y: self.eye_y * k,
        }
    }

    /// Clamp to the ranges rigs accept.
    pub fn clamped(self) -> Pose {
        Pose {
            angle_x: self.angle_x.clamp(-HEAD_LIMIT, HEAD_LIMIT),
            angle_y: self.angle_y.clamp(-HEAD_LIMIT, HEAD_LIMIT),
            angle_z: self.angle_z.clamp(-HEAD_LIMIT, HEAD_LIMIT),
            body_x: self.body_x.clamp(-BODY_LIMIT, BODY_LIMIT),
            body_y: self.body_y.clamp(-BODY_LIMIT, BODY_LIMIT),
            body_z: self.body_z.clamp(-BODY_LIMIT, BODY_LIMIT),
            breath: self.breath.clamp(0.0, 1.0),
            eye_x: self.eye_x.clamp(-EYE_LIMIT, EYE_LIMIT),
            eye_y: self.eye_y.clamp(-EYE_LIMIT, EYE_LIMIT),
        }
    }

    pub fn write_into(&self, batch: &mut WriteBatch, weight: f32) {
        batch.push(params::ANGLE_X, self.angle_x, weight);
        batch.push(params::ANGLE_Y, self.angle_y, weight);
        batch.push(params::ANGLE_Z, self.angle_z, weight);
        batch.push(params::BODY_ANGLE_X, self.body_x, weight);
        batch.push(params::BODY_ANGLE_Y, self.body_y, weight);
        batch.push(params::BODY_ANGLE_Z, self.body_z, weight);
        batch.push(params::BREATH, self.breath, weight);
        batch.push(params::EYE_BALL_X, self.eye_x, weight);
        batch.push(params::EYE_BALL_Y, self.eye_y, weight);
    }
}

impl Add for Pose {
    type Output = Pose;

    fn add(self, o: Pose) -> Pose {
        Pose {
            angle_x: self.angle_x + o.angle_x,
            angle_y: self.angle_y + o.angle_y,
            angle_z: self.angle_z + o.angle_z,
            body_x: self.body_x + o.body_x,
            body_y: self.body_y + o.body_y,
            body_z: self.body_z + o.body_z,
            breath: self.breath + o.breath,
            eye_x: self.eye_x + o.eye_x,
            eye_y: self.eye_y + o.eye_y,
        }
    }
}

/// Two-frequency idle sway at `t` seconds since load.
pub fn idle_sway(t: f64) -> Pose {
    Pose {
        angle_x: 11.2 * wave(0.12, t, 0.0) + 2.8 * wave(0.31, t, 0.4),
        angle_y: 6.4 * wave(0.10, t, 1.1) + 2.0 * wave(0.24, t, 2.0),
        angle_z: 4.8 * wave(0.09, t, 0.2),
        body_x: 7.6 * wave(0.08, t, 0.4),
        body_y: 3.2 * wave(0.06, t, 0.8),
        body_z: 3.8 * wave(0.07, t, 2.0),
        breath: 0.5 + 0.5 * wave(0.18, t, 0.7),
        eye_x: 0.22 * wave(0.19, t, 1.0) + 0.06 * wave(0.57, t, 0.0),
        eye_y: 0.14 * wave(0.17, t, 2.3),
    }
}

/// Pitch and sway added while speaking.
pub fn speaking_bob(t: f64, level: f32) -> Pose {
    if level <= SPEAKING_BOB_LEVEL {
        return Pose::ZERO;
    }
    let lv = level.min(1.0);
    Pose {
        angle_y: 6.6 * lv * wave(0.9, t, 0.6),
        body_x: 3.3 * lv * wave(0.6, t, 1.2),
        ..Pose::ZERO
    }
}

/// Per-frame inputs the engine reads but does not own.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PoseInputs {
    pub now: f64,
    pub dt: f32,
    /// Current lip-sync envelope value.
    pub lipsync: f32,
    /// Pointer hovering or dragging over the surface.
    pub hovering: bool,
    pub interaction_locked: bool,
    pub portrait: bool,
    /// Bound setter accepts a blend weight.
    pub weighted: bool,
}

#[derive(Clone, Debug)]
pub struct PoseEngine {
    t0: f64,
    pose: Pose,
    target: Pose,
    noise: NoiseState,
    blink: BlinkState,
    blink_enabled: bool,
    saccade: SaccadeState,
    gestures: GestureScheduler,
    idle_enabled: bool,
    micro_next: f64,
}

impl PoseEngine {
    /// Engine for a model loaded at `t0`.
    pub fn new<R: Rng + ?Sized>(t0: f64, rng: &mut R) -> Self {
        Self {
            t0,
            pose: Pose::REST,
            target: Pose::REST,
            noise: NoiseState::default(),
            blink: BlinkState::new(t0, rng),
            blink_enabled: true,
            saccade: SaccadeState::new(t0, rng),
            gestures: GestureScheduler::new(t0, rng),
            idle_enabled: true,
            micro_next: t0,
        }
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Clamped target of the last step, before smoothing.
    pub fn target(&self) -> Pose {
        self.target
    }

    pub fn noise(&self) -> &NoiseState {
        &self.noise
    }

    pub fn gestures(&self) -> &GestureScheduler {
        &self.gestures
    }

    pub fn set_idle_enabled(&mut self, enabled: bool) {
        self.idle_enabled = enabled;
    }

    pub fn idle_enabled(&self) -> bool {
        self.idle_enabled
    }

    /// Stop blinking for the rest of this model load.
    pub fn disable_blink(&mut self) {
        self.blink_enabled = false;
    }

    pub fn blink_enabled(&self) -> bool {
        self.blink_enabled
    }

    pub fn force_gesture<R: Rng + ?Sized>(
        &mut self,
        kind: GestureKind,
        now: f64,
        intensity: f32,
        hold: Option<f64>,
        rng: &mut R,
    ) {
        self.gestures.force(kind, now, intensity, hold, rng);
    }

    /// Advance one frame and return the parameter writes it produced.
    pub fn step<R: Rng + ?Sized>(&mut self, input: &PoseInputs, rng: &mut R) -> WriteBatch {
        let mut out = WriteBatch::new();
        let now = input.now;
        let t = (now - self.t0).max(0.0);
        let dt = input.dt.clamp(0.0, 0.2);
        let lv = input.lipsync.clamp(0.0, 1.0);

        let mut eye_open = None;
        if self.idle_enabled && self.blink_enabled {
            let v = self.blink.sample(now, rng);
            if self.blink.should_write(v) {
                eye_open = Some(v);
            }
        }

        let gesture = self
            .gestures
            .update(now, lv > SPEAKING_GESTURE_LEVEL, self.idle_enabled, rng);
        let gesture_active = self.gestures.is_active(now);
        if !(self.idle_enabled || gesture_active) {
            if let Some(v) = eye_open {
                push_eyes(&mut out, v);
            }
            return out;
        }

        let mut raw = Pose::REST;
        let mut saccade_active = false;
        if self.idle_enabled {
            self.noise.step(dt, rng);
            let n = &self.noise;
            let noise = Pose {
                angle_x: n.angle_x,
                angle_y: n.angle_y,
                angle_z: n.angle_z,
                body_x: n.body_x,
                body_y: n.body_y,
                body_z: n.body_z,
                breath: 0.0,
                eye_x: n.eye_x,
                eye_y: n.eye_y,
            };
            raw = idle_sway(t) + noise + speaking_bob(t, lv);
            let (sx, sy) = self.saccade.sample(now, rng);
            saccade_active = self.saccade.is_active(now);
            raw.eye_x += sx;
            raw.eye_y += sy;
        }
        raw = raw + gesture;

        let mut gain = if input.weighted { 1.35 } else { 1.18 };
        if input.portrait {
            gain *= 1.09;
        }
        if input.hovering && !input.interaction_locked {
            gain *= HOVER_SUPPRESSION;
        }
        self.target = raw.scale(gain).clamped();

        let mut k_head = 11.5 * if gesture_active { 1.35 } else { 1.0 };
        let mut k_body = 8.5 * if gesture_active { 1.25 } else { 1.0 };
        let k_eye = 16.0 * if saccade_active { 1.4 } else { 1.0 };
        let k_breath = 5.0;
        if lv > SPEAKING_SMOOTH_LEVEL {
            k_head *= 1.25;
            k_body *= 1.15;
        }
        let p = &mut self.pose;
        let tg = &self.target;
        p.angle_x = smooth_to(p.angle_x, tg.angle_x, k_head, dt);
        p.angle_y = smooth_to(p.angle_y, tg.angle_y, k_head, dt);
        p.angle_z = smooth_to(p.angle_z, tg.angle_z, k_head, dt);
        p.body_x = smooth_to(p.body_x, tg.body_x, k_body, dt);
        p.body_y = smooth_to(p.body_y, tg.body_y, k_body, dt);
        p.body_z = smooth_to(p.body_z, tg.body_z, k_body, dt);
        p.eye_x = smooth_to(p.eye_x, tg.eye_x, k_eye, dt);
        p.eye_y = smooth_to(p.eye_y, tg.eye_y, k_eye, dt);
        p.breath = smooth_to(p.breath, tg.breath, k_breath, dt);

        if let Some(v) = eye_open {
            push_eyes(&mut out, v);
        }
        let weight = if input.weighted { WEIGHTED_BLEND } else { 1.0 };
        self.pose.write_into(&mut out, weight);

        if input.weighted && self.idle_enabled && now >= self.micro_next {
            self.micro_next = now + MICRO_INTERVAL_S;
            let brow = (0.12 * wave(0.07, t, 1.1)
                + 0.03 * wave(0.19, t, 0.0)
                + 0.02 * self.noise.angle_y)
                .clamp(-1.0, 1.0);
            out.push(params::BROW_L_Y, brow, 0.28);
            out.push(params::BROW_R_Y, brow, 0.28);
            out.push(params::EYE_SMILE, (0.10 + 0.55 * lv).clamp(0.0, 1.0), 0.22);
        }
        out
    }
}

fn push_eyes(out: &mut WriteBatch, v: f32) {
    out.push(params::EYE_L_OPEN, v, 1.0);
    out.push(params::EYE_R_OPEN, v, 1.0);
}
