//! Short eye jumps toward a random offset and back.

use rand::Rng;

use super::filters::smoothstep;

pub const RAMP_IN: f32 = 0.18;
pub const HOLD_UNTIL: f32 = 0.70;

#[derive(Clone, Debug, PartialEq)]
pub struct SaccadeState {
    pub next: f64,
    pub start: f64,
    pub end: f64,
    pub to_x: f32,
    pub to_y: f32,
}

impl SaccadeState {
    /// First saccade lands 0.8-2.0 s after `t0`.
    pub fn new<R: Rng + ?Sized>(t0: f64, rng: &mut R) -> Self {
        Self {
            next: t0 + rng.gen_range(0.8..2.0),
            start: 0.0,
            end: 0.0,
            to_x: 0.0,
            to_y: 0.0,
        }
    }

    pub fn is_active(&self, now: f64) -> bool {
        now >= self.start && now < self.end
    }

    /// Eye offset contributed at `now`.
    pub fn sample<R: Rng + ?Sized>(&mut self, now: f64, rng: &mut R) -> (f32, f32) {
        if now >= self.next && now >= self.end {
            let dur = rng.gen_range(0.22..0.34);
            self.start = now;
            self.end = now + dur;
            self.to_x = rng.gen_range(-0.18..0.18);
            self.to_y = rng.gen_range(-0.12..0.12);
            self.next = self.end + rng.gen_range(0.9..2.2);
        }
        if !self.is_active(now) {
            return (0.0, 0.0);
        }
        let p = ((now - self.start) / (self.end - self.start).max(1e-6)) as f32;
        let env = envelope(p);
        (self.to_x * env, self.to_y * env)
    }
}

/// Ramp in over the first 18 %, hold to 70 %, ramp out.
pub fn envelope(p: f32) -> f32 {
    if p < RAMP_IN {
        smoothstep(p / RAMP_IN)
    } else if p < HOLD_UNTIL {
        1.0
    } else {
        1.0 - smoothstep((p - HOLD_UNTIL) / (1.0 - HOLD_UNTIL))
    }
}
