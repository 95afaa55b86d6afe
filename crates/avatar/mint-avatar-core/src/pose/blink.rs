//! Blink scheduler: close, hold, open with randomized spacing.

use rand::Rng;

use super::filters::smoothstep;

pub const CLOSE_S: f64 = 0.055;
pub const HOLD_S: f64 = 0.018;
pub const OPEN_S: f64 = 0.095;
pub const DURATION_S: f64 = CLOSE_S + HOLD_S + OPEN_S;

/// Chance that a blink is followed by a quick second one.
pub const DOUBLE_BLINK_CHANCE: f64 = 0.18;

#[derive(Clone, Debug, PartialEq)]
pub struct BlinkState {
    pub next: f64,
    /// Start of the blink in progress.
    pub start: Option<f64>,
    last_written: Option<f32>,
}

impl BlinkState {
    /// First blink lands 2.4-5.0 s after `t0`.
    pub fn new<R: Rng + ?Sized>(t0: f64, rng: &mut R) -> Self {
        Self {
            next: t0 + rng.gen_range(2.4..5.0),
            start: None,
            last_written: None,
        }
    }

    pub fn is_blinking(&self) -> bool {
        self.start.is_some()
    }

    /// Eye openness at `now`, in `[0, 1]`.
    pub fn sample<R: Rng + ?Sized>(&mut self, now: f64, rng: &mut R) -> f32 {
        let start = match self.start {
            Some(s) => s,
            None if now >= self.next => {
                self.start = Some(now);
                now
            }
            None => return 1.0,
        };
        let e = now - start;
        if e < CLOSE_S {
            1.0 - smoothstep((e / CLOSE_S) as f32)
        } else if e < CLOSE_S + HOLD_S {
            0.0
        } else if e < DURATION_S {
            smoothstep(((e - CLOSE_S - HOLD_S) / OPEN_S) as f32)
        } else {
            self.start = None;
            let gap = if rng.gen_bool(DOUBLE_BLINK_CHANCE) {
                rng.gen_range(0.22..0.45)
            } else {
                rng.gen_range(2.4..5.2)
            };
            self.next = now + gap;
            1.0
        }
    }

    /// Whether `value` needs to reach the model. A fully open eye that was
    /// already written fully open is skipped.
    pub fn should_write(&mut self, value: f32) -> bool {
        let unchanged = self
            .last_written
            .map(|prev| (prev - value).abs() < 0.01)
            .unwrap_or(false);
        if value >= 0.999 && unchanged {
            return false;
        }
        self.last_written = Some(value);
        true
    }
}
