//! Asymmetric envelope follower driving mouth openness.

use crate::params;
use crate::pose::filters::smooth_to;
use crate::writes::WriteBatch;

/// Attack gain (opening).
pub const K_OPEN: f32 = 16.0;
/// Release gain (closing).
pub const K_CLOSE: f32 = 10.0;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LipSync {
    target: f32,
    value: f32,
    disabled: bool,
}

impl LipSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target level; clamped to `[0, 1]`, NaN reads as silence.
    pub fn set_target(&mut self, level: f32) {
        self.target = if level.is_nan() {
            0.0
        } else {
            level.clamp(0.0, 1.0)
        };
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    /// Smoothed level, used by the pose engine even when mouth writes are off.
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Stop writing the mouth until [`Self::reset`].
    pub fn disable(&mut self) {
        self.disabled = true;
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Forget state for a fresh model load.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Advance by `dt` and append the mouth write unless disabled.
    pub fn step(&mut self, dt: f32, out: &mut WriteBatch) -> f32 {
        let k = if self.target > self.value { K_OPEN } else { K_CLOSE };
        self.value = smooth_to(self.value, self.target, k, dt).clamp(0.0, 1.0);
        if !self.disabled {
            out.push(params::MOUTH_OPEN_Y, self.value, 1.0);
        }
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn frames_to_cross(ls: &mut LipSync, above: bool, level: f32) -> usize {
        let mut out = WriteBatch::new();
        for n in 1..10_000 {
            let v = ls.step(DT, &mut out);
            if (above && v >= level) || (!above && v <= level) {
                return n;
            }
        }
        usize::MAX
    }

    #[test]
    fn attack_is_faster_than_release() {
        let mut ls = LipSync::new();
        ls.set_target(1.0);
        let rise = frames_to_cross(&mut ls, true, 0.9);
        // settle fully open
        for _ in 0..600 {
            ls.step(DT, &mut WriteBatch::new());
        }
        ls.set_target(0.0);
        let fall = frames_to_cross(&mut ls, false, 0.1);
        assert!(rise < fall, "rise {rise} fall {fall}");
    }

    #[test]
    fn never_leaves_unit_range() {
        let mut ls = LipSync::new();
        let mut out = WriteBatch::new();
        for (i, level) in [2.0, -1.0, f32::NAN, 0.7, 5.0].into_iter().enumerate() {
            ls.set_target(level);
            for _ in 0..(i + 1) * 20 {
                let v = ls.step(0.5, &mut out);
                assert!((0.0..=1.0).contains(&v));
            }
        }
        assert!(out.iter().all(|w| w.id == params::MOUTH_OPEN_Y && w.weight == 1.0));
    }

    #[test]
    fn disabled_follower_tracks_but_does_not_write() {
        let mut ls = LipSync::new();
        ls.disable();
        ls.set_target(1.0);
        let mut out = WriteBatch::new();
        ls.step(0.1, &mut out);
        assert!(out.is_empty());
        assert!(ls.value() > 0.0);
        ls.reset();
        assert!(!ls.is_disabled());
        assert_eq!(ls.value(), 0.0);
    }
}
