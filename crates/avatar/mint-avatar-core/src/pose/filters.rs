//! Scalar filters shared by the pose engine and lip-sync follower.

use std::f32::consts::TAU;

use rand::Rng;

/// Largest step any smoother integrates at once.
pub const MAX_SMOOTH_DT: f32 = 0.2;

/// Critically-damped exponential approach of `current` toward `target`.
///
/// `dt` is clamped to `[0, 0.2]`; a non-positive gain snaps to the target.
pub fn smooth_to(current: f32, target: f32, k: f32, dt: f32) -> f32 {
    if k <= 0.0 {
        return target;
    }
    let d = dt.clamp(0.0, MAX_SMOOTH_DT);
    let alpha = 1.0 - (-k * d).exp();
    current + (target - current) * alpha
}

/// Cubic Hermite ease on `[0, 1]`.
pub fn smoothstep(x: f32) -> f32 {
    let t = x.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Standard normal sample (Box-Muller).
pub fn gaussian<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
    let u2: f32 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
}

/// One Ornstein-Uhlenbeck step: mean-reverting toward 0 with time constant
/// `tau` (floored at 1 ms) and diffusion `sigma`.
pub fn ou_step<R: Rng + ?Sized>(x: f32, tau: f32, sigma: f32, dt: f32, rng: &mut R) -> f32 {
    let d = dt.max(0.0);
    let tau = tau.max(1e-3);
    x + (-x / tau) * d + sigma * d.sqrt() * gaussian(rng)
}

/// Sine at `freq` Hz with `phase` radians, evaluated at `t` seconds.
/// Computed in `f64` so long sessions keep their phase resolution.
#[inline]
pub fn wave(freq: f64, t: f64, phase: f64) -> f32 {
    (std::f64::consts::TAU * freq * t + phase).sin() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn smooth_to_converges_without_overshoot() {
        let mut v = 0.0;
        for _ in 0..200 {
            let next = smooth_to(v, 10.0, 8.0, 1.0 / 30.0);
            assert!(next >= v && next <= 10.0);
            v = next;
        }
        assert!((v - 10.0).abs() < 1e-3);
    }

    #[test]
    fn smooth_to_clamps_large_steps() {
        let a = smooth_to(0.0, 1.0, 5.0, 0.2);
        let b = smooth_to(0.0, 1.0, 5.0, 3.0);
        assert_eq!(a, b);
        assert_eq!(smooth_to(0.0, 1.0, 5.0, -1.0), 0.0);
        assert_eq!(smooth_to(0.3, 1.0, 0.0, 0.01), 1.0);
    }

    #[test]
    fn smoothstep_endpoints() {
        assert_eq!(smoothstep(-1.0), 0.0);
        assert_eq!(smoothstep(0.0), 0.0);
        assert_eq!(smoothstep(0.5), 0.5);
        assert_eq!(smoothstep(1.0), 1.0);
        assert_eq!(smoothstep(2.0), 1.0);
    }

    #[test]
    fn ou_reverts_toward_zero_on_average() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut sum = 0.0f64;
        let mut x = 2.0;
        for _ in 0..20_000 {
            x = ou_step(x, 1.0, 0.2, 1.0 / 60.0, &mut rng);
            sum += x as f64;
        }
        let mean = sum / 20_000.0;
        assert!(mean.abs() < 0.2, "mean drifted: {mean}");
    }

    #[test]
    fn gaussian_is_finite() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..10_000 {
            assert!(gaussian(&mut rng).is_finite());
        }
    }
}
