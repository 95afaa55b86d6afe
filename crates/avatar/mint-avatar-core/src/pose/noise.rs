//! Per-axis Ornstein-Uhlenbeck noise layered over the idle sway.

use rand::Rng;

use super::filters::ou_step;

/// `(tau, sigma, clamp)` for one axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoiseAxis {
    pub tau: f32,
    pub sigma: f32,
    pub limit: f32,
}

const fn axis(tau: f32, sigma: f32, limit: f32) -> NoiseAxis {
    NoiseAxis { tau, sigma, limit }
}

pub const ANGLE_X: NoiseAxis = axis(2.2, 1.1, 3.0);
pub const ANGLE_Y: NoiseAxis = axis(2.6, 0.9, 3.0);
pub const ANGLE_Z: NoiseAxis = axis(2.8, 0.7, 2.2);
pub const BODY_X: NoiseAxis = axis(3.1, 0.6, 1.8);
pub const BODY_Y: NoiseAxis = axis(3.4, 0.5, 1.6);
pub const BODY_Z: NoiseAxis = axis(3.6, 0.5, 1.6);
pub const EYE_X: NoiseAxis = axis(1.4, 0.06, 0.20);
pub const EYE_Y: NoiseAxis = axis(1.4, 0.05, 0.16);

/// One OU scalar per pose axis except breath.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NoiseState {
    pub angle_x: f32,
    pub angle_y: f32,
    pub angle_z: f32,
    pub body_x: f32,
    pub body_y: f32,
    pub body_z: f32,
    pub eye_x: f32,
    pub eye_y: f32,
}

impl NoiseState {
    pub fn step<R: Rng + ?Sized>(&mut self, dt: f32, rng: &mut R) {
        let mut advance = |x: &mut f32, a: NoiseAxis| {
            *x = ou_step(*x, a.tau, a.sigma, dt, rng).clamp(-a.limit, a.limit);
        };
        advance(&mut self.angle_x, ANGLE_X);
        advance(&mut self.angle_y, ANGLE_Y);
        advance(&mut self.angle_z, ANGLE_Z);
        advance(&mut self.body_x, BODY_X);
        advance(&mut self.body_y, BODY_Y);
        advance(&mut self.body_z, BODY_Z);
        advance(&mut self.eye_x, EYE_X);
        advance(&mut self.eye_y, EYE_Y);
    }
}
