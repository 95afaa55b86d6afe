//! View transform heuristic and user pan/zoom.
//!
//! The base framing depends on surface height and aspect ratio; the user's
//! zoom multiplies it and the user's pan adds to it. The result is always
//! clamped so the model can never be scaled or panned entirely out of view.

use serde::{Deserialize, Serialize};

pub const MIN_SCALE: f32 = 0.55;
pub const MAX_SCALE: f32 = 2.2;
pub const OFFSET_X_LIMIT: f32 = 0.8;
pub const OFFSET_Y_MIN: f32 = -0.8;
pub const OFFSET_Y_MAX: f32 = 0.6;

/// Zoom factor per 120-unit wheel notch.
pub const WHEEL_ZOOM_STEP: f32 = 1.12;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Full,
    Portrait,
}

impl ViewMode {
    pub fn toggled(self) -> ViewMode {
        match self {
            ViewMode::Full => ViewMode::Portrait,
            ViewMode::Portrait => ViewMode::Full,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ViewMode::Full => "full",
            ViewMode::Portrait => "portrait",
        }
    }

    /// Lenient parse; anything not recognisably portrait is full.
    pub fn parse(s: &str) -> ViewMode {
        match s.trim().to_ascii_lowercase().as_str() {
            "portrait" | "half" | "bust" => ViewMode::Portrait,
            _ => ViewMode::Full,
        }
    }
}

/// Final transform handed to the native model.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewTransform {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

fn finite_or(v: f32, fallback: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        fallback
    }
}

/// Pure framing computation.
pub fn compute_view(
    width: f32,
    height: f32,
    mode: ViewMode,
    user_scale: f32,
    user_offset_x: f32,
    user_offset_y: f32,
) -> ViewTransform {
    let w = finite_or(width, 1.0).max(1.0);
    let h = finite_or(height, 1.0).max(1.0);
    let height_factor = ((h - 520.0) / 220.0).clamp(0.0, 1.0);
    let aspect_factor = ((w / h - 0.55) / 0.45).clamp(0.0, 1.0);

    let (base_scale, base_y) = match mode {
        ViewMode::Portrait => (
            1.12 + 0.38 * height_factor + 0.14 * aspect_factor,
            -0.10 - 0.10 * height_factor,
        ),
        ViewMode::Full => (
            0.90 + 0.20 * height_factor + 0.06 * aspect_factor,
            -0.03 - 0.06 * height_factor,
        ),
    };

    let user_scale = finite_or(user_scale, 1.0);
    let ux = finite_or(user_offset_x, 0.0);
    let uy = finite_or(user_offset_y, 0.0);
    ViewTransform {
        scale: (base_scale * user_scale).clamp(MIN_SCALE, MAX_SCALE),
        offset_x: ux.clamp(-OFFSET_X_LIMIT, OFFSET_X_LIMIT),
        offset_y: (base_y + uy).clamp(OFFSET_Y_MIN, OFFSET_Y_MAX),
    }
}

/// Mode, user adjustments and the last viewport.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewState {
    pub mode: ViewMode,
    pub user_scale: f32,
    pub user_offset_x: f32,
    pub user_offset_y: f32,
    pub viewport: (u32, u32),
    dirty: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            mode: ViewMode::Full,
            user_scale: 1.0,
            user_offset_x: 0.0,
            user_offset_y: 0.0,
            viewport: (1, 1),
            dirty: true,
        }
    }
}

impl ViewState {
    pub fn transform(&self) -> ViewTransform {
        compute_view(
            self.viewport.0 as f32,
            self.viewport.1 as f32,
            self.mode,
            self.user_scale,
            self.user_offset_x,
            self.user_offset_y,
        )
    }

    /// Mark the transform stale; it is recomputed once by the next frame.
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    /// Take the pending transform if anything changed since the last call.
    pub fn take_pending(&mut self) -> Option<ViewTransform> {
        if std::mem::take(&mut self.dirty) {
            Some(self.transform())
        } else {
            None
        }
    }

    pub fn set_mode(&mut self, mode: ViewMode) -> bool {
        if self.mode == mode {
            return false;
        }
        self.mode = mode;
        self.invalidate();
        true
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        let vp = (width.max(1), height.max(1));
        if vp != self.viewport {
            self.viewport = vp;
            self.invalidate();
        }
    }

    pub fn reset_user(&mut self) {
        self.user_scale = 1.0;
        self.user_offset_x = 0.0;
        self.user_offset_y = 0.0;
        self.invalidate();
    }

    pub fn set_user(&mut self, scale: f32, offset_x: f32, offset_y: f32) {
        self.user_scale = finite_or(scale, 1.0).clamp(MIN_SCALE, MAX_SCALE);
        self.user_offset_x = finite_or(offset_x, 0.0).clamp(-OFFSET_X_LIMIT, OFFSET_X_LIMIT);
        self.user_offset_y = finite_or(offset_y, 0.0).clamp(OFFSET_Y_MIN, OFFSET_Y_MAX);
        self.invalidate();
    }

    /// Wheel zoom; `delta` in wheel units (120 per notch).
    pub fn zoom_by_wheel(&mut self, delta: f32) {
        if !delta.is_finite() || delta == 0.0 {
            return;
        }
        let factor = WHEEL_ZOOM_STEP.powf(delta / 120.0);
        self.set_user(self.user_scale * factor, self.user_offset_x, self.user_offset_y);
    }

    /// Pan by a pointer delta in surface pixels. Screen-down moves the model down.
    pub fn pan_by_pixels(&mut self, dx: f32, dy: f32) {
        let (w, h) = (self.viewport.0.max(1) as f32, self.viewport.1.max(1) as f32);
        let k = 1.4 / self.user_scale.max(0.6);
        self.set_user(
            self.user_scale,
            self.user_offset_x + dx / w * k,
            self.user_offset_y - dy / h * k,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn small_surface_uses_base_factors() {
        let v = compute_view(400.0, 500.0, ViewMode::Full, 1.0, 0.0, 0.0);
        // height factor 0, aspect (0.8 - 0.55) / 0.45
        let af = (0.8 - 0.55) / 0.45;
        assert!(approx(v.scale, 0.90 + 0.06 * af));
        assert!(approx(v.offset_y, -0.03));
        let p = compute_view(400.0, 500.0, ViewMode::Portrait, 1.0, 0.0, 0.0);
        assert!(approx(p.scale, 1.12 + 0.14 * af));
        assert!(approx(p.offset_y, -0.10));
    }

    #[test]
    fn tall_surface_saturates_height_factor() {
        let a = compute_view(800.0, 740.0, ViewMode::Portrait, 1.0, 0.0, 0.0);
        let b = compute_view(1600.0, 1480.0, ViewMode::Portrait, 1.0, 0.0, 0.0);
        assert_eq!(a, b);
        assert!(approx(a.offset_y, -0.20));
    }

    #[test]
    fn extreme_user_values_are_clamped() {
        let v = compute_view(800.0, 600.0, ViewMode::Portrait, 100.0, 5.0, -5.0);
        assert_eq!(v.scale, MAX_SCALE);
        assert_eq!(v.offset_x, OFFSET_X_LIMIT);
        assert_eq!(v.offset_y, OFFSET_Y_MIN);
        let v = compute_view(f32::NAN, 0.0, ViewMode::Full, f32::INFINITY, f32::NAN, 0.0);
        assert!(v.scale.is_finite() && v.offset_x == 0.0);
    }

    #[test]
    fn recompute_is_coalesced() {
        let mut s = ViewState::default();
        s.set_viewport(800, 600);
        s.set_mode(ViewMode::Portrait);
        s.zoom_by_wheel(120.0);
        assert!(s.take_pending().is_some());
        assert!(s.take_pending().is_none());
        s.set_viewport(800, 600);
        assert!(s.take_pending().is_none());
    }

    #[test]
    fn wheel_and_pan() {
        let mut s = ViewState::default();
        s.set_viewport(1000, 500);
        s.zoom_by_wheel(240.0);
        assert!(approx(s.user_scale, 1.12 * 1.12));
        s.reset_user();
        s.pan_by_pixels(100.0, 50.0);
        assert!(approx(s.user_offset_x, 0.1 * 1.4));
        assert!(approx(s.user_offset_y, -0.1 * 1.4));
    }

    #[test]
    fn mode_toggle_and_parse() {
        assert_eq!(ViewMode::Full.toggled(), ViewMode::Portrait);
        assert_eq!(ViewMode::parse(" Portrait "), ViewMode::Portrait);
        assert_eq!(ViewMode::parse("whatever"), ViewMode::Full);
    }
}
