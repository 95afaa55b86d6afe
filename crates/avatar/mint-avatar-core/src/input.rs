//! Pointer handling: pan/zoom/tap classification and the look-at point fed to
//! the model each frame.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

/// Time constant for smoothing the hovering pointer, seconds.
pub const FOLLOW_TAU_S: f32 = 0.075;
pub const FOLLOW_ALPHA_MIN: f32 = 0.05;
pub const FOLLOW_ALPHA_MAX: f32 = 0.9;
/// Longest gap treated as continuous following, seconds.
const FOLLOW_MAX_GAP_S: f64 = 0.25;

pub const IDLE_DRAG_INTERVAL_S: f64 = 0.085;
pub const IDLE_DRAG_INTERVAL_SPEAKING_S: f64 = 0.04;
/// Lip-sync level above which the idle look-at point moves faster and bobs.
const IDLE_DRAG_SPEAKING_LEVEL: f32 = 0.02;
const IDLE_DRAG_BOB_LEVEL: f32 = 0.01;

/// Boost window after a wheel zoom, seconds.
pub const WHEEL_BOOST_S: f64 = 1.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerButton {
    Left,
    Right,
    Middle,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub alt: bool,
    pub shift: bool,
    pub ctrl: bool,
}

/// Pointer input in surface pixels, y down.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PointerEvent {
    Enter { x: f32, y: f32 },
    Leave,
    Move { x: f32, y: f32, pressed: bool },
    Press { x: f32, y: f32, button: PointerButton, modifiers: Modifiers },
    Release { x: f32, y: f32, button: PointerButton },
    /// Wheel delta in 1/8 degree units (120 per notch), positive zooms in.
    Wheel { delta: f32 },
}

/// What the controller should do in response to one pointer event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerAction {
    None,
    /// Raise the frame rate briefly; nothing else changes.
    Boost,
    Pan { dx: f32, dy: f32 },
    Zoom { delta: f32 },
    Tap { x: f32, y: f32 },
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
enum Drag {
    #[default]
    Idle,
    /// Left press that becomes a pan once it moves far enough.
    Candidate { origin: (f32, f32) },
    Panning { button: PointerButton, last: (f32, f32) },
}

#[derive(Clone, Debug)]
pub struct PointerState {
    pan_threshold_px: f32,
    inside: bool,
    target: Option<(f32, f32)>,
    smoothed: Option<(f32, f32)>,
    smoothed_at: f64,
    drag: Drag,
    next_idle_drag: f64,
}

impl PointerState {
    pub fn new(pan_threshold_px: f32) -> Self {
        Self {
            pan_threshold_px: pan_threshold_px.max(0.0),
            inside: false,
            target: None,
            smoothed: None,
            smoothed_at: 0.0,
            drag: Drag::Idle,
            next_idle_drag: 0.0,
        }
    }

    /// Pointer over the surface or an active drag.
    pub fn is_hovering(&self) -> bool {
        self.inside || !matches!(self.drag, Drag::Idle)
    }

    pub fn is_panning(&self) -> bool {
        matches!(self.drag, Drag::Panning { .. })
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.pan_threshold_px);
    }

    /// Classify `event`. `locked` disables pan and zoom but not taps.
    pub fn handle(&mut self, event: PointerEvent, locked: bool) -> PointerAction {
        match event {
            PointerEvent::Enter { x, y } => {
                self.inside = true;
                self.target = Some((x, y));
                PointerAction::None
            }
            PointerEvent::Leave => {
                self.inside = false;
                self.target = None;
                PointerAction::None
            }
            PointerEvent::Move { x, y, pressed } => {
                self.inside = true;
                match self.drag {
                    Drag::Panning { button, last } => {
                        self.drag = Drag::Panning { button, last: (x, y) };
                        return PointerAction::Pan {
                            dx: x - last.0,
                            dy: y - last.1,
                        };
                    }
                    Drag::Candidate { origin } if !locked && pressed => {
                        let (dx, dy) = (x - origin.0, y - origin.1);
                        if dx * dx + dy * dy >= self.pan_threshold_px * self.pan_threshold_px {
                            self.drag = Drag::Panning {
                                button: PointerButton::Left,
                                last: (x, y),
                            };
                            return PointerAction::Pan { dx, dy };
                        }
                    }
                    _ => {}
                }
                self.target = Some((x, y));
                if pressed {
                    PointerAction::Boost
                } else {
                    PointerAction::None
                }
            }
            PointerEvent::Press { x, y, button, modifiers } => {
                self.inside = true;
                let pan_button = button == PointerButton::Right
                    || (button == PointerButton::Left && modifiers.alt);
                if !locked && pan_button {
                    self.drag = Drag::Panning { button, last: (x, y) };
                } else if button == PointerButton::Left {
                    self.drag = Drag::Candidate { origin: (x, y) };
                    self.target = Some((x, y));
                }
                PointerAction::Boost
            }
            PointerEvent::Release { x, y, button } => match self.drag {
                Drag::Panning { button: b, .. } if b == button => {
                    self.drag = Drag::Idle;
                    PointerAction::None
                }
                Drag::Candidate { .. } if button == PointerButton::Left => {
                    self.drag = Drag::Idle;
                    PointerAction::Tap { x, y }
                }
                _ => PointerAction::None,
            },
            PointerEvent::Wheel { delta } => {
                if locked || !delta.is_finite() || delta == 0.0 {
                    PointerAction::None
                } else {
                    PointerAction::Zoom { delta }
                }
            }
        }
    }

    /// Smoothed pointer position while hovering, `None` otherwise.
    pub fn follow_point(&mut self, now: f64) -> Option<(f32, f32)> {
        let target = match (self.is_hovering(), self.target) {
            (true, Some(t)) => t,
            _ => {
                self.smoothed = None;
                return None;
            }
        };
        let next = match self.smoothed {
            Some(prev) if now.is_finite() => {
                let dt = (now - self.smoothed_at).clamp(0.0, FOLLOW_MAX_GAP_S) as f32;
                let alpha = (1.0 - (-dt / FOLLOW_TAU_S).exp()).clamp(FOLLOW_ALPHA_MIN, FOLLOW_ALPHA_MAX);
                (
                    prev.0 + (target.0 - prev.0) * alpha,
                    prev.1 + (target.1 - prev.1) * alpha,
                )
            }
            _ => target,
        };
        self.smoothed = Some(next);
        self.smoothed_at = now;
        Some(next)
    }

    /// Idle look-at wobble, rate limited. `t` is seconds since model load.
    pub fn idle_drag_point(&mut self, now: f64, t: f64, viewport: (u32, u32), lipsync: f32) -> Option<(f32, f32)> {
        if now < self.next_idle_drag {
            return None;
        }
        let interval = if lipsync > IDLE_DRAG_SPEAKING_LEVEL {
            IDLE_DRAG_INTERVAL_SPEAKING_S
        } else {
            IDLE_DRAG_INTERVAL_S
        };
        self.next_idle_drag = now + interval;
        Some(idle_wobble(t, viewport, lipsync))
    }
}

/// Look-at point that drifts around the upper middle of the surface.
pub fn idle_wobble(t: f64, viewport: (u32, u32), lipsync: f32) -> (f32, f32) {
    let w = f64::from(viewport.0.max(1));
    let h = f64::from(viewport.1.max(1));
    let t = t.max(0.0);
    let wobble_x = (TAU * 0.16 * t).sin() + 0.35 * (TAU * 0.47 * t + 0.4).sin();
    let wobble_y = (TAU * 0.13 * t + 1.2).sin() + 0.28 * (TAU * 0.41 * t + 2.1).sin();
    let mut x = w * 0.52 + w * 0.088 * wobble_x;
    let mut y = h * 0.34 + h * 0.078 * wobble_y;
    if lipsync > IDLE_DRAG_BOB_LEVEL {
        let lv = f64::from(lipsync.min(1.0));
        x += w * 0.010 * lv * (TAU * 0.9 * t + 0.8).sin();
        y += h * 0.018 * lv * (0.55 + 0.45 * (TAU * 1.1 * t).sin());
    }
    (x.clamp(0.0, w) as f32, y.clamp(0.0, h) as f32)
}
