use std::path::PathBuf;

use bevy::prelude::*;
use mint_avatar_core::{AvatarController, AvatarStatus, FrameStats, PointerEvent, StateEventSender, ViewMode};

/// The controller. Non-send: it owns the native runtime, which must stay on
/// the thread holding the graphics context.
pub struct AvatarDriver(pub AvatarController);

/// Seconds since the app started, fed to `AvatarController::tick`.
#[derive(Resource, Default)]
pub struct AvatarClock {
    pub t: f64,
}

/// Host surface state. Changes are forwarded to the controller: a hidden
/// surface pauses ticking, a size change reframes the model.
#[derive(Resource, Clone, Copy, Debug, PartialEq)]
pub struct AvatarSurface {
    pub visible: bool,
    pub width: u32,
    pub height: u32,
}

impl Default for AvatarSurface {
    fn default() -> Self {
        Self {
            visible: true,
            width: 1280,
            height: 720,
        }
    }
}

/// Latest published status, mirrored into the ECS when its version moves.
#[derive(Resource, Default, Clone, Debug)]
pub struct AvatarStatusSnapshot {
    pub status: AvatarStatus,
    pub version: u64,
}

/// Thread-safe handle for queueing state events from any system or thread.
#[derive(Resource, Clone)]
pub struct AvatarEvents(pub StateEventSender);

/// Stats of the most recent rendered frame.
#[derive(Resource, Default, Clone, Debug)]
pub struct LastFrame(pub Option<FrameStats>);

/// Host requests, applied in order on the next `Update`.
#[derive(Event, Clone, Debug)]
pub enum AvatarCommand {
    LoadModel(PathBuf),
    SetPaused(bool),
    SetSurfaceVisible(bool),
    Resize { width: u32, height: u32 },
    SetViewMode(ViewMode),
    ToggleViewMode,
    ResetView,
    SetUserPanZoom { scale: f32, offset_x: f32, offset_y: f32 },
    SetInteractionLocked(bool),
    SetVtuberEnabled(bool),
    SetLipSync(f32),
    /// CSS-like color text, e.g. `#202028` or `transparent`.
    SetClearColor(String),
    Pointer(PointerEvent),
    Reaction { kind: String, pos: Option<(f32, f32)> },
}
