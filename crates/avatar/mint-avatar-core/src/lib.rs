//! Mint Avatar Core (engine-agnostic)
//!
//! Procedural animation and interaction controller for parametric 2D avatars.
//! The crate owns the per-frame control loop (pose engine, lip-sync follower,
//! view heuristic, scheduler) and talks to a native rig runtime only through
//! the [`ModelRuntime`] / [`NativeModel`] traits. Hosts (see `bevy_mint_avatar`)
//! drive it by calling [`AvatarController::tick`].

pub mod binding;
pub mod catalog;
pub mod color;
pub mod config;
pub mod controller;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod expression;
pub mod input;
pub mod lipsync;
pub mod native;
pub mod params;
pub mod pose;
pub mod sanitizer;
pub mod scheduler;
pub mod status;
pub mod view;
pub mod writes;

// Re-exports for hosts
pub use binding::{ParamSupport, ParameterBinder, ParameterSetter};
pub use catalog::{
    event_key_for_hit_parts, find_model_descriptor, pick_idle_motion_group, resolve_expression,
    resolve_gesture_kind, ExpressionCatalog,
};
pub use color::Rgba;
pub use config::{AvatarConfig, TickConfig};
pub use controller::AvatarController;
pub use descriptor::ModelDescriptor;
pub use error::{AvatarError, AvatarResult, NativeError};
pub use events::{StateEvent, StateEventQueue, StateEventSender};
pub use expression::{ExpressionLayer, ExpressionMode};
pub use input::{Modifiers, PointerButton, PointerEvent};
pub use lipsync::LipSync;
pub use native::{ModelRuntime, NativeModel, NativeResult};
pub use pose::{GestureKind, Pose, PoseEngine, PoseInputs};
pub use sanitizer::{AssetSanitizer, SanitizeStats};
pub use scheduler::{FrameScheduler, FrameStats, LoadMode, TickOutcome};
pub use status::{AvatarStatus, StatusWatch};
pub use view::{compute_view, ViewMode, ViewState, ViewTransform};
pub use writes::{ParamWrite, WriteBatch};
