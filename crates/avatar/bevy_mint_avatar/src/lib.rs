//! Bevy integration for `mint-avatar-core`.
//!
//! Add [`MintAvatarPlugin`], then hand it a controller with
//! [`AvatarAppExt::insert_avatar`]. Everything else goes through
//! [`AvatarCommand`] events and the [`AvatarEvents`] sender.

use bevy::prelude::*;
use mint_avatar_core::AvatarController;

pub mod resources;
pub mod systems;

pub use resources::{
    AvatarClock, AvatarCommand, AvatarDriver, AvatarEvents, AvatarStatusSnapshot, AvatarSurface, LastFrame,
};

/// System ordering inside `Update`.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum AvatarSet {
    Commands,
    Tick,
    Status,
}

pub struct MintAvatarPlugin;

impl Plugin for MintAvatarPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(AvatarClock::default())
            .insert_resource(AvatarStatusSnapshot::default())
            .insert_resource(LastFrame::default())
            .init_resource::<AvatarSurface>()
            .add_event::<AvatarCommand>()
            .configure_sets(
                Update,
                (AvatarSet::Commands, AvatarSet::Tick, AvatarSet::Status).chain(),
            )
            .add_systems(Startup, systems::initialize_system)
            .add_systems(
                Update,
                (
                    (
                        systems::clock_system,
                        systems::surface_system,
                        systems::command_system,
                    )
                        .chain()
                        .in_set(AvatarSet::Commands),
                    systems::tick_system.in_set(AvatarSet::Tick),
                    systems::status_system.in_set(AvatarSet::Status),
                ),
            );
    }
}

pub trait AvatarAppExt {
    /// Install `controller` as the non-send [`AvatarDriver`] and expose its
    /// state-event sender as [`AvatarEvents`].
    fn insert_avatar(&mut self, controller: AvatarController) -> &mut Self;
}

impl AvatarAppExt for App {
    fn insert_avatar(&mut self, controller: AvatarController) -> &mut Self {
        let events = AvatarEvents(controller.state_event_sender());
        self.insert_resource(events)
            .insert_non_send_resource(AvatarDriver(controller))
    }
}
