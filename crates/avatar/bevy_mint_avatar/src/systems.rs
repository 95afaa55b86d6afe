use bevy::prelude::*;
use tracing::warn;

use crate::resources::{AvatarClock, AvatarCommand, AvatarDriver, AvatarStatusSnapshot, AvatarSurface, LastFrame};

/// Bring the native runtime up once; a load requested earlier runs here.
pub fn initialize_system(driver: Option<NonSendMut<AvatarDriver>>) {
    let Some(mut driver) = driver else {
        return;
    };
    if let Err(err) = driver.0.initialize() {
        warn!(error = %err, "avatar runtime failed to initialize");
    }
}

pub fn clock_system(time: Res<Time>, mut clock: ResMut<AvatarClock>) {
    clock.t += time.delta_seconds_f64();
}

pub fn surface_system(surface: Res<AvatarSurface>, driver: Option<NonSendMut<AvatarDriver>>) {
    let Some(mut driver) = driver else {
        return;
    };
    if surface.is_changed() {
        driver.0.set_surface_visible(surface.visible);
        driver.0.resize(surface.width, surface.height);
    }
}

pub fn command_system(mut commands: EventReader<AvatarCommand>, driver: Option<NonSendMut<AvatarDriver>>) {
    let Some(mut driver) = driver else {
        commands.clear();
        return;
    };
    let ctl = &mut driver.0;
    for cmd in commands.read() {
        match cmd {
            AvatarCommand::LoadModel(path) => {
                if let Err(err) = ctl.load_model(path) {
                    warn!(path = %path.display(), error = %err, "avatar model load failed");
                }
            }
            AvatarCommand::SetPaused(p) => ctl.set_paused(*p),
            AvatarCommand::SetSurfaceVisible(v) => ctl.set_surface_visible(*v),
            AvatarCommand::Resize { width, height } => ctl.resize(*width, *height),
            AvatarCommand::SetViewMode(mode) => ctl.set_view_mode(*mode),
            AvatarCommand::ToggleViewMode => {
                ctl.toggle_view_mode();
            }
            AvatarCommand::ResetView => ctl.reset_view(),
            AvatarCommand::SetUserPanZoom {
                scale,
                offset_x,
                offset_y,
            } => ctl.set_user_pan_zoom(*scale, *offset_x, *offset_y),
            AvatarCommand::SetInteractionLocked(l) => ctl.set_interaction_locked(*l),
            AvatarCommand::SetVtuberEnabled(e) => ctl.set_vtuber_enabled(*e),
            AvatarCommand::SetLipSync(level) => ctl.set_lipsync_level(*level),
            AvatarCommand::SetClearColor(css) => ctl.set_clear_color_css(css),
            AvatarCommand::Pointer(ev) => ctl.handle_pointer(*ev),
            AvatarCommand::Reaction { kind, pos } => {
                ctl.trigger_reaction(kind, *pos);
            }
        }
    }
}

pub fn tick_system(clock: Res<AvatarClock>, driver: Option<NonSendMut<AvatarDriver>>, mut last: ResMut<LastFrame>) {
    let Some(mut driver) = driver else {
        return;
    };
    if let Some(stats) = driver.0.tick(clock.t).rendered() {
        last.0 = Some(*stats);
    }
}

pub fn status_system(driver: Option<NonSend<AvatarDriver>>, mut snapshot: ResMut<AvatarStatusSnapshot>) {
    let Some(driver) = driver else {
        return;
    };
    let watch = driver.0.status_watch();
    let version = watch.version();
    if version != snapshot.version {
        snapshot.status = watch.get();
        snapshot.version = version;
    }
}
