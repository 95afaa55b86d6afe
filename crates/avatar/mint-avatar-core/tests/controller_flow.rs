use mint_avatar_core::{params, AvatarConfig, AvatarController, AvatarError, PointerButton, PointerEvent, TickOutcome, ViewMode};
use mint_avatar_test_fixtures::mock::{Capabilities, MockHandle, MockRuntime};
use mint_avatar_test_fixtures::{models, ModelDir};

const BASE_FILE: &str = "手势 抱娃娃.exp3.json";

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

fn setup(caps: Capabilities) -> (AvatarController, MockHandle, ModelDir) {
    init_tracing();
    let model = models::materialize("mint", "mint").unwrap();
    let config = AvatarConfig {
        cache_dir: model.cache.clone(),
        seed: Some(7),
        ..Default::default()
    };
    let (runtime, log) = MockRuntime::boxed(caps);
    let mut ctl = AvatarController::new(config, runtime);
    ctl.resize(800, 1000);
    (ctl, log, model)
}

fn loaded(caps: Capabilities) -> (AvatarController, MockHandle, ModelDir) {
    let (mut ctl, log, model) = setup(caps);
    ctl.initialize().unwrap();
    ctl.load_model(&model.dir).unwrap();
    (ctl, log, model)
}

/// Tick every 50 ms from `from` until `to`, returning how many frames rendered.
fn run(ctl: &mut AvatarController, from: f64, to: f64) -> usize {
    let mut t = from;
    let mut rendered = 0;
    while t <= to {
        if ctl.tick(t).rendered().is_some() {
            rendered += 1;
        }
        t += 0.05;
    }
    rendered
}

/// it should defer a load until the runtime is initialized
#[test]
fn load_before_initialize_is_deferred() {
    let (mut ctl, log, model) = setup(Capabilities::default());
    let found = ctl.load_model(&model.dir).unwrap();
    assert_eq!(found, model.descriptor);
    assert!(!ctl.is_ready());
    assert!(log.lock().loaded.is_empty());

    ctl.initialize().unwrap();
    assert!(ctl.is_ready());
    let log = log.lock();
    assert_eq!(log.initialized, 1);
    assert_eq!(log.loaded.len(), 1);
    assert!(log.loaded[0].ends_with("model.model3.json"));
    assert_eq!(log.motions.first(), Some(&("Idle".to_string(), 1)));
    assert!(log.resizes.contains(&(800, 1000)));
}

/// it should load the sanitized copy and apply the default base expression
#[test]
fn load_applies_base_expression() {
    let (ctl, log, model) = loaded(Capabilities::default());
    assert_eq!(ctl.source_descriptor(), Some(model.descriptor.as_path()));
    assert_ne!(ctl.native_descriptor(), Some(model.descriptor.as_path()));
    assert!(ctl.motion_groups().iter().any(|g| g == "TapBody"));
    assert_eq!(ctl.expressions().base_file(), Some(BASE_FILE));
    assert!(log.lock().expressions.contains(&"add expr_03".to_string()));
    assert_eq!(ctl.status().active_expression.as_deref(), Some(BASE_FILE));
    assert_eq!(ctl.binder().shape_name(), Some("id"));
}

/// it should render due frames, skip early ticks and stop while paused
#[test]
fn ticking_and_pausing() {
    let (mut ctl, log, _model) = loaded(Capabilities::default());
    assert!(ctl.tick(10.0).rendered().is_some());
    assert_eq!(ctl.tick(10.001), TickOutcome::NotDue);
    {
        let log = log.lock();
        assert_eq!(log.draws, 1);
        assert_eq!(log.updates, 1);
        assert_eq!(log.clears.len(), 1);
        assert!(log.values.contains_key(params::ANGLE_X));
        assert!(log.scale.is_some(), "first frame applies the view");
    }

    ctl.set_paused(true);
    assert!(ctl.status().paused);
    assert_eq!(ctl.tick(11.0), TickOutcome::Paused);

    ctl.set_paused(false);
    ctl.set_surface_visible(false);
    assert!(!ctl.status().paused, "status reports only the requested pause");
    assert_eq!(ctl.tick(11.5), TickOutcome::Paused);

    ctl.set_surface_visible(true);
    let stats = ctl.tick(12.0);
    let stats = stats.rendered().expect("resumed frame");
    assert!(stats.dt <= 0.1, "resume must not produce a huge dt");
    assert_eq!(log.lock().draws, 2);
}

/// it should show a resolved state expression and restore the base once it expires
#[test]
fn state_event_shows_then_expires() {
    let (mut ctl, log, _model) = loaded(Capabilities::default());
    ctl.tick(1.0);

    let sender = ctl.state_event_sender();
    assert!(sender.request("sad", 0.6, None, "test"));
    ctl.tick(1.1);
    assert_eq!(ctl.status().active_expression.as_deref(), Some("哭哭.exp3.json"));
    assert!(log.lock().expressions.contains(&"add expr_01".to_string()));
    assert!(ctl.pose().gestures().is_active(1.2));

    run(&mut ctl, 1.15, 8.0);
    assert_eq!(ctl.status().active_expression.as_deref(), Some(BASE_FILE));
    assert!(log.lock().expressions.contains(&"remove expr_01".to_string()));
}

/// it should select the only expression of a model for a matching state event
#[test]
fn single_expression_model_selects_that_file() {
    init_tracing();
    let model = models::materialize("cry", "cry").unwrap();
    let config = AvatarConfig {
        cache_dir: model.cache.clone(),
        seed: Some(11),
        default_expression: None,
        ..Default::default()
    };
    let (runtime, log) = MockRuntime::boxed(Capabilities::default());
    let mut ctl = AvatarController::new(config, runtime);
    ctl.initialize().unwrap();
    ctl.load_model(&model.dir).unwrap();
    ctl.tick(1.0);
    assert_eq!(ctl.status().active_expression, None);

    ctl.request_state_event("sad", 0.5, None, "test");
    ctl.tick(1.1);
    assert_eq!(ctl.status().active_expression.as_deref(), Some("哭哭.exp3.json"));
    assert_eq!(log.lock().expressions, ["add expr_01"]);
}

/// it should fall back to replacing the expression when layering is unsupported
#[test]
fn override_mode_restores_base() {
    let caps = Capabilities {
        additive_expressions: false,
        ..Default::default()
    };
    let (mut ctl, log, _model) = loaded(caps);
    ctl.tick(1.0);
    ctl.request_state_event("angry", 1.0, Some(1.5), "test");
    run(&mut ctl, 1.05, 4.0);
    let log = log.lock();
    let tail: Vec<&str> = log.expressions.iter().map(String::as_str).collect();
    assert_eq!(tail, ["set expr_03", "set expr_02", "set expr_03"]);
}

/// it should ignore unresolvable keys without touching expressions
#[test]
fn unknown_event_is_ignored() {
    let (mut ctl, log, _model) = loaded(Capabilities::default());
    ctl.tick(1.0);
    let before = log.lock().expressions.len();
    ctl.request_state_event("definitely-not-a-mood", 1.0, None, "test");
    assert!(!ctl.request_state_event("   ", 1.0, None, "test"));
    ctl.tick(1.1);
    assert_eq!(log.lock().expressions.len(), before);
    assert_eq!(ctl.status().active_expression.as_deref(), Some(BASE_FILE));
}

/// it should pick the motion group from hit areas and queue part events
#[test]
fn tap_reactions_follow_hit_areas() {
    let caps = Capabilities {
        head_max_y: Some(200.0),
        hit_parts: Some(vec!["Part_Ear_L".into()]),
        ..Default::default()
    };
    let (mut ctl, log, _model) = loaded(caps);
    ctl.tick(1.0);

    assert!(ctl.trigger_reaction("manual", Some((400.0, 600.0))));
    assert_eq!(log.lock().motions.last(), Some(&("TapBody".to_string(), 3)));
    ctl.tick(1.1);
    assert_eq!(ctl.status().active_expression.as_deref(), Some("耳朵.exp3.json"));

    // head: TapHead is missing so TapBody plays, and the base rotates
    assert!(ctl.trigger_reaction("manual", Some((400.0, 100.0))));
    assert_eq!(log.lock().motions.last(), Some(&("TapBody".to_string(), 3)));
    assert_ne!(ctl.expressions().base_file(), Some(BASE_FILE));
    assert!(ctl.expressions().state_until().is_none());
}

/// it should fall back to Idle when no tap group exists
#[test]
fn reaction_without_tap_groups_plays_idle() {
    let caps = Capabilities {
        motion_groups: Some(vec!["Idle".into()]),
        ..Default::default()
    };
    let (mut ctl, log, _model) = loaded(caps);
    assert!(ctl.trigger_reaction("user", None));
    assert_eq!(log.lock().motions.last(), Some(&("Idle".to_string(), 1)));
}

/// it should turn a short left click into a tap and a long drag into a pan
#[test]
fn pointer_tap_and_pan() {
    let (mut ctl, log, _model) = loaded(Capabilities::default());
    ctl.tick(1.0);
    let motions = log.lock().motions.len();

    ctl.handle_pointer(PointerEvent::Press {
        x: 100.0,
        y: 100.0,
        button: PointerButton::Left,
        modifiers: Default::default(),
    });
    ctl.handle_pointer(PointerEvent::Release {
        x: 101.0,
        y: 101.0,
        button: PointerButton::Left,
    });
    assert_eq!(log.lock().motions.len(), motions + 1);

    let before = ctl.view().user_offset_x;
    ctl.handle_pointer(PointerEvent::Press {
        x: 100.0,
        y: 100.0,
        button: PointerButton::Left,
        modifiers: Default::default(),
    });
    ctl.handle_pointer(PointerEvent::Move {
        x: 180.0,
        y: 100.0,
        pressed: true,
    });
    ctl.handle_pointer(PointerEvent::Release {
        x: 180.0,
        y: 100.0,
        button: PointerButton::Left,
    });
    assert!(ctl.view().user_offset_x > before);
    assert_eq!(log.lock().motions.len(), motions + 1, "a pan is not a tap");

    ctl.set_interaction_locked(true);
    let locked_x = ctl.view().user_offset_x;
    ctl.handle_pointer(PointerEvent::Wheel { delta: 240.0 });
    ctl.handle_pointer(PointerEvent::Press {
        x: 100.0,
        y: 100.0,
        button: PointerButton::Left,
        modifiers: Default::default(),
    });
    ctl.handle_pointer(PointerEvent::Move {
        x: 300.0,
        y: 100.0,
        pressed: true,
    });
    assert_eq!(ctl.view().user_offset_x, locked_x);
}

/// it should push a new view transform after a mode switch
#[test]
fn view_mode_switch_reframes() {
    let (mut ctl, log, _model) = loaded(Capabilities::default());
    ctl.tick(1.0);
    let full = log.lock().scale.unwrap();
    assert_eq!(ctl.toggle_view_mode(), ViewMode::Portrait);
    assert_eq!(ctl.status().view_mode, ViewMode::Portrait);
    run(&mut ctl, 1.05, 1.2);
    let portrait = log.lock().scale.unwrap();
    assert!(portrait > full);
}

/// it should drive the mouth from lip-sync levels
#[test]
fn lipsync_reaches_the_mouth() {
    let (mut ctl, log, _model) = loaded(Capabilities::default());
    ctl.tick(1.0);
    ctl.set_lipsync_level(0.9);
    assert!(ctl.scheduler().is_boosted(1.0));
    run(&mut ctl, 1.05, 1.5);
    let mouth = log.lock().values.get(params::MOUTH_OPEN_Y).copied().unwrap();
    assert!(mouth > 0.5, "mouth {mouth}");
    ctl.set_lipsync_level(0.0);
    run(&mut ctl, 1.55, 2.5);
    let mouth = log.lock().values.get(params::MOUTH_OPEN_Y).copied().unwrap();
    assert!(mouth < 0.05, "mouth {mouth}");
}

/// it should count failing draws as frame errors and keep ticking
#[test]
fn draw_failures_are_counted() {
    let caps = Capabilities {
        fail_draw: true,
        ..Default::default()
    };
    let (mut ctl, _log, _model) = loaded(caps);
    assert!(run(&mut ctl, 1.0, 1.5) > 1);
    assert!(ctl.frame_errors() > 1);
    assert!(ctl.is_ready());
}

/// it should become a no-op controller when the runtime is unavailable
#[test]
fn unavailable_runtime_is_inert() {
    init_tracing();
    let model = models::materialize("plain", "plain").unwrap();
    let mut ctl = AvatarController::unavailable(AvatarConfig::default(), "no native library");
    assert!(ctl.status().error_message.as_deref().unwrap().contains("no native library"));
    assert!(matches!(ctl.initialize(), Err(AvatarError::RuntimeUnavailable(_))));
    assert!(matches!(ctl.load_model(&model.dir), Err(AvatarError::RuntimeUnavailable(_))));
    assert_eq!(ctl.tick(1.0), TickOutcome::Paused);
    assert!(!ctl.trigger_reaction("manual", None));
    assert!(!ctl.is_ready());
}

/// it should surface initialization failures in the status
#[test]
fn initialize_failure_is_reported() {
    let caps = Capabilities {
        fail_initialize: true,
        ..Default::default()
    };
    let (mut ctl, log, _model) = setup(caps);
    assert!(matches!(ctl.initialize(), Err(AvatarError::RuntimeUnavailable(_))));
    assert!(ctl.status().error_message.is_some());
    assert_eq!(log.lock().initialized, 0);
}

/// it should report a missing model and stay unready
#[test]
fn missing_model_is_reported() {
    let (mut ctl, _log, model) = setup(Capabilities::default());
    ctl.initialize().unwrap();
    let err = ctl.load_model(&model.dir.join("nope")).unwrap_err();
    assert!(matches!(err, AvatarError::DescriptorNotFound(_)));
    assert!(!ctl.is_ready());
    assert!(ctl.status().error_message.is_some());
    assert_eq!(ctl.tick(1.0), TickOutcome::Paused);
}

/// it should publish status changes through the watch
#[test]
fn status_watch_sees_changes() {
    let (mut ctl, _log, _model) = loaded(Capabilities::default());
    let watch = ctl.status_watch();
    assert!(watch.get().ready);
    let version = watch.version();
    ctl.set_interaction_locked(true);
    assert!(watch.version() > version);
    assert!(watch.get().interaction_locked);
}

/// it should stop ticking after release and recover on a fresh load
#[test]
fn release_then_reload() {
    let (mut ctl, log, model) = loaded(Capabilities::default());
    ctl.tick(1.0);
    ctl.release();
    assert!(!ctl.is_ready());
    assert_eq!(ctl.tick(2.0), TickOutcome::Paused);
    assert_eq!(log.lock().released, 1);

    ctl.initialize().unwrap();
    ctl.load_model(&model.descriptor).unwrap();
    assert!(ctl.tick(3.0).rendered().is_some());
    assert_eq!(log.lock().loaded.len(), 2);
}
