use mint_avatar_core::expression::{state_hold, STATE_HOLD_MAX_S, STATE_HOLD_MIN_S};
use mint_avatar_core::pose::{BlinkState, HEAD_LIMIT, BODY_LIMIT, EYE_LIMIT};
use mint_avatar_core::view::{MAX_SCALE, MIN_SCALE, OFFSET_X_LIMIT, OFFSET_Y_MAX, OFFSET_Y_MIN};
use mint_avatar_core::{compute_view, params, resolve_expression, PoseEngine, PoseInputs, ViewMode};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn any_f32() -> impl Strategy<Value = f32> {
    prop_oneof![
        -5000.0f32..5000.0,
        Just(f32::NAN),
        Just(f32::INFINITY),
        Just(f32::NEG_INFINITY),
        Just(0.0),
    ]
}

proptest! {
    /// it should keep every view transform inside the framing bounds
    #[test]
    fn view_stays_in_bounds(
        w in any_f32(),
        h in any_f32(),
        portrait in any::<bool>(),
        s in any_f32(),
        x in any_f32(),
        y in any_f32(),
    ) {
        let mode = if portrait { ViewMode::Portrait } else { ViewMode::Full };
        let v = compute_view(w, h, mode, s, x, y);
        prop_assert!(v.scale.is_finite() && v.offset_x.is_finite() && v.offset_y.is_finite());
        prop_assert!((MIN_SCALE..=MAX_SCALE).contains(&v.scale));
        prop_assert!((-OFFSET_X_LIMIT..=OFFSET_X_LIMIT).contains(&v.offset_x));
        prop_assert!((OFFSET_Y_MIN..=OFFSET_Y_MAX).contains(&v.offset_y));
    }

    /// it should only ever report eye openness in [0, 1]
    #[test]
    fn blink_samples_in_range(seed in any::<u64>(), step_ms in 1u32..120) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut blink = BlinkState::new(0.0, &mut rng);
        let mut t = 0.0;
        while t < 20.0 {
            let v = blink.sample(t, &mut rng);
            prop_assert!((0.0..=1.0).contains(&v), "v={v} at t={t}");
            t += f64::from(step_ms) / 1000.0;
        }
    }

    /// it should keep pose writes within the rig ranges for any lip-sync input
    #[test]
    fn pose_writes_stay_clamped(seed in any::<u64>(), level in -1.0f32..2.0, portrait in any::<bool>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut engine = PoseEngine::new(0.0, &mut rng);
        for i in 0..240 {
            let input = PoseInputs {
                now: f64::from(i) / 30.0,
                dt: 1.0 / 30.0,
                lipsync: level,
                portrait,
                weighted: seed % 2 == 0,
                ..Default::default()
            };
            let batch = engine.step(&input, &mut rng);
            for w in batch.iter() {
                prop_assert!(w.value.is_finite());
                let limit = match w.id {
                    params::ANGLE_X | params::ANGLE_Y | params::ANGLE_Z => HEAD_LIMIT,
                    params::BODY_ANGLE_X | params::BODY_ANGLE_Y | params::BODY_ANGLE_Z => BODY_LIMIT,
                    params::EYE_BALL_X | params::EYE_BALL_Y => EYE_LIMIT,
                    _ => 1.0,
                };
                prop_assert!(w.value.abs() <= limit + 1e-4, "{} = {}", w.id, w.value);
                prop_assert!((0.0..=1.0).contains(&w.weight));
            }
        }
    }

    /// it should keep state-expression holds within their clamp
    #[test]
    fn state_hold_is_bounded(intensity in any_f32(), hold in proptest::option::of(-100.0f64..100.0)) {
        let ttl = state_hold(intensity, hold);
        prop_assert!((STATE_HOLD_MIN_S..=STATE_HOLD_MAX_S).contains(&ttl));
    }

    /// it should never resolve to a file outside the available list
    #[test]
    fn resolution_never_invents_files(key in "\\PC{0,12}") {
        let files = ["生气.exp3.json", "哭哭.exp3.json", "wink.exp3.json"];
        if let Some(f) = resolve_expression(&key, &files) {
            prop_assert!(files.contains(&f.as_str()));
        }
    }
}
