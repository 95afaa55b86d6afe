//! The avatar controller: owns the native model and every per-model state
//! machine, and runs one frame per due `tick`.
//!
//! All methods must be called from the thread that owns the graphics context.
//! Other threads talk to the controller only through [`StateEventSender`] and
//! read it through [`StatusWatch`].

use std::path::{Path, PathBuf};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace, warn};

use crate::binding::{ParamSupport, ParameterBinder};
use crate::catalog::{event_key_for_hit_parts, find_model_descriptor, pick_idle_motion_group, resolve_gesture_kind, ExpressionCatalog};
use crate::color::Rgba;
use crate::config::AvatarConfig;
use crate::descriptor::ModelDescriptor;
use crate::error::{AvatarError, AvatarResult};
use crate::events::{StateEvent, StateEventQueue, StateEventSender};
use crate::expression::{state_hold, ExpressionLayer};
use crate::input::{PointerAction, PointerEvent, PointerState, WHEEL_BOOST_S};
use crate::lipsync::LipSync;
use crate::native::{ModelRuntime, NativeModel, NativeResult};
use crate::params;
use crate::pose::{PoseEngine, PoseInputs};
use crate::sanitizer::AssetSanitizer;
use crate::scheduler::{FrameScheduler, FrameStats, TickOutcome};
use crate::status::{AvatarStatus, StatusWatch};
use crate::view::{ViewMode, ViewState};

pub const MOTION_PRIORITY_IDLE: i32 = 1;
pub const MOTION_PRIORITY_REACTION: i32 = 3;

/// Seconds between automatic idle motions.
pub const IDLE_MOTION_GAP_S: (f64, f64) = (14.0, 22.0);
const IDLE_MOTION_BOOST_S: f64 = 1.1;

const LIPSYNC_BOOST_LEVEL: f32 = 0.02;
const LIPSYNC_BOOST_S: f64 = 1.3;
const LIPSYNC_BOOST_PERIOD_S: f64 = 0.35;

pub const PART_EVENT_INTENSITY: f32 = 0.82;
pub const PART_EVENT_HOLD_S: f64 = 3.8;
pub const PART_EVENT_SOURCE: &str = "manual_part";

const HEAD_AREAS: [&str; 6] = ["Head", "HitAreaHead", "Face", "HitArea_Face", "head", "face"];
const BODY_AREAS: [&str; 7] = ["Body", "HitAreaBody", "Bust", "HitArea_Body", "HitAreaBust", "body", "bust"];

/// What a finished load left behind.
struct LoadedModel {
    source: PathBuf,
    native_descriptor: PathBuf,
    catalog: ExpressionCatalog,
    motion_groups: Vec<String>,
    idle_group: String,
    /// Load time; set by the first frame so procedural timing starts there.
    t0: Option<f64>,
}

pub struct AvatarController {
    config: AvatarConfig,
    runtime: Option<Box<dyn ModelRuntime>>,
    initialized: bool,
    pending_load: Option<PathBuf>,
    model: Option<Box<dyn NativeModel>>,
    loaded: Option<LoadedModel>,
    binder: ParameterBinder,
    pose: PoseEngine,
    lipsync: LipSync,
    expressions: ExpressionLayer,
    view: ViewState,
    pointer: PointerState,
    sanitizer: AssetSanitizer,
    events: StateEventQueue,
    scheduler: FrameScheduler,
    status: AvatarStatus,
    watch: StatusWatch,
    clear_color: Rgba,
    interaction_locked: bool,
    vtuber_enabled: bool,
    rng: StdRng,
    now: f64,
    next_idle_motion: f64,
    last_lipsync_boost: f64,
    frame_errors: u64,
}

impl AvatarController {
    pub fn new(config: AvatarConfig, runtime: Box<dyn ModelRuntime>) -> Self {
        Self::build(config, Some(runtime))
    }

    /// A controller whose native runtime could not be loaded. Every call is a
    /// no-op and the status carries `reason`.
    pub fn unavailable(config: AvatarConfig, reason: impl Into<String>) -> Self {
        let mut ctl = Self::build(config, None);
        let err = AvatarError::RuntimeUnavailable(reason.into());
        warn!(error = %err, "avatar controller running without a runtime");
        ctl.status.error_message = Some(err.to_string());
        ctl.publish_status();
        ctl
    }

    fn build(config: AvatarConfig, runtime: Option<Box<dyn ModelRuntime>>) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let pose = PoseEngine::new(0.0, &mut rng);
        let mut ctl = Self {
            runtime,
            initialized: false,
            pending_load: None,
            model: None,
            loaded: None,
            binder: ParameterBinder::new(),
            pose,
            lipsync: LipSync::new(),
            expressions: ExpressionLayer::new(),
            view: ViewState::default(),
            pointer: PointerState::new(config.pan_threshold_px),
            sanitizer: AssetSanitizer::new(config.cache_dir.clone()),
            events: StateEventQueue::new(),
            scheduler: FrameScheduler::new(config.tick.clone(), config.adaptive_fps),
            status: AvatarStatus::default(),
            watch: StatusWatch::new(),
            clear_color: Rgba::BLACK,
            interaction_locked: false,
            vtuber_enabled: config.vtuber_enabled,
            rng,
            now: 0.0,
            next_idle_motion: 0.0,
            last_lipsync_boost: f64::NEG_INFINITY,
            frame_errors: 0,
            config,
        };
        ctl.publish_status();
        ctl
    }

    pub fn config(&self) -> &AvatarConfig {
        &self.config
    }

    pub fn status(&self) -> &AvatarStatus {
        &self.status
    }

    pub fn status_watch(&self) -> StatusWatch {
        self.watch.clone()
    }

    pub fn state_event_sender(&self) -> StateEventSender {
        self.events.sender()
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view.mode
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn binder(&self) -> &ParameterBinder {
        &self.binder
    }

    pub fn pose(&self) -> &PoseEngine {
        &self.pose
    }

    pub fn lipsync(&self) -> &LipSync {
        &self.lipsync
    }

    pub fn expressions(&self) -> &ExpressionLayer {
        &self.expressions
    }

    pub fn sanitizer(&self) -> &AssetSanitizer {
        &self.sanitizer
    }

    pub fn clear_color(&self) -> Rgba {
        self.clear_color
    }

    /// Native calls that failed across all frames so far.
    pub fn frame_errors(&self) -> u64 {
        self.frame_errors
    }

    /// Descriptor the native runtime actually loaded (possibly sanitized).
    pub fn native_descriptor(&self) -> Option<&Path> {
        self.loaded.as_ref().map(|l| l.native_descriptor.as_path())
    }

    pub fn source_descriptor(&self) -> Option<&Path> {
        self.loaded.as_ref().map(|l| l.source.as_path())
    }

    pub fn motion_groups(&self) -> &[String] {
        self.loaded.as_ref().map_or(&[], |l| l.motion_groups.as_slice())
    }

    pub fn is_ready(&self) -> bool {
        self.status.ready
    }

    fn publish_status(&mut self) {
        self.status.paused = self.scheduler.pause_sources().requested;
        self.status.view_mode = self.view.mode;
        self.status.interaction_locked = self.interaction_locked;
        self.status.active_expression = self.expressions.active_file().map(str::to_string);
        self.watch.publish(&self.status);
    }

    /// Set up the runtime once a graphics context is current, then run any
    /// load requested before that.
    pub fn initialize(&mut self) -> AvatarResult<()> {
        let Some(runtime) = self.runtime.as_mut() else {
            return Err(AvatarError::RuntimeUnavailable(
                self.status.error_message.clone().unwrap_or_default(),
            ));
        };
        if !self.initialized {
            if let Err(err) = runtime.initialize() {
                let err = AvatarError::RuntimeUnavailable(err.to_string());
                self.status.error_message = Some(err.to_string());
                self.publish_status();
                return Err(err);
            }
            self.initialized = true;
            debug!("native runtime initialized");
        }
        if let Some(path) = self.pending_load.take() {
            self.load_model(&path)?;
        }
        Ok(())
    }

    /// Tear down the model and runtime state; `initialize` may be called again.
    pub fn release(&mut self) {
        self.model = None;
        self.loaded = None;
        if let Some(runtime) = self.runtime.as_mut() {
            runtime.release();
        }
        self.initialized = false;
        self.status.ready = false;
        self.scheduler.set_ready(false);
        self.publish_status();
    }

    /// Load a `*.model3.json` file or the first one in a directory. Before
    /// [`Self::initialize`] the request is remembered and run afterwards.
    pub fn load_model(&mut self, path: &Path) -> AvatarResult<PathBuf> {
        if self.runtime.is_none() {
            return Err(AvatarError::RuntimeUnavailable(
                self.status.error_message.clone().unwrap_or_default(),
            ));
        }
        let descriptor = match find_model_descriptor(path) {
            Ok(d) => d,
            Err(err) => return Err(self.fail_load(err)),
        };
        if !self.initialized {
            debug!(descriptor = %descriptor.display(), "load deferred until initialize");
            self.pending_load = Some(descriptor.clone());
            return Ok(descriptor);
        }

        let native_descriptor = self.sanitizer.sanitize(&descriptor);
        let loaded = match self.runtime.as_mut() {
            Some(runtime) => runtime.load_model(&native_descriptor),
            None => return Err(AvatarError::RuntimeUnavailable(String::new())),
        };
        let mut model = match loaded {
            Ok(m) => m,
            Err(err) => {
                let err = AvatarError::ModelLoad {
                    path: native_descriptor,
                    reason: err.to_string(),
                };
                return Err(self.fail_load(err));
            }
        };

        let mut motion_groups = model.motion_groups();
        if motion_groups.is_empty() {
            motion_groups = ModelDescriptor::load(&native_descriptor)
                .map(|d| d.motion_groups())
                .unwrap_or_default();
        }
        let idle_group = pick_idle_motion_group(&motion_groups);

        self.binder = ParameterBinder::new();
        self.lipsync.reset();
        self.expressions.reset();
        self.pointer.reset();
        self.pose = PoseEngine::new(self.now, &mut self.rng);
        self.pose.set_idle_enabled(self.vtuber_enabled);

        let (w, h) = self.view.viewport;
        ignore_unsupported(model.resize(w, h), "resize");
        self.view.invalidate();
        if !self.binder.bind(model.as_mut()) {
            self.lipsync.disable();
        }

        let mut catalog = ExpressionCatalog::new(&descriptor);
        if let Some(file) = self.config.default_expression.clone() {
            if !self.expressions.set_base(model.as_mut(), &mut catalog, &file) {
                debug!(%file, "default expression not available");
            }
        }
        ignore_unsupported(model.start_random_motion(&idle_group, MOTION_PRIORITY_IDLE), "start_random_motion");

        debug!(
            source = %descriptor.display(),
            native = %native_descriptor.display(),
            groups = motion_groups.len(),
            %idle_group,
            setter = self.binder.shape_name().unwrap_or("none"),
            "model loaded"
        );
        self.model = Some(model);
        self.loaded = Some(LoadedModel {
            source: descriptor,
            native_descriptor: native_descriptor.clone(),
            catalog,
            motion_groups,
            idle_group,
            t0: None,
        });
        self.status.ready = true;
        self.status.error_message = None;
        self.scheduler.set_ready(true);
        self.scheduler.boost_default(self.now);
        self.publish_status();
        Ok(native_descriptor)
    }

    fn fail_load(&mut self, err: AvatarError) -> AvatarError {
        warn!(error = %err, "model load failed");
        self.model = None;
        self.loaded = None;
        self.status.ready = false;
        self.status.error_message = Some(err.to_string());
        self.scheduler.set_ready(false);
        self.publish_status();
        err
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.scheduler.set_requested_pause(paused);
        self.publish_status();
    }

    /// Host surface visibility; a hidden surface pauses ticking.
    pub fn set_surface_visible(&mut self, visible: bool) {
        self.scheduler.set_hidden(!visible);
        self.publish_status();
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        if self.view.set_mode(mode) {
            self.scheduler.boost_default(self.now);
        }
        self.publish_status();
    }

    pub fn toggle_view_mode(&mut self) -> ViewMode {
        let mode = self.view.mode.toggled();
        self.set_view_mode(mode);
        mode
    }

    pub fn reset_view(&mut self) {
        self.view.reset_user();
        self.scheduler.boost_default(self.now);
    }

    pub fn set_user_pan_zoom(&mut self, scale: f32, offset_x: f32, offset_y: f32) {
        self.view.set_user(scale, offset_x, offset_y);
        self.scheduler.boost_default(self.now);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.view.set_viewport(width, height);
        if let Some(model) = self.model.as_mut() {
            ignore_unsupported(model.resize(width.max(1), height.max(1)), "resize");
        }
    }

    pub fn set_interaction_locked(&mut self, locked: bool) {
        self.interaction_locked = locked;
        self.publish_status();
    }

    /// Toggle the procedural idle layer. Forced gestures keep playing.
    pub fn set_vtuber_enabled(&mut self, enabled: bool) {
        self.vtuber_enabled = enabled;
        self.pose.set_idle_enabled(enabled);
    }

    pub fn set_clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.clear_color = Rgba::new(r, g, b, a);
    }

    pub fn set_clear_color_css(&mut self, css: &str) {
        self.clear_color = Rgba::parse_css(css);
    }

    /// Feed a lip-sync level in `[0, 1]`.
    pub fn set_lipsync_level(&mut self, level: f32) {
        self.lipsync.set_target(level);
        if self.lipsync.target() > LIPSYNC_BOOST_LEVEL && self.now - self.last_lipsync_boost >= LIPSYNC_BOOST_PERIOD_S {
            self.last_lipsync_boost = self.now;
            self.scheduler.boost(self.now, LIPSYNC_BOOST_S);
        }
    }

    /// Queue a semantic state event for the next frame.
    pub fn request_state_event(&mut self, key: &str, intensity: f32, hold: Option<f64>, source: &str) -> bool {
        if !self.config.state_events_enabled {
            return false;
        }
        self.events.sender().request(key, intensity, hold, source)
    }

    pub fn handle_pointer(&mut self, event: PointerEvent) {
        if !self.status.ready {
            return;
        }
        match self.pointer.handle(event, self.interaction_locked) {
            PointerAction::None => {}
            PointerAction::Boost => self.scheduler.boost_default(self.now),
            PointerAction::Pan { dx, dy } => {
                self.view.pan_by_pixels(dx, dy);
                self.scheduler.boost_default(self.now);
            }
            PointerAction::Zoom { delta } => {
                self.view.zoom_by_wheel(delta);
                self.scheduler.boost(self.now, WHEEL_BOOST_S);
            }
            PointerAction::Tap { x, y } => {
                self.trigger_reaction("manual", Some((x, y)));
            }
        }
    }

    /// Play a tap reaction. With a position, hit areas pick the motion group
    /// and part hits queue a matching state event; a head hit also rotates
    /// the base expression.
    pub fn trigger_reaction(&mut self, kind: &str, pos: Option<(f32, f32)>) -> bool {
        if !self.status.ready {
            return false;
        }
        let (Some(model), Some(loaded)) = (self.model.as_mut(), self.loaded.as_mut()) else {
            return false;
        };
        self.scheduler.boost_default(self.now);

        let (mut preferred, mut alt) = ("TapHead", "TapBody");
        if matches!(kind, "user_send" | "user") {
            std::mem::swap(&mut preferred, &mut alt);
        }
        let mut hit_head = false;
        let mut part_event = None;
        if let Some((x, y)) = pos {
            if hit_any(&**model, &HEAD_AREAS, x, y) {
                (preferred, alt) = ("TapHead", "TapBody");
                hit_head = true;
            } else if hit_any(&**model, &BODY_AREAS, x, y) {
                (preferred, alt) = ("TapBody", "TapHead");
            }
            if !hit_head {
                if let Ok(parts) = model.hit_parts(x, y) {
                    part_event = event_key_for_hit_parts(&parts);
                }
            }
        }

        let group = [preferred, alt]
            .into_iter()
            .find(|g| loaded.motion_groups.iter().any(|m| m == g));
        match group {
            Some(g) => ignore_unsupported(model.start_random_motion(g, MOTION_PRIORITY_REACTION), "start_random_motion"),
            None => ignore_unsupported(model.start_random_motion("Idle", MOTION_PRIORITY_IDLE), "start_random_motion"),
        }

        if let Some(key) = part_event {
            self.events.sender().send(StateEvent::new(
                key,
                PART_EVENT_INTENSITY,
                Some(PART_EVENT_HOLD_S),
                PART_EVENT_SOURCE,
            ));
        }
        if hit_head {
            self.expressions
                .rotate_base(&mut **model, &mut loaded.catalog, &mut self.rng);
        }
        debug!(kind, ?group, hit_head, ?part_event, "reaction");
        self.publish_status();
        true
    }

    /// Advance to `now` (monotonic seconds) and render a frame if one is due.
    pub fn tick(&mut self, now: f64) -> TickOutcome {
        if now.is_finite() {
            self.now = now;
        }
        if self.model.is_none() || self.scheduler.is_paused() {
            return TickOutcome::Paused;
        }
        if !self.scheduler.due(self.now) {
            return TickOutcome::NotDue;
        }
        let started = Instant::now();
        let now = self.now;
        let dt = self.scheduler.begin_frame(now);
        let Some(mut model) = self.model.take() else {
            return TickOutcome::Paused;
        };
        let (writes, errors) = self.run_frame(model.as_mut(), now, dt);
        self.model = Some(model);

        let cost_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.scheduler.end_frame(now, dt, cost_ms);
        self.frame_errors += errors as u64;
        self.publish_status();
        TickOutcome::Rendered(FrameStats {
            frame: self.scheduler.frames(),
            dt,
            interval_ms: self.scheduler.interval_ms(now),
            load_mode: self.scheduler.load_mode(),
            writes,
            errors,
            cost_ms,
        })
    }

    fn run_frame(&mut self, model: &mut dyn NativeModel, now: f64, dt: f64) -> (usize, usize) {
        let mut errors = 0usize;
        let t0 = match self.loaded.as_ref().and_then(|l| l.t0) {
            Some(t0) => t0,
            None => {
                // first frame after a load
                self.pose = PoseEngine::new(now, &mut self.rng);
                self.pose.set_idle_enabled(self.vtuber_enabled);
                self.next_idle_motion = now + self.rng.gen_range(IDLE_MOTION_GAP_S.0..IDLE_MOTION_GAP_S.1);
                if let Some(loaded) = self.loaded.as_mut() {
                    loaded.t0 = Some(now);
                }
                now
            }
        };

        for event in self.events.drain() {
            self.apply_state_event(model, &event, now);
        }
        self.expressions.tick(model, now);

        if let Some(view) = self.view.take_pending() {
            count_err(model.set_scale(view.scale), "set_scale", &mut errors);
            count_err(model.set_offset(view.offset_x, view.offset_y), "set_offset", &mut errors);
        }

        let follow = match self.pointer.follow_point(now) {
            Some(p) => Some(p),
            None if self.vtuber_enabled => {
                self.pointer
                    .idle_drag_point(now, now - t0, self.view.viewport, self.lipsync.value())
            }
            None => None,
        };
        if let Some((x, y)) = follow {
            count_err(model.drag(x, y), "drag", &mut errors);
        }

        if self.vtuber_enabled && now >= self.next_idle_motion {
            self.next_idle_motion = now + self.rng.gen_range(IDLE_MOTION_GAP_S.0..IDLE_MOTION_GAP_S.1);
            if let Some(loaded) = self.loaded.as_ref() {
                count_err(
                    model.start_random_motion(&loaded.idle_group, MOTION_PRIORITY_IDLE),
                    "start_random_motion",
                    &mut errors,
                );
            }
            self.scheduler.boost(now, IDLE_MOTION_BOOST_S);
        }

        count_err(model.update(dt as f32), "update", &mut errors);

        let inputs = PoseInputs {
            now,
            dt: dt as f32,
            lipsync: self.lipsync.value(),
            hovering: self.pointer.is_hovering(),
            interaction_locked: self.interaction_locked,
            portrait: self.view.mode == ViewMode::Portrait,
            weighted: self.binder.supports_weight(),
        };
        let mut batch = self.pose.step(&inputs, &mut self.rng);
        self.lipsync.step(dt as f32, &mut batch);
        let writes = self.binder.apply(model, &batch);
        self.degrade_capabilities();

        if let Some(runtime) = self.runtime.as_mut() {
            count_err(runtime.clear(self.clear_color), "clear", &mut errors);
        }
        count_err(model.draw(), "draw", &mut errors);
        (writes, errors)
    }

    /// Turn off writers whose parameters the model turned out not to have.
    fn degrade_capabilities(&mut self) {
        if !self.lipsync.is_disabled()
            && (self.binder.is_unbound() || self.binder.support(params::MOUTH_OPEN_Y) == ParamSupport::Unsupported)
        {
            debug!("mouth parameter unavailable; lip-sync writes disabled");
            self.lipsync.disable();
        }
        if self.pose.blink_enabled()
            && self.binder.support(params::EYE_L_OPEN) == ParamSupport::Unsupported
            && self.binder.support(params::EYE_R_OPEN) == ParamSupport::Unsupported
        {
            debug!("eye-open parameters unavailable; blinking disabled");
            self.pose.disable_blink();
        }
    }

    fn apply_state_event(&mut self, model: &mut dyn NativeModel, event: &StateEvent, now: f64) {
        if !self.config.state_events_enabled {
            return;
        }
        let mut applied = false;
        if let Some(kind) = resolve_gesture_kind(&event.key) {
            self.pose
                .force_gesture(kind, now, event.intensity, event.hold, &mut self.rng);
            applied = true;
        }
        if let Some(loaded) = self.loaded.as_mut() {
            if let Some(file) = loaded.catalog.resolve(&event.key) {
                let ttl = state_hold(event.intensity, event.hold);
                applied |= self
                    .expressions
                    .show_state(model, &mut loaded.catalog, &file, now, ttl);
            }
        }
        if applied {
            self.scheduler.boost_default(now);
        }
        debug!(key = %event.key, source = %event.source, applied, "state event");
    }
}

fn hit_any(model: &dyn NativeModel, areas: &[&str], x: f32, y: f32) -> bool {
    areas
        .iter()
        .any(|area| matches!(model.hit_test(area, x, y), Ok(true)))
}

fn ignore_unsupported(result: NativeResult<()>, op: &'static str) {
    if let Err(err) = result {
        if !err.is_unsupported() {
            debug!(op, error = %err, "native call failed");
        }
    }
}

fn count_err(result: NativeResult<()>, op: &'static str, errors: &mut usize) {
    if let Err(err) = result {
        if !err.is_unsupported() {
            *errors += 1;
            trace!(op, error = %err, "native call failed during frame");
        }
    }
}
