//! Base and transient state expressions.
//!
//! The base expression stays on for the whole model load. A state expression
//! is layered on top for a limited time when the model supports additive
//! expressions, otherwise it replaces the base and the base is restored once
//! it expires.

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::catalog::ExpressionCatalog;
use crate::error::NativeError;
use crate::native::{NativeModel, NativeResult};

pub const STATE_HOLD_BASE_S: f64 = 2.8;
pub const STATE_HOLD_PER_INTENSITY_S: f64 = 4.7;
pub const STATE_HOLD_MIN_S: f64 = 1.2;
pub const STATE_HOLD_MAX_S: f64 = 10.0;

/// Seconds a state expression stays on.
pub fn state_hold(intensity: f32, hold: Option<f64>) -> f64 {
    let intensity = if intensity.is_nan() { 0.0 } else { intensity.clamp(0.0, 1.0) };
    let ttl = hold
        .filter(|h| !h.is_nan())
        .unwrap_or(STATE_HOLD_BASE_S + STATE_HOLD_PER_INTENSITY_S * f64::from(intensity));
    ttl.clamp(STATE_HOLD_MIN_S, STATE_HOLD_MAX_S)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExpressionMode {
    /// Not probed yet for this model.
    #[default]
    Unknown,
    Additive,
    Override,
    /// Neither additive nor set works.
    Unavailable,
}

#[derive(Clone, Debug, PartialEq)]
struct Applied {
    file: String,
    id: String,
}

#[derive(Clone, Debug, PartialEq)]
struct StateExpression {
    applied: Applied,
    until: f64,
}

#[derive(Clone, Debug, Default)]
pub struct ExpressionLayer {
    mode: ExpressionMode,
    base: Option<Applied>,
    state: Option<StateExpression>,
}

impl ExpressionLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn mode(&self) -> ExpressionMode {
        self.mode
    }

    pub fn base_file(&self) -> Option<&str> {
        self.base.as_ref().map(|a| a.file.as_str())
    }

    /// The visible expression file: the state expression if any, else the base.
    pub fn active_file(&self) -> Option<&str> {
        self.state
            .as_ref()
            .map(|s| s.applied.file.as_str())
            .or_else(|| self.base_file())
    }

    pub fn state_until(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.until)
    }

    fn show(&mut self, model: &mut dyn NativeModel, id: &str) -> NativeResult<()> {
        if matches!(self.mode, ExpressionMode::Unknown | ExpressionMode::Additive) {
            match model.add_expression(id) {
                Ok(()) => {
                    self.mode = ExpressionMode::Additive;
                    return Ok(());
                }
                Err(e) if e.is_unsupported() => self.mode = ExpressionMode::Override,
                Err(e) => return Err(e),
            }
        }
        match model.set_expression(id) {
            Err(e) if e.is_unsupported() => {
                self.mode = ExpressionMode::Unavailable;
                Err(e)
            }
            other => other,
        }
    }

    fn hide(&mut self, model: &mut dyn NativeModel, id: &str) {
        if self.mode == ExpressionMode::Additive {
            if let Err(err) = model.remove_expression(id) {
                debug!(%id, error = %err, "remove_expression failed");
            }
        }
    }

    /// Try each candidate id for `file` until one shows.
    fn show_file(&mut self, model: &mut dyn NativeModel, catalog: &mut ExpressionCatalog, file: &str) -> Option<Applied> {
        if self.mode == ExpressionMode::Unavailable {
            return None;
        }
        for id in catalog.candidate_ids(file) {
            match self.show(model, &id) {
                Ok(()) => {
                    return Some(Applied {
                        file: file.to_string(),
                        id,
                    })
                }
                Err(NativeError::Unsupported { .. }) => return None,
                Err(err) => debug!(%file, %id, error = %err, "expression id rejected"),
            }
        }
        None
    }

    /// Replace the base expression. Returns whether it took effect.
    pub fn set_base(&mut self, model: &mut dyn NativeModel, catalog: &mut ExpressionCatalog, file: &str) -> bool {
        if self.base_file() == Some(file) {
            return true;
        }
        if let Some(old) = self.base.take() {
            self.hide(model, &old.id);
        }
        match self.show_file(model, catalog, file) {
            Some(applied) => {
                debug!(file = %applied.file, id = %applied.id, "base expression");
                self.base = Some(applied);
                true
            }
            None => false,
        }
    }

    /// Drop the state expression immediately.
    pub fn cancel_state(&mut self, model: &mut dyn NativeModel) {
        if let Some(state) = self.state.as_mut() {
            state.until = f64::NEG_INFINITY;
        }
        self.tick(model, f64::NEG_INFINITY);
    }

    /// Switch the base to a random other expression, cancelling any state
    /// expression first.
    pub fn rotate_base<R: Rng + ?Sized>(&mut self, model: &mut dyn NativeModel, catalog: &mut ExpressionCatalog, rng: &mut R) -> bool {
        self.cancel_state(model);
        let current = self.base_file().map(str::to_string);
        let choices: Vec<String> = catalog
            .files()
            .iter()
            .filter(|f| Some(f.as_str()) != current.as_deref())
            .cloned()
            .collect();
        match choices.choose(rng) {
            Some(file) => self.set_base(model, catalog, file),
            None => false,
        }
    }

    /// Show `file` as a transient state expression until `now + ttl`.
    /// Re-requesting the active state only extends it.
    pub fn show_state(
        &mut self,
        model: &mut dyn NativeModel,
        catalog: &mut ExpressionCatalog,
        file: &str,
        now: f64,
        ttl: f64,
    ) -> bool {
        if let Some(state) = self.state.as_mut() {
            if state.applied.file == file {
                state.until = state.until.max(now + ttl);
                return true;
            }
        }
        if self.base_file() == Some(file) {
            return false;
        }
        if let Some(old) = self.state.take() {
            self.hide(model, &old.applied.id);
        }
        let Some(applied) = self.show_file(model, catalog, file) else {
            return false;
        };
        if self.base.as_ref().is_some_and(|b| b.id == applied.id) {
            return false;
        }
        debug!(file = %applied.file, id = %applied.id, ttl, "state expression");
        self.state = Some(StateExpression {
            applied,
            until: now + ttl,
        });
        true
    }

    /// Expire the state expression when due. Returns whether one expired.
    pub fn tick(&mut self, model: &mut dyn NativeModel, now: f64) -> bool {
        let due = self.state.as_ref().is_some_and(|s| now >= s.until);
        if !due {
            return false;
        }
        if let Some(old) = self.state.take() {
            match self.mode {
                ExpressionMode::Additive => self.hide(model, &old.applied.id),
                _ => {
                    let restored = match &self.base {
                        Some(base) => model.set_expression(&base.id),
                        None => model.reset_expression(),
                    };
                    if let Err(err) = restored {
                        debug!(error = %err, "restoring base expression failed");
                    }
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::fs;

    #[derive(Default)]
    struct Recorder {
        additive: bool,
        calls: Vec<String>,
    }

    impl NativeModel for Recorder {
        fn update(&mut self, _dt: f32) -> NativeResult<()> {
            Ok(())
        }
        fn draw(&mut self) -> NativeResult<()> {
            Ok(())
        }
        fn add_expression(&mut self, id: &str) -> NativeResult<()> {
            if !self.additive {
                return Err(NativeError::unsupported("add_expression"));
            }
            self.calls.push(format!("add {id}"));
            Ok(())
        }
        fn remove_expression(&mut self, id: &str) -> NativeResult<()> {
            self.calls.push(format!("remove {id}"));
            Ok(())
        }
        fn set_expression(&mut self, id: &str) -> NativeResult<()> {
            self.calls.push(format!("set {id}"));
            Ok(())
        }
    }

    fn catalog(dir: &std::path::Path) -> ExpressionCatalog {
        let desc = dir.join("m.model3.json");
        fs::write(&desc, r#"{"FileReferences":{"Moc":"m.moc3"}}"#).unwrap();
        for f in ["base.exp3.json", "sad.exp3.json", "joy.exp3.json"] {
            fs::write(dir.join(f), "{}").unwrap();
        }
        ExpressionCatalog::new(desc)
    }

    #[test]
    fn hold_formula_is_clamped() {
        assert!((state_hold(0.0, None) - 2.8).abs() < 1e-9);
        assert!((state_hold(1.0, None) - 7.5).abs() < 1e-9);
        assert_eq!(state_hold(0.5, Some(0.1)), STATE_HOLD_MIN_S);
        assert_eq!(state_hold(0.5, Some(60.0)), STATE_HOLD_MAX_S);
    }

    #[test]
    fn additive_state_layers_and_expires() {
        let dir = tempfile::tempdir().unwrap();
        let mut cat = catalog(dir.path());
        let mut model = Recorder {
            additive: true,
            ..Default::default()
        };
        let mut layer = ExpressionLayer::new();
        assert!(layer.set_base(&mut model, &mut cat, "base.exp3.json"));
        assert_eq!(layer.mode(), ExpressionMode::Additive);
        assert!(layer.show_state(&mut model, &mut cat, "sad.exp3.json", 0.0, 2.0));
        assert_eq!(layer.active_file(), Some("sad.exp3.json"));

        // re-request extends
        assert!(layer.show_state(&mut model, &mut cat, "sad.exp3.json", 1.5, 2.0));
        assert_eq!(layer.state_until(), Some(3.5));
        assert!(!layer.tick(&mut model, 3.0));
        assert!(layer.tick(&mut model, 3.5));
        assert_eq!(layer.active_file(), Some("base.exp3.json"));
        // ids: sorted listing gives base=expr_01, joy=expr_02, sad=expr_03
        assert_eq!(model.calls, ["add expr_01", "add expr_03", "remove expr_03"]);
    }

    #[test]
    fn override_mode_restores_base() {
        let dir = tempfile::tempdir().unwrap();
        let mut cat = catalog(dir.path());
        let mut model = Recorder::default();
        let mut layer = ExpressionLayer::new();
        assert!(layer.set_base(&mut model, &mut cat, "base.exp3.json"));
        assert_eq!(layer.mode(), ExpressionMode::Override);
        assert!(layer.show_state(&mut model, &mut cat, "joy.exp3.json", 0.0, 1.2));
        assert!(layer.tick(&mut model, 2.0));
        assert_eq!(model.calls, ["set expr_01", "set expr_02", "set expr_01"]);
    }

    #[test]
    fn state_never_replaces_identical_base() {
        let dir = tempfile::tempdir().unwrap();
        let mut cat = catalog(dir.path());
        let mut model = Recorder::default();
        let mut layer = ExpressionLayer::new();
        layer.set_base(&mut model, &mut cat, "base.exp3.json");
        assert!(!layer.show_state(&mut model, &mut cat, "base.exp3.json", 0.0, 3.0));
        assert_eq!(layer.state_until(), None);
        assert!(!layer.show_state(&mut model, &mut cat, "missing.exp3.json", 0.0, 3.0));
    }

    #[test]
    fn rotation_picks_a_different_base() {
        let dir = tempfile::tempdir().unwrap();
        let mut cat = catalog(dir.path());
        let mut model = Recorder::default();
        let mut layer = ExpressionLayer::new();
        let mut rng = StdRng::seed_from_u64(9);
        layer.set_base(&mut model, &mut cat, "base.exp3.json");
        for _ in 0..5 {
            let before = layer.base_file().map(str::to_string);
            assert!(layer.rotate_base(&mut model, &mut cat, &mut rng));
            assert_ne!(layer.base_file().map(str::to_string), before);
        }
    }
}
