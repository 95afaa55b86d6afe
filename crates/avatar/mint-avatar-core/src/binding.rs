//! Parameter binding layer.
//!
//! Native runtimes expose one of several parameter-setter shapes (by id or by
//! index, with or without a blend weight). The binder probes them once per model
//! load in a fixed priority order, locks onto the first that exists, and keeps a
//! per-id support cache so an unknown id reaches the native setter at most once.

use hashbrown::HashMap;
use tracing::debug;

use crate::error::NativeError;
use crate::native::{NativeModel, NativeResult};
use crate::params;
use crate::writes::WriteBatch;

/// Id used to probe setter shapes. Every rig ships a mouth parameter.
pub const PROBE_PARAMETER: &str = params::MOUTH_OPEN_Y;

/// One native parameter-setter shape.
pub trait ParameterSetter {
    fn name(&self) -> &'static str;

    fn supports_weight(&self) -> bool;

    fn set(
        &mut self,
        model: &mut dyn NativeModel,
        id: &str,
        value: f32,
        weight: f32,
    ) -> NativeResult<()>;

    /// Check whether the model implements this shape at all. Weighted shapes
    /// probe with weight 0 so the probe does not move the rig.
    fn probe(&mut self, model: &mut dyn NativeModel) -> bool {
        match self.set(model, PROBE_PARAMETER, 0.0, 0.0) {
            Ok(()) => true,
            Err(e) => !e.is_unsupported(),
        }
    }
}

#[derive(Debug, Default)]
pub struct IdSetter;

impl ParameterSetter for IdSetter {
    fn name(&self) -> &'static str {
        "id"
    }

    fn supports_weight(&self) -> bool {
        false
    }

    fn set(
        &mut self,
        model: &mut dyn NativeModel,
        id: &str,
        value: f32,
        _weight: f32,
    ) -> NativeResult<()> {
        model.set_parameter(id, value)
    }
}

#[derive(Debug, Default)]
pub struct IdWeightedSetter;

impl ParameterSetter for IdWeightedSetter {
    fn name(&self) -> &'static str {
        "id+weight"
    }

    fn supports_weight(&self) -> bool {
        true
    }

    fn set(
        &mut self,
        model: &mut dyn NativeModel,
        id: &str,
        value: f32,
        weight: f32,
    ) -> NativeResult<()> {
        model.set_parameter_weighted(id, value, weight)
    }
}

/// Index-addressed setter; resolves each id once and caches the index.
#[derive(Debug, Default)]
pub struct IndexSetter {
    weighted: bool,
    indices: HashMap<String, usize>,
}

impl IndexSetter {
    pub fn new(weighted: bool) -> Self {
        Self {
            weighted,
            indices: HashMap::new(),
        }
    }

    fn index_of(&mut self, model: &dyn NativeModel, id: &str) -> NativeResult<usize> {
        if let Some(&idx) = self.indices.get(id) {
            return Ok(idx);
        }
        let idx = model.parameter_index(id)?;
        self.indices.insert(id.to_string(), idx);
        Ok(idx)
    }
}

impl ParameterSetter for IndexSetter {
    fn name(&self) -> &'static str {
        if self.weighted {
            "index+weight"
        } else {
            "index"
        }
    }

    fn supports_weight(&self) -> bool {
        self.weighted
    }

    fn set(
        &mut self,
        model: &mut dyn NativeModel,
        id: &str,
        value: f32,
        weight: f32,
    ) -> NativeResult<()> {
        let idx = self.index_of(model, id)?;
        if self.weighted {
            model.set_parameter_by_index_weighted(idx, value, weight)
        } else {
            model.set_parameter_by_index(idx, value)
        }
    }

    fn probe(&mut self, model: &mut dyn NativeModel) -> bool {
        match self.index_of(model, PROBE_PARAMETER) {
            Err(e) => !e.is_unsupported(),
            Ok(idx) => {
                let res = if self.weighted {
                    model.set_parameter_by_index_weighted(idx, 0.0, 0.0)
                } else {
                    model.set_parameter_by_index(idx, 0.0)
                };
                !matches!(res, Err(ref e) if e.is_unsupported())
            }
        }
    }
}

/// Setter shapes in probe order.
pub fn default_setters() -> Vec<Box<dyn ParameterSetter>> {
    vec![
        Box::new(IdSetter),
        Box::new(IdWeightedSetter),
        Box::new(IndexSetter::new(false)),
        Box::new(IndexSetter::new(true)),
    ]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamSupport {
    Untested,
    Supported,
    Unsupported,
}

enum BindState {
    Untested,
    Bound(Box<dyn ParameterSetter>),
    Unbound,
}

/// Per-model-load binder. Create a fresh one for every model load.
pub struct ParameterBinder {
    state: BindState,
    support: HashMap<String, ParamSupport>,
}

impl Default for ParameterBinder {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterBinder {
    pub fn new() -> Self {
        Self {
            state: BindState::Untested,
            support: HashMap::new(),
        }
    }

    /// Probe setter shapes if that has not happened yet. Returns whether a
    /// shape is bound.
    pub fn bind(&mut self, model: &mut dyn NativeModel) -> bool {
        if matches!(self.state, BindState::Untested) {
            self.state = BindState::Unbound;
            for mut setter in default_setters() {
                if setter.probe(model) {
                    debug!(shape = setter.name(), "bound parameter setter");
                    self.state = BindState::Bound(setter);
                    break;
                }
            }
            if matches!(self.state, BindState::Unbound) {
                debug!("model exposes no parameter setter; procedural writes disabled");
            }
        }
        matches!(self.state, BindState::Bound(_))
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.state, BindState::Bound(_))
    }

    /// True once probing found no usable shape.
    pub fn is_unbound(&self) -> bool {
        matches!(self.state, BindState::Unbound)
    }

    pub fn shape_name(&self) -> Option<&'static str> {
        match &self.state {
            BindState::Bound(s) => Some(s.name()),
            _ => None,
        }
    }

    pub fn supports_weight(&self) -> bool {
        match &self.state {
            BindState::Bound(s) => s.supports_weight(),
            _ => false,
        }
    }

    pub fn support(&self, id: &str) -> ParamSupport {
        self.support
            .get(id)
            .copied()
            .unwrap_or(ParamSupport::Untested)
    }

    /// Write one parameter. Returns `false` without touching the model when the
    /// binder is unbound or `id` already failed once.
    pub fn try_set(&mut self, model: &mut dyn NativeModel, id: &str, value: f32, weight: f32) -> bool {
        if self.support(id) == ParamSupport::Unsupported {
            return false;
        }
        if !self.bind(model) {
            return false;
        }
        let BindState::Bound(setter) = &mut self.state else {
            return false;
        };
        match setter.set(model, id, value, weight) {
            Ok(()) => {
                if self.support(id) != ParamSupport::Supported {
                    self.support.insert(id.to_string(), ParamSupport::Supported);
                }
                true
            }
            Err(err) => {
                log_failure(id, &err);
                self.support.insert(id.to_string(), ParamSupport::Unsupported);
                false
            }
        }
    }

    /// Apply every write in order; returns how many landed.
    pub fn apply(&mut self, model: &mut dyn NativeModel, batch: &WriteBatch) -> usize {
        batch
            .iter()
            .filter(|w| self.try_set(model, w.id, w.value, w.weight))
            .count()
    }
}

fn log_failure(id: &str, err: &NativeError) {
    debug!(parameter = id, error = %err, "parameter write failed; id disabled for this model");
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Id-only model that knows a fixed set of parameters.
    #[derive(Default)]
    struct IdOnly {
        known: Vec<&'static str>,
        calls: HashMap<String, usize>,
    }

    impl NativeModel for IdOnly {
        fn update(&mut self, _dt: f32) -> NativeResult<()> {
            Ok(())
        }
        fn draw(&mut self) -> NativeResult<()> {
            Ok(())
        }
        fn set_parameter(&mut self, id: &str, _value: f32) -> NativeResult<()> {
            *self.calls.entry(id.to_string()).or_default() += 1;
            if self.known.contains(&id) {
                Ok(())
            } else {
                Err(NativeError::UnknownParameter(id.to_string()))
            }
        }
    }

    /// Weighted-index model.
    #[derive(Default)]
    struct IndexWeighted {
        writes: Vec<(usize, f32, f32)>,
    }

    impl NativeModel for IndexWeighted {
        fn update(&mut self, _dt: f32) -> NativeResult<()> {
            Ok(())
        }
        fn draw(&mut self) -> NativeResult<()> {
            Ok(())
        }
        fn parameter_index(&self, id: &str) -> NativeResult<usize> {
            params::ALL
                .iter()
                .position(|p| *p == id)
                .ok_or_else(|| NativeError::UnknownParameter(id.to_string()))
        }
        fn set_parameter_by_index_weighted(
            &mut self,
            index: usize,
            value: f32,
            weight: f32,
        ) -> NativeResult<()> {
            self.writes.push((index, value, weight));
            Ok(())
        }
    }

    struct Nothing;

    impl NativeModel for Nothing {
        fn update(&mut self, _dt: f32) -> NativeResult<()> {
            Ok(())
        }
        fn draw(&mut self) -> NativeResult<()> {
            Ok(())
        }
    }

    #[test]
    fn binds_first_available_shape() {
        let mut model = IdOnly {
            known: vec![params::ANGLE_X],
            ..Default::default()
        };
        let mut binder = ParameterBinder::new();
        assert!(binder.bind(&mut model));
        assert_eq!(binder.shape_name(), Some("id"));
        assert!(!binder.supports_weight());
    }

    #[test]
    fn unknown_probe_id_still_counts_as_shape() {
        // The probe id is unknown to this model but the setter exists.
        let mut model = IdOnly::default();
        let mut binder = ParameterBinder::new();
        assert!(binder.bind(&mut model));
    }

    #[test]
    fn unsupported_id_is_never_retried() {
        let mut model = IdOnly {
            known: vec![params::ANGLE_X],
            ..Default::default()
        };
        let mut binder = ParameterBinder::new();
        assert!(!binder.try_set(&mut model, "ParamMissing", 1.0, 1.0));
        assert_eq!(binder.support("ParamMissing"), ParamSupport::Unsupported);
        for _ in 0..10 {
            assert!(!binder.try_set(&mut model, "ParamMissing", 1.0, 1.0));
        }
        assert_eq!(model.calls.get("ParamMissing"), Some(&1));

        assert!(binder.try_set(&mut model, params::ANGLE_X, 2.0, 1.0));
        assert_eq!(binder.support(params::ANGLE_X), ParamSupport::Supported);
    }

    #[test]
    fn falls_through_to_weighted_index_and_caches_lookup() {
        let mut model = IndexWeighted::default();
        let mut binder = ParameterBinder::new();
        assert!(binder.try_set(&mut model, params::BREATH, 0.4, 0.72));
        assert!(binder.try_set(&mut model, params::BREATH, 0.6, 0.72));
        assert_eq!(binder.shape_name(), Some("index+weight"));
        assert!(binder.supports_weight());
        let breath_idx = params::ALL.iter().position(|p| *p == params::BREATH).unwrap();
        assert_eq!(model.writes.last(), Some(&(breath_idx, 0.6, 0.72)));
        // probe write uses weight 0
        assert_eq!(model.writes[0].2, 0.0);
    }

    #[test]
    fn model_without_setters_is_unbound() {
        let mut binder = ParameterBinder::new();
        assert!(!binder.try_set(&mut Nothing, params::ANGLE_X, 1.0, 1.0));
        assert!(binder.is_unbound());
        assert!(!binder.supports_weight());
    }

    #[test]
    fn apply_counts_landed_writes() {
        let mut model = IdOnly {
            known: vec![params::ANGLE_X, params::ANGLE_Y],
            ..Default::default()
        };
        let mut batch = WriteBatch::new();
        batch.push(params::ANGLE_X, 1.0, 1.0);
        batch.push(params::ANGLE_Y, 1.0, 1.0);
        batch.push(params::ANGLE_Z, 1.0, 1.0);
        let mut binder = ParameterBinder::new();
        assert_eq!(binder.apply(&mut model, &batch), 2);
    }
}
