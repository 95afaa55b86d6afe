//! Parameter writes produced by the pose engine and lip-sync follower.
//!
//! Producers emit a [`WriteBatch`] each frame; the controller pushes it through
//! the [`crate::ParameterBinder`].

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamWrite {
    pub id: &'static str,
    pub value: f32,
    pub weight: f32,
}

impl ParamWrite {
    pub fn new(id: &'static str, value: f32, weight: f32) -> Self {
        Self { id, value, weight }
    }
}

/// A batch of parameter writes for one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriteBatch(pub Vec<ParamWrite>);

impl WriteBatch {
    pub fn new() -> Self {
        WriteBatch(Vec::new())
    }

    pub fn push(&mut self, id: &'static str, value: f32, weight: f32) {
        self.0.push(ParamWrite::new(id, value, weight));
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParamWrite> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Last value written for `id` in this batch.
    pub fn value_of(&self, id: &str) -> Option<f32> {
        self.0.iter().rev().find(|w| w.id == id).map(|w| w.value)
    }
}
