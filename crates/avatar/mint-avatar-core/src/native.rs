//! Seam to the native model runtime.
//!
//! Hosts implement [`ModelRuntime`] and [`NativeModel`] over whatever binding
//! they have to the rig renderer. Only `update` and `draw` are mandatory; every
//! other capability defaults to [`NativeError::Unsupported`] and the controller
//! degrades around it. All calls happen on the thread that owns the graphics
//! context.

use std::path::Path;

use crate::color::Rgba;
use crate::error::NativeError;

pub type NativeResult<T> = Result<T, NativeError>;

/// Process-level runtime: context setup, model creation, buffer clear.
pub trait ModelRuntime {
    /// One-time setup once a graphics context is current.
    fn initialize(&mut self) -> NativeResult<()>;

    /// Create a model from a `*.model3.json` descriptor path.
    fn load_model(&mut self, descriptor: &Path) -> NativeResult<Box<dyn NativeModel>>;

    fn clear(&mut self, _color: Rgba) -> NativeResult<()> {
        Ok(())
    }

    /// Tear down runtime state; called when the host surface goes away.
    fn release(&mut self) {}
}

/// A loaded, drawable model.
pub trait NativeModel {
    fn update(&mut self, dt: f32) -> NativeResult<()>;

    fn draw(&mut self) -> NativeResult<()>;

    fn resize(&mut self, _width: u32, _height: u32) -> NativeResult<()> {
        Err(NativeError::unsupported("resize"))
    }

    fn set_scale(&mut self, _scale: f32) -> NativeResult<()> {
        Err(NativeError::unsupported("set_scale"))
    }

    fn set_offset(&mut self, _x: f32, _y: f32) -> NativeResult<()> {
        Err(NativeError::unsupported("set_offset"))
    }

    /// Feed a look-at point in surface pixels.
    fn drag(&mut self, _x: f32, _y: f32) -> NativeResult<()> {
        Err(NativeError::unsupported("drag"))
    }

    fn motion_groups(&self) -> Vec<String> {
        Vec::new()
    }

    fn start_random_motion(&mut self, _group: &str, _priority: i32) -> NativeResult<()> {
        Err(NativeError::unsupported("start_random_motion"))
    }

    fn expression_ids(&self) -> Vec<String> {
        Vec::new()
    }

    /// Layer an expression on top of the current ones.
    fn add_expression(&mut self, _id: &str) -> NativeResult<()> {
        Err(NativeError::unsupported("add_expression"))
    }

    fn remove_expression(&mut self, _id: &str) -> NativeResult<()> {
        Err(NativeError::unsupported("remove_expression"))
    }

    /// Replace every active expression with `id`.
    fn set_expression(&mut self, _id: &str) -> NativeResult<()> {
        Err(NativeError::unsupported("set_expression"))
    }

    fn reset_expression(&mut self) -> NativeResult<()> {
        Err(NativeError::unsupported("reset_expression"))
    }

    fn hit_test(&self, _area: &str, _x: f32, _y: f32) -> NativeResult<bool> {
        Err(NativeError::unsupported("hit_test"))
    }

    /// Names of the drawable parts under the point, topmost first.
    fn hit_parts(&self, _x: f32, _y: f32) -> NativeResult<Vec<String>> {
        Err(NativeError::unsupported("hit_parts"))
    }

    fn set_parameter(&mut self, _id: &str, _value: f32) -> NativeResult<()> {
        Err(NativeError::unsupported("set_parameter"))
    }

    fn set_parameter_weighted(&mut self, _id: &str, _value: f32, _weight: f32) -> NativeResult<()> {
        Err(NativeError::unsupported("set_parameter_weighted"))
    }

    fn parameter_index(&self, _id: &str) -> NativeResult<usize> {
        Err(NativeError::unsupported("parameter_index"))
    }

    fn set_parameter_by_index(&mut self, _index: usize, _value: f32) -> NativeResult<()> {
        Err(NativeError::unsupported("set_parameter_by_index"))
    }

    fn set_parameter_by_index_weighted(
        &mut self,
        _index: usize,
        _value: f32,
        _weight: f32,
    ) -> NativeResult<()> {
        Err(NativeError::unsupported("set_parameter_by_index_weighted"))
    }
}
