//! Pending state events.
//!
//! Producers on any thread push through a [`StateEventSender`]; the frame tick
//! drains everything queued so far, in enqueue order.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// One semantic request: an expression or gesture key plus how strongly and
/// how long to show it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateEvent {
    pub key: String,
    pub intensity: f32,
    /// Seconds; `None` means the consumer picks a default.
    pub hold: Option<f64>,
    pub source: String,
}

impl StateEvent {
    /// Intensity is clamped to `[0, 1]`; negative or non-finite holds become `None`.
    pub fn new(key: impl Into<String>, intensity: f32, hold: Option<f64>, source: impl Into<String>) -> Self {
        let intensity = if intensity.is_finite() {
            intensity.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            key: key.into(),
            intensity,
            hold: hold.filter(|h| h.is_finite() && *h >= 0.0),
            source: source.into(),
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    queue: Mutex<VecDeque<StateEvent>>,
}

/// Clonable producer handle.
#[derive(Clone, Debug, Default)]
pub struct StateEventSender {
    shared: Arc<Shared>,
}

impl StateEventSender {
    /// Enqueue; blank keys are dropped. Returns whether the event was queued.
    pub fn send(&self, event: StateEvent) -> bool {
        if event.key.trim().is_empty() {
            return false;
        }
        self.shared.queue.lock().push_back(event);
        true
    }

    pub fn request(&self, key: &str, intensity: f32, hold: Option<f64>, source: &str) -> bool {
        self.send(StateEvent::new(key, intensity, hold, source))
    }
}

/// Consumer side, owned by the controller.
#[derive(Debug, Default)]
pub struct StateEventQueue {
    sender: StateEventSender,
}

impl StateEventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sender(&self) -> StateEventSender {
        self.sender.clone()
    }

    pub fn len(&self) -> usize {
        self.sender.shared.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every pending event, oldest first.
    pub fn drain(&self) -> Vec<StateEvent> {
        let mut q = self.sender.shared.queue.lock();
        q.drain(..).collect()
    }

    pub fn clear(&self) {
        self.sender.shared.queue.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_order_and_empties() {
        let q = StateEventQueue::new();
        let tx = q.sender();
        tx.request("angry", 0.5, None, "test");
        tx.request("nod", 0.2, Some(1.0), "test");
        assert_eq!(q.len(), 2);
        let keys: Vec<_> = q.drain().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, ["angry", "nod"]);
        assert!(q.is_empty());
    }

    #[test]
    fn normalizes_fields() {
        let e = StateEvent::new("x", 3.0, Some(-1.0), "s");
        assert_eq!(e.intensity, 1.0);
        assert_eq!(e.hold, None);
        let e = StateEvent::new("x", f32::NAN, Some(f64::INFINITY), "s");
        assert_eq!(e.intensity, 0.0);
        assert_eq!(e.hold, None);
        let q = StateEventQueue::new();
        assert!(!q.sender().request("  ", 1.0, None, "s"));
        assert!(q.is_empty());
    }
}
