//! Read-only status channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::view::ViewMode;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AvatarStatus {
    pub ready: bool,
    pub paused: bool,
    pub error_message: Option<String>,
    pub view_mode: ViewMode,
    pub interaction_locked: bool,
    /// Visible expression file, if any.
    pub active_expression: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    status: RwLock<AvatarStatus>,
    version: AtomicU64,
}

/// Shared, clonable view of the latest [`AvatarStatus`].
///
/// Readers poll [`StatusWatch::version`] to notice changes without locking.
#[derive(Clone, Debug, Default)]
pub struct StatusWatch {
    inner: Arc<Inner>,
}

impl StatusWatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> AvatarStatus {
        self.inner.status.read().clone()
    }

    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// Publish `status`; the version only moves when something changed.
    pub fn publish(&self, status: &AvatarStatus) -> bool {
        let mut guard = self.inner.status.write();
        if *guard == *status {
            return false;
        }
        *guard = status.clone();
        self.inner.version.fetch_add(1, Ordering::AcqRel);
        true
    }
}
