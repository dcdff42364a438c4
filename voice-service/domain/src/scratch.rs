use std::sync::Arc;

use crate::{
    CleanupWarning, ContainerFormat, DomainError, RequesterId, ScratchPaths, ScratchStorage,
};

/// Scratch paths tied to one request.
///
/// Release happens exactly once: through [`ScratchSession::release`] on the normal
/// paths, or from `Drop` when the session is abandoned (panic, early return).
pub struct ScratchSession {
    storage: Arc<dyn ScratchStorage>,
    paths: ScratchPaths,
    released: bool,
}

impl ScratchSession {
    pub fn allocate(
        storage: Arc<dyn ScratchStorage>,
        requester: &RequesterId,
        format: ContainerFormat,
    ) -> Result<Self, DomainError> {
        let paths = storage.allocate(requester, format)?;
        Ok(Self {
            storage,
            paths,
            released: false,
        })
    }

    pub fn paths(&self) -> &ScratchPaths {
        &self.paths
    }

    pub fn storage(&self) -> &dyn ScratchStorage {
        self.storage.as_ref()
    }

    pub fn release(mut self) -> Vec<CleanupWarning> {
        self.released = true;
        self.storage.release(&self.paths)
    }
}

impl Drop for ScratchSession {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        for warning in self.storage.release(&self.paths) {
            tracing::warn!(
                path = %warning.path.display(),
                reason = %warning.reason,
                "scratch cleanup warning"
            );
        }
    }
}
