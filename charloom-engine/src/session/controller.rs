//! Current-request tracking for cooperative cancellation

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically increasing generation request identifier
pub type RequestId = u64;

/// Shared cell holding the id of the one request allowed to keep running.
///
/// Starting a request bumps the id, which silently supersedes whatever
/// session holds the previous one. Cloning shares the same cell.
#[derive(Debug, Clone, Default)]
pub struct GenerationController {
    current: Arc<AtomicU64>,
}

impl GenerationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new id and make it current.
    pub fn begin(&self) -> GenerationToken {
        let id = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        GenerationToken {
            id,
            current: Arc::clone(&self.current),
        }
    }

    /// Supersede the running request without starting a new one.
    pub fn cancel(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
    }

    /// Id of the most recent request (0 before any request)
    pub fn current_id(&self) -> RequestId {
        self.current.load(Ordering::SeqCst)
    }
}

/// Held by one session; reports whether that session is still current.
#[derive(Debug, Clone)]
pub struct GenerationToken {
    id: RequestId,
    current: Arc<AtomicU64>,
}

impl GenerationToken {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_increase() {
        let controller = GenerationController::new();
        assert_eq!(controller.current_id(), 0);
        let a = controller.begin();
        let b = controller.begin();
        assert_eq!(a.id(), 1);
        assert_eq!(b.id(), 2);
        assert_eq!(controller.current_id(), 2);
    }

    #[test]
    fn test_newer_request_supersedes() {
        let controller = GenerationController::new();
        let a = controller.begin();
        assert!(a.is_current());
        let b = controller.begin();
        assert!(!a.is_current());
        assert!(b.is_current());
    }

    #[test]
    fn test_cancel() {
        let controller = GenerationController::new();
        let a = controller.begin();
        controller.cancel();
        assert!(!a.is_current());
    }

    #[test]
    fn test_clones_share_state() {
        let controller = GenerationController::new();
        let handle = controller.clone();
        let a = controller.begin();
        handle.begin();
        assert!(!a.is_current());
    }

    #[test]
    fn test_concurrent_begin_yields_unique_ids() {
        let controller = GenerationController::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = controller.clone();
                std::thread::spawn(move || (0..100).map(|_| c.begin().id()).collect::<Vec<_>>())
            })
            .collect();
        let mut ids: Vec<RequestId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 800);
        assert_eq!(controller.current_id(), 800);
    }
}
