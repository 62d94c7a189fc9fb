#[allow(unused_imports)]
use log::{debug, info, warn};

use std::cell::RefCell;
use std::rc::Rc;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FenceStatus {
    Pending,
    Signaled,
    Failed(String),
}

/// Completion signal for a submitted pass, polled without blocking.
///
/// The executor receives the matching `FenceSignal` alongside the command.
/// A signal dropped before being resolved fails the fence, which covers
/// command lists that were discarded instead of executed.
#[derive(Debug)]
pub struct Fence {
    status: Rc<RefCell<FenceStatus>>,
}

impl Fence {
    pub fn new() -> (Self, FenceSignal) {
        let status = Rc::new(RefCell::new(FenceStatus::Pending));

        (
            Self {
                status: status.clone(),
            },
            FenceSignal { status },
        )
    }

    pub fn status(&self) -> FenceStatus {
        self.status.borrow().clone()
    }

    pub fn is_signaled(&self) -> bool {
        *self.status.borrow() == FenceStatus::Signaled
    }
}

#[derive(Debug)]
pub struct FenceSignal {
    status: Rc<RefCell<FenceStatus>>,
}

impl FenceSignal {
    /// Marks the pass as successfully executed.
    pub fn signal(self) {
        self.resolve(FenceStatus::Signaled);
    }

    /// Marks the pass as failed.
    pub fn fail(self, reason: impl ToString) {
        self.resolve(FenceStatus::Failed(reason.to_string()));
    }

    fn resolve(&self, status: FenceStatus) {
        let mut current = self.status.borrow_mut();

        if *current == FenceStatus::Pending {
            *current = status;
        }
    }
}

impl Drop for FenceSignal {
    fn drop(&mut self) {
        self.resolve(FenceStatus::Failed(
            "pass dropped before execution".to_string(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fences_start_pending() {
        let (fence, _signal) = Fence::new();

        assert_eq!(fence.status(), FenceStatus::Pending);
    }

    #[test]
    fn signal_resolves_fence() {
        let (fence, signal) = Fence::new();
        signal.signal();

        assert!(fence.is_signaled());
    }

    #[test]
    fn dropped_signal_fails_fence() {
        let (fence, signal) = Fence::new();
        drop(signal);

        assert!(matches!(fence.status(), FenceStatus::Failed(_)));
    }

    #[test]
    fn explicit_failure_keeps_reason() {
        let (fence, signal) = Fence::new();
        signal.fail("out of memory");

        assert_eq!(
            fence.status(),
            FenceStatus::Failed("out of memory".to_string())
        );
    }
}
