//! Cleanup stack for the session.
//!
//! Actions are registered before the resources they release are acquired,
//! and unwound exactly once, last registered first.

/// A teardown step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    /// Remove any installed shaping.
    ResetShaping,
    /// Stop every managed process.
    TerminateProcesses,
}

/// LIFO list of teardown steps, unwound at most once.
#[derive(Debug, Default)]
pub struct CleanupStack {
    actions: Vec<CleanupAction>,
    unwound: bool,
}

impl CleanupStack {
    /// Empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action. Ignored after the stack has been unwound.
    pub fn push(&mut self, action: CleanupAction) {
        if self.unwound {
            tracing::warn!(?action, "cleanup already ran, ignoring registration");
            return;
        }
        self.actions.push(action);
    }

    /// Take the actions in LIFO order. Returns nothing on later calls.
    pub fn unwind(&mut self) -> Vec<CleanupAction> {
        if self.unwound {
            return Vec::new();
        }
        self.unwound = true;
        let mut actions = std::mem::take(&mut self.actions);
        actions.reverse();
        actions
    }
}
