//! Presence service lifecycle state machine.

use std::sync::Mutex;

/// Lifecycle of a presence service instance.
///
/// `Uninitialized → Initializing → Tracking → Disposed`; `Disposed` is
/// terminal and reachable from every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed, not yet bound to an identity.
    Uninitialized,
    /// `initialize` is in progress.
    Initializing,
    /// Observers are running.
    Tracking,
    /// Torn down; a new instance is needed to resume.
    Disposed,
}

/// Outcome of asking to begin initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitDecision {
    /// Proceed; the state is now `Initializing`.
    Proceed,
    /// Already initializing or tracking.
    AlreadyStarted,
    /// The instance was disposed.
    Disposed,
}

/// Thread-safe holder of the lifecycle state.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<LifecycleState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: Mutex::new(LifecycleState::Uninitialized),
        }
    }
}

impl Lifecycle {
    /// Current state.
    pub fn get(&self) -> LifecycleState {
        *self.lock()
    }

    /// Whether observers are running.
    pub fn is_tracking(&self) -> bool {
        self.get() == LifecycleState::Tracking
    }

    /// Try to move `Uninitialized → Initializing`.
    pub fn begin_init(&self) -> InitDecision {
        let mut state = self.lock();
        match *state {
            LifecycleState::Uninitialized => {
                *state = LifecycleState::Initializing;
                InitDecision::Proceed
            }
            LifecycleState::Initializing | LifecycleState::Tracking => InitDecision::AlreadyStarted,
            LifecycleState::Disposed => InitDecision::Disposed,
        }
    }

    /// Move `Initializing → Tracking`. Returns `false` if disposal won the race.
    pub fn finish_init(&self) -> bool {
        let mut state = self.lock();
        if *state == LifecycleState::Initializing {
            *state = LifecycleState::Tracking;
            true
        } else {
            false
        }
    }

    /// Move `Initializing → Uninitialized` after a failed initialization.
    pub fn abort_init(&self) {
        let mut state = self.lock();
        if *state == LifecycleState::Initializing {
            *state = LifecycleState::Uninitialized;
        }
    }

    /// Move to `Disposed`. Returns `true` only for the first call.
    pub fn dispose(&self) -> bool {
        let mut state = self.lock();
        if *state == LifecycleState::Disposed {
            false
        } else {
            *state = LifecycleState::Disposed;
            true
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
