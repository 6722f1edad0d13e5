//! The connection lifecycle state machine shared by the transport-owning
//! components (tunnel endpoint, pseudo-interface).
//!
//! `Created -> Starting -> Started -> Stopping -> Stopped -> Closing ->
//! Closed`, with `Failed` reachable from any non-terminal state when an
//! I/O transition fails.  Requesting a state the machine is already in
//! is a no-op, and a failed transition aborts through a best-effort
//! close into `Closed` or `Failed`.

use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Starting,
    Started,
    Stopping,
    Stopped,
    Closing,
    Closed,
    Failed,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Closed | LifecycleState::Failed)
    }
}

pub struct Lifecycle {
    state: Mutex<LifecycleState>,
}

impl Lifecycle {
    pub fn new() -> Lifecycle {
        Lifecycle {
            state: Mutex::new(LifecycleState::Created),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.lock()
    }

    pub fn is_started(&self) -> bool {
        *self.lock() == LifecycleState::Started
    }

    /// Runs the component's start I/O.  A no-op returning false when
    /// already started or in a terminal state, true when the machine
    /// actually transitioned to `Started`; on failure aborts through
    /// `close` and returns the start error.
    pub fn start_with<E>(
        &self,
        start: impl FnOnce() -> Result<(), E>,
        close: impl FnOnce() -> Result<(), E>,
    ) -> Result<bool, E> {
        let mut state = self.lock();
        match *state {
            LifecycleState::Started => return Ok(false),
            LifecycleState::Closed | LifecycleState::Failed => return Ok(false),
            _ => {}
        }

        *state = LifecycleState::Starting;
        match start() {
            Ok(()) => {
                *state = LifecycleState::Started;
                Ok(true)
            }
            Err(error) => {
                abort_locked(&mut state, close);
                Err(error)
            }
        }
    }

    /// Runs the component's stop I/O.  A no-op unless currently started.
    pub fn stop_with<E>(
        &self,
        stop: impl FnOnce() -> Result<(), E>,
        close: impl FnOnce() -> Result<(), E>,
    ) -> Result<(), E> {
        let mut state = self.lock();
        if *state != LifecycleState::Started {
            return Ok(());
        }

        *state = LifecycleState::Stopping;
        match stop() {
            Ok(()) => {
                *state = LifecycleState::Stopped;
                Ok(())
            }
            Err(error) => {
                abort_locked(&mut state, close);
                Err(error)
            }
        }
    }

    /// Releases the component's resources.  A no-op in a terminal
    /// state; a close failure settles in `Failed`.
    pub fn close_with<E>(&self, close: impl FnOnce() -> Result<(), E>) -> Result<(), E> {
        let mut state = self.lock();
        if state.is_terminal() {
            return Ok(());
        }

        *state = LifecycleState::Closing;
        match close() {
            Ok(()) => {
                *state = LifecycleState::Closed;
                Ok(())
            }
            Err(error) => {
                *state = LifecycleState::Failed;
                Err(error)
            }
        }
    }

    /// Forces a best-effort close from whatever state the machine is
    /// in, settling in `Closed` or `Failed`.  Used when a transport
    /// error surfaces outside of a requested transition.
    pub fn abort<E>(&self, close: impl FnOnce() -> Result<(), E>) {
        let mut state = self.lock();
        if state.is_terminal() {
            return;
        }
        abort_locked(&mut state, close);
    }

    fn lock(&self) -> MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else(|error| error.into_inner())
    }
}

impl Default for Lifecycle {
    fn default() -> Lifecycle {
        Lifecycle::new()
    }
}

fn abort_locked<E>(state: &mut LifecycleState, close: impl FnOnce() -> Result<(), E>) {
    *state = LifecycleState::Closing;
    *state = match close() {
        Ok(()) => LifecycleState::Closed,
        Err(_) => LifecycleState::Failed,
    };
}
