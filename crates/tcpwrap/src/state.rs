//! Shared connection-state cell.
//!
//! The cell is written by two parties, the owner (construction and teardown,
//! plus a caller's `read` noticing a peer close) and the background task. It is
//! read by both of them and by any thread blocked in `wait_for_connection`.
//! Every successful transition wakes blocking waiters through the condvar and
//! async waiters through the [`Notify`].

use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

use tcpwrap_core::ConnectionState;

#[derive(Debug, Default)]
pub(crate) struct StateCell {
    state: Mutex<ConnectionState>,
    changed: Condvar,
    notify: Notify,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Moves to `next` if the edge is legal. Returns whether it moved.
    pub(crate) fn advance(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if !state.can_transition_to(next) {
            return false;
        }
        *state = next;
        drop(state);
        self.notify_all();
        true
    }

    /// Moves to `next` only while the current state is still `expected`.
    pub(crate) fn advance_from(&self, expected: ConnectionState, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if *state != expected || !expected.can_transition_to(next) {
            return false;
        }
        *state = next;
        drop(state);
        self.notify_all();
        true
    }

    /// Wakes every waiter without changing state, so predicates that depend
    /// on more than the state are re-evaluated.
    pub(crate) fn wake(&self) {
        // Taking the lock orders this wake-up after any waiter's predicate check.
        drop(self.state.lock());
        self.notify_all();
    }

    /// Blocks the calling thread until `done` holds or `timeout` elapses, and
    /// returns the state observed last.
    pub(crate) fn wait_for(
        &self,
        timeout: Duration,
        mut done: impl FnMut(ConnectionState) -> bool,
    ) -> ConnectionState {
        let mut state = self.state.lock();
        let _ = self
            .changed
            .wait_while_for(&mut state, |state| !done(*state), timeout);
        *state
    }

    /// Resolves once `done` holds for the current state.
    pub(crate) async fn until(
        &self,
        mut done: impl FnMut(ConnectionState) -> bool,
    ) -> ConnectionState {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a transition in between is not lost.
            notified.as_mut().enable();

            let state = self.get();
            if done(state) {
                return state;
            }
            notified.await;
        }
    }

    fn notify_all(&self) {
        self.changed.notify_all();
        self.notify.notify_waiters();
    }
}
