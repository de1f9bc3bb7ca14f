//! Caller liveness notification.
//!
//! The transport knows when a connection goes away; the service only needs a way to hear about
//! it. A [`ClientLink`] is that seam: the service hands it a callback, and the transport runs the
//! callback once when the peer disconnects. Nothing here relies on `Drop` of a client-side object.

use parking_lot::Mutex;
use thiserror::Error;

/// Callback run once when the linked peer disconnects.
pub type DeathCallback = Box<dyn FnOnce() + Send + 'static>;

/// Errors from [`ClientLink::link_to_death`].
#[derive(Debug, Error)]
pub enum LinkError {
    /// The transport could not arrange for a notification.
    #[error("peer link unavailable: {0}")]
    Unavailable(String),
}

/// A caller's liveness token, as provided by the transport.
pub trait ClientLink: Send + Sync {
    /// Arrange for `on_death` to run exactly once when the peer disconnects.
    ///
    /// If the peer is already gone, implementations run `on_death` before returning.
    fn link_to_death(&self, on_death: DeathCallback) -> Result<(), LinkError>;
}

enum State {
    Alive(Vec<DeathCallback>),
    Dead,
}

/// A list of death callbacks a transport can fire when its connection ends.
///
/// Callbacks linked before [`DeathRecipients::notify`] run once, on the notifying thread. Callbacks
/// linked afterwards run immediately on the linking thread.
pub struct DeathRecipients {
    state: Mutex<State>,
}

impl Default for DeathRecipients {
    fn default() -> Self {
        Self::new()
    }
}

impl DeathRecipients {
    /// A live link with no recipients.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Alive(Vec::new())),
        }
    }

    /// Mark the peer as gone and run every pending callback. Later calls do nothing.
    pub fn notify(&self) {
        let pending = match std::mem::replace(&mut *self.state.lock(), State::Dead) {
            State::Alive(callbacks) => callbacks,
            State::Dead => return,
        };
        for callback in pending {
            callback();
        }
    }

    /// Whether [`DeathRecipients::notify`] has been called.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        matches!(*self.state.lock(), State::Dead)
    }
}

impl ClientLink for DeathRecipients {
    fn link_to_death(&self, on_death: DeathCallback) -> Result<(), LinkError> {
        let mut state = self.state.lock();
        if let State::Alive(callbacks) = &mut *state {
            callbacks.push(on_death);
            return Ok(());
        }
        drop(state);
        on_death();
        Ok(())
    }
}
