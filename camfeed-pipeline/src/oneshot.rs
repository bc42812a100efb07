//! Single-value completion slot with cancellation
//!
//! Bridges callback-driven backend APIs to a blocking caller: the callback
//! completes the slot, the caller parks in [`Pending::wait`]. Once cancelled,
//! late completions are handed back to the completer instead of being lost.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Operation cancelled")]
pub struct Cancelled;

enum State<T> {
    Waiting,
    Ready(T),
    Cancelled,
    Taken,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

/// Producer half, usually moved into a backend callback
pub struct Completer<T> {
    shared: Arc<Shared<T>>,
}

/// Consumer half
pub struct Pending<T> {
    shared: Arc<Shared<T>>,
}

/// Type-erased cancellation handle for a [`Pending`]
#[derive(Clone)]
pub struct Canceller {
    target: Arc<dyn Cancel>,
}

trait Cancel: Send + Sync {
    fn cancel(&self) -> bool;
}

pub fn oneshot<T>() -> (Completer<T>, Pending<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State::Waiting),
        ready: Condvar::new(),
    });
    (
        Completer {
            shared: shared.clone(),
        },
        Pending { shared },
    )
}

impl<T> Completer<T> {
    /// Resolve the slot. Gives the value back if the slot was cancelled or
    /// already resolved.
    pub fn complete(&self, value: T) -> Result<(), T> {
        let mut state = self.shared.state.lock();
        match *state {
            State::Waiting => {
                *state = State::Ready(value);
                self.shared.ready.notify_all();
                Ok(())
            }
            _ => Err(value),
        }
    }

    pub fn is_waiting(&self) -> bool {
        matches!(*self.shared.state.lock(), State::Waiting)
    }
}

impl<T> Pending<T> {
    /// Block until the slot is resolved or cancelled
    pub fn wait(self) -> Result<T, Cancelled> {
        let mut state = self.shared.state.lock();
        loop {
            match std::mem::replace(&mut *state, State::Taken) {
                State::Ready(value) => return Ok(value),
                State::Waiting => {
                    *state = State::Waiting;
                    self.shared.ready.wait(&mut state);
                }
                State::Cancelled => {
                    *state = State::Cancelled;
                    return Err(Cancelled);
                }
                State::Taken => return Err(Cancelled),
            }
        }
    }

    pub fn canceller(&self) -> Canceller
    where
        T: Send + 'static,
    {
        Canceller {
            target: self.shared.clone(),
        }
    }
}

impl<T: Send> Cancel for Shared<T> {
    fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            State::Waiting => {
                *state = State::Cancelled;
                self.ready.notify_all();
                true
            }
            // Already resolved: the waiter gets the value
            _ => false,
        }
    }
}

impl Canceller {
    /// Cancel the wait. Returns false if the slot was already resolved.
    pub fn cancel(&self) -> bool {
        self.target.cancel()
    }
}
