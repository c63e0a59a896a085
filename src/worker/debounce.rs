//! Debouncer: coalesces high-frequency notifications.
//!
//! Values are split in two classes by a predicate. Non-deferred values are
//! delivered immediately on the caller's thread and cancel any pending
//! deferred value. A deferred value is held for a quiescence window by a
//! dedicated timer thread and delivered only if nothing newer arrived in
//! the meantime.
//!
//! ```text
//!  push(Compute)  push(Idle)  push(Compute)  push(Idle)
//!       │              │            │             │
//!       ▼              ▼            ▼             ▼
//!  ──deliver──────pending───────deliver───────pending──── window ──▶ deliver(Idle)
//!                 (discarded)
//! ```
//!
//! Delivery happens with the debouncer's lock held, so a listener must not
//! push into the same debouncer.

use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Listener invoked for every delivered value.
type Listener<T> = Box<dyn FnMut(&T) + Send>;

/// A deferred delivery scheduled on the timer thread.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    generation: u64,
    at: Instant,
}

struct Shared<T> {
    listener: Option<Listener<T>>,
    /// Bumped on every push; a deadline only fires if it still matches.
    generation: u64,
    pending: Option<T>,
}

impl<T> Shared<T> {
    fn deliver(&mut self, value: &T) {
        if let Some(listener) = self.listener.as_mut() {
            listener(value);
        }
    }
}

/// Generic debounce primitive. See the module docs.
pub struct Debouncer<T: Send + 'static> {
    shared: Arc<Mutex<Shared<T>>>,
    defer: fn(&T) -> bool,
    window: Duration,
    /// Wrapped in Option so Drop can close the channel before joining.
    timer_tx: Option<Sender<Deadline>>,
    handle: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Spawn a debouncer whose timer thread is called `name`.
    ///
    /// `defer` selects the values held back for `window`.
    pub fn spawn(name: impl Into<String>, window: Duration, defer: fn(&T) -> bool) -> io::Result<Self> {
        let shared = Arc::new(Mutex::new(Shared {
            listener: None,
            generation: 0,
            pending: None,
        }));
        let (timer_tx, timer_rx) = unbounded::<Deadline>();

        let timer_shared = Arc::clone(&shared);
        let handle = thread::Builder::new().name(name.into()).spawn(move || {
            let mut next: Option<Deadline> = None;
            loop {
                let received = match next {
                    Some(deadline) => timer_rx.recv_deadline(deadline.at),
                    None => timer_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                };
                match received {
                    Ok(deadline) => next = Some(deadline),
                    Err(RecvTimeoutError::Timeout) => {
                        if let Some(deadline) = next.take() {
                            Self::fire(&timer_shared, deadline.generation);
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })?;

        Ok(Self {
            shared,
            defer,
            window,
            timer_tx: Some(timer_tx),
            handle: Some(handle),
        })
    }

    fn lock(shared: &Mutex<Shared<T>>) -> std::sync::MutexGuard<'_, Shared<T>> {
        shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fire(shared: &Mutex<Shared<T>>, generation: u64) {
        let mut shared = Self::lock(shared);
        if shared.generation != generation {
            return;
        }
        if let Some(value) = shared.pending.take() {
            shared.deliver(&value);
        }
    }

    /// Register the listener, replacing any previous one.
    pub fn set_listener(&self, listener: impl FnMut(&T) + Send + 'static) {
        Self::lock(&self.shared).listener = Some(Box::new(listener));
    }

    /// Remove the listener. Values keep flowing but are dropped.
    pub fn clear_listener(&self) {
        Self::lock(&self.shared).listener = None;
    }

    /// Whether a deferred value is waiting for its window to elapse.
    pub fn has_pending(&self) -> bool {
        Self::lock(&self.shared).pending.is_some()
    }

    /// Submit a value.
    pub fn push(&self, value: T) {
        let mut shared = Self::lock(&self.shared);
        shared.generation = shared.generation.wrapping_add(1);

        if (self.defer)(&value) {
            shared.pending = Some(value);
            let deadline = Deadline {
                generation: shared.generation,
                at: Instant::now() + self.window,
            };
            if let Some(tx) = &self.timer_tx {
                // Timer thread gone means we are shutting down.
                let _ = tx.send(deadline);
            }
        } else {
            shared.pending = None;
            shared.deliver(&value);
        }
    }
}

impl<T: Send + 'static> Drop for Debouncer<T> {
    fn drop(&mut self) {
        drop(self.timer_tx.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
