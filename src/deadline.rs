//! Absolute read/write deadlines
//!
//! A [`Deadline`] is shared mutable state: setters may run while an operation
//! is already waiting, and the waiting operation must notice. Each operation
//! polls a [`DeadlineTimer`], which re-arms its sleep whenever the deadline's
//! generation changes.

use futures::task::AtomicWaker;
use parking_lot::Mutex;
use std::future::{poll_fn, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::time::{sleep_until, Instant, Sleep};

#[derive(Debug, Default)]
struct DeadlineState {
    at: Option<Instant>,
    generation: u64,
}

#[derive(Debug, Default)]
struct DeadlineShared {
    state: Mutex<DeadlineState>,
    waker: AtomicWaker,
}

/// One direction's deadline. Cloning shares the same cell.
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    shared: Arc<DeadlineShared>,
}

impl Deadline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the absolute expiry. `None` means wait indefinitely.
    pub fn set(&self, at: Option<Instant>) {
        {
            let mut state = self.shared.state.lock();
            state.at = at;
            state.generation = state.generation.wrapping_add(1);
        }
        self.shared.waker.wake();
    }

    pub fn get(&self) -> Option<Instant> {
        self.shared.state.lock().at
    }

    /// Whether the deadline is set and already in the past
    pub fn is_expired(&self) -> bool {
        self.get().is_some_and(|at| at <= Instant::now())
    }

    /// Timer for one waiting operation. Only one timer per deadline should be
    /// polled at a time.
    pub fn timer(&self) -> DeadlineTimer {
        DeadlineTimer {
            shared: self.shared.clone(),
            generation: None,
            sleep: None,
        }
    }
}

/// Poll-side view of a [`Deadline`].
pub struct DeadlineTimer {
    shared: Arc<DeadlineShared>,
    generation: Option<u64>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl DeadlineTimer {
    /// Ready once the deadline has passed. Stays pending while no deadline is
    /// set, but wakes the task whenever the deadline changes.
    pub fn poll_expired(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        // Register before reading so a concurrent `set` cannot be missed.
        self.shared.waker.register(cx.waker());

        let (at, generation) = {
            let state = self.shared.state.lock();
            (state.at, state.generation)
        };
        if self.generation != Some(generation) {
            self.generation = Some(generation);
            self.sleep = at.map(|at| Box::pin(sleep_until(at)));
        }
        if at.is_some_and(|at| at <= Instant::now()) {
            return Poll::Ready(());
        }

        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().poll(cx),
            None => Poll::Pending,
        }
    }

    pub async fn expired(&mut self) {
        poll_fn(|cx| self.poll_expired(cx)).await
    }
}

impl std::fmt::Debug for DeadlineTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadlineTimer")
            .field("generation", &self.generation)
            .field("armed", &self.sleep.is_some())
            .finish()
    }
}
