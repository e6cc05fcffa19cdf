// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Trailing-edge debouncing of sync requests.
//!
//! The graph editor saves eagerly, often several times a second while the
//! user drags nodes around. Publishing every one of those saves would flood
//! the remote with commits. Instead each save re-arms a single timer, and
//! the sync only fires once the timer survives a full window without being
//! re-armed, i.e., `window` after the _last_ save of a burst.
//!
//! # Timer Lifecycle
//!
//! The scheduler holds at most one pending timer. A timer is `armed` by
//! [`SyncScheduler::schedule`], moves to `fired` once its window elapses,
//! and the slot returns to `idle` right before the sync action starts.
//! Re-scheduling an armed timer cancels it and arms a fresh one in the same
//! critical section. There is no way to disarm a timer without either
//! replacing it or firing it.
//!
//! Each armed timer is tagged with a generation number. A timer whose window
//! elapsed while another save was re-arming the slot notices that it has been
//! superseded and exits without firing, so a burst of saves yields exactly
//! one sync.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{debug, instrument};

/// Furthest a deadline is ever pushed out, well within what the Tokio timer
/// can represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365);

/// Action to run once a debounce window elapses.
pub type SyncAction = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Single-slot trailing-edge debouncer.
pub struct SyncScheduler {
    window: Duration,
    action: SyncAction,
    slot: Arc<Mutex<TimerSlot>>,
}

#[derive(Default)]
struct TimerSlot {
    generation: u64,
    pending: Option<PendingSync>,
}

struct PendingSync {
    deadline: Instant,
    timer: JoinHandle<()>,
}

impl SyncScheduler {
    /// Construct new scheduler that runs `action` after `window` of quiet.
    pub fn new(window: Duration, action: SyncAction) -> Self {
        Self {
            window,
            action,
            slot: Arc::new(Mutex::new(TimerSlot::default())),
        }
    }

    /// Length of the debounce window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Arm the timer, cancelling any pending one.
    ///
    /// Only the deadline of the most recent call matters. Returns that
    /// deadline.
    ///
    /// # Panics
    ///
    /// - Panics if called outside of a Tokio runtime.
    #[instrument(skip(self), level = "debug")]
    pub fn schedule(&self) -> Instant {
        let mut slot = self.slot.lock();
        if let Some(superseded) = slot.pending.take() {
            debug!("supersede sync due at {:?}", superseded.deadline);
            superseded.timer.abort();
        }

        slot.generation += 1;
        let deadline = deadline_after(Instant::now(), self.window);
        let timer = tokio::spawn(fire(
            self.slot.clone(),
            slot.generation,
            deadline,
            self.action.clone(),
        ));
        slot.pending = Some(PendingSync { deadline, timer });

        deadline
    }

    /// Deadline of the pending timer, if one is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.slot.lock().pending.as_ref().map(|pending| pending.deadline)
    }

    /// Timer is armed and has not fired yet.
    pub fn is_armed(&self) -> bool {
        self.slot.lock().pending.is_some()
    }

    /// Fire pending timer right now instead of waiting out its window.
    ///
    /// Returns whether there was anything to fire. Waits for the action to
    /// complete.
    pub async fn flush(&self) -> bool {
        let pending = {
            let mut slot = self.slot.lock();
            slot.generation += 1;
            slot.pending.take()
        };

        match pending {
            Some(pending) => {
                pending.timer.abort();
                (self.action)().await;
                true
            }
            None => false,
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        if let Some(pending) = self.slot.lock().pending.take() {
            pending.timer.abort();
        }
    }
}

// INVARIANT: Never overflow, however large the configured window is.
fn deadline_after(now: Instant, window: Duration) -> Instant {
    now.checked_add(window.min(FAR_FUTURE)).unwrap_or(now)
}

async fn fire(slot: Arc<Mutex<TimerSlot>>, generation: u64, deadline: Instant, action: SyncAction) {
    sleep_until(deadline).await;

    {
        let mut slot = slot.lock();

        // INVARIANT: Only the most recently armed timer may fire.
        if slot.generation != generation {
            debug!("timer {generation} superseded before firing");
            return;
        }

        slot.pending = None;
    }

    debug!("debounce window elapsed, fire sync");
    action().await;
}
