//! Rescan signaling between a change-watching collaborator and the scan
//! loop.
//!
//! Producers (filesystem watchers, editors, anything noticing a change)
//! post signals through a cloneable [`ScanTrigger`]; the single consumer
//! owns the [`RescanQueue`] and drains every pending signal as one wake-up,
//! so a burst of file events coalesces into one rescan. All "rescan needed"
//! state flows through the queue, and only one consumer may wait on it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct QueueState {
    pending: u64,
    closed: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    wakeup: Condvar,
}

/// Producer handle: post a rescan signal from any thread.
#[derive(Clone)]
pub struct ScanTrigger {
    shared: Arc<Shared>,
}

impl ScanTrigger {
    /// Flag that a rescan is needed. Cheap and non-blocking.
    pub fn notify(&self) {
        let mut state = self.shared.state.lock();
        state.pending += 1;
        self.shared.wakeup.notify_one();
    }

    /// Close the queue; the consumer's next wait returns [`QueueEvent::Closed`].
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        state.closed = true;
        self.shared.wakeup.notify_one();
    }
}

/// Outcome of one consumer wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueEvent {
    /// Signals arrived; the count is how many coalesced into this wake-up.
    Signaled(u64),
    /// The debounce window elapsed with nothing pending.
    TimedOut,
    /// All producers are done; the scan loop should exit.
    Closed,
}

/// Single-consumer end of the rescan queue.
pub struct RescanQueue {
    shared: Arc<Shared>,
}

impl RescanQueue {
    /// Create a connected trigger/queue pair.
    pub fn new() -> (ScanTrigger, RescanQueue) {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            wakeup: Condvar::new(),
        });
        (
            ScanTrigger {
                shared: Arc::clone(&shared),
            },
            RescanQueue { shared },
        )
    }

    /// Wait up to `timeout` for signals, draining everything pending.
    pub fn wait(&self, timeout: Duration) -> QueueEvent {
        let mut state = self.shared.state.lock();
        if state.pending == 0 && !state.closed {
            let _ = self.shared.wakeup.wait_for(&mut state, timeout);
        }
        if state.pending > 0 {
            let drained = state.pending;
            state.pending = 0;
            return QueueEvent::Signaled(drained);
        }
        if state.closed {
            return QueueEvent::Closed;
        }
        QueueEvent::TimedOut
    }
}
