//! Timers owned by active states.
//!
//! A scheduled message is delivered through the machine's queue like any
//! other message. Every timer belongs to the state that scheduled it and is
//! cancelled when that state exits.

use super::mailbox::{Command, Mailbox};
use crate::builder::NodeId;
use crate::core::Message;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::{self, Instant};
use tracing::trace;

pub(crate) type MessageFactory = Arc<dyn Fn() -> Message + Send + Sync>;

/// Identifier of a scheduled message, unique within a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub(crate) u64);

/// Handle to a scheduled message.
///
/// Dropping the handle does not cancel the timer; the owning state's exit
/// does.
#[derive(Debug)]
pub struct TimerHandle {
    id: TimerId,
    cancelled: Arc<AtomicBool>,
    abort: AbortHandle,
}

impl TimerHandle {
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Stop the timer. Messages it already queued are discarded.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.abort.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The machine's record of a live timer.
pub(crate) struct TimerEntry {
    id: TimerId,
    owner: NodeId,
    periodic: bool,
    cancelled: Arc<AtomicBool>,
    abort: AbortHandle,
}

impl TimerEntry {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.abort.abort();
    }
}

/// Start a timer that delivers `message()` after `delay`, and then every
/// `delay` when `periodic`.
pub(crate) fn spawn_timer(
    mailbox: &Mailbox,
    owner: NodeId,
    message: MessageFactory,
    delay: Duration,
    periodic: bool,
) -> (TimerHandle, TimerEntry) {
    let id = mailbox.next_timer_id();
    let commands = mailbox.sender();
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);

    let task = tokio::spawn(async move {
        if periodic {
            let period = delay.max(Duration::from_millis(1));
            let mut ticks = time::interval_at(Instant::now() + period, period);
            loop {
                ticks.tick().await;
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                let command = Command::Timer {
                    timer: id,
                    message: message(),
                };
                if commands.send(command).is_err() {
                    break;
                }
            }
        } else {
            time::sleep(delay).await;
            if !flag.load(Ordering::SeqCst) {
                let _ = commands.send(Command::Timer {
                    timer: id,
                    message: message(),
                });
            }
        }
    });

    let handle = TimerHandle {
        id,
        cancelled: Arc::clone(&cancelled),
        abort: task.abort_handle(),
    };
    let entry = TimerEntry {
        id,
        owner,
        periodic,
        cancelled,
        abort: task.abort_handle(),
    };
    (handle, entry)
}

/// Live timers and background tasks, keyed by the state that owns them.
#[derive(Default)]
pub(crate) struct TimerRegistry {
    timers: HashMap<TimerId, TimerEntry>,
    tasks: HashMap<NodeId, Vec<AbortHandle>>,
}

impl TimerRegistry {
    pub(crate) fn adopt(&mut self, entries: Vec<TimerEntry>) {
        for entry in entries {
            self.timers.insert(entry.id, entry);
        }
    }

    /// Track a background task that must stop when `owner` exits.
    pub(crate) fn track_task(&mut self, owner: NodeId, task: AbortHandle) {
        self.tasks.entry(owner).or_default().push(task);
    }

    /// Whether a message delivered by `id` should still be dispatched.
    /// One-shot timers are retired on delivery.
    pub(crate) fn accept_delivery(&mut self, id: TimerId) -> bool {
        let Some(entry) = self.timers.get(&id) else {
            trace!(timer = id.0, "dropping message from retired timer");
            return false;
        };
        if entry.cancelled.load(Ordering::SeqCst) {
            self.timers.remove(&id);
            return false;
        }
        if !entry.periodic {
            self.timers.remove(&id);
        }
        true
    }

    /// Cancel everything owned by `owner`.
    pub(crate) fn release(&mut self, owner: NodeId) -> usize {
        let mut released = 0;
        self.timers.retain(|_, entry| {
            if entry.owner == owner {
                entry.cancel();
                released += 1;
                false
            } else {
                true
            }
        });
        for task in self.tasks.remove(&owner).unwrap_or_default() {
            task.abort();
            released += 1;
        }
        released
    }

    pub(crate) fn release_all(&mut self) {
        for (_, entry) in self.timers.drain() {
            entry.cancel();
        }
        for (_, tasks) in self.tasks.drain() {
            for task in tasks {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn mailbox() -> (Mailbox, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Mailbox::new(tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_timer_delivers_once() {
        let (mailbox, mut rx) = mailbox();
        let mut registry = TimerRegistry::default();
        let (handle, entry) = spawn_timer(&mailbox, 3, Arc::new(|| Message::new("tick")), Duration::from_secs(5), false);
        registry.adopt(vec![entry]);

        let Some(Command::Timer { timer, message }) = rx.recv().await else {
            panic!("expected a timer command");
        };
        assert_eq!(timer, handle.id());
        assert_eq!(message.downcast_ref::<&str>(), Some(&"tick"));
        assert!(registry.accept_delivery(timer));
        assert!(!registry.accept_delivery(timer));
    }

    #[tokio::test(start_paused = true)]
    async fn released_timers_reject_queued_deliveries() {
        let (mailbox, mut rx) = mailbox();
        let mut registry = TimerRegistry::default();
        let (_handle, entry) = spawn_timer(&mailbox, 1, Arc::new(|| Message::new(1u8)), Duration::from_secs(1), true);
        registry.adopt(vec![entry]);

        let Some(Command::Timer { timer, .. }) = rx.recv().await else {
            panic!("expected a timer command");
        };
        assert!(registry.accept_delivery(timer));

        assert_eq!(registry.release(1), 1);
        assert!(!registry.accept_delivery(timer));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_handle_stops_delivery() {
        let (mailbox, mut rx) = mailbox();
        let (handle, _entry) = spawn_timer(&mailbox, 0, Arc::new(|| Message::new(())), Duration::from_secs(1), false);
        handle.cancel();
        assert!(handle.is_cancelled());

        drop(mailbox);
        assert!(rx.recv().await.is_none());
    }
}
