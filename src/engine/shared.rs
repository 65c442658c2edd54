//! State a machine publishes to its handles.

use super::result::{FailedMessage, HandledMessage, MachineStatus, ProcessResult};
use crate::builder::RuntimeTree;
use crate::config::MachineConfig;
use crate::core::{DataStateKey, StateKey, TransitionHistory, TransitionRecord};
use crate::data::cell::{downcast_cell, is_cell_of, DataCell};
use crate::data::{DataError, DataValue, StateData};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

pub(crate) struct EventSenders {
    transitions: broadcast::Sender<TransitionRecord>,
    processed: broadcast::Sender<ProcessResult>,
    handled: broadcast::Sender<HandledMessage>,
    failed: broadcast::Sender<FailedMessage>,
}

impl EventSenders {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            transitions: broadcast::channel(capacity).0,
            processed: broadcast::channel(capacity).0,
            handled: broadcast::channel(capacity).0,
            failed: broadcast::channel(capacity).0,
        }
    }
}

#[derive(Default)]
struct ActivePath {
    /// Root first
    states: Vec<(StateKey, Option<DataCell>)>,
    current: Option<StateKey>,
}

/// Snapshot of a machine, written by its task and read by its handles.
pub(crate) struct MachineShared {
    pub(crate) id: Uuid,
    pub(crate) tree: Arc<RuntimeTree>,
    pub(crate) config: MachineConfig,
    status: Mutex<MachineStatus>,
    active: Mutex<ActivePath>,
    history: Mutex<TransitionHistory>,
    events: Mutex<Option<EventSenders>>,
}

impl MachineShared {
    pub(crate) fn new(tree: Arc<RuntimeTree>, config: MachineConfig) -> Self {
        let events = EventSenders::new(config.event_capacity);
        Self {
            id: Uuid::new_v4(),
            tree,
            config,
            status: Mutex::new(MachineStatus::NotStarted),
            active: Mutex::new(ActivePath::default()),
            history: Mutex::new(TransitionHistory::new()),
            events: Mutex::new(Some(events)),
        }
    }

    pub(crate) fn status(&self) -> MachineStatus {
        *self.status.lock()
    }

    pub(crate) fn set_status(&self, status: MachineStatus) {
        *self.status.lock() = status;
    }

    pub(crate) fn publish_active(&self, states: Vec<(StateKey, Option<DataCell>)>, current: Option<StateKey>) {
        let mut active = self.active.lock();
        active.states = states;
        if current.is_some() {
            active.current = current;
        }
    }

    pub(crate) fn current(&self) -> Option<StateKey> {
        self.active.lock().current.clone()
    }

    pub(crate) fn active_keys(&self) -> Vec<StateKey> {
        self.active
            .lock()
            .states
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub(crate) fn data_value<D: StateData>(&self, key: &DataStateKey<D>) -> Result<Arc<DataValue<D>>, DataError> {
        let key = key.key();
        let active = self.active.lock();
        match active.states.iter().find(|(k, _)| k == key) {
            Some((_, Some(cell))) => downcast_cell(cell),
            Some((_, None)) => Err(DataError::NoData { key: key.clone() }),
            None => Err(DataError::NotActive { key: key.clone() }),
        }
    }

    /// Data of the deepest active state carrying a `D`.
    pub(crate) fn find_data_value<D: StateData>(&self) -> Result<Arc<DataValue<D>>, DataError> {
        let active = self.active.lock();
        active
            .states
            .iter()
            .rev()
            .filter_map(|(_, cell)| cell.as_ref())
            .find(|cell| is_cell_of::<D>(cell))
            .map(downcast_cell)
            .unwrap_or(Err(DataError::NotFound {
                expected: std::any::type_name::<D>(),
            }))
    }

    pub(crate) fn history(&self) -> TransitionHistory {
        self.history.lock().clone()
    }

    pub(crate) fn record_transition(&self, record: &TransitionRecord) {
        {
            let mut history = self.history.lock();
            *history = history.record_bounded(record.clone(), self.config.history_limit);
        }
        if let Some(events) = self.events.lock().as_ref() {
            let _ = events.transitions.send(record.clone());
        }
    }

    pub(crate) fn record_result(&self, result: &ProcessResult) {
        let events = self.events.lock();
        let Some(events) = events.as_ref() else {
            return;
        };
        match result {
            ProcessResult::Handled(handled) => {
                let _ = events.handled.send(handled.clone());
            }
            ProcessResult::Failed(failed) => {
                let _ = events.failed.send(failed.clone());
            }
            ProcessResult::Unhandled(_) => {}
        }
        let _ = events.processed.send(result.clone());
    }

    /// Drop every event sender so open streams complete.
    pub(crate) fn close_events(&self) {
        self.events.lock().take();
    }

    pub(crate) fn subscribe_transitions(&self) -> broadcast::Receiver<TransitionRecord> {
        subscribe(&self.events, |events| &events.transitions)
    }

    pub(crate) fn subscribe_processed(&self) -> broadcast::Receiver<ProcessResult> {
        subscribe(&self.events, |events| &events.processed)
    }

    pub(crate) fn subscribe_handled(&self) -> broadcast::Receiver<HandledMessage> {
        subscribe(&self.events, |events| &events.handled)
    }

    pub(crate) fn subscribe_failed(&self) -> broadcast::Receiver<FailedMessage> {
        subscribe(&self.events, |events| &events.failed)
    }
}

/// Subscribe to one of the event streams. After the streams are closed the
/// returned receiver is already closed.
fn subscribe<T: Clone>(
    events: &Mutex<Option<EventSenders>>,
    select: impl FnOnce(&EventSenders) -> &broadcast::Sender<T>,
) -> broadcast::Receiver<T> {
    match events.lock().as_ref() {
        Some(events) => select(events).subscribe(),
        None => broadcast::channel(1).1,
    }
}
