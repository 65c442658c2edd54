//! Public handles to a tree state machine.
//!
//! A [`TreeStateMachine`] is a cheap, cloneable handle. Starting it spawns
//! the task that owns every behavior and data value; afterwards the handle
//! only sends commands to that task and reads the snapshot it publishes.
//! Dropping the last handle disposes the machine.

use super::core::MachineCore;
use super::mailbox::{Command, StartMode};
use super::result::{FailedMessage, HandledMessage, MachineError, MachineStatus, ProcessResult};
use super::shared::MachineShared;
use crate::builder::{BuildError, RuntimeTree};
use crate::checkpoint::{restore_plan, Checkpoint, PersistenceError, RestorePlan};
use crate::config::{FailurePolicy, MachineConfig};
use crate::core::{DataStateKey, Message, StateError, StateKey, TransitionHistory, TransitionRecord};
use crate::data::{DataError, DataSubscription, DataView, StateData};
use crate::descriptor::NodeDescriptor;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::instrument::WithSubscriber;
use tracing::{info_span, Instrument};
use uuid::Uuid;

type PendingCore = (MachineCore, mpsc::UnboundedReceiver<Command>);

struct MachineHandle {
    shared: Arc<MachineShared>,
    commands: mpsc::UnboundedSender<Command>,
    /// The core until the machine is started
    pending: Mutex<Option<PendingCore>>,
}

impl Drop for MachineHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Dispose);
    }
}

/// A hierarchical state machine.
///
/// # Example
///
/// ```rust
/// use treestate::{NodeDescriptor, StateBehavior, TreeStateMachine};
///
/// struct Push;
///
/// # tokio_test_block_on(async {
/// let root = NodeDescriptor::root("turnstile")
///     .initial("locked")
///     .child(NodeDescriptor::leaf("locked").behavior(
///         StateBehavior::default().on_message(|ctx| {
///             Ok(if ctx.message_as::<Push>().is_some() {
///                 ctx.go_to("unlocked")
///             } else {
///                 ctx.unhandled()
///             })
///         }),
///     ))
///     .child(NodeDescriptor::leaf("unlocked"));
///
/// let machine = TreeStateMachine::new(root)?;
/// let current = machine.start().await?;
/// assert_eq!(current.key(), "locked");
///
/// current.post(Push).await?;
/// assert_eq!(current.key(), "unlocked");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # }).unwrap();
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct TreeStateMachine {
    handle: Arc<MachineHandle>,
}

impl TreeStateMachine {
    /// Build a machine from a root descriptor with the default configuration.
    pub fn new(root: NodeDescriptor) -> Result<Self, BuildError> {
        Self::with_config(root, MachineConfig::default())
    }

    pub fn with_config(root: NodeDescriptor, config: MachineConfig) -> Result<Self, BuildError> {
        let tree = RuntimeTree::build(root)?;
        Ok(Self::from_tree(Arc::new(tree), config))
    }

    /// Create a machine over an already built tree. Trees can be shared by
    /// any number of machines.
    pub fn from_tree(tree: Arc<RuntimeTree>, config: MachineConfig) -> Self {
        let shared = Arc::new(MachineShared::new(tree, config));
        let (commands, receiver) = mpsc::unbounded_channel();
        let core = MachineCore::new(Arc::clone(&shared), commands.clone());
        Self {
            handle: Arc::new(MachineHandle {
                shared,
                commands,
                pending: Mutex::new(Some((core, receiver))),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.handle.shared.id
    }

    pub fn name(&self) -> &str {
        &self.handle.shared.config.name
    }

    pub fn config(&self) -> &MachineConfig {
        &self.handle.shared.config
    }

    pub fn tree(&self) -> &Arc<RuntimeTree> {
        &self.handle.shared.tree
    }

    pub fn status(&self) -> MachineStatus {
        self.handle.shared.status()
    }

    /// Whether a final state has been entered.
    pub fn is_done(&self) -> bool {
        self.status() == MachineStatus::Done
    }

    /// Current leaf, once started. Keeps the last leaf after the machine
    /// stops.
    pub fn current_key(&self) -> Option<StateKey> {
        self.handle.shared.current()
    }

    /// Handle to the current state, once started.
    pub fn current_state(&self) -> Result<CurrentState, MachineError> {
        match self.status() {
            MachineStatus::NotStarted => Err(MachineError::NotStarted),
            _ => Ok(CurrentState::new(self.clone())),
        }
    }

    pub fn history(&self) -> TransitionHistory {
        self.handle.shared.history()
    }

    /// Enter the root and descend through initial children to a leaf.
    pub async fn start(&self) -> Result<CurrentState, MachineError> {
        self.start_with(StartMode::Fresh(None)).await
    }

    /// Start by entering `key` directly, along with its ancestors.
    pub async fn start_at(&self, key: impl Into<StateKey>) -> Result<CurrentState, MachineError> {
        let key = key.into();
        if !self.tree().contains(&key) {
            return Err(MachineError::Start(StateError::UnknownState { key }));
        }
        self.start_with(StartMode::Fresh(Some(key))).await
    }

    /// Start from a checkpoint produced by [`TreeStateMachine::save`].
    ///
    /// The checkpoint is validated in full first; a bad checkpoint leaves
    /// the machine unstarted.
    pub async fn load(&self, checkpoint: &Checkpoint) -> Result<CurrentState, MachineError> {
        self.ensure_pending()?;
        let plan = restore_plan(self.tree(), checkpoint)?;
        self.resume(plan).await
    }

    /// Start from a plan already checked against this machine's tree.
    pub(crate) async fn resume(&self, plan: RestorePlan) -> Result<CurrentState, MachineError> {
        self.ensure_pending()?;
        self.start_with(StartMode::Restore(plan)).await
    }

    fn ensure_pending(&self) -> Result<(), MachineError> {
        if self.handle.pending.lock().is_some() {
            return Ok(());
        }
        Err(match self.status() {
            MachineStatus::Disposed => MachineError::Disposed,
            _ => MachineError::AlreadyStarted,
        })
    }

    async fn start_with(&self, mode: StartMode) -> Result<CurrentState, MachineError> {
        let pending = self.handle.pending.lock().take();
        let Some((core, receiver)) = pending else {
            self.ensure_pending()?;
            return Err(MachineError::AlreadyStarted);
        };
        spawn_core(&self.handle.shared, core, receiver);

        let (reply, started) = oneshot::channel();
        self.send(Command::Start { mode, reply })?;
        started.await.map_err(|_| self.closed_error())??;
        Ok(CurrentState::new(self.clone()))
    }

    /// Post a message and wait until it has been processed.
    pub async fn post<T: Any + Send + Sync>(&self, message: T) -> Result<ProcessResult, MachineError> {
        self.post_message(Message::new(message)).await
    }

    /// Post an already wrapped message and wait until it has been processed.
    ///
    /// Messages are processed one at a time, in the order they were posted.
    /// Under [`FailurePolicy::Propagate`] a failed dispatch is returned as
    /// [`MachineError::Dispatch`].
    pub async fn post_message(&self, message: Message) -> Result<ProcessResult, MachineError> {
        if let Some(error) = MachineError::not_running(self.status()) {
            return Err(error);
        }
        let (reply, processed) = oneshot::channel();
        self.send(Command::Post {
            message,
            reply: Some(reply),
        })?;
        let result = processed.await.map_err(|_| self.closed_error())??;
        match (&result, self.config().failure_policy) {
            (ProcessResult::Failed(failed), FailurePolicy::Propagate) => {
                Err(MachineError::Dispatch(failed.error.clone()))
            }
            _ => Ok(result),
        }
    }

    /// Save the active path and its data.
    pub async fn save(&self) -> Result<Checkpoint, PersistenceError> {
        if self.status() == MachineStatus::NotStarted {
            return Err(PersistenceError::NotStarted);
        }
        let (reply, saved) = oneshot::channel();
        self.handle
            .commands
            .send(Command::Save { reply })
            .map_err(|_| PersistenceError::Unavailable)?;
        saved.await.map_err(|_| PersistenceError::Unavailable)?
    }

    /// Exit every active state, leaf first, and shut down.
    pub async fn stop(&self) -> Result<(), MachineError> {
        if let status @ (MachineStatus::NotStarted | MachineStatus::Stopped | MachineStatus::Disposed) =
            self.status()
        {
            return Err(MachineError::not_running(status).unwrap_or(MachineError::NotStarted));
        }
        let (reply, stopped) = oneshot::channel();
        self.send(Command::Stop { reply })?;
        stopped.await.map_err(|_| self.closed_error())?
    }

    /// Shut down immediately without running exit handlers. Timers are
    /// cancelled, data is closed and every event stream completes.
    pub fn dispose(&self) {
        if let Some((mut core, _)) = self.handle.pending.lock().take() {
            core.dispose();
            return;
        }
        let shared = &self.handle.shared;
        if !matches!(shared.status(), MachineStatus::Stopped | MachineStatus::Disposed) {
            shared.set_status(MachineStatus::Disposed);
        }
        shared.close_events();
        let _ = self.handle.commands.send(Command::Dispose);
    }

    pub fn transitions(&self) -> broadcast::Receiver<TransitionRecord> {
        self.handle.shared.subscribe_transitions()
    }

    pub fn processed_messages(&self) -> broadcast::Receiver<ProcessResult> {
        self.handle.shared.subscribe_processed()
    }

    pub fn handled_messages(&self) -> broadcast::Receiver<HandledMessage> {
        self.handle.shared.subscribe_handled()
    }

    pub fn failed_messages(&self) -> broadcast::Receiver<FailedMessage> {
        self.handle.shared.subscribe_failed()
    }

    /// Read-only view of the data of the active state `key`. Data is
    /// changed only by the machine's own handlers.
    pub fn data_value<D: StateData>(&self, key: &DataStateKey<D>) -> Result<DataView<D>, DataError> {
        self.handle.shared.data_value(key).map(DataView::new)
    }

    /// Data of the deepest active state that carries a `D`.
    pub fn find_data_value<D: StateData>(&self) -> Result<DataView<D>, DataError> {
        self.handle.shared.find_data_value().map(DataView::new)
    }

    /// Stream of updates to the data of the active state `key`. The stream
    /// ends when the state is exited.
    pub fn data_stream<D: StateData>(&self, key: &DataStateKey<D>) -> Result<DataSubscription<D>, DataError> {
        self.data_value(key)?.subscribe()
    }

    fn send(&self, command: Command) -> Result<(), MachineError> {
        self.handle
            .commands
            .send(command)
            .map_err(|_| self.closed_error())
    }

    fn closed_error(&self) -> MachineError {
        MachineError::not_running(self.status()).unwrap_or(MachineError::Disposed)
    }
}

impl fmt::Debug for TreeStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeStateMachine")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("status", &self.status())
            .finish()
    }
}

/// Spawn the task that owns `core`, inside the machine's span and log sink.
fn spawn_core(shared: &MachineShared, core: MachineCore, commands: mpsc::UnboundedReceiver<Command>) {
    let config = &shared.config;
    let make_span = || info_span!("tree_state_machine", machine = %config.name, id = %shared.id);
    match &config.log_sink {
        Some(dispatch) => {
            let span = tracing::dispatcher::with_default(dispatch, make_span);
            tokio::spawn(core.run(commands).instrument(span).with_subscriber(dispatch.clone()));
        }
        None => {
            tokio::spawn(core.run(commands).instrument(make_span()));
        }
    }
}

/// View of a started machine's current state.
///
/// Returned by [`TreeStateMachine::start`]. It always reflects the latest
/// state, so it can be held for the machine's whole lifetime.
#[derive(Clone)]
pub struct CurrentState {
    machine: TreeStateMachine,
}

impl CurrentState {
    pub(crate) fn new(machine: TreeStateMachine) -> Self {
        Self { machine }
    }

    /// Key of the current leaf.
    pub fn key(&self) -> StateKey {
        self.machine
            .current_key()
            .unwrap_or_else(|| self.machine.tree().root_key().clone())
    }

    /// Whether `key` is the current leaf or one of its active ancestors.
    pub fn is_in_state(&self, key: impl Into<StateKey>) -> bool {
        let key = key.into();
        self.machine.handle.shared.active_keys().contains(&key)
    }

    /// Active states, root first.
    pub fn active_keys(&self) -> Vec<StateKey> {
        self.machine.handle.shared.active_keys()
    }

    pub fn status(&self) -> MachineStatus {
        self.machine.status()
    }

    pub async fn post<T: Any + Send + Sync>(&self, message: T) -> Result<ProcessResult, MachineError> {
        self.machine.post(message).await
    }

    pub async fn post_message(&self, message: Message) -> Result<ProcessResult, MachineError> {
        self.machine.post_message(message).await
    }

    pub fn data_value<D: StateData>(&self, key: &DataStateKey<D>) -> Result<DataView<D>, DataError> {
        self.machine.data_value(key)
    }

    pub fn find_data_value<D: StateData>(&self) -> Result<DataView<D>, DataError> {
        self.machine.find_data_value()
    }

    pub fn machine(&self) -> &TreeStateMachine {
        &self.machine
    }
}

impl fmt::Debug for CurrentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrentState")
            .field("machine", &self.machine.id())
            .field("key", &self.key())
            .finish()
    }
}
