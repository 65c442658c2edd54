//! State behaviors: the handlers run when a state is entered, receives a
//! message, or exits.

use crate::core::StateError;
use crate::engine::{MessageContext, MessageResult, TransitionContext};
use async_trait::async_trait;
use std::sync::Arc;

/// Handlers for a single state.
///
/// A fresh behavior instance is created each time its state is entered and
/// dropped when the state exits, so fields on the implementing type live
/// exactly as long as the state is active.
///
/// Every handler defaults to a no-op; `on_message` defaults to
/// [`MessageResult::Unhandled`] so the message bubbles to the parent state.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use treestate::descriptor::TreeState;
/// use treestate::engine::{MessageContext, MessageResult};
/// use treestate::StateError;
///
/// struct Push;
///
/// #[derive(Default)]
/// struct Locked { pushes: u32 }
///
/// #[async_trait]
/// impl TreeState for Locked {
///     async fn on_message(
///         &mut self,
///         ctx: &mut MessageContext<'_>,
///     ) -> Result<MessageResult, StateError> {
///         if ctx.message_as::<Push>().is_some() {
///             self.pushes += 1;
///             return Ok(ctx.stay());
///         }
///         Ok(ctx.unhandled())
///     }
/// }
/// ```
#[async_trait]
pub trait TreeState: Send {
    async fn on_enter(&mut self, _ctx: &mut TransitionContext<'_>) -> Result<(), StateError> {
        Ok(())
    }

    async fn on_message(
        &mut self,
        _ctx: &mut MessageContext<'_>,
    ) -> Result<MessageResult, StateError> {
        Ok(MessageResult::Unhandled)
    }

    async fn on_exit(&mut self, _ctx: &mut TransitionContext<'_>) -> Result<(), StateError> {
        Ok(())
    }
}

/// Creates a behavior instance each time its state is entered.
pub type StateFactory = Arc<dyn Fn() -> Box<dyn TreeState> + Send + Sync>;

/// Behavior of a state declared without handlers.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyState;

#[async_trait]
impl TreeState for EmptyState {}

type TransitionFn =
    Arc<dyn Fn(&mut TransitionContext<'_>) -> Result<(), StateError> + Send + Sync>;
type MessageFn =
    Arc<dyn Fn(&mut MessageContext<'_>) -> Result<MessageResult, StateError> + Send + Sync>;

/// Behavior composed from synchronous closures.
///
/// Useful for states whose handlers need no state of their own between
/// calls. Anything kept across messages belongs in the state's data.
///
/// ```rust
/// use treestate::descriptor::StateBehavior;
///
/// struct Coin;
///
/// let locked = StateBehavior::new().on_message(|ctx| {
///     if ctx.message_as::<Coin>().is_some() {
///         return Ok(ctx.go_to("unlocked"));
///     }
///     Ok(ctx.unhandled())
/// });
/// ```
#[derive(Clone, Default)]
pub struct StateBehavior {
    enter: Option<TransitionFn>,
    message: Option<MessageFn>,
    exit: Option<TransitionFn>,
}

impl StateBehavior {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_enter<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut TransitionContext<'_>) -> Result<(), StateError> + Send + Sync + 'static,
    {
        self.enter = Some(Arc::new(f));
        self
    }

    pub fn on_message<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut MessageContext<'_>) -> Result<MessageResult, StateError>
            + Send
            + Sync
            + 'static,
    {
        self.message = Some(Arc::new(f));
        self
    }

    pub fn on_exit<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut TransitionContext<'_>) -> Result<(), StateError> + Send + Sync + 'static,
    {
        self.exit = Some(Arc::new(f));
        self
    }

    pub(crate) fn into_factory(self) -> StateFactory {
        Arc::new(move || Box::new(self.clone()) as Box<dyn TreeState>)
    }
}

#[async_trait]
impl TreeState for StateBehavior {
    async fn on_enter(&mut self, ctx: &mut TransitionContext<'_>) -> Result<(), StateError> {
        match &self.enter {
            Some(enter) => enter(ctx),
            None => Ok(()),
        }
    }

    async fn on_message(
        &mut self,
        ctx: &mut MessageContext<'_>,
    ) -> Result<MessageResult, StateError> {
        match &self.message {
            Some(message) => message(ctx),
            None => Ok(MessageResult::Unhandled),
        }
    }

    async fn on_exit(&mut self, ctx: &mut TransitionContext<'_>) -> Result<(), StateError> {
        match &self.exit {
            Some(exit) => exit(ctx),
            None => Ok(()),
        }
    }
}

pub(crate) fn factory_of<S, F>(f: F) -> StateFactory
where
    S: TreeState + 'static,
    F: Fn() -> S + Send + Sync + 'static,
{
    Arc::new(move || Box::new(f()) as Box<dyn TreeState>)
}
