//! Interceptors wrapped around a state's handlers.

use super::TreeState;
use crate::core::StateError;
use crate::engine::{MessageContext, MessageResult, TransitionContext, TransitionPhase};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::sync::Arc;

/// Intercepts the handlers of the state it is attached to.
///
/// Filters form an onion around the state: the first filter registered is
/// the outermost. Each method receives the continuation for the rest of
/// the chain and decides whether to run it. Skipping `next` short-circuits
/// the state's own handler.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use treestate::descriptor::{NextMessage, TreeStateFilter};
/// use treestate::engine::{MessageContext, MessageResult};
/// use treestate::StateError;
///
/// struct Maintenance;
///
/// struct DropDuringMaintenance;
///
/// #[async_trait]
/// impl TreeStateFilter for DropDuringMaintenance {
///     async fn on_message(
///         &self,
///         ctx: &mut MessageContext<'_>,
///         next: NextMessage<'_>,
///     ) -> Result<MessageResult, StateError> {
///         if ctx.message_as::<Maintenance>().is_some() {
///             return Ok(MessageResult::Stay);
///         }
///         next.run(ctx).await
///     }
/// }
/// ```
#[async_trait]
pub trait TreeStateFilter: Send + Sync {
    async fn on_message(
        &self,
        ctx: &mut MessageContext<'_>,
        next: NextMessage<'_>,
    ) -> Result<MessageResult, StateError> {
        next.run(ctx).await
    }

    async fn on_enter(
        &self,
        ctx: &mut TransitionContext<'_>,
        next: NextTransition<'_>,
    ) -> Result<(), StateError> {
        next.run(ctx).await
    }

    async fn on_exit(
        &self,
        ctx: &mut TransitionContext<'_>,
        next: NextTransition<'_>,
    ) -> Result<(), StateError> {
        next.run(ctx).await
    }
}

/// Continuation for the remainder of a message filter chain.
pub struct NextMessage<'a> {
    filters: &'a [Arc<dyn TreeStateFilter>],
    state: &'a mut dyn TreeState,
}

impl<'a> NextMessage<'a> {
    pub(crate) fn new(filters: &'a [Arc<dyn TreeStateFilter>], state: &'a mut dyn TreeState) -> Self {
        Self { filters, state }
    }

    /// Run the next filter, or the state's handler when none remain.
    pub fn run<'c, 'x>(
        self,
        ctx: &'c mut MessageContext<'x>,
    ) -> BoxFuture<'c, Result<MessageResult, StateError>>
    where
        'a: 'c,
    {
        Box::pin(async move {
            match self.filters.split_first() {
                Some((filter, rest)) => filter.on_message(ctx, NextMessage::new(rest, self.state)).await,
                None => self.state.on_message(ctx).await,
            }
        })
    }
}

/// Continuation for the remainder of an enter or exit filter chain.
pub struct NextTransition<'a> {
    filters: &'a [Arc<dyn TreeStateFilter>],
    state: &'a mut dyn TreeState,
    phase: TransitionPhase,
}

impl<'a> NextTransition<'a> {
    pub(crate) fn new(
        filters: &'a [Arc<dyn TreeStateFilter>],
        state: &'a mut dyn TreeState,
        phase: TransitionPhase,
    ) -> Self {
        Self {
            filters,
            state,
            phase,
        }
    }

    pub fn phase(&self) -> TransitionPhase {
        self.phase
    }

    /// Run the next filter, or the state's handler when none remain.
    pub fn run<'c, 'x>(self, ctx: &'c mut TransitionContext<'x>) -> BoxFuture<'c, Result<(), StateError>>
    where
        'a: 'c,
    {
        Box::pin(async move {
            let phase = self.phase;
            match self.filters.split_first() {
                Some((filter, rest)) => {
                    let next = NextTransition::new(rest, self.state, phase);
                    match phase {
                        TransitionPhase::Enter => filter.on_enter(ctx, next).await,
                        TransitionPhase::Exit => filter.on_exit(ctx, next).await,
                    }
                }
                None => match phase {
                    TransitionPhase::Enter => self.state.on_enter(ctx).await,
                    TransitionPhase::Exit => self.state.on_exit(ctx).await,
                },
            }
        })
    }
}
