//! Message dispatch from the current leaf toward the root.

use super::core::MachineCore;
use super::request::MessageResult;
use super::result::{FailedMessage, HandledMessage, ProcessResult, UnhandledMessage};
use crate::core::{Message, StateError, StateKey};
use tracing::trace;

impl MachineCore {
    /// Offer `message` to the current leaf, then to each ancestor, until a
    /// handler accepts it.
    pub(crate) async fn dispatch(&mut self, message: Message) -> ProcessResult {
        let Some(leaf) = self.current else {
            return ProcessResult::Failed(FailedMessage {
                receiving: self.key(self.tree.root()),
                error: StateError::msg("machine has no current state"),
                message,
            });
        };
        let receiving = self.key(leaf);
        let mut notified = Vec::new();
        let mut node = Some(leaf);

        while let Some(id) = node {
            let handling = self.key(id);
            trace!(state = %handling, message = message.type_name(), "offering message");
            notified.push(handling.clone());

            match self.run_message_handler(id, leaf, &message).await {
                Ok(MessageResult::Unhandled) => node = self.tree.parent(id),
                Ok(MessageResult::Stay) => {
                    return ProcessResult::Handled(HandledMessage {
                        message,
                        receiving,
                        handling,
                        transition: None,
                    });
                }
                Ok(MessageResult::GoTo(request)) => {
                    return match self.transition(leaf, request).await {
                        Ok(record) => ProcessResult::Handled(HandledMessage {
                            message,
                            receiving,
                            handling,
                            transition: Some(record),
                        }),
                        Err(error) => failed(message, receiving, error),
                    };
                }
                Err(error) => return failed(message, receiving, error),
            }
        }

        ProcessResult::Unhandled(UnhandledMessage {
            message,
            receiving,
            notified,
        })
    }
}

fn failed(message: Message, receiving: StateKey, error: StateError) -> ProcessResult {
    ProcessResult::Failed(FailedMessage {
        message,
        receiving,
        error,
    })
}
