// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Outcome of a failed action invocation, as reported by an [`ActionExecutor`].
///
/// [`ActionExecutor`]: crate::traits::ActionExecutor
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    /// The executor does not know the action. Treated as a no-op by the engine.
    #[error("Unknown action '{0}'")]
    ActionNotFound(String),

    /// The action ran and failed. The step stays active.
    #[error("Action execution failed: {0}")]
    ExecutionFailed(String),
}

impl ActionError {
    pub fn execution(message: impl Into<String>) -> Self {
        ActionError::ExecutionFailed(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ActionError::ActionNotFound(_))
    }
}
