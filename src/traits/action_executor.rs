// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::errors::ActionError;
use crate::protocol::{Context, Parameters};

/// Capability that performs the side-effecting work a step names.
///
/// The engine calls `execute` from parallel sibling step executions, so
/// implementations must tolerate concurrent invocation.
///
/// Implementations report an action they do not recognise with
/// [`ActionError::ActionNotFound`]; the engine logs it and carries on as if the
/// action were a no-op. Any other failure is [`ActionError::ExecutionFailed`],
/// which (after any configured retries) leaves the step active until the next
/// re-evaluation.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(
        &self,
        action: &str,
        parameters: &Parameters,
        context: &Context,
    ) -> Result<(), ActionError>;

    fn name(&self) -> &'static str;
}
