// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;
use std::time::Instant;

use crate::config::RetryConfig;
use crate::errors::ActionError;
use crate::observability::messages::step::{
    ActionNotFound, StepExecutionCompleted, StepExecutionFailed, StepExecutionStarted,
    StepRetryScheduled,
};
use crate::observability::messages::StructuredLog;
use crate::protocol::{all_hold, Context, Protocol, Step};
use crate::traits::ActionExecutor;

/// Outcome of running one step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub step_id: String,
    /// The action succeeded (or was unknown) and every completion condition held.
    pub complete: bool,
    pub error: Option<ActionError>,
}

impl StepResult {
    /// Whether the action itself failed, as opposed to being unknown.
    pub fn failed(&self) -> bool {
        matches!(self.error, Some(ActionError::ExecutionFailed(_)))
    }
}

/// Runs a step's action and decides whether the step is complete.
///
/// An unknown action is logged and treated as a no-op, so completion is still
/// evaluated. An action that fails is retried according to [`RetryConfig`];
/// once attempts are exhausted the step is reported as incomplete with the error.
pub struct StepExecutor {
    executor: Arc<dyn ActionExecutor>,
    retry: RetryConfig,
}

impl StepExecutor {
    pub fn new(executor: Arc<dyn ActionExecutor>, retry: RetryConfig) -> Self {
        Self { executor, retry }
    }

    pub async fn run(&self, protocol: &Protocol, step: &Step, context: &Context) -> StepResult {
        StepExecutionStarted {
            protocol_id: &protocol.id,
            step_id: &step.id,
            action: &step.action,
        }
        .log();

        let started = Instant::now();
        let max_retries = self.retry.get_max_attempts();
        let mut attempt: u32 = 0;

        let error = loop {
            attempt += 1;
            match self
                .executor
                .execute(&step.action, &step.parameters, context)
                .await
            {
                Ok(()) => break None,
                Err(error) if error.is_not_found() => {
                    ActionNotFound {
                        protocol_id: &protocol.id,
                        step_id: &step.id,
                        action: &step.action,
                        executor: self.executor.name(),
                    }
                    .log();
                    break Some(error);
                }
                Err(error) if attempt <= max_retries => {
                    let backoff = self.retry.get_backoff();
                    StepRetryScheduled {
                        protocol_id: &protocol.id,
                        step_id: &step.id,
                        attempt,
                        max_attempts: max_retries,
                        backoff,
                    }
                    .log();
                    tracing::debug!(error = %error, "Retryable action failure");
                    tokio::time::sleep(backoff).await;
                }
                Err(error) => {
                    StepExecutionFailed {
                        protocol_id: &protocol.id,
                        step_id: &step.id,
                        attempts: attempt,
                        error: &error,
                    }
                    .log();
                    return StepResult {
                        step_id: step.id.clone(),
                        complete: false,
                        error: Some(error),
                    };
                }
            }
        };

        let complete = all_hold(&step.completion_conditions, context);
        StepExecutionCompleted {
            protocol_id: &protocol.id,
            step_id: &step.id,
            complete,
            duration: started.elapsed(),
        }
        .log();

        StepResult {
            step_id: step.id.clone(),
            complete,
            error,
        }
    }
}
