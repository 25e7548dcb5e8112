// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for step execution.
//!
//! This module contains message types for logging events related to:
//! * Step execution lifecycle (start, completion, failure)
//! * Unknown actions
//! * Retry attempts

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// Step execution started.
///
/// # Log Level
/// `debug!` - Fires for every step execution
pub struct StepExecutionStarted<'a> {
    pub protocol_id: &'a str,
    pub step_id: &'a str,
    pub action: &'a str,
}

impl Display for StepExecutionStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Step '{}' of protocol '{}' started: action={}",
            self.step_id, self.protocol_id, self.action
        )
    }
}

impl StructuredLog for StepExecutionStarted<'_> {
    fn log(&self) {
        tracing::debug!(
            protocol_id = self.protocol_id,
            step_id = self.step_id,
            action = self.action,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "step",
            span_name = name,
            protocol_id = self.protocol_id,
            step_id = self.step_id,
            action = self.action,
        )
    }
}

/// Step execution finished (successfully or with an unknown action).
///
/// # Log Level
/// `debug!` - Fires for every step execution
///
/// # Example
/// ```
/// use tactical_protocols::observability::messages::step::StepExecutionCompleted;
/// use std::time::Duration;
///
/// let msg = StepExecutionCompleted {
///     protocol_id: "perimeter_watch",
///     step_id: "survey_area",
///     complete: false,
///     duration: Duration::from_millis(12),
/// };
///
/// assert_eq!(
///     msg.to_string(),
///     "Step 'survey_area' of protocol 'perimeter_watch' executed: complete=false, duration=12ms"
/// );
/// ```
pub struct StepExecutionCompleted<'a> {
    pub protocol_id: &'a str,
    pub step_id: &'a str,
    pub complete: bool,
    pub duration: Duration,
}

impl Display for StepExecutionCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Step '{}' of protocol '{}' executed: complete={}, duration={:?}",
            self.step_id, self.protocol_id, self.complete, self.duration
        )
    }
}

impl StructuredLog for StepExecutionCompleted<'_> {
    fn log(&self) {
        tracing::debug!(
            protocol_id = self.protocol_id,
            step_id = self.step_id,
            complete = self.complete,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "step_completed",
            span_name = name,
            protocol_id = self.protocol_id,
            step_id = self.step_id,
            complete = self.complete,
        )
    }
}

/// Step action failed; the step stays active.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct StepExecutionFailed<'a> {
    pub protocol_id: &'a str,
    pub step_id: &'a str,
    pub attempts: u32,
    pub error: &'a dyn std::error::Error,
}

impl Display for StepExecutionFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Step '{}' of protocol '{}' failed after {} attempt(s): {}",
            self.step_id, self.protocol_id, self.attempts, self.error
        )
    }
}

impl StructuredLog for StepExecutionFailed<'_> {
    fn log(&self) {
        tracing::error!(
            protocol_id = self.protocol_id,
            step_id = self.step_id,
            attempts = self.attempts,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "step_failed",
            span_name = name,
            protocol_id = self.protocol_id,
            step_id = self.step_id,
            error = %self.error,
        )
    }
}

/// The action executor does not know a step's action; treated as a no-op.
///
/// # Log Level
/// `warn!` - Likely a typo in the protocol definition
pub struct ActionNotFound<'a> {
    pub protocol_id: &'a str,
    pub step_id: &'a str,
    pub action: &'a str,
    pub executor: &'a str,
}

impl Display for ActionNotFound<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Action '{}' of step '{}' in protocol '{}' is unknown to executor '{}'; treating as no-op",
            self.action, self.step_id, self.protocol_id, self.executor
        )
    }
}

impl StructuredLog for ActionNotFound<'_> {
    fn log(&self) {
        tracing::warn!(
            protocol_id = self.protocol_id,
            step_id = self.step_id,
            action = self.action,
            executor = self.executor,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "action_not_found",
            span_name = name,
            protocol_id = self.protocol_id,
            action = self.action,
        )
    }
}

/// A failed action is about to be retried.
///
/// # Log Level
/// `warn!` - Transient failure being handled
pub struct StepRetryScheduled<'a> {
    pub protocol_id: &'a str,
    pub step_id: &'a str,
    pub attempt: u32,
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Display for StepRetryScheduled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Retrying step '{}' of protocol '{}' ({}/{}) after {:?}",
            self.step_id, self.protocol_id, self.attempt, self.max_attempts, self.backoff
        )
    }
}

impl StructuredLog for StepRetryScheduled<'_> {
    fn log(&self) {
        tracing::warn!(
            protocol_id = self.protocol_id,
            step_id = self.step_id,
            attempt = self.attempt,
            max_attempts = self.max_attempts,
            backoff_ms = self.backoff.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "step_retry",
            span_name = name,
            protocol_id = self.protocol_id,
            step_id = self.step_id,
            attempt = self.attempt,
        )
    }
}
