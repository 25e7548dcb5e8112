// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for protocol validation.
//!
//! This module contains message types for logging events related to:
//! * Protocols rejected at load time
//! * Re-entrant loops found in an admitted protocol

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Protocol refused by the validator.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct ProtocolRejected<'a> {
    pub protocol_id: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for ProtocolRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Protocol '{}' rejected: {}", self.protocol_id, self.error)
    }
}

impl StructuredLog for ProtocolRejected<'_> {
    fn log(&self) {
        tracing::error!(
            protocol_id = self.protocol_id,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "protocol_rejected",
            span_name = name,
            protocol_id = self.protocol_id,
        )
    }
}

/// Loop found in the step graph. Legal, but loops only advance once per situation update.
///
/// # Log Level
/// `info!` - Worth knowing when reading a protocol's behaviour
///
/// # Example
/// ```
/// use tactical_protocols::observability::messages::validation::StepCycleDetected;
///
/// let cycle = vec!["scan".to_string(), "report".to_string(), "scan".to_string()];
/// let msg = StepCycleDetected {
///     protocol_id: "watch",
///     cycle: &cycle,
/// };
///
/// assert_eq!(
///     msg.to_string(),
///     "Protocol 'watch' contains a step cycle: scan -> report -> scan"
/// );
/// ```
pub struct StepCycleDetected<'a> {
    pub protocol_id: &'a str,
    pub cycle: &'a [String],
}

impl Display for StepCycleDetected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Protocol '{}' contains a step cycle: {}",
            self.protocol_id,
            self.cycle.join(" -> ")
        )
    }
}

impl StructuredLog for StepCycleDetected<'_> {
    fn log(&self) {
        tracing::info!(
            protocol_id = self.protocol_id,
            cycle = %self.cycle.join(" -> "),
            cycle_length = self.cycle.len(),
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::span!(
            tracing::Level::INFO,
            "step_cycle",
            span_name = name,
            protocol_id = self.protocol_id,
            cycle_length = self.cycle.len(),
        )
    }
}
