// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for protocol lifecycle events.
//!
//! This module contains message types for logging events related to:
//! * Protocol loading and replacement
//! * Activation, completion and deactivation
//! * Re-evaluation rounds triggered by situation updates
//! * Results discarded because the protocol moved on

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Protocol admitted to the registry.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ProtocolLoaded<'a> {
    pub protocol_id: &'a str,
    pub name: &'a str,
    pub step_count: usize,
    pub replaced: bool,
}

impl Display for ProtocolLoaded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let verb = if self.replaced { "replaced" } else { "loaded" };
        write!(
            f,
            "Protocol '{}' ({}) {} with {} steps",
            self.protocol_id, self.name, verb, self.step_count
        )
    }
}

impl StructuredLog for ProtocolLoaded<'_> {
    fn log(&self) {
        tracing::info!(
            protocol_id = self.protocol_id,
            name = self.name,
            step_count = self.step_count,
            replaced = self.replaced,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "protocol_loaded",
            span_name = name,
            protocol_id = self.protocol_id,
            step_count = self.step_count,
        )
    }
}

/// Protocol activated and seeded with its entry step.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use tactical_protocols::observability::messages::engine::ProtocolActivated;
///
/// let msg = ProtocolActivated {
///     protocol_id: "perimeter_watch",
///     entry_step_id: "mark_rally_point",
///     restarted: false,
/// };
///
/// assert_eq!(
///     msg.to_string(),
///     "Protocol 'perimeter_watch' activated at entry step 'mark_rally_point'"
/// );
/// ```
pub struct ProtocolActivated<'a> {
    pub protocol_id: &'a str,
    pub entry_step_id: &'a str,
    pub restarted: bool,
}

impl Display for ProtocolActivated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let verb = if self.restarted { "restarted" } else { "activated" };
        write!(
            f,
            "Protocol '{}' {} at entry step '{}'",
            self.protocol_id, verb, self.entry_step_id
        )
    }
}

impl StructuredLog for ProtocolActivated<'_> {
    fn log(&self) {
        tracing::info!(
            protocol_id = self.protocol_id,
            entry_step_id = self.entry_step_id,
            restarted = self.restarted,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "activation",
            span_name = name,
            protocol_id = self.protocol_id,
            entry_step_id = self.entry_step_id,
        )
    }
}

/// Activation refused: unknown protocol or unmet conditions.
///
/// # Log Level
/// `warn!` - Caller error, no state changed
pub struct ActivationRejected<'a> {
    pub protocol_id: &'a str,
    pub reason: &'a dyn std::error::Error,
}

impl Display for ActivationRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Activation of protocol '{}' rejected: {}",
            self.protocol_id, self.reason
        )
    }
}

impl StructuredLog for ActivationRejected<'_> {
    fn log(&self) {
        tracing::warn!(
            protocol_id = self.protocol_id,
            reason = %self.reason,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "activation_rejected",
            span_name = name,
            protocol_id = self.protocol_id,
        )
    }
}

/// Active set drained: every path through the protocol finished.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ProtocolCompleted<'a> {
    pub protocol_id: &'a str,
}

impl Display for ProtocolCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Protocol '{}' completed", self.protocol_id)
    }
}

impl StructuredLog for ProtocolCompleted<'_> {
    fn log(&self) {
        tracing::info!(protocol_id = self.protocol_id, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "protocol_completed",
            span_name = name,
            protocol_id = self.protocol_id,
        )
    }
}

/// Protocol deactivated, explicitly or because re-evaluation said so.
///
/// # Log Level
/// `info!` - Important operational event
pub struct ProtocolDeactivated<'a> {
    pub protocol_id: &'a str,
    pub reason: &'a str,
    pub was_active: bool,
}

impl Display for ProtocolDeactivated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Protocol '{}' deactivated ({})",
            self.protocol_id, self.reason
        )?;
        if !self.was_active {
            write!(f, "; it was not active")?;
        }
        Ok(())
    }
}

impl StructuredLog for ProtocolDeactivated<'_> {
    fn log(&self) {
        tracing::info!(
            protocol_id = self.protocol_id,
            reason = self.reason,
            was_active = self.was_active,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "protocol_deactivated",
            span_name = name,
            protocol_id = self.protocol_id,
            reason = self.reason,
        )
    }
}

/// Situation update received; re-evaluating active protocols.
///
/// # Log Level
/// `debug!` - Fires on every update
pub struct ReevaluationStarted {
    pub active_protocols: usize,
    pub payload_keys: usize,
}

impl Display for ReevaluationStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Situation update: re-evaluating {} active protocols ({} payload keys)",
            self.active_protocols, self.payload_keys
        )
    }
}

impl StructuredLog for ReevaluationStarted {
    fn log(&self) {
        tracing::debug!(
            active_protocols = self.active_protocols,
            payload_keys = self.payload_keys,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "reevaluation",
            span_name = name,
            active_protocols = self.active_protocols,
        )
    }
}

/// A step finished after its protocol was deactivated or restarted; its result is dropped.
///
/// # Log Level
/// `debug!` - Expected under concurrent deactivation
pub struct StaleResultDiscarded<'a> {
    pub protocol_id: &'a str,
    pub step_id: &'a str,
}

impl Display for StaleResultDiscarded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Discarding result of step '{}': protocol '{}' is no longer in the activation it ran under",
            self.step_id, self.protocol_id
        )
    }
}

impl StructuredLog for StaleResultDiscarded<'_> {
    fn log(&self) {
        tracing::debug!(
            protocol_id = self.protocol_id,
            step_id = self.step_id,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "stale_result",
            span_name = name,
            protocol_id = self.protocol_id,
            step_id = self.step_id,
        )
    }
}

/// A step re-entered through a cycle waits for the next re-evaluation round.
///
/// # Log Level
/// `debug!` - Normal for looping protocols
pub struct StepDeferred<'a> {
    pub protocol_id: &'a str,
    pub step_id: &'a str,
}

impl Display for StepDeferred<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Step '{}' of protocol '{}' already ran this round; deferred to the next situation update",
            self.step_id, self.protocol_id
        )
    }
}

impl StructuredLog for StepDeferred<'_> {
    fn log(&self) {
        tracing::debug!(
            protocol_id = self.protocol_id,
            step_id = self.step_id,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "step_deferred",
            span_name = name,
            protocol_id = self.protocol_id,
            step_id = self.step_id,
        )
    }
}
