// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::Serialize;
use std::fmt::{Display, Formatter};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

/// Why a protocol left the active state without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeactivationReason {
    /// A caller asked for it.
    Explicit,
    /// A situation update no longer satisfies the activation conditions.
    ConditionsLapsed,
    /// The definition was replaced and none of the active steps exist in the new one.
    DefinitionChanged,
}

impl DeactivationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeactivationReason::Explicit => "explicit",
            DeactivationReason::ConditionsLapsed => "conditions_lapsed",
            DeactivationReason::DefinitionChanged => "definition_changed",
        }
    }
}

impl Display for DeactivationReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle event broadcast by the engine.
///
/// Serializes with an `event` tag, e.g.
/// `{"event":"step_executed","protocol_id":"p","step_id":"a","complete":true}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    ProtocolLoaded {
        id: String,
        name: String,
    },
    ProtocolActivated {
        id: String,
        entry_step_id: String,
    },
    StepExecuted {
        protocol_id: String,
        step_id: String,
        complete: bool,
    },
    StepExecutionFailed {
        protocol_id: String,
        step_id: String,
        error: String,
    },
    /// The executor did not recognise the step's action; the step carried on as a no-op.
    ActionNotFound {
        protocol_id: String,
        step_id: String,
        action: String,
    },
    ProtocolCompleted {
        id: String,
    },
    ProtocolDeactivated {
        id: String,
        reason: DeactivationReason,
    },
}

impl EngineEvent {
    pub fn protocol_id(&self) -> &str {
        match self {
            EngineEvent::ProtocolLoaded { id, .. }
            | EngineEvent::ProtocolActivated { id, .. }
            | EngineEvent::ProtocolCompleted { id }
            | EngineEvent::ProtocolDeactivated { id, .. } => id,
            EngineEvent::StepExecuted { protocol_id, .. }
            | EngineEvent::StepExecutionFailed { protocol_id, .. }
            | EngineEvent::ActionNotFound { protocol_id, .. } => protocol_id,
        }
    }
}

/// Outbound event channel.
///
/// Backed by a bounded `broadcast` channel: every subscriber sees every event
/// sent after it subscribed, and a subscriber that falls more than the channel
/// capacity behind skips the oldest events. Emitting with no subscribers is not
/// an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Send an event, returning how many subscribers received it.
    pub fn emit(&self, event: EngineEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

/// Take every event currently buffered for `receiver` without waiting.
///
/// Lagged gaps are skipped; the events still buffered after the gap are returned.
pub fn drain_events(receiver: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event subscriber lagged; oldest events dropped");
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
    events
}
