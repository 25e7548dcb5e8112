// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::protocol::{Condition, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Named arguments handed to the action executor with a step's action.
pub type Parameters = BTreeMap<String, Value>;

/// Classification of a protocol. Informational only; the engine treats all kinds alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    #[default]
    Standard,
    Emergency,
    Custom,
}

/// A unit of work inside a protocol.
///
/// # Example
/// ```yaml
/// id: mark_rally_point
/// action: mark_location
/// parameters:
///   position: [51.5, -0.12]
/// next_step_ids: [notify]
/// completion_conditions:
///   - { kind: tactical, operator: equals, value: secured }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub action: String,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default, alias = "next_steps")]
    pub next_step_ids: Vec<String>,
    /// Empty means the step completes after a single execution.
    #[serde(default, alias = "completion_criteria")]
    pub completion_conditions: Vec<Condition>,
}

impl Step {
    pub fn new(id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action: action.into(),
            parameters: Parameters::new(),
            next_step_ids: Vec::new(),
            completion_conditions: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn then<I, S>(mut self, next: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.next_step_ids.extend(next.into_iter().map(Into::into));
        self
    }

    pub fn completes_when(mut self, condition: Condition) -> Self {
        self.completion_conditions.push(condition);
        self
    }
}

/// A directed graph of steps plus the conditions under which it may run.
///
/// The first step is the entry step. Cycles between steps are allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    pub id: String,
    pub name: String,
    #[serde(default, alias = "type")]
    pub kind: ProtocolKind,
    pub steps: Vec<Step>,
    #[serde(default, alias = "conditions")]
    pub activation_conditions: Vec<Condition>,
}

impl Protocol {
    pub fn new(id: impl Into<String>, name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: ProtocolKind::default(),
            steps,
            activation_conditions: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: ProtocolKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn activated_when(mut self, condition: Condition) -> Self {
        self.activation_conditions.push(condition);
        self
    }

    pub fn entry_step(&self) -> Option<&Step> {
        self.steps.first()
    }

    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn has_step(&self, step_id: &str) -> bool {
        self.step(step_id).is_some()
    }

    /// Whether `to` can be reached from `from` by following `next_step_ids`.
    /// A step always reaches itself.
    pub fn reaches(&self, from: &str, to: &str) -> bool {
        let mut seen = HashSet::new();
        let mut pending = vec![from];
        while let Some(step_id) = pending.pop() {
            if step_id == to {
                return true;
            }
            if !seen.insert(step_id) {
                continue;
            }
            if let Some(step) = self.step(step_id) {
                pending.extend(step.next_step_ids.iter().map(String::as_str));
            }
        }
        false
    }
}
