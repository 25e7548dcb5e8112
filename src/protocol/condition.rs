// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Conditions and their evaluation.
//!
//! A [`Condition`] is a predicate over a [`Context`] snapshot. The same type gates
//! protocol activation and decides step completion. Evaluation is a total
//! function: absent values, mismatched types, and unknown kinds or operators all
//! evaluate to `false` instead of failing, so a single malformed condition can
//! never abort the evaluation of the set it belongs to.
//!
//! # Example
//! ```
//! use tactical_protocols::protocol::{Condition, ConditionOperator, Context};
//!
//! let red_alert = Condition::tactical(ConditionOperator::Equals, "red");
//!
//! assert!(red_alert.evaluate(&Context::new().with("tactical", "red")));
//! assert!(!red_alert.evaluate(&Context::new().with("tactical", "green")));
//! ```

use crate::protocol::{Context, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

/// Which projection of the context a condition reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    Environmental,
    Tactical,
    /// Current wall-clock time in Unix epoch milliseconds. Never read from the context.
    Temporal,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    #[serde(alias = "greater", alias = "greaterThan")]
    GreaterThan,
    #[serde(alias = "less", alias = "lessThan")]
    LessThan,
    Contains,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(alias = "type")]
    pub kind: ConditionKind,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(kind: ConditionKind, operator: ConditionOperator, value: impl Into<Value>) -> Self {
        Self {
            kind,
            operator,
            value: value.into(),
        }
    }

    pub fn environmental(operator: ConditionOperator, value: impl Into<Value>) -> Self {
        Self::new(ConditionKind::Environmental, operator, value)
    }

    pub fn tactical(operator: ConditionOperator, value: impl Into<Value>) -> Self {
        Self::new(ConditionKind::Tactical, operator, value)
    }

    pub fn temporal(operator: ConditionOperator, value: impl Into<Value>) -> Self {
        Self::new(ConditionKind::Temporal, operator, value)
    }

    /// Evaluate against `context` using the current wall-clock time.
    pub fn evaluate(&self, context: &Context) -> bool {
        self.evaluate_at(context, now_millis())
    }

    /// Evaluate against `context` with `now_ms` standing in for the temporal projection.
    pub fn evaluate_at(&self, context: &Context, now_ms: f64) -> bool {
        let now = Value::Number(now_ms);
        let actual = match self.kind {
            ConditionKind::Environmental => context.environmental(),
            ConditionKind::Tactical => context.tactical(),
            ConditionKind::Temporal => Some(&now),
            ConditionKind::Unknown => None,
        };

        let Some(actual) = actual else {
            return false;
        };

        match self.operator {
            ConditionOperator::Equals => *actual == self.value,
            ConditionOperator::GreaterThan => actual.compare(&self.value) == Some(Ordering::Greater),
            ConditionOperator::LessThan => actual.compare(&self.value) == Some(Ordering::Less),
            ConditionOperator::Contains => actual
                .as_list()
                .map(|items| items.contains(&self.value))
                .unwrap_or(false),
            ConditionOperator::Unknown => false,
        }
    }
}

/// True when every condition holds. An empty set holds vacuously.
pub fn all_hold(conditions: &[Condition], context: &Context) -> bool {
    let now = now_millis();
    conditions.iter().all(|c| c.evaluate_at(context, now))
}

/// Milliseconds since the Unix epoch; zero if the clock reads before the epoch.
pub fn now_millis() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or(0.0)
}
