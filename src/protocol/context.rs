// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::protocol::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Context key holding environmental readings (weather, terrain, ...).
pub const ENVIRONMENTAL_KEY: &str = "environmental";
/// Context key holding the tactical picture (alert level, unit status, ...).
pub const TACTICAL_KEY: &str = "tactical";
/// Context key the engine fills with the active step ids during re-evaluation.
pub const ACTIVE_STEPS_KEY: &str = "active_steps";

/// Caller-supplied situational data.
///
/// The engine treats the bag as opaque apart from the `environmental` and
/// `tactical` projections used by condition evaluation. It is handed unchanged
/// to the action executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(BTreeMap<String, Value>);

impl Context {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn environmental(&self) -> Option<&Value> {
        self.get(ENVIRONMENTAL_KEY)
    }

    pub fn tactical(&self) -> Option<&Value> {
        self.get(TACTICAL_KEY)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Copy of this context annotated with the currently active step ids.
    pub fn with_active_steps<'a, I>(&self, step_ids: I) -> Context
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut merged = self.clone();
        merged.insert(
            ACTIVE_STEPS_KEY,
            step_ids.into_iter().map(|id| Value::from(id.as_str())).collect::<Value>(),
        );
        merged
    }
}

impl From<BTreeMap<String, Value>> for Context {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Context> for Value {
    fn from(context: Context) -> Self {
        Value::Map(context.0)
    }
}

impl TryFrom<Value> for Context {
    type Error = Value;

    /// Only map values convert; anything else is handed back.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Map(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}
