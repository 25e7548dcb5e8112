// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Protocol data model: values, contexts, conditions and protocol definitions.

mod condition;
mod context;
mod definition;
mod value;

pub use condition::{all_hold, now_millis, Condition, ConditionKind, ConditionOperator};
pub use context::{Context, ACTIVE_STEPS_KEY, ENVIRONMENTAL_KEY, TACTICAL_KEY};
pub use definition::{Parameters, Protocol, ProtocolKind, Step};
pub use value::Value;
