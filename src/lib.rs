// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod backends;   // action executor backends
pub mod config;     // config + registry + validation
pub mod engine;     // protocol engine, activation state, events
pub mod errors;     // error handling
pub mod observability;
pub mod protocol;   // protocol data model
pub mod traits;     // action executor abstraction
