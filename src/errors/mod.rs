// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod action;
mod config;
mod engine;

pub use action::ActionError;
pub use config::{ConfigError, ValidationError};
pub use engine::EngineError;
