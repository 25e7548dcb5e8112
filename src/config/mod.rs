// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod loader;
mod registry;
mod validation;

pub mod consts;

pub use loader::{
    load_and_validate_config, load_config, parse_config, Config, ConfigFormat, EngineOptions,
    RetryConfig,
};
pub use registry::ProtocolRegistry;
pub use validation::{find_cycle, find_violations, validate_protocol};
