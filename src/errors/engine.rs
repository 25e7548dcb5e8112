// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Failures of a single engine call. None of them leave partial state behind.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Protocol '{0}' not found")]
    ProtocolNotFound(String),

    #[error("Activation conditions not met for protocol '{0}'")]
    ConditionsNotMet(String),
}
