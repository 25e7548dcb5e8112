// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Structural problems that keep a protocol out of the registry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The protocol defines no steps, so it has no entry point.
    #[error("Protocol '{protocol_id}' must have at least one step")]
    EmptyProtocol { protocol_id: String },

    /// Two steps share an id.
    #[error("Protocol '{protocol_id}' defines step '{step_id}' more than once")]
    DuplicateStepId {
        protocol_id: String,
        step_id: String,
    },

    /// A `next_step_ids` entry names a step the protocol does not define.
    #[error("Step '{step_id}' in protocol '{protocol_id}' references unknown step '{target}'")]
    DanglingStepReference {
        protocol_id: String,
        step_id: String,
        target: String,
    },
}

/// Errors raised while reading protocol definitions from disk.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// One or more protocols in the file failed validation.
    #[error("Configuration validation failed:\n{}", format_violations(.0))]
    Invalid(Vec<ValidationError>),

    /// The same protocol id appears twice in one file.
    #[error("Protocol '{0}' is defined more than once")]
    DuplicateProtocolId(String),
}

fn format_violations(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
