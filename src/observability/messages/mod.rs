// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.

use std::fmt::Display;
use tracing::Span;

pub mod engine;
pub mod step;
pub mod tactical;
pub mod validation;

/// A log message that knows its own level and structured fields.
pub trait StructuredLog: Display {
    /// Emit the message as a tracing event.
    fn log(&self);

    /// Open a span carrying the message's fields.
    fn span(&self, name: &str) -> Span;
}
