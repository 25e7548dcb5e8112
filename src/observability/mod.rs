// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! Log lines are built from message structs rather than ad-hoc format strings.
//! Each message implements `Display` for the human-readable line and
//! [`messages::StructuredLog`] to emit it with typed fields at its level.
//!
//! Messages are organized by subsystem:
//! * `messages::engine` - protocol lifecycle and re-evaluation rounds
//! * `messages::step` - step execution, retries and action outcomes
//! * `messages::validation` - protocol definition problems
//! * `messages::tactical` - the bundled tactical action backend
//!
//! # Usage
//!
//! ```rust
//! use tactical_protocols::observability::messages::StructuredLog;
//! use tactical_protocols::observability::messages::engine::ProtocolLoaded;
//!
//! ProtocolLoaded {
//!     protocol_id: "perimeter_watch",
//!     name: "Perimeter Watch",
//!     step_count: 3,
//!     replaced: false,
//! }
//! .log();
//! ```

pub mod messages;
