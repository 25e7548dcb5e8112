// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Action executor backends.
//!
//! Each backend implements [`ActionExecutor`](crate::traits::ActionExecutor) and
//! is handed to the engine as an `Arc<dyn ActionExecutor>`.
//!
//! # Available Backends
//!
//! ## Tactical Backend
//! In-memory tactical board with a closed set of map actions:
//! - **mark_location**: Place a marker on a board layer
//! - **update_situation**: Correlate board elements into a situation update and
//!   publish it for re-evaluation
//!
//! ## Stub Backend (Test-Only)
//! Executors for engine tests (only available in test builds):
//! - **RecordingExecutor**: Records calls, with configurable unknown/failing actions
//! - **FailingExecutor**: Fails every action
//! - **FlakyExecutor**: Fails a fixed number of times, then succeeds
//! - **GatedExecutor**: Holds one action until released, for in-flight deactivation
//! - **SlowExecutor**: Sleeps and records peak concurrency
//!
//! # Example
//! ```rust
//! use std::sync::Arc;
//! use tactical_protocols::backends::tactical::{TacticalActionExecutor, TacticalBoard};
//! use tactical_protocols::engine::situation_channel;
//!
//! let board = Arc::new(TacticalBoard::with_default_layers());
//! let (updates, _receiver) = situation_channel();
//! let executor = TacticalActionExecutor::new(board).with_situation_channel(updates);
//! assert_eq!(executor.board().layer_ids().len(), 3);
//! ```

#[cfg(test)]
pub mod stub;
pub mod tactical;
