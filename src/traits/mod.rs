// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod action_executor;

pub use action_executor::ActionExecutor;
