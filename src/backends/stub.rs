// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use crate::errors::ActionError;
use crate::protocol::{Context, Parameters};
use crate::traits::ActionExecutor;

/// Records every invocation. Succeeds unless told an action is unknown or failing.
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<(String, Parameters, Context)>>,
    unknown: HashSet<String>,
    failing: HashSet<String>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unknown(mut self, action: &str) -> Self {
        self.unknown.insert(action.to_string());
        self
    }

    pub fn with_failure(mut self, action: &str) -> Self {
        self.failing.insert(action.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(String, Parameters, Context)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.calls().into_iter().map(|(action, _, _)| action).collect()
    }

    pub fn count(&self, action: &str) -> usize {
        self.actions().iter().filter(|a| *a == action).count()
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn execute(
        &self,
        action: &str,
        parameters: &Parameters,
        context: &Context,
    ) -> Result<(), ActionError> {
        self.calls
            .lock()
            .unwrap()
            .push((action.to_string(), parameters.clone(), context.clone()));

        if self.unknown.contains(action) {
            Err(ActionError::ActionNotFound(action.to_string()))
        } else if self.failing.contains(action) {
            Err(ActionError::execution(format!("{} failed", action)))
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Always fails with the same message.
pub struct FailingExecutor {
    message: String,
}

impl FailingExecutor {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl ActionExecutor for FailingExecutor {
    async fn execute(&self, _: &str, _: &Parameters, _: &Context) -> Result<(), ActionError> {
        Err(ActionError::execution(self.message.clone()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Fails the first `failures` invocations, then succeeds.
pub struct FlakyExecutor {
    failures: u32,
    attempts: AtomicU32,
}

impl FlakyExecutor {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionExecutor for FlakyExecutor {
    async fn execute(&self, _: &str, _: &Parameters, _: &Context) -> Result<(), ActionError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            Err(ActionError::execution(format!("transient failure #{}", attempt)))
        } else {
            Ok(())
        }
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

/// Holds one action until the test releases it; every other action passes straight through.
pub struct GatedExecutor {
    gated_action: String,
    gate: Semaphore,
    started: Notify,
    inner: RecordingExecutor,
}

impl GatedExecutor {
    pub fn new(gated_action: &str) -> Self {
        Self {
            gated_action: gated_action.to_string(),
            gate: Semaphore::new(0),
            started: Notify::new(),
            inner: RecordingExecutor::new(),
        }
    }

    /// Resolves once the gated action has been entered.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    pub fn release(&self, permits: usize) {
        self.gate.add_permits(permits);
    }

    pub fn count(&self, action: &str) -> usize {
        self.inner.count(action)
    }
}

#[async_trait]
impl ActionExecutor for GatedExecutor {
    async fn execute(
        &self,
        action: &str,
        parameters: &Parameters,
        context: &Context,
    ) -> Result<(), ActionError> {
        if action == self.gated_action {
            self.started.notify_one();
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }
        self.inner.execute(action, parameters, context).await
    }

    fn name(&self) -> &'static str {
        "gated"
    }
}

/// Sleeps on every action and tracks how many ran at once.
pub struct SlowExecutor {
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl SlowExecutor {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionExecutor for SlowExecutor {
    async fn execute(&self, _: &str, _: &Parameters, _: &Context) -> Result<(), ActionError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}
