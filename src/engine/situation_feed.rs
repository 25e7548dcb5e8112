// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::ProtocolEngine;
use crate::protocol::Context;

pub type SituationSender = mpsc::UnboundedSender<Context>;
pub type SituationReceiver = mpsc::UnboundedReceiver<Context>;

pub fn situation_channel() -> (SituationSender, SituationReceiver) {
    mpsc::unbounded_channel()
}

/// Background task that forwards situation updates into the engine.
///
/// Updates are applied one at a time in arrival order, each running its full
/// re-evaluation round before the next is taken. The task stops when every
/// sender is dropped or the cancellation token fires; an update already being
/// applied is allowed to finish.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use tactical_protocols::backends::tactical::{TacticalActionExecutor, TacticalBoard};
/// use tactical_protocols::engine::{situation_channel, ProtocolEngine, SituationFeed};
/// use tactical_protocols::protocol::Context;
///
/// # #[tokio::main]
/// # async fn main() {
/// let board = Arc::new(TacticalBoard::with_default_layers());
/// let engine = ProtocolEngine::new(Arc::new(TacticalActionExecutor::new(board)));
/// let (updates, receiver) = situation_channel();
/// let feed = SituationFeed::spawn(engine, receiver);
///
/// updates.send(Context::new()).unwrap();
/// drop(updates);
/// assert_eq!(feed.join().await, 1);
/// # }
/// ```
pub struct SituationFeed {
    handle: JoinHandle<usize>,
    cancel: CancellationToken,
}

impl SituationFeed {
    pub fn spawn(engine: ProtocolEngine, updates: SituationReceiver) -> Self {
        Self::spawn_with_token(engine, updates, CancellationToken::new())
    }

    pub fn spawn_with_token(
        engine: ProtocolEngine,
        updates: SituationReceiver,
        cancel: CancellationToken,
    ) -> Self {
        let handle = tokio::spawn(forward(engine, updates, cancel.clone()));
        Self { handle, cancel }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel the feed and wait for it to stop. Returns the number of updates applied.
    pub async fn shutdown(self) -> usize {
        self.cancel.cancel();
        self.join().await
    }

    /// Wait for the feed to stop on its own. Returns the number of updates applied.
    pub async fn join(self) -> usize {
        match self.handle.await {
            Ok(applied) => applied,
            Err(join_error) => {
                tracing::error!(error = %join_error, "Situation feed task failed");
                0
            }
        }
    }
}

async fn forward(
    engine: ProtocolEngine,
    mut updates: SituationReceiver,
    cancel: CancellationToken,
) -> usize {
    let mut applied = 0;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(applied, "Situation feed cancelled");
                break;
            }
            update = updates.recv() => match update {
                Some(payload) => {
                    engine.on_situation_update(payload).await;
                    applied += 1;
                }
                None => {
                    tracing::debug!(applied, "Situation feed closed");
                    break;
                }
            }
        }
    }
    applied
}
