// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-protocol activation state.
//!
//! Each protocol id owns a slot holding its set of active step ids and the epoch
//! of the activation that produced them. Every seed or clear draws a fresh epoch
//! from a global counter, so a step result tagged with an older epoch can be
//! recognised as stale and dropped after a deactivation or restart.
//!
//! Slots also carry a *lane*: an async mutex that serializes activation,
//! progression and re-evaluation for one protocol. Different protocols never
//! contend on a lane. Deactivation deliberately skips the lane so it takes
//! effect while steps are still in flight.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::OwnedMutexGuard;

/// Identifies one activation of a protocol.
pub type Epoch = u64;

/// Outcome of recording a completed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// The step left the active set; `added` holds successors that were not already active.
    Progressed { added: Vec<String> },
    /// The step left the active set and nothing remains: the protocol completed.
    Completed,
    /// The activation the step ran under is gone, or the step was no longer active.
    Stale,
}

#[derive(Debug, Default)]
struct ActiveSet {
    steps: BTreeSet<String>,
    epoch: Epoch,
}

#[derive(Debug, Default)]
struct Slot {
    state: Mutex<ActiveSet>,
    lane: Arc<tokio::sync::Mutex<()>>,
}

impl Slot {
    fn state(&self) -> std::sync::MutexGuard<'_, ActiveSet> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub struct ActivationState {
    slots: RwLock<HashMap<String, Arc<Slot>>>,
    next_epoch: AtomicU64,
}

impl Default for ActivationState {
    fn default() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            next_epoch: AtomicU64::new(1),
        }
    }
}

impl ActivationState {
    pub fn new() -> Self {
        Self::default()
    }

    fn existing(&self, protocol_id: &str) -> Option<Arc<Slot>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(protocol_id)
            .cloned()
    }

    fn slot(&self, protocol_id: &str) -> Arc<Slot> {
        if let Some(slot) = self.existing(protocol_id) {
            return slot;
        }
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(protocol_id.to_string())
            .or_default()
            .clone()
    }

    fn fresh_epoch(&self) -> Epoch {
        self.next_epoch.fetch_add(1, Ordering::Relaxed)
    }

    /// Wait for exclusive use of the protocol's lane.
    pub async fn lane(&self, protocol_id: &str) -> OwnedMutexGuard<()> {
        let lane = self.slot(protocol_id).lane.clone();
        lane.lock_owned().await
    }

    /// Start a new activation whose only active step is `entry_step_id`.
    pub fn seed(&self, protocol_id: &str, entry_step_id: &str) -> Epoch {
        let epoch = self.fresh_epoch();
        let slot = self.slot(protocol_id);
        let mut state = slot.state();
        state.steps = BTreeSet::from([entry_step_id.to_string()]);
        state.epoch = epoch;
        epoch
    }

    /// Overwrite the active steps without starting a new activation.
    pub fn replace<I>(&self, protocol_id: &str, step_ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        let slot = self.slot(protocol_id);
        slot.state().steps = step_ids.into_iter().collect();
    }

    /// Drop every active step. Returns whether the protocol was active.
    ///
    /// The epoch moves on even when nothing was active, so results from an
    /// activation that raced with this call are discarded.
    pub fn clear(&self, protocol_id: &str) -> bool {
        let Some(slot) = self.existing(protocol_id) else {
            return false;
        };
        let epoch = self.fresh_epoch();
        let mut state = slot.state();
        let was_active = !state.steps.is_empty();
        state.steps.clear();
        state.epoch = epoch;
        was_active
    }

    pub fn snapshot(&self, protocol_id: &str) -> BTreeSet<String> {
        self.existing(protocol_id)
            .map(|slot| slot.state().steps.clone())
            .unwrap_or_default()
    }

    /// Current epoch and active steps, or `None` when the protocol is inactive.
    pub fn current(&self, protocol_id: &str) -> Option<(Epoch, BTreeSet<String>)> {
        let slot = self.existing(protocol_id)?;
        let state = slot.state();
        if state.steps.is_empty() {
            None
        } else {
            Some((state.epoch, state.steps.clone()))
        }
    }

    /// Whether `epoch` is still the live activation of the protocol.
    pub fn is_current(&self, protocol_id: &str, epoch: Epoch) -> bool {
        self.existing(protocol_id)
            .map(|slot| {
                let state = slot.state();
                state.epoch == epoch && !state.steps.is_empty()
            })
            .unwrap_or(false)
    }

    /// Record that `completed` finished under `epoch` and activate its successors.
    pub fn advance(
        &self,
        protocol_id: &str,
        epoch: Epoch,
        completed: &str,
        next_step_ids: &[String],
    ) -> Advance {
        let Some(slot) = self.existing(protocol_id) else {
            return Advance::Stale;
        };
        let mut state = slot.state();
        if state.epoch != epoch || !state.steps.remove(completed) {
            return Advance::Stale;
        }

        let added: Vec<String> = next_step_ids
            .iter()
            .filter(|id| state.steps.insert((*id).clone()))
            .cloned()
            .collect();

        if state.steps.is_empty() {
            Advance::Completed
        } else {
            Advance::Progressed { added }
        }
    }

    pub fn is_active(&self, protocol_id: &str) -> bool {
        self.existing(protocol_id)
            .map(|slot| !slot.state().steps.is_empty())
            .unwrap_or(false)
    }

    /// Ids of every protocol with at least one active step, sorted.
    pub fn active_ids(&self) -> Vec<String> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| !slot.state().steps.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}
