// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::config::{find_cycle, Config, EngineOptions, ProtocolRegistry};
use crate::engine::activation::{ActivationState, Advance, Epoch};
use crate::engine::events::{DeactivationReason, EngineEvent, EventBus};
use crate::engine::step_executor::{StepExecutor, StepResult};
use crate::errors::{ActionError, EngineError, ValidationError};
use crate::observability::messages::engine::{
    ActivationRejected, ProtocolActivated, ProtocolCompleted, ProtocolDeactivated,
    ProtocolLoaded, ReevaluationStarted, StaleResultDiscarded, StepDeferred,
};
use crate::observability::messages::validation::{ProtocolRejected, StepCycleDetected};
use crate::observability::messages::StructuredLog;
use crate::protocol::{all_hold, Context, Protocol, Step};
use crate::traits::ActionExecutor;

/// Reactive protocol execution engine.
///
/// The engine owns a registry of validated protocols and the activation state of
/// each one. Activating a protocol seeds it with its entry step and runs it;
/// every step that completes hands its successors to the same run, which
/// executes them concurrently under a shared concurrency limit. External
/// situation updates re-enter through [`on_situation_update`], which re-checks
/// each active protocol and re-runs its active steps.
///
/// ## Ordering
///
/// Activation, progression and re-evaluation of one protocol are serialized
/// through that protocol's lane (see [`ActivationState`]); different protocols
/// proceed independently. [`deactivate`] takes effect immediately: steps still in
/// flight finish, but their results are discarded.
///
/// ## Cycles
///
/// A step re-entered through a loop runs at most once per `activate` or
/// re-evaluation call: when a completed step re-activates a step that already
/// ran in the current call and can reach it again, that successor stays in the
/// active set and runs on the next situation update. A join step re-activated by
/// a slower branch of an acyclic fan-out runs again in the same call.
///
/// ## Events
///
/// Lifecycle events are broadcast to every receiver returned by [`subscribe`].
/// Action executors must not call back into the engine synchronously while a
/// step is running; publish situation updates through a
/// [`SituationFeed`](crate::engine::SituationFeed) instead.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use tactical_protocols::backends::tactical::{TacticalActionExecutor, TacticalBoard};
/// use tactical_protocols::engine::{EngineEvent, ProtocolEngine};
/// use tactical_protocols::protocol::{Context, Protocol, Step, Value};
///
/// # #[tokio::main]
/// # async fn main() {
/// let board = Arc::new(TacticalBoard::with_default_layers());
/// let engine = ProtocolEngine::new(Arc::new(TacticalActionExecutor::new(board.clone())));
/// let mut events = engine.subscribe();
///
/// engine.load(Protocol::new(
///     "rally",
///     "Rally",
///     vec![Step::new("mark", "mark_location")
///         .with_parameter("position", Value::from(vec![Value::from(51.5), Value::from(-0.12)]))],
/// )).unwrap();
/// engine.activate("rally", Context::new()).await.unwrap();
///
/// assert!(!engine.is_active("rally"));
/// assert_eq!(board.elements("operations").len(), 1);
/// assert!(matches!(events.recv().await, Ok(EngineEvent::ProtocolLoaded { .. })));
/// # }
/// ```
///
/// [`on_situation_update`]: ProtocolEngine::on_situation_update
/// [`deactivate`]: ProtocolEngine::deactivate
/// [`subscribe`]: ProtocolEngine::subscribe
#[derive(Clone)]
pub struct ProtocolEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    registry: ProtocolRegistry,
    activation: ActivationState,
    steps: StepExecutor,
    events: EventBus,
    semaphore: Arc<Semaphore>,
}

type StepOutcome = (Step, StepResult);

impl ProtocolEngine {
    pub fn new(executor: Arc<dyn ActionExecutor>) -> Self {
        Self::with_options(executor, EngineOptions::default())
    }

    pub fn with_options(executor: Arc<dyn ActionExecutor>, options: EngineOptions) -> Self {
        tracing::debug!(
            executor = executor.name(),
            max_concurrency = options.get_max_concurrency(),
            event_buffer = options.get_event_buffer(),
            max_retries = options.retry.get_max_attempts(),
            "Creating protocol engine"
        );
        Self {
            inner: Arc::new(EngineInner {
                registry: ProtocolRegistry::new(),
                activation: ActivationState::new(),
                steps: StepExecutor::new(executor, options.retry),
                events: EventBus::new(options.get_event_buffer()),
                semaphore: Arc::new(Semaphore::new(options.get_max_concurrency())),
            }),
        }
    }

    /// Build an engine from a loaded configuration and register its protocols.
    ///
    /// Protocols are registered before anyone can subscribe, so no
    /// `ProtocolLoaded` events are observable for them.
    pub fn from_config(
        config: Config,
        executor: Arc<dyn ActionExecutor>,
    ) -> Result<Self, ValidationError> {
        let engine = Self::with_options(executor, config.engine);
        for protocol in config.protocols {
            engine.load(protocol)?;
        }
        Ok(engine)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    /// Validate and register a protocol, replacing any definition with the same id.
    ///
    /// Replacing a definition leaves its activation state alone; the next
    /// re-evaluation reconciles the active steps with the new definition.
    pub fn load(&self, protocol: Protocol) -> Result<(), ValidationError> {
        let id = protocol.id.clone();
        let name = protocol.name.clone();
        let step_count = protocol.steps.len();
        let cycle = find_cycle(&protocol);

        let replaced = match self.inner.registry.load(protocol) {
            Ok(replaced) => replaced.is_some(),
            Err(error) => {
                ProtocolRejected {
                    protocol_id: &id,
                    error: &error,
                }
                .log();
                return Err(error);
            }
        };

        ProtocolLoaded {
            protocol_id: &id,
            name: &name,
            step_count,
            replaced,
        }
        .log();
        if let Some(cycle) = cycle {
            StepCycleDetected {
                protocol_id: &id,
                cycle: &cycle,
            }
            .log();
        }

        self.inner.events.emit(EngineEvent::ProtocolLoaded { id, name });
        Ok(())
    }

    pub fn protocol(&self, protocol_id: &str) -> Option<Arc<Protocol>> {
        self.inner.registry.get(protocol_id)
    }

    pub fn protocol_ids(&self) -> Vec<String> {
        self.inner.registry.ids()
    }

    /// Currently active step ids of a protocol; empty when it is inactive.
    pub fn active_steps(&self, protocol_id: &str) -> BTreeSet<String> {
        self.inner.activation.snapshot(protocol_id)
    }

    pub fn is_active(&self, protocol_id: &str) -> bool {
        self.inner.activation.is_active(protocol_id)
    }

    pub fn active_protocols(&self) -> Vec<String> {
        self.inner.activation.active_ids()
    }

    /// Activate a protocol and run it until no step can progress further.
    ///
    /// Every activation condition must hold against `context`. Activating a
    /// protocol that is already active restarts it from its entry step.
    pub async fn activate(&self, protocol_id: &str, context: Context) -> Result<(), EngineError> {
        let protocol = self.resolve_for_activation(protocol_id, &context)?;
        let Some(entry) = protocol.entry_step() else {
            // Unreachable for registered protocols, which always have steps.
            return Err(EngineError::ProtocolNotFound(protocol_id.to_string()));
        };
        let entry_step_id = entry.id.clone();

        let _lane = self.inner.activation.lane(protocol_id).await;
        let restarted = self.inner.activation.is_active(protocol_id);
        let epoch = self.inner.activation.seed(protocol_id, &entry_step_id);

        let activated = ProtocolActivated {
            protocol_id,
            entry_step_id: &entry_step_id,
            restarted,
        };
        activated.log();
        let span = activated.span("activate");

        self.inner.events.emit(EngineEvent::ProtocolActivated {
            id: protocol_id.to_string(),
            entry_step_id: entry_step_id.clone(),
        });

        self.run_steps(protocol, epoch, vec![entry_step_id], Arc::new(context))
            .instrument(span)
            .await;
        Ok(())
    }

    fn resolve_for_activation(
        &self,
        protocol_id: &str,
        context: &Context,
    ) -> Result<Arc<Protocol>, EngineError> {
        let result = match self.inner.registry.get(protocol_id) {
            None => Err(EngineError::ProtocolNotFound(protocol_id.to_string())),
            Some(protocol) if !all_hold(&protocol.activation_conditions, context) => {
                Err(EngineError::ConditionsNotMet(protocol_id.to_string()))
            }
            Some(protocol) => Ok(protocol),
        };

        if let Err(error) = &result {
            ActivationRejected {
                protocol_id,
                reason: error,
            }
            .log();
        }
        result
    }

    /// Re-evaluate every active protocol against a situation update.
    ///
    /// Protocols are processed concurrently; the call returns once every
    /// protocol's round, including any progression it triggers, has finished.
    pub async fn on_situation_update(&self, payload: Context) {
        let active = self.inner.activation.active_ids();
        let started = ReevaluationStarted {
            active_protocols: active.len(),
            payload_keys: payload.len(),
        };
        started.log();
        let span = started.span("situation_update");

        let payload = Arc::new(payload);
        let mut rounds = JoinSet::new();
        for protocol_id in active {
            let engine = self.clone();
            let payload = payload.clone();
            rounds.spawn(
                async move { engine.reevaluate(&protocol_id, &payload).await }
                    .instrument(span.clone()),
            );
        }

        while let Some(joined) = rounds.join_next().await {
            if let Err(join_error) = joined {
                tracing::error!(error = %join_error, "Re-evaluation task failed");
            }
        }
    }

    async fn reevaluate(&self, protocol_id: &str, payload: &Context) {
        let _lane = self.inner.activation.lane(protocol_id).await;
        let Some((epoch, active)) = self.inner.activation.current(protocol_id) else {
            // Deactivated or completed while this round was queued.
            return;
        };
        let Some(protocol) = self.inner.registry.get(protocol_id) else {
            return;
        };

        let context = payload.with_active_steps(&active);
        if !all_hold(&protocol.activation_conditions, &context) {
            self.deactivate_with(protocol_id, DeactivationReason::ConditionsLapsed);
            return;
        }

        let known: Vec<String> = active
            .iter()
            .filter(|step_id| protocol.has_step(step_id))
            .cloned()
            .collect();
        if known.len() != active.len() {
            if known.is_empty() {
                self.deactivate_with(protocol_id, DeactivationReason::DefinitionChanged);
                return;
            }
            tracing::info!(
                protocol_id,
                dropped = active.len() - known.len(),
                "Dropping active steps missing from the current definition"
            );
            self.inner.activation.replace(protocol_id, known.clone());
        }

        self.run_steps(protocol, epoch, known, Arc::new(context)).await;
    }

    /// Deactivate a protocol. Always emits `ProtocolDeactivated`, even when the
    /// protocol was not active.
    pub fn deactivate(&self, protocol_id: &str) {
        self.deactivate_with(protocol_id, DeactivationReason::Explicit);
    }

    fn deactivate_with(&self, protocol_id: &str, reason: DeactivationReason) {
        let was_active = self.inner.activation.clear(protocol_id);
        ProtocolDeactivated {
            protocol_id,
            reason: reason.as_str(),
            was_active,
        }
        .log();
        self.inner.events.emit(EngineEvent::ProtocolDeactivated {
            id: protocol_id.to_string(),
            reason,
        });
    }

    /// Run `initial` and every successor they activate until nothing new can run.
    async fn run_steps(
        &self,
        protocol: Arc<Protocol>,
        epoch: Epoch,
        initial: Vec<String>,
        context: Arc<Context>,
    ) {
        let mut in_flight: JoinSet<StepOutcome> = JoinSet::new();
        let mut executed: HashSet<String> = HashSet::new();

        self.spawn_steps(&mut in_flight, &mut executed, &protocol, &context, None, initial);

        while let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok((step, result)) => {
                    let next = self.settle(&protocol, epoch, &step, result);
                    self.spawn_steps(
                        &mut in_flight,
                        &mut executed,
                        &protocol,
                        &context,
                        Some(step.id.as_str()),
                        next,
                    );
                }
                Err(join_error) => {
                    tracing::error!(
                        protocol_id = %protocol.id,
                        error = %join_error,
                        "Step task failed to complete"
                    );
                }
            }
        }
    }

    fn spawn_steps(
        &self,
        in_flight: &mut JoinSet<StepOutcome>,
        executed: &mut HashSet<String>,
        protocol: &Arc<Protocol>,
        context: &Arc<Context>,
        completed: Option<&str>,
        step_ids: Vec<String>,
    ) {
        for step_id in step_ids {
            let closes_loop =
                completed.is_some_and(|completed| protocol.reaches(&step_id, completed));
            if executed.contains(&step_id) && closes_loop {
                StepDeferred {
                    protocol_id: &protocol.id,
                    step_id: &step_id,
                }
                .log();
                continue;
            }
            executed.insert(step_id.clone());
            let Some(step) = protocol.step(&step_id).cloned() else {
                tracing::warn!(
                    protocol_id = %protocol.id,
                    step_id = %step_id,
                    "Active step is not part of the definition; skipping"
                );
                continue;
            };

            let inner = self.inner.clone();
            let protocol = protocol.clone();
            let context = context.clone();
            let task = async move {
                let _permit = inner.semaphore.clone().acquire_owned().await.ok();
                let result = inner.steps.run(&protocol, &step, &context).await;
                (step, result)
            };
            in_flight.spawn(task.in_current_span());
        }
    }

    /// Apply a step result to the activation it ran under and return the
    /// successors that became active.
    fn settle(
        &self,
        protocol: &Protocol,
        epoch: Epoch,
        step: &Step,
        result: StepResult,
    ) -> Vec<String> {
        let protocol_id = protocol.id.as_str();
        let activation = &self.inner.activation;

        if !activation.is_current(protocol_id, epoch) {
            StaleResultDiscarded {
                protocol_id,
                step_id: &step.id,
            }
            .log();
            return Vec::new();
        }

        match &result.error {
            Some(ActionError::ActionNotFound(action)) => {
                self.inner.events.emit(EngineEvent::ActionNotFound {
                    protocol_id: protocol_id.to_string(),
                    step_id: step.id.clone(),
                    action: action.clone(),
                });
            }
            Some(error) => {
                self.inner.events.emit(EngineEvent::StepExecutionFailed {
                    protocol_id: protocol_id.to_string(),
                    step_id: step.id.clone(),
                    error: error.to_string(),
                });
                return Vec::new();
            }
            None => {}
        }

        if !result.complete {
            self.emit_step_executed(protocol_id, &step.id, false);
            return Vec::new();
        }

        match activation.advance(protocol_id, epoch, &step.id, &step.next_step_ids) {
            Advance::Stale => {
                StaleResultDiscarded {
                    protocol_id,
                    step_id: &step.id,
                }
                .log();
                Vec::new()
            }
            Advance::Progressed { added } => {
                self.emit_step_executed(protocol_id, &step.id, true);
                added
            }
            Advance::Completed => {
                self.emit_step_executed(protocol_id, &step.id, true);
                ProtocolCompleted { protocol_id }.log();
                self.inner.events.emit(EngineEvent::ProtocolCompleted {
                    id: protocol_id.to_string(),
                });
                Vec::new()
            }
        }
    }

    fn emit_step_executed(&self, protocol_id: &str, step_id: &str, complete: bool) {
        self.inner.events.emit(EngineEvent::StepExecuted {
            protocol_id: protocol_id.to_string(),
            step_id: step_id.to_string(),
            complete,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::{FailingExecutor, GatedExecutor, RecordingExecutor, SlowExecutor};
    use crate::config::RetryConfig;
    use crate::engine::events::drain_events;
    use crate::protocol::{Condition, ConditionOperator};
    use std::time::Duration;

    fn engine_with(
        executor: Arc<dyn ActionExecutor>,
    ) -> (ProtocolEngine, broadcast::Receiver<EngineEvent>) {
        let engine = ProtocolEngine::new(executor);
        let events = engine.subscribe();
        (engine, events)
    }

    fn two_step() -> Protocol {
        Protocol::new(
            "two",
            "Two Step",
            vec![Step::new("A", "noop").then(["B"]), Step::new("B", "noop")],
        )
    }

    fn executed(step_id: &str, complete: bool) -> EngineEvent {
        EngineEvent::StepExecuted {
            protocol_id: "two".into(),
            step_id: step_id.into(),
            complete,
        }
    }

    fn step_ids(events: &[EngineEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::StepExecuted { step_id, .. } => Some(step_id.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_two_step_protocol_runs_to_completion() {
        let (engine, mut events) = engine_with(Arc::new(RecordingExecutor::new()));
        engine.load(two_step()).unwrap();

        engine.activate("two", Context::new()).await.unwrap();

        assert_eq!(
            drain_events(&mut events),
            vec![
                EngineEvent::ProtocolLoaded {
                    id: "two".into(),
                    name: "Two Step".into()
                },
                EngineEvent::ProtocolActivated {
                    id: "two".into(),
                    entry_step_id: "A".into()
                },
                executed("A", true),
                executed("B", true),
                EngineEvent::ProtocolCompleted { id: "two".into() },
            ]
        );
        assert!(engine.active_steps("two").is_empty());
        assert!(!engine.is_active("two"));
    }

    #[tokio::test]
    async fn test_activate_unknown_protocol() {
        let (engine, mut events) = engine_with(Arc::new(RecordingExecutor::new()));

        let result = engine.activate("ghost", Context::new()).await;

        assert_eq!(result, Err(EngineError::ProtocolNotFound("ghost".into())));
        assert!(engine.active_protocols().is_empty());
        assert!(drain_events(&mut events).is_empty());
    }

    #[tokio::test]
    async fn test_activation_conditions() {
        let recorder = Arc::new(RecordingExecutor::new());
        let (engine, _events) = engine_with(recorder.clone());
        engine
            .load(
                two_step().activated_when(Condition::tactical(ConditionOperator::Equals, "red")),
            )
            .unwrap();

        let rejected = engine
            .activate("two", Context::new().with("tactical", "green"))
            .await;
        assert_eq!(rejected, Err(EngineError::ConditionsNotMet("two".into())));
        assert!(recorder.calls().is_empty());
        assert!(!engine.is_active("two"));

        engine
            .activate("two", Context::new().with("tactical", "red"))
            .await
            .unwrap();
        assert_eq!(recorder.actions(), vec!["noop", "noop"]);
    }

    #[tokio::test]
    async fn test_incomplete_entry_step_stays_active() {
        let (engine, mut events) = engine_with(Arc::new(RecordingExecutor::new()));
        engine
            .load(Protocol::new(
                "watch",
                "Watch",
                vec![Step::new("observe", "noop")
                    .completes_when(Condition::environmental(ConditionOperator::Equals, "clear"))],
            ))
            .unwrap();

        engine.activate("watch", Context::new()).await.unwrap();

        assert_eq!(
            engine.active_steps("watch"),
            BTreeSet::from(["observe".to_string()])
        );
        let events = drain_events(&mut events);
        assert!(events.contains(&EngineEvent::StepExecuted {
            protocol_id: "watch".into(),
            step_id: "observe".into(),
            complete: false,
        }));
        assert!(!events
            .iter()
            .any(|e| matches!(e, EngineEvent::ProtocolCompleted { .. })));
    }

    #[tokio::test]
    async fn test_fan_out_runs_siblings_and_joins() {
        let recorder = Arc::new(RecordingExecutor::new());
        let (engine, mut events) = engine_with(recorder.clone());
        engine
            .load(Protocol::new(
                "fan",
                "Fan",
                vec![
                    Step::new("entry", "noop").then(["left", "right"]),
                    Step::new("left", "noop").then(["merge"]),
                    Step::new("right", "noop").then(["merge"]),
                    Step::new("merge", "merge"),
                ],
            ))
            .unwrap();

        engine.activate("fan", Context::new()).await.unwrap();

        let events = drain_events(&mut events);
        let mut order = step_ids(&events);
        assert_eq!(order.first().map(String::as_str), Some("entry"));
        order.sort();
        order.dedup();
        assert_eq!(order, vec!["entry", "left", "merge", "right"]);
        // The join runs once per branch that re-activates it after it completed.
        assert!((1..=2).contains(&recorder.count("merge")));
        assert!(!engine.is_active("fan"));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, EngineEvent::ProtocolCompleted { .. }))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_join_reruns_when_slower_branch_completes() {
        let gated = Arc::new(GatedExecutor::new("slow_branch"));
        let engine = ProtocolEngine::with_options(
            gated.clone(),
            EngineOptions::default().with_max_concurrency(4),
        );
        let mut events = engine.subscribe();
        engine
            .load(Protocol::new(
                "fan",
                "Fan",
                vec![
                    Step::new("entry", "noop").then(["left", "right"]),
                    Step::new("left", "noop").then(["merge"]),
                    Step::new("right", "slow_branch").then(["merge"]),
                    Step::new("merge", "merge"),
                ],
            ))
            .unwrap();

        let running = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.activate("fan", Context::new()).await })
        };
        gated.wait_started().await;

        // The fast branch joins first, leaving only the held branch active.
        let only_right = BTreeSet::from(["right".to_string()]);
        tokio::time::timeout(Duration::from_secs(2), async {
            while engine.active_steps("fan") != only_right {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(gated.count("merge"), 1);

        gated.release(1);
        running.await.unwrap().unwrap();

        assert_eq!(gated.count("merge"), 2);
        assert!(!engine.is_active("fan"));
        let events = drain_events(&mut events);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, EngineEvent::ProtocolCompleted { .. }))
                .count(),
            1
        );
        assert_eq!(
            events.last(),
            Some(&EngineEvent::ProtocolCompleted { id: "fan".into() })
        );
    }

    #[tokio::test]
    async fn test_sibling_failure_does_not_cancel_others() {
        let recorder = Arc::new(RecordingExecutor::new().with_failure("jam"));
        let (engine, mut events) = engine_with(recorder.clone());
        engine
            .load(Protocol::new(
                "fan",
                "Fan",
                vec![
                    Step::new("entry", "noop").then(["broken", "healthy"]),
                    Step::new("broken", "jam"),
                    Step::new("healthy", "noop"),
                ],
            ))
            .unwrap();

        engine.activate("fan", Context::new()).await.unwrap();

        let events = drain_events(&mut events);
        assert!(events.iter().any(|e| matches!(
            e,
            EngineEvent::StepExecutionFailed { step_id, .. } if step_id == "broken"
        )));
        assert!(step_ids(&events).contains(&"healthy".to_string()));
        assert_eq!(
            engine.active_steps("fan"),
            BTreeSet::from(["broken".to_string()])
        );
    }

    #[tokio::test]
    async fn test_unknown_action_is_reported_and_progresses() {
        let (engine, mut events) =
            engine_with(Arc::new(RecordingExecutor::new().with_unknown("teleport")));
        engine
            .load(Protocol::new("p", "P", vec![Step::new("a", "teleport")]))
            .unwrap();

        engine.activate("p", Context::new()).await.unwrap();

        let events = drain_events(&mut events);
        assert!(events.contains(&EngineEvent::ActionNotFound {
            protocol_id: "p".into(),
            step_id: "a".into(),
            action: "teleport".into(),
        }));
        assert!(events.contains(&EngineEvent::ProtocolCompleted { id: "p".into() }));
    }

    #[tokio::test]
    async fn test_deactivate_is_idempotent() {
        let (engine, mut events) = engine_with(Arc::new(RecordingExecutor::new()));
        engine.load(two_step()).unwrap();
        drain_events(&mut events);

        engine.deactivate("two");
        engine.deactivate("two");

        let deactivated = EngineEvent::ProtocolDeactivated {
            id: "two".into(),
            reason: DeactivationReason::Explicit,
        };
        assert_eq!(
            drain_events(&mut events),
            vec![deactivated.clone(), deactivated]
        );
        assert!(!engine.is_active("two"));
    }

    #[tokio::test]
    async fn test_reevaluation_deactivates_when_conditions_lapse() {
        let (engine, mut events) = engine_with(Arc::new(RecordingExecutor::new()));
        engine
            .load(
                Protocol::new(
                    "watch",
                    "Watch",
                    vec![Step::new("observe", "noop")
                        .completes_when(Condition::environmental(ConditionOperator::Equals, "clear"))],
                )
                .activated_when(Condition::tactical(ConditionOperator::Equals, "red")),
            )
            .unwrap();
        engine
            .activate("watch", Context::new().with("tactical", "red"))
            .await
            .unwrap();
        drain_events(&mut events);

        engine
            .on_situation_update(Context::new().with("tactical", "green"))
            .await;

        assert_eq!(
            drain_events(&mut events),
            vec![EngineEvent::ProtocolDeactivated {
                id: "watch".into(),
                reason: DeactivationReason::ConditionsLapsed,
            }]
        );
        assert!(engine.active_protocols().is_empty());
    }

    #[tokio::test]
    async fn test_reevaluation_reruns_active_steps_with_merged_context() {
        let recorder = Arc::new(RecordingExecutor::new());
        let (engine, mut events) = engine_with(recorder.clone());
        engine
            .load(Protocol::new(
                "watch",
                "Watch",
                vec![
                    Step::new("observe", "observe")
                        .then(["report"])
                        .completes_when(Condition::environmental(ConditionOperator::Equals, "clear")),
                    Step::new("report", "report"),
                ],
            ))
            .unwrap();
        engine.activate("watch", Context::new()).await.unwrap();

        engine
            .on_situation_update(Context::new().with("environmental", "fog"))
            .await;
        assert!(engine.is_active("watch"));

        engine
            .on_situation_update(Context::new().with("environmental", "clear"))
            .await;

        assert_eq!(recorder.actions(), vec!["observe", "observe", "observe", "report"]);
        let (_, _, last_context) = recorder.calls().pop().unwrap();
        assert_eq!(
            last_context.get("active_steps").and_then(|v| v.as_list()).map(|l| l.len()),
            Some(1)
        );
        assert!(drain_events(&mut events).contains(&EngineEvent::ProtocolCompleted {
            id: "watch".into()
        }));
        assert!(!engine.is_active("watch"));
    }

    #[tokio::test]
    async fn test_cycles_run_once_per_round() {
        let recorder = Arc::new(RecordingExecutor::new());
        let (engine, _events) = engine_with(recorder.clone());
        engine
            .load(Protocol::new(
                "loop",
                "Loop",
                vec![
                    Step::new("scan", "scan").then(["report"]),
                    Step::new("report", "report").then(["scan"]),
                ],
            ))
            .unwrap();

        engine.activate("loop", Context::new()).await.unwrap();
        assert_eq!(recorder.actions(), vec!["scan", "report"]);
        assert_eq!(
            engine.active_steps("loop"),
            BTreeSet::from(["scan".to_string()])
        );

        engine.on_situation_update(Context::new()).await;
        assert_eq!(recorder.actions(), vec!["scan", "report", "scan", "report"]);
        assert!(engine.is_active("loop"));
    }

    #[tokio::test]
    async fn test_reevaluation_only_touches_active_protocols() {
        let recorder = Arc::new(RecordingExecutor::new());
        let (engine, _events) = engine_with(recorder.clone());
        engine.load(two_step()).unwrap();
        engine
            .load(Protocol::new(
                "poll",
                "Poll",
                vec![Step::new("tick", "tick").then(["tick"])],
            ))
            .unwrap();
        engine.activate("poll", Context::new()).await.unwrap();

        engine.on_situation_update(Context::new()).await;
        engine.on_situation_update(Context::new()).await;

        assert_eq!(recorder.count("tick"), 3);
        assert_eq!(recorder.count("noop"), 0);
        assert_eq!(engine.active_protocols(), vec!["poll"]);
    }

    #[tokio::test]
    async fn test_failed_step_retried_on_next_update() {
        let (engine, mut events) = engine_with(Arc::new(FailingExecutor::new("offline")));
        engine.load(two_step()).unwrap();

        engine.activate("two", Context::new()).await.unwrap();
        engine.on_situation_update(Context::new()).await;

        let failures = drain_events(&mut events)
            .into_iter()
            .filter(|e| matches!(e, EngineEvent::StepExecutionFailed { .. }))
            .count();
        assert_eq!(failures, 2);
        assert_eq!(engine.active_steps("two"), BTreeSet::from(["A".to_string()]));
    }

    #[tokio::test]
    async fn test_reload_prunes_removed_steps() {
        let recorder = Arc::new(RecordingExecutor::new());
        let (engine, mut events) = engine_with(recorder.clone());
        engine
            .load(Protocol::new(
                "p",
                "P",
                vec![Step::new("old", "old")
                    .completes_when(Condition::environmental(ConditionOperator::Equals, "done"))],
            ))
            .unwrap();
        engine.activate("p", Context::new()).await.unwrap();

        engine
            .load(Protocol::new("p", "P v2", vec![Step::new("new", "new")]))
            .unwrap();
        assert!(engine.is_active("p"));
        drain_events(&mut events);

        engine.on_situation_update(Context::new()).await;

        assert_eq!(
            drain_events(&mut events),
            vec![EngineEvent::ProtocolDeactivated {
                id: "p".into(),
                reason: DeactivationReason::DefinitionChanged,
            }]
        );
        assert_eq!(recorder.count("new"), 0);
    }

    #[tokio::test]
    async fn test_deactivate_discards_in_flight_result() {
        let gated = Arc::new(GatedExecutor::new("hold"));
        let (engine, mut events) = engine_with(gated.clone());
        engine
            .load(Protocol::new(
                "p",
                "P",
                vec![Step::new("a", "hold").then(["b"]), Step::new("b", "after")],
            ))
            .unwrap();

        let running = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.activate("p", Context::new()).await })
        };
        gated.wait_started().await;

        engine.deactivate("p");
        gated.release(1);
        running.await.unwrap().unwrap();

        assert_eq!(gated.count("after"), 0);
        assert!(!engine.is_active("p"));
        let events = drain_events(&mut events);
        assert!(step_ids(&events).is_empty());
        assert!(!events
            .iter()
            .any(|e| matches!(e, EngineEvent::ProtocolCompleted { .. })));
    }

    #[tokio::test]
    async fn test_reactivation_restarts_from_entry() {
        let recorder = Arc::new(RecordingExecutor::new());
        let (engine, _events) = engine_with(recorder.clone());
        engine
            .load(Protocol::new(
                "p",
                "P",
                vec![
                    Step::new("entry", "entry").then(["wait"]),
                    Step::new("wait", "wait")
                        .completes_when(Condition::tactical(ConditionOperator::Equals, "go")),
                ],
            ))
            .unwrap();

        engine.activate("p", Context::new()).await.unwrap();
        engine.activate("p", Context::new()).await.unwrap();

        assert_eq!(recorder.count("entry"), 2);
        assert_eq!(engine.active_steps("p"), BTreeSet::from(["wait".to_string()]));
    }

    #[tokio::test]
    async fn test_concurrency_limit() {
        let slow = Arc::new(SlowExecutor::new(Duration::from_millis(20)));
        let engine = ProtocolEngine::with_options(
            slow.clone(),
            EngineOptions::default().with_max_concurrency(2),
        );
        engine
            .load(Protocol::new(
                "wide",
                "Wide",
                vec![
                    Step::new("entry", "noop").then(["s1", "s2", "s3", "s4", "s5"]),
                    Step::new("s1", "noop"),
                    Step::new("s2", "noop"),
                    Step::new("s3", "noop"),
                    Step::new("s4", "noop"),
                    Step::new("s5", "noop"),
                ],
            ))
            .unwrap();

        engine.activate("wide", Context::new()).await.unwrap();

        assert_eq!(slow.peak(), 2);
        assert!(!engine.is_active("wide"));
    }

    #[tokio::test]
    async fn test_retry_option_recovers_in_one_round() {
        let flaky = Arc::new(crate::backends::stub::FlakyExecutor::new(1));
        let engine = ProtocolEngine::with_options(
            flaky.clone(),
            EngineOptions::default().with_retry(RetryConfig::bounded(1, 1)),
        );
        let mut events = engine.subscribe();
        engine.load(two_step()).unwrap();

        engine.activate("two", Context::new()).await.unwrap();

        assert!(!engine.is_active("two"));
        assert!(!drain_events(&mut events)
            .iter()
            .any(|e| matches!(e, EngineEvent::StepExecutionFailed { .. })));
    }

    #[tokio::test]
    async fn test_invalid_load_rejected() {
        let (engine, mut events) = engine_with(Arc::new(RecordingExecutor::new()));
        let result = engine.load(Protocol::new(
            "bad",
            "Bad",
            vec![Step::new("a", "noop").then(["ghost"])],
        ));

        assert!(matches!(
            result,
            Err(ValidationError::DanglingStepReference { .. })
        ));
        assert!(engine.protocol("bad").is_none());
        assert!(drain_events(&mut events).is_empty());
    }
}
