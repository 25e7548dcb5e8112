pub mod activation;
pub mod events;
pub mod protocol_engine;
pub mod situation_feed;
pub mod step_executor;

pub use activation::{ActivationState, Advance, Epoch};
pub use events::{drain_events, DeactivationReason, EngineEvent, EventBus};
pub use protocol_engine::ProtocolEngine;
pub use situation_feed::{situation_channel, SituationFeed, SituationReceiver, SituationSender};
pub use step_executor::{StepExecutor, StepResult};
