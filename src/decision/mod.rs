// Decision layer
// Turns heartbeat events and operator messages into dispatched capability calls

pub mod decider;
pub mod engine;

pub use decider::{Decider, Decision, LlmDecider, DEFAULT_SYSTEM_PROMPT};
pub use engine::{heartbeat_prompt, DecisionEngine};
