pub mod engine;

pub use engine::{PolicyConfig, PolicyDecision, PolicyEngine};
