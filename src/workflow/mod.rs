//! Deferred-execution state machines: delay windows, owner approvals,
//! and the owner binding lifecycle. These mutate transaction and wallet
//! rows through conditional updates only; notification fan-out happens
//! at the pipeline layer.

pub mod approval;
pub mod delay_queue;
pub mod owner_lifecycle;

pub use approval::{ApprovalStore, ApprovalWorkflow};
pub use delay_queue::{DelayQueue, DelayWindow};
pub use owner_lifecycle::{OwnerLifecycle, OwnerStore};
