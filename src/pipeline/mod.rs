//! Deployment pipeline for the Halldyll function deployment system.
//!
//! This module provides:
//! - The deployment session and its lifecycle states
//! - The staged deploy pipeline
//! - Interrupt handling with cancel and restore
//! - Rollback and destroy

mod apply;
mod deploy;
mod destroy;
mod interrupt;
mod rollback;
mod session;
mod smoke;
mod state;

pub use apply::{ApplyOutcome, StackApplier};
pub use deploy::{DeployOutcome, DeployedFunction, Pipeline};
pub use destroy::Destroy;
pub use interrupt::{
    InterruptAction, InterruptController, InterruptOutcome, Supervised, classify,
};
pub use rollback::{Rollback, RollbackOutcome};
pub use session::{DeploymentSession, project_digest};
pub use smoke::{DEFAULT_SENTINEL, SmokeTest, expected_ack};
pub use state::{Checkpoint, PipelineState, StateTracker};
