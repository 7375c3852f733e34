//! Interrupt handling.
//!
//! [`InterruptController::supervise`] races a pipeline run against an
//! interrupt channel. What happens on an interrupt depends on the state the
//! run reached:
//!
//! - while the bucket or stack may still be missing, or between remote
//!   changes, the run is dropped and nothing remote is touched;
//! - while a template is being applied, the in-flight update is cancelled.
//!   If the control plane answers that the update already finished, the
//!   previous version's stored template is applied again, or nothing is done
//!   when this was the first version;
//! - while already reverting, further interrupts are only logged.

use std::fmt;
use std::future::Future;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::{HalldyllError, PipelineError, Result};
use crate::state::{DeploymentRepository, VersionLabel};

use super::apply::StackApplier;
use super::deploy::DeployOutcome;
use super::state::{Checkpoint, PipelineState, StateTracker};

/// Reaction to an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// Stop the run without touching anything remote.
    Terminate,
    /// Cancel or undo the in-flight update.
    Revert,
    /// A revert is already running.
    AlreadyReverting,
}

/// Picks the reaction to an interrupt received in `state`.
#[must_use]
pub const fn classify(state: PipelineState) -> InterruptAction {
    if state.is_reverting() {
        InterruptAction::AlreadyReverting
    } else if state.is_applying() {
        InterruptAction::Revert
    } else {
        InterruptAction::Terminate
    }
}

/// How an interrupted run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptOutcome {
    /// The run was dropped.
    Terminated {
        /// State the run was in.
        state: PipelineState,
    },
    /// The in-flight update was cancelled and rolled back by the stack.
    Cancelled,
    /// The update had completed; the previous version was applied again.
    RolledBack {
        /// Version restored.
        version: VersionLabel,
    },
    /// The update of the first version had completed and was left in place.
    CompletedFirstVersion {
        /// Version left on the stack.
        version: Option<VersionLabel>,
    },
}

impl InterruptOutcome {
    /// Error reported for the interrupted run.
    #[must_use]
    pub fn into_error(self, stack: &str) -> HalldyllError {
        match self {
            Self::Terminated { state } => PipelineError::Interrupted {
                state: state.to_string(),
            },
            Self::Cancelled => PipelineError::Cancelled {
                stack: stack.to_string(),
            },
            Self::RolledBack { .. } | Self::CompletedFirstVersion { .. } => {
                PipelineError::Interrupted {
                    state: PipelineState::UnexpectedlyUpdated.to_string(),
                }
            }
        }
        .into()
    }
}

impl fmt::Display for InterruptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminated { state } => write!(f, "terminated during {state}"),
            Self::Cancelled => write!(f, "update cancelled"),
            Self::RolledBack { version } => {
                write!(f, "update had completed, restored {version}")
            }
            Self::CompletedFirstVersion { version: Some(version) } => {
                write!(f, "update had completed, {version} left in place")
            }
            Self::CompletedFirstVersion { version: None } => {
                write!(f, "update had completed")
            }
        }
    }
}

/// What a supervised run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Supervised {
    /// The run finished on its own.
    Finished(DeployOutcome),
    /// The run was interrupted.
    Interrupted(InterruptOutcome),
}

/// Reacts to interrupts of a pipeline run.
#[derive(Debug, Clone)]
pub struct InterruptController {
    applier: StackApplier,
    repository: DeploymentRepository,
}

impl InterruptController {
    /// Creates a controller issuing compensating calls through `applier`.
    #[must_use]
    pub const fn new(applier: StackApplier, repository: DeploymentRepository) -> Self {
        Self {
            applier,
            repository,
        }
    }

    /// Drives `pipeline` until it finishes or an interrupt arrives.
    ///
    /// `tracker` must be the tracker of the session the pipeline runs on.
    /// A closed interrupt channel is ignored.
    ///
    /// # Errors
    ///
    /// Returns the pipeline's error, or the error of a compensating call.
    pub async fn supervise<F>(
        &self,
        pipeline: F,
        tracker: &StateTracker,
        stack: &str,
        interrupts: &mut mpsc::Receiver<()>,
    ) -> Result<Supervised>
    where
        F: Future<Output = Result<DeployOutcome>>,
    {
        let mut pipeline = Box::pin(pipeline);

        loop {
            tokio::select! {
                result = &mut pipeline => return result.map(Supervised::Finished),
                Some(()) = interrupts.recv() => {
                    let checkpoint = tracker.checkpoint();
                    warn!("Interrupt received during {}", checkpoint.state);

                    match classify(checkpoint.state) {
                        InterruptAction::AlreadyReverting => {
                            info!("Reversion in progress, ignoring interrupt");
                        }
                        InterruptAction::Terminate => {
                            drop(pipeline);
                            return Ok(Supervised::Interrupted(InterruptOutcome::Terminated {
                                state: checkpoint.state,
                            }));
                        }
                        InterruptAction::Revert => {
                            drop(pipeline);
                            let outcome = self
                                .revert_guarded(checkpoint, tracker, stack, interrupts)
                                .await?;
                            return Ok(Supervised::Interrupted(outcome));
                        }
                    }
                }
            }
        }
    }

    /// Reverts while logging any further interrupt.
    async fn revert_guarded(
        &self,
        checkpoint: Checkpoint,
        tracker: &StateTracker,
        stack: &str,
        interrupts: &mut mpsc::Receiver<()>,
    ) -> Result<InterruptOutcome> {
        let mut revert = Box::pin(self.revert(checkpoint, tracker, stack));

        loop {
            tokio::select! {
                outcome = &mut revert => return outcome,
                Some(()) = interrupts.recv() => {
                    let state = tracker.state();
                    if classify(state) == InterruptAction::AlreadyReverting {
                        info!("Reversion in progress ({state}), please wait");
                    }
                }
            }
        }
    }

    /// Cancels the in-flight update, or undoes it if it already completed.
    ///
    /// # Errors
    ///
    /// Returns any error other than the "cannot cancel" answer, and any error
    /// of restoring the previous version.
    pub async fn revert(
        &self,
        checkpoint: Checkpoint,
        tracker: &StateTracker,
        stack: &str,
    ) -> Result<InterruptOutcome> {
        tracker.transition(PipelineState::Reverting);
        tracker.transition(PipelineState::Cancelling);

        match self.applier.cancel(stack).await {
            Ok(description) => {
                info!("Update of {stack} cancelled ({})", description.status);
                Ok(InterruptOutcome::Cancelled)
            }
            Err(e) if e.is_cannot_cancel() => {
                tracker.transition(PipelineState::UnexpectedlyUpdated);

                if let Some(previous) = checkpoint.previous_version {
                    info!("Restoring {previous}");
                    let template = self.repository.load_template(previous).await?;
                    self.applier.apply(stack, &template).await?;
                    Ok(InterruptOutcome::RolledBack { version: previous })
                } else {
                    info!("First version was deployed, nothing to restore");
                    Ok(InterruptOutcome::CompletedFirstVersion {
                        version: checkpoint.version,
                    })
                }
            }
            Err(e) => Err(e),
        }
    }
}
