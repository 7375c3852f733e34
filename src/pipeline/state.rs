//! Lifecycle states of a deployment run.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use crate::state::VersionLabel;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    /// Nothing has happened yet.
    Idle,
    /// Looking up the deployment bucket.
    FetchingBucket,
    /// The bucket exists.
    FetchedBucket,
    /// Creating the deployment bucket.
    CreatingBucket,
    /// The bucket was created.
    CreatedBucket,
    /// Looking up the stack.
    FetchingStack,
    /// The stack exists.
    FetchedStack,
    /// Creating the stack from the base template.
    Creating,
    /// The stack was created.
    Created,
    /// Reading the active version.
    FetchingVersion,
    /// The active version is known.
    FetchedVersion,
    /// Hashing sources and comparing with the active version.
    Verifying,
    /// Packaging functions.
    Compressing,
    /// Functions are packaged.
    Compressed,
    /// Applying the full template.
    Updating,
    /// The full template is applied.
    Updated,
    /// Uploading artifacts.
    Uploading,
    /// Artifacts are uploaded.
    Uploaded,
    /// Smoke-testing functions.
    Pinging,
    /// Every function answered.
    Pinged,
    /// Applying the stage template.
    Deploying,
    /// The new version is live.
    Deployed,
    /// Reacting to an interrupt.
    Reverting,
    /// Cancelling the in-flight update.
    Cancelling,
    /// The update completed before it could be cancelled.
    UnexpectedlyUpdated,
}

impl PipelineState {
    /// Name used in logs and output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::FetchingBucket => "FETCHING_BUCKET",
            Self::FetchedBucket => "FETCHED_BUCKET",
            Self::CreatingBucket => "CREATING_BUCKET",
            Self::CreatedBucket => "CREATED_BUCKET",
            Self::FetchingStack => "FETCHING_STACK",
            Self::FetchedStack => "FETCHED_STACK",
            Self::Creating => "CREATING",
            Self::Created => "CREATED",
            Self::FetchingVersion => "FETCHING_VERSION",
            Self::FetchedVersion => "FETCHED_VERSION",
            Self::Verifying => "VERIFYING",
            Self::Compressing => "COMPRESSING",
            Self::Compressed => "COMPRESSED",
            Self::Updating => "UPDATING",
            Self::Updated => "UPDATED",
            Self::Uploading => "UPLOADING",
            Self::Uploaded => "UPLOADED",
            Self::Pinging => "PINGING",
            Self::Pinged => "PINGED",
            Self::Deploying => "DEPLOYING",
            Self::Deployed => "DEPLOYED",
            Self::Reverting => "REVERTING",
            Self::Cancelling => "CANCELLING",
            Self::UnexpectedlyUpdated => "UNEXPECTEDLY_UPDATED",
        }
    }

    /// Returns true while a template is being applied to the stack.
    #[must_use]
    pub const fn is_applying(self) -> bool {
        matches!(self, Self::Updating | Self::Deploying)
    }

    /// Returns true once an interrupt is being handled.
    #[must_use]
    pub const fn is_reverting(self) -> bool {
        matches!(
            self,
            Self::Reverting | Self::Cancelling | Self::UnexpectedlyUpdated
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a run, readable from outside the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    /// Current state.
    pub state: PipelineState,
    /// Version active before the run.
    pub previous_version: Option<VersionLabel>,
    /// Version being deployed.
    pub version: Option<VersionLabel>,
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self {
            state: PipelineState::Idle,
            previous_version: None,
            version: None,
        }
    }
}

/// Publishes checkpoints of a run.
///
/// The pipeline writes through it while the interrupt controller reads the
/// latest checkpoint from another branch of the same task.
#[derive(Debug, Clone)]
pub struct StateTracker {
    sender: Arc<watch::Sender<Checkpoint>>,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    /// Creates a tracker in [`PipelineState::Idle`].
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(Checkpoint::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Moves to `state`.
    pub fn transition(&self, state: PipelineState) {
        info!("[{state}]");
        self.sender.send_modify(|checkpoint| checkpoint.state = state);
    }

    /// Records the versions involved in the run.
    pub fn set_versions(&self, previous: Option<VersionLabel>, version: Option<VersionLabel>) {
        self.sender.send_modify(|checkpoint| {
            checkpoint.previous_version = previous;
            checkpoint.version = version;
        });
    }

    /// Latest checkpoint.
    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        *self.sender.borrow()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.sender.borrow().state
    }

    /// Receiver notified on every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Checkpoint> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[test]
    fn test_state_names() {
        assert_eq!(PipelineState::FetchingBucket.to_string(), "FETCHING_BUCKET");
        assert_eq!(
            PipelineState::UnexpectedlyUpdated.to_string(),
            "UNEXPECTEDLY_UPDATED"
        );
        assert_eq!(
            serde_json::to_string(&PipelineState::CreatedBucket).expect("json"),
            "\"CREATED_BUCKET\""
        );
    }

    #[test]
    fn test_phases() {
        assert!(PipelineState::Deploying.is_applying());
        assert!(!PipelineState::Uploading.is_applying());
        assert!(PipelineState::Cancelling.is_reverting());
    }

    #[tokio::test]
    async fn test_tracker_publishes_checkpoints() {
        let tracker = StateTracker::new();
        let mut receiver = tracker.subscribe();
        assert_eq!(tracker.state(), PipelineState::Idle);

        let writer = tracker.clone();
        writer.transition(PipelineState::Updating);
        writer.set_versions(Some(VersionLabel::new(2)), Some(VersionLabel::new(3)));

        assert_ok!(receiver.changed().await);
        let checkpoint = *receiver.borrow_and_update();
        assert_eq!(checkpoint.state, PipelineState::Updating);
        assert_eq!(checkpoint, tracker.checkpoint());
        assert_eq!(checkpoint.previous_version, Some(VersionLabel::new(2)));
    }
}
