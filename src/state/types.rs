//! Deployment manifest types.
//!
//! The manifest is the only piece of remote state the orchestrator owns. It
//! records which version is live, the content hash of every version ever
//! deployed and a bounded history of operations.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// Number of history entries kept in the manifest.
pub const MAX_HISTORY_ENTRIES: usize = 100;

/// Prefix of every version label.
const VERSION_PREFIX: char = 'v';

/// A version label such as `v3`.
///
/// Ordering follows the numeric suffix, so `v10` sorts after `v9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionLabel(u64);

/// Outcome of comparing a fresh digest with the active version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionDecision {
    /// The digest equals the active version's hash.
    Unchanged {
        /// The active version.
        version: VersionLabel,
    },
    /// A new version has to be deployed.
    NewVersion {
        /// Label for the new version.
        version: VersionLabel,
    },
}

/// Kind of operation recorded in the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// A new version went live through the deploy pipeline.
    Deploy,
    /// A stored version was re-applied.
    Rollback,
}

/// An entry in the manifest history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Version that became active.
    pub version: VersionLabel,
    /// Content hash of that version.
    pub hash: String,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub operation: Operation,
}

/// The persisted deployment manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Application identifier the bucket belongs to.
    pub identifier: String,
    /// Version currently serving traffic.
    #[serde(default)]
    pub active_version: Option<VersionLabel>,
    /// Content hash recorded for every deployed version.
    #[serde(default)]
    pub version_hashes: BTreeMap<VersionLabel, String>,
    /// Public base URL of the API, once published.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Recent operations, oldest first.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl VersionLabel {
    /// The first version, `v1`.
    pub const FIRST: Self = Self(1);

    /// Creates a label from its number.
    #[must_use]
    pub const fn new(number: u64) -> Self {
        Self(number)
    }

    /// Numeric suffix of the label.
    #[must_use]
    pub const fn number(self) -> u64 {
        self.0
    }

    /// The label following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// The label following `active`, or `v1` when nothing is active.
    #[must_use]
    pub const fn after(active: Option<Self>) -> Self {
        match active {
            Some(label) => label.next(),
            None => Self::FIRST,
        }
    }
}

impl FromStr for VersionLabel {
    type Err = StateError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let invalid = || StateError::InvalidVersion {
            label: label.to_string(),
        };

        let digits = label.strip_prefix(VERSION_PREFIX).ok_or_else(invalid)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        digits.parse::<u64>().map(Self).map_err(|_| invalid())
    }
}

impl TryFrom<String> for VersionLabel {
    type Error = StateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionLabel> for String {
    fn from(label: VersionLabel) -> Self {
        label.to_string()
    }
}

impl fmt::Display for VersionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{VERSION_PREFIX}{}", self.0)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deploy => write!(f, "deploy"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

impl Manifest {
    /// Creates an empty manifest for an application.
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            active_version: None,
            version_hashes: BTreeMap::new(),
            base_url: None,
            updated_at: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Fails unless the manifest belongs to `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::IdentityMismatch`] on a foreign manifest.
    pub fn verify_identity(&self, expected: &str) -> Result<(), StateError> {
        if self.identifier == expected {
            Ok(())
        } else {
            Err(StateError::IdentityMismatch {
                expected: expected.to_string(),
                found: self.identifier.clone(),
            })
        }
    }

    /// Content hash of the active version.
    #[must_use]
    pub fn active_hash(&self) -> Option<&str> {
        self.active_version
            .and_then(|v| self.version_hashes.get(&v))
            .map(String::as_str)
    }

    /// Content hash recorded for `version`.
    #[must_use]
    pub fn hash_for(&self, version: VersionLabel) -> Option<&str> {
        self.version_hashes.get(&version).map(String::as_str)
    }

    /// Compares a fresh digest with the active version.
    ///
    /// A new version is labelled after the latest recorded one, which is the
    /// active version unless a rollback happened.
    #[must_use]
    pub fn diff(&self, digest: &str) -> VersionDecision {
        match self.active_version {
            Some(version) if self.active_hash() == Some(digest) => {
                VersionDecision::Unchanged { version }
            }
            active => {
                let latest = self.version_hashes.keys().next_back().copied().max(active);
                VersionDecision::NewVersion {
                    version: VersionLabel::after(latest),
                }
            }
        }
    }

    /// Records the content hash of a version.
    ///
    /// Re-recording the same hash is accepted; a different hash for a label
    /// that already has one is refused.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Corrupted`] if the label already carries another
    /// hash.
    pub fn record_version(
        &mut self,
        version: VersionLabel,
        hash: impl Into<String>,
    ) -> Result<(), StateError> {
        let hash = hash.into();
        match self.version_hashes.get(&version) {
            Some(existing) if *existing != hash => Err(StateError::Corrupted {
                message: format!(
                    "version {version} is already recorded with hash {existing}"
                ),
            }),
            Some(_) => Ok(()),
            None => {
                self.version_hashes.insert(version, hash);
                self.updated_at = Utc::now();
                Ok(())
            }
        }
    }

    /// Makes `version` the active version and appends a history entry.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownVersion`] if no hash was recorded for it.
    pub fn activate(&mut self, version: VersionLabel, operation: Operation) -> Result<(), StateError> {
        let hash = self
            .hash_for(version)
            .ok_or_else(|| StateError::UnknownVersion {
                version: version.to_string(),
            })?
            .to_string();

        let now = Utc::now();
        self.active_version = Some(version);
        self.updated_at = now;
        self.history.push(HistoryEntry {
            version,
            hash,
            timestamp: now,
            operation,
        });

        if self.history.len() > MAX_HISTORY_ENTRIES {
            let excess = self.history.len() - MAX_HISTORY_ENTRIES;
            self.history.drain(..excess);
        }

        Ok(())
    }

    /// Forgets the active version once the stack is gone.
    ///
    /// Recorded hashes stay, so the next deploy continues the numbering
    /// instead of reusing a label whose copies are still in the bucket.
    pub fn deactivate(&mut self) {
        self.active_version = None;
        self.base_url = None;
        self.updated_at = Utc::now();
    }
}
