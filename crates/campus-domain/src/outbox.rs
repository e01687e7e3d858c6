//! Outbox vocabulary: event lifecycle states and well-known topics.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Topic for provisioning a login account for a newly enrolled student.
pub const TOPIC_PROVISION_STUDENT: &str = "auth_provision_student";

/// Topic for provisioning a login account for a guardian.
pub const TOPIC_PROVISION_GUARDIAN: &str = "auth_provision_guardian";

/// Lifecycle state of an outbox event.
///
/// ```text
/// pending --claim--> processing --ok--> processed
///                    processing --err, attempts < max--> failed --> pending (after backoff)
///                    processing --err, attempts >= max--> dead
/// ```
///
/// `Processed` and `Dead` are terminal. `Failed` is the outcome of a retryable
/// failure; the row itself goes back to `Pending` with a future `next_run_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Processing,
    Processed,
    Failed,
    Dead,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
            Self::Dead => "dead",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Dead)
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown outbox status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OutboxStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            "dead" => Ok(Self::Dead),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}
