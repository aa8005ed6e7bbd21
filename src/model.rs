//! Core data model.
//!
//! An item is an opaque payload plus lifecycle status. Callers only ever see
//! payloads and ack tokens; the row id stays internal to the engine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a stored item.
///
/// Removed items have no status: their row is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Available for claiming.
    Pending,
    /// Claimed with an ack token, awaiting confirmation.
    Processing,
    /// Confirmed and retained. Terminal.
    Completed,
}

impl Status {
    /// Can an item move from self to `to`? `None` means the row is deleted.
    ///
    /// `Processing -> Pending` is only taken by orphan recovery. Completed
    /// items never move again.
    pub fn can_transition_to(self, to: Option<Status>) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (Pending, Some(Processing) | None)
                | (Processing, Some(Completed) | Some(Pending) | None)
        )
    }

    /// Label used in spans and metrics, where `None` is a removed item.
    pub fn label(status: Option<Status>) -> &'static str {
        status.map_or("removed", Status::as_str)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Processing => "processing",
            Status::Completed => "completed",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Status::Pending),
            "processing" => Ok(Status::Processing),
            "completed" => Ok(Status::Completed),
            _ => Err(Error::Other(format!("unknown status: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Ack token
// ---------------------------------------------------------------------------

/// Credential returned by a claim, required to confirm completion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AckToken(String);

impl AckToken {
    /// Mint a fresh, globally unique token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AckToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for AckToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AckToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Claim / stats
// ---------------------------------------------------------------------------

/// An item claimed through [`crate::Queue::dequeue_with_ack`].
#[derive(Debug, Clone)]
pub struct Claimed {
    pub payload: Vec<u8>,
    pub ack_token: AckToken,
}

/// Row counts per status for one queue table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed
    }
}
