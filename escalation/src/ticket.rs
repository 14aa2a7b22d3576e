//! Ticket model: the transient view of a support ticket held by the pipeline.
//!
//! Tickets are owned by the backend workflow service. The pipeline only ever
//! holds a projection returned by the last remote call.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque ticket identity assigned by the workflow service on creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub i64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TicketId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Ticket lifecycle status.
///
/// The declaration order is the lifecycle order; statuses only ever move
/// forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Created, nobody has reacted yet.
    Open,
    /// Unanswered past its expected reaction time.
    Fired,
    /// An agent owns the ticket.
    Assigned,
    /// Resolved. Terminal.
    Closed,
}

impl TicketStatus {
    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    pub fn can_advance_to(self, next: TicketStatus) -> bool {
        next > self
    }

    /// Whether the ticket is at or past `stage`.
    pub fn has_reached(self, stage: TicketStatus) -> bool {
        self >= stage
    }

    /// The next status in the lifecycle, `None` once closed.
    pub fn next(self) -> Option<TicketStatus> {
        match self {
            Self::Open => Some(Self::Fired),
            Self::Fired => Some(Self::Assigned),
            Self::Assigned => Some(Self::Closed),
            Self::Closed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown ticket status '{0}' (expected open, fired, assigned or closed)")]
pub struct ParseStatusError(pub String);

impl FromStr for TicketStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "fired" => Ok(Self::Fired),
            "assigned" => Ok(Self::Assigned),
            "closed" => Ok(Self::Closed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Fired => write!(f, "fired"),
            Self::Assigned => write!(f, "assigned"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Cluster a ticket description was classified into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    /// Numeric cluster index from the classifier.
    pub index: i64,
    /// Human-readable cluster name.
    pub name: String,
    /// Number of prior tickets in this cluster.
    pub frequency: i64,
}

/// Cluster assignment plus timing statistics for one description.
///
/// Produced once per ticket and consumed once by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub cluster: Cluster,
    /// Expected average handling time for tickets in this cluster.
    pub average_duration: Duration,
    /// Expected delay before a human typically reacts.
    pub average_reaction: Duration,
}

/// A ticket that has not been created yet, so it has no identity.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub classification: ClassificationResult,
}

impl NewTicket {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        classification: ClassificationResult,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            classification,
        }
    }
}

/// Ticket projection returned by the workflow service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fired_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<Cluster>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
}
