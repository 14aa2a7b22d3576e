//! Workflow service contract: the remote calls the pipeline consumes.
//!
//! Implementations are thin, stateless facades. Every call is a single
//! remote round-trip with no local retry; failures surface as
//! [`WorkflowError`] and are classified by [`ErrorClass::resolve`].
//!
//! `mark_fired` and `assign_idle_agent` must be safe to call on a ticket that
//! has already moved past `Open`: the service answers with the current
//! projection instead of failing.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::ticket::{NewTicket, Ticket, TicketId, TicketStatus};

/// Tenant identity and access credential attached to every workflow call.
#[derive(Clone, PartialEq, Eq)]
pub struct CallMetadata {
    pub app_id: i32,
    pub access_token: String,
}

impl CallMetadata {
    pub fn new(app_id: i32, access_token: impl Into<String>) -> Self {
        Self {
            app_id,
            access_token: access_token.into(),
        }
    }
}

// The token must never reach the logs.
impl fmt::Debug for CallMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallMetadata")
            .field("app_id", &self.app_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Taxonomy class of a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    UserExists,
    InvalidCredentials,
    Unauthenticated,
    NotFound,
    Internal,
}

impl ErrorClass {
    const MSG_USER_EXISTS: &'static str = "user already exists";
    const MSG_INVALID_CREDENTIALS: &'static str = "invalid credentials";
    const MSG_UNAUTHENTICATED: &'static str = "Unauthenticated";

    /// Map a remote failure to its taxonomy class.
    ///
    /// Known service messages win; otherwise the transport status decides,
    /// and anything unrecognised is `Internal`.
    pub fn resolve(status: Option<u16>, message: &str) -> Self {
        match message.trim() {
            Self::MSG_USER_EXISTS => return Self::UserExists,
            Self::MSG_INVALID_CREDENTIALS => return Self::InvalidCredentials,
            Self::MSG_UNAUTHENTICATED => return Self::Unauthenticated,
            _ => {}
        }

        match status {
            Some(401) => Self::Unauthenticated,
            Some(404) => Self::NotFound,
            _ => Self::Internal,
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserExists => write!(f, "user_exists"),
            Self::InvalidCredentials => write!(f, "invalid_credentials"),
            Self::Unauthenticated => write!(f, "unauthenticated"),
            Self::NotFound => write!(f, "not_found"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Opaque failure of a workflow remote call.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The service answered with an error.
    #[error("workflow rejected call [{class}]: {message}")]
    Remote { class: ErrorClass, message: String },

    /// The call never produced an answer (connect, timeout, reset).
    #[error("workflow transport failure: {0}")]
    Transport(String),

    /// The service answered but the body was not a ticket projection.
    #[error("workflow response could not be decoded: {0}")]
    Decode(String),
}

impl WorkflowError {
    pub fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Remote {
            class: ErrorClass::resolve(status, &message),
            message,
        }
    }

    /// Taxonomy class; transport and decode failures are `Internal`.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Remote { class, .. } => *class,
            Self::Transport(_) | Self::Decode(_) => ErrorClass::Internal,
        }
    }
}

/// Typed facade over the backend workflow service.
#[async_trait]
pub trait WorkflowClient: Send + Sync {
    /// Persist a classified ticket and return it with its new identity.
    async fn create_ticket(
        &self,
        meta: &CallMetadata,
        ticket: &NewTicket,
    ) -> Result<Ticket, WorkflowError>;

    /// Escalation stage 1: mark the ticket as unanswered past its reaction time.
    async fn mark_fired(&self, meta: &CallMetadata, id: TicketId)
        -> Result<Ticket, WorkflowError>;

    /// Escalation stage 2: hand the ticket to an idle agent.
    async fn assign_idle_agent(
        &self,
        meta: &CallMetadata,
        id: TicketId,
    ) -> Result<Ticket, WorkflowError>;

    async fn get_ticket(&self, meta: &CallMetadata, id: TicketId)
        -> Result<Ticket, WorkflowError>;

    /// Advance the ticket one lifecycle step on behalf of an agent.
    async fn change_status(
        &self,
        meta: &CallMetadata,
        id: TicketId,
    ) -> Result<Ticket, WorkflowError>;

    async fn add_solution(
        &self,
        meta: &CallMetadata,
        id: TicketId,
        solution: &str,
    ) -> Result<Ticket, WorkflowError>;

    async fn remove_solution(
        &self,
        meta: &CallMetadata,
        id: TicketId,
    ) -> Result<Ticket, WorkflowError>;

    /// All tickets of the tenant, optionally only those in `status`.
    async fn list_tickets(
        &self,
        meta: &CallMetadata,
        status: Option<TicketStatus>,
    ) -> Result<Vec<Ticket>, WorkflowError>;
}
