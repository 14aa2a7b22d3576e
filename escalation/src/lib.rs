//! Support ticket escalation library
//!
//! This library provides:
//! - The ticket model as seen by the classification-to-escalation pipeline
//! - The workflow service contract (`WorkflowClient`) and its error taxonomy
//! - The escalation scheduler that marks tickets fired and then assigns an
//!   idle agent, each after a data-driven delay
//!
//! Transport adapters and the pipeline orchestrator live in `support-desk`.

pub mod escalation;
pub mod ticket;
pub mod workflow;

pub use escalation::{
    EscalationConfig, EscalationHandle, EscalationOutcome, EscalationScheduler,
};
pub use ticket::{
    ClassificationResult, Cluster, NewTicket, ParseStatusError, Ticket, TicketId, TicketStatus,
};
pub use workflow::{CallMetadata, ErrorClass, WorkflowClient, WorkflowError};
