//! Support desk intake pipeline.
//!
//! Classifies an incoming ticket description, creates the ticket in the
//! workflow service, and arms the two-stage deferred escalation from the
//! `escalation` crate.

pub mod classifier;
pub mod config;
pub mod errors;
pub mod orchestrator;
pub mod telemetry;
pub mod workflow_client;

pub use classifier::{ClassificationError, Classifier, HttpClassifier};
pub use config::{DeployEnv, DeskConfig};
pub use errors::{PipelineError, PipelineStage};
pub use orchestrator::{CreatedTicket, TicketPipeline};
pub use workflow_client::HttpWorkflowClient;
