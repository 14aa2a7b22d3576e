//! Pipeline orchestrator: classify → create → arm escalation.
//!
//! ```text
//! create_ticket_with_escalation(title, description, cancel)
//!   → classifier.classify(description)      fails: Classify, nothing persisted
//!   → workflow.create_ticket(classified)    fails: Create, nothing armed
//!   → scheduler.arm(id, reaction, cancel)   returns at once
//!   → Ok(ticket)                            escalation continues detached
//! ```
//!
//! The same cancellation token covers every step: cancelling while classify
//! or create is in flight aborts the run, cancelling afterwards suppresses
//! the escalation stages that have not fired yet.

use std::sync::Arc;

use escalation::escalation::{EscalationConfig, EscalationHandle, EscalationScheduler};
use escalation::ticket::{ClassificationResult, NewTicket, Ticket};
use escalation::workflow::{CallMetadata, WorkflowClient};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Instrument};
use uuid::Uuid;

use crate::classifier::Classifier;
use crate::errors::{PipelineError, PipelineStage};
use crate::telemetry;

/// Result of a successful pipeline run.
#[derive(Debug)]
pub struct CreatedTicket {
    pub ticket: Ticket,
    pub classification: ClassificationResult,
    /// Escalation armed for `ticket`. Drop it to let the escalation run detached.
    pub escalation: EscalationHandle,
}

pub struct TicketPipeline {
    classifier: Arc<dyn Classifier>,
    workflow: Arc<dyn WorkflowClient>,
    scheduler: EscalationScheduler,
}

impl TicketPipeline {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        workflow: Arc<dyn WorkflowClient>,
        escalation: EscalationConfig,
    ) -> Self {
        let scheduler = EscalationScheduler::new(Arc::clone(&workflow), escalation);
        Self {
            classifier,
            workflow,
            scheduler,
        }
    }

    pub fn scheduler(&self) -> &EscalationScheduler {
        &self.scheduler
    }

    /// Classify, create and arm escalation for one ticket.
    ///
    /// Returns as soon as the ticket exists; both escalation stages run in the
    /// background until they fire or `cancel` is triggered.
    pub async fn create_ticket_with_escalation(
        &self,
        meta: &CallMetadata,
        title: &str,
        description: &str,
        cancel: &CancellationToken,
    ) -> Result<CreatedTicket, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = telemetry::pipeline_run_span(&run_id);

        let result = self
            .run(meta, title, description, cancel)
            .instrument(span.clone())
            .await;

        match &result {
            Ok(created) => telemetry::record_created(&span, created.ticket.id),
            Err(e) => telemetry::record_failed_stage(&span, e.stage()),
        }
        result
    }

    async fn run(
        &self,
        meta: &CallMetadata,
        title: &str,
        description: &str,
        cancel: &CancellationToken,
    ) -> Result<CreatedTicket, PipelineError> {
        info!("create ticket");

        let classification = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(stage = %PipelineStage::Classify, "pipeline cancelled");
                return Err(PipelineError::Cancelled { stage: PipelineStage::Classify });
            }
            res = self.classifier.classify(description) => res.map_err(|e| {
                error!(error = %e, "failed to classify ticket description");
                PipelineError::Classify(e)
            })?,
        };

        info!(
            cluster = %classification.cluster.name,
            cluster_index = classification.cluster.index,
            reaction_secs = classification.average_reaction.as_secs_f64(),
            "description classified"
        );

        let new_ticket = NewTicket::new(title, description, classification.clone());
        let ticket = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(stage = %PipelineStage::Create, "pipeline cancelled");
                return Err(PipelineError::Cancelled { stage: PipelineStage::Create });
            }
            res = self.workflow.create_ticket(meta, &new_ticket) => res.map_err(|e| {
                error!(error = %e, class = %e.class(), "failed to create ticket");
                PipelineError::Create(e)
            })?,
        };

        info!(ticket_id = %ticket.id, "ticket created");

        // Arming strictly after creation: no stage can target a missing ticket.
        let escalation = self.scheduler.arm(
            ticket.id,
            classification.average_reaction,
            meta.clone(),
            cancel,
        );

        Ok(CreatedTicket {
            ticket,
            classification,
            escalation,
        })
    }
}
