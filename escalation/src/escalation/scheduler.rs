//! Escalation scheduler: arms the two deferred stages for a created ticket.
//!
//! Each armed ticket gets one detached task that walks the
//! [`EscalationStateMachine`]: sleep until `fire_at`, call `mark_fired`, and
//! only on success sleep until `assign_at` and call `assign_idle_agent`.
//! Both sleeps race the caller's cancellation token and the scheduler's own
//! shutdown token; cancellation wins ties.
//!
//! Escalations live only in memory. A process exit loses every pending one.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::escalation::state::{
    EscalationOutcome, EscalationPhase, EscalationStateMachine, EscalationTimer,
};
use crate::ticket::{TicketId, TicketStatus};
use crate::workflow::{CallMetadata, WorkflowClient};

/// Default delay between the fire deadline and the assign deadline.
pub const DEFAULT_EXTRA_DELAY: Duration = Duration::from_secs(300);

/// Configuration for the Escalation Scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Fixed delay added to the reaction delay to get the stage 2 deadline.
    pub extra_delay: Duration,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            extra_delay: DEFAULT_EXTRA_DELAY,
        }
    }
}

/// Handle to one armed escalation.
///
/// Dropping the handle detaches the escalation; it keeps running.
#[derive(Debug)]
pub struct EscalationHandle {
    timer: EscalationTimer,
    cancel: CancellationToken,
    join: JoinHandle<EscalationOutcome>,
}

impl EscalationHandle {
    pub fn ticket_id(&self) -> TicketId {
        self.timer.ticket_id
    }

    pub fn timer(&self) -> &EscalationTimer {
        &self.timer
    }

    /// Cancel this ticket's escalation only.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the escalation to reach `Done`.
    pub async fn outcome(self) -> Result<EscalationOutcome, JoinError> {
        self.join.await
    }
}

/// Owns timing and cancellation of two-stage escalations.
pub struct EscalationScheduler {
    workflow: Arc<dyn WorkflowClient>,
    config: EscalationConfig,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl EscalationScheduler {
    pub fn new(workflow: Arc<dyn WorkflowClient>, config: EscalationConfig) -> Self {
        Self {
            workflow,
            config,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Arm both escalation stages for a freshly created ticket.
    ///
    /// Returns immediately; the stages run on a detached task. Must be
    /// called exactly once per created ticket.
    pub fn arm(
        &self,
        ticket_id: TicketId,
        reaction_delay: Duration,
        meta: CallMetadata,
        cancel: &CancellationToken,
    ) -> EscalationHandle {
        let timer = EscalationTimer::new(
            ticket_id,
            Instant::now(),
            reaction_delay,
            self.config.extra_delay,
        );
        let cancel = cancel.child_token();

        info!(
            ticket_id = %ticket_id,
            stage1_delay_secs = timer.stage1_delay().as_secs_f64(),
            stage2_delay_secs = timer.stage2_delay().as_secs_f64(),
            "escalation armed"
        );

        let run = EscalationRun {
            workflow: Arc::clone(&self.workflow),
            meta,
            timer,
            cancel: cancel.clone(),
            shutdown: self.shutdown.clone(),
        };
        let join = self.tracker.spawn(run.drive());

        EscalationHandle {
            timer,
            cancel,
            join,
        }
    }

    /// Number of escalations that have not reached `Done` yet.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Cancel every pending escalation and wait for their tasks to exit.
    ///
    /// Pending escalations are dropped, not persisted.
    pub async fn shutdown(&self) {
        let pending = self.pending();
        if pending > 0 {
            warn!(pending, "dropping pending escalations on shutdown");
        }
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

/// Everything one escalation task owns.
struct EscalationRun {
    workflow: Arc<dyn WorkflowClient>,
    meta: CallMetadata,
    timer: EscalationTimer,
    cancel: CancellationToken,
    shutdown: CancellationToken,
}

impl EscalationRun {
    async fn drive(self) -> EscalationOutcome {
        let ticket_id = self.timer.ticket_id;
        let mut sm = EscalationStateMachine::new(ticket_id);

        // Stage 1
        transition(&mut sm, EscalationPhase::WaitingStage1, None);
        if !self.wait_until(self.timer.fire_at).await {
            info!(ticket_id = %ticket_id, stage = 1, "escalation cancelled before fire");
            return conclude(&mut sm, EscalationOutcome::CancelledBeforeFire, None);
        }

        match self.workflow.mark_fired(&self.meta, ticket_id).await {
            Ok(ticket) => {
                if !ticket.status.has_reached(TicketStatus::Fired) {
                    warn!(
                        ticket_id = %ticket_id,
                        status = %ticket.status,
                        "workflow returned a ticket behind fired after mark_fired"
                    );
                }
                info!(ticket_id = %ticket_id, stage = 1, "ticket marked fired");
                transition(&mut sm, EscalationPhase::Fired, None);
            }
            Err(e) => {
                error!(ticket_id = %ticket_id, stage = 1, error = %e, "mark_fired failed");
                let reason = e.to_string();
                return conclude(&mut sm, EscalationOutcome::FireFailed, Some(&reason));
            }
        }

        // Stage 2
        transition(&mut sm, EscalationPhase::WaitingStage2, None);
        if !self.wait_until(self.timer.assign_at).await {
            info!(ticket_id = %ticket_id, stage = 2, "escalation cancelled before assign");
            return conclude(&mut sm, EscalationOutcome::CancelledBeforeAssign, None);
        }

        match self.workflow.assign_idle_agent(&self.meta, ticket_id).await {
            Ok(ticket) => {
                info!(
                    ticket_id = %ticket_id,
                    stage = 2,
                    status = %ticket.status,
                    "idle agent assigned"
                );
                conclude(&mut sm, EscalationOutcome::Assigned, None)
            }
            Err(e) => {
                error!(
                    ticket_id = %ticket_id,
                    stage = 2,
                    error = %e,
                    "assign_idle_agent failed"
                );
                let reason = e.to_string();
                conclude(&mut sm, EscalationOutcome::AssignFailed, Some(&reason))
            }
        }
    }

    /// Sleep until `deadline`. Returns `false` if cancelled first.
    async fn wait_until(&self, deadline: Instant) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = self.shutdown.cancelled() => false,
            _ = sleep_until(deadline) => true,
        }
    }
}

/// Illegal transitions are bugs in `drive`: logged in release builds,
/// fatal in debug builds.
fn transition(sm: &mut EscalationStateMachine, to: EscalationPhase, reason: Option<&str>) {
    let result = sm.advance(to, reason);
    if let Err(e) = &result {
        warn!(
            ticket_id = %sm.ticket_id(),
            error = %e,
            "escalation state machine rejected transition"
        );
    }
    debug_assert!(result.is_ok(), "escalation state machine rejected transition to {to}");
}

fn conclude(
    sm: &mut EscalationStateMachine,
    outcome: EscalationOutcome,
    reason: Option<&str>,
) -> EscalationOutcome {
    transition(sm, outcome.phase(), reason);
    let finished = sm.finish();
    if let Err(e) = &finished {
        warn!(ticket_id = %sm.ticket_id(), error = %e, "escalation did not reach done");
    }
    debug_assert!(finished.is_ok(), "escalation did not reach done");
    debug!(summary = %sm.summary(), "escalation finished");
    outcome
}
