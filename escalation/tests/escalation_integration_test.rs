//! Integration tests for the Escalation Scheduler
//!
//! Drives the scheduler against an in-memory workflow service on a paused
//! tokio clock, checking stage timing, ordering and cancellation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use escalation::escalation::{EscalationConfig, EscalationOutcome, EscalationScheduler};
use escalation::ticket::{NewTicket, Ticket, TicketId, TicketStatus};
use escalation::workflow::{CallMetadata, WorkflowClient, WorkflowError};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Fire(TicketId),
    Assign(TicketId),
}

/// In-memory workflow service.
///
/// `mark_fired` / `assign_idle_agent` are no-ops on tickets already past the
/// target status, the way the real service is required to behave.
struct InMemoryWorkflow {
    start: Instant,
    tickets: Mutex<HashMap<TicketId, Ticket>>,
    calls: Mutex<Vec<(Call, Duration)>>,
    fire_latency: Duration,
}

impl InMemoryWorkflow {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            tickets: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            fire_latency: Duration::ZERO,
        }
    }

    fn with_fire_latency(mut self, latency: Duration) -> Self {
        self.fire_latency = latency;
        self
    }

    fn seed(&self, id: i64) -> TicketId {
        let id = TicketId(id);
        self.tickets.lock().unwrap().insert(
            id,
            Ticket {
                id,
                title: format!("ticket {id}"),
                description: "printer on fire".into(),
                status: TicketStatus::Open,
                created_at: Utc::now(),
                fired_at: None,
                assigned_at: None,
                cluster: None,
                solution: None,
            },
        );
        id
    }

    fn calls(&self) -> Vec<(Call, Duration)> {
        self.calls.lock().unwrap().clone()
    }

    fn status(&self, id: TicketId) -> TicketStatus {
        self.tickets.lock().unwrap()[&id].status
    }

    fn record(&self, call: Call) {
        self.calls
            .lock()
            .unwrap()
            .push((call, self.start.elapsed()));
    }

    fn move_to(&self, id: TicketId, status: TicketStatus) -> Result<Ticket, WorkflowError> {
        let mut tickets = self.tickets.lock().unwrap();
        let ticket = tickets
            .get_mut(&id)
            .ok_or_else(|| WorkflowError::remote(Some(404), format!("ticket {id} not found")))?;
        if ticket.status.can_advance_to(status) {
            ticket.status = status;
            match status {
                TicketStatus::Fired => ticket.fired_at = Some(Utc::now()),
                TicketStatus::Assigned => ticket.assigned_at = Some(Utc::now()),
                _ => {}
            }
        }
        Ok(ticket.clone())
    }
}

#[async_trait]
impl WorkflowClient for InMemoryWorkflow {
    async fn create_ticket(
        &self,
        _meta: &CallMetadata,
        _ticket: &NewTicket,
    ) -> Result<Ticket, WorkflowError> {
        Err(WorkflowError::Transport("not used by scheduler tests".into()))
    }

    async fn mark_fired(
        &self,
        _meta: &CallMetadata,
        id: TicketId,
    ) -> Result<Ticket, WorkflowError> {
        if !self.fire_latency.is_zero() {
            sleep(self.fire_latency).await;
        }
        self.record(Call::Fire(id));
        self.move_to(id, TicketStatus::Fired)
    }

    async fn assign_idle_agent(
        &self,
        _meta: &CallMetadata,
        id: TicketId,
    ) -> Result<Ticket, WorkflowError> {
        self.record(Call::Assign(id));
        self.move_to(id, TicketStatus::Assigned)
    }

    async fn get_ticket(
        &self,
        _meta: &CallMetadata,
        id: TicketId,
    ) -> Result<Ticket, WorkflowError> {
        self.tickets
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| WorkflowError::remote(Some(404), "not found"))
    }

    async fn change_status(
        &self,
        _meta: &CallMetadata,
        id: TicketId,
    ) -> Result<Ticket, WorkflowError> {
        let next = self.status(id).next().unwrap_or(TicketStatus::Closed);
        self.move_to(id, next)
    }

    async fn add_solution(
        &self,
        _meta: &CallMetadata,
        id: TicketId,
        solution: &str,
    ) -> Result<Ticket, WorkflowError> {
        let mut tickets = self.tickets.lock().unwrap();
        let ticket = tickets
            .get_mut(&id)
            .ok_or_else(|| WorkflowError::remote(Some(404), "not found"))?;
        ticket.solution = Some(solution.to_string());
        Ok(ticket.clone())
    }

    async fn remove_solution(
        &self,
        _meta: &CallMetadata,
        id: TicketId,
    ) -> Result<Ticket, WorkflowError> {
        let mut tickets = self.tickets.lock().unwrap();
        let ticket = tickets
            .get_mut(&id)
            .ok_or_else(|| WorkflowError::remote(Some(404), "not found"))?;
        ticket.solution = None;
        Ok(ticket.clone())
    }

    async fn list_tickets(
        &self,
        _meta: &CallMetadata,
        status: Option<TicketStatus>,
    ) -> Result<Vec<Ticket>, WorkflowError> {
        let mut tickets: Vec<Ticket> = self
            .tickets
            .lock()
            .unwrap()
            .values()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.id);
        Ok(tickets)
    }
}

fn meta() -> CallMetadata {
    CallMetadata::new(1, "access-token")
}

fn scheduler(workflow: &Arc<InMemoryWorkflow>, extra: Duration) -> EscalationScheduler {
    EscalationScheduler::new(
        Arc::clone(workflow) as Arc<dyn WorkflowClient>,
        EscalationConfig { extra_delay: extra },
    )
}

/// Test: reaction 2s, extra 5s → fire at 2s, assign at 7s, each exactly once
#[tokio::test(start_paused = true)]
async fn test_reference_schedule() {
    let workflow = Arc::new(InMemoryWorkflow::new());
    let id = workflow.seed(10);
    let scheduler = scheduler(&workflow, Duration::from_secs(5));

    let handle = scheduler.arm(id, Duration::from_secs(2), meta(), &CancellationToken::new());
    assert_eq!(handle.outcome().await.unwrap(), EscalationOutcome::Assigned);

    assert_eq!(
        workflow.calls(),
        vec![
            (Call::Fire(id), Duration::from_secs(2)),
            (Call::Assign(id), Duration::from_secs(7)),
        ]
    );
    assert_eq!(workflow.status(id), TicketStatus::Assigned);
}

/// Test: cancel before stage 1 deadline → no calls at all
#[tokio::test(start_paused = true)]
async fn test_cancel_before_fire_suppresses_both_stages() {
    let workflow = Arc::new(InMemoryWorkflow::new());
    let id = workflow.seed(11);
    let scheduler = scheduler(&workflow, Duration::from_secs(5));
    let cancel = CancellationToken::new();

    let handle = scheduler.arm(id, Duration::from_secs(2), meta(), &cancel);
    sleep(Duration::from_secs(1)).await;
    cancel.cancel();

    assert_eq!(
        handle.outcome().await.unwrap(),
        EscalationOutcome::CancelledBeforeFire
    );
    // Let any stray timer elapse.
    sleep(Duration::from_secs(60)).await;
    assert!(workflow.calls().is_empty());
    assert_eq!(workflow.status(id), TicketStatus::Open);
}

/// Test: cancel between stages → fired once, never assigned
#[tokio::test(start_paused = true)]
async fn test_cancel_between_stages_keeps_fire_only() {
    let workflow = Arc::new(InMemoryWorkflow::new());
    let id = workflow.seed(12);
    let scheduler = scheduler(&workflow, Duration::from_secs(5));
    let cancel = CancellationToken::new();

    let handle = scheduler.arm(id, Duration::from_secs(2), meta(), &cancel);
    sleep(Duration::from_secs(4)).await;
    cancel.cancel();

    assert_eq!(
        handle.outcome().await.unwrap(),
        EscalationOutcome::CancelledBeforeAssign
    );
    sleep(Duration::from_secs(60)).await;
    assert_eq!(workflow.calls(), vec![(Call::Fire(id), Duration::from_secs(2))]);
    assert_eq!(workflow.status(id), TicketStatus::Fired);
}

/// Test: a slow stage 1 call past the stage 2 deadline still precedes stage 2
#[tokio::test(start_paused = true)]
async fn test_slow_fire_call_delays_assign() {
    let workflow = Arc::new(InMemoryWorkflow::new().with_fire_latency(Duration::from_secs(10)));
    let id = workflow.seed(13);
    let scheduler = scheduler(&workflow, Duration::from_secs(5));

    let handle = scheduler.arm(id, Duration::from_secs(2), meta(), &CancellationToken::new());
    assert_eq!(handle.outcome().await.unwrap(), EscalationOutcome::Assigned);

    let calls = workflow.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], (Call::Fire(id), Duration::from_secs(12)));
    // Deadline (7s) already passed, so assign runs as soon as fire returns.
    assert_eq!(calls[1], (Call::Assign(id), Duration::from_secs(12)));
}

/// Test: a ticket already fired by someone else is not an escalation error
#[tokio::test(start_paused = true)]
async fn test_already_fired_ticket_is_not_an_error() {
    let workflow = Arc::new(InMemoryWorkflow::new());
    let id = workflow.seed(14);
    workflow.mark_fired(&meta(), id).await.unwrap();
    let scheduler = scheduler(&workflow, Duration::from_secs(1));

    let handle = scheduler.arm(id, Duration::from_secs(1), meta(), &CancellationToken::new());
    let outcome = handle.outcome().await.unwrap();

    assert_eq!(outcome, EscalationOutcome::Assigned);
    assert!(outcome.fired());
    assert_eq!(workflow.status(id), TicketStatus::Assigned);
}

/// Test: a ticket closed by a human before escalation stays closed
#[tokio::test(start_paused = true)]
async fn test_closed_ticket_never_moves_backward() {
    let workflow = Arc::new(InMemoryWorkflow::new());
    let id = workflow.seed(15);
    let scheduler = scheduler(&workflow, Duration::from_secs(1));

    let handle = scheduler.arm(id, Duration::from_secs(3), meta(), &CancellationToken::new());
    for _ in 0..3 {
        workflow.change_status(&meta(), id).await.unwrap();
    }
    assert_eq!(workflow.status(id), TicketStatus::Closed);

    assert_eq!(handle.outcome().await.unwrap(), EscalationOutcome::Assigned);
    assert_eq!(workflow.status(id), TicketStatus::Closed);
}

/// Test: a failed fire call ends the escalation without an assign call
#[tokio::test(start_paused = true)]
async fn test_fire_failure_skips_assign() {
    let workflow = Arc::new(InMemoryWorkflow::new());
    // Never seeded: both calls answer 404.
    let id = TicketId(99);
    let scheduler = scheduler(&workflow, Duration::from_secs(1));

    let handle = scheduler.arm(id, Duration::from_secs(1), meta(), &CancellationToken::new());
    assert_eq!(handle.outcome().await.unwrap(), EscalationOutcome::FireFailed);
    assert_eq!(workflow.calls(), vec![(Call::Fire(id), Duration::from_secs(1))]);
}

/// Test: independent tickets escalate independently
#[tokio::test(start_paused = true)]
async fn test_many_tickets_escalate_independently() {
    let workflow = Arc::new(InMemoryWorkflow::new());
    let scheduler = scheduler(&workflow, Duration::from_secs(5));
    let cancel = CancellationToken::new();

    let handles: Vec<_> = (1..=4)
        .map(|n| {
            let id = workflow.seed(n);
            scheduler.arm(id, Duration::from_secs(n as u64), meta(), &cancel)
        })
        .collect();
    assert_eq!(scheduler.pending(), 4);

    for handle in handles {
        assert_eq!(handle.outcome().await.unwrap(), EscalationOutcome::Assigned);
    }
    assert_eq!(scheduler.pending(), 0);

    let calls = workflow.calls();
    for n in 1..=4 {
        let id = TicketId(n);
        let fire = calls.iter().position(|(c, _)| *c == Call::Fire(id)).unwrap();
        let assign = calls.iter().position(|(c, _)| *c == Call::Assign(id)).unwrap();
        assert!(fire < assign, "ticket {id} assigned before fired");
        assert_eq!(calls[fire].1, Duration::from_secs(n as u64));
        assert_eq!(calls[assign].1, Duration::from_secs(n as u64 + 5));
    }
}
