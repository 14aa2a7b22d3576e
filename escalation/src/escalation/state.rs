//! Escalation state machine: explicit phases and legal transition guards.
//!
//! Every armed ticket walks this graph exactly once:
//!
//! ```text
//! Armed → WaitingStage1
//! WaitingStage1 → Fired | CancelledBeforeFire | FireFailed
//! Fired → WaitingStage2
//! WaitingStage2 → Assigned | CancelledBeforeAssign | AssignFailed
//! CancelledBeforeFire | FireFailed | Assigned | CancelledBeforeAssign | AssignFailed → Done
//! ```
//!
//! Stage 2 is only reachable through `Fired`, so the assign call can never
//! precede a successful fire call.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::ticket::TicketId;

/// Phases of a single ticket's escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationPhase {
    /// Timer computed, task not yet waiting.
    Armed,
    /// Sleeping until `fire_at` or cancellation.
    WaitingStage1,
    /// `mark_fired` returned OK.
    Fired,
    CancelledBeforeFire,
    /// `mark_fired` returned an error; stage 2 is skipped.
    FireFailed,
    /// Sleeping until `assign_at` or cancellation.
    WaitingStage2,
    /// `assign_idle_agent` returned OK.
    Assigned,
    CancelledBeforeAssign,
    AssignFailed,
    /// Terminal.
    Done,
}

impl EscalationPhase {
    pub fn is_terminal(self) -> bool {
        self == Self::Done
    }
}

impl fmt::Display for EscalationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Armed => write!(f, "Armed"),
            Self::WaitingStage1 => write!(f, "WaitingStage1"),
            Self::Fired => write!(f, "Fired"),
            Self::CancelledBeforeFire => write!(f, "CancelledBeforeFire"),
            Self::FireFailed => write!(f, "FireFailed"),
            Self::WaitingStage2 => write!(f, "WaitingStage2"),
            Self::Assigned => write!(f, "Assigned"),
            Self::CancelledBeforeAssign => write!(f, "CancelledBeforeAssign"),
            Self::AssignFailed => write!(f, "AssignFailed"),
            Self::Done => write!(f, "Done"),
        }
    }
}

fn is_legal_transition(from: EscalationPhase, to: EscalationPhase) -> bool {
    use EscalationPhase::*;

    matches!(
        (from, to),
        (Armed, WaitingStage1)
            | (WaitingStage1, Fired)
            | (WaitingStage1, CancelledBeforeFire)
            | (WaitingStage1, FireFailed)
            | (Fired, WaitingStage2)
            | (WaitingStage2, Assigned)
            | (WaitingStage2, CancelledBeforeAssign)
            | (WaitingStage2, AssignFailed)
            | (CancelledBeforeFire, Done)
            | (FireFailed, Done)
            | (Assigned, Done)
            | (CancelledBeforeAssign, Done)
            | (AssignFailed, Done)
    )
}

/// How an escalation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationOutcome {
    CancelledBeforeFire,
    FireFailed,
    CancelledBeforeAssign,
    AssignFailed,
    Assigned,
}

impl EscalationOutcome {
    /// Whether the stage-1 call was made and succeeded.
    pub fn fired(self) -> bool {
        matches!(
            self,
            Self::CancelledBeforeAssign | Self::AssignFailed | Self::Assigned
        )
    }

    pub fn was_cancelled(self) -> bool {
        matches!(self, Self::CancelledBeforeFire | Self::CancelledBeforeAssign)
    }

    /// The result phase recording this outcome.
    pub fn phase(self) -> EscalationPhase {
        match self {
            Self::CancelledBeforeFire => EscalationPhase::CancelledBeforeFire,
            Self::FireFailed => EscalationPhase::FireFailed,
            Self::CancelledBeforeAssign => EscalationPhase::CancelledBeforeAssign,
            Self::AssignFailed => EscalationPhase::AssignFailed,
            Self::Assigned => EscalationPhase::Assigned,
        }
    }

    fn from_phase(phase: EscalationPhase) -> Option<Self> {
        match phase {
            EscalationPhase::CancelledBeforeFire => Some(Self::CancelledBeforeFire),
            EscalationPhase::FireFailed => Some(Self::FireFailed),
            EscalationPhase::CancelledBeforeAssign => Some(Self::CancelledBeforeAssign),
            EscalationPhase::AssignFailed => Some(Self::AssignFailed),
            EscalationPhase::Assigned => Some(Self::Assigned),
            _ => None,
        }
    }
}

impl fmt::Display for EscalationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CancelledBeforeFire => write!(f, "cancelled_before_fire"),
            Self::FireFailed => write!(f, "fire_failed"),
            Self::CancelledBeforeAssign => write!(f, "cancelled_before_assign"),
            Self::AssignFailed => write!(f, "assign_failed"),
            Self::Assigned => write!(f, "assigned"),
        }
    }
}

/// Longest delay a single stage waits. Larger delays are clamped to it so
/// the deadline stays representable as an `Instant`.
pub const MAX_STAGE_DELAY: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Absolute deadlines for both stages of one ticket.
///
/// Both deadlines are fixed when the ticket is armed. Stage 2 still only
/// starts waiting once stage 1 has succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationTimer {
    pub ticket_id: TicketId,
    pub armed_at: Instant,
    pub fire_at: Instant,
    pub assign_at: Instant,
}

impl EscalationTimer {
    pub fn new(
        ticket_id: TicketId,
        armed_at: Instant,
        reaction_delay: Duration,
        extra_delay: Duration,
    ) -> Self {
        let fire_at = deadline_after(armed_at, reaction_delay);
        Self {
            ticket_id,
            armed_at,
            fire_at,
            assign_at: deadline_after(fire_at, extra_delay),
        }
    }

    pub fn stage1_delay(&self) -> Duration {
        self.fire_at - self.armed_at
    }

    pub fn stage2_delay(&self) -> Duration {
        self.assign_at - self.armed_at
    }
}

fn deadline_after(base: Instant, delay: Duration) -> Instant {
    base + delay.min(MAX_STAGE_DELAY)
}

/// A single recorded phase transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: EscalationPhase,
    pub to: EscalationPhase,
    /// Milliseconds since the ticket was armed.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone)]
pub struct IllegalTransition {
    pub from: EscalationPhase,
    pub to: EscalationPhase,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal escalation transition: {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Per-ticket escalation state machine.
///
/// Owned by exactly one task, so it needs no locking.
pub struct EscalationStateMachine {
    ticket_id: TicketId,
    current: EscalationPhase,
    outcome: Option<EscalationOutcome>,
    armed_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl EscalationStateMachine {
    pub fn new(ticket_id: TicketId) -> Self {
        Self {
            ticket_id,
            current: EscalationPhase::Armed,
            outcome: None,
            armed_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn ticket_id(&self) -> TicketId {
        self.ticket_id
    }

    pub fn current(&self) -> EscalationPhase {
        self.current
    }

    /// Terminal outcome, set once the machine reaches a result phase.
    pub fn outcome(&self) -> Option<EscalationOutcome> {
        self.outcome
    }

    pub fn advance(
        &mut self,
        to: EscalationPhase,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!(
            ticket_id = %self.ticket_id,
            from = %self.current,
            to = %to,
            "escalation transition"
        );

        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            elapsed_ms: self.armed_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        if let Some(outcome) = EscalationOutcome::from_phase(to) {
            self.outcome = Some(outcome);
        }
        self.current = to;
        Ok(())
    }

    /// Move a result phase to `Done` and return the outcome.
    pub fn finish(&mut self) -> Result<EscalationOutcome, IllegalTransition> {
        let from = self.current;
        let outcome = self.outcome.ok_or(IllegalTransition {
            from,
            to: EscalationPhase::Done,
        })?;
        self.advance(EscalationPhase::Done, None)?;
        Ok(outcome)
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn summary(&self) -> String {
        let mut path = vec![EscalationPhase::Armed.to_string()];
        path.extend(self.transitions.iter().map(|t| t.to.to_string()));
        format!(
            "ticket {}: {} ({} transitions)",
            self.ticket_id,
            path.join(" -> "),
            self.transitions.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> EscalationStateMachine {
        EscalationStateMachine::new(TicketId(1))
    }

    #[test]
    fn test_initial_state() {
        let sm = machine();
        assert_eq!(sm.current(), EscalationPhase::Armed);
        assert!(sm.outcome().is_none());
        assert!(!sm.is_terminal());
    }

    #[test]
    fn test_happy_path() {
        let mut sm = machine();
        sm.advance(EscalationPhase::WaitingStage1, None).unwrap();
        sm.advance(EscalationPhase::Fired, None).unwrap();
        sm.advance(EscalationPhase::WaitingStage2, None).unwrap();
        sm.advance(EscalationPhase::Assigned, Some("agent picked"))
            .unwrap();
        assert_eq!(sm.finish().unwrap(), EscalationOutcome::Assigned);
        assert!(sm.is_terminal());
        assert!(sm.summary().ends_with("(5 transitions)"));
    }

    #[test]
    fn test_stage2_unreachable_without_fire() {
        let mut sm = machine();
        sm.advance(EscalationPhase::WaitingStage1, None).unwrap();
        let err = sm.advance(EscalationPhase::WaitingStage2, None).unwrap_err();
        assert_eq!(err.from, EscalationPhase::WaitingStage1);
        assert_eq!(err.to, EscalationPhase::WaitingStage2);

        sm.advance(EscalationPhase::FireFailed, None).unwrap();
        assert!(sm.advance(EscalationPhase::WaitingStage2, None).is_err());
        assert_eq!(sm.finish().unwrap(), EscalationOutcome::FireFailed);
    }

    #[test]
    fn test_cancel_before_fire() {
        let mut sm = machine();
        sm.advance(EscalationPhase::WaitingStage1, None).unwrap();
        sm.advance(EscalationPhase::CancelledBeforeFire, None)
            .unwrap();
        let outcome = sm.finish().unwrap();
        assert!(outcome.was_cancelled());
        assert!(!outcome.fired());
    }

    #[test]
    fn test_cancel_before_assign_counts_as_fired() {
        let mut sm = machine();
        sm.advance(EscalationPhase::WaitingStage1, None).unwrap();
        sm.advance(EscalationPhase::Fired, None).unwrap();
        sm.advance(EscalationPhase::WaitingStage2, None).unwrap();
        sm.advance(EscalationPhase::CancelledBeforeAssign, None)
            .unwrap();
        let outcome = sm.finish().unwrap();
        assert!(outcome.fired());
        assert!(outcome.was_cancelled());
    }

    #[test]
    fn test_cannot_leave_done() {
        let mut sm = machine();
        sm.advance(EscalationPhase::WaitingStage1, None).unwrap();
        sm.advance(EscalationPhase::CancelledBeforeFire, None)
            .unwrap();
        sm.finish().unwrap();
        assert!(sm.advance(EscalationPhase::WaitingStage1, None).is_err());
        assert!(sm.finish().is_err());
    }

    #[test]
    fn test_finish_requires_outcome() {
        let mut sm = machine();
        sm.advance(EscalationPhase::WaitingStage1, None).unwrap();
        let err = sm.finish().unwrap_err();
        assert_eq!(err.from, EscalationPhase::WaitingStage1);
        assert_eq!(err.to, EscalationPhase::Done);
    }

    #[test]
    fn test_timer_deadlines() {
        let now = Instant::now();
        let timer = EscalationTimer::new(
            TicketId(5),
            now,
            Duration::from_secs(2),
            Duration::from_secs(5),
        );
        assert_eq!(timer.stage1_delay(), Duration::from_secs(2));
        assert_eq!(timer.stage2_delay(), Duration::from_secs(7));
        assert!(timer.assign_at > timer.fire_at);
    }

    #[test]
    fn test_timer_clamps_unrepresentable_delays() {
        let now = Instant::now();
        let timer = EscalationTimer::new(TicketId(6), now, Duration::MAX, Duration::MAX);
        assert_eq!(timer.stage1_delay(), MAX_STAGE_DELAY);
        assert_eq!(timer.stage2_delay(), MAX_STAGE_DELAY * 2);

        let timer = EscalationTimer::new(
            TicketId(7),
            now,
            Duration::from_secs_f64(1e19),
            Duration::from_secs(300),
        );
        assert_eq!(timer.stage1_delay(), MAX_STAGE_DELAY);
        assert_eq!(
            timer.stage2_delay(),
            MAX_STAGE_DELAY + Duration::from_secs(300)
        );
    }

    #[test]
    fn test_summary_lists_path() {
        let mut sm = machine();
        sm.advance(EscalationPhase::WaitingStage1, None).unwrap();
        sm.advance(EscalationPhase::CancelledBeforeFire, None)
            .unwrap();
        let summary = sm.summary();
        assert!(summary.contains("Armed -> WaitingStage1 -> CancelledBeforeFire"));
        assert!(summary.contains("2 transitions"));
    }
}
