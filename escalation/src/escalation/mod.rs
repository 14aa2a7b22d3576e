//! Two-stage deferred escalation for newly created tickets.
//!
//! ```text
//! arm(ticket, reaction)
//!     │
//!     ├─ sleep reaction ──────────── cancelled? → CancelledBeforeFire
//!     ▼
//! mark_fired ─────────────────────── error? → FireFailed (logged, no retry)
//!     │
//!     ├─ sleep until reaction + extra ─ cancelled? → CancelledBeforeAssign
//!     ▼
//! assign_idle_agent ──────────────── error? → AssignFailed (logged, no retry)
//!     │
//!     ▼
//!  Assigned
//! ```

pub mod scheduler;
pub mod state;

pub use scheduler::{
    EscalationConfig, EscalationHandle, EscalationScheduler, DEFAULT_EXTRA_DELAY,
};
pub use state::{
    EscalationOutcome, EscalationPhase, EscalationStateMachine, EscalationTimer,
    IllegalTransition, TransitionRecord, MAX_STAGE_DELAY,
};
