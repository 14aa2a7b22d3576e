//! Pipeline error taxonomy.
//!
//! | Stage    | Error                | Effect                                 |
//! |----------|----------------------|----------------------------------------|
//! | classify | `Classify`           | nothing persisted                      |
//! | create   | `Create`             | classification discarded, no ticket    |
//! | either   | `Cancelled`          | run aborted, nothing armed             |
//!
//! Escalation stage failures never show up here: they happen after the
//! caller already has its ticket and are only logged.

use std::fmt;

use escalation::workflow::WorkflowError;
use thiserror::Error;

use crate::classifier::ClassificationError;

/// Synchronous pipeline stage a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Classify,
    Create,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classify => write!(f, "classify"),
            Self::Create => write!(f, "create"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("classification failed: {0}")]
    Classify(#[source] ClassificationError),

    #[error("ticket creation failed: {0}")]
    Create(#[source] WorkflowError),

    #[error("cancelled during {stage}")]
    Cancelled { stage: PipelineStage },
}

impl PipelineError {
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::Classify(_) => PipelineStage::Classify,
            Self::Create(_) => PipelineStage::Create,
            Self::Cancelled { stage } => *stage,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
