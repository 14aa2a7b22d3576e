//! Logging setup per deployment environment.
//!
//! | env   | default level | output                          |
//! |-------|---------------|---------------------------------|
//! | local | debug         | pretty, stdout                  |
//! | dev   | info          | `logs_path` (plain) or stdout   |
//! | prod  | warn          | `logs_path` (plain) or stdout   |
//!
//! `RUST_LOG` overrides the default level in every environment.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use escalation::ticket::TicketId;
use tracing::Span;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::config::DeployEnv;
use crate::errors::PipelineStage;

/// Default filter directive for an environment.
pub fn default_level(env: DeployEnv) -> &'static str {
    match env {
        DeployEnv::Local => "debug",
        DeployEnv::Dev => "info",
        DeployEnv::Prod => "warn",
    }
}

/// Install the global tracing subscriber. Call once, from `main`.
pub fn init(env: DeployEnv, logs_path: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(env)));

    let installed = match (env, logs_path) {
        (DeployEnv::Local, _) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .pretty()
            .try_init(),
        (_, None) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .try_init(),
        (_, Some(path)) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create log directory {}", parent.display())
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
    };

    installed.map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))
}

// ── Span Builders ────────────────────────────────────────────────────

/// Root span for one create-ticket pipeline run.
///
/// Fields filled later: `ticket.id` via [`record_created`],
/// `pipeline.failed_stage` via [`record_failed_stage`].
pub fn pipeline_run_span(run_id: &Uuid) -> Span {
    tracing::info_span!(
        "desk.create_ticket",
        "run.id" = %run_id,
        "ticket.id" = tracing::field::Empty,
        "pipeline.failed_stage" = tracing::field::Empty,
    )
}

pub fn record_created(span: &Span, id: TicketId) {
    span.record("ticket.id", id.0);
}

pub fn record_failed_stage(span: &Span, stage: PipelineStage) {
    span.record("pipeline.failed_stage", tracing::field::display(stage));
}
