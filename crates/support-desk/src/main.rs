//! Support desk CLI.
//!
//! # Usage
//!
//! ```bash
//! # Classify, create and escalate; stays up until both stages have run
//! support-desk --token "$TOKEN" create --title "VPN down" --description "cannot reach vpn"
//!
//! # Inspect and move tickets by hand
//! support-desk --token "$TOKEN" list --status fired
//! support-desk --token "$TOKEN" show 42
//! support-desk --token "$TOKEN" advance 42
//! support-desk --token "$TOKEN" solve 42 --solution "restarted the gateway"
//! support-desk --token "$TOKEN" unsolve 42
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use escalation::ticket::{Ticket, TicketId, TicketStatus};
use escalation::workflow::{CallMetadata, WorkflowClient};
use support_desk::{telemetry, DeskConfig, HttpClassifier, HttpWorkflowClient, TicketPipeline};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file
    #[arg(long, env = "SUPPORT_DESK_CONFIG")]
    config: Option<PathBuf>,

    /// Access token forwarded to the workflow service
    #[arg(long, env = "SUPPORT_DESK_TOKEN", hide_env_values = true)]
    token: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a description, create the ticket and arm its escalation
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        /// Exit right after creation. The escalation is dropped with the process.
        #[arg(long, default_value_t = false)]
        detach: bool,
    },
    /// List tickets, optionally only those in one status
    List {
        #[arg(long)]
        status: Option<TicketStatus>,
    },
    /// Print a ticket
    Show { id: i64 },
    /// Move a ticket to its next status
    Advance { id: i64 },
    /// Attach a solution to a ticket
    Solve {
        id: i64,
        #[arg(long)]
        solution: String,
    },
    /// Remove the solution from a ticket
    Unsolve { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = DeskConfig::load(args.config.as_deref())?;
    telemetry::init(config.env, config.logs_path.as_deref())?;

    info!(
        env = %config.env,
        classifier = %config.classifier_url,
        workflow = %config.workflow.base_url,
        "support desk starting"
    );

    let meta = CallMetadata::new(config.app_id, args.token);
    let workflow: Arc<dyn WorkflowClient> = Arc::new(HttpWorkflowClient::new(
        config.workflow.base_url.clone(),
        config.workflow.timeout(),
    )?);

    match args.command {
        Command::Create {
            title,
            description,
            detach,
        } => {
            let classifier = Arc::new(HttpClassifier::new(
                config.classifier_url.clone(),
                config.classifier_timeout(),
            )?);
            let pipeline = TicketPipeline::new(classifier, workflow, config.escalation_config());
            create(&pipeline, &meta, &title, &description, detach).await
        }
        Command::List { status } => {
            let tickets = workflow.list_tickets(&meta, status).await?;
            let json =
                serde_json::to_string_pretty(&tickets).context("Failed to render tickets")?;
            println!("{json}");
            Ok(())
        }
        Command::Show { id } => {
            let ticket = workflow.get_ticket(&meta, TicketId(id)).await?;
            print_ticket(&ticket)
        }
        Command::Advance { id } => {
            let ticket = workflow.change_status(&meta, TicketId(id)).await?;
            print_ticket(&ticket)
        }
        Command::Solve { id, solution } => {
            let ticket = workflow
                .add_solution(&meta, TicketId(id), &solution)
                .await?;
            print_ticket(&ticket)
        }
        Command::Unsolve { id } => {
            let ticket = workflow.remove_solution(&meta, TicketId(id)).await?;
            print_ticket(&ticket)
        }
    }
}

async fn create(
    pipeline: &TicketPipeline,
    meta: &CallMetadata,
    title: &str,
    description: &str,
    detach: bool,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let created = pipeline
        .create_ticket_with_escalation(meta, title, description, &cancel)
        .await?;
    print_ticket(&created.ticket)?;

    if detach {
        // Stages still pending are dropped with the runtime.
        if pipeline.scheduler().pending() > 0 {
            warn!(
                ticket_id = %created.ticket.id,
                "detached, escalation will not run"
            );
        }
        return Ok(());
    }

    let timer = *created.escalation.timer();
    info!(
        ticket_id = %created.ticket.id,
        fire_in_secs = timer.stage1_delay().as_secs_f64(),
        assign_in_secs = timer.stage2_delay().as_secs_f64(),
        "waiting for escalation (Ctrl-C to cancel)"
    );

    let ticket_id = created.ticket.id;
    let outcome = created.escalation.outcome();
    tokio::pin!(outcome);
    let finished = tokio::select! {
        res = &mut outcome => Some(res),
        _ = tokio::signal::ctrl_c() => None,
    };

    let res = match finished {
        Some(res) => res,
        None => {
            warn!(%ticket_id, "interrupted, cancelling escalation");
            cancel.cancel();
            outcome.await
        }
    };
    let outcome = res.context("escalation task failed")?;
    if outcome.was_cancelled() {
        warn!(%ticket_id, %outcome, fired = outcome.fired(), "escalation cancelled");
    } else {
        info!(%ticket_id, %outcome, "escalation finished");
    }

    pipeline.scheduler().shutdown().await;
    Ok(())
}

fn print_ticket(ticket: &Ticket) -> Result<()> {
    let json = serde_json::to_string_pretty(ticket).context("Failed to render ticket")?;
    println!("{json}");
    Ok(())
}
