//! HTTP implementation of the workflow service facade.
//!
//! One request per call, no retries. Tenant and credential travel as
//! `x-app-id` / `x-access-token` headers. Non-2xx answers become
//! [`WorkflowError::Remote`] classified by [`escalation::workflow::ErrorClass`].

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use escalation::ticket::{NewTicket, Ticket, TicketId, TicketStatus};
use escalation::workflow::{CallMetadata, WorkflowClient, WorkflowError};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const APP_ID_HEADER: &str = "x-app-id";
pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

#[derive(Debug, Serialize)]
struct CreateTicketBody<'a> {
    title: &'a str,
    description: &'a str,
    cluster_index: i64,
    cluster_name: &'a str,
    frequency: i64,
    /// Seconds.
    average_duration: f64,
}

impl<'a> From<&'a NewTicket> for CreateTicketBody<'a> {
    fn from(ticket: &'a NewTicket) -> Self {
        let classification = &ticket.classification;
        Self {
            title: &ticket.title,
            description: &ticket.description,
            cluster_index: classification.cluster.index,
            cluster_name: &classification.cluster.name,
            frequency: classification.cluster.frequency,
            average_duration: classification.average_duration.as_secs_f64(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SolutionBody<'a> {
    solution: &'a str,
}

#[derive(Debug, Serialize)]
struct ListQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<TicketStatus>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Extract the service's error message, falling back to the raw body.
fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string())
}

pub struct HttpWorkflowClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpWorkflowClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build workflow HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn ticket_endpoint(&self, id: TicketId, action: Option<&str>) -> String {
        match action {
            Some(action) => self.endpoint(&format!("tickets/{id}/{action}")),
            None => self.endpoint(&format!("tickets/{id}")),
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        meta: &CallMetadata,
    ) -> Result<T, WorkflowError> {
        let resp = req
            .header(APP_ID_HEADER, meta.app_id.to_string())
            .header(ACCESS_TOKEN_HEADER, &meta.access_token)
            .send()
            .await
            .map_err(|e| WorkflowError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| WorkflowError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(WorkflowError::remote(
                Some(status.as_u16()),
                error_message(&body),
            ));
        }

        serde_json::from_slice(&body).map_err(|e| WorkflowError::Decode(e.to_string()))
    }
}

#[async_trait]
impl WorkflowClient for HttpWorkflowClient {
    async fn create_ticket(
        &self,
        meta: &CallMetadata,
        ticket: &NewTicket,
    ) -> Result<Ticket, WorkflowError> {
        let req = self
            .client
            .post(self.endpoint("tickets"))
            .json(&CreateTicketBody::from(ticket));
        self.send(req, meta).await
    }

    async fn mark_fired(&self, meta: &CallMetadata, id: TicketId) -> Result<Ticket, WorkflowError> {
        let req = self.client.post(self.ticket_endpoint(id, Some("fire")));
        self.send(req, meta).await
    }

    async fn assign_idle_agent(
        &self,
        meta: &CallMetadata,
        id: TicketId,
    ) -> Result<Ticket, WorkflowError> {
        let req = self.client.post(self.ticket_endpoint(id, Some("assign")));
        self.send(req, meta).await
    }

    async fn get_ticket(&self, meta: &CallMetadata, id: TicketId) -> Result<Ticket, WorkflowError> {
        let req = self.client.get(self.ticket_endpoint(id, None));
        self.send(req, meta).await
    }

    async fn change_status(
        &self,
        meta: &CallMetadata,
        id: TicketId,
    ) -> Result<Ticket, WorkflowError> {
        let req = self.client.post(self.ticket_endpoint(id, Some("status")));
        self.send(req, meta).await
    }

    async fn add_solution(
        &self,
        meta: &CallMetadata,
        id: TicketId,
        solution: &str,
    ) -> Result<Ticket, WorkflowError> {
        let req = self
            .client
            .put(self.ticket_endpoint(id, Some("solution")))
            .json(&SolutionBody { solution });
        self.send(req, meta).await
    }

    async fn remove_solution(
        &self,
        meta: &CallMetadata,
        id: TicketId,
    ) -> Result<Ticket, WorkflowError> {
        let req = self.client.delete(self.ticket_endpoint(id, Some("solution")));
        self.send(req, meta).await
    }

    async fn list_tickets(
        &self,
        meta: &CallMetadata,
        status: Option<TicketStatus>,
    ) -> Result<Vec<Ticket>, WorkflowError> {
        let req = self
            .client
            .get(self.endpoint("tickets"))
            .query(&ListQuery { status });
        self.send(req, meta).await
    }
}
