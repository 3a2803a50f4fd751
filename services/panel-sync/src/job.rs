//! Async job monitor: create a server-side job, then poll its status
//!
//! The create call answers with a job id; the status resource is then
//! polled at a fixed interval until it reports `ready`. A status check is
//! only scheduled after the previous one has completed.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::auth::Authenticator;
use crate::config::{JobConfig, ServerConfig};
use crate::io::{with_query_param, HttpClient, HttpRequest, HttpResponse};
use crate::notifier::{Notice, Notifier};
use crate::policy::RetryPolicy;

const DEFAULT_READY_MESSAGE: &str = "Success!";
const TASK_ID_PARAM: &str = "task_id";

/// Observable lifecycle of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Created,
    Pending { task_id: String },
    Ready { message: String },
    Failed { message: String },
}

/// How a monitored job ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Ready { message: String },
    Failed { message: String },
    Cancelled,
}

/// Result of a single status check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Ready { message: String },
    Failed { message: String },
    Pending,
}

/// Server acknowledgement of a created job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTicket {
    pub task_id: String,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    #[serde(default)]
    task_id: Value,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Creates a background job and waits for it to finish
pub struct JobMonitor {
    http: Arc<dyn HttpClient>,
    auth: Arc<Authenticator>,
    notifier: Arc<dyn Notifier>,
    create_url: Url,
    status_url: Url,
    poll_interval: Duration,
    stop_on_failure: bool,
    retry: RetryPolicy,
    state: watch::Sender<JobState>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for JobMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobMonitor")
            .field("create_url", &self.create_url)
            .field("status_url", &self.status_url)
            .field("poll_interval", &self.poll_interval)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl JobMonitor {
    pub fn new(
        config: &JobConfig,
        server: &ServerConfig,
        http: Arc<dyn HttpClient>,
        auth: Arc<Authenticator>,
        notifier: Arc<dyn Notifier>,
    ) -> crate::Result<Self> {
        let (state, _) = watch::channel(JobState::Created);
        Ok(Self {
            http,
            auth,
            notifier,
            create_url: server.resolve(&config.create_locator)?,
            status_url: server.resolve(&config.status_locator)?,
            poll_interval: config.poll_interval(),
            stop_on_failure: config.stop_on_failure,
            retry: config.retry,
            state,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> JobState {
        self.state.borrow().clone()
    }

    /// Create the job and monitor it until it reaches a terminal state.
    ///
    /// A failed create is reported through the notifier and returned; the
    /// job never enters `Pending` in that case.
    pub async fn start(&self, payload: Vec<(String, String)>) -> crate::Result<JobOutcome> {
        let ticket = self.create(payload).await?;
        self.wait(&ticket.task_id).await
    }

    /// POST the create request and report the server's acknowledgement
    pub async fn create(&self, payload: Vec<(String, String)>) -> crate::Result<JobTicket> {
        let request = self
            .auth
            .authenticate(HttpRequest::post_form(self.create_url.clone(), payload));
        tracing::debug!("Creating job at {}", self.create_url);

        let ticket = match self.send_create(&request).await {
            Ok(ticket) => ticket,
            Err(e) => {
                tracing::warn!("Failed to create job at {}: {}", self.create_url, e);
                let message = match &e {
                    crate::SyncError::Job(message) => message.clone(),
                    other => other.to_string(),
                };
                self.notifier.notify(&Notice::error(message)).await;
                return Err(e);
            }
        };

        if let Some(message) = &ticket.message {
            self.notifier.notify(&Notice::info(message.clone())).await;
        }
        tracing::info!("Job {} created", ticket.task_id);
        self.state.send_replace(JobState::Pending {
            task_id: ticket.task_id.clone(),
        });
        Ok(ticket)
    }

    async fn send_create(&self, request: &HttpRequest) -> crate::Result<JobTicket> {
        let response = self.http.send(request).await?;
        if !response.is_success() {
            return Err(rejection(response));
        }

        let body: CreateResponse = serde_json::from_str(&response.body)?;
        let task_id = match body.task_id {
            Value::String(id) if !id.is_empty() => id,
            Value::Number(n) => n.to_string(),
            other => {
                return Err(crate::SyncError::Job(format!(
                    "create response has no usable task_id: {}",
                    other
                )))
            }
        };
        Ok(JobTicket {
            task_id,
            message: body.message,
        })
    }

    /// One status check for `task_id`
    pub async fn check_status(&self, task_id: &str) -> crate::Result<JobStatus> {
        let url = with_query_param(&self.status_url, TASK_ID_PARAM, task_id);
        let request = self.auth.authenticate(HttpRequest::get(url));

        let response = self.http.send(&request).await?;
        if !response.is_success() {
            return Err(crate::SyncError::Status {
                status: response.status,
                body: response.body,
            });
        }

        let body: StatusResponse = serde_json::from_str(&response.body)?;
        let status = match body.status.as_deref() {
            Some("ready") => JobStatus::Ready {
                message: body
                    .message
                    .unwrap_or_else(|| DEFAULT_READY_MESSAGE.to_string()),
            },
            Some("failed" | "failure" | "error") => JobStatus::Failed {
                message: body
                    .message
                    .unwrap_or_else(|| format!("Job {} failed", task_id)),
            },
            _ => JobStatus::Pending,
        };
        Ok(status)
    }

    /// Check status now, then every poll interval, until a terminal status
    pub async fn wait(&self, task_id: &str) -> crate::Result<JobOutcome> {
        let mut checks = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(JobOutcome::Cancelled);
            }

            checks += 1;
            match self.check_status(task_id).await {
                Ok(JobStatus::Ready { message }) => {
                    tracing::info!("Job {} is ready", task_id);
                    self.notifier.notify(&Notice::info(message.clone())).await;
                    self.state.send_replace(JobState::Ready {
                        message: message.clone(),
                    });
                    return Ok(JobOutcome::Ready { message });
                }
                Ok(JobStatus::Failed { message }) if self.stop_on_failure => {
                    tracing::warn!("Job {} failed: {}", task_id, message);
                    self.notifier.notify(&Notice::error(message.clone())).await;
                    self.state.send_replace(JobState::Failed {
                        message: message.clone(),
                    });
                    return Ok(JobOutcome::Failed { message });
                }
                Ok(status) => {
                    tracing::debug!("Job {} still running ({:?})", task_id, status);
                    if !self.retry.allows(checks) {
                        return Err(self.exhausted(task_id, checks, "job never finished"));
                    }
                }
                Err(e) => {
                    tracing::debug!("Status check for job {} failed: {}", task_id, e);
                    if !self.retry.allows(checks) {
                        return Err(self.exhausted(task_id, checks, &e.to_string()));
                    }
                }
            }

            let delay = self.retry.delay(self.poll_interval, checks);
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::debug!("Monitoring of job {} cancelled", task_id);
                    return Ok(JobOutcome::Cancelled);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn exhausted(&self, task_id: &str, attempts: u32, last_error: &str) -> crate::SyncError {
        tracing::warn!(
            "Giving up on job {} after {} status checks",
            task_id,
            attempts
        );
        crate::SyncError::RetriesExhausted {
            attempts,
            last_error: last_error.to_string(),
        }
    }
}

/// Error for a non-2xx create response, preferring the server's message
fn rejection(response: HttpResponse) -> crate::SyncError {
    #[derive(Deserialize)]
    struct Rejected {
        message: String,
    }

    match serde_json::from_str::<Rejected>(&response.body) {
        Ok(rejected) => crate::SyncError::Job(rejected.message),
        Err(_) => crate::SyncError::Status {
            status: response.status,
            body: response.body,
        },
    }
}
