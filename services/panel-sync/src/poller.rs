//! Collection poller: fetch a collection, render it, re-arm.
//!
//! Each session runs as a serial poll-then-wait loop. The next fetch is only
//! scheduled once the previous response (success or failure) has arrived, so
//! slow responses never pile up requests. A spawned session owns exactly one
//! timer; "load more" requests from an [`Escalator`] are folded into that
//! timer instead of starting a second chain.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use reqwest::Url;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::auth::Authenticator;
use crate::config::{PanelConfig, ServerConfig};
use crate::io::{with_query_param, HttpClient, HttpRequest};
use crate::page_size::PageSize;
use crate::policy::RetryPolicy;
use crate::render::ItemRenderer;
use crate::view::PanelView;

const COUNT_PARAM: &str = "count";

/// One polled collection resource
#[derive(Debug, Clone)]
pub struct PollSession {
    name: String,
    url: Url,
    page_size: PageSize,
    interval: Duration,
    retry_delay: Duration,
    retry: RetryPolicy,
}

impl PollSession {
    pub fn new(
        name: &str,
        url: Url,
        page_size: PageSize,
        interval: Duration,
        retry_delay: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            url,
            page_size,
            interval,
            retry_delay,
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_config(panel: &PanelConfig, server: &ServerConfig) -> crate::Result<Self> {
        let url = server.resolve(&panel.locator)?;
        let page_size = PageSize::new(panel.page_size())?;
        Ok(Self::new(
            &panel.name,
            url,
            page_size,
            panel.interval(),
            panel.retry_delay(),
        )
        .with_retry_policy(panel.retry))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn page_size(&self) -> &PageSize {
        &self.page_size
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Locator with the current page size, read now rather than at schedule time
    pub fn request_url(&self) -> Url {
        with_query_param(&self.url, COUNT_PARAM, &self.page_size.get().to_string())
    }
}

/// Counters describing a session's progress
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub fetches: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    pub last_item_count: Option<usize>,
}

/// Why a poll loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    /// A one-shot poll succeeded and nothing else is scheduled
    Completed,
    /// The session's cancellation token fired
    Cancelled,
}

/// Request for an immediate one-shot fetch
#[derive(Debug)]
struct FetchNow;

enum Wake {
    Cancelled,
    Request(Option<FetchNow>),
    Timer,
}

/// Fetches a collection and renders it into a panel view
pub struct CollectionPoller {
    session: PollSession,
    http: Arc<dyn HttpClient>,
    auth: Arc<Authenticator>,
    renderer: Arc<dyn ItemRenderer>,
    view: Arc<dyn PanelView>,
    in_flight: tokio::sync::Mutex<()>,
    stats: Mutex<SessionStats>,
}

impl std::fmt::Debug for CollectionPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionPoller")
            .field("session", &self.session)
            .field("renderer", &self.renderer)
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}

impl CollectionPoller {
    pub fn new(
        session: PollSession,
        http: Arc<dyn HttpClient>,
        auth: Arc<Authenticator>,
        renderer: Arc<dyn ItemRenderer>,
        view: Arc<dyn PanelView>,
    ) -> Self {
        tracing::debug!(
            "Created poller '{}' for {} (page size {})",
            session.name,
            session.url,
            session.page_size.get()
        );
        Self {
            session,
            http,
            auth,
            renderer,
            view,
            in_flight: tokio::sync::Mutex::new(()),
            stats: Mutex::new(SessionStats::default()),
        }
    }

    pub fn session(&self) -> &PollSession {
        &self.session
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Issue one fetch and, on success, replace the view's contents.
    ///
    /// Returns the number of items the server sent. On failure the view is
    /// left untouched.
    pub async fn fetch(&self) -> crate::Result<usize> {
        let _in_flight = self.in_flight.lock().await;

        let request = self
            .auth
            .authenticate(HttpRequest::get(self.session.request_url()));
        tracing::debug!("Polling '{}' at {}", self.session.name, request.url);

        let result = self.fetch_items(&request).await;
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.fetches += 1;
        match result {
            Ok(items) => {
                stats.consecutive_failures = 0;
                stats.last_item_count = Some(items.len());
                drop(stats);
                self.render(&items);
                Ok(items.len())
            }
            Err(e) => {
                stats.failures += 1;
                stats.consecutive_failures += 1;
                Err(e)
            }
        }
    }

    async fn fetch_items(&self, request: &HttpRequest) -> crate::Result<Vec<Value>> {
        let response = self.http.send(request).await?;
        if !response.is_success() {
            return Err(crate::SyncError::Status {
                status: response.status,
                body: response.body,
            });
        }

        let mut body: Value = serde_json::from_str(&response.body)?;
        let key = self.renderer.collection_key();
        match body.get_mut(key).map(Value::take) {
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(crate::SyncError::Render(format!(
                "field '{}' is not an array: {}",
                key, other
            ))),
            None => Err(crate::SyncError::Render(format!(
                "response has no '{}' field",
                key
            ))),
        }
    }

    fn render(&self, items: &[Value]) {
        if !self.view.is_attached() {
            tracing::debug!("View for '{}' is not attached, skipping render", self.session.name);
            return;
        }

        self.view.clear();
        for item in items {
            match self.renderer.render(item) {
                Ok(fragment) => self.view.append(&fragment),
                Err(e) => {
                    tracing::warn!("Skipping item in '{}': {}", self.session.name, e);
                }
            }
        }
    }

    /// Poll the collection.
    ///
    /// With `repeat` the loop re-arms after every success and only returns
    /// if the retry policy gives up. Without it, the loop returns after the
    /// first success; failures are retried either way.
    pub async fn poll(&self, repeat: bool) -> crate::Result<PollExit> {
        let now = Instant::now();
        let (recurring, one_shot) = if repeat {
            (Some(now), None)
        } else {
            (None, Some(now))
        };
        self.drive(recurring, one_shot, None, CancellationToken::new())
            .await
    }

    /// Start the recurring poll on its own task
    pub fn spawn(self: Arc<Self>, parent: &CancellationToken) -> PollHandle {
        let cancel = parent.child_token();
        let (tx, rx) = mpsc::unbounded_channel();
        let name = self.session.name.clone();
        let page_size = self.session.page_size.clone();

        tracing::info!("Starting poll session '{}'", name);
        let poller = self;
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let result = poller
                .drive(Some(Instant::now()), None, Some(rx), task_cancel)
                .await;
            tracing::info!("Poll session '{}' stopped", poller.session.name);
            result
        });

        PollHandle {
            name,
            page_size,
            requests: tx,
            cancel,
            task,
        }
    }

    async fn drive(
        &self,
        mut recurring_at: Option<Instant>,
        mut one_shot_at: Option<Instant>,
        mut requests: Option<mpsc::UnboundedReceiver<FetchNow>>,
        cancel: CancellationToken,
    ) -> crate::Result<PollExit> {
        let mut failures = 0u32;

        loop {
            let next = match (recurring_at, one_shot_at) {
                (Some(a), Some(b)) => a.min(b),
                (Some(a), None) | (None, Some(a)) => a,
                (None, None) => return Ok(PollExit::Completed),
            };

            let wake = tokio::select! {
                biased;
                _ = cancel.cancelled() => Wake::Cancelled,
                request = recv_or_pending(&mut requests) => Wake::Request(request),
                _ = tokio::time::sleep_until(next) => Wake::Timer,
            };

            match wake {
                Wake::Cancelled => {
                    tracing::debug!("Poll loop for '{}' cancelled", self.session.name);
                    return Ok(PollExit::Cancelled);
                }
                // Requests queued during a fetch collapse into one slot
                Wake::Request(Some(FetchNow)) => {
                    one_shot_at = Some(Instant::now());
                    continue;
                }
                Wake::Request(None) => {
                    requests = None;
                    continue;
                }
                Wake::Timer => {}
            }

            let now = Instant::now();
            let recurring_due = recurring_at.is_some_and(|t| t <= now);
            let one_shot_due = one_shot_at.is_some_and(|t| t <= now);

            match self.fetch().await {
                Ok(count) => {
                    failures = 0;
                    tracing::debug!(
                        "Rendered {} items for '{}' (recurring={}, one_shot={})",
                        count,
                        self.session.name,
                        recurring_due,
                        one_shot_due
                    );
                    if one_shot_due {
                        one_shot_at = None;
                    }
                    if recurring_due {
                        recurring_at = Some(Instant::now() + self.session.interval);
                    }
                }
                Err(e) => {
                    failures += 1;
                    if !self.session.retry.allows(failures) {
                        tracing::warn!(
                            "Giving up on '{}' after {} consecutive failures: {}",
                            self.session.name,
                            failures,
                            e
                        );
                        return Err(crate::SyncError::RetriesExhausted {
                            attempts: failures,
                            last_error: e.to_string(),
                        });
                    }
                    let delay = self.session.retry.delay(self.session.retry_delay, failures);
                    tracing::debug!(
                        "Fetch for '{}' failed ({}), retrying in {:?}",
                        self.session.name,
                        e,
                        delay
                    );
                    let retry_at = Instant::now() + delay;
                    if one_shot_due {
                        one_shot_at = Some(retry_at);
                    }
                    if recurring_due {
                        recurring_at = Some(retry_at);
                    }
                }
            }
        }
    }
}

async fn recv_or_pending<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Handle to a spawned poll session
#[derive(Debug)]
pub struct PollHandle {
    name: String,
    page_size: PageSize,
    requests: mpsc::UnboundedSender<FetchNow>,
    cancel: CancellationToken,
    task: JoinHandle<crate::Result<PollExit>>,
}

impl PollHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A "load more" control bound to this session's counter
    pub fn escalator(&self) -> Escalator {
        Escalator {
            session: self.name.clone(),
            page_size: self.page_size.clone(),
            requests: self.requests.clone(),
        }
    }

    /// Whether the session still re-arms itself
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn stop(&self) {
        tracing::debug!("Stopping poll session '{}'", self.name);
        self.cancel.cancel();
    }

    /// Wait for the session task to end
    pub async fn join(self) -> crate::Result<PollExit> {
        self.task
            .await
            .map_err(|e| crate::SyncError::SessionStopped(format!("{}: {}", self.name, e)))?
    }
}

/// Multiplies a session's page size and asks for one immediate fetch
#[derive(Debug, Clone)]
pub struct Escalator {
    session: String,
    page_size: PageSize,
    requests: mpsc::UnboundedSender<FetchNow>,
}

impl Escalator {
    pub fn page_size(&self) -> u64 {
        self.page_size.get()
    }

    /// Multiply the page size and trigger one non-repeating fetch.
    ///
    /// The recurring schedule is left as is; its next fetch reads the new
    /// size. Returns the new page size.
    pub fn escalate(&self, multiplier: u64) -> crate::Result<u64> {
        let count = self.page_size.multiply(multiplier)?;
        tracing::debug!(
            "Escalating '{}' by {} to page size {}",
            self.session,
            multiplier,
            count
        );
        self.requests
            .send(FetchNow)
            .map_err(|_| crate::SyncError::SessionStopped(self.session.clone()))?;
        Ok(count)
    }
}
