//! BDD test world for panel-sync

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cucumber::World;
use tokio::time::Instant;

use panel_sync::action::ActionOutcome;
use panel_sync::config::Config;
use panel_sync::io::{HttpClient, HttpRequest, HttpResponse};
use panel_sync::job::JobOutcome;
use panel_sync::notifier::RecordingNotifier;
use panel_sync::poller::PollHandle;
use panel_sync::view::MemoryView;
use panel_sync::{PanelSync, PanelSyncBuilder};

/// What the fake server does with one request
#[derive(Debug, Clone)]
pub enum Reply {
    Respond(HttpResponse),
    Refuse,
}

#[derive(Debug, Default)]
struct Route {
    queue: VecDeque<Reply>,
    fallback: Option<Reply>,
}

/// A request as the fake server saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub at: Instant,
    pub request: HttpRequest,
}

/// In-process stand-in for the collaboration server, routing on URL path
#[derive(Debug, Default)]
pub struct FakeServer {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeServer {
    /// Queue a reply for the next unanswered request to `path`
    pub fn reply_once(&self, path: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .queue
            .push_back(reply);
    }

    /// Reply used once the queue for `path` is empty
    pub fn reply_always(&self, path: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .fallback = Some(reply);
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.request.url.path() == path)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl HttpClient for FakeServer {
    async fn send(&self, request: &HttpRequest) -> panel_sync::Result<HttpResponse> {
        self.requests.lock().unwrap().push(RecordedRequest {
            at: Instant::now(),
            request: request.clone(),
        });

        let reply = {
            let mut routes = self.routes.lock().unwrap();
            routes.get_mut(request.url.path()).and_then(|route| {
                route
                    .queue
                    .pop_front()
                    .or_else(|| route.fallback.clone())
            })
        };
        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Refuse) => Err(panel_sync::SyncError::Http(format!(
                "{} {} refused",
                request.method, request.url
            ))),
            None => Ok(HttpResponse {
                status: 404,
                body: r#"{"message": "Not found"}"#.to_string(),
            }),
        }
    }
}

pub fn json_reply(status: u16, body: serde_json::Value) -> Reply {
    Reply::Respond(HttpResponse {
        status,
        body: body.to_string(),
    })
}

/// Wait up to two seconds for `condition` to hold
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[derive(Debug, Default, World)]
pub struct PanelSyncWorld {
    pub server: Arc<FakeServer>,
    pub config: Config,
    pub csrf_token: Option<String>,
    pub views: HashMap<String, Arc<MemoryView>>,
    pub error_view: Arc<MemoryView>,
    pub notifier: Arc<RecordingNotifier>,

    // Polling
    pub handles: Vec<PollHandle>,
    pub escalation: Option<panel_sync::Result<u64>>,

    // Actions and jobs
    pub action_outcome: Option<panel_sync::Result<ActionOutcome>>,
    pub job_outcome: Option<panel_sync::Result<JobOutcome>>,
}

impl PanelSyncWorld {
    pub fn build(&mut self) -> PanelSync {
        let mut builder = PanelSyncBuilder::new(self.config.clone())
            .with_http_client(Arc::clone(&self.server) as Arc<dyn HttpClient>)
            .with_notifier(self.notifier.clone())
            .with_error_view(self.error_view.clone());
        for panel in &self.config.panels {
            let view = self
                .views
                .entry(panel.name.clone())
                .or_insert_with(|| Arc::new(MemoryView::new()));
            builder = builder.with_view(&panel.name, view.clone());
        }
        if let Some(token) = &self.csrf_token {
            builder = builder.with_token_store(Arc::new(
                panel_sync::auth::StaticTokenStore::new(Some(token.clone())),
            ));
        }
        builder.build().expect("panel-sync should build")
    }

    pub fn view(&self, name: &str) -> Arc<MemoryView> {
        self.views
            .get(name)
            .cloned()
            .unwrap_or_else(|| panic!("no view for panel '{}'", name))
    }

    pub fn handle(&self, name: &str) -> &PollHandle {
        self.handles
            .iter()
            .find(|h| h.name() == name)
            .unwrap_or_else(|| panic!("panel '{}' is not being watched", name))
    }
}

impl Drop for PanelSyncWorld {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.stop();
        }
    }
}
