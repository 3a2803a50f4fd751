//! Panel sync - keeps dashboard panels in step with a collaboration server
//!
//! Polls collection resources (activities, tasks, sub-tasks) and re-renders
//! them, submits state-changing actions with the anti-forgery token, and
//! follows background import jobs until they finish.

pub mod action;
pub mod auth;
pub mod config;
pub mod error;
pub mod io;
pub mod job;
pub mod notifier;
pub mod page_size;
pub mod policy;
pub mod poller;
pub mod render;
pub mod view;


pub use config::{load_config, Config};
pub use error::{Result, SyncError};

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::action::ActionClient;
use crate::auth::{Authenticator, CookieTokenStore, StaticTokenStore, TokenStore};
use crate::io::{HttpClient, ReqwestHttpClient};
use crate::job::{JobMonitor, JobOutcome};
use crate::notifier::{LogNotifier, Notifier};
use crate::poller::{CollectionPoller, PollHandle, PollSession};
use crate::render::renderer_for;
use crate::view::{ConsoleView, PanelView};

/// Form field the import job expects the repository name in
const REPOSITORY_FIELD: &str = "repository";

/// Wires configuration and collaborators into a [`PanelSync`]
pub struct PanelSyncBuilder {
    config: Config,
    http: Option<Arc<dyn HttpClient>>,
    tokens: Option<Arc<dyn TokenStore>>,
    notifier: Option<Arc<dyn Notifier>>,
    views: HashMap<String, Arc<dyn PanelView>>,
    error_view: Option<Arc<dyn PanelView>>,
    cancel: Option<CancellationToken>,
}

impl PanelSyncBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            http: None,
            tokens: None,
            notifier: None,
            views: HashMap::new(),
            error_view: None,
            cancel: None,
        }
    }

    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    /// Replace the token store built from `auth.cookies`
    pub fn with_token_store(mut self, tokens: Arc<dyn TokenStore>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Render panel `name` into `view` instead of stdout
    pub fn with_view(mut self, name: &str, view: Arc<dyn PanelView>) -> Self {
        self.views.insert(name.to_string(), view);
        self
    }

    pub fn with_error_view(mut self, view: Arc<dyn PanelView>) -> Self {
        self.error_view = Some(view);
        self
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn build(mut self) -> Result<PanelSync> {
        self.config.validate()?;

        let http: Arc<dyn HttpClient> = match self.http {
            Some(http) => http,
            None => Arc::new(ReqwestHttpClient::new(self.config.server.request_timeout())?),
        };
        let tokens: Arc<dyn TokenStore> = match self.tokens {
            Some(tokens) => tokens,
            None => match &self.config.auth.cookies {
                Some(raw) => Arc::new(CookieTokenStore::parse(raw)),
                None => Arc::new(StaticTokenStore::new(None)),
            },
        };
        let auth = Arc::new(Authenticator::new(
            self.config.server.base_url()?,
            &self.config.auth,
            tokens,
        ));

        let mut pollers = Vec::with_capacity(self.config.panels.len());
        for panel in &self.config.panels {
            let session = PollSession::from_config(panel, &self.config.server)?;
            let view = self
                .views
                .remove(&panel.name)
                .unwrap_or_else(|| Arc::new(ConsoleView::new(&panel.name)));
            pollers.push(Arc::new(CollectionPoller::new(
                session,
                Arc::clone(&http),
                Arc::clone(&auth),
                renderer_for(panel.kind),
                view,
            )));
        }
        for name in self.views.keys() {
            tracing::warn!("No panel named '{}' is configured, ignoring its view", name);
        }

        tracing::debug!("Built {} panel pollers", pollers.len());
        Ok(PanelSync {
            config: self.config,
            http,
            auth,
            notifier: self.notifier.unwrap_or_else(|| Arc::new(LogNotifier)),
            error_view: self
                .error_view
                .unwrap_or_else(|| Arc::new(ConsoleView::new("errors"))),
            pollers,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}

/// A configured panel-sync client
pub struct PanelSync {
    config: Config,
    http: Arc<dyn HttpClient>,
    auth: Arc<Authenticator>,
    notifier: Arc<dyn Notifier>,
    error_view: Arc<dyn PanelView>,
    pollers: Vec<Arc<CollectionPoller>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for PanelSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PanelSync")
            .field("pollers", &self.pollers)
            .finish_non_exhaustive()
    }
}

impl PanelSync {
    pub fn pollers(&self) -> &[Arc<CollectionPoller>] {
        &self.pollers
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start one recurring session per configured panel
    pub fn spawn_pollers(&self) -> Vec<PollHandle> {
        self.pollers
            .iter()
            .map(|poller| Arc::clone(poller).spawn(&self.cancel))
            .collect()
    }

    /// Run every panel until the cancellation token fires
    pub async fn watch(&self) -> Result<()> {
        let handles = self.spawn_pollers();
        tracing::info!("Watching {} panels", handles.len());

        self.cancel.cancelled().await;
        tracing::info!("Stopping panel pollers");

        for handle in handles {
            let name = handle.name().to_string();
            match handle.join().await {
                Ok(exit) => tracing::debug!("Panel '{}' ended: {:?}", name, exit),
                Err(e) => tracing::warn!("Panel '{}' ended with error: {}", name, e),
            }
        }
        Ok(())
    }

    pub fn action_client(&self) -> Result<ActionClient> {
        Ok(ActionClient::new(
            self.config.server.base_url()?,
            Arc::clone(&self.http),
            Arc::clone(&self.auth),
            Arc::clone(&self.notifier),
            Arc::clone(&self.error_view),
        ))
    }

    pub fn job_monitor(&self) -> Result<JobMonitor> {
        Ok(JobMonitor::new(
            &self.config.jobs,
            &self.config.server,
            Arc::clone(&self.http),
            Arc::clone(&self.auth),
            Arc::clone(&self.notifier),
        )?
        .with_cancellation_token(self.cancel.clone()))
    }

    /// Start the repository import job and wait for it to finish
    pub async fn import_repository(&self, repository: &str) -> Result<JobOutcome> {
        tracing::info!("Importing repository '{}'", repository);
        self.job_monitor()?
            .start(vec![(REPOSITORY_FIELD.to_string(), repository.to_string())])
            .await
    }
}
