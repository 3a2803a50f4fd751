//! State-changing form actions and their validation-error rendering

use std::sync::Arc;

use reqwest::Url;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::auth::Authenticator;
use crate::io::{HttpClient, HttpRequest};
use crate::notifier::{Notice, Notifier};
use crate::view::PanelView;

/// Action routes, relative to the page they are triggered from
pub mod routes {
    pub fn cancel_invite(page: &str, invite_id: &str) -> String {
        format!("{}/cancel/{}", page.trim_end_matches('/'), invite_id)
    }

    pub fn decline_invite(page: &str, invite_id: &str) -> String {
        format!("{}/decline/{}", page.trim_end_matches('/'), invite_id)
    }

    pub fn remove_member(page: &str, email: &str) -> String {
        format!("{}/remove-user/{}", page.trim_end_matches('/'), email)
    }

    pub fn create_task(page: &str) -> String {
        format!("{}/create-task", page.trim_end_matches('/'))
    }

    /// Projects are created by posting to the project list page itself
    pub fn create_project(page: &str) -> String {
        page.to_string()
    }

    pub fn invite_user(page: &str) -> String {
        format!("{}/invite-user", page.trim_end_matches('/'))
    }
}

/// One field/message pair from a rejected submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    /// Badge markup for the error view
    pub fn badge(&self) -> String {
        format!(
            r#"<p><span class="badge badge-danger">{} : {}</span></p>"#,
            self.field, self.message
        )
    }
}

/// Result of a submitted action
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    /// 2xx response. `confirmed` is false only when the server sent a
    /// `status` other than `ok`.
    Completed {
        message: Option<String>,
        confirmed: bool,
        body: Value,
    },
    /// Non-2xx response carrying per-field validation errors
    Rejected {
        message: Option<String>,
        errors: Vec<FieldError>,
    },
    /// Non-2xx response without validation errors
    Failed { status: u16, message: Option<String> },
}

#[derive(Debug, Default, Deserialize)]
struct ActionResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    errors: Option<Map<String, Value>>,
}

/// Submits forms to action routes
pub struct ActionClient {
    base: Url,
    http: Arc<dyn HttpClient>,
    auth: Arc<Authenticator>,
    notifier: Arc<dyn Notifier>,
    errors: Arc<dyn PanelView>,
}

impl std::fmt::Debug for ActionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionClient")
            .field("base", &self.base)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

impl ActionClient {
    pub fn new(
        base: Url,
        http: Arc<dyn HttpClient>,
        auth: Arc<Authenticator>,
        notifier: Arc<dyn Notifier>,
        errors: Arc<dyn PanelView>,
    ) -> Self {
        Self {
            base,
            http,
            auth,
            notifier,
            errors,
        }
    }

    /// POST `form` to `locator`.
    ///
    /// The error view is cleared first. Transport failures are returned and
    /// never retried.
    pub async fn submit(
        &self,
        locator: &str,
        form: Vec<(String, String)>,
    ) -> crate::Result<ActionOutcome> {
        let url = self
            .base
            .join(locator)
            .map_err(|e| crate::SyncError::InvalidUrl {
                url: locator.to_string(),
                reason: e.to_string(),
            })?;

        self.errors.clear();
        let request = self.auth.authenticate(HttpRequest::post_form(url, form));
        tracing::debug!("Submitting action to {}", request.url);
        let response = self.http.send(&request).await?;

        let body: Value = serde_json::from_str(&response.body).unwrap_or(Value::Null);
        let parsed = ActionResponse::deserialize(&body).unwrap_or_default();

        if let Some(message) = &parsed.message {
            let notice = if response.is_success() {
                Notice::info(message.clone())
            } else {
                Notice::error(message.clone())
            };
            self.notifier.notify(&notice).await;
        }

        if response.is_success() {
            let confirmed = parsed.status.as_deref().is_none_or(|s| s == "ok");
            return Ok(ActionOutcome::Completed {
                message: parsed.message,
                confirmed,
                body,
            });
        }

        match parsed.errors {
            Some(errors) => {
                let errors = field_errors(&errors);
                for error in &errors {
                    self.errors.append(&error.badge());
                }
                tracing::debug!(
                    "Action at {} rejected with {} field errors",
                    request.url,
                    errors.len()
                );
                Ok(ActionOutcome::Rejected {
                    message: parsed.message,
                    errors,
                })
            }
            None => {
                tracing::warn!(
                    "Action at {} failed with status {}",
                    request.url,
                    response.status
                );
                Ok(ActionOutcome::Failed {
                    status: response.status,
                    message: parsed.message,
                })
            }
        }
    }
}

fn field_errors(errors: &Map<String, Value>) -> Vec<FieldError> {
    errors
        .iter()
        .flat_map(|(field, messages)| {
            messages
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|entry| entry.get("message").and_then(Value::as_str))
                .map(move |message| FieldError {
                    field: field.clone(),
                    message: message.to_string(),
                })
        })
        .collect()
}
