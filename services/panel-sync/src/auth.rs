//! Anti-forgery token handling for state-changing requests
//!
//! Safe methods (GET, HEAD, OPTIONS, TRACE) and cross-origin requests pass
//! through untouched. Everything else gets the token header when a token is
//! available; a missing token is left for the server to reject.

use std::sync::Arc;

use reqwest::Url;

use crate::config::AuthConfig;
use crate::io::HttpRequest;

/// Source of client-stored credentials, keyed by cookie name
pub trait TokenStore: Send + Sync + std::fmt::Debug {
    fn get(&self, name: &str) -> Option<String>;
}

/// Token store backed by a `Cookie:` header style string (`a=1; csrftoken=xyz`)
#[derive(Debug, Clone, Default)]
pub struct CookieTokenStore {
    cookies: Vec<(String, String)>,
}

impl CookieTokenStore {
    pub fn parse(raw: &str) -> Self {
        let cookies = raw
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().to_string()))
            })
            .collect();
        Self { cookies }
    }
}

impl TokenStore for CookieTokenStore {
    fn get(&self, name: &str) -> Option<String> {
        self.cookies
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }
}

/// Token store that always hands out the same token, if any
#[derive(Debug, Clone, Default)]
pub struct StaticTokenStore {
    token: Option<String>,
}

impl StaticTokenStore {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

impl TokenStore for StaticTokenStore {
    fn get(&self, _name: &str) -> Option<String> {
        self.token.clone()
    }
}

/// Attaches the anti-forgery header to outgoing requests
#[derive(Debug, Clone)]
pub struct Authenticator {
    origin: Url,
    cookie_name: String,
    header_name: String,
    tokens: Arc<dyn TokenStore>,
}

impl Authenticator {
    pub fn new(origin: Url, config: &AuthConfig, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            origin,
            cookie_name: config.cookie_name.clone(),
            header_name: config.header_name.clone(),
            tokens,
        }
    }

    /// Scheme, host and port differ from the configured server origin
    pub fn is_cross_origin(&self, url: &Url) -> bool {
        url.origin() != self.origin.origin()
    }

    pub fn authenticate(&self, mut request: HttpRequest) -> HttpRequest {
        if request.method.is_safe() || self.is_cross_origin(&request.url) {
            return request;
        }

        match self.tokens.get(&self.cookie_name) {
            Some(token) => {
                request
                    .headers
                    .retain(|(k, _)| !k.eq_ignore_ascii_case(&self.header_name));
                request.headers.push((self.header_name.clone(), token));
            }
            None => {
                tracing::debug!(
                    "No '{}' token stored, sending {} {} without it",
                    self.cookie_name,
                    request.method,
                    request.url
                );
            }
        }
        request
    }
}
