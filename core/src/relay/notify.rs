//! Subscription notifier: forwards one link to the subscription service and classifies the answer.
//!
//! The service reports duplicates through the free-text `error` field of a 200 response, not
//! through a status code. `classify` therefore matches that text against the service's current
//! wording (Chinese "已存在" or English "already exists"). If the service changes its wording,
//! duplicates will surface as `Rejected`; there is no stable error code to match instead.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::SubscriptionConfig;

/// Hard limit for one notification call, connect through body.
pub const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

const ADD_PATH: &str = "/api/config/add";
const API_KEY_HEADER: &str = "X-API-Key";

/// Substrings of the `error` field that mean "this subscription is already registered".
const ALREADY_EXISTS_MARKERS: [&str; 2] = ["已存在", "already exists"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Created,
    /// Expected steady state for links seen before. Not an error; never retried.
    AlreadyExists,
    /// The service refused the link for another reason.
    Rejected,
    /// Network failure, timeout, non-2xx status or unreadable body.
    TransportError,
}

impl fmt::Display for NotifyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NotifyOutcome::Created => "created",
            NotifyOutcome::AlreadyExists => "already_exists",
            NotifyOutcome::Rejected => "rejected",
            NotifyOutcome::TransportError => "transport_error",
        })
    }
}

/// Outcome of one notification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationResult {
    pub outcome: NotifyOutcome,
    pub detail: String,
}

impl NotificationResult {
    fn new(outcome: NotifyOutcome, detail: impl Into<String>) -> Self {
        Self { outcome, detail: detail.into() }
    }

    pub fn transport_error(detail: impl Into<String>) -> Self {
        Self::new(NotifyOutcome::TransportError, detail)
    }
}

/// Sink for discovered links. Each call is one attempt; implementations never retry.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, url: &str) -> NotificationResult;
}

#[derive(Debug, Default, Deserialize)]
struct AddResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the subscription service's `POST /api/config/add`.
pub struct SubscriptionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl SubscriptionClient {
    pub fn new(config: &SubscriptionConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(NOTIFY_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: endpoint_for(&config.host),
            api_key: config.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Notifier for SubscriptionClient {
    async fn notify(&self, url: &str) -> NotificationResult {
        let body = serde_json::json!({ "sub_url": url });
        let res = match self
            .client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(res) => res,
            Err(e) => return NotificationResult::transport_error(format!("request failed: {}", e)),
        };
        let status = res.status();
        match res.text().await {
            Ok(text) => classify(status, &text),
            Err(e) => NotificationResult::transport_error(format!("read body: {}", e)),
        }
    }
}

/// `host:port` gets plain http (the service is usually on the LAN); a host with a scheme is used as is.
pub fn endpoint_for(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}{}", host, ADD_PATH)
    } else {
        format!("http://{}{}", host, ADD_PATH)
    }
}

/// Classify a response. Pure so it can be checked without a server.
pub fn classify(status: StatusCode, body: &str) -> NotificationResult {
    if !status.is_success() {
        return NotificationResult::transport_error(format!("status {}: {}", status.as_u16(), body));
    }
    let parsed: AddResponse = match serde_json::from_str(body) {
        Ok(p) => p,
        Err(e) => return NotificationResult::transport_error(format!("invalid response body: {}", e)),
    };
    match parsed.error.filter(|e| !e.is_empty()) {
        Some(error) if is_already_exists(&error) => {
            NotificationResult::new(NotifyOutcome::AlreadyExists, error)
        }
        Some(error) => NotificationResult::new(NotifyOutcome::Rejected, error),
        None => NotificationResult::new(NotifyOutcome::Created, parsed.message.unwrap_or_default()),
    }
}

fn is_already_exists(error: &str) -> bool {
    let lowered = error.to_lowercase();
    ALREADY_EXISTS_MARKERS.iter().any(|m| lowered.contains(m))
}
