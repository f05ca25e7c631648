//! Clockify REST client.
//!
//! Requests carry the `X-Api-Key` header. Rate limiting (429), server errors
//! and transport failures are retried up to three times with exponential
//! backoff before the call gives up.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

use crate::model::Project;

pub const DEFAULT_BASE_URL: &str = "https://api.clockify.me/api/v1";

const MAX_RETRIES: u32 = 3;
const PAGE_SIZE: usize = 500;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ClockifyError {
    #[error("workspace ID is empty; set workspace_id in config or CLOCKIFY_WORKSPACE_ID")]
    MissingWorkspace,

    #[error("user has no default workspace; set workspace_id in config or CLOCKIFY_WORKSPACE_ID")]
    NoDefaultWorkspace,

    #[error("sending request: {0}")]
    Transport(String),

    #[error("API returned status {status} after {retries} retries")]
    RetriesExhausted { status: u16, retries: u32 },

    #[error("API error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("parsing {what} response: {message}")]
    Decode { what: &'static str, message: String },
}

/// Body of `POST /workspaces/{id}/time-entries`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeEntryRequest {
    /// UTC, `YYYY-MM-DDTHH:MM:SSZ`
    pub start: String,
    /// UTC, `YYYY-MM-DDTHH:MM:SSZ`
    pub end: String,
    #[serde(rename = "projectId")]
    pub project_id: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedEntry {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "activeWorkspace", default)]
    pub active_workspace: String,
    #[serde(rename = "defaultWorkspace", default)]
    pub default_workspace: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiProject {
    id: String,
    name: String,
    #[serde(rename = "clientId", default)]
    client_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiClient {
    id: String,
    name: String,
}

/// Creates time entries in the external tracker.
#[async_trait]
pub trait TimeEntrySink: Send + Sync {
    async fn create_entry(
        &self,
        workspace_id: &str,
        entry: &TimeEntryRequest,
    ) -> Result<CreatedEntry, ClockifyError>;
}

pub struct ClockifyClient {
    http: Client,
    base_url: String,
    api_key: String,
    base_backoff: Duration,
}

impl ClockifyClient {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>) -> Result<Self, ClockifyError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClockifyError::Transport(e.to_string()))?;
        let base_url = base_url
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            http,
            base_url,
            api_key: api_key.into(),
            base_backoff: Duration::from_secs(1),
        })
    }

    /// Scale the retry backoff; the n-th retry waits `base * 2^n`.
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.base_backoff = base;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.pow(attempt)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        what: &'static str,
    ) -> Result<T, ClockifyError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, path, "Clockify API request");

        let mut attempt = 0;
        let response = loop {
            let mut builder = self
                .http
                .request(method.clone(), &url)
                .header("X-Api-Key", &self.api_key);
            if let Some(body) = body {
                builder = builder.json(body);
            }

            match builder.send().await {
                Err(err) => {
                    if attempt == MAX_RETRIES {
                        error!(method = %method, path, error = %err, "Clockify transport error");
                        return Err(ClockifyError::Transport(err.to_string()));
                    }
                    debug!(path, attempt = attempt + 1, error = %err, "Transport error, retrying");
                }
                Ok(resp) if is_retryable(resp.status()) => {
                    if attempt == MAX_RETRIES {
                        error!(method = %method, path, status = resp.status().as_u16(), "Clockify request failed after retries");
                        return Err(ClockifyError::RetriesExhausted {
                            status: resp.status().as_u16(),
                            retries: MAX_RETRIES,
                        });
                    }
                    debug!(path, attempt = attempt + 1, status = resp.status().as_u16(), "Retryable status, retrying");
                }
                Ok(resp) => break resp,
            }
            tokio::time::sleep(self.backoff(attempt)).await;
            attempt += 1;
        };

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ClockifyError::Transport(e.to_string()))?;
        debug!(path, status = status.as_u16(), bytes = text.len(), "Clockify API response");

        if !status.is_success() {
            error!(method = %method, path, status = status.as_u16(), "Clockify request failed");
            return Err(ClockifyError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| ClockifyError::Decode {
            what,
            message: e.to_string(),
        })
    }

    async fn paged<T: DeserializeOwned>(
        &self,
        path: &str,
        what: &'static str,
    ) -> Result<Vec<T>, ClockifyError> {
        let mut all = Vec::new();
        let mut page = 1;
        loop {
            let sep = if path.contains('?') { '&' } else { '?' };
            let paged_path = format!("{}{}page-size={}&page={}", path, sep, PAGE_SIZE, page);
            let items: Vec<T> = self.request(Method::GET, &paged_path, None, what).await?;
            let done = items.len() < PAGE_SIZE;
            all.extend(items);
            if done {
                return Ok(all);
            }
            page += 1;
        }
    }

    pub async fn current_user(&self) -> Result<User, ClockifyError> {
        self.request(Method::GET, "/user", None, "user").await
    }

    /// The configured workspace, or the user's default one.
    pub async fn resolve_workspace(&self, configured: Option<&str>) -> Result<String, ClockifyError> {
        if let Some(id) = configured.filter(|id| !id.is_empty()) {
            return Ok(id.to_string());
        }
        let user = self.current_user().await?;
        if user.default_workspace.is_empty() {
            return Err(ClockifyError::NoDefaultWorkspace);
        }
        Ok(user.default_workspace)
    }

    /// Active projects with client names filled in.
    ///
    /// A failed client lookup leaves client names empty rather than failing.
    pub async fn projects(&self, workspace_id: &str) -> Result<Vec<Project>, ClockifyError> {
        if workspace_id.is_empty() {
            return Err(ClockifyError::MissingWorkspace);
        }
        let projects: Vec<ApiProject> = self
            .paged(
                &format!("/workspaces/{}/projects?archived=false", workspace_id),
                "projects",
            )
            .await?;
        debug!(count = projects.len(), "Projects loaded");

        let clients = match self
            .paged::<ApiClient>(&format!("/workspaces/{}/clients", workspace_id), "clients")
            .await
        {
            Ok(clients) => clients,
            Err(err) => {
                debug!(error = %err, "Client lookup failed, continuing without client names");
                Vec::new()
            }
        };
        Ok(attach_clients(projects, clients))
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn attach_clients(projects: Vec<ApiProject>, clients: Vec<ApiClient>) -> Vec<Project> {
    let names: HashMap<String, String> = clients.into_iter().map(|c| (c.id, c.name)).collect();
    projects
        .into_iter()
        .map(|p| Project {
            client_name: p
                .client_id
                .as_ref()
                .and_then(|id| names.get(id))
                .cloned(),
            id: p.id,
            name: p.name,
        })
        .collect()
}

#[async_trait]
impl TimeEntrySink for ClockifyClient {
    async fn create_entry(
        &self,
        workspace_id: &str,
        entry: &TimeEntryRequest,
    ) -> Result<CreatedEntry, ClockifyError> {
        if workspace_id.is_empty() {
            return Err(ClockifyError::MissingWorkspace);
        }
        let body = serde_json::to_value(entry).map_err(|e| ClockifyError::Decode {
            what: "time entry",
            message: e.to_string(),
        })?;
        self.request(
            Method::POST,
            &format!("/workspaces/{}/time-entries", workspace_id),
            Some(&body),
            "time entry",
        )
        .await
    }
}
