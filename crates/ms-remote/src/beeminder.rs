// beeminder.rs — BeeminderClient: the Beeminder v1 datapoint API over HTTP.
//
// Endpoints used (all under /users/{user}/goals/{goal}):
//   GET    datapoints.json?page=&per_page=   paginated listing
//   POST   datapoints.json                   create (form body)
//   PUT    datapoints/{id}.json              update (form body)
//   DELETE datapoints/{id}.json              delete
//
// The auth token travels as the `auth_token` parameter on every request and
// is never logged; URLs in log lines are built without it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};

use crate::client::{DetectionSource, RemoteGoalClient};
use crate::datapoint::{RawEvent, RemoteDatapoint};
use crate::error::RemoteError;

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://www.beeminder.com/api/v1";

/// Largest page the API serves.
pub const MAX_PER_PAGE: usize = 300;

/// Beeminder API client for one user.
pub struct BeeminderClient {
    username: String,
    auth_token: String,
    base_url: String,
    per_page: usize,
    http: Client,
}

impl BeeminderClient {
    pub fn new(
        username: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Result<Self, RemoteError> {
        Self::with_base_url(username, auth_token, DEFAULT_BASE_URL)
    }

    /// Point the client at a different API root (staging, a local fake).
    pub fn with_base_url(
        username: impl Into<String>,
        auth_token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, RemoteError> {
        let username = username.into();
        let auth_token = auth_token.into();
        if username.trim().is_empty() {
            return Err(RemoteError::InvalidRequest("username is empty".into()));
        }
        if auth_token.trim().is_empty() {
            return Err(RemoteError::InvalidRequest("auth token is empty".into()));
        }

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("msync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::InvalidRequest(format!("HTTP client: {e}")))?;

        Ok(Self {
            username,
            auth_token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            per_page: MAX_PER_PAGE,
            http,
        })
    }

    /// Override the page size used when listing (clamped to 1..=300).
    pub fn with_per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page.clamp(1, MAX_PER_PAGE);
        self
    }

    fn datapoints_url(&self, goal: &str) -> String {
        format!(
            "{}/users/{}/goals/{}/datapoints.json",
            self.base_url, self.username, goal
        )
    }

    fn datapoint_url(&self, goal: &str, remote_id: &str) -> String {
        format!(
            "{}/users/{}/goals/{}/datapoints/{}.json",
            self.base_url, self.username, goal, remote_id
        )
    }

    fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request.send().map_err(|e| RemoteError::Transport {
            operation: operation.to_string(),
            message: e.without_url().to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(RemoteError::Status {
            operation: operation.to_string(),
            status: status.as_u16(),
            body: truncate(&body, 200),
        })
    }

    fn fetch_page(
        &self,
        goal: &str,
        page: usize,
    ) -> Result<Vec<RemoteDatapoint>, RemoteError> {
        let operation = format!("list {goal} page {page}");
        let page = page.to_string();
        let per_page = self.per_page.to_string();
        let request = self.http.get(self.datapoints_url(goal)).query(&[
            ("auth_token", self.auth_token.as_str()),
            ("page", page.as_str()),
            ("per_page", per_page.as_str()),
        ]);
        self.send(&operation, request)?
            .json::<Vec<RemoteDatapoint>>()
            .map_err(|e| RemoteError::Decode {
                operation,
                message: e.without_url().to_string(),
            })
    }
}

impl RemoteGoalClient for BeeminderClient {
    fn list_datapoints(&self, goal: &str) -> Result<Vec<RemoteDatapoint>, RemoteError> {
        let mut all = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.fetch_page(goal, page)?;
            let count = batch.len();
            tracing::debug!(goal, page, count, "fetched datapoint page");
            all.extend(batch);
            if count < self.per_page {
                break;
            }
            page += 1;
        }
        tracing::info!(goal, total = all.len(), "datapoints listed");
        Ok(all)
    }

    fn create_datapoint(
        &self,
        goal: &str,
        value: f64,
        timestamp: i64,
        comment: &str,
    ) -> Result<String, RemoteError> {
        let operation = format!("create on {goal}");
        let value = value.to_string();
        let timestamp_param = timestamp.to_string();
        let request = self.http.post(self.datapoints_url(goal)).form(&[
            ("auth_token", self.auth_token.as_str()),
            ("value", value.as_str()),
            ("timestamp", timestamp_param.as_str()),
            ("comment", comment),
        ]);
        let created: RemoteDatapoint =
            self.send(&operation, request)?
                .json()
                .map_err(|e| RemoteError::Decode {
                    operation,
                    message: e.without_url().to_string(),
                })?;
        tracing::info!(goal, remote_id = %created.id, timestamp, "datapoint created");
        Ok(created.id)
    }

    fn update_datapoint(
        &self,
        goal: &str,
        remote_id: &str,
        value: f64,
        timestamp: i64,
    ) -> Result<(), RemoteError> {
        let value = value.to_string();
        let timestamp_param = timestamp.to_string();
        let request = self.http.put(self.datapoint_url(goal, remote_id)).form(&[
            ("auth_token", self.auth_token.as_str()),
            ("value", value.as_str()),
            ("timestamp", timestamp_param.as_str()),
        ]);
        self.send(&format!("update {remote_id} on {goal}"), request)?;
        tracing::info!(goal, remote_id, timestamp, "datapoint updated");
        Ok(())
    }

    fn delete_datapoint(&self, goal: &str, remote_id: &str) -> Result<(), RemoteError> {
        let request = self
            .http
            .delete(self.datapoint_url(goal, remote_id))
            .query(&[("auth_token", self.auth_token.as_str())]);
        self.send(&format!("delete {remote_id} on {goal}"), request)?;
        tracing::info!(goal, remote_id, "datapoint deleted");
        Ok(())
    }
}

impl DetectionSource for BeeminderClient {
    fn list_raw_events(
        &self,
        goal: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RawEvent>, RemoteError> {
        let cutoff = since.map(|t| t.timestamp());
        Ok(self
            .list_datapoints(goal)?
            .into_iter()
            .filter(|dp| cutoff.map_or(true, |c| dp.timestamp >= c))
            .map(RawEvent::from)
            .collect())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
