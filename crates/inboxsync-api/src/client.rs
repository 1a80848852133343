//! HTTP client for the inbox notifications API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{ApiError, InboxNotificationsDelta};

/// Transport capability consumed by the sync engine.
///
/// Failures are only ever reported through the returned `Result`.
#[async_trait]
pub trait InboxApi: Send + Sync {
    /// Fetch inbox notifications and their threads.
    ///
    /// With `since`, only changes after that server watermark are returned.
    async fn get_inbox_notifications(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<InboxNotificationsDelta, ApiError>;

    /// Mark one inbox notification as read.
    async fn mark_inbox_notification_as_read(
        &self,
        inbox_notification_id: &str,
    ) -> Result<(), ApiError>;

    /// Mark every inbox notification as read.
    async fn mark_all_inbox_notifications_as_read(&self) -> Result<(), ApiError>;

    /// Delete one inbox notification.
    async fn delete_inbox_notification(&self, inbox_notification_id: &str)
    -> Result<(), ApiError>;

    /// Delete every inbox notification.
    async fn delete_all_inbox_notifications(&self) -> Result<(), ApiError>;
}

/// Body of the mark-as-read endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkAsReadRequest<'a> {
    inbox_notification_ids: MarkAsReadTarget<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MarkAsReadTarget<'a> {
    Ids(Vec<&'a str>),
    All(&'static str),
}

/// Error body format returned by the API.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    message: String,
}

/// reqwest-backed [`InboxApi`] implementation using bearer-token auth.
pub struct HttpInboxClient {
    http: Client,
    base_url: String,
    token: String,
}

impl HttpInboxClient {
    /// Create a new client for the given API base URL.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ApiError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/c/inbox-notifications{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("Authorization", format!("Bearer {}", self.token))
    }

    /// Check the status and parse a JSON body.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::check_status(response).await?;
        let text = response.text().await?;
        let body = serde_json::from_str(&text)?;
        Ok(body)
    }

    /// Check the status of a response whose body is ignored.
    async fn handle_empty(&self, response: reqwest::Response) -> Result<(), ApiError> {
        Self::check_status(response).await?;
        Ok(())
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(ApiError::RateLimited { retry_after_secs });
        }

        let text = response.text().await.map_err(|e| {
            ApiError::InvalidResponse(format!(
                "request failed ({}): failed to read response: {}",
                status, e
            ))
        })?;

        let message = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => match body.error {
                Some(error) => format!("{} - {}", error, body.message),
                None => body.message,
            },
            Err(_) => text,
        };

        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ApiError::Auth(format!("{} ({})", message, status))
            }
            StatusCode::NOT_FOUND => ApiError::NotFound(message),
            _ => ApiError::Server {
                status: status.as_u16(),
                message,
            },
        })
    }
}

#[async_trait]
impl InboxApi for HttpInboxClient {
    async fn get_inbox_notifications(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<InboxNotificationsDelta, ApiError> {
        let mut request = self.authorized(self.http.get(self.url("")));
        if let Some(since) = since {
            request = request.query(&[("since", since.to_rfc3339_opts(SecondsFormat::Millis, true))]);
        }

        let response = request.send().await?;
        let delta: InboxNotificationsDelta = self.handle_response(response).await?;

        debug!(
            since = ?since,
            notifications = delta.inbox_notifications.len(),
            threads = delta.threads.len(),
            deleted_notifications = delta.deleted_inbox_notifications.len(),
            requested_at = %delta.meta.requested_at,
            "fetched inbox notifications"
        );

        Ok(delta)
    }

    async fn mark_inbox_notification_as_read(
        &self,
        inbox_notification_id: &str,
    ) -> Result<(), ApiError> {
        let body = MarkAsReadRequest {
            inbox_notification_ids: MarkAsReadTarget::Ids(vec![inbox_notification_id]),
        };
        let response = self
            .authorized(self.http.post(self.url("/read")))
            .json(&body)
            .send()
            .await?;
        self.handle_empty(response).await
    }

    async fn mark_all_inbox_notifications_as_read(&self) -> Result<(), ApiError> {
        let body = MarkAsReadRequest {
            inbox_notification_ids: MarkAsReadTarget::All("all"),
        };
        let response = self
            .authorized(self.http.post(self.url("/read")))
            .json(&body)
            .send()
            .await?;
        self.handle_empty(response).await
    }

    async fn delete_inbox_notification(
        &self,
        inbox_notification_id: &str,
    ) -> Result<(), ApiError> {
        let response = self
            .authorized(
                self.http
                    .delete(self.url(&format!("/{}", inbox_notification_id))),
            )
            .send()
            .await?;
        self.handle_empty(response).await
    }

    async fn delete_all_inbox_notifications(&self) -> Result<(), ApiError> {
        let response = self
            .authorized(self.http.delete(self.url("")))
            .send()
            .await?;
        self.handle_empty(response).await
    }
}
