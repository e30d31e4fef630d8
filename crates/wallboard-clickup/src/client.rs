use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, error};

use crate::error::{Result, WallboardError};
use crate::fetcher::{PageRequest, TaskPageSource};
use crate::models::TaskPage;

/// Longest response body excerpt written to the log
const LOGGED_BODY_LIMIT: usize = 500;

/// Read-only ClickUp API client
pub struct ClickUpClient {
    default_headers: HeaderMap,
    client: reqwest::Client,
    api_base: String,
}

impl ClickUpClient {
    /// ClickUp personal tokens go into `Authorization` as-is (no `Bearer` prefix).
    ///
    /// No request timeout is set: a stuck request is superseded by the next
    /// refresh cycle instead.
    pub fn new(api_token: &str, api_base: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let token = HeaderValue::from_str(api_token).map_err(|_| {
            WallboardError::configuration("CLICKUP_API_TOKEN contains characters not allowed in a header")
        })?;
        headers.insert(AUTHORIZATION, token);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| WallboardError::configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            default_headers: headers,
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn list_tasks_url(&self, list_id: &str) -> String {
        format!("{}/list/{}/task", self.api_base, list_id)
    }

    /// Helper to create better error messages from reqwest errors
    fn format_reqwest_error(e: &reqwest::Error, url: &str, operation: &str) -> String {
        if e.is_timeout() {
            format!("Failed to {} for {}: timeout - request took too long", operation, url)
        } else if e.is_connect() {
            format!(
                "Failed to {} for {}: connection error - check network connectivity, DNS resolution, and firewall settings. Error: {}",
                operation, url, e
            )
        } else if e.is_request() {
            format!(
                "Failed to {} for {}: request error - invalid URL format or malformed request parameters. Error: {}",
                operation, url, e
            )
        } else if e.is_body() || e.is_decode() {
            format!("Failed to {} for {}: error reading response body. Error: {}", operation, url, e)
        } else {
            format!("Failed to {} for {}: {}", operation, url, e)
        }
    }

    /// Turn a response into its body text, or an upstream error for non-2xx
    async fn handle_response(response: reqwest::Response, url: &str) -> Result<String> {
        let status = response.status();
        let response_text = response.text().await.map_err(|e| WallboardError::Transport {
            message: Self::format_reqwest_error(&e, url, "read response body"),
        })?;

        if !status.is_success() {
            error!(
                "[ClickUpClient] HTTP {} error from {}: {}",
                status.as_u16(),
                url,
                truncate(&response_text, LOGGED_BODY_LIMIT)
            );
            return Err(WallboardError::Upstream {
                status: status.as_u16(),
                body: response_text,
            });
        }

        Ok(response_text)
    }

    pub fn parse_page(response_text: &str) -> Result<TaskPage> {
        serde_json::from_str(response_text).map_err(|e| WallboardError::Decode {
            message: format!(
                "{} (body starts with: {})",
                e,
                truncate(response_text, 200)
            ),
        })
    }
}

#[async_trait]
impl TaskPageSource for ClickUpClient {
    async fn fetch_page(&self, request: &PageRequest) -> Result<TaskPage> {
        let url = self.list_tasks_url(&request.list_id);
        let page = request.page.to_string();
        let page_size = request.page_size.to_string();

        debug!(
            "[ClickUpClient] GET {} page={} page_size={}",
            url, request.page, request.page_size
        );

        let response = self
            .client
            .get(&url)
            .headers(self.default_headers.clone())
            .query(&[
                ("include_closed", "true"),
                ("subtasks", "true"),
                ("order_by", "updated"),
                ("page", page.as_str()),
                ("page_size", page_size.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                let message = Self::format_reqwest_error(&e, &url, "fetch tasks");
                error!("[ClickUpClient] {}", message);
                WallboardError::Transport { message }
            })?;

        let response_text = Self::handle_response(response, &url).await?;
        Self::parse_page(&response_text)
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() > limit {
        format!("{}... (truncated)", text.chars().take(limit).collect::<String>())
    } else {
        text.to_string()
    }
}
