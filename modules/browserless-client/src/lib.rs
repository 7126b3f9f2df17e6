pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

use serde::Serialize;

/// Header Browserless sets to the URL the page ended up on after redirects.
const RESPONSE_URL_HEADER: &str = "x-response-url";

/// Extra time granted to the HTTP request on top of the render budget, so the
/// server-side timeout fires first and reports a proper status.
const REQUEST_SLACK: Duration = Duration::from_secs(5);

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

/// Body of a `/content` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    pub url: String,
    pub goto_options: GotoOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_for_selector: Option<WaitForSelector>,
    /// Fixed settle delay after load, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_for_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GotoOptions {
    pub timeout: u64,
    pub wait_until: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaitForSelector {
    pub selector: String,
    pub timeout: u64,
}

impl ContentRequest {
    /// Navigate to `url`, giving up after `timeout`. Waits for DOMContentLoaded only.
    pub fn new(url: &str, timeout: Duration) -> Self {
        Self {
            url: url.to_string(),
            goto_options: GotoOptions {
                timeout: millis(timeout),
                wait_until: "domcontentloaded".to_string(),
            },
            wait_for_selector: None,
            wait_for_timeout: None,
            user_agent: None,
        }
    }

    pub fn wait_for_selector(mut self, selector: &str, timeout: Duration) -> Self {
        self.wait_for_selector = Some(WaitForSelector {
            selector: selector.to_string(),
            timeout: millis(timeout),
        });
        self
    }

    pub fn settle(mut self, delay: Duration) -> Self {
        self.wait_for_timeout = (!delay.is_zero()).then(|| millis(delay));
        self
    }

    pub fn user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = Some(user_agent.to_string());
        self
    }

    /// Worst-case server-side time this request may take.
    fn budget(&self) -> Duration {
        let selector = self
            .wait_for_selector
            .as_ref()
            .map(|w| w.timeout)
            .unwrap_or(0);
        Duration::from_millis(
            self.goto_options
                .timeout
                .saturating_add(selector)
                .saturating_add(self.wait_for_timeout.unwrap_or(0)),
        )
    }
}

/// Rendered HTML plus the URL the browser ended up on.
#[derive(Debug, Clone)]
pub struct RenderedContent {
    pub url: String,
    pub html: String,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        }
    }

    fn endpoint(&self) -> String {
        let mut endpoint = format!("{}/content", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }
        endpoint
    }

    /// Fetch fully-rendered HTML content for a URL via the Browserless /content endpoint.
    /// Every call runs in a fresh browser context.
    pub async fn content(&self, request: &ContentRequest) -> Result<RenderedContent> {
        tracing::debug!(url = %request.url, "Browserless content request");

        let resp = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .timeout(request.budget().saturating_add(REQUEST_SLACK))
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let url = resp
            .headers()
            .get(RESPONSE_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(String::from)
            .unwrap_or_else(|| request.url.clone());

        Ok(RenderedContent {
            url,
            html: resp.text().await?,
        })
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_request_body() {
        let req = ContentRequest::new("https://example.com/a", Duration::from_secs(40));
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "url": "https://example.com/a",
                "gotoOptions": { "timeout": 40000, "waitUntil": "domcontentloaded" }
            })
        );
    }

    #[test]
    fn full_request_body() {
        let req = ContentRequest::new("https://example.com/a", Duration::from_secs(40))
            .wait_for_selector("ul#list > li", Duration::from_secs(8))
            .settle(Duration::from_millis(200))
            .user_agent("test-agent");
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(body["waitForSelector"]["selector"], "ul#list > li");
        assert_eq!(body["waitForSelector"]["timeout"], 8000);
        assert_eq!(body["waitForTimeout"], 200);
        assert_eq!(body["userAgent"], "test-agent");
        assert_eq!(req.budget(), Duration::from_millis(48_200));
    }

    #[test]
    fn budget_saturates_on_huge_timeouts() {
        let req = ContentRequest::new("https://example.com/a", Duration::MAX)
            .wait_for_selector("ul#list > li", Duration::from_millis(u64::MAX))
            .settle(Duration::from_secs(1));
        assert_eq!(req.budget(), Duration::from_millis(u64::MAX));
        assert!(req.budget().saturating_add(REQUEST_SLACK) > req.budget());
    }

    #[test]
    fn zero_settle_is_omitted() {
        let req = ContentRequest::new("https://example.com", Duration::from_secs(1))
            .settle(Duration::ZERO);
        let body = serde_json::to_value(&req).unwrap();
        assert!(body.get("waitForTimeout").is_none());
    }

    #[test]
    fn endpoint_carries_token() {
        let client = BrowserlessClient::new("http://localhost:3000/", Some("abc"));
        assert_eq!(client.endpoint(), "http://localhost:3000/content?token=abc");
        let client = BrowserlessClient::new("http://localhost:3000", None);
        assert_eq!(client.endpoint(), "http://localhost:3000/content");
    }

    #[test]
    fn request_timeout_status_counts_as_timeout() {
        let err = BrowserlessError::Api {
            status: 408,
            message: "Timed out".into(),
        };
        assert!(err.is_timeout());
        assert!(!BrowserlessError::Network("refused".into()).is_timeout());
    }
}
