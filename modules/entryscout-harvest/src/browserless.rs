use async_trait::async_trait;
use browserless_client::{BrowserlessClient, ContentRequest};

use crate::session::{PageRenderer, RenderError, RenderRequest, RenderedPage};

/// Renders pages through a Browserless `/content` endpoint. Every request gets
/// a fresh browser context, so sessions never share cookies or storage.
pub struct BrowserlessRenderer {
    client: BrowserlessClient,
}

impl BrowserlessRenderer {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        Self {
            client: BrowserlessClient::new(base_url, token),
        }
    }
}

pub(crate) fn content_request(request: &RenderRequest) -> ContentRequest {
    let mut content = ContentRequest::new(&request.url, request.navigation_timeout)
        .settle(request.settle)
        .user_agent(&request.user_agent);
    if let Some(wait) = &request.wait_for {
        content = content.wait_for_selector(&wait.selector, wait.timeout);
    }
    content
}

#[async_trait]
impl PageRenderer for BrowserlessRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedPage, RenderError> {
        match self.client.content(&content_request(request)).await {
            Ok(content) => Ok(RenderedPage {
                url: content.url,
                html: content.html,
            }),
            Err(e) if e.is_timeout() => Err(RenderError::Timeout(e.to_string())),
            Err(e) => Err(RenderError::Failed(e.to_string())),
        }
    }

    fn name(&self) -> &str {
        "browserless"
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::session::SelectorWait;

    #[test]
    fn render_request_maps_to_content_body() {
        let request = RenderRequest {
            session: uuid::Uuid::new_v4(),
            url: "https://forum.test/akbank".into(),
            user_agent: "agent/1.0".into(),
            navigation_timeout: Duration::from_secs(40),
            settle: Duration::from_millis(200),
            wait_for: Some(SelectorWait {
                selector: "ul#entry-item-list > li".into(),
                timeout: Duration::from_secs(8),
            }),
        };
        let body = serde_json::to_value(content_request(&request)).unwrap();
        assert_eq!(body["url"], "https://forum.test/akbank");
        assert_eq!(body["gotoOptions"]["timeout"], 40_000);
        assert_eq!(body["waitForTimeout"], 200);
        assert_eq!(body["userAgent"], "agent/1.0");
        assert_eq!(body["waitForSelector"]["selector"], "ul#entry-item-list > li");
    }
}
