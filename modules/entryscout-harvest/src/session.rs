// Browsing sessions.
//
// PageRenderer is the seam to whatever actually loads pages (Browserless in
// production, MockRenderer in tests). BrowserSession layers the navigation
// semantics the harvester relies on: a current page, bounded navigation,
// bounded selector waits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub type SessionId = Uuid;

/// A page the renderer has loaded.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// URL after redirects.
    pub url: String,
    pub html: String,
}

#[derive(Debug, Clone)]
pub struct SelectorWait {
    pub selector: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub session: SessionId,
    pub url: String,
    pub user_agent: String,
    pub navigation_timeout: Duration,
    pub settle: Duration,
    pub wait_for: Option<SelectorWait>,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render timed out: {0}")]
    Timeout(String),

    #[error("render failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<RenderedPage, RenderError>;

    /// Called once when a session starts. Each session must get its own
    /// cookie and storage scope.
    fn open_session(&self, _session: SessionId) {}

    /// Called exactly once when a session ends, on every exit path.
    fn close_session(&self, _session: SessionId) {}

    fn name(&self) -> &str;
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("navigation to {url} timed out after {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("selector {selector:?} did not appear within {timeout:?}")]
    SelectorTimeout { selector: String, timeout: Duration },

    #[error("navigation to {url} failed: {message}")]
    Render { url: String, message: String },

    #[error("no page loaded in session")]
    NoPage,

    #[error("invalid selector {0:?}")]
    InvalidSelector(String),
}

/// One isolated browsing context. Closes itself on drop.
pub struct BrowserSession {
    id: SessionId,
    renderer: Arc<dyn PageRenderer>,
    user_agent: String,
    settle: Duration,
    current: Option<RenderedPage>,
}

impl BrowserSession {
    pub fn open(renderer: Arc<dyn PageRenderer>, user_agent: &str, settle: Duration) -> Self {
        let id = Uuid::new_v4();
        renderer.open_session(id);
        debug!(session = %id, renderer = renderer.name(), "Browsing session opened");
        Self {
            id,
            renderer,
            user_agent: user_agent.to_string(),
            settle,
            current: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// URL of the page the session is positioned on, if the last navigation succeeded.
    pub fn current_url(&self) -> Option<&str> {
        self.current.as_ref().map(|p| p.url.as_str())
    }

    pub fn html(&self) -> Option<&str> {
        self.current.as_ref().map(|p| p.html.as_str())
    }

    fn request(&self, url: &str, navigation_timeout: Duration) -> RenderRequest {
        RenderRequest {
            session: self.id,
            url: url.to_string(),
            user_agent: self.user_agent.clone(),
            navigation_timeout,
            settle: self.settle,
            wait_for: None,
        }
    }

    /// Navigate to `url`; the settle delay runs on top of `timeout`. A failed
    /// navigation leaves the session without a current page.
    pub async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), SessionError> {
        self.current = None;
        let request = self.request(url, timeout);

        match tokio::time::timeout(timeout + self.settle, self.renderer.render(&request)).await {
            Ok(Ok(page)) => {
                debug!(session = %self.id, url, landed = page.url.as_str(), "Navigated");
                self.current = Some(page);
                Ok(())
            }
            Ok(Err(RenderError::Timeout(_))) | Err(_) => Err(SessionError::NavigationTimeout {
                url: url.to_string(),
                timeout,
            }),
            Ok(Err(RenderError::Failed(message))) => Err(SessionError::Render {
                url: url.to_string(),
                message,
            }),
        }
    }

    /// Wait until `selector` matches on the current page.
    ///
    /// The current document is checked first. If it does not match, the page is
    /// rendered again with a server-side wait for the selector, bounded by `timeout`.
    pub async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        let (url, present) = match &self.current {
            Some(page) => (page.url.clone(), has_match(&page.html, selector)?),
            None => return Err(SessionError::NoPage),
        };
        if present {
            return Ok(());
        }

        let timed_out = || SessionError::SelectorTimeout {
            selector: selector.to_string(),
            timeout,
        };
        if timeout.is_zero() {
            return Err(timed_out());
        }

        let mut request = self.request(&url, timeout);
        request.wait_for = Some(SelectorWait {
            selector: selector.to_string(),
            timeout,
        });

        match tokio::time::timeout(timeout, self.renderer.render(&request)).await {
            Ok(Ok(page)) => {
                if !has_match(&page.html, selector)? {
                    return Err(timed_out());
                }
                self.current = Some(page);
                Ok(())
            }
            Ok(Err(_)) | Err(_) => Err(timed_out()),
        }
    }

    /// Release the session now instead of at end of scope.
    pub fn close(self) {}
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.renderer.close_session(self.id);
        debug!(session = %self.id, "Browsing session closed");
    }
}

/// Parsed documents are not `Send`, so they never outlive this call.
fn has_match(html: &str, selector: &str) -> Result<bool, SessionError> {
    let parsed =
        Selector::parse(selector).map_err(|_| SessionError::InvalidSelector(selector.to_string()))?;
    let document = Html::parse_document(html);
    let found = document.select(&parsed).next().is_some();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRenderer;

    const LIST: &str = "ul#entry-item-list > li";

    fn session(renderer: &Arc<MockRenderer>) -> BrowserSession {
        BrowserSession::open(renderer.clone(), "test-agent", Duration::ZERO)
    }

    #[tokio::test]
    async fn goto_tracks_redirected_url() {
        let renderer = Arc::new(
            MockRenderer::new()
                .redirect("https://forum.test/abc", "https://forum.test/abc--1")
                .on_page("https://forum.test/abc--1", "<ul id='entry-item-list'><li>x</li></ul>"),
        );
        let mut s = session(&renderer);
        s.goto("https://forum.test/abc", Duration::from_secs(1)).await.unwrap();
        assert_eq!(s.current_url(), Some("https://forum.test/abc--1"));
        s.wait_for_selector(LIST, Duration::from_secs(1)).await.unwrap();
        // Present in the loaded document, so no second render.
        assert_eq!(renderer.requests().len(), 1);
    }

    #[tokio::test]
    async fn missing_selector_times_out_after_one_rerender() {
        let renderer = Arc::new(MockRenderer::new().on_page("https://forum.test/a", "<p>empty</p>"));
        let mut s = session(&renderer);
        s.goto("https://forum.test/a", Duration::from_secs(1)).await.unwrap();
        let err = s.wait_for_selector(LIST, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, SessionError::SelectorTimeout { .. }));
        assert_eq!(renderer.requests().len(), 2);
        // The page itself is still loaded.
        assert_eq!(s.current_url(), Some("https://forum.test/a"));
    }

    #[tokio::test]
    async fn zero_timeout_wait_does_not_rerender() {
        let renderer = Arc::new(MockRenderer::new().on_page("https://forum.test/a", "<p>empty</p>"));
        let mut s = session(&renderer);
        s.goto("https://forum.test/a", Duration::from_secs(1)).await.unwrap();
        assert!(s.wait_for_selector("div.pager", Duration::ZERO).await.is_err());
        assert_eq!(renderer.requests().len(), 1);
    }

    #[tokio::test]
    async fn hung_navigation_is_bounded() {
        let renderer = Arc::new(MockRenderer::new().hang("https://forum.test/slow"));
        let mut s = session(&renderer);
        let err = s
            .goto("https://forum.test/slow", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NavigationTimeout { .. }));
        assert_eq!(s.current_url(), None);
    }

    #[tokio::test]
    async fn failed_navigation_clears_current_page() {
        let renderer = Arc::new(
            MockRenderer::new()
                .on_page("https://forum.test/a", "<p>a</p>")
                .fail("https://forum.test/b"),
        );
        let mut s = session(&renderer);
        s.goto("https://forum.test/a", Duration::from_secs(1)).await.unwrap();
        let err = s.goto("https://forum.test/b", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, SessionError::Render { .. }));
        assert_eq!(s.current_url(), None);
        assert!(matches!(
            s.wait_for_selector(LIST, Duration::from_secs(1)).await,
            Err(SessionError::NoPage)
        ));
    }

    #[tokio::test]
    async fn invalid_selector_is_reported() {
        let renderer = Arc::new(MockRenderer::new().on_page("https://forum.test/a", "<p>a</p>"));
        let mut s = session(&renderer);
        s.goto("https://forum.test/a", Duration::from_secs(1)).await.unwrap();
        let err = s.wait_for_selector("ul[[", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidSelector(_)));
    }

    #[test]
    fn sessions_are_closed_on_drop() {
        let renderer = Arc::new(MockRenderer::new());
        {
            let _a = session(&renderer);
            let b = session(&renderer);
            assert_eq!(renderer.open_sessions(), 2);
            b.close();
            assert_eq!(renderer.open_sessions(), 1);
        }
        assert_eq!(renderer.open_sessions(), 0);
        assert_eq!(renderer.sessions_opened(), 2);
    }
}
