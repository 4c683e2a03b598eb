//! Page-control surface consumed by automation steps.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use frame_tap::FrameHandler;
use serde_json::Value;

use crate::adapter::{js_literal, CdpAdapter};
use crate::error::AdapterError;
use crate::ids::PageId;

/// Something to wait for on a page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitCondition {
    /// A CSS selector matches at least one element
    Selector(String),
    /// The page URL contains the fragment
    UrlContains(String),
    /// A JavaScript expression evaluates truthy
    Predicate(String),
}

impl WaitCondition {
    pub fn selector(css: impl Into<String>) -> Self {
        Self::Selector(css.into())
    }

    pub fn url_contains(fragment: impl Into<String>) -> Self {
        Self::UrlContains(fragment.into())
    }

    pub fn predicate(js: impl Into<String>) -> Self {
        Self::Predicate(js.into())
    }

    /// Expression that evaluates to `true` once the condition holds.
    pub fn probe_expression(&self) -> Result<String, AdapterError> {
        Ok(match self {
            Self::Selector(css) => {
                format!("document.querySelector({}) !== null", js_literal(css)?)
            }
            Self::UrlContains(fragment) => {
                format!("window.location.href.includes({})", js_literal(fragment)?)
            }
            Self::Predicate(js) => format!("Boolean({js})"),
        })
    }
}

impl fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Selector(css) => write!(f, "selector '{css}'"),
            Self::UrlContains(fragment) => write!(f, "url containing '{fragment}'"),
            Self::Predicate(_) => write!(f, "page predicate"),
        }
    }
}

/// Capabilities a step may use against the active page.
///
/// Every wait is bounded; an expired bound is reported with
/// [`crate::AdapterErrorKind::Timeout`].
#[async_trait]
pub trait PageControl: Send + Sync {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), AdapterError>;
    async fn wait_for(&self, condition: &WaitCondition, timeout: Duration)
        -> Result<(), AdapterError>;
    async fn fill(&self, selector: &str, value: &str) -> Result<(), AdapterError>;
    async fn click(&self, selector: &str) -> Result<(), AdapterError>;
    async fn evaluate(&self, script: &str) -> Result<Value, AdapterError>;
    /// Deliver every streaming frame the page receives to `handler`.
    async fn subscribe_stream(&self, handler: Arc<dyn FrameHandler>) -> Result<(), AdapterError>;
    async fn screenshot(&self, path: &Path) -> Result<(), AdapterError>;
    async fn reload(&self, timeout: Duration) -> Result<(), AdapterError>;
    async fn current_url(&self) -> Result<String, AdapterError>;
}

/// One browser tab driven through [`CdpAdapter`].
#[derive(Clone)]
pub struct PageSession {
    adapter: Arc<CdpAdapter>,
    page: PageId,
}

impl PageSession {
    pub fn new(adapter: Arc<CdpAdapter>, page: PageId) -> Self {
        Self { adapter, page }
    }

    pub fn page(&self) -> PageId {
        self.page
    }

    pub fn adapter(&self) -> &Arc<CdpAdapter> {
        &self.adapter
    }
}

#[async_trait]
impl PageControl for PageSession {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), AdapterError> {
        self.adapter.navigate(self.page, url, timeout).await
    }

    async fn wait_for(
        &self,
        condition: &WaitCondition,
        timeout: Duration,
    ) -> Result<(), AdapterError> {
        self.adapter.wait_for(self.page, condition, timeout).await
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), AdapterError> {
        self.adapter.fill(self.page, selector, value).await
    }

    async fn click(&self, selector: &str) -> Result<(), AdapterError> {
        self.adapter.click(self.page, selector).await
    }

    async fn evaluate(&self, script: &str) -> Result<Value, AdapterError> {
        self.adapter.evaluate(self.page, script).await
    }

    async fn subscribe_stream(&self, handler: Arc<dyn FrameHandler>) -> Result<(), AdapterError> {
        self.adapter.subscribe_frames(self.page, handler).await
    }

    async fn screenshot(&self, path: &Path) -> Result<(), AdapterError> {
        self.adapter.screenshot(self.page, path).await
    }

    async fn reload(&self, timeout: Duration) -> Result<(), AdapterError> {
        self.adapter.reload(self.page, timeout).await
    }

    async fn current_url(&self) -> Result<String, AdapterError> {
        self.adapter.current_url(self.page).await
    }
}
