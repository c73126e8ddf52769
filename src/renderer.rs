//! Page Renderer
//!
//! Loads a page in a headless Chrome instance and returns the rendered DOM.
//! - One browser per call, closed on every exit path
//! - Media, event-source and websocket requests are aborted
//! - Navigation is retried once with a longer, stricter wait
//! - Lazy-loaded `<img>` sources are promoted into `src` before capture

use crate::config::RenderConfig;
use crate::error::RenderError;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Attributes lazy-loading libraries keep the real image URL in, by priority
pub const LAZY_SRC_ATTRIBUTES: [&str; 4] = ["data-src", "data-lazy", "data-original", "data-url"];

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const QUIET_POLLS: u32 = 2;

/// Capability to turn a URL into fully rendered HTML.
pub trait Render: Send + Sync {
    fn render(&self, url: &str) -> impl Future<Output = Result<String, RenderError>> + Send;
}

/// Requests a static snapshot never needs, and which may stream forever.
pub fn is_blocked_resource(resource_type: &ResourceType) -> bool {
    matches!(
        resource_type,
        ResourceType::Media | ResourceType::EventSource | ResourceType::WebSocket
    )
}

/// In-page script: fill empty or `data:` placeholder `src` attributes from
/// the first populated lazy-loading attribute. Returns how many images
/// were changed.
pub fn lazy_image_script() -> String {
    let attributes = LAZY_SRC_ATTRIBUTES
        .iter()
        .map(|a| format!("'{}'", a))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"(() => {{
  const attrs = [{attributes}];
  let promoted = 0;
  for (const img of Array.from(document.images)) {{
    const src = img.getAttribute('src');
    if (src && !src.startsWith('data:')) continue;
    for (const name of attrs) {{
      const real = img.getAttribute(name);
      if (real) {{
        img.setAttribute('src', real);
        promoted += 1;
        break;
      }}
    }}
  }}
  return promoted;
}})()"#
    )
}

/// Headless Chrome over the DevTools protocol
#[derive(Debug, Clone)]
pub struct ChromeRenderer {
    config: RenderConfig,
}

impl ChromeRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    async fn launch(&self) -> Result<(Browser, JoinHandle<()>), RenderError> {
        let mut builder = BrowserConfig::builder()
            .window_size(self.config.window_width, self.config.window_height)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--mute-audio")
            .arg("--hide-scrollbars");

        if self.config.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref chrome_path) = self.config.chrome_executable {
            builder = builder.chrome_executable(chrome_path);
        }

        let browser_config = builder.build().map_err(RenderError::Launch)?;
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler error: {e}");
                }
            }
        });

        Ok((browser, handler_task))
    }

    async fn render_with(&self, browser: &Browser, url: &str) -> Result<String, RenderError> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        let interceptor = match install_interception(&page).await {
            Ok(task) => task,
            Err(e) => {
                close_page(page).await;
                return Err(e);
            }
        };

        let result = self.capture(&page, url).await;

        interceptor.abort();
        close_page(page).await;
        result
    }

    async fn capture(&self, page: &Page, url: &str) -> Result<String, RenderError> {
        self.navigate(page, url).await?;
        tokio::time::sleep(self.config.settle_delay()).await;

        let promoted: u64 = page
            .evaluate(lazy_image_script())
            .await
            .map_err(|e| RenderError::Script(e.to_string()))?
            .into_value()
            .unwrap_or(0);
        debug!(url = %url, promoted, "lazy images normalized");

        page.content().await.map_err(|e| RenderError::Script(e.to_string()))
    }

    async fn navigate(&self, page: &Page, url: &str) -> Result<(), RenderError> {
        let first = within(self.config.first_attempt_timeout(), url, async {
            navigate_to(page, url).await?;
            wait_for_dom_content(page).await
        });
        let retry = || {
            within(self.config.retry_timeout(), url, async move {
                navigate_to(page, url).await?;
                wait_for_network_idle(page).await
            })
        };
        navigate_with_retry(url, first, retry, self.config.retry_delay()).await
    }
}

/// Bound one navigation attempt; running out of time is a `Timeout`.
async fn within<F>(limit: Duration, url: &str, attempt: F) -> Result<(), RenderError>
where
    F: Future<Output = Result<(), RenderError>>,
{
    tokio::time::timeout(limit, attempt)
        .await
        .unwrap_or_else(|_| Err(RenderError::Timeout(url.to_string())))
}

/// Run `first`; if it fails, wait `delay` and run `retry` exactly once.
/// The retry's error is what the caller sees.
async fn navigate_with_retry<First, Retry, RetryFut>(
    url: &str,
    first: First,
    retry: Retry,
    delay: Duration,
) -> Result<(), RenderError>
where
    First: Future<Output = Result<(), RenderError>>,
    Retry: FnOnce() -> RetryFut,
    RetryFut: Future<Output = Result<(), RenderError>>,
{
    let Err(first_error) = first.await else {
        return Ok(());
    };
    warn!(url = %url, error = %first_error, "navigation failed, retrying");
    tokio::time::sleep(delay).await;
    retry().await
}

impl Render for ChromeRenderer {
    async fn render(&self, url: &str) -> Result<String, RenderError> {
        info!(url = %url, "rendering page");
        let (mut browser, handler_task) = self.launch().await?;

        let result = self.render_with(&browser, url).await;

        // Teardown failures are logged, never returned.
        if let Err(e) = browser.close().await {
            debug!("browser close failed: {e}");
            if let Some(Err(e)) = browser.kill().await {
                debug!("browser kill failed: {e}");
            }
        }
        if let Err(e) = browser.wait().await {
            debug!("browser wait failed: {e}");
        }
        handler_task.abort();

        if let Ok(ref html) = result {
            info!(url = %url, size = html.len(), "page rendered");
        }
        result
    }
}

async fn install_interception(page: &Page) -> Result<JoinHandle<()>, RenderError> {
    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(|e| RenderError::Launch(e.to_string()))?;

    let intercept_page = page.clone();
    let task = tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let outcome = if is_blocked_resource(&event.resource_type) {
                intercept_page
                    .execute(FailRequestParams::new(event.request_id.clone(), ErrorReason::BlockedByClient))
                    .await
                    .map(|_| ())
            } else {
                intercept_page
                    .execute(ContinueRequestParams::new(event.request_id.clone()))
                    .await
                    .map(|_| ())
            };
            if let Err(e) = outcome {
                debug!("request interception failed: {e}");
            }
        }
    });

    if let Err(e) = page.execute(EnableParams::default()).await {
        task.abort();
        return Err(RenderError::Launch(e.to_string()));
    }
    Ok(task)
}

async fn navigate_to(page: &Page, url: &str) -> Result<(), RenderError> {
    let response = page
        .execute(NavigateParams::new(url))
        .await
        .map_err(|e| RenderError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    match response.result.error_text.clone() {
        Some(reason) => Err(RenderError::Navigation {
            url: url.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

async fn poll_true(page: &Page, expression: &str) -> Result<bool, RenderError> {
    let value = page
        .evaluate(expression)
        .await
        .map_err(|e| RenderError::Script(e.to_string()))?;
    Ok(value.into_value::<bool>().unwrap_or(false))
}

/// DOM parsed: the new document exists and is past the `loading` state.
async fn wait_for_dom_content(page: &Page) -> Result<(), RenderError> {
    loop {
        if poll_true(page, "location.href !== 'about:blank' && document.readyState !== 'loading'").await? {
            return Ok(());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Fully loaded, then no new resource entries for a few polls in a row.
async fn wait_for_network_idle(page: &Page) -> Result<(), RenderError> {
    while !poll_true(page, "location.href !== 'about:blank' && document.readyState === 'complete'").await? {
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    let mut last_count: u64 = u64::MAX;
    let mut quiet = 0;
    while quiet < QUIET_POLLS {
        let count: u64 = page
            .evaluate("performance.getEntriesByType('resource').length")
            .await
            .map_err(|e| RenderError::Script(e.to_string()))?
            .into_value()
            .unwrap_or(0);
        if count == last_count {
            quiet += 1;
        } else {
            quiet = 0;
            last_count = count;
        }
        tokio::time::sleep(POLL_INTERVAL * 2).await;
    }
    Ok(())
}

async fn close_page(page: Page) {
    if let Err(e) = page.close().await {
        debug!("page close failed: {e}");
    }
}
