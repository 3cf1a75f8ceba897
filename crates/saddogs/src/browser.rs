//! Headless Chromium rendering for pages that build their content in JavaScript.
//!
//! Synchronization is timing based: fixed waits around a single scroll. On a
//! slow connection the waits can end before the gallery finishes loading, which
//! shows up as an undercount rather than an error.

use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;

use crate::scraper::FetchError;

const SCROLL_TO_BOTTOM: &str = "window.scrollBy(0, document.body.scrollHeight)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub request_timeout: Duration,
    pub settle: Duration,
    pub after_scroll: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            settle: Duration::from_secs(5),
            after_scroll: Duration::from_secs(3),
        }
    }
}

fn browser_error(e: impl std::fmt::Display) -> FetchError {
    FetchError::BrowserError(e.to_string())
}

/// Loads `url` in a fresh headless browser, scrolls once and returns the rendered DOM.
pub async fn render_page(url: &str, options: &RenderOptions) -> Result<String, FetchError> {
    let config = BrowserConfig::builder()
        .no_sandbox()
        .arg("--disable-setuid-sandbox")
        .request_timeout(options.request_timeout)
        .build()
        .map_err(browser_error)?;

    let (mut browser, mut handler) = Browser::launch(config)
        .await
        .inspect_err(|e| log::error!("Failed to launch browser: {e:?}"))
        .map_err(browser_error)?;

    let handle = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if event.is_err() {
                break;
            }
        }
    });

    let rendered = render_with(&browser, url, options).await;

    if let Err(e) = browser.close().await {
        log::warn!("Failed to close browser: {e}");
    }
    if let Err(e) = handle.await {
        log::warn!("Browser handler task failed: {e}");
    }

    rendered
}

async fn render_with(
    browser: &Browser,
    url: &str,
    options: &RenderOptions,
) -> Result<String, FetchError> {
    log::info!("Rendering {}", url);
    let page = browser.new_page(url).await.map_err(browser_error)?;
    page.wait_for_navigation().await.map_err(browser_error)?;

    tokio::time::sleep(options.settle).await;
    page.evaluate(SCROLL_TO_BOTTOM)
        .await
        .map_err(browser_error)?;
    tokio::time::sleep(options.after_scroll).await;

    let html = page.content().await.map_err(browser_error)?;
    if let Err(e) = page.close().await {
        log::warn!("Failed to close page {}: {}", url, e);
    }

    log::debug!("Rendered {} ({} bytes)", url, html.len());
    Ok(html)
}
