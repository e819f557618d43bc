//! Chromium driver backed by the DevTools protocol.

use std::{
    fs,
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use headless_chrome::{
    Browser, LaunchOptions, Tab, protocol::cdp::Page::CaptureScreenshotFormatOption,
};
use metrics::counter;
use tokio::task;
use tracing::info;

use crate::config::EngineSettings;

use super::{EngineError, EngineLauncher, RenderEngine};

/// Launches a headless Chromium with a fixed window size. The browser is
/// started without a sandbox so the driver also works inside containers.
#[derive(Debug, Default)]
pub struct ChromeLauncher;

#[async_trait]
impl EngineLauncher for ChromeLauncher {
    async fn launch(
        &self,
        settings: &EngineSettings,
    ) -> Result<Arc<dyn RenderEngine>, EngineError> {
        let binary_path = settings.binary_path.clone();
        let width = settings.viewport_width.get();
        let height = settings.viewport_height.get();

        let (browser, tab) =
            task::spawn_blocking(move || -> Result<(Browser, Arc<Tab>), EngineError> {
                let options = LaunchOptions::default_builder()
                    .path(binary_path)
                    .headless(true)
                    .sandbox(false)
                    .window_size(Some((width, height)))
                    .build()
                    .map_err(|err| EngineError::launch(err.to_string()))?;

                let browser =
                    Browser::new(options).map_err(|err| EngineError::launch(err.to_string()))?;
                let tab = browser
                    .new_tab()
                    .map_err(|err| EngineError::launch(err.to_string()))?;
                Ok((browser, tab))
            })
            .await
            .map_err(|err| EngineError::launch(format!("launch task failed: {err}")))??;

        counter!("scatto_engine_launch_total").increment(1);
        info!(
            target = "application::engine::chrome",
            width, height, "browser instance launched"
        );

        Ok(Arc::new(ChromeEngine {
            browser: Mutex::new(Some(browser)),
            tab,
        }))
    }
}

/// One live browser plus the single tab every capture runs in. The browser
/// handle moves into an `Option` so `quit` can hand the process exactly one
/// teardown while staying idempotent.
pub struct ChromeEngine {
    browser: Mutex<Option<Browser>>,
    tab: Arc<Tab>,
}

#[async_trait]
impl RenderEngine for ChromeEngine {
    async fn navigate(&self, url: &str) -> Result<(), EngineError> {
        let tab = Arc::clone(&self.tab);
        let url = url.to_string();
        task::spawn_blocking(move || {
            tab.navigate_to(&url)
                .map(|_| ())
                .map_err(|err| EngineError::navigation(err.to_string()))?;
            tab.wait_until_navigated()
                .map(|_| ())
                .map_err(|err| EngineError::navigation(err.to_string()))
        })
        .await
        .map_err(|err| EngineError::navigation(format!("navigation task failed: {err}")))?
    }

    async fn capture_screenshot(&self, destination: &Path) -> Result<(), EngineError> {
        let tab = Arc::clone(&self.tab);
        let destination = destination.to_path_buf();
        task::spawn_blocking(move || {
            let bytes = tab
                .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
                .map_err(|err| EngineError::capture(err.to_string()))?;
            fs::write(&destination, bytes)
                .map_err(|err| EngineError::capture(format!("failed to write image: {err}")))
        })
        .await
        .map_err(|err| EngineError::capture(format!("capture task failed: {err}")))?
    }

    async fn quit(&self) -> Result<(), EngineError> {
        let browser = {
            let mut guard = self
                .browser
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.take()
        };

        let Some(browser) = browser else {
            return Ok(());
        };

        // Dropping the handle terminates the child process and joins its
        // transport threads, which can block.
        task::spawn_blocking(move || drop(browser))
            .await
            .map_err(|err| EngineError::shutdown(format!("shutdown task failed: {err}")))?;

        info!(
            target = "application::engine::chrome",
            "browser instance closed"
        );
        Ok(())
    }
}
