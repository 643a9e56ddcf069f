//! Headless browser used to turn chart documents into bitmaps
//!
//! Engines are only ever driven through [`crate::RasterGate`], which owns
//! the single instance and serializes access to it.

use crate::{create_browser_config, ChartError, Config, ElementBox};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};
use url::Url;

/// A stateful document renderer that handles one document at a time
#[async_trait]
pub trait RenderEngine: Send {
    /// Load `url`, replacing whatever document was shown before
    async fn open(&mut self, url: &Url) -> Result<(), ChartError>;

    /// Resolve once an element matching `selector` exists and report its box
    ///
    /// May wait indefinitely; callers bound it with their own timeout.
    async fn wait_for_marker(&mut self, selector: &str) -> Result<ElementBox, ChartError>;

    async fn resize(&mut self, width: u32, height: u32) -> Result<(), ChartError>;

    /// PNG of the whole current frame
    async fn screenshot(&mut self) -> Result<Vec<u8>, ChartError>;

    async fn close(&mut self) {}
}

/// Creates the engine the first time it is needed
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn RenderEngine>, ChartError>;
}

pub struct ChromeLauncher {
    config: Config,
}

impl ChromeLauncher {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EngineLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn RenderEngine>, ChartError> {
        Ok(Box::new(ChromeEngine::launch(&self.config).await?))
    }
}

pub struct ChromeEngine {
    browser: Browser,
    handler: JoinHandle<Result<(), chromiumoxide::error::CdpError>>,
    page: Page,
    poll_interval: Duration,
    device_scale_factor: f64,
}

impl ChromeEngine {
    pub async fn launch(config: &Config) -> Result<Self, ChartError> {
        let browser_config = create_browser_config(config)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ChartError::EngineInit(e.to_string()))?;

        // The handler implements Stream and must be polled for the browser to make progress
        let handler = tokio::spawn(async move {
            loop {
                match handler.next().await {
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        error!("Browser handler error: {}", e);
                        return Err(e);
                    }
                    None => {
                        debug!("Browser handler stream ended");
                        break;
                    }
                }
            }
            Ok(())
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(ChartError::EngineInit(format!("failed to open page: {e}")));
            }
        };

        info!(
            "Headless browser launched ({}x{})",
            config.viewport.width, config.viewport.height
        );

        Ok(Self {
            browser,
            handler,
            page,
            poll_interval: config.marker_poll_interval,
            device_scale_factor: config.viewport.device_scale_factor,
        })
    }
}

#[async_trait]
impl RenderEngine for ChromeEngine {
    async fn open(&mut self, url: &Url) -> Result<(), ChartError> {
        if self.handler.is_finished() {
            return Err(ChartError::Render("browser connection is gone".to_string()));
        }

        self.page
            .goto(url.as_str())
            .await
            .map_err(|e| ChartError::Render(format!("navigation to {url} failed: {e}")))?;
        Ok(())
    }

    async fn wait_for_marker(&mut self, selector: &str) -> Result<ElementBox, ChartError> {
        loop {
            if let Ok(element) = self.page.find_element(selector).await {
                let bounds = element
                    .bounding_box()
                    .await
                    .map_err(|e| ChartError::Render(format!("cannot measure {selector}: {e}")))?;

                return Ok(ElementBox {
                    x: bounds.x,
                    y: bounds.y,
                    width: bounds.width,
                    height: bounds.height,
                });
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn resize(&mut self, width: u32, height: u32) -> Result<(), ChartError> {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(width)
            .height(height)
            .device_scale_factor(self.device_scale_factor)
            .mobile(false)
            .build()
            .map_err(ChartError::Render)?;

        self.page
            .execute(params)
            .await
            .map_err(|e| ChartError::Render(format!("resize to {width}x{height} failed: {e}")))?;
        Ok(())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, ChartError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();

        self.page
            .screenshot(params)
            .await
            .map_err(|e| ChartError::Render(format!("screenshot failed: {e}")))
    }

    async fn close(&mut self) {
        if let Err(e) = self.browser.close().await {
            debug!("Browser close reported: {}", e);
        }
        self.handler.abort();
        info!("Headless browser closed");
    }
}
