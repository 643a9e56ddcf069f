//! Exclusive access to the shared rendering engine
//!
//! The engine lives inside the gate and is only reachable through
//! [`RasterGate::capture`], which runs the whole navigate, wait, measure,
//! resize and screenshot sequence under one lock. The engine is launched
//! lazily by the first caller that takes the lock, so it is created at most
//! once; a failed launch is remembered and reported to every later caller.

use crate::{ChartError, Config, CropRect, EngineLauncher, RenderEngine};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info};
use url::Url;

enum EngineSlot {
    Idle,
    Ready(Box<dyn RenderEngine>),
    Failed(String),
    /// Shut down; never relaunched
    Closed,
}

/// Capture settings the gate applies inside the critical section
#[derive(Debug, Clone)]
pub struct GateSettings {
    pub marker_selector: String,
    pub marker_timeout: Duration,
    pub viewport_scale: f64,
}

impl From<&Config> for GateSettings {
    fn from(config: &Config) -> Self {
        Self {
            marker_selector: config.marker_selector.clone(),
            marker_timeout: config.marker_timeout,
            viewport_scale: config.viewport_scale,
        }
    }
}

/// Raw frame plus the region the chart occupies in it
#[derive(Debug, Clone)]
pub struct Capture {
    pub png: Vec<u8>,
    pub rect: CropRect,
    /// Time spent waiting for the lock
    pub waited: Duration,
    /// Time the lock was held
    pub held: Duration,
}

pub struct RasterGate {
    launcher: Box<dyn EngineLauncher>,
    slot: Mutex<EngineSlot>,
    settings: GateSettings,
}

impl RasterGate {
    pub fn new(launcher: Box<dyn EngineLauncher>, settings: GateSettings) -> Self {
        Self {
            launcher,
            slot: Mutex::new(EngineSlot::Idle),
            settings,
        }
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    /// Rasterize the document at `document` with exclusive use of the engine
    pub async fn capture(&self, document: &Path) -> Result<Capture, ChartError> {
        let url = document_url(document)?;

        let queued_at = Instant::now();
        let mut slot = self.slot.lock().await;
        let waited = queued_at.elapsed();
        let held_from = Instant::now();

        let engine = self.ensure_engine(&mut *slot).await?;
        let result = self.capture_locked(engine, &url).await;

        drop(slot);
        let held = held_from.elapsed();
        debug!(
            "Gate released for {} after {:?} (waited {:?})",
            document.display(),
            held,
            waited
        );

        result.map(|(png, rect)| Capture {
            png,
            rect,
            waited,
            held,
        })
    }

    async fn ensure_engine<'a>(
        &self,
        slot: &'a mut EngineSlot,
    ) -> Result<&'a mut Box<dyn RenderEngine>, ChartError> {
        if let EngineSlot::Idle = slot {
            info!("Launching rendering engine");
            *slot = match self.launcher.launch().await {
                Ok(engine) => EngineSlot::Ready(engine),
                Err(e) => {
                    error!("Rendering engine launch failed: {}", e);
                    EngineSlot::Failed(e.to_string())
                }
            };
        }

        match slot {
            EngineSlot::Ready(engine) => Ok(engine),
            EngineSlot::Failed(reason) => Err(ChartError::EngineInit(reason.clone())),
            EngineSlot::Closed => Err(ChartError::EngineInit(
                "rendering engine was shut down".to_string(),
            )),
            EngineSlot::Idle => unreachable!("engine slot is resolved above"),
        }
    }

    async fn capture_locked(
        &self,
        engine: &mut Box<dyn RenderEngine>,
        url: &Url,
    ) -> Result<(Vec<u8>, CropRect), ChartError> {
        engine.open(url).await?;

        let element = timeout(
            self.settings.marker_timeout,
            engine.wait_for_marker(&self.settings.marker_selector),
        )
        .await
        .map_err(|_| ChartError::RenderTimeout(self.settings.marker_timeout))??;

        let rect = CropRect::from_element_box(&element);
        let width = scaled_extent(element.right(), self.settings.viewport_scale);
        let height = scaled_extent(element.bottom(), self.settings.viewport_scale);
        engine.resize(width, height).await?;

        let png = engine.screenshot().await?;
        Ok((png, rect))
    }

    /// Close the engine if it was ever launched; later captures fail
    pub async fn shutdown(&self) {
        let mut slot = self.slot.lock().await;
        if let EngineSlot::Ready(engine) = &mut *slot {
            engine.close().await;
        }
        *slot = EngineSlot::Closed;
    }
}

fn scaled_extent(extent: f64, scale: f64) -> u32 {
    (extent.max(1.0) * scale).ceil() as u32
}

fn document_url(document: &Path) -> Result<Url, ChartError> {
    let absolute = if document.is_absolute() {
        document.to_path_buf()
    } else {
        std::env::current_dir()?.join(document)
    };

    Url::from_file_path(&absolute)
        .map_err(|_| ChartError::Io(format!("{} is not a valid file path", absolute.display())))
}
