//! Configuration management with serde serialization/deserialization
//!
//! This module provides the run configuration for chart rendering, including
//! the catalog region, worker count, content-marker wait settings and the
//! headless browser launch parameters.

use crate::{ChartError, Region};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for a rendering run
///
/// Every field has a default, so a JSON config file only needs to name the
/// values it changes.
///
/// # Examples
///
/// ```rust
/// use sekai_chart_render::{Config, Region};
///
/// let config = Config {
///     region: Region::En,
///     max_workers: 4,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Catalog and asset region (default: jp)
    pub region: Region,

    /// Root directory for `scores/` and `charts/` (default: working directory)
    pub output_root: PathBuf,

    /// Number of items processed in parallel (default: one per CPU)
    ///
    /// Fetching and SVG drawing run fully in parallel; rasterization is
    /// serialized regardless of this value.
    pub max_workers: usize,

    /// CSS selector whose presence marks a loaded chart document (default: `svg`)
    pub marker_selector: String,

    /// How long the engine may take to show the marker (default: 10 seconds)
    pub marker_timeout: Duration,

    /// Delay between marker lookups (default: 100ms)
    pub marker_poll_interval: Duration,

    /// Factor applied to the measured chart extent before resizing the
    /// viewport, so the capture is never clipped (default: 1.5)
    pub viewport_scale: f64,

    /// Initial browser viewport
    pub viewport: Viewport,

    /// Per-request timeout for catalog and score downloads (default: 30 seconds)
    pub http_timeout: Duration,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Custom User-Agent string for the browser
    pub user_agent: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: Region::default(),
            output_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            max_workers: num_cpus::get(),
            marker_selector: "svg".to_string(),
            marker_timeout: Duration::from_secs(10),
            marker_poll_interval: Duration::from_millis(100),
            viewport_scale: 1.5,
            viewport: Viewport::default(),
            http_timeout: Duration::from_secs(30),
            chrome_path: None,
            user_agent: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ChartError> {
        if self.max_workers == 0 {
            return Err(ChartError::Configuration(
                "max_workers must be greater than 0".to_string(),
            ));
        }

        if self.marker_timeout.is_zero() {
            return Err(ChartError::Configuration(
                "marker_timeout must be greater than 0".to_string(),
            ));
        }

        if self.marker_poll_interval.is_zero() {
            return Err(ChartError::Configuration(
                "marker_poll_interval must be greater than 0".to_string(),
            ));
        }

        if self.http_timeout.is_zero() {
            return Err(ChartError::Configuration(
                "http_timeout must be greater than 0".to_string(),
            ));
        }

        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(ChartError::Configuration(
                "viewport dimensions must be greater than 0".to_string(),
            ));
        }

        if !(self.viewport_scale >= 1.0) {
            return Err(ChartError::Configuration(format!(
                "viewport_scale must be at least 1.0, got {}",
                self.viewport_scale
            )));
        }

        if self.viewport.device_scale_factor != 1.0 {
            return Err(ChartError::Configuration(format!(
                "viewport.device_scale_factor must be 1.0, got {}",
                self.viewport.device_scale_factor
            )));
        }

        if self.marker_selector.trim().is_empty() {
            return Err(ChartError::Configuration(
                "marker_selector must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Browser viewport used when the engine is launched
///
/// The gate resizes the viewport for every capture; this is only the size
/// the browser starts with.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Viewport {
    /// Viewport width in pixels (default: 1920)
    pub width: u32,

    /// Viewport height in pixels (default: 1080)
    pub height: u32,

    /// Device pixel ratio (default: 1.0)
    ///
    /// Crop coordinates are measured in CSS pixels, so `validate` rejects
    /// anything other than 1.0.
    pub device_scale_factor: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            device_scale_factor: 1.0,
        }
    }
}

/// Generate Chrome command-line arguments based on configuration
///
/// # Examples
///
/// ```rust
/// use sekai_chart_render::{Config, get_chrome_args};
///
/// let args = get_chrome_args(&Config::default());
/// assert!(args.contains(&"--headless".to_string()));
/// ```
pub fn get_chrome_args(config: &Config) -> Vec<String> {
    let unique_id = format!("{}-{}", std::process::id(), uuid::Uuid::new_v4());

    let mut args = vec![
        "--headless".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--hide-scrollbars".to_string(),
        // Chart documents are local files that reference remote jackets
        "--allow-file-access-from-files".to_string(),
        format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        ),
        format!("--user-data-dir=/tmp/sekai-chart-render-{}", unique_id),
    ];

    if let Some(user_agent) = &config.user_agent {
        args.push(format!("--user-agent={user_agent}"));
    }

    args
}

pub fn create_browser_config(
    config: &Config,
) -> Result<chromiumoxide::browser::BrowserConfig, ChartError> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .window_size(config.viewport.width, config.viewport.height)
        .args(get_chrome_args(config));

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(ChartError::EngineInit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.region, Region::Jp);
        assert_eq!(config.marker_selector, "svg");
        assert_eq!(config.marker_timeout, Duration::from_secs(10));
        assert_eq!(config.viewport_scale, 1.5);
        assert!(config.max_workers >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let zero_workers = Config {
            max_workers: 0,
            ..Default::default()
        };
        assert!(matches!(
            zero_workers.validate(),
            Err(ChartError::Configuration(_))
        ));

        let shrinking = Config {
            viewport_scale: 0.5,
            ..Default::default()
        };
        assert!(shrinking.validate().is_err());

        let no_timeout = Config {
            marker_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(no_timeout.validate().is_err());
    }

    #[test]
    fn test_device_scale_factor_must_be_one() {
        let hidpi = Config {
            viewport: Viewport {
                device_scale_factor: 2.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            hidpi.validate(),
            Err(ChartError::Configuration(msg)) if msg.contains("device_scale_factor")
        ));

        let from_file: Config = serde_json::from_str(
            r#"{ "viewport": { "width": 1280, "height": 720, "device_scale_factor": 1.5 } }"#,
        )
        .unwrap();
        assert!(from_file.validate().is_err());
    }

    #[test]
    fn test_partial_json_config() {
        let config: Config =
            serde_json::from_str(r#"{ "region": "kr", "max_workers": 3 }"#).unwrap();
        assert_eq!(config.region, Region::Kr);
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.marker_selector, "svg");
    }

    #[test]
    fn test_chrome_args_generation() {
        let config = Config::default();
        let args = get_chrome_args(&config);

        assert!(args.contains(&"--headless".to_string()));
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert!(args.contains(&format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        )));
        assert!(!args.iter().any(|a| a.starts_with("--user-agent=")));
    }
}
