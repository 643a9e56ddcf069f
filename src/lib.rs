//! # Sekai Chart Render
//!
//! Downloads the song catalogs of a rhythm game region, fetches each selected
//! chart's score file, draws it as an SVG chart and rasterizes that SVG into a
//! tightly cropped PNG with a headless Chrome instance.
//!
//! ## Pipeline
//!
//! | Step | Runs | Module |
//! |------|------|--------|
//! | Catalog download and filtering | once per run | `catalog` |
//! | Work item planning | once per run | `work_item` |
//! | Score fetch | parallel | `fetch` |
//! | Score parsing | parallel | `score` |
//! | SVG drawing | parallel | `chart` |
//! | Rasterization | one at a time | `gate`, `engine` |
//! | Cropping | parallel, blocking pool | `crop` |
//!
//! The browser is launched lazily on the first rasterization and is only
//! reachable through [`RasterGate::capture`], which holds an exclusive lock
//! for the whole navigate, wait, resize and screenshot sequence.
//!
//! ## Output layout
//!
//! ```text
//! <output_root>/scores/<region>/<music_id:04>/<difficulty>.txt
//! <output_root>/charts/<region>/<music_id:04>/<difficulty>.svg
//! <output_root>/charts/<region>/<music_id:04>/<difficulty>.png
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sekai_chart_render::{CliRunner, Config, Selection};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = CliRunner::new(Config::default())?;
//!     let selection = Selection {
//!         music_ids: Some([1].into_iter().collect()),
//!         ..Selection::all()
//!     };
//!
//!     let report = runner.run(&selection).await?;
//!     println!("{} charts rendered", report.succeeded().count());
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! sekai-chart-render 1 42 -D expert -D master -O out/
//! sekai-chart-render --all -R en -j 8
//! ```

/// Configuration and settings for a rendering run
pub mod config;

/// Error types and error handling utilities
pub mod error;

/// Song and difficulty catalogs
pub mod catalog;

/// Catalog join into per-chart work items
pub mod work_item;

/// HTTP download of catalogs and scores
pub mod fetch;

/// SUS score parsing
pub mod score;

/// SVG chart drawing
pub mod chart;

/// Headless browser rendering engine
pub mod engine;

/// Exclusive access to the rendering engine
pub mod gate;

/// Crop rectangles and PNG cropping
pub mod crop;

/// Parallel execution of work items
pub mod executor;

/// Command-line interface implementation
pub mod cli;

/// Performance metrics collection and progress tracking
pub mod metrics;

/// Utility functions and helpers
pub mod utils;


pub use self::metrics::*;
pub use catalog::*;
pub use chart::*;
pub use cli::*;
pub use config::*;
pub use crop::*;
pub use engine::*;
pub use error::*;
pub use executor::*;
pub use fetch::*;
pub use gate::*;
pub use score::*;
pub use utils::*;
pub use work_item::*;
