//! Parallel execution of work items
//!
//! Each item runs fetch, parse, draw, rasterize and crop on its own task.
//! Everything except rasterization runs concurrently, bounded by
//! `Config::max_workers`; rasterization goes through the shared
//! [`RasterGate`]. Every item yields its own [`ItemReport`], so one failure
//! never hides or aborts another.

use crate::{
    crop_png, format_bytes, AssetFetcher, ChartDrawing, ChartError, Config, CropRect,
    ErrorSeverity, Metrics, ProgressTracker, RasterGate, Score, WorkItem,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Pipeline step an item was in when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Prepare,
    Fetch,
    Parse,
    Render,
    Rasterize,
    Crop,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Prepare => "prepare",
            Stage::Fetch => "fetch",
            Stage::Parse => "parse",
            Stage::Render => "render",
            Stage::Rasterize => "rasterize",
            Stage::Crop => "crop",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartOutput {
    pub score_path: PathBuf,
    pub chart_svg_path: PathBuf,
    pub chart_png_path: PathBuf,
    pub rect: CropRect,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    pub stage: Stage,
    pub error: ChartError,
}

impl std::fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} stage: {}", self.stage, self.error)
    }
}

#[derive(Debug, Clone)]
pub struct ItemReport {
    pub music_id: u32,
    pub difficulty: String,
    pub duration: Duration,
    pub outcome: Result<ChartOutput, ItemFailure>,
}

impl ItemReport {
    pub fn label(&self) -> String {
        format!("{:04}/{}", self.music_id, self.difficulty)
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub items: Vec<ItemReport>,
    /// Set when the run stopped early because nothing more could succeed
    pub fatal: Option<ChartError>,
}

impl RunReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|r| r.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&ItemReport, &ItemFailure)> {
        self.items
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|failure| (r, failure)))
    }

    pub fn is_success(&self) -> bool {
        self.fatal.is_none() && self.items.iter().all(ItemReport::is_success)
    }
}

pub struct ChartExecutor {
    config: Config,
    fetcher: Arc<dyn AssetFetcher>,
    gate: Arc<RasterGate>,
    metrics: Arc<Metrics>,
    is_shutting_down: Arc<AtomicBool>,
    fatal: Arc<OnceLock<ChartError>>,
}

impl ChartExecutor {
    pub fn new(
        config: Config,
        fetcher: Arc<dyn AssetFetcher>,
        gate: Arc<RasterGate>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            fetcher,
            gate,
            metrics,
            is_shutting_down: Arc::new(AtomicBool::new(false)),
            fatal: Arc::new(OnceLock::new()),
        }
    }

    pub fn gate(&self) -> &Arc<RasterGate> {
        &self.gate
    }

    /// Stop starting new items; items already running finish normally
    pub fn cancel(&self) {
        if !self.is_shutting_down.swap(true, Ordering::SeqCst) {
            warn!("Cancellation requested, no further items will be started");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.is_shutting_down.load(Ordering::SeqCst)
    }

    pub async fn run(&self, items: Vec<WorkItem>) -> RunReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let total = items.len();

        info!(
            "Rendering {} charts with {} workers",
            total, self.config.max_workers
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let progress = Arc::new(ProgressTracker::new(total));

        let (keys, tasks): (Vec<_>, Vec<_>) = items
            .into_iter()
            .map(|item| {
                let key = (item.music_id, item.difficulty.clone());
                let executor = self.clone();
                let semaphore = semaphore.clone();
                let progress = progress.clone();

                let task = tokio::spawn(async move {
                    let permit = semaphore.acquire_owned().await;
                    let report = match permit {
                        Ok(_permit) => executor.process_item(item).await,
                        Err(e) => ItemReport {
                            music_id: item.music_id,
                            difficulty: item.difficulty,
                            duration: Duration::ZERO,
                            outcome: Err(ItemFailure {
                                stage: Stage::Prepare,
                                error: e.into(),
                            }),
                        },
                    };

                    let info = progress.record_completion(report.is_success());
                    debug!(
                        "Progress {}/{} ({} failed, {:.2}/s)",
                        info.completed, info.total, info.errors, info.rate
                    );
                    report
                });
                (key, task)
            })
            .unzip();

        let items = join_all(tasks)
            .await
            .into_iter()
            .zip(keys)
            .map(|(joined, (music_id, difficulty))| {
                joined.unwrap_or_else(|e| {
                    error!("Worker for {:04}/{} panicked: {}", music_id, difficulty, e);
                    ItemReport {
                        music_id,
                        difficulty,
                        duration: Duration::ZERO,
                        outcome: Err(ItemFailure {
                            stage: Stage::Prepare,
                            error: e.into(),
                        }),
                    }
                })
            })
            .collect();

        RunReport {
            started_at,
            duration: start.elapsed(),
            items,
            fatal: self.fatal.get().cloned(),
        }
    }

    async fn process_item(&self, item: WorkItem) -> ItemReport {
        let start = Instant::now();

        let outcome = if self.is_cancelled() {
            Err(ItemFailure {
                stage: Stage::Prepare,
                error: ChartError::Cancelled,
            })
        } else {
            let span = info_span!("chart", music_id = item.music_id, difficulty = %item.difficulty);
            self.render_item(&item).instrument(span).await
        };

        let duration = start.elapsed();
        match &outcome {
            Ok(output) => {
                self.metrics.record_item(duration, true);
                info!(
                    "Chart {} saved to {} ({}x{})",
                    item.label(),
                    output.chart_png_path.display(),
                    output.width,
                    output.height
                );
            }
            Err(failure) if failure.error == ChartError::Cancelled => {
                debug!("Chart {} skipped: cancelled", item.label());
            }
            Err(failure) => {
                self.metrics.record_item(duration, false);
                self.metrics.record_failure(failure.stage, &failure.error);
                match failure.error.severity() {
                    ErrorSeverity::High | ErrorSeverity::Critical => {
                        error!("Chart {} failed at {}", item.label(), failure)
                    }
                    _ => warn!("Chart {} failed at {}", item.label(), failure),
                }
            }
        }

        ItemReport {
            music_id: item.music_id,
            difficulty: item.difficulty,
            duration,
            outcome,
        }
    }

    async fn render_item(&self, item: &WorkItem) -> Result<ChartOutput, ItemFailure> {
        let at = |stage: Stage| move |error: ChartError| ItemFailure { stage, error };

        info!("Processing music {} difficulty {}", item.music_id, item.difficulty);

        ensure_parent(&item.score_path).await.map_err(at(Stage::Prepare))?;
        ensure_parent(&item.chart_svg_path).await.map_err(at(Stage::Prepare))?;

        let raw = self
            .fetcher
            .fetch(&item.score_url)
            .await
            .map_err(at(Stage::Fetch))?;
        fs::write(&item.score_path, &raw)
            .await
            .map_err(|e| at(Stage::Fetch)(e.into()))?;
        debug!(
            "Score saved to {} ({})",
            item.score_path.display(),
            format_bytes(raw.len())
        );

        let mut score = Score::from_bytes(&raw).map_err(at(Stage::Parse))?;
        score.meta.title = Some(item.title.clone());
        score.meta.jacket = Some(item.jacket_url.clone());
        score
            .meta
            .difficulty
            .get_or_insert_with(|| item.difficulty.clone());

        let svg = ChartDrawing::new(&score).svg().map_err(at(Stage::Render))?;
        fs::write(&item.chart_svg_path, svg)
            .await
            .map_err(|e| at(Stage::Render)(e.into()))?;

        let capture = self
            .gate
            .capture(&item.chart_svg_path)
            .await
            .map_err(|e| {
                if e.is_fatal() {
                    self.mark_fatal(&e);
                }
                at(Stage::Rasterize)(e)
            })?;
        self.metrics.record_gate(capture.waited, capture.held);

        let rect = capture.rect;
        let png = capture.png;
        let dest = item.chart_png_path.clone();
        let (width, height) = tokio::task::spawn_blocking(move || crop_png(&png, rect, &dest))
            .await
            .map_err(|e| at(Stage::Crop)(e.into()))?
            .map_err(at(Stage::Crop))?;

        Ok(ChartOutput {
            score_path: item.score_path.clone(),
            chart_svg_path: item.chart_svg_path.clone(),
            chart_png_path: item.chart_png_path.clone(),
            rect,
            width,
            height,
        })
    }

    fn mark_fatal(&self, err: &ChartError) {
        if self.fatal.set(err.clone()).is_ok() {
            error!("Aborting run: {}", err);
        }
        self.is_shutting_down.store(true, Ordering::SeqCst);
    }
}

impl Clone for ChartExecutor {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            fetcher: self.fetcher.clone(),
            gate: self.gate.clone(),
            metrics: self.metrics.clone(),
            is_shutting_down: self.is_shutting_down.clone(),
            fatal: self.fatal.clone(),
        }
    }
}

async fn ensure_parent(path: &Path) -> Result<(), ChartError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}
