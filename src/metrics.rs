use crate::{ChartError, Stage};
use metrics::{Counter, Histogram};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

pub struct Metrics {
    pub charts_rendered: Counter,
    pub charts_failed: Counter,
    pub item_duration: Histogram,
    pub gate_wait: Histogram,
    pub gate_hold: Histogram,
    pub fetch_errors: Counter,
    pub parse_errors: Counter,
    pub render_errors: Counter,
    pub timeout_errors: Counter,
    pub crop_errors: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            charts_rendered: Counter::noop(),
            charts_failed: Counter::noop(),
            item_duration: Histogram::noop(),
            gate_wait: Histogram::noop(),
            gate_hold: Histogram::noop(),
            fetch_errors: Counter::noop(),
            parse_errors: Counter::noop(),
            render_errors: Counter::noop(),
            timeout_errors: Counter::noop(),
            crop_errors: Counter::noop(),
        }
    }

    pub fn record_item(&self, duration: Duration, success: bool) {
        if success {
            self.charts_rendered.increment(1);
        } else {
            self.charts_failed.increment(1);
        }

        self.item_duration.record(duration.as_secs_f64());
    }

    pub fn record_gate(&self, waited: Duration, held: Duration) {
        self.gate_wait.record(waited.as_secs_f64());
        self.gate_hold.record(held.as_secs_f64());
    }

    pub fn record_failure(&self, stage: Stage, error: &ChartError) {
        if let ChartError::RenderTimeout(_) = error {
            self.timeout_errors.increment(1);
            return;
        }

        match stage {
            Stage::Fetch => self.fetch_errors.increment(1),
            Stage::Parse => self.parse_errors.increment(1),
            Stage::Render | Stage::Rasterize => self.render_errors.increment(1),
            Stage::Crop => self.crop_errors.increment(1),
            Stage::Prepare => {}
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ProgressTracker {
    total: usize,
    completed: AtomicUsize,
    errors: AtomicUsize,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_completion(&self, success: bool) -> ProgressInfo {
        self.completed.fetch_add(1, Ordering::Release);
        if !success {
            self.errors.fetch_add(1, Ordering::Release);
        }
        self.get_progress()
    }

    pub fn get_progress(&self) -> ProgressInfo {
        // Errors are bumped after completions, so read them first
        let errors = self.errors.load(Ordering::Acquire);
        let completed = self.completed.load(Ordering::Acquire);
        let elapsed = self.start_time.elapsed();
        let secs = elapsed.as_secs_f64();

        let rate = if secs > 0.0 {
            completed as f64 / secs
        } else {
            0.0
        };

        let eta = if completed > 0 && rate > 0.0 {
            let remaining = self.total.saturating_sub(completed);
            Some(Duration::from_secs_f64(remaining as f64 / rate))
        } else {
            None
        };

        ProgressInfo {
            total: self.total,
            completed,
            errors,
            success: completed.saturating_sub(errors),
            elapsed,
            rate,
            eta,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::Relaxed) >= self.total
    }
}

#[derive(Debug, Clone)]
pub struct ProgressInfo {
    pub total: usize,
    pub completed: usize,
    pub errors: usize,
    pub success: usize,
    pub elapsed: Duration,
    pub rate: f64,
    pub eta: Option<Duration>,
}
