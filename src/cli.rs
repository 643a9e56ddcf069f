use crate::{
    build_work_plan, format_duration, percentage, AssetFetcher, CatalogClient, ChartError,
    ChartExecutor, ChromeLauncher, Config, GateSettings, HttpFetcher, Metrics, RasterGate,
    Region, RunReport, Selection, WorkPlan,
};
use clap::{ArgGroup, Parser, ValueEnum};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "sekai-chart-render")]
#[command(about = "Render rhythm game charts to cropped PNG images")]
#[command(version)]
#[command(group(ArgGroup::new("target").required(true).args(["all", "music_ids"])))]
pub struct Cli {
    #[arg(short = 'A', long, help = "Render every song in the catalog")]
    pub all: bool,

    #[arg(value_name = "MUSIC_ID", help = "Music ids to render")]
    pub music_ids: Vec<u32>,

    #[arg(
        short = 'D',
        long = "difficulty",
        value_enum,
        help = "Only render these difficulties (repeatable, default: all)"
    )]
    pub difficulties: Vec<Difficulty>,

    #[arg(short = 'O', long, help = "Output root for scores/ and charts/")]
    pub output: Option<PathBuf>,

    #[arg(short = 'R', long, value_enum, help = "Catalog region")]
    pub region: Option<Region>,

    #[arg(short = 'j', long, help = "Number of parallel workers")]
    pub jobs: Option<usize>,

    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Chrome executable path")]
    pub chrome_path: Option<String>,

    #[arg(long, help = "Seconds to wait for a chart to appear in the browser")]
    pub timeout: Option<u64>,

    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
    Expert,
    Master,
    Append,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Normal => "normal",
            Difficulty::Hard => "hard",
            Difficulty::Expert => "expert",
            Difficulty::Master => "master",
            Difficulty::Append => "append",
        }
    }
}

impl Cli {
    pub fn selection(&self) -> Selection {
        let music_ids = if self.all {
            None
        } else {
            Some(self.music_ids.iter().copied().collect())
        };

        let difficulties = if self.difficulties.is_empty() {
            None
        } else {
            Some(
                self.difficulties
                    .iter()
                    .map(|d| d.as_str().to_string())
                    .collect(),
            )
        };

        Selection {
            music_ids,
            difficulties,
        }
    }
}

/// Build the run configuration: file first, then command line overrides
pub async fn load_config(args: &Cli) -> Result<Config, ChartError> {
    let mut config = if let Some(config_path) = &args.config {
        let config_content = fs::read_to_string(config_path).await.map_err(|e| {
            ChartError::Configuration(format!("{}: {}", config_path.display(), e))
        })?;
        serde_json::from_str(&config_content).map_err(|e| {
            ChartError::Configuration(format!("{}: {}", config_path.display(), e))
        })?
    } else {
        Config::default()
    };

    if let Some(output) = &args.output {
        config.output_root = output.clone();
    }

    if let Some(region) = args.region {
        config.region = region;
    }

    if let Some(jobs) = args.jobs {
        config.max_workers = jobs;
    }

    if let Some(timeout) = args.timeout {
        config.marker_timeout = Duration::from_secs(timeout);
    }

    if let Some(chrome_path) = &args.chrome_path {
        config.chrome_path = Some(chrome_path.clone());
    }

    config.validate()?;

    info!("Configuration loaded successfully");
    info!("Region: {}", config.region);
    info!("Output root: {}", config.output_root.display());
    info!("Workers: {}", config.max_workers);
    info!("Marker timeout: {:?}", config.marker_timeout);

    Ok(config)
}

pub struct CliRunner {
    pub config: Config,
    pub executor: ChartExecutor,
    fetcher: Arc<dyn AssetFetcher>,
}

impl CliRunner {
    pub fn new(config: Config) -> Result<Self, ChartError> {
        let fetcher: Arc<dyn AssetFetcher> = Arc::new(HttpFetcher::new(config.http_timeout)?);
        let gate = Arc::new(RasterGate::new(
            Box::new(ChromeLauncher::new(config.clone())),
            GateSettings::from(&config),
        ));

        Ok(Self::with_parts(config, fetcher, gate))
    }

    pub fn with_parts(config: Config, fetcher: Arc<dyn AssetFetcher>, gate: Arc<RasterGate>) -> Self {
        let executor = ChartExecutor::new(
            config.clone(),
            fetcher.clone(),
            gate,
            Arc::new(Metrics::new()),
        );

        Self {
            config,
            executor,
            fetcher,
        }
    }

    /// Fetch both catalogs and resolve the selection into work items
    pub async fn plan(&self, selection: &Selection) -> Result<WorkPlan, ChartError> {
        let catalog = CatalogClient::new(self.fetcher.clone(), self.config.region);
        let (musics, variants) =
            futures::try_join!(catalog.fetch_musics(), catalog.fetch_difficulties())?;

        if let Some(ids) = &selection.music_ids {
            for id in ids {
                if !musics.iter().any(|m| m.id == *id) {
                    warn!("Music id {} is not in the {} catalog", id, self.config.region);
                }
            }
        }

        let (musics, variants) = selection.apply(musics, variants);
        let plan = build_work_plan(&musics, &variants, self.config.region, &self.config.output_root);

        info!(
            "Planned {} charts ({} catalog entries skipped)",
            plan.items.len(),
            plan.rejected.len()
        );
        Ok(plan)
    }

    pub async fn run(&self, selection: &Selection) -> Result<RunReport, ChartError> {
        let plan = self.plan(selection).await?;
        if plan.items.is_empty() {
            warn!("No charts matched the selection");
        }

        let report = self.executor.run(plan.items).await;
        self.executor.gate().shutdown().await;

        Ok(report)
    }
}

pub fn format_summary(report: &RunReport) -> String {
    let total = report.items.len();
    let succeeded = report.succeeded().count();
    let failed = total - succeeded;

    let mut lines = vec![
        format!("Run started {}", report.started_at.to_rfc3339()),
        format!(
            "Rendered {}/{} charts ({:.1}%) in {}",
            succeeded,
            total,
            percentage(succeeded, total),
            format_duration(report.duration)
        ),
    ];

    if failed > 0 {
        let mut by_kind: BTreeMap<&str, usize> = BTreeMap::new();
        for (_, failure) in report.failed() {
            *by_kind.entry(failure.error.kind()).or_default() += 1;
        }
        let kinds: Vec<String> = by_kind
            .iter()
            .map(|(kind, count)| format!("{kind}: {count}"))
            .collect();

        lines.push(format!("Failed: {failed} ({})", kinds.join(", ")));
        for (item, failure) in report.failed() {
            lines.push(format!("  {}: {}", item.label(), failure));
        }
    }

    if let Some(fatal) = &report.fatal {
        lines.push(format!("Run aborted: {fatal}"));
    }

    lines.join("\n")
}

pub fn setup_logging(verbose: bool) -> Result<(), ChartError> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .map_err(|e| ChartError::Configuration(format!("logging: {e}")))
}
