//! Tickbench command line runner
//!
//! Runs one benchmark session per enabled storage engine and exports the results.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tickbench::config::{Config, OutputFormat};
use tickbench::utils::{format, stats::SpeedProfile};
use tickbench::{
    build_sessions, report, BenchmarkMetrics, BenchmarkSuite, EngineKind, LoggingObserver,
    PhaseKind, PhaseOutcome, SessionMonitor, SessionReport,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "tickbench")]
#[command(about = "Storage engine benchmark runner")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "tickbench.toml")]
    config: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format, overrides the configuration
    #[arg(short, long, value_enum)]
    output: Option<OutputArg>,

    /// Output file, `-` for stdout
    #[arg(short, long)]
    file: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a benchmark session for every enabled engine
    Run {
        /// Number of concurrent write flows
        #[arg(long)]
        flows: Option<usize>,

        /// Total number of records
        #[arg(long)]
        records: Option<u64>,

        /// Key randomness between 0 and 1
        #[arg(long)]
        randomness: Option<f32>,

        /// Seed for reproducible flows
        #[arg(long)]
        seed: Option<u64>,

        /// Engines to benchmark
        #[arg(short, long, value_enum, value_delimiter = ',')]
        engines: Vec<EngineArg>,

        /// Directory for file based engines
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },
    /// Validate benchmark configuration
    Validate,
    /// Generate sample configuration
    Config,
}

#[derive(ValueEnum, Clone, Copy)]
enum OutputArg {
    Json,
    Csv,
    Prometheus,
}

impl From<OutputArg> for OutputFormat {
    fn from(arg: OutputArg) -> Self {
        match arg {
            OutputArg::Json => OutputFormat::Json,
            OutputArg::Csv => OutputFormat::Csv,
            OutputArg::Prometheus => OutputFormat::Prometheus,
        }
    }
}

#[derive(ValueEnum, Clone, Copy)]
enum EngineArg {
    Memory,
    FlowFile,
}

impl From<EngineArg> for EngineKind {
    fn from(arg: EngineArg) -> Self {
        match arg {
            EngineArg::Memory => EngineKind::Memory,
            EngineArg::FlowFile => EngineKind::FlowFile,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "tickbench=debug"
    } else {
        "tickbench=info"
    };
    tickbench::init_with_filter(filter)?;

    match &cli.command {
        Commands::Run {
            flows,
            records,
            randomness,
            seed,
            engines,
            data_dir,
            no_progress,
        } => {
            let mut config = load_config(&cli)?;
            if let Some(flows) = flows {
                config.session.flow_count = *flows;
            }
            if let Some(records) = records {
                config.session.record_count = *records;
            }
            if let Some(randomness) = randomness {
                config.session.randomness = *randomness;
            }
            if seed.is_some() {
                config.session.seed = *seed;
            }
            if !engines.is_empty() {
                config.engines.enabled = engines.iter().map(|&e| e.into()).collect();
            }
            if let Some(dir) = data_dir {
                config.engines.data_directory = dir.clone();
            }
            if *no_progress {
                config.output.progress = false;
            }

            run_command(config, &cli).await?;
        }
        Commands::Validate => {
            validate_config_command(&cli)?;
        }
        Commands::Config => {
            generate_config_command(&cli)?;
        }
    }

    Ok(())
}

/// Configuration file when present, environment otherwise.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if Path::new(&cli.config).exists() {
        info!("Loading configuration from {}", cli.config);
        Config::load_from_file(&cli.config)?
    } else {
        Config::load_from_env()?
    };

    if let Some(output) = cli.output {
        config.output.format = output.into();
    }
    Ok(config)
}

async fn run_command(config: Config, cli: &Cli) -> Result<()> {
    config.validate()?;

    let cancellation = CancellationToken::new();
    let ctrl_c = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, cancelling the running session");
            ctrl_c.cancel();
        }
    });

    let metrics = Arc::new(BenchmarkMetrics::new()?);
    let suite = BenchmarkSuite::with_observers(vec![Arc::new(LoggingObserver), metrics.clone()]);

    let start_time = std::time::Instant::now();
    let mut reports = Vec::new();
    for mut session in build_sessions(&config, &cancellation) {
        let progress = config
            .output
            .progress
            .then(|| spawn_progress(session.monitor()))
            .transpose()?;

        suite.run_session(&mut session).await;

        if let Some((bar, handle)) = progress {
            handle.abort();
            bar.finish_and_clear();
        }
        reports.push(SessionReport::from_session(&session));
    }

    info!(
        "Completed {} sessions in {}",
        reports.len(),
        format::duration_human(start_time.elapsed())
    );
    print_summary(&reports);

    let output = match config.output.format {
        OutputFormat::Json => report::to_json(&reports)?,
        OutputFormat::Csv => report::to_csv(&reports)?,
        OutputFormat::Prometheus => metrics.export_prometheus()?,
    };
    write_output(&config, cli.file.as_deref(), &output)?;

    let failed = reports.iter().any(|report| {
        report.failed
            || report
                .phases
                .iter()
                .any(|phase| phase.outcome == Some(PhaseOutcome::OrderingViolation))
    });
    if failed {
        std::process::exit(1);
    }

    Ok(())
}

fn spawn_progress(monitor: SessionMonitor) -> Result<(ProgressBar, JoinHandle<()>)> {
    let bar = ProgressBar::new(monitor.record_count());
    bar.set_style(ProgressStyle::with_template(
        "{prefix:>10} {msg:<20} [{bar:40}] {pos}/{len} ({per_sec})",
    )?);
    bar.set_prefix(monitor.engine_name().to_string());

    let ticker_bar = bar.clone();
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(100));
        let mut shown = PhaseKind::None;
        loop {
            ticker.tick().await;
            if let Some(snapshot) = monitor.current() {
                if monitor.current_phase() != shown {
                    shown = monitor.current_phase();
                    ticker_bar.reset();
                    ticker_bar.set_message(snapshot.name.clone());
                }
                ticker_bar.set_position(snapshot.records);
            }
        }
    });

    Ok((bar, handle))
}

fn print_summary(reports: &[SessionReport]) {
    for report in reports {
        info!(
            "{} ({} keys, {} flows): size {}, {} records read",
            report.engine,
            report.keys_type,
            report.flow_count,
            format::bytes_human(report.engine_size),
            report.records_read
        );

        for phase in &report.phases {
            let status = match phase.outcome {
                Some(PhaseOutcome::Completed) => "DONE",
                Some(PhaseOutcome::Cancelled) => "CANCELLED",
                Some(PhaseOutcome::Skipped) | None => "SKIPPED",
                Some(PhaseOutcome::OrderingViolation) => "UNORDERED",
                Some(PhaseOutcome::Failed) => "FAIL",
            };

            let spread = SpeedProfile::from_series(&phase.moment_speeds)
                .map(|p| {
                    format!(
                        ", moment mean {} median {} p95 {}",
                        format::rate_human(p.mean, "rec"),
                        format::rate_human(p.median, "rec"),
                        format::rate_human(p.p95, "rec")
                    )
                })
                .unwrap_or_default();

            info!(
                "  [{}] {}: {} in {}, {}, peak {}{}",
                status,
                phase.name,
                phase.records,
                format::duration_human(Duration::from_secs_f64(phase.elapsed_seconds)),
                format::rate_human(phase.average_speed, "rec"),
                format::bytes_human(phase.peak_working_set),
                spread
            );
        }
    }
}

fn write_output(config: &Config, file: Option<&str>, output: &str) -> Result<()> {
    let path = match file {
        Some("-") => {
            println!("{}", output);
            return Ok(());
        }
        Some(file) => PathBuf::from(file),
        None => {
            let extension = match config.output.format {
                OutputFormat::Json => "json",
                OutputFormat::Csv => "csv",
                OutputFormat::Prometheus => "prom",
            };
            std::fs::create_dir_all(&config.output.directory)?;
            config
                .output
                .directory
                .join(report::file_name(chrono::Utc::now(), extension))
        }
    };

    std::fs::write(&path, output)?;
    info!("Results written to: {}", path.display());
    Ok(())
}

fn validate_config_command(cli: &Cli) -> Result<()> {
    info!("Validating configuration file: {}", cli.config);

    match Config::load_from_file(&cli.config) {
        Ok(config) => {
            config.validate()?;
            info!("Configuration file is valid");
        }
        Err(e) => {
            warn!("Configuration file is invalid: {}", e);
            return Err(e);
        }
    }

    Ok(())
}

fn generate_config_command(cli: &Cli) -> Result<()> {
    let config = Config::default();
    config.save_to_file(&cli.config)?;
    info!("Generated sample configuration: {}", cli.config);

    Ok(())
}
