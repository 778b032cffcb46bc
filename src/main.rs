use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use testdash::aggregate::BucketMode;
use testdash::config::{Config, LogFormat, LoggingConfig};

#[derive(Parser)]
#[command(
    name = "testdash",
    about = "Test-results dashboard backend with per-framework run retention",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (defaults to $TESTDASH_CONFIG, then ./testdash.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Bind address (overrides [server] bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Apply run retention to one framework and sweep orphaned screenshots
    Prune {
        #[arg(long)]
        framework: String,
    },

    /// Delete every result of a run, in all frameworks
    Purge {
        #[arg(long)]
        run_id: String,
    },

    /// List runs, most recent first
    Runs {
        #[arg(long)]
        framework: Option<String>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Print a trend series
    Trend {
        #[arg(long, value_enum, default_value = "pass-fail")]
        chart: Chart,

        /// Bucket size: daily or weekly
        #[arg(long, default_value = "daily")]
        mode: BucketMode,

        #[arg(long)]
        framework: Option<String>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// List known frameworks
    Frameworks,

    /// Upload a reporter's JSON results file to a running server
    Report {
        /// JSON array of result entries
        #[arg(long)]
        file: PathBuf,

        #[arg(long, default_value = testdash::reporter::DEFAULT_SERVER)]
        server: String,

        /// Run id for entries that carry none (defaults to now, epoch ms)
        #[arg(long)]
        run_id: Option<String>,

        /// Framework for entries that carry none
        #[arg(long)]
        framework: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Chart {
    PassFail,
    AutomationCount,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, source) = Config::resolve(cli.config.as_deref())?;
    init_tracing(&config.logging);
    match &source {
        Some(path) => tracing::info!(path = %path.display(), "loaded configuration"),
        None => tracing::debug!("no config file found, using compiled-in defaults"),
    }

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting testdash server");
            testdash::serve(config).await?;
        }
        Commands::Prune { framework } => {
            let service = testdash::open_service(&config)?;
            let report = service.prune(&framework)?;
            println!("Framework:        {}", report.framework);
            println!("Runs kept:        {}", report.kept_runs.len());
            println!("Runs dropped:     {}", report.dropped_runs.len());
            println!("Records deleted:  {}", report.deleted_records);
            println!("Screenshot dirs:  {} removed", report.sweep.deleted_artifacts.len());
            if report.sweep.artifact_errors > 0 {
                println!("Sweep errors:     {} (see log)", report.sweep.artifact_errors);
            }
        }
        Commands::Purge { run_id } => {
            let service = testdash::open_service(&config)?;
            let deleted = service.delete_run(&run_id)?;
            if deleted == 0 {
                println!("No results found for run '{}'.", run_id);
            } else {
                println!("Deleted {} results for run '{}'.", deleted, run_id);
            }
        }
        Commands::Runs { framework, json } => {
            let service = testdash::open_service(&config)?;
            let records = service.list_all(framework.as_deref())?;
            let runs = service.aggregator().group_by_run(&records);
            if json {
                println!("{}", serde_json::to_string_pretty(&runs)?);
            } else if runs.is_empty() {
                println!("No runs found.");
            } else {
                println!(
                    "{:<20} | {:<20} | {:>6} | {:>6} | {:>7} | {:>6} | Time",
                    "Run", "Framework", "Passed", "Failed", "Skipped", "Pass %"
                );
                println!(
                    "{:-<20}-|-{:-<20}-|-{:-<6}-|-{:-<6}-|-{:-<7}-|-{:-<6}-|-{:-<10}",
                    "", "", "", "", "", "", ""
                );
                for run in runs {
                    println!(
                        "{:<20} | {:<20} | {:>6} | {:>6} | {:>7} | {:>6.1} | {}",
                        run.label,
                        run.framework,
                        run.counts.passed,
                        run.counts.failed,
                        run.counts.skipped,
                        run.counts.pass_percent(),
                        run.execution_time
                    );
                }
            }
        }
        Commands::Trend {
            chart,
            mode,
            framework,
            json,
        } => {
            let service = testdash::open_service(&config)?;
            let records = service.list_all(framework.as_deref())?;
            let agg = service.aggregator();
            match chart {
                Chart::PassFail => {
                    let points = agg.pass_fail_trend(&records, mode);
                    if json {
                        println!("{}", serde_json::to_string_pretty(&points)?);
                    } else {
                        println!(
                            "{:<25} | {:<15} | {:>6} | {:>6} | {:>7}",
                            "Bucket", "Run", "Passed", "Failed", "Skipped"
                        );
                        println!("{:-<25}-|-{:-<15}-|-{:-<6}-|-{:-<6}-|-{:-<7}", "", "", "", "", "");
                        for p in points {
                            println!(
                                "{:<25} | {:<15} | {:>6} | {:>6} | {:>7}",
                                p.label, p.run_id, p.counts.passed, p.counts.failed, p.counts.skipped
                            );
                        }
                    }
                }
                Chart::AutomationCount => {
                    let points = agg.automation_count_trend(&records, mode);
                    if json {
                        println!("{}", serde_json::to_string_pretty(&points)?);
                    } else {
                        println!("{:<25} | Tests", "Bucket");
                        println!("{:-<25}-|-{:-<6}", "", "");
                        for p in points {
                            println!("{:<25} | {}", p.label, p.count);
                        }
                    }
                }
            }
        }
        Commands::Frameworks => {
            let service = testdash::open_service(&config)?;
            let records = service.list_all(None)?;
            let names = testdash::aggregate::frameworks(&records);
            if names.is_empty() {
                println!("No frameworks found.");
            }
            for name in names {
                println!("{}", name);
            }
        }
        Commands::Report {
            file,
            server,
            run_id,
            framework,
        } => {
            let entries = testdash::reporter::load_entries(&file)?;
            let entries = testdash::reporter::prepare_entries(
                entries,
                run_id.as_deref(),
                framework.as_deref(),
                chrono::Utc::now(),
            );
            let client = testdash::reporter::ReporterClient::new(&server)?;
            let sent = client.submit_all(&entries).await?;
            let run = entries.first().and_then(|e| e.run_id.as_deref()).unwrap_or("-");
            println!("Submitted {} results with run_id: {}", sent, run);
        }
    }

    Ok(())
}
