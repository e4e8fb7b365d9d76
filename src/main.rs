use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::prelude::*;

use trust_network::config::{MAX_ROUNDS, TOLERANCE};
use trust_network::report::{self, ScoringMode};
use trust_network::{store, Convergence, PeriodBound, ScoringConfig, SnapshotGraph};

#[derive(Parser)]
#[command(name = "trust-network")]
#[command(about = "Fairness and goodness scoring for temporal trust networks", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the calendar months covered by the ratings
    Periods {
        #[arg(long, env = "TRUST_NETWORK_CSV")]
        csv: PathBuf,
    },
    /// Score a snapshot and print the most trusted nodes
    Score {
        #[command(flatten)]
        snapshot: SnapshotArgs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Write a markdown report for a snapshot
    Report {
        #[command(flatten)]
        snapshot: SnapshotArgs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Write the annotated node and edge tables as JSON
    Export {
        #[command(flatten)]
        snapshot: SnapshotArgs,
        #[arg(long, default_value = "graph.json")]
        out: PathBuf,
    },
}

#[derive(Args)]
struct SnapshotArgs {
    /// Headerless source,target,rating,time CSV
    #[arg(long, env = "TRUST_NETWORK_CSV")]
    csv: PathBuf,
    /// Month (YYYY-MM), RFC 3339 time or unix seconds; alone it selects one month
    #[arg(long)]
    period: Option<String>,
    /// Exclusive end of the window
    #[arg(long)]
    period_end: Option<String>,
    /// "rev2" or "average"
    #[arg(long, default_value = "rev2")]
    mode: String,
    /// Build the snapshot without running the scorer
    #[arg(long)]
    no_scoring: bool,
    #[arg(long, default_value_t = MAX_ROUNDS)]
    max_rounds: usize,
    #[arg(long, default_value_t = TOLERANCE)]
    tolerance: f64,
}

struct Loaded {
    window: String,
    mode: ScoringMode,
    graph: SnapshotGraph,
    convergence: Option<Convergence>,
}

impl SnapshotArgs {
    fn load(&self) -> anyhow::Result<Loaded> {
        let mode: ScoringMode = self.mode.parse()?;
        let start = self
            .period
            .as_deref()
            .map(str::parse::<PeriodBound>)
            .transpose()?;
        let end = self
            .period_end
            .as_deref()
            .map(str::parse::<PeriodBound>)
            .transpose()?;

        let store = store::load_csv(&self.csv)
            .with_context(|| format!("failed to load ratings from {}", self.csv.display()))?;

        let config = ScoringConfig {
            max_rounds: self.max_rounds,
            tolerance: self.tolerance,
        };
        let run_scoring = mode == ScoringMode::Rev2 && !self.no_scoring;
        let (graph, convergence) =
            store.snapshot(start.as_ref(), end.as_ref(), run_scoring, &config)?;

        let window = match (&start, &end) {
            (None, None) => "all records".to_string(),
            (Some(start), None) => start.bucket().to_string(),
            (None, Some(end)) => format!("before {end}"),
            (Some(start), Some(end)) => format!("{start} to {end}"),
        };

        Ok(Loaded {
            window,
            mode,
            graph,
            convergence,
        })
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.command {
        Commands::Periods { csv } => {
            let store = store::load_csv(&csv)
                .with_context(|| format!("failed to load ratings from {}", csv.display()))?;
            let periods = store.distinct_periods();
            if periods.is_empty() {
                println!("No ratings found.");
                return Ok(());
            }
            for period in periods {
                println!("{period}");
            }
        }
        Commands::Score { snapshot, limit } => {
            let loaded = snapshot.load()?;
            if loaded.graph.edge_count() == 0 {
                println!("No ratings found for {}.", loaded.window);
                return Ok(());
            }

            if let Some(run) = &loaded.convergence {
                println!(
                    "Scored {} nodes over {} rounds ({}).",
                    loaded.graph.node_count(),
                    run.rounds,
                    if run.converged { "converged" } else { "round cap reached" }
                );
            }

            println!("Top nodes for {} by {} trust:", loaded.window, loaded.mode);
            for view in report::rank_nodes(&loaded.graph, loaded.mode).iter().take(limit) {
                match loaded.mode {
                    ScoringMode::Rev2 => println!(
                        "- {} goodness {:.3} fairness {:.3} across {} ratings",
                        view.id, view.goodness, view.fairness, view.in_degree
                    ),
                    ScoringMode::Average => println!(
                        "- {} mean rating {:.2} across {} ratings",
                        view.id,
                        view.mean_rating.unwrap_or(0.0),
                        view.in_degree
                    ),
                }
            }
        }
        Commands::Report {
            snapshot,
            limit,
            out,
        } => {
            let loaded = snapshot.load()?;
            let report = report::build_report(
                &loaded.window,
                &loaded.graph,
                loaded.mode,
                loaded.convergence.as_ref(),
                limit,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { snapshot, out } => {
            let loaded = snapshot.load()?;
            let json = report::export_json(&loaded.graph)?;
            std::fs::write(&out, json)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!(
                "Exported {} nodes and {} edges to {}.",
                loaded.graph.node_count(),
                loaded.graph.edge_count(),
                out.display()
            );
        }
    }

    Ok(())
}
