use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use corpus_balancer::core::analysis::{RebalancePlan, RebalanceProgressMessage};
use corpus_balancer::core::corpus::{
    ClassificationOracle, KeywordOracle, SnapshotProvider, StorageMutator,
};
use corpus_balancer::core::domain::DomainRegistry;
use corpus_balancer::infrastructure::logging::{default_log_dir, setup_logging};
use corpus_balancer::infrastructure::storage::{FsCorpus, MemoryCorpus};
use corpus_balancer::worker::StartStatus;
use corpus_balancer::{BalanceConfig, BalanceEngine, CorpusReport};

#[derive(Parser)]
#[command(version, about = "Keep a document corpus balanced across its domains")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Corpus root directory; overrides `corpus_root` from the config
    #[arg(long, global = true, conflicts_with = "demo")]
    corpus: Option<PathBuf>,

    /// Use a generated in-memory sample corpus
    #[arg(long, global = true)]
    demo: bool,

    /// Seed for the sample corpus
    #[arg(long, global = true, default_value_t = 42)]
    seed: u64,

    /// Log directory (defaults to ./logs)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Per-domain document counts and allocations
    Stats,
    /// Rank domains by deviation and print recommendations
    Analyze,
    /// Show the rebalance plan without applying it
    Plan {
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Plan and apply a rebalance
    Balance,
    /// Write the default configuration
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = cli.log_dir.clone().unwrap_or_else(default_log_dir);
    setup_logging(&log_dir, cli.verbose)
        .with_context(|| format!("failed to set up logging in {:?}", log_dir))?;

    let config_path = cli.config.clone().or_else(BalanceConfig::default_path);

    if let Command::InitConfig { force } = cli.command {
        let path = config_path.context("no config path available; pass --config")?;
        if path.exists() && !force {
            bail!("{:?} already exists (use --force to overwrite)", path);
        }
        BalanceConfig::default().save_to(&path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let config = match &config_path {
        Some(path) => BalanceConfig::load_from(path)
            .with_context(|| format!("failed to load config {:?}", path))?,
        None => {
            warn!("No config directory available, using defaults");
            BalanceConfig::default()
        }
    };
    let registry = DomainRegistry::load(&config).context("invalid domain targets")?;

    if cli.demo {
        let corpus = Arc::new(MemoryCorpus::sample(registry.domains(), cli.seed));
        return run(&cli, config, corpus);
    }

    let root = cli
        .corpus
        .clone()
        .or_else(|| config.corpus_root.clone())
        .context("no corpus given: pass --corpus <dir>, set corpus_root, or use --demo")?;
    let corpus = Arc::new(FsCorpus::open(&root, registry.domains())?);
    run(&cli, config, corpus)
}

fn run<C>(cli: &Cli, config: BalanceConfig, corpus: Arc<C>) -> Result<()>
where
    C: SnapshotProvider + StorageMutator + 'static,
{
    let engine = BalanceEngine::new(config, corpus.clone())?;
    let oracle = engine
        .config()
        .auto_classify
        .then(|| KeywordOracle::new(engine.registry().domains()));
    let oracle_ref = oracle.as_ref().map(|o| o as &dyn ClassificationOracle);

    match cli.command {
        Command::Stats => print_stats(&engine.analyze(corpus.as_ref())?),
        Command::Analyze => print_analysis(&engine.analyze(corpus.as_ref())?),
        Command::Plan { json } => {
            let plan = engine.plan(corpus.as_ref(), oracle_ref)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print_plan(&plan);
            }
        }
        Command::Balance => {
            let plan = engine.plan(corpus.as_ref(), oracle_ref)?;
            print_quotas(&plan);
            if plan.is_empty() {
                println!("Nothing to apply.");
                return Ok(());
            }
            balance(&engine, plan)?;
            print_analysis(&engine.analyze(corpus.as_ref())?);
        }
        // Handled before a corpus is opened
        Command::InitConfig { .. } => {}
    }
    Ok(())
}

fn balance(engine: &BalanceEngine, plan: RebalancePlan) -> Result<()> {
    let rx = match engine.start_rebalance(plan) {
        StartStatus::Started(rx) => rx,
        StartStatus::AlreadyRunning => bail!("a rebalance is already running"),
        StartStatus::SpawnFailed(e) => bail!("failed to start rebalance worker: {}", e),
    };

    for message in rx {
        match message {
            RebalanceProgressMessage::Progress {
                completed,
                total,
                current_item,
            } => eprintln!("[{}/{}] {}", completed, total, current_item),
            RebalanceProgressMessage::Complete(_) => break,
            RebalanceProgressMessage::Cancelled(_) => {
                warn!("Rebalance cancelled");
                break;
            }
        }
    }

    let summary = engine.wait().context("rebalance worker did not return a summary")?;
    for error in summary.errors() {
        eprintln!("  failed: {}", error);
    }
    println!(
        "{} documents moved, {} classified, {} failed",
        summary.moved_count, summary.classified_count, summary.failed_count
    );
    info!("Rebalance finished: {}/{} items", summary.completed, summary.total);
    Ok(())
}

fn print_stats(report: &CorpusReport) {
    println!("{}", report.summary);
    println!(
        "{:<28} {:>8} {:>9} {:>9} {:>8}",
        "Domain", "Docs", "Current", "Target", "Quality"
    );
    for s in &report.snapshots {
        println!(
            "{:<28} {:>8} {:>8.1}% {:>8.1}% {:>8.2}",
            s.domain.name,
            s.document_count,
            s.current_allocation * 100.0,
            s.domain.target_allocation * 100.0,
            s.average_quality
        );
    }
}

fn print_analysis(report: &CorpusReport) {
    println!("{}", report.summary);
    for e in &report.entries {
        println!(
            "{:<28} {:>8.1}% of {:>5.1}%  {:>+7.1}%  {}",
            e.domain,
            e.current_allocation * 100.0,
            e.target_allocation * 100.0,
            e.deviation * 100.0,
            e.status.as_str()
        );
    }
    println!();
    for line in &report.recommendations {
        println!("{}", line);
    }
}

fn print_plan(plan: &RebalancePlan) {
    println!(
        "Method: {}, quality threshold {:.0}%",
        plan.method.as_str(),
        plan.quality_threshold * 100.0
    );
    for c in &plan.classifications {
        println!(
            "classify {} -> {} ({:.0}%)",
            c.document_id,
            c.domain,
            c.confidence * 100.0
        );
    }
    for m in &plan.moves {
        println!("move {}: {} -> {} ({})", m.document_id, m.from_domain, m.to_domain, m.reason);
    }
    print_quotas(plan);
    println!(
        "{} classifications, {} moves",
        plan.classifications.len(),
        plan.moves.len()
    );
}

fn print_quotas(plan: &RebalancePlan) {
    for (domain, quota) in &plan.collection_quotas {
        let uncovered = plan.residual_quotas.get(domain).copied().unwrap_or(0);
        println!(
            "collect {} more documents in {} ({} not covered by planned moves)",
            quota, domain, uncovered
        );
    }
}
