//! Omni-Help command line entry point

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use omnihelp::config::AppConfig;
use omnihelp::evaluation::{
    compute_accuracy, load_golden_dataset, per_intent_accuracy, run_classifier_on_dataset,
};
use omnihelp::graph::{NoFurtherTurns, Orchestrator, TurnSource};
use omnihelp::observability::init_default_logging;
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::process;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Confidence-gated customer support router
#[derive(Parser)]
#[command(name = "omnihelp")]
#[command(about = "Confidence-gated customer support router")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one customer query, asking follow-up questions on stdin
    Ask {
        /// The customer query
        query: String,

        /// Do not wait for clarification replies; print the question and stop
        #[arg(long)]
        no_interactive: bool,

        /// Print the transition audit trail as JSON on stderr
        #[arg(long)]
        audit: bool,
    },
    /// Measure classifier accuracy against a labelled dataset
    Eval {
        #[arg(long, default_value = "data/golden_dataset.json")]
        dataset: PathBuf,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

/// Reads clarification replies from stdin; end of input means no reply
struct StdinTurns {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl StdinTurns {
    fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

#[async_trait]
impl TurnSource for StdinTurns {
    async fn next_turn(&self, question: &str) -> Option<String> {
        print!("{question}\n> ");
        // Prompt display is best effort
        let _ = std::io::stdout().flush();

        match self.lines.lock().await.next_line().await {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to read reply from stdin");
                None
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();
    info!("Starting omnihelp v{}", env!("CARGO_PKG_VERSION"));

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Ask {
            query,
            no_interactive,
            audit,
        } => ask(config, &query, no_interactive, audit).await,
        Commands::Eval { dataset } => evaluate(config, dataset).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

async fn ask(
    config: AppConfig,
    query: &str,
    no_interactive: bool,
    print_audit: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = Orchestrator::new(config.orchestrator(), config.build_collaborators()?);

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, cancelling request");
            ctrl_c_token.cancel();
        }
    });

    let stdin_turns;
    let turns: &dyn TurnSource = if no_interactive {
        &NoFurtherTurns
    } else {
        stdin_turns = StdinTurns::new();
        &stdin_turns
    };

    let report = orchestrator.run(query, Vec::new(), turns, &cancel).await?;

    println!("{}", report.final_response);
    if print_audit {
        eprintln!("{}", serde_json::to_string_pretty(&report.audit)?);
    }
    info!(
        metrics = %serde_json::to_string(&orchestrator.metrics().snapshot())?,
        "Routing metrics"
    );
    Ok(())
}

async fn evaluate(config: AppConfig, dataset: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let examples = load_golden_dataset(&dataset)?;
    let collaborators = config.build_collaborators()?;

    let results = run_classifier_on_dataset(collaborators.classifier.as_ref(), &examples).await;
    let accuracy = compute_accuracy(&results);
    info!(accuracy, examples = results.len(), "Evaluation complete");

    let report = json!({
        "dataset": dataset.display().to_string(),
        "accuracy": accuracy,
        "per_intent": per_intent_accuracy(&results),
        "results": results,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn handle_config_command(config: AppConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", toml::to_string_pretty(&config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
