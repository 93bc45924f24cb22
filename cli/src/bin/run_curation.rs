//! Fold pending delta files into an agent's playbook.
//!
//! Usage:
//!   run-curation --agent backend-architect
//!   run-curation --agent backend-architect --input a.json --input b.json --max-deltas 50

use std::path::PathBuf;

use clap::Parser;

use ace_cli::{curate, describe_curation, init_tracing, Stores};
use ace_config::AceConfig;
use ace_contracts::error::AceResult;
use ace_core::traits::EmbeddingService;
use ace_providers::OpenAiEmbedder;

#[derive(Parser)]
#[command(name = "run-curation", about = "Merge delta files into the agent playbook")]
struct Cli {
    /// Agent whose playbook is curated.
    #[arg(long)]
    agent: String,

    /// Delta file to consume instead of the pending set. Repeatable.
    #[arg(long)]
    input: Vec<PathBuf>,

    /// Consume at most this many deltas.
    #[arg(long)]
    max_deltas: Option<usize>,

    #[arg(long, short)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("No delta files found for {}.", cli.agent);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Curation failed: {e}");
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> AceResult<bool> {
    let config = AceConfig::load()?;
    let stores = Stores::open(&config);
    let model = config.embedding_model.clone();

    let outcome = curate(&config, &stores, &cli.agent, cli.input.clone(), cli.max_deltas, || {
        Ok(Box::new(OpenAiEmbedder::from_env(model)?) as Box<dyn EmbeddingService>)
    })?;

    match outcome {
        Some(outcome) => {
            print!("{}", describe_curation(&outcome));
            Ok(true)
        }
        None => Ok(false),
    }
}
