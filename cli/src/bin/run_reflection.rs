//! Reflect over an agent's recent traces and write a delta file.
//!
//! Usage:
//!   run-reflection --agent backend-architect --hours 48
//!   run-reflection --agent backend-architect --output deltas.json --verbose

use std::path::PathBuf;

use clap::Parser;

use ace_cli::{describe_reflection, init_tracing, reflect, Stores};
use ace_config::AceConfig;
use ace_contracts::error::AceResult;
use ace_core::traits::InsightExtractor;
use ace_providers::AnthropicInsightExtractor;

#[derive(Parser)]
#[command(name = "run-reflection", about = "Extract insight deltas from recent execution traces")]
struct Cli {
    /// Agent whose traces are analyzed.
    #[arg(long)]
    agent: String,

    /// Look back this many hours.
    #[arg(long, default_value_t = 24)]
    hours: u32,

    /// Also write the deltas to this file as JSON.
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long, short)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("No traces found for {} in the last {} hours.", cli.agent, cli.hours);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Reflection failed: {e}");
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> AceResult<bool> {
    let config = AceConfig::load()?;
    let stores = Stores::open(&config);
    let model = config.insight_model.clone();

    let outcome = reflect(&config, &stores, &cli.agent, cli.hours, cli.output.as_deref(), || {
        Ok(Box::new(AnthropicInsightExtractor::from_env(model)?) as Box<dyn InsightExtractor>)
    })?;

    match outcome {
        Some(outcome) => {
            print!("{}", describe_reflection(&cli.agent, &outcome));
            Ok(true)
        }
        None => Ok(false),
    }
}
