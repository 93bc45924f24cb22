//! Print the state of an agent's playbook.

use clap::Parser;

use ace_cli::{init_tracing, status, Stores};
use ace_config::AceConfig;

#[derive(Parser)]
#[command(name = "show-status", about = "Show playbook version, size and health")]
struct Cli {
    #[arg(long)]
    agent: String,

    /// Include every active bullet and recent change history.
    #[arg(long)]
    detailed: bool,

    #[arg(long, short)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match AceConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    match status(&Stores::open(&config), &cli.agent, cli.detailed) {
        Some(report) => print!("{report}"),
        None => {
            eprintln!("No playbook exists yet for {}.", cli.agent);
            std::process::exit(1);
        }
    }
}
