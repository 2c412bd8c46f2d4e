//! CLI entrypoint for the vmthread stress harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vmthread_harness::structured_log::LogEmitter;
use vmthread_harness::{Scenario, run_scenarios};

/// Stress tooling for vmthread.
#[derive(Debug, Parser)]
#[command(name = "vmthread-harness")]
#[command(about = "Stress harness for the vmthread primitives")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run stress scenarios and print a JSON summary.
    Stress {
        /// Scenario name, or `all`.
        #[arg(long, default_value = "all")]
        scenario: String,
        /// Workload size per scenario.
        #[arg(long, default_value_t = 10_000)]
        iterations: u64,
        /// Write JSONL evidence to this path.
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// List scenario names.
    List,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Stress {
            scenario,
            iterations,
            log,
        } => {
            let picks = Scenario::parse_selection(&scenario)?;
            let run_id = format!("stress-{}", std::process::id());
            eprintln!("Running {} scenario(s), {iterations} iterations", picks.len());

            let summary = match log {
                Some(path) => {
                    let mut emitter = LogEmitter::to_file(&path, &run_id)?;
                    let summary = run_scenarios(&picks, iterations, &mut emitter)?;
                    eprintln!("Evidence written to {}", path.display());
                    summary
                }
                None => {
                    let mut emitter = LogEmitter::new(std::io::sink(), &run_id);
                    run_scenarios(&picks, iterations, &mut emitter)?
                }
            };

            println!("{}", serde_json::to_string_pretty(&summary)?);
            summary.into_result()?;
        }
        Command::List => {
            for sc in Scenario::ALL {
                println!("{sc}");
            }
        }
    }

    Ok(())
}
