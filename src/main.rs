use anyhow::Result;
use clap::Parser;
use tracing::debug;

use crashparse::cli::Cli;
use crashparse::logging;
use crashparse::platform::ExitCode;
use crashparse::{Engine, ParseOutcome};

fn print_json(outcome: &ParseOutcome) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = match cli.engine_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("crashparse: {:#}", e);
            ExitCode::InvalidUsage.exit();
        }
    };

    let json = cli.json;
    let engine = Engine::new(config);
    let request = cli.into_request();

    match engine.parse(&request) {
        Ok(outcome) => {
            if json {
                if let Err(e) = print_json(&outcome) {
                    eprintln!("crashparse: {:#}", e);
                    ExitCode::GeneralError.exit();
                }
            }
            ExitCode::Success.exit();
        }
        Err(e) => {
            debug!(dir = %request.dir.display(), record_written = e.record_written(), "parse failed");
            eprintln!("crashparse: {}", e);
            ExitCode::for_parse_error(&e).exit();
        }
    }
}
