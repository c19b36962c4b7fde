mod cli;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use syncdesk::ServerError;
use syncdesk_config::load_config;

use crate::cli::{Cli, Command, LogFormat};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose, cli.global.log_format);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, format: LogFormat) {
    // The server logs at info by default; -v raises from there.
    let filter = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> Result<(), ServerError> {
    let config = load_config(cli.global.config.as_deref())?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => syncdesk::serve(&config).await,
        Command::CheckConfig => {
            // Also proves the remote client can be built (CA file, URL).
            syncdesk::build_state(&config)?;
            println!("configuration ok");
            Ok(())
        }
        Command::PrintConfig => {
            print!("{}", config.redacted().to_toml()?);
            Ok(())
        }
    }
}
