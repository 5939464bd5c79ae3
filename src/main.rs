mod cli;

use aider_driver::commands;
use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Some(Command::Ask {
            message,
            aider_opts,
        }) => {
            commands::ask::ask(
                aider_opts.into_session_options(),
                &message,
                std::io::stdout(),
            )
            .await?;
        }
        Some(Command::Files { aider_opts }) => {
            commands::files::files(aider_opts.into_session_options(), std::io::stdout()).await?;
        }
        None => {
            let mut input = std::io::stdin().lock();
            commands::run::run(
                cli.aider_opts.into_session_options(),
                &mut input,
                std::io::stdout(),
            )
            .await?;
        }
    }

    Ok(())
}

/// Log to stderr so driver diagnostics never mix with aider's output.
///
/// `AIDER_DRIVER_LOG` takes precedence over `RUST_LOG`.
fn init_logging(verbose: bool) {
    let default = if verbose { "aider_driver=debug,aider=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("AIDER_DRIVER_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
