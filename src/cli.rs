use std::path::PathBuf;
use std::time::Duration;

use aider_driver::commands::SessionOptions;
use clap::{Parser, Subcommand};

/// Aider session options shared across all command modes.
#[derive(clap::Args, Debug)]
pub struct AiderOpts {
    /// Directory to run aider in (default: current directory).
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Seconds to wait for each prompt before giving up.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Program to run instead of the configured aider executable.
    #[arg(long, value_name = "PROGRAM")]
    pub executable: Option<String>,

    /// Extra arguments to pass through to aider (after --).
    #[arg(last = true)]
    pub aider_args: Vec<String>,
}

impl AiderOpts {
    pub fn into_session_options(self) -> SessionOptions {
        SessionOptions {
            working_dir: self.cwd,
            extra_args: self.aider_args,
            timeout: self.timeout.map(Duration::from_secs),
            executable: self.executable,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "aider-driver",
    about = "Drive aider's interactive prompt line by line",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Log driver activity to stderr (AIDER_DRIVER_LOG or RUST_LOG override).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub aider_opts: AiderOpts,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one message, print aider's reply, and exit.
    Ask {
        /// Message to send to aider.
        #[arg(value_name = "MESSAGE")]
        message: String,

        #[command(flatten)]
        aider_opts: AiderOpts,
    },

    /// Print the files aider loads into the chat at startup.
    Files {
        #[command(flatten)]
        aider_opts: AiderOpts,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn passes_trailing_args_to_aider() {
        let cli = Cli::try_parse_from([
            "aider-driver",
            "--cwd",
            "/tmp/proj",
            "--",
            "--architect",
            "--map-refresh",
            "manual",
        ])
        .unwrap_or_else(|e| panic!("{e}"));
        assert!(cli.command.is_none());
        let opts = cli.aider_opts.into_session_options();
        assert_eq!(opts.working_dir, Some(PathBuf::from("/tmp/proj")));
        assert_eq!(opts.extra_args, ["--architect", "--map-refresh", "manual"]);
    }

    #[test]
    fn ask_subcommand() {
        let cli = Cli::try_parse_from(["aider-driver", "ask", "/help", "--timeout", "30"])
            .unwrap_or_else(|e| panic!("{e}"));
        let Some(Command::Ask {
            message,
            aider_opts,
        }) = cli.command
        else {
            panic!("expected ask");
        };
        assert_eq!(message, "/help");
        assert_eq!(
            aider_opts.into_session_options().timeout,
            Some(Duration::from_secs(30))
        );
    }
}
