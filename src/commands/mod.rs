use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::config;
use crate::error::DriverError;
use crate::session::process::AiderProcess;

pub mod ask;
pub mod files;
pub mod run;

/// Session options shared by every command.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Directory to run aider in. Defaults to the current directory.
    pub working_dir: Option<PathBuf>,
    /// Arguments passed to aider after the configured ones.
    pub extra_args: Vec<String>,
    /// Prompt timeout; overrides the configured one.
    pub timeout: Option<Duration>,
    /// Program to run instead of the configured executable.
    pub executable: Option<String>,
}

/// A started session plus the prompt timeout that applies to it.
pub(crate) struct Session {
    pub aider: AiderProcess,
    pub timeout: Option<Duration>,
}

impl Session {
    pub async fn start(opts: &SessionOptions) -> Result<Self> {
        let working_dir = match &opts.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        let config = config::load(&working_dir)?;
        let mut options = config.start_options(&working_dir, &opts.extra_args);
        if let Some(executable) = &opts.executable {
            options.executable.clone_from(executable);
        }
        let timeout = opts.timeout.or_else(|| config.prompt_timeout());
        let executable = options.executable.clone();

        let aider = with_timeout(timeout, AiderProcess::start(options))
            .await
            .with_context(|| {
                format!(
                    "failed to start {executable} in {}",
                    working_dir.display()
                )
            })?;
        Ok(Self { aider, timeout })
    }

    /// Ask aider to exit and reap it.
    pub async fn shutdown(self) -> Result<()> {
        self.aider.stop()?;
        self.aider.wait().await?;
        Ok(())
    }
}

/// Await a driver call, failing if it takes longer than `timeout`.
pub(crate) async fn with_timeout<T>(
    timeout: Option<Duration>,
    fut: impl Future<Output = Result<T, DriverError>>,
) -> Result<T> {
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| anyhow!("aider did not prompt within {}s", limit.as_secs()))?,
        None => fut.await,
    };
    Ok(result?)
}

/// Whether `err` means aider has gone away.
pub(crate) fn is_terminated(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<DriverError>(),
        Some(DriverError::SessionTerminated | DriverError::StdinUnwritable)
    )
}
