use std::io;

/// Errors surfaced by an [`AiderProcess`](crate::session::process::AiderProcess).
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("failed to spawn '{executable}': {source}")]
    Spawn {
        executable: String,
        #[source]
        source: io::Error,
    },
    #[error("aider stdin is not writable")]
    StdinUnwritable,
    #[error("aider stdout is not available")]
    StreamUnavailable,
    #[error("aider session has terminated")]
    SessionTerminated,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DriverError {
    /// Whether the session is gone and should be restarted rather than retried.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DriverError::Spawn { .. } | DriverError::StdinUnwritable | DriverError::SessionTerminated
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_error_names_executable() {
        let err = DriverError::Spawn {
            executable: "aider".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
        };
        assert_eq!(
            err.to_string(),
            "failed to spawn 'aider': No such file or directory"
        );
        assert!(err.is_terminal());
    }

    #[test]
    fn stream_unavailable_is_not_terminal() {
        assert!(!DriverError::StreamUnavailable.is_terminal());
    }
}
