use std::collections::BTreeSet;

use super::extract::{self, FileListing};
use crate::prompt::{self, PromptKind};

/// Tracks metadata derived from aider's output across a session.
#[derive(Debug, Default, Clone)]
pub struct SessionState {
    pub status: SessionStatus,
    /// Running session cost in USD, from the last cost report aider printed.
    pub total_cost_usd: f64,
    /// Files loaded with `--read`, reported at startup.
    pub read_only_files: BTreeSet<String>,
    /// Files loaded for editing, reported at startup.
    pub editable_files: BTreeSet<String>,
    /// Prompt boundaries observed so far, including the startup prompt.
    pub prompts_seen: usize,
    /// The prompt the most recent boundary ended in.
    pub last_prompt: Option<PromptKind>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    #[default]
    Starting,
    Ready,
    Terminated,
}

impl SessionState {
    /// Update cost and prompt bookkeeping from the output of one boundary.
    pub fn record_boundary(&mut self, segment: &str) {
        if let Some(cost) = extract::last_session_cost(segment) {
            self.total_cost_usd = cost;
        }
        self.prompts_seen += 1;
        self.last_prompt = prompt::classify(segment);
    }

    /// Install the startup file listing and mark the session ready.
    ///
    /// Has no effect on a terminated session.
    pub fn finish_startup(&mut self, listing: FileListing) {
        if self.status != SessionStatus::Starting {
            return;
        }
        self.read_only_files = listing.read_only;
        self.editable_files = listing.editable;
        self.status = SessionStatus::Ready;
    }

    pub fn is_terminated(&self) -> bool {
        self.status == SessionStatus::Terminated
    }
}
