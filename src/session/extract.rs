//! Session metadata scraped from aider's output.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::prompt;

/// Suffix aider appends to files loaded with `--read`.
pub const READ_ONLY_MARKER: &str = " (read only)";

#[allow(clippy::expect_used)]
static SESSION_COST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Tokens:.*?\$(\d+(?:\.\d+)?) session\.")
        .expect("cost pattern should compile")
});

/// The running session cost from the last cost report in `text`, if any.
///
/// Matches both `Tokens: $1.10 session.` and aider's full report line,
/// `Tokens: 2.1k sent, 95 received. Cost: $0.01 message, $1.10 session.`
pub fn last_session_cost(text: &str) -> Option<f64> {
    SESSION_COST
        .captures_iter(text)
        .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
        .last()
}

/// Files aider reported as loaded into the chat at startup.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileListing {
    pub read_only: BTreeSet<String>,
    pub editable: BTreeSet<String>,
}

/// Parse the startup output (everything up to the first prompt).
///
/// Aider prints its banner, a blank line, then one line per loaded file
/// right before the first prompt. Output that starts with a blank line has
/// no banner, so the listing begins immediately after it. Lines that look
/// like a prompt end the listing.
pub fn parse_file_listing(output: &str) -> FileListing {
    let lines: Vec<&str> = output.split('\n').collect();
    let region = match lines.iter().position(|l| l.trim().is_empty()) {
        Some(blank) => &lines[blank + 1..],
        None => &lines[..],
    };

    let mut listing = FileListing::default();
    for line in region {
        if prompt::is_prompt(line) {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(path) = line.strip_suffix(READ_ONLY_MARKER) {
            listing.read_only.insert(path.trim_end().to_string());
        } else {
            listing.editable.insert(line.to_string());
        }
    }
    listing
}
