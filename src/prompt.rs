//! Prompt boundary detection for aider's plain-text output.
//!
//! With `--no-pretty --no-fancy-input`, aider ends every batch of output with
//! one of a handful of prompts and then blocks reading a line from stdin.
//! Every pattern here is anchored to the end of the *whole* accumulated
//! buffer: a prompt only counts as a boundary when nothing follows it.

use std::sync::LazyLock;

use regex::Regex;

/// Which prompt the output ended in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptKind {
    /// `(Y)es/(N)o/(A)ll/(S)kip all/(D)on't ask again [Yes]:`
    ConfirmAll,
    /// `(Y)es/(N)o/(D)on't ask again [Yes]:`
    Confirm,
    /// `(y/n): `
    YesNo,
    /// The regular command prompt, e.g. `> ` or `architect> `.
    Input {
        /// Chat mode shown before `>`, if any.
        mode: Option<String>,
    },
}

impl PromptKind {
    /// Whether this prompt asks a question rather than waiting for a command.
    pub fn is_confirmation(&self) -> bool {
        !matches!(self, PromptKind::Input { .. })
    }
}

#[allow(clippy::expect_used)]
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("prompt pattern should compile")
}

static CONFIRM_ALL: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\(Y\)es/\(N\)o/\(A\)ll/\(S\)kip all/\(D\)on't ask again \[.*\]: ?$")
});

static CONFIRM: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\(Y\)es/\(N\)o/\(D\)on't ask again \[.*\]: ?$"));

static YES_NO: LazyLock<Regex> = LazyLock::new(|| compile(r"\(y/n\): $"));

static INPUT: LazyLock<Regex> = LazyLock::new(|| compile(r"> $"));

/// Classify the prompt `text` ends in, if any.
///
/// Patterns are tried most specific first, so a confirmation whose default
/// happens to render as `> ` is still reported as a confirmation.
pub fn classify(text: &str) -> Option<PromptKind> {
    if text.is_empty() {
        return None;
    }
    if CONFIRM_ALL.is_match(text) {
        return Some(PromptKind::ConfirmAll);
    }
    if CONFIRM.is_match(text) {
        return Some(PromptKind::Confirm);
    }
    if YES_NO.is_match(text) {
        return Some(PromptKind::YesNo);
    }
    if INPUT.is_match(text) {
        return Some(PromptKind::Input {
            mode: input_mode(text),
        });
    }
    None
}

/// Whether `text` ends in a recognized prompt.
pub fn is_prompt(text: &str) -> bool {
    classify(text).is_some()
}

/// `text` without a trailing command prompt line.
///
/// Confirmation prompts are kept: they share a line with their question.
pub fn strip_input_prompt(text: &str) -> &str {
    if !matches!(classify(text), Some(PromptKind::Input { .. })) {
        return text;
    }
    match text.rfind('\n') {
        Some(i) => &text[..=i],
        None => "",
    }
}

/// The command prompt aider shows for `mode`.
pub fn input_prompt(mode: Option<&str>) -> String {
    match mode {
        Some(mode) => format!("{mode}> "),
        None => "> ".to_string(),
    }
}

/// Extract the mode name from the last line of an input prompt.
fn input_mode(text: &str) -> Option<String> {
    let last_line = text.rsplit('\n').next().unwrap_or(text);
    let mode = last_line.strip_suffix("> ")?.trim();
    (!mode.is_empty()).then(|| mode.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_not_a_prompt() {
        assert!(!is_prompt(""));
        assert_eq!(classify(""), None);
    }

    #[test]
    fn confirm_all_at_end() {
        let text = "Add file to the chat? (Y)es/(N)o/(A)ll/(S)kip all/(D)on't ask again [Yes]:";
        assert_eq!(classify(text), Some(PromptKind::ConfirmAll));
    }

    #[test]
    fn confirm_all_with_trailing_space() {
        let text = "Create new file? (Y)es/(N)o/(A)ll/(S)kip all/(D)on't ask again [No]: ";
        assert_eq!(classify(text), Some(PromptKind::ConfirmAll));
    }

    #[test]
    fn confirm_without_skip() {
        let text = "Run shell command? (Y)es/(N)o/(D)on't ask again [Yes]:";
        assert_eq!(classify(text), Some(PromptKind::Confirm));
    }

    #[test]
    fn yes_no() {
        assert_eq!(classify("Edit the files? (y/n): "), Some(PromptKind::YesNo));
    }

    #[test]
    fn bare_input_prompt() {
        assert_eq!(
            classify("some output\n> "),
            Some(PromptKind::Input { mode: None })
        );
    }

    #[test]
    fn input_prompt_with_mode() {
        assert_eq!(
            classify("docs/plan.md\narchitect> "),
            Some(PromptKind::Input {
                mode: Some("architect".to_string())
            })
        );
    }

    #[test]
    fn prompt_in_the_middle_does_not_match() {
        assert!(!is_prompt("architect> \nstill thinking..."));
        assert!(!is_prompt("Edit the files? (y/n): yes, editing"));
        assert!(!is_prompt(
            "(Y)es/(N)o/(D)on't ask again [Yes]:\nApplying edit"
        ));
    }

    #[test]
    fn prompt_without_trailing_space_is_incomplete() {
        assert!(!is_prompt("architect>"));
        assert!(!is_prompt("(y/n):"));
    }

    #[test]
    fn strip_input_prompt_keeps_body() {
        assert_eq!(strip_input_prompt("answer\narchitect> "), "answer\n");
        assert_eq!(strip_input_prompt("> "), "");
        assert_eq!(strip_input_prompt("no prompt here"), "no prompt here");
        let confirm = "Add file? (y/n): ";
        assert_eq!(strip_input_prompt(confirm), confirm);
    }

    #[test]
    fn input_prompt_rendering() {
        assert_eq!(input_prompt(Some("ask")), "ask> ");
        assert_eq!(input_prompt(None), "> ");
        assert!(is_prompt(&input_prompt(Some("ask"))));
    }

    #[test]
    fn confirmation_flag() {
        assert!(PromptKind::YesNo.is_confirmation());
        assert!(!PromptKind::Input { mode: None }.is_confirmation());
    }
}
