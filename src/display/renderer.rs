use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::Path;

use crossterm::queue;
use crossterm::style::Print;

use super::theme;

/// Writes session output for the CLI, styled with the terminal palette.
pub struct Renderer<W: Write = io::Stdout> {
    /// Cost shown by the last `render_cost`, to avoid repeating it.
    last_cost: Option<f64>,
    out: W,
}

impl<W: Write> Renderer<W> {
    pub fn with_writer(writer: W) -> Self {
        Self {
            last_cost: None,
            out: writer,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn render_session_header(&mut self, working_dir: &Path, command: &[String]) {
        let header = format!("{} · {}", working_dir.display(), command.join(" "));
        queue!(self.out, Print(theme::dim().apply(header)), Print("\n")).ok();
        self.out.flush().ok();
    }

    /// List the files aider loaded at startup.
    pub fn render_files(&mut self, read_only: &BTreeSet<String>, editable: &BTreeSet<String>) {
        if read_only.is_empty() && editable.is_empty() {
            queue!(self.out, Print(theme::dim().apply("no files in chat")), Print("\n")).ok();
        }
        for path in editable {
            queue!(
                self.out,
                Print(theme::editable_file().apply("  edit  ")),
                Print(path),
                Print("\n"),
            )
            .ok();
        }
        for path in read_only {
            queue!(
                self.out,
                Print(theme::read_only_file().apply("  read  ")),
                Print(path),
                Print("\n"),
            )
            .ok();
        }
        self.out.flush().ok();
    }

    /// Print one prompt-delimited segment; the trailing prompt is highlighted.
    pub fn render_output(&mut self, segment: &str) {
        let (body, prompt) = match segment.rfind('\n') {
            Some(i) => segment.split_at(i + 1),
            None => ("", segment),
        };
        queue!(self.out, Print(body), Print(theme::prompt_style().apply(prompt))).ok();
        self.out.flush().ok();
    }

    /// Print raw streamed output as it arrives.
    pub fn render_chunk(&mut self, text: &str) {
        queue!(self.out, Print(text)).ok();
        self.out.flush().ok();
    }

    /// Show the running session cost if it changed since last shown.
    pub fn render_cost(&mut self, cost: f64) {
        if self.last_cost.is_some_and(|last| (last - cost).abs() < f64::EPSILON) {
            return;
        }
        self.last_cost = Some(cost);
        let line = format!("  ${cost:.2} session");
        queue!(self.out, Print("\n"), Print(theme::cost_line().apply(line)), Print("\n")).ok();
        self.out.flush().ok();
    }

    pub fn render_warning(&mut self, message: &str) {
        queue!(
            self.out,
            Print(theme::error().apply(format!("warning: {message}"))),
            Print("\n"),
        )
        .ok();
        self.out.flush().ok();
    }
}
