//! Record and replay aider sessions.
//!
//! A transcript (`.vcr` file) captures the traffic of one session:
//!
//! ```text
//! {"_vcr":"header","command":["aider","--no-pretty","--no-fancy-input"]}
//! < "Aider v0.75.1\n\n> "
//! > /help
//! < "/add  Add files to the chat...\n> "
//! ```
//!
//! `<` lines are stdout chunks (JSON strings, exactly as read), `>` lines are
//! lines written to stdin. Replaying feeds the chunks to a driver attached to
//! in-memory pipes, checking each stdin line against the recording.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context as TaskContext, Poll};

use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf, duplex};
use tokio::task::JoinHandle;

use crate::session::buffer::Utf8Decoder;
use crate::session::process::{self, AiderProcess, StartOptions};

const HEADER_TAG: &str = "header";
const PIPE_CAPACITY: usize = 64 * 1024;

/// Test case definition loaded from a `.toml` file next to its `.vcr`.
#[derive(Debug, Deserialize, Default)]
pub struct TestCase {
    /// Arguments passed to aider.
    #[serde(default)]
    pub args: Vec<String>,
    /// Messages sent in order, each followed by a wait for the next prompt.
    #[serde(default)]
    pub messages: Vec<String>,
    /// Files to create in the working directory before recording.
    #[serde(default)]
    pub files: HashMap<String, String>,
}

impl TestCase {
    pub fn start_options(&self, working_dir: &Path) -> StartOptions {
        StartOptions::new(working_dir).args(self.args.iter().cloned())
    }

    /// The command line a recording of this case must have been made with.
    pub fn expected_command(&self) -> Vec<String> {
        self.start_options(Path::new(".")).command_line()
    }
}

/// First line of every `.vcr` file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TranscriptHeader {
    #[serde(rename = "_vcr")]
    pub vcr: String,
    pub command: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A chunk read from stdout.
    Output(String),
    /// A line written to stdin, without its newline.
    Input(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub header: TranscriptHeader,
    pub entries: Vec<Entry>,
}

impl Transcript {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            header: TranscriptHeader {
                vcr: HEADER_TAG.to_string(),
                command,
            },
            entries: Vec::new(),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines();
        let first = lines.next().context("transcript is empty")?;
        let header: TranscriptHeader =
            serde_json::from_str(first).context("first line should be a transcript header")?;
        ensure!(
            header.vcr == HEADER_TAG,
            "unexpected header tag {:?}",
            header.vcr
        );

        let mut entries = Vec::new();
        for (i, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(json) = line.strip_prefix("< ") {
                let chunk: String = serde_json::from_str(json)
                    .with_context(|| format!("line {}: invalid output chunk", i + 2))?;
                entries.push(Entry::Output(chunk));
            } else if let Some(input) = line.strip_prefix("> ") {
                entries.push(Entry::Input(input.to_string()));
            } else if line == ">" {
                entries.push(Entry::Input(String::new()));
            } else {
                bail!("line {}: expected '< ' or '> ', got {line:?}", i + 2);
            }
        }
        Ok(Self { header, entries })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_string())
            .with_context(|| format!("failed to write {}", path.display()))
    }

    /// Lines sent to stdin, in order.
    pub fn inputs(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                Entry::Input(line) => Some(line.as_str()),
                Entry::Output(_) => None,
            })
            .collect()
    }

    /// All stdout, concatenated.
    pub fn output(&self) -> String {
        self.entries
            .iter()
            .filter_map(|e| match e {
                Entry::Output(chunk) => Some(chunk.as_str()),
                Entry::Input(_) => None,
            })
            .collect()
    }

    /// Start a driver that replays this transcript.
    ///
    /// `options` must produce the recorded command line. The returned
    /// [`Replay`] resolves once the driver is dropped, reporting any stdin
    /// line that did not match the recording.
    pub async fn replay(&self, options: StartOptions) -> Result<(AiderProcess, Replay)> {
        let command = options.command_line();
        ensure!(
            command == self.header.command,
            "transcript was recorded with {:?}, replaying with {command:?}",
            self.header.command
        );

        let (driver_stdin, aider_stdin) = duplex(PIPE_CAPACITY);
        let (aider_stdout, driver_stdout) = duplex(PIPE_CAPACITY);
        let task = tokio::spawn(play(self.entries.clone(), aider_stdout, aider_stdin));
        let process = AiderProcess::attach(driver_stdin, driver_stdout, options)
            .await
            .context("replayed session failed to start")?;
        Ok((process, Replay { task }))
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = serde_json::to_string(&self.header).map_err(|_| fmt::Error)?;
        writeln!(f, "{header}")?;
        for entry in &self.entries {
            match entry {
                Entry::Output(chunk) => {
                    let json = serde_json::to_string(chunk).map_err(|_| fmt::Error)?;
                    writeln!(f, "< {json}")?;
                }
                Entry::Input(line) => writeln!(f, "> {line}")?,
            }
        }
        Ok(())
    }
}

/// A transcript being played back to an attached driver.
pub struct Replay {
    task: JoinHandle<Result<()>>,
}

impl Replay {
    /// Wait for playback to end. Drop the driver first, or this never returns.
    pub async fn finish(self) -> Result<()> {
        self.task.await.context("replay task panicked")?
    }
}

async fn play<W, R>(entries: Vec<Entry>, mut stdout: W, stdin: R) -> Result<()>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    let mut stdin = BufReader::new(stdin);
    let mut line = String::new();
    for entry in entries {
        match entry {
            Entry::Output(chunk) => {
                stdout.write_all(chunk.as_bytes()).await?;
                stdout.flush().await?;
            }
            Entry::Input(expected) => {
                line.clear();
                if stdin.read_line(&mut line).await? == 0 {
                    bail!("driver closed stdin before sending {expected:?}");
                }
                let got = line.strip_suffix('\n').unwrap_or(&line);
                ensure!(
                    got == expected,
                    "expected stdin line {expected:?}, got {got:?}"
                );
            }
        }
    }

    // Sit at the final prompt like aider would until the driver goes away.
    line.clear();
    if stdin.read_line(&mut line).await? != 0 {
        bail!(
            "unexpected stdin line after end of transcript: {:?}",
            line.trim_end()
        );
    }
    Ok(())
}

/// Captures a live session's traffic as it happens.
#[derive(Clone, Default)]
pub struct Recorder {
    entries: Arc<Mutex<Vec<Entry>>>,
}

impl Recorder {
    fn push(&self, entry: Entry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// Spawn aider with its stdio tapped by this recorder.
    pub async fn start(&self, options: StartOptions) -> Result<AiderProcess> {
        let (child, stdin, stdout) = process::spawn_child(&options)?;
        let stdin = TeeWriter {
            inner: stdin,
            pending: Vec::new(),
            recorder: self.clone(),
        };
        let stdout = TeeReader {
            inner: stdout,
            decoder: Utf8Decoder::new(),
            recorder: self.clone(),
        };
        Ok(AiderProcess::start_with(options, child, stdin, stdout).await?)
    }

    /// Everything captured so far, under a header for `command`.
    pub fn transcript(&self, command: Vec<String>) -> Transcript {
        let mut transcript = Transcript::new(command);
        transcript.entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        transcript
    }
}

/// Records every chunk read through it as an output entry.
struct TeeReader<R> {
    inner: R,
    decoder: Utf8Decoder,
    recorder: Recorder,
}

impl<R: AsyncRead + Unpin> AsyncRead for TeeReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let this = &mut *self;
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let read = &buf.filled()[before..];
            let text = if read.is_empty() {
                this.decoder.finish()
            } else {
                this.decoder.decode(read)
            };
            if !text.is_empty() {
                this.recorder.push(Entry::Output(text));
            }
        }
        poll
    }
}

/// Records every complete line written through it as an input entry.
struct TeeWriter<W> {
    inner: W,
    pending: Vec<u8>,
    recorder: Recorder,
}

impl<W> TeeWriter<W> {
    fn record(&mut self, written: &[u8]) {
        self.pending.extend_from_slice(written);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
            self.recorder.push(Entry::Input(text));
        }
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for TeeWriter<W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            this.record(&buf[..*n]);
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
