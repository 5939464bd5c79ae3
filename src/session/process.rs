use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use super::buffer::{OutputBuffer, Utf8Decoder};
use super::extract;
use super::state::{SessionState, SessionStatus};
use crate::error::DriverError;

/// Flags appended to every launch so aider prints plain, parseable text.
pub const PLAIN_OUTPUT_ARGS: [&str; 2] = ["--no-pretty", "--no-fancy-input"];

const DEFAULT_EXECUTABLE: &str = "aider";
const READ_CHUNK_SIZE: usize = 8192;
const OUTPUT_CHANNEL_CAPACITY: usize = 1024;

/// Raw stdout chunks, in arrival order.
pub type OutputStream = BoxStream<'static, Vec<u8>>;

/// How to launch an aider session.
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Directory aider runs in.
    pub working_dir: PathBuf,
    /// Arguments passed to aider before the plain-output flags.
    pub args: Vec<String>,
    /// Program to run, resolved through `PATH`.
    pub executable: String,
}

impl StartOptions {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            args: Vec::new(),
            executable: DEFAULT_EXECUTABLE.to_string(),
        }
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Full argument list handed to the executable.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend(PLAIN_OUTPUT_ARGS.iter().map(ToString::to_string));
        args
    }

    /// Executable followed by its arguments.
    pub fn command_line(&self) -> Vec<String> {
        let mut cmd = vec![self.executable.clone()];
        cmd.extend(self.build_args());
        cmd
    }
}

/// One or more lines to write to aider's stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Line(String),
    Lines(Vec<String>),
}

impl Message {
    fn into_lines(self) -> Vec<String> {
        match self {
            Message::Line(line) => vec![line],
            Message::Lines(lines) => lines,
        }
    }
}

impl From<&str> for Message {
    fn from(line: &str) -> Self {
        Message::Line(line.to_string())
    }
}

impl From<String> for Message {
    fn from(line: String) -> Self {
        Message::Line(line)
    }
}

impl From<Vec<String>> for Message {
    fn from(lines: Vec<String>) -> Self {
        Message::Lines(lines)
    }
}

impl From<Vec<&str>> for Message {
    fn from(lines: Vec<&str>) -> Self {
        Message::Lines(lines.into_iter().map(ToString::to_string).collect())
    }
}

type Waiter = oneshot::Sender<Result<String, DriverError>>;
type Reply = oneshot::Receiver<Result<String, DriverError>>;

/// Await a registered waiter; a dropped sender means the session ended.
async fn resolve(reply: Reply) -> Result<String, DriverError> {
    reply.await.unwrap_or(Err(DriverError::SessionTerminated))
}

/// Session state shared between the handle and its stream tasks.
///
/// Every stdout chunk is applied under a single lock acquisition, so
/// boundary detection for one chunk never interleaves with another.
struct Shared {
    buffer: OutputBuffer,
    state: SessionState,
    waiters: VecDeque<Waiter>,
    output_tx: Option<broadcast::Sender<Vec<u8>>>,
}

impl Shared {
    fn new() -> Self {
        let (output_tx, _) = broadcast::channel(OUTPUT_CHANNEL_CAPACITY);
        Self {
            buffer: OutputBuffer::new(),
            state: SessionState::default(),
            waiters: VecDeque::new(),
            output_tx: Some(output_tx),
        }
    }

    fn push_output(&mut self, text: &str) {
        if self.state.is_terminated() {
            return;
        }
        if self.buffer.append(text) {
            let segment = self.buffer.drain();
            self.state.record_boundary(&segment);
            debug!(
                bytes = segment.len(),
                cost = self.state.total_cost_usd,
                prompt = ?self.state.last_prompt,
                "prompt boundary"
            );
            self.deliver(segment);
        }
    }

    /// Hand a completed segment to the oldest live waiter.
    ///
    /// With nobody waiting the segment is dropped; only `output_stream`
    /// subscribers see it.
    fn deliver(&mut self, mut segment: String) {
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.send(Ok(segment)) {
                Ok(()) => return,
                // Waiter gave up (e.g. timed out); try the next one.
                Err(Ok(returned)) => segment = returned,
                Err(Err(_)) => return,
            }
        }
        debug!(bytes = segment.len(), "discarding unclaimed output");
    }

    /// Queue a waiter for the next boundary.
    fn register_waiter(&mut self) -> Result<Reply, DriverError> {
        if self.state.is_terminated() {
            return Err(DriverError::SessionTerminated);
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.push_back(tx);
        Ok(rx)
    }

    fn terminate(&mut self) {
        if self.state.is_terminated() {
            return;
        }
        self.state.status = SessionStatus::Terminated;
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(DriverError::SessionTerminated));
        }
    }
}

fn lock_shared(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Where the child process handle currently lives.
enum ChildSlot {
    /// No process to signal: an attached session, or one already reaped.
    Detached,
    Running(Child),
    /// Moved out by [`AiderProcess::wait`]; signalled by pid until reaped.
    Reaping(u32),
}

/// A running aider process driven as request/response over its prompt.
///
/// Output is collected until it ends in a prompt; [`wait_for_prompt`]
/// returns everything printed since the previous prompt.
///
/// [`wait_for_prompt`]: AiderProcess::wait_for_prompt
pub struct AiderProcess {
    working_dir: PathBuf,
    executable: String,
    args: Vec<String>,
    child: Mutex<ChildSlot>,
    pid: Option<u32>,
    stdin_tx: mpsc::UnboundedSender<String>,
    shared: Arc<Mutex<Shared>>,
}

impl fmt::Debug for AiderProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiderProcess")
            .field("working_dir", &self.working_dir)
            .field("command", &self.command_line())
            .field("pid", &self.pid)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl AiderProcess {
    /// Spawn aider and wait until it shows its first prompt.
    ///
    /// The startup output is parsed for the loaded file listing before the
    /// handle is returned.
    pub async fn start(options: StartOptions) -> Result<Self, DriverError> {
        let (child, stdin, stdout) = spawn_child(&options)?;
        Self::start_with(options, child, stdin, stdout).await
    }

    /// Finish starting a spawned child whose stdio may be wrapped (e.g. for
    /// recording).
    pub(crate) async fn start_with<W, R>(
        options: StartOptions,
        child: Child,
        stdin: W,
        stdout: R,
    ) -> Result<Self, DriverError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let pid = child.id();
        let (process, startup) =
            Self::from_parts(options, ChildSlot::Running(child), pid, stdin, stdout);
        process.await_startup(startup).await?;
        Ok(process)
    }

    /// Drive an already-connected aider over arbitrary streams.
    ///
    /// `stdin` receives the lines sent to aider and `stdout` supplies its
    /// output. Used to replay recorded sessions; no process is owned, so
    /// [`stop`](Self::stop) only terminates the session.
    pub async fn attach<W, R>(stdin: W, stdout: R, options: StartOptions) -> Result<Self, DriverError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (process, startup) = Self::from_parts(options, ChildSlot::Detached, None, stdin, stdout);
        process.await_startup(startup).await?;
        Ok(process)
    }

    /// Wire up the stream tasks. The startup prompt's waiter is queued
    /// before the reader starts, so the first boundary always has a taker.
    fn from_parts<W, R>(
        options: StartOptions,
        child: ChildSlot,
        pid: Option<u32>,
        stdin: W,
        stdout: R,
    ) -> (Self, Reply)
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let mut shared = Shared::new();
        let (startup_tx, startup_rx) = oneshot::channel();
        shared.waiters.push_back(startup_tx);
        let shared = Arc::new(Mutex::new(shared));

        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_stdin(stdin, stdin_rx));
        tokio::spawn(read_stdout(stdout, Arc::clone(&shared)));
        let process = Self {
            args: options.build_args(),
            working_dir: options.working_dir,
            executable: options.executable,
            child: Mutex::new(child),
            pid,
            stdin_tx,
            shared,
        };
        (process, startup_rx)
    }

    async fn await_startup(&self, startup: Reply) -> Result<(), DriverError> {
        let startup = resolve(startup).await?;
        let listing = extract::parse_file_listing(&startup);
        info!(
            read_only = listing.read_only.len(),
            editable = listing.editable.len(),
            "aider ready"
        );
        let mut shared = self.lock();
        if shared.state.is_terminated() {
            return Err(DriverError::SessionTerminated);
        }
        shared.state.finish_startup(listing);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        lock_shared(&self.shared)
    }

    /// Write a line (or each of several lines, in order) to aider's stdin.
    ///
    /// Does not wait for aider to read it.
    pub fn send(&self, message: impl Into<Message>) -> Result<(), DriverError> {
        if self.lock().state.is_terminated() || self.stdin_tx.is_closed() {
            return Err(DriverError::StdinUnwritable);
        }
        for line in message.into().into_lines() {
            debug!(message = %line, "sending to aider");
            self.stdin_tx
                .send(format!("{line}\n"))
                .map_err(|_| DriverError::StdinUnwritable)?;
        }
        Ok(())
    }

    /// Send a message and wait for the prompt that follows its output.
    ///
    /// The wait is registered before the message is written, so a reply
    /// that arrives quickly is never missed.
    pub async fn send_and_wait(&self, message: impl Into<Message>) -> Result<String, DriverError> {
        // A terminated session fails here the same way a bare send would.
        let reply = self
            .lock()
            .register_waiter()
            .map_err(|_| DriverError::StdinUnwritable)?;
        self.send(message)?;
        resolve(reply).await
    }

    /// Wait for the next prompt and return the output that preceded it.
    ///
    /// Only output that reaches a prompt after this call is returned; a
    /// prompt nobody was waiting for is discarded. Concurrent callers are
    /// served in the order they started waiting. There is no timeout; wrap
    /// in `tokio::time::timeout` if aider might never prompt again.
    pub async fn wait_for_prompt(&self) -> Result<String, DriverError> {
        let reply = self.lock().register_waiter()?;
        resolve(reply).await
    }

    /// Subscribe to raw stdout chunks as they arrive.
    ///
    /// Independent of prompt batching: every chunk also reaches the
    /// internal buffer. Chunks that arrived before subscribing are not
    /// replayed. The stream ends, and stays ended, once stdout closes.
    pub fn output_stream(&self) -> Result<OutputStream, DriverError> {
        let rx = self
            .lock()
            .output_tx
            .as_ref()
            .ok_or(DriverError::StreamUnavailable)?
            .subscribe();
        let stream = stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(chunk) => return Some((chunk, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "output stream subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(stream.fuse()))
    }

    /// Ask aider to exit. Safe to call more than once.
    ///
    /// Sends SIGTERM (or kills the process on platforms without signals)
    /// and returns without waiting for the process to exit. Pending waits
    /// fail with [`DriverError::SessionTerminated`], even if signalling
    /// the process failed.
    pub fn stop(&self) -> Result<(), DriverError> {
        let signalled = self.signal_child();
        self.lock().terminate();
        signalled
    }

    fn signal_child(&self) -> Result<(), DriverError> {
        let mut slot = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        match &mut *slot {
            ChildSlot::Detached => Ok(()),
            ChildSlot::Running(child) => {
                if child.try_wait()?.is_some() {
                    return Ok(());
                }
                info!(pid = ?self.pid, "stopping aider");
                request_termination(child)
            }
            ChildSlot::Reaping(pid) => {
                info!(pid = *pid, "stopping aider while it is being reaped");
                signal_pid(*pid)
            }
        }
    }

    /// Wait for the process to exit and return its exit code.
    ///
    /// Returns `None` when there is no owned process, another call is
    /// already waiting, or the process was killed by a signal.
    pub async fn wait(&self) -> Result<Option<i32>, DriverError> {
        let mut child = {
            let mut slot = self.child.lock().unwrap_or_else(PoisonError::into_inner);
            match std::mem::replace(&mut *slot, ChildSlot::Detached) {
                ChildSlot::Running(child) => {
                    if let Some(pid) = child.id() {
                        *slot = ChildSlot::Reaping(pid);
                    }
                    child
                }
                other => {
                    *slot = other;
                    return Ok(None);
                }
            }
        };
        let status = child.wait().await;
        *self.child.lock().unwrap_or_else(PoisonError::into_inner) = ChildSlot::Detached;
        let status = status?;
        self.lock().terminate();
        info!(code = ?status.code(), "aider exited");
        Ok(status.code())
    }

    /// Output received since the last prompt, without consuming it.
    pub fn buffer(&self) -> String {
        self.lock().buffer.peek().to_string()
    }

    /// Output received since the last prompt; the buffer is cleared.
    pub fn take_buffer(&self) -> String {
        self.lock().buffer.drain()
    }

    /// Running session cost in USD as last reported by aider.
    pub fn cost(&self) -> f64 {
        self.lock().state.total_cost_usd
    }

    pub fn read_only_files(&self) -> BTreeSet<String> {
        self.lock().state.read_only_files.clone()
    }

    pub fn editable_files(&self) -> BTreeSet<String> {
        self.lock().state.editable_files.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.lock().state.status
    }

    /// Snapshot of the session metadata.
    pub fn state(&self) -> SessionState {
        self.lock().state.clone()
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Arguments aider was launched with, including the plain-output flags.
    pub fn launch_args(&self) -> &[String] {
        &self.args
    }

    /// Executable followed by its arguments.
    pub fn command_line(&self) -> Vec<String> {
        let mut cmd = vec![self.executable.clone()];
        cmd.extend(self.args.iter().cloned());
        cmd
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

/// Spawn the executable with piped stdio; stderr is forwarded to the log.
pub(crate) fn spawn_child(
    options: &StartOptions,
) -> Result<(Child, ChildStdin, ChildStdout), DriverError> {
    let args = options.build_args();
    info!(
        executable = %options.executable,
        cwd = %options.working_dir.display(),
        ?args,
        "starting aider"
    );

    let mut child = Command::new(&options.executable)
        .args(&args)
        .current_dir(&options.working_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| DriverError::Spawn {
            executable: options.executable.clone(),
            source,
        })?;

    let stdin = child.stdin.take().ok_or(DriverError::StdinUnwritable)?;
    let stdout = child.stdout.take().ok_or(DriverError::StreamUnavailable)?;
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(log_stderr(stderr));
    }
    Ok((child, stdin, stdout))
}

#[cfg(unix)]
fn request_termination(child: &mut Child) -> Result<(), DriverError> {
    match child.id() {
        Some(pid) => signal_pid(pid),
        None => Ok(()),
    }
}

#[cfg(unix)]
fn signal_pid(pid: u32) -> Result<(), DriverError> {
    // SAFETY: sending a signal to a pid we spawned and have not reaped.
    if unsafe { libc::kill(pid.cast_signed(), libc::SIGTERM) } != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err.into());
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) -> Result<(), DriverError> {
    child.start_kill()?;
    Ok(())
}

#[cfg(not(unix))]
fn signal_pid(pid: u32) -> Result<(), DriverError> {
    warn!(pid, "cannot stop aider while another task is waiting on it");
    Ok(())
}

async fn write_stdin<W: AsyncWrite + Unpin>(mut stdin: W, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = rx.recv().await {
        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        }
        .await;
        if let Err(e) = written {
            warn!(error = %e, "failed to write to aider stdin");
            break;
        }
    }
}

async fn read_stdout<R: AsyncRead + Unpin>(mut stdout: R, shared: Arc<Mutex<Shared>>) {
    let mut decoder = Utf8Decoder::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = match stdout.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "failed to read aider stdout");
                break;
            }
        };
        let text = decoder.decode(&chunk[..n]);
        let mut shared = lock_shared(&shared);
        if let Some(tx) = &shared.output_tx {
            // No subscribers is fine.
            let _ = tx.send(chunk[..n].to_vec());
        }
        shared.push_output(&text);
    }

    let mut shared = lock_shared(&shared);
    let rest = decoder.finish();
    if !rest.is_empty() {
        shared.push_output(&rest);
    }
    shared.output_tx = None;
    shared.terminate();
    debug!("aider stdout closed");
}

async fn log_stderr<R: AsyncRead + Unpin>(mut stderr: R) {
    let mut decoder = Utf8Decoder::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    while let Ok(n) = stderr.read(&mut chunk).await {
        if n == 0 {
            break;
        }
        let text = decoder.decode(&chunk[..n]);
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            debug!(target: "aider::stderr", "{line}");
        }
    }
}
