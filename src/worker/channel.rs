use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::protocol::{LineFramer, WorkerCommand, WorkerEvent};
use crate::awp_config::LiteratureProvider;
use crate::chapter::{Chapter, join_ids};
use crate::errors::PipelineError;

/// Upper bound on retained stderr, in bytes. Older output is dropped first.
const MAX_DIAGNOSTICS: usize = 64 * 1024;
const READ_CHUNK: usize = 4096;

/// How the worker should interact with its controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionMode {
    /// Decisions arrive as single lines on stdin
    Line,
    /// The worker owns the terminal and never pauses for decisions
    PassThrough,
}

impl fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionMode::Line => write!(f, "line"),
            InteractionMode::PassThrough => write!(f, "pass-through"),
        }
    }
}

/// Everything needed to launch one worker process.
#[derive(Debug, Clone)]
pub struct WorkerInvocation {
    pub command: String,
    pub args: Vec<String>,
    pub chapters: Vec<Chapter>,
    pub interaction: InteractionMode,
    pub literature: LiteratureProvider,
    pub resume: bool,
    pub cwd: PathBuf,
    pub envs: Vec<(String, String)>,
}

impl WorkerInvocation {
    /// Full argument list passed to the worker, configured args first.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        args.push("--chapters".to_string());
        args.push(join_ids(&self.chapters));
        args.push("--interaction".to_string());
        args.push(self.interaction.to_string());
        args.push("--literature".to_string());
        args.push(self.literature.to_string());
        if self.resume {
            args.push("--resume".to_string());
        }
        args
    }
}

/// The controller's view of a running worker.
///
/// Output is a single-consumer, non-restartable sequence of events; once
/// `next_event` returns `None` the stream is over.
#[async_trait]
pub trait WorkerLink: Send {
    /// Write one command line to the worker's stdin.
    async fn send(&mut self, command: WorkerCommand) -> Result<(), PipelineError>;

    /// Next complete output event, or `None` once stdout has closed.
    async fn next_event(&mut self) -> Option<WorkerEvent>;

    /// Drop events already received but not yet read, without waiting.
    /// Returns how many were dropped.
    fn discard_pending(&mut self) -> usize;

    /// Terminate the worker and wait until it has exited.
    async fn kill(&mut self) -> Result<(), PipelineError>;

    /// Close stdin and wait for a normal exit. A nonzero exit is a
    /// [`PipelineError::WorkerFailure`] carrying captured stderr.
    async fn finish(&mut self) -> Result<(), PipelineError>;

    /// Stderr captured so far.
    fn diagnostics(&self) -> String;
}

/// Spawns a worker, returning its link. Boxed so the orchestrator can be
/// driven by an in-memory worker in tests.
#[async_trait]
pub trait WorkerSpawner: Send + Sync {
    async fn spawn(
        &self,
        invocation: &WorkerInvocation,
    ) -> Result<Box<dyn WorkerLink>, PipelineError>;
}

/// Spawns real worker processes.
pub struct ProcessSpawner;

#[async_trait]
impl WorkerSpawner for ProcessSpawner {
    async fn spawn(
        &self,
        invocation: &WorkerInvocation,
    ) -> Result<Box<dyn WorkerLink>, PipelineError> {
        Ok(Box::new(WorkerChannel::spawn(invocation)?))
    }
}

/// A worker child process with piped stdio.
pub struct WorkerChannel {
    child: Child,
    stdin: Option<ChildStdin>,
    events: mpsc::UnboundedReceiver<WorkerEvent>,
    reader: JoinHandle<()>,
    stderr_task: JoinHandle<()>,
    stderr: Arc<Mutex<String>>,
    stderr_drained: bool,
    terminated: bool,
}

impl WorkerChannel {
    pub fn spawn(invocation: &WorkerInvocation) -> Result<Self, PipelineError> {
        let args = invocation.build_args();
        debug!(command = %invocation.command, args = ?args, "spawning worker");

        let mut cmd = Command::new(&invocation.command);
        cmd.args(&args)
            .current_dir(&invocation.cwd)
            .envs(invocation.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a terminal Ctrl-C reaches only the controller
        // and shutdown stays ordered
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| PipelineError::WorkerSpawnFailure {
            command: invocation.command.clone(),
            source,
        })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take().ok_or_else(|| {
            PipelineError::ProtocolViolation("worker stdout was not captured".to_string())
        })?;
        let stderr_pipe = child.stderr.take().ok_or_else(|| {
            PipelineError::ProtocolViolation("worker stderr was not captured".to_string())
        })?;

        let (tx, events) = mpsc::unbounded_channel();
        let reader = tokio::spawn(async move {
            let mut stdout = stdout;
            let mut framer = LineFramer::new();
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        for event in framer.push(&buf[..n]) {
                            if tx.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("error reading worker stdout: {}", e);
                        break;
                    }
                }
            }
            if let Some(event) = framer.finish() {
                let _ = tx.send(event);
            }
        });

        let stderr = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&stderr);
        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr_pipe);
            let mut line = Vec::new();
            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let text = String::from_utf8_lossy(&line);
                        let text = text.trim_end_matches(['\n', '\r']);
                        debug!(target: "awp::worker", "{}", text);
                        append_diagnostics(&sink, text);
                    }
                    Err(e) => {
                        warn!("error reading worker stderr: {}", e);
                        // Keep the pipe open so the worker never writes into a closed one
                        let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
                        break;
                    }
                }
            }
        });

        Ok(Self {
            child,
            stdin,
            events,
            reader,
            stderr_task,
            stderr,
            stderr_drained: false,
            terminated: false,
        })
    }
}

/// Append one stderr line, keeping only the newest `MAX_DIAGNOSTICS` bytes.
fn append_diagnostics(sink: &Mutex<String>, line: &str) {
    let Ok(mut buf) = sink.lock() else {
        return;
    };
    buf.push_str(line);
    buf.push('\n');
    if buf.len() > MAX_DIAGNOSTICS {
        let mut cut = buf.len() - MAX_DIAGNOSTICS;
        while !buf.is_char_boundary(cut) {
            cut += 1;
        }
        buf.drain(..cut);
    }
}

#[async_trait]
impl WorkerLink for WorkerChannel {
    async fn send(&mut self, command: WorkerCommand) -> Result<(), PipelineError> {
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            PipelineError::ProtocolViolation(format!(
                "cannot send '{}': worker stdin is closed",
                command
            ))
        })?;
        let line = format!("{}\n", command.to_line());
        let write = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.flush().await
        };
        write.await.map_err(|e| {
            PipelineError::ProtocolViolation(format!(
                "failed to send '{}' to worker: {}",
                command, e
            ))
        })?;
        debug!(command = %command, "sent to worker");
        Ok(())
    }

    async fn next_event(&mut self) -> Option<WorkerEvent> {
        if self.terminated {
            return None;
        }
        self.events.recv().await
    }

    fn discard_pending(&mut self) -> usize {
        let mut dropped = 0;
        while self.events.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }

    async fn kill(&mut self) -> Result<(), PipelineError> {
        self.terminated = true;
        self.stdin.take();
        self.reader.abort();
        self.events.close();
        if let Err(e) = self.child.start_kill() {
            // Already exited
            debug!("worker kill: {}", e);
        }
        self.child.wait().await.map_err(|e| PipelineError::WorkerFailure {
            exit_code: None,
            diagnostics: format!("failed to wait for killed worker: {}", e),
        })?;
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), PipelineError> {
        // Dropping stdin delivers EOF
        self.stdin.take();
        let status = self.child.wait().await.map_err(|e| PipelineError::WorkerFailure {
            exit_code: None,
            diagnostics: format!("failed to wait for worker: {}", e),
        })?;
        // Pipes close on exit, so both drains finish promptly
        if !self.stderr_drained {
            let _ = (&mut self.stderr_task).await;
            self.stderr_drained = true;
        }
        self.terminated = true;

        if status.success() {
            Ok(())
        } else {
            Err(PipelineError::WorkerFailure {
                exit_code: status.code(),
                diagnostics: self.diagnostics(),
            })
        }
    }

    fn diagnostics(&self) -> String {
        self.stderr
            .lock()
            .map(|buf| buf.trim_end().to_string())
            .unwrap_or_default()
    }
}
