//! Running one toolchain step
//!
//! Output is read line by line on two reader threads and forwarded to the
//! `quantlab::toolchain` tracing target as it arrives. The last lines are
//! kept so a failure can be reported with context.

use crate::errors::QuantlabError;
use quantlab_config::ToolchainCommand;
use quantlab_logger::TOOLCHAIN_TARGET;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const OUTPUT_TAIL_LINES: usize = 200;
const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long to keep draining output after the child exits
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Shared flag a caller sets to stop a running build
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Bounded buffer of the most recent output lines
#[derive(Debug, Default)]
pub struct OutputTail {
    lines: VecDeque<String>,
}

impl OutputTail {
    pub fn push(&mut self, line: String) {
        if self.lines.len() == OUTPUT_TAIL_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn extend(&mut self, other: OutputTail) {
        for line in other.lines {
            self.push(line);
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn render(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Run `command` in `cwd` until it exits, the deadline passes or `cancel`
/// is set
pub fn run_step(
    command: &ToolchainCommand,
    cwd: &Path,
    deadline: Option<Instant>,
    cancel: &CancelToken,
) -> Result<(ExitStatus, OutputTail), QuantlabError> {
    tracing::info!(command = %command.display(), cwd = %cwd.display(), "Running toolchain step");
    let mut child = Command::new(&command.program)
        .args(&command.args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            QuantlabError::BuildFailed {
                message: format!("could not start {}: {}", command.display(), e),
                output: String::new(),
            }
        })?;

    let (tx, rx) = mpsc::channel();
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, Stream::Stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, Stream::Stderr, tx.clone()));
    }
    drop(tx);

    let mut tail = OutputTail::default();
    let status = loop {
        forward_available(&rx, &mut tail, POLL_INTERVAL);

        let stop_reason = if cancel.is_cancelled() {
            Some("cancelled".to_string())
        } else if deadline.is_some_and(|d| Instant::now() >= d) {
            Some("timed out".to_string())
        } else {
            None
        };
        if let Some(reason) = stop_reason {
            tracing::warn!(command = %command.display(), reason = %reason, "Stopping toolchain");
            if let Err(e) = child.kill() {
                tracing::debug!(error = %e, "Kill failed; child may have exited");
            }
            if let Err(e) = child.wait() {
                tracing::debug!(error = %e, "Reaping stopped toolchain failed");
            }
            // Readers are left to finish on their own; a surviving grandchild
            // may keep the pipes open
            drop(readers);
            return Err(QuantlabError::BuildCancelled(format!("{} {}", command.display(), reason)));
        }

        if let Some(status) = child.try_wait()? {
            break status;
        }
    };

    // Grandchildren can hold the pipes open after the child exits
    let drain_until = Instant::now() + DRAIN_GRACE;
    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok((stream, line)) => emit(stream, line, &mut tail),
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) if Instant::now() >= drain_until => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
    if readers.iter().all(|r| r.is_finished()) {
        join_readers(readers);
    }

    tracing::debug!(command = %command.display(), %status, "Toolchain step finished");
    Ok((status, tail))
}

fn spawn_reader<R: Read + Send + 'static>(
    source: R,
    stream: Stream,
    tx: Sender<(Stream, String)>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let reader = BufReader::new(source);
        for line in reader.lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send((stream, line)).is_err() {
                break;
            }
        }
    })
}

fn forward_available(rx: &Receiver<(Stream, String)>, tail: &mut OutputTail, wait: Duration) {
    match rx.recv_timeout(wait) {
        Ok((stream, line)) => {
            emit(stream, line, tail);
            while let Ok((stream, line)) = rx.try_recv() {
                emit(stream, line, tail);
            }
        }
        Err(RecvTimeoutError::Disconnected) => thread::sleep(wait),
        Err(RecvTimeoutError::Timeout) => {}
    }
}

fn emit(stream: Stream, line: String, tail: &mut OutputTail) {
    match stream {
        Stream::Stdout => tracing::info!(target: TOOLCHAIN_TARGET, stream = "stdout", "{}", line),
        Stream::Stderr => tracing::info!(target: TOOLCHAIN_TARGET, stream = "stderr", "{}", line),
    }
    tail.push(line);
}

fn join_readers(readers: Vec<thread::JoinHandle<()>>) {
    for reader in readers {
        if reader.join().is_err() {
            tracing::debug!("Toolchain output reader panicked");
        }
    }
}
