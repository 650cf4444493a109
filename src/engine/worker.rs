// Background consumer of a conversion's diagnostic stream

use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;
use std::sync::mpsc::{self, SendError, Sender};
use std::thread::{self, JoinHandle};

use tracing::{trace, warn};

use super::core::JobId;
use super::process::ExitWaiter;

/// Notify a host event loop that messages are waiting.
/// Called from the worker thread after every send.
pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// Message from a worker thread to the foreground
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    /// One diagnostic line, in arrival order
    Line { job_id: JobId, line: String },

    /// Reading the stream failed; `Exited` still follows
    ReadFailed { job_id: JobId, error: String },

    /// The process exited and was reaped. Always the last message for a job.
    Exited { job_id: JobId, code: Option<i32> },
}

impl WorkerMessage {
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Line { job_id, .. }
            | Self::ReadFailed { job_id, .. }
            | Self::Exited { job_id, .. } => *job_id,
        }
    }
}

/// Thread creation failed; the caller still owns the exit waiter and must reap
pub struct WorkerSpawnError {
    pub source: io::Error,
    pub exit: Box<dyn ExitWaiter>,
}

impl fmt::Debug for WorkerSpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerSpawnError")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

type WorkerParts = (Box<dyn Read + Send>, Box<dyn ExitWaiter>);

/// Spawn the thread that drains `diagnostics` line by line, then waits for exit.
///
/// The worker never touches supervisor state; everything it learns travels
/// over `tx`. A closed receiver is not an error, the worker still reaps.
/// The stream and waiter are handed over only once the thread exists, so a
/// failed spawn returns the waiter in [`WorkerSpawnError`].
pub fn spawn_worker(
    job_id: JobId,
    diagnostics: Box<dyn Read + Send>,
    exit: Box<dyn ExitWaiter>,
    tx: Sender<WorkerMessage>,
    waker: Option<Waker>,
) -> Result<JoinHandle<()>, WorkerSpawnError> {
    let (parts_tx, parts_rx) = mpsc::sync_channel::<WorkerParts>(1);

    let spawned = thread::Builder::new()
        .name(format!("hdr2sdr-worker-{}", job_id.simple()))
        .spawn(move || {
            let Ok((diagnostics, exit)) = parts_rx.recv() else {
                return;
            };
            run_worker(job_id, diagnostics, exit, tx, waker);
        });

    let join = match spawned {
        Ok(join) => join,
        Err(source) => return Err(WorkerSpawnError { source, exit }),
    };

    match parts_tx.send((diagnostics, exit)) {
        Ok(()) => Ok(join),
        Err(SendError((_, exit))) => Err(WorkerSpawnError {
            source: io::Error::other("worker thread exited before start"),
            exit,
        }),
    }
}

fn run_worker(
    job_id: JobId,
    diagnostics: Box<dyn Read + Send>,
    exit: Box<dyn ExitWaiter>,
    tx: Sender<WorkerMessage>,
    waker: Option<Waker>,
) {
    let send = |msg: WorkerMessage| {
        if tx.send(msg).is_ok() {
            if let Some(waker) = &waker {
                waker();
            }
        }
    };

    let result = read_lines(diagnostics, |line| {
        trace!(%job_id, "{}", line);
        send(WorkerMessage::Line { job_id, line });
    });
    if let Err(e) = result {
        warn!(%job_id, "Diagnostic stream read failed: {}", e);
        send(WorkerMessage::ReadFailed {
            job_id,
            error: e.to_string(),
        });
    }

    let code = match exit.wait() {
        Ok(code) => code,
        Err(e) => {
            warn!(%job_id, "Failed to wait for process: {}", e);
            None
        }
    };
    send(WorkerMessage::Exited { job_id, code });
}

/// Split a byte stream into lines ending at `\n` or `\r`.
/// ffmpeg rewrites its status line with bare carriage returns.
/// Empty segments (e.g. from `\r\n`) are skipped; decoding is lossy UTF-8.
pub fn read_lines<R: Read>(mut reader: R, mut on_line: impl FnMut(String)) -> io::Result<()> {
    let mut buf = [0u8; 8192];
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                flush(&mut pending, &mut on_line);
                return Err(e);
            }
        };

        for &byte in &buf[..n] {
            if byte == b'\n' || byte == b'\r' {
                flush(&mut pending, &mut on_line);
            } else {
                pending.push(byte);
            }
        }
    }

    flush(&mut pending, &mut on_line);
    Ok(())
}

fn flush(pending: &mut Vec<u8>, on_line: &mut impl FnMut(String)) {
    if !pending.is_empty() {
        on_line(String::from_utf8_lossy(pending).into_owned());
        pending.clear();
    }
}
