//! Conversion lifecycle on the foreground thread.
//!
//! [`ProcessSupervisor`] owns at most one running conversion. A background
//! worker (see [`crate::engine::worker`]) streams the tool's diagnostics over
//! a channel; every state transition happens inside [`dispatch_pending`] or
//! [`wait_and_dispatch`], on whichever thread owns the supervisor.
//!
//! Outcome classification on exit:
//!
//! | exit | GPU | signature seen | outcome |
//! |---|---|---|---|
//! | 0 | any | any | Completed |
//! | != 0 | yes | yes | Retrying (first attempt only) |
//! | != 0 | otherwise | | Failed |
//!
//! A cancelled job leaves `active` before it exits, so its exit is never
//! classified; Cancelled is reported by [`cancel`] itself.
//!
//! [`dispatch_pending`]: ProcessSupervisor::dispatch_pending
//! [`wait_and_dispatch`]: ProcessSupervisor::wait_and_dispatch
//! [`cancel`]: ProcessSupervisor::cancel

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::core::{
    BuiltCommand, CapabilityWarning, CommandBuilder, ConversionRequest, FilterKind, JobId,
    ProgressParser, VideoProperties, write_debug_log,
};
use super::error::{SpawnError, StartError};
use super::probe::MediaProbe;
use super::process::{ExitWaiter, ProcessHandle, ProcessLauncher};
use super::validate::validate_request;
use super::worker::{Waker, WorkerMessage, spawn_worker};

/// Automatic GPU-to-CPU retries allowed per user request
pub const MAX_AUTOMATIC_RETRIES: u32 = 1;

/// Coarse lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SupervisorState {
    #[default]
    Idle,
    Running,
    Retrying,
    Completed,
    Failed,
    Cancelled,
}

impl SupervisorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Final notification for a job
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalState {
    Completed { output: PathBuf },
    Failed { code: Option<i32>, diagnostics: Vec<String> },
    Cancelled,
    /// GPU failure; a CPU job `next` has replaced this one
    Retrying { next: JobId },
}

/// Receives lifecycle notifications, always on the dispatching thread
pub trait ConversionObserver {
    fn on_progress(&mut self, job: JobId, percent: f64);

    fn on_terminal(&mut self, job: JobId, state: TerminalState);

    fn on_warning(&mut self, job: JobId, warning: CapabilityWarning);

    /// Every diagnostic line of the active job
    fn on_line(&mut self, _job: JobId, _line: &str) {}
}

/// Runtime state of the single active conversion
pub struct ConversionJob {
    pub id: JobId,
    pub request: ConversionRequest,
    /// 0 for the user's request, 1 for the CPU fallback
    pub attempt: u32,
    pub diagnostics: Vec<String>,
    /// Effective GPU flag of the built command
    pub use_gpu: bool,
    props: VideoProperties,
    parser: ProgressParser,
    handle: Box<dyn ProcessHandle>,
}

impl ConversionJob {
    pub fn hardware_failure_seen(&self) -> bool {
        self.parser.hardware_failure_seen()
    }

    fn classify(&self, code: Option<i32>) -> Outcome {
        if code == Some(0) {
            Outcome::Completed
        } else if self.use_gpu
            && self.hardware_failure_seen()
            && self.attempt < MAX_AUTOMATIC_RETRIES
        {
            Outcome::Retry
        } else {
            Outcome::Failed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Retry,
    Failed,
}

/// Notifications raised outside a dispatch call, delivered by the next one
enum Notice {
    Warning(JobId, CapabilityWarning),
    Terminal(JobId, TerminalState),
}

pub struct ProcessSupervisor<P: MediaProbe, L: ProcessLauncher> {
    probe: P,
    builder: CommandBuilder,
    launcher: L,
    tx: Sender<WorkerMessage>,
    rx: Receiver<WorkerMessage>,
    waker: Option<Waker>,
    transcript_log: bool,
    state: SupervisorState,
    active: Option<ConversionJob>,
    /// Cancelled job whose worker has not reported exit yet
    draining: Option<JobId>,
    notices: VecDeque<Notice>,
}

impl<P: MediaProbe, L: ProcessLauncher> ProcessSupervisor<P, L> {
    pub fn new(probe: P, builder: CommandBuilder, launcher: L) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            probe,
            builder,
            launcher,
            tx,
            rx,
            waker: None,
            transcript_log: false,
            state: SupervisorState::Idle,
            active: None,
            draining: None,
            notices: VecDeque::new(),
        }
    }

    /// Called from background threads whenever a message is queued
    pub fn with_waker(mut self, waker: Waker) -> Self {
        self.waker = Some(waker);
        self
    }

    /// Append failure transcripts to the debug log file
    pub fn with_transcript_log(mut self, enabled: bool) -> Self {
        self.transcript_log = enabled;
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn active_job(&self) -> Option<&ConversionJob> {
        self.active.as_ref()
    }

    /// True while a job runs or a cancelled one is still shutting down
    pub fn is_busy(&self) -> bool {
        self.active.is_some() || self.draining.is_some()
    }

    /// True when nothing is running and every notification was delivered
    pub fn is_settled(&self) -> bool {
        !self.is_busy() && self.notices.is_empty()
    }

    /// Validate, probe, build and spawn. Returns once the process is running;
    /// progress and the outcome arrive through the observer.
    pub fn start(&mut self, request: ConversionRequest) -> Result<JobId, StartError> {
        if self.is_busy() {
            return Err(StartError::Busy);
        }
        // A rejected request leaves no trace of the previous run's outcome
        self.state = SupervisorState::Idle;

        let request = validate_request(&request)?;

        let mut props = self.probe.probe(&request.input_path)?;
        if request.filter_kind == FilterKind::Dynamic {
            props.max_frame_average_light =
                self.probe.max_frame_average_light(&request.input_path);
        }

        let job_id = Uuid::new_v4();
        match self.launch(job_id, request, props, 0) {
            Ok(()) => Ok(job_id),
            Err(e) => {
                self.fail_spawn(job_id, &e);
                Err(StartError::Spawn(e))
            }
        }
    }

    /// Stop the active job. Cancelled is delivered by the next dispatch
    /// and nothing else is reported for that job afterwards.
    pub fn cancel(&mut self) -> bool {
        let Some(mut job) = self.active.take() else {
            return false;
        };

        info!(job_id = %job.id, "Cancelling conversion");
        if let Err(e) = job.handle.terminate() {
            // Usually means the process already exited
            warn!(job_id = %job.id, "Failed to terminate process: {}", e);
        }

        self.draining = Some(job.id);
        self.state = SupervisorState::Cancelled;
        self.notices
            .push_back(Notice::Terminal(job.id, TerminalState::Cancelled));
        self.wake();
        true
    }

    /// Deliver queued notifications and process worker messages without blocking.
    /// Returns the number of events handled.
    pub fn dispatch_pending(&mut self, observer: &mut dyn ConversionObserver) -> usize {
        let mut handled = self.flush_notices(observer);
        while let Ok(msg) = self.rx.try_recv() {
            handled += 1 + self.handle_message(msg, observer);
        }
        handled
    }

    /// Block up to `timeout` for the first event, then drain the rest
    pub fn wait_and_dispatch(
        &mut self,
        observer: &mut dyn ConversionObserver,
        timeout: Duration,
    ) -> usize {
        if !self.notices.is_empty() {
            return self.dispatch_pending(observer);
        }

        match self.rx.recv_timeout(timeout) {
            Ok(msg) => {
                let handled = 1 + self.handle_message(msg, observer);
                handled + self.dispatch_pending(observer)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Dispatch until settled. Setting `interrupt` cancels the active job;
    /// the flag is cleared once consumed, so each interrupt cancels at most once.
    pub fn drive_until_settled(
        &mut self,
        observer: &mut dyn ConversionObserver,
        poll: Duration,
        interrupt: &AtomicBool,
    ) {
        while !self.is_settled() {
            if interrupt.swap(false, Ordering::SeqCst) && self.cancel() {
                info!("Interrupted; waiting for the conversion to stop");
            }
            self.wait_and_dispatch(observer, poll);
        }
    }

    fn wake(&self) {
        if let Some(waker) = &self.waker {
            waker();
        }
    }

    fn flush_notices(&mut self, observer: &mut dyn ConversionObserver) -> usize {
        let mut delivered = 0;
        while let Some(notice) = self.notices.pop_front() {
            match notice {
                Notice::Warning(job, warning) => observer.on_warning(job, warning),
                Notice::Terminal(job, state) => observer.on_terminal(job, state),
            }
            delivered += 1;
        }
        delivered
    }

    fn launch(
        &mut self,
        job_id: JobId,
        request: ConversionRequest,
        props: VideoProperties,
        attempt: u32,
    ) -> Result<(), SpawnError> {
        let built = self.builder.build(&request, &props);
        let BuiltCommand {
            program,
            args,
            use_gpu,
            warnings,
        } = built;

        for warning in warnings {
            warn!(%job_id, "{}", warning);
            self.notices.push_back(Notice::Warning(job_id, warning));
        }

        let spawn_error = |source: std::io::Error| SpawnError {
            program: program.display().to_string(),
            source,
        };

        let launched = self
            .launcher
            .launch(program.as_os_str(), &args)
            .map_err(spawn_error)?;
        let mut handle = launched.handle;

        if let Err(failed) = spawn_worker(
            job_id,
            launched.diagnostics,
            launched.exit,
            self.tx.clone(),
            self.waker.clone(),
        ) {
            reap_unwatched(job_id, handle.as_mut(), failed.exit);
            return Err(spawn_error(failed.source));
        }

        info!(
            %job_id,
            attempt,
            use_gpu,
            "Started conversion {} -> {}",
            request.input_path.display(),
            request.output_path.display()
        );

        self.active = Some(ConversionJob {
            id: job_id,
            attempt,
            diagnostics: Vec::new(),
            use_gpu,
            parser: ProgressParser::new(props.duration),
            props,
            handle,
            request,
        });
        self.state = SupervisorState::Running;
        Ok(())
    }

    fn fail_spawn(&mut self, job_id: JobId, e: &SpawnError) {
        error!(%job_id, "{}", e);
        self.state = SupervisorState::Failed;
        self.notices.push_back(Notice::Terminal(
            job_id,
            TerminalState::Failed {
                code: None,
                diagnostics: vec![e.to_string()],
            },
        ));
        self.wake();
    }

    /// Returns the number of notices flushed as a side effect
    fn handle_message(&mut self, msg: WorkerMessage, observer: &mut dyn ConversionObserver) -> usize {
        let job_id = msg.job_id();

        if self.draining == Some(job_id) {
            if matches!(msg, WorkerMessage::Exited { .. }) {
                debug!(%job_id, "Cancelled process exited");
                self.draining = None;
            }
            return 0;
        }

        let Some(job) = self.active.as_mut().filter(|j| j.id == job_id) else {
            debug!(%job_id, "Dropping message for finished job");
            return 0;
        };

        match msg {
            WorkerMessage::Line { line, .. } => {
                observer.on_line(job_id, &line);
                if let Some(pct) = job.parser.parse_line(&line) {
                    observer.on_progress(job_id, pct);
                }
                job.diagnostics.push(line);
                0
            }
            WorkerMessage::ReadFailed { error, .. } => {
                job.diagnostics
                    .push(format!("error reading diagnostics: {}", error));
                0
            }
            WorkerMessage::Exited { code, .. } => self.finish(code, observer),
        }
    }

    fn finish(&mut self, code: Option<i32>, observer: &mut dyn ConversionObserver) -> usize {
        let Some(job) = self.active.take() else {
            return 0;
        };

        match job.classify(code) {
            Outcome::Completed => {
                info!(job_id = %job.id, "Conversion completed: {}", job.request.output_path.display());
                self.state = SupervisorState::Completed;
                observer.on_terminal(
                    job.id,
                    TerminalState::Completed {
                        output: job.request.output_path,
                    },
                );
            }
            Outcome::Failed => {
                error!(job_id = %job.id, "Conversion failed with exit code {:?}", code);
                self.write_transcript(&job, code);
                self.state = SupervisorState::Failed;
                observer.on_terminal(
                    job.id,
                    TerminalState::Failed {
                        code,
                        diagnostics: job.diagnostics,
                    },
                );
            }
            Outcome::Retry => {
                let next = Uuid::new_v4();
                warn!(
                    job_id = %job.id,
                    %next,
                    "GPU encoding failed (exit {:?}); retrying on CPU", code
                );
                self.state = SupervisorState::Retrying;
                observer.on_terminal(job.id, TerminalState::Retrying { next });

                let request = job.request.cpu_fallback();
                if let Err(e) = self.launch(next, request, job.props, job.attempt + 1) {
                    self.fail_spawn(next, &e);
                }
                return self.flush_notices(observer);
            }
        }
        0
    }

    fn write_transcript(&self, job: &ConversionJob, code: Option<i32>) {
        if !self.transcript_log {
            return;
        }
        let entry = format!(
            "Conversion failed (exit {:?}): {} -> {}\n{}",
            code,
            job.request.input_path.display(),
            job.request.output_path.display(),
            job.diagnostics.join("\n")
        );
        if let Err(e) = write_debug_log(&entry) {
            warn!("Failed to write debug log: {:#}", e);
        }
    }
}

/// Stop and reap a process whose worker thread never started
fn reap_unwatched(job_id: JobId, handle: &mut dyn ProcessHandle, exit: Box<dyn ExitWaiter>) {
    if let Err(e) = handle.terminate() {
        warn!(%job_id, "Failed to terminate process: {}", e);
    }
    match exit.wait() {
        Ok(code) => debug!(%job_id, "Reaped process without a worker (exit {:?})", code),
        Err(e) => warn!(%job_id, "Failed to reap process: {}", e),
    }
}
