//! Process launching seam between the supervisor and the OS.
//!
//! A launched process is split three ways so that each piece has exactly
//! one owner: the diagnostic stream and the exit waiter move to the
//! background worker, the terminate handle stays with the job on the
//! foreground.

use std::ffi::{OsStr, OsString};
use std::io::{self, Read};
use std::process::{Child, Command, Output, Stdio};
use tracing::debug;

/// Blocks until the process exits and reaps it
pub trait ExitWaiter: Send {
    /// Exit code, or `None` when the process was killed by a signal
    fn wait(self: Box<Self>) -> io::Result<Option<i32>>;
}

/// Foreground-side handle used to stop a running process
pub trait ProcessHandle: Send {
    fn pid(&self) -> Option<u32>;

    /// Ask the process to terminate; closing its streams unblocks the worker
    fn terminate(&mut self) -> io::Result<()>;
}

/// The three owned parts of a spawned process
pub struct LaunchedProcess {
    pub diagnostics: Box<dyn Read + Send>,
    pub exit: Box<dyn ExitWaiter>,
    pub handle: Box<dyn ProcessHandle>,
}

/// Spawns external tool invocations
pub trait ProcessLauncher {
    fn launch(&self, program: &OsStr, args: &[OsString]) -> io::Result<LaunchedProcess>;
}

/// Launcher backed by `std::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, program: &OsStr, args: &[OsString]) -> io::Result<LaunchedProcess> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());
        hide_console_window(&mut cmd);
        own_process_group(&mut cmd);

        let mut child = cmd.spawn()?;
        let pid = child.id();
        debug!("Spawned {} (pid {})", program.to_string_lossy(), pid);

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("Failed to capture stderr"))?;

        Ok(LaunchedProcess {
            diagnostics: Box::new(stderr),
            exit: Box::new(ChildWaiter(child)),
            handle: Box::new(PidHandle { pid }),
        })
    }
}

struct ChildWaiter(Child);

impl ExitWaiter for ChildWaiter {
    fn wait(mut self: Box<Self>) -> io::Result<Option<i32>> {
        let status = self.0.wait()?;
        Ok(status.code())
    }
}

/// Terminates by pid so the worker can keep exclusive ownership of the child
struct PidHandle {
    pid: u32,
}

impl ProcessHandle for PidHandle {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        let pid = libc::pid_t::try_from(self.pid)
            .map_err(|_| io::Error::other(format!("pid {} out of range", self.pid)))?;
        // SIGTERM lets ffmpeg finalise and close its streams
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        let mut cmd = Command::new("taskkill");
        cmd.args(["/PID", &self.pid.to_string(), "/T", "/F"]);
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
        hide_console_window(&mut cmd);
        let status = cmd.status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("taskkill exited with {}", status)))
        }
    }
}

#[cfg(windows)]
fn hide_console_window(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_console_window(_cmd: &mut Command) {}

/// Keep terminal Ctrl-C away from the child; stopping it goes through
/// [`ProcessHandle::terminate`]
#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut Command) {}

/// Run a short-lived tool to completion, capturing stdout and stderr
pub fn run_to_completion<I, S>(program: &OsStr, args: I) -> io::Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdin(Stdio::null());
    hide_console_window(&mut cmd);
    cmd.output()
}
