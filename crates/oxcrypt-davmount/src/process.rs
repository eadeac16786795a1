//! Bounded execution of external commands.
//!
//! Every mount strategy shells out to OS tools with unpredictable latency
//! (`osascript` may sit on a password dialog, `gio` may wait on the network).
//! [`BoundedCommand`] runs such a tool with a hard wall-clock bound:
//!
//! - stdin is closed, stdout and stderr are drained on background threads
//! - on timeout or cancellation the process (and, on unix, its whole process
//!   group) is killed with SIGKILL and reaped before the call returns
//! - the result is an [`ExecutionOutput`] that classifies success by exit code
//!
//! Commands are always built as argument vectors. Nothing is passed through a
//! shell unless the caller explicitly runs `sh` with positional parameters.

use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{FailureDetail, MountError};

/// How often a running child is polled for exit, cancellation and deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long to wait for stdout/stderr readers after the child has exited.
///
/// A tool that launches a long-lived helper (e.g. `gio open` starting a file
/// manager) can leave the helper holding our pipes open.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Shared cancellation flag for long-running commands.
///
/// Cloning yields a handle to the same flag. Raising it makes any
/// [`BoundedCommand::run_cancellable`] call observing it kill its child and
/// return [`MountError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    /// Create a new, un-raised flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// A flag nobody holds a handle to raise.
    pub fn never() -> Self {
        Self::default()
    }

    /// Request cancellation of all commands observing this flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An external command with a wall-clock timeout.
///
/// Cheap to clone, so mount handles can keep prepared reveal/unmount commands
/// and run them any number of times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedCommand {
    program: OsString,
    args: Vec<OsString>,
    timeout: Duration,
}

impl BoundedCommand {
    /// Create a command for `program` that may run for at most `timeout`.
    pub fn new(program: impl AsRef<OsStr>, timeout: Duration) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            timeout,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// The program to execute.
    pub fn program(&self) -> &OsStr {
        &self.program
    }

    /// The argument vector (without the program).
    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    /// The wall-clock bound.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the command, blocking until it exits or the timeout elapses.
    pub fn run(&self) -> Result<ExecutionOutput, MountError> {
        self.run_cancellable(&Cancellation::never())
    }

    /// Run the command, additionally aborting when `cancel` is raised.
    ///
    /// # Errors
    ///
    /// - [`MountError::Io`] if the process could not be spawned or polled
    /// - [`MountError::Timeout`] if the bound elapsed (the process was killed)
    /// - [`MountError::Cancelled`] if `cancel` was raised (the process was killed)
    ///
    /// A non-zero exit is *not* an error here; use
    /// [`ExecutionOutput::assert_success`] to classify it.
    pub fn run_cancellable(&self, cancel: &Cancellation) -> Result<ExecutionOutput, MountError> {
        let command_line = self.to_string();

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group, so a kill also reaches anything the tool forked.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        tracing::trace!(command = %command_line, timeout = ?self.timeout, "Starting command");

        let mut child = command.spawn().map_err(|source| MountError::Io {
            command: command_line.clone(),
            source,
        })?;

        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        // A bound too large to represent means no deadline at all.
        let deadline = Instant::now().checked_add(self.timeout);

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let drain_deadline = Instant::now() + DRAIN_GRACE;
                    let output = ExecutionOutput {
                        stdout: collect_reader(stdout, drain_deadline),
                        stderr: collect_reader(stderr, drain_deadline),
                        command: command_line,
                        status,
                    };
                    tracing::trace!(
                        command = %output.command,
                        exit_code = ?output.exit_code(),
                        "Command finished"
                    );
                    return Ok(output);
                }
                Ok(None) => {}
                Err(source) => {
                    terminate(&mut child);
                    return Err(MountError::Io {
                        command: command_line,
                        source,
                    });
                }
            }

            if cancel.is_cancelled() {
                terminate(&mut child);
                tracing::debug!("Cancelled `{}`, process killed", command_line);
                return Err(MountError::Cancelled {
                    command: command_line,
                });
            }

            let now = Instant::now();
            if let Some(deadline) = deadline
                && now >= deadline
            {
                terminate(&mut child);
                tracing::debug!(
                    "`{}` did not finish within {:?}, process killed",
                    command_line,
                    self.timeout
                );
                return Err(MountError::Timeout {
                    command: command_line,
                    timeout: self.timeout,
                });
            }

            let remaining = deadline.map_or(POLL_INTERVAL, |d| d.saturating_duration_since(now));
            thread::sleep(POLL_INTERVAL.min(remaining));
        }
    }
}

impl fmt::Display for BoundedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&shell_quote(&self.program.to_string_lossy()))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(&arg.to_string_lossy()))?;
        }
        Ok(())
    }
}

/// Result of a command that ran to completion.
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    command: String,
    status: ExitStatus,
    stdout: Option<String>,
    stderr: Option<String>,
}

impl ExecutionOutput {
    /// The command line that produced this output.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Raw exit status.
    pub fn status(&self) -> ExitStatus {
        self.status
    }

    /// Exit code, or `None` if the process was terminated by a signal.
    pub fn exit_code(&self) -> Option<i32> {
        self.status.code()
    }

    /// Captured standard output, `None` if it could not be captured.
    pub fn stdout(&self) -> Option<&str> {
        self.stdout.as_deref()
    }

    /// Captured standard error, `None` if it could not be captured.
    pub fn stderr(&self) -> Option<&str> {
        self.stderr.as_deref()
    }

    /// Fail unless the process exited with `expected`.
    ///
    /// The error carries the captured stderr text when there is any, and the
    /// raw exit code otherwise.
    pub fn assert_success(&self, expected: i32) -> Result<(), MountError> {
        let detail = match self.status.code() {
            Some(code) if code == expected => return Ok(()),
            Some(actual) => match self.stderr.as_deref().map(str::trim) {
                Some(stderr) if !stderr.is_empty() => FailureDetail::Stderr(stderr.to_string()),
                _ => FailureDetail::ExitCode { actual, expected },
            },
            None => FailureDetail::Signal,
        };

        Err(MountError::CommandFailed {
            command: self.command.clone(),
            detail,
        })
    }
}

/// Drain `stream` to EOF and decode it as UTF-8 (invalid sequences replaced).
///
/// The stream is consumed, so it is closed on every return path.
pub fn capture_text<R: Read>(mut stream: R) -> io::Result<String> {
    let mut buffer = Vec::new();
    stream.read_to_end(&mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Quote `value` for a POSIX shell if it contains anything but plain word
/// characters. Embedded single quotes become `'\''`.
pub fn shell_quote(value: &str) -> Cow<'_, str> {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:@%+=,".contains(c));
    if plain {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(format!("'{}'", value.replace('\'', r"'\''")))
    }
}

fn spawn_reader<R: Read + Send + 'static>(stream: R) -> mpsc::Receiver<io::Result<String>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // Receiver may be gone after a kill; nothing to report then.
        let _ = tx.send(capture_text(stream));
    });
    rx
}

fn collect_reader(
    reader: Option<mpsc::Receiver<io::Result<String>>>,
    deadline: Instant,
) -> Option<String> {
    let rx = reader?;
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(Ok(text)) => Some(text),
        Ok(Err(e)) => {
            tracing::debug!("Failed to capture command output: {}", e);
            None
        }
        Err(_) => {
            tracing::debug!("Command output still open after exit, not captured");
            None
        }
    }
}

/// Kill the child (and its process group) and reap it.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        // PIDs fit in i32 on every unix we run on; nix requires pid_t.
        #[allow(clippy::cast_possible_wrap)]
        let pgid = Pid::from_raw(child.id() as i32);
        if let Err(e) = killpg(pgid, Signal::SIGKILL) {
            tracing::debug!("killpg({}) failed: {}", pgid, e);
        }
    }

    if let Err(e) = child.kill() {
        tracing::debug!("kill({}) failed: {}", child.id(), e);
    }
    if let Err(e) = child.wait() {
        tracing::warn!("Failed to reap process {}: {}", child.id(), e);
    }
}
