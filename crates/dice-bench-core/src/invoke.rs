//! Running the external tool as a subprocess.
//!
//! Every outcome, including timeouts and launch failures, is returned as an
//! [`InvokeOutcome`] value; callers branch on it and record data instead of
//! propagating errors.

use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::DEFAULT_POLL_MS;
use crate::mode::Mode;

/// A fully resolved command line plus its time budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
}

impl Invocation {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Dice invocation for one benchmark: the file, then `base_flags`, then
    /// `metric_flags`, then the mode's flags.
    #[must_use]
    pub fn for_benchmark(
        tool: &Path,
        benchmark: &Path,
        base_flags: &[String],
        metric_flags: &[&str],
        mode: Mode,
    ) -> Self {
        Self::new(tool)
            .arg(benchmark.to_string_lossy())
            .args(base_flags)
            .args(metric_flags)
            .args(mode.flags())
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_string()));
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs this command line under `wrapper`: the wrapper becomes the
    /// program, followed by `wrapper_args`, the wrapped program and its
    /// arguments.
    #[must_use]
    pub fn wrapped(self, wrapper: &Path, wrapper_args: &[&str]) -> Self {
        let mut args: Vec<String> = wrapper_args.iter().map(ToString::to_string).collect();
        args.push(self.program.to_string_lossy().into_owned());
        args.extend(self.args);
        Self {
            program: wrapper.to_path_buf(),
            args,
            timeout: self.timeout,
        }
    }

    /// Space-joined command line for log output.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured output of a process that exited on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,
    /// Wall-clock time from spawn until the exit was observed. Under a
    /// timeout the exit is noticed by polling, so this may overshoot by up
    /// to one poll interval; polling starts at 1ms and backs off.
    pub elapsed: Duration,
}

impl ToolOutput {
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

/// Result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeOutcome {
    /// The process exited within its time budget.
    Completed(ToolOutput),
    /// The time budget ran out; the process was killed and its output
    /// discarded.
    TimedOut { elapsed: Duration },
    /// The process could not be started or waited on.
    SpawnFailed { reason: String },
}

/// Runs tool invocations.
pub trait Invoker {
    fn invoke(&self, invocation: &Invocation) -> InvokeOutcome;
}

impl<T: Invoker + ?Sized> Invoker for &T {
    fn invoke(&self, invocation: &Invocation) -> InvokeOutcome {
        (**self).invoke(invocation)
    }
}

/// [`Invoker`] backed by real subprocesses.
#[derive(Debug, Clone, Copy)]
pub struct ProcessInvoker {
    poll_interval: Duration,
}

impl Default for ProcessInvoker {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_MS),
        }
    }
}

const FIRST_POLL: Duration = Duration::from_millis(1);

impl ProcessInvoker {
    #[must_use]
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(FIRST_POLL),
        }
    }

    /// Polls `child` until it exits or `deadline` passes, returning the exit
    /// status and the elapsed time when the exit was seen. Returns
    /// `Ok(None)` after killing a child that ran out of time.
    fn wait_until(
        &self,
        child: &mut Child,
        start: Instant,
        deadline: Instant,
    ) -> std::io::Result<Option<(ExitStatus, Duration)>> {
        let mut pause = FIRST_POLL;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some((status, start.elapsed())));
            }
            let now = Instant::now();
            if now >= deadline {
                terminate(child);
                let _ = child.wait();
                return Ok(None);
            }
            std::thread::sleep(pause.min(deadline - now));
            pause = (pause * 2).min(self.poll_interval);
        }
    }

    /// Waits for the output readers until `deadline`. Readers outlive the
    /// child only when something else still holds the pipes open.
    fn readers_finished(&self, readers: &[Option<&Reader>], deadline: Option<Instant>) -> bool {
        let Some(deadline) = deadline else {
            return true;
        };
        loop {
            if readers.iter().flatten().all(|h| h.is_finished()) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(self.poll_interval.min(deadline - now));
        }
    }
}

impl Invoker for ProcessInvoker {
    fn invoke(&self, invocation: &Invocation) -> InvokeOutcome {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(invocation.args.iter().map(OsStr::new))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so a timeout also reaches processes the tool
        // (or a timing wrapper) spawned.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        tracing::debug!(command = %invocation.command_line(), "spawning");
        let start = Instant::now();
        let deadline = invocation.timeout.map(|limit| start + limit);
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return InvokeOutcome::SpawnFailed {
                    reason: format!("failed to spawn {}: {e}", invocation.program.display()),
                };
            }
        };

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match deadline {
            Some(deadline) => self.wait_until(&mut child, start, deadline),
            None => child.wait().map(|status| Some((status, start.elapsed()))),
        };

        match status {
            Ok(Some((status, elapsed))) => {
                // Descendants left in the group would keep the pipes open.
                kill_group(child.id());
                if !self.readers_finished(&[stdout.as_ref(), stderr.as_ref()], deadline) {
                    tracing::warn!(
                        command = %invocation.command_line(),
                        "output still open at deadline"
                    );
                    return InvokeOutcome::TimedOut {
                        elapsed: start.elapsed(),
                    };
                }
                InvokeOutcome::Completed(ToolOutput {
                    stdout: collect(stdout),
                    stderr: collect(stderr),
                    exit_code: status.code(),
                    elapsed,
                })
            }
            // Drainer threads are detached: the output is discarded.
            Ok(None) => InvokeOutcome::TimedOut {
                elapsed: start.elapsed(),
            },
            Err(e) => {
                terminate(&mut child);
                let _ = child.wait();
                InvokeOutcome::SpawnFailed {
                    reason: format!("failed to wait on {}: {e}", invocation.program.display()),
                }
            }
        }
    }
}

type Reader = JoinHandle<Vec<u8>>;

fn drain<R>(pipe: Option<R>) -> Option<Reader>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<Reader>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Sends `SIGKILL` to the process group led by `pid`; a group with no
/// members left is not an error.
#[cfg(unix)]
fn kill_group(pid: u32) -> bool {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    i32::try_from(pid)
        .ok()
        .is_some_and(|pid| killpg(Pid::from_raw(pid), Signal::SIGKILL).is_ok())
}

#[cfg(not(unix))]
const fn kill_group(_pid: u32) -> bool {
    false
}

fn terminate(child: &mut Child) {
    if !kill_group(child.id()) {
        let _ = child.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_benchmark_orders_arguments() {
        let inv = Invocation::for_benchmark(
            Path::new("/bin/dice"),
            Path::new("bench/a.dice"),
            &["-skip-table".to_string()],
            &["-show-size", "-num-recursive-calls"],
            Mode::Fh,
        )
        .timeout(Some(Duration::from_secs(5)));
        assert_eq!(inv.program, PathBuf::from("/bin/dice"));
        assert_eq!(
            inv.args,
            vec![
                "bench/a.dice",
                "-skip-table",
                "-show-size",
                "-num-recursive-calls",
                "-determinism",
                "-flip-lifting",
                "-branch-elimination",
            ]
        );
        assert_eq!(inv.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn wrapped_prepends_wrapper_and_keeps_timeout() {
        let inv = Invocation::new("/bin/dice")
            .arg("a.dice")
            .timeout(Some(Duration::from_secs(1)))
            .wrapped(Path::new("/usr/bin/time"), &["-f", "%e"]);
        assert_eq!(inv.program, PathBuf::from("/usr/bin/time"));
        assert_eq!(inv.args, vec!["-f", "%e", "/bin/dice", "a.dice"]);
        assert_eq!(inv.timeout, Some(Duration::from_secs(1)));
        assert_eq!(inv.command_line(), "/usr/bin/time -f %e /bin/dice a.dice");
    }

    #[test]
    fn tool_output_success_requires_zero_exit() {
        let mut out = ToolOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(0),
            elapsed: Duration::ZERO,
        };
        assert!(out.success());
        out.exit_code = Some(2);
        assert!(!out.success());
        out.exit_code = None;
        assert!(!out.success());
    }

    #[test]
    fn missing_program_is_reported_as_spawn_failure() {
        let outcome = ProcessInvoker::default()
            .invoke(&Invocation::new("/definitely/not/a/real/dice-binary"));
        assert!(matches!(outcome, InvokeOutcome::SpawnFailed { .. }));
    }
}
