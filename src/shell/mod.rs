// src/shell/mod.rs

//! Persistent shell sessions with a sourced toolchain environment
//!
//! A cross SDK is activated by sourcing a script that rewrites `PATH`,
//! `CC`, `CFLAGS` and friends. Those changes only live inside one shell, so
//! every build command for a package goes through the same long-lived
//! `bash` process.
//!
//! The shell's stdout is an unframed stream. Each command line is followed
//! by an echo of a per-session sentinel token and `$?`:
//!
//! ```text
//! <command> ; echo "<token>:$?"
//! ```
//!
//! Everything read before the sentinel is the command's output, and the
//! number after it is the exit status. Callers must not submit commands that
//! print the sentinel themselves, or that leave a control structure open
//! (a trailing `||`, an unclosed quote) so that `$?` no longer reflects the
//! command.

mod cancel;
mod echo;
mod quote;

pub use cancel::{install_signal_handlers, is_cancelled};
pub use echo::{EchoSink, NullEcho, TracingEcho};
pub use quote::{is_valid_var_name, join, quote};

use crate::error::{Error, Result};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use regex::Regex;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Commands run once at startup, before any caller command
const HANDSHAKE: &str = "exec 2>&1; set +H";

/// How to start the shell process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// Shell executable (looked up on `PATH`)
    pub program: String,
    /// Arguments passed to the shell
    pub args: Vec<String>,
    /// Per-command limit; the shell is terminated when a command exceeds it
    pub timeout: Option<Duration>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: "bash".to_string(),
            // Without --noediting readline echoes each input line into the merged output
            args: ["--noprofile", "--norc", "--noediting", "-i"]
                .iter()
                .map(|a| a.to_string())
                .collect(),
            timeout: None,
        }
    }
}

impl ShellConfig {
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_program(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.program = program.into();
        self.args = args;
        self
    }
}

/// Outcome of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit status reported by the shell
    pub status: i32,
    /// Output lines joined with `\n`, sentinel excluded
    pub output: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Handle that can kill a session from another thread
///
/// Terminating is the only way to cancel a running command. The shell leads
/// its own process group and the whole group is killed, so build commands
/// die with it. The session's environment dies with the shell, so a
/// terminated session cannot be reused.
#[derive(Debug, Clone)]
pub struct SessionTerminator {
    child: Arc<Mutex<Child>>,
    terminated: Arc<AtomicBool>,
    // Wakes a blocked reader even if a grandchild still holds the pipe open
    wake: mpsc::Sender<ReadEvent>,
}

impl SessionTerminator {
    /// Kill the shell's process group and reap the shell
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut child) = self.child.lock() {
            let group = Pid::from_raw(child.id() as i32);
            if let Err(e) = killpg(group, Signal::SIGKILL) {
                debug!("shell process group already gone: {}", e);
                if let Err(e) = child.kill() {
                    debug!("shell already exited: {}", e);
                }
            }
            if let Err(e) = child.wait() {
                warn!("Failed to reap shell process: {}", e);
            }
        }
        let _ = self.wake.send(ReadEvent::Eof);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
enum ReadEvent {
    Line(String),
    Eof,
    Failed(std::io::Error),
}

/// One interactive shell process
///
/// Not shareable: one command is in flight at a time, and each `run` blocks
/// until the sentinel arrives, the shell dies, or the timeout fires.
pub struct ShellSession {
    stdin: Option<ChildStdin>,
    lines: Receiver<ReadEvent>,
    terminator: SessionTerminator,
    sentinel: String,
    pattern: Regex,
    timeout: Option<Duration>,
    echo: Box<dyn EchoSink>,
    working_directory: PathBuf,
    registration: u64,
}

impl ShellSession {
    /// Start a shell in `working_directory`, echoing through `tracing`
    pub fn open(working_directory: &Path, config: ShellConfig) -> Result<Self> {
        Self::open_with_echo(working_directory, config, Box::new(TracingEcho::default()))
    }

    /// Start a shell in `working_directory` with a custom echo sink
    pub fn open_with_echo(
        working_directory: &Path,
        config: ShellConfig,
        echo: Box<dyn EchoSink>,
    ) -> Result<Self> {
        if is_cancelled() {
            return Err(Error::Cancelled);
        }
        let sentinel = format!("__crossbake_done_{}", uuid::Uuid::new_v4().simple());
        let pattern = Regex::new(&format!("{}:(-?\\d+)$", regex::escape(&sentinel)))
            .map_err(|e| Error::SessionProcess(format!("invalid sentinel pattern: {}", e)))?;

        let mut child = Command::new(&config.program)
            .args(&config.args)
            .current_dir(working_directory)
            .env("PS1", "")
            .env("PS2", "")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .map_err(|e| {
                Error::SessionProcess(format!("failed to start {}: {}", config.program, e))
            })?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::SessionProcess("shell stdout not captured".to_string()))?;

        debug!(
            "Started {} (pid {}) in {}",
            config.program,
            child.id(),
            working_directory.display()
        );

        let (tx, lines) = mpsc::channel();
        spawn_reader(stdout, tx.clone());

        let terminator = SessionTerminator {
            child: Arc::new(Mutex::new(child)),
            terminated: Arc::new(AtomicBool::new(false)),
            wake: tx,
        };
        let registration = cancel::register(terminator.clone());

        let mut session = Self {
            stdin,
            lines,
            terminator,
            sentinel,
            pattern,
            timeout: config.timeout,
            echo,
            working_directory: working_directory.to_path_buf(),
            registration,
        };
        // A cancel between the check above and registering may have missed us
        if is_cancelled() {
            session.close();
            return Err(Error::Cancelled);
        }

        let result = session.submit(HANDSHAKE, false)?;
        if !result.success() {
            session.close();
            return Err(Error::SessionProcess(format!(
                "shell setup returned code {}: {}",
                result.status, result.output
            )));
        }

        Ok(session)
    }

    /// Source an activation script into this session's environment
    ///
    /// Must succeed before build commands are run. Any failure, including a
    /// missing script, is reported as [`Error::ToolchainActivation`].
    pub fn activate(&mut self, script: &Path) -> Result<()> {
        let line = format!("source {}", quote(&script.to_string_lossy()));
        match self.run_line(&line) {
            Ok(_) => Ok(()),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(Error::CommandFailed { status, output, .. }) => Err(Error::ToolchainActivation(
                format!(
                    "sourcing {} returned code {}: {}",
                    script.display(),
                    status,
                    output
                ),
            )),
            Err(e) => Err(Error::ToolchainActivation(format!(
                "sourcing {}: {}",
                script.display(),
                e
            ))),
        }
    }

    /// Run a command given as separate arguments, quoting each one
    ///
    /// Returns the output on exit status zero and [`Error::CommandFailed`]
    /// otherwise.
    pub fn run<S: AsRef<str>>(&mut self, argv: &[S]) -> Result<String> {
        self.run_line(&join(argv))
    }

    /// Run a raw command line and require exit status zero
    ///
    /// The line is passed to the shell unchanged, so expansions and
    /// redirections work. The sentinel rules in the module docs apply.
    pub fn run_line(&mut self, line: &str) -> Result<String> {
        let result = self.execute(line)?;
        if result.success() {
            Ok(result.output)
        } else {
            Err(Error::CommandFailed {
                command: line.to_string(),
                status: result.status,
                output: result.output,
            })
        }
    }

    /// Run a raw command line and return its status and output, whatever the status
    pub fn execute(&mut self, line: &str) -> Result<CommandResult> {
        self.submit(line, true)
    }

    /// `export NAME=value`
    pub fn export_var(&mut self, name: &str, value: &str) -> Result<()> {
        check_var_name(name)?;
        self.run_line(&format!("export {}={}", name, quote(value)))?;
        Ok(())
    }

    /// Append `value` to variable `name`, space separated
    pub fn append_var(&mut self, name: &str, value: &str) -> Result<()> {
        check_var_name(name)?;
        self.run_line(&format!(
            "export {name}=\"${{{name}:+${name} }}\"{}",
            quote(value)
        ))?;
        Ok(())
    }

    /// Change the per-command timeout for subsequent commands
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    pub fn terminator(&self) -> SessionTerminator {
        self.terminator.clone()
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub fn is_closed(&self) -> bool {
        self.terminator.is_terminated()
    }

    /// Terminate the shell. Safe to call more than once.
    pub fn close(&mut self) {
        // Closing stdin lets an idle shell exit on its own before the kill
        drop(self.stdin.take());
        cancel::unregister(self.registration);
        self.terminator.terminate();
    }

    fn submit(&mut self, line: &str, echo: bool) -> Result<CommandResult> {
        if is_cancelled() {
            self.close();
            return Err(Error::Cancelled);
        }
        if self.is_closed() {
            return Err(Error::SessionProcess("session is closed".to_string()));
        }
        let line = line.trim_end_matches('\n');
        if echo {
            self.echo.command(line);
        }

        let framed = format!("{} ; echo \"{}:$?\"\n", line, self.sentinel);
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::SessionProcess("shell stdin is closed".to_string()))?;
        stdin
            .write_all(framed.as_bytes())
            .and_then(|()| stdin.flush())
            .map_err(|e| Error::SessionProcess(format!("failed to write to shell: {}", e)))?;

        self.read_result(line)
    }

    /// Read lines until the sentinel, the end of the stream, or the deadline
    fn read_result(&mut self, command: &str) -> Result<CommandResult> {
        let deadline = self.timeout.map(|t| (Instant::now() + t, t));
        let mut output: Vec<String> = Vec::new();

        loop {
            let event = match deadline {
                None => self.lines.recv().unwrap_or(ReadEvent::Eof),
                Some((at, limit)) => {
                    match self.lines.recv_timeout(at.saturating_duration_since(Instant::now())) {
                        Ok(event) => event,
                        Err(RecvTimeoutError::Timeout) => {
                            warn!("Command exceeded {}s, terminating shell", limit.as_secs());
                            self.close();
                            return Err(Error::SessionTimedOut {
                                command: command.to_string(),
                                secs: limit.as_secs(),
                            });
                        }
                        Err(RecvTimeoutError::Disconnected) => ReadEvent::Eof,
                    }
                }
            };

            let line = match event {
                ReadEvent::Line(line) => line,
                ReadEvent::Eof if is_cancelled() => {
                    self.close();
                    return Err(Error::Cancelled);
                }
                ReadEvent::Eof => {
                    let reason = if self.is_closed() {
                        "session was terminated"
                    } else {
                        "shell exited"
                    };
                    self.close();
                    return Err(Error::SessionProcess(format!("{} while running: {}", reason, command)));
                }
                ReadEvent::Failed(e) => {
                    self.close();
                    return Err(Error::SessionProcess(format!("failed to read shell output: {}", e)));
                }
            };

            if let Some(caps) = self.pattern.captures(&line) {
                let (start, status) = match (caps.get(0), caps.get(1)) {
                    (Some(all), Some(status)) => (all.start(), status.as_str()),
                    _ => continue,
                };
                // Output that did not end in a newline shares the sentinel's line
                let before = &line[..start];
                if !before.is_empty() {
                    self.echo.output(before);
                    output.push(before.to_string());
                }
                let status = status.parse::<i32>().map_err(|e| {
                    Error::SessionProcess(format!("unreadable exit status {:?}: {}", status, e))
                })?;
                return Ok(CommandResult {
                    status,
                    output: output.join("\n"),
                });
            }

            self.echo.output(&line);
            output.push(line);
        }
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ShellSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellSession")
            .field("working_directory", &self.working_directory)
            .field("timeout", &self.timeout)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn check_var_name(name: &str) -> Result<()> {
    if is_valid_var_name(name) {
        Ok(())
    } else {
        Err(Error::ParseError(format!("invalid environment variable name: {}", name)))
    }
}

/// Drain the shell's stdout on a dedicated thread
///
/// The thread always reads, so a chatty build never blocks on a full pipe.
fn spawn_reader(stdout: ChildStdout, tx: mpsc::Sender<ReadEvent>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let event = match reader.read_until(b'\n', &mut buf) {
                Ok(0) => ReadEvent::Eof,
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                    }
                    ReadEvent::Line(String::from_utf8_lossy(&buf).into_owned())
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => ReadEvent::Failed(e),
            };
            let last = !matches!(event, ReadEvent::Line(_));
            if tx.send(event).is_err() || last {
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Records everything for assertions
    #[derive(Clone, Default)]
    struct Recorder {
        commands: Arc<Mutex<Vec<String>>>,
        lines: Arc<Mutex<Vec<String>>>,
    }

    impl EchoSink for Recorder {
        fn command(&self, command: &str) {
            self.commands.lock().unwrap().push(command.to_string());
        }

        fn output(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }
    }

    fn session(dir: &TempDir) -> ShellSession {
        ShellSession::open_with_echo(dir.path(), ShellConfig::default(), Box::new(NullEcho)).unwrap()
    }

    #[test]
    fn test_run_echo() {
        let dir = TempDir::new().unwrap();
        let mut shell = session(&dir);
        let out = shell.run(&["echo", "ok"]).unwrap();
        assert_eq!(out, "ok");
    }

    #[test]
    fn test_run_false() {
        let dir = TempDir::new().unwrap();
        let mut shell = session(&dir);
        match shell.run(&["false"]) {
            Err(Error::CommandFailed { command, status, output }) => {
                assert_eq!(command, "false");
                assert_ne!(status, 0);
                assert!(!output.contains("__crossbake_done_"));
            }
            other => panic!("expected CommandFailed, got {:?}", other),
        }
        // The session survives a failed command
        assert_eq!(shell.run(&["echo", "still"]).unwrap(), "still");
    }

    #[test]
    fn test_output_without_trailing_newline() {
        let dir = TempDir::new().unwrap();
        let mut shell = session(&dir);
        let result = shell.execute("printf 'a\\nb'").unwrap();
        assert_eq!(result.status, 0);
        assert_eq!(result.output, "a\nb");
    }

    #[test]
    fn test_stderr_is_captured() {
        let dir = TempDir::new().unwrap();
        let mut shell = session(&dir);
        let result = shell.execute("echo oops >&2; exit_code=3; (exit $exit_code)").unwrap();
        assert_eq!(result.status, 3);
        assert_eq!(result.output, "oops");
    }

    #[test]
    fn test_arguments_are_quoted() {
        let dir = TempDir::new().unwrap();
        let mut shell = session(&dir);
        let out = shell.run(&["echo", "$HOME; echo injected", "it's"]).unwrap();
        assert_eq!(out, "$HOME; echo injected it's");
    }

    #[test]
    fn test_environment_persists() {
        let dir = TempDir::new().unwrap();
        let mut shell = session(&dir);
        shell.export_var("CROSSBAKE_TEST", "one two").unwrap();
        shell.append_var("CROSSBAKE_TEST", "-std=gnu99").unwrap();
        shell.append_var("CROSSBAKE_FRESH", "-O2").unwrap();
        assert_eq!(shell.run_line("echo \"$CROSSBAKE_TEST\"").unwrap(), "one two -std=gnu99");
        assert_eq!(shell.run_line("echo \"$CROSSBAKE_FRESH\"").unwrap(), "-O2");
        assert!(shell.export_var("BAD-NAME", "x").is_err());
    }

    #[test]
    fn test_working_directory() {
        let dir = TempDir::new().unwrap();
        let mut shell = session(&dir);
        let pwd = shell.run(&["pwd", "-P"]).unwrap();
        assert_eq!(PathBuf::from(pwd), std::fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_activate() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("environment-setup");
        std::fs::write(&script, "export CROSSBAKE_SDK=armv7\n").unwrap();

        let mut shell = session(&dir);
        shell.activate(&script).unwrap();
        assert_eq!(shell.run_line("echo $CROSSBAKE_SDK").unwrap(), "armv7");

        let err = shell.activate(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, Error::ToolchainActivation(_)));
    }

    #[test]
    fn test_echo_sink_sees_commands_and_output() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::default();
        let mut shell =
            ShellSession::open_with_echo(dir.path(), ShellConfig::default(), Box::new(recorder.clone()))
                .unwrap();
        shell.run(&["echo", "hello"]).unwrap();

        assert_eq!(*recorder.commands.lock().unwrap(), vec!["echo hello".to_string()]);
        assert_eq!(*recorder.lines.lock().unwrap(), vec!["hello".to_string()]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut shell = session(&dir);
        shell.close();
        shell.close();
        assert!(shell.is_closed());
        assert!(matches!(shell.run(&["true"]), Err(Error::SessionProcess(_))));
    }

    #[test]
    fn test_shell_exit_is_session_error() {
        let dir = TempDir::new().unwrap();
        let mut shell = session(&dir);
        let err = shell.run_line("exit 0").unwrap_err();
        assert!(matches!(err, Error::SessionProcess(_)));
    }

    #[test]
    fn test_timeout_terminates_session() {
        let dir = TempDir::new().unwrap();
        let mut shell = session(&dir);
        shell.set_timeout(Some(Duration::from_millis(300)));

        let err = shell.run(&["sleep", "30"]).unwrap_err();
        assert!(matches!(err, Error::SessionTimedOut { .. }));
        assert!(shell.is_closed());
    }

    #[test]
    fn test_terminator_from_another_thread() {
        let dir = TempDir::new().unwrap();
        let mut shell = session(&dir);
        let terminator = shell.terminator();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            terminator.terminate();
        });

        let err = shell.run(&["sleep", "30"]).unwrap_err();
        handle.join().unwrap();
        assert!(matches!(err, Error::SessionProcess(_)));
    }
}
