// src/shell/echo.rs

//! Where a session reports the commands it sends and the output it reads

use tracing::{debug, info};

/// Receives every submitted command and every output line of a session
///
/// Output is always drained from the shell whether or not a sink shows it.
pub trait EchoSink: Send {
    /// A command line was written to the shell
    fn command(&self, command: &str);

    /// One line of output was read back
    fn output(&self, line: &str);
}

/// Logs through `tracing`
///
/// Commands go out at info. Output lines are debug-level unless `verbose`
/// is set, in which case they are logged at info as well.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEcho {
    pub verbose: bool,
}

impl TracingEcho {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl EchoSink for TracingEcho {
    fn command(&self, command: &str) {
        info!("$ {}", command);
    }

    fn output(&self, line: &str) {
        if self.verbose {
            info!("{}", line);
        } else {
            debug!("{}", line);
        }
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEcho;

impl EchoSink for NullEcho {
    fn command(&self, _command: &str) {}

    fn output(&self, _line: &str) {}
}
