// src/shell/cancel.rs

//! Run-wide cancellation on SIGINT and SIGTERM
//!
//! Open sessions register their [`SessionTerminator`] here. Once a
//! cancellation is requested, every registered session is terminated and
//! blocked reads fail with [`Error::Cancelled`]. The signal handler itself
//! only sets a flag; a watcher thread does the terminating.

use super::SessionTerminator;
use crate::error::{Error, Result};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::collections::HashMap;
use std::ffi::c_int;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{LazyLock, Mutex};
use std::thread;
use std::time::Duration;
use tracing::warn;

/// How often the watcher checks for a pending signal
const WATCH_INTERVAL: Duration = Duration::from_millis(100);

static REQUESTED: AtomicBool = AtomicBool::new(false);
static WATCHING: AtomicBool = AtomicBool::new(false);
static NEXT_ID: AtomicU64 = AtomicU64::new(0);

// Open sessions by registration id
static SESSIONS: LazyLock<Mutex<HashMap<u64, SessionTerminator>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

extern "C" fn on_signal(_: c_int) {
    REQUESTED.store(true, Ordering::SeqCst);
}

/// Cancel the run on SIGINT or SIGTERM
///
/// Safe to call more than once.
pub fn install_signal_handlers() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only stores to an atomic
        unsafe { sigaction(signal, &action) }.map_err(|e| {
            Error::SessionProcess(format!("failed to install {} handler: {}", signal, e))
        })?;
    }

    if !WATCHING.swap(true, Ordering::SeqCst) {
        thread::Builder::new()
            .name("crossbake-cancel".to_string())
            .spawn(watch)?;
    }
    Ok(())
}

/// Whether a signal has cancelled the run
pub fn is_cancelled() -> bool {
    REQUESTED.load(Ordering::SeqCst)
}

pub(super) fn register(terminator: SessionTerminator) -> u64 {
    let id = NEXT_ID.fetch_add(1, Ordering::SeqCst);
    sessions().insert(id, terminator);
    id
}

pub(super) fn unregister(id: u64) {
    sessions().remove(&id);
}

fn sessions() -> std::sync::MutexGuard<'static, HashMap<u64, SessionTerminator>> {
    SESSIONS.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn terminate_all() {
    let open: Vec<SessionTerminator> = sessions().drain().map(|(_, t)| t).collect();
    if !open.is_empty() {
        warn!("Cancelled, terminating {} shell session(s)", open.len());
    }
    for terminator in open {
        terminator.terminate();
    }
}

fn watch() {
    loop {
        thread::sleep(WATCH_INTERVAL);
        if is_cancelled() {
            terminate_all();
        }
    }
}
