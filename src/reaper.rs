//! Exit-time cleanup of every child the registry knows about.

use std::{panic, sync::Once};

use nix::{
    errno::Errno,
    sys::wait::{waitpid, WaitPidFlag, WaitStatus},
    unistd::Pid,
};

use crate::{registry, supervisor::handle::SupervisorHandle, task::ExitStatus};

/// Shuts down every registered supervisor, deepest kinds first, then reaps
/// any other child of this process that has already exited.
///
/// Each instance is shut down per its own type's policy, so an instance whose
/// type does not terminate on shutdown is waited for. Failures are logged and
/// do not stop the walk. Safe to call any number of times.
pub fn reap_all() {
    for handle in registry::depth_first() {
        if let Err(e) = handle.shutdown() {
            tracing::warn!(kind = handle.kind_name(), error = %e, "failed to shut down subprocess");
        }
    }
    // Re-read: supervisors created during the walk must still be matched.
    sweep(&registry::depth_first());
}

/// Collects every child that has already exited. Never blocks on a running child.
fn sweep(known: &[SupervisorHandle]) {
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => return,
            Ok(status) => settle_swept(status, known),
            Err(Errno::EINTR) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "child sweep failed");
                return;
            }
        }
    }
}

/// Hands a swept status to the handle owning that pid, if any, so it is never
/// signalled or waited on again.
fn settle_swept(status: WaitStatus, known: &[SupervisorHandle]) {
    let (Some(pid), Some(exit)) = (status.pid(), ExitStatus::from_wait(status)) else {
        return;
    };
    match known.iter().find(|handle| handle.pid() == Some(pid)) {
        Some(handle) => {
            tracing::debug!(kind = handle.kind_name(), %pid, %exit, "swept registered child");
            handle.record(exit);
        }
        None => tracing::debug!(%pid, %exit, "reaped unregistered child"),
    }
}

extern "C" fn reap_at_exit() {
    // Unwinding out of an atexit hook would abort.
    let _ = panic::catch_unwind(reap_all);
}

/// Registers [`reap_all`] to run when the process exits normally.
pub(crate) fn install() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        // SAFETY: `reap_at_exit` is a plain `extern "C" fn()` that never unwinds.
        if unsafe { libc::atexit(reap_at_exit) } != 0 {
            tracing::warn!("could not register exit reaper");
        }
    });
}
