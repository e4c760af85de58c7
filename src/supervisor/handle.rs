use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, OnceLock, PoisonError, TryLockError,
};

use nix::{
    errno::Errno,
    sys::{
        signal::{kill, Signal},
        wait::{waitpid, WaitPidFlag, WaitStatus},
    },
    unistd::Pid,
};

use crate::{task::ExitStatus, SupervisorError};

/// Shared view of one supervised child.
///
/// Cloning is cheap; every clone refers to the same child. The registry keeps
/// one clone of every handle, which is how children of dropped supervisors
/// are still found at exit.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    inner: Arc<Slot>,
}

#[derive(Debug)]
struct Slot {
    kind: &'static str,
    terminate_on_shutdown: bool,
    pid: OnceLock<Pid>,
    reaped: AtomicBool,
    /// Held for the whole of a blocking `waitpid`.
    status: Mutex<Option<ExitStatus>>,
}

impl SupervisorHandle {
    pub(crate) fn new(kind: &'static str, terminate_on_shutdown: bool) -> Self {
        Self {
            inner: Arc::new(Slot {
                kind,
                terminate_on_shutdown,
                pid: OnceLock::new(),
                reaped: AtomicBool::new(false),
                status: Mutex::new(None),
            }),
        }
    }

    /// Records the child. Fails if one was already recorded.
    pub(crate) fn bind(&self, pid: Pid) -> bool {
        self.inner.pid.set(pid).is_ok()
    }

    pub fn kind_name(&self) -> &'static str {
        self.inner.kind
    }

    /// Child pid, set once the child has been spawned.
    pub fn pid(&self) -> Option<Pid> {
        self.inner.pid.get().copied()
    }

    pub fn is_started(&self) -> bool {
        self.inner.pid.get().is_some()
    }

    pub fn terminates_on_shutdown(&self) -> bool {
        self.inner.terminate_on_shutdown
    }

    /// Status recorded by a previous `wait`, `shutdown` or `is_alive`.
    /// Never blocks, even while another thread is waiting on the child.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self.inner.status.try_lock() {
            Ok(guard) => *guard,
            Err(TryLockError::Poisoned(poisoned)) => *poisoned.into_inner(),
            // The waiter holds the lock until the child exits.
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Records a status collected by someone else's `waitpid`, so the pid is
    /// never signalled again.
    pub(crate) fn record(&self, exit: ExitStatus) {
        let mut status = self.lock_status();
        if matches!(*status, None | Some(ExitStatus::Unknown)) {
            self.settle(&mut status, exit);
        }
    }

    /// Whether the child is still running. Never blocks on the child.
    pub fn is_alive(&self) -> bool {
        let Some(pid) = self.pid() else {
            return false;
        };
        if self.inner.reaped.load(Ordering::Acquire) {
            return false;
        }
        let mut status = match self.inner.status.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            // Somebody is blocked in waitpid on this child, so it has not been reaped yet.
            Err(TryLockError::WouldBlock) => return true,
        };
        if status.is_some() {
            return false;
        }
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => true,
            Ok(ws) => match ExitStatus::from_wait(ws) {
                Some(exit) => {
                    self.settle(&mut status, exit);
                    false
                }
                None => true,
            },
            Err(Errno::ECHILD) => {
                self.settle(&mut status, ExitStatus::Unknown);
                false
            }
            Err(_) => false,
        }
    }

    /// Blocks until the child exits. `Ok(None)` if it was never started.
    pub fn wait(&self) -> Result<Option<ExitStatus>, SupervisorError> {
        let Some(pid) = self.pid() else {
            return Ok(None);
        };
        let mut status = self.lock_status();
        if let Some(exit) = *status {
            return Ok(Some(exit));
        }
        let exit = loop {
            match waitpid(pid, None) {
                Ok(ws) => {
                    if let Some(exit) = ExitStatus::from_wait(ws) {
                        break exit;
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => break ExitStatus::Unknown,
                Err(e) => return Err(e.into()),
            }
        };
        self.settle(&mut status, exit);
        Ok(Some(exit))
    }

    /// Stops the child according to its type's shutdown policy, then joins it.
    ///
    /// Kills first when the type terminates on shutdown; otherwise only waits,
    /// which blocks for as long as the child keeps running.
    pub fn shutdown(&self) -> Result<Option<ExitStatus>, SupervisorError> {
        let Some(pid) = self.pid() else {
            return Ok(None);
        };
        tracing::debug!(kind = self.inner.kind, %pid, "shutting down");
        if self.inner.terminate_on_shutdown {
            self.terminate()?;
        }
        self.wait()
    }

    /// Sends SIGKILL without joining. The child gets no chance to clean up.
    pub fn terminate(&self) -> Result<(), SupervisorError> {
        self.signal(Signal::SIGKILL)
    }

    /// Sends SIGTERM, asking a loop child to finish its current step, run its
    /// teardown and exit.
    pub fn request_stop(&self) -> Result<(), SupervisorError> {
        self.signal(Signal::SIGTERM)
    }

    fn signal(&self, signal: Signal) -> Result<(), SupervisorError> {
        let Some(pid) = self.pid() else {
            return Ok(());
        };
        if self.inner.reaped.load(Ordering::Acquire) {
            return Ok(());
        }
        match kill(pid, signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Async flavour of [`wait`](Self::wait), run on tokio's blocking pool.
    pub async fn join(&self) -> Result<Option<ExitStatus>, SupervisorError> {
        let handle = self.clone();
        tokio::task::spawn_blocking(move || handle.wait()).await?
    }

    fn settle(&self, status: &mut MutexGuard<'_, Option<ExitStatus>>, exit: ExitStatus) {
        **status = Some(exit);
        self.inner.reaped.store(true, Ordering::Release);
    }

    fn lock_status(&self) -> MutexGuard<'_, Option<ExitStatus>> {
        self.inner
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
