pub(crate) mod handle;
mod handshake;

use std::{
    io,
    panic::{self, AssertUnwindSafe},
};

use nix::unistd::{fork, ForkResult, Pid};
use thiserror::Error;

use crate::{
    registry,
    supervisor::handle::SupervisorHandle,
    task::{ExitStatus, Subprocess, TaskResult},
};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("{kind} was already started as pid {pid}")]
    AlreadyStarted { kind: &'static str, pid: Pid },
    #[error("{kind} (pid {pid}) exited before confirming startup")]
    StartupFailure {
        kind: &'static str,
        pid: Pid,
        #[source]
        source: io::Error,
    },
    #[error("failed to initialise {kind}: {reason}")]
    Init { kind: &'static str, reason: String },
    #[error("system call failed: {0}")]
    Os(#[from] nix::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("blocking wait was cancelled: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Exit code of a child whose `prepare` or `run` returned an error.
const EXIT_FAILURE: i32 = 1;
/// Exit code of a child whose `run` panicked.
const EXIT_PANIC: i32 = 101;

/// Owns one child process running `T::run`.
///
/// Construction registers the instance before any user code runs, so even a
/// supervisor whose `init` fails, or that the caller drops right away, is
/// still found by [`reap_all`](crate::reap_all).
///
/// Dropping a `Supervisor` leaves its child running.
pub struct Supervisor<T: Subprocess> {
    task: T,
    handle: SupervisorHandle,
}

impl<T: Subprocess> Supervisor<T> {
    /// Registers `task` and runs its `init` hook in this process. Never spawns.
    pub fn create(task: T) -> Result<Self, SupervisorError> {
        let kind = T::kind();
        let handle = SupervisorHandle::new(kind.name(), T::TERMINATE_ON_SHUTDOWN);
        registry::register(kind, handle.clone());

        let mut supervisor = Self { task, handle };
        supervisor
            .task
            .init()
            .map_err(|e| SupervisorError::Init {
                kind: kind.name(),
                reason: e.to_string(),
            })?;
        Ok(supervisor)
    }

    /// [`create`](Self::create), then [`start`](Self::start) unless the type
    /// asks for an explicit start.
    pub fn new(task: T) -> Result<Self, SupervisorError> {
        let mut supervisor = Self::create(task)?;
        if !T::EXPLICIT_START {
            supervisor.start()?;
        }
        Ok(supervisor)
    }

    /// Forks the child. Returns once the OS has created it or, for types that
    /// wait for child start, once the child has confirmed it is running.
    ///
    /// Calling this a second time is a bug in the caller and always fails.
    pub fn start(&mut self) -> Result<Pid, SupervisorError> {
        let kind = self.handle.kind_name();
        if let Some(pid) = self.handle.pid() {
            tracing::error!(kind, %pid, "start called on an already started subprocess");
            return Err(SupervisorError::AlreadyStarted { kind, pid });
        }

        let handshake = if T::WAIT_FOR_CHILD_START {
            Some(handshake::channel()?)
        } else {
            None
        };

        // SAFETY: the child only runs `T::run` on its copy of the task and
        // leaves through `_exit`, never returning into the caller's stack.
        match unsafe { fork() }? {
            ForkResult::Child => {
                let notifier = handshake.map(|(notifier, waiter)| {
                    drop(waiter);
                    notifier
                });
                enter_child(&mut self.task, notifier)
            }
            ForkResult::Parent { child } => {
                self.handle.bind(child);
                tracing::debug!(kind, pid = %child, "spawned subprocess");

                if let Some((notifier, waiter)) = handshake {
                    drop(notifier);
                    if let Err(source) = waiter.wait() {
                        tracing::error!(kind, pid = %child, error = %source, "failed to start subprocess");
                        return Err(SupervisorError::StartupFailure {
                            kind,
                            pid: child,
                            source,
                        });
                    }
                }
                Ok(child)
            }
        }
    }

    /// Blocks until the child exits on its own. `Ok(None)` if never started.
    pub fn wait(&self) -> Result<Option<ExitStatus>, SupervisorError> {
        self.handle.wait()
    }

    /// Kills then joins the child, or only joins it when `T` does not
    /// terminate on shutdown. `Ok(None)` if never started.
    pub fn shutdown(&self) -> Result<Option<ExitStatus>, SupervisorError> {
        self.handle.shutdown()
    }

    /// Forceful stop without joining.
    pub fn terminate(&self) -> Result<(), SupervisorError> {
        self.handle.terminate()
    }

    /// Graceful stop: delivers SIGTERM to the child.
    pub fn request_stop(&self) -> Result<(), SupervisorError> {
        self.handle.request_stop()
    }

    pub fn pid(&self) -> Option<Pid> {
        self.handle.pid()
    }

    pub fn is_alive(&self) -> bool {
        self.handle.is_alive()
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.handle.exit_status()
    }

    pub fn handle(&self) -> &SupervisorHandle {
        &self.handle
    }

    /// The parent's copy of the task.
    pub fn task(&self) -> &T {
        &self.task
    }

    pub fn task_mut(&mut self) -> &mut T {
        &mut self.task
    }
}

fn enter_child<T: Subprocess>(
    task: &mut T,
    notifier: Option<handshake::ReadyNotifier>,
) -> ! {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> TaskResult {
        task.prepare()?;
        if let Some(notifier) = notifier {
            notifier.notify()?;
        }
        task.run()
    }));

    let code = match outcome {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "subprocess failed");
            EXIT_FAILURE
        }
        Err(_) => EXIT_PANIC,
    };

    // SAFETY: `_exit` skips the parent's atexit hooks, including the reaper.
    unsafe { libc::_exit(code) }
}
