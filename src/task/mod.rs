pub(crate) mod looping;

use nix::sys::{signal::Signal, wait::WaitStatus};

use crate::registry::Kind;

#[cfg(feature = "anyhow")]
pub type TaskError = anyhow::Error;
#[cfg(not(feature = "anyhow"))]
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type TaskResult = Result<(), TaskError>;

/// The trait users implement for work that runs in a supervised child process.
///
/// # Fork semantics
///
/// [`init`](Subprocess::init) runs in the parent, before any child exists.
/// [`run`](Subprocess::run) runs in the child, on a forked **copy** of the
/// value. Mutations made by `run` are never seen by the parent, and changes
/// the parent makes after the fork are never seen by the child.
///
/// Anything the two sides need to share after the fork must go through the
/// OS: a pipe, a file, a socket.
///
/// # Example
///
/// ```rust,no_run
/// use forkvisor::{Subprocess, Supervisor, TaskResult};
/// use std::time::Duration;
///
/// struct Nap {
///     length: Duration,
/// }
///
/// impl Subprocess for Nap {
///     const WAIT_FOR_CHILD_START: bool = true;
///
///     fn run(&mut self) -> TaskResult {
///         std::thread::sleep(self.length);
///         Ok(())
///     }
/// }
///
/// let nap = Supervisor::new(Nap { length: Duration::from_millis(250) }).unwrap();
/// assert!(nap.is_alive());
/// nap.wait().unwrap();
/// ```
pub trait Subprocess: Send + 'static {
    /// Block `start` until the child confirms it is running.
    const WAIT_FOR_CHILD_START: bool = false;
    /// `shutdown` kills the child before joining it. When `false`,
    /// `shutdown` only waits for the child to finish on its own.
    const TERMINATE_ON_SHUTDOWN: bool = true;
    /// Do not start the child from `Supervisor::new`.
    const EXPLICIT_START: bool = false;

    /// Where this type sits in the registry tree.
    fn parent_kind() -> Kind
    where
        Self: Sized,
    {
        Kind::base()
    }

    /// Registry identity of this type.
    fn kind() -> Kind
    where
        Self: Sized,
    {
        Kind::new::<Self>(Self::parent_kind)
    }

    /// Parent-side setup, called once before the child is spawned.
    fn init(&mut self) -> TaskResult {
        Ok(())
    }

    /// Child-side, before the readiness token is sent. An error here ends the
    /// child before `run`, and a waiting `start` reports a startup failure.
    fn prepare(&mut self) -> TaskResult {
        Ok(())
    }

    /// Child-side entry point. Returning ends the child process.
    fn run(&mut self) -> TaskResult;
}

/// How a supervised child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Exited(i32),
    Signaled(Signal),
    /// The child was reaped by someone else, so its status is gone.
    Unknown,
}

impl ExitStatus {
    pub(crate) fn from_wait(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(Self::Exited(code)),
            WaitStatus::Signaled(_, signal, _) => Some(Self::Signaled(signal)),
            _ => None,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(*code),
            _ => None,
        }
    }

    pub fn signal(&self) -> Option<Signal> {
        match self {
            Self::Signaled(signal) => Some(*signal),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Signaled(signal) => write!(f, "killed by {signal}"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}
