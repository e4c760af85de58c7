use std::{
    ffi::c_int,
    panic::{self, AssertUnwindSafe},
    sync::atomic::{AtomicBool, AtomicI32, Ordering},
    time::Duration,
};

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::{
    registry::Kind,
    task::{Subprocess, TaskError, TaskResult},
};

/// Marker for the registry node every loop type hangs under.
pub(crate) struct LoopBase;

/// What a loop step wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStatus {
    /// Pause for the type's idle pause, then step again.
    Continue,
    /// Pause for exactly this long, then step again. Zero means the idle pause.
    Sleep(Duration),
    /// Leave the loop after this step. Teardown still runs.
    Stop,
}

impl LoopStatus {
    /// Pause before the next step, or `None` to stop.
    fn pause(self, idle: Duration) -> Option<Duration> {
        match self {
            Self::Continue => Some(idle),
            Self::Sleep(d) if d.is_zero() => Some(idle),
            Self::Sleep(d) => Some(d),
            Self::Stop => None,
        }
    }
}

impl From<Duration> for LoopStatus {
    fn from(d: Duration) -> Self {
        Self::Sleep(d)
    }
}

/// A child process that repeats a step until told to stop.
///
/// Inside the child, [`begin`](SubprocessLoop::begin) runs once, then
/// [`step`](SubprocessLoop::step) repeats while the loop is alive, then
/// [`end`](SubprocessLoop::end) runs exactly once however the loop ended.
///
/// SIGTERM (see [`Supervisor::request_stop`](crate::Supervisor::request_stop))
/// and SIGINT mark the loop as no longer alive. The step in progress is never
/// interrupted; the loop ends after it and its pause. A forceful
/// [`shutdown`](crate::Supervisor::shutdown) gives none of these guarantees.
///
/// Wrap a loop in [`Looping`] to supervise it.
pub trait SubprocessLoop: Send + 'static {
    const WAIT_FOR_CHILD_START: bool = true;
    const TERMINATE_ON_SHUTDOWN: bool = true;
    const EXPLICIT_START: bool = false;
    /// Pause after a step that returned [`LoopStatus::Continue`].
    const IDLE_PAUSE: Duration = Duration::from_millis(50);

    fn parent_kind() -> Kind
    where
        Self: Sized,
    {
        Kind::looping()
    }

    /// Parent-side setup, called once before the child is spawned.
    fn init(&mut self) -> TaskResult {
        Ok(())
    }

    fn begin(&mut self) -> TaskResult {
        Ok(())
    }

    fn step(&mut self) -> Result<LoopStatus, TaskError>;

    fn end(&mut self) -> TaskResult {
        Ok(())
    }
}

/// Adapts a [`SubprocessLoop`] into a [`Subprocess`].
pub struct Looping<L>(pub L);

impl<L: SubprocessLoop> Looping<L> {
    pub fn new(inner: L) -> Self {
        Self(inner)
    }

    pub fn inner(&self) -> &L {
        &self.0
    }

    pub fn inner_mut(&mut self) -> &mut L {
        &mut self.0
    }

    fn drive(&mut self) -> TaskResult {
        self.0.begin()?;
        while ALIVE.load(Ordering::SeqCst) {
            let status = self.0.step()?;
            match status.pause(L::IDLE_PAUSE) {
                Some(pause) => std::thread::sleep(pause),
                None => ALIVE.store(false, Ordering::SeqCst),
            }
        }
        Ok(())
    }
}

impl<L: SubprocessLoop> Subprocess for Looping<L> {
    const WAIT_FOR_CHILD_START: bool = L::WAIT_FOR_CHILD_START;
    const TERMINATE_ON_SHUTDOWN: bool = L::TERMINATE_ON_SHUTDOWN;
    const EXPLICIT_START: bool = L::EXPLICIT_START;

    fn kind() -> Kind {
        Kind::new::<L>(L::parent_kind)
    }

    fn init(&mut self) -> TaskResult {
        self.0.init()
    }

    /// Arms the stop handlers before the parent is told the child is running,
    /// so a stop requested right after `start` is never lost.
    fn prepare(&mut self) -> TaskResult {
        CAUGHT.store(0, Ordering::SeqCst);
        // Raised before the handlers exist; only ever lowered afterwards.
        ALIVE.store(true, Ordering::SeqCst);
        install_stop_handlers()?;
        Ok(())
    }

    fn run(&mut self) -> TaskResult {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.drive()));

        match Signal::try_from(CAUGHT.load(Ordering::SeqCst)) {
            Ok(Signal::SIGINT) => tracing::debug!("exit via interrupt"),
            Ok(signal) => tracing::info!(%signal, "caught signal"),
            Err(_) => {}
        }

        let ended = self.0.end();
        match outcome {
            Ok(result) => result.and(ended),
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}

/// Liveness of the loop running in this process. Set once in `prepare`, then only cleared.
static ALIVE: AtomicBool = AtomicBool::new(false);
/// Last stop signal received, 0 if none.
static CAUGHT: AtomicI32 = AtomicI32::new(0);

extern "C" fn on_stop_signal(signum: c_int) {
    CAUGHT.store(signum, Ordering::SeqCst);
    ALIVE.store(false, Ordering::SeqCst);
}

fn install_stop_handlers() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_stop_signal),
        // A blocking call inside the current step resumes instead of failing with EINTR.
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for signal in [Signal::SIGTERM, Signal::SIGINT] {
        // SAFETY: the handler only stores to atomics.
        unsafe { sigaction(signal, &action) }?;
    }
    Ok(())
}
