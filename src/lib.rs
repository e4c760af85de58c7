//! # forkvisor
//!
//! `forkvisor` runs a piece of work in a forked child process and makes sure
//! the child does not outlive the program that spawned it.
//!
//! ## Quick example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use forkvisor::{LoopStatus, Looping, SubprocessLoop, Supervisor, TaskError};
//!
//! struct Ticker {
//!     ticks: u32,
//! }
//!
//! impl SubprocessLoop for Ticker {
//!     fn step(&mut self) -> Result<LoopStatus, TaskError> {
//!         self.ticks += 1;
//!         println!("tick {}", self.ticks);
//!         Ok(LoopStatus::Sleep(Duration::from_millis(500)))
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Returns once the child has confirmed it is running.
//!     let ticker = Supervisor::new(Looping::new(Ticker { ticks: 0 }))?;
//!     std::thread::sleep(Duration::from_secs(2));
//!     ticker.request_stop()?;   // finish the current tick, run `end`, exit
//!     ticker.wait()?;
//!     Ok(())
//! }
//! ```
//!
//! ## What you get
//!
//! * **Fork-and-run** – implement [`Subprocess::run`]; it executes on the
//!   child's private copy of your value.
//! * **Readiness handshake** – opt in with `WAIT_FOR_CHILD_START` and `start`
//!   only returns once the child is running, or fails with
//!   [`SupervisorError::StartupFailure`].
//! * **Two ways to stop** – [`Supervisor::shutdown`] kills and joins;
//!   [`Supervisor::request_stop`] asks a loop child to wind down cleanly.
//! * **Nothing left behind** – every supervisor is registered at
//!   construction; [`reap_all`] runs at normal exit and shuts all of them
//!   down, even ones the caller dropped.
//!
//! ## API overview
//!
//! | Supervisor method     | Purpose                                                 |
//! | --------------------- | ------------------------------------------------------- |
//! | `new(task)`           | Register, run `init`, start unless `EXPLICIT_START`     |
//! | `create(task)`        | Register and run `init` only                            |
//! | `start()`             | Fork the child (once)                                   |
//! | `wait()`              | Block until the child exits                             |
//! | `shutdown()`          | Kill (if `TERMINATE_ON_SHUTDOWN`) and join              |
//! | `request_stop()`      | Send SIGTERM for a graceful loop stop                   |
//! | `handle()`            | Cloneable [`SupervisorHandle`], with async `join()`     |
//!
//! Unix only.

pub use registry::{instances_of, kinds, Kind};
pub use reaper::reap_all;
pub use supervisor::{handle::SupervisorHandle, Supervisor, SupervisorError};
pub use task::{
    looping::{LoopStatus, Looping, SubprocessLoop},
    ExitStatus, Subprocess, TaskError, TaskResult,
};

mod reaper;
mod registry;
mod supervisor;
mod task;
