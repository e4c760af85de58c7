mod common;

use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::Signal;

use forkvisor::{
    instances_of, ExitStatus, Kind, Subprocess, Supervisor, SupervisorError, TaskResult,
};

use common::{Dormant, Lingering, ReadySleeper, Sleeper};

#[test]
fn test_fire_and_forget_runs_then_exits() {
    let sleeper = Supervisor::new(Sleeper {
        length: Duration::from_millis(250),
    })
    .unwrap();

    thread::sleep(Duration::from_millis(200));
    assert!(sleeper.is_alive());

    let status = sleeper.wait().unwrap();
    assert_eq!(status, Some(ExitStatus::Exited(0)));
    assert!(!sleeper.is_alive());
}

#[test]
fn test_handshake_child_is_alive_when_start_returns() {
    let sleeper = Supervisor::new(ReadySleeper {
        length: Duration::from_millis(250),
    })
    .unwrap();

    assert!(sleeper.is_alive());
    sleeper.wait().unwrap();
    assert!(!sleeper.is_alive());
}

#[test]
fn test_unstarted_shutdown_and_wait_are_noops() {
    let dormant = Supervisor::create(Dormant).unwrap();

    let started = Instant::now();
    assert!(dormant.shutdown().unwrap().is_none());
    assert!(dormant.wait().unwrap().is_none());
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(!dormant.is_alive());
}

#[test]
fn test_explicit_start_sets_pid() {
    let mut dormant = Supervisor::new(Dormant).unwrap();
    assert!(dormant.pid().is_none());

    let pid = dormant.start().unwrap();
    assert_eq!(dormant.pid(), Some(pid));
    assert!(dormant.is_alive());

    dormant.shutdown().unwrap();
}

#[test]
fn test_second_start_always_fails() {
    let mut dormant = Supervisor::new(Dormant).unwrap();
    dormant.start().unwrap();
    assert!(matches!(
        dormant.start(),
        Err(SupervisorError::AlreadyStarted { .. })
    ));
    dormant.shutdown().unwrap();

    // Still a precondition violation once the child is gone.
    assert!(matches!(
        dormant.start(),
        Err(SupervisorError::AlreadyStarted { .. })
    ));

    let mut sleeper = Supervisor::new(Sleeper {
        length: Duration::from_millis(10),
    })
    .unwrap();
    assert!(matches!(
        sleeper.start(),
        Err(SupervisorError::AlreadyStarted { .. })
    ));
    sleeper.wait().unwrap();
}

#[test]
fn test_shutdown_kills_by_default() {
    let sleeper = Supervisor::new(ReadySleeper {
        length: Duration::from_secs(30),
    })
    .unwrap();

    let started = Instant::now();
    let status = sleeper.shutdown().unwrap();
    assert_eq!(status, Some(ExitStatus::Signaled(Signal::SIGKILL)));
    assert!(started.elapsed() < Duration::from_secs(5));

    // The recorded status is returned again.
    assert_eq!(sleeper.shutdown().unwrap(), status);
    assert_eq!(sleeper.exit_status(), status);
}

#[test]
fn test_shutdown_waits_when_not_terminating() {
    let lingering = Supervisor::new(Lingering {
        length: Duration::from_millis(500),
    })
    .unwrap();

    let started = Instant::now();
    let status = lingering.shutdown().unwrap();
    assert!(started.elapsed() >= Duration::from_millis(450));
    assert_eq!(status, Some(ExitStatus::Exited(0)));
}

#[test]
fn test_graceful_stop_of_plain_subprocess_uses_default_action() {
    let sleeper = Supervisor::new(ReadySleeper {
        length: Duration::from_secs(30),
    })
    .unwrap();

    sleeper.request_stop().unwrap();
    assert_eq!(
        sleeper.wait().unwrap(),
        Some(ExitStatus::Signaled(Signal::SIGTERM))
    );
}

struct Failing;

impl Subprocess for Failing {
    fn run(&mut self) -> TaskResult {
        Err("nothing to do".into())
    }
}

struct Panicking;

impl Subprocess for Panicking {
    fn run(&mut self) -> TaskResult {
        panic!("boom");
    }
}

#[test]
fn test_child_failures_surface_as_exit_codes() {
    let failing = Supervisor::new(Failing).unwrap();
    assert_eq!(failing.wait().unwrap(), Some(ExitStatus::Exited(1)));

    let panicking = Supervisor::new(Panicking).unwrap();
    assert_eq!(panicking.wait().unwrap(), Some(ExitStatus::Exited(101)));
}

struct Counting {
    initialised: bool,
    runs: u32,
}

impl Subprocess for Counting {
    const WAIT_FOR_CHILD_START: bool = true;

    fn init(&mut self) -> TaskResult {
        self.initialised = true;
        Ok(())
    }

    fn run(&mut self) -> TaskResult {
        if !self.initialised {
            return Err("init did not run before the fork".into());
        }
        self.runs += 1;
        Ok(())
    }
}

#[test]
fn test_init_runs_in_parent_and_run_on_a_copy() {
    let counting = Supervisor::new(Counting {
        initialised: false,
        runs: 0,
    })
    .unwrap();

    assert!(counting.task().initialised);
    assert_eq!(counting.wait().unwrap(), Some(ExitStatus::Exited(0)));
    assert_eq!(counting.task().runs, 0);
}

struct Refusing;

impl Subprocess for Refusing {
    fn init(&mut self) -> TaskResult {
        Err("refused".into())
    }

    fn run(&mut self) -> TaskResult {
        Ok(())
    }
}

#[test]
fn test_failed_init_is_still_registered() {
    let before = instances_of(Kind::of::<Refusing>()).len();

    let err = Supervisor::new(Refusing).err().unwrap();
    assert!(matches!(err, SupervisorError::Init { .. }));

    let instances = instances_of(Kind::of::<Refusing>());
    assert_eq!(instances.len(), before + 1);
    assert!(instances.iter().all(|handle| !handle.is_started()));
}

#[test]
fn test_exit_status_does_not_wait_behind_a_waiter() {
    let sleeper = Supervisor::new(ReadySleeper {
        length: Duration::from_millis(500),
    })
    .unwrap();

    let waiter = {
        let handle = sleeper.handle().clone();
        thread::spawn(move || handle.wait())
    };
    thread::sleep(Duration::from_millis(100));

    let asked = Instant::now();
    assert_eq!(sleeper.exit_status(), None);
    assert!(asked.elapsed() < Duration::from_millis(100));

    assert_eq!(waiter.join().unwrap().unwrap(), Some(ExitStatus::Exited(0)));
    assert_eq!(sleeper.exit_status(), Some(ExitStatus::Exited(0)));
}

#[tokio::test]
async fn test_join_from_async_code() {
    let sleeper = Supervisor::new(ReadySleeper {
        length: Duration::from_millis(100),
    })
    .unwrap();

    let status = sleeper.handle().join().await.unwrap();
    assert_eq!(status, Some(ExitStatus::Exited(0)));
    assert!(!sleeper.is_alive());
}
