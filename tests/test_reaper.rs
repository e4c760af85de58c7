mod common;

use std::time::Duration;

use nix::{errno::Errno, sys::signal::kill, unistd::Pid};

use forkvisor::{
    instances_of, kinds, reap_all, Kind, LoopStatus, Looping, Subprocess, SubprocessLoop,
    Supervisor, TaskError, TaskResult,
};

use common::Lingering;

struct Napper;

impl Subprocess for Napper {
    const WAIT_FOR_CHILD_START: bool = true;

    fn run(&mut self) -> TaskResult {
        std::thread::sleep(Duration::from_secs(30));
        Ok(())
    }
}

/// Registered underneath `Napper`.
struct DeepNapper;

impl Subprocess for DeepNapper {
    fn parent_kind() -> Kind {
        Kind::of::<Napper>()
    }

    fn run(&mut self) -> TaskResult {
        std::thread::sleep(Duration::from_secs(30));
        Ok(())
    }
}

struct Spinner;

impl SubprocessLoop for Spinner {
    fn step(&mut self) -> Result<LoopStatus, TaskError> {
        Ok(LoopStatus::Continue)
    }
}

fn is_gone(pid: Pid) -> bool {
    kill(pid, None) == Err(Errno::ESRCH)
}

// One test per binary: the reaper touches every child of this process.
#[test]
fn test_reap_all_leaves_no_children() {
    // Nothing registered yet.
    reap_all();

    let mut pids = Vec::new();
    for _ in 0..3 {
        pids.push(Supervisor::new(Napper).unwrap().pid().unwrap());
        pids.push(Supervisor::new(DeepNapper).unwrap().pid().unwrap());
        pids.push(Supervisor::new(Looping::new(Spinner)).unwrap().pid().unwrap());
    }
    pids.push(
        Supervisor::new(Lingering {
            length: Duration::from_millis(200),
        })
        .unwrap()
        .pid()
        .unwrap(),
    );

    let deep = kinds()
        .into_iter()
        .find(|kind| *kind == Kind::of::<DeepNapper>())
        .unwrap();
    assert_eq!(deep.parent(), Some(Kind::of::<Napper>()));
    assert_eq!(instances_of(Kind::of::<DeepNapper>()).len(), 3);
    assert_eq!(instances_of(Kind::of_loop::<Spinner>()).len(), 3);

    reap_all();

    assert!(pids.iter().all(|pid| is_gone(*pid)));
    for kind in [Kind::of::<Napper>(), Kind::of::<DeepNapper>(), Kind::of_loop::<Spinner>()] {
        assert!(instances_of(kind).iter().all(|handle| !handle.is_alive()));
    }

    // Idempotent.
    reap_all();
}
