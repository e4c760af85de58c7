use std::fs::File;
use std::io::{Read, Write};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use forkvisor::{Subprocess, TaskResult};

#[allow(unused)]
pub const BEGIN: u32 = u32::MAX - 1;
#[allow(unused)]
pub const END: u32 = u32::MAX;

/// Write end of a report channel. Survives the fork, so the child can report back.
#[allow(unused)]
pub struct Tap {
    writer: File,
}

impl Tap {
    pub fn send(&mut self, value: u32) -> std::io::Result<()> {
        self.writer.write_all(&value.to_le_bytes())
    }
}

/// Values written to the tap by any child arrive on the receiver.
#[allow(unused)]
pub fn tap() -> (Tap, mpsc::Receiver<u32>) {
    let (read, write) = nix::unistd::pipe().unwrap();
    let (tx, rx) = mpsc::channel();
    let mut reader = File::from(read);
    thread::spawn(move || {
        let mut buf = [0u8; 4];
        while reader.read_exact(&mut buf).is_ok() {
            if tx.send(u32::from_le_bytes(buf)).is_err() {
                break;
            }
        }
    });
    (
        Tap {
            writer: File::from(write),
        },
        rx,
    )
}

/// Drains everything that arrives until `quiet` passes with nothing new.
#[allow(unused)]
pub fn drain(rx: &mpsc::Receiver<u32>, quiet: Duration) -> Vec<u32> {
    let mut out = Vec::new();
    while let Ok(value) = rx.recv_timeout(quiet) {
        out.push(value);
    }
    out
}

#[allow(unused)]
pub struct Sleeper {
    pub length: Duration,
}

impl Subprocess for Sleeper {
    fn run(&mut self) -> TaskResult {
        thread::sleep(self.length);
        Ok(())
    }
}

#[allow(unused)]
pub struct ReadySleeper {
    pub length: Duration,
}

impl Subprocess for ReadySleeper {
    const WAIT_FOR_CHILD_START: bool = true;

    fn run(&mut self) -> TaskResult {
        thread::sleep(self.length);
        Ok(())
    }
}

/// Only ever joined, never killed, on shutdown.
#[allow(unused)]
pub struct Lingering {
    pub length: Duration,
}

impl Subprocess for Lingering {
    const TERMINATE_ON_SHUTDOWN: bool = false;

    fn run(&mut self) -> TaskResult {
        thread::sleep(self.length);
        Ok(())
    }
}

#[allow(unused)]
pub struct Dormant;

impl Subprocess for Dormant {
    const EXPLICIT_START: bool = true;

    fn run(&mut self) -> TaskResult {
        thread::sleep(Duration::from_secs(30));
        Ok(())
    }
}
