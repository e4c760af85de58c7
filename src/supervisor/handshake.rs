//! One-shot readiness signal from a freshly forked child to its parent.

use std::{
    fs::File,
    io::{self, Read, Write},
};

use nix::unistd::pipe;

const READY: u8 = 1;

/// Child side. Consumed by [`notify`](ReadyNotifier::notify).
pub(crate) struct ReadyNotifier {
    writer: File,
}

/// Parent side. Consumed by [`wait`](ReadyWaiter::wait).
pub(crate) struct ReadyWaiter {
    reader: File,
}

pub(crate) fn channel() -> nix::Result<(ReadyNotifier, ReadyWaiter)> {
    let (read, write) = pipe()?;
    Ok((
        ReadyNotifier {
            writer: File::from(write),
        },
        ReadyWaiter {
            reader: File::from(read),
        },
    ))
}

impl ReadyNotifier {
    pub(crate) fn notify(mut self) -> io::Result<()> {
        self.writer.write_all(&[READY])
    }
}

impl ReadyWaiter {
    /// Blocks until the token arrives. Every notifier must be dropped on this
    /// side first, or a child that dies early leaves this blocked forever.
    pub(crate) fn wait(mut self) -> io::Result<()> {
        let mut token = [0u8; 1];
        self.reader.read_exact(&mut token)?;
        if token[0] != READY {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "unexpected handshake token",
            ));
        }
        Ok(())
    }
}
