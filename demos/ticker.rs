use std::time::Duration;

use forkvisor::{LoopStatus, Looping, Subprocess, SubprocessLoop, Supervisor, TaskError, TaskResult};

struct Ticker {
    emoji: char,
    ticks: u32,
}

impl Ticker {
    fn new(emoji: char) -> Self {
        Self { emoji, ticks: 0 }
    }
}

impl SubprocessLoop for Ticker {
    fn begin(&mut self) -> TaskResult {
        println!("{} Ticker is starting (pid {})", self.emoji, std::process::id());
        Ok(())
    }

    fn step(&mut self) -> Result<LoopStatus, TaskError> {
        self.ticks += 1;
        println!("{} tick {}", self.emoji, self.ticks);
        if self.ticks == 10 {
            println!("{} Ticker is done after 10 ticks", self.emoji);
            return Ok(LoopStatus::Stop);
        }
        Ok(LoopStatus::Sleep(Duration::from_millis(300)))
    }

    fn end(&mut self) -> TaskResult {
        println!("{} Ticker is cleaning up", self.emoji);
        Ok(())
    }
}

struct Nap;

impl Subprocess for Nap {
    fn run(&mut self) -> TaskResult {
        std::thread::sleep(Duration::from_secs(60));
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    // Runs to completion on its own.
    let finisher = Supervisor::new(Looping::new(Ticker::new('🥴')))?;
    // Asked to stop early; still gets to clean up.
    let quitter = Supervisor::new(Looping::new(Ticker::new('🧑')))?;
    // Never held on to: killed by the exit reaper.
    Supervisor::new(Nap)?;

    std::thread::sleep(Duration::from_secs(1));
    quitter.request_stop()?;
    println!("quitter: {:?}", quitter.wait()?);
    println!("finisher: {:?}", finisher.wait()?);
    println!("Leaving the nap to the reaper 🫡");
    Ok(())
}
