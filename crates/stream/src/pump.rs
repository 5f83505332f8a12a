//! Thread that drives a stage's `run()` on a fixed tick.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::packet::Recycle;
use crate::processor::{Process, Processor};

/// Anything that performs one bounded unit of work per call.
pub trait Runnable: Send {
    /// Returns how many items were handled; zero means the pass was idle.
    fn run(&mut self) -> usize;
}

impl<I, O, P> Runnable for Processor<I, O, P>
where
    I: Recycle + Send + Sync,
    O: Recycle + Send + Sync,
    P: Process<I, O>,
{
    fn run(&mut self) -> usize {
        Processor::run(self)
    }
}

/// Call `stage.run()` until `running` is cleared, sleeping `tick` after idle
/// passes. The stage is handed back when the thread exits.
pub fn spawn<S>(
    name: &str,
    mut stage: S,
    running: Arc<AtomicBool>,
    tick: Duration,
) -> io::Result<JoinHandle<S>>
where
    S: Runnable + 'static,
{
    let thread_name = name.to_string();
    thread::Builder::new().name(thread_name.clone()).spawn(move || {
        log::debug!("{}: pump started", thread_name);
        while running.load(Ordering::Acquire) {
            if stage.run() == 0 {
                thread::sleep(tick);
            }
        }
        // One last pass so nothing already queued is left behind.
        stage.run();
        log::debug!("{}: pump stopped", thread_name);
        stage
    })
}
