//! periodic.rs
//! Cancellable periodic timer thread.
//!
//! Each firing schedules its successor `period` after the firing instant and only then
//! runs the body, so ticks never overlap and execution time shows up as drift rather
//! than being compensated. The bulk of each wait blocks on the cancel channel; the last
//! stretch is finished with a spin sleeper for sub-millisecond release accuracy.

use std::{
    io,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, bounded};
use log::{debug, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

/// Portion of each wait handed to the spin sleeper instead of the channel.
const SPIN_MARGIN: Duration = Duration::from_micros(500);

/// Timing of one firing, handed to the tick body.
#[derive(Debug, Clone, Copy)]
pub struct TickTiming {
    pub fired: Instant,
    /// Time since the previous firing (or since the timer started).
    pub interval: Duration,
    /// Period the firing was scheduled with.
    pub nominal: Duration,
}

impl TickTiming {
    pub fn jitter_us(&self) -> u64 {
        self.interval.as_micros().abs_diff(self.nominal.as_micros()) as u64
    }
}

pub struct PeriodicTimer {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTimer {
    /// Spawn the timer thread. `period` is re-read after every firing so period
    /// changes apply from the next scheduled tick.
    pub fn spawn<P, F>(name: &str, realtime: bool, period: P, body: F) -> io::Result<Self>
    where
        P: Fn() -> Duration + Send + 'static,
        F: FnMut(TickTiming) + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        let builder = thread::Builder::new().name(name.to_string());

        let handle = if realtime {
            builder.spawn_with_priority(ThreadPriority::Max, move |res| {
                if let Err(e) = res {
                    warn!("[Timer] could not raise thread priority: {:?}", e);
                }
                run_timer(cancel_rx, period, body);
            })?
        } else {
            builder.spawn(move || run_timer(cancel_rx, period, body))?
        };

        Ok(Self {
            cancel: Some(cancel_tx),
            handle: Some(handle),
        })
    }

    /// Cancel the pending firing and wait for the thread. A body already running
    /// completes first.
    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                // cancelled from inside the body: the loop exits on its next wait
                return;
            }
            let _ = handle.join();
        }
    }
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_timer<P, F>(cancel: Receiver<()>, period: P, mut body: F)
where
    P: Fn() -> Duration,
    F: FnMut(TickTiming),
{
    let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);

    let mut nominal = period();
    let mut last_fire = Instant::now();
    let mut next = last_fire + nominal;

    loop {
        let coarse = next.checked_sub(SPIN_MARGIN).unwrap_or(next);
        match cancel.recv_deadline(coarse) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let now = Instant::now();
        if now < next {
            sleeper.sleep(next - now);
        }

        let fired = Instant::now();
        let timing = TickTiming {
            fired,
            interval: fired.duration_since(last_fire),
            nominal,
        };
        last_fire = fired;

        // schedule the successor before running this tick's body
        nominal = period();
        next = fired + nominal;

        body(timing);
    }

    debug!("[Timer] stopped");
}
