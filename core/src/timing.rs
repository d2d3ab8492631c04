//! Frame pacing for the run loop.

use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;

/// How the run loop spaces core steps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pacing {
    /// One step per frame interval of the loaded game.
    #[default]
    Realtime,
    /// Step as fast as the drivers allow.
    Unthrottled,
}

/// Falling further behind than this many intervals resyncs to "now"
/// instead of running a burst of catch-up steps.
const MAX_LAG_FRAMES: u32 = 4;

/// Sleeps out the rest of each frame interval.
#[derive(Debug)]
pub struct FramePacer {
    pacing: Pacing,
    interval: Duration,
    deadline: Option<Instant>,
    resyncs: u64,
}

impl FramePacer {
    pub fn new(pacing: Pacing, interval: Duration) -> Self {
        Self {
            pacing,
            interval,
            deadline: None,
            resyncs: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Times the pacer gave up on catching up.
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Call once after every step.
    pub fn wait(&mut self) {
        if self.pacing == Pacing::Unthrottled {
            return;
        }
        let now = Instant::now();
        let deadline = self.deadline.unwrap_or(now) + self.interval;
        if deadline > now {
            thread::sleep(deadline - now);
            self.deadline = Some(deadline);
        } else if now - deadline > self.interval * MAX_LAG_FRAMES {
            log::debug!("run loop fell {:?} behind; resyncing", now - deadline);
            self.resyncs += 1;
            self.deadline = Some(now);
        } else {
            self.deadline = Some(deadline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unthrottled_never_sleeps() {
        let mut pacer = FramePacer::new(Pacing::Unthrottled, Duration::from_secs(1));
        let start = Instant::now();
        for _ in 0..100 {
            pacer.wait();
        }
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn realtime_spaces_steps() {
        let interval = Duration::from_millis(5);
        let mut pacer = FramePacer::new(Pacing::Realtime, interval);
        let start = Instant::now();
        for _ in 0..4 {
            pacer.wait();
        }
        assert!(start.elapsed() >= interval * 4);
    }

    #[test]
    fn long_stall_resyncs() {
        let interval = Duration::from_millis(1);
        let mut pacer = FramePacer::new(Pacing::Realtime, interval);
        pacer.wait();
        thread::sleep(Duration::from_millis(20));
        pacer.wait();
        assert_eq!(pacer.resyncs(), 1);
    }
}
