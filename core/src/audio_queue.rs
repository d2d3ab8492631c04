use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::driver::DriverError;

/// How a full queue treats a new push.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Drop the oldest samples to make room. Never waits.
    DropOldest,
    /// Wait up to the given time for the consumer to make room.
    Block(Duration),
}

/// Bounded queue of interleaved samples between the run loop (producer)
/// and a device callback thread (consumer).
///
/// Pushes and pops keep whole frames together as long as both sides use
/// the channel count the queue was created with.
#[derive(Clone)]
pub struct SampleQueue {
    shared: Arc<Shared>,
}

struct Shared {
    samples: Mutex<VecDeque<i16>>,
    room: Condvar,
    capacity: usize,
    channels: usize,
    underruns: AtomicU64,
    dropped: AtomicU64,
}

impl SampleQueue {
    /// `capacity` is in samples and is rounded down to whole frames.
    pub fn new(capacity: usize, channels: u16) -> Self {
        let channels = channels.max(1) as usize;
        let capacity = (capacity / channels).max(1) * channels;
        Self {
            shared: Arc::new(Shared {
                samples: Mutex::new(VecDeque::with_capacity(capacity)),
                room: Condvar::new(),
                capacity,
                channels,
                underruns: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<i16>> {
        self.shared
            .samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `samples`, applying `policy` when there is not enough room.
    ///
    /// Returns the number of samples discarded to fit. A chunk larger than
    /// the whole queue keeps only its newest samples. Under
    /// [`OverflowPolicy::Block`] the push fails with
    /// [`DriverError::Timeout`] if room does not appear in time; nothing is
    /// queued in that case.
    pub fn push(&self, samples: &[i16], policy: OverflowPolicy) -> Result<usize, DriverError> {
        let cap = self.shared.capacity;
        let mut discarded = 0;
        let samples = if samples.len() > cap {
            discarded = samples.len() - cap;
            &samples[discarded..]
        } else {
            samples
        };

        let mut queue = self.lock();
        match policy {
            OverflowPolicy::DropOldest => {
                let overflow = (queue.len() + samples.len()).saturating_sub(cap);
                if overflow > 0 {
                    // Keep frames aligned when trimming the front.
                    let ch = self.shared.channels;
                    let overflow = overflow.div_ceil(ch) * ch;
                    let n = overflow.min(queue.len());
                    queue.drain(..n);
                    discarded += overflow;
                }
            }
            OverflowPolicy::Block(timeout) => {
                let deadline = Instant::now() + timeout;
                while queue.len() + samples.len() > cap {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(DriverError::Timeout(timeout));
                    }
                    let (guard, _) = self
                        .shared
                        .room
                        .wait_timeout(queue, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    queue = guard;
                }
            }
        }
        queue.extend(samples.iter().copied());

        if discarded > 0 {
            self.shared
                .dropped
                .fetch_add(discarded as u64, Ordering::Relaxed);
        }
        Ok(discarded)
    }

    /// Fill `out` from the queue, padding with silence on underrun.
    ///
    /// Returns the number of real samples written.
    pub fn pop_into(&self, out: &mut [i16]) -> usize {
        let mut queue = self.lock();
        let n = out.len().min(queue.len());
        for (dst, src) in out.iter_mut().zip(queue.drain(..n)) {
            *dst = src;
        }
        drop(queue);
        self.shared.room.notify_all();

        if n < out.len() {
            out[n..].fill(0);
            self.shared.underruns.fetch_add(1, Ordering::Relaxed);
        }
        n
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn channels(&self) -> u16 {
        self.shared.channels as u16
    }

    /// Number of pops that ran dry.
    pub fn underruns(&self) -> u64 {
        self.shared.underruns.load(Ordering::Relaxed)
    }

    /// Total samples discarded by overflow handling.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.lock().clear();
        self.shared.room.notify_all();
    }
}

/// Convert interleaved stereo to `channels` interleaved channels with gain.
///
/// Mono is the average of left and right; layouts wider than stereo repeat
/// the left/right pair.
pub fn remix(stereo: &[i16], channels: u16, gain: f32, out: &mut Vec<i16>) {
    let channels = channels.max(1) as usize;
    out.clear();
    out.reserve(stereo.len() / 2 * channels);

    let scale = |s: i32| -> i16 {
        if gain >= 1.0 {
            s.clamp(i16::MIN as i32, i16::MAX as i32) as i16
        } else {
            (s as f32 * gain).clamp(i16::MIN as f32, i16::MAX as f32) as i16
        }
    };

    for frame in stereo.chunks_exact(2) {
        let (l, r) = (frame[0] as i32, frame[1] as i32);
        if channels == 1 {
            out.push(scale((l + r) / 2));
            continue;
        }
        for c in 0..channels {
            out.push(scale(if c % 2 == 0 { l } else { r }));
        }
    }
}

/// Linear-interpolating sample rate converter for interleaved audio.
///
/// Keeps the fractional position and the last input frame between calls
/// so chunk boundaries do not click.
pub struct Resampler {
    channels: usize,
    step: f64,
    pos: f64,
    last: Vec<i16>,
}

impl Resampler {
    pub fn new(from_rate: u32, to_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1) as usize;
        Self {
            channels,
            step: from_rate as f64 / to_rate.max(1) as f64,
            pos: 0.0,
            last: vec![0; channels],
        }
    }

    pub fn is_identity(&self) -> bool {
        self.step == 1.0
    }

    pub fn process(&mut self, input: &[i16], out: &mut Vec<i16>) {
        let ch = self.channels;
        let frames = input.len() / ch;
        out.clear();
        if frames == 0 {
            return;
        }

        // Frame `i` of the virtual stream is `last` for i == 0, input[i - 1] otherwise.
        let frame = |i: usize, c: usize| -> f64 {
            if i == 0 {
                self.last[c] as f64
            } else {
                input[(i - 1) * ch + c] as f64
            }
        };

        let mut pos = self.pos;
        while pos < frames as f64 {
            let i = pos.floor() as usize;
            let t = pos - i as f64;
            for c in 0..ch {
                let a = frame(i, c);
                let b = frame(i + 1, c);
                out.push((a + (b - a) * t).round() as i16);
            }
            pos += self.step;
        }

        self.pos = pos - frames as f64;
        self.last
            .copy_from_slice(&input[(frames - 1) * ch..frames * ch]);
    }
}
