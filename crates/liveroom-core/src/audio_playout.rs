use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Seconds of audio kept before the oldest samples are dropped.
const MAX_BUFFERED_SECS: usize = 2;

/// Mixed PCM of every subscribed speaker, waiting for the platform output.
///
/// Remote audio streams push interleaved i16 samples; the platform audio
/// callback pulls fixed-size chunks. When the consumer stalls, the oldest
/// samples are discarded so latency stays bounded.
pub struct AudioPlayoutBuffer {
    buffer: Mutex<VecDeque<i16>>,
    max_samples: usize,
}

impl AudioPlayoutBuffer {
    pub fn new(sample_rate: u32, channels: u32) -> Self {
        let max_samples = sample_rate as usize * channels as usize * MAX_BUFFERED_SECS;
        Self::with_max_samples(max_samples)
    }

    fn with_max_samples(max_samples: usize) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(max_samples)),
            max_samples,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<i16>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_samples(&self, samples: &[i16]) {
        let mut buf = self.lock();
        buf.extend(samples.iter().copied());
        let overflow = buf.len().saturating_sub(self.max_samples);
        if overflow > 0 {
            buf.drain(..overflow);
        }
    }

    /// Fill `out` from the front of the buffer, padding with silence.
    ///
    /// Returns how many real samples were written.
    pub fn pull_samples(&self, out: &mut [i16]) -> usize {
        let mut buf = self.lock();
        let available = buf.len().min(out.len());
        for (slot, sample) in out.iter_mut().zip(buf.drain(..available)) {
            *slot = sample;
        }
        out[available..].fill(0);
        available
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
