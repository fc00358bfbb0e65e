//! Audio frames and the bounded frame queue
//!
//! Capture produces fixed-size frames continuously; the orchestrator drains
//! them at its own pace. The queue is bounded with a drop-oldest overflow
//! policy — once a turn is open, stale audio is not worth keeping.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::Notify;

/// Samples per frame (100ms at 16kHz)
pub const FRAME_SAMPLES: usize = 1600;

/// Default queue capacity in frames (~6.4s of audio)
pub const DEFAULT_QUEUE_FRAMES: usize = 64;

/// One fixed-size chunk of captured audio
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Mono f32 samples, [`FRAME_SAMPLES`] long
    pub samples: Vec<f32>,
    /// Monotonic capture timestamp
    pub at: Instant,
}

/// A captured utterance, bounded by start and end timestamps
///
/// Owned exclusively by the transcription path for the duration of one
/// turn and dropped after transcription.
#[derive(Debug)]
pub struct Utterance {
    /// Concatenated samples of all frames in the window
    pub samples: Vec<f32>,
    /// Timestamp of the first frame
    pub started: Instant,
    /// Timestamp of the last frame
    pub ended: Instant,
}

impl Utterance {
    /// Start an utterance from its first frame
    #[must_use]
    pub fn begin(frame: &AudioFrame) -> Self {
        Self {
            samples: frame.samples.clone(),
            started: frame.at,
            ended: frame.at,
        }
    }

    /// Append a frame to the window
    pub fn push(&mut self, frame: &AudioFrame) {
        self.samples.extend_from_slice(&frame.samples);
        self.ended = frame.at;
    }

    /// Utterance length in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn seconds(&self) -> f32 {
        self.samples.len() as f32 / super::capture::SAMPLE_RATE as f32
    }
}

struct Inner {
    frames: Mutex<VecDeque<AudioFrame>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

/// Bounded multi-producer frame queue with drop-oldest overflow
#[derive(Clone)]
pub struct FrameQueue {
    inner: Arc<Inner>,
}

impl FrameQueue {
    /// Queue holding at most `capacity` frames
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                frames: Mutex::new(VecDeque::with_capacity(capacity)),
                notify: Notify::new(),
                capacity,
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Push a frame, discarding the oldest frame when full
    ///
    /// Callable from the audio callback thread; never blocks.
    pub fn push(&self, frame: AudioFrame) {
        if let Ok(mut frames) = self.inner.frames.lock() {
            if frames.len() == self.inner.capacity {
                frames.pop_front();
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            }
            frames.push_back(frame);
        }
        self.inner.notify.notify_one();
    }

    /// Pop the oldest frame, waiting until one is available
    pub async fn pop(&self) -> AudioFrame {
        loop {
            if let Ok(mut frames) = self.inner.frames.lock() {
                if let Some(frame) = frames.pop_front() {
                    return frame;
                }
            }
            self.inner.notify.notified().await;
        }
    }

    /// Discard all buffered frames
    pub fn clear(&self) {
        if let Ok(mut frames) = self.inner.frames.lock() {
            frames.clear();
        }
    }

    /// Frames currently buffered
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.frames.lock().map_or(0, |f| f.len())
    }

    /// Whether the queue is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames dropped to overflow so far
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(value: f32) -> AudioFrame {
        AudioFrame {
            samples: vec![value; FRAME_SAMPLES],
            at: Instant::now(),
        }
    }

    #[test]
    fn test_drop_oldest_on_overflow() {
        let queue = FrameQueue::new(2);
        queue.push(frame(0.1));
        queue.push(frame(0.2));
        queue.push(frame(0.3));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
    }

    #[tokio::test]
    async fn test_pop_returns_oldest_surviving_frame() {
        let queue = FrameQueue::new(2);
        queue.push(frame(0.1));
        queue.push(frame(0.2));
        queue.push(frame(0.3));

        let first = queue.pop().await;
        assert!((first.samples[0] - 0.2).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = FrameQueue::new(4);
        let waiter = queue.clone();
        let handle = tokio::spawn(async move { waiter.pop().await });

        tokio::task::yield_now().await;
        queue.push(frame(0.5));

        let popped = handle.await.unwrap();
        assert!((popped.samples[0] - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_utterance_window() {
        let first = frame(0.1);
        let mut utterance = Utterance::begin(&first);
        utterance.push(&frame(0.2));

        assert_eq!(utterance.samples.len(), 2 * FRAME_SAMPLES);
        assert!(utterance.seconds() > 0.19);
    }
}
