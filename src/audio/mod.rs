//! Audio ingest, wake gating, and playback
//!
//! Capture runs continuously and feeds a bounded frame queue; the wake
//! gate watches the stream for triggers. STT and TTS live behind the
//! capability traits in [`crate::stages`].

pub mod capture;
pub mod frames;
pub mod playback;
pub mod wake;

pub use capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
pub use frames::{AudioFrame, DEFAULT_QUEUE_FRAMES, FRAME_SAMPLES, FrameQueue, Utterance};
pub use playback::SpeakerOutput;
pub use wake::{Trigger, WakeGate};
