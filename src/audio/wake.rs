//! Wake gate
//!
//! Feeds captured frames to the wake-word capability over a rolling
//! context window and turns confidence scores into triggers. Trigger
//! suppression after a handled turn is the session's cool-down, enforced
//! by the orchestrator; the gate itself is pure detection.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use crate::audio::capture::SAMPLE_RATE;
use crate::audio::frames::AudioFrame;
use crate::stages::WakeWordModel;
use crate::Result;

/// Rolling detector context window length (1s)
const WINDOW_SAMPLES: usize = SAMPLE_RATE as usize;

/// A wake event opening a turn
///
/// Consumed exactly once by the orchestrator.
#[derive(Debug, Clone, Copy)]
pub struct Trigger {
    /// Capture timestamp of the frame that completed detection
    pub at: Instant,
    /// Detector confidence in `[0, 1]`
    pub confidence: f32,
}

/// Threshold gate in front of the wake-word capability
pub struct WakeGate {
    model: Arc<dyn WakeWordModel>,
    threshold: f32,
    window: VecDeque<f32>,
}

impl WakeGate {
    /// Gate over `model` with the given confidence threshold
    #[must_use]
    pub fn new(model: Arc<dyn WakeWordModel>, threshold: f32) -> Self {
        Self {
            model,
            threshold,
            window: VecDeque::with_capacity(WINDOW_SAMPLES),
        }
    }

    /// Feed one frame; returns a trigger when confidence crosses the
    /// threshold
    ///
    /// # Errors
    ///
    /// Returns error if the wake-word capability fails
    pub async fn feed(&mut self, frame: &AudioFrame) -> Result<Option<Trigger>> {
        self.extend_window(&frame.samples);

        let window = self.window.make_contiguous();
        let confidence = self.model.detect(window).await?;

        if confidence >= self.threshold {
            tracing::debug!(confidence, "wake trigger");
            self.window.clear();
            return Ok(Some(Trigger {
                at: frame.at,
                confidence,
            }));
        }

        Ok(None)
    }

    /// Reset the rolling window
    pub fn reset(&mut self) {
        self.window.clear();
    }

    fn extend_window(&mut self, samples: &[f32]) {
        self.window.extend(samples.iter().copied());
        while self.window.len() > WINDOW_SAMPLES {
            self.window.pop_front();
        }
    }
}
