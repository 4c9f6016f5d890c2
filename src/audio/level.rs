use std::time::{Duration, Instant};

/// Root-mean-square level of a normalized sample frame.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Classifies caller activity from per-frame RMS levels.
///
/// The caller counts as speaking once a frame crosses `threshold`, and the
/// flag is held for `hold` after the last loud frame so natural word gaps
/// do not flap the turn-taking state.
#[derive(Debug)]
pub struct SpeechDetector {
    threshold: f32,
    hold: Duration,
    last_voiced: Option<Instant>,
}

impl SpeechDetector {
    pub fn new(threshold: f32, hold: Duration) -> Self {
        Self {
            threshold,
            hold,
            last_voiced: None,
        }
    }

    /// Feed one level sample; returns the current speaking flag.
    pub fn update(&mut self, level: f32, now: Instant) -> bool {
        if level >= self.threshold {
            self.last_voiced = Some(now);
        }
        self.is_speaking(now)
    }

    pub fn is_speaking(&self, now: Instant) -> bool {
        match self.last_voiced {
            Some(voiced) => now.duration_since(voiced) <= self.hold,
            None => false,
        }
    }
}
