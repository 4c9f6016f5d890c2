//! Microphone capture, caller speech detection, and remote-audio playback

pub mod capture;
pub mod level;
pub mod playback;

pub use capture::{CaptureFrame, MicCapture};
pub use level::{rms, SpeechDetector};
pub use playback::PlaybackSink;
