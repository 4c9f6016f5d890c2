use std::thread;

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// A captured microphone frame: mono `f32` samples at `sample_rate`.
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Microphone capture on a dedicated thread.
///
/// cpal streams are not `Send`, so the stream lives on its own thread and
/// hands frames over an mpsc channel. `stop` signals the thread to drop the
/// stream and exit; it is safe to call more than once.
pub struct MicCapture {
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl MicCapture {
    /// Open the default input device and start capturing.
    pub fn start() -> Result<(Self, mpsc::Receiver<CaptureFrame>)> {
        let (frame_tx, frame_rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = std::sync::mpsc::channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        let thread = thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || capture_thread(frame_tx, stop_rx, ready_tx))
            .context("failed to spawn capture thread")?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok((
                Self {
                    stop_tx: Some(stop_tx),
                    thread: Some(thread),
                },
                frame_rx,
            )),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(anyhow!("capture thread exited before reporting readiness")),
        }
    }

    /// Stop capturing and join the capture thread.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_thread(
    frame_tx: mpsc::Sender<CaptureFrame>,
    stop_rx: std::sync::mpsc::Receiver<()>,
    ready_tx: std::sync::mpsc::Sender<Result<()>>,
) {
    let stream = match build_input_stream(frame_tx) {
        Ok(stream) => {
            let _ = ready_tx.send(Ok(()));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    // Hold the stream until the session releases the capture.
    let _ = stop_rx.recv();
    drop(stream);
    info!("microphone capture stopped");
}

fn stream_error(e: cpal::StreamError) {
    warn!("microphone stream error: {}", e);
}

fn build_input_stream(frame_tx: mpsc::Sender<CaptureFrame>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .context("no input device available")?;
    let supported = device
        .default_input_config()
        .context("no default input config")?;

    let sample_rate = supported.sample_rate();
    let channels = supported.channels() as usize;
    let format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    info!(
        device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
        sample_rate,
        channels,
        "opening microphone"
    );

    let stream = match format {
        cpal::SampleFormat::F32 => {
            let tx = frame_tx;
            device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let _ = tx.try_send(fold_mono(data, channels, sample_rate));
                },
                stream_error,
                None,
            )?
        }
        cpal::SampleFormat::I16 => {
            let tx = frame_tx;
            device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let floats: Vec<f32> =
                        data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                    let _ = tx.try_send(fold_mono(&floats, channels, sample_rate));
                },
                stream_error,
                None,
            )?
        }
        other => anyhow::bail!("unsupported input sample format: {:?}", other),
    };

    stream.play().context("failed to start microphone stream")?;
    Ok(stream)
}

/// Fold interleaved channels down to mono by averaging.
fn fold_mono(data: &[f32], channels: usize, sample_rate: u32) -> CaptureFrame {
    let samples = if channels <= 1 {
        data.to_vec()
    } else {
        data.chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    CaptureFrame {
        samples,
        sample_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_input_passes_through() {
        let frame = fold_mono(&[0.1, 0.2, 0.3], 1, 48_000);
        assert_eq!(frame.samples, vec![0.1, 0.2, 0.3]);
        assert_eq!(frame.sample_rate, 48_000);
    }

    #[test]
    fn stereo_input_is_averaged() {
        let frame = fold_mono(&[0.2, 0.4, -0.2, -0.4], 2, 44_100);
        assert_eq!(frame.samples.len(), 2);
        assert!((frame.samples[0] - 0.3).abs() < 1e-6);
        assert!((frame.samples[1] + 0.3).abs() < 1e-6);
    }
}
