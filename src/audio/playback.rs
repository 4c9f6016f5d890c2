use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{info, warn};

// Cap the backlog at ~30s of audio so a long pause cannot grow it unbounded.
const MAX_QUEUED_SAMPLES: usize = 48_000 * 30;

/// Remote-audio playback sink.
///
/// Decoded PCM is pushed into a shared queue; a cpal output stream on a
/// dedicated thread drains it. While paused the output callback emits
/// silence and leaves the queue untouched, so resuming picks up where the
/// remote party left off.
pub struct PlaybackSink {
    queue: Arc<Mutex<VecDeque<f32>>>,
    paused: Arc<AtomicBool>,
    stop_tx: Mutex<Option<std::sync::mpsc::Sender<()>>>,
}

impl PlaybackSink {
    /// Open the default output device at the given mono sample rate.
    pub fn start(sample_rate: u32) -> Result<Self> {
        let queue: Arc<Mutex<VecDeque<f32>>> = Arc::new(Mutex::new(VecDeque::new()));
        let paused = Arc::new(AtomicBool::new(false));
        let (stop_tx, stop_rx) = std::sync::mpsc::channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        {
            let queue = Arc::clone(&queue);
            let paused = Arc::clone(&paused);
            thread::Builder::new()
                .name("audio-playback".to_string())
                .spawn(move || playback_thread(queue, paused, sample_rate, stop_rx, ready_tx))
                .context("failed to spawn playback thread")?;
        }

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                queue,
                paused,
                stop_tx: Mutex::new(Some(stop_tx)),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(anyhow!("playback thread exited before reporting readiness")),
        }
    }

    /// Queue decoded samples for playback, dropping the oldest backlog if
    /// the cap is exceeded.
    pub fn push(&self, samples: &[f32]) {
        if let Ok(mut queue) = self.queue.lock() {
            let overflow = (queue.len() + samples.len()).saturating_sub(MAX_QUEUED_SAMPLES);
            if overflow > 0 {
                let drain_to = overflow.min(queue.len());
                queue.drain(..drain_to);
            }
            queue.extend(samples.iter().copied());
        }
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    /// Stop the output stream. Safe to call more than once.
    pub fn stop(&self) {
        if let Ok(mut guard) = self.stop_tx.lock() {
            if let Some(stop_tx) = guard.take() {
                let _ = stop_tx.send(());
            }
        }
    }
}

impl Drop for PlaybackSink {
    fn drop(&mut self) {
        self.stop();
    }
}

fn playback_thread(
    queue: Arc<Mutex<VecDeque<f32>>>,
    paused: Arc<AtomicBool>,
    sample_rate: u32,
    stop_rx: std::sync::mpsc::Receiver<()>,
    ready_tx: std::sync::mpsc::Sender<Result<()>>,
) {
    let stream = match build_output_stream(queue, paused, sample_rate) {
        Ok(stream) => {
            let _ = ready_tx.send(Ok(()));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let _ = stop_rx.recv();
    drop(stream);
    info!("audio playback stopped");
}

fn build_output_stream(
    queue: Arc<Mutex<VecDeque<f32>>>,
    paused: Arc<AtomicBool>,
    sample_rate: u32,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("no output device available")?;

    let config = cpal::StreamConfig {
        channels: 1,
        sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    info!(
        device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
        sample_rate,
        "opening playback sink"
    );

    let stream = device.build_output_stream(
        &config,
        move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
            if paused.load(Ordering::SeqCst) {
                out.fill(0.0);
                return;
            }
            match queue.lock() {
                Ok(mut queue) => {
                    for slot in out.iter_mut() {
                        *slot = queue.pop_front().unwrap_or(0.0);
                    }
                }
                Err(_) => out.fill(0.0),
            }
        },
        |e| warn!("playback stream error: {}", e),
        None,
    )?;

    stream.play().context("failed to start playback stream")?;
    Ok(stream)
}
