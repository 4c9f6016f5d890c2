use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use audiopus::coder::{Decoder as OpusDecoder, Encoder as OpusEncoder};
use audiopus::packet::Packet;
use audiopus::{Application, Channels, MutSignals, SampleRate};
use bytes::Bytes;
use rubato::{FftFixedIn, Resampler};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use super::{RealtimeTransport, SdpNegotiator, TransportEvent};
use crate::audio::{rms, CaptureFrame, MicCapture, PlaybackSink};
use crate::backend::EphemeralCredential;
use crate::error::SessionError;

// Both tracks speak Opus at 48kHz mono.
const LINK_SAMPLE_RATE: u32 = 48_000;
// 20ms frames at the link rate.
const FRAME_SAMPLES: usize = 960;
// Input frames fed to the resampler per process call.
const RESAMPLER_CHUNK: usize = 1024;
const SIGNALING_CHANNEL_LABEL: &str = "oai-events";

/// WebRTC-backed realtime transport.
///
/// Owns the peer connection, the signaling data channel, the microphone
/// capture feeding the local Opus track, and the playback sink for the
/// remote track. All handles are check-then-cleared on `close`, so
/// teardown is a no-op when repeated.
pub struct WebRtcTransport {
    negotiator: SdpNegotiator,
    peer: Option<Arc<RTCPeerConnection>>,
    channel: Option<Arc<RTCDataChannel>>,
    capture: Option<MicCapture>,
    playback: Option<Arc<PlaybackSink>>,
    feeder: Option<JoinHandle<()>>,
}

impl WebRtcTransport {
    pub fn new(negotiator: SdpNegotiator) -> Self {
        Self {
            negotiator,
            peer: None,
            channel: None,
            capture: None,
            playback: None,
            feeder: None,
        }
    }

    async fn try_open(
        &mut self,
        credential: &EphemeralCredential,
    ) -> Result<mpsc::Receiver<TransportEvent>, SessionError> {
        let (event_tx, event_rx) = mpsc::channel(256);

        // Local microphone first: a denied mic is terminal before any
        // network work happens.
        let (capture, frames) =
            MicCapture::start().map_err(|e| SessionError::MediaAccess(format!("{:#}", e)))?;
        self.capture = Some(capture);

        // A missing output device degrades to a transcript-only session.
        let playback = match PlaybackSink::start(LINK_SAMPLE_RATE) {
            Ok(sink) => Some(Arc::new(sink)),
            Err(e) => {
                warn!("no playback sink, continuing transcript-only: {:#}", e);
                None
            }
        };
        self.playback = playback.clone();

        let peer = build_peer_connection().await.map_err(|e| {
            SessionError::Negotiation(format!("peer connection setup failed: {:#}", e))
        })?;
        self.peer = Some(Arc::clone(&peer));

        // Outgoing audio: mic frames -> 48kHz mono -> Opus -> local track.
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_string(),
                ..Default::default()
            },
            "audio".to_string(),
            "lingua-live-mic".to_string(),
        ));
        peer.add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| SessionError::Negotiation(format!("failed to add local track: {}", e)))?;
        self.feeder = Some(tokio::spawn(feed_local_track(
            frames,
            track,
            event_tx.clone(),
        )));

        // Incoming audio: remote track -> Opus decode -> playback sink.
        let sink_for_track = playback.clone();
        peer.on_track(Box::new(move |track, _receiver, _transceiver| {
            let sink = sink_for_track.clone();
            Box::pin(async move {
                info!("remote track attached");
                play_remote_track(track, sink).await;
            })
        }));

        // The signaling channel; its open event is the readiness signal.
        let channel = peer
            .create_data_channel(SIGNALING_CHANNEL_LABEL, None)
            .await
            .map_err(|e| {
                SessionError::Negotiation(format!("failed to open signaling channel: {}", e))
            })?;
        self.channel = Some(Arc::clone(&channel));

        let open_tx = event_tx.clone();
        channel.on_open(Box::new(move || {
            Box::pin(async move {
                info!("signaling channel open");
                let _ = open_tx.send(TransportEvent::ChannelOpen).await;
            })
        }));

        let message_tx = event_tx.clone();
        channel.on_message(Box::new(move |message: DataChannelMessage| {
            let tx = message_tx.clone();
            Box::pin(async move {
                match String::from_utf8(message.data.to_vec()) {
                    Ok(text) => {
                        let _ = tx.send(TransportEvent::ChannelMessage(text)).await;
                    }
                    Err(_) => warn!("dropping non-UTF-8 signaling message"),
                }
            })
        }));

        // SDP exchange: local offer out, remote answer in.
        let offer = peer
            .create_offer(None)
            .await
            .map_err(|e| SessionError::Negotiation(format!("failed to create offer: {}", e)))?;
        let mut gather_complete = peer.gathering_complete_promise().await;
        peer.set_local_description(offer).await.map_err(|e| {
            SessionError::Negotiation(format!("failed to set local description: {}", e))
        })?;
        let _ = gather_complete.recv().await;

        let local = peer.local_description().await.ok_or_else(|| {
            SessionError::Negotiation("missing local description after gathering".to_string())
        })?;

        let answer_sdp = self.negotiator.exchange(credential, &local.sdp).await?;
        let answer = RTCSessionDescription::answer(answer_sdp)
            .map_err(|e| SessionError::Negotiation(format!("invalid answer SDP: {}", e)))?;
        peer.set_remote_description(answer).await.map_err(|e| {
            SessionError::Negotiation(format!("failed to apply answer SDP: {}", e))
        })?;

        info!("realtime peer connection negotiated");
        Ok(event_rx)
    }
}

#[async_trait::async_trait]
impl RealtimeTransport for WebRtcTransport {
    async fn open(
        &mut self,
        credential: &EphemeralCredential,
    ) -> Result<mpsc::Receiver<TransportEvent>, SessionError> {
        match self.try_open(credential).await {
            Ok(events) => Ok(events),
            Err(e) => {
                // Partial acquisition must never leak a live microphone or
                // an open connection.
                self.close().await;
                Err(e)
            }
        }
    }

    async fn send_event(&self, payload: String) -> Result<()> {
        let channel = self
            .channel
            .as_ref()
            .context("signaling channel not open")?;
        channel
            .send_text(payload)
            .await
            .context("failed to send client event")?;
        Ok(())
    }

    fn set_playback_paused(&self, paused: bool) {
        if let Some(sink) = &self.playback {
            sink.set_paused(paused);
        }
    }

    async fn close(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        if let Some(channel) = self.channel.take() {
            if let Err(e) = channel.close().await {
                debug!("signaling channel close: {}", e);
            }
        }
        if let Some(peer) = self.peer.take() {
            if let Err(e) = peer.close().await {
                debug!("peer connection close: {}", e);
            }
        }
        if let Some(sink) = self.playback.take() {
            sink.stop();
        }
        info!("realtime transport closed");
    }

    fn name(&self) -> &str {
        "webrtc"
    }
}

async fn build_peer_connection() -> Result<Arc<RTCPeerConnection>> {
    let mut media = MediaEngine::default();
    media.register_default_codecs()?;

    let registry = register_default_interceptors(Registry::new(), &mut media)?;

    let api = APIBuilder::new()
        .with_media_engine(media)
        .with_interceptor_registry(registry)
        .build();

    // No ICE servers: the remote endpoint answers with its own candidates.
    let peer = api.new_peer_connection(RTCConfiguration::default()).await?;
    Ok(Arc::new(peer))
}

/// Pump microphone frames into the local track: resample to the link rate,
/// frame into 20ms blocks, Opus-encode, and report per-frame levels for
/// the caller-speaking detector.
async fn feed_local_track(
    mut frames: mpsc::Receiver<CaptureFrame>,
    track: Arc<TrackLocalStaticSample>,
    events: mpsc::Sender<TransportEvent>,
) {
    let encoder = match OpusEncoder::new(SampleRate::Hz48000, Channels::Mono, Application::Voip) {
        Ok(encoder) => encoder,
        Err(e) => {
            warn!("opus encoder unavailable: {}", e);
            return;
        }
    };

    let mut resampler: Option<FftFixedIn<f32>> = None;
    let mut resampler_rate = 0u32;
    let mut pending: Vec<f32> = Vec::new();
    let mut ready: Vec<f32> = Vec::new();
    let mut packet = vec![0u8; 1500];

    while let Some(frame) = frames.recv().await {
        let _ = events.try_send(TransportEvent::MicLevel(rms(&frame.samples)));

        if frame.sample_rate == LINK_SAMPLE_RATE {
            ready.extend_from_slice(&frame.samples);
        } else {
            if resampler.is_none() || resampler_rate != frame.sample_rate {
                match FftFixedIn::<f32>::new(
                    frame.sample_rate as usize,
                    LINK_SAMPLE_RATE as usize,
                    RESAMPLER_CHUNK,
                    2,
                    1,
                ) {
                    Ok(r) => {
                        resampler_rate = frame.sample_rate;
                        pending.clear();
                        resampler = Some(r);
                    }
                    Err(e) => {
                        warn!("resampler setup failed: {}", e);
                        return;
                    }
                }
            }
            pending.extend_from_slice(&frame.samples);
            if let Some(r) = resampler.as_mut() {
                while pending.len() >= RESAMPLER_CHUNK {
                    let chunk: Vec<f32> = pending.drain(..RESAMPLER_CHUNK).collect();
                    match r.process(&[chunk], None) {
                        Ok(mut out) => ready.append(&mut out.remove(0)),
                        Err(e) => warn!("resample failed: {}", e),
                    }
                }
            }
        }

        while ready.len() >= FRAME_SAMPLES {
            let block: Vec<i16> = ready
                .drain(..FRAME_SAMPLES)
                .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .collect();
            match encoder.encode(&block, &mut packet) {
                Ok(len) => {
                    let sample = Sample {
                        data: Bytes::copy_from_slice(&packet[..len]),
                        duration: Duration::from_millis(20),
                        ..Default::default()
                    };
                    if let Err(e) = track.write_sample(&sample).await {
                        debug!("local track write failed, stopping feeder: {}", e);
                        return;
                    }
                }
                Err(e) => warn!("opus encode failed: {}", e),
            }
        }
    }

    debug!("local track feeder finished");
}

/// Read the remote track, decode Opus packets, and queue them for
/// playback. Without a sink the track is still drained so the transport
/// keeps consuming RTP.
async fn play_remote_track(track: Arc<TrackRemote>, sink: Option<Arc<PlaybackSink>>) {
    let Some(sink) = sink else {
        while track.read_rtp().await.is_ok() {}
        return;
    };

    let mut decoder = match OpusDecoder::new(SampleRate::Hz48000, Channels::Mono) {
        Ok(decoder) => decoder,
        Err(e) => {
            warn!("opus decoder unavailable: {}", e);
            return;
        }
    };
    // Opus frames span up to 120ms at 48kHz.
    let mut pcm = vec![0i16; 5760];

    while let Ok((packet, _)) = track.read_rtp().await {
        if packet.payload.is_empty() {
            continue;
        }

        let parsed = match Packet::try_from(packet.payload.as_ref()) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("bad opus packet: {}", e);
                continue;
            }
        };
        let output = match MutSignals::try_from(&mut pcm[..]) {
            Ok(output) => output,
            Err(e) => {
                warn!("decode buffer unavailable: {}", e);
                return;
            }
        };

        match decoder.decode(Some(parsed), output, false) {
            Ok(decoded) => {
                let samples: Vec<f32> = pcm[..decoded]
                    .iter()
                    .map(|&s| s as f32 / i16::MAX as f32)
                    .collect();
                sink.push(&samples);
            }
            Err(e) => debug!("opus decode failed: {}", e),
        }
    }

    debug!("remote track reader finished");
}
