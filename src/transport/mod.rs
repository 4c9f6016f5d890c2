//! Realtime transport
//!
//! The peer connection, its multiplexed signaling data channel, and the
//! SDP offer/answer negotiation with the remote speech endpoint. The
//! `RealtimeTransport` trait is the seam between the session core and the
//! WebRTC plumbing; tests drive the session through a scripted
//! implementation instead.

mod negotiation;
mod peer;

pub use negotiation::SdpNegotiator;
pub use peer::WebRtcTransport;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::backend::EphemeralCredential;
use crate::error::SessionError;

/// Events surfaced by a transport to the session's event pump.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The signaling channel reported open. This is the sole
    /// connection-ready signal: the remote endpoint requires the channel
    /// before it will exchange events.
    ChannelOpen,

    /// Raw JSON payload received on the signaling channel.
    ChannelMessage(String),

    /// RMS level of the latest microphone frame.
    MicLevel(f32),
}

/// One realtime peer connection attempt.
///
/// Implementations own every acquired resource (capture, peer connection,
/// channel, playback) and must release all of them on `close` and on a
/// failed `open`. `close` is idempotent.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Acquire local media, connect, and negotiate. Returns the event
    /// stream consumed by the session pump.
    async fn open(
        &mut self,
        credential: &EphemeralCredential,
    ) -> Result<mpsc::Receiver<TransportEvent>, SessionError>;

    /// Push one JSON-encoded client event over the signaling channel.
    async fn send_event(&self, payload: String) -> Result<()>;

    /// Pause or resume remote-audio playback.
    fn set_playback_paused(&self, paused: bool);

    /// Tear down every resource. No-op when already closed.
    async fn close(&mut self);

    /// Transport name for logging.
    fn name(&self) -> &str;
}
