use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::SessionConfig;
use crate::audio::SpeechDetector;
use crate::backend::EphemeralCredential;
use crate::error::SessionError;
use crate::realtime::{parse_server_event, ClientEvent, ConversationState, Effect, Transcript};
use crate::transport::{RealtimeTransport, TransportEvent};

/// Connection phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Connecting,
    Connected,
    Closed,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub message_count: usize,
    pub caller_speaking: bool,
    pub remote_speaking: bool,
}

/// One realtime conversation session.
///
/// Owns the transport, the phase machine, and the reducer state. All
/// reducer transitions run on a single event-pump task, one event at a
/// time in arrival order. The transcript survives `disconnect` so the
/// caller can finalize it afterwards.
pub struct RealtimeSession {
    config: SessionConfig,
    transport: Arc<tokio::sync::Mutex<Box<dyn RealtimeTransport>>>,
    phase: Arc<Mutex<Phase>>,
    state: Arc<Mutex<ConversationState>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    started_at: DateTime<Utc>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RealtimeSession {
    pub fn new(config: SessionConfig, transport: Box<dyn RealtimeTransport>) -> Self {
        Self {
            config,
            transport: Arc::new(tokio::sync::Mutex::new(transport)),
            phase: Arc::new(Mutex::new(Phase::Idle)),
            state: Arc::new(Mutex::new(ConversationState::new())),
            pump: Mutex::new(None),
            started_at: Utc::now(),
        }
    }

    /// Connect using an ephemeral credential: acquire media, negotiate,
    /// and start the event pump. On any setup failure the phase returns to
    /// `Idle` with every partially-acquired resource released.
    pub async fn connect(&self, credential: &EphemeralCredential) -> Result<(), SessionError> {
        {
            let mut phase = lock(&self.phase);
            match *phase {
                Phase::Idle => {}
                current => {
                    warn!(?current, "session not idle, ignoring connect");
                    return Ok(());
                }
            }
            *phase = Phase::Connecting;
        }

        info!(session = %self.config.session_id, "connecting realtime session");

        // Fresh derived state for this attempt; nothing carries over.
        *lock(&self.state) = ConversationState::new();

        let events = {
            let mut transport = self.transport.lock().await;
            info!(transport = transport.name(), "opening realtime transport");
            match transport.open(credential).await {
                Ok(events) => events,
                Err(e) => {
                    *lock(&self.phase) = Phase::Idle;
                    return Err(e);
                }
            }
        };

        let pump = tokio::spawn(run_pump(
            events,
            Arc::clone(&self.state),
            Arc::clone(&self.phase),
            Arc::clone(&self.transport),
            self.config.instructions.clone(),
            SpeechDetector::new(self.config.speech_threshold, self.config.speech_hold),
        ));
        *lock(&self.pump) = Some(pump);

        Ok(())
    }

    /// Disconnect and release every resource. Safe to call from every exit
    /// path; repeated calls are no-ops.
    pub async fn disconnect(&self) {
        {
            let mut phase = lock(&self.phase);
            if *phase == Phase::Closed {
                return;
            }
            *phase = Phase::Closed;
        }

        info!(session = %self.config.session_id, "closing realtime session");

        self.transport.lock().await.close().await;

        if let Some(pump) = lock(&self.pump).take() {
            pump.abort();
        }
    }

    pub fn phase(&self) -> Phase {
        *lock(&self.phase)
    }

    /// Snapshot of the finalized transcript.
    pub fn transcript(&self) -> Transcript {
        lock(&self.state).transcript().clone()
    }

    /// The in-flight partial, if any.
    pub fn partial(&self) -> Option<String> {
        let state = lock(&self.state);
        let partial = state.partial();
        if partial.is_empty() {
            None
        } else {
            Some(partial.to_string())
        }
    }

    pub fn caller_speaking(&self) -> bool {
        lock(&self.state).caller_speaking()
    }

    pub fn remote_speaking(&self) -> bool {
        lock(&self.state).remote_speaking()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn stats(&self) -> SessionStats {
        let state = lock(&self.state);
        SessionStats {
            phase: *lock(&self.phase),
            started_at: self.started_at,
            duration_secs: Utc::now()
                .signed_duration_since(self.started_at)
                .num_milliseconds() as f64
                / 1000.0,
            message_count: state.transcript().len(),
            caller_speaking: state.caller_speaking(),
            remote_speaking: state.remote_speaking(),
        }
    }
}

/// Drain transport events into the reducer, one at a time. Runs until the
/// transport drops its event senders.
async fn run_pump(
    mut events: mpsc::Receiver<TransportEvent>,
    state: Arc<Mutex<ConversationState>>,
    phase: Arc<Mutex<Phase>>,
    transport: Arc<tokio::sync::Mutex<Box<dyn RealtimeTransport>>>,
    instructions: String,
    mut detector: SpeechDetector,
) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::ChannelOpen => {
                {
                    let mut phase = lock(&phase);
                    if *phase == Phase::Connecting {
                        *phase = Phase::Connected;
                    }
                }
                info!("signaling channel open, session connected");

                // Fire-and-forget session directives; no ack is awaited.
                match ClientEvent::session_update(instructions.clone()).to_json() {
                    Ok(payload) => {
                        if let Err(e) = transport.lock().await.send_event(payload).await {
                            warn!("failed to push session directives: {:#}", e);
                        }
                    }
                    Err(e) => warn!("failed to encode session directives: {}", e),
                }
            }
            TransportEvent::ChannelMessage(raw) => {
                let event = match parse_server_event(&raw) {
                    Ok(event) => event,
                    Err(e) => {
                        // One bad message must not end the session.
                        warn!("{}", e);
                        continue;
                    }
                };

                let (effects, finalized) = {
                    let mut state = lock(&state);
                    let before = state.transcript().len();
                    let effects = state.apply(event);
                    let finalized = if state.transcript().len() > before {
                        state.transcript().last().cloned()
                    } else {
                        None
                    };
                    (effects, finalized)
                };

                if let Some(message) = finalized {
                    info!(role = ?message.role, "{}", message.text);
                }

                for effect in effects {
                    let transport = transport.lock().await;
                    match effect {
                        Effect::PausePlayback => transport.set_playback_paused(true),
                        Effect::ResumePlayback => transport.set_playback_paused(false),
                    }
                }
            }
            TransportEvent::MicLevel(level) => {
                let speaking = detector.update(level, Instant::now());
                lock(&state).set_caller_speaking(speaking);
            }
        }
    }

    debug!("event pump finished");
}
