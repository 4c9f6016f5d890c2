use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Inbound signaling events from the remote speech endpoint.
///
/// The remote protocol is open-ended: anything not modeled here
/// deserializes to `Unknown` and is ignored by the reducer, so new server
/// event types never break an active session.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Partial transcript fragment for the remote party's current utterance
    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta { delta: String },

    /// Boundary event finalizing the current partial
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone,

    /// Terminal event for one response, carrying its structured output
    #[serde(rename = "response.done")]
    ResponseDone { response: Option<ResponseSummary> },

    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated { item: Option<ConversationItem> },

    #[serde(rename = "response.created")]
    ResponseCreated { response: Option<CreatedResponse> },

    /// The caller started speaking (server-side voice activity detection)
    #[serde(rename = "input_audio_buffer.speech_started")]
    CallerSpeechStarted,

    /// The caller stopped speaking
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    CallerSpeechStopped,

    /// The remote party's audio started
    #[serde(rename = "output_audio_buffer.audio_started")]
    RemoteAudioStarted,

    /// The remote party's audio stopped
    #[serde(rename = "output_audio_buffer.audio_stopped")]
    RemoteAudioStopped,

    #[serde(other)]
    Unknown,
}

/// Completed-response payload inside `response.done`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseSummary {
    pub id: Option<String>,
    #[serde(default)]
    pub output: Vec<OutputItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputItem {
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub transcript: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationItem {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedResponse {
    pub message: Option<String>,
    pub content: Option<String>,
}

impl ResponseSummary {
    /// Concatenated audio transcript of the structured output: fragments
    /// within an item join with no separator, distinct items join with a
    /// newline.
    pub fn audio_transcript(&self) -> String {
        self.output
            .iter()
            .map(|item| {
                item.content
                    .iter()
                    .filter(|part| part.kind == "audio")
                    .filter_map(|part| part.transcript.as_deref())
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Outbound events pushed over the signaling channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionDirectives },
}

/// Session directives sent once the channel opens. Fire-and-forget: no
/// acknowledgement is awaited.
#[derive(Debug, Clone, Serialize)]
pub struct SessionDirectives {
    pub instructions: String,
    pub modalities: Vec<String>,
}

impl ClientEvent {
    pub fn session_update(instructions: impl Into<String>) -> Self {
        ClientEvent::SessionUpdate {
            session: SessionDirectives {
                instructions: instructions.into(),
                modalities: vec!["audio".to_string(), "text".to_string()],
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Parse one signaling payload. Failures are classified as
/// `MalformedEvent`; callers log and drop them without touching session
/// state.
pub fn parse_server_event(raw: &str) -> Result<ServerEvent, SessionError> {
    serde_json::from_str(raw).map_err(|e| SessionError::MalformedEvent(format!("{}: {}", e, raw)))
}
