use std::collections::HashSet;

use super::events::ServerEvent;
use super::transcript::{Role, Transcript};

/// Side effect requested by the reducer, executed by the event pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    PausePlayback,
    ResumePlayback,
}

/// Derived conversation state for exactly one session: the transcript, the
/// in-flight partial, response de-duplication, and turn-taking flags.
///
/// Pure state machine: `apply` performs no I/O and is driven one event at a
/// time, in arrival order, by the session's event pump. A fresh value is
/// created for every connection attempt; nothing carries over.
#[derive(Debug, Default)]
pub struct ConversationState {
    transcript: Transcript,
    partial: String,
    processed_responses: HashSet<String>,
    caller_speaking: bool,
    remote_speaking: bool,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one server event and return the side effects it requests.
    pub fn apply(&mut self, event: ServerEvent) -> Vec<Effect> {
        let mut effects = Vec::new();

        match event {
            ServerEvent::AudioTranscriptDelta { delta } => {
                self.partial.push_str(&delta);
            }
            ServerEvent::AudioTranscriptDone => {
                let text = self.partial.trim();
                if !text.is_empty() {
                    self.transcript.push(Role::Assistant, text);
                }
                self.partial.clear();
            }
            ServerEvent::ResponseDone { response } => {
                let Some(summary) = response else {
                    return effects;
                };
                if let Some(id) = &summary.id {
                    // Redelivered terminal events must not duplicate the message.
                    if !self.processed_responses.insert(id.clone()) {
                        return effects;
                    }
                }
                let text = summary.audio_transcript();
                let text = text.trim();
                if !text.is_empty() {
                    self.transcript.push(Role::Assistant, text);
                }
            }
            ServerEvent::ConversationItemCreated { item } => {
                if let Some(text) = item.and_then(|i| i.text) {
                    self.transcript.push(Role::Assistant, text);
                }
            }
            ServerEvent::ResponseCreated { response } => {
                if let Some(text) = response.and_then(|r| r.message.or(r.content)) {
                    self.transcript.push(Role::Assistant, text);
                }
            }
            ServerEvent::CallerSpeechStarted => {
                self.remote_speaking = false;
                effects.push(Effect::PausePlayback);
            }
            ServerEvent::CallerSpeechStopped => {
                effects.push(Effect::ResumePlayback);
            }
            ServerEvent::RemoteAudioStarted => {
                // Caller priority: never mark the remote party as speaking
                // over the caller.
                if !self.caller_speaking {
                    self.remote_speaking = true;
                }
            }
            ServerEvent::RemoteAudioStopped => {
                self.remote_speaking = false;
            }
            ServerEvent::Unknown => {}
        }

        effects
    }

    /// Update the mic-derived caller-speaking flag.
    pub fn set_caller_speaking(&mut self, speaking: bool) {
        self.caller_speaking = speaking;
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn partial(&self) -> &str {
        &self.partial
    }

    pub fn caller_speaking(&self) -> bool {
        self.caller_speaking
    }

    pub fn remote_speaking(&self) -> bool {
        self.remote_speaking
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::events::parse_server_event;

    fn apply_raw(state: &mut ConversationState, raw: &str) -> Vec<Effect> {
        state.apply(parse_server_event(raw).unwrap())
    }

    fn delta(state: &mut ConversationState, text: &str) {
        apply_raw(
            state,
            &format!(r#"{{"type":"response.audio_transcript.delta","delta":"{}"}}"#, text),
        );
    }

    #[test]
    fn deltas_accumulate_and_flush_on_done() {
        let mut state = ConversationState::new();
        delta(&mut state, "Hel");
        delta(&mut state, "lo");
        assert_eq!(state.partial(), "Hello");

        apply_raw(&mut state, r#"{"type":"response.audio_transcript.done"}"#);
        assert_eq!(state.partial(), "");
        assert_eq!(state.transcript().len(), 1);
        let message = state.transcript().last().unwrap();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.text, "Hello");
    }

    #[test]
    fn whitespace_only_partial_produces_no_message() {
        let mut state = ConversationState::new();
        delta(&mut state, "  ");
        delta(&mut state, "\\n");
        apply_raw(&mut state, r#"{"type":"response.audio_transcript.done"}"#);
        assert!(state.transcript().is_empty());
        assert_eq!(state.partial(), "");
    }

    #[test]
    fn finalized_text_is_trimmed() {
        let mut state = ConversationState::new();
        delta(&mut state, "  Hello ");
        apply_raw(&mut state, r#"{"type":"response.audio_transcript.done"}"#);
        assert_eq!(state.transcript().last().unwrap().text, "Hello");
    }

    #[test]
    fn response_done_appends_joined_output_once() {
        let raw = r#"{
            "type": "response.done",
            "response": {
                "id": "resp_9",
                "output": [
                    {"content": [{"type": "audio", "transcript": "First "}, {"type": "audio", "transcript": "item"}]},
                    {"content": [{"type": "audio", "transcript": "Second item"}]}
                ]
            }
        }"#;
        let mut state = ConversationState::new();
        apply_raw(&mut state, raw);
        assert_eq!(state.transcript().len(), 1);
        assert_eq!(
            state.transcript().last().unwrap().text,
            "First item\nSecond item"
        );

        // Identical redelivery is ignored entirely.
        apply_raw(&mut state, raw);
        assert_eq!(state.transcript().len(), 1);
    }

    #[test]
    fn response_done_without_payload_is_ignored() {
        let mut state = ConversationState::new();
        apply_raw(&mut state, r#"{"type":"response.done"}"#);
        assert!(state.transcript().is_empty());
    }

    #[test]
    fn caller_speech_start_forces_remote_silent_and_pauses_playback() {
        let mut state = ConversationState::new();
        let effects = apply_raw(&mut state, r#"{"type":"output_audio_buffer.audio_started"}"#);
        assert!(effects.is_empty());
        assert!(state.remote_speaking());

        let effects = apply_raw(&mut state, r#"{"type":"input_audio_buffer.speech_started"}"#);
        assert_eq!(effects, vec![Effect::PausePlayback]);
        assert!(!state.remote_speaking());

        let effects = apply_raw(&mut state, r#"{"type":"input_audio_buffer.speech_stopped"}"#);
        assert_eq!(effects, vec![Effect::ResumePlayback]);
    }

    #[test]
    fn remote_speech_is_gated_on_caller_priority() {
        let mut state = ConversationState::new();
        state.set_caller_speaking(true);

        apply_raw(&mut state, r#"{"type":"output_audio_buffer.audio_started"}"#);
        assert!(!state.remote_speaking());

        state.set_caller_speaking(false);
        apply_raw(&mut state, r#"{"type":"output_audio_buffer.audio_started"}"#);
        assert!(state.remote_speaking());

        apply_raw(&mut state, r#"{"type":"output_audio_buffer.audio_stopped"}"#);
        assert!(!state.remote_speaking());
    }

    #[test]
    fn created_items_with_text_become_messages() {
        let mut state = ConversationState::new();
        apply_raw(
            &mut state,
            r#"{"type":"conversation.item.created","item":{"text":"Welcome back"}}"#,
        );
        apply_raw(&mut state, r#"{"type":"conversation.item.created","item":{}}"#);
        apply_raw(
            &mut state,
            r#"{"type":"response.created","response":{"message":"Let's begin"}}"#,
        );
        apply_raw(&mut state, r#"{"type":"response.created","response":{}}"#);

        assert_eq!(state.transcript().len(), 2);
        assert_eq!(state.transcript().messages()[0].text, "Welcome back");
        assert_eq!(state.transcript().messages()[1].text, "Let's begin");
    }

    #[test]
    fn unknown_events_leave_state_untouched() {
        let mut state = ConversationState::new();
        delta(&mut state, "Hi");
        apply_raw(&mut state, r#"{"type":"session.created","session":{}}"#);
        assert_eq!(state.partial(), "Hi");
        assert!(state.transcript().is_empty());
    }
}
