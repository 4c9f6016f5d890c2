use std::time::Duration;

use crate::backend::Expression;

/// What kind of conversation a session runs.
#[derive(Debug, Clone)]
pub enum SessionMode {
    /// Free conversation; the transcript is finalized for expression
    /// extraction when the session ends.
    Conversation,
    /// Review of specific target expressions; the transcript is evaluated
    /// against them when the session ends.
    Review(Vec<Expression>),
}

/// Configuration for one realtime session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "talk-3f2a...")
    pub session_id: String,

    /// Conversation or review mode
    pub mode: SessionMode,

    /// Realtime model requested during SDP negotiation
    pub model: String,

    /// Instructions pushed in the initial `session.update`
    pub instructions: String,

    /// Cap on the SDP offer/answer exchange
    pub negotiation_timeout: Duration,

    /// RMS level above which the caller counts as speaking
    pub speech_threshold: f32,

    /// How long the caller-speaking flag is held after the last loud frame
    pub speech_hold: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("talk-{}", uuid::Uuid::new_v4()),
            mode: SessionMode::Conversation,
            model: "gpt-4o-realtime-preview-2024-12-17".to_string(),
            instructions: "Please respond in English.".to_string(),
            negotiation_timeout: Duration::from_secs(15),
            speech_threshold: 0.04,
            speech_hold: Duration::from_millis(600),
        }
    }
}

impl SessionConfig {
    /// Conversation-partner instructions for a review session, enumerating
    /// the target expressions.
    pub fn review_instructions(targets: &[Expression]) -> String {
        let listed = targets
            .iter()
            .map(|e| e.expression.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "You are a helpful conversation partner. Your goal is to create natural \
             opportunities for the user to practice these specific English expressions: {}\n\
             \n\
             Guidelines:\n\
             1. Guide the conversation in a way that naturally elicits these expressions\n\
             2. If the user doesn't use the expressions, try to create more obvious opportunities\n\
             3. Keep track of which expressions the user successfully uses\n\
             4. Be natural and friendly, don't explicitly tell the user to use specific expressions\n\
             \n\
             The conversation should feel natural while providing opportunities to use these expressions.",
            listed
        )
    }
}
