//! Signaling events, the transcript model, and the event reducer
//!
//! This module is the pure core of the realtime session: typed server and
//! client events, the append-only transcript, and the single-threaded
//! reducer that folds the event stream into derived conversation state.

mod events;
mod reducer;
mod transcript;

pub use events::{
    parse_server_event, ClientEvent, ContentPart, ConversationItem, CreatedResponse, OutputItem,
    ResponseSummary, ServerEvent, SessionDirectives,
};
pub use reducer::{ConversationState, Effect};
pub use transcript::{Message, Role, Transcript};
