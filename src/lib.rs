pub mod audio;
pub mod backend;
pub mod config;
pub mod error;
pub mod realtime;
pub mod session;
pub mod transport;

pub use backend::{
    BackendClient, EphemeralCredential, Expression, ExpressionEvaluation, ExtractedExpression,
    FinalizeOutcome,
};
pub use config::Config;
pub use error::SessionError;
pub use realtime::{ConversationState, Message, Role, ServerEvent, Transcript};
pub use session::{Phase, RealtimeSession, SessionConfig, SessionMode, SessionStats};
pub use transport::{RealtimeTransport, SdpNegotiator, TransportEvent, WebRtcTransport};
