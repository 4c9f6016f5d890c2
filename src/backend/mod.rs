//! Local backend HTTP API
//!
//! Credential issuance for realtime sessions, transcript finalization and
//! review evaluation, plus the expression persistence collaborators this
//! client consumes but does not own.

mod client;
mod types;

pub use client::BackendClient;
pub use types::{
    EphemeralCredential, Expression, ExpressionEvaluation, ExtractedExpression, FinalizeOutcome,
};
