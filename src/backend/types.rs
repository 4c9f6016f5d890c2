use std::fmt;

use serde::{Deserialize, Serialize};

use crate::realtime::Transcript;

/// Ephemeral credential authorizing one realtime session.
///
/// Single-use and short-lived. Never persisted; the `Debug` impl redacts
/// the secret so it cannot leak through logs.
#[derive(Clone)]
pub struct EphemeralCredential(String);

impl EphemeralCredential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EphemeralCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EphemeralCredential(..)")
    }
}

/// Wire shape of the credential endpoints.
#[derive(Deserialize)]
pub(crate) struct CredentialResponse {
    pub client_secret: ClientSecret,
}

#[derive(Deserialize)]
pub(crate) struct ClientSecret {
    pub value: String,
}

/// A vocabulary/phrase unit tracked for review and mastery. Owned by the
/// backend; this client only reads and references it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expression {
    pub id: String,
    pub expression: String,
    #[serde(default)]
    pub meaning: Option<String>,
    #[serde(default)]
    pub example: Option<String>,
    /// Completed review rounds
    #[serde(default)]
    pub review_count: Option<u32>,
    #[serde(default)]
    pub mastered: Option<bool>,
}

/// Candidate expression extracted from a finalized conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedExpression {
    pub id: String,
    pub expression: String,
    pub meaning: String,
    pub example: String,
}

/// Response of the conversation finalization endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct FinalizeOutcome {
    pub extracted_count: usize,
    pub doc_id: String,
    pub extracted_expressions: Vec<ExtractedExpression>,
}

/// Per-expression outcome of a review evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpressionEvaluation {
    pub success: bool,
    #[serde(default)]
    pub usage_context: Option<String>,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct FinalizeRequest<'a> {
    pub user_id: &'a str,
    pub messages: &'a Transcript,
}

#[derive(Serialize)]
pub(crate) struct EvaluateRequest<'a> {
    pub messages: &'a Transcript,
    #[serde(rename = "targetExpressions")]
    pub target_expressions: &'a [Expression],
}
