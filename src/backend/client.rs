use std::collections::HashMap;

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use tracing::info;

use super::types::{
    CredentialResponse, EphemeralCredential, EvaluateRequest, Expression, ExpressionEvaluation,
    ExtractedExpression, FinalizeOutcome, FinalizeRequest,
};
use crate::error::SessionError;
use crate::realtime::Transcript;

/// HTTP client for the local backend: ephemeral credential issuance,
/// conversation finalization, review evaluation, and the expression
/// persistence collaborators.
///
/// Credential and finalization calls surface as `SessionError`; the
/// persistence collaborators are plain backend calls and report through
/// `anyhow`.
pub struct BackendClient {
    http: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Issue an ephemeral credential for a free conversation session.
    ///
    /// No automatic retry: credentials are single-use and short-lived, and
    /// the caller must abort connection setup on failure.
    pub async fn conversation_credential(&self) -> Result<EphemeralCredential, SessionError> {
        let response = self
            .http
            .get(self.url("/session"))
            .send()
            .await
            .map_err(|e| SessionError::Credential(format!("session request failed: {}", e)))?;

        Self::credential_from(response).await
    }

    /// Issue an ephemeral credential scoped to a review session over the
    /// given target expressions.
    pub async fn review_credential(
        &self,
        targets: &[Expression],
    ) -> Result<EphemeralCredential, SessionError> {
        let response = self
            .http
            .post(self.url("/session/review"))
            .json(targets)
            .send()
            .await
            .map_err(|e| {
                SessionError::Credential(format!("review session request failed: {}", e))
            })?;

        Self::credential_from(response).await
    }

    async fn credential_from(response: Response) -> Result<EphemeralCredential, SessionError> {
        if !response.status().is_success() {
            return Err(SessionError::Credential(format!(
                "session endpoint returned {}",
                response.status()
            )));
        }

        let body: CredentialResponse = response.json().await.map_err(|e| {
            SessionError::Credential(format!("no credential in session response: {}", e))
        })?;

        if body.client_secret.value.is_empty() {
            return Err(SessionError::Credential(
                "empty credential in session response".to_string(),
            ));
        }

        Ok(EphemeralCredential::new(body.client_secret.value))
    }

    /// Ship the full transcript for expression extraction. The session must
    /// already be torn down; this call never touches the connection.
    pub async fn finalize_conversation(
        &self,
        user_id: &str,
        transcript: &Transcript,
    ) -> Result<FinalizeOutcome, SessionError> {
        let body = FinalizeRequest {
            user_id,
            messages: transcript,
        };

        let response = self
            .http
            .post(self.url("/api/conversation/finalize"))
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::Finalization(format!("finalize request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(SessionError::Finalization(format!(
                "finalize endpoint returned {}",
                response.status()
            )));
        }

        let outcome: FinalizeOutcome = response.json().await.map_err(|e| {
            SessionError::Finalization(format!("invalid finalize response: {}", e))
        })?;

        info!(
            extracted = outcome.extracted_count,
            doc_id = %outcome.doc_id,
            "conversation finalized"
        );

        Ok(outcome)
    }

    /// Evaluate which target expressions the caller actually used. Returns
    /// a mapping from expression id to its evaluation.
    pub async fn evaluate_review(
        &self,
        transcript: &Transcript,
        targets: &[Expression],
    ) -> Result<HashMap<String, ExpressionEvaluation>, SessionError> {
        let body = EvaluateRequest {
            messages: transcript,
            target_expressions: targets,
        };

        let response = self
            .http
            .post(self.url("/api/review/evaluate"))
            .json(&body)
            .send()
            .await
            .map_err(|e| SessionError::Finalization(format!("evaluate request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(SessionError::Finalization(format!(
                "evaluate endpoint returned {}",
                response.status()
            )));
        }

        response.json().await.map_err(|e| {
            SessionError::Finalization(format!("invalid evaluate response: {}", e))
        })
    }

    /// Record one completed review round for an expression.
    pub async fn record_expression_review(&self, expression_id: &str) -> Result<()> {
        let response = self
            .http
            .post(self.url(&format!("/api/expressions/{}/review", expression_id)))
            .send()
            .await
            .context("review progress request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("review progress endpoint returned {}", response.status());
        }
        Ok(())
    }

    /// Mark an expression as mastered.
    pub async fn mark_expression_mastered(&self, expression_id: &str) -> Result<()> {
        let response = self
            .http
            .post(self.url(&format!("/api/expressions/{}/master", expression_id)))
            .send()
            .await
            .context("mastery request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("mastery endpoint returned {}", response.status());
        }
        Ok(())
    }

    /// Persist a user-selected subset of extracted expressions.
    pub async fn save_selected_expressions(
        &self,
        selection: &[ExtractedExpression],
    ) -> Result<()> {
        let response = self
            .http
            .post(self.url("/api/expressions/save-selected"))
            .json(selection)
            .send()
            .await
            .context("save-selected request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("save-selected endpoint returned {}", response.status());
        }
        Ok(())
    }

    /// Fetch the expressions currently due for review.
    pub async fn expressions_for_review(&self) -> Result<Vec<Expression>> {
        let response = self
            .http
            .get(self.url("/api/expressions/review"))
            .send()
            .await
            .context("review list request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("review list endpoint returned {}", response.status());
        }

        response
            .json()
            .await
            .context("invalid review list response")
    }
}
