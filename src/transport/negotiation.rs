use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::backend::EphemeralCredential;
use crate::error::SessionError;

/// SDP offer/answer exchange with the remote realtime endpoint.
///
/// One POST: the local offer SDP as the body, the ephemeral credential as a
/// bearer token, the model id as a query parameter. The raw response text
/// is the remote answer SDP. The whole exchange runs under an explicit
/// timeout so a dead endpoint cannot hang the connect flow indefinitely.
pub struct SdpNegotiator {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl SdpNegotiator {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            timeout,
        }
    }

    pub async fn exchange(
        &self,
        credential: &EphemeralCredential,
        offer_sdp: &str,
    ) -> Result<String, SessionError> {
        debug!(model = %self.model, "posting SDP offer");

        let exchange = async {
            let response = self
                .http
                .post(&self.endpoint)
                .query(&[("model", self.model.as_str())])
                .bearer_auth(credential.secret())
                .header(CONTENT_TYPE, "application/sdp")
                .body(offer_sdp.to_string())
                .send()
                .await
                .map_err(|e| SessionError::Negotiation(format!("SDP exchange failed: {}", e)))?;

            if !response.status().is_success() {
                return Err(SessionError::Negotiation(format!(
                    "realtime endpoint returned {}",
                    response.status()
                )));
            }

            response
                .text()
                .await
                .map_err(|e| SessionError::Negotiation(format!("unreadable SDP answer: {}", e)))
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Negotiation(format!(
                "SDP exchange timed out after {:?}",
                self.timeout
            ))),
        }
    }
}
