use super::{AdDecisionError, DecisionSource};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use spliceforge_common::{AdBreakRequest, AdDecision, ViewerContext};
use std::time::Duration;

/// Ad decision server reached over HTTP.
pub struct RemoteDecisionClient {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DecisionRequest<'a> {
    #[serde(flatten)]
    ad_break: &'a AdBreakRequest,
    viewer_context: &'a ViewerContext,
    timestamp: DateTime<Utc>,
}

impl RemoteDecisionClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to build HTTP client with timeout");
                Client::new()
            });

        Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, request: &DecisionRequest<'_>) -> Result<AdDecision, AdDecisionError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AdDecisionError::Timeout(self.timeout)
                } else {
                    AdDecisionError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdDecisionError::ServerError {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| AdDecisionError::Transport(e.to_string()))?;

        parse_decision(&body)
    }
}

#[async_trait::async_trait]
impl DecisionSource for RemoteDecisionClient {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn decide(
        &self,
        ad_break: &AdBreakRequest,
        viewer: &ViewerContext,
    ) -> Result<AdDecision, AdDecisionError> {
        let request = DecisionRequest {
            ad_break,
            viewer_context: viewer,
            timestamp: Utc::now(),
        };

        // The client timeout does not cover every phase of a slow body, so
        // the whole exchange is bounded here as well.
        match tokio::time::timeout(self.timeout, self.post(&request)).await {
            Ok(result) => result,
            Err(_) => Err(AdDecisionError::Timeout(self.timeout)),
        }
    }
}

/// Parse and validate a decision body.
pub(crate) fn parse_decision(body: &str) -> Result<AdDecision, AdDecisionError> {
    let decision: AdDecision = serde_json::from_str(body)
        .map_err(|e| AdDecisionError::MalformedResponse(e.to_string()))?;

    if decision.ad_url.trim().is_empty() {
        return Err(AdDecisionError::MalformedResponse("adUrl is empty".into()));
    }
    if decision.ad_id.trim().is_empty() {
        return Err(AdDecisionError::MalformedResponse("adId is empty".into()));
    }
    if !decision.duration.is_finite() || decision.duration <= 0.0 {
        return Err(AdDecisionError::MalformedResponse(format!(
            "duration {} is not positive",
            decision.duration
        )));
    }

    Ok(decision)
}
