//! HTTP client for the prediction service

use crate::serving::{DiabetesInput, PredictionResponse};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// Rough reading of a progression score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskBand {
    Low,
    Moderate,
    High,
}

impl RiskBand {
    pub fn from_prediction(prediction: f64) -> Self {
        if prediction < 100.0 {
            RiskBand::Low
        } else if prediction < 200.0 {
            RiskBand::Moderate
        } else {
            RiskBand::High
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskBand::Low => "low",
            RiskBand::Moderate => "moderate",
            RiskBand::High => "high",
        };
        f.write_str(s)
    }
}

pub struct PredictionClient {
    client: reqwest::Client,
    base_url: String,
}

impl PredictionClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn predict(&self, input: &DiabetesInput) -> Result<f64, ClientError> {
        let url = format!("{}/predict", self.base_url);
        let resp = self.client.post(&url).json(input).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status,
                message: error_message(&text),
            });
        }

        let body: PredictionResponse = resp.json().await?;
        Ok(body.prediction)
    }
}

/// Pull `detail` or `error` out of a JSON error body, else return it as is.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["detail", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(|m| m.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_bands() {
        assert_eq!(RiskBand::from_prediction(25.0), RiskBand::Low);
        assert_eq!(RiskBand::from_prediction(99.99), RiskBand::Low);
        assert_eq!(RiskBand::from_prediction(100.0), RiskBand::Moderate);
        assert_eq!(RiskBand::from_prediction(199.9), RiskBand::Moderate);
        assert_eq!(RiskBand::from_prediction(200.0), RiskBand::High);
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"detail":"Model not available"}"#), "Model not available");
        assert_eq!(error_message(r#"{"error":"bad row"}"#), "bad row");
        assert_eq!(error_message("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = PredictionClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
    }
}
