use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::GatewayResult;
use reqwest::Client;
use std::time::Duration;
use tracing::warn;

/// Form-encoded POST client for the aggregator.
///
/// No retries: a timeout or failure is final for the attempt.
#[derive(Clone)]
pub struct GatewayHttpClient {
    client: Client,
    timeout: Duration,
}

impl GatewayHttpClient {
    pub fn new(timeout: Duration) -> PaymentResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| PaymentError::NetworkError {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// POST `fields` as `application/x-www-form-urlencoded`.
    pub async fn post_form(&self, url: &str, fields: &[(&str, String)]) -> GatewayResult {
        let body = match serde_urlencoded::to_string(fields) {
            Ok(body) => body,
            Err(e) => return GatewayResult::rejected(format!("failed to encode form: {}", e)),
        };

        let response = self
            .client
            .post(url)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(body)
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status();
                classify_response(status, resp.text().await)
            }
            Err(e) if e.is_timeout() => {
                warn!(timeout_secs = self.timeout.as_secs(), "gateway request timed out");
                GatewayResult::rejected(format!(
                    "gateway request timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            }
            Err(e) => {
                warn!(error = %e, "gateway request failed");
                GatewayResult::rejected(format!("gateway request failed: {}", e))
            }
        }
    }
}

/// Map an HTTP status and body read to a gateway result.
/// A 2xx whose body could not be read is a rejection.
fn classify_response<E: std::fmt::Display>(
    status: reqwest::StatusCode,
    body: Result<String, E>,
) -> GatewayResult {
    let text = match body {
        Ok(text) => text,
        Err(e) => {
            warn!(status = %status, error = %e, "failed to read gateway response body");
            return GatewayResult::rejected(format!(
                "HTTP {}: unreadable response body: {}",
                status, e
            ));
        }
    };

    if status.is_success() {
        GatewayResult::accepted(text)
    } else {
        warn!(status = %status, "gateway returned non-success status");
        if text.is_empty() {
            GatewayResult::rejected(format!("HTTP {}", status))
        } else {
            GatewayResult::rejected(text)
        }
    }
}

/// Keep the last three digits of a phone number for logs
pub fn mask_phone(phone: &str) -> String {
    let len = phone.chars().count();
    if len <= 3 {
        return "*".repeat(len);
    }
    let visible: String = phone.chars().skip(len - 3).collect();
    format!("{}{}", "*".repeat(len - 3), visible)
}
