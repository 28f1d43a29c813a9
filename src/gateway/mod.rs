//! Payment gateway client.
//!
//! The HTTP implementation speaks a Paystack-shaped API: every response is an
//! envelope `{ "status": bool, "message": str, "data": {..} }` and amounts
//! travel in minor units.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::PaymentGatewayConfig;
use crate::errors::ServiceError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway rejected request: {0}")]
    Rejected(String),
    #[error("unexpected gateway response: {0}")]
    InvalidResponse(String),
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        ServiceError::PaymentGatewayError(err.to_string())
    }
}

/// Converts a major-unit amount to the gateway's integer minor units.
pub fn to_minor_units(amount: Decimal) -> Result<i64, GatewayError> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| GatewayError::InvalidResponse(format!("amount {} out of range", amount)))
}

pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitializeRequest {
    pub reference: String,
    pub email: String,
    pub amount: Decimal,
    pub currency: String,
    pub callback_url: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeResponse {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

/// Settled state of a charge as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Success,
    Failed,
    /// Anything not yet final (ongoing, queued, abandoned checkout page).
    Pending,
}

impl ChargeStatus {
    pub fn from_gateway(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "success" | "successful" => ChargeStatus::Success,
            "failed" | "reversed" | "declined" => ChargeStatus::Failed,
            _ => ChargeStatus::Pending,
        }
    }
}

/// Outcome fed to reconciliation, from either `verify` or a webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeOutcome {
    pub reference: String,
    pub status: ChargeStatus,
    /// Amount charged in major units, when the gateway reported one.
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub channel: Option<String>,
    pub gateway_response: Option<String>,
    pub authorization: Option<serde_json::Value>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl ChargeOutcome {
    pub fn success(reference: impl Into<String>, amount: Decimal) -> Self {
        Self {
            reference: reference.into(),
            status: ChargeStatus::Success,
            amount: Some(amount),
            currency: None,
            channel: None,
            gateway_response: Some("Approved".into()),
            authorization: None,
            paid_at: Some(Utc::now()),
        }
    }

    pub fn failed(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            status: ChargeStatus::Failed,
            amount: None,
            currency: None,
            channel: None,
            gateway_response: Some(message.into()),
            authorization: None,
            paid_at: None,
        }
    }
}

/// Transaction payload shared by verify responses and webhook `data`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransactionData {
    pub reference: String,
    pub status: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub gateway_response: Option<String>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub authorization: Option<serde_json::Value>,
}

impl From<TransactionData> for ChargeOutcome {
    fn from(data: TransactionData) -> Self {
        Self {
            status: ChargeStatus::from_gateway(&data.status),
            amount: data.amount.map(from_minor_units),
            reference: data.reference,
            currency: data.currency,
            channel: data.channel,
            gateway_response: data.gateway_response,
            authorization: data.authorization,
            paid_at: data.paid_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefundRequest {
    pub reference: String,
    pub amount: Decimal,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundResponse {
    pub gateway_reference: Option<String>,
    pub status: String,
}

/// Payment gateway collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Identifier stored on payment rows
    fn name(&self) -> &str;

    async fn initialize(&self, request: InitializeRequest)
        -> Result<InitializeResponse, GatewayError>;

    async fn verify(&self, reference: &str) -> Result<ChargeOutcome, GatewayError>;

    async fn refund(&self, request: RefundRequest) -> Result<RefundResponse, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Serialize)]
struct InitializeBody<'a> {
    email: &'a str,
    amount: i64,
    currency: &'a str,
    reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
    metadata: &'a serde_json::Value,
}

#[derive(Serialize)]
struct RefundBody<'a> {
    transaction: &'a str,
    amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    merchant_note: Option<&'a str>,
}

#[derive(Deserialize)]
struct RefundData {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    status: Option<String>,
}

/// reqwest-backed gateway client
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    name: String,
    base_url: String,
    secret_key: String,
}

impl HttpPaymentGateway {
    pub fn new(config: &PaymentGatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            name: config.name.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        let body = response.text().await?;
        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            GatewayError::InvalidResponse(format!("HTTP {}: {}", status.as_u16(), e))
        })?;

        if !status.is_success() || !envelope.status {
            warn!(http_status = status.as_u16(), message = %envelope.message, "gateway rejected request");
            return Err(GatewayError::Rejected(envelope.message));
        }

        envelope
            .data
            .ok_or_else(|| GatewayError::InvalidResponse("missing data".to_string()))
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, request), fields(reference = %request.reference))]
    async fn initialize(
        &self,
        request: InitializeRequest,
    ) -> Result<InitializeResponse, GatewayError> {
        let body = InitializeBody {
            email: &request.email,
            amount: to_minor_units(request.amount)?,
            currency: &request.currency,
            reference: &request.reference,
            callback_url: request.callback_url.as_deref(),
            metadata: &request.metadata,
        };
        debug!(amount = body.amount, "initializing transaction");

        let response = self
            .client
            .post(self.url("/transaction/initialize"))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await?;

        Self::read_envelope(response).await
    }

    #[instrument(skip(self))]
    async fn verify(&self, reference: &str) -> Result<ChargeOutcome, GatewayError> {
        let response = self
            .client
            .get(self.url(&format!("/transaction/verify/{}", reference)))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        let data: TransactionData = Self::read_envelope(response).await?;
        Ok(data.into())
    }

    #[instrument(skip(self, request), fields(reference = %request.reference))]
    async fn refund(&self, request: RefundRequest) -> Result<RefundResponse, GatewayError> {
        let body = RefundBody {
            transaction: &request.reference,
            amount: to_minor_units(request.amount)?,
            merchant_note: request.reason.as_deref(),
        };

        let response = self
            .client
            .post(self.url("/refund"))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await?;

        let data: RefundData = Self::read_envelope(response).await?;
        Ok(RefundResponse {
            gateway_reference: data.id.map(|id| match id {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            }),
            status: data.status.unwrap_or_else(|| "pending".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(63.00), 6300)]
    #[case(dec!(0.015), 2)]
    #[case(dec!(1500), 150000)]
    fn minor_units_round_half_away(#[case] amount: Decimal, #[case] minor: i64) {
        assert_eq!(to_minor_units(amount).unwrap(), minor);
    }

    #[test]
    fn minor_units_convert_back() {
        assert_eq!(from_minor_units(630000), dec!(6300.00));
    }

    #[rstest]
    #[case("success", ChargeStatus::Success)]
    #[case("failed", ChargeStatus::Failed)]
    #[case("reversed", ChargeStatus::Failed)]
    #[case("abandoned", ChargeStatus::Pending)]
    #[case("ongoing", ChargeStatus::Pending)]
    fn gateway_status_mapping(#[case] raw: &str, #[case] expected: ChargeStatus) {
        assert_eq!(ChargeStatus::from_gateway(raw), expected);
    }

    #[test]
    fn transaction_data_becomes_outcome() {
        let data: TransactionData = serde_json::from_value(serde_json::json!({
            "reference": "PAY-1",
            "status": "success",
            "amount": 630000,
            "channel": "card",
            "gateway_response": "Approved",
            "authorization": {"last4": "4081"}
        }))
        .unwrap();
        let outcome = ChargeOutcome::from(data);
        assert_eq!(outcome.status, ChargeStatus::Success);
        assert_eq!(outcome.amount, Some(dec!(6300)));
        assert_eq!(outcome.channel.as_deref(), Some("card"));
    }
}
