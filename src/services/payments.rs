use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, instrument};

use crate::config::PaymentConfig;
use crate::errors::ServiceError;

/// What the order workflow needs from a checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub amount: Decimal,
    /// Gateway transaction reference; the order id, so the callback can
    /// be correlated back to the order.
    pub tx_ref: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub checkout_url: String,
    pub tx_ref: String,
}

/// Seam between the order workflow and the payment provider. The order
/// creation transaction stays open across this call, so implementations
/// must be bounded by a timeout.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout(&self, request: CheckoutRequest)
        -> Result<CheckoutSession, ServiceError>;
}

#[derive(Serialize)]
struct HostedCheckoutBody<'a> {
    amount: String,
    currency: &'a str,
    tx_ref: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    email: &'a str,
    callback_url: &'a str,
    return_url: &'a str,
    customization: Customization<'a>,
}

#[derive(Serialize)]
struct Customization<'a> {
    title: &'a str,
    description: &'a str,
}

#[derive(Deserialize)]
struct HostedCheckoutResponse {
    status: String,
    data: Option<HostedCheckoutData>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct HostedCheckoutData {
    checkout_url: String,
}

/// PayChangu-style hosted checkout client.
pub struct HostedCheckoutClient {
    http: reqwest::Client,
    config: PaymentConfig,
}

impl HostedCheckoutClient {
    pub fn new(config: PaymentConfig) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl PaymentGateway for HostedCheckoutClient {
    #[instrument(skip(self, request), fields(tx_ref = %request.tx_ref))]
    async fn create_checkout(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        let body = HostedCheckoutBody {
            amount: request.amount.to_string(),
            currency: &self.config.currency,
            tx_ref: &request.tx_ref,
            first_name: &request.first_name,
            last_name: &request.last_name,
            email: &request.email,
            callback_url: &self.config.callback_url,
            return_url: &self.config.return_url,
            customization: Customization {
                title: &request.title,
                description: &request.description,
            },
        };

        let url = format!("{}/payment", self.config.api_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("checkout session request failed: {}", e);
                if e.is_timeout() {
                    ServiceError::PaymentFailed("gateway timed out".into())
                } else {
                    ServiceError::PaymentFailed(format!("gateway unreachable: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("gateway returned HTTP {}", status);
            return Err(ServiceError::PaymentFailed(format!(
                "gateway returned HTTP {}",
                status
            )));
        }

        let payload: HostedCheckoutResponse = response.json().await.map_err(|e| {
            error!("malformed gateway response: {}", e);
            ServiceError::PaymentFailed("malformed gateway response".into())
        })?;

        if payload.status != "success" {
            let reason = payload.message.unwrap_or_else(|| payload.status.clone());
            error!("gateway declined checkout session: {}", reason);
            return Err(ServiceError::PaymentFailed(reason));
        }

        let data = payload
            .data
            .ok_or_else(|| ServiceError::PaymentFailed("gateway response missing data".into()))?;

        Ok(CheckoutSession {
            checkout_url: data.checkout_url,
            tx_ref: request.tx_ref,
        })
    }
}
