use crate::config::PaymentConfig;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCharge {
    /// 网关侧扣款 ID
    pub reference: String,
    pub status: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(
        &self,
        amount: i64,
        token: &str,
        description: &str,
        idempotency_key: &str,
    ) -> AppResult<GatewayCharge>;

    async fn refund(&self, reference: &str, amount: i64) -> AppResult<()>;
}

#[derive(Debug, Deserialize)]
struct ChargeObject {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    error: GatewayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GatewayErrorDetail {
    message: String,
}

/// Stripe 兼容的 HTTP 网关
#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
    base_url: String,
    secret_key: String,
    currency: String,
}

impl StripeGateway {
    pub fn new(config: &PaymentConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.gateway_base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            currency: config.currency.clone(),
        }
    }

    async fn error_message(response: reqwest::Response) -> String {
        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        match serde_json::from_str::<GatewayErrorBody>(&text) {
            Ok(body) => body.error.message,
            Err(_) => format!("gateway returned {status}: {text}"),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn charge(
        &self,
        amount: i64,
        token: &str,
        description: &str,
        idempotency_key: &str,
    ) -> AppResult<GatewayCharge> {
        let url = format!("{}/v1/charges", self.base_url);
        let params = [
            ("amount", amount.to_string()),
            ("currency", self.currency.clone()),
            ("source", token.to_string()),
            ("description", description.to_string()),
        ];

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", idempotency_key)
            .form(&params)
            .send()
            .await?;

        if response.status().is_success() {
            let charge: ChargeObject = response.json().await?;
            if charge.status == "failed" {
                return Err(AppError::PaymentFailed(format!(
                    "charge {} was declined",
                    charge.id
                )));
            }
            Ok(GatewayCharge {
                reference: charge.id,
                status: charge.status,
            })
        } else if response.status().is_client_error() {
            Err(AppError::PaymentFailed(Self::error_message(response).await))
        } else {
            Err(AppError::ExternalApiError(format!(
                "charge failed: {}",
                Self::error_message(response).await
            )))
        }
    }

    async fn refund(&self, reference: &str, amount: i64) -> AppResult<()> {
        let url = format!("{}/v1/refunds", self.base_url);
        let params = [("charge", reference.to_string()), ("amount", amount.to_string())];

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::ExternalApiError(format!(
                "refund of {reference} failed: {}",
                Self::error_message(response).await
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_trims_base_url() {
        let config = PaymentConfig {
            gateway_base_url: "https://gateway.example.com/".into(),
            secret_key: "sk_test_123".into(),
            ..Default::default()
        };
        let gateway = StripeGateway::new(&config);
        assert_eq!(gateway.base_url, "https://gateway.example.com");
        assert_eq!(gateway.currency, "usd");
    }

    #[test]
    fn test_error_body_shape() {
        let body: GatewayErrorBody =
            serde_json::from_str(r#"{"error":{"message":"card declined","type":"card_error"}}"#)
                .unwrap();
        assert_eq!(body.error.message, "card declined");
    }
}
