use crate::config::{ConfigError, GatewaySettings, SystemUrls};
use crate::domain::callback::InboundCallback;
use crate::domain::request::{amount_number, format_amount, parse_amount, PaymentRequest};
use crate::domain::response::{
    CanonicalPaymentResponse, PaymentInitiationResult, PaymentStatus, StatusTable,
};
use crate::error::GatewayError;
use crate::gateways::{
    basic_auth, callback_failure, fail_initiation, json_headers, log_verified, text_at,
    Capabilities, GatewayHeaders, PaymentGateway,
};
use crate::registry::AdapterContext;
use crate::transport::executor::{Encoding, RequestExecutor};
use crate::transport::HttpTransport;
use crate::verification::SignatureScheme;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;

pub const NAME: &str = "geidea";

/// `order.detailedStatus`.
pub const STATUS_TABLE: StatusTable = StatusTable::new(&[
    ("Paid", PaymentStatus::Success),
    ("Captured", PaymentStatus::Success),
    ("Authorized", PaymentStatus::Pending),
    ("Initiated", PaymentStatus::Pending),
    ("Pending", PaymentStatus::Pending),
    ("Failed", PaymentStatus::Failed),
    ("Declined", PaymentStatus::Rejected),
    ("Cancelled", PaymentStatus::Canceled),
    ("Voided", PaymentStatus::Canceled),
    ("Expired", PaymentStatus::Expired),
    ("Refunded", PaymentStatus::Refunded),
    ("PartiallyRefunded", PaymentStatus::Refunded),
]);

#[derive(Clone)]
pub struct GeideaConfig {
    pub base_url: String,
    pub api_key: String,
    pub password: String,
    pub currency: String,
}

impl GeideaConfig {
    pub fn from_settings(name: &str, settings: &GatewaySettings) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: settings
                .get("base_url")
                .unwrap_or_else(|| "https://api.merchant.geidea.net".to_string()),
            api_key: settings.require(name, "api_key")?,
            password: settings.require(name, "password")?,
            currency: settings.get_or("currency", "SAR"),
        })
    }
}

pub struct GeideaGateway {
    pub config: GeideaConfig,
    pub urls: SystemUrls,
    executor: RequestExecutor,
}

pub fn build(ctx: &AdapterContext<'_>) -> Result<Arc<dyn PaymentGateway>, ConfigError> {
    let config = GeideaConfig::from_settings(ctx.name, ctx.settings)?;
    Ok(Arc::new(GeideaGateway::new(config, ctx.urls.clone(), ctx.transport.clone())))
}

fn auth_headers(config: &GeideaConfig) -> GatewayHeaders {
    let mut headers = json_headers();
    headers.insert(
        "Authorization".to_string(),
        basic_auth(&config.api_key, &config.password),
    );
    headers
}

impl GeideaGateway {
    pub fn new(config: GeideaConfig, urls: SystemUrls, transport: Arc<dyn HttpTransport>) -> Self {
        let executor = RequestExecutor::new(NAME, config.base_url.clone(), auth_headers(&config), transport);
        Self {
            config,
            urls,
            executor,
        }
    }

    /// Base64 HMAC-SHA256, keyed with the API password, over
    /// `publicKey + amount + currency + orderId + status + merchantReferenceId + timeStamp`.
    pub fn callback_signature(&self, order: &Value, timestamp: &str) -> String {
        let amount = order
            .get("amount")
            .and_then(parse_amount)
            .map(format_amount)
            .unwrap_or_default();
        let field = |key: &str| text_at(order, &format!("/{key}")).unwrap_or_default();
        SignatureScheme::hmac_sha256(&self.config.password, "")
            .base64()
            .sign(&[
                self.config.api_key.clone(),
                amount,
                field("currency"),
                field("orderId"),
                field("status"),
                field("merchantReferenceId"),
                timestamp.to_string(),
            ])
    }

    fn invoice_payload(&self, request: &PaymentRequest) -> Result<Value, GatewayError> {
        let amount = request.require_amount()?;
        let mut payload = request.extra.clone();
        payload.insert("amount".to_string(), amount_number(amount));
        payload.insert(
            "currency".to_string(),
            json!(request.currency_or(&self.config.currency)),
        );
        if let Some(reference) = &request.order_id {
            payload.insert("merchantReferenceId".to_string(), json!(reference));
        }
        if let Some(name) = &request.customer_name {
            payload.entry("customer".to_string()).or_insert_with(|| {
                json!({
                    "name": name,
                    "email": request.customer_email,
                    "phoneNumber": request.customer_phone,
                })
            });
        }
        payload.insert("callbackUrl".to_string(), json!(self.urls.callback_url));
        payload.insert(
            "eInvoiceDetails".to_string(),
            json!({
                "extraChargesType": "Amount",
                "invoiceDiscountType": "Amount",
            }),
        );
        Ok(Value::Object(payload))
    }

    async fn try_initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiationResult, GatewayError> {
        let payload = self.invoice_payload(request)?;
        let envelope = self
            .executor
            .execute(
                Method::POST,
                "/payment-intent/api/v1/direct/eInvoice",
                Some(&payload),
                Encoding::Json,
            )
            .await;
        let raw = envelope.to_value();
        let body = envelope.into_result()?;

        Ok(match text_at(&body, "/paymentIntent/link") {
            Some(link) => PaymentInitiationResult::redirect(
                link,
                text_at(&body, "/paymentIntent/paymentIntentId"),
            ),
            None => PaymentInitiationResult::failed(
                text_at(&body, "/detailedResponseMessage")
                    .unwrap_or_else(|| "payment intent has no link".to_string()),
                Some(raw),
            ),
        })
    }

    fn try_verify(&self, callback: &InboundCallback) -> Result<CanonicalPaymentResponse, GatewayError> {
        let payload = callback.payload();
        let order = payload
            .get("order")
            .filter(|o| o.is_object())
            .ok_or_else(|| GatewayError::InvalidRequest("order is required".to_string()))?;

        let provided = text_at(&payload, "/signature").or_else(|| text_at(order, "/signature"));
        let timestamp = text_at(&payload, "/timeStamp").or_else(|| text_at(order, "/timeStamp"));
        let (Some(provided), Some(timestamp)) = (provided, timestamp) else {
            return Err(GatewayError::signature(NAME));
        };

        let expected = self.callback_signature(order, &timestamp);
        if !crate::verification::constant_time_eq(expected.as_bytes(), provided.trim().as_bytes()) {
            return Err(GatewayError::signature(NAME));
        }

        let detailed = text_at(order, "/detailedStatus").unwrap_or_default();
        let order_status = text_at(order, "/status").unwrap_or_default();
        let status = match STATUS_TABLE.map(&detailed) {
            PaymentStatus::Success if order_status != "Success" => PaymentStatus::Failed,
            other => other,
        };

        Ok(CanonicalPaymentResponse::verified(NAME, status)
            .with_provider_status(detailed)
            .with_unique_id(
                text_at(order, "/merchantReferenceId").or_else(|| text_at(order, "/orderId")),
            )
            .with_amount(order.get("amount").and_then(parse_amount))
            .with_currency(text_at(order, "/currency"))
            .with_raw(payload.clone()))
    }
}

#[async_trait::async_trait]
impl PaymentGateway for GeideaGateway {
    fn name(&self) -> &'static str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::BASE
    }

    fn build_auth_headers(&self) -> GatewayHeaders {
        auth_headers(&self.config)
    }

    async fn initiate(&self, request: &PaymentRequest) -> PaymentInitiationResult {
        match self.try_initiate(request).await {
            Ok(result) => result,
            Err(e) => fail_initiation(NAME, e),
        }
    }

    async fn verify_callback(&self, callback: &InboundCallback) -> CanonicalPaymentResponse {
        match self.try_verify(callback) {
            Ok(response) => {
                log_verified(&response);
                response
            }
            Err(e) => callback_failure(NAME, e, callback.payload()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{OutboundRequest, TransportError, TransportResponse};

    struct Offline;

    #[async_trait::async_trait]
    impl HttpTransport for Offline {
        async fn send(&self, _request: OutboundRequest) -> Result<TransportResponse, TransportError> {
            Err(TransportError::Connect("offline".to_string()))
        }
    }

    fn gateway() -> GeideaGateway {
        GeideaGateway::new(
            GeideaConfig {
                base_url: "https://geidea.test".to_string(),
                api_key: "pk_1".to_string(),
                password: "secret".to_string(),
                currency: "SAR".to_string(),
            },
            SystemUrls {
                callback_url: "https://shop.example/cb".to_string(),
                success_url: "https://shop.example/ok".to_string(),
                failed_url: "https://shop.example/ko".to_string(),
                cancel_url: None,
            },
            Arc::new(Offline),
        )
    }

    fn signed_callback(gw: &GeideaGateway, detailed: &str) -> InboundCallback {
        let order = json!({
            "orderId": "ord-9",
            "amount": 150.5,
            "currency": "SAR",
            "status": "Success",
            "detailedStatus": detailed,
            "merchantReferenceId": "m-1",
        });
        let signature = gw.callback_signature(&order, "2026-01-01T10:00:00Z");
        InboundCallback::default()
            .with_field("order", order)
            .with_field("timeStamp", "2026-01-01T10:00:00Z")
            .with_field("signature", signature)
    }

    #[tokio::test]
    async fn signed_paid_order_is_success() {
        let gw = gateway();
        let resp = gw.verify_callback(&signed_callback(&gw, "Paid")).await;
        assert!(resp.success);
        assert_eq!(resp.status, PaymentStatus::Success);
        assert_eq!(resp.unique_id.as_deref(), Some("m-1"));
    }

    #[tokio::test]
    async fn every_signed_order_field_is_covered() {
        let gw = gateway();
        for (field, forged) in [
            ("amount", json!(1.0)),
            ("currency", json!("USD")),
            ("orderId", json!("ord-10")),
            ("status", json!("Failed")),
            ("merchantReferenceId", json!("m-2")),
        ] {
            let mut cb = signed_callback(&gw, "Paid");
            cb.fields["order"][field] = forged;
            let resp = gw.verify_callback(&cb).await;
            assert!(!resp.success, "{field}");
            assert_eq!(resp.status, PaymentStatus::SignatureFailed, "{field}");
        }
    }

    #[tokio::test]
    async fn replayed_with_new_timestamp_fails_signature() {
        let gw = gateway();
        let cb = signed_callback(&gw, "Paid").with_field("timeStamp", "2026-01-02T10:00:00Z");
        assert_eq!(gw.verify_callback(&cb).await.status, PaymentStatus::SignatureFailed);
    }

    #[tokio::test]
    async fn missing_signature_is_rejected() {
        let gw = gateway();
        let mut cb = signed_callback(&gw, "Paid");
        cb.fields.remove("signature");
        assert_eq!(gw.verify_callback(&cb).await.status, PaymentStatus::SignatureFailed);
    }
}
