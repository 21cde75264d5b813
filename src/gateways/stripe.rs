use crate::config::{ConfigError, GatewaySettings, SystemUrls};
use crate::domain::callback::InboundCallback;
use crate::domain::request::{from_minor_units, to_minor_units, PaymentRequest};
use crate::domain::response::{
    CanonicalPaymentResponse, PaymentInitiationResult, PaymentStatus, StatusTable,
};
use crate::error::GatewayError;
use crate::gateways::{
    bearer, callback_failure, fail_initiation, json_headers, log_verified, require_text_at,
    text_at, Capabilities, GatewayHeaders, PaymentGateway, PaymentOperations,
};
use crate::registry::AdapterContext;
use crate::transport::executor::{Encoding, RequestExecutor};
use crate::transport::HttpTransport;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;

pub const NAME: &str = "stripe";

/// Checkout session `status`.
pub const STATUS_TABLE: StatusTable = StatusTable::new(&[
    ("open", PaymentStatus::Pending),
    ("complete", PaymentStatus::Pending),
    ("expired", PaymentStatus::Expired),
]);

/// Checkout session `payment_status`; a settled payment wins over the
/// session state.
pub const PAYMENT_STATUS_TABLE: StatusTable = StatusTable::new(&[
    ("paid", PaymentStatus::Success),
    ("no_payment_required", PaymentStatus::Success),
    ("unpaid", PaymentStatus::Pending),
]);

#[derive(Clone)]
pub struct StripeConfig {
    pub base_url: String,
    pub api_key: String,
    pub currency: String,
}

impl StripeConfig {
    pub fn from_settings(name: &str, settings: &GatewaySettings) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: settings
                .get("base_url")
                .unwrap_or_else(|| "https://api.stripe.com".to_string()),
            api_key: settings.require(name, "api_key")?,
            currency: settings.get_or("currency", "usd"),
        })
    }
}

pub struct StripeGateway {
    pub config: StripeConfig,
    pub urls: SystemUrls,
    executor: RequestExecutor,
}

pub fn build(ctx: &AdapterContext<'_>) -> Result<Arc<dyn PaymentGateway>, ConfigError> {
    let config = StripeConfig::from_settings(ctx.name, ctx.settings)?;
    Ok(Arc::new(StripeGateway::new(config, ctx.urls.clone(), ctx.transport.clone())))
}

fn auth_headers(config: &StripeConfig) -> GatewayHeaders {
    let mut headers = json_headers();
    headers.insert("Authorization".to_string(), bearer(&config.api_key));
    headers
}

impl StripeGateway {
    pub fn new(config: StripeConfig, urls: SystemUrls, transport: Arc<dyn HttpTransport>) -> Self {
        let executor = RequestExecutor::new(NAME, config.base_url.clone(), auth_headers(&config), transport);
        Self {
            config,
            urls,
            executor,
        }
    }

    fn success_url(&self) -> String {
        let sep = if self.urls.callback_url.contains('?') { '&' } else { '?' };
        format!("{}{sep}session_id={{CHECKOUT_SESSION_ID}}", self.urls.callback_url)
    }

    fn checkout_payload(&self, request: &PaymentRequest) -> Result<Value, GatewayError> {
        let amount = request.require_amount()?;
        let currency = request.currency_or(&self.config.currency).to_ascii_lowercase();

        let line_items = if request.items.is_empty() {
            vec![json!({
                "price_data": {
                    "unit_amount": to_minor_units(amount, &currency)?,
                    "currency": currency,
                    "product_data": {
                        "name": request.description.clone().unwrap_or_else(|| "Order payment".to_string()),
                    },
                },
                "quantity": 1,
            })]
        } else {
            request
                .items
                .iter()
                .map(|item| {
                    Ok(json!({
                        "price_data": {
                            "unit_amount": to_minor_units(item.unit_price, &currency)?,
                            "currency": currency,
                            "product_data": {
                                "name": item.name,
                                "description": item.description,
                            },
                        },
                        "quantity": item.quantity,
                    }))
                })
                .collect::<Result<Vec<_>, GatewayError>>()?
        };

        Ok(json!({
            "mode": "payment",
            "success_url": self.success_url(),
            "cancel_url": self.urls.cancel_or_failed(),
            "client_reference_id": request.order_id,
            "customer_email": request.customer_email,
            "line_items": line_items,
        }))
    }

    async fn try_initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiationResult, GatewayError> {
        let payload = self.checkout_payload(request)?;
        let envelope = self
            .executor
            .execute(Method::POST, "/v1/checkout/sessions", Some(&payload), Encoding::Form)
            .await;
        let raw = envelope.to_value();
        let body = envelope.into_result()?;

        Ok(match text_at(&body, "/url") {
            Some(url) => PaymentInitiationResult::redirect(url, text_at(&body, "/id")),
            None => PaymentInitiationResult::failed("checkout session has no url", Some(raw)),
        })
    }

    async fn fetch_session(&self, session_id: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        let session_id = urlencoding::encode(session_id);
        let body = self
            .executor
            .execute(Method::GET, &format!("/v1/checkout/sessions/{session_id}"), None, Encoding::Json)
            .await
            .into_result()?;

        let session_status = require_text_at(&body, "/status")?;
        let payment_status = text_at(&body, "/payment_status").unwrap_or_default();
        let (status, label) = match PAYMENT_STATUS_TABLE.map(&payment_status) {
            PaymentStatus::Success => (PaymentStatus::Success, payment_status),
            _ => (STATUS_TABLE.map(&session_status), session_status),
        };

        let currency = text_at(&body, "/currency");
        let amount = body
            .get("amount_total")
            .and_then(Value::as_i64)
            .map(|minor| from_minor_units(minor, currency.as_deref().unwrap_or(&self.config.currency)));

        Ok(CanonicalPaymentResponse::verified(NAME, status)
            .with_provider_status(label)
            .with_unique_id(text_at(&body, "/id"))
            .with_amount(amount)
            .with_currency(currency)
            .with_raw(body))
    }

    async fn try_verify(&self, callback: &InboundCallback) -> Result<CanonicalPaymentResponse, GatewayError> {
        let session_id = callback
            .text("session_id")
            .ok_or_else(|| GatewayError::InvalidRequest("session_id is required".to_string()))?;
        self.fetch_session(&session_id).await
    }
}

#[async_trait::async_trait]
impl PaymentGateway for StripeGateway {
    fn name(&self) -> &'static str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::QUERY
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
        match self.try_verify(callback).await {
            Ok(response) => {
                log_verified(&response);
                response
            }
            Err(e) => callback_failure(NAME, e, callback.payload()),
        }
    }

    fn operations(&self) -> Option<&dyn PaymentOperations> {
        Some(self)
    }
}

#[async_trait::async_trait]
impl PaymentOperations for StripeGateway {
    fn gateway_name(&self) -> &'static str {
        NAME
    }

    async fn query_status(&self, id: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        self.fetch_session(id).await
    }
}
