use crate::config::{ConfigError, GatewaySettings, SystemUrls};
use crate::domain::callback::InboundCallback;
use crate::domain::request::{amount_number, PaymentRequest};
use crate::domain::response::{
    CanonicalPaymentResponse, PaymentInitiationResult, PaymentStatus, StatusTable,
};
use crate::error::GatewayError;
use crate::gateways::{
    bearer, callback_failure, decimal_at, fail_initiation, json_headers, log_verified,
    require_text_at, text_at, Capabilities, GatewayHeaders, PaymentGateway, PaymentOperations,
};
use crate::registry::AdapterContext;
use crate::transport::executor::{Encoding, RequestExecutor};
use crate::transport::HttpTransport;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;

pub const NAME: &str = "tap";

/// Charge statuses.
pub const STATUS_TABLE: StatusTable = StatusTable::new(&[
    ("CAPTURED", PaymentStatus::Success),
    ("INITIATED", PaymentStatus::Pending),
    ("IN_PROGRESS", PaymentStatus::Pending),
    ("AUTHORIZED", PaymentStatus::Pending),
    ("ABANDONED", PaymentStatus::Canceled),
    ("CANCELLED", PaymentStatus::Canceled),
    ("VOID", PaymentStatus::Canceled),
    ("FAILED", PaymentStatus::Failed),
    ("DECLINED", PaymentStatus::Rejected),
    ("RESTRICTED", PaymentStatus::Rejected),
    ("TIMEDOUT", PaymentStatus::Expired),
]);

#[derive(Clone)]
pub struct TapConfig {
    pub base_url: String,
    pub api_key: String,
    pub currency: String,
}

impl TapConfig {
    pub fn from_settings(name: &str, settings: &GatewaySettings) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: settings
                .get("base_url")
                .unwrap_or_else(|| "https://api.tap.company".to_string()),
            api_key: settings.require(name, "api_key")?,
            currency: settings.get_or("currency", "SAR"),
        })
    }
}

pub struct TapGateway {
    pub config: TapConfig,
    pub urls: SystemUrls,
    executor: RequestExecutor,
}

pub fn build(ctx: &AdapterContext<'_>) -> Result<Arc<dyn PaymentGateway>, ConfigError> {
    let config = TapConfig::from_settings(ctx.name, ctx.settings)?;
    Ok(Arc::new(TapGateway::new(config, ctx.urls.clone(), ctx.transport.clone())))
}

fn auth_headers(config: &TapConfig) -> GatewayHeaders {
    let mut headers = json_headers();
    headers.insert("Authorization".to_string(), bearer(&config.api_key));
    headers
}

impl TapGateway {
    pub fn new(config: TapConfig, urls: SystemUrls, transport: Arc<dyn HttpTransport>) -> Self {
        let executor = RequestExecutor::new(NAME, config.base_url.clone(), auth_headers(&config), transport);
        Self {
            config,
            urls,
            executor,
        }
    }

    fn charge_payload(&self, request: &PaymentRequest) -> Result<Value, GatewayError> {
        let amount = request.require_amount()?;
        let mut payload = request.extra.clone();
        payload.insert("amount".to_string(), amount_number(amount));
        payload.insert(
            "currency".to_string(),
            json!(request.currency_or(&self.config.currency)),
        );
        if let Some(description) = &request.description {
            payload.insert("description".to_string(), json!(description));
        }
        if let Some(order_id) = &request.order_id {
            payload
                .entry("reference".to_string())
                .or_insert_with(|| json!({ "order": order_id }));
        }
        if !payload.contains_key("customer") {
            let (first_name, last_name) = request.split_customer_name();
            payload.insert(
                "customer".to_string(),
                json!({
                    "first_name": first_name,
                    "last_name": last_name,
                    "email": request.customer_email,
                }),
            );
        }
        payload.insert("source".to_string(), json!({ "id": "src_all" }));
        payload.insert("redirect".to_string(), json!({ "url": self.urls.callback_url }));
        Ok(Value::Object(payload))
    }

    async fn try_initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiationResult, GatewayError> {
        let payload = self.charge_payload(request)?;
        let envelope = self
            .executor
            .execute(Method::POST, "/v2/charges/", Some(&payload), Encoding::Json)
            .await;
        let raw = envelope.to_value();
        let body = envelope.into_result()?;

        Ok(match text_at(&body, "/transaction/url") {
            Some(url) => PaymentInitiationResult::redirect(url, text_at(&body, "/id")),
            None => PaymentInitiationResult::failed("charge has no transaction url", Some(raw)),
        })
    }

    async fn fetch_charge(&self, charge_id: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        let path = format!("/v2/charges/{}", urlencoding::encode(charge_id));
        let body = self
            .executor
            .execute(Method::GET, &path, None, Encoding::Json)
            .await
            .into_result()?;

        let status = require_text_at(&body, "/status")?;
        Ok(CanonicalPaymentResponse::verified(NAME, STATUS_TABLE.map(&status))
            .with_provider_status(status)
            .with_unique_id(text_at(&body, "/id").or_else(|| Some(charge_id.to_string())))
            .with_amount(decimal_at(&body, "/amount"))
            .with_currency(text_at(&body, "/currency"))
            .with_raw(body))
    }

    async fn try_verify(&self, callback: &InboundCallback) -> Result<CanonicalPaymentResponse, GatewayError> {
        let charge_id = callback
            .text("tap_id")
            .ok_or_else(|| GatewayError::InvalidRequest("tap_id is required".to_string()))?;
        self.fetch_charge(&charge_id).await
    }
}

#[async_trait::async_trait]
impl PaymentGateway for TapGateway {
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
impl PaymentOperations for TapGateway {
    fn gateway_name(&self) -> &'static str {
        NAME
    }

    async fn query_status(&self, id: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        self.fetch_charge(id).await
    }
}
