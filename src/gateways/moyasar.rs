use crate::config::{ConfigError, GatewaySettings, SystemUrls};
use crate::domain::callback::InboundCallback;
use crate::domain::request::{from_minor_units, to_minor_units, PaymentRequest};
use crate::domain::response::{
    CanonicalPaymentResponse, PaymentInitiationResult, PaymentStatus, StatusTable,
};
use crate::error::GatewayError;
use crate::gateways::{
    basic_auth, callback_failure, fail_initiation, json_headers, log_verified, require_text_at,
    text_at, Capabilities, GatewayHeaders, PaymentGateway, PaymentOperations,
};
use crate::registry::AdapterContext;
use crate::transport::executor::{Encoding, RequestExecutor};
use crate::transport::HttpTransport;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;

pub const NAME: &str = "moyasar";

pub const STATUS_TABLE: StatusTable = StatusTable::new(&[
    ("paid", PaymentStatus::Success),
    ("captured", PaymentStatus::Success),
    ("authorized", PaymentStatus::Pending),
    ("initiated", PaymentStatus::Pending),
    ("failed", PaymentStatus::Failed),
    ("refunded", PaymentStatus::Refunded),
    ("voided", PaymentStatus::Canceled),
]);

#[derive(Clone)]
pub struct MoyasarConfig {
    pub base_url: String,
    pub api_key: String,
    pub currency: String,
}

impl MoyasarConfig {
    pub fn from_settings(name: &str, settings: &GatewaySettings) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: settings
                .get("base_url")
                .unwrap_or_else(|| "https://api.moyasar.com".to_string()),
            api_key: settings.require(name, "api_key")?,
            currency: settings.get_or("currency", "SAR"),
        })
    }
}

pub struct MoyasarGateway {
    pub config: MoyasarConfig,
    pub urls: SystemUrls,
    executor: RequestExecutor,
}

pub fn build(ctx: &AdapterContext<'_>) -> Result<Arc<dyn PaymentGateway>, ConfigError> {
    let config = MoyasarConfig::from_settings(ctx.name, ctx.settings)?;
    Ok(Arc::new(MoyasarGateway::new(config, ctx.urls.clone(), ctx.transport.clone())))
}

// The secret key is the username with an empty password.
fn auth_headers(config: &MoyasarConfig) -> GatewayHeaders {
    let mut headers = json_headers();
    headers.insert("Authorization".to_string(), basic_auth(&config.api_key, ""));
    headers
}

impl MoyasarGateway {
    pub fn new(config: MoyasarConfig, urls: SystemUrls, transport: Arc<dyn HttpTransport>) -> Self {
        let executor = RequestExecutor::new(NAME, config.base_url.clone(), auth_headers(&config), transport);
        Self {
            config,
            urls,
            executor,
        }
    }

    fn invoice_payload(&self, request: &PaymentRequest) -> Result<Value, GatewayError> {
        let amount = request.require_amount()?;
        let currency = request.currency_or(&self.config.currency).to_string();
        let mut payload = request.extra.clone();
        payload.insert("amount".to_string(), json!(to_minor_units(amount, &currency)?));
        payload.insert("currency".to_string(), json!(currency));
        payload.insert(
            "description".to_string(),
            json!(request.description.clone().unwrap_or_else(|| "Order payment".to_string())),
        );
        payload.insert("success_url".to_string(), json!(self.urls.callback_url));
        payload.insert("back_url".to_string(), json!(self.urls.cancel_or_failed()));
        if let Some(order_id) = &request.order_id {
            payload
                .entry("metadata".to_string())
                .or_insert_with(|| json!({ "order_id": order_id }));
        }
        Ok(Value::Object(payload))
    }

    async fn try_initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiationResult, GatewayError> {
        let payload = self.invoice_payload(request)?;
        let envelope = self
            .executor
            .execute(Method::POST, "/v1/invoices", Some(&payload), Encoding::Json)
            .await;
        let raw = envelope.to_value();
        let body = envelope.into_result()?;

        Ok(match text_at(&body, "/url") {
            Some(url) => PaymentInitiationResult::redirect(url, text_at(&body, "/id")),
            None => PaymentInitiationResult::failed("invoice has no payment url", Some(raw)),
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        let path = format!("/v1/payments/{}", urlencoding::encode(payment_id));
        let body = self
            .executor
            .execute(Method::GET, &path, None, Encoding::Json)
            .await
            .into_result()?;

        let status = require_text_at(&body, "/status")?;
        let currency = text_at(&body, "/currency").unwrap_or_else(|| self.config.currency.clone());
        let amount = body
            .get("amount")
            .and_then(Value::as_i64)
            .map(|minor| from_minor_units(minor, &currency));
        Ok(CanonicalPaymentResponse::verified(NAME, STATUS_TABLE.map(&status))
            .with_provider_status(status)
            .with_unique_id(text_at(&body, "/id").or_else(|| Some(payment_id.to_string())))
            .with_amount(amount)
            .with_currency(Some(currency))
            .with_raw(body))
    }

    async fn try_verify(&self, callback: &InboundCallback) -> Result<CanonicalPaymentResponse, GatewayError> {
        // The redirect carries `status` and `message` too, but only the
        // server's copy of the payment is trusted.
        let payment_id = callback
            .text("id")
            .ok_or_else(|| GatewayError::InvalidRequest("payment id is required".to_string()))?;
        let mut response = self.fetch_payment(&payment_id).await?;
        response.raw = json!({ "callback": callback.payload(), "verification_result": response.raw });
        Ok(response)
    }
}

#[async_trait::async_trait]
impl PaymentGateway for MoyasarGateway {
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
impl PaymentOperations for MoyasarGateway {
    fn gateway_name(&self) -> &'static str {
        NAME
    }

    async fn query_status(&self, id: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        self.fetch_payment(id).await
    }
}
