use crate::config::{ConfigError, GatewaySettings, SystemUrls};
use crate::domain::callback::InboundCallback;
use crate::domain::request::{format_amount, PaymentRequest};
use crate::domain::response::{
    CanonicalPaymentResponse, OperationOutcome, PaymentInitiationResult, PaymentStatus,
    StatusTable,
};
use crate::error::GatewayError;
use crate::gateways::{
    bearer, callback_failure, decimal_at, fail_initiation, json_headers, log_verified,
    operation_outcome, require_text_at, text_at, Capabilities, GatewayHeaders, PaymentGateway,
    PaymentOperations,
};
use crate::registry::AdapterContext;
use crate::transport::executor::{Encoding, RequestExecutor};
use crate::transport::HttpTransport;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub const NAME: &str = "hyperpay";

/// Categories produced by [`classify_result_code`].
pub const STATUS_TABLE: StatusTable = StatusTable::new(&[
    ("success", PaymentStatus::Success),
    ("pending", PaymentStatus::Pending),
    ("rejected", PaymentStatus::Rejected),
    ("failed", PaymentStatus::Failed),
]);

// Constant patterns; every one is compiled by the unit tests below.
static SUCCESS_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(000\.000\.|000\.100\.1|000\.[36]|000\.400\.[1][12]0|000\.400\.0[^3]|000\.400\.100)")
        .expect("success code pattern")
});

static PENDING_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(000\.200|800\.400\.5|100\.400\.500)").expect("pending code pattern"));

static REJECTED_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(000\.400\.[1][0-9][1-9]|000\.400\.2|000\.400\.030|800\.[17]00|800\.800\.[123]|800\.[32]|900\.[1234]00|100\.400|100\.38|100\.370\.100|100\.370\.11)",
    )
    .expect("rejected code pattern")
});

static RESULT_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{3}\.\d{3}\.\d{3}$").expect("result code pattern"));

static RESOURCE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/v1/(checkouts|payments)/[A-Za-z0-9.\-]+(/payment)?$").expect("resource path pattern")
});

/// Maps a result code onto a coarse category label; `None` when the value
/// is not shaped like a result code at all.
pub fn classify_result_code(code: &str) -> Option<&'static str> {
    if SUCCESS_CODE.is_match(code) {
        Some("success")
    } else if PENDING_CODE.is_match(code) {
        Some("pending")
    } else if REJECTED_CODE.is_match(code) {
        Some("rejected")
    } else if RESULT_CODE.is_match(code) {
        Some("failed")
    } else {
        None
    }
}

#[derive(Clone)]
pub struct HyperpayConfig {
    pub base_url: String,
    pub api_key: String,
    pub entity_id: String,
    pub checkout_url: String,
    pub currency: String,
    pub payment_type: String,
    pub test_mode: Option<String>,
}

impl HyperpayConfig {
    pub fn from_settings(name: &str, settings: &GatewaySettings) -> Result<Self, ConfigError> {
        let base_url = settings.base_url(name)?;
        Ok(Self {
            checkout_url: settings
                .get("checkout_url")
                .unwrap_or_else(|| format!("{base_url}/v1/paymentWidgets.js")),
            base_url,
            api_key: settings.require(name, "api_key")?,
            entity_id: settings.require(name, "entity_id")?,
            currency: settings.get_or("currency", "SAR"),
            payment_type: settings.get_or("payment_type", "DB"),
            test_mode: settings.get("test_mode"),
        })
    }
}

pub struct HyperpayGateway {
    pub config: HyperpayConfig,
    pub urls: SystemUrls,
    executor: RequestExecutor,
}

pub fn build(ctx: &AdapterContext<'_>) -> Result<Arc<dyn PaymentGateway>, ConfigError> {
    let config = HyperpayConfig::from_settings(ctx.name, ctx.settings)?;
    Ok(Arc::new(HyperpayGateway::new(config, ctx.urls.clone(), ctx.transport.clone())))
}

fn auth_headers(config: &HyperpayConfig) -> GatewayHeaders {
    let mut headers = json_headers();
    headers.insert("Authorization".to_string(), bearer(&config.api_key));
    headers
}

impl HyperpayGateway {
    pub fn new(config: HyperpayConfig, urls: SystemUrls, transport: Arc<dyn HttpTransport>) -> Self {
        let executor = RequestExecutor::new(NAME, config.base_url.clone(), auth_headers(&config), transport);
        Self {
            config,
            urls,
            executor,
        }
    }

    fn checkout_payload(&self, request: &PaymentRequest) -> Result<Value, GatewayError> {
        let amount = request.require_amount()?;
        let (given, surname) = request.split_customer_name();
        let billing = request.billing.clone().unwrap_or_default();

        let mut payload = Map::new();
        payload.insert("entityId".to_string(), json!(self.config.entity_id));
        payload.insert("amount".to_string(), json!(format_amount(amount)));
        payload.insert(
            "currency".to_string(),
            json!(request.currency_or(&self.config.currency)),
        );
        payload.insert("paymentType".to_string(), json!(self.config.payment_type));
        payload.insert(
            "merchantTransactionId".to_string(),
            json!(request.merchant_reference("hyperpay_")),
        );
        payload.insert("shopperResultUrl".to_string(), json!(self.urls.callback_url));
        // Nested parameters are dotted keys on this API, not bracketed.
        let optional = [
            ("customer.email", request.customer_email.clone()),
            ("customer.givenName", Some(given).filter(|s| !s.is_empty())),
            ("customer.surname", Some(surname).filter(|s| !s.is_empty())),
            ("customer.ip", request.client_ip.clone()),
            ("billing.street1", billing.line1),
            ("billing.city", billing.city),
            ("billing.state", billing.state),
            ("billing.country", billing.country.or_else(|| request.country_code.clone())),
            ("billing.postcode", billing.zip),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                payload.insert(key.to_string(), json!(value));
            }
        }
        if let Some(mode) = &self.config.test_mode {
            payload.insert("testMode".to_string(), json!(mode));
        }
        Ok(Value::Object(payload))
    }

    async fn try_initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiationResult, GatewayError> {
        let payload = self.checkout_payload(request)?;
        let envelope = self
            .executor
            .execute(Method::POST, "/v1/checkouts", Some(&payload), Encoding::Form)
            .await;
        let raw = envelope.to_value();
        let body = envelope.into_result()?;

        Ok(match text_at(&body, "/id") {
            Some(id) => PaymentInitiationResult::redirect(
                format!("{}?id={}", self.config.checkout_url, urlencoding::encode(&id)),
                Some(id),
            ),
            None => PaymentInitiationResult::failed(
                text_at(&body, "/result/description")
                    .unwrap_or_else(|| "checkout id missing".to_string()),
                Some(raw),
            ),
        })
    }

    async fn fetch_resource(&self, resource_path: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        if resource_path.contains("..") || !RESOURCE_PATH.is_match(resource_path) {
            return Err(GatewayError::InvalidRequest(format!(
                "unexpected resourcePath `{resource_path}`"
            )));
        }
        let path = format!(
            "{resource_path}?entityId={}",
            urlencoding::encode(&self.config.entity_id)
        );
        let body = self
            .executor
            .execute(Method::GET, &path, None, Encoding::Json)
            .await
            .into_result()?;

        let code = require_text_at(&body, "/result/code")?;
        let status = classify_result_code(&code)
            .map(|label| STATUS_TABLE.map(label))
            .unwrap_or(PaymentStatus::Unknown);
        Ok(CanonicalPaymentResponse::verified(NAME, status)
            .with_provider_status(code)
            .with_unique_id(text_at(&body, "/id"))
            .with_amount(decimal_at(&body, "/amount"))
            .with_currency(text_at(&body, "/currency"))
            .with_raw(body))
    }

    async fn try_verify(&self, callback: &InboundCallback) -> Result<CanonicalPaymentResponse, GatewayError> {
        let resource_path = callback
            .text("resourcePath")
            .ok_or_else(|| GatewayError::InvalidRequest("resourcePath is required".to_string()))?;
        self.fetch_resource(&resource_path).await
    }

    async fn back_office(&self, id: &str, amount: Decimal, payment_type: &str) -> Result<OperationOutcome, GatewayError> {
        let payload = json!({
            "entityId": self.config.entity_id,
            "amount": format_amount(amount),
            "currency": self.config.currency,
            "paymentType": payment_type,
        });
        let path = format!("/v1/payments/{}", urlencoding::encode(id));
        let envelope = self
            .executor
            .execute(Method::POST, &path, Some(&payload), Encoding::Form)
            .await;
        let mut outcome = operation_outcome(envelope, "/id")?;
        let code = text_at(&outcome.raw, "/result/code").unwrap_or_default();
        outcome.success = outcome.success && classify_result_code(&code) == Some("success");
        if outcome.message.is_none() {
            outcome.message = text_at(&outcome.raw, "/result/description");
        }
        Ok(outcome)
    }
}

#[async_trait::async_trait]
impl PaymentGateway for HyperpayGateway {
    fn name(&self) -> &'static str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            void: false,
            ..Capabilities::FULL
        }
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
impl PaymentOperations for HyperpayGateway {
    fn gateway_name(&self) -> &'static str {
        NAME
    }

    async fn capture(&self, id: &str, amount: Decimal) -> Result<OperationOutcome, GatewayError> {
        self.back_office(id, amount, "CP").await
    }

    async fn refund(&self, id: &str, amount: Decimal) -> Result<OperationOutcome, GatewayError> {
        self.back_office(id, amount, "RF").await
    }

    async fn query_status(&self, id: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        self.fetch_resource(&format!("/v1/payments/{id}")).await
    }
}
