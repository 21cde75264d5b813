use crate::config::{ConfigError, GatewaySettings, SystemUrls};
use crate::domain::callback::InboundCallback;
use crate::domain::request::{amount_number, LineItem, PaymentRequest};
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
use crate::verification::SignatureScheme;
use chrono::{SecondsFormat, Utc};
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

pub const NAME: &str = "tamara";

/// Order statuses. `approved` means the customer finished checkout and the
/// provider has committed to pay, which is treated as success.
pub const STATUS_TABLE: StatusTable = StatusTable::new(&[
    ("approved", PaymentStatus::Success),
    ("captured", PaymentStatus::Success),
    ("fully_captured", PaymentStatus::Success),
    ("partially_captured", PaymentStatus::Pending),
    ("authorised", PaymentStatus::Pending),
    ("new", PaymentStatus::Pending),
    ("declined", PaymentStatus::Rejected),
    ("expired", PaymentStatus::Expired),
    ("canceled", PaymentStatus::Canceled),
    ("refunded", PaymentStatus::Refunded),
    ("fully_refunded", PaymentStatus::Refunded),
    ("partially_refunded", PaymentStatus::Refunded),
]);

const SIGNATURE_HEADER: &str = "Signature";

#[derive(Clone)]
pub struct TamaraConfig {
    pub base_url: String,
    pub api_key: String,
    pub notification_key: Option<String>,
    pub currency: String,
}

impl std::fmt::Debug for TamaraConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TamaraConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("notification_key", &self.notification_key.as_ref().map(|_| "[REDACTED]"))
            .field("currency", &self.currency)
            .finish()
    }
}

impl TamaraConfig {
    pub fn from_settings(name: &str, settings: &GatewaySettings) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: settings.base_url(name)?,
            api_key: settings.require(name, "api_key")?,
            notification_key: settings.get("notification_key"),
            currency: settings.get_or("currency", "SAR"),
        })
    }
}

pub struct TamaraGateway {
    pub config: TamaraConfig,
    pub urls: SystemUrls,
    executor: RequestExecutor,
}

pub fn build(ctx: &AdapterContext<'_>) -> Result<Arc<dyn PaymentGateway>, ConfigError> {
    let config = TamaraConfig::from_settings(ctx.name, ctx.settings)?;
    Ok(Arc::new(TamaraGateway::new(config, ctx.urls.clone(), ctx.transport.clone())))
}

fn auth_headers(config: &TamaraConfig) -> GatewayHeaders {
    let mut headers = json_headers();
    headers.insert("Authorization".to_string(), bearer(&config.api_key));
    headers
}

fn money(amount: Decimal, currency: &str) -> Value {
    json!({ "amount": amount_number(amount), "currency": currency })
}

fn order_item(item: &LineItem, currency: &str) -> Result<Value, GatewayError> {
    let reference = item
        .sku
        .clone()
        .unwrap_or_else(|| format!("item_{}", Uuid::new_v4().simple()));
    Ok(json!({
        "reference_id": reference,
        "type": "physical",
        "name": item.name,
        "sku": reference,
        "quantity": item.quantity,
        "unit_price": money(item.unit_price, currency),
        "discount_amount": money(item.discount.unwrap_or_default(), currency),
        "tax_amount": money(Decimal::ZERO, currency),
        "total_amount": money(item.total()?, currency),
        "image_url": item.image_url,
        "category": item.category,
    }))
}

impl TamaraGateway {
    pub fn new(config: TamaraConfig, urls: SystemUrls, transport: Arc<dyn HttpTransport>) -> Self {
        let executor = RequestExecutor::new(NAME, config.base_url.clone(), auth_headers(&config), transport);
        Self {
            config,
            urls,
            executor,
        }
    }

    fn checkout_payload(&self, request: &PaymentRequest) -> Result<Value, GatewayError> {
        let amount = request.require_amount()?;
        let currency = request.require_currency()?;
        let email = request.require_text("customer_email", &request.customer_email)?;
        let phone = request.require_text("customer_phone", &request.customer_phone)?;
        request.require_text("customer_name", &request.customer_name)?;

        let (first_name, last_name) = request.split_customer_name();
        let country = request.country_code.clone().unwrap_or_else(|| "SA".to_string());
        let shipping = request.shipping.clone().unwrap_or_default();
        let billing = request.billing.clone().unwrap_or_else(|| shipping.clone());
        let address = |a: &crate::domain::request::Address| {
            json!({
                "first_name": first_name,
                "last_name": last_name,
                "line1": a.line1.clone().unwrap_or_default(),
                "line2": a.line2.clone().unwrap_or_default(),
                "city": a.city.clone().unwrap_or_default(),
                "country_code": country,
                "phone_number": phone,
            })
        };
        let items = request
            .items
            .iter()
            .map(|item| order_item(item, currency))
            .collect::<Result<Vec<_>, _>>()?;
        let extra_amount = |key: &str| {
            request
                .extra
                .get(key)
                .and_then(crate::domain::request::parse_amount)
                .unwrap_or_default()
        };

        Ok(json!({
            "order_reference_id": request.merchant_reference("tamara_"),
            "total_amount": money(amount, currency),
            "description": request.description.clone().unwrap_or_else(|| "Order payment".to_string()),
            "country_code": country,
            "payment_type": request.extra.get("payment_type").cloned().unwrap_or(json!("PAY_BY_INSTALMENTS")),
            "instalments": request.extra.get("instalments").cloned().unwrap_or(json!(3)),
            "locale": request.lang_or("en"),
            "items": items,
            "consumer": {
                "first_name": first_name,
                "last_name": last_name,
                "phone_number": phone,
                "email": email,
            },
            "billing_address": address(&billing),
            "shipping_address": address(&shipping),
            "discount": {
                "amount": money(extra_amount("discount_amount"), currency),
                "name": request.extra.get("discount_name").cloned().unwrap_or(json!("Discount")),
            },
            "tax_amount": money(extra_amount("tax_amount"), currency),
            "shipping_amount": money(extra_amount("shipping_amount"), currency),
            "merchant_url": {
                "success": self.urls.success_url,
                "failure": self.urls.failed_url,
                "cancel": self.urls.cancel_or_failed(),
                "notification": self.urls.callback_url,
            },
            "is_mobile": request.extra.get("is_mobile").cloned().unwrap_or(json!(false)),
        }))
    }

    async fn try_initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiationResult, GatewayError> {
        let payload = self.checkout_payload(request)?;
        let envelope = self
            .executor
            .execute(Method::POST, "/checkout", Some(&payload), Encoding::Json)
            .await;
        let raw = envelope.to_value();
        let body = envelope.into_result()?;

        Ok(match text_at(&body, "/checkout_url") {
            Some(url) => PaymentInitiationResult::redirect(url, text_at(&body, "/checkout_id")),
            None => PaymentInitiationResult::failed(
                text_at(&body, "/message")
                    .unwrap_or_else(|| "checkout has no url".to_string()),
                Some(raw),
            ),
        })
    }

    async fn fetch_order(&self, order_id: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        let path = format!("/orders/{}", urlencoding::encode(order_id));
        let body = self
            .executor
            .execute(Method::GET, &path, None, Encoding::Json)
            .await
            .into_result()?;

        let status = require_text_at(&body, "/status")?;
        Ok(CanonicalPaymentResponse::verified(NAME, STATUS_TABLE.map(&status))
            .with_provider_status(status)
            .with_unique_id(Some(order_id.to_string()))
            .with_amount(decimal_at(&body, "/total_amount/amount").or_else(|| decimal_at(&body, "/order_value/amount")))
            .with_currency(text_at(&body, "/total_amount/currency").or_else(|| text_at(&body, "/order_value/currency")))
            .with_raw(body))
    }

    async fn try_verify(&self, callback: &InboundCallback) -> Result<CanonicalPaymentResponse, GatewayError> {
        if let Some(key) = &self.config.notification_key {
            let provided = callback.header(SIGNATURE_HEADER).unwrap_or_default();
            if !SignatureScheme::hmac_sha256(key, "").verify_bytes(&callback.signing_body(), provided) {
                return Err(GatewayError::signature(NAME));
            }
        }

        let order_id = callback
            .text("order_id")
            .ok_or_else(|| GatewayError::InvalidRequest("order_id is required".to_string()))?;
        let mut response = self.fetch_order(&order_id).await?;
        response.raw = json!({ "callback": callback.payload(), "order_status": response.raw });
        Ok(response)
    }

    async fn post_order(&self, order_id: &str, action: &str, payload: Option<Value>) -> Result<OperationOutcome, GatewayError> {
        let path = format!("/orders/{}/{action}", urlencoding::encode(order_id));
        let envelope = self
            .executor
            .execute(Method::POST, &path, payload.as_ref(), Encoding::Json)
            .await;
        let outcome = operation_outcome(envelope, "/order_id")?;
        if !outcome.success {
            tracing::warn!(
                gateway = NAME,
                order = order_id,
                action,
                status_code = outcome.status_code,
                "order operation rejected"
            );
        }
        Ok(outcome)
    }

    /// Confirms an approved order so it can be captured later.
    pub async fn authorise_order(&self, order_id: &str) -> Result<OperationOutcome, GatewayError> {
        if order_id.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("order id is required".to_string()));
        }
        self.post_order(order_id, "authorise", None).await
    }
}

#[async_trait::async_trait]
impl PaymentGateway for TamaraGateway {
    fn name(&self) -> &'static str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FULL
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
impl PaymentOperations for TamaraGateway {
    fn gateway_name(&self) -> &'static str {
        NAME
    }

    async fn capture(&self, id: &str, amount: Decimal) -> Result<OperationOutcome, GatewayError> {
        let payload = json!({
            "total_amount": money(amount, &self.config.currency),
            "shipping_info": {
                "shipped_at": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                "shipping_company": "Default Shipping",
            },
        });
        self.post_order(id, "capture", Some(payload)).await
    }

    async fn void(&self, id: &str) -> Result<OperationOutcome, GatewayError> {
        let payload = json!({ "total_amount": money(Decimal::ZERO, &self.config.currency) });
        self.post_order(id, "cancel", Some(payload)).await
    }

    async fn refund(&self, id: &str, amount: Decimal) -> Result<OperationOutcome, GatewayError> {
        let payload = json!({
            "total_amount": money(amount, &self.config.currency),
            "comment": "Refund requested by merchant",
            "merchant_refund_id": format!("refund_{}", Uuid::new_v4().simple()),
        });
        self.post_order(id, "refunds", Some(payload)).await
    }

    async fn query_status(&self, id: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        self.fetch_order(id).await
    }
}
