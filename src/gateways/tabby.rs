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
use chrono::{Duration, SecondsFormat, Utc};
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;

pub const NAME: &str = "tabby";

/// An authorized payment still has to be captured by the merchant, so its
/// status is pending even though the checkout itself succeeded.
pub const STATUS_TABLE: StatusTable = StatusTable::new(&[
    ("CREATED", PaymentStatus::Pending),
    ("AUTHORIZED", PaymentStatus::Pending),
    ("CAPTURED", PaymentStatus::Success),
    ("CANCELED", PaymentStatus::Canceled),
    ("CLOSED", PaymentStatus::Closed),
    ("EXPIRED", PaymentStatus::Expired),
    ("REJECTED", PaymentStatus::Rejected),
]);

const AUTHORIZED: &str = "AUTHORIZED";

#[derive(Clone)]
pub struct TabbyConfig {
    pub base_url: String,
    pub api_key: String,
    pub merchant_code: String,
}

impl TabbyConfig {
    pub fn from_settings(name: &str, settings: &GatewaySettings) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: settings
                .get("base_url")
                .unwrap_or_else(|| "https://api.tabby.ai".to_string()),
            api_key: settings.require(name, "api_key")?,
            merchant_code: settings.require(name, "merchant_code")?,
        })
    }
}

pub struct TabbyGateway {
    pub config: TabbyConfig,
    pub urls: SystemUrls,
    executor: RequestExecutor,
}

pub fn build(ctx: &AdapterContext<'_>) -> Result<Arc<dyn PaymentGateway>, ConfigError> {
    let config = TabbyConfig::from_settings(ctx.name, ctx.settings)?;
    Ok(Arc::new(TabbyGateway::new(config, ctx.urls.clone(), ctx.transport.clone())))
}

fn auth_headers(config: &TabbyConfig) -> GatewayHeaders {
    let mut headers = json_headers();
    headers.insert("Authorization".to_string(), bearer(&config.api_key));
    headers
}

impl TabbyGateway {
    pub fn new(config: TabbyConfig, urls: SystemUrls, transport: Arc<dyn HttpTransport>) -> Self {
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
        let name = request.require_text("customer_name", &request.customer_name)?;

        let items: Vec<Value> = request
            .items
            .iter()
            .map(|item| {
                json!({
                    "title": item.name,
                    "description": item.description.clone().unwrap_or_default(),
                    "quantity": item.quantity,
                    "unit_price": format_amount(item.unit_price),
                    "discount_amount": format_amount(item.discount.unwrap_or_default()),
                    "reference_id": item.sku.clone().unwrap_or_default(),
                    "category": item.category.clone().unwrap_or_else(|| "other".to_string()),
                    "image_url": item.image_url,
                })
            })
            .collect();

        let shipping = request.shipping.clone().unwrap_or_default();
        let expires_at = request
            .extra
            .get("expires_at")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                (Utc::now() + Duration::hours(1)).to_rfc3339_opts(SecondsFormat::Secs, true)
            });

        Ok(json!({
            "payment": {
                "amount": format_amount(amount),
                "currency": currency,
                "description": request.description.clone().unwrap_or_else(|| "Order payment".to_string()),
                "buyer": {
                    "phone": phone,
                    "email": email,
                    "name": name,
                },
                "shipping_address": {
                    "city": shipping.city.unwrap_or_default(),
                    "address": shipping.line1.unwrap_or_default(),
                    "zip": shipping.zip.unwrap_or_default(),
                },
                "order": {
                    "reference_id": request.merchant_reference("order_"),
                    "items": items,
                    "shipping_amount": request.extra.get("shipping_amount").cloned().unwrap_or(json!("0.00")),
                    "tax_amount": request.extra.get("tax_amount").cloned().unwrap_or(json!("0.00")),
                    "discount_amount": request.extra.get("discount_amount").cloned().unwrap_or(json!("0.00")),
                },
                "buyer_history": request.extra.get("buyer_history"),
            },
            "lang": request.lang_or("en"),
            "merchant_code": self.config.merchant_code,
            "merchant_urls": {
                "success": self.urls.success_url,
                "cancel": self.urls.cancel_or_failed(),
                "failure": self.urls.failed_url,
            },
            "expires_at": expires_at,
        }))
    }

    async fn try_initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiationResult, GatewayError> {
        let payload = self.checkout_payload(request)?;
        let envelope = self
            .executor
            .execute(Method::POST, "/api/v2/checkout", Some(&payload), Encoding::Json)
            .await;
        let raw = envelope.to_value();
        let body = envelope.into_result()?;

        let url = text_at(&body, "/checkout_url")
            .or_else(|| text_at(&body, "/configuration/available_products/installments/0/web_url"));
        Ok(match url {
            Some(url) => PaymentInitiationResult::redirect(url, text_at(&body, "/id")),
            None => {
                let reason = text_at(&body, "/status")
                    .map(|s| format!("checkout url not found (session {s})"))
                    .unwrap_or_else(|| "checkout url not found".to_string());
                PaymentInitiationResult::failed(reason, Some(raw))
            }
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        let path = format!("/api/v2/payments/{}", urlencoding::encode(payment_id));
        let body = self
            .executor
            .execute(Method::GET, &path, None, Encoding::Json)
            .await
            .into_result()?;

        let status = require_text_at(&body, "/status")?;
        let authorized = status == AUTHORIZED;
        let mut response = CanonicalPaymentResponse::verified(NAME, STATUS_TABLE.map(&status))
            .with_provider_status(status)
            .with_unique_id(text_at(&body, "/id").or_else(|| Some(payment_id.to_string())))
            .with_amount(decimal_at(&body, "/amount"))
            .with_currency(text_at(&body, "/currency"))
            .with_raw(body);
        // Authorization is where a Tabby checkout ends; the merchant captures next.
        response.success |= authorized;
        Ok(response)
    }

    async fn try_verify(&self, callback: &InboundCallback) -> Result<CanonicalPaymentResponse, GatewayError> {
        let payment_id = callback
            .first_text(&["payment_id", "id"])
            .ok_or_else(|| GatewayError::InvalidRequest("payment_id is required".to_string()))?;
        self.fetch_payment(&payment_id).await
    }

    async fn post_operation(&self, id: &str, action: &str, payload: Option<Value>) -> Result<OperationOutcome, GatewayError> {
        let path = format!("/api/v2/payments/{}/{action}", urlencoding::encode(id));
        let envelope = self
            .executor
            .execute(Method::POST, &path, payload.as_ref(), Encoding::Json)
            .await;
        operation_outcome(envelope, "/id")
    }
}

#[async_trait::async_trait]
impl PaymentGateway for TabbyGateway {
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
impl PaymentOperations for TabbyGateway {
    fn gateway_name(&self) -> &'static str {
        NAME
    }

    async fn capture(&self, id: &str, amount: Decimal) -> Result<OperationOutcome, GatewayError> {
        let payload = json!({ "amount": format_amount(amount) });
        self.post_operation(id, "captures", Some(payload)).await
    }

    async fn void(&self, id: &str) -> Result<OperationOutcome, GatewayError> {
        self.post_operation(id, "cancellations", None).await
    }

    async fn refund(&self, id: &str, amount: Decimal) -> Result<OperationOutcome, GatewayError> {
        let payload = json!({ "amount": format_amount(amount) });
        self.post_operation(id, "refunds", Some(payload)).await
    }

    async fn query_status(&self, id: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        self.fetch_payment(id).await
    }
}
