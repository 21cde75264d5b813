use crate::config::{ConfigError, GatewaySettings, SystemUrls};
use crate::domain::callback::InboundCallback;
use crate::domain::request::{format_amount, PaymentRequest};
use crate::domain::response::{
    CanonicalPaymentResponse, PaymentInitiationResult, PaymentStatus, StatusTable,
};
use crate::error::GatewayError;
use crate::gateways::{
    basic_auth, callback_failure, decimal_at, fail_initiation, json_headers, log_verified,
    require_text_at, text_at, Capabilities, GatewayHeaders, PaymentGateway, PaymentOperations,
};
use crate::registry::AdapterContext;
use crate::transport::executor::{Encoding, RequestExecutor};
use crate::transport::HttpTransport;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;

pub const NAME: &str = "paypal";

/// Order statuses from the Orders v2 API.
pub const STATUS_TABLE: StatusTable = StatusTable::new(&[
    ("COMPLETED", PaymentStatus::Success),
    ("APPROVED", PaymentStatus::Pending),
    ("PAYER_ACTION_REQUIRED", PaymentStatus::Pending),
    ("SAVED", PaymentStatus::Pending),
    ("CREATED", PaymentStatus::Pending),
    ("VOIDED", PaymentStatus::Canceled),
]);

/// Returned by the capture endpoint for an order that was already captured
/// or cannot be captured any more.
const UNPROCESSABLE: u16 = 422;

#[derive(Clone)]
pub struct PaypalConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub currency: String,
}

impl PaypalConfig {
    pub fn from_settings(name: &str, settings: &GatewaySettings) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: settings.base_url(name)?,
            client_id: settings.require(name, "client_id")?,
            client_secret: settings.require(name, "client_secret")?,
            currency: settings.get_or("currency", "USD"),
        })
    }
}

pub struct PaypalGateway {
    pub config: PaypalConfig,
    pub urls: SystemUrls,
    executor: RequestExecutor,
}

pub fn build(ctx: &AdapterContext<'_>) -> Result<Arc<dyn PaymentGateway>, ConfigError> {
    let config = PaypalConfig::from_settings(ctx.name, ctx.settings)?;
    Ok(Arc::new(PaypalGateway::new(config, ctx.urls.clone(), ctx.transport.clone())))
}

fn auth_headers(config: &PaypalConfig) -> GatewayHeaders {
    let mut headers = json_headers();
    headers.insert(
        "Authorization".to_string(),
        basic_auth(&config.client_id, &config.client_secret),
    );
    headers
}

/// The link the buyer must follow, picked by relation. Orders created with a
/// `payment_source` answer with `payer-action`; older flows with `approve`.
pub fn approval_link(body: &Value) -> Option<String> {
    body.get("links")?
        .as_array()?
        .iter()
        .find(|link| {
            matches!(
                link.get("rel").and_then(Value::as_str),
                Some("approve") | Some("payer-action")
            )
        })
        .and_then(|link| link.get("href"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

impl PaypalGateway {
    pub fn new(config: PaypalConfig, urls: SystemUrls, transport: Arc<dyn HttpTransport>) -> Self {
        let executor = RequestExecutor::new(NAME, config.base_url.clone(), auth_headers(&config), transport);
        Self {
            config,
            urls,
            executor,
        }
    }

    fn order_payload(&self, request: &PaymentRequest) -> Result<Value, GatewayError> {
        let amount = request.require_amount()?;
        let mut unit = json!({
            "amount": {
                "currency_code": request.currency_or(&self.config.currency),
                "value": format_amount(amount),
            },
        });
        if let Some(order_id) = &request.order_id {
            unit["reference_id"] = json!(order_id);
        }
        if let Some(description) = &request.description {
            unit["description"] = json!(description);
        }
        Ok(json!({
            "intent": "CAPTURE",
            "purchase_units": [unit],
            "payment_source": {
                "paypal": {
                    "experience_context": {
                        "return_url": self.urls.callback_url,
                        "cancel_url": self.urls.cancel_or_failed(),
                    },
                },
            },
        }))
    }

    async fn try_initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiationResult, GatewayError> {
        let payload = self.order_payload(request)?;
        let envelope = self
            .executor
            .execute(Method::POST, "/v2/checkout/orders", Some(&payload), Encoding::Json)
            .await;
        let raw = envelope.to_value();
        let body = envelope.into_result()?;

        Ok(match approval_link(&body) {
            Some(url) => PaymentInitiationResult::redirect(url, text_at(&body, "/id")),
            None => PaymentInitiationResult::failed("order has no approval link", Some(raw)),
        })
    }

    fn order_response(&self, body: Value, token: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        let status = require_text_at(&body, "/status")?;
        // Captured orders report the settled amount; others the requested one.
        let capture = "/purchase_units/0/payments/captures/0/amount";
        let requested = "/purchase_units/0/amount";
        let amount = decimal_at(&body, &format!("{capture}/value"))
            .or_else(|| decimal_at(&body, &format!("{requested}/value")));
        let currency = text_at(&body, &format!("{capture}/currency_code"))
            .or_else(|| text_at(&body, &format!("{requested}/currency_code")));
        Ok(CanonicalPaymentResponse::verified(NAME, STATUS_TABLE.map(&status))
            .with_provider_status(status)
            .with_unique_id(text_at(&body, "/id").or_else(|| Some(token.to_string())))
            .with_amount(amount)
            .with_currency(currency)
            .with_raw(body))
    }

    async fn fetch_order(&self, token: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        let path = format!("/v2/checkout/orders/{}", urlencoding::encode(token));
        let body = self
            .executor
            .execute(Method::GET, &path, None, Encoding::Json)
            .await
            .into_result()?;
        self.order_response(body, token)
    }

    async fn try_verify(&self, callback: &InboundCallback) -> Result<CanonicalPaymentResponse, GatewayError> {
        let token = callback
            .first_text(&["token", "orderID"])
            .ok_or_else(|| GatewayError::InvalidRequest("token is required".to_string()))?;
        let path = format!("/v2/checkout/orders/{}/capture", urlencoding::encode(&token));
        let envelope = self
            .executor
            .execute(Method::POST, &path, Some(&json!({})), Encoding::Json)
            .await;

        if envelope.status_code == UNPROCESSABLE {
            tracing::info!(gateway = NAME, order = %token, "capture refused, reading order state");
            return self.fetch_order(&token).await;
        }
        self.order_response(envelope.into_result()?, &token)
    }
}

#[async_trait::async_trait]
impl PaymentGateway for PaypalGateway {
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
impl PaymentOperations for PaypalGateway {
    fn gateway_name(&self) -> &'static str {
        NAME
    }

    async fn query_status(&self, id: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        self.fetch_order(id).await
    }
}
