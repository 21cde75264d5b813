use crate::config::{ConfigError, GatewaySettings, SystemUrls};
use crate::domain::callback::InboundCallback;
use crate::domain::request::{amount_number, format_amount, PaymentRequest};
use crate::domain::response::{
    CanonicalPaymentResponse, OperationOutcome, PaymentInitiationResult, PaymentStatus,
    StatusTable,
};
use crate::error::GatewayError;
use crate::gateways::{
    callback_failure, decimal_at, fail_initiation, json_headers, log_verified, operation_outcome,
    require_text_at, text_at, Capabilities, GatewayHeaders, PaymentGateway, PaymentOperations,
};
use crate::registry::AdapterContext;
use crate::transport::executor::{Encoding, RequestExecutor};
use crate::transport::HttpTransport;
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;

pub const NAME: &str = "telr";

/// `order.status.code`.
pub const STATUS_TABLE: StatusTable = StatusTable::new(&[
    ("3", PaymentStatus::Success),
    ("2", PaymentStatus::Pending),
    ("1", PaymentStatus::Pending),
    ("-1", PaymentStatus::Expired),
    ("-2", PaymentStatus::Canceled),
    ("-3", PaymentStatus::Rejected),
]);

#[derive(Clone)]
pub struct TelrConfig {
    pub base_url: String,
    pub store_id: String,
    pub auth_key: String,
    pub currency: String,
}

impl TelrConfig {
    pub fn from_settings(name: &str, settings: &GatewaySettings) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: settings
                .get("base_url")
                .unwrap_or_else(|| "https://secure.telr.com/gateway/order.json".to_string()),
            store_id: settings.require(name, "store_id")?,
            auth_key: settings.require(name, "auth_key")?,
            currency: settings.get_or("currency", "SAR"),
        })
    }
}

pub struct TelrGateway {
    pub config: TelrConfig,
    pub urls: SystemUrls,
    executor: RequestExecutor,
}

pub fn build(ctx: &AdapterContext<'_>) -> Result<Arc<dyn PaymentGateway>, ConfigError> {
    let config = TelrConfig::from_settings(ctx.name, ctx.settings)?;
    Ok(Arc::new(TelrGateway::new(config, ctx.urls.clone(), ctx.transport.clone())))
}

impl TelrGateway {
    pub fn new(config: TelrConfig, urls: SystemUrls, transport: Arc<dyn HttpTransport>) -> Self {
        let executor = RequestExecutor::new(NAME, config.base_url.clone(), json_headers(), transport);
        Self {
            config,
            urls,
            executor,
        }
    }

    /// Every call goes to the same endpoint; `method` selects the action and
    /// the store credentials ride in the body.
    fn command(&self, method: &str, order: Value) -> Value {
        json!({
            "method": method,
            "store": self.config.store_id,
            "authkey": self.config.auth_key,
            "order": order,
        })
    }

    fn create_payload(&self, request: &PaymentRequest, reference: &str) -> Result<Value, GatewayError> {
        let amount = request.require_amount()?;
        let mut payload = self.command(
            "create",
            json!({
                "ref": reference,
                "amount": format_amount(amount),
                "currency": request.currency_or(&self.config.currency),
                "description": request.description.clone().unwrap_or_else(|| "Order payment".to_string()),
            }),
        );
        payload["customer"] = json!({
            "name": request.customer_name.clone().unwrap_or_default(),
            "email": request.customer_email.clone().unwrap_or_default(),
            "phone": request.customer_phone.clone().unwrap_or_default(),
        });
        payload["return"] = json!({
            "url": self.urls.callback_url,
            "params": { "ref": reference },
        });
        payload["cancel"] = json!({ "url": self.urls.cancel_or_failed() });
        if let Some(billing) = &request.billing {
            payload["billing"] = json!({
                "address": {
                    "line1": billing.line1.clone().unwrap_or_default(),
                    "city": billing.city.clone().unwrap_or_default(),
                    "region": billing.state.clone().unwrap_or_default(),
                    "country": billing.country.clone().unwrap_or_else(|| "SA".to_string()),
                    "zip": billing.zip.clone().unwrap_or_default(),
                },
            });
        }
        Ok(payload)
    }

    async fn try_initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiationResult, GatewayError> {
        let reference = request.merchant_reference("telr_");
        let payload = self.create_payload(request, &reference)?;
        let envelope = self
            .executor
            .execute(Method::POST, "", Some(&payload), Encoding::Json)
            .await;
        let raw = envelope.to_value();
        let body = envelope.into_result()?;

        let url = text_at(&body, "/order/url").or_else(|| text_at(&body, "/url"));
        Ok(match url {
            Some(url) => PaymentInitiationResult::redirect(
                url,
                text_at(&body, "/order/ref").or_else(|| Some(reference.clone())),
            )
            .with_track_id(reference),
            None => PaymentInitiationResult::failed(
                text_at(&body, "/error/message")
                    .unwrap_or_else(|| "order has no payment url".to_string()),
                Some(raw),
            )
            .with_track_id(reference),
        })
    }

    async fn check_order(&self, reference: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        let payload = self.command("check", json!({ "ref": reference }));
        let body = self
            .executor
            .execute(Method::POST, "", Some(&payload), Encoding::Json)
            .await
            .into_result()?;

        let code = require_text_at(&body, "/order/status/code")?;
        let label = text_at(&body, "/order/status/text").unwrap_or_else(|| code.clone());
        let mut response = CanonicalPaymentResponse::verified(NAME, STATUS_TABLE.map(&code))
            .with_provider_status(label)
            .with_unique_id(Some(reference.to_string()))
            .with_amount(decimal_at(&body, "/order/amount"))
            .with_currency(text_at(&body, "/order/currency"));
        response.raw = body;
        Ok(response)
    }

    async fn try_verify(&self, callback: &InboundCallback) -> Result<CanonicalPaymentResponse, GatewayError> {
        let reference = callback
            .first_text(&["ref", "OrderRef"])
            .ok_or_else(|| GatewayError::InvalidRequest("ref is required".to_string()))?;
        let mut response = self.check_order(&reference).await?;
        response.raw = json!({ "callback": callback.payload(), "verification_result": response.raw });
        Ok(response)
    }

    async fn order_action(&self, method: &str, reference: &str, amount: Option<Decimal>) -> Result<OperationOutcome, GatewayError> {
        let mut payload = self.command(method, json!({ "ref": reference }));
        if let Some(amount) = amount {
            payload["amount"] = amount_number(amount);
        }
        let envelope = self
            .executor
            .execute(Method::POST, "", Some(&payload), Encoding::Json)
            .await;
        let mut outcome = operation_outcome(envelope, "/order/ref")?;
        // Rejections come back as HTTP 200 with an `error` object.
        if outcome.success && outcome.raw.get("error").is_some() {
            outcome.success = false;
            outcome.message = text_at(&outcome.raw, "/error/message").or(outcome.message);
        }
        Ok(outcome)
    }
}

#[async_trait::async_trait]
impl PaymentGateway for TelrGateway {
    fn name(&self) -> &'static str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FULL
    }

    fn build_auth_headers(&self) -> GatewayHeaders {
        json_headers()
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
impl PaymentOperations for TelrGateway {
    fn gateway_name(&self) -> &'static str {
        NAME
    }

    async fn capture(&self, id: &str, amount: Decimal) -> Result<OperationOutcome, GatewayError> {
        self.order_action("capture", id, Some(amount)).await
    }

    async fn void(&self, id: &str) -> Result<OperationOutcome, GatewayError> {
        self.order_action("cancel", id, None).await
    }

    async fn refund(&self, id: &str, amount: Decimal) -> Result<OperationOutcome, GatewayError> {
        self.order_action("refund", id, Some(amount)).await
    }

    async fn query_status(&self, id: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        self.check_order(id).await
    }
}
