use crate::config::{ConfigError, GatewaySettings, SystemUrls};
use crate::domain::callback::InboundCallback;
use crate::domain::request::{amount_number, PaymentRequest};
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

pub const NAME: &str = "clickpay";

/// `payment_result.response_status` codes.
pub const STATUS_TABLE: StatusTable = StatusTable::new(&[
    ("A", PaymentStatus::Success),
    ("H", PaymentStatus::Pending),
    ("P", PaymentStatus::Pending),
    ("V", PaymentStatus::Canceled),
    ("E", PaymentStatus::Failed),
    ("D", PaymentStatus::Rejected),
    ("X", PaymentStatus::Expired),
]);

#[derive(Clone)]
pub struct ClickPayConfig {
    pub base_url: String,
    pub server_key: String,
    pub profile_id: String,
    pub currency: String,
}

impl ClickPayConfig {
    pub fn from_settings(name: &str, settings: &GatewaySettings) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: settings.base_url(name)?,
            server_key: settings.require(name, "server_key")?,
            profile_id: settings.require(name, "profile_id")?,
            currency: settings.get_or("currency", "SAR"),
        })
    }
}

pub struct ClickPayGateway {
    pub config: ClickPayConfig,
    pub urls: SystemUrls,
    executor: RequestExecutor,
}

pub fn build(ctx: &AdapterContext<'_>) -> Result<Arc<dyn PaymentGateway>, ConfigError> {
    let config = ClickPayConfig::from_settings(ctx.name, ctx.settings)?;
    Ok(Arc::new(ClickPayGateway::new(config, ctx.urls.clone(), ctx.transport.clone())))
}

// The server key goes out as-is, without a scheme prefix.
fn auth_headers(config: &ClickPayConfig) -> GatewayHeaders {
    let mut headers = json_headers();
    headers.insert("Authorization".to_string(), config.server_key.clone());
    headers
}

impl ClickPayGateway {
    pub fn new(config: ClickPayConfig, urls: SystemUrls, transport: Arc<dyn HttpTransport>) -> Self {
        let executor = RequestExecutor::new(NAME, config.base_url.clone(), auth_headers(&config), transport);
        Self {
            config,
            urls,
            executor,
        }
    }

    fn sale_payload(&self, request: &PaymentRequest) -> Result<Value, GatewayError> {
        let amount = request.require_amount()?;
        let billing = request.billing.clone().unwrap_or_default();
        Ok(json!({
            "profile_id": self.config.profile_id,
            "tran_type": "sale",
            "tran_class": "ecom",
            "cart_id": request.merchant_reference("clickpay_"),
            "cart_description": request.description.clone().unwrap_or_else(|| "Order payment".to_string()),
            "cart_currency": request.currency_or(&self.config.currency),
            "cart_amount": amount_number(amount),
            "callback": self.urls.callback_url,
            "return": self.urls.callback_url,
            "customer_details": {
                "name": request.customer_name.clone().unwrap_or_default(),
                "email": request.customer_email.clone().unwrap_or_default(),
                "phone": request.customer_phone.clone().unwrap_or_default(),
                "street1": billing.line1.unwrap_or_default(),
                "city": billing.city.unwrap_or_default(),
                "state": billing.state.unwrap_or_default(),
                "country": billing.country.unwrap_or_else(|| "SA".to_string()),
                "zip": billing.zip.unwrap_or_default(),
                "ip": request.client_ip.clone().unwrap_or_default(),
            },
            "hide_shipping": true,
        }))
    }

    async fn try_initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiationResult, GatewayError> {
        let payload = self.sale_payload(request)?;
        let envelope = self
            .executor
            .execute(Method::POST, "/payment/request", Some(&payload), Encoding::Json)
            .await;
        let raw = envelope.to_value();
        let body = envelope.into_result()?;

        Ok(match text_at(&body, "/redirect_url") {
            Some(url) => PaymentInitiationResult::redirect(url, text_at(&body, "/tran_ref")),
            None => PaymentInitiationResult::failed(
                text_at(&body, "/message")
                    .unwrap_or_else(|| "payment page was not created".to_string()),
                Some(raw),
            ),
        })
    }

    async fn query_transaction(&self, tran_ref: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        let payload = json!({
            "profile_id": self.config.profile_id,
            "tran_ref": tran_ref,
        });
        let body = self
            .executor
            .execute(Method::POST, "/payment/query", Some(&payload), Encoding::Json)
            .await
            .into_result()?;

        let code = require_text_at(&body, "/payment_result/response_status")?;
        Ok(CanonicalPaymentResponse::verified(NAME, STATUS_TABLE.map(&code))
            .with_provider_status(code)
            .with_unique_id(text_at(&body, "/tran_ref").or_else(|| Some(tran_ref.to_string())))
            .with_amount(decimal_at(&body, "/cart_amount"))
            .with_currency(text_at(&body, "/cart_currency"))
            .with_raw(body))
    }

    async fn try_verify(&self, callback: &InboundCallback) -> Result<CanonicalPaymentResponse, GatewayError> {
        let tran_ref = callback
            .first_text(&["tran_ref", "tranRef"])
            .ok_or_else(|| GatewayError::InvalidRequest("tran_ref is required".to_string()))?;
        let mut response = self.query_transaction(&tran_ref).await?;
        response.raw = json!({ "callback": callback.payload(), "verification_result": response.raw });
        Ok(response)
    }

    async fn follow_up(
        &self,
        tran_ref: &str,
        tran_type: &str,
        amount: Option<Decimal>,
    ) -> Result<OperationOutcome, GatewayError> {
        let mut payload = json!({
            "profile_id": self.config.profile_id,
            "tran_ref": tran_ref,
            "tran_type": tran_type,
            "tran_class": "ecom",
            "cart_id": tran_ref,
            "cart_description": format!("{tran_type} {tran_ref}"),
            "cart_currency": self.config.currency,
        });
        if let Some(amount) = amount {
            payload["cart_amount"] = amount_number(amount);
        }
        let envelope = self
            .executor
            .execute(Method::POST, "/payment/request", Some(&payload), Encoding::Json)
            .await;
        let mut outcome = operation_outcome(envelope, "/tran_ref")?;
        if outcome.success {
            let code = text_at(&outcome.raw, "/payment_result/response_status").unwrap_or_default();
            outcome.success = STATUS_TABLE.map(&code) == PaymentStatus::Success;
            if outcome.message.is_none() {
                outcome.message = text_at(&outcome.raw, "/payment_result/response_message");
            }
        }
        Ok(outcome)
    }
}

#[async_trait::async_trait]
impl PaymentGateway for ClickPayGateway {
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
impl PaymentOperations for ClickPayGateway {
    fn gateway_name(&self) -> &'static str {
        NAME
    }

    async fn capture(&self, id: &str, amount: Decimal) -> Result<OperationOutcome, GatewayError> {
        self.follow_up(id, "capture", Some(amount)).await
    }

    async fn void(&self, id: &str) -> Result<OperationOutcome, GatewayError> {
        self.follow_up(id, "void", None).await
    }

    async fn refund(&self, id: &str, amount: Decimal) -> Result<OperationOutcome, GatewayError> {
        self.follow_up(id, "refund", Some(amount)).await
    }

    async fn query_status(&self, id: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        self.query_transaction(id).await
    }
}
