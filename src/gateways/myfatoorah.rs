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

pub const NAME: &str = "myfatoorah";

pub const STATUS_TABLE: StatusTable = StatusTable::new(&[
    ("Paid", PaymentStatus::Success),
    ("Pending", PaymentStatus::Pending),
    ("Canceled", PaymentStatus::Canceled),
    ("Expired", PaymentStatus::Expired),
    ("Failed", PaymentStatus::Failed),
]);

#[derive(Clone)]
pub struct MyFatoorahConfig {
    pub base_url: String,
    pub api_key: String,
    pub language: String,
}

impl MyFatoorahConfig {
    pub fn from_settings(name: &str, settings: &GatewaySettings) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: settings.base_url(name)?,
            api_key: settings.require(name, "api_key")?,
            language: settings.get_or("language", "en"),
        })
    }
}

pub struct MyFatoorahGateway {
    pub config: MyFatoorahConfig,
    pub urls: SystemUrls,
    executor: RequestExecutor,
}

pub fn build(ctx: &AdapterContext<'_>) -> Result<Arc<dyn PaymentGateway>, ConfigError> {
    let config = MyFatoorahConfig::from_settings(ctx.name, ctx.settings)?;
    Ok(Arc::new(MyFatoorahGateway::new(config, ctx.urls.clone(), ctx.transport.clone())))
}

fn auth_headers(config: &MyFatoorahConfig) -> GatewayHeaders {
    let mut headers = json_headers();
    headers.insert("Authorization".to_string(), bearer(&config.api_key));
    headers
}

impl MyFatoorahGateway {
    pub fn new(config: MyFatoorahConfig, urls: SystemUrls, transport: Arc<dyn HttpTransport>) -> Self {
        let executor = RequestExecutor::new(NAME, config.base_url.clone(), auth_headers(&config), transport);
        Self {
            config,
            urls,
            executor,
        }
    }

    /// Passthrough fields first, then the typed request fields, then the
    /// merchant-owned URLs, which callers cannot override.
    fn send_payment_payload(&self, request: &PaymentRequest) -> Result<Value, GatewayError> {
        let amount = request.require_amount()?;
        let mut payload = request.extra.clone();

        let mut set = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                payload.insert(key.to_string(), value);
            }
        };
        set("InvoiceValue", Some(amount_number(amount)));
        set("CustomerName", request.customer_name.clone().map(Value::from));
        set("CustomerEmail", request.customer_email.clone().map(Value::from));
        set("CustomerMobile", request.customer_phone.clone().map(Value::from));
        set("DisplayCurrencyIso", request.currency.clone().map(Value::from));
        set("CustomerReference", request.order_id.clone().map(Value::from));
        set("Language", Some(json!(request.lang_or(&self.config.language))));
        set("NotificationOption", Some(json!("LNK")));
        set("CallBackUrl", Some(json!(self.urls.callback_url)));
        set("ErrorUrl", Some(json!(self.urls.failed_url)));

        if !payload.contains_key("CustomerName") {
            return Err(GatewayError::InvalidRequest("customer_name is required".to_string()));
        }
        Ok(Value::Object(payload))
    }

    async fn try_initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiationResult, GatewayError> {
        let payload = self.send_payment_payload(request)?;
        let envelope = self
            .executor
            .execute(Method::POST, "/v2/SendPayment", Some(&payload), Encoding::Json)
            .await;
        let raw = envelope.to_value();
        let body = envelope.into_result()?;

        Ok(match text_at(&body, "/Data/InvoiceURL") {
            Some(url) => PaymentInitiationResult::redirect(url, text_at(&body, "/Data/InvoiceId")),
            None => PaymentInitiationResult::failed(
                text_at(&body, "/Message").unwrap_or_else(|| "invoice url missing".to_string()),
                Some(raw),
            ),
        })
    }

    async fn payment_status(&self, key: &str, key_type: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        let payload = json!({ "Key": key, "KeyType": key_type });
        let body = self
            .executor
            .execute(Method::POST, "/v2/getPaymentStatus", Some(&payload), Encoding::Json)
            .await
            .into_result()?;

        if body.get("IsSuccess").and_then(Value::as_bool) != Some(true) {
            return Err(GatewayError::shape("getPaymentStatus did not report IsSuccess", &body));
        }

        let invoice_status = require_text_at(&body, "/Data/InvoiceStatus")?;
        let currency = text_at(&body, "/Data/InvoiceTransactions/0/Currency")
            .or_else(|| text_at(&body, "/Data/Currency"));
        Ok(CanonicalPaymentResponse::verified(NAME, STATUS_TABLE.map(&invoice_status))
            .with_provider_status(invoice_status)
            .with_unique_id(text_at(&body, "/Data/InvoiceId"))
            .with_amount(decimal_at(&body, "/Data/InvoiceValue"))
            .with_currency(currency)
            .with_raw(body))
    }

    async fn try_verify(&self, callback: &InboundCallback) -> Result<CanonicalPaymentResponse, GatewayError> {
        let payment_id = callback
            .first_text(&["paymentId", "PaymentId"])
            .ok_or_else(|| GatewayError::InvalidRequest("paymentId is required".to_string()))?;
        self.payment_status(&payment_id, "paymentId").await
    }
}

#[async_trait::async_trait]
impl PaymentGateway for MyFatoorahGateway {
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
impl PaymentOperations for MyFatoorahGateway {
    fn gateway_name(&self) -> &'static str {
        NAME
    }

    /// `id` is an invoice id here; callbacks carry payment ids instead.
    async fn query_status(&self, id: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        self.payment_status(id, "InvoiceId").await
    }
}
