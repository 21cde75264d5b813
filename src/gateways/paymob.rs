use crate::config::{ConfigError, GatewaySettings, SystemUrls};
use crate::domain::callback::InboundCallback;
use crate::domain::request::{from_minor_units, to_minor_units, PaymentRequest};
use crate::domain::response::{
    CanonicalPaymentResponse, PaymentInitiationResult, PaymentStatus, StatusTable,
};
use crate::error::GatewayError;
use crate::gateways::{
    bearer, callback_failure, fail_initiation, json_headers, log_verified, require_text_at,
    text_at, Capabilities, GatewayHeaders, PaymentGateway,
};
use crate::registry::AdapterContext;
use crate::transport::executor::{Encoding, RequestExecutor};
use crate::transport::HttpTransport;
use crate::verification::SignatureScheme;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;

pub const NAME: &str = "paymob";

/// Labels derived from the transaction flags, see [`transaction_label`].
pub const STATUS_TABLE: StatusTable = StatusTable::new(&[
    ("success", PaymentStatus::Success),
    ("pending", PaymentStatus::Pending),
    ("voided", PaymentStatus::Canceled),
    ("refunded", PaymentStatus::Refunded),
    ("declined", PaymentStatus::Failed),
]);

/// Transaction fields covered by the HMAC, in signing order. Each entry is
/// the nested path used by the processed callback body.
pub const HMAC_FIELDS: [&str; 20] = [
    "amount_cents",
    "created_at",
    "currency",
    "error_occured",
    "has_parent_transaction",
    "id",
    "integration_id",
    "is_3d_secure",
    "is_auth",
    "is_capture",
    "is_refunded",
    "is_standalone_payment",
    "is_voided",
    "order.id",
    "owner",
    "pending",
    "source_data.pan",
    "source_data.sub_type",
    "source_data.type",
    "success",
];

#[derive(Clone)]
pub struct PaymobConfig {
    pub base_url: String,
    pub api_key: String,
    pub hmac_secret: String,
    pub integrations: Vec<Value>,
    pub currency: String,
}

impl PaymobConfig {
    pub fn from_settings(name: &str, settings: &GatewaySettings) -> Result<Self, ConfigError> {
        let integrations = match settings.value("integrations_id") {
            Some(Value::Array(ids)) => ids.clone(),
            Some(Value::Number(id)) => vec![Value::Number(id.clone())],
            Some(Value::String(ids)) => ids
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<i64>().map(Value::from).unwrap_or_else(|_| json!(s)))
                .collect(),
            _ => Vec::new(),
        };
        if integrations.is_empty() {
            return Err(ConfigError::MissingKey {
                gateway: name.to_string(),
                key: "integrations_id".to_string(),
            });
        }
        Ok(Self {
            base_url: settings
                .get("base_url")
                .unwrap_or_else(|| "https://accept.paymob.com".to_string()),
            api_key: settings.require(name, "api_key")?,
            hmac_secret: settings.require(name, "hmac_secret")?,
            integrations,
            currency: settings.get_or("currency", "EGP"),
        })
    }
}

pub struct PaymobGateway {
    pub config: PaymobConfig,
    pub urls: SystemUrls,
    executor: RequestExecutor,
}

pub fn build(ctx: &AdapterContext<'_>) -> Result<Arc<dyn PaymentGateway>, ConfigError> {
    let config = PaymobConfig::from_settings(ctx.name, ctx.settings)?;
    Ok(Arc::new(PaymobGateway::new(config, ctx.urls.clone(), ctx.transport.clone())))
}

/// Collapses the transaction flags into one label.
pub fn transaction_label(flag: impl Fn(&str) -> bool) -> &'static str {
    if flag("is_voided") {
        "voided"
    } else if flag("is_refunded") {
        "refunded"
    } else if flag("success") {
        "success"
    } else if flag("pending") {
        "pending"
    } else {
        "declined"
    }
}

impl PaymobGateway {
    pub fn new(config: PaymobConfig, urls: SystemUrls, transport: Arc<dyn HttpTransport>) -> Self {
        let executor = RequestExecutor::new(NAME, config.base_url.clone(), json_headers(), transport);
        Self {
            config,
            urls,
            executor,
        }
    }

    async fn auth_token(&self) -> Result<String, GatewayError> {
        let payload = json!({ "api_key": self.config.api_key });
        let body = self
            .executor
            .execute(Method::POST, "/api/auth/tokens", Some(&payload), Encoding::Json)
            .await
            .into_result()?;
        require_text_at(&body, "/token")
    }

    fn order_payload(&self, request: &PaymentRequest) -> Result<Value, GatewayError> {
        let amount = request.require_amount()?;
        let currency = request.currency_or(&self.config.currency).to_string();
        let mut payload = request.extra.clone();
        payload.insert("api_source".to_string(), json!("INVOICE"));
        payload.insert("integrations".to_string(), json!(self.config.integrations));
        payload.insert("amount_cents".to_string(), json!(to_minor_units(amount, &currency)?));
        payload.insert("currency".to_string(), json!(currency));
        if let Some(reference) = &request.order_id {
            payload.insert("merchant_order_id".to_string(), json!(reference));
        }
        if !request.items.is_empty() {
            let items = request
                .items
                .iter()
                .map(|item| {
                    Ok(json!({
                        "name": item.name,
                        "description": item.description.clone().unwrap_or_default(),
                        "amount_cents": to_minor_units(item.unit_price, &currency)?,
                        "quantity": item.quantity,
                    }))
                })
                .collect::<Result<Vec<_>, GatewayError>>()?;
            payload.insert("items".to_string(), Value::Array(items));
        }
        if !payload.contains_key("shipping_data") {
            let (first, last) = request.split_customer_name();
            payload.insert(
                "shipping_data".to_string(),
                json!({
                    "first_name": first,
                    "last_name": last,
                    "email": request.customer_email.clone().unwrap_or_default(),
                    "phone_number": request.customer_phone.clone().unwrap_or_default(),
                }),
            );
        }
        Ok(Value::Object(payload))
    }

    async fn try_initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiationResult, GatewayError> {
        let payload = self.order_payload(request)?;
        let token = self.auth_token().await?;

        let mut per_call = GatewayHeaders::new();
        per_call.insert("Authorization".to_string(), bearer(&token));
        let envelope = self
            .executor
            .execute_with(
                Method::POST,
                "/api/ecommerce/orders",
                Some(&payload),
                Encoding::Json,
                &per_call,
            )
            .await;
        let raw = envelope.to_value();
        let body = envelope.into_result()?;

        Ok(match text_at(&body, "/url") {
            Some(url) => PaymentInitiationResult::redirect(url, text_at(&body, "/id")),
            None => PaymentInitiationResult::failed("order has no payment url", Some(raw)),
        })
    }

    /// Resolves a signed field from either callback shape: the processed
    /// callback nests the transaction under `obj`, the response callback
    /// flattens it into dotted query keys.
    fn signed_field(callback: &InboundCallback, path: &str) -> String {
        if let Some(obj) = callback.fields.get("obj").filter(|o| o.is_object()) {
            let pointer = format!("/{}", path.replace('.', "/"));
            return text_at(obj, &pointer).unwrap_or_default();
        }
        let flat_key = if path == "order.id" { "order" } else { path };
        callback.text(flat_key).unwrap_or_default()
    }

    pub fn callback_hmac(&self, callback: &InboundCallback) -> String {
        let values: Vec<String> = HMAC_FIELDS
            .iter()
            .map(|path| Self::signed_field(callback, path))
            .collect();
        SignatureScheme::hmac_sha512(&self.config.hmac_secret, "").sign(&values)
    }

    fn try_verify(&self, callback: &InboundCallback) -> Result<CanonicalPaymentResponse, GatewayError> {
        let Some(provided) = callback.text("hmac") else {
            return Err(GatewayError::signature(NAME));
        };
        if !SignatureScheme::hmac_sha512(&self.config.hmac_secret, "")
            .verify(&HMAC_FIELDS.map(|p| Self::signed_field(callback, p)), &provided)
        {
            return Err(GatewayError::signature(NAME));
        }

        let flag = |key: &str| Self::signed_field(callback, key) == "true";
        let label = transaction_label(flag);
        let provider_status = callback
            .fields
            .get("obj")
            .and_then(|obj| text_at(obj, "/data/message"))
            .or_else(|| callback.first_text(&["data.message", "txn_response_code"]))
            .unwrap_or_else(|| label.to_string());

        let currency = Some(Self::signed_field(callback, "currency")).filter(|c| !c.is_empty());
        let amount = Self::signed_field(callback, "amount_cents")
            .parse::<i64>()
            .ok()
            .map(|cents| from_minor_units(cents, currency.as_deref().unwrap_or(&self.config.currency)));
        let id = Some(Self::signed_field(callback, "id")).filter(|id| !id.is_empty());

        Ok(CanonicalPaymentResponse::verified(NAME, STATUS_TABLE.map(label))
            .with_provider_status(provider_status)
            .with_unique_id(id)
            .with_amount(amount)
            .with_currency(currency)
            .with_raw(callback.payload()))
    }
}

#[async_trait::async_trait]
impl PaymentGateway for PaymobGateway {
    fn name(&self) -> &'static str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::BASE
    }

    /// The bearer token is fetched per initiation and never stored here.
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
        match self.try_verify(callback) {
            Ok(response) => {
                log_verified(&response);
                response
            }
            Err(e) => callback_failure(NAME, e, callback.payload()),
        }
    }
}
