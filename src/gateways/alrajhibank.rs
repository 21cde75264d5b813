use crate::config::{ConfigError, GatewaySettings, SystemUrls};
use crate::domain::callback::InboundCallback;
use crate::domain::request::{format_amount, parse_amount, PaymentRequest};
use crate::domain::response::{
    CanonicalPaymentResponse, PaymentInitiationResult, PaymentStatus, StatusTable,
};
use crate::error::GatewayError;
use crate::gateways::{
    callback_failure, fail_initiation, json_headers, log_verified, text_at, Capabilities,
    GatewayHeaders, PaymentGateway,
};
use crate::registry::AdapterContext;
use crate::transport::executor::{Encoding, RequestExecutor};
use crate::transport::HttpTransport;
use crate::verification::cipher::PayloadCipher;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;

pub const NAME: &str = "alrajhibank";

/// The `result` field of the decrypted response.
pub const STATUS_TABLE: StatusTable = StatusTable::new(&[
    ("CAPTURED", PaymentStatus::Success),
    ("APPROVED", PaymentStatus::Pending),
    ("NOT CAPTURED", PaymentStatus::Rejected),
    ("NOT APPROVED", PaymentStatus::Rejected),
    ("DENIED BY RISK", PaymentStatus::Rejected),
    ("HOST TIMEOUT", PaymentStatus::Failed),
    ("CANCELED", PaymentStatus::Canceled),
]);

/// ISO 4217 numeric code for SAR, the only currency the hosted page takes.
const CURRENCY_CODE: &str = "682";
const CURRENCY: &str = "SAR";
const APPROVED_RESPONSE_CODE: &str = "00";

#[derive(Clone)]
pub struct AlRajhiConfig {
    pub base_url: String,
    pub transportal_id: String,
    pub password: String,
    pub cipher: PayloadCipher,
}

impl AlRajhiConfig {
    pub fn from_settings(name: &str, settings: &GatewaySettings) -> Result<Self, ConfigError> {
        let key = settings.require(name, "encryption_key")?;
        let iv = settings.require(name, "iv")?;
        let cipher = PayloadCipher::new(key.as_bytes(), iv.as_bytes()).map_err(|e| {
            ConfigError::InvalidValue {
                gateway: name.to_string(),
                key: "encryption_key".to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            base_url: settings.base_url(name)?,
            transportal_id: settings.require(name, "transportal_id")?,
            password: settings.require(name, "password")?,
            cipher,
        })
    }
}

pub struct AlRajhiGateway {
    pub config: AlRajhiConfig,
    pub urls: SystemUrls,
    executor: RequestExecutor,
}

pub fn build(ctx: &AdapterContext<'_>) -> Result<Arc<dyn PaymentGateway>, ConfigError> {
    let config = AlRajhiConfig::from_settings(ctx.name, ctx.settings)?;
    Ok(Arc::new(AlRajhiGateway::new(config, ctx.urls.clone(), ctx.transport.clone())))
}

/// Splits `"<paymentId>:<url>"` on the first colon only, since the url has
/// its own.
pub fn split_result(result: &str) -> Option<(&str, &str)> {
    let (payment_id, url) = result.split_once(':')?;
    if payment_id.is_empty() || url.is_empty() {
        return None;
    }
    Some((payment_id, url))
}

impl AlRajhiGateway {
    pub fn new(config: AlRajhiConfig, urls: SystemUrls, transport: Arc<dyn HttpTransport>) -> Self {
        let executor = RequestExecutor::new(NAME, config.base_url.clone(), json_headers(), transport);
        Self {
            config,
            urls,
            executor,
        }
    }

    /// Hex AES-256-CBC of the JSON-encoded one-element array the bank expects.
    pub fn encrypt_trandata(&self, plain: &Value) -> String {
        let serialized = Value::Array(vec![plain.clone()]).to_string();
        self.config.cipher.encrypt_hex(&serialized)
    }

    fn plain_data(&self, request: &PaymentRequest) -> Result<Value, GatewayError> {
        let amount = request.require_amount()?;
        Ok(json!({
            "id": self.config.transportal_id,
            "password": self.config.password,
            "action": "1",
            "currencyCode": CURRENCY_CODE,
            "errorURL": self.urls.failed_url,
            "responseURL": self.urls.callback_url,
            "trackId": request.merchant_reference(""),
            "amt": format_amount(amount),
        }))
    }

    async fn try_initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiationResult, GatewayError> {
        let plain = self.plain_data(request)?;
        let payload = json!([{
            "id": self.config.transportal_id,
            "trandata": self.encrypt_trandata(&plain),
            "errorURL": self.urls.failed_url,
            "responseURL": self.urls.callback_url,
        }]);
        let envelope = self
            .executor
            .execute(Method::POST, "/pg/payment/hosted.htm", Some(&payload), Encoding::Json)
            .await;
        let raw = envelope.to_value();
        let body = envelope.into_result()?;

        let track_id = text_at(&plain, "/trackId").unwrap_or_default();
        let result = text_at(&body, "/0/result");
        Ok(match result.as_deref().and_then(split_result) {
            Some((payment_id, url)) => PaymentInitiationResult::redirect(
                format!("{url}?PaymentID={payment_id}"),
                Some(payment_id.to_string()),
            )
            .with_track_id(track_id),
            None => PaymentInitiationResult::failed(
                text_at(&body, "/0/errorText")
                    .unwrap_or_else(|| "hosted page result is missing".to_string()),
                Some(raw),
            ),
        })
    }

    /// Decrypts `trandata`. Only the shared key can produce a payload that
    /// survives padding and JSON checks, so a failure is an authentication
    /// failure.
    fn open_trandata(&self, trandata: &str) -> Result<Value, GatewayError> {
        let plain = self
            .config
            .cipher
            .decrypt_hex(trandata)
            .map_err(|_| GatewayError::signature(NAME))?;
        let decoded = urlencoding::decode(&plain.replace('+', " "))
            .map(|s| s.into_owned())
            .map_err(|_| GatewayError::signature(NAME))?;
        let parsed: Value = serde_json::from_str(&decoded).map_err(|_| GatewayError::signature(NAME))?;
        match parsed {
            Value::Array(mut entries) if !entries.is_empty() && entries[0].is_object() => {
                Ok(entries.swap_remove(0))
            }
            other => Err(GatewayError::shape("trandata is not a one-element array", &other)),
        }
    }

    fn try_verify(&self, callback: &InboundCallback) -> Result<CanonicalPaymentResponse, GatewayError> {
        let trandata = callback
            .text("trandata")
            .ok_or_else(|| GatewayError::InvalidRequest("trandata is required".to_string()))?;
        let data = self.open_trandata(&trandata)?;

        let result = text_at(&data, "/result").unwrap_or_default();
        let auth_code = text_at(&data, "/authRespCode").unwrap_or_default();
        let status = match STATUS_TABLE.map(&result) {
            PaymentStatus::Success if auth_code != APPROVED_RESPONSE_CODE => PaymentStatus::Rejected,
            other => other,
        };

        Ok(CanonicalPaymentResponse::verified(NAME, status)
            .with_provider_status(result)
            .with_unique_id(text_at(&data, "/transId").or_else(|| text_at(&data, "/paymentId")))
            .with_amount(data.get("amt").and_then(parse_amount))
            .with_currency(Some(CURRENCY.to_string()))
            .with_raw(data))
    }
}

#[async_trait::async_trait]
impl PaymentGateway for AlRajhiGateway {
    fn name(&self) -> &'static str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::BASE
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
        match self.try_verify(callback) {
            Ok(response) => {
                log_verified(&response);
                response
            }
            Err(e) => callback_failure(NAME, e, callback.payload()),
        }
    }
}
