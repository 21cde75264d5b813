use crate::domain::callback::InboundCallback;
use crate::domain::request::{parse_amount, PaymentRequest};
use crate::domain::response::{
    CanonicalPaymentResponse, OperationOutcome, PaymentInitiationResult,
};
use crate::error::GatewayError;
use crate::transport::executor::CallGatewayEnvelope;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub mod alrajhibank;
pub mod clickpay;
pub mod fawry;
pub mod geidea;
pub mod hyperpay;
pub mod moyasar;
pub mod myfatoorah;
pub mod paymob;
pub mod paypal;
pub mod stripe;
pub mod tabby;
pub mod tamara;
pub mod tap;
pub mod telr;
pub mod urway;

pub type GatewayHeaders = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Initiate,
    VerifyCallback,
    AuthHeaders,
    Capture,
    Void,
    Refund,
    QueryStatus,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Initiate => "initiate",
            Operation::VerifyCallback => "verify_callback",
            Operation::AuthHeaders => "auth_headers",
            Operation::Capture => "capture",
            Operation::Void => "void",
            Operation::Refund => "refund",
            Operation::QueryStatus => "query_status",
        }
    }
}

/// What an adapter declares it can do. The registry checks the declaration
/// against the adapter before handing it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub initiate: bool,
    pub verify_callback: bool,
    pub auth_headers: bool,
    pub capture: bool,
    pub void: bool,
    pub refund: bool,
    pub query_status: bool,
}

impl Capabilities {
    pub const BASE: Capabilities = Capabilities {
        initiate: true,
        verify_callback: true,
        auth_headers: true,
        capture: false,
        void: false,
        refund: false,
        query_status: false,
    };

    pub const QUERY: Capabilities = Capabilities {
        query_status: true,
        ..Capabilities::BASE
    };

    pub const FULL: Capabilities = Capabilities {
        capture: true,
        void: true,
        refund: true,
        query_status: true,
        ..Capabilities::BASE
    };

    pub fn supports(&self, op: Operation) -> bool {
        match op {
            Operation::Initiate => self.initiate,
            Operation::VerifyCallback => self.verify_callback,
            Operation::AuthHeaders => self.auth_headers,
            Operation::Capture => self.capture,
            Operation::Void => self.void,
            Operation::Refund => self.refund,
            Operation::QueryStatus => self.query_status,
        }
    }

    pub fn has_optional(&self) -> bool {
        self.capture || self.void || self.refund || self.query_status
    }
}

#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    /// Static headers for every call to the provider. Never performs I/O.
    fn build_auth_headers(&self) -> GatewayHeaders;

    async fn initiate(&self, request: &PaymentRequest) -> PaymentInitiationResult;

    async fn verify_callback(&self, callback: &InboundCallback) -> CanonicalPaymentResponse;

    fn operations(&self) -> Option<&dyn PaymentOperations> {
        None
    }
}

/// Post-initiation calls. Adapters override only what their provider offers.
#[async_trait::async_trait]
pub trait PaymentOperations: Send + Sync {
    fn gateway_name(&self) -> &'static str;

    async fn capture(&self, _id: &str, _amount: Decimal) -> Result<OperationOutcome, GatewayError> {
        Err(GatewayError::unsupported(self.gateway_name(), "capture"))
    }

    async fn void(&self, _id: &str) -> Result<OperationOutcome, GatewayError> {
        Err(GatewayError::unsupported(self.gateway_name(), "void"))
    }

    async fn refund(&self, _id: &str, _amount: Decimal) -> Result<OperationOutcome, GatewayError> {
        Err(GatewayError::unsupported(self.gateway_name(), "refund"))
    }

    async fn query_status(&self, _id: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        Err(GatewayError::unsupported(self.gateway_name(), "query_status"))
    }
}

impl dyn PaymentGateway {
    fn operations_for(&self, op: Operation) -> Result<&dyn PaymentOperations, GatewayError> {
        match self.operations() {
            Some(ops) if self.capabilities().supports(op) => Ok(ops),
            _ => Err(GatewayError::unsupported(self.name(), op.as_str())),
        }
    }

    pub async fn capture(&self, id: &str, amount: Decimal) -> Result<OperationOutcome, GatewayError> {
        validate_reference(id)?;
        validate_amount(amount)?;
        self.operations_for(Operation::Capture)?.capture(id, amount).await
    }

    pub async fn void(&self, id: &str) -> Result<OperationOutcome, GatewayError> {
        validate_reference(id)?;
        self.operations_for(Operation::Void)?.void(id).await
    }

    pub async fn refund(&self, id: &str, amount: Decimal) -> Result<OperationOutcome, GatewayError> {
        validate_reference(id)?;
        validate_amount(amount)?;
        self.operations_for(Operation::Refund)?.refund(id, amount).await
    }

    pub async fn query_status(&self, id: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        validate_reference(id)?;
        self.operations_for(Operation::QueryStatus)?.query_status(id).await
    }
}

fn validate_reference(id: &str) -> Result<(), GatewayError> {
    if id.trim().is_empty() {
        return Err(GatewayError::InvalidRequest(
            "payment reference is required".to_string(),
        ));
    }
    Ok(())
}

fn validate_amount(amount: Decimal) -> Result<(), GatewayError> {
    if amount <= Decimal::ZERO {
        return Err(GatewayError::InvalidRequest(
            "amount must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

pub fn basic_auth(user: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{user}:{password}")))
}

pub fn json_headers() -> GatewayHeaders {
    let mut headers = GatewayHeaders::new();
    headers.insert("Accept".to_string(), "application/json".to_string());
    headers
}

/// Text at a JSON pointer. Numbers and booleans are rendered; blanks are `None`.
pub fn text_at(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn decimal_at(value: &Value, pointer: &str) -> Option<Decimal> {
    value.pointer(pointer).and_then(parse_amount)
}

pub fn require_text_at(value: &Value, pointer: &str) -> Result<String, GatewayError> {
    text_at(value, pointer)
        .ok_or_else(|| GatewayError::shape(format!("missing `{pointer}` in response"), value))
}

pub(crate) fn fail_initiation(gateway: &str, err: GatewayError) -> PaymentInitiationResult {
    tracing::warn!(gateway, error = %err, "payment initiation failed");
    let raw = err.raw().cloned();
    PaymentInitiationResult::failed(err.to_string(), raw)
}

pub(crate) fn callback_failure(
    gateway: &str,
    err: GatewayError,
    payload: Value,
) -> CanonicalPaymentResponse {
    match err {
        GatewayError::SignatureVerificationFailed { .. } => {
            tracing::warn!(gateway, "callback signature mismatch");
            CanonicalPaymentResponse::signature_failed(gateway, json!({ "request_data": payload }))
        }
        GatewayError::InvalidRequest(msg) => {
            tracing::warn!(gateway, %msg, "callback rejected");
            CanonicalPaymentResponse::invalid_request(
                gateway,
                json!({ "error": msg, "request_data": payload }),
            )
        }
        other => {
            tracing::error!(gateway, error = %other, "callback verification failed");
            let mut raw = json!({ "error": other.to_string(), "request_data": payload });
            if let Some(body) = other.raw() {
                raw["response"] = body.clone();
            }
            CanonicalPaymentResponse::error(gateway, raw)
        }
    }
}

pub(crate) fn log_verified(response: &CanonicalPaymentResponse) {
    tracing::info!(
        gateway = %response.gateway_name,
        status = %response.status,
        unique_id = response.unique_id.as_deref().unwrap_or(""),
        "callback verified"
    );
}

/// Turns an operation call into an outcome. Calls that never reached the
/// provider are errors; provider rejections are unsuccessful outcomes.
pub(crate) fn operation_outcome(
    envelope: CallGatewayEnvelope,
    reference_pointer: &str,
) -> Result<OperationOutcome, GatewayError> {
    if envelope.status_code == 0 {
        return Err(GatewayError::Transport {
            status_code: 0,
            message: envelope
                .error
                .clone()
                .unwrap_or_else(|| "gateway call failed".to_string()),
            raw: Some(envelope.to_value()),
        });
    }
    let body = envelope.body.clone().unwrap_or(Value::Null);
    let message = text_at(&body, "/message")
        .or_else(|| text_at(&body, "/error/message"))
        .or_else(|| text_at(&body, "/error"))
        .or_else(|| envelope.error.clone());
    Ok(OperationOutcome {
        success: envelope.success,
        status_code: envelope.status_code,
        reference: text_at(&body, reference_pointer),
        message,
        raw: body,
    })
}
