use crate::config::{ConfigError, GatewaySettings, SystemUrls};
use crate::domain::callback::InboundCallback;
use crate::domain::request::{format_amount, PaymentRequest};
use crate::domain::response::{
    CanonicalPaymentResponse, OperationOutcome, PaymentInitiationResult, PaymentStatus,
    StatusTable,
};
use crate::error::GatewayError;
use crate::gateways::{
    callback_failure, fail_initiation, json_headers, log_verified, operation_outcome,
    require_text_at, text_at, Capabilities, GatewayHeaders, PaymentGateway, PaymentOperations,
};
use crate::registry::AdapterContext;
use crate::transport::executor::{Encoding, RequestExecutor};
use crate::transport::HttpTransport;
use crate::verification::SignatureScheme;
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;

pub const NAME: &str = "urway";

/// The `result` field of `checkPaymentStatus` and of follow-up operations.
pub const STATUS_TABLE: StatusTable = StatusTable::new(&[
    ("Successful", PaymentStatus::Success),
    ("Success", PaymentStatus::Success),
    ("SUCCESS", PaymentStatus::Success),
    ("Failure", PaymentStatus::Failed),
    ("Failed", PaymentStatus::Failed),
    ("FAILURE", PaymentStatus::Failed),
    ("FAILED", PaymentStatus::Failed),
    ("UnSuccessful", PaymentStatus::Failed),
    ("Cancelled", PaymentStatus::Canceled),
    ("Canceled", PaymentStatus::Canceled),
    ("CANCELLED", PaymentStatus::Canceled),
    ("Pending", PaymentStatus::Pending),
    ("PENDING", PaymentStatus::Pending),
]);

const ACTION_PURCHASE: &str = "1";
const ACTION_REFUND: &str = "2";
const ACTION_CAPTURE: &str = "3";
const ACTION_VOID: &str = "4";
const ACTION_STC_PAY: &str = "13";
/// Signed `ResponseCode` of an approved transaction.
const APPROVED_RESPONSE_CODE: &str = "000";

#[derive(Clone)]
pub struct UrwayConfig {
    pub base_url: String,
    pub terminal_id: String,
    pub password: String,
    pub merchant_key: String,
    pub merchant_id: Option<String>,
    pub currency: String,
    pub country: String,
}

impl UrwayConfig {
    pub fn from_settings(name: &str, settings: &GatewaySettings) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: settings.base_url(name)?,
            terminal_id: settings.require(name, "terminal_id")?,
            password: settings.require(name, "password")?,
            merchant_key: settings.require(name, "merchant_key")?,
            merchant_id: settings.get("merchant_id"),
            currency: settings.get_or("currency", "SAR"),
            country: settings.get_or("country", "SA"),
        })
    }
}

pub struct UrwayGateway {
    pub config: UrwayConfig,
    pub urls: SystemUrls,
    executor: RequestExecutor,
}

pub fn build(ctx: &AdapterContext<'_>) -> Result<Arc<dyn PaymentGateway>, ConfigError> {
    let config = UrwayConfig::from_settings(ctx.name, ctx.settings)?;
    Ok(Arc::new(UrwayGateway::new(
        config,
        ctx.urls.clone(),
        ctx.transport.clone(),
    )))
}

impl UrwayGateway {
    pub fn new(config: UrwayConfig, urls: SystemUrls, transport: Arc<dyn HttpTransport>) -> Self {
        let executor = RequestExecutor::new(NAME, config.base_url.clone(), json_headers(), transport);
        Self {
            config,
            urls,
            executor,
        }
    }

    fn hash(&self, fields: &[&str]) -> String {
        SignatureScheme::sha256("|").sign(fields)
    }

    /// `sha256(trackid|terminalId|password|merchantKey|amount|currency)`.
    pub fn request_hash(&self, track_id: &str, amount: &str, currency: &str) -> String {
        self.hash(&[
            track_id,
            &self.config.terminal_id,
            &self.config.password,
            &self.config.merchant_key,
            amount,
            currency,
        ])
    }

    async fn try_initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiationResult, GatewayError> {
        let amount = format_amount(request.require_amount()?);
        let currency = request.currency_or(&self.config.currency).to_string();
        let track_id = request.merchant_reference("urway_");
        let action = match request.payment_method.as_deref() {
            Some("stcpay") | Some("stc_pay") | Some(ACTION_STC_PAY) => ACTION_STC_PAY,
            _ => ACTION_PURCHASE,
        };

        let payload = json!({
            "trackid": track_id,
            "terminalId": self.config.terminal_id,
            "customerEmail": request.customer_email.clone().unwrap_or_default(),
            "action": action,
            "merchantIp": request.client_ip.clone().unwrap_or_default(),
            "password": self.config.password,
            "currency": currency,
            "country": request.country_code.clone().unwrap_or_else(|| self.config.country.clone()),
            "amount": amount,
            "udf1": request.extra.get("udf1").cloned().unwrap_or(json!("")),
            "udf2": self.urls.callback_url,
            "udf3": request.lang_or("en"),
            "requestHash": self.request_hash(&track_id, &amount, &currency),
        });

        let envelope = self
            .executor
            .execute(Method::POST, "paymentRequest", Some(&payload), Encoding::Json)
            .await;
        let raw = envelope.to_value();
        let body = envelope.into_result()?;

        match (text_at(&body, "/payid"), text_at(&body, "/targetUrl")) {
            (Some(payid), Some(target)) => {
                tracing::info!(gateway = NAME, track_id = %track_id, "payment session created");
                Ok(PaymentInitiationResult::redirect(
                    format!("{target}?paymentid={payid}"),
                    Some(payid),
                )
                .with_track_id(track_id))
            }
            _ => {
                let message = text_at(&body, "/responseMessage")
                    .or_else(|| text_at(&body, "/responseCode").map(|c| format!("response code {c}")))
                    .unwrap_or_else(|| "payment session was not created".to_string());
                Ok(PaymentInitiationResult::failed(message, Some(raw)).with_track_id(track_id))
            }
        }
    }

    async fn check_payment_status(&self, payment_id: &str) -> Result<Value, GatewayError> {
        let payload = json!({
            "merchantId": self.config.merchant_id.clone().unwrap_or_default(),
            "terminalId": self.config.terminal_id,
            "password": self.config.password,
            "paymentId": payment_id,
        });
        self.executor
            .execute(Method::POST, "checkPaymentStatus", Some(&payload), Encoding::Json)
            .await
            .into_result()
    }

    fn response_from_query(&self, payment_id: &str, body: Value) -> Result<CanonicalPaymentResponse, GatewayError> {
        let result = require_text_at(&body, "/result")?;
        Ok(CanonicalPaymentResponse::verified(NAME, STATUS_TABLE.map(&result))
            .with_provider_status(result)
            .with_unique_id(Some(payment_id.to_string()))
            .with_amount(text_at(&body, "/amount").and_then(|a| a.parse().ok()))
            .with_currency(text_at(&body, "/currency").or_else(|| Some(self.config.currency.clone())))
            .with_raw(body))
    }

    async fn try_verify(&self, callback: &InboundCallback) -> Result<CanonicalPaymentResponse, GatewayError> {
        let payment_id = callback.first_text(&["PaymentId", "paymentId", "paymentid"]);

        let Some(provided) = callback.text("responseHash") else {
            // Without a hash only the authenticated status query can decide.
            let payment_id = payment_id.ok_or_else(|| {
                GatewayError::InvalidRequest(
                    "callback carries neither a response hash nor a payment id".to_string(),
                )
            })?;
            let body = self.check_payment_status(&payment_id).await?;
            return self.response_from_query(&payment_id, body);
        };

        let (Some(tran_id), Some(code), Some(amount)) = (
            callback.text("TranId"),
            callback.text("ResponseCode"),
            callback.text("amount"),
        ) else {
            return Err(GatewayError::signature(NAME));
        };

        let signed = [
            tran_id.as_str(),
            self.config.merchant_key.as_str(),
            code.as_str(),
            amount.as_str(),
        ];
        if !SignatureScheme::sha256("|").verify(&signed, &provided) {
            return Err(GatewayError::signature(NAME));
        }

        // `Result` is not covered by the hash, so the status always comes
        // from the query, bound to the signed transaction.
        let payment_id = payment_id.ok_or_else(|| {
            GatewayError::InvalidRequest("PaymentId is required to confirm the callback".to_string())
        })?;
        let body = self.check_payment_status(&payment_id).await?;
        if let Some(queried) = text_at(&body, "/tranid").or_else(|| text_at(&body, "/TranId")) {
            if queried != tran_id {
                tracing::warn!(gateway = NAME, %payment_id, "status query belongs to another transaction");
                return Err(GatewayError::signature(NAME));
            }
        }
        let mut response = self.response_from_query(&payment_id, body)?;
        if response.status == PaymentStatus::Success && code != APPROVED_RESPONSE_CODE {
            response.status = PaymentStatus::Rejected;
            response.success = false;
        }
        response.unique_id = Some(tran_id);
        response.raw = json!({ "callback": callback.payload(), "verification_result": response.raw });
        Ok(response)
    }

    fn operation_payload(&self, payment_id: &str, action: &str, amount: Option<Decimal>) -> Value {
        let mut payload = json!({
            "merchantId": self.config.merchant_id.clone().unwrap_or_default(),
            "terminalId": self.config.terminal_id,
            "password": self.config.password,
            "paymentId": payment_id,
            "action": action,
        });
        match amount {
            Some(amount) => {
                let amount = format_amount(amount);
                payload["requestHash"] = json!(self.hash(&[
                    payment_id,
                    &self.config.terminal_id,
                    &self.config.password,
                    &self.config.merchant_key,
                    &amount,
                    &self.config.currency,
                ]));
                payload["amount"] = json!(amount);
                payload["currency"] = json!(self.config.currency);
            }
            None => {
                payload["requestHash"] = json!(self.hash(&[
                    payment_id,
                    &self.config.terminal_id,
                    &self.config.password,
                    &self.config.merchant_key,
                ]));
            }
        }
        payload
    }

    async fn post_operation(&self, path: &str, payload: Value) -> Result<OperationOutcome, GatewayError> {
        let envelope = self
            .executor
            .execute(Method::POST, path, Some(&payload), Encoding::Json)
            .await;
        let mut outcome = operation_outcome(envelope, "/tranid")?;
        // Urway answers 200 with a result field even for declines.
        if let Some(result) = text_at(&outcome.raw, "/result") {
            outcome.success = outcome.success && STATUS_TABLE.map(&result) == PaymentStatus::Success;
        }
        Ok(outcome)
    }
}

#[async_trait::async_trait]
impl PaymentGateway for UrwayGateway {
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
impl PaymentOperations for UrwayGateway {
    fn gateway_name(&self) -> &'static str {
        NAME
    }

    async fn capture(&self, id: &str, amount: Decimal) -> Result<OperationOutcome, GatewayError> {
        let payload = self.operation_payload(id, ACTION_CAPTURE, Some(amount));
        self.post_operation("captureRequest", payload).await
    }

    async fn void(&self, id: &str) -> Result<OperationOutcome, GatewayError> {
        let payload = self.operation_payload(id, ACTION_VOID, None);
        self.post_operation("voidRequest", payload).await
    }

    async fn refund(&self, id: &str, amount: Decimal) -> Result<OperationOutcome, GatewayError> {
        let payload = self.operation_payload(id, ACTION_REFUND, Some(amount));
        self.post_operation("refundRequest", payload).await
    }

    async fn query_status(&self, id: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        let body = self.check_payment_status(id).await?;
        self.response_from_query(id, body)
    }
}
