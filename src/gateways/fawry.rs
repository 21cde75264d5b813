use crate::config::{ConfigError, GatewaySettings, SystemUrls};
use crate::domain::callback::InboundCallback;
use crate::domain::request::{format_amount, PaymentRequest};
use crate::domain::response::{
    CanonicalPaymentResponse, PaymentInitiationResult, PaymentStatus, StatusTable,
};
use crate::error::GatewayError;
use crate::gateways::{
    callback_failure, decimal_at, fail_initiation, json_headers, log_verified, require_text_at,
    text_at, Capabilities, GatewayHeaders, PaymentGateway, PaymentOperations,
};
use crate::registry::AdapterContext;
use crate::transport::executor::{Encoding, RequestExecutor};
use crate::transport::HttpTransport;
use crate::verification::{constant_time_eq_hex, SignatureScheme};
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

pub const NAME: &str = "fawry";

pub const STATUS_TABLE: StatusTable = StatusTable::new(&[
    ("PAID", PaymentStatus::Success),
    ("UNPAID", PaymentStatus::Pending),
    ("NEW", PaymentStatus::Pending),
    ("EXPIRED", PaymentStatus::Expired),
    ("REFUNDED", PaymentStatus::Refunded),
    ("PARTIAL_REFUNDED", PaymentStatus::Refunded),
    ("CANCELED", PaymentStatus::Canceled),
    ("CANCELLED", PaymentStatus::Canceled),
    ("FAILED", PaymentStatus::Failed),
]);

const PAYMENT_METHOD: &str = "PAYATFAWRY";
const CHARGE_PATH: &str = "/ECommerceWeb/Fawry/payments/charge";
const STATUS_PATH: &str = "/ECommerceWeb/Fawry/payments/status";

#[derive(Clone)]
pub struct FawryConfig {
    pub base_url: String,
    pub merchant_code: String,
    pub security_key: String,
    pub currency: String,
    pub payment_expiry_minutes: u32,
}

impl FawryConfig {
    pub fn from_settings(name: &str, settings: &GatewaySettings) -> Result<Self, ConfigError> {
        let payment_expiry_minutes = match settings.get("payment_expiry") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                gateway: name.to_string(),
                key: "payment_expiry".to_string(),
                reason: format!("`{raw}` is not a number of minutes"),
            })?,
            None => 1440,
        };
        Ok(Self {
            base_url: settings.base_url(name)?,
            merchant_code: settings.require(name, "merchant_code")?,
            security_key: settings.require(name, "security_key")?,
            currency: settings.get_or("currency", "EGP"),
            payment_expiry_minutes,
        })
    }
}

pub struct FawryGateway {
    pub config: FawryConfig,
    pub urls: SystemUrls,
    executor: RequestExecutor,
}

pub fn build(ctx: &AdapterContext<'_>) -> Result<Arc<dyn PaymentGateway>, ConfigError> {
    let config = FawryConfig::from_settings(ctx.name, ctx.settings)?;
    Ok(Arc::new(FawryGateway::new(config, ctx.urls.clone(), ctx.transport.clone())))
}

impl FawryGateway {
    pub fn new(config: FawryConfig, urls: SystemUrls, transport: Arc<dyn HttpTransport>) -> Self {
        let executor = RequestExecutor::new(NAME, config.base_url.clone(), json_headers(), transport);
        Self {
            config,
            urls,
            executor,
        }
    }

    /// `merchantCode + merchantRefNum + customerProfileId + PAYATFAWRY + amount + securityKey`.
    pub fn charge_signature(&self, merchant_ref: &str, profile_id: &str, amount: &str) -> String {
        SignatureScheme::sha256("").sign(&[
            self.config.merchant_code.as_str(),
            merchant_ref,
            profile_id,
            PAYMENT_METHOD,
            amount,
            self.config.security_key.as_str(),
        ])
    }

    /// `merchantRefNumber + fawryRefNumber + paymentAmount + paymentStatus + securityKey`.
    pub fn notification_signature(
        &self,
        merchant_ref: &str,
        fawry_ref: &str,
        amount: &str,
        status: &str,
    ) -> String {
        SignatureScheme::sha256("").sign(&[
            merchant_ref,
            fawry_ref,
            amount,
            status,
            self.config.security_key.as_str(),
        ])
    }

    async fn try_initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiationResult, GatewayError> {
        let amount = format_amount(request.require_amount()?);
        let merchant_ref = request.merchant_reference("fawry_");
        let profile_id = request
            .extra
            .get("customer_profile_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("customer_{}", Uuid::new_v4().simple()));
        let description = request
            .description
            .clone()
            .unwrap_or_else(|| "Payment for services".to_string());

        let payload = json!({
            "merchantCode": self.config.merchant_code,
            "merchantRefNum": merchant_ref,
            "customerProfileId": profile_id,
            "customerName": request.customer_name.clone().unwrap_or_else(|| "Customer".to_string()),
            "customerMobile": request.customer_phone.clone().unwrap_or_default(),
            "customerEmail": request.customer_email.clone().unwrap_or_default(),
            "amount": amount,
            "currencyCode": request.currency_or(&self.config.currency),
            "language": request.lang_or("en-gb"),
            "chargeItems": [{
                "itemId": "item1",
                "description": description,
                "price": amount,
                "quantity": 1,
            }],
            "paymentMethod": PAYMENT_METHOD,
            "paymentExpiry": self.config.payment_expiry_minutes,
            "description": description,
            "signature": self.charge_signature(&merchant_ref, &profile_id, &amount),
        });

        let envelope = self
            .executor
            .execute(Method::POST, CHARGE_PATH, Some(&payload), Encoding::Json)
            .await;
        let raw = envelope.to_value();
        let body = envelope.into_result()?;

        Ok(match text_at(&body, "/referenceNumber") {
            Some(reference) => PaymentInitiationResult::redirect(
                format!(
                    "{}{STATUS_PATH}?referenceNumber={}",
                    self.config.base_url,
                    urlencoding::encode(&reference)
                ),
                Some(reference),
            )
            .with_track_id(merchant_ref),
            None => PaymentInitiationResult::failed(
                text_at(&body, "/statusDescription")
                    .unwrap_or_else(|| "charge has no reference number".to_string()),
                Some(raw),
            )
            .with_track_id(merchant_ref),
        })
    }

    async fn payment_status(&self, merchant_ref: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        let signature = SignatureScheme::sha256("").sign(&[
            self.config.merchant_code.as_str(),
            merchant_ref,
            self.config.security_key.as_str(),
        ]);
        let path = format!(
            "{STATUS_PATH}?merchantCode={}&merchantRefNumber={}&signature={signature}",
            urlencoding::encode(&self.config.merchant_code),
            urlencoding::encode(merchant_ref),
        );
        let body = self
            .executor
            .execute(Method::GET, &path, None, Encoding::Json)
            .await
            .into_result()?;

        let status = require_text_at(&body, "/paymentStatus")?;
        Ok(CanonicalPaymentResponse::verified(NAME, STATUS_TABLE.map(&status))
            .with_provider_status(status)
            .with_unique_id(text_at(&body, "/fawryRefNumber").or_else(|| Some(merchant_ref.to_string())))
            .with_amount(decimal_at(&body, "/paymentAmount"))
            .with_currency(Some(self.config.currency.clone()))
            .with_raw(body))
    }

    async fn try_verify(&self, callback: &InboundCallback) -> Result<CanonicalPaymentResponse, GatewayError> {
        let merchant_ref = callback
            .text("merchantRefNumber")
            .ok_or_else(|| GatewayError::InvalidRequest("merchantRefNumber is required".to_string()))?;
        let Some(provided) = callback.text("signature") else {
            return Err(GatewayError::signature(NAME));
        };

        let fawry_ref = callback.text("fawryRefNumber").unwrap_or_default();
        let raw_amount = callback.text("paymentAmount").unwrap_or_default();
        let amount = raw_amount
            .trim()
            .parse::<Decimal>()
            .map(format_amount)
            .unwrap_or(raw_amount);
        let status = callback.text("paymentStatus").unwrap_or_default();

        let expected = self.notification_signature(&merchant_ref, &fawry_ref, &amount, &status);
        if !constant_time_eq_hex(&expected, provided.trim()) {
            return Err(GatewayError::signature(NAME));
        }

        let mut response = self.payment_status(&merchant_ref).await?;
        response.raw = json!({ "callback": callback.payload(), "verification_result": response.raw });
        Ok(response)
    }
}

#[async_trait::async_trait]
impl PaymentGateway for FawryGateway {
    fn name(&self) -> &'static str {
        NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::QUERY
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
impl PaymentOperations for FawryGateway {
    fn gateway_name(&self) -> &'static str {
        NAME
    }

    async fn query_status(&self, id: &str) -> Result<CanonicalPaymentResponse, GatewayError> {
        self.payment_status(id).await
    }
}
