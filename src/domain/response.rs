use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Success,
    Pending,
    Failed,
    Canceled,
    Closed,
    Expired,
    Rejected,
    Refunded,
    Unknown,
    Error,
    SignatureFailed,
    InvalidRequest,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Success => "success",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Canceled => "canceled",
            PaymentStatus::Closed => "closed",
            PaymentStatus::Expired => "expired",
            PaymentStatus::Rejected => "rejected",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Unknown => "unknown",
            PaymentStatus::Error => "error",
            PaymentStatus::SignatureFailed => "signature_failed",
            PaymentStatus::InvalidRequest => "invalid_request",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed mapping from a provider's status vocabulary to [`PaymentStatus`].
/// Lookups are exact; anything not listed is `Unknown`.
#[derive(Debug, Clone, Copy)]
pub struct StatusTable {
    entries: &'static [(&'static str, PaymentStatus)],
}

impl StatusTable {
    pub const fn new(entries: &'static [(&'static str, PaymentStatus)]) -> Self {
        Self { entries }
    }

    pub fn map(&self, provider_status: &str) -> PaymentStatus {
        self.entries
            .iter()
            .find(|(label, _)| *label == provider_status)
            .map(|(_, status)| *status)
            .unwrap_or(PaymentStatus::Unknown)
    }

    pub fn entries(&self) -> &'static [(&'static str, PaymentStatus)] {
        self.entries
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPaymentResponse {
    pub success: bool,
    pub status: PaymentStatus,
    pub provider_status: Option<String>,
    pub unique_id: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub gateway_name: String,
    pub raw: Value,
}

impl CanonicalPaymentResponse {
    /// Result of an authenticated check. `success` follows the status, so
    /// only a verified `Success` ever reports `success: true`.
    pub fn verified(gateway: &str, status: PaymentStatus) -> Self {
        Self {
            success: status == PaymentStatus::Success,
            status,
            provider_status: None,
            unique_id: None,
            amount: None,
            currency: None,
            gateway_name: gateway.to_string(),
            raw: json!({}),
        }
    }

    fn failure(gateway: &str, status: PaymentStatus, raw: Value) -> Self {
        Self {
            success: false,
            status,
            provider_status: None,
            unique_id: None,
            amount: None,
            currency: None,
            gateway_name: gateway.to_string(),
            raw,
        }
    }

    pub fn error(gateway: &str, raw: Value) -> Self {
        Self::failure(gateway, PaymentStatus::Error, raw)
    }

    pub fn signature_failed(gateway: &str, raw: Value) -> Self {
        Self::failure(gateway, PaymentStatus::SignatureFailed, raw)
    }

    pub fn invalid_request(gateway: &str, raw: Value) -> Self {
        Self::failure(gateway, PaymentStatus::InvalidRequest, raw)
    }

    pub fn with_provider_status(mut self, provider_status: impl Into<String>) -> Self {
        self.provider_status = Some(provider_status.into());
        self
    }

    pub fn with_unique_id(mut self, unique_id: Option<String>) -> Self {
        self.unique_id = unique_id;
        self
    }

    pub fn with_amount(mut self, amount: Option<Decimal>) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_currency(mut self, currency: Option<String>) -> Self {
        self.currency = currency;
        self
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentInitiationResult {
    pub success: bool,
    pub redirect_url: Option<String>,
    pub session_id: Option<String>,
    pub track_id: Option<String>,
    pub error_message: Option<String>,
    pub raw: Option<Value>,
}

impl PaymentInitiationResult {
    pub fn redirect(url: String, session_id: Option<String>) -> Self {
        Self {
            success: true,
            redirect_url: Some(url),
            session_id,
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>, raw: Option<Value>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            raw,
            ..Default::default()
        }
    }

    pub fn with_track_id(mut self, track_id: impl Into<String>) -> Self {
        self.track_id = Some(track_id.into());
        self
    }
}

/// Result of capture, void, refund and status query calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub success: bool,
    pub status_code: u16,
    pub reference: Option<String>,
    pub message: Option<String>,
    pub raw: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: StatusTable = StatusTable::new(&[
        ("PAID", PaymentStatus::Success),
        ("UNPAID", PaymentStatus::Pending),
    ]);

    #[test]
    fn unmapped_labels_are_unknown() {
        assert_eq!(TABLE.map("PAID"), PaymentStatus::Success);
        assert_eq!(TABLE.map("paid"), PaymentStatus::Unknown);
        assert_eq!(TABLE.map("SOMETHING"), PaymentStatus::Unknown);
    }

    #[test]
    fn success_flag_tracks_status() {
        assert!(CanonicalPaymentResponse::verified("x", PaymentStatus::Success).success);
        assert!(!CanonicalPaymentResponse::verified("x", PaymentStatus::Pending).success);
        assert!(!CanonicalPaymentResponse::signature_failed("x", json!({})).success);
    }

    #[test]
    fn status_serializes_as_snake_case_label() {
        let v = serde_json::to_value(PaymentStatus::SignatureFailed).expect("serialize");
        assert_eq!(v, json!("signature_failed"));
        assert_eq!(PaymentStatus::InvalidRequest.to_string(), "invalid_request");
    }
}
