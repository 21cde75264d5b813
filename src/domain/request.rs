use crate::error::GatewayError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub line1: Option<String>,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub discount: Option<Decimal>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

fn default_quantity() -> u32 {
    1
}

impl LineItem {
    /// `unit_price * quantity - discount`, never below zero.
    pub fn total(&self) -> Result<Decimal, GatewayError> {
        self.unit_price
            .checked_mul(Decimal::from(self.quantity))
            .and_then(|gross| gross.checked_sub(self.discount.unwrap_or_default()))
            .map(|net| net.max(Decimal::ZERO))
            .ok_or_else(|| GatewayError::InvalidRequest(format!("total of item `{}` is out of range", self.name)))
    }
}

/// What the caller wants to charge. Only `amount` and `currency` are common to
/// most providers; everything else is read by the adapters that need it.
/// Unknown keys land in `extra` and are forwarded verbatim by adapters that
/// pass whole payloads through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub client_ip: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub billing: Option<Address>,
    #[serde(default)]
    pub shipping: Option<Address>,
    #[serde(default)]
    pub items: Vec<LineItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PaymentRequest {
    pub fn require_amount(&self) -> Result<Decimal, GatewayError> {
        match self.amount {
            Some(a) if a > Decimal::ZERO => Ok(a),
            Some(_) => Err(GatewayError::InvalidRequest(
                "amount must be greater than zero".to_string(),
            )),
            None => Err(GatewayError::InvalidRequest("amount is required".to_string())),
        }
    }

    pub fn require_text<'a>(
        &self,
        field: &'static str,
        value: &'a Option<String>,
    ) -> Result<&'a str, GatewayError> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GatewayError::InvalidRequest(format!("{field} is required")))
    }

    pub fn require_currency(&self) -> Result<&str, GatewayError> {
        self.require_text("currency", &self.currency)
    }

    pub fn currency_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.currency.as_deref().unwrap_or(default)
    }

    /// The caller's `order_id`, or a fresh `prefix`-tagged reference.
    pub fn merchant_reference(&self, prefix: &str) -> String {
        match self.order_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("{prefix}{}", Uuid::new_v4().simple()),
        }
    }

    pub fn lang_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.lang.as_deref().unwrap_or(default)
    }

    /// `(first, last)` from `customer_name`. A single word is used for both.
    pub fn split_customer_name(&self) -> (String, String) {
        let name = self.customer_name.as_deref().unwrap_or_default().trim();
        match name.split_once(char::is_whitespace) {
            Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
            None => (name.to_string(), name.to_string()),
        }
    }

    pub fn extra_value(&self) -> Value {
        Value::Object(self.extra.clone())
    }
}

pub fn minor_unit_exponent(currency: &str) -> u32 {
    match currency.to_ascii_uppercase().as_str() {
        "BIF" | "CLP" | "DJF" | "GNF" | "JPY" | "KMF" | "KRW" | "MGA" | "PYG" | "RWF"
        | "UGX" | "VND" | "VUV" | "XAF" | "XOF" | "XPF" => 0,
        "BHD" | "IQD" | "JOD" | "KWD" | "LYD" | "OMR" | "TND" => 3,
        _ => 2,
    }
}

pub fn to_minor_units(amount: Decimal, currency: &str) -> Result<i64, GatewayError> {
    let factor = Decimal::from(10_i64.pow(minor_unit_exponent(currency)));
    let out_of_range = || GatewayError::InvalidRequest(format!("amount {amount} is out of range"));
    let scaled = amount
        .checked_mul(factor)
        .ok_or_else(out_of_range)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    i64::try_from(scaled).map_err(|_| out_of_range())
}

pub fn from_minor_units(minor: i64, currency: &str) -> Decimal {
    Decimal::new(minor, minor_unit_exponent(currency))
}

/// Two-decimal rendering used by every signed or form-posted amount.
pub fn format_amount(amount: Decimal) -> String {
    let mut v = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    v.rescale(2);
    v.to_string()
}

/// The amount as a JSON number for providers that reject quoted amounts.
pub fn amount_number(amount: Decimal) -> Value {
    serde_json::from_str::<Value>(&format_amount(amount)).unwrap_or(Value::Null)
}

/// Parses amounts the way providers echo them: numbers or numeric strings.
pub fn parse_amount(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => s.trim().parse::<Decimal>().ok(),
        Value::Number(n) => n.to_string().parse::<Decimal>().ok(),
        _ => None,
    }
}
