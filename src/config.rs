use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub config_path: String,
    pub gateway_timeout_ms: u64,
    pub user_agent: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            config_path: std::env::var("PAYMENTS_CONFIG")
                .unwrap_or_else(|_| "payments.json".to_string()),
            gateway_timeout_ms: std::env::var("GATEWAY_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(2500),
            user_agent: std::env::var("PAYMENTS_USER_AGENT").ok(),
        }
    }

    pub fn gateway_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.gateway_timeout_ms)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("gateway `{gateway}` is missing configuration key `{key}`")]
    MissingKey { gateway: String, key: String },
    #[error("gateway `{gateway}` has an invalid `{key}`: {reason}")]
    InvalidValue {
        gateway: String,
        key: String,
        reason: String,
    },
    #[error("failed to read payments config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse payments config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Test,
    Live,
}

/// URLs owned by the merchant application. Adapters attach these to outbound
/// payloads; the payer never supplies them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemUrls {
    pub callback_url: String,
    pub success_url: String,
    pub failed_url: String,
    #[serde(default)]
    pub cancel_url: Option<String>,
}

impl SystemUrls {
    pub fn cancel_or_failed(&self) -> &str {
        self.cancel_url.as_deref().unwrap_or(&self.failed_url)
    }
}

/// Settings for one configured gateway.
///
/// Keys are looked up in the section matching `mode` first and then in the
/// shared top-level keys, so `{"mode": "live", "live": {"api_key": ".."},
/// "merchant_id": ".."}` resolves both `api_key` and `merchant_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewaySettings {
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub test: BTreeMap<String, Value>,
    #[serde(default)]
    pub live: BTreeMap<String, Value>,
    #[serde(flatten)]
    pub shared: BTreeMap<String, Value>,
}

impl GatewaySettings {
    pub fn value(&self, key: &str) -> Option<&Value> {
        let scoped = match self.mode {
            Mode::Test => &self.test,
            Mode::Live => &self.live,
        };
        scoped
            .get(key)
            .filter(|v| !is_blank(v))
            .or_else(|| self.shared.get(key).filter(|v| !is_blank(v)))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.value(key).and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    pub fn require(&self, gateway: &str, key: &str) -> Result<String, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::MissingKey {
            gateway: gateway.to_string(),
            key: key.to_string(),
        })
    }

    pub fn base_url(&self, gateway: &str) -> Result<String, ConfigError> {
        self.require(gateway, "base_url")
    }

    pub fn driver_or<'a>(&'a self, name: &'a str) -> &'a str {
        self.driver.as_deref().unwrap_or(name)
    }
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentsConfig {
    pub callback_url: String,
    pub success_url: String,
    pub failed_url: String,
    #[serde(default)]
    pub cancel_url: Option<String>,
    #[serde(default)]
    pub gateways: IndexMap<String, GatewaySettings>,
}

impl PaymentsConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn system_urls(&self) -> SystemUrls {
        SystemUrls {
            callback_url: self.callback_url.clone(),
            success_url: self.success_url.clone(),
            failed_url: self.failed_url.clone(),
            cancel_url: self.cancel_url.clone(),
        }
    }
}
