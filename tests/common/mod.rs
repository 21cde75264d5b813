#![allow(dead_code)]

use payments_bridge::config::PaymentsConfig;
use payments_bridge::registry::GatewayRegistry;
use payments_bridge::transport::ReqwestTransport;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const RAJHI_KEY: &str = "12345678901234567890123456789012";
pub const RAJHI_IV: &str = "PGKEYENCDECIVSPC";
pub const TAMARA_NOTIFICATION_KEY: &str = "tamara-notify";
pub const FAWRY_SECURITY_KEY: &str = "fawry-secret";
pub const URWAY_MERCHANT_KEY: &str = "urway-merchant-key";

/// Every built-in gateway, pointed at `base_url` (normally a wiremock server).
pub fn config_for(base_url: &str) -> PaymentsConfig {
    let raw = json!({
        "callback_url": "https://shop.example/payments/callback",
        "success_url": "https://shop.example/payments/success",
        "failed_url": "https://shop.example/payments/failed",
        "gateways": {
            "urway": {
                "mode": "test",
                "test": {"base_url": format!("{base_url}/"), "terminal_id": "term-1", "password": "pw"},
                "merchant_key": URWAY_MERCHANT_KEY,
                "merchant_id": "m-1"
            },
            "stripe": {"base_url": base_url, "api_key": "sk_test_1"},
            "myfatoorah": {"base_url": base_url, "api_key": "mf-key"},
            "tabby": {"base_url": base_url, "api_key": "tabby-key", "merchant_code": "shop"},
            "fawry": {"base_url": base_url, "merchant_code": "fawry-merchant", "security_key": FAWRY_SECURITY_KEY},
            "geidea": {"base_url": base_url, "api_key": "geidea-pk", "password": "geidea-pw"},
            "paymob": {"base_url": base_url, "api_key": "paymob-key", "hmac_secret": "paymob-hmac", "integrations_id": [101]},
            "hyperpay": {"base_url": base_url, "api_key": "hp-token", "entity_id": "entity-1"},
            "clickpay": {"base_url": base_url, "server_key": "SKEY-1", "profile_id": "44"},
            "moyasar": {"base_url": base_url, "api_key": "sk_test_moyasar"},
            "tap": {"base_url": base_url, "api_key": "sk_test_tap"},
            "paypal": {"base_url": base_url, "client_id": "client", "client_secret": "secret"},
            "tamara": {"base_url": base_url, "api_key": "tamara-token", "notification_key": TAMARA_NOTIFICATION_KEY},
            "telr": {"base_url": base_url, "store_id": "store-1", "auth_key": "telr-auth"},
            "alrajhibank": {
                "base_url": base_url,
                "transportal_id": "tp-1",
                "password": "tp-pw",
                "encryption_key": RAJHI_KEY,
                "iv": RAJHI_IV
            }
        }
    });
    serde_json::from_value(raw).expect("fixture config")
}

pub fn registry_for(base_url: &str) -> GatewayRegistry {
    let transport = ReqwestTransport::new(Duration::from_secs(5), None).expect("transport");
    GatewayRegistry::from_config(config_for(base_url), Arc::new(transport))
}
