mod common;

use payments_bridge::config::{ConfigError, PaymentsConfig};
use payments_bridge::error::{GatewayError, RegistryError};
use payments_bridge::gateways::Operation;
use payments_bridge::registry::GatewayRegistry;
use payments_bridge::transport::ReqwestTransport;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const ALL: [&str; 15] = [
    "urway", "stripe", "myfatoorah", "tabby", "fawry", "geidea", "paymob", "hyperpay",
    "clickpay", "moyasar", "tap", "paypal", "tamara", "telr", "alrajhibank",
];

#[test]
fn every_builtin_gateway_resolves() {
    let registry = common::registry_for("http://127.0.0.1:9");
    for name in ALL {
        let gateway = registry
            .resolve(name)
            .unwrap_or_else(|e| panic!("{name} did not resolve: {e}"));
        assert_eq!(gateway.name(), name);
    }
}

#[test]
fn available_gateways_follow_configuration_order() {
    let registry = common::registry_for("http://127.0.0.1:9");
    let names: Vec<&str> = registry.available_gateways().collect();
    assert_eq!(names, ALL);
}

#[test]
fn unknown_name_is_rejected() {
    let registry = common::registry_for("http://127.0.0.1:9");
    assert!(matches!(
        registry.resolve("square"),
        Err(RegistryError::UnknownGateway(name)) if name == "square"
    ));
}

#[test]
fn missing_credentials_surface_as_config_errors() {
    let config = PaymentsConfig::from_json_str(
        &json!({
            "callback_url": "https://shop.example/cb",
            "success_url": "https://shop.example/ok",
            "failed_url": "https://shop.example/ko",
            "gateways": {"tabby": {"api_key": "k"}}
        })
        .to_string(),
    )
    .expect("config");
    let transport = ReqwestTransport::new(Duration::from_secs(1), None).expect("transport");
    let registry = GatewayRegistry::from_config(config, Arc::new(transport));
    match registry.resolve("tabby") {
        Err(RegistryError::Config(ConfigError::MissingKey { gateway, key })) => {
            assert_eq!(gateway, "tabby");
            assert_eq!(key, "merchant_code");
        }
        other => panic!("unexpected: {:?}", other.map(|g| g.name())),
    }
}

#[test]
fn driver_lets_one_adapter_serve_two_names() {
    let config = PaymentsConfig::from_json_str(
        &json!({
            "callback_url": "https://shop.example/cb",
            "success_url": "https://shop.example/ok",
            "failed_url": "https://shop.example/ko",
            "gateways": {
                "moyasar_ksa": {"driver": "moyasar", "api_key": "sk_1"},
                "moyasar_uae": {"driver": "moyasar", "mode": "live", "live": {"api_key": "sk_2"}}
            }
        })
        .to_string(),
    )
    .expect("config");
    let transport = ReqwestTransport::new(Duration::from_secs(1), None).expect("transport");
    let registry = GatewayRegistry::from_config(config, Arc::new(transport));
    assert_eq!(registry.resolve("moyasar_ksa").expect("ksa").name(), "moyasar");
    assert_eq!(registry.resolve("moyasar_uae").expect("uae").name(), "moyasar");
}

#[test]
fn declared_capabilities_match_the_provider_table() {
    let registry = common::registry_for("http://127.0.0.1:9");
    let full = ["urway", "tabby", "clickpay", "tamara", "telr"];
    let query_only = ["stripe", "myfatoorah", "fawry", "moyasar", "tap", "paypal"];
    let none = ["geidea", "paymob", "alrajhibank"];

    for name in full {
        let caps = registry.resolve(name).expect(name).capabilities();
        for op in [Operation::Capture, Operation::Void, Operation::Refund, Operation::QueryStatus] {
            assert!(caps.supports(op), "{name} should support {}", op.as_str());
        }
    }
    for name in query_only {
        let caps = registry.resolve(name).expect(name).capabilities();
        assert!(caps.supports(Operation::QueryStatus), "{name}");
        assert!(!caps.supports(Operation::Capture), "{name}");
    }
    for name in none {
        let gateway = registry.resolve(name).expect(name);
        assert!(!gateway.capabilities().has_optional(), "{name}");
        assert!(gateway.operations().is_none(), "{name}");
    }

    let hyperpay = registry.resolve("hyperpay").expect("hyperpay").capabilities();
    assert!(hyperpay.supports(Operation::Capture));
    assert!(hyperpay.supports(Operation::Refund));
    assert!(!hyperpay.supports(Operation::Void));
}

#[tokio::test]
async fn optional_ops_on_gateways_without_them_are_unsupported() {
    let registry = common::registry_for("http://127.0.0.1:9");
    for name in ["geidea", "paymob", "alrajhibank"] {
        let gateway = registry.resolve(name).expect(name);
        assert!(matches!(
            gateway.capture("pay_1", dec!(10)).await,
            Err(GatewayError::UnsupportedOperation { operation: "capture", .. })
        ));
        assert!(matches!(
            gateway.void("pay_1").await,
            Err(GatewayError::UnsupportedOperation { operation: "void", .. })
        ));
        assert!(matches!(
            gateway.refund("pay_1", dec!(10)).await,
            Err(GatewayError::UnsupportedOperation { operation: "refund", .. })
        ));
        assert!(matches!(
            gateway.query_status("pay_1").await,
            Err(GatewayError::UnsupportedOperation { operation: "query_status", .. })
        ));
    }

    let hyperpay = registry.resolve("hyperpay").expect("hyperpay");
    assert!(matches!(
        hyperpay.void("pay_1").await,
        Err(GatewayError::UnsupportedOperation { operation: "void", .. })
    ));
}

#[tokio::test]
async fn operation_inputs_are_validated_before_any_call() {
    let registry = common::registry_for("http://127.0.0.1:9");
    let tabby = registry.resolve("tabby").expect("tabby");
    assert!(matches!(
        tabby.capture("  ", dec!(10)).await,
        Err(GatewayError::InvalidRequest(_))
    ));
    assert!(matches!(
        tabby.refund("pay_1", dec!(0)).await,
        Err(GatewayError::InvalidRequest(_))
    ));
    assert!(matches!(
        tabby.capture("pay_1", dec!(-5)).await,
        Err(GatewayError::InvalidRequest(_))
    ));
}

#[test]
fn auth_headers_follow_each_provider_scheme() {
    let registry = common::registry_for("http://127.0.0.1:9");
    let header = |name: &str| {
        registry
            .resolve(name)
            .expect(name)
            .build_auth_headers()
            .get("Authorization")
            .cloned()
    };
    assert_eq!(header("stripe").as_deref(), Some("Bearer sk_test_1"));
    assert_eq!(header("clickpay").as_deref(), Some("SKEY-1"));
    // base64("sk_test_moyasar:")
    assert_eq!(header("moyasar").as_deref(), Some("Basic c2tfdGVzdF9tb3lhc2FyOg=="));
    // base64("client:secret")
    assert_eq!(header("paypal").as_deref(), Some("Basic Y2xpZW50OnNlY3JldA=="));
    for name in ["urway", "fawry", "telr", "alrajhibank", "paymob"] {
        assert_eq!(header(name), None, "{name} sends no static Authorization");
    }
}

#[test]
fn auth_headers_are_stable_across_calls_and_resolutions() {
    let registry = common::registry_for("http://127.0.0.1:9");
    for name in ALL {
        let first = registry.resolve(name).expect(name);
        let second = registry.resolve(name).expect(name);
        let headers = first.build_auth_headers();
        assert_eq!(headers, first.build_auth_headers(), "{name} changed between calls");
        assert_eq!(headers, second.build_auth_headers(), "{name} changed between resolutions");
    }
}
