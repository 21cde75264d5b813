mod common;

use payments_bridge::error::GatewayError;
use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn tabby_capture_posts_formatted_amount() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/payments/pay-77/captures"))
        .and(header("authorization", "Bearer tabby-key"))
        .and(body_partial_json(json!({"amount": "120.50"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "pay-77", "status": "CLOSED"})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = common::registry_for(&server.uri()).resolve("tabby").expect("tabby");
    let outcome = gateway.capture("pay-77", dec!(120.5)).await.expect("capture");
    assert!(outcome.success);
    assert_eq!(outcome.status_code, 200);
    assert_eq!(outcome.reference.as_deref(), Some("pay-77"));
}

#[tokio::test]
async fn tabby_refund_rejection_keeps_provider_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/payments/pay-77/refunds"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"status": "error", "error": "amount exceeds captured"})),
        )
        .mount(&server)
        .await;

    let gateway = common::registry_for(&server.uri()).resolve("tabby").expect("tabby");
    let outcome = gateway.refund("pay-77", dec!(999)).await.expect("refund");
    assert!(!outcome.success);
    assert_eq!(outcome.status_code, 400);
    assert_eq!(outcome.message.as_deref(), Some("amount exceeds captured"));
}

#[tokio::test]
async fn clickpay_refund_needs_approved_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payment/request"))
        .and(header("authorization", "SKEY-1"))
        .and(body_partial_json(json!({"tran_type": "refund", "tran_ref": "TST-1", "cart_amount": 50.0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tran_ref": "TST-2",
            "payment_result": {"response_status": "D", "response_message": "Refund declined"}
        })))
        .mount(&server)
        .await;

    let gateway = common::registry_for(&server.uri()).resolve("clickpay").expect("clickpay");
    let outcome = gateway.refund("TST-1", dec!(50)).await.expect("refund");
    assert!(!outcome.success);
    assert_eq!(outcome.reference.as_deref(), Some("TST-2"));
    assert_eq!(outcome.message.as_deref(), Some("Refund declined"));
}

#[tokio::test]
async fn telr_error_object_in_ok_response_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "cancel", "store": "store-1", "order": {"ref": "ORD-9"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": {"message": "Order already settled", "note": "E04"}
        })))
        .mount(&server)
        .await;

    let gateway = common::registry_for(&server.uri()).resolve("telr").expect("telr");
    let outcome = gateway.void("ORD-9").await.expect("void");
    assert!(!outcome.success);
    assert_eq!(outcome.status_code, 200);
    assert_eq!(outcome.message.as_deref(), Some("Order already settled"));
}

#[tokio::test]
async fn unreachable_provider_is_a_transport_error() {
    let gateway = common::registry_for("http://127.0.0.1:1").resolve("tabby").expect("tabby");
    match gateway.void("pay-1").await {
        Err(GatewayError::Transport { status_code, .. }) => assert_eq!(status_code, 0),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn telr_status_query_reads_order_state() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "check", "order": {"ref": "ORD-5"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order": {
                "ref": "ORD-5",
                "amount": "75.00",
                "currency": "AED",
                "status": {"code": 3, "text": "Paid"}
            }
        })))
        .mount(&server)
        .await;

    let gateway = common::registry_for(&server.uri()).resolve("telr").expect("telr");
    let resp = gateway.query_status("ORD-5").await.expect("query");
    assert!(resp.success);
    assert_eq!(resp.provider_status.as_deref(), Some("Paid"));
    assert_eq!(resp.amount, Some(dec!(75)));
    assert_eq!(resp.currency.as_deref(), Some("AED"));
}
