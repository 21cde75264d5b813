mod common;

use payments_bridge::domain::callback::InboundCallback;
use payments_bridge::domain::response::PaymentStatus;
use payments_bridge::verification::SignatureScheme;
use rust_decimal_macros::dec;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fawry_callback(status: &str) -> InboundCallback {
    let signature = SignatureScheme::sha256("").sign(&[
        "ord-1001",
        "9990001",
        "150.50",
        status,
        common::FAWRY_SECURITY_KEY,
    ]);
    InboundCallback::default()
        .with_field("merchantRefNumber", "ord-1001")
        .with_field("fawryRefNumber", "9990001")
        .with_field("paymentAmount", 150.5)
        .with_field("paymentStatus", status)
        .with_field("signature", signature)
}

#[tokio::test]
async fn fawry_signed_paid_callback_is_confirmed_by_status_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ECommerceWeb/Fawry/payments/status"))
        .and(query_param("merchantRefNumber", "ord-1001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "paymentStatus": "PAID",
            "fawryRefNumber": "9990001",
            "paymentAmount": 150.5
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = common::registry_for(&server.uri()).resolve("fawry").expect("fawry");
    let resp = gateway.verify_callback(&fawry_callback("PAID")).await;
    assert!(resp.success);
    assert_eq!(resp.status, PaymentStatus::Success);
    assert_eq!(resp.provider_status.as_deref(), Some("PAID"));
    assert_eq!(resp.unique_id.as_deref(), Some("9990001"));
    assert_eq!(resp.amount, Some(dec!(150.5)));
    assert_eq!(resp.gateway_name, "fawry");
}

#[tokio::test]
async fn fawry_signature_mismatch_never_reaches_the_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"paymentStatus": "PAID"})))
        .expect(0)
        .mount(&server)
        .await;

    let gateway = common::registry_for(&server.uri()).resolve("fawry").expect("fawry");
    let forged = fawry_callback("UNPAID").with_field("paymentStatus", "PAID");
    let resp = gateway.verify_callback(&forged).await;
    assert!(!resp.success);
    assert_eq!(resp.status, PaymentStatus::SignatureFailed);
}

#[tokio::test]
async fn fawry_signed_paid_but_query_says_unpaid_is_pending() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ECommerceWeb/Fawry/payments/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"paymentStatus": "UNPAID"})))
        .mount(&server)
        .await;

    let gateway = common::registry_for(&server.uri()).resolve("fawry").expect("fawry");
    let resp = gateway.verify_callback(&fawry_callback("PAID")).await;
    assert!(!resp.success);
    assert_eq!(resp.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn urway_hash_is_checked_then_status_is_queried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/checkPaymentStatus"))
        .and(body_partial_json(json!({"paymentId": "2214", "terminalId": "term-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": "Successful",
            "amount": "150.50",
            "currency": "SAR"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let hash = SignatureScheme::sha256("|").sign(&["TX-77", common::URWAY_MERCHANT_KEY, "000", "150.50"]);
    let callback = InboundCallback::default()
        .with_field("PaymentId", "2214")
        .with_field("TranId", "TX-77")
        .with_field("ResponseCode", "000")
        .with_field("amount", "150.50")
        .with_field("Result", "Successful")
        .with_field("responseHash", hash);

    let gateway = common::registry_for(&server.uri()).resolve("urway").expect("urway");
    let resp = gateway.verify_callback(&callback).await;
    assert!(resp.success);
    assert_eq!(resp.unique_id.as_deref(), Some("TX-77"));
    assert_eq!(resp.amount, Some(dec!(150.50)));
}

#[tokio::test]
async fn urway_wrong_hash_is_signature_failed() {
    let server = MockServer::start().await;
    let callback = InboundCallback::default()
        .with_field("PaymentId", "2214")
        .with_field("TranId", "TX-77")
        .with_field("ResponseCode", "000")
        .with_field("amount", "150.50")
        .with_field("Result", "Successful")
        .with_field("responseHash", "deadbeef");

    let gateway = common::registry_for(&server.uri()).resolve("urway").expect("urway");
    let resp = gateway.verify_callback(&callback).await;
    assert_eq!(resp.status, PaymentStatus::SignatureFailed);
    assert!(!resp.success);
}

fn signed_urway_callback(tran_id: &str, code: &str, amount: &str) -> InboundCallback {
    let hash = SignatureScheme::sha256("|").sign(&[tran_id, common::URWAY_MERCHANT_KEY, code, amount]);
    InboundCallback::default()
        .with_field("TranId", tran_id)
        .with_field("ResponseCode", code)
        .with_field("amount", amount)
        .with_field("responseHash", hash)
}

#[tokio::test]
async fn urway_unsigned_result_cannot_claim_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "Successful"})))
        .expect(0)
        .mount(&server)
        .await;

    let callback = signed_urway_callback("TX-9", "624", "150.50").with_field("Result", "Successful");
    let gateway = common::registry_for(&server.uri()).resolve("urway").expect("urway");
    let resp = gateway.verify_callback(&callback).await;
    assert!(!resp.success);
    assert_eq!(resp.status, PaymentStatus::InvalidRequest);
}

#[tokio::test]
async fn urway_declined_code_is_not_upgraded_by_the_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/checkPaymentStatus"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "Successful", "amount": "150.50"})))
        .mount(&server)
        .await;

    let callback = signed_urway_callback("TX-9", "624", "150.50")
        .with_field("PaymentId", "9001")
        .with_field("Result", "Successful");
    let gateway = common::registry_for(&server.uri()).resolve("urway").expect("urway");
    let resp = gateway.verify_callback(&callback).await;
    assert!(!resp.success);
    assert_eq!(resp.status, PaymentStatus::Rejected);
}

#[tokio::test]
async fn urway_query_for_another_transaction_is_refused() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/checkPaymentStatus"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": "Successful",
            "tranid": "TX-OTHER",
            "amount": "150.50"
        })))
        .mount(&server)
        .await;

    let callback = signed_urway_callback("TX-9", "000", "150.50").with_field("PaymentId", "9001");
    let gateway = common::registry_for(&server.uri()).resolve("urway").expect("urway");
    let resp = gateway.verify_callback(&callback).await;
    assert!(!resp.success);
    assert_eq!(resp.status, PaymentStatus::SignatureFailed);
}

#[tokio::test]
async fn urway_any_signed_field_change_breaks_the_hash() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "Successful"})))
        .expect(0)
        .mount(&server)
        .await;
    let gateway = common::registry_for(&server.uri()).resolve("urway").expect("urway");

    for (field, forged) in [("TranId", "TX-10"), ("ResponseCode", "000"), ("amount", "1500.50")] {
        let callback = signed_urway_callback("TX-9", "624", "150.50")
            .with_field("PaymentId", "9001")
            .with_field(field, forged);
        let resp = gateway.verify_callback(&callback).await;
        assert_eq!(resp.status, PaymentStatus::SignatureFailed, "{field}");
    }
}

#[tokio::test]
async fn fawry_any_signed_field_change_breaks_the_signature() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"paymentStatus": "PAID"})))
        .expect(0)
        .mount(&server)
        .await;
    let gateway = common::registry_for(&server.uri()).resolve("fawry").expect("fawry");

    for (field, forged) in [
        ("merchantRefNumber", json!("ord-1002")),
        ("fawryRefNumber", json!("9990002")),
        ("paymentAmount", json!(1505.0)),
        ("paymentStatus", json!("PAID")),
    ] {
        let callback = fawry_callback("UNPAID").with_field(field, forged);
        let resp = gateway.verify_callback(&callback).await;
        assert_eq!(resp.status, PaymentStatus::SignatureFailed, "{field}");
    }
}

fn tamara_body() -> Vec<u8> {
    br#"{"order_id":"tam-1","order_status":"approved","event_type":"order_approved"}"#.to_vec()
}

#[tokio::test]
async fn tamara_signed_notification_reads_order_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders/tam-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order_id": "tam-1",
            "status": "approved",
            "total_amount": {"amount": 150.5, "currency": "SAR"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let body = tamara_body();
    let signature =
        SignatureScheme::hmac_sha256(common::TAMARA_NOTIFICATION_KEY, "").sign_bytes(&body);
    let callback = InboundCallback::from_json_body(body).with_header("Signature", signature);

    let gateway = common::registry_for(&server.uri()).resolve("tamara").expect("tamara");
    let resp = gateway.verify_callback(&callback).await;
    assert!(resp.success);
    assert_eq!(resp.currency.as_deref(), Some("SAR"));
}

#[tokio::test]
async fn tamara_notification_without_signature_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "approved"})))
        .expect(0)
        .mount(&server)
        .await;

    let gateway = common::registry_for(&server.uri()).resolve("tamara").expect("tamara");
    let resp = gateway
        .verify_callback(&InboundCallback::from_json_body(tamara_body()))
        .await;
    assert_eq!(resp.status, PaymentStatus::SignatureFailed);
}

#[tokio::test]
async fn paypal_already_captured_order_falls_back_to_order_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders/5O1/capture"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "name": "UNPROCESSABLE_ENTITY",
            "details": [{"issue": "ORDER_ALREADY_CAPTURED"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/checkout/orders/5O1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "5O1",
            "status": "COMPLETED",
            "purchase_units": [{
                "amount": {"currency_code": "USD", "value": "10.00"},
                "payments": {"captures": [{"amount": {"currency_code": "USD", "value": "10.00"}}]}
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = common::registry_for(&server.uri()).resolve("paypal").expect("paypal");
    let resp = gateway
        .verify_callback(&InboundCallback::default().with_field("token", "5O1"))
        .await;
    assert!(resp.success);
    assert_eq!(resp.amount, Some(dec!(10.00)));
    assert_eq!(resp.currency.as_deref(), Some("USD"));
}

#[tokio::test]
async fn moyasar_trusts_the_server_not_the_redirect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/payments/pay_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pay_1",
            "status": "failed",
            "amount": 15050,
            "currency": "SAR"
        })))
        .mount(&server)
        .await;

    let callback = InboundCallback::default()
        .with_field("id", "pay_1")
        .with_field("status", "paid")
        .with_field("message", "APPROVED");
    let gateway = common::registry_for(&server.uri()).resolve("moyasar").expect("moyasar");
    let resp = gateway.verify_callback(&callback).await;
    assert!(!resp.success);
    assert_eq!(resp.status, PaymentStatus::Failed);
    assert_eq!(resp.amount, Some(dec!(150.50)));
}

#[tokio::test]
async fn failed_confirmation_query_is_an_error_never_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/charges/chg_1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let gateway = common::registry_for(&server.uri()).resolve("tap").expect("tap");
    let resp = gateway
        .verify_callback(&InboundCallback::default().with_field("tap_id", "chg_1"))
        .await;
    assert!(!resp.success);
    assert_eq!(resp.status, PaymentStatus::Error);
}

#[tokio::test]
async fn tabby_authorized_checkout_is_successful_but_pending_capture() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/payments/pay-auth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pay-auth",
            "status": "AUTHORIZED",
            "amount": "150.50",
            "currency": "SAR"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/payments/pay-new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "pay-new", "status": "CREATED"})))
        .mount(&server)
        .await;

    let gateway = common::registry_for(&server.uri()).resolve("tabby").expect("tabby");
    let authorized = gateway
        .verify_callback(&InboundCallback::default().with_field("payment_id", "pay-auth"))
        .await;
    assert!(authorized.success);
    assert_eq!(authorized.status, PaymentStatus::Pending);
    assert_eq!(authorized.provider_status.as_deref(), Some("AUTHORIZED"));

    let created = gateway
        .verify_callback(&InboundCallback::default().with_field("payment_id", "pay-new"))
        .await;
    assert!(!created.success);
    assert_eq!(created.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn callback_without_reference_is_invalid_request() {
    let server = MockServer::start().await;
    let registry = common::registry_for(&server.uri());
    for name in ["stripe", "tabby", "tap", "clickpay", "moyasar", "telr", "paypal"] {
        let resp = registry
            .resolve(name)
            .expect(name)
            .verify_callback(&InboundCallback::default())
            .await;
        assert_eq!(resp.status, PaymentStatus::InvalidRequest, "{name}");
        assert!(!resp.success, "{name}");
    }
}

#[tokio::test]
async fn telr_check_maps_numeric_status_codes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "check", "order": {"ref": "ord-1001"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order": {
                "ref": "ord-1001",
                "amount": "150.50",
                "currency": "SAR",
                "status": {"code": -2, "text": "Cancelled"}
            }
        })))
        .mount(&server)
        .await;

    let gateway = common::registry_for(&server.uri()).resolve("telr").expect("telr");
    let resp = gateway
        .verify_callback(&InboundCallback::default().with_field("ref", "ord-1001"))
        .await;
    assert_eq!(resp.status, PaymentStatus::Canceled);
    assert_eq!(resp.provider_status.as_deref(), Some("Cancelled"));
}

#[tokio::test]
async fn clickpay_query_decides_the_outcome() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payment/query"))
        .and(body_partial_json(json!({"profile_id": "44", "tran_ref": "TST2214"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tran_ref": "TST2214",
            "cart_amount": "150.50",
            "cart_currency": "SAR",
            "payment_result": {"response_status": "A", "response_message": "Authorised"}
        })))
        .mount(&server)
        .await;

    let gateway = common::registry_for(&server.uri()).resolve("clickpay").expect("clickpay");
    let resp = gateway
        .verify_callback(&InboundCallback::default().with_field("tran_ref", "TST2214"))
        .await;
    assert!(resp.success);
    assert_eq!(resp.provider_status.as_deref(), Some("A"));
}
