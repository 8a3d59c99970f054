//! Client behavior against a mocked redemption service.

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use redemption_client::{
    ClientError, ClientOptions, RedeemOutcome, RedeemRequest, RedemptionClient, RejectionKind,
};
use redemption_core::{IdempotencyKey, RedemptionStatus, UserId};

const WALLET: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";

fn client(server: &MockServer) -> RedemptionClient {
    let options = ClientOptions {
        timeout_seconds: 5,
        max_attempts: 3,
        retry_backoff_ms: 1,
    };
    RedemptionClient::with_options(&server.uri(), options).unwrap()
}

fn request(key: &str) -> RedeemRequest {
    RedeemRequest::with_key(
        UserId::generate(),
        "golden-ticket".parse().unwrap(),
        WALLET,
        key.parse().unwrap(),
    )
}

#[tokio::test]
async fn completed_redemption() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/redeem"))
        .and(body_partial_json(json!({
            "item_id": "golden-ticket",
            "user_wallet": WALLET,
            "idempotency_key": "click-1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "tx": "5sig",
            "pending_id": "6f9619ff-8b86-d011-b42d-00cf4fc964ff"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client(&server).redeem(&request("click-1")).await.unwrap();

    assert_eq!(
        outcome,
        RedeemOutcome::Completed {
            tx: "5sig".into(),
            pending_id: "6f9619ff-8b86-d011-b42d-00cf4fc964ff".into(),
        }
    );
    assert!(outcome.is_final());
}

#[tokio::test]
async fn business_failure_is_an_outcome_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/redeem"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": "insufficient points",
            "code": "insufficient_points"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client(&server).redeem(&request("click-2")).await.unwrap();

    assert_eq!(
        outcome,
        RedeemOutcome::Rejected {
            kind: RejectionKind::InsufficientPoints,
            message: "insufficient points".into(),
        }
    );
    assert_eq!(outcome.toast(), "You don't have enough points for this item.");
}

#[tokio::test]
async fn server_errors_retry_with_the_same_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/redeem"))
        .and(body_partial_json(json!({ "idempotency_key": "click-3" })))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "internal error",
            "code": "internal_error"
        })))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/redeem"))
        .and(body_partial_json(json!({ "idempotency_key": "click-3" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": { "id": "abc", "status": "success", "tx_hash": "5sig" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client(&server).redeem(&request("click-3")).await.unwrap();

    let RedeemOutcome::Replayed(result) = outcome else {
        panic!("expected replay, got {outcome:?}");
    };
    assert_eq!(result.status, RedemptionStatus::Success);
    assert_eq!(result.tx_hash.as_deref(), Some("5sig"));
}

#[tokio::test]
async fn retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/redeem"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server)
        .redeem(&request("click-4"))
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Api { status: 503, .. }));
}

#[tokio::test]
async fn manual_review_is_final() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/redeem"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "redemption requires manual review",
            "code": "manual_review"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client(&server).redeem(&request("click-5")).await.unwrap();

    assert!(matches!(
        outcome,
        RedeemOutcome::Rejected {
            kind: RejectionKind::ManualReview,
            ..
        }
    ));
}

#[tokio::test]
async fn missing_item_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/redeem"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": "item not found",
            "code": "not_found"
        })))
        .mount(&server)
        .await;

    let outcome = client(&server).redeem(&request("click-6")).await.unwrap();

    assert_eq!(outcome.toast(), "This item is unavailable.");
}

#[tokio::test]
async fn status_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/redemptions/click-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {
                "id": "abc",
                "status": "failed",
                "failure_reason": "transaction rejected"
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/redemptions/unknown"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": "redemption not found",
            "code": "not_found"
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let key: IdempotencyKey = "click-7".parse().unwrap();
    let result = client.redemption_status(&key).await.unwrap().unwrap();
    assert_eq!(result.status, RedemptionStatus::Failed);
    assert_eq!(result.failure_reason.as_deref(), Some("transaction rejected"));

    let unknown: IdempotencyKey = "unknown".parse().unwrap();
    assert!(client.redemption_status(&unknown).await.unwrap().is_none());
}

#[tokio::test]
async fn generated_request_carries_a_key() {
    let server = MockServer::start().await;
    let request = RedeemRequest::new(UserId::generate(), "7".parse().unwrap(), WALLET);
    Mock::given(method("POST"))
        .and(path("/v1/redeem"))
        .and(body_partial_json(json!({
            "idempotency_key": request.idempotency_key.as_str(),
            "item_id": "7"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "tx": "5sig",
            "pending_id": "abc"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client(&server).redeem(&request).await.unwrap();

    assert!(matches!(outcome, RedeemOutcome::Completed { .. }));
}
