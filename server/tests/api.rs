//! Router-level tests over the in-memory store

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use kalon_token_server::policy::TokenKind;
use kalon_token_server::store::{MemoryStore, TokenStore};
use kalon_token_server::{build_router, AppState};

fn test_app() -> (Router, MemoryStore) {
    let store = MemoryStore::new();
    let app = build_router(AppState::with_store(Arc::new(store.clone())));
    (app, store)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn consumer_body() -> Value {
    json!({
        "ownerName": "Asha Kulkarni",
        "ownerPhone": "9800000001",
        "residence": "Kothrud",
        "ownerBusiness": 1000
    })
}

fn business_body() -> Value {
    json!({
        "businessName": "Glow Studio",
        "businessOwner": "Meera",
        "businessPhone": "9822222222",
        "businessType": "Salon",
        "businessLocation": "Baner",
        "instagramProfile": "@glowstudio",
        "maxUses": 2
    })
}

fn agent_body() -> Value {
    json!({
        "businessName": "Trendz",
        "agentName": "Ravi",
        "phone": "9811111111",
        "businessType": "Retail",
        "region": "West",
        "commission": 7.5,
        "numberOfTokens": 3
    })
}

async fn create(app: &Router, variant: &str, body: Value) -> Value {
    let (status, resp) = send(app, "POST", &format!("/api/{variant}/tokens"), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {resp}");
    resp["data"].clone()
}

#[tokio::test]
async fn health_and_root_respond() {
    let (app, _) = test_app();
    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn create_consumer_token_then_fetch_by_serial() {
    let (app, _) = test_app();
    let token = create(&app, "b2c", consumer_body()).await;

    assert_eq!(token["serial"], 1);
    assert!(token["code"].as_str().unwrap().starts_with("K1"));
    assert_eq!(token["maxUses"], 5);
    assert_eq!(token["uses"], 0);
    assert_eq!(token["status"], "Active");
    assert_eq!(token["statusColor"], "green");
    assert_eq!(token["totalBusiness"], 1000.0);

    let (status, fetched) = send(&app, "GET", "/api/b2c/tokens/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["success"], true);
    assert_eq!(fetched["data"]["holder"], token["holder"]);
    assert_eq!(fetched["data"]["issueDate"], token["issueDate"]);
    assert_eq!(fetched["data"]["expirationDate"], token["expirationDate"]);
}

#[tokio::test]
async fn create_with_missing_fields_is_rejected() {
    let (app, store) = test_app();
    let (status, resp) = send(
        &app,
        "POST",
        "/api/b2c/tokens",
        Some(json!({"ownerName": "Asha"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["success"], false);
    assert!(resp["error"].is_string());

    let mut body = agent_body();
    body["numberOfTokens"] = json!(900);
    let (status, _) = send(&app, "POST", "/api/b2ba/tokens", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(store.is_empty());
}

#[tokio::test]
async fn unknown_variant_is_bad_request() {
    let (app, _) = test_app();
    let (status, _) = send(&app, "GET", "/api/b2x/tokens", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_requests_use_the_response_envelope() {
    let (app, store) = test_app();

    let req = Request::builder()
        .method("POST")
        .uri("/api/b2c/tokens")
        .header("content-type", "application/json")
        .body(Body::from("{ownerName: Asha"))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
    assert!(body["data"].is_null());
    assert!(body["error"].as_str().unwrap().contains("JSON"));
    assert!(store.is_empty());

    let (status, body) = send(&app, "GET", "/api/b2c/reports/all?page=abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn missing_token_is_not_found() {
    let (app, _) = test_app();
    let (status, resp) = send(&app, "GET", "/api/b2b/tokens/42", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(resp["success"], false);

    let (status, _) = send(
        &app,
        "POST",
        "/api/b2c/codes/K1NOPE0/redeem",
        Some(json!({"redeemerName": "A", "redeemerPhone": "9"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "DELETE", "/api/b2c/tokens/7", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn consumer_redemption_and_reissue() {
    let (app, _) = test_app();
    let token = create(&app, "b2c", consumer_body()).await;
    let code = token["code"].as_str().unwrap().to_lowercase();

    let mut last = Value::Null;
    for i in 0..5 {
        let (status, resp) = send(
            &app,
            "POST",
            &format!("/api/b2c/codes/{code}/redeem"),
            Some(json!({
                "redeemerName": format!("Guest {i}"),
                "redeemerPhone": "9000000000",
                "amount": 500
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "redeem {i} failed: {resp}");
        last = resp["data"].clone();
    }

    assert_eq!(last["token"]["uses"], 5);
    assert_eq!(last["token"]["maxUses"], 10);
    assert_eq!(last["token"]["status"], "Active");
    assert_eq!(last["token"]["totalBusiness"], 3500.0);
    assert_eq!(last["reissue"]["previousUses"], 5);
    assert_eq!(last["reissue"]["newMaxUses"], 10);

    let redemptions = last["token"]["redemptions"].as_array().unwrap();
    let system: Vec<&Value> = redemptions
        .iter()
        .filter(|r| r["redeemerName"] == "SYSTEM")
        .collect();
    assert_eq!(system.len(), 1);

    let (_, report) = send(&app, "GET", "/api/b2c/reports/reissued", None).await;
    assert_eq!(report["data"]["summary"]["totalTokens"], 1);
    assert_eq!(report["data"]["summary"]["reissuedTokens"], 1);
}

#[tokio::test]
async fn expired_token_rejects_redemption() {
    let (app, store) = test_app();
    let token = create(&app, "b2c", consumer_body()).await;
    let code = token["code"].as_str().unwrap().to_string();

    let mut stored = store
        .find_by_code(TokenKind::Consumer, &code)
        .await
        .unwrap()
        .unwrap();
    stored.expiration_date = Utc::now() - Duration::days(3);
    store.save(&stored).await.unwrap();

    let (status, resp) = send(
        &app,
        "POST",
        &format!("/api/b2c/codes/{code}/redeem"),
        Some(json!({"redeemerName": "Late", "redeemerPhone": "9", "amount": 100})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["success"], false);

    let after = store
        .find_by_code(TokenKind::Consumer, &code)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.uses, 0);
    assert!(after.redemptions.is_empty());
}

#[tokio::test]
async fn business_token_exhausts_and_extends() {
    let (app, _) = test_app();
    let token = create(&app, "b2b", business_body()).await;
    let code = token["code"].as_str().unwrap().to_string();
    assert!(code.starts_with("B1"));

    for amount in [1200, 800] {
        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/b2b/codes/{code}/redeem"),
            Some(json!({
                "redeemerName": "Client",
                "redeemerPhone": "9",
                "redeemerResidence": "Aundh",
                "billAmount": amount
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, resp) = send(&app, "GET", &format!("/api/b2b/codes/{code}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["data"]["status"], "Expired");
    assert_eq!(resp["data"]["totalBusiness"], 2000.0);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/b2b/codes/{code}/redeem"),
        Some(json!({"redeemerName": "Client", "redeemerPhone": "9", "billAmount": 10})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, resp) = send(
        &app,
        "PUT",
        &format!("/api/b2b/codes/{code}/extend"),
        Some(json!({"days": 30})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let before = token["remainingDays"].as_str().unwrap();
    let before_days: i64 = before.split(' ').next().unwrap().parse().unwrap();
    assert_eq!(
        resp["data"]["remainingDays"],
        format!("{} days left", before_days + 30)
    );

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/b2b/codes/{code}/extend"),
        Some(json!({"days": "-4"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn consumer_tokens_cannot_be_extended() {
    let (app, _) = test_app();
    let token = create(&app, "b2c", consumer_body()).await;
    let code = token["code"].as_str().unwrap();
    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/b2c/codes/{code}/extend"),
        Some(json!({"days": 30})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn agent_token_flips_to_expired_on_last_use() {
    let (app, _) = test_app();
    let token = create(&app, "b2ba", agent_body()).await;
    let code = token["code"].as_str().unwrap().to_string();
    assert!(code.starts_with("A1"));
    assert_eq!(token["maxUses"], 3);

    let redeem = json!({
        "redeemerName": "Buyer",
        "redeemerPhone": "9",
        "redeemerResidence": "Hinjewadi",
        "billAmount": 400
    });
    for expected_remaining in [2, 1, 0] {
        let (status, resp) = send(
            &app,
            "POST",
            &format!("/api/b2ba/codes/{code}/redeem"),
            Some(redeem.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp["data"]["remainingUses"], expected_remaining);
    }

    let (_, resp) = send(&app, "GET", "/api/b2ba/tokens/1", None).await;
    assert_eq!(resp["data"]["status"], "Expired");
    assert_eq!(resp["data"]["totalBusiness"], 1200.0);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/b2ba/codes/{code}/redeem"),
        Some(redeem),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn edit_and_delete_by_serial() {
    let (app, _) = test_app();
    create(&app, "b2c", consumer_body()).await;

    let mut body = consumer_body();
    body["ownerName"] = json!("Asha K.");
    body["ownerBusiness"] = json!(2500);
    let (status, resp) = send(&app, "PUT", "/api/b2c/tokens/1", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["data"]["holder"]["ownerName"], "Asha K.");
    assert_eq!(resp["data"]["totalBusiness"], 2500.0);

    let (status, _) = send(&app, "DELETE", "/api/b2c/tokens/1", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", "/api/b2c/tokens/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let next = create(&app, "b2c", consumer_body()).await;
    assert_eq!(next["serial"], 2);
}

#[tokio::test]
async fn delete_by_code() {
    let (app, store) = test_app();
    let token = create(&app, "b2ba", agent_body()).await;
    let code = token["code"].as_str().unwrap().to_lowercase();

    let (status, _) = send(&app, "DELETE", &format!("/api/b2ba/codes/{code}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(store.is_empty());
}

#[tokio::test]
async fn list_by_phone_and_reports() {
    let (app, _) = test_app();
    create(&app, "b2c", consumer_body()).await;
    let mut other = consumer_body();
    other["ownerPhone"] = json!("9700000000");
    create(&app, "b2c", other).await;

    let (status, resp) = send(&app, "GET", "/api/b2c/tokens?phone=9700000000", None).await;
    assert_eq!(status, StatusCode::OK);
    let tokens = resp["data"].as_array().unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0]["serial"], 2);

    let (status, resp) = send(&app, "GET", "/api/b2c/reports/all?limit=1&page=2", None).await;
    assert_eq!(status, StatusCode::OK);
    let report = &resp["data"];
    assert_eq!(report["title"], "Kalon Salon & Academy - ALL Tokens Report");
    assert_eq!(report["totalPages"], 2);
    assert_eq!(report["entries"].as_array().unwrap().len(), 1);
    assert_eq!(report["entries"][0]["serial"], 2);
    assert_eq!(report["summary"]["totalTokens"], 2);
    assert_eq!(report["summary"]["activeTokens"], 2);
    assert_eq!(report["summary"]["totalBusiness"], 2000.0);

    let (status, _) = send(&app, "GET", "/api/b2c/reports/redeemed", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn partner_rankings() {
    let (app, _) = test_app();
    let first = create(&app, "b2b", business_body()).await;
    let mut second_body = business_body();
    second_body["businessName"] = json!("Shine Spa");
    let second = create(&app, "b2b", second_body).await;

    let code = second["code"].as_str().unwrap();
    send(
        &app,
        "POST",
        &format!("/api/b2b/codes/{code}/redeem"),
        Some(json!({"redeemerName": "C", "redeemerPhone": "9", "billAmount": 900})),
    )
    .await;

    let (status, resp) = send(&app, "GET", "/api/b2b/rankings", None).await;
    assert_eq!(status, StatusCode::OK);
    let partners = resp["data"]["partners"].as_array().unwrap();
    assert_eq!(partners[0]["businessName"], "Shine Spa");
    assert_eq!(partners[1]["code"], first["code"]);
    assert_eq!(resp["data"]["summary"]["totalPartners"], 2);
    assert_eq!(resp["data"]["summary"]["totalBusiness"], 900.0);
}
