mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use farmstay_coupons::config::AppConfig;
use serde_json::{json, Value};

fn bulk_request(count: u32, prefix: &str) -> Value {
    json!({
        "count": count,
        "prefix": prefix,
        "template": {
            "title": "Spring Harvest",
            "type": "percentage",
            "value": "10",
            "maxDiscount": "200",
            "usageLimit": 1,
            "validUntil": "2099-06-30T00:00:00Z"
        }
    })
}

#[tokio::test]
async fn generates_sequential_codes() {
    let app = TestApp::new();
    let (status, body) = app
        .json(Method::POST, "/api/v1/coupons/bulk", Some(bulk_request(5, "X")))
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    let op = &body["data"];
    assert_eq!(op["status"], "completed");
    assert_eq!(op["operationType"], "generate");
    assert_eq!(op["totalCoupons"], 5);
    assert_eq!(op["processedCoupons"], 5);
    assert_eq!(op["failedCoupons"], 0);
    assert!(op["completedAt"].is_string());

    for i in 1..=5 {
        let (status, body) = app
            .json(
                Method::GET,
                &format!("/api/v1/coupons/by-code/X000{i}"),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["title"], format!("Spring Harvest #{i}"));
        assert_eq!(body["data"]["usageLimit"], 1);
    }
}

#[tokio::test]
async fn rerun_counts_duplicates_as_failures() {
    let app = TestApp::new();
    app.json(Method::POST, "/api/v1/coupons/bulk", Some(bulk_request(5, "X")))
        .await;

    let (status, body) = app
        .json(Method::POST, "/api/v1/coupons/bulk", Some(bulk_request(5, "X")))
        .await;

    assert_eq!(status, StatusCode::OK);
    let op = &body["data"];
    assert_eq!(op["status"], "completed");
    assert_eq!(op["processedCoupons"], 0);
    assert_eq!(op["failedCoupons"], 5);

    let errors = op["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 5);
    assert_eq!(errors[0]["index"], 1);
    assert_eq!(errors[0]["code"], "X0001");
    assert_eq!(errors[4]["code"], "X0005");

    let (_, body) = app.json(Method::GET, "/api/v1/coupons", None).await;
    assert_eq!(body["data"]["total"], 5);

    let op_id = op["id"].as_i64().unwrap();
    let (status, stored) = app
        .json(Method::GET, &format!("/api/v1/coupons/bulk/{op_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["data"]["failedCoupons"], 5);

    let (_, listed) = app.json(Method::GET, "/api/v1/coupons/bulk", None).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn count_is_bounded_by_configuration() {
    let app = TestApp::with_config(AppConfig {
        bulk_max_coupons: 3,
        ..AppConfig::default()
    });

    let (status, _) = app
        .json(Method::POST, "/api/v1/coupons/bulk", Some(bulk_request(4, "B")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .json(Method::POST, "/api/v1/coupons/bulk", Some(bulk_request(0, "B")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .json(Method::POST, "/api/v1/coupons/bulk", Some(bulk_request(3, "B")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["processedCoupons"], 3);
}

#[tokio::test]
async fn unknown_operation_is_not_found() {
    let app = TestApp::new();
    let (status, _) = app
        .json(Method::GET, "/api/v1/coupons/bulk/77", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
