mod common;

use common::spawn_app;
use reqwest::StatusCode;
use serde_json::{Value, json};

fn loan_policy() -> Value {
    json!({
        "max_loan_amount": "500000",
        "min_loan_amount": "1000",
        "interest_rate": "12",
        "grace_period_days": 15,
        "change_reason": "Initial loan terms",
    })
}

#[tokio::test]
async fn test_policy_lifecycle() {
    let app = spawn_app().await;
    let admin = app.admin("admin@example.com").await;
    let moderator = app.moderator("secretary@example.com").await;
    let member = app.member("member@example.com").await;

    assert_eq!(
        app.post("/api/v1/policies/loan", &member, loan_policy()).await.status(),
        StatusCode::FORBIDDEN
    );

    let response = app.post("/api/v1/policies/loan", &moderator, loan_policy()).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["version"], 1);
    assert_eq!(created["status"], "draft");
    let id = created["policy_id"].as_str().unwrap().to_string();
    let path = format!("/api/v1/policies/loan/{id}");

    let response = app.put(&path, &moderator, json!({ "interest_rate": "10" })).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .put(
            &path,
            &moderator,
            json!({ "interest_rate": "10", "change_reason": "Board decision" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["version"], 2);
    assert_eq!(updated["interest_rate"], "10");

    let response = app.post(&format!("{path}/submit"), &moderator, json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);

    let count: Value = app
        .get("/api/v1/notifications/unread-count", &admin)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(count["count"], 1);

    assert_eq!(
        app.post(&format!("{path}/approve"), &moderator, json!({})).await.status(),
        StatusCode::FORBIDDEN
    );

    let response = app.post(&format!("{path}/approve"), &admin, json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let approved: Value = response.json().await.unwrap();
    assert_eq!(approved["status"], "active");
    assert_eq!(approved["is_active"], true);
    assert_eq!(approved["version"], 4);

    let response = app
        .put(
            &path,
            &moderator,
            json!({ "interest_rate": "9", "change_reason": "Too late" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    assert_eq!(
        app.get(&format!("{path}/history"), &member).await.status(),
        StatusCode::FORBIDDEN
    );

    let history: Vec<Value> = app
        .get(&format!("{path}/history"), &moderator)
        .await
        .json()
        .await
        .unwrap();
    let change_types: Vec<_> = history
        .iter()
        .map(|log| log["change_type"].as_str().unwrap())
        .collect();
    assert_eq!(change_types, vec!["activated", "updated", "updated", "created"]);
    assert_eq!(history[2]["changed_reason"], "Board decision");
    assert_eq!(history[3]["changed_reason"], "Initial loan terms");
    assert_eq!(history[0]["changed_from_ip"], "127.0.0.1");

    let replay: Value = app
        .get(&format!("{path}/replay"), &moderator)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(replay["matches"], true);
    assert_eq!(replay["stored_version"], 4);

    let active: Value = app
        .get("/api/v1/policies/loan/active", &member)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(active["policy_id"], id.as_str());
}

#[tokio::test]
async fn test_deactivate_requires_a_reason() {
    let app = spawn_app().await;
    let admin = app.admin("admin@example.com").await;
    let id = app.active_policy(&admin, "interest", json!({})).await;
    let path = format!("/api/v1/policies/interest/{id}");

    let response = app
        .client
        .delete(app.url(&path))
        .bearer_auth(&admin)
        .json(&json!({ "change_reason": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .client
        .delete(app.url(&path))
        .bearer_auth(&admin)
        .json(&json!({ "change_reason": "Replaced by new rates" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let policy: Value = response.json().await.unwrap();
    assert_eq!(policy["status"], "expired");
    assert_eq!(policy["is_active"], false);
    assert!(policy["effective_to"].is_string());
}

#[tokio::test]
async fn test_policies_are_scoped_by_kind() {
    let app = spawn_app().await;
    let admin = app.admin("admin@example.com").await;

    let created: Value = app
        .post("/api/v1/policies/loan", &admin, loan_policy())
        .await
        .json()
        .await
        .unwrap();
    let id = created["policy_id"].as_str().unwrap();

    assert_eq!(
        app.get(&format!("/api/v1/policies/deposit/{id}"), &admin).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.get(&format!("/api/v1/policies/loan/{id}"), &admin).await.status(),
        StatusCode::OK
    );

    let drafts: Vec<Value> = app
        .get("/api/v1/policies/loan?status=draft", &admin)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(drafts.len(), 1);

    let active: Vec<Value> = app
        .get("/api/v1/policies/loan?status=active", &admin)
        .await
        .json()
        .await
        .unwrap();
    assert!(active.is_empty());
}

#[tokio::test]
async fn test_read_only_and_unknown_fields_are_rejected() {
    let app = spawn_app().await;
    let admin = app.admin("admin@example.com").await;

    let mut with_version = loan_policy();
    with_version["version"] = json!(9);
    assert_eq!(
        app.post("/api/v1/policies/loan", &admin, with_version).await.status(),
        StatusCode::UNPROCESSABLE_ENTITY
    );

    let mut with_typo = loan_policy();
    with_typo["intrest_rate"] = json!("5");
    assert_eq!(
        app.post("/api/v1/policies/loan", &admin, with_typo).await.status(),
        StatusCode::UNPROCESSABLE_ENTITY
    );
}

#[tokio::test]
async fn test_rejection_reaches_the_creator() {
    let app = spawn_app().await;
    let admin = app.admin("admin@example.com").await;
    let moderator = app.moderator("secretary@example.com").await;

    let created: Value = app
        .post("/api/v1/policies/loan", &moderator, loan_policy())
        .await
        .json()
        .await
        .unwrap();
    let path = format!("/api/v1/policies/loan/{}", created["policy_id"].as_str().unwrap());

    app.post(&format!("{path}/submit"), &moderator, json!({})).await;

    let response = app
        .post(&format!("{path}/reject"), &admin, json!({ "change_reason": "Rate too high" }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let rejected: Value = response.json().await.unwrap();
    assert_eq!(rejected["status"], "void");

    let inbox: Vec<Value> = app
        .get("/api/v1/notifications?unread_only=true", &moderator)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0]["notification_type"], "policy_rejected");

    let marked: Value = app
        .post("/api/v1/notifications/read-all", &moderator, json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(marked["marked_read"], 1);

    let count: Value = app
        .get("/api/v1/notifications/unread-count", &moderator)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(count["count"], 0);
}
