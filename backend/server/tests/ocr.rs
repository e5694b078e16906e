mod common;

use std::time::Duration;

use common::{TestApp, spawn_app};
use reqwest::StatusCode;
use serde_json::{Value, json};

const HEADER: &str =
    "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

fn tsv(words: &[(i32, &str)]) -> String {
    let mut lines = vec![HEADER.to_string()];
    for (index, (top, text)) in words.iter().enumerate() {
        lines.push(format!("5\t1\t1\t1\t1\t{index}\t10\t{top}\t40\t12\t91\t{text}"));
    }
    lines.join("\n")
}

async fn upload(app: &TestApp, token: &str, body: String) -> reqwest::Response {
    app.client
        .post(app.url("/api/v1/ocr/jobs"))
        .bearer_auth(token)
        .body(body)
        .send()
        .await
        .unwrap()
}

async fn finished(app: &TestApp, token: &str, task_id: &str) -> Value {
    for _ in 0..100 {
        let status: Value = app
            .get(&format!("/api/v1/ocr/jobs/{task_id}"), token)
            .await
            .json()
            .await
            .unwrap();
        if status["status"] == "completed" || status["status"] == "failed" {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {task_id} never finished");
}

#[tokio::test]
async fn test_receipt_from_ocr_job() {
    let app = spawn_app().await;
    let member = app.member("member@example.com").await;
    let other = app.member("other@example.com").await;

    let receipt = tsv(&[
        (40, "Reference"),
        (42, "Code:"),
        (41, "TXN-9931"),
        (100, "Transaction"),
        (101, "Amount"),
        (99, "(NPR)"),
        (100, "1,500.00"),
    ]);

    let response = upload(&app, &member, receipt).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let accepted: Value = response.json().await.unwrap();
    assert_eq!(accepted["status"], "processing");
    let task_id = accepted["task_id"].as_str().unwrap().to_string();

    let status = finished(&app, &member, &task_id).await;
    assert_eq!(status["status"], "completed");
    assert_eq!(status["result"]["reference"], "TXN-9931");

    assert_eq!(
        app.get(&format!("/api/v1/ocr/jobs/{task_id}"), &other).await.status(),
        StatusCode::NOT_FOUND
    );

    let response = app
        .post(
            &format!("/api/v1/receipts/from-job/{task_id}"),
            &member,
            json!({ "notes": "January savings" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let stored: Value = response.json().await.unwrap();
    assert_eq!(stored["amount_paisa"], 150000);
    assert_eq!(stored["reference"], "TXN-9931");
    assert_eq!(stored["notes"], "January savings");
    let receipt_id = stored["id"].as_str().unwrap().to_string();

    assert_eq!(
        app.get(&format!("/api/v1/receipts/{receipt_id}"), &other).await.status(),
        StatusCode::NOT_FOUND
    );

    let own: Vec<Value> = app.get("/api/v1/receipts", &member).await.json().await.unwrap();
    assert_eq!(own.len(), 1);

    assert_eq!(
        app.delete(&format!("/api/v1/ocr/jobs/{task_id}"), &member).await.status(),
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        app.get(&format!("/api/v1/ocr/jobs/{task_id}"), &member).await.status(),
        StatusCode::NOT_FOUND
    );

    assert_eq!(
        app.delete(&format!("/api/v1/receipts/{receipt_id}"), &member).await.status(),
        StatusCode::NO_CONTENT
    );
}

#[tokio::test]
async fn test_receipt_without_amount_is_rejected() {
    let app = spawn_app().await;
    let member = app.member("member@example.com").await;

    let response = upload(&app, &member, tsv(&[(40, "Remarks"), (41, "savings")])).await;
    let accepted: Value = response.json().await.unwrap();
    let task_id = accepted["task_id"].as_str().unwrap().to_string();

    assert_eq!(finished(&app, &member, &task_id).await["status"], "completed");

    let response = app
        .post(&format!("/api/v1/receipts/from-job/{task_id}"), &member, json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bad_uploads() {
    let app = spawn_app().await;
    let member = app.member("member@example.com").await;

    assert_eq!(
        upload(&app, &member, "  \n".to_string()).await.status(),
        StatusCode::BAD_REQUEST
    );

    let response = upload(&app, &member, "no columns here".to_string()).await;
    let accepted: Value = response.json().await.unwrap();
    let task_id = accepted["task_id"].as_str().unwrap().to_string();
    let status = finished(&app, &member, &task_id).await;
    assert_eq!(status["status"], "failed");

    let response = app
        .post(&format!("/api/v1/receipts/from-job/{task_id}"), &member, json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_manual_receipt() {
    let app = spawn_app().await;
    let member = app.member("member@example.com").await;

    let response = app
        .post(
            "/api/v1/receipts",
            &member,
            json!({ "amount_paisa": 0, "reference": "CASH" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .post(
            "/api/v1/receipts",
            &member,
            json!({ "amount_paisa": 250000, "reference": "CASH" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}
