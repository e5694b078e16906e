#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use reqwest::{Client, Response, StatusCode};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use yugantar_server::{
    build_router,
    config::Config,
    mailer::{Email, Mailer},
    models::AccessRole,
    services::users::{Registration, register},
    sessions::Sessions,
    state::State,
};

pub const PASSWORD: &str = "correct horse";
const ROUNDS: u32 = 1000;

pub struct TestApp {
    pub address: String,
    pub client: Client,
    pub mailer: Mailer,
    pub state: Arc<State>,
}

pub async fn spawn_app() -> TestApp {
    let config = Config {
        database_path: ":memory:".into(),
        jwt_secret: SecretString::from("test-secret"),
        password_hash_rounds: ROUNDS,
        ..Config::default()
    };
    let mailer = Mailer::outbox();
    let state = State::with_parts(config, Sessions::memory(), mailer.clone()).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());

    let app = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestApp {
        address,
        client: Client::new(),
        mailer,
        state,
    }
}

pub fn registration(email: &str) -> Registration {
    Registration {
        first_name: "Hari".into(),
        middle_name: None,
        last_name: "Bahadur".into(),
        email: email.into(),
        phone: "9811111111".into(),
        address: "Pokhara".into(),
        password: PASSWORD.into(),
        password_repeat: PASSWORD.into(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.address)
    }

    pub async fn get(&self, path: &str, token: &str) -> Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn put(&self, path: &str, token: &str, body: Value) -> Response {
        self.client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn delete(&self, path: &str, token: &str) -> Response {
        self.client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    pub async fn login(&self, email: &str, password: &str) -> Response {
        self.client
            .post(self.url("/api/v1/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap()
    }

    /// Stores an account directly and returns an access token for it.
    pub async fn user_with_roles(&self, email: &str, roles: Vec<AccessRole>) -> String {
        register(&self.state.database, &registration(email), roles, ROUNDS).unwrap();

        let response = self.login(email, PASSWORD).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = response.json().await.unwrap();
        body["access_token"].as_str().unwrap().to_string()
    }

    pub async fn member(&self, email: &str) -> String {
        self.user_with_roles(email, vec![AccessRole::User]).await
    }

    pub async fn moderator(&self, email: &str) -> String {
        self.user_with_roles(email, vec![AccessRole::User, AccessRole::Moderator])
            .await
    }

    pub async fn admin(&self, email: &str) -> String {
        self.user_with_roles(email, vec![AccessRole::User, AccessRole::Admin])
            .await
    }

    /// Creates, submits and approves a policy of `kind`, returning its id.
    pub async fn active_policy(&self, admin: &str, kind: &str, fields: Value) -> String {
        let response = self
            .post(&format!("/api/v1/policies/{kind}"), admin, fields)
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let policy: Value = response.json().await.unwrap();
        let id = policy["policy_id"].as_str().unwrap().to_string();

        for action in ["submit", "approve"] {
            let response = self
                .post(&format!("/api/v1/policies/{kind}/{id}/{action}"), admin, json!({}))
                .await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        id
    }

    /// Mail is sent on a background task, so give it a moment to land.
    pub async fn wait_for_mail(&self, count: usize) -> Vec<Email> {
        for _ in 0..50 {
            let sent = self.mailer.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        self.mailer.sent()
    }
}

/// Pulls the `token` query parameter out of a link in an email body.
pub fn token_from(email: &Email) -> String {
    email
        .body
        .split("token=")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap()
        .to_string()
}
