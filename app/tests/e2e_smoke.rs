//! ABOUTME: End-to-end smoke test for the Aura API
//! ABOUTME: Boots real servers on ephemeral ports and walks login, upload, social and explore

use au_config::Config;
use au_core::telemetry;
use au_db::Db;
use au_notify::MemorySender;
use au_obs::{Metrics, ObsState};
use au_web::AppState;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use test_support::{test_phone, tiny_png};

/// Full application lifecycle on random local ports
struct E2ETestSetup {
    #[allow(dead_code)]
    temp_dir: TempDir,
    client: Client,
    sms: Arc<MemorySender>,
    obs_state: ObsState,
    web_base_url: String,
    obs_base_url: String,
}

impl E2ETestSetup {
    async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;

        let mut config = Config::default();
        config.database.path = temp_dir.path().join("e2e.db").to_string_lossy().to_string();
        config.storage.local_dir = temp_dir.path().join("media").to_string_lossy().to_string();
        config.security.jwt_secret = "e2e_jwt_secret_with_at_least_32_chars".to_string();
        config.check()?;

        let db = Db::new(&config.database.path).await?;
        let metrics = Arc::new(Metrics::new());
        let obs_state = ObsState::with_metrics(metrics.clone());

        let sms = Arc::new(MemorySender::new());
        let mut state = AppState::from_config(&config, db, metrics)?;
        state.sms = sms.clone();

        let (web_server, web_addr) = au_web::bind_server("127.0.0.1:0", state)?;
        let (obs_server, obs_addr) = au_obs::bind_server("127.0.0.1:0", obs_state.clone())?;
        actix_web::rt::spawn(web_server);
        actix_web::rt::spawn(obs_server);

        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            temp_dir,
            client,
            sms,
            obs_state,
            web_base_url: format!("http://{}", web_addr),
            obs_base_url: format!("http://{}", obs_addr),
        })
    }

    fn web(&self, path: &str) -> String {
        format!("{}{}", self.web_base_url, path)
    }

    fn obs(&self, path: &str) -> String {
        format!("{}{}", self.obs_base_url, path)
    }

    /// Full OTP round trip; returns the access token and user id
    async fn login(&self, phone: &str) -> Result<(String, String), Box<dyn std::error::Error>> {
        let response = self
            .client
            .post(self.web("/api/auth/otp/send"))
            .json(&json!({ "phone_number": phone }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(format!("OTP send failed: {}", response.status()).into());
        }

        let message = self.sms.last_to(phone).ok_or("No SMS captured")?;
        let code = message
            .body
            .split_whitespace()
            .map(|word| word.trim_end_matches('.'))
            .find(|word| word.len() == 6 && word.chars().all(|c| c.is_ascii_digit()))
            .ok_or("No code in SMS")?
            .to_string();

        let response = self
            .client
            .post(self.web("/api/auth/otp/verify"))
            .json(&json!({ "phone_number": phone, "code": code }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(format!("OTP verify failed: {}", response.status()).into());
        }

        let body: Value = response.json().await?;
        let token = body["access_token"].as_str().ok_or("No token")?.to_string();
        let user_id = body["user"]["id"].as_str().ok_or("No user id")?.to_string();
        Ok((token, user_id))
    }

    async fn upload(&self, token: &str, hint: &str) -> Result<Value, Box<dyn std::error::Error>> {
        let part = Part::bytes(tiny_png())
            .file_name("pixel.png")
            .mime_str("image/png")?;
        let form = Form::new().part("file", part).text("hint", hint.to_string());

        let response = self
            .client
            .post(self.web("/api/images"))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;
        if response.status() != 201 {
            return Err(format!("Upload failed: {}", response.status()).into());
        }
        Ok(response.json().await?)
    }
}

#[actix_web::test]
async fn test_e2e_smoke_workflow() {
    telemetry::init_tracing("test", "e2e_smoke");

    let setup = E2ETestSetup::start().await.expect("Failed to start servers");

    // Probes
    let resp = setup.client.get(setup.obs("/healthz")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let resp = setup.client.get(setup.obs("/readyz")).send().await.unwrap();
    assert_eq!(resp.status(), 503);
    setup.obs_state.readiness.set_ready(true);
    let resp = setup.client.get(setup.obs("/readyz")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    // Login two users
    let (alice_token, alice_id) = setup.login(&test_phone(1)).await.expect("alice login");
    let (bob_token, bob_id) = setup.login(&test_phone(2)).await.expect("bob login");

    let resp = setup
        .client
        .patch(setup.web("/api/users/me"))
        .bearer_auth(&alice_token)
        .json(&json!({ "username": "alice", "display_name": "Alice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Upload with aura
    let created = setup.upload(&alice_token, "city lights").await.expect("upload");
    let image_id = created["image"]["id"].as_str().unwrap().to_string();
    assert!(created["aura"]["score"].is_i64());

    // Social
    let resp = setup
        .client
        .post(setup.web(&format!("/api/social/follow/{}", alice_id)))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["following"], true);

    let resp = setup
        .client
        .post(setup.web(&format!("/api/social/like/{}", image_id)))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["like_count"], 1);

    let resp = setup
        .client
        .post(setup.web(&format!("/api/social/share/{}", image_id)))
        .bearer_auth(&bob_token)
        .json(&json!({ "platform": "sms" }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["share_count"], 1);

    let resp = setup
        .client
        .get(setup.web(&format!("/api/users/{}", alice_id)))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    let profile: Value = resp.json().await.unwrap();
    assert_eq!(profile["follower_count"], 1);
    assert_eq!(profile["image_count"], 1);
    assert_eq!(profile["is_following"], true);

    // Explore without a token
    let feed: Value = setup
        .client
        .get(setup.web("/api/explore/feed"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(feed[0]["image"]["id"], image_id);
    assert_eq!(feed[0]["like_count"], 1);

    let board: Value = setup
        .client
        .get(setup.web("/api/explore/leaderboard"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(board[0]["user"]["id"], alice_id);
    assert_eq!(board[0]["rank"], 1);
    // Only users with images are ranked
    assert!(board
        .as_array()
        .unwrap()
        .iter()
        .all(|row| row["user"]["id"] != bob_id));

    let found: Value = setup
        .client
        .get(setup.web("/api/explore/users?q=ali"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(found[0]["id"], alice_id);

    // Protected routes still need a token
    let resp = setup.client.get(setup.web("/api/users/me")).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let metrics = setup
        .client
        .get(setup.obs("/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("aura_images_uploaded_total 1"));
    assert!(metrics.contains("aura_otp_verified_total 2"));
}
