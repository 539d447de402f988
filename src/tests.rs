//! Integration tests for the rescue backend.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::{Config, LogFormat};
use crate::db::{init_database, Repository};
use crate::errors::AppError;
use crate::geo::GeoPoint;
use crate::geocode::{Address, Geocoder};
use crate::tasks::BackgroundTasks;
use crate::{create_router, AppState};

/// Geocoder that answers from memory.
struct StaticGeocoder;

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn reverse(&self, point: GeoPoint) -> Result<Option<Address>, AppError> {
        if point.latitude < 0.0 {
            return Ok(None);
        }
        Ok(Some(Address {
            display_name: "Ben Thanh, District 1".to_string(),
            latitude: point.latitude,
            longitude: point.longitude,
        }))
    }

    async fn search(&self, query: &str) -> Result<Vec<Address>, AppError> {
        Ok(vec![Address {
            display_name: format!("{}, Ho Chi Minh City", query),
            latitude: 10.7769,
            longitude: 106.7009,
        }])
    }
}

fn test_config(psk: Option<String>, data_dir: &Path, accept_rate_limit: u32) -> Config {
    Config {
        api_psk: psk,
        db_path: data_dir.join("test.sqlite"),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        log_level: "warn".to_string(),
        log_format: LogFormat::Text,
        scan_radius_km: 100.0,
        nearby_radius_km: 10.0,
        match_limit: 100,
        notify_batch_size: 500,
        accept_rate_limit,
        upload_rate_limit: 100,
        rate_limit_window: Duration::from_secs(60),
        quiet_hours_utc_offset_minutes: 0,
        geocoder_url: "http://127.0.0.1:9".to_string(),
        media_dir: data_dir.join("media"),
        media_base_url: "/media".to_string(),
        max_upload_bytes: 1024,
    }
}

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    tasks: BackgroundTasks,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::build(Some("test-api-key".to_string()), 100).await
    }

    async fn build(psk: Option<String>, accept_rate_limit: u32) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = test_config(psk.clone(), temp_dir.path(), accept_rate_limit);

        // Initialize database
        let pool = init_database(&config.db_path).await.expect("Failed to init DB");
        let repo = Arc::new(Repository::new(pool));

        let state = AppState::with_geocoder(config, repo, Arc::new(StaticGeocoder));
        let tasks = state.tasks.clone();

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let mut client_builder = Client::builder();
        if let Some(key) = psk {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("x-api-key", key.parse().unwrap());
            client_builder = client_builder.default_headers(headers);
        }

        TestFixture {
            client: client_builder.build().unwrap(),
            base_url,
            tasks,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str, user: Option<&str>) -> RequestBuilder {
        with_user(self.client.get(self.url(path)), user)
    }

    fn post(&self, path: &str, user: Option<&str>) -> RequestBuilder {
        with_user(self.client.post(self.url(path)), user)
    }

    fn put(&self, path: &str, user: Option<&str>) -> RequestBuilder {
        with_user(self.client.put(self.url(path)), user)
    }

    fn delete(&self, path: &str, user: Option<&str>) -> RequestBuilder {
        with_user(self.client.delete(self.url(path)), user)
    }

    async fn create_user(&self, name: &str) -> String {
        let body: Value = self
            .post("/api/users", None)
            .json(&json!({ "displayName": name }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn create_volunteer(&self, name: &str, lat: f64, lng: f64) -> String {
        let id = self.create_user(name).await;
        let resp = self
            .put(&format!("/api/users/{}/location", id), Some(&id))
            .json(&json!({ "latitude": lat, "longitude": lng }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        id
    }

    async fn create_case(&self, reporter: Option<&str>, body: Value) -> Value {
        let resp = self.post("/api/cases", reporter).json(&body).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["data"].clone()
    }
}

fn with_user(builder: RequestBuilder, user: Option<&str>) -> RequestBuilder {
    match user {
        Some(id) => builder.header("x-user-id", id),
        None => builder,
    }
}

fn flood_case(title: &str, urgency: &str, lat: f64, lng: f64) -> Value {
    json!({
        "caseType": "flood",
        "urgency": urgency,
        "latitude": lat,
        "longitude": lng,
        "title": title,
        "details": { "flood": { "peopleCount": 3, "hasChildren": true } }
    })
}

async fn error_code(resp: reqwest::Response) -> String {
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    body["error"]["code"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_auth_missing_psk() {
    let fixture = TestFixture::new().await;

    let resp = Client::new()
        .get(fixture.url("/api/cases"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    assert_eq!(error_code(resp).await, "UNAUTHORIZED");

    let resp = Client::new()
        .get(fixture.url("/api/cases"))
        .header("Authorization", "Bearer test-api-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_no_psk_allows_all() {
    let fixture = TestFixture::build(None, 100).await;

    let resp = fixture.get("/api/cases", None).send().await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_user_profile_and_preferences() {
    let fixture = TestFixture::new().await;
    let id = fixture.create_user("Lan").await;
    let other = fixture.create_user("Minh").await;

    let body: Value = fixture
        .get(&format!("/api/users/{}", id), None)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["displayName"], "Lan");
    assert_eq!(body["data"]["isAvailable"], true);

    // Someone else cannot move this user
    let resp = fixture
        .put(&format!("/api/users/{}/location", id), Some(&other))
        .json(&json!({ "latitude": 10.0, "longitude": 106.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture
        .put(&format!("/api/users/{}/preferences", id), Some(&id))
        .json(&json!({
            "caseTypes": ["flood"],
            "notificationRadiusKm": 25.0,
            "quietHoursStart": "22:00",
            "quietHoursEnd": "06:00"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = fixture
        .get(&format!("/api/users/{}/preferences", id), None)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["caseTypes"], json!(["flood"]));
    assert_eq!(body["data"]["notificationRadiusKm"], 25.0);

    let resp = fixture
        .put(&format!("/api/users/{}/preferences", id), Some(&id))
        .json(&json!({ "notificationRadiusKm": 500.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "VALIDATION_ERROR");

    let resp = fixture
        .get(&format!("/api/users/{}", uuid::Uuid::new_v4()), None)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(error_code(resp).await, "USER_NOT_FOUND");
}

#[tokio::test]
async fn test_case_lifecycle_over_http() {
    let fixture = TestFixture::new().await;
    let reporter = fixture.create_user("Reporter").await;
    let volunteer = fixture
        .create_volunteer("Minh", 10.7900, 106.7100)
        .await;

    let case = fixture
        .create_case(
            Some(&reporter),
            flood_case("Family on the roof", "high", 10.7769, 106.7009),
        )
        .await;
    let case_id = case["id"].as_str().unwrap().to_string();
    assert_eq!(case["status"], "pending");
    assert_eq!(case["details"]["flood"]["peopleCount"], 3);

    let resp = fixture
        .post(&format!("/api/cases/{}/accept", case_id), Some(&volunteer))
        .json(&json!({ "latitude": 10.7900, "longitude": 106.7100 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["status"], "accepted");

    for status in ["en_route", "on_site", "completed"] {
        let resp = fixture
            .put(
                &format!("/api/cases/{}/volunteer-status", case_id),
                Some(&volunteer),
            )
            .json(&json!({ "status": status }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200, "status {}", status);
    }

    let body: Value = fixture
        .get(&format!("/api/cases/{}", case_id), None)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["status"], "resolved");
    assert_eq!(body["data"]["volunteerCount"], 1);

    let body: Value = fixture
        .get(&format!("/api/cases/{}/updates?limit=2", case_id), None)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["meta"]["total"], 5);
    assert_eq!(body["meta"]["totalPages"], 3);

    // The volunteer was alerted on creation and the reporter hears back
    fixture.tasks.drain().await;
    let body: Value = fixture
        .get("/api/notifications", Some(&volunteer))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let kinds: Vec<&str> = body["data"]["notifications"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["type"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"new_case_nearby"));
    assert!(kinds.contains(&"case_resolved"));

    let body: Value = fixture
        .get("/api/notifications", Some(&reporter))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["unreadCount"], 2);

    let body: Value = fixture
        .post("/api/notifications/read", Some(&reporter))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["marked"], 2);

    let body: Value = fixture
        .get(&format!("/api/users/{}", volunteer), None)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["totalCasesResolved"], 1);
}

#[tokio::test]
async fn test_accept_conflict_codes() {
    let fixture = TestFixture::new().await;
    let first = fixture.create_user("A").await;
    let second = fixture.create_user("B").await;

    let mut body = flood_case("Car in the canal", "critical", 10.77, 106.70);
    body["maxVolunteers"] = json!(1);
    let case = fixture.create_case(None, body).await;
    let accept = format!("/api/cases/{}/accept", case["id"].as_str().unwrap());

    let resp = fixture
        .post(&accept, Some(&first))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .post(&accept, Some(&second))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    assert_eq!(error_code(resp).await, "MAX_VOLUNTEERS");

    let resp = fixture
        .post(
            &format!("/api/cases/{}/accept", uuid::Uuid::new_v4()),
            Some(&first),
        )
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(error_code(resp).await, "CASE_NOT_FOUND");

    let resp = fixture
        .post(
            &format!("/api/cases/{}/withdraw", case["id"].as_str().unwrap()),
            Some(&second),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    assert_eq!(error_code(resp).await, "NOT_ACCEPTED");

    // Accepting requires a caller
    let resp = fixture.post(&accept, None).json(&json!({})).send().await.unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_nearby_orders_by_urgency_then_distance() {
    let fixture = TestFixture::new().await;

    fixture
        .create_case(None, flood_case("Low and close", "low", 10.7770, 106.7010))
        .await;
    fixture
        .create_case(None, flood_case("Critical and farther", "critical", 10.8000, 106.7200))
        .await;
    fixture
        .create_case(None, flood_case("Far away", "critical", 21.0285, 105.8542))
        .await;

    let body: Value = fixture
        .get("/api/cases/nearby?lat=10.7769&lng=106.7009&radiusKm=10", None)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let titles: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Critical and farther", "Low and close"]);

    let body: Value = fixture
        .get("/api/cases/nearby?lat=10.7769&lng=106.7009&types=animal", None)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["data"].as_array().unwrap().is_empty());

    let resp = fixture
        .get("/api/cases/nearby?lat=10.7769&lng=106.7009&radiusKm=0", None)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_only_reporter_can_edit_or_cancel() {
    let fixture = TestFixture::new().await;
    let reporter = fixture.create_user("Reporter").await;
    let stranger = fixture.create_user("Stranger").await;
    let case = fixture
        .create_case(Some(&reporter), flood_case("Dog stuck", "medium", 10.77, 106.70))
        .await;
    let path = format!("/api/cases/{}", case["id"].as_str().unwrap());

    let resp = fixture
        .put(&path, Some(&stranger))
        .json(&json!({ "urgency": "critical" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    assert_eq!(error_code(resp).await, "FORBIDDEN");

    let resp = fixture.delete(&path, Some(&stranger)).send().await.unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture.delete(&path, Some(&reporter)).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = fixture
        .get(&path, None)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["status"], "cancelled");

    let resp = fixture
        .put(&path, Some(&reporter))
        .json(&json!({ "status": "resolved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    assert_eq!(error_code(resp).await, "CASE_CLOSED");
}

#[tokio::test]
async fn test_accept_is_rate_limited() {
    let fixture = TestFixture::build(Some("test-api-key".to_string()), 2).await;
    let volunteer = fixture.create_user("Eager").await;
    let case = fixture
        .create_case(None, flood_case("Street flooded", "high", 10.77, 106.70))
        .await;
    let accept = format!("/api/cases/{}/accept", case["id"].as_str().unwrap());

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let resp = fixture
            .post(&accept, Some(&volunteer))
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        statuses.push(resp.status().as_u16());
    }
    assert_eq!(statuses, vec![200, 409, 429]);

    // Other routes are not limited
    let resp = fixture.get("/api/cases", Some(&volunteer)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_comments() {
    let fixture = TestFixture::new().await;
    let author = fixture.create_user("Author").await;
    let other = fixture.create_user("Other").await;
    let case = fixture
        .create_case(None, flood_case("Road blocked", "low", 10.77, 106.70))
        .await;
    let comments = format!("/api/cases/{}/comments", case["id"].as_str().unwrap());

    for text in ["First", "Second"] {
        let resp = fixture
            .post(&comments, Some(&author))
            .json(&json!({ "content": text }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    let body: Value = fixture
        .get(&comments, None)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let list = body["data"].as_array().unwrap();
    assert_eq!(list[0]["content"], "First");
    assert_eq!(list[1]["userName"], "Author");
    let first_id = list[0]["id"].as_str().unwrap().to_string();

    let resp = fixture
        .delete(&format!("/api/comments/{}", first_id), Some(&other))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture
        .delete(&format!("/api/comments/{}", first_id), Some(&author))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = fixture
        .delete(&format!("/api/comments/{}", first_id), Some(&author))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(error_code(resp).await, "COMMENT_NOT_FOUND");
}

#[tokio::test]
async fn test_geocode_endpoints() {
    let fixture = TestFixture::new().await;

    let body: Value = fixture
        .get("/api/geocode/reverse?lat=10.7769&lng=106.7009", None)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["displayName"], "Ben Thanh, District 1");

    let body: Value = fixture
        .get("/api/geocode/reverse?lat=-10&lng=106", None)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["data"].is_null());

    let body: Value = fixture
        .get("/api/geocode/search?q=Ben%20Thanh", None)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let resp = fixture
        .get("/api/geocode/search?q=%20", None)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_profile_update_and_stats() {
    let fixture = TestFixture::new().await;
    let reporter = fixture.create_user("Lan").await;
    let volunteer = fixture.create_volunteer("Minh", 10.7900, 106.7100).await;

    let resp = fixture
        .put(&format!("/api/users/{}", reporter), Some(&reporter))
        .json(&json!({ "displayName": "  Lan Nguyen ", "phone": "0901234567" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["displayName"], "Lan Nguyen");
    assert_eq!(body["data"]["phone"], "0901234567");

    let resp = fixture
        .put(&format!("/api/users/{}", volunteer), Some(&volunteer))
        .json(&json!({ "phone": "0901234567" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    assert_eq!(error_code(resp).await, "PHONE_EXISTS");

    let resp = fixture
        .put(&format!("/api/users/{}", reporter), Some(&volunteer))
        .json(&json!({ "displayName": "Hijacked" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture
        .put(&format!("/api/users/{}", reporter), Some(&reporter))
        .json(&json!({ "displayName": "L" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let case = fixture
        .create_case(Some(&reporter), flood_case("Water rising", "high", 10.7769, 106.7009))
        .await;
    let case_id = case["id"].as_str().unwrap().to_string();
    let resp = fixture
        .post(&format!("/api/cases/{}/accept", case_id), Some(&volunteer))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let stats = |id: String| {
        let request = fixture.get(&format!("/api/users/{}/stats", id), None);
        async move {
            let body: Value = request.send().await.unwrap().json().await.unwrap();
            body["data"].clone()
        }
    };

    let body = stats(reporter.clone()).await;
    assert_eq!(body["casesReported"], 1);
    let body = stats(volunteer.clone()).await;
    assert_eq!(body["casesAccepted"], 1);
    assert_eq!(body["casesInProgress"], 1);
    assert_eq!(body["casesCompleted"], 0);

    let resp = fixture
        .put(
            &format!("/api/cases/{}/volunteer-status", case_id),
            Some(&volunteer),
        )
        .json(&json!({ "status": "completed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body = stats(volunteer.clone()).await;
    assert_eq!(body["casesAccepted"], 1);
    assert_eq!(body["casesInProgress"], 0);
    assert_eq!(body["casesCompleted"], 1);

    let resp = fixture
        .get(&format!("/api/users/{}/stats", uuid::Uuid::new_v4()), None)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_push_tokens() {
    let fixture = TestFixture::new().await;
    let id = fixture.create_user("Lan").await;
    let other = fixture.create_user("Minh").await;
    let tokens = format!("/api/users/{}/push-tokens", id);

    let resp = fixture
        .post(&tokens, Some(&id))
        .json(&json!({ "token": "device-token-abc", "platform": "android", "deviceId": "pixel-7" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["platform"], "android");
    assert_eq!(body["data"]["isActive"], true);

    let resp = fixture
        .post(&tokens, Some(&other))
        .json(&json!({ "token": "device-token-xyz", "platform": "ios" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture
        .post(&tokens, Some(&id))
        .json(&json!({ "token": "  ", "platform": "ios" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let one = format!("{}/device-token-abc", tokens);
    let body: Value = fixture
        .delete(&one, Some(&id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["removed"], true);

    // Deleting again is harmless
    let body: Value = fixture
        .delete(&one, Some(&id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["removed"], false);
}

#[tokio::test]
async fn test_mark_single_notification_read() {
    let fixture = TestFixture::new().await;
    let reporter = fixture.create_user("Reporter").await;
    let volunteer = fixture.create_volunteer("Minh", 10.7900, 106.7100).await;
    fixture
        .create_case(Some(&reporter), flood_case("Roof", "high", 10.7769, 106.7009))
        .await;
    fixture.tasks.drain().await;

    let body: Value = fixture
        .get("/api/notifications", Some(&volunteer))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["unreadCount"], 1);
    let id = body["data"]["notifications"][0]["id"]
        .as_str()
        .unwrap()
        .to_string();
    let path = format!("/api/notifications/{}/read", id);

    // Someone else's notification looks missing
    let resp = fixture.post(&path, Some(&reporter)).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(error_code(resp).await, "NOTIFICATION_NOT_FOUND");

    let resp = fixture.post(&path, Some(&volunteer)).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = fixture
        .get("/api/notifications", Some(&volunteer))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["unreadCount"], 0);
    assert_eq!(body["data"]["notifications"][0]["isRead"], true);
}

fn media_form(parts: &[(&str, &[u8])]) -> Form {
    parts.iter().fold(Form::new(), |form, (name, bytes)| {
        form.part("files", Part::bytes(bytes.to_vec()).file_name(name.to_string()))
    })
}

#[tokio::test]
async fn test_case_media_over_http() {
    let fixture = TestFixture::new().await;
    let reporter = fixture.create_user("Reporter").await;
    let stranger = fixture.create_user("Stranger").await;
    let case = fixture
        .create_case(Some(&reporter), flood_case("Street flooded", "medium", 10.77, 106.70))
        .await;
    let media = format!("/api/cases/{}/media", case["id"].as_str().unwrap());

    let resp = fixture
        .post(&media, Some(&reporter))
        .multipart(media_form(&[("street.jpg", &b"jpeg"[..]), ("clip.mp4", &b"mp4 bytes"[..])]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let uploaded = body["data"].as_array().unwrap().clone();
    assert_eq!(uploaded.len(), 2);
    assert_eq!(uploaded[0]["mediaType"], "image");
    assert_eq!(uploaded[1]["mediaType"], "video");
    assert_eq!(uploaded[1]["fileSize"], 9);
    assert!(uploaded[0].get("storageKey").is_none());

    // Blobs are public
    let url = uploaded[0]["url"].as_str().unwrap();
    let resp = Client::new().get(fixture.url(url)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"jpeg");

    let resp = fixture
        .post(&media, Some(&stranger))
        .multipart(media_form(&[("x.jpg", &b"x"[..])]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture
        .post(&media, Some(&reporter))
        .multipart(media_form(&[("notes.pdf", &b"pdf"[..])]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "INVALID_FILE_TYPE");

    let resp = fixture
        .post(&media, Some(&reporter))
        .multipart(media_form(&[("big.png", &[0u8; 2048][..])]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "FILE_TOO_LARGE");

    let body: Value = fixture
        .get(&media, None)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let media_id = uploaded[0]["id"].as_str().unwrap();
    let resp = fixture
        .delete(&format!("/api/media/{}", media_id), Some(&stranger))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = fixture
        .delete(&format!("/api/media/{}", media_id), Some(&reporter))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = Client::new().get(fixture.url(url)).send().await.unwrap();
    assert_eq!(resp.status(), 404);

    let resp = fixture
        .delete(&format!("/api/media/{}", media_id), Some(&reporter))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(error_code(resp).await, "MEDIA_NOT_FOUND");
}
