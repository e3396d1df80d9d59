//! End-to-end tests: the real router on an ephemeral port, backed by the
//! in-memory store, driven over HTTP.

use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use research_platform::app_state::AppState;
use research_platform::{build_router, timeout_layer};
use research_platform::config::Config;
use research_platform::db::memory::MemoryStore;
use research_platform::db::models::user::{NewUser, UserRole};
use research_platform::db::store::Store;
use research_platform::middleware::auth::Claims;

const SECRET: &str = "integration-secret";

struct TestApp {
    base: String,
    client: Client,
    store: Arc<MemoryStore>,
}

struct Session {
    id: i32,
    token: String,
}

impl TestApp {
    async fn spawn() -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), Config::for_testing(SECRET));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });
        Self { base: format!("http://{addr}"), client: Client::new(), store }
    }

    async fn user(&self, name: &str, role: UserRole, approved: bool) -> Session {
        let user = self
            .store
            .insert_user(NewUser {
                email: format!("{name}@lab.example"),
                username: name.to_string(),
                first_name: name.to_string(),
                last_name: String::new(),
                password_hash: String::new(),
                role,
                is_approved: approved,
                institution: String::new(),
                department: String::new(),
            })
            .await
            .unwrap();
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: role.to_string(),
            exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
        };
        let token =
            encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes()))
                .unwrap();
        Session { id: user.id, token }
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        session: Option<&Session>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = self.client.request(method, format!("{}{path}", self.base));
        if let Some(session) = session {
            request = request.bearer_auth(&session.token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.unwrap();
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, path: &str, session: &Session) -> (StatusCode, Value) {
        self.call(Method::GET, path, Some(session), None).await
    }

    async fn post(&self, path: &str, session: &Session, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, path, Some(session), Some(body)).await
    }

    async fn patch(&self, path: &str, session: &Session, body: Value) -> (StatusCode, Value) {
        self.call(Method::PATCH, path, Some(session), Some(body)).await
    }

    /// Department plus a lab of `capacity`, created by `admin`.
    async fn lab(&self, admin: &Session, capacity: i32) -> i64 {
        let (status, body) =
            self.post("/departments", admin, json!({ "name": "Biology" })).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let department_id = body["data"]["id"].as_i64().unwrap();

        let (status, body) = self
            .post(
                "/labs",
                admin,
                json!({ "name": "Genomics", "department_id": department_id, "capacity": capacity }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_i64().unwrap()
    }
}

impl TestApp {
    /// Active test service of `capacity`, created by `admin`.
    async fn service(&self, admin: &Session, code: &str, capacity: i32) -> i64 {
        let (status, body) = self
            .post(
                "/services",
                admin,
                json!({ "service_code": code, "name": code, "category": "testing", "max_concurrent_requests": capacity }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_i64().unwrap()
    }

    async fn request_service(&self, service_id: i64, requester: &Session) -> (StatusCode, Value) {
        self.post(&format!("/services/{service_id}/requests"), requester, json!({ "title": "Samples" }))
            .await
    }
}

fn reason(body: &Value) -> &str {
    body["errors"]["reason"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn lab_fills_up_and_frees_a_place() {
    let app = TestApp::spawn().await;
    let admin = app.user("admin", UserRole::Admin, true).await;
    let a = app.user("ana", UserRole::Researcher, true).await;
    let b = app.user("ben", UserRole::Researcher, true).await;
    let c = app.user("cai", UserRole::Researcher, true).await;
    let lab = app.lab(&admin, 2).await;
    let join = format!("/labs/{lab}/assignments");

    let (status, first) = app.post(&join, &a, json!({})).await;
    assert_eq!(status, StatusCode::CREATED, "{first}");
    assert_eq!(first["data"]["status"], "active");
    assert_eq!(first["data"]["assigned_by"], a.id);
    let (status, _) = app.post(&join, &b, json!({})).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.post(&join, &c, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reason(&body), "AT_CAPACITY");
    assert_eq!(body["success"], false);

    let (_, availability) = app.get(&format!("/labs/{lab}/availability"), &admin).await;
    assert_eq!(availability["data"]["is_at_capacity"], true);
    assert_eq!(availability["data"]["available_spots"], 0);

    let assignment = first["data"]["id"].as_i64().unwrap();
    let (status, ended) = app
        .patch(&format!("/assignments/{assignment}/status"), &admin, json!({ "status": "inactive" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{ended}");
    assert!(ended["data"]["end_date"].is_string());

    let (status, _) = app.post(&join, &c, json!({})).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, mine) = app.get("/assignments/me", &c).await;
    assert_eq!(mine["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn repeated_admission_is_a_duplicate() {
    let app = TestApp::spawn().await;
    let admin = app.user("admin", UserRole::Admin, true).await;
    let a = app.user("ana", UserRole::Researcher, true).await;
    let lab = app.lab(&admin, 5).await;
    let join = format!("/labs/{lab}/assignments");

    let (status, _) = app.post(&join, &a, json!({})).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = app.post(&join, &a, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reason(&body), "DUPLICATE");
}

#[tokio::test]
async fn assignment_dates_and_on_behalf_rules() {
    let app = TestApp::spawn().await;
    let admin = app.user("admin", UserRole::Admin, true).await;
    let a = app.user("ana", UserRole::Researcher, true).await;
    let b = app.user("ben", UserRole::Researcher, true).await;
    let lab = app.lab(&admin, 5).await;
    let join = format!("/labs/{lab}/assignments");

    let (status, body) = app
        .post(&join, &a, json!({ "start_date": "2030-05-01", "end_date": "2030-04-01" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["end_date"].is_array());

    let (status, _) = app.post(&join, &a, json!({ "researcher_id": b.id })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.post(&join, &admin, json!({ "researcher_id": b.id })).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["researcher_id"], b.id);
    assert_eq!(body["data"]["assigned_by"], admin.id);
}

#[tokio::test]
async fn staff_cannot_join_labs() {
    let app = TestApp::spawn().await;
    let admin = app.user("admin", UserRole::Admin, true).await;
    let moderator = app.user("mo", UserRole::Moderator, true).await;
    let lab = app.lab(&admin, 5).await;

    let (status, body) = app.post(&format!("/labs/{lab}/assignments"), &moderator, json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(reason(&body), "NOT_APPROVED");
}

#[tokio::test]
async fn publication_review_walkthrough() {
    let app = TestApp::spawn().await;
    let admin = app.user("admin", UserRole::Admin, true).await;
    let author = app.user("ana", UserRole::Researcher, true).await;

    let (status, body) = app
        .post(
            "/publications",
            &author,
            json!({ "title": "Soil microbiomes", "abstract": "We sampled.", "publication_type": "journal_article" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["status"], "draft");
    let status_path = format!("/publications/{}/status", body["data"]["id"]);

    let (status, _) = app.patch(&status_path, &author, json!({ "status": "pending" })).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.patch(&status_path, &admin, json!({ "status": "published" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"]["status"][0], "Cannot change status from pending to published");

    let (status, _) = app.patch(&status_path, &author, json!({ "status": "approved" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.patch(&status_path, &admin, json!({ "status": "approved" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["approved_by"], admin.id);
    assert!(body["data"]["approved_at"].is_string());

    let (status, body) = app.patch(&status_path, &admin, json!({ "status": "published" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "published");
    assert_eq!(body["data"]["approved_by"], admin.id);
}

#[tokio::test]
async fn bulk_review_reports_each_publication() {
    let app = TestApp::spawn().await;
    let admin = app.user("admin", UserRole::Admin, true).await;
    let author = app.user("ana", UserRole::Researcher, true).await;

    let (status, _) = app
        .post("/publications/bulk-review", &admin, json!({ "publication_ids": [41], "action": "approve" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let mut ids = Vec::new();
    for title in ["First", "Second"] {
        let (_, body) = app
            .post("/publications", &author, json!({ "title": title, "publication_type": "report" }))
            .await;
        ids.push(body["data"]["id"].as_i64().unwrap());
    }
    let (status, _) = app
        .patch(&format!("/publications/{}/status", ids[0]), &author, json!({ "status": "pending" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post(
            "/publications/bulk-review",
            &admin,
            json!({ "publication_ids": ids, "action": "reject", "review_notes": "Out of scope" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["updated"], json!([ids[0]]));
    assert_eq!(body["data"]["failed"][0]["id"], ids[1]);
}

#[tokio::test]
async fn unapproved_accounts_only_see_themselves() {
    let app = TestApp::spawn().await;
    let pending = app.user("newbie", UserRole::Researcher, false).await;

    let (status, body) = app.get("/accounts/me", &pending).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_approved"], false);
    assert!(body["data"].get("password_hash").is_none());

    let (status, _) = app.get("/labs", &pending).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn approval_takes_effect_immediately() {
    let app = TestApp::spawn().await;
    let admin = app.user("admin", UserRole::Admin, true).await;
    let pending = app.user("newbie", UserRole::Researcher, false).await;

    let (status, _) = app.get("/labs", &pending).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.get("/accounts/pending", &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .post(&format!("/accounts/{}/approval", pending.id), &admin, json!({ "approved": true }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["approved_by"], admin.id);

    let (status, _) = app.get("/labs", &pending).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .post(&format!("/accounts/{}/approval", admin.id), &admin, json!({ "approved": false }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn authentication_failures() {
    let app = TestApp::spawn().await;
    let (status, body) = app.call(Method::GET, "/labs", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status_code"], 401);

    let forged = Session { id: 1, token: "not-a-jwt".to_string() };
    let (status, _) = app.get("/labs", &forged).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_resources_are_not_found() {
    let app = TestApp::spawn().await;
    let a = app.user("ana", UserRole::Researcher, true).await;

    let (status, body) = app.post("/labs/999/assignments", &a, json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Lab not found");
    assert!(body["errors"].is_null());

    let (status, _) = app.get("/service-requests/7", &a).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn registration_is_public_and_unique() {
    let app = TestApp::spawn().await;
    let body = json!({
        "email": "dana@lab.example",
        "username": "dana",
        "password": "long enough",
    });

    let (status, created) = app.call(Method::POST, "/accounts/register", None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["data"]["role"], "researcher");
    assert_eq!(created["data"]["is_approved"], false);

    let (status, _) = app.call(Method::POST, "/accounts/register", None, Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, invalid) = app
        .call(
            Method::POST,
            "/accounts/register",
            None,
            Some(json!({ "email": "x", "username": "", "password": "short" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(invalid["errors"]["password"].is_array());
    assert!(invalid["errors"]["username"].is_array());
}

#[tokio::test]
async fn service_request_lifecycle() {
    let app = TestApp::spawn().await;
    let admin = app.user("admin", UserRole::Admin, true).await;
    let technician = app.user("tess", UserRole::Moderator, true).await;
    let requester = app.user("ana", UserRole::Researcher, true).await;

    let (status, service) = app
        .post(
            "/services",
            &admin,
            json!({ "service_code": "XRD-01", "name": "X-ray diffraction", "category": "testing", "max_concurrent_requests": 1 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{service}");
    let service_id = service["data"]["id"].as_i64().unwrap();

    let (status, request) = app
        .post(&format!("/services/{service_id}/requests"), &requester, json!({ "title": "Quartz sample" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{request}");
    assert_eq!(request["data"]["status"], "submitted");
    assert!(request["data"]["request_code"].as_str().unwrap().starts_with("SR"));
    let request_id = request["data"]["id"].as_i64().unwrap();

    let other = app.user("ben", UserRole::Researcher, true).await;
    let (status, body) = app
        .post(&format!("/services/{service_id}/requests"), &other, json!({ "title": "Another" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reason(&body), "AT_CAPACITY");

    let status_path = format!("/service-requests/{request_id}/status");
    let (status, _) = app.patch(&status_path, &admin, json!({ "status": "under_review" })).await;
    assert_eq!(status, StatusCode::OK);
    let (status, approved) = app
        .patch(&status_path, &admin, json!({ "status": "approved", "estimated_cost": "120.50" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{approved}");
    assert_eq!(approved["data"]["reviewed_by"], admin.id);

    let (status, body) = app.patch(&status_path, &admin, json!({ "status": "in_progress" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["status"][0].as_str().unwrap().contains("technician"));

    let assign_path = format!("/service-requests/{request_id}/technician");
    let (status, body) = app.post(&assign_path, &admin, json!({ "technician_id": technician.id })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["technician_id"].is_array());

    let (status, entry) = app
        .post(&format!("/services/{service_id}/technicians"), &admin, json!({ "technician_id": technician.id }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{entry}");
    assert_eq!(entry["data"]["max_concurrent_requests"], 3);
    assert_eq!(entry["data"]["role"], "primary");

    let (status, started) = app
        .post(
            &format!("/service-requests/{request_id}/technician"),
            &admin,
            json!({ "technician_id": technician.id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{started}");
    assert_eq!(started["data"]["status"], "in_progress");
    assert!(started["data"]["started_at"].is_string());

    let (status, _) = app.patch(&status_path, &requester, json!({ "status": "completed" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, done) = app.patch(&status_path, &technician, json!({ "status": "completed" })).await;
    assert_eq!(status, StatusCode::OK);
    assert!(done["data"]["completed_at"].is_string());

    let (status, body) = app.get(&format!("/service-requests/{request_id}"), &other).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
}

#[tokio::test]
async fn enrollment_requires_a_published_course() {
    let app = TestApp::spawn().await;
    let admin = app.user("admin", UserRole::Admin, true).await;
    let student = app.user("ana", UserRole::Researcher, true).await;
    let today = Utc::now().date_naive();

    let (status, course) = app
        .post(
            "/courses",
            &admin,
            json!({
                "course_code": "BIO-101",
                "title": "Lab safety",
                "start_date": today + Duration::days(10),
                "end_date": today + Duration::days(12),
                "registration_deadline": today + Duration::days(5),
                "max_participants": 2,
                "is_free": true,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{course}");
    assert_eq!(course["data"]["min_participants"], 2);
    let course_id = course["data"]["id"].as_i64().unwrap();
    let enroll = format!("/courses/{course_id}/enrollments");

    let (status, body) = app.post(&enroll, &student, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reason(&body), "RESOURCE_INACTIVE");

    for next in ["pending", "approved", "published"] {
        let (status, body) = app
            .patch(&format!("/courses/{course_id}/status"), &admin, json!({ "status": next }))
            .await;
        assert_eq!(status, StatusCode::OK, "{next}: {body}");
    }

    let (status, enrollment) = app.post(&enroll, &student, json!({ "notes": "Keen" })).await;
    assert_eq!(status, StatusCode::CREATED, "{enrollment}");
    assert_eq!(enrollment["data"]["status"], "pending");
    assert_eq!(enrollment["data"]["payment_status"], "paid");

    let enrollment_id = enrollment["data"]["id"].as_i64().unwrap();
    let (status, dropped) = app
        .patch(&format!("/enrollments/{enrollment_id}/status"), &student, json!({ "status": "dropped" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dropped["data"]["status"], "dropped");

    let (status, body) = app.post(&enroll, &student, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reason(&body), "DUPLICATE");
}

#[tokio::test]
async fn comments_wait_for_moderation() {
    let app = TestApp::spawn().await;
    let moderator = app.user("mo", UserRole::Moderator, true).await;
    let author = app.user("ana", UserRole::Researcher, true).await;
    let reader = app.user("ben", UserRole::Researcher, true).await;

    let (_, post) = app
        .post("/posts", &author, json!({ "title": "Open day", "content": "Come visit", "category": "event" }))
        .await;
    let post_id = post["data"]["id"].as_i64().unwrap();
    let target = json!({ "kind": "post", "id": post_id });

    let (status, _) = app
        .post("/comments", &reader, json!({ "target": target, "content": "Too early" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app
        .post("/comments", &author, json!({ "target": target, "content": "Note to self" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.get(&format!("/comments?kind=post&id={post_id}"), &reader).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let post_status = format!("/posts/{post_id}/status");
    app.patch(&post_status, &author, json!({ "status": "pending" })).await;
    app.patch(&post_status, &moderator, json!({ "status": "approved" })).await;
    let (status, _) = app.patch(&post_status, &moderator, json!({ "status": "published" })).await;
    assert_eq!(status, StatusCode::OK);

    let (status, comment) = app
        .post("/comments", &reader, json!({ "target": target, "content": "See you there" }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{comment}");
    assert_eq!(comment["data"]["status"], "pending");
    let comment_id = comment["data"]["id"].as_i64().unwrap();

    let listing = format!("/comments?kind=post&id={post_id}");
    let (_, visible) = app.get(&listing, &moderator).await;
    assert_eq!(visible["data"].as_array().unwrap().len(), 1);
    let outsider = app.user("cai", UserRole::Researcher, true).await;
    let (_, hidden) = app.get(&listing, &outsider).await;
    assert!(hidden["data"].as_array().unwrap().is_empty());

    let (status, _) = app
        .patch(&format!("/comments/{comment_id}/status"), &reader, json!({ "status": "approved" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .patch(&format!("/comments/{comment_id}/status"), &moderator, json!({ "status": "approved" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, visible) = app.get(&listing, &outsider).await;
    assert_eq!(visible["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn health_endpoints() {
    let app = TestApp::spawn().await;
    let (status, body) = app.call(Method::GET, "/health/live", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = app.call(Method::GET, "/health/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn course_dates_must_be_strictly_ordered() {
    let app = TestApp::spawn().await;
    let admin = app.user("admin", UserRole::Admin, true).await;
    let day = Utc::now().date_naive() + Duration::days(10);

    let (status, body) = app
        .post(
            "/courses",
            &admin,
            json!({
                "course_code": "BIO-102",
                "title": "Same-day course",
                "start_date": day,
                "end_date": day,
                "registration_deadline": day,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert!(body["errors"]["end_date"].is_array());
    assert!(body["errors"]["registration_deadline"].is_array());
}

#[tokio::test]
async fn ending_an_assignment_needs_a_later_end_date() {
    let app = TestApp::spawn().await;
    let admin = app.user("admin", UserRole::Admin, true).await;
    let a = app.user("ana", UserRole::Researcher, true).await;
    let lab = app.lab(&admin, 5).await;
    let start = Utc::now().date_naive() + Duration::days(30);

    let (status, created) = app
        .post(&format!("/labs/{lab}/assignments"), &a, json!({ "start_date": start }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let status_path = format!("/assignments/{}/status", created["data"]["id"]);

    let (status, body) = app.patch(&status_path, &admin, json!({ "status": "inactive" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["end_date"].is_array());

    let (status, body) = app
        .patch(&status_path, &admin, json!({ "status": "inactive", "end_date": start }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["end_date"].is_array());

    let end = start + Duration::days(1);
    let (status, ended) = app
        .patch(&status_path, &admin, json!({ "status": "inactive", "end_date": end }))
        .await;
    assert_eq!(status, StatusCode::OK, "{ended}");
    assert_eq!(ended["data"]["end_date"], json!(end));
    assert_eq!(ended["data"]["status"], "inactive");
}

#[tokio::test]
async fn requests_on_hold_free_their_place() {
    let app = TestApp::spawn().await;
    let admin = app.user("admin", UserRole::Admin, true).await;
    let a = app.user("ana", UserRole::Researcher, true).await;
    let b = app.user("ben", UserRole::Researcher, true).await;
    let service_id = app.service(&admin, "NMR-01", 1).await;

    let (status, first) = app.request_service(service_id, &a).await;
    assert_eq!(status, StatusCode::CREATED, "{first}");
    let first_status = format!("/service-requests/{}/status", first["data"]["id"]);
    let (status, _) = app.patch(&first_status, &admin, json!({ "status": "on_hold" })).await;
    assert_eq!(status, StatusCode::OK);

    let (_, availability) = app.get(&format!("/services/{service_id}/availability"), &admin).await;
    assert_eq!(availability["data"]["current_requests"], 0);

    let (status, second) = app.request_service(service_id, &b).await;
    assert_eq!(status, StatusCode::CREATED, "{second}");

    let (status, body) = app.patch(&first_status, &admin, json!({ "status": "under_review" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reason(&body), "AT_CAPACITY");

    let second_status = format!("/service-requests/{}/status", second["data"]["id"]);
    let (status, _) = app.patch(&second_status, &b, json!({ "status": "cancelled" })).await;
    assert_eq!(status, StatusCode::OK);

    let (status, resumed) = app.patch(&first_status, &admin, json!({ "status": "under_review" })).await;
    assert_eq!(status, StatusCode::OK, "{resumed}");
    assert_eq!(resumed["data"]["status"], "under_review");
}

#[tokio::test]
async fn technician_workload_is_capped() {
    let app = TestApp::spawn().await;
    let admin = app.user("admin", UserRole::Admin, true).await;
    let tess = app.user("tess", UserRole::Moderator, true).await;
    let mo = app.user("mo", UserRole::Moderator, true).await;
    let a = app.user("ana", UserRole::Researcher, true).await;
    let b = app.user("ben", UserRole::Researcher, true).await;
    let service_id = app.service(&admin, "SEM-01", 5).await;
    let roster = format!("/services/{service_id}/technicians");

    let (status, _) = app
        .post(&roster, &admin, json!({ "technician_id": tess.id, "max_concurrent_requests": 1 }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app.post(&roster, &admin, json!({ "technician_id": tess.id })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = app
        .post(
            &roster,
            &admin,
            json!({ "technician_id": mo.id, "role": "specialist", "start_date": "2020-01-01", "end_date": "2020-02-01" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = app.post(&roster, &admin, json!({ "technician_id": a.id })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["technician_id"].is_array());

    let mut requests = Vec::new();
    for requester in [&a, &b] {
        let (status, request) = app.request_service(service_id, requester).await;
        assert_eq!(status, StatusCode::CREATED, "{request}");
        let id = request["data"]["id"].as_i64().unwrap();
        for next in ["under_review", "approved"] {
            let (status, body) = app
                .patch(&format!("/service-requests/{id}/status"), &admin, json!({ "status": next }))
                .await;
            assert_eq!(status, StatusCode::OK, "{next}: {body}");
        }
        requests.push(id);
    }

    let assign = |id: i64| format!("/service-requests/{id}/technician");
    let (status, started) = app.post(&assign(requests[0]), &admin, json!({ "technician_id": tess.id })).await;
    assert_eq!(status, StatusCode::OK, "{started}");
    assert_eq!(started["data"]["status"], "in_progress");

    let (status, body) = app.post(&assign(requests[1]), &admin, json!({ "technician_id": tess.id })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reason(&body), "AT_CAPACITY");

    let (status, body) = app.post(&assign(requests[1]), &admin, json!({ "technician_id": mo.id })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reason(&body), "RESOURCE_INACTIVE");

    let (_, untouched) = app.get(&format!("/service-requests/{}", requests[1]), &admin).await;
    assert_eq!(untouched["data"]["status"], "approved");
    assert!(untouched["data"]["assigned_technician"].is_null());

    let (status, listed) = app.get(&roster, &admin).await;
    assert_eq!(status, StatusCode::OK);
    let listed = listed["data"].as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["technician_id"], tess.id);
    assert_eq!(listed[0]["current_requests"], 1);
    assert_eq!(listed[0]["is_available"], false);
    assert_eq!(listed[1]["is_available"], false);
}

#[tokio::test]
async fn summer_program_places_and_applications() {
    let app = TestApp::spawn().await;
    let admin = app.user("admin", UserRole::Admin, true).await;
    let supervisor = app.user("sue", UserRole::Moderator, true).await;
    let a = app.user("ana", UserRole::Researcher, true).await;
    let b = app.user("ben", UserRole::Researcher, true).await;
    let today = Utc::now().date_naive();

    let (status, program) = app
        .post(
            "/summer-programs",
            &supervisor,
            json!({
                "program_code": "SUM-2026",
                "title": "Field ecology",
                "start_date": today + Duration::days(10),
                "end_date": today + Duration::days(40),
                "application_deadline": today + Duration::days(5),
                "max_trainees": 1,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{program}");
    assert_eq!(program["data"]["min_trainees"], 1);
    assert_eq!(program["data"]["supervisor_id"], supervisor.id);
    let program_id = program["data"]["id"].as_i64().unwrap();
    let apply = format!("/summer-programs/{program_id}/applications");
    let application = json!({
        "university": "State University",
        "major": "Biology",
        "year_of_study": 3,
        "gpa": "3.6",
        "motivation_letter": "I want to learn fieldwork",
    });

    let (status, _) = app.get(&format!("/summer-programs/{program_id}"), &a).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = app.post(&apply, &a, application.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reason(&body), "RESOURCE_INACTIVE");

    let program_status = format!("/summer-programs/{program_id}/status");
    let (status, _) = app.patch(&program_status, &supervisor, json!({ "status": "pending" })).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.patch(&program_status, &supervisor, json!({ "status": "approved" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    for next in ["approved", "published"] {
        let (status, body) = app.patch(&program_status, &admin, json!({ "status": next })).await;
        assert_eq!(status, StatusCode::OK, "{next}: {body}");
    }

    let (status, body) = app
        .post(&apply, &a, json!({ "university": "", "major": "Biology", "year_of_study": 0, "gpa": "4.5", "motivation_letter": "x" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"]["university"].is_array());
    assert!(body["errors"]["year_of_study"].is_array());
    assert!(body["errors"]["gpa"].is_array());

    let (status, first) = app.post(&apply, &a, application.clone()).await;
    assert_eq!(status, StatusCode::CREATED, "{first}");
    assert_eq!(first["data"]["status"], "submitted");

    let (status, body) = app.post(&apply, &b, application.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reason(&body), "AT_CAPACITY");
    let (_, view) = app.get(&format!("/summer-programs/{program_id}"), &b).await;
    assert_eq!(view["data"]["current_trainees"], 1);
    assert_eq!(view["data"]["is_full"], true);
    assert_eq!(view["data"]["is_application_open"], true);
    assert_eq!(view["data"]["total_hours"], 320);

    let first_status = format!("/summer-applications/{}/status", first["data"]["id"]);
    let (status, withdrawn) = app.patch(&first_status, &a, json!({ "status": "withdrawn" })).await;
    assert_eq!(status, StatusCode::OK, "{withdrawn}");

    let (status, body) = app.post(&apply, &a, application.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reason(&body), "DUPLICATE");

    let (status, second) = app.post(&apply, &b, application).await;
    assert_eq!(status, StatusCode::CREATED, "{second}");
    let second_id = second["data"]["id"].as_i64().unwrap();
    let second_status = format!("/summer-applications/{second_id}/status");

    let (status, _) = app.patch(&second_status, &b, json!({ "status": "under_review" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    for next in ["under_review", "approved"] {
        let (status, body) = app
            .patch(&second_status, &supervisor, json!({ "status": next, "review_notes": "Strong letter" }))
            .await;
        assert_eq!(status, StatusCode::OK, "{next}: {body}");
    }

    let (status, approved) = app.get(&format!("/summer-applications/{second_id}"), &supervisor).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["data"]["reviewed_by"], supervisor.id);
    assert_eq!(approved["data"]["review_notes"], "Strong letter");
    let (status, _) = app.get(&format!("/summer-applications/{second_id}"), &a).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn slow_requests_time_out_with_408() {
    let slow = axum::Router::new()
        .route(
            "/slow",
            axum::routing::get(|| async {
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                "done"
            }),
        )
        .layer(timeout_layer(std::time::Duration::from_millis(50)));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, slow).await.unwrap();
    });

    let response = Client::new().get(format!("http://{addr}/slow")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
}
