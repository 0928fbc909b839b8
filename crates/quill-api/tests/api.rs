use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use chrono::Duration;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use quill_api::{AppState, AppStateInner, TokenConfig, TokenService, router};
use quill_db::Database;
use quill_moderation::queue::{self, JobReceiver};
use quill_moderation::{KeywordClassifier, ModerationWorker};

const PASSWORD: &str = "StrongPass1!";

struct TestApp {
    app: Router,
    state: AppState,
    jobs: JobReceiver,
    worker: ModerationWorker,
}

impl TestApp {
    fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (queue, jobs) = queue::channel(64);
        let tokens = TokenService::new(&TokenConfig {
            secret: "integration-secret".into(),
            access_ttl: Duration::minutes(300),
            refresh_ttl: Duration::days(1),
        });
        let state = AppStateInner::new(db, tokens, Arc::new(queue));
        let worker = ModerationWorker::new(
            Arc::new(KeywordClassifier::new(["idiot"])),
            Arc::new(state.posts.clone()),
            Arc::new(state.comments.clone()),
            Arc::new(state.comments.clone()),
        );

        Self {
            app: router(state.clone()),
            state,
            jobs,
            worker,
        }
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, body)
    }

    async fn json(&self, method: &str, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let (status, _, body) = self.send(req.body(Body::from(body.to_string())).unwrap()).await;
        (status, body)
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut req = Request::builder().uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let (status, _, body) = self.send(req.body(Body::empty()).unwrap()).await;
        (status, body)
    }

    async fn delete(&self, uri: &str, token: &str) -> StatusCode {
        let req = Request::builder()
            .method("DELETE")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        self.send(req).await.0
    }

    async fn register(&self, username: &str) -> (StatusCode, Value) {
        self.json(
            "POST",
            "/users",
            None,
            json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": PASSWORD,
                "password_confirm": PASSWORD,
            }),
        )
        .await
    }

    async fn login(&self, username: &str, password: &str) -> (StatusCode, HeaderMap, Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/users/token")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("username={username}&password={password}")))
            .unwrap();
        self.send(req).await
    }

    /// Register and log in; returns the access token.
    async fn user(&self, username: &str) -> String {
        assert_eq!(self.register(username).await.0, StatusCode::CREATED);
        let (status, _, body) = self.login(username, PASSWORD).await;
        assert_eq!(status, StatusCode::OK);
        body["access_token"].as_str().unwrap().to_string()
    }

    async fn create_post(&self, token: &str, body: Value) -> Value {
        let (status, post) = self.json("POST", "/posts", Some(token), body).await;
        assert_eq!(status, StatusCode::CREATED, "{post}");
        post
    }

    async fn comment(&self, token: &str, body: Value) -> (StatusCode, Value) {
        self.json("POST", "/comments", Some(token), body).await
    }

    async fn run_moderation(&self) {
        for outcome in self.worker.drain(&self.jobs).await {
            outcome.unwrap();
        }
    }
}

fn id(value: &Value) -> &str {
    value["id"].as_str().unwrap()
}

#[tokio::test]
async fn register_login_and_resolve_identity() {
    let t = TestApp::new();

    let (status, body) = t.register("alice").await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["user_id"].is_string());

    let (status, _, tokens) = t.login("alice", PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tokens["token_type"], "bearer");
    let access = tokens["access_token"].as_str().unwrap();
    let refresh = tokens["refresh_token"].as_str().unwrap();

    let (status, me) = t.get("/users/me", Some(access)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "alice");
    assert_eq!(me["email"], "alice@example.com");
    assert_eq!(me["id"], body["user_id"]);
    assert!(me.get("password_hash").is_none());

    let (status, _) = t.get("/users/me", Some(refresh)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unauthenticated_requests_get_bearer_challenge() {
    let t = TestApp::new();

    for token in [None, Some("garbage")] {
        let mut req = Request::builder().uri("/users/me");
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let (status, headers, body) = t.send(req.body(Body::empty()).unwrap()).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(headers[header::WWW_AUTHENTICATE], "Bearer");
        assert_eq!(body["detail"], "Could not validate credentials");
    }
}

#[tokio::test]
async fn bad_credentials_are_rejected_uniformly() {
    let t = TestApp::new();
    t.register("alice").await;

    let (wrong_pw, headers, body) = t.login("alice", "WrongPass1").await;
    let (unknown, _, _) = t.login("nobody", PASSWORD).await;

    assert_eq!(wrong_pw, StatusCode::UNAUTHORIZED);
    assert!(body.get("access_token").is_none());
    assert_eq!(unknown, StatusCode::UNAUTHORIZED);
    assert_eq!(headers[header::WWW_AUTHENTICATE], "Bearer");
}

#[tokio::test]
async fn refresh_exchanges_only_refresh_tokens() {
    let t = TestApp::new();
    t.register("alice").await;
    let (_, _, tokens) = t.login("alice", PASSWORD).await;

    let (status, body) = t
        .json("POST", "/users/refresh", None, json!({ "refresh_token": tokens["refresh_token"] }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let fresh = body["access_token"].as_str().unwrap();
    assert_eq!(t.get("/users/me", Some(fresh)).await.0, StatusCode::OK);

    let (status, _) = t
        .json("POST", "/users/refresh", None, json!({ "refresh_token": tokens["access_token"] }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_reports_field_errors() {
    let t = TestApp::new();

    let (status, body) = t
        .json(
            "POST",
            "/users",
            None,
            json!({
                "username": "alice",
                "email": "not-an-email",
                "password": "weakpass",
                "password_confirm": "different",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let fields: Vec<&str> = body["detail"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"email"));
    assert!(fields.contains(&"password"));
    assert!(fields.contains(&"password_confirm"));

    assert_eq!(t.register("alice").await.0, StatusCode::CREATED);
    let (status, body) = t.register("alice").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"][0]["field"], "username");

    let (status, body) = t
        .json(
            "POST",
            "/users",
            None,
            json!({
                "username": "alice2",
                "email": "ALICE@example.com",
                "password": PASSWORD,
                "password_confirm": PASSWORD,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"][0]["field"], "email");
}

#[tokio::test]
async fn concurrent_duplicate_registrations_yield_one_user() {
    let t = TestApp::new();

    let (first, second) = tokio::join!(t.register("carol"), t.register("carol"));

    let mut statuses = [first.0, second.0];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::CREATED, StatusCode::UNPROCESSABLE_ENTITY]);
    let rejected = if first.0 == StatusCode::CREATED { second.1 } else { first.1 };
    assert_eq!(rejected["detail"][0]["field"], "username");
    assert_eq!(rejected["detail"][1]["field"], "email");
}

#[tokio::test]
async fn abusive_comment_is_suppressed_and_auto_reply_posted() {
    let t = TestApp::new();
    let alice = t.user("alice").await;
    let bob = t.user("bob").await;

    let post = t
        .create_post(
            &alice,
            json!({ "title": "Hello", "content": "first post", "auto_reply": true, "reply_text": "Thanks!" }),
        )
        .await;
    let (status, comment) = t.comment(&bob, json!({ "content": "you idiot", "post_id": id(&post) })).await;
    assert_eq!(status, StatusCode::CREATED);
    // visible until the worker gets to it
    assert_eq!(comment["is_active"], true);

    t.run_moderation().await;

    let (status, list) = t.get(&format!("/comments?post_id={}", id(&post)), None).await;
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 2);

    let original = list.iter().find(|c| c["id"] == comment["id"]).unwrap();
    assert_eq!(original["is_active"], false);

    let reply = list.iter().find(|c| c["id"] != comment["id"]).unwrap();
    assert_eq!(reply["content"], "Thanks!");
    assert_eq!(reply["parent_id"], comment["id"]);
    assert_eq!(reply["user_id"], post["user_id"]);
    assert_eq!(reply["is_active"], true);

    let (_, post_now) = t.get("/posts", None).await;
    assert_eq!(post_now[0]["is_active"], true);
}

#[tokio::test]
async fn abusive_auto_reply_text_is_moderated_too() {
    let t = TestApp::new();
    let alice = t.user("alice").await;
    let bob = t.user("bob").await;

    let post = t
        .create_post(
            &alice,
            json!({ "title": "Hello", "content": "calm", "auto_reply": true, "reply_text": "go away idiot" }),
        )
        .await;
    let (_, comment) = t.comment(&bob, json!({ "content": "nice post", "post_id": id(&post) })).await;

    t.run_moderation().await;

    let (_, list) = t.get(&format!("/comments?post_id={}", id(&post)), None).await;
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 2);
    let original = list.iter().find(|c| c["id"] == comment["id"]).unwrap();
    assert_eq!(original["is_active"], true);
    let reply = list.iter().find(|c| c["id"] != comment["id"]).unwrap();
    assert_eq!(reply["content"], "go away idiot");
    assert_eq!(reply["is_active"], false);
}

#[tokio::test]
async fn auto_reply_requires_reply_text() {
    let t = TestApp::new();
    let alice = t.user("alice").await;

    for body in [
        json!({ "title": "Auto", "content": "body", "auto_reply": true }),
        json!({ "title": "Auto", "content": "body", "auto_reply": true, "reply_text": "   " }),
    ] {
        let (status, err) = t.json("POST", "/posts", Some(alice.as_str()), body).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err["detail"][0]["field"], "reply_text");
    }

    let post = t.create_post(&alice, json!({ "title": "Plain", "content": "body" })).await;
    let (status, _) = t
        .json(
            "PUT",
            &format!("/posts/{}", id(&post)),
            Some(alice.as_str()),
            json!({ "title": "Plain", "content": "body", "auto_reply": true }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn comments_require_existing_post_and_parent() {
    let t = TestApp::new();
    let alice = t.user("alice").await;
    let first = t.create_post(&alice, json!({ "title": "One", "content": "a" })).await;
    let second = t.create_post(&alice, json!({ "title": "Two", "content": "b" })).await;

    let (status, _) = t
        .comment(&alice, json!({ "content": "hi", "post_id": uuid::Uuid::new_v4() }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, root) = t.comment(&alice, json!({ "content": "root", "post_id": id(&first) })).await;

    let (status, _) = t
        .comment(&alice, json!({ "content": "x", "post_id": id(&second), "parent_id": root["id"] }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, child) = t
        .comment(&alice, json!({ "content": "child", "post_id": id(&first), "parent_id": root["id"] }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(child["parent_id"], root["id"]);
}

#[tokio::test]
async fn only_owners_may_edit_or_delete() {
    let t = TestApp::new();
    let alice = t.user("alice").await;
    let bob = t.user("bob").await;

    let post = t.create_post(&alice, json!({ "title": "Mine", "content": "text" })).await;
    let (_, comment) = t.comment(&alice, json!({ "content": "note", "post_id": id(&post) })).await;
    let post_uri = format!("/posts/{}", id(&post));
    let comment_uri = format!("/comments/{}", id(&comment));

    let edit = json!({ "title": "Stolen", "content": "text" });
    assert_eq!(t.json("PUT", &post_uri, Some(bob.as_str()), edit).await.0, StatusCode::NOT_FOUND);
    assert_eq!(
        t.json("PUT", &comment_uri, Some(bob.as_str()), json!({ "content": "x" })).await.0,
        StatusCode::NOT_FOUND
    );
    assert_eq!(t.delete(&comment_uri, &bob).await, StatusCode::NOT_FOUND);
    assert_eq!(t.delete(&post_uri, &bob).await, StatusCode::NOT_FOUND);

    let (status, edited) = t
        .json("PUT", &comment_uri, Some(alice.as_str()), json!({ "content": "edited" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["content"], "edited");

    assert_eq!(t.delete(&post_uri, &alice).await, StatusCode::NO_CONTENT);
    assert_eq!(t.get("/posts", None).await.1, json!([]));
    assert_eq!(t.delete(&comment_uri, &alice).await, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn owner_edit_does_not_reactivate_suppressed_post() {
    let t = TestApp::new();
    let alice = t.user("alice").await;

    let post = t.create_post(&alice, json!({ "title": "Rant", "content": "what an idiot" })).await;
    t.run_moderation().await;

    let (status, edited) = t
        .json(
            "PUT",
            &format!("/posts/{}", id(&post)),
            Some(alice.as_str()),
            json!({ "title": "Rant", "content": "calm now" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["content"], "calm now");
    assert_eq!(edited["is_active"], false);

    t.run_moderation().await;
    let (_, mine) = t.get("/posts/my", Some(alice.as_str())).await;
    assert_eq!(mine[0]["is_active"], false);
}

#[tokio::test]
async fn deleting_a_comment_removes_its_replies() {
    let t = TestApp::new();
    let alice = t.user("alice").await;
    let bob = t.user("bob").await;

    let post = t
        .create_post(
            &alice,
            json!({ "title": "Auto", "content": "body", "auto_reply": true, "reply_text": "Noted" }),
        )
        .await;
    let (_, comment) = t.comment(&bob, json!({ "content": "hello", "post_id": id(&post) })).await;
    t.run_moderation().await;

    let uri = format!("/comments?post_id={}", id(&post));
    assert_eq!(t.get(&uri, None).await.1.as_array().unwrap().len(), 2);

    assert_eq!(t.delete(&format!("/comments/{}", id(&comment)), &bob).await, StatusCode::NO_CONTENT);
    assert_eq!(t.get(&uri, None).await.1, json!([]));
}

#[tokio::test]
async fn post_listing_filters_and_validation() {
    let t = TestApp::new();
    let alice = t.user("alice").await;
    let bob = t.user("bob").await;
    t.create_post(&alice, json!({ "title": "Rust tips", "content": "a" })).await;
    t.create_post(&bob, json!({ "title": "Cooking", "content": "b" })).await;

    let (_, by_user) = t.get("/posts?username=ALI", None).await;
    assert_eq!(by_user.as_array().unwrap().len(), 1);
    assert_eq!(by_user[0]["title"], "Rust tips");

    let (_, by_title) = t.get("/posts?title=cook", None).await;
    assert_eq!(by_title.as_array().unwrap().len(), 1);

    // Wildcards in a filter match literally
    let (_, wildcard) = t.get("/posts?title=%25", None).await;
    assert_eq!(wildcard, json!([]));
    let (_, underscore) = t.get("/posts?username=_", None).await;
    assert_eq!(underscore, json!([]));

    let (_, all) = t.get("/posts", None).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (_, mine) = t.get("/posts/my", Some(bob.as_str())).await;
    assert_eq!(mine[0]["title"], "Cooking");

    let (status, _) = t
        .json("POST", "/posts", Some(alice.as_str()), json!({ "title": "x".repeat(31), "content": "a" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(t.get("/posts/my", None).await.0, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn analytics_counts_active_and_blocked_comments() {
    let t = TestApp::new();
    let alice = t.user("alice").await;
    let post = t.create_post(&alice, json!({ "title": "Stats", "content": "x" })).await;
    t.comment(&alice, json!({ "content": "nice", "post_id": id(&post) })).await;
    t.comment(&alice, json!({ "content": "idiot", "post_id": id(&post) })).await;
    t.run_moderation().await;

    let (status, stats) = t.get("/analytics/comments-daily-breakdown", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_comments"], 2);
    assert_eq!(stats["active_comments"], 1);
    assert_eq!(stats["blocked_comments"], 1);
    assert_eq!(stats["daily"].as_array().unwrap().len(), 1);

    let (status, _) = t
        .get("/analytics/comments-daily-breakdown?date_from=2024-02-01&date_to=2024-01-01", None)
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, empty) = t
        .get("/analytics/comments-daily-breakdown?date_from=2000-01-01&date_to=2000-01-02", None)
        .await;
    assert_eq!(empty["total_comments"], 0);
    assert_eq!(t.state.db.comment_analytics(None, None).unwrap().total_comments, 2);
}
