use std::net::SocketAddr;

use axum::{middleware, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::rate_limit::rate_limit;
use crate::state::AppState;
use crate::{auth, campaigns, schools, updates, upload};

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn build_app(state: AppState) -> Router {
    let api = Router::new()
        .merge(auth::router())
        .merge(schools::router())
        .merge(campaigns::router())
        .merge(updates::router())
        .merge(upload::router());

    Router::new()
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .route("/health", get(health))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, ms, "response");
                        } else {
                            tracing::info!(%status, ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::auth::{claims::Role, jwt::JwtKeys};
    use crate::middleware::rate_limit::RateLimiter;
    use crate::storage::{MemoryStorage, StorageClient};

    const BOUNDARY: &str = "X-SCHOOLFUND-BOUNDARY";

    fn token(state: &AppState, uid: &str) -> String {
        JwtKeys::from_config(&state.config.jwt)
            .sign_access(uid, &format!("{uid}@school.org"), Role::User)
            .unwrap()
    }

    fn admin_token(state: &AppState, uid: &str) -> String {
        JwtKeys::from_config(&state.config.jwt)
            .sign_access(uid, &format!("{uid}@schoolfund.org"), Role::Admin)
            .unwrap()
    }

    fn json_request(method: Method, uri: &str, bearer: Option<&str>, body: Value) -> Request<Body> {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = bearer {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        req.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, bearer: Option<&str>) -> Request<Body> {
        let mut req = Request::builder().uri(uri);
        if let Some(t) = bearer {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        req.body(Body::empty()).unwrap()
    }

    fn multipart_request(uri: &str, bearer: &str, file_name: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn create_campaign(app: &Router, bearer: &str, name: &str) -> String {
        let (status, body) = send(
            app,
            json_request(
                Method::POST,
                "/api/campaigns",
                Some(bearer),
                json!({ "name": name, "goal": 500, "category": "stem" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = build_app(AppState::fake());
        let (status, body) = send(&app, get_request("/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn register_returns_user_role_token() {
        let state = AppState::fake();
        let keys = JwtKeys::from_config(&state.config.jwt);
        let app = build_app(state);

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/api/auth/register",
                None,
                json!({ "email": "Head@School.org", "password": "secret1", "displayName": "Head" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["email"], "head@school.org");

        let claims = keys.verify(body["token"].as_str().unwrap()).unwrap();
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.uid, body["user"]["uid"].as_str().unwrap());
    }

    #[tokio::test]
    async fn campaign_create_sets_server_fields() {
        let state = AppState::fake();
        let owner = token(&state, "school-a");
        let app = build_app(state);

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/api/campaigns",
                Some(&owner),
                json!({ "name": "Lab", "goal": 100, "schoolId": "someone-else", "amountRaised": 90 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["schoolId"], "school-a");
        assert_eq!(body["amountRaised"], 0.0);
        assert_eq!(body["status"], "active");
        assert_eq!(body["featured"], false);

        let (status, _) = send(
            &app,
            json_request(Method::POST, "/api/campaigns", Some(&owner), json!({ "name": "Lab", "goal": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn campaign_update_requires_owner() {
        let state = AppState::fake();
        let owner = token(&state, "school-a");
        let other = token(&state, "school-b");
        let app = build_app(state);
        let id = create_campaign(&app, &owner, "Library").await;
        let uri = format!("/api/campaigns/{id}");

        let (status, _) = send(
            &app,
            json_request(Method::PUT, &uri, Some(&other), json!({ "name": "Hijacked" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            json_request(Method::PUT, "/api/campaigns/missing", Some(&other), json!({ "name": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            json_request(
                Method::PUT,
                &uri,
                Some(&owner),
                json!({ "description": "Books for all", "schoolId": "school-b" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Library");
        assert_eq!(body["description"], "Books for all");
        assert_eq!(body["schoolId"], "school-a");

        let (status, _) = send(&app, json_request(Method::DELETE, &uri, Some(&other), Value::Null)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) = send(&app, json_request(Method::DELETE, &uri, Some(&owner), Value::Null)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], id.as_str());

        let (status, _) = send(&app, get_request(&uri, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn campaign_list_is_paginated_newest_first() {
        let state = AppState::fake();
        let owner = token(&state, "school-a");
        let app = build_app(state);
        for name in ["one", "two", "three"] {
            create_campaign(&app, &owner, name).await;
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let (status, body) = send(&app, get_request("/api/campaigns?limit=2&page=1", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["campaigns"][0]["name"], "three");
        assert_eq!(body["pagination"], json!({ "total": 3, "page": 1, "limit": 2, "pages": 2 }));

        let (_, body) = send(&app, get_request("/api/campaigns?limit=2&page=2", None)).await;
        assert_eq!(body["campaigns"].as_array().unwrap().len(), 1);
        assert_eq!(body["campaigns"][0]["name"], "one");

        let (_, body) = send(&app, get_request("/api/campaigns?status=draft", None)).await;
        assert_eq!(body["pagination"]["total"], 0);
        assert_eq!(body["pagination"]["pages"], 0);
    }

    #[tokio::test]
    async fn campaign_reads_are_populated_from_school() {
        let state = AppState::fake();
        let owner = token(&state, "school-a");
        let app = build_app(state);

        let (status, _) = send(
            &app,
            json_request(
                Method::POST,
                "/api/schools",
                Some(&owner),
                json!({ "schoolName": "Hill School", "city": "Accra", "country": "Ghana" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = create_campaign(&app, &owner, "Solar panels").await;

        let (status, body) = send(&app, get_request(&format!("/api/campaigns/{id}"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["location"], json!({ "city": "Accra", "country": "Ghana" }));
        assert_eq!(body["organizer"]["name"], "Anonymous");
    }

    #[tokio::test]
    async fn school_profile_is_owner_only() {
        let state = AppState::fake();
        let owner = token(&state, "school-a");
        let other = token(&state, "school-b");
        let app = build_app(state);

        let (status, _) = send(&app, get_request("/api/schools", Some(&owner))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        send(
            &app,
            json_request(Method::POST, "/api/schools", Some(&owner), json!({ "schoolName": "Hill" })),
        )
        .await;

        let (status, _) = send(
            &app,
            json_request(Method::PUT, "/api/schools/school-a", Some(&other), json!({ "city": "Kumasi" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            json_request(Method::PUT, "/api/schools", Some(&owner), json!({ "city": "Kumasi" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["schoolName"], "Hill");
        assert_eq!(body["city"], "Kumasi");

        let (status, _) = send(&app, get_request("/api/schools/all", Some(&owner))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn updates_crud_and_filters() {
        let state = AppState::fake();
        let owner = token(&state, "school-a");
        let other = token(&state, "school-b");
        let app = build_app(state);

        let (status, _) = send(
            &app,
            json_request(Method::POST, "/api/updates", Some(&owner), json!({ "title": " ", "content": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/api/updates",
                Some(&owner),
                json!({ "title": "New roof", "content": "Done", "campaignId": "c1" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "published");
        assert_eq!(body["schoolId"], "school-a");
        let uri = format!("/api/updates/{}", body["id"].as_str().unwrap());

        let (status, body) = send(&app, get_request("/api/updates?campaignId=c1", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["total"], 1);

        let (status, _) = send(
            &app,
            json_request(Method::PUT, &uri, Some(&other), json!({ "title": "Mine now" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            json_request(Method::PUT, &uri, Some(&owner), json!({ "status": "archived" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "archived");
        assert_eq!(body["title"], "New roof");

        let (status, _) = send(&app, json_request(Method::DELETE, &uri, Some(&owner), Value::Null)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, get_request(&uri, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rejected_upload_never_reaches_storage() {
        let storage = Arc::new(MemoryStorage::new("fake", "us-east-1"));
        let state = AppState::fake_with_storage(storage.clone());
        let user = token(&state, "school-a");
        let app = build_app(state);

        let (status, body) = send(
            &app,
            multipart_request("/api/upload", &user, "run.sh", "application/x-sh", b"#!/bin/sh"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");

        let big = vec![0u8; 5 * 1024 * 1024 + 1];
        let (status, _) = send(&app, multipart_request("/api/upload", &user, "big.png", "image/png", &big)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn uploaded_file_status_round_trip() {
        let storage = Arc::new(MemoryStorage::new("fake", "us-east-1"));
        let state = AppState::fake_with_storage(storage.clone());
        let user = token(&state, "school-a");
        let app = build_app(state);

        let (status, body) = send(
            &app,
            multipart_request("/api/upload", &user, "My Photo.png", "image/png", b"\x89PNG"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let key = body["key"].as_str().unwrap().to_string();
        assert!(key.starts_with("uploads/"));
        assert_eq!(body["url"], storage.public_url(&key));
        assert_eq!(storage.body(&key).as_deref(), Some(&b"\x89PNG"[..]));

        let (status, body) = send(&app, get_request(&format!("/api/upload/status?key={key}"), Some(&user))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["exists"], true);
        assert_eq!(body["size"], 4);

        storage.delete_object(&key).await.unwrap();
        let (_, body) = send(&app, get_request(&format!("/api/upload/status?key={key}"), Some(&user))).await;
        assert_eq!(body, json!({ "exists": false }));
    }

    #[tokio::test]
    async fn impact_report_is_attached_to_campaign() {
        let storage = Arc::new(MemoryStorage::new("fake", "us-east-1"));
        let state = AppState::fake_with_storage(storage.clone());
        let owner = token(&state, "school-a");
        let other = token(&state, "school-b");
        let app = build_app(state);
        let id = create_campaign(&app, &owner, "Clean water").await;
        let uri = format!("/api/campaigns/{id}/impact-report");

        let (status, _) = send(
            &app,
            multipart_request(&uri, &other, "report.pdf", "application/pdf", b"%PDF-1.4"),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(storage.len(), 0);

        let (status, body) = send(
            &app,
            multipart_request(&uri, &owner, "report.pdf", "application/pdf", b"%PDF-1.4"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let url = body["impactReport"]["url"].as_str().unwrap();
        assert!(url.contains(&format!("impact-reports/{id}/")));
        assert_eq!(body["impactReport"]["fileName"], "report.pdf");
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn requests_over_the_limit_get_429() {
        let mut state = AppState::fake();
        state.rate_limiter = Arc::new(RateLimiter::new(2, Duration::from_secs(60)));
        let app = build_app(state);

        for _ in 0..2 {
            let (status, _) = send(&app, get_request("/api/campaigns", None)).await;
            assert_eq!(status, StatusCode::OK);
        }
        let res = app.clone().oneshot(get_request("/api/campaigns", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(res.headers().contains_key(header::RETRY_AFTER));

        let (status, _) = send(&app, get_request("/health", None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn campaign_put_refreshes_updated_at_and_checks_status() {
        let state = AppState::fake();
        let owner = token(&state, "school-a");
        let app = build_app(state);
        let id = create_campaign(&app, &owner, "Garden").await;
        let uri = format!("/api/campaigns/{id}");
        let (_, before) = send(&app, get_request(&uri, None)).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        let (status, after) = send(
            &app,
            json_request(Method::PUT, &uri, Some(&owner), json!({ "status": "paused" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(after["status"], "paused");
        assert_eq!(after["createdAt"], before["createdAt"]);
        assert!(after["updatedAt"].as_str().unwrap() > before["updatedAt"].as_str().unwrap());

        let (status, _) = send(
            &app,
            json_request(Method::PUT, &uri, Some(&owner), json!({ "status": "finished" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_put_refreshes_updated_at() {
        let state = AppState::fake();
        let owner = token(&state, "school-a");
        let app = build_app(state);
        let (_, created) = send(
            &app,
            json_request(Method::POST, "/api/updates", Some(&owner), json!({ "title": "Hi", "content": "News" })),
        )
        .await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        let uri = format!("/api/updates/{}", created["id"].as_str().unwrap());
        let (status, body) = send(
            &app,
            json_request(Method::PUT, &uri, Some(&owner), json!({ "content": "More news", "schoolId": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["schoolId"], "school-a");
        assert!(body["updatedAt"].as_str().unwrap() > created["updatedAt"].as_str().unwrap());
    }

    #[tokio::test]
    async fn impact_report_accepts_files_above_the_default_body_limit() {
        let storage = Arc::new(MemoryStorage::new("fake", "us-east-1"));
        let state = AppState::fake_with_storage(storage.clone());
        let owner = token(&state, "school-a");
        let app = build_app(state);
        let id = create_campaign(&app, &owner, "Science fair").await;

        let report = vec![b'%'; 3 * 1024 * 1024];
        let (status, body) = send(
            &app,
            multipart_request(
                &format!("/api/campaigns/{id}/impact-report"),
                &owner,
                "annual.pdf",
                "application/pdf",
                &report,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["impactReport"]["fileName"], "annual.pdf");
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn deleting_uploads_is_admin_only() {
        let storage = Arc::new(MemoryStorage::new("fake", "us-east-1"));
        let state = AppState::fake_with_storage(storage.clone());
        let user = token(&state, "school-a");
        let admin = admin_token(&state, "ops");
        let app = build_app(state);

        let (_, body) = send(
            &app,
            multipart_request("/api/upload", &user, "logo.png", "image/png", b"\x89PNG"),
        )
        .await;
        let key = body["key"].as_str().unwrap().to_string();
        let uri = format!("/api/upload?key={key}");

        let (status, _) = send(&app, json_request(Method::DELETE, &uri, Some(&user), Value::Null)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(storage.len(), 1);

        let (status, body) = send(&app, json_request(Method::DELETE, &uri, Some(&admin), Value::Null)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["key"], key.as_str());
        assert!(storage.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn status_wait_polls_until_the_object_appears() {
        let storage = Arc::new(MemoryStorage::new("fake", "us-east-1"));
        let state = AppState::fake_with_storage(storage.clone());
        let user = token(&state, "school-a");
        let app = build_app(state);

        let writer = storage.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            writer
                .put_object("reports/17_late.pdf", bytes::Bytes::from_static(b"%PDF"), "application/pdf")
                .await
                .unwrap();
        });

        let (status, body) = send(
            &app,
            get_request("/api/upload/status?key=reports/17_late.pdf&wait=30", Some(&user)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["exists"], true);
        assert_eq!(body["fileName"], "late.pdf");

        let (_, body) = send(
            &app,
            get_request("/api/upload/status?key=reports/never.pdf&wait=5", Some(&user)),
        )
        .await;
        assert_eq!(body, json!({ "exists": false }));
    }

    #[tokio::test]
    async fn rate_limit_keys_on_forwarded_client_ip() {
        let mut state = AppState::fake();
        state.rate_limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(60)));
        let app = build_app(state);

        let forwarded = |ip: &str| {
            Request::builder()
                .uri("/api/campaigns")
                .header("x-forwarded-for", ip)
                .body(Body::empty())
                .unwrap()
        };

        let res = app.clone().oneshot(forwarded("203.0.113.7")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        // only the first hop counts
        let res = app.clone().oneshot(forwarded("203.0.113.7, 10.0.0.1")).await.unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        let res = app.clone().oneshot(forwarded("198.51.100.2")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn huge_page_numbers_return_an_empty_page() {
        let state = AppState::fake();
        let owner = token(&state, "school-a");
        let app = build_app(state);
        create_campaign(&app, &owner, "Books").await;

        let (status, body) = send(
            &app,
            get_request("/api/campaigns?page=1000000000000000000&limit=100", None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["campaigns"].as_array().unwrap().is_empty());
        assert_eq!(body["pagination"]["total"], 1);
    }
}
