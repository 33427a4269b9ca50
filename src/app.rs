use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::security::{authorize, cors_layer};
use crate::state::AppState;
use crate::{auth, users};

pub fn build_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors);

    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(users::router())
                .route("/health", get(|| async { "ok" })),
        )
        .layer(middleware::from_fn_with_state(state.clone(), authorize))
        .with_state(state)
        .layer(cors)
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
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        auth::{
            claims::{Claims, TokenKind},
            password::hash_password,
        },
        users::{
            memory::MemoryUserRepository,
            repo::UserRepository,
            repo_types::{NewUser, Role},
        },
    };

    async fn app_with_admin() -> Router {
        let repo = Arc::new(MemoryUserRepository::new());
        repo.create(NewUser {
            username: "admin".into(),
            email: "admin@example.com".into(),
            password_hash: hash_password("admin-pass-1").unwrap(),
            role: Role::Admin,
        })
        .await
        .unwrap();
        build_app(AppState::fake(repo))
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn json_req(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut b = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = token {
            b = b.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        b.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut b = Request::builder().uri(uri);
        if let Some(t) = token {
            b = b.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        b.body(Body::empty()).unwrap()
    }

    async fn login(app: &Router, username: &str, password: &str) -> Value {
        let (status, body) = send(
            app,
            json_req(
                Method::POST,
                "/api/auth/login",
                None,
                json!({ "username": username, "password": password }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body
    }

    async fn register(app: &Router, username: &str, role: &str) -> Value {
        let (status, body) = send(
            app,
            json_req(
                Method::POST,
                "/api/auth/register",
                None,
                json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": "password123",
                    "role": role,
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        body
    }

    fn token(body: &Value) -> String {
        body["accessToken"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = app_with_admin().await;
        let resp = app.clone().oneshot(get("/api/health", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_route_requires_token() {
        let app = app_with_admin().await;
        let (status, body) = send(&app, get("/api/users/me", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Authentication required");

        let (status, _) = send(&app, get("/api/users/me", Some("garbage"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn register_then_me() {
        let app = app_with_admin().await;
        let body = register(&app, "jane", "USER").await;
        assert_eq!(body["tokenType"], "Bearer");
        assert_eq!(body["user"]["role"], "USER");

        let (status, me) = send(&app, get("/api/users/me", Some(&token(&body)))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["username"], "jane");
        assert_eq!(me["isActive"], true);
    }

    #[tokio::test]
    async fn login_with_bad_password_is_401() {
        let app = app_with_admin().await;
        let (status, body) = send(
            &app,
            json_req(
                Method::POST,
                "/api/auth/login",
                None,
                json!({ "username": "admin", "password": "nope-nope" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid credentials");
    }

    #[tokio::test]
    async fn admin_routes_require_admin_role() {
        let app = app_with_admin().await;
        let user = register(&app, "jane", "USER").await;

        let (status, _) = send(&app, get("/api/admin/users", Some(&token(&user)))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let admin = login(&app, "admin@example.com", "admin-pass-1").await;
        let (status, list) = send(&app, get("/api/admin/users", Some(&token(&admin)))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 2);

        let (status, list) =
            send(&app, get("/api/admin/users?role=admin", Some(&token(&admin)))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list[0]["username"], "admin");

        let (status, _) =
            send(&app, get("/api/admin/users?role=wizard", Some(&token(&admin)))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn admin_updates_and_deletes_users() {
        let app = app_with_admin().await;
        let coach = register(&app, "coach", "TRAINER").await;
        let id = coach["user"]["id"].as_i64().unwrap();
        let admin = token(&login(&app, "admin", "admin-pass-1").await);

        let (status, trainers) = send(&app, get("/api/users/trainers", Some(&admin))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(trainers.as_array().unwrap().len(), 1);

        let (status, updated) = send(
            &app,
            json_req(
                Method::PUT,
                &format!("/api/admin/users/{id}"),
                Some(&admin),
                json!({ "isActive": false }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["isActive"], false);
        assert_eq!(updated["username"], "coach");

        let (_, trainers) = send(&app, get("/api/users/trainers", Some(&admin))).await;
        assert!(trainers.as_array().unwrap().is_empty());

        let req = Request::builder()
            .method(Method::DELETE)
            .uri(format!("/api/admin/users/{id}"))
            .header(header::AUTHORIZATION, format!("Bearer {admin}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&app, get(&format!("/api/users/{id}"), Some(&admin))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], format!("User not found with id: {id}"));
    }

    #[tokio::test]
    async fn lookup_by_username_or_email() {
        let app = app_with_admin().await;
        let jane = register(&app, "jane", "USER").await;
        let t = token(&jane);
        let id = jane["user"]["id"].as_i64().unwrap();

        let (status, body) =
            send(&app, get("/api/users/lookup?username=jane@example.com", Some(&t))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], id);

        let (status, _) = send(&app, get("/api/users/lookup?username=ghost", Some(&t))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn role_rules_for_unrouted_paths() {
        let app = app_with_admin().await;
        let coach = token(&register(&app, "coach", "TRAINER").await);
        let jane = token(&register(&app, "jane", "USER").await);

        // Authorization passes, then there is no handler.
        let (status, _) = send(&app, get("/api/gym/programs/new", Some(&coach))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, get("/api/gym/programs/new", Some(&jane))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&app, get("/api/nutrition/plans/4/edit", Some(&coach))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, get("/nowhere", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, get("/api/blog/posts/1", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn refresh_issues_new_pair_but_is_not_a_bearer() {
        let app = app_with_admin().await;
        let body = register(&app, "jane", "USER").await;
        let refresh = body["refreshToken"].as_str().unwrap().to_string();

        let (status, _) = send(&app, get("/api/users/me", Some(&refresh))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, renewed) = send(
            &app,
            json_req(
                Method::POST,
                "/api/auth/refresh",
                None,
                json!({ "refreshToken": refresh }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, get("/api/users/me", Some(&token(&renewed)))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            json_req(
                Method::POST,
                "/api/auth/refresh",
                None,
                json!({ "refreshToken": token(&body) }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn self_registering_admin_is_forbidden() {
        let app = app_with_admin().await;
        let (status, _) = send(
            &app,
            json_req(
                Method::POST,
                "/api/auth/register",
                None,
                json!({
                    "username": "mallory",
                    "email": "mallory@example.com",
                    "password": "password123",
                    "role": "ADMIN",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn cors_preflight_skips_auth() {
        let app = app_with_admin().await;
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/users/me")
            .header(header::ORIGIN, "http://localhost:3000")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "http://localhost:3000"
        );
        assert_eq!(
            resp.headers()
                .get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
                .unwrap(),
            "true"
        );
    }

    fn refresh_req(refresh: &str) -> Request<Body> {
        json_req(
            Method::POST,
            "/api/auth/refresh",
            None,
            json!({ "refreshToken": refresh }),
        )
    }

    #[tokio::test]
    async fn expired_access_token_is_rejected() {
        let app = app_with_admin().await;
        let jane = register(&app, "jane", "USER").await;
        let now = time::OffsetDateTime::now_utc().unix_timestamp() as usize;
        // Past the default 60s validation leeway.
        let claims = Claims {
            sub: jane["user"]["id"].as_i64().unwrap(),
            email: "jane@example.com".into(),
            role: Role::User,
            iat: now - 3600,
            exp: now - 600,
            iss: "test-issuer".into(),
            aud: "test-aud".into(),
            kind: TokenKind::Access,
        };
        let expired = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(b"test"),
        )
        .unwrap();

        let (status, body) = send(&app, get("/api/users/me", Some(&expired))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid or expired token");

        let (status, _) = send(&app, get("/api/users/me", Some(&token(&jane)))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn refresh_fails_after_deactivation() {
        let app = app_with_admin().await;
        let jane = register(&app, "jane", "USER").await;
        let id = jane["user"]["id"].as_i64().unwrap();
        let refresh = jane["refreshToken"].as_str().unwrap().to_string();
        let admin = token(&login(&app, "admin", "admin-pass-1").await);

        let (status, _) = send(
            &app,
            json_req(
                Method::PUT,
                &format!("/api/admin/users/{id}"),
                Some(&admin),
                json!({ "isActive": false }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, refresh_req(&refresh)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], 401);
    }

    #[tokio::test]
    async fn refresh_fails_after_deletion() {
        let app = app_with_admin().await;
        let jane = register(&app, "jane", "USER").await;
        let id = jane["user"]["id"].as_i64().unwrap();
        let refresh = jane["refreshToken"].as_str().unwrap().to_string();
        let admin = token(&login(&app, "admin", "admin-pass-1").await);

        let req = Request::builder()
            .method(Method::DELETE)
            .uri(format!("/api/admin/users/{id}"))
            .header(header::AUTHORIZATION, format!("Bearer {admin}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, refresh_req(&refresh)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn exact_lookup_matches_username_only() {
        let app = app_with_admin().await;
        let jane = register(&app, "jane", "USER").await;
        let t = token(&jane);
        let id = jane["user"]["id"].as_i64().unwrap();

        let (status, body) =
            send(&app, get("/api/users/lookup?username=jane&exact=true", Some(&t))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], id);

        let (status, body) = send(
            &app,
            get("/api/users/lookup?username=jane@example.com&exact=true", Some(&t)),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "User not found: jane@example.com");
    }

    #[tokio::test]
    async fn malformed_input_gets_json_400() {
        let app = app_with_admin().await;
        let admin = token(&login(&app, "admin", "admin-pass-1").await);

        let (status, body) = send(&app, get("/api/users/abc", Some(&admin))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);
        assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));

        let (status, body) =
            send(&app, get("/api/users/lookup?exact=true", Some(&admin))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());

        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"username\": \"admin\""))
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());

        let (status, body) = send(
            &app,
            json_req(
                Method::PUT,
                "/api/admin/users/1",
                Some(&admin),
                json!({ "isActive": "nope" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);
    }
}
