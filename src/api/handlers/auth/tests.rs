use super::*;
use crate::api::app;
use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    extract::connect_info::MockConnectInfo,
    http::{
        header::{AUTHORIZATION, CACHE_CONTROL, COOKIE, LOCATION, RETRY_AFTER, SET_COOKIE},
        Request, StatusCode,
    },
    response::Response,
    Router,
};
use base64ct::{Base64, Encoding};
use serde_json::{json, Value};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const PASSWORD: &str = "correct horse";

struct TestApp {
    directory: Arc<StaticDirectory>,
    state: Arc<AuthState>,
    router: Router,
}

fn peer() -> SocketAddr {
    SocketAddr::from(([203, 0, 113, 7], 40000))
}

fn test_app(users: &[&str]) -> Result<TestApp> {
    test_app_with_config(users, AuthConfig::new())
}

fn test_app_with_config(users: &[&str], config: AuthConfig) -> Result<TestApp> {
    let directory = Arc::new(StaticDirectory::new()?);
    for user in users {
        directory.add_user(user, &hash_password(PASSWORD)?)?;
    }
    let limiter = Arc::new(BackoffRateLimiter::new(
        4,
        Duration::from_secs(30),
        Duration::from_secs(300),
    ));
    let authenticator = Authenticator::new(config, limiter, directory.clone());
    let state = Arc::new(AuthState::new(
        authenticator,
        PublicResources::new(Vec::<String>::new())?,
        TrustedProxies::parse(DEFAULT_TRUSTED_PROXIES)?,
    ));
    let router = app(state.clone(), Duration::from_secs(10)).layer(MockConnectInfo(peer()));
    Ok(TestApp {
        directory,
        state,
        router,
    })
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> Result<Response> {
        Ok(self.router.clone().oneshot(request).await?)
    }

    async fn login(&self, password: &str, forwarded_for: Option<&str>) -> Result<Response> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/control/login")
            .header("content-type", "application/json");
        if let Some(forwarded_for) = forwarded_for {
            builder = builder.header("x-forwarded-for", forwarded_for);
        }
        let body = json!({ "name": "admin", "password": password }).to_string();
        self.send(builder.body(Body::from(body))?).await
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Result<Response> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        self.send(builder.body(Body::empty())?).await
    }
}

async fn body_text(response: Response) -> Result<String> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(String::from_utf8(bytes.to_vec())?)
}

/// `name=value` part of the response's session cookie.
fn session_cookie_pair(response: &Response) -> Option<String> {
    let cookie = response.headers().get(SET_COOKIE)?.to_str().ok()?;
    cookie.split(';').next().map(str::to_string)
}

fn location(response: &Response) -> Option<&str> {
    response.headers().get(LOCATION)?.to_str().ok()
}

#[tokio::test]
async fn login_sets_cookie_and_profile_reports_user() -> Result<()> {
    let app = test_app(&["admin"])?;

    let response = app.login(PASSWORD, None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok()),
        Some("no-store, no-cache, must-revalidate, proxy-revalidate")
    );
    assert!(response.headers().contains_key("x-request-id"));
    let cookie = session_cookie_pair(&response).ok_or_else(|| anyhow::anyhow!("no cookie"))?;
    assert!(cookie.starts_with("warden_session="));

    let response = app.get("/control/profile", Some(&cookie)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let profile: Value = serde_json::from_str(&body_text(response).await?)?;
    assert_eq!(profile, json!({ "name": "admin" }));

    // Logged in users are sent away from the login page.
    let response = app.get(LOGIN_PAGE, Some(&cookie)).await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), Some(LANDING_PAGE));
    Ok(())
}

#[tokio::test]
async fn repeated_failures_are_rate_limited() -> Result<()> {
    let app = test_app(&["admin"])?;

    for _ in 0..4 {
        let response = app.login("wrong", None).await?;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_text(response).await?, INVALID_LOGIN_MESSAGE);
    }

    let response = app.login("wrong", None).await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok()),
        Some("30")
    );

    // The block does not care whether the password is right.
    let response = app.login(PASSWORD, None).await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().get(SET_COOKIE).is_none());
    Ok(())
}

#[tokio::test]
async fn unknown_user_and_wrong_password_look_identical() -> Result<()> {
    let app = test_app(&["admin"])?;

    let wrong_password = app.login("wrong", None).await?;
    let status = wrong_password.status();
    let wrong_password = body_text(wrong_password).await?;

    let request = Request::builder()
        .method("POST")
        .uri("/control/login")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "name": "nobody", "password": "wrong" }).to_string(),
        ))?;
    let unknown_user = app.send(request).await?;
    assert_eq!(unknown_user.status(), status);
    assert_eq!(body_text(unknown_user).await?, wrong_password);
    Ok(())
}

#[tokio::test]
async fn forged_forwarded_for_from_untrusted_peer_is_ignored() -> Result<()> {
    let app = test_app(&["admin"])?;

    // Rotating forged addresses must not reset the counter for the real peer.
    for i in 0..4 {
        let forged = format!("198.51.100.{i}");
        let response = app.login("wrong", Some(&forged)).await?;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
    let response = app.login("wrong", Some("198.51.100.99")).await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let limiter = app.state.authenticator().rate_limiter();
    assert!(limiter.check(peer().ip()) > Duration::ZERO);
    assert_eq!(
        limiter.check(IpAddr::from([198, 51, 100, 0])),
        Duration::ZERO
    );
    Ok(())
}

#[tokio::test]
async fn logout_is_idempotent_and_revokes() -> Result<()> {
    let app = test_app(&["admin"])?;
    let response = app.login(PASSWORD, None).await?;
    let cookie = session_cookie_pair(&response).ok_or_else(|| anyhow::anyhow!("no cookie"))?;

    for _ in 0..2 {
        let response = app.get("/control/logout", Some(&cookie)).await?;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), Some(LOGIN_PAGE));
        let cleared = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert!(cleared.contains("Max-Age=0"));
    }

    let response = app.get("/control/profile", Some(&cookie)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // No cookie at all still redirects.
    let response = app.get("/control/logout", None).await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(app.state.authenticator().sessions().is_empty());
    Ok(())
}

#[tokio::test]
async fn bootstrap_then_first_user_enforces_auth() -> Result<()> {
    let app = test_app(&[])?;

    let response = app.get("/control/profile", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let profile: Value = serde_json::from_str(&body_text(response).await?)?;
    assert_eq!(profile, json!({ "name": "" }));

    app.directory.add_user("admin", &hash_password(PASSWORD)?)?;

    let response = app.get("/control/profile", None).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await?, "Forbidden");

    let response = app.get("/", None).await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), Some(LOGIN_PAGE));

    let response = app.get("/index.html", None).await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    Ok(())
}

#[tokio::test]
async fn public_paths_and_basic_auth() -> Result<()> {
    let app = test_app(&["admin"])?;

    let response = app.get("/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let health: Value = serde_json::from_str(&body_text(response).await?)?;
    assert_eq!(health["auth"], "enforced");
    // Public callers must not learn anything about live sessions.
    app.login(PASSWORD, None).await?;
    let response = app.get("/health", None).await?;
    let health: Value = serde_json::from_str(&body_text(response).await?)?;
    assert!(health.get("sessions").is_none());

    let response = app.get(LOGIN_PAGE, None).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let encoded = Base64::encode_string(format!("admin:{PASSWORD}").as_bytes());
    let request = Request::builder()
        .uri("/control/profile")
        .header(AUTHORIZATION, format!("Basic {encoded}"))
        .body(Body::empty())?;
    let response = app.send(request).await?;
    assert_eq!(response.status(), StatusCode::OK);

    // Unknown paths are gated like any other protected path.
    let response = app.get("/control/missing", None).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn malformed_login_body_is_bad_request() -> Result<()> {
    let app = test_app(&["admin"])?;
    let request = Request::builder()
        .method("POST")
        .uri("/control/login")
        .header("content-type", "application/json")
        .body(Body::from("{\"name\":"))?;
    let response = app.send(request).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn login_without_peer_address_is_bad_request() -> Result<()> {
    let app = test_app(&["admin"])?;
    // Bypass MockConnectInfo so no peer address is known.
    let router = crate::api::app(app.state.clone(), Duration::from_secs(10));
    let request = Request::builder()
        .method("POST")
        .uri("/control/login")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "name": "admin", "password": PASSWORD }).to_string(),
        ))?;
    let response = router.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn oversized_session_ttl_still_answers_login() -> Result<()> {
    let config = AuthConfig::new().with_session_ttl(Duration::from_secs(u64::MAX));
    let app = test_app_with_config(&["admin"], config)?;

    let response = app.login(PASSWORD, None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie_pair(&response);
    assert!(cookie.is_some());

    let response = app.get("/control/profile", cookie.as_deref()).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}
