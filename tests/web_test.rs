//! HTTP-level tests that drive the router directly, no listener.

use axum::body::Body;
use axum::Router;
use http::header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::ServiceExt;

use chirp::service::{App, RegisterRequest};
use chirp::storage::Storage;
use chirp::web::{self, SharedApp};

fn test_router() -> (Router, SharedApp) {
    let storage = Storage::open_memory().unwrap();
    let app: SharedApp = Arc::new(Mutex::new(App::new(storage)));
    (web::router(app.clone()), app)
}

async fn register(app: &SharedApp, username: &str, password: &str) {
    let app = app.lock().await;
    app.register(&RegisterRequest {
        username: username.to_string(),
        email: format!("{username}@example.com"),
        password: password.to_string(),
        confirm: password.to_string(),
    })
    .unwrap();
}

/// Log in over HTTP and return the session cookie pair.
async fn login(router: &Router, username: &str, password: &str) -> String {
    let resp = router
        .clone()
        .oneshot(form_post(
            "/login",
            &format!("username={username}&password={password}"),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let cookie = resp
        .headers()
        .get(SET_COOKIE)
        .expect("login should set a session cookie")
        .to_str()
        .unwrap();
    cookie.split(';').next().unwrap().to_string()
}

fn form_post(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_text(resp: axum::response::Response) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(resp: &axum::response::Response) -> &str {
    resp.headers().get(LOCATION).unwrap().to_str().unwrap()
}

#[tokio::test]
async fn index_renders_for_anonymous_visitors() {
    let (router, _app) = test_router();
    let resp = router.oneshot(get("/", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    assert!(body.contains("Log in"));
    assert!(body.contains("Register"));
}

#[tokio::test]
async fn register_then_login_sets_session_cookie() {
    let (router, _app) = test_router();

    let resp = router
        .clone()
        .oneshot(form_post(
            "/register",
            "username=alice&email=alice%40example.com&password=pw&password2=pw",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/login");

    let cookie = login(&router, "alice", "pw").await;
    assert!(cookie.starts_with("chirp_session="));
}

#[tokio::test]
async fn login_with_wrong_password_gives_generic_error() {
    let (router, app) = test_router();
    register(&app, "alice", "pw").await;

    let resp = router
        .oneshot(form_post("/login", "username=alice&password=wrong", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    assert!(body.contains("Invalid username or password"));
    // Must not disclose which half was wrong.
    assert!(!body.contains("password was wrong"));
}

#[tokio::test]
async fn posting_requires_a_session() {
    let (router, _app) = test_router();
    let resp = router
        .oneshot(form_post("/", "content=hello", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(location(&resp).starts_with("/login"));
}

#[tokio::test]
async fn posted_tweet_shows_up_on_the_index() {
    let (router, app) = test_router();
    register(&app, "alice", "pw").await;
    let cookie = login(&router, "alice", "pw").await;

    let resp = router
        .clone()
        .oneshot(form_post("/", "content=hello+world", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let body = body_text(router.oneshot(get("/", None)).await.unwrap()).await;
    assert!(body.contains("hello world"));
    assert!(body.contains("alice"));
}

#[tokio::test]
async fn empty_tweet_is_rejected_inline() {
    let (router, app) = test_router();
    register(&app, "alice", "pw").await;
    let cookie = login(&router, "alice", "pw").await;

    let resp = router
        .oneshot(form_post("/", "content=+++", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    assert!(body.contains("empty"));
}

#[tokio::test]
async fn tweet_content_is_html_escaped() {
    let (router, app) = test_router();
    register(&app, "alice", "pw").await;
    let cookie = login(&router, "alice", "pw").await;

    router
        .clone()
        .oneshot(form_post(
            "/",
            "content=%3Cscript%3Ealert(1)%3C%2Fscript%3E",
            Some(&cookie),
        ))
        .await
        .unwrap();

    let body = body_text(router.oneshot(get("/", None)).await.unwrap()).await;
    assert!(!body.contains("<script>alert(1)</script>"));
    assert!(body.contains("&lt;script&gt;"));
}

#[tokio::test]
async fn hostile_username_is_rejected_at_registration() {
    let (router, _app) = test_router();

    // Control characters in a username would otherwise end up in a
    // Location header later.
    let resp = router
        .oneshot(form_post(
            "/register",
            "username=a%0Ab&email=a%40example.com&password=pw&password2=pw",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    assert!(body.contains("Username may only contain"));
}

#[tokio::test]
async fn follow_path_with_control_chars_is_a_clean_404() {
    let (router, app) = test_router();
    register(&app, "alice", "pw").await;
    let cookie = login(&router, "alice", "pw").await;

    // Must produce a response, never a panic in redirect construction.
    let resp = router
        .clone()
        .oneshot(form_post("/follow/a%0Ab", "", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Unauthenticated hit on the same path redirects with the segment
    // re-encoded.
    let resp = router
        .oneshot(form_post("/follow/a%0Ab", "", None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(!location(&resp).contains('\n'));
}

#[tokio::test]
async fn unknown_profile_is_404() {
    let (router, _app) = test_router();
    let resp = router.oneshot(get("/user/nobody", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn follow_and_unfollow_round_trip() {
    let (router, app) = test_router();
    register(&app, "alice", "pw").await;
    register(&app, "bob", "pw").await;
    let cookie = login(&router, "alice", "pw").await;

    let resp = router
        .clone()
        .oneshot(form_post("/follow/bob", "", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/user/bob");

    {
        let app = app.lock().await;
        let alice = app.user_by_username("alice").unwrap();
        let bob = app.user_by_username("bob").unwrap();
        assert!(app.is_following(alice.id, bob.id).unwrap());
    }

    let resp = router
        .clone()
        .oneshot(form_post("/unfollow/bob", "", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let app = app.lock().await;
    let alice = app.user_by_username("alice").unwrap();
    let bob = app.user_by_username("bob").unwrap();
    assert!(!app.is_following(alice.id, bob.id).unwrap());
}

#[tokio::test]
async fn following_yourself_is_rejected() {
    let (router, app) = test_router();
    register(&app, "alice", "pw").await;
    let cookie = login(&router, "alice", "pw").await;

    let resp = router
        .oneshot(form_post("/follow/alice", "", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_text(resp).await;
    assert!(body.contains("yourself"));
}

#[tokio::test]
async fn feed_requires_login() {
    let (router, _app) = test_router();
    let resp = router.oneshot(get("/feed", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(location(&resp).starts_with("/login"));
}

#[tokio::test]
async fn login_next_rejects_external_targets() {
    let (router, app) = test_router();
    register(&app, "alice", "pw").await;

    let resp = router
        .oneshot(form_post(
            "/login?next=https%3A%2F%2Fevil.example",
            "username=alice&password=pw",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");
}

#[tokio::test]
async fn logged_in_login_post_redirects_home_without_new_session() {
    let (router, app) = test_router();
    register(&app, "alice", "pw").await;
    let cookie = login(&router, "alice", "pw").await;

    let resp = router
        .oneshot(form_post(
            "/login",
            "username=alice&password=pw",
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");
    assert!(resp.headers().get(SET_COOKIE).is_none());
}

#[tokio::test]
async fn logout_invalidates_the_session() {
    let (router, app) = test_router();
    register(&app, "alice", "pw").await;
    let cookie = login(&router, "alice", "pw").await;

    let resp = router
        .clone()
        .oneshot(get("/logout", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    // Old token no longer authenticates.
    let resp = router.oneshot(get("/feed", Some(&cookie))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(location(&resp).starts_with("/login"));
}
