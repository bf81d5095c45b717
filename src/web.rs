//! HTTP surface for the chirp microblog.
//!
//! axum router over the service layer. Markup is deliberately minimal:
//! the interesting behavior is in validation, sessions, and redirects,
//! not rendering. Validation failures re-render the page with inline
//! error text and status 200; unauthenticated access to a protected
//! action redirects to the login form with a same-origin `next` target.

use crate::auth::{login_destination, Principal};
use crate::error::ChirpError;
use crate::model::TweetView;
use crate::service::App;
use axum::{
    extract::{Form, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::error;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "chirp_session";

/// Shared application state. Database access is serialized behind one
/// lock; every operation is short, single-row-ish CRUD, so contention
/// is not a concern at this scale.
pub type SharedApp = Arc<Mutex<App>>;

/// Build the full route table.
pub fn router(app: SharedApp) -> Router {
    Router::new()
        .route("/", get(index_get).post(index_post))
        .route("/feed", get(feed_get))
        .route("/user/:username", get(profile_get))
        .route("/follow/:username", post(follow_post))
        .route("/unfollow/:username", post(unfollow_post))
        .route("/register", get(register_get).post(register_post))
        .route("/login", get(login_get).post(login_post))
        .route("/logout", get(logout_get))
        .with_state(app)
}

// =============================================================================
// Forms & queries
// =============================================================================

#[derive(Debug, Deserialize)]
struct PostForm {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct RegisterForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    password2: String,
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct NextQuery {
    next: Option<String>,
}

// =============================================================================
// Session plumbing
// =============================================================================

fn session_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

fn session_cookie(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax")
}

fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Max-Age=0")
}

async fn principal_for(app: &SharedApp, headers: &HeaderMap) -> Option<Principal> {
    let token = session_token(headers)?;
    let app = app.lock().await;
    match app.current_principal(&token) {
        Ok(principal) => principal,
        Err(e) => {
            error!("session lookup failed: {e}");
            None
        }
    }
}

fn redirect_to_login(next: &str) -> Response {
    let target = format!("/login?next={}", urlencode(next));
    Redirect::to(&target).into_response()
}

// =============================================================================
// Handlers
// =============================================================================

async fn index_get(State(app): State<SharedApp>, headers: HeaderMap) -> Response {
    let principal = principal_for(&app, &headers).await;
    let timeline = { app.lock().await.timeline() };
    match timeline {
        Ok(tweets) => timeline_page(principal.as_ref(), &tweets, None),
        Err(e) => internal_error(&e),
    }
}

async fn index_post(
    State(app): State<SharedApp>,
    headers: HeaderMap,
    Form(form): Form<PostForm>,
) -> Response {
    let Some(principal) = principal_for(&app, &headers).await else {
        return redirect_to_login("/");
    };

    let result = { app.lock().await.post(principal.user_id, &form.content) };
    match result {
        Ok(_) => Redirect::to("/").into_response(),
        Err(err @ ChirpError::Validation { .. }) => {
            let message = err.to_string();
            let timeline = { app.lock().await.timeline() };
            match timeline {
                Ok(tweets) => timeline_page(Some(&principal), &tweets, Some(&message)),
                Err(e) => internal_error(&e),
            }
        }
        Err(e) => internal_error(&e),
    }
}

async fn feed_get(State(app): State<SharedApp>, headers: HeaderMap) -> Response {
    let Some(principal) = principal_for(&app, &headers).await else {
        return redirect_to_login("/feed");
    };

    let feed = { app.lock().await.followed_timeline(principal.user_id) };
    match feed {
        Ok(tweets) => {
            let mut body = format!("<h2>Feed for {}</h2>", escape(&principal.username));
            body.push_str(&render_tweets(&tweets));
            page("Feed", Some(&principal), None, &body)
        }
        Err(e) => internal_error(&e),
    }
}

async fn profile_get(
    State(app): State<SharedApp>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> Response {
    let principal = principal_for(&app, &headers).await;

    let (profile, following) = {
        let app = app.lock().await;
        let profile = match app.profile(&username) {
            Ok(profile) => profile,
            Err(err @ ChirpError::NotFound { .. }) => return not_found(&err),
            Err(e) => return internal_error(&e),
        };
        let following = match &principal {
            Some(p) if p.username != username => {
                match app
                    .user_by_username(&username)
                    .and_then(|target| app.is_following(p.user_id, target.id))
                {
                    Ok(following) => Some(following),
                    Err(e) => return internal_error(&e),
                }
            }
            _ => None,
        };
        (profile, following)
    };

    let mut body = format!(
        "<h2>@{}</h2>\n<p>{} followers · {} following · joined {}</p>",
        escape(&profile.username),
        profile.followers_count,
        profile.following_count,
        profile.joined_at.format("%Y-%m-%d"),
    );

    match following {
        Some(true) => {
            body.push_str(&format!(
                "<form method=\"post\" action=\"/unfollow/{0}\"><button>Unfollow</button></form>",
                urlencode(&profile.username)
            ));
        }
        Some(false) => {
            body.push_str(&format!(
                "<form method=\"post\" action=\"/follow/{0}\"><button>Follow</button></form>",
                urlencode(&profile.username)
            ));
        }
        None => {}
    }

    body.push_str(&render_tweets(&profile.tweets));
    page(&profile.username, principal.as_ref(), None, &body)
}

async fn follow_post(
    State(app): State<SharedApp>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> Response {
    follow_action(&app, &headers, &username, true).await
}

async fn unfollow_post(
    State(app): State<SharedApp>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> Response {
    follow_action(&app, &headers, &username, false).await
}

async fn follow_action(
    app: &SharedApp,
    headers: &HeaderMap,
    username: &str,
    follow: bool,
) -> Response {
    // The segment comes path-decoded; re-encode it before it goes back
    // into a Location header.
    let profile_path = format!("/user/{}", urlencode(username));
    let Some(principal) = principal_for(app, headers).await else {
        return redirect_to_login(&profile_path);
    };

    let result = {
        let app = app.lock().await;
        app.user_by_username(username).and_then(|target| {
            if follow {
                app.follow(principal.user_id, target.id)
            } else {
                app.unfollow(principal.user_id, target.id)
            }
        })
    };

    match result {
        Ok(()) => Redirect::to(&profile_path).into_response(),
        Err(err @ ChirpError::NotFound { .. }) => not_found(&err),
        Err(err @ ChirpError::SelfFollow) => {
            let body = format!("<p class=\"error\">{}</p>", escape(&err.to_string()));
            page("Error", Some(&principal), None, &body)
        }
        Err(e) => internal_error(&e),
    }
}

async fn register_get(State(app): State<SharedApp>, headers: HeaderMap) -> Response {
    if principal_for(&app, &headers).await.is_some() {
        return Redirect::to("/").into_response();
    }
    register_page(None, &RegisterForm::default())
}

async fn register_post(
    State(app): State<SharedApp>,
    headers: HeaderMap,
    Form(form): Form<RegisterForm>,
) -> Response {
    if principal_for(&app, &headers).await.is_some() {
        return Redirect::to("/").into_response();
    }

    let request = crate::service::RegisterRequest {
        username: form.username.clone(),
        email: form.email.clone(),
        password: form.password.clone(),
        confirm: form.password2.clone(),
    };

    let result = { app.lock().await.register(&request) };
    match result {
        Ok(_) => Redirect::to("/login").into_response(),
        Err(err) if err.is_recoverable() => register_page(Some(&err.to_string()), &form),
        Err(e) => internal_error(&e),
    }
}

async fn login_get(State(app): State<SharedApp>, headers: HeaderMap) -> Response {
    if principal_for(&app, &headers).await.is_some() {
        return Redirect::to("/").into_response();
    }
    login_page(None)
}

async fn login_post(
    State(app): State<SharedApp>,
    headers: HeaderMap,
    Query(query): Query<NextQuery>,
    Form(form): Form<LoginForm>,
) -> Response {
    if principal_for(&app, &headers).await.is_some() {
        return Redirect::to("/").into_response();
    }

    let result = { app.lock().await.login(&form.username, &form.password) };
    match result {
        Ok(token) => {
            let destination = login_destination(query.next.as_deref()).to_string();
            (
                [(header::SET_COOKIE, session_cookie(&token))],
                Redirect::to(&destination),
            )
                .into_response()
        }
        Err(err @ ChirpError::InvalidCredentials) => login_page(Some(&err.to_string())),
        Err(e) => internal_error(&e),
    }
}

async fn logout_get(State(app): State<SharedApp>, headers: HeaderMap) -> Response {
    let Some(token) = session_token(&headers) else {
        return redirect_to_login("/");
    };
    if principal_for(&app, &headers).await.is_none() {
        return redirect_to_login("/");
    }

    let result = { app.lock().await.logout(&token) };
    match result {
        Ok(()) => (
            [(header::SET_COOKIE, clear_session_cookie())],
            Redirect::to("/"),
        )
            .into_response(),
        Err(e) => internal_error(&e),
    }
}

// =============================================================================
// Rendering
// =============================================================================

/// Escape text for inclusion in HTML.
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Percent-encode a path for use in a query parameter.
fn urlencode(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn page(title: &str, principal: Option<&Principal>, message: Option<&str>, body: &str) -> Response {
    let nav = principal.map_or_else(
        || "<a href=\"/login\">Log in</a> · <a href=\"/register\">Register</a>".to_string(),
        |p| {
            format!(
                "Hello, {}! · <a href=\"/feed\">Feed</a> · <a href=\"/logout\">Log out</a>",
                escape(&p.username)
            )
        },
    );
    let message = message.map_or_else(String::new, |m| {
        format!("<p class=\"error\">{}</p>", escape(m))
    });

    Html(format!(
        "<!doctype html>\n<html><head><title>{} - chirp</title></head>\n\
         <body>\n<h1><a href=\"/\">chirp</a></h1>\n<nav>{nav}</nav>\n{message}\n{body}\n</body></html>",
        escape(title)
    ))
    .into_response()
}

fn render_tweets(tweets: &[TweetView]) -> String {
    if tweets.is_empty() {
        return "<p>No tweets yet.</p>".to_string();
    }

    let mut out = String::from("<ul class=\"timeline\">\n");
    for tweet in tweets {
        out.push_str(&format!(
            "<li><a href=\"/user/{0}\">@{1}</a>: {2} <small>{3}</small></li>\n",
            urlencode(&tweet.username),
            escape(&tweet.username),
            escape(&tweet.content),
            crate::format_relative_date(tweet.created_at),
        ));
    }
    out.push_str("</ul>");
    out
}

fn timeline_page(
    principal: Option<&Principal>,
    tweets: &[TweetView],
    message: Option<&str>,
) -> Response {
    let mut body = String::new();
    if principal.is_some() {
        body.push_str(
            "<form method=\"post\" action=\"/\">\
             <textarea name=\"content\" maxlength=\"280\"></textarea>\
             <button>Post</button></form>\n",
        );
    }
    body.push_str("<h2>Timeline</h2>\n");
    body.push_str(&render_tweets(tweets));
    page("Timeline", principal, message, &body)
}

fn register_page(message: Option<&str>, form: &RegisterForm) -> Response {
    let body = format!(
        "<h2>Register</h2>\n\
         <form method=\"post\" action=\"/register\">\
         <input name=\"username\" value=\"{}\" placeholder=\"username\">\
         <input name=\"email\" value=\"{}\" placeholder=\"email\">\
         <input name=\"password\" type=\"password\" placeholder=\"password\">\
         <input name=\"password2\" type=\"password\" placeholder=\"repeat password\">\
         <button>Register</button></form>",
        escape(&form.username),
        escape(&form.email),
    );
    page("Register", None, message, &body)
}

fn login_page(message: Option<&str>) -> Response {
    let body = "<h2>Log in</h2>\n\
         <form method=\"post\">\
         <input name=\"username\" placeholder=\"username\">\
         <input name=\"password\" type=\"password\" placeholder=\"password\">\
         <button>Log in</button></form>"
        .to_string();
    page("Log in", None, message, &body)
}

fn not_found(err: &ChirpError) -> Response {
    (
        StatusCode::NOT_FOUND,
        Html(format!(
            "<!doctype html><html><body><h1>404</h1><p>{}</p></body></html>",
            escape(&err.to_string())
        )),
    )
        .into_response()
}

fn internal_error(err: &ChirpError) -> Response {
    error!("request failed: {err}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html("<!doctype html><html><body><h1>500</h1><p>Something went wrong.</p></body></html>"),
    )
        .into_response()
}
