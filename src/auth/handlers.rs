use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{
            AuthResponse, ChangePasswordRequest, ForgotPasswordRequest, ForgotPasswordResponse,
            LoginRequest, MessageResponse, RegisterRequest, ResetPasswordRequest,
        },
        extractors::{CurrentUser, OptionalUser},
        repo_types::PublicUser,
        services::{self, Session},
    },
    config::AppConfig,
    error::AppResult,
    extract::AppJson,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/forgotpassword", post(forgot_password))
        .route("/auth/resetpassword", post(reset_password))
        .route("/auth/changepassword", post(change_password))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(get_me))
}

fn session_cookie(token: &str, config: &AppConfig) -> String {
    let max_age = config.jwt.session_ttl_minutes.max(0) * 60;
    let secure = if config.auth.cookie_secure { "; Secure" } else { "" };
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
        config.auth.cookie_name, token, max_age, secure
    )
}

fn cleared_cookie(config: &AppConfig) -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        config.auth.cookie_name
    )
}

fn session_response(status: StatusCode, session: Session, config: &AppConfig) -> Response {
    let cookie = session_cookie(&session.token, config);
    (
        status,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            token: session.token,
            user: session.user,
        }),
    )
        .into_response()
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> AppResult<Response> {
    let session =
        services::register(&state, &payload.name, &payload.email, &payload.password).await?;
    Ok(session_response(StatusCode::CREATED, session, &state.config))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<Response> {
    let session = services::login(&state, &payload.email, &payload.password).await?;
    Ok(session_response(StatusCode::OK, session, &state.config))
}

/// Clears the cookie. Tokens are stateless: one already copied by the client stays
/// valid until it expires.
#[instrument(skip(state, caller))]
pub async fn logout(State(state): State<AppState>, caller: OptionalUser) -> Response {
    if let OptionalUser(Some(user)) = &caller {
        info!(user_id = %user.id, "user logged out");
    }
    (
        StatusCode::OK,
        [(header::SET_COOKIE, cleared_cookie(&state.config))],
        Json(MessageResponse::new("Logged out successfully")),
    )
        .into_response()
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ForgotPasswordRequest>,
) -> AppResult<Json<ForgotPasswordResponse>> {
    let token = services::forgot_password(&state, &payload.email).await?;
    let reset_token = state.config.auth.expose_reset_token.then_some(token);
    Ok(Json(ForgotPasswordResponse {
        message: "Password reset email sent".into(),
        reset_token,
    }))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ResetPasswordRequest>,
) -> AppResult<Response> {
    let session = services::reset_password(&state, &payload.token, &payload.password).await?;
    Ok(session_response(StatusCode::OK, session, &state.config))
}

#[instrument(skip(state, user, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(payload): AppJson<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    services::change_password(
        &state,
        &user,
        &payload.current_password,
        &payload.new_password,
    )
    .await?;
    Ok(Json(MessageResponse::new("Password updated successfully")))
}

#[instrument(skip(user))]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(user.into())
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderName, HeaderValue};
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::*;
    use crate::{
        app::build_app,
        auth::claims::TokenKind,
    };

    fn server() -> (TestServer, AppState) {
        let state = AppState::fake();
        let server = TestServer::new(build_app(state.clone())).unwrap();
        (server, state)
    }

    fn bearer(token: &str) -> HeaderValue {
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
    }

    async fn register_a(server: &TestServer) -> String {
        let res = server
            .post("/api/auth/register")
            .json(&json!({"name": "A", "email": "a@x.com", "password": "secret1"}))
            .await;
        assert_eq!(res.status_code(), StatusCode::CREATED);
        res.json::<Value>()["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn full_reset_scenario() {
        let (server, _) = server();

        let res = server
            .post("/api/auth/register")
            .json(&json!({"name": "A", "email": "a@x.com", "password": "secret1"}))
            .await;
        assert_eq!(res.status_code(), StatusCode::CREATED);
        let set_cookie = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(set_cookie.starts_with("jwt=") && set_cookie.contains("HttpOnly"));
        let t1 = res.json::<Value>()["token"].as_str().unwrap().to_string();

        let me = server
            .get("/api/auth/me")
            .add_header(header::AUTHORIZATION, bearer(&t1))
            .await;
        assert_eq!(me.status_code(), StatusCode::OK);
        let body = me.json::<Value>();
        assert_eq!(body["name"], "A");
        assert_eq!(body["email"], "a@x.com");
        assert!(body.get("password_hash").is_none());

        let wrong = server
            .post("/api/auth/login")
            .json(&json!({"email": "a@x.com", "password": "wrong"}))
            .await;
        assert_eq!(wrong.status_code(), StatusCode::UNAUTHORIZED);

        let forgot = server
            .post("/api/auth/forgotpassword")
            .json(&json!({"email": "a@x.com"}))
            .await;
        assert_eq!(forgot.status_code(), StatusCode::OK);
        let r = forgot.json::<Value>()["resetToken"].as_str().unwrap().to_string();

        let reset_body = json!({"token": r, "password": "secret2"});
        let reset = server.post("/api/auth/resetpassword").json(&reset_body).await;
        assert_eq!(reset.status_code(), StatusCode::OK);
        let t2 = reset.json::<Value>()["token"].as_str().unwrap().to_string();
        assert!(!t2.is_empty());

        let replay = server.post("/api/auth/resetpassword").json(&reset_body).await;
        assert_eq!(replay.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(replay.json::<Value>()["message"], "Invalid or expired token");

        let login = server
            .post("/api/auth/login")
            .json(&json!({"email": "a@x.com", "password": "secret2"}))
            .await;
        assert_eq!(login.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn login_errors_have_identical_shape() {
        let (server, _) = server();
        register_a(&server).await;

        let wrong = server
            .post("/api/auth/login")
            .json(&json!({"email": "a@x.com", "password": "not-it"}))
            .await;
        let unknown = server
            .post("/api/auth/login")
            .json(&json!({"email": "zz@x.com", "password": "secret1"}))
            .await;
        assert_eq!(wrong.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(wrong.json::<Value>(), unknown.json::<Value>());
    }

    #[tokio::test]
    async fn duplicate_registration_is_bad_request() {
        let (server, _) = server();
        register_a(&server).await;
        let res = server
            .post("/api/auth/register")
            .json(&json!({"name": "B", "email": "A@X.com", "password": "secret1"}))
            .await;
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(res.json::<Value>()["message"], "User already exists");
    }

    #[tokio::test]
    async fn cookie_transport_authenticates() {
        let (server, _) = server();
        let token = register_a(&server).await;
        let res = server
            .get("/api/auth/me")
            .add_header(
                header::COOKIE,
                HeaderValue::from_str(&format!("jwt={token}")).unwrap(),
            )
            .await;
        assert_eq!(res.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn gate_rejects_missing_bad_and_misdirected_tokens() {
        let (server, state) = server();
        register_a(&server).await;
        let keys = state.keys.clone();

        let none = server.get("/api/auth/me").await;
        assert_eq!(none.status_code(), StatusCode::UNAUTHORIZED);

        let garbage = server
            .get("/api/auth/me")
            .add_header(header::AUTHORIZATION, bearer("not.a.token"))
            .await;
        assert_eq!(garbage.status_code(), StatusCode::UNAUTHORIZED);

        let ghost = keys.issue(Uuid::new_v4(), TokenKind::Session).unwrap();
        let res = server
            .get("/api/auth/me")
            .add_header(header::AUTHORIZATION, bearer(&ghost))
            .await;
        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);

        let forgot = server
            .post("/api/auth/forgotpassword")
            .json(&json!({"email": "a@x.com"}))
            .await;
        let reset_token = forgot.json::<Value>()["resetToken"].as_str().unwrap().to_string();
        let res = server
            .get("/api/auth/me")
            .add_header(header::AUTHORIZATION, bearer(&reset_token))
            .await;
        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);

        let expired = keys
            .issue_at(
                Uuid::new_v4(),
                TokenKind::Session,
                OffsetDateTime::now_utc() - time::Duration::days(365),
            )
            .unwrap();
        let res = server
            .get("/api/auth/me")
            .add_header(header::AUTHORIZATION, bearer(&expired))
            .await;
        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);

        // every rejection reads the same
        assert_eq!(none.json::<Value>(), garbage.json::<Value>());
    }

    #[tokio::test]
    async fn forgot_password_unknown_email_is_404() {
        let (server, _) = server();
        let res = server
            .post("/api/auth/forgotpassword")
            .json(&json!({"email": "ghost@x.com"}))
            .await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn reset_token_hidden_unless_exposed() {
        let mut state = AppState::fake();
        let mut config = (*state.config).clone();
        config.auth.expose_reset_token = false;
        state.config = std::sync::Arc::new(config);
        let server = TestServer::new(build_app(state)).unwrap();
        register_a(&server).await;

        let res = server
            .post("/api/auth/forgotpassword")
            .json(&json!({"email": "a@x.com"}))
            .await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert!(res.json::<Value>().get("resetToken").is_none());
    }

    #[tokio::test]
    async fn change_password_flow() {
        let (server, _) = server();
        let token = register_a(&server).await;

        let anonymous = server
            .post("/api/auth/changepassword")
            .json(&json!({"currentPassword": "secret1", "newPassword": "secret9"}))
            .await;
        assert_eq!(anonymous.status_code(), StatusCode::UNAUTHORIZED);

        let wrong = server
            .post("/api/auth/changepassword")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .json(&json!({"currentPassword": "nope!!", "newPassword": "secret9"}))
            .await;
        assert_eq!(wrong.status_code(), StatusCode::UNAUTHORIZED);

        let ok = server
            .post("/api/auth/changepassword")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .json(&json!({"currentPassword": "secret1", "newPassword": "secret9"}))
            .await;
        assert_eq!(ok.status_code(), StatusCode::OK);

        let login = server
            .post("/api/auth/login")
            .json(&json!({"email": "a@x.com", "password": "secret9"}))
            .await;
        assert_eq!(login.status_code(), StatusCode::OK);
    }

    #[tokio::test]
    async fn logout_clears_cookie_with_or_without_identity() {
        let (server, _) = server();
        let token = register_a(&server).await;

        for req in [
            server.post("/api/auth/logout"),
            server
                .post("/api/auth/logout")
                .add_header(header::AUTHORIZATION, bearer(&token)),
        ] {
            let res = req.await;
            assert_eq!(res.status_code(), StatusCode::OK);
            let cookie = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
            assert!(cookie.contains("Max-Age=0"));
        }

        let forged = server
            .post("/api/auth/logout")
            .add_header(HeaderName::from_static("authorization"), bearer("forged"))
            .await;
        assert_eq!(forged.status_code(), StatusCode::OK);
        assert!(forged
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn logout_with_expired_cookie_still_clears_it() {
        let (server, state) = server();
        register_a(&server).await;
        let stale = state
            .keys
            .issue_at(
                Uuid::new_v4(),
                TokenKind::Session,
                OffsetDateTime::now_utc() - time::Duration::days(365),
            )
            .unwrap();

        let res = server
            .post("/api/auth/logout")
            .add_header(
                header::COOKIE,
                HeaderValue::from_str(&format!("jwt={stale}")).unwrap(),
            )
            .await;
        assert_eq!(res.status_code(), StatusCode::OK);
        let cookie = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("jwt=;") && cookie.contains("Max-Age=0"));
        assert_eq!(res.json::<Value>()["message"], "Logged out successfully");
    }

    #[tokio::test]
    async fn malformed_bodies_answer_with_json_messages() {
        let (server, _) = server();

        let missing = server
            .post("/api/auth/register")
            .json(&json!({"name": "A", "email": "a@x.com"}))
            .await;
        assert_eq!(missing.status_code(), StatusCode::BAD_REQUEST);
        let message = missing.json::<Value>()["message"].as_str().unwrap().to_string();
        assert!(message.contains("password"), "{message}");

        let broken = server
            .post("/api/auth/login")
            .content_type("application/json")
            .bytes("{not json".into())
            .await;
        assert_eq!(broken.status_code(), StatusCode::BAD_REQUEST);
        assert!(broken.json::<Value>()["message"].is_string());
    }
}
