use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::auth::session::{clear_session_cookie, session_cookie};
use crate::auth::CurrentUser;
use crate::db::models::User;
use crate::error::AppResult;
use crate::extractors::JsonBody;
use crate::state::AppState;

/// Missing fields deserialize as empty and fail the "is required" checks.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

/// Issue a token for `user` and hand it back as a cookie.
fn signed_in(state: &AppState, status: StatusCode, user: User) -> Response {
    let token = state.tokens.issue(&user.public_id);
    let cookie = session_cookie(&token, state.tokens.lifetime().num_seconds());
    (
        status,
        [(header::SET_COOKIE, cookie)],
        Json(CurrentUser::from(user)),
    )
        .into_response()
}

/// POST /auth/signup: create an account and start a session
async fn signup(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SignupRequest>,
) -> AppResult<Response> {
    let user = state
        .credentials
        .register(&req.name, &req.email, &req.password)?;
    Ok(signed_in(&state, StatusCode::CREATED, user))
}

/// POST /auth/login: check credentials and start a session
async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> AppResult<Response> {
    let user = state.credentials.verify(&req.email, &req.password)?;
    tracing::info!("User {} logged in", user.name);
    Ok(signed_in(&state, StatusCode::OK, user))
}

/// POST /auth/logout: tokens are stateless, only the cookie goes
async fn logout() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, clear_session_cookie())],
    )
}

async fn me(user: CurrentUser) -> Json<CurrentUser> {
    Json(user)
}
