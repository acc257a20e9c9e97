use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::auth::CurrentUser;
use crate::content::{PostDetail, PostSummary};
use crate::db::models::{Comment, Post};
use crate::error::AppResult;
use crate::extractors::{JsonBody, MaybeUser, PathParams};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct PostForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub content: String,
}

#[derive(Serialize)]
pub struct Deleted {
    pub id: i64,
    pub title: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct LikeResponse {
    pub liked: bool,
    pub like_count: i64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(index).post(create))
        .route("/posts/{id}", get(show).put(update).delete(destroy))
        .route("/posts/{id}/comments", post(add_comment))
        .route(
            "/posts/{id}/comments/{comment_id}",
            delete(delete_comment),
        )
        .route("/posts/{id}/like", post(toggle_like))
}

/// GET /posts: newest first, open to everyone
async fn index(State(state): State<AppState>) -> AppResult<Json<Vec<PostSummary>>> {
    Ok(Json(state.feed.list_posts().await?))
}

/// GET /posts/{id}: the like flag is personalised only for a verified viewer
async fn show(
    State(state): State<AppState>,
    viewer: MaybeUser,
    PathParams(id): PathParams<i64>,
) -> AppResult<Json<PostDetail>> {
    Ok(Json(state.feed.post_detail(id, viewer.id()).await?))
}

async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(form): JsonBody<PostForm>,
) -> AppResult<(StatusCode, Json<Post>)> {
    let post = state
        .content
        .create_post(user.id, &form.title, &form.content)
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParams(id): PathParams<i64>,
    JsonBody(form): JsonBody<PostForm>,
) -> AppResult<Json<Post>> {
    let post = state
        .content
        .update_post(user.id, id, &form.title, &form.content)
        .await?;
    Ok(Json(post))
}

async fn destroy(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParams(id): PathParams<i64>,
) -> AppResult<Json<Deleted>> {
    let post = state.content.delete_post(user.id, id).await?;
    Ok(Json(Deleted {
        id: post.id,
        message: format!("\"{}\" was deleted", post.title),
        title: post.title,
    }))
}

async fn add_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParams(id): PathParams<i64>,
    JsonBody(form): JsonBody<CommentForm>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let comment = state
        .content
        .add_comment(user.id, id, &form.content)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn delete_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParams((id, comment_id)): PathParams<(i64, i64)>,
) -> AppResult<StatusCode> {
    state
        .content
        .delete_comment(user.id, id, comment_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_like(
    State(state): State<AppState>,
    user: CurrentUser,
    PathParams(id): PathParams<i64>,
) -> AppResult<Json<LikeResponse>> {
    let state_after = state.content.toggle_like(user.id, id).await?;
    let like_count = state.feed.like_count(id).await?;
    Ok(Json(LikeResponse {
        liked: state_after.liked,
        like_count,
    }))
}
