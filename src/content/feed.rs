//! Read-side views: posts joined with authors, comment counts and likes.
//!
//! Authors are left-joined. A post or comment whose author row is gone still
//! shows up, under [`DELETED_AUTHOR`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::sync::Arc;

use crate::db::models::timestamp_column;
use crate::db;
use crate::error::{AppError, AppResult, Resource};
use crate::state::DbPool;

pub const DELETED_AUTHOR: &str = "[deleted]";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostSummary {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
    pub comment_count: i64,
    pub like_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentView {
    pub id: i64,
    pub author_id: i64,
    pub author_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostDetail {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
    pub comments: Vec<CommentView>,
    pub like_count: i64,
    pub viewer_has_liked: bool,
}

#[async_trait]
pub trait FeedReader: Send + Sync {
    /// Every post, newest first.
    async fn list_posts(&self) -> AppResult<Vec<PostSummary>>;

    /// One post with its comments (oldest first). `viewer_has_liked` is
    /// false when there is no viewer.
    async fn post_detail(&self, post_id: i64, viewer_id: Option<i64>) -> AppResult<PostDetail>;

    async fn like_count(&self, post_id: i64) -> AppResult<i64>;
}

pub struct SqliteFeedReader {
    pool: DbPool,
}

impl SqliteFeedReader {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn author_name(name: Option<String>) -> String {
    name.unwrap_or_else(|| DELETED_AUTHOR.to_string())
}

#[async_trait]
impl FeedReader for SqliteFeedReader {
    async fn list_posts(&self) -> AppResult<Vec<PostSummary>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT p.id, p.title, p.content, p.author_id, u.name, p.created_at,
                    (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id),
                    (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id)
             FROM posts p
             LEFT JOIN users u ON u.id = p.author_id
             ORDER BY p.created_at DESC, p.id DESC",
        )?;

        let posts = stmt
            .query_map([], |row| {
                Ok(PostSummary {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    content: row.get(2)?,
                    author_id: row.get(3)?,
                    author_name: author_name(row.get(4)?),
                    created_at: timestamp_column(row, 5)?,
                    comment_count: row.get(6)?,
                    like_count: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(posts)
    }

    async fn post_detail(&self, post_id: i64, viewer_id: Option<i64>) -> AppResult<PostDetail> {
        db::with_snapshot::<_, AppError, _>(&self.pool, |tx| {
            let mut detail = tx
                .query_row(
                    "SELECT p.id, p.title, p.content, p.author_id, u.name, p.created_at
                     FROM posts p
                     LEFT JOIN users u ON u.id = p.author_id
                     WHERE p.id = ?1",
                    params![post_id],
                    |row| {
                        Ok(PostDetail {
                            id: row.get(0)?,
                            title: row.get(1)?,
                            content: row.get(2)?,
                            author_id: row.get(3)?,
                            author_name: author_name(row.get(4)?),
                            created_at: timestamp_column(row, 5)?,
                            comments: Vec::new(),
                            like_count: 0,
                            viewer_has_liked: false,
                        })
                    },
                )
                .optional()?
                .ok_or(AppError::NotFound(Resource::Post))?;

            let mut stmt = tx.prepare(
                "SELECT c.id, c.author_id, u.name, c.content, c.created_at
                 FROM comments c
                 LEFT JOIN users u ON u.id = c.author_id
                 WHERE c.post_id = ?1
                 ORDER BY c.created_at ASC, c.id ASC",
            )?;
            detail.comments = stmt
                .query_map(params![post_id], |row| {
                    Ok(CommentView {
                        id: row.get(0)?,
                        author_id: row.get(1)?,
                        author_name: author_name(row.get(2)?),
                        content: row.get(3)?,
                        created_at: timestamp_column(row, 4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            detail.like_count = tx.query_row(
                "SELECT COUNT(*) FROM likes WHERE post_id = ?1",
                params![post_id],
                |row| row.get(0),
            )?;

            if let Some(viewer_id) = viewer_id {
                detail.viewer_has_liked = tx.query_row(
                    "SELECT COUNT(*) > 0 FROM likes WHERE post_id = ?1 AND user_id = ?2",
                    params![post_id, viewer_id],
                    |row| row.get(0),
                )?;
            }

            Ok(detail)
        })
    }

    async fn like_count(&self, post_id: i64) -> AppResult<i64> {
        let conn = self.pool.get()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM likes WHERE post_id = ?1",
            params![post_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

pub type DynFeedReader = Arc<dyn FeedReader>;
