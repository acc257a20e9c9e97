// Repository pattern - every content mutation goes through here
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Transaction};
use std::sync::Arc;

use crate::content::domain::{self, PostDraft};
use crate::db::models::{now_timestamp, Comment, LikedState, Post};
use crate::db::{self, is_unique_violation};
use crate::error::{AppError, AppResult, Resource};
use crate::state::DbPool;

/// Posts, comments and likes, with ownership enforced on every mutation.
#[async_trait]
pub trait ContentRepository: Send + Sync {
    async fn create_post(&self, author_id: i64, title: &str, content: &str) -> AppResult<Post>;

    /// Fails `NotFound`, then `Forbidden`, then `EmptyTitle`.
    async fn update_post(
        &self,
        requester_id: i64,
        post_id: i64,
        title: &str,
        content: &str,
    ) -> AppResult<Post>;

    /// Removes the post with its comments and likes. Returns what was deleted.
    async fn delete_post(&self, requester_id: i64, post_id: i64) -> AppResult<Post>;

    async fn add_comment(&self, author_id: i64, post_id: i64, content: &str)
        -> AppResult<Comment>;

    async fn delete_comment(
        &self,
        requester_id: i64,
        post_id: i64,
        comment_id: i64,
    ) -> AppResult<()>;

    /// Flip the `(user, post)` like. Applying it twice restores the original state.
    async fn toggle_like(&self, user_id: i64, post_id: i64) -> AppResult<LikedState>;
}

pub struct SqliteContentRepository {
    pool: DbPool,
}

impl SqliteContentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentRepository for SqliteContentRepository {
    async fn create_post(&self, author_id: i64, title: &str, content: &str) -> AppResult<Post> {
        let draft = PostDraft::new(title, content)?;
        let conn = self.pool.get()?;

        conn.execute(
            "INSERT INTO posts (author_id, title, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![author_id, draft.title, draft.content, now_timestamp()],
        )?;
        let id = conn.last_insert_rowid();
        let post = conn.query_row(
            &format!("SELECT {} FROM posts WHERE id = ?1", Post::COLUMNS),
            params![id],
            Post::from_row,
        )?;

        tracing::info!("User {} created post {}", author_id, post.id);
        Ok(post)
    }

    async fn update_post(
        &self,
        requester_id: i64,
        post_id: i64,
        title: &str,
        content: &str,
    ) -> AppResult<Post> {
        db::with_transaction::<_, AppError, _>(&self.pool, |tx| {
            let post = load_post(tx, post_id)?.ok_or(AppError::NotFound(Resource::Post))?;
            if !domain::can_modify_post(&post, requester_id) {
                return Err(AppError::Forbidden);
            }
            let draft = PostDraft::revision(title, content)?;

            tx.execute(
                "UPDATE posts SET title = ?1, content = ?2 WHERE id = ?3",
                params![draft.title, draft.content, post_id],
            )?;

            tracing::info!("User {} updated post {}", requester_id, post_id);
            Ok(Post {
                title: draft.title,
                content: draft.content,
                ..post
            })
        })
    }

    async fn delete_post(&self, requester_id: i64, post_id: i64) -> AppResult<Post> {
        // ATOMIC - post, comments and likes go together or not at all
        db::with_transaction::<_, AppError, _>(&self.pool, |tx| {
            let post = load_post(tx, post_id)?.ok_or(AppError::NotFound(Resource::Post))?;
            if !domain::can_modify_post(&post, requester_id) {
                return Err(AppError::Forbidden);
            }

            let likes = tx.execute("DELETE FROM likes WHERE post_id = ?1", params![post_id])?;
            let comments =
                tx.execute("DELETE FROM comments WHERE post_id = ?1", params![post_id])?;
            tx.execute("DELETE FROM posts WHERE id = ?1", params![post_id])?;

            tracing::info!(
                "User {} deleted post {} ({} comments, {} likes)",
                requester_id,
                post_id,
                comments,
                likes
            );
            Ok(post)
        })
    }

    async fn add_comment(
        &self,
        author_id: i64,
        post_id: i64,
        content: &str,
    ) -> AppResult<Comment> {
        let body = domain::comment_body(content)?;

        db::with_transaction::<_, AppError, _>(&self.pool, |tx| {
            if load_post(tx, post_id)?.is_none() {
                return Err(AppError::NotFound(Resource::Post));
            }

            tx.execute(
                "INSERT INTO comments (post_id, author_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![post_id, author_id, body, now_timestamp()],
            )?;
            let id = tx.last_insert_rowid();
            let comment = tx.query_row(
                &format!("SELECT {} FROM comments WHERE id = ?1", Comment::COLUMNS),
                params![id],
                Comment::from_row,
            )?;

            tracing::info!("User {} commented on post {}", author_id, post_id);
            Ok(comment)
        })
    }

    async fn delete_comment(
        &self,
        requester_id: i64,
        post_id: i64,
        comment_id: i64,
    ) -> AppResult<()> {
        db::with_transaction::<_, AppError, _>(&self.pool, |tx| {
            let post = load_post(tx, post_id)?.ok_or(AppError::NotFound(Resource::Post))?;
            let comment = tx
                .query_row(
                    &format!(
                        "SELECT {} FROM comments WHERE id = ?1 AND post_id = ?2",
                        Comment::COLUMNS
                    ),
                    params![comment_id, post_id],
                    Comment::from_row,
                )
                .optional()?
                .ok_or(AppError::NotFound(Resource::Comment))?;

            if !domain::can_delete_comment(&comment, &post, requester_id) {
                return Err(AppError::Forbidden);
            }

            tx.execute("DELETE FROM comments WHERE id = ?1", params![comment_id])?;
            tracing::info!(
                "User {} deleted comment {} on post {}",
                requester_id,
                comment_id,
                post_id
            );
            Ok(())
        })
    }

    async fn toggle_like(&self, user_id: i64, post_id: i64) -> AppResult<LikedState> {
        db::with_transaction::<_, AppError, _>(&self.pool, |tx| {
            if load_post(tx, post_id)?.is_none() {
                return Err(AppError::NotFound(Resource::Post));
            }

            let removed = tx.execute(
                "DELETE FROM likes WHERE user_id = ?1 AND post_id = ?2",
                params![user_id, post_id],
            )?;
            if removed > 0 {
                return Ok(LikedState { liked: false });
            }

            Ok(insert_like(tx, user_id, post_id)?)
        })
    }
}

/// If someone else's insert landed first the pair is liked either way.
fn insert_like(
    tx: &Transaction<'_>,
    user_id: i64,
    post_id: i64,
) -> rusqlite::Result<LikedState> {
    let inserted = tx.execute(
        "INSERT INTO likes (user_id, post_id, created_at) VALUES (?1, ?2, ?3)",
        params![user_id, post_id, now_timestamp()],
    );
    match inserted {
        Ok(_) => Ok(LikedState { liked: true }),
        Err(e) if is_unique_violation(&e) => Ok(LikedState { liked: true }),
        Err(e) => Err(e),
    }
}

fn load_post(tx: &Transaction<'_>, post_id: i64) -> rusqlite::Result<Option<Post>> {
    tx.query_row(
        &format!("SELECT {} FROM posts WHERE id = ?1", Post::COLUMNS),
        params![post_id],
        Post::from_row,
    )
    .optional()
}

/// Type alias for Arc-wrapped repository (for AppState)
pub type DynContentRepository = Arc<dyn ContentRepository>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::error::ValidationError;
    use tempfile::TempDir;

    const ALICE: i64 = 1;
    const BOB: i64 = 2;
    const CAROL: i64 = 3;

    fn create_test_repo() -> (SqliteContentRepository, TempDir) {
        let (pool, tmp) = test_pool();
        (SqliteContentRepository::new(pool), tmp)
    }

    fn count(repo: &SqliteContentRepository, sql: &str, id: i64) -> i64 {
        let conn = repo.pool.get().unwrap();
        conn.query_row(sql, params![id], |row| row.get(0)).unwrap()
    }

    #[tokio::test]
    async fn test_create_post() {
        let (repo, _temp) = create_test_repo();
        let post = repo.create_post(ALICE, "Hello", "World").await.unwrap();
        assert_eq!(post.author_id, ALICE);
        assert_eq!(post.title, "Hello");
        assert_eq!(post.content, "World");
    }

    #[tokio::test]
    async fn test_create_post_validates() {
        let (repo, _temp) = create_test_repo();
        assert!(matches!(
            repo.create_post(ALICE, "", "World").await,
            Err(AppError::Validation(ValidationError::EmptyTitle))
        ));
        assert!(matches!(
            repo.create_post(ALICE, "Hello", "").await,
            Err(AppError::Validation(ValidationError::EmptyContent))
        ));
    }

    #[tokio::test]
    async fn test_update_post_by_author() {
        let (repo, _temp) = create_test_repo();
        let post = repo.create_post(ALICE, "Hello", "World").await.unwrap();

        let updated = repo
            .update_post(ALICE, post.id, "Hello again", "")
            .await
            .unwrap();
        assert_eq!(updated.title, "Hello again");
        assert_eq!(updated.content, "");
        assert_eq!(updated.created_at, post.created_at);
    }

    #[tokio::test]
    async fn test_update_post_error_order() {
        let (repo, _temp) = create_test_repo();
        let post = repo.create_post(ALICE, "Hello", "World").await.unwrap();

        assert!(matches!(
            repo.update_post(ALICE, 999, "", "").await,
            Err(AppError::NotFound(Resource::Post))
        ));
        assert!(matches!(
            repo.update_post(BOB, post.id, "", "").await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            repo.update_post(ALICE, post.id, " ", "x").await,
            Err(AppError::Validation(ValidationError::EmptyTitle))
        ));
    }

    #[tokio::test]
    async fn test_non_authors_cannot_modify_post() {
        let (repo, _temp) = create_test_repo();
        let post = repo.create_post(ALICE, "Hello", "World").await.unwrap();

        for requester in [BOB, CAROL] {
            assert!(matches!(
                repo.update_post(requester, post.id, "Mine", "now").await,
                Err(AppError::Forbidden)
            ));
            assert!(matches!(
                repo.delete_post(requester, post.id).await,
                Err(AppError::Forbidden)
            ));
        }

        let title: String = repo
            .pool
            .get()
            .unwrap()
            .query_row("SELECT title FROM posts WHERE id = ?1", params![post.id], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(title, "Hello");
    }

    #[tokio::test]
    async fn test_delete_post_cascades() {
        let (repo, _temp) = create_test_repo();
        let post = repo.create_post(ALICE, "Hello", "World").await.unwrap();
        repo.add_comment(BOB, post.id, "first").await.unwrap();
        repo.add_comment(CAROL, post.id, "second").await.unwrap();
        repo.toggle_like(BOB, post.id).await.unwrap();
        repo.toggle_like(ALICE, post.id).await.unwrap();

        let deleted = repo.delete_post(ALICE, post.id).await.unwrap();
        assert_eq!(deleted.title, "Hello");

        assert_eq!(count(&repo, "SELECT COUNT(*) FROM posts WHERE id = ?1", post.id), 0);
        assert_eq!(
            count(&repo, "SELECT COUNT(*) FROM comments WHERE post_id = ?1", post.id),
            0
        );
        assert_eq!(
            count(&repo, "SELECT COUNT(*) FROM likes WHERE post_id = ?1", post.id),
            0
        );

        assert!(matches!(
            repo.delete_post(ALICE, post.id).await,
            Err(AppError::NotFound(Resource::Post))
        ));
    }

    #[tokio::test]
    async fn test_delete_post_leaves_other_posts_alone() {
        let (repo, _temp) = create_test_repo();
        let doomed = repo.create_post(ALICE, "Doomed", "x").await.unwrap();
        let kept = repo.create_post(ALICE, "Kept", "y").await.unwrap();
        repo.add_comment(BOB, kept.id, "stay").await.unwrap();
        repo.toggle_like(BOB, kept.id).await.unwrap();

        repo.delete_post(ALICE, doomed.id).await.unwrap();

        assert_eq!(
            count(&repo, "SELECT COUNT(*) FROM comments WHERE post_id = ?1", kept.id),
            1
        );
        assert_eq!(
            count(&repo, "SELECT COUNT(*) FROM likes WHERE post_id = ?1", kept.id),
            1
        );
    }

    #[tokio::test]
    async fn test_add_comment() {
        let (repo, _temp) = create_test_repo();
        let post = repo.create_post(ALICE, "Hello", "World").await.unwrap();

        let comment = repo.add_comment(BOB, post.id, "Nice post").await.unwrap();
        assert_eq!(comment.post_id, post.id);
        assert_eq!(comment.author_id, BOB);

        assert!(matches!(
            repo.add_comment(BOB, post.id, "  ").await,
            Err(AppError::Validation(ValidationError::EmptyContent))
        ));
        assert!(matches!(
            repo.add_comment(BOB, 999, "hello?").await,
            Err(AppError::NotFound(Resource::Post))
        ));
    }

    #[tokio::test]
    async fn test_comment_author_can_delete() {
        let (repo, _temp) = create_test_repo();
        let post = repo.create_post(ALICE, "Hello", "World").await.unwrap();
        let comment = repo.add_comment(BOB, post.id, "mine").await.unwrap();

        repo.delete_comment(BOB, post.id, comment.id).await.unwrap();
        assert_eq!(
            count(&repo, "SELECT COUNT(*) FROM comments WHERE id = ?1", comment.id),
            0
        );
    }

    #[tokio::test]
    async fn test_post_author_can_delete_any_comment() {
        let (repo, _temp) = create_test_repo();
        let post = repo.create_post(ALICE, "Hello", "World").await.unwrap();
        let comment = repo.add_comment(BOB, post.id, "spam").await.unwrap();

        repo.delete_comment(ALICE, post.id, comment.id).await.unwrap();
        assert_eq!(
            count(&repo, "SELECT COUNT(*) FROM comments WHERE id = ?1", comment.id),
            0
        );
    }

    #[tokio::test]
    async fn test_bystander_cannot_delete_comment() {
        let (repo, _temp) = create_test_repo();
        let post = repo.create_post(ALICE, "Hello", "World").await.unwrap();
        let comment = repo.add_comment(BOB, post.id, "hi").await.unwrap();

        assert!(matches!(
            repo.delete_comment(CAROL, post.id, comment.id).await,
            Err(AppError::Forbidden)
        ));
        assert_eq!(
            count(&repo, "SELECT COUNT(*) FROM comments WHERE id = ?1", comment.id),
            1
        );
    }

    #[tokio::test]
    async fn test_delete_comment_must_match_post() {
        let (repo, _temp) = create_test_repo();
        let post = repo.create_post(ALICE, "Hello", "World").await.unwrap();
        let other = repo.create_post(CAROL, "Other", "Post").await.unwrap();
        let comment = repo.add_comment(BOB, post.id, "hi").await.unwrap();

        // Carol owns `other`, which must not grant rights over comments elsewhere.
        assert!(matches!(
            repo.delete_comment(CAROL, other.id, comment.id).await,
            Err(AppError::NotFound(Resource::Comment))
        ));
        assert!(matches!(
            repo.delete_comment(BOB, 999, comment.id).await,
            Err(AppError::NotFound(Resource::Post))
        ));
    }

    #[tokio::test]
    async fn test_toggle_like_twice_restores_state() {
        let (repo, _temp) = create_test_repo();
        let post = repo.create_post(ALICE, "Hello", "World").await.unwrap();
        let likes = "SELECT COUNT(*) FROM likes WHERE post_id = ?1";

        assert_eq!(
            repo.toggle_like(BOB, post.id).await.unwrap(),
            LikedState { liked: true }
        );
        assert_eq!(count(&repo, likes, post.id), 1);

        assert_eq!(
            repo.toggle_like(BOB, post.id).await.unwrap(),
            LikedState { liked: false }
        );
        assert_eq!(count(&repo, likes, post.id), 0);
    }

    #[tokio::test]
    async fn test_toggle_like_is_per_user() {
        let (repo, _temp) = create_test_repo();
        let post = repo.create_post(ALICE, "Hello", "World").await.unwrap();

        repo.toggle_like(BOB, post.id).await.unwrap();
        repo.toggle_like(CAROL, post.id).await.unwrap();
        repo.toggle_like(BOB, post.id).await.unwrap();

        assert_eq!(
            count(&repo, "SELECT COUNT(*) FROM likes WHERE post_id = ?1", post.id),
            1
        );
    }

    #[tokio::test]
    async fn test_toggle_like_unknown_post() {
        let (repo, _temp) = create_test_repo();
        assert!(matches!(
            repo.toggle_like(BOB, 42).await,
            Err(AppError::NotFound(Resource::Post))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_toggles_never_duplicate() {
        let (repo, _temp) = create_test_repo();
        let post_id = repo.create_post(ALICE, "Hello", "World").await.unwrap().id;
        let repo = Arc::new(repo);
        let start = Arc::new(tokio::sync::Barrier::new(6));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let repo = repo.clone();
                let start = start.clone();
                tokio::spawn(async move {
                    start.wait().await;
                    repo.toggle_like(BOB, post_id).await
                })
            })
            .collect();
        let mut liked = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().liked {
                liked += 1;
            }
        }

        // Toggles serialize, so they alternate and an even number lands on "not liked".
        assert_eq!(liked, 3);
        assert_eq!(
            count(&repo, "SELECT COUNT(*) FROM likes WHERE post_id = ?1", post_id),
            0
        );
    }

    #[tokio::test]
    async fn test_insert_like_treats_existing_row_as_liked() {
        let (repo, _temp) = create_test_repo();
        let post_id = repo.create_post(ALICE, "Hello", "World").await.unwrap().id;

        let state = db::with_transaction::<_, AppError, _>(&repo.pool, |tx| {
            tx.execute(
                "INSERT INTO likes (user_id, post_id, created_at) VALUES (?1, ?2, ?3)",
                params![BOB, post_id, now_timestamp()],
            )?;
            Ok(insert_like(tx, BOB, post_id)?)
        })
        .unwrap();

        assert!(state.liked);
        assert_eq!(
            count(&repo, "SELECT COUNT(*) FROM likes WHERE post_id = ?1", post_id),
            1
        );
    }

    #[tokio::test]
    async fn test_insert_like_propagates_other_errors() {
        let (repo, _temp) = create_test_repo();
        // No such post: the foreign key rejects it, which is not a uniqueness conflict.
        let result = db::with_transaction::<_, AppError, _>(&repo.pool, |tx| {
            Ok(insert_like(tx, BOB, 404)?)
        });
        assert!(matches!(result, Err(AppError::StorageUnavailable(_))));
    }
}
