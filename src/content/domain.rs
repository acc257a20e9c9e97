// Pure validation and ownership rules. No I/O.
use crate::db::models::{Comment, Post};
use crate::error::ValidationError;

/// Title and body of a post, already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
}

impl PostDraft {
    /// New posts need both a title and a body.
    pub fn new(title: &str, content: &str) -> Result<Self, ValidationError> {
        let title = required(title, ValidationError::EmptyTitle)?;
        required(content, ValidationError::EmptyContent)?;
        Ok(Self {
            title,
            content: content.to_string(),
        })
    }

    /// Edits only insist on a title.
    pub fn revision(title: &str, content: &str) -> Result<Self, ValidationError> {
        let title = required(title, ValidationError::EmptyTitle)?;
        Ok(Self {
            title,
            content: content.to_string(),
        })
    }
}

pub fn comment_body(content: &str) -> Result<String, ValidationError> {
    required(content, ValidationError::EmptyContent)?;
    Ok(content.to_string())
}

/// Only the author may edit or delete a post.
pub fn can_modify_post(post: &Post, requester_id: i64) -> bool {
    post.author_id == requester_id
}

/// A comment may be removed by whoever wrote it or by the author of the post it sits on.
pub fn can_delete_comment(comment: &Comment, post: &Post, requester_id: i64) -> bool {
    comment.author_id == requester_id || post.author_id == requester_id
}

fn required(value: &str, err: ValidationError) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(err)
    } else {
        Ok(trimmed.to_string())
    }
}
