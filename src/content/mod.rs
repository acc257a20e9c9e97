pub mod domain;
pub mod feed;
pub mod repository;

pub use feed::{CommentView, DynFeedReader, FeedReader, PostDetail, PostSummary, SqliteFeedReader};
pub use repository::{ContentRepository, DynContentRepository, SqliteContentRepository};
