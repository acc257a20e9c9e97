use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rand::Rng;

use crate::auth::{AuthGuard, CredentialStore, TokenCodec};
use crate::config::Config;
use crate::content::{
    DynContentRepository, DynFeedReader, SqliteContentRepository, SqliteFeedReader,
};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Everything a handler needs, built once at startup. No globals.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub tokens: Arc<TokenCodec>,
    pub credentials: CredentialStore,
    pub guard: AuthGuard,
    pub content: DynContentRepository,
    pub feed: DynFeedReader,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> anyhow::Result<Self> {
        let secret = match config.auth.secret.as_deref() {
            Some(secret) => secret.as_bytes().to_vec(),
            None => {
                tracing::warn!(
                    "No signing secret configured; using an ephemeral key. \
                     Sessions will not survive a restart."
                );
                let bytes: [u8; 32] = rand::thread_rng().gen();
                bytes.to_vec()
            }
        };
        let lifetime = config.auth.session_lifetime();
        let tokens = Arc::new(TokenCodec::new(secret, lifetime)?);
        let credentials = CredentialStore::new(db.clone(), config.auth.bcrypt_cost);
        let guard = AuthGuard::new(tokens.clone(), credentials.clone());

        Ok(Self {
            content: Arc::new(SqliteContentRepository::new(db.clone())),
            feed: Arc::new(SqliteFeedReader::new(db.clone())),
            db,
            config,
            tokens,
            credentials,
            guard,
        })
    }
}
