use rand::Rng;
use rusqlite::{params, OptionalExtension, Transaction};
use std::sync::{Arc, OnceLock};

use crate::db::models::{now_timestamp, User};
use crate::db::{self, is_unique_violation};
use crate::error::{AppError, AppResult, ValidationError};
use crate::state::DbPool;

/// Lowest work factor bcrypt accepts. Cheap enough for tests.
pub const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;

/// Password hashing and account lookup.
#[derive(Clone)]
pub struct CredentialStore {
    pool: DbPool,
    cost: u32,
    /// Hash verified against when the email is unknown, at the same cost.
    dummy_hash: Arc<OnceLock<String>>,
}

impl CredentialStore {
    /// `cost` is clamped into the range bcrypt accepts.
    pub fn new(pool: DbPool, cost: u32) -> Self {
        Self {
            pool,
            cost: cost.clamp(MIN_BCRYPT_COST, MAX_BCRYPT_COST),
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Create an account. Name conflicts are reported before email conflicts.
    pub fn register(&self, name: &str, email: &str, password: &str) -> AppResult<User> {
        let name = name.trim();
        let email = email.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyField("Name").into());
        }
        if email.is_empty() {
            return Err(ValidationError::EmptyField("Email").into());
        }
        if password.is_empty() {
            return Err(ValidationError::EmptyField("Password").into());
        }

        let password_hash = bcrypt::hash(password, self.cost)
            .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))?;

        let user = db::with_transaction::<_, AppError, _>(&self.pool, |tx| {
            if exists(tx, "SELECT 1 FROM users WHERE name = ?1", name)? {
                return Err(ValidationError::DuplicateName.into());
            }
            if exists(tx, "SELECT 1 FROM users WHERE email = ?1", email)? {
                return Err(ValidationError::DuplicateEmail.into());
            }

            let public_id = generate_public_id();
            let inserted = tx.execute(
                "INSERT INTO users (public_id, name, email, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![public_id, name, email, password_hash, now_timestamp()],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    return Err(classify_conflict(&e));
                }
                Err(e) => return Err(e.into()),
            }

            let id = tx.last_insert_rowid();
            find_one(tx, "id = ?1", id)?
                .ok_or_else(|| AppError::Internal("inserted user not found".into()))
        })?;

        tracing::info!("Registered user {} ({})", user.name, user.public_id);
        Ok(user)
    }

    /// Check an email/password pair.
    ///
    /// Unknown email and wrong password produce the same error, and both
    /// pay for one bcrypt verification.
    pub fn verify(&self, email: &str, password: &str) -> AppResult<User> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE email = ?1", User::COLUMNS),
                params![email.trim()],
                User::from_row,
            )
            .optional()?;

        match user {
            Some(user) if bcrypt::verify(password, &user.password_hash).unwrap_or(false) => {
                Ok(user)
            }
            Some(_) => Err(AppError::InvalidCredentials),
            None => {
                if let Some(hash) = self.dummy_hash() {
                    let _ = bcrypt::verify(password, hash);
                }
                Err(AppError::InvalidCredentials)
            }
        }
    }

    pub fn find_by_public_id(&self, public_id: &str) -> AppResult<Option<User>> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                &format!("SELECT {} FROM users WHERE public_id = ?1", User::COLUMNS),
                params![public_id],
                User::from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Only a successful hash is cached; a failure is logged and retried next time.
    fn dummy_hash(&self) -> Option<&str> {
        if let Some(hash) = self.dummy_hash.get() {
            return Some(hash.as_str());
        }
        match bcrypt::hash("scribe-dummy-password", self.cost) {
            Ok(hash) => Some(self.dummy_hash.get_or_init(|| hash).as_str()),
            Err(e) => {
                tracing::error!("Failed to prepare dummy password hash: {}", e);
                None
            }
        }
    }
}

fn exists(tx: &Transaction<'_>, sql: &str, value: &str) -> rusqlite::Result<bool> {
    Ok(tx
        .query_row(sql, params![value], |_| Ok(()))
        .optional()?
        .is_some())
}

fn find_one(tx: &Transaction<'_>, filter: &str, id: i64) -> rusqlite::Result<Option<User>> {
    tx.query_row(
        &format!("SELECT {} FROM users WHERE {}", User::COLUMNS, filter),
        params![id],
        User::from_row,
    )
    .optional()
}

/// A racing insert can still hit a UNIQUE index; map it back to the field.
fn classify_conflict(err: &rusqlite::Error) -> AppError {
    let detail = err.to_string();
    if detail.contains("users.name") {
        ValidationError::DuplicateName.into()
    } else if detail.contains("users.email") {
        ValidationError::DuplicateEmail.into()
    } else {
        AppError::Internal(format!("unexpected constraint violation: {}", detail))
    }
}

/// 32 random bytes, hex encoded. Unrelated to the row id.
pub fn generate_public_id() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn store() -> (CredentialStore, tempfile::TempDir) {
        let (pool, tmp) = test_pool();
        (CredentialStore::new(pool, MIN_BCRYPT_COST), tmp)
    }

    #[test]
    fn generate_public_id_is_64_hex_chars() {
        let id = generate_public_id();
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_public_id_is_unique() {
        assert_ne!(generate_public_id(), generate_public_id());
    }

    #[test]
    fn register_persists_hashed_password() {
        let (store, _tmp) = store();
        let user = store.register("alice", "alice@x.com", "pw1").unwrap();
        assert_eq!(user.name, "alice");
        assert_eq!(user.email, "alice@x.com");
        assert_ne!(user.password_hash, "pw1");
        assert!(bcrypt::verify("pw1", &user.password_hash).unwrap());
        assert_ne!(user.public_id, user.id.to_string());
    }

    #[test]
    fn register_requires_every_field() {
        let (store, _tmp) = store();
        assert!(matches!(
            store.register("  ", "a@x.com", "pw"),
            Err(AppError::Validation(ValidationError::EmptyField("Name")))
        ));
        assert!(matches!(
            store.register("a", "", "pw"),
            Err(AppError::Validation(ValidationError::EmptyField("Email")))
        ));
        assert!(matches!(
            store.register("a", "a@x.com", ""),
            Err(AppError::Validation(ValidationError::EmptyField("Password")))
        ));
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let (store, _tmp) = store();
        store.register("alice", "alice@x.com", "pw1").unwrap();
        assert!(matches!(
            store.register("alice", "bob@x.com", "pw2"),
            Err(AppError::Validation(ValidationError::DuplicateName))
        ));
    }

    #[test]
    fn duplicate_name_wins_over_duplicate_email() {
        let (store, _tmp) = store();
        store.register("alice", "alice@x.com", "pw1").unwrap();
        assert!(matches!(
            store.register("alice", "alice@x.com", "pw2"),
            Err(AppError::Validation(ValidationError::DuplicateName))
        ));
    }

    #[test]
    fn duplicate_email_is_case_insensitive() {
        let (store, _tmp) = store();
        store.register("alice", "alice@x.com", "pw1").unwrap();
        assert!(matches!(
            store.register("bob", "ALICE@x.com", "pw2"),
            Err(AppError::Validation(ValidationError::DuplicateEmail))
        ));
    }

    #[test]
    fn verify_accepts_correct_password() {
        let (store, _tmp) = store();
        let alice = store.register("alice", "alice@x.com", "pw1").unwrap();
        let user = store.verify("alice@x.com", "pw1").unwrap();
        assert_eq!(user.id, alice.id);
    }

    #[test]
    fn verify_fails_uniformly() {
        let (store, _tmp) = store();
        store.register("alice", "alice@x.com", "pw1").unwrap();

        let wrong_password = store.verify("alice@x.com", "nope").unwrap_err();
        let unknown_email = store.verify("nobody@x.com", "pw1").unwrap_err();
        assert!(matches!(wrong_password, AppError::InvalidCredentials));
        assert!(matches!(unknown_email, AppError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }

    #[test]
    fn find_by_public_id_resolves_user() {
        let (store, _tmp) = store();
        let alice = store.register("alice", "alice@x.com", "pw1").unwrap();
        let found = store.find_by_public_id(&alice.public_id).unwrap().unwrap();
        assert_eq!(found.name, "alice");
        assert!(store.find_by_public_id("missing").unwrap().is_none());
    }

    #[test]
    fn cost_is_clamped_to_what_bcrypt_accepts() {
        let (pool, _tmp) = test_pool();
        let store = CredentialStore::new(pool.clone(), 0);
        assert_eq!(store.cost(), MIN_BCRYPT_COST);
        let user = store.register("alice", "alice@x.com", "pw1").unwrap();
        assert!(user.password_hash.starts_with("$2b$04$"));

        assert_eq!(CredentialStore::new(pool, 99).cost(), 31);
    }

    #[test]
    fn dummy_hash_is_a_real_hash_at_the_store_cost() {
        let (store, _tmp) = store();
        let hash = store.dummy_hash().unwrap().to_string();
        assert!(hash.starts_with("$2b$04$"));
        assert!(bcrypt::verify("anything", &hash).is_ok());
        assert_eq!(store.dummy_hash().unwrap(), hash);

        // Clones share the cached hash.
        let clone = store.clone();
        assert_eq!(clone.dummy_hash().unwrap(), hash);
    }
}
