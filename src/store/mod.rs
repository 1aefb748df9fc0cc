pub mod keys;
pub mod migrate;
pub mod operations;
pub mod trees;

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use thiserror::Error;

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub users: sled::Tree,
    pub dialog_states: sled::Tree,
    pub profiles: sled::Tree,
    pub words: sled::Tree,
    pub user_words: sled::Tree,
    pub word_stats: sled::Tree,
    pub lessons: sled::Tree,
    pub lesson_attempts: sled::Tree,
    pub translation_cache: sled::Tree,
    pub validation_cache: sled::Tree,
    pub meta: sled::Tree,
    // Secondary index trees
    pub profile_user_index: sled::Tree,
    pub active_profiles: sled::Tree,
    pub word_text_index: sled::Tree,
    pub words_by_level: sled::Tree,
    pub user_word_index: sled::Tree,
    pub user_words_due: sled::Tree,
    pub active_lessons: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("conflict: entity={entity}, key={key}")]
    Conflict { entity: String, key: String },
    #[error("CAS retry exhausted after {attempts} attempts: entity={entity}, key={key}")]
    CasRetryExhausted {
        entity: String,
        key: String,
        attempts: u32,
    },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
}

impl StoreError {
    /// 瞬态错误白名单：仅底层 IO 故障可重试，其余错误重试无意义。
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Sled(sled::Error::Io(_)))
    }
}

/// 瞬态错误退避间隔（1s → 5s），与重试上限共同构成单一事实来源。
const TRANSIENT_BACKOFF: [Duration; 2] = [Duration::from_secs(1), Duration::from_secs(5)];

/// Retry a store operation on transient errors, with backoff between
/// attempts. Non-transient errors return immediately.
pub async fn retry_transient<T, F>(entity: &str, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Result<T, StoreError>,
{
    let mut attempt = 0usize;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < TRANSIENT_BACKOFF.len() => {
                let delay = TRANSIENT_BACKOFF[attempt];
                attempt += 1;
                tracing::warn!(
                    entity,
                    attempt,
                    delay_secs = delay.as_secs(),
                    error = %err,
                    "Transient store error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let users = db.open_tree(trees::USERS)?;
        let dialog_states = db.open_tree(trees::DIALOG_STATES)?;
        let profiles = db.open_tree(trees::PROFILES)?;
        let words = db.open_tree(trees::WORDS)?;
        let user_words = db.open_tree(trees::USER_WORDS)?;
        let word_stats = db.open_tree(trees::WORD_STATS)?;
        let lessons = db.open_tree(trees::LESSONS)?;
        let lesson_attempts = db.open_tree(trees::LESSON_ATTEMPTS)?;
        let translation_cache = db.open_tree(trees::TRANSLATION_CACHE)?;
        let validation_cache = db.open_tree(trees::VALIDATION_CACHE)?;
        let meta = db.open_tree(trees::META)?;
        // Secondary index trees
        let profile_user_index = db.open_tree(trees::PROFILE_USER_INDEX)?;
        let active_profiles = db.open_tree(trees::ACTIVE_PROFILES)?;
        let word_text_index = db.open_tree(trees::WORD_TEXT_INDEX)?;
        let words_by_level = db.open_tree(trees::WORDS_BY_LEVEL)?;
        let user_word_index = db.open_tree(trees::USER_WORD_INDEX)?;
        let user_words_due = db.open_tree(trees::USER_WORDS_DUE)?;
        let active_lessons = db.open_tree(trees::ACTIVE_LESSONS)?;

        Ok(Self {
            db,
            users,
            dialog_states,
            profiles,
            words,
            user_words,
            word_stats,
            lessons,
            lesson_attempts,
            translation_cache,
            validation_cache,
            meta,
            profile_user_index,
            active_profiles,
            word_text_index,
            words_by_level,
            user_word_index,
            user_words_due,
            active_lessons,
        })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        migrate::run(self)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn raw_db(&self) -> &Db {
        &self.db
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn retry_transient_gives_up_on_terminal_errors() {
        let mut calls = 0u32;
        let result: Result<(), StoreError> = retry_transient("test", || {
            calls += 1;
            Err(StoreError::Validation("bad".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn retry_transient_returns_first_success() {
        let mut calls = 0u32;
        let result = retry_transient("test", || {
            calls += 1;
            Ok(calls)
        })
        .await;
        assert_eq!(result.unwrap(), 1);
    }
}
