use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::TransactionError;
use sled::Transactional;

use crate::store::keys;
use crate::store::operations::words::Word;
use crate::store::{Store, StoreError};

/// Abort reasons of the vocabulary-add transaction.
enum VocabularyAbort {
    WordExists,
    AlreadyKnown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WordStatus {
    New,
    Learning,
    Reviewing,
    Mastered,
}

impl WordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Learning => "learning",
            Self::Reviewing => "reviewing",
            Self::Mastered => "mastered",
        }
    }
}

/// Per-profile learning state of one dictionary word, including the
/// spaced-repetition fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserWord {
    pub id: String,
    pub profile_id: String,
    pub word_id: String,
    pub status: WordStatus,
    pub added_at: DateTime<Utc>,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub next_review_at: Option<DateTime<Utc>>,
    pub interval_days: u32,
    pub ef: f64,
}

impl UserWord {
    pub fn new(
        id: &str,
        profile_id: &str,
        word_id: &str,
        default_ef: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.to_string(),
            profile_id: profile_id.to_string(),
            word_id: word_id.to_string(),
            status: WordStatus::New,
            added_at: now,
            last_reviewed_at: None,
            next_review_at: None,
            interval_days: 0,
            ef: default_ef,
        }
    }
}

/// Vocabulary counts per status, for the stats command.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyCounts {
    pub new_count: u64,
    pub learning: u64,
    pub reviewing: u64,
    pub mastered: u64,
}

impl VocabularyCounts {
    pub fn total(&self) -> u64 {
        self.new_count + self.learning + self.reviewing + self.mastered
    }
}

impl Store {
    /// Add a word to a profile's vocabulary. `(profile_id, word_id)`
    /// uniqueness is checked inside the transaction via the index tree.
    pub fn add_user_word(&self, user_word: &UserWord) -> Result<(), StoreError> {
        let uw_key = keys::user_word_key(&user_word.id);
        let index_key = keys::user_word_index_key(&user_word.profile_id, &user_word.word_id);
        let uw_bytes = Self::serialize(user_word)?;
        let uw_id = user_word.id.clone();

        let result = (&self.user_words, &self.user_word_index).transaction(
            |(user_words, index)| {
                if index.get(index_key.as_bytes())?.is_some() {
                    return sled::transaction::abort(());
                }
                index.insert(index_key.as_bytes(), uw_id.as_bytes())?;
                user_words.insert(uw_key.as_bytes(), uw_bytes.as_slice())?;
                Ok(())
            },
        );

        result.map_err(|e: TransactionError<()>| match e {
            TransactionError::Abort(()) => StoreError::Conflict {
                entity: "user_word".to_string(),
                key: index_key.clone(),
            },
            TransactionError::Storage(se) => StoreError::Sled(se),
        })
    }

    /// The full "add word to vocabulary" unit of work: optionally create the
    /// dictionary word (with its indexes) and attach it to the profile, in
    /// one transaction. Conflicts distinguish "word text already taken"
    /// (entity `word_text`, retry with the existing word) from "already in
    /// this vocabulary" (entity `user_word`).
    pub fn add_vocabulary_entry(
        &self,
        new_word: Option<&Word>,
        user_word: &UserWord,
    ) -> Result<(), StoreError> {
        let word_data = match new_word {
            Some(word) => Some((
                keys::word_key(&word.id),
                keys::word_text_index_key(&word.language, &word.text),
                word.cefr.map(|cefr| {
                    keys::words_by_level_key(
                        &word.language,
                        cefr.as_str(),
                        word.freq_rank,
                        &word.id,
                    )
                }),
                Self::serialize(word)?,
                word.id.clone(),
            )),
            None => None,
        };
        let uw_key = keys::user_word_key(&user_word.id);
        let index_key = keys::user_word_index_key(&user_word.profile_id, &user_word.word_id);
        let uw_bytes = Self::serialize(user_word)?;
        let uw_id = user_word.id.clone();

        let result = (
            &self.words,
            &self.word_text_index,
            &self.words_by_level,
            &self.user_words,
            &self.user_word_index,
        )
            .transaction(
                |(words, text_index, level_index, user_words, uw_index)| {
                    if let Some((word_key, text_key, level_key, word_bytes, word_id)) = &word_data {
                        if text_index.get(text_key.as_bytes())?.is_some() {
                            return sled::transaction::abort(VocabularyAbort::WordExists);
                        }
                        text_index.insert(text_key.as_bytes(), word_id.as_bytes())?;
                        words.insert(word_key.as_bytes(), word_bytes.as_slice())?;
                        if let Some(level_key) = level_key {
                            level_index.insert(level_key.as_bytes(), word_id.as_bytes())?;
                        }
                    }
                    if uw_index.get(index_key.as_bytes())?.is_some() {
                        return sled::transaction::abort(VocabularyAbort::AlreadyKnown);
                    }
                    uw_index.insert(index_key.as_bytes(), uw_id.as_bytes())?;
                    user_words.insert(uw_key.as_bytes(), uw_bytes.as_slice())?;
                    Ok(())
                },
            );

        result.map_err(|e: TransactionError<VocabularyAbort>| match e {
            TransactionError::Abort(VocabularyAbort::WordExists) => StoreError::Conflict {
                entity: "word_text".to_string(),
                key: user_word.word_id.clone(),
            },
            TransactionError::Abort(VocabularyAbort::AlreadyKnown) => StoreError::Conflict {
                entity: "user_word".to_string(),
                key: index_key.clone(),
            },
            TransactionError::Storage(se) => StoreError::Sled(se),
        })
    }

    pub fn get_user_word(&self, user_word_id: &str) -> Result<Option<UserWord>, StoreError> {
        let key = keys::user_word_key(user_word_id);
        match self.user_words.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// 使用 CAS 保护学习状态更新。profile/word 绑定不可变，索引无需联动。
    pub fn update_user_word(&self, user_word: &UserWord) -> Result<(), StoreError> {
        let key = keys::user_word_key(&user_word.id);
        let new_bytes = Self::serialize(user_word)?;

        for _ in 0..crate::constants::MAX_CAS_RETRIES {
            let old_raw = self.user_words.get(key.as_bytes())?;
            if old_raw.is_none() {
                return Err(StoreError::NotFound {
                    entity: "user_word".to_string(),
                    key: user_word.id.clone(),
                });
            }
            match self.user_words.compare_and_swap(
                key.as_bytes(),
                old_raw,
                Some(new_bytes.as_slice()),
            )? {
                Ok(()) => return Ok(()),
                Err(_) => continue,
            }
        }
        Err(StoreError::CasRetryExhausted {
            entity: "user_word".to_string(),
            key: user_word.id.clone(),
            attempts: crate::constants::MAX_CAS_RETRIES,
        })
    }

    pub fn find_user_word(
        &self,
        profile_id: &str,
        word_id: &str,
    ) -> Result<Option<UserWord>, StoreError> {
        let index_key = keys::user_word_index_key(profile_id, word_id);
        match self.user_word_index.get(index_key.as_bytes())? {
            Some(uw_id_raw) => {
                let uw_id = String::from_utf8(uw_id_raw.to_vec()).unwrap_or_default();
                self.get_user_word(&uw_id)
            }
            None => Ok(None),
        }
    }

    /// Eagerly load the whole vocabulary of a profile. Selector input.
    pub fn list_user_words_by_profile(
        &self,
        profile_id: &str,
    ) -> Result<Vec<UserWord>, StoreError> {
        let prefix = keys::user_word_index_prefix(profile_id);
        let mut words = Vec::new();
        for item in self.user_word_index.scan_prefix(prefix.as_bytes()) {
            let (_, uw_id_raw) = item?;
            let uw_id = String::from_utf8(uw_id_raw.to_vec()).unwrap_or_default();
            if let Some(uw) = self.get_user_word(&uw_id)? {
                words.push(uw);
            }
        }
        Ok(words)
    }

    /// Words whose review date has passed, via the due index. The index key
    /// embeds the timestamp, so the scan stops at the first future entry.
    pub fn count_due_user_words(
        &self,
        profile_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let prefix = keys::user_word_due_prefix(profile_id);
        let cutoff = keys::user_word_due_key(profile_id, now.timestamp_millis(), "");
        let mut due = 0u64;
        for item in self.user_words_due.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item?;
            if key.as_ref() >= cutoff.as_bytes() {
                break;
            }
            due += 1;
        }
        Ok(due)
    }

    pub fn vocabulary_counts(&self, profile_id: &str) -> Result<VocabularyCounts, StoreError> {
        let mut counts = VocabularyCounts::default();
        for uw in self.list_user_words_by_profile(profile_id)? {
            match uw.status {
                WordStatus::New => counts.new_count += 1,
                WordStatus::Learning => counts.learning += 1,
                WordStatus::Reviewing => counts.reviewing += 1,
                WordStatus::Mastered => counts.mastered += 1,
            }
        }
        Ok(counts)
    }
}
