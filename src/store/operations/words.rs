use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::TransactionError;
use sled::Transactional;

use crate::store::keys;
use crate::store::{Store, StoreError};

/// CEFR 等级，A1 最低，C2 最高。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Cefr {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
}

impl Cefr {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A1 => "A1",
            Self::A2 => "A2",
            Self::B1 => "B1",
            Self::B2 => "B2",
            Self::C1 => "C1",
            Self::C2 => "C2",
        }
    }

    pub const ALL: [Cefr; 6] = [
        Cefr::A1,
        Cefr::A2,
        Cefr::B1,
        Cefr::B2,
        Cefr::C1,
        Cefr::C2,
    ];
}

impl FromStr for Cefr {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A1" => Ok(Self::A1),
            "A2" => Ok(Self::A2),
            "B1" => Ok(Self::B1),
            "B2" => Ok(Self::B2),
            "C1" => Ok(Self::C1),
            "C2" => Ok(Self::C2),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WordExample {
    pub src: String,
    pub tgt: String,
}

/// Shared dictionary entry. `text` is stored lowercase; `(text, language)`
/// is unique via the text index tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Word {
    pub id: String,
    pub text: String,
    pub language: String,
    pub cefr: Option<Cefr>,
    /// 按目标语言分组的译文，组内顺序即优先级
    pub translations: BTreeMap<String, Vec<String>>,
    pub examples: Vec<WordExample>,
    pub forms: BTreeMap<String, String>,
    pub freq_rank: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Word {
    /// First-priority translation into `lang`, if the dictionary has one.
    pub fn primary_translation(&self, lang: &str) -> Option<&str> {
        self.translations
            .get(lang)
            .and_then(|list| list.first())
            .map(|s| s.as_str())
    }

    /// Remaining translations into `lang` beyond the primary one.
    pub fn alternative_translations(&self, lang: &str) -> Vec<String> {
        self.translations
            .get(lang)
            .map(|list| list.iter().skip(1).cloned().collect())
            .unwrap_or_default()
    }
}

impl Store {
    /// Insert a word and its indexes atomically. Fails with Conflict when
    /// `(language, text)` already exists.
    pub fn create_word(&self, word: &Word) -> Result<(), StoreError> {
        if word.text.trim().is_empty() {
            return Err(StoreError::Validation("word text must not be empty".into()));
        }
        if word.text != word.text.to_lowercase() {
            return Err(StoreError::Validation(
                "word text must be stored lowercase".into(),
            ));
        }

        let word_key = keys::word_key(&word.id);
        let text_key = keys::word_text_index_key(&word.language, &word.text);
        let level_key = word.cefr.map(|cefr| {
            keys::words_by_level_key(&word.language, cefr.as_str(), word.freq_rank, &word.id)
        });
        let word_bytes = Self::serialize(word)?;
        let word_id = word.id.clone();

        let result = (&self.words, &self.word_text_index, &self.words_by_level).transaction(
            |(words, text_index, level_index)| {
                if text_index.get(text_key.as_bytes())?.is_some() {
                    return sled::transaction::abort(());
                }
                text_index.insert(text_key.as_bytes(), word_id.as_bytes())?;
                words.insert(word_key.as_bytes(), word_bytes.as_slice())?;
                if let Some(level_key) = &level_key {
                    level_index.insert(level_key.as_bytes(), word_id.as_bytes())?;
                }
                Ok(())
            },
        );

        result.map_err(|e: TransactionError<()>| match e {
            TransactionError::Abort(()) => StoreError::Conflict {
                entity: "word_text".to_string(),
                key: text_key.clone(),
            },
            TransactionError::Storage(se) => StoreError::Sled(se),
        })
    }

    /// 使用 CAS 更新词条（译文合并等）。text/language 不可变，索引无需联动。
    pub fn update_word(&self, word: &Word) -> Result<(), StoreError> {
        let key = keys::word_key(&word.id);
        let new_bytes = Self::serialize(word)?;

        for _ in 0..crate::constants::MAX_CAS_RETRIES {
            let old_raw = self.words.get(key.as_bytes())?;
            let Some(old_raw) = old_raw else {
                return Err(StoreError::NotFound {
                    entity: "word".to_string(),
                    key: word.id.clone(),
                });
            };
            let old: Word = Self::deserialize(&old_raw)?;
            if old.text != word.text || old.language != word.language {
                return Err(StoreError::Validation(
                    "word text and language are immutable".into(),
                ));
            }
            match self.words.compare_and_swap(
                key.as_bytes(),
                Some(old_raw),
                Some(new_bytes.as_slice()),
            )? {
                Ok(()) => return Ok(()),
                Err(_) => continue,
            }
        }
        Err(StoreError::CasRetryExhausted {
            entity: "word".to_string(),
            key: word.id.clone(),
            attempts: crate::constants::MAX_CAS_RETRIES,
        })
    }

    pub fn get_word(&self, word_id: &str) -> Result<Option<Word>, StoreError> {
        let key = keys::word_key(word_id);
        match self.words.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn find_word_by_text(
        &self,
        language: &str,
        text: &str,
    ) -> Result<Option<Word>, StoreError> {
        let text_key = keys::word_text_index_key(language, text);
        match self.word_text_index.get(text_key.as_bytes())? {
            Some(word_id_raw) => {
                let word_id = String::from_utf8(word_id_raw.to_vec()).unwrap_or_default();
                self.get_word(&word_id)
            }
            None => Ok(None),
        }
    }

    /// Distractor candidate pool: words of the same language and level,
    /// ordered by frequency rank (index key order), excluding one word.
    pub fn distractor_pool(
        &self,
        language: &str,
        cefr: Cefr,
        exclude_word_id: &str,
        limit: usize,
    ) -> Result<Vec<Word>, StoreError> {
        let prefix = keys::words_by_level_prefix(language, cefr.as_str());
        let mut pool = Vec::with_capacity(limit);
        for item in self.words_by_level.scan_prefix(prefix.as_bytes()) {
            if pool.len() >= limit {
                break;
            }
            let (_, word_id_raw) = item?;
            let word_id = String::from_utf8(word_id_raw.to_vec()).unwrap_or_default();
            if word_id == exclude_word_id {
                continue;
            }
            if let Some(word) = self.get_word(&word_id)? {
                pool.push(word);
            }
        }
        Ok(pool)
    }
}
