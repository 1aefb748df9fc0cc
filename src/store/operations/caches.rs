use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::operations::word_stats::Direction;
use crate::store::operations::words::WordExample;
use crate::store::{Store, StoreError};

/// Model translate output, the constrained shape the gateway parses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TranslationPayload {
    pub translations: Vec<String>,
    #[serde(default)]
    pub examples: Vec<WordExample>,
    #[serde(default)]
    pub forms: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationCacheEntry {
    pub text: String,
    pub src_lang: String,
    pub tgt_lang: String,
    pub payload: TranslationPayload,
    pub cached_at: DateTime<Utc>,
    /// 默认永不过期；仅当运维需要回收空间时配置
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationCacheEntry {
    pub correct: bool,
    pub comment: String,
    pub cached_at: DateTime<Utc>,
}

impl Store {
    pub fn get_cached_translation(
        &self,
        text_norm: &str,
        src_lang: &str,
        tgt_lang: &str,
    ) -> Result<Option<TranslationCacheEntry>, StoreError> {
        let key = keys::translation_cache_key(text_norm, src_lang, tgt_lang);
        match self.translation_cache.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn put_cached_translation(
        &self,
        entry: &TranslationCacheEntry,
    ) -> Result<(), StoreError> {
        let key = keys::translation_cache_key(&entry.text, &entry.src_lang, &entry.tgt_lang);
        self.translation_cache
            .insert(key.as_bytes(), Self::serialize(entry)?)?;
        Ok(())
    }

    pub fn get_cached_validation(
        &self,
        word_id: &str,
        direction: Direction,
        expected_norm: &str,
        answer_norm: &str,
    ) -> Result<Option<ValidationCacheEntry>, StoreError> {
        let key = keys::validation_cache_key(word_id, direction, expected_norm, answer_norm);
        match self.validation_cache.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn put_cached_validation(
        &self,
        word_id: &str,
        direction: Direction,
        expected_norm: &str,
        answer_norm: &str,
        entry: &ValidationCacheEntry,
    ) -> Result<(), StoreError> {
        let key = keys::validation_cache_key(word_id, direction, expected_norm, answer_norm);
        self.validation_cache
            .insert(key.as_bytes(), Self::serialize(entry)?)?;
        Ok(())
    }

    /// Remove translation entries whose `expires_at` has passed. Entries
    /// without an expiry are kept forever.
    pub fn cleanup_expired_translations(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut removed = 0u64;
        for item in self.translation_cache.iter() {
            let (key, raw) = item?;
            let entry: TranslationCacheEntry = Self::deserialize(&raw)?;
            if let Some(expires_at) = entry.expires_at {
                if expires_at <= now {
                    self.translation_cache.remove(&key)?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn test_store() -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        (dir, store)
    }

    fn sample_entry(text: &str, expires_at: Option<DateTime<Utc>>) -> TranslationCacheEntry {
        TranslationCacheEntry {
            text: text.to_string(),
            src_lang: "en".to_string(),
            tgt_lang: "ru".to_string(),
            payload: TranslationPayload {
                translations: vec!["дом".to_string()],
                examples: vec![],
                forms: BTreeMap::new(),
            },
            cached_at: Utc::now(),
            expires_at,
        }
    }

    #[test]
    fn translation_roundtrip() {
        let (_dir, store) = test_store();
        store.put_cached_translation(&sample_entry("house", None)).unwrap();

        let hit = store
            .get_cached_translation("house", "en", "ru")
            .unwrap()
            .unwrap();
        assert_eq!(hit.payload.translations, vec!["дом"]);
        assert!(store.get_cached_translation("mouse", "en", "ru").unwrap().is_none());
    }

    #[test]
    fn validation_roundtrip() {
        let (_dir, store) = test_store();
        let entry = ValidationCacheEntry {
            correct: true,
            comment: "synonym accepted".to_string(),
            cached_at: Utc::now(),
        };
        store
            .put_cached_validation("w1", Direction::NativeToForeign, "красивый", "прекрасный", &entry)
            .unwrap();

        let hit = store
            .get_cached_validation("w1", Direction::NativeToForeign, "красивый", "прекрасный")
            .unwrap()
            .unwrap();
        assert_eq!(hit, entry);
    }

    #[test]
    fn cleanup_removes_only_expired() {
        let (_dir, store) = test_store();
        let now = Utc::now();
        store
            .put_cached_translation(&sample_entry("old", Some(now - chrono::Duration::hours(1))))
            .unwrap();
        store
            .put_cached_translation(&sample_entry("fresh", Some(now + chrono::Duration::hours(1))))
            .unwrap();
        store.put_cached_translation(&sample_entry("keep", None)).unwrap();

        let removed = store.cleanup_expired_translations(now).unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_cached_translation("old", "en", "ru").unwrap().is_none());
        assert!(store.get_cached_translation("fresh", "en", "ru").unwrap().is_some());
        assert!(store.get_cached_translation("keep", "en", "ru").unwrap().is_some());
    }
}
