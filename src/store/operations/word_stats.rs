use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

/// Translation direction of a question.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    NativeToForeign,
    ForeignToNative,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NativeToForeign => "native_to_foreign",
            Self::ForeignToNative => "foreign_to_native",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    Choice,
    Input,
}

impl TestType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Choice => "choice",
            Self::Input => "input",
        }
    }
}

/// Per-facet counters: one row per `(user_word, direction, test_type)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordStat {
    pub user_word_id: String,
    pub direction: Direction,
    pub test_type: TestType,
    pub streak_correct: u32,
    pub total_attempts: u32,
    pub total_correct: u32,
    pub total_errors: u32,
}

impl WordStat {
    pub fn new(user_word_id: &str, direction: Direction, test_type: TestType) -> Self {
        Self {
            user_word_id: user_word_id.to_string(),
            direction,
            test_type,
            streak_correct: 0,
            total_attempts: 0,
            total_correct: 0,
            total_errors: 0,
        }
    }

    /// Apply one graded answer to the counters.
    pub fn record(&mut self, correct: bool) {
        self.total_attempts += 1;
        if correct {
            self.total_correct += 1;
            self.streak_correct += 1;
        } else {
            self.total_errors += 1;
            self.streak_correct = 0;
        }
    }
}

impl Store {
    pub fn get_word_stat(
        &self,
        user_word_id: &str,
        direction: Direction,
        test_type: TestType,
    ) -> Result<Option<WordStat>, StoreError> {
        let key = keys::word_stat_key(user_word_id, direction, test_type);
        match self.word_stats.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// All facets recorded for one user word (up to four rows).
    pub fn list_word_stats(&self, user_word_id: &str) -> Result<Vec<WordStat>, StoreError> {
        let prefix = keys::word_stat_prefix(user_word_id);
        let mut stats = Vec::new();
        for item in self.word_stats.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = item?;
            stats.push(Self::deserialize::<WordStat>(&raw)?);
        }
        Ok(stats)
    }

    /// Batch facet load for the selector: one prefix scan per user word,
    /// results keyed by user_word_id. Eagerly loaded, never lazy.
    pub fn word_stats_by_user_word(
        &self,
        user_word_ids: &[String],
    ) -> Result<HashMap<String, Vec<WordStat>>, StoreError> {
        let mut by_word: HashMap<String, Vec<WordStat>> = HashMap::new();
        for uw_id in user_word_ids {
            let stats = self.list_word_stats(uw_id)?;
            if !stats.is_empty() {
                by_word.insert(uw_id.clone(), stats);
            }
        }
        Ok(by_word)
    }

    pub fn put_word_stat(&self, stat: &WordStat) -> Result<(), StoreError> {
        let key = keys::word_stat_key(&stat.user_word_id, stat.direction, stat.test_type);
        self.word_stats
            .insert(key.as_bytes(), Self::serialize(stat)?)?;
        Ok(())
    }
}
