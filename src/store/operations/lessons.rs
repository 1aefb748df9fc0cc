use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::TransactionError;
use sled::Transactional;

use crate::constants::MAX_CAS_RETRIES;
use crate::store::keys;
use crate::store::operations::user_words::UserWord;
use crate::store::operations::word_stats::{Direction, TestType, WordStat};
use crate::store::{Store, StoreError};

/// How an answer was graded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GradeMethod {
    Exact,
    Fuzzy,
    Model,
}

/// The currently open question of an active lesson. Persisted on the lesson
/// so an answer arriving after a restart can still be graded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingQuestion {
    pub user_word_id: String,
    pub word_id: String,
    pub direction: Direction,
    pub test_type: TestType,
    pub prompt: String,
    pub expected: String,
    pub alternatives: Vec<String>,
    /// Shuffled options for choice questions, empty for input questions.
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    pub profile_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub planned_count: u32,
    pub correct: u32,
    pub incorrect: u32,
    pub word_queue: Vec<String>,
    pub current: Option<PendingQuestion>,
}

impl Lesson {
    pub fn new(
        id: &str,
        profile_id: &str,
        word_queue: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.to_string(),
            profile_id: profile_id.to_string(),
            started_at: now,
            completed_at: None,
            planned_count: word_queue.len() as u32,
            correct: 0,
            incorrect: 0,
            word_queue,
            current: None,
        }
    }

    pub fn answered_count(&self) -> u32 {
        self.correct + self.incorrect
    }

    /// The queue head that has not been asked yet.
    pub fn next_queued_word(&self) -> Option<&str> {
        self.word_queue
            .get(self.answered_count() as usize)
            .map(|s| s.as_str())
    }

    pub fn is_exhausted(&self) -> bool {
        self.answered_count() as usize >= self.word_queue.len()
    }

    pub fn summary(&self, completed_at: DateTime<Utc>) -> LessonSummary {
        let answered = self.answered_count();
        let accuracy = if answered > 0 {
            self.correct as f64 / answered as f64 * 100.0
        } else {
            0.0
        };
        LessonSummary {
            planned_count: self.planned_count,
            correct: self.correct,
            incorrect: self.incorrect,
            accuracy,
            duration_secs: (completed_at - self.started_at).num_seconds().max(0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LessonSummary {
    pub planned_count: u32,
    pub correct: u32,
    pub incorrect: u32,
    pub accuracy: f64,
    pub duration_secs: i64,
}

/// Append-only answer record within a lesson.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonAttempt {
    pub lesson_id: String,
    pub seq: u32,
    pub user_word_id: String,
    pub direction: Direction,
    pub test_type: TestType,
    pub user_answer: String,
    pub expected: String,
    pub correct: bool,
    pub method: GradeMethod,
    pub attempted_at: DateTime<Utc>,
}

impl Store {
    /// Create a lesson under the active-lesson partial unique constraint:
    /// the index insert aborts when the profile already has an open lesson,
    /// so a racing second Start resolves to Conflict and resumes instead.
    pub fn create_lesson(&self, lesson: &Lesson) -> Result<(), StoreError> {
        let lesson_key = keys::lesson_key(&lesson.id);
        let active_key = keys::active_lesson_key(&lesson.profile_id);
        let lesson_bytes = Self::serialize(lesson)?;
        let lesson_id = lesson.id.clone();

        let result = (&self.lessons, &self.active_lessons).transaction(
            |(lessons, actives)| {
                if actives.get(active_key.as_bytes())?.is_some() {
                    return sled::transaction::abort(());
                }
                actives.insert(active_key.as_bytes(), lesson_id.as_bytes())?;
                lessons.insert(lesson_key.as_bytes(), lesson_bytes.as_slice())?;
                Ok(())
            },
        );

        result.map_err(|e: TransactionError<()>| match e {
            TransactionError::Abort(()) => StoreError::Conflict {
                entity: "active_lesson".to_string(),
                key: lesson.profile_id.clone(),
            },
            TransactionError::Storage(se) => StoreError::Sled(se),
        })
    }

    pub fn get_lesson(&self, lesson_id: &str) -> Result<Option<Lesson>, StoreError> {
        let key = keys::lesson_key(lesson_id);
        match self.lessons.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn get_active_lesson(&self, profile_id: &str) -> Result<Option<Lesson>, StoreError> {
        let key = keys::active_lesson_key(profile_id);
        match self.active_lessons.get(key.as_bytes())? {
            Some(lesson_id_raw) => {
                let lesson_id = String::from_utf8(lesson_id_raw.to_vec()).unwrap_or_default();
                self.get_lesson(&lesson_id)
            }
            None => Ok(None),
        }
    }

    /// 使用 CAS 保护课程更新（当前问题、队列），防止并发写入丢失。
    pub fn update_lesson(&self, lesson: &Lesson) -> Result<(), StoreError> {
        let key = keys::lesson_key(&lesson.id);
        let new_bytes = Self::serialize(lesson)?;

        for _ in 0..MAX_CAS_RETRIES {
            let old_raw = self.lessons.get(key.as_bytes())?;
            if old_raw.is_none() {
                return Err(StoreError::NotFound {
                    entity: "lesson".to_string(),
                    key: lesson.id.clone(),
                });
            }
            match self
                .lessons
                .compare_and_swap(key.as_bytes(), old_raw, Some(new_bytes.as_slice()))?
            {
                Ok(()) => return Ok(()),
                Err(_) => continue,
            }
        }
        Err(StoreError::CasRetryExhausted {
            entity: "lesson".to_string(),
            key: lesson.id.clone(),
            attempts: MAX_CAS_RETRIES,
        })
    }

    /// Persist one graded answer as a single unit of work: the updated
    /// lesson, the appended attempt, the rescheduled user word, the facet
    /// counters and the due index commit together or not at all. When the
    /// lesson is complete the active-lesson index entry is removed in the
    /// same transaction.
    pub fn apply_answer(
        &self,
        lesson: &Lesson,
        attempt: &LessonAttempt,
        user_word: &UserWord,
        prev_next_review_at: Option<DateTime<Utc>>,
        stat: &WordStat,
    ) -> Result<(), StoreError> {
        let lesson_key = keys::lesson_key(&lesson.id);
        let attempt_key = keys::lesson_attempt_key(&attempt.lesson_id, attempt.seq);
        let uw_key = keys::user_word_key(&user_word.id);
        let stat_key = keys::word_stat_key(&stat.user_word_id, stat.direction, stat.test_type);
        let active_key = keys::active_lesson_key(&lesson.profile_id);
        let old_due_key = prev_next_review_at.map(|due| {
            keys::user_word_due_key(&user_word.profile_id, due.timestamp_millis(), &user_word.id)
        });
        let new_due_key = user_word.next_review_at.map(|due| {
            keys::user_word_due_key(&user_word.profile_id, due.timestamp_millis(), &user_word.id)
        });

        let lesson_bytes = Self::serialize(lesson)?;
        let attempt_bytes = Self::serialize(attempt)?;
        let uw_bytes = Self::serialize(user_word)?;
        let stat_bytes = Self::serialize(stat)?;
        let completed = lesson.completed_at.is_some();

        let result = (
            &self.lessons,
            &self.lesson_attempts,
            &self.user_words,
            &self.word_stats,
            &self.user_words_due,
            &self.active_lessons,
        )
            .transaction(
                |(lessons, attempts, user_words, word_stats, due_index, actives)| {
                    lessons.insert(lesson_key.as_bytes(), lesson_bytes.as_slice())?;
                    attempts.insert(attempt_key.as_bytes(), attempt_bytes.as_slice())?;
                    user_words.insert(uw_key.as_bytes(), uw_bytes.as_slice())?;
                    word_stats.insert(stat_key.as_bytes(), stat_bytes.as_slice())?;
                    if let Some(old_key) = &old_due_key {
                        due_index.remove(old_key.as_bytes())?;
                    }
                    if let Some(new_key) = &new_due_key {
                        due_index.insert(new_key.as_bytes(), uw_key.as_bytes())?;
                    }
                    if completed {
                        actives.remove(active_key.as_bytes())?;
                    }
                    Ok(())
                },
            );

        result.map_err(|e: TransactionError<()>| match e {
            TransactionError::Abort(()) => StoreError::Conflict {
                entity: "lesson_answer".to_string(),
                key: lesson.id.clone(),
            },
            TransactionError::Storage(se) => StoreError::Sled(se),
        })
    }

    /// Close a lesson without a final answer (manual abandon or timeout).
    pub fn complete_lesson(
        &self,
        lesson: &mut Lesson,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        lesson.completed_at = Some(now);
        lesson.current = None;

        let lesson_key = keys::lesson_key(&lesson.id);
        let active_key = keys::active_lesson_key(&lesson.profile_id);
        let lesson_bytes = Self::serialize(lesson)?;

        let result = (&self.lessons, &self.active_lessons).transaction(
            |(lessons, actives)| {
                lessons.insert(lesson_key.as_bytes(), lesson_bytes.as_slice())?;
                actives.remove(active_key.as_bytes())?;
                Ok(())
            },
        );

        result.map_err(|e: TransactionError<()>| match e {
            TransactionError::Abort(()) => StoreError::Conflict {
                entity: "lesson".to_string(),
                key: lesson.id.clone(),
            },
            TransactionError::Storage(se) => StoreError::Sled(se),
        })
    }

    /// Attempts in `attempted_at` order (the key embeds the sequence number).
    pub fn list_lesson_attempts(&self, lesson_id: &str) -> Result<Vec<LessonAttempt>, StoreError> {
        let prefix = keys::lesson_attempt_prefix(lesson_id);
        let mut attempts = Vec::new();
        for item in self.lesson_attempts.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = item?;
            attempts.push(Self::deserialize::<LessonAttempt>(&raw)?);
        }
        Ok(attempts)
    }
}
