//! Lesson lifecycle: start/resume with the single-active-lesson constraint,
//! question generation, transactional answer application, completion summary.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;

use crate::config::{LessonConfig, SrConfig};
use crate::constants::CHOICE_OPTION_COUNT;
use crate::engine::validator::{self, GradeInput, Verdict};
use crate::engine::{progression, selector, srs};
use crate::llm::{prompts, LlmGateway};
use crate::response::AppError;
use crate::store::operations::lessons::{Lesson, LessonAttempt, LessonSummary, PendingQuestion};
use crate::store::operations::profiles::Profile;
use crate::store::operations::users::User;
use crate::store::operations::word_stats::{Direction, TestType, WordStat};
use crate::store::operations::words::Word;
use crate::store::{retry_transient, Store, StoreError};

/// 干扰项候选池扫描上限
const DISTRACTOR_POOL_LIMIT: usize = 50;

pub struct LessonEngine {
    store: Arc<Store>,
    gateway: Arc<LlmGateway>,
    lesson_cfg: LessonConfig,
    sr_cfg: SrConfig,
}

#[derive(Debug)]
pub enum StartOutcome {
    /// A fresh lesson with its first question.
    Started {
        lesson: Lesson,
        question: PendingQuestion,
    },
    /// The open lesson was picked up again.
    Resumed {
        lesson: Lesson,
        question: PendingQuestion,
    },
    /// Nothing to practice: the profile has no selectable words.
    EmptyVocabulary,
}

#[derive(Debug, Clone, Copy)]
pub enum AnswerInput<'a> {
    Text(&'a str),
    Choice(usize),
}

#[derive(Debug)]
pub struct AnswerOutcome {
    pub verdict: Verdict,
    pub next: Option<PendingQuestion>,
    pub summary: Option<LessonSummary>,
}

impl LessonEngine {
    pub fn new(
        store: Arc<Store>,
        gateway: Arc<LlmGateway>,
        lesson_cfg: LessonConfig,
        sr_cfg: SrConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            lesson_cfg,
            sr_cfg,
        }
    }

    /// Start a lesson, or resume the open one. An open lesson past the
    /// inactivity timeout is auto-completed first. A create racing another
    /// Start loses the index insert and resumes the winner's lesson.
    pub async fn start_lesson(
        &self,
        user: &User,
        profile: &Profile,
        now: DateTime<Utc>,
    ) -> Result<StartOutcome, AppError> {
        let timeout = Duration::seconds(self.lesson_cfg.lesson_timeout_secs as i64);

        for _ in 0..2 {
            if let Some(active) = self.store.get_active_lesson(&profile.id)? {
                if now - active.started_at > timeout {
                    tracing::info!(
                        lesson_id = %active.id,
                        profile_id = %profile.id,
                        "Auto-completing timed-out lesson"
                    );
                    retry_transient("lesson_complete", || {
                        let mut stale = active.clone();
                        self.store.complete_lesson(&mut stale, now)
                    })
                    .await?;
                } else {
                    let mut active = active;
                    match self.ensure_question(user, profile, &mut active).await? {
                        Some(question) => {
                            return Ok(StartOutcome::Resumed {
                                lesson: active,
                                question,
                            })
                        }
                        None => {
                            // 队列已空但未结课（历史数据修剪），直接收尾重开
                            retry_transient("lesson_complete", || {
                                let mut empty = active.clone();
                                self.store.complete_lesson(&mut empty, now)
                            })
                            .await?;
                        }
                    }
                }
            }

            let queue = selector::select_words(
                &self.store,
                &profile.id,
                self.lesson_cfg.words_per_lesson,
                self.lesson_cfg.choice_to_input_threshold,
                now,
            )?;
            if queue.is_empty() {
                return Ok(StartOutcome::EmptyVocabulary);
            }

            let word_queue: Vec<String> = queue.into_iter().map(|uw| uw.id).collect();
            let mut lesson = Lesson::new(
                &uuid::Uuid::new_v4().to_string(),
                &profile.id,
                word_queue,
                now,
            );

            match retry_transient("lesson_create", || self.store.create_lesson(&lesson)).await {
                Ok(()) => {
                    let question = self
                        .ensure_question(user, profile, &mut lesson)
                        .await?
                        .ok_or_else(|| {
                            AppError::internal("fresh lesson produced no first question")
                        })?;
                    tracing::info!(
                        lesson_id = %lesson.id,
                        profile_id = %profile.id,
                        planned = lesson.planned_count,
                        "Lesson started"
                    );
                    return Ok(StartOutcome::Started { lesson, question });
                }
                // 竞态落败：另一条 Start 已创建活跃课程，回到循环顶部改走 resume
                Err(StoreError::Conflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::conflict("could not start or resume a lesson"))
    }

    /// Grade an answer to the open question and fold the result into the
    /// lesson, the word's schedule and the facet counters in one store
    /// transaction. The model call happens before the transaction.
    pub async fn answer(
        &self,
        user: &User,
        profile: &Profile,
        input: AnswerInput<'_>,
        now: DateTime<Utc>,
    ) -> Result<AnswerOutcome, AppError> {
        let mut lesson = self
            .store
            .get_active_lesson(&profile.id)?
            .ok_or_else(|| AppError::not_found("no active lesson"))?;
        let pending = lesson
            .current
            .clone()
            .ok_or_else(|| AppError::invalid_input("no open question"))?;

        let answer_text = match input {
            AnswerInput::Text(text) => text.trim().to_string(),
            AnswerInput::Choice(index) => pending
                .options
                .get(index)
                .cloned()
                .ok_or_else(|| AppError::invalid_input("choice index out of range"))?,
        };

        let (src_lang, tgt_lang) = match pending.direction {
            Direction::ForeignToNative => (profile.target_lang.as_str(), user.native_lang.as_str()),
            Direction::NativeToForeign => (user.native_lang.as_str(), profile.target_lang.as_str()),
        };
        let verdict = match pending.test_type {
            TestType::Choice => {
                validator::grade_choice(&answer_text, &pending.expected, &pending.alternatives)
            }
            TestType::Input => {
                validator::grade(
                    &self.gateway,
                    self.lesson_cfg.fuzzy_threshold,
                    GradeInput {
                        user_answer: &answer_text,
                        expected: &pending.expected,
                        alternatives: &pending.alternatives,
                        word_id: &pending.word_id,
                        direction: pending.direction,
                        question: &pending.prompt,
                        src_lang,
                        tgt_lang,
                        comment_lang: prompts::language_name(&user.interface_lang),
                    },
                )
                .await
            }
        };

        let mut user_word = self
            .store
            .get_user_word(&pending.user_word_id)?
            .ok_or_else(|| AppError::internal("queued user word disappeared"))?;
        let mut stat = self
            .store
            .get_word_stat(&pending.user_word_id, pending.direction, pending.test_type)?
            .unwrap_or_else(|| {
                WordStat::new(&pending.user_word_id, pending.direction, pending.test_type)
            });
        stat.record(verdict.correct);

        let quality = srs::recall_quality(verdict.method, verdict.correct);
        let prev_next_review_at = user_word.next_review_at;
        let update = srs::reschedule(
            user_word.interval_days,
            user_word.ef,
            quality,
            now,
            &self.sr_cfg,
        );
        user_word.interval_days = update.interval_days;
        user_word.ef = update.ef;
        user_word.next_review_at = Some(update.next_review_at);
        user_word.last_reviewed_at = Some(now);

        // 状态判定基于全部维度的最新计数，含本次尚未落库的更新
        let mut stats = self.store.list_word_stats(&pending.user_word_id)?;
        if let Some(existing) = stats
            .iter_mut()
            .find(|s| s.direction == stat.direction && s.test_type == stat.test_type)
        {
            *existing = stat.clone();
        } else {
            stats.push(stat.clone());
        }
        user_word.status = progression::next_status(
            user_word.status,
            &stats,
            self.lesson_cfg.mastered_threshold,
        );

        if verdict.correct {
            lesson.correct += 1;
        } else {
            lesson.incorrect += 1;
        }
        lesson.current = None;
        let finished = lesson.is_exhausted();
        if finished {
            lesson.completed_at = Some(now);
        }

        let attempt = LessonAttempt {
            lesson_id: lesson.id.clone(),
            seq: lesson.answered_count(),
            user_word_id: pending.user_word_id.clone(),
            direction: pending.direction,
            test_type: pending.test_type,
            user_answer: answer_text,
            expected: pending.expected.clone(),
            correct: verdict.correct,
            method: verdict.method,
            attempted_at: now,
        };

        retry_transient("lesson_answer", || {
            self.store
                .apply_answer(&lesson, &attempt, &user_word, prev_next_review_at, &stat)
        })
        .await?;

        if finished {
            let summary = lesson.summary(now);
            tracing::info!(
                lesson_id = %lesson.id,
                correct = summary.correct,
                incorrect = summary.incorrect,
                accuracy = summary.accuracy,
                "Lesson completed"
            );
            return Ok(AnswerOutcome {
                verdict,
                next: None,
                summary: Some(summary),
            });
        }

        match self.ensure_question(user, profile, &mut lesson).await? {
            Some(next) => Ok(AnswerOutcome {
                verdict,
                next: Some(next),
                summary: None,
            }),
            None => {
                // 剩余队列全部不可出题（词条被修剪），提前结课
                retry_transient("lesson_complete", || {
                    let mut done = lesson.clone();
                    self.store.complete_lesson(&mut done, now)
                })
                .await?;
                Ok(AnswerOutcome {
                    verdict,
                    next: None,
                    summary: Some(lesson.summary(now)),
                })
            }
        }
    }

    /// Build and persist the next question, or return the one already open.
    /// Words that can no longer be asked (pruned dictionary entries, missing
    /// translations) are dropped from the queue.
    async fn ensure_question(
        &self,
        user: &User,
        profile: &Profile,
        lesson: &mut Lesson,
    ) -> Result<Option<PendingQuestion>, AppError> {
        if let Some(open) = &lesson.current {
            return Ok(Some(open.clone()));
        }

        loop {
            let Some(uw_id) = lesson.next_queued_word().map(str::to_string) else {
                return Ok(None);
            };

            let Some(user_word) = self.store.get_user_word(&uw_id)? else {
                self.drop_from_queue(lesson, &uw_id).await?;
                continue;
            };
            let Some(word) = self.store.get_word(&user_word.word_id)? else {
                self.drop_from_queue(lesson, &uw_id).await?;
                continue;
            };

            let stats = self.store.list_word_stats(&uw_id)?;
            let test_type = progression::preferred_test_type(
                &stats,
                self.lesson_cfg.choice_to_input_threshold,
            );
            let direction = if rand::random::<bool>() {
                Direction::NativeToForeign
            } else {
                Direction::ForeignToNative
            };

            let Some(translation) = word.primary_translation(&user.native_lang) else {
                self.drop_from_queue(lesson, &uw_id).await?;
                continue;
            };
            let (prompt, expected, alternatives) = match direction {
                Direction::ForeignToNative => (
                    word.text.clone(),
                    translation.to_string(),
                    word.alternative_translations(&user.native_lang),
                ),
                // 反向提问只有一个正确拼写；forms 是语法变体，不是备选答案
                Direction::NativeToForeign => {
                    (translation.to_string(), word.text.clone(), Vec::new())
                }
            };

            let options = if test_type == TestType::Choice {
                self.build_options(user, profile, &word, direction, &expected)?
            } else {
                Vec::new()
            };

            let question = PendingQuestion {
                user_word_id: uw_id,
                word_id: word.id.clone(),
                direction,
                test_type,
                prompt,
                expected,
                alternatives,
                options,
            };
            lesson.current = Some(question.clone());
            retry_transient("lesson_question", || self.store.update_lesson(lesson)).await?;
            return Ok(Some(question));
        }
    }

    /// Choice options: the expected answer plus distractors from the
    /// same-language same-level pool, deterministic order by frequency rank,
    /// then shuffled for presentation.
    fn build_options(
        &self,
        user: &User,
        profile: &Profile,
        word: &Word,
        direction: Direction,
        expected: &str,
    ) -> Result<Vec<String>, AppError> {
        let level = word.cefr.unwrap_or(profile.cefr);
        let pool =
            self.store
                .distractor_pool(&word.language, level, &word.id, DISTRACTOR_POOL_LIMIT)?;

        let expected_norm = validator::normalize(expected);
        let mut options = vec![expected.to_string()];
        for candidate in pool {
            if options.len() >= CHOICE_OPTION_COUNT {
                break;
            }
            let text = match direction {
                Direction::ForeignToNative => {
                    match candidate.primary_translation(&user.native_lang) {
                        Some(t) => t.to_string(),
                        None => continue,
                    }
                }
                Direction::NativeToForeign => candidate.text.clone(),
            };
            let text_norm = validator::normalize(&text);
            if text_norm == expected_norm
                || options.iter().any(|o| validator::normalize(o) == text_norm)
            {
                continue;
            }
            options.push(text);
        }

        options.shuffle(&mut rand::thread_rng());
        Ok(options)
    }

    async fn drop_from_queue(&self, lesson: &mut Lesson, uw_id: &str) -> Result<(), AppError> {
        tracing::warn!(
            lesson_id = %lesson.id,
            user_word_id = %uw_id,
            "Dropping unaskable word from lesson queue"
        );
        lesson.word_queue.retain(|id| id != uw_id);
        lesson.planned_count = lesson.word_queue.len() as u32;
        retry_transient("lesson_prune", || self.store.update_lesson(lesson)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tempfile::tempdir;

    use crate::config::LlmConfig;
    use crate::store::operations::profiles::Profile;
    use crate::store::operations::user_words::UserWord;
    use crate::store::operations::words::{Cefr, Word};

    use super::*;

    fn test_engine() -> (tempfile::TempDir, Arc<Store>, LessonEngine) {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("db").to_str().unwrap()).unwrap());
        let llm = LlmConfig {
            enabled: true,
            mock: true,
            api_url: String::new(),
            api_key: String::new(),
            model: "test".to_string(),
            rate_per_min: 1000,
            max_inflight: 4,
            circuit_fail_threshold: 5,
            circuit_recovery_secs: 60,
            call_timeout_secs: 1,
        };
        let gateway = Arc::new(LlmGateway::new(&llm, store.clone()));
        let engine = LessonEngine::new(
            store.clone(),
            gateway,
            LessonConfig::default(),
            SrConfig::default(),
        );
        (dir, store, engine)
    }

    fn sample_user() -> User {
        User {
            id: "u1".to_string(),
            native_lang: "ru".to_string(),
            interface_lang: "ru".to_string(),
            tz: "Europe/Moscow".to_string(),
            notifications_on: true,
            last_active_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    fn sample_profile() -> Profile {
        Profile {
            id: "p1".to_string(),
            user_id: "u1".to_string(),
            target_lang: "en".to_string(),
            cefr: Cefr::A1,
            active: true,
            created_at: Utc::now(),
        }
    }

    fn seed_word(store: &Store, id: &str, text: &str, translation: &str, rank: u32) {
        let mut translations = BTreeMap::new();
        translations.insert("ru".to_string(), vec![translation.to_string()]);
        store
            .create_word(&Word {
                id: id.to_string(),
                text: text.to_string(),
                language: "en".to_string(),
                cefr: Some(Cefr::A1),
                translations,
                examples: vec![],
                forms: BTreeMap::new(),
                freq_rank: Some(rank),
                created_at: Utc::now(),
            })
            .unwrap();
        store
            .add_user_word(&UserWord::new(
                &format!("uw-{id}"),
                "p1",
                id,
                2.5,
                Utc::now(),
            ))
            .unwrap();
    }

    fn seed_vocabulary(store: &Store) {
        seed_word(store, "w1", "house", "дом", 1);
        seed_word(store, "w2", "cat", "кошка", 2);
        seed_word(store, "w3", "dog", "собака", 3);
        seed_word(store, "w4", "water", "вода", 4);
        seed_word(store, "w5", "bread", "хлеб", 5);
    }

    #[tokio::test]
    async fn start_creates_lesson_with_choice_question() {
        let (_dir, store, engine) = test_engine();
        seed_vocabulary(&store);

        let outcome = engine
            .start_lesson(&sample_user(), &sample_profile(), Utc::now())
            .await
            .unwrap();
        let StartOutcome::Started { lesson, question } = outcome else {
            panic!("expected a fresh lesson");
        };
        assert_eq!(lesson.planned_count, 5);
        assert_eq!(question.test_type, TestType::Choice);
        assert!(question.options.len() >= 2);
        assert!(question.options.contains(&question.expected));
    }

    #[tokio::test]
    async fn second_start_resumes_not_duplicates() {
        let (_dir, store, engine) = test_engine();
        seed_vocabulary(&store);
        let user = sample_user();
        let profile = sample_profile();

        let first = engine.start_lesson(&user, &profile, Utc::now()).await.unwrap();
        let StartOutcome::Started { lesson, .. } = first else {
            panic!("expected a fresh lesson");
        };

        let second = engine.start_lesson(&user, &profile, Utc::now()).await.unwrap();
        let StartOutcome::Resumed { lesson: resumed, .. } = second else {
            panic!("expected resume");
        };
        assert_eq!(resumed.id, lesson.id);
    }

    #[tokio::test]
    async fn timed_out_lesson_is_replaced() {
        let (_dir, store, engine) = test_engine();
        seed_vocabulary(&store);
        let user = sample_user();
        let profile = sample_profile();

        let started_at = Utc::now() - Duration::hours(3);
        let first = engine.start_lesson(&user, &profile, started_at).await.unwrap();
        let StartOutcome::Started { lesson, .. } = first else {
            panic!("expected a fresh lesson");
        };

        let second = engine.start_lesson(&user, &profile, Utc::now()).await.unwrap();
        let StartOutcome::Started { lesson: fresh, .. } = second else {
            panic!("expected a fresh lesson after timeout");
        };
        assert_ne!(fresh.id, lesson.id);

        let stale = store.get_lesson(&lesson.id).unwrap().unwrap();
        assert!(stale.completed_at.is_some());
    }

    #[tokio::test]
    async fn empty_vocabulary_reports_empty() {
        let (_dir, _store, engine) = test_engine();
        let outcome = engine
            .start_lesson(&sample_user(), &sample_profile(), Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, StartOutcome::EmptyVocabulary));
    }

    #[tokio::test]
    async fn correct_answer_advances_and_updates_state() {
        let (_dir, store, engine) = test_engine();
        seed_vocabulary(&store);
        let user = sample_user();
        let profile = sample_profile();

        let outcome = engine.start_lesson(&user, &profile, Utc::now()).await.unwrap();
        let StartOutcome::Started { question, .. } = outcome else {
            panic!("expected a fresh lesson");
        };

        let result = engine
            .answer(
                &user,
                &profile,
                AnswerInput::Text(&question.expected),
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(result.verdict.correct);
        assert!(result.next.is_some());
        assert!(result.summary.is_none());

        let uw = store.get_user_word(&question.user_word_id).unwrap().unwrap();
        assert_eq!(uw.interval_days, 1);
        assert!(uw.next_review_at.is_some());
        assert!(uw.last_reviewed_at.is_some());
        assert_ne!(
            uw.status,
            crate::store::operations::user_words::WordStatus::New
        );

        let stat = store
            .get_word_stat(&question.user_word_id, question.direction, question.test_type)
            .unwrap()
            .unwrap();
        assert_eq!(stat.total_attempts, 1);
        assert_eq!(stat.streak_correct, 1);
    }

    #[tokio::test]
    async fn full_lesson_produces_summary() {
        let (_dir, store, engine) = test_engine();
        seed_vocabulary(&store);
        let user = sample_user();
        let profile = sample_profile();

        let outcome = engine.start_lesson(&user, &profile, Utc::now()).await.unwrap();
        let StartOutcome::Started { mut question, .. } = outcome else {
            panic!("expected a fresh lesson");
        };

        let mut summary = None;
        for _ in 0..5 {
            let result = engine
                .answer(
                    &user,
                    &profile,
                    AnswerInput::Text(&question.expected),
                    Utc::now(),
                )
                .await
                .unwrap();
            match result.next {
                Some(next) => question = next,
                None => {
                    summary = result.summary;
                    break;
                }
            }
        }

        let summary = summary.expect("lesson should finish after five answers");
        assert_eq!(summary.planned_count, 5);
        assert_eq!(summary.correct, 5);
        assert_eq!(summary.incorrect, 0);
        assert!((summary.accuracy - 100.0).abs() < f64::EPSILON);
        assert!(store.get_active_lesson("p1").unwrap().is_none());
    }

    #[tokio::test]
    async fn wrong_choice_counts_as_incorrect() {
        let (_dir, store, engine) = test_engine();
        seed_vocabulary(&store);
        let user = sample_user();
        let profile = sample_profile();

        let outcome = engine.start_lesson(&user, &profile, Utc::now()).await.unwrap();
        let StartOutcome::Started { question, .. } = outcome else {
            panic!("expected a fresh lesson");
        };

        let wrong = question
            .options
            .iter()
            .position(|o| o != &question.expected)
            .expect("choice question has a distractor");
        let result = engine
            .answer(&user, &profile, AnswerInput::Choice(wrong), Utc::now())
            .await
            .unwrap();
        assert!(!result.verdict.correct);

        let lesson = store.get_active_lesson("p1").unwrap().unwrap();
        assert_eq!(lesson.incorrect, 1);
    }

    #[tokio::test]
    async fn grammatical_forms_are_not_accepted_answers() {
        let (_dir, store, engine) = test_engine();
        let user = sample_user();
        let profile = sample_profile();

        // A word whose inflected form is far from the base spelling.
        let mut translations = BTreeMap::new();
        translations.insert("ru".to_string(), vec!["идти".to_string()]);
        let mut forms = BTreeMap::new();
        forms.insert("past".to_string(), "went".to_string());
        store
            .create_word(&Word {
                id: "w1".to_string(),
                text: "go".to_string(),
                language: "en".to_string(),
                cefr: Some(Cefr::A1),
                translations,
                examples: vec![],
                forms,
                freq_rank: Some(1),
                created_at: Utc::now(),
            })
            .unwrap();
        store
            .add_user_word(&UserWord::new("uw-w1", "p1", "w1", 2.5, Utc::now()))
            .unwrap();

        // Input-ready, so the answer is typed rather than picked.
        let mut stat = WordStat::new("uw-w1", Direction::ForeignToNative, TestType::Choice);
        stat.streak_correct = 3;
        stat.total_attempts = 3;
        stat.total_correct = 3;
        store.put_word_stat(&stat).unwrap();

        // Direction is drawn at random per question; reroll lessons until the
        // native-to-foreign one comes up.
        let mut question = None;
        for _ in 0..50 {
            let outcome = engine.start_lesson(&user, &profile, Utc::now()).await.unwrap();
            let (StartOutcome::Started { question: q, .. }
            | StartOutcome::Resumed { question: q, .. }) = outcome
            else {
                panic!("vocabulary is seeded");
            };
            if q.direction == Direction::NativeToForeign {
                question = Some(q);
                break;
            }
            let mut lesson = store.get_active_lesson("p1").unwrap().unwrap();
            store.complete_lesson(&mut lesson, Utc::now()).unwrap();
        }
        let question = question.expect("a native-to-foreign question within the reroll bound");
        assert!(question.alternatives.is_empty());

        // The past-tense form is not the spelling being tested; mock grading
        // rejects it once the exact and fuzzy levels fail.
        let result = engine
            .answer(&user, &profile, AnswerInput::Text("went"), Utc::now())
            .await
            .unwrap();
        assert!(!result.verdict.correct);
    }

    #[tokio::test]
    async fn answer_without_lesson_is_not_found() {
        let (_dir, _store, engine) = test_engine();
        let err = engine
            .answer(
                &sample_user(),
                &sample_profile(),
                AnswerInput::Text("дом"),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::response::codes::NOT_FOUND);
    }
}
