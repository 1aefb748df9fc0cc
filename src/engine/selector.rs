//! 选词评分模块：对候选词打分排序，组装一节课的单词队列

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::engine::progression;
use crate::response::AppError;
use crate::store::operations::user_words::{UserWord, WordStatus};
use crate::store::operations::word_stats::WordStat;
use crate::store::Store;

/// 过期天数权重
const OVERDUE_WEIGHT: f64 = 10.0;
/// 错误率权重
const ERROR_RATE_WEIGHT: f64 = 5.0;
/// 新词加分
const NEW_WORD_BONUS: f64 = 15.0;
/// 闲置天数上限
const STALENESS_CAP: f64 = 7.0;
/// 学习中加分
const LEARNING_BONUS: f64 = 3.0;
/// 复习中加分
const REVIEWING_BONUS: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct ScoredWord {
    pub user_word: UserWord,
    pub score: f64,
    pub input_ready: bool,
}

fn score_desc(a: &ScoredWord, b: &ScoredWord) -> Ordering {
    b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal)
}

fn retain_top_k_by_score(words: &mut Vec<ScoredWord>, k: usize) {
    if k == 0 {
        words.clear();
        return;
    }

    if words.len() <= k {
        words.sort_by(score_desc);
        return;
    }

    words.select_nth_unstable_by(k - 1, score_desc);
    words.truncate(k);
    words.sort_by(score_desc);
}

/// Priority of one candidate at `now`: overdue reviews dominate, struggling
/// and fresh words follow, staleness breaks ties.
pub fn score_word(user_word: &UserWord, stats: &[WordStat], now: DateTime<Utc>) -> f64 {
    let days_overdue = user_word
        .next_review_at
        .map(|due| (now - due).num_days().max(0) as f64)
        .unwrap_or(0.0);

    let (attempts, errors) = stats.iter().fold((0u32, 0u32), |(a, e), s| {
        (a + s.total_attempts, e + s.total_errors)
    });
    let error_rate = if attempts > 0 {
        errors as f64 / attempts as f64
    } else {
        0.0
    };

    let staleness = user_word
        .last_reviewed_at
        .map(|last| ((now - last).num_days().max(0) as f64).min(STALENESS_CAP))
        .unwrap_or(0.0);

    let mut score = OVERDUE_WEIGHT * days_overdue + ERROR_RATE_WEIGHT * error_rate + staleness;
    match user_word.status {
        WordStatus::New => score += NEW_WORD_BONUS,
        WordStatus::Learning => score += LEARNING_BONUS,
        WordStatus::Reviewing => score += REVIEWING_BONUS,
        WordStatus::Mastered => {}
    }
    score
}

/// Assemble a lesson queue for a profile: at most `count` non-mastered
/// words, half of them input-ready when the vocabulary allows, each bucket
/// ordered by descending score and interleaved proportionally.
pub fn select_words(
    store: &Store,
    profile_id: &str,
    count: usize,
    choice_to_input_threshold: u32,
    now: DateTime<Utc>,
) -> Result<Vec<UserWord>, AppError> {
    if count == 0 {
        return Ok(Vec::new());
    }

    let candidates: Vec<UserWord> = store
        .list_user_words_by_profile(profile_id)?
        .into_iter()
        .filter(|uw| uw.status != WordStatus::Mastered)
        .collect();
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let candidate_ids: Vec<String> = candidates.iter().map(|uw| uw.id.clone()).collect();
    let stats_by_id = store.word_stats_by_user_word(&candidate_ids)?;
    let empty: Vec<WordStat> = Vec::new();

    let mut input_ready: Vec<ScoredWord> = Vec::new();
    let mut choice_bound: Vec<ScoredWord> = Vec::new();
    for user_word in candidates {
        let stats = stats_by_id.get(&user_word.id).unwrap_or(&empty);
        let score = score_word(&user_word, stats, now);
        let ready = progression::preferred_test_type(stats, choice_to_input_threshold)
            == crate::store::operations::word_stats::TestType::Input;
        let scored = ScoredWord {
            user_word,
            score,
            input_ready: ready,
        };
        if ready {
            input_ready.push(scored);
        } else {
            choice_bound.push(scored);
        }
    }

    // 目标配比：一半输入题候选；任一桶不足时由另一桶补齐
    input_ready.sort_by(score_desc);
    choice_bound.sort_by(score_desc);
    let input_target = count / 2;
    let input_take = input_target.min(input_ready.len());
    let choice_take = (count - input_take).min(choice_bound.len());
    let input_take = (count - choice_take).min(input_ready.len());

    retain_top_k_by_score(&mut input_ready, input_take);
    retain_top_k_by_score(&mut choice_bound, choice_take);

    // 两桶按比例交叉排列，保持各自的分数降序
    let total = input_take + choice_take;
    let mut result: Vec<UserWord> = Vec::with_capacity(total);
    let mut ready_iter = input_ready.into_iter();
    let mut bound_iter = choice_bound.into_iter();
    let mut ri = 0usize;
    let mut bi = 0usize;
    for i in 0..total {
        let ready_target = ((i + 1) * input_take) / total;
        if ri < input_take && ri < ready_target {
            if let Some(w) = ready_iter.next() {
                result.push(w.user_word);
            }
            ri += 1;
        } else if bi < choice_take {
            if let Some(w) = bound_iter.next() {
                result.push(w.user_word);
            }
            bi += 1;
        } else if ri < input_take {
            if let Some(w) = ready_iter.next() {
                result.push(w.user_word);
            }
            ri += 1;
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::tempdir;

    use crate::store::operations::word_stats::{Direction, TestType};

    use super::*;

    fn test_store() -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        (dir, store)
    }

    fn user_word(id: &str, status: WordStatus) -> UserWord {
        let mut uw = UserWord::new(id, "p1", &format!("word-{id}"), 2.5, Utc::now());
        uw.status = status;
        uw
    }

    fn seeded_stat(uw_id: &str, streak: u32, errors: u32, attempts: u32) -> WordStat {
        WordStat {
            user_word_id: uw_id.to_string(),
            direction: Direction::ForeignToNative,
            test_type: TestType::Choice,
            streak_correct: streak,
            total_attempts: attempts,
            total_correct: attempts - errors,
            total_errors: errors,
        }
    }

    #[test]
    fn overdue_words_outrank_fresh_ones() {
        let now = Utc::now();
        let mut overdue = user_word("uw1", WordStatus::Reviewing);
        overdue.next_review_at = Some(now - Duration::days(3));

        let mut scheduled = user_word("uw2", WordStatus::Reviewing);
        scheduled.next_review_at = Some(now + Duration::days(3));

        assert!(score_word(&overdue, &[], now) > score_word(&scheduled, &[], now));
    }

    #[test]
    fn new_words_get_their_bonus() {
        let now = Utc::now();
        let fresh = user_word("uw1", WordStatus::New);
        let reviewing = user_word("uw2", WordStatus::Reviewing);
        assert!(score_word(&fresh, &[], now) > score_word(&reviewing, &[], now));
    }

    #[test]
    fn error_rate_raises_priority() {
        let now = Utc::now();
        let word = user_word("uw1", WordStatus::Learning);
        let struggling = [seeded_stat("uw1", 0, 5, 10)];
        let smooth = [seeded_stat("uw1", 5, 0, 10)];
        assert!(score_word(&word, &struggling, now) > score_word(&word, &smooth, now));
    }

    #[test]
    fn mastered_words_are_never_selected() {
        let (_dir, store) = test_store();
        store.add_user_word(&user_word("uw1", WordStatus::New)).unwrap();
        let mut mastered = user_word("uw2", WordStatus::Mastered);
        mastered.status = WordStatus::Mastered;
        store.add_user_word(&mastered).unwrap();

        let selected = select_words(&store, "p1", 30, 3, Utc::now()).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "uw1");
    }

    #[test]
    fn returns_at_most_count() {
        let (_dir, store) = test_store();
        for i in 0..40 {
            store
                .add_user_word(&user_word(&format!("uw{i}"), WordStatus::New))
                .unwrap();
        }
        let selected = select_words(&store, "p1", 30, 3, Utc::now()).unwrap();
        assert_eq!(selected.len(), 30);
    }

    #[test]
    fn buckets_fill_from_each_other_when_short() {
        let (_dir, store) = test_store();
        // Only choice-bound words exist; the input half is backfilled.
        for i in 0..10 {
            store
                .add_user_word(&user_word(&format!("uw{i}"), WordStatus::Learning))
                .unwrap();
        }
        let selected = select_words(&store, "p1", 10, 3, Utc::now()).unwrap();
        assert_eq!(selected.len(), 10);
    }

    #[test]
    fn input_ready_words_take_half_the_queue() {
        let (_dir, store) = test_store();
        for i in 0..6 {
            let uw = user_word(&format!("ready{i}"), WordStatus::Reviewing);
            store.add_user_word(&uw).unwrap();
            store
                .put_word_stat(&seeded_stat(&format!("ready{i}"), 3, 0, 5))
                .unwrap();
        }
        for i in 0..6 {
            store
                .add_user_word(&user_word(&format!("bound{i}"), WordStatus::Learning))
                .unwrap();
        }

        let selected = select_words(&store, "p1", 6, 3, Utc::now()).unwrap();
        assert_eq!(selected.len(), 6);
        let ready_count = selected
            .iter()
            .filter(|uw| uw.id.starts_with("ready"))
            .count();
        assert_eq!(ready_count, 3);
    }
}
