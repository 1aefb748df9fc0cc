//! Test-type and status progression over the per-facet counters.

use crate::store::operations::user_words::WordStatus;
use crate::store::operations::word_stats::{TestType, WordStat};

use crate::constants::REVIEWING_TOTAL_CORRECT;

/// Input questions unlock once any choice facet has reached the streak
/// threshold; the unlock is permanent because choice facets stop being
/// exercised afterwards.
pub fn preferred_test_type(stats: &[WordStat], choice_to_input_threshold: u32) -> TestType {
    let input_ready = stats
        .iter()
        .any(|s| s.test_type == TestType::Choice && s.streak_correct >= choice_to_input_threshold);
    if input_ready {
        TestType::Input
    } else {
        TestType::Choice
    }
}

/// Status after a graded answer has been folded into `stats`.
///
/// `new → learning` on the first attempt, `learning → reviewing` once any
/// facet accumulates enough correct answers, and any facet streak at the
/// mastery threshold ends the word's run. Mastery is terminal; failures
/// reset facet streaks but never demote the status.
pub fn next_status(
    current: WordStatus,
    stats: &[WordStat],
    mastered_threshold: u32,
) -> WordStatus {
    if current == WordStatus::Mastered {
        return WordStatus::Mastered;
    }

    if stats
        .iter()
        .any(|s| s.streak_correct >= mastered_threshold)
    {
        return WordStatus::Mastered;
    }

    let total_correct_best = stats.iter().map(|s| s.total_correct).max().unwrap_or(0);
    match current {
        WordStatus::New => {
            if total_correct_best >= REVIEWING_TOTAL_CORRECT {
                WordStatus::Reviewing
            } else {
                WordStatus::Learning
            }
        }
        WordStatus::Learning => {
            if total_correct_best >= REVIEWING_TOTAL_CORRECT {
                WordStatus::Reviewing
            } else {
                WordStatus::Learning
            }
        }
        other => other,
    }
}
