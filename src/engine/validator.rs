//! Three-level answer grading: exact match, typo tolerance, model escalation.
//!
//! A wrong answer is a domain outcome, never an error: this module always
//! returns a [`Verdict`]. Infrastructure failures during escalation degrade
//! to a conservative rejection.

use crate::llm::{GatewayError, LlmGateway, ValidationRequest};
use crate::store::operations::lessons::GradeMethod;
use crate::store::operations::word_stats::Direction;

/// Structured feedback; the chat layer renders it in the user's interface
/// language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    None,
    /// Accepted with a small typo.
    Typo { expected: String },
    /// Model comment, already written in the interface language.
    Comment(String),
    /// Rejected; show what was expected.
    Expected { expected: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub correct: bool,
    pub method: GradeMethod,
    pub feedback: Feedback,
}

/// Everything the grader needs; language fields are used only on escalation.
#[derive(Debug, Clone)]
pub struct GradeInput<'a> {
    pub user_answer: &'a str,
    pub expected: &'a str,
    pub alternatives: &'a [String],
    pub word_id: &'a str,
    pub direction: Direction,
    pub question: &'a str,
    pub src_lang: &'a str,
    pub tgt_lang: &'a str,
    pub comment_lang: &'a str,
}

/// Shared normalization for comparisons and cache keys: trim, collapse
/// internal whitespace, lowercase, strip trailing punctuation.
pub fn normalize(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .to_lowercase()
        .trim_end_matches(['.', ',', ';', '!', '?'])
        .trim()
        .to_string()
}

/// Edit distance over characters, standard two-row dynamic programming.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0usize; b_chars.len() + 1];

    for (i, ca) in a_chars.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Grade a choice answer. The option set is closed, so this is a pure
/// string comparison — no typo tolerance and no model escalation; a
/// distractor that happens to be a near-synonym must still count as wrong.
pub fn grade_choice(user_answer: &str, expected: &str, alternatives: &[String]) -> Verdict {
    let answer_norm = normalize(user_answer);
    let correct = !answer_norm.is_empty()
        && (answer_norm == normalize(expected)
            || alternatives.iter().any(|alt| normalize(alt) == answer_norm));
    Verdict {
        correct,
        method: GradeMethod::Exact,
        feedback: if correct {
            Feedback::None
        } else {
            Feedback::Expected {
                expected: expected.to_string(),
            }
        },
    }
}

/// Grade one answer. Levels one and two are synchronous; level three calls
/// the gateway, which is cache-first.
pub async fn grade(gateway: &LlmGateway, fuzzy_threshold: usize, input: GradeInput<'_>) -> Verdict {
    let answer_norm = normalize(input.user_answer);
    let expected_norm = normalize(input.expected);

    if answer_norm.is_empty() {
        return Verdict {
            correct: false,
            method: GradeMethod::Exact,
            feedback: Feedback::Expected {
                expected: input.expected.to_string(),
            },
        };
    }

    // Level 1: exact match against the expected answer or any alternative.
    if answer_norm == expected_norm
        || input
            .alternatives
            .iter()
            .any(|alt| normalize(alt) == answer_norm)
    {
        return Verdict {
            correct: true,
            method: GradeMethod::Exact,
            feedback: Feedback::None,
        };
    }

    // Level 2: small typos against the expected answer.
    let distance = levenshtein_distance(&answer_norm, &expected_norm);
    if distance > 0 && distance <= fuzzy_threshold {
        return Verdict {
            correct: true,
            method: GradeMethod::Fuzzy,
            feedback: Feedback::Typo {
                expected: input.expected.to_string(),
            },
        };
    }

    // Level 3: the model decides. Any failure degrades to rejection —
    // an unavailable model must never accept an answer.
    let request = ValidationRequest {
        word_id: input.word_id.to_string(),
        direction: input.direction,
        question: input.question.to_string(),
        expected: input.expected.to_string(),
        expected_norm,
        user_answer: input.user_answer.to_string(),
        answer_norm,
        src_lang: input.src_lang.to_string(),
        tgt_lang: input.tgt_lang.to_string(),
        comment_lang: input.comment_lang.to_string(),
    };

    match gateway.validate(&request).await {
        Ok(verdict) => Verdict {
            correct: verdict.correct,
            method: GradeMethod::Model,
            feedback: Feedback::Comment(verdict.comment),
        },
        Err(err) => {
            log_escalation_failure(&err, input.word_id);
            Verdict {
                correct: false,
                method: GradeMethod::Exact,
                feedback: Feedback::Expected {
                    expected: input.expected.to_string(),
                },
            }
        }
    }
}

fn log_escalation_failure(err: &GatewayError, word_id: &str) {
    match err {
        GatewayError::Disabled | GatewayError::CircuitOpen => {
            tracing::warn!(word_id, error = %err, "Model grading unavailable, rejecting conservatively")
        }
        _ => {
            tracing::error!(word_id, error = %err, "Model grading failed, rejecting conservatively")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::tempdir;

    use crate::config::LlmConfig;
    use crate::store::Store;

    use super::*;

    #[test]
    fn normalize_collapses_and_strips() {
        assert_eq!(normalize("  Der   Haus. "), "der haus");
        assert_eq!(normalize("дом!"), "дом");
        assert_eq!(normalize("Dog ,"), "dog");
        assert_eq!(normalize("a  b\tc"), "a b c");
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein_distance("hello", "hello"), 0);
        assert_eq!(levenshtein_distance("hell", "hello"), 1);
        assert_eq!(levenshtein_distance("hello", "helo"), 1);
        assert_eq!(levenshtein_distance("hello", "hallo"), 1);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        // Cyrillic/Latin lookalikes are distinct characters
        assert_eq!(levenshtein_distance("дом", "дoм"), 1);
    }

    fn test_gateway(enabled: bool) -> (tempfile::TempDir, LlmGateway) {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("db").to_str().unwrap()).unwrap());
        let config = LlmConfig {
            enabled,
            mock: true,
            api_url: String::new(),
            api_key: String::new(),
            model: "test".to_string(),
            rate_per_min: 100,
            max_inflight: 2,
            circuit_fail_threshold: 5,
            circuit_recovery_secs: 60,
            call_timeout_secs: 1,
        };
        (dir, LlmGateway::new(&config, store))
    }

    fn input<'a>(user_answer: &'a str, expected: &'a str, alternatives: &'a [String]) -> GradeInput<'a> {
        GradeInput {
            user_answer,
            expected,
            alternatives,
            word_id: "w1",
            direction: Direction::ForeignToNative,
            question: "house",
            src_lang: "en",
            tgt_lang: "ru",
            comment_lang: "Russian",
        }
    }

    #[tokio::test]
    async fn identical_answer_is_exact() {
        let (_dir, gateway) = test_gateway(true);
        let verdict = grade(&gateway, 2, input("дом", "дом", &[])).await;
        assert!(verdict.correct);
        assert_eq!(verdict.method, GradeMethod::Exact);
        assert_eq!(verdict.feedback, Feedback::None);
    }

    #[tokio::test]
    async fn alternative_matches_are_exact() {
        let (_dir, gateway) = test_gateway(true);
        let alternatives = vec!["жилище".to_string()];
        let verdict = grade(&gateway, 2, input("Жилище", "дом", &alternatives)).await;
        assert!(verdict.correct);
        assert_eq!(verdict.method, GradeMethod::Exact);
    }

    #[tokio::test]
    async fn latin_o_typo_is_fuzzy() {
        let (_dir, gateway) = test_gateway(true);
        let verdict = grade(&gateway, 2, input("дoм", "дом", &[])).await;
        assert!(verdict.correct);
        assert_eq!(verdict.method, GradeMethod::Fuzzy);
        assert!(matches!(verdict.feedback, Feedback::Typo { .. }));
    }

    #[tokio::test]
    async fn beyond_threshold_escalates_and_mock_rejects() {
        let (_dir, gateway) = test_gateway(true);
        let verdict = grade(&gateway, 2, input("прекрасный", "красивый", &[])).await;
        assert!(!verdict.correct);
        assert_eq!(verdict.method, GradeMethod::Model);
    }

    #[tokio::test]
    async fn gateway_failure_rejects_conservatively() {
        let (_dir, gateway) = test_gateway(false);
        let verdict = grade(&gateway, 2, input("прекрасный", "красивый", &[])).await;
        assert!(!verdict.correct);
        assert_eq!(verdict.method, GradeMethod::Exact);
        assert_eq!(
            verdict.feedback,
            Feedback::Expected {
                expected: "красивый".to_string()
            }
        );
    }

    #[tokio::test]
    async fn empty_answer_is_rejected_without_escalation() {
        let (_dir, gateway) = test_gateway(false);
        let verdict = grade(&gateway, 2, input("   ", "дом", &[])).await;
        assert!(!verdict.correct);
        assert_eq!(verdict.method, GradeMethod::Exact);
    }
}
