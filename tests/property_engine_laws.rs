use chrono::{Duration, Utc};
use proptest::prelude::*;

use tutor_backend::config::SrConfig;
use tutor_backend::engine::srs::{recall_quality, reschedule};
use tutor_backend::engine::validator::{grade_choice, levenshtein_distance, normalize};
use tutor_backend::store::operations::lessons::GradeMethod;

proptest! {
    #[test]
    fn pt_sm2_bounds_hold(
        prev_interval in 0u32..10_000,
        prev_ef in 1.3f64..4.0,
        quality in 0u8..=5,
    ) {
        let config = SrConfig::default();
        let now = Utc::now();
        let update = reschedule(prev_interval, prev_ef, quality, now, &config);

        prop_assert!(update.interval_days >= 1);
        prop_assert!(update.ef >= config.min_ef);
        prop_assert_eq!(
            update.next_review_at,
            now + Duration::days(update.interval_days as i64)
        );
    }

    #[test]
    fn pt_sm2_failure_resets_interval_and_drops_ef(
        prev_interval in 0u32..10_000,
        prev_ef in 1.3f64..4.0,
    ) {
        let config = SrConfig::default();
        let update = reschedule(prev_interval, prev_ef, 0, Utc::now(), &config);

        prop_assert_eq!(update.interval_days, 1);
        let expected_ef = (prev_ef - 0.2).max(config.min_ef);
        prop_assert!((update.ef - expected_ef).abs() < 1e-9);
    }

    #[test]
    fn pt_sm2_success_never_shrinks_interval_below_previous_growth(
        prev_ef in 1.3f64..4.0,
        quality in 3u8..=5,
    ) {
        let config = SrConfig::default();
        // From the third review on, the interval multiplies by ef >= 1.3.
        let update = reschedule(6, prev_ef, quality, Utc::now(), &config);
        prop_assert!(update.interval_days >= 6);
    }

    #[test]
    fn pt_quality_orders_by_grade_strength(correct in any::<bool>()) {
        let exact = recall_quality(GradeMethod::Exact, correct);
        let fuzzy = recall_quality(GradeMethod::Fuzzy, correct);
        let model = recall_quality(GradeMethod::Model, correct);
        if correct {
            prop_assert!(exact > fuzzy && fuzzy > model && model >= 3);
        } else {
            prop_assert_eq!(exact, 0);
            prop_assert_eq!(fuzzy, 0);
            prop_assert_eq!(model, 0);
        }
    }

    #[test]
    fn pt_levenshtein_identity_and_symmetry(
        a in "[a-zа-я]{0,12}",
        b in "[a-zа-я]{0,12}",
    ) {
        prop_assert_eq!(levenshtein_distance(&a, &a), 0);
        prop_assert_eq!(levenshtein_distance(&a, &b), levenshtein_distance(&b, &a));
        prop_assert!(levenshtein_distance(&a, &b) <= a.chars().count().max(b.chars().count()));
    }

    #[test]
    fn pt_single_substitution_is_within_fuzzy_threshold(word in "[a-z]{4,12}") {
        // One substituted character: distance exactly 1, inside T=2.
        let mut chars: Vec<char> = word.chars().collect();
        let original = chars[0];
        chars[0] = if original == 'q' { 'x' } else { 'q' };
        let perturbed: String = chars.into_iter().collect();

        prop_assert_eq!(levenshtein_distance(&word, &perturbed), 1);

        // Three appended characters: distance 3, beyond T=2.
        let far = format!("{word}qqq");
        prop_assert_eq!(levenshtein_distance(&word, &far), 3);
    }

    #[test]
    fn pt_normalize_is_idempotent(raw in "[ a-zа-яA-ZА-Я.,;!?]{0,24}") {
        let once = normalize(&raw);
        let twice = normalize(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn pt_identical_answer_is_always_exact(word in "[a-zа-я]{1,12}") {
        let verdict = grade_choice(&word, &word, &[]);
        prop_assert!(verdict.correct);
        prop_assert_eq!(verdict.method, GradeMethod::Exact);
    }

    #[test]
    fn pt_choice_rejects_everything_not_in_the_answer_set(
        word in "[a-z]{1,12}",
        other in "[а-я]{1,12}",
    ) {
        // Disjoint alphabets: `other` can never equal the expected answer.
        let verdict = grade_choice(&other, &word, &[]);
        prop_assert!(!verdict.correct);
    }
}
