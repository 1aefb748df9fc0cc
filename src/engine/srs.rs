//! SM-2 间隔重复调度：纯函数，不读写存储，时间由调用方注入。

use chrono::{DateTime, Duration, Utc};

use crate::config::SrConfig;
use crate::store::operations::lessons::GradeMethod;

/// Result of one scheduling step.
#[derive(Debug, Clone, PartialEq)]
pub struct SrUpdate {
    pub interval_days: u32,
    pub ef: f64,
    pub next_review_at: DateTime<Utc>,
}

/// Recall quality on the 0..=5 SM-2 scale, derived from how the answer was
/// graded. An exact hit is a perfect recall; a typo and a model-approved
/// synonym count progressively lower; any wrong answer is a blackout.
pub fn recall_quality(method: GradeMethod, correct: bool) -> u8 {
    if !correct {
        return 0;
    }
    match method {
        GradeMethod::Exact => 5,
        GradeMethod::Fuzzy => 4,
        GradeMethod::Model => 3,
    }
}

/// One SM-2 step over the stored `(interval_days, ef)` pair.
pub fn reschedule(
    prev_interval: u32,
    prev_ef: f64,
    quality: u8,
    now: DateTime<Utc>,
    config: &SrConfig,
) -> SrUpdate {
    let (interval_days, ef) = if quality < 3 {
        (1, (prev_ef - 0.2).max(config.min_ef))
    } else {
        let q = quality.min(5) as f64;
        let ef = (prev_ef + (0.1 - (5.0 - q) * (0.08 + (5.0 - q) * 0.02))).max(config.min_ef);
        let interval = match prev_interval {
            0 => 1,
            1 => 6,
            prev => (prev as f64 * ef).round() as u32,
        };
        (interval, ef)
    };

    SrUpdate {
        interval_days,
        ef,
        next_review_at: now + Duration::days(interval_days as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SrConfig {
        SrConfig::default()
    }

    #[test]
    fn quality_mapping_follows_grade_method() {
        assert_eq!(recall_quality(GradeMethod::Exact, true), 5);
        assert_eq!(recall_quality(GradeMethod::Fuzzy, true), 4);
        assert_eq!(recall_quality(GradeMethod::Model, true), 3);
        assert_eq!(recall_quality(GradeMethod::Exact, false), 0);
        assert_eq!(recall_quality(GradeMethod::Model, false), 0);
    }

    #[test]
    fn wrong_answer_resets_interval_and_penalizes_ef() {
        let now = Utc::now();
        let update = reschedule(14, 2.5, 0, now, &cfg());
        assert_eq!(update.interval_days, 1);
        assert!((update.ef - 2.3).abs() < 1e-9);
        assert_eq!(update.next_review_at, now + Duration::days(1));
    }

    #[test]
    fn ef_penalty_floors_at_minimum() {
        let update = reschedule(3, 1.35, 0, Utc::now(), &cfg());
        assert!((update.ef - 1.3).abs() < 1e-9);
    }

    #[test]
    fn first_successful_review_gives_one_day() {
        let update = reschedule(0, 2.5, 5, Utc::now(), &cfg());
        assert_eq!(update.interval_days, 1);
        assert!(update.ef > 2.5);
    }

    #[test]
    fn second_successful_review_gives_six_days() {
        let update = reschedule(1, 2.5, 5, Utc::now(), &cfg());
        assert_eq!(update.interval_days, 6);
    }

    #[test]
    fn later_reviews_multiply_by_ef() {
        let update = reschedule(6, 2.5, 5, Utc::now(), &cfg());
        // ef grows to 2.6, 6 * 2.6 = 15.6 → 16
        assert!((update.ef - 2.6).abs() < 1e-9);
        assert_eq!(update.interval_days, 16);
    }

    #[test]
    fn fuzzy_quality_keeps_ef_flat() {
        // q=4: 0.1 - 1*(0.08 + 0.02) = 0, ef unchanged
        let update = reschedule(6, 2.5, 4, Utc::now(), &cfg());
        assert!((update.ef - 2.5).abs() < 1e-9);
    }

    #[test]
    fn model_quality_shrinks_ef() {
        // q=3: 0.1 - 2*(0.08 + 2*0.02) = -0.14
        let update = reschedule(6, 2.5, 3, Utc::now(), &cfg());
        assert!((update.ef - 2.36).abs() < 1e-9);
    }
}
