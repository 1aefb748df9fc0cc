use crate::store::operations::word_stats::{Direction, TestType};

/// freq_rank 缺失时的排序哨兵，保证无频次词排在池尾
pub const FREQ_RANK_SENTINEL: u32 = 999_999;

pub fn user_key(user_id: &str) -> String {
    user_id.to_string()
}

pub fn dialog_state_key(user_id: &str) -> String {
    user_id.to_string()
}

pub fn profile_key(profile_id: &str) -> String {
    profile_id.to_string()
}

pub fn profile_user_index_key(user_id: &str, target_lang: &str) -> String {
    format!("{}:{}", user_id, target_lang.to_lowercase())
}

pub fn active_profile_key(user_id: &str) -> String {
    user_id.to_string()
}

pub fn word_key(word_id: &str) -> String {
    word_id.to_string()
}

pub fn word_text_index_key(language: &str, text: &str) -> String {
    format!("{}:{}", language.to_lowercase(), text.to_lowercase())
}

pub fn words_by_level_key(language: &str, cefr: &str, freq_rank: Option<u32>, word_id: &str) -> String {
    format!(
        "{}:{}:{:06}:{}",
        language.to_lowercase(),
        cefr,
        freq_rank.unwrap_or(FREQ_RANK_SENTINEL),
        word_id
    )
}

pub fn words_by_level_prefix(language: &str, cefr: &str) -> String {
    format!("{}:{}:", language.to_lowercase(), cefr)
}

pub fn user_word_key(user_word_id: &str) -> String {
    user_word_id.to_string()
}

pub fn user_word_index_key(profile_id: &str, word_id: &str) -> String {
    format!("{}:{}", profile_id, word_id)
}

pub fn user_word_index_prefix(profile_id: &str) -> String {
    format!("{}:", profile_id)
}

pub fn user_word_due_key(profile_id: &str, due_ts_millis: i64, user_word_id: &str) -> String {
    let ts = due_ts_millis.max(0) as u64;
    format!("{}:{:020}:{}", profile_id, ts, user_word_id)
}

pub fn user_word_due_prefix(profile_id: &str) -> String {
    format!("{}:", profile_id)
}

pub fn word_stat_key(user_word_id: &str, direction: Direction, test_type: TestType) -> String {
    format!(
        "{}:{}:{}",
        user_word_id,
        direction.as_str(),
        test_type.as_str()
    )
}

pub fn word_stat_prefix(user_word_id: &str) -> String {
    format!("{}:", user_word_id)
}

pub fn lesson_key(lesson_id: &str) -> String {
    lesson_id.to_string()
}

pub fn active_lesson_key(profile_id: &str) -> String {
    profile_id.to_string()
}

pub fn lesson_attempt_key(lesson_id: &str, seq: u32) -> String {
    format!("{}:{:04}", lesson_id, seq)
}

pub fn lesson_attempt_prefix(lesson_id: &str) -> String {
    format!("{}:", lesson_id)
}

/// 译文缓存键。`text` 必须已做归一化（小写、去首尾空白）。
pub fn translation_cache_key(text_norm: &str, src_lang: &str, tgt_lang: &str) -> String {
    format!(
        "{}:{}:{}",
        src_lang.to_lowercase(),
        tgt_lang.to_lowercase(),
        text_norm
    )
}

/// 判题缓存键。两段文本必须已按验证器的归一化规则处理。
pub fn validation_cache_key(
    word_id: &str,
    direction: Direction,
    expected_norm: &str,
    answer_norm: &str,
) -> String {
    format!(
        "{}:{}:{}:{}",
        word_id,
        direction.as_str(),
        expected_norm,
        answer_norm
    )
}
