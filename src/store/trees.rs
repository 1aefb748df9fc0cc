/// Sled tree 名称常量。
///
/// 修改 tree 名称会导致已有数据不可访问，请勿随意更改。
/// 索引 tree 统一使用 `idx_` 前缀，与主数据 tree 区分。

pub const META: &str = "meta";
pub const USERS: &str = "users";
pub const DIALOG_STATES: &str = "dialog_states";
pub const PROFILES: &str = "profiles";
pub const WORDS: &str = "words";
pub const USER_WORDS: &str = "user_words";
pub const WORD_STATS: &str = "word_stats";
pub const LESSONS: &str = "lessons";
pub const LESSON_ATTEMPTS: &str = "lesson_attempts";
pub const TRANSLATION_CACHE: &str = "translation_cache";
pub const VALIDATION_CACHE: &str = "validation_cache";

// Secondary index trees
/// `(user_id, target_lang)` 唯一索引
pub const PROFILE_USER_INDEX: &str = "idx_profile_user";
/// 每用户当前激活的学习档案
pub const ACTIVE_PROFILES: &str = "idx_active_profiles";
/// `(language, text)` 唯一索引
pub const WORD_TEXT_INDEX: &str = "idx_word_text";
/// 干扰项候选池：按 `(language, cefr, freq_rank)` 排序
pub const WORDS_BY_LEVEL: &str = "idx_words_by_level";
/// `(profile_id, word_id)` 唯一索引
pub const USER_WORD_INDEX: &str = "idx_user_word";
/// 复习到期索引：按 `(profile_id, next_review_at)` 排序
pub const USER_WORDS_DUE: &str = "idx_user_words_due";
/// 活跃课程部分唯一约束：每 profile 至多一条
pub const ACTIVE_LESSONS: &str = "idx_active_lessons";
