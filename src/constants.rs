/// CAS（Compare-And-Swap）操作最大重试次数
pub const MAX_CAS_RETRIES: u32 = 20;

/// 默认每节课单词数
pub const DEFAULT_WORDS_PER_LESSON: usize = 30;

/// 选择题连续答对此次数后切换为输入题
pub const DEFAULT_CHOICE_TO_INPUT_THRESHOLD: u32 = 3;

/// 任一维度连续答对此次数后判定为已掌握
pub const DEFAULT_MASTERED_THRESHOLD: u32 = 30;

/// learning -> reviewing 所需的累计正确次数
pub const REVIEWING_TOTAL_CORRECT: u32 = 5;

/// 拼写容错的最大编辑距离
pub const DEFAULT_FUZZY_THRESHOLD: usize = 2;

/// SM-2 默认难度系数
pub const DEFAULT_EASINESS: f64 = 2.5;

/// SM-2 难度系数下限
pub const MIN_EASINESS: f64 = 1.3;

/// 答错时难度系数的固定扣减
pub const EASINESS_PENALTY: f64 = 0.2;

/// 选择题选项数（含正确答案）
pub const CHOICE_OPTION_COUNT: usize = 4;

/// 课程闲置超时（秒），超时后下次开始课程时自动结课
pub const DEFAULT_LESSON_TIMEOUT_SECS: u64 = 7200;

/// 模型调用窗口限额（每 60 秒请求数）
pub const DEFAULT_LLM_RATE_PER_MIN: u32 = 2500;

/// 模型调用并发上限
pub const DEFAULT_LLM_MAX_INFLIGHT: usize = 10;

/// 熔断阈值：连续失败此次数后打开熔断器
pub const DEFAULT_CIRCUIT_FAIL_THRESHOLD: u32 = 5;

/// 熔断恢复等待（秒）
pub const DEFAULT_CIRCUIT_RECOVERY_SECS: u64 = 60;

/// 单次模型调用超时（秒）
pub const DEFAULT_LLM_CALL_TIMEOUT_SECS: u64 = 30;

/// 提醒触发所需的连续不活跃时长（小时）
pub const DEFAULT_NOTIFY_INACTIVE_HOURS: i64 = 6;

/// 提醒扫描周期（秒）
pub const DEFAULT_NOTIFY_SWEEP_PERIOD_SECS: u64 = 900;

/// 提醒扫描单轮软超时（秒），剩余用户顺延到下一轮
pub const NOTIFY_SWEEP_SOFT_DEADLINE_SECS: u64 = 60;

/// 默认提醒时间窗（用户本地时间）
pub const DEFAULT_NOTIFY_WINDOW_START: &str = "07:00";
pub const DEFAULT_NOTIFY_WINDOW_END: &str = "23:00";

/// 默认时区（用户时区无法解析时回退）
pub const DEFAULT_TZ: &str = "UTC";

/// 单用户出站消息最小间隔（毫秒），仅为软限制
pub const CHAT_OUT_MIN_INTERVAL_MS: u64 = 100;
