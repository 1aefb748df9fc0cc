use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveTime;

use crate::constants;

#[derive(Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub default_tz: String,
    pub lesson: LessonConfig,
    pub sr: SrConfig,
    pub llm: LlmConfig,
    pub notify: NotifyConfig,
    pub chat_out: ChatOutConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone)]
pub struct LessonConfig {
    pub words_per_lesson: usize,
    pub mastered_threshold: u32,
    pub choice_to_input_threshold: u32,
    pub fuzzy_threshold: usize,
    pub lesson_timeout_secs: u64,
}

impl Default for LessonConfig {
    fn default() -> Self {
        Self {
            words_per_lesson: constants::DEFAULT_WORDS_PER_LESSON,
            mastered_threshold: constants::DEFAULT_MASTERED_THRESHOLD,
            choice_to_input_threshold: constants::DEFAULT_CHOICE_TO_INPUT_THRESHOLD,
            fuzzy_threshold: constants::DEFAULT_FUZZY_THRESHOLD,
            lesson_timeout_secs: constants::DEFAULT_LESSON_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SrConfig {
    pub default_ef: f64,
    pub min_ef: f64,
}

impl Default for SrConfig {
    fn default() -> Self {
        Self {
            default_ef: constants::DEFAULT_EASINESS,
            min_ef: constants::MIN_EASINESS,
        }
    }
}

#[derive(Clone)]
pub struct LlmConfig {
    pub enabled: bool,
    pub mock: bool,
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub rate_per_min: u32,
    pub max_inflight: usize,
    pub circuit_fail_threshold: u32,
    pub circuit_recovery_secs: u64,
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub inactive_hours: i64,
    pub window_start: NaiveTime,
    pub window_end: NaiveTime,
    pub sweep_period_secs: u64,
    pub push_url: String,
    pub push_mock: bool,
}

#[derive(Debug, Clone)]
pub struct ChatOutConfig {
    pub min_interval_ms: u64,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("enable_file_logs", &self.enable_file_logs)
            .field("log_dir", &self.log_dir)
            .field("sled_path", &self.sled_path)
            .field("default_tz", &self.default_tz)
            .field("lesson", &self.lesson)
            .field("sr", &self.sr)
            .field("llm", &self.llm)
            .field("notify", &self.notify)
            .field("chat_out", &self.chat_out)
            .field("worker", &self.worker)
            .finish()
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("enabled", &self.enabled)
            .field("mock", &self.mock)
            .field("api_url", &self.api_url)
            .field("api_key", &"***REDACTED***")
            .field("model", &self.model)
            .field("rate_per_min", &self.rate_per_min)
            .field("max_inflight", &self.max_inflight)
            .field("circuit_fail_threshold", &self.circuit_fail_threshold)
            .field("circuit_recovery_secs", &self.circuit_recovery_secs)
            .field("call_timeout_secs", &self.call_timeout_secs)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Self {
        let config = Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 3000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: normalized_sled_path(&env_or("SLED_PATH", "./data/tutor.sled")),
            default_tz: env_or("DEFAULT_TZ", constants::DEFAULT_TZ),
            lesson: LessonConfig {
                words_per_lesson: env_or_parse(
                    "WORDS_PER_LESSON",
                    constants::DEFAULT_WORDS_PER_LESSON,
                ),
                mastered_threshold: env_or_parse(
                    "MASTERED_THRESHOLD",
                    constants::DEFAULT_MASTERED_THRESHOLD,
                ),
                choice_to_input_threshold: env_or_parse(
                    "CHOICE_TO_INPUT_THRESHOLD",
                    constants::DEFAULT_CHOICE_TO_INPUT_THRESHOLD,
                ),
                fuzzy_threshold: env_or_parse(
                    "FUZZY_THRESHOLD",
                    constants::DEFAULT_FUZZY_THRESHOLD,
                ),
                lesson_timeout_secs: env_or_parse(
                    "LESSON_TIMEOUT_SECS",
                    constants::DEFAULT_LESSON_TIMEOUT_SECS,
                ),
            },
            sr: SrConfig {
                default_ef: env_or_parse("SR_DEFAULT_EF", constants::DEFAULT_EASINESS),
                min_ef: env_or_parse("SR_MIN_EF", constants::MIN_EASINESS),
            },
            llm: LlmConfig {
                enabled: env_or_bool("LLM_ENABLED", false),
                mock: env_or_bool("LLM_MOCK", true),
                api_url: env_or("LLM_API_URL", ""),
                api_key: env_or("LLM_API_KEY", ""),
                model: env_or("LLM_MODEL", "gpt-4o-mini"),
                rate_per_min: env_or_parse("LLM_RATE_PER_MIN", constants::DEFAULT_LLM_RATE_PER_MIN),
                max_inflight: env_or_parse(
                    "LLM_MAX_INFLIGHT",
                    constants::DEFAULT_LLM_MAX_INFLIGHT,
                ),
                circuit_fail_threshold: env_or_parse(
                    "LLM_CIRCUIT_FAIL_THRESHOLD",
                    constants::DEFAULT_CIRCUIT_FAIL_THRESHOLD,
                ),
                circuit_recovery_secs: env_or_parse(
                    "LLM_CIRCUIT_RECOVERY_S",
                    constants::DEFAULT_CIRCUIT_RECOVERY_SECS,
                ),
                call_timeout_secs: env_or_parse(
                    "LLM_CALL_TIMEOUT_S",
                    constants::DEFAULT_LLM_CALL_TIMEOUT_SECS,
                ),
            },
            notify: NotifyConfig {
                inactive_hours: env_or_parse(
                    "NOTIFY_INACTIVE_HOURS",
                    constants::DEFAULT_NOTIFY_INACTIVE_HOURS,
                ),
                window_start: parse_window(
                    &env_or("NOTIFY_WINDOW_START", constants::DEFAULT_NOTIFY_WINDOW_START),
                    constants::DEFAULT_NOTIFY_WINDOW_START,
                ),
                window_end: parse_window(
                    &env_or("NOTIFY_WINDOW_END", constants::DEFAULT_NOTIFY_WINDOW_END),
                    constants::DEFAULT_NOTIFY_WINDOW_END,
                ),
                sweep_period_secs: env_or_parse(
                    "NOTIFY_SWEEP_PERIOD_S",
                    constants::DEFAULT_NOTIFY_SWEEP_PERIOD_SECS,
                ),
                push_url: env_or("CHAT_PUSH_URL", ""),
                push_mock: env_or_bool("CHAT_PUSH_MOCK", true),
            },
            chat_out: ChatOutConfig {
                min_interval_ms: env_or_parse(
                    "CHAT_OUT_MIN_INTERVAL_MS",
                    constants::CHAT_OUT_MIN_INTERVAL_MS,
                ),
            },
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", true),
            },
        };

        config.validate();
        config
    }

    pub fn validate(&self) {
        if self.notify.window_start >= self.notify.window_end {
            panic!(
                "FATAL: NOTIFY_WINDOW_START ({}) must be earlier than NOTIFY_WINDOW_END ({}).",
                self.notify.window_start, self.notify.window_end
            );
        }
        if self.sr.min_ef <= 0.0 || self.sr.default_ef < self.sr.min_ef {
            panic!(
                "FATAL: SR_DEFAULT_EF ({}) must be >= SR_MIN_EF ({}) and SR_MIN_EF must be positive.",
                self.sr.default_ef, self.sr.min_ef
            );
        }
        if self.lesson.words_per_lesson == 0 {
            panic!("FATAL: WORDS_PER_LESSON must be at least 1.");
        }
        if self.default_tz.parse::<chrono_tz::Tz>().is_err() {
            panic!(
                "FATAL: DEFAULT_TZ '{}' is not a valid IANA timezone name.",
                self.default_tz
            );
        }
    }
}

fn parse_window(raw: &str, default: &str) -> NaiveTime {
    match NaiveTime::parse_from_str(raw, "%H:%M") {
        Ok(t) => t,
        Err(_) => {
            tracing::warn!(value = %raw, "Failed to parse notify window time, using default");
            NaiveTime::parse_from_str(default, "%H:%M").expect("default window time is valid")
        }
    }
}

fn normalized_sled_path(raw: &str) -> String {
    let path = Path::new(raw);
    if path.is_absolute() {
        return path.to_string_lossy().to_string();
    }

    let project_root = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    project_root.join(path).to_string_lossy().to_string()
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
