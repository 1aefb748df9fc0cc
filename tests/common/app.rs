use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use axum::Router;
use chrono::NaiveTime;
use tempfile::TempDir;
use tokio::sync::broadcast;

use tutor_backend::config::{
    ChatOutConfig, Config, LessonConfig, LlmConfig, NotifyConfig, SrConfig, WorkerConfig,
};
use tutor_backend::routes::build_router;
use tutor_backend::state::AppState;
use tutor_backend::store::Store;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    _temp_dir: TempDir,
}

/// 直接构造 Config，避免 set_var 造成多线程测试环境变量竞态
pub fn test_config(sled_path: String, llm_enabled: bool) -> Config {
    Config {
        host: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path,
        default_tz: "UTC".to_string(),
        lesson: LessonConfig::default(),
        sr: SrConfig::default(),
        llm: LlmConfig {
            enabled: llm_enabled,
            mock: true,
            api_url: String::new(),
            api_key: String::new(),
            model: "test-model".to_string(),
            rate_per_min: 2500,
            max_inflight: 10,
            circuit_fail_threshold: 5,
            circuit_recovery_secs: 60,
            call_timeout_secs: 5,
        },
        notify: NotifyConfig {
            inactive_hours: 6,
            window_start: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            window_end: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            sweep_period_secs: 900,
            push_url: String::new(),
            push_mock: true,
        },
        chat_out: ChatOutConfig { min_interval_ms: 0 },
        worker: WorkerConfig { is_leader: false },
    }
}

pub async fn spawn_with_llm(llm_enabled: bool) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("tutor-test.sled");
    let config = test_config(sled_path.to_string_lossy().to_string(), llm_enabled);

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    store.run_migrations().expect("run migrations");

    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let state = AppState::new(store, &config, shutdown_tx);
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        _temp_dir: temp_dir,
    }
}

pub async fn spawn_test_app() -> TestApp {
    spawn_with_llm(true).await
}
