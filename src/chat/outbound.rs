//! Outbound push channel for reminders. Webhook replies travel back in the
//! HTTP response; only the notifier needs to reach out on its own.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::{ChatOutConfig, NotifyConfig};

/// 出站去重表上限，超过后清理过期条目
const MAX_PACING_ENTRIES: usize = 100_000;

#[derive(Debug, thiserror::Error)]
pub enum OutboundError {
    /// The user blocked the bot; the transport rejects the push for good.
    #[error("user blocked the bot")]
    BlockedByUser,
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PushRequest<'a> {
    user_id: &'a str,
    text: &'a str,
}

/// Push client with a per-user soft send cap. `mock` mode logs instead of
/// sending, mirroring the gateway's mock switch.
pub struct OutboundClient {
    client: reqwest::Client,
    push_url: String,
    mock: bool,
    min_interval: Duration,
    last_sent: Mutex<HashMap<String, Instant>>,
}

impl OutboundClient {
    pub fn new(notify: &NotifyConfig, chat_out: &ChatOutConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            push_url: notify.push_url.clone(),
            mock: notify.push_mock,
            min_interval: Duration::from_millis(chat_out.min_interval_ms),
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    pub async fn send_text(&self, user_id: &str, text: &str) -> Result<(), OutboundError> {
        self.pace(user_id).await;

        if self.mock {
            tracing::info!(user_id, text, "Mock outbound message");
            return Ok(());
        }

        let response = self
            .client
            .post(&self.push_url)
            .json(&PushRequest { user_id, text })
            .send()
            .await
            .map_err(|e| OutboundError::Transport(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 403 {
            return Err(OutboundError::BlockedByUser);
        }
        if !status.is_success() {
            return Err(OutboundError::Transport(format!("http {status}")));
        }
        Ok(())
    }

    /// 单用户出站节流：两条消息之间至少间隔 min_interval（软限制）。
    async fn pace(&self, user_id: &str) {
        let wait = {
            let mut map = self.last_sent.lock().await;
            if map.len() >= MAX_PACING_ENTRIES {
                let min_interval = self.min_interval;
                map.retain(|_, last| last.elapsed() < min_interval * 2);
            }
            match map.get(user_id) {
                Some(last) if last.elapsed() < self.min_interval => {
                    self.min_interval - last.elapsed()
                }
                _ => Duration::ZERO,
            }
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        self.last_sent
            .lock()
            .await
            .insert(user_id.to_string(), Instant::now());
    }
}
