use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};

use crate::config::LlmConfig;
use crate::llm::breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::llm::limiter::TokenBucket;
use crate::llm::prompts;
use crate::store::operations::caches::{
    TranslationCacheEntry, TranslationPayload, ValidationCacheEntry,
};
use crate::store::operations::word_stats::Direction;
use crate::store::{Store, StoreError};

/// 重试退避间隔（2s → 10s），共 3 次尝试。
const RETRY_BACKOFF: [Duration; 2] = [Duration::from_secs(2), Duration::from_secs(10)];
const MAX_ATTEMPTS: usize = RETRY_BACKOFF.len() + 1;

/// Outbound model boundary. Every call runs through the same middleware
/// chain: cache → token bucket → in-flight cap → circuit breaker → HTTP.
/// Cache hits return before the bucket, so they cost no tokens and never
/// count as breaker outcomes.
pub struct LlmGateway {
    config: LlmConfig,
    client: reqwest::Client,
    store: Arc<Store>,
    bucket: TokenBucket,
    inflight: Semaphore,
    breaker: Mutex<CircuitBreaker>,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("llm is disabled")]
    Disabled,
    #[error("model circuit breaker is open")]
    CircuitOpen,
    #[error("model call timed out")]
    Timeout,
    #[error("transient model error: {0}")]
    Transient(String),
    #[error("model response shape invalid: {0}")]
    Shape(String),
    #[error("model api error: status={status}, message={message}")]
    Api { status: u16, message: String },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("internal gateway error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transient(_))
    }
}

/// Model verdict for one graded answer, also the validation-cache payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelVerdict {
    pub correct: bool,
    pub comment: String,
}

/// Context for a model-graded answer. The normalized strings key the cache;
/// the raw strings feed the prompt.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub word_id: String,
    pub direction: Direction,
    pub question: String,
    pub expected: String,
    pub expected_norm: String,
    pub user_answer: String,
    pub answer_norm: String,
    pub src_lang: String,
    pub tgt_lang: String,
    /// Language the feedback comment should be written in.
    pub comment_lang: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: String,
}

impl LlmGateway {
    pub fn new(config: &LlmConfig, store: Arc<Store>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.call_timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            store,
            bucket: TokenBucket::new(config.rate_per_min),
            inflight: Semaphore::new(config.max_inflight.max(1)),
            breaker: Mutex::new(CircuitBreaker::new(CircuitBreakerConfig {
                failure_threshold: config.circuit_fail_threshold,
                recovery_secs: config.circuit_recovery_secs,
            })),
            config: config.clone(),
        }
    }

    /// Validate LLM configuration at startup. Panics when real mode is
    /// requested without endpoint credentials.
    pub fn validate_config(config: &LlmConfig) {
        if config.enabled && !config.mock && (config.api_url.is_empty() || config.api_key.is_empty())
        {
            panic!(
                "Invalid LLM configuration: enabled=true and mock=false requires \
                 LLM_API_URL and LLM_API_KEY. Set them or enable LLM_MOCK."
            );
        }
    }

    /// Translate a word. Cache-first; a successful model response is cached
    /// without expiry.
    pub async fn translate(
        &self,
        text: &str,
        src_lang: &str,
        tgt_lang: &str,
    ) -> Result<TranslationPayload, GatewayError> {
        let text_norm = text.trim().to_lowercase();
        if let Some(hit) = self
            .store
            .get_cached_translation(&text_norm, src_lang, tgt_lang)?
        {
            tracing::debug!(text = %text_norm, src_lang, tgt_lang, "Translation cache hit");
            return Ok(hit.payload);
        }

        let user_prompt = prompts::translate_user_prompt(&text_norm, src_lang, tgt_lang);
        let mock_text = text_norm.clone();
        let tgt = tgt_lang.to_string();
        let payload: TranslationPayload = self
            .call_json(prompts::TRANSLATE_SYSTEM, &user_prompt, move || {
                TranslationPayload {
                    translations: vec![format!("{mock_text}@{tgt}")],
                    examples: vec![],
                    forms: Default::default(),
                }
            })
            .await?;

        if payload.translations.is_empty() {
            self.note_failure().await;
            return Err(GatewayError::Shape("translations list is empty".into()));
        }

        self.store.put_cached_translation(&TranslationCacheEntry {
            text: text_norm,
            src_lang: src_lang.to_string(),
            tgt_lang: tgt_lang.to_string(),
            payload: payload.clone(),
            cached_at: Utc::now(),
            expires_at: None,
        })?;
        Ok(payload)
    }

    /// Grade an answer the fuzzy levels could not decide. Cache-first on the
    /// normalized key; write-through after every model response.
    pub async fn validate(&self, req: &ValidationRequest) -> Result<ModelVerdict, GatewayError> {
        if let Some(hit) = self.store.get_cached_validation(
            &req.word_id,
            req.direction,
            &req.expected_norm,
            &req.answer_norm,
        )? {
            tracing::debug!(word_id = %req.word_id, "Validation cache hit");
            return Ok(ModelVerdict {
                correct: hit.correct,
                comment: hit.comment,
            });
        }

        let user_prompt = prompts::validate_user_prompt(
            &req.question,
            &req.expected,
            &req.user_answer,
            &req.src_lang,
            &req.tgt_lang,
            &req.comment_lang,
        );
        let verdict: ModelVerdict = self
            .call_json(prompts::VALIDATE_SYSTEM, &user_prompt, || ModelVerdict {
                correct: false,
                comment: "mock verdict".to_string(),
            })
            .await?;

        self.store.put_cached_validation(
            &req.word_id,
            req.direction,
            &req.expected_norm,
            &req.answer_norm,
            &ValidationCacheEntry {
                correct: verdict.correct,
                comment: verdict.comment.clone(),
                cached_at: Utc::now(),
            },
        )?;
        Ok(verdict)
    }

    /// Shared call path below the caches. The shape is parsed before anything
    /// is returned, so a malformed response can never be half-cached.
    async fn call_json<T, F>(
        &self,
        system: &str,
        user_prompt: &str,
        mock: F,
    ) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
        F: FnOnce() -> T,
    {
        if !self.config.enabled {
            return Err(GatewayError::Disabled);
        }

        self.bucket.acquire().await;
        let _permit = self
            .inflight
            .acquire()
            .await
            .map_err(|_| GatewayError::Internal("in-flight semaphore closed".into()))?;

        if !self.breaker.lock().await.should_attempt() {
            return Err(GatewayError::CircuitOpen);
        }

        if self.config.mock {
            self.breaker.lock().await.record_success();
            return Ok(mock());
        }

        let mut attempt = 0usize;
        loop {
            match self.attempt_call(system, user_prompt).await {
                Ok(content) => match serde_json::from_str::<T>(&content) {
                    Ok(value) => {
                        self.breaker.lock().await.record_success();
                        return Ok(value);
                    }
                    Err(e) => {
                        self.note_failure().await;
                        return Err(GatewayError::Shape(e.to_string()));
                    }
                },
                Err(e) if e.is_transient() && attempt + 1 < MAX_ATTEMPTS => {
                    let delay = RETRY_BACKOFF[attempt];
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "Transient model error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.note_failure().await;
                    return Err(e);
                }
            }
        }
    }

    async fn attempt_call(&self, system: &str, user_prompt: &str) -> Result<String, GatewayError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            // 低温保证同键请求的可缓存性
            temperature: 0.1,
        };

        let send = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send();

        let response = match tokio::time::timeout(
            Duration::from_secs(self.config.call_timeout_secs),
            send,
        )
        .await
        {
            Err(_) => return Err(GatewayError::Timeout),
            Ok(Err(e)) if e.is_timeout() => return Err(GatewayError::Timeout),
            Ok(Err(e)) => return Err(GatewayError::Transient(e.to_string())),
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(GatewayError::Transient(format!("http {status}")));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Shape(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| GatewayError::Shape("empty choices".into()))
    }

    async fn note_failure(&self) {
        self.breaker.lock().await.record_failure();
    }
}
