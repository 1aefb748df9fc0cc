use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// 进程级令牌桶：60 秒窗口内最多 R 次模型调用，超出的调用排队等待。
///
/// 桶容量即窗口限额，按 R/60 每秒匀速补充；acquire 在无令牌时
/// 计算补足一枚令牌所需的时间并休眠，醒来后重新竞争。
#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_per_sec: f64,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(rate_per_min: u32) -> Self {
        let capacity = rate_per_min.max(1) as f64;
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_per_sec: capacity / 60.0,
        }
    }

    /// Take one token, waiting as long as necessary. Callers queue on the
    /// internal mutex plus the computed sleep, so ordering is approximately
    /// fair under contention.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let elapsed = state.last_refill.elapsed().as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                state.last_refill = Instant::now();

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_sec)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Tokens currently available, for logging and tests.
    pub async fn available(&self) -> f64 {
        let mut state = self.state.lock().await;
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = Instant::now();
        state.tokens
    }
}
