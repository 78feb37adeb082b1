use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::config::DownloadSettings;

/// 重试策略：首次尝试 + `max_retries` 次重试，指数退避，无抖动、无上限
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryStrategy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryStrategy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_settings(settings: &DownloadSettings) -> Self {
        Self::new(
            settings.retry_count,
            Duration::from_millis(settings.retry_base_delay_ms),
        )
    }

    /// 总尝试次数（含首次）
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// 第 `retry_count` 次重试前的等待（从 0 开始）：`base * 2^retry_count`
    pub fn get_delay(&self, retry_count: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(retry_count))
    }

    /// 所有重试等待之和的上界
    pub fn worst_case_delay(&self) -> Duration {
        (0..self.max_retries)
            .map(|i| self.get_delay(i))
            .fold(Duration::ZERO, |acc, d| acc.saturating_add(d))
    }
}

/// 单次操作独占的重试上下文，不跨请求共享
#[derive(Debug)]
pub struct RetryContext {
    pub strategy: RetryStrategy,
    pub retry_count: u32,
    pub retry_history: Vec<(String, Duration)>,
    pub total_retry_time: Duration,
}

impl RetryContext {
    pub fn new(strategy: RetryStrategy) -> Self {
        Self {
            strategy,
            retry_count: 0,
            retry_history: Vec::new(),
            total_retry_time: Duration::ZERO,
        }
    }

    pub fn should_retry(&self, retryable: bool) -> bool {
        retryable && self.retry_count < self.strategy.max_retries
    }

    pub fn next_delay(&self) -> Duration {
        self.strategy.get_delay(self.retry_count)
    }

    pub fn record_retry(&mut self, error: String, delay: Duration) {
        self.retry_count += 1;
        self.retry_history.push((error, delay));
        self.total_retry_time += delay;
    }

    /// 已经进行的尝试次数
    pub fn attempts(&self) -> u32 {
        self.retry_count + 1
    }

    pub fn get_retry_stats(&self) -> RetryStats {
        RetryStats {
            total_retries: self.retry_count,
            total_retry_time: self.total_retry_time,
            retry_history: self.retry_history.clone(),
        }
    }

    /// 执行 `operation`，对可重试的失败按退避策略重试
    ///
    /// 成功立即返回；`is_retryable` 为假或次数用尽时返回最后一次的错误。
    pub async fn run<T, E, F, Fut, P>(&mut self, is_retryable: P, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !self.should_retry(is_retryable(&error)) {
                return Err(error);
            }

            let delay = self.next_delay();
            log::warn!(
                "第 {} 次尝试失败: {}，{} ms 后重试 ({}/{})",
                self.attempts(),
                error,
                delay.as_millis(),
                self.retry_count + 1,
                self.strategy.max_retries
            );
            self.record_retry(error.to_string(), delay);
            tokio::time::sleep(delay).await;
        }
    }
}

/// 重试统计信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryStats {
    pub total_retries: u32,
    pub total_retry_time: Duration,
    pub retry_history: Vec<(String, Duration)>,
}

/// 不关心统计信息时的便捷入口
pub async fn retry<T, E, F, Fut, P>(strategy: RetryStrategy, is_retryable: P, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    RetryContext::new(strategy).run(is_retryable, operation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use tokio::time::Instant;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_default_strategy() {
        let strategy = RetryStrategy::default();
        assert_eq!(strategy.max_attempts(), 4);
        assert_eq!(strategy.get_delay(0), Duration::from_secs(1));
        assert_eq!(strategy.get_delay(1), Duration::from_secs(2));
        assert_eq!(strategy.get_delay(2), Duration::from_secs(4));
        assert_eq!(strategy.worst_case_delay(), Duration::from_secs(7));
    }

    #[test]
    fn test_delay_saturates() {
        let strategy = RetryStrategy::new(64, Duration::from_secs(u64::MAX / 2));
        assert!(strategy.get_delay(40) >= strategy.get_delay(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt_no_delay() {
        let calls = Cell::new(0);
        let start = Instant::now();
        let result: Result<u32, String> = retry(RetryStrategy::default(), |_| true, || {
            calls.set(calls.get() + 1);
            async { Ok(7) }
        })
        .await;
        assert_eq!(assert_ok!(result), 7);
        assert_eq!(calls.get(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failure_exhausts_with_exponential_delays() {
        let attempt_times = RefCell::new(Vec::new());
        let start = Instant::now();
        let mut ctx = RetryContext::new(RetryStrategy::default());
        let result: Result<(), String> = ctx
            .run(|_| true, || {
                attempt_times.borrow_mut().push(start.elapsed());
                async { Err("network error".to_string()) }
            })
            .await;

        assert_err!(result);
        let times = attempt_times.into_inner();
        assert_eq!(
            times,
            vec![
                Duration::ZERO,
                Duration::from_secs(1),
                Duration::from_secs(3),
                Duration::from_secs(7),
            ]
        );
        let stats = ctx.get_retry_stats();
        assert_eq!(stats.total_retries, 3);
        assert_eq!(stats.total_retry_time, Duration::from_secs(7));
        assert_eq!(ctx.attempts(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_failure_is_terminal() {
        let calls = Cell::new(0);
        let start = Instant::now();
        let result: Result<(), String> = retry(
            RetryStrategy::default(),
            |e: &String| e.contains("timeout"),
            || {
                calls.set(calls.get() + 1);
                async { Err("object-not-found".to_string()) }
            },
        )
        .await;
        assert_eq!(assert_err!(result), "object-not-found");
        assert_eq!(calls.get(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let calls = Cell::new(0);
        let result: Result<&str, String> = retry(RetryStrategy::default(), |_| true, || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(format!("timeout #{}", n))
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(assert_ok!(result), "done");
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_means_single_attempt() {
        let calls = Cell::new(0);
        let result: Result<(), String> = retry(
            RetryStrategy::new(0, Duration::from_secs(1)),
            |_| true,
            || {
                calls.set(calls.get() + 1);
                async { Err("network".to_string()) }
            },
        )
        .await;
        assert_err!(result);
        assert_eq!(calls.get(), 1);
    }
}
