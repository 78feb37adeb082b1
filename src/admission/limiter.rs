use actix::prelude::*;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::{RateLimitSettings, TierSettings};
pub use crate::core::quota::Quota;

/// 限流级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Global,
    Auth,
    Api,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Global => "global",
            Tier::Auth => "auth",
            Tier::Api => "api",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierPolicy {
    pub window: Duration,
    pub max_requests: u32,
    pub message: String,
}

impl From<&TierSettings> for TierPolicy {
    fn from(settings: &TierSettings) -> Self {
        Self {
            window: Duration::from_secs(settings.window_secs),
            max_requests: settings.max_requests,
            message: settings.message.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed(Quota),
    Denied(Quota),
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u32,
    window_start: Instant,
}

/// 固定窗口计数器：每个客户端一个桶，窗口到期后计数清零
#[derive(Debug)]
pub struct FixedWindow {
    policy: TierPolicy,
    buckets: HashMap<String, Bucket>,
}

impl FixedWindow {
    pub fn new(policy: TierPolicy) -> Self {
        Self {
            policy,
            buckets: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &TierPolicy {
        &self.policy
    }

    /// 检查并计数；被拒绝的请求不计入
    pub fn acquire(&mut self, key: &str, now: Instant) -> Decision {
        let window = self.policy.window;
        let bucket = self.buckets.entry(key.to_string()).or_insert(Bucket {
            count: 0,
            window_start: now,
        });
        if now.saturating_duration_since(bucket.window_start) >= window {
            bucket.count = 0;
            bucket.window_start = now;
        }

        let reset_after = window.saturating_sub(now.saturating_duration_since(bucket.window_start));
        if bucket.count >= self.policy.max_requests {
            return Decision::Denied(Quota {
                limit: self.policy.max_requests,
                remaining: 0,
                reset_after,
            });
        }
        bucket.count += 1;
        Decision::Allowed(Quota {
            limit: self.policy.max_requests,
            remaining: self.policy.max_requests - bucket.count,
            reset_after,
        })
    }

    /// 删除窗口已结束的桶，返回删除个数
    pub fn sweep(&mut self, now: Instant) -> usize {
        let window = self.policy.window;
        let before = self.buckets.len();
        self.buckets
            .retain(|_, b| now.saturating_duration_since(b.window_start) < window);
        before - self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// 按顺序对多个级别检查并计数
pub struct CheckTiers {
    pub key: String,
    pub tiers: Vec<Tier>,
}
impl Message for CheckTiers {
    type Result = Verdict;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// `quota` 为剩余额度最少的那一级
    Admitted { quota: Option<Quota> },
    Rejected { tier: Tier, message: String, quota: Quota },
}

/// 限流状态的唯一持有者
///
/// 进程启动时创建，之后一直存活；Actor 串行处理消息，
/// 所以同一个 key 的“检查并计数”天然是原子的。
pub struct RateLimiterActor {
    tiers: HashMap<Tier, FixedWindow>,
    sweep_interval: Duration,
}

impl RateLimiterActor {
    pub fn new(tiers: HashMap<Tier, TierPolicy>, sweep_interval: Duration) -> Self {
        Self {
            tiers: tiers
                .into_iter()
                .map(|(tier, policy)| (tier, FixedWindow::new(policy)))
                .collect(),
            sweep_interval,
        }
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        let tiers = HashMap::from([
            (Tier::Global, TierPolicy::from(&settings.global)),
            (Tier::Auth, TierPolicy::from(&settings.auth)),
            (Tier::Api, TierPolicy::from(&settings.api)),
        ]);
        Self::new(tiers, Duration::from_secs(settings.sweep_interval_secs))
    }

    pub fn check(&mut self, key: &str, tiers: &[Tier], now: Instant) -> Verdict {
        let mut tightest: Option<Quota> = None;
        for tier in tiers {
            let Some(window) = self.tiers.get_mut(tier) else {
                continue;
            };
            match window.acquire(key, now) {
                Decision::Allowed(quota) => {
                    if tightest.map_or(true, |t| quota.remaining < t.remaining) {
                        tightest = Some(quota);
                    }
                }
                Decision::Denied(quota) => {
                    return Verdict::Rejected {
                        tier: *tier,
                        message: window.policy().message.clone(),
                        quota,
                    };
                }
            }
        }
        Verdict::Admitted { quota: tightest }
    }

    fn sweep(&mut self, now: Instant) {
        let removed: usize = self.tiers.values_mut().map(|w| w.sweep(now)).sum();
        if removed > 0 {
            log::debug!("清理过期限流计数 {} 个", removed);
        }
    }
}

impl Actor for RateLimiterActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.run_interval(self.sweep_interval, |act, _ctx| {
            act.sweep(Instant::now());
        });
    }
}

impl Handler<CheckTiers> for RateLimiterActor {
    type Result = MessageResult<CheckTiers>;
    fn handle(&mut self, msg: CheckTiers, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.check(&msg.key, &msg.tiers, Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(window_secs: u64, max_requests: u32) -> TierPolicy {
        TierPolicy {
            window: Duration::from_secs(window_secs),
            max_requests,
            message: format!("limit {}", max_requests),
        }
    }

    #[test]
    fn test_ceiling_then_reject_then_new_window() {
        let mut window = FixedWindow::new(policy(60, 30));
        let start = Instant::now();

        for i in 0..30 {
            let now = start + Duration::from_millis(i * 10);
            assert!(matches!(window.acquire("1.2.3.4", now), Decision::Allowed(_)), "request {}", i + 1);
        }
        match window.acquire("1.2.3.4", start + Duration::from_secs(59)) {
            Decision::Denied(quota) => {
                assert_eq!(quota.remaining, 0);
                assert_eq!(quota.reset_after, Duration::from_secs(1));
            }
            other => panic!("expected denial, got {:?}", other),
        }
        assert!(matches!(
            window.acquire("1.2.3.4", start + Duration::from_secs(60)),
            Decision::Allowed(Quota { remaining: 29, .. })
        ));
    }

    #[test]
    fn test_keys_are_independent() {
        let mut window = FixedWindow::new(policy(900, 1));
        let now = Instant::now();
        assert!(matches!(window.acquire("a", now), Decision::Allowed(_)));
        assert!(matches!(window.acquire("a", now), Decision::Denied(_)));
        assert!(matches!(window.acquire("b", now), Decision::Allowed(_)));
    }

    #[test]
    fn test_window_does_not_slide() {
        let mut window = FixedWindow::new(policy(10, 2));
        let start = Instant::now();
        window.acquire("k", start);
        window.acquire("k", start + Duration::from_secs(9));
        // 第 9 秒的请求不会延长窗口
        assert!(matches!(window.acquire("k", start + Duration::from_secs(9)), Decision::Denied(_)));
        assert!(matches!(window.acquire("k", start + Duration::from_secs(10)), Decision::Allowed(_)));
    }

    #[test]
    fn test_sweep_removes_expired_buckets() {
        let mut window = FixedWindow::new(policy(10, 5));
        let start = Instant::now();
        window.acquire("old", start);
        window.acquire("new", start + Duration::from_secs(8));
        assert_eq!(window.sweep(start + Duration::from_secs(10)), 1);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_check_applies_tiers_in_order() {
        let tiers = HashMap::from([(Tier::Global, policy(900, 100)), (Tier::Api, policy(60, 2))]);
        let mut limiter = RateLimiterActor::new(tiers, Duration::from_secs(60));
        let now = Instant::now();
        let order = [Tier::Global, Tier::Api];

        match limiter.check("ip", &order, now) {
            Verdict::Admitted { quota: Some(q) } => {
                assert_eq!(q.limit, 2);
                assert_eq!(q.remaining, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        limiter.check("ip", &order, now);
        match limiter.check("ip", &order, now) {
            Verdict::Rejected { tier, message, .. } => {
                assert_eq!(tier, Tier::Api);
                assert_eq!(message, "limit 2");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[actix_rt::test]
    async fn test_actor_counts_concurrent_requests_atomically() {
        let mut settings = RateLimitSettings::default();
        settings.api.max_requests = 10;
        let addr = RateLimiterActor::from_settings(&settings).start();

        let sends = (0..25).map(|_| {
            addr.send(CheckTiers {
                key: "10.0.0.1".to_string(),
                tiers: vec![Tier::Global, Tier::Api],
            })
        });
        let verdicts = futures::future::join_all(sends).await;
        let admitted = verdicts
            .into_iter()
            .map(|v| v.unwrap())
            .filter(|v| matches!(v, Verdict::Admitted { .. }))
            .count();
        assert_eq!(admitted, 10);
    }
}
