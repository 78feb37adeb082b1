use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;

/// 当前窗口的额度，用于 `RateLimit-*` 响应头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

impl Quota {
    /// 向上取整到秒，至少 1 秒
    pub fn reset_after_secs(&self) -> u64 {
        let secs = self.reset_after.as_secs() + u64::from(self.reset_after.subsec_nanos() > 0);
        secs.max(1)
    }

    pub fn write_headers(&self, headers: &mut HeaderMap) {
        headers.insert(HeaderName::from_static("ratelimit-limit"), HeaderValue::from(self.limit));
        headers.insert(HeaderName::from_static("ratelimit-remaining"), HeaderValue::from(self.remaining));
        headers.insert(HeaderName::from_static("ratelimit-reset"), HeaderValue::from(self.reset_after_secs()));
    }
}
