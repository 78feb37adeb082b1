//! Admission: 请求准入控制
//!
//! 每个请求依次经过：global 限流 → auth 限流（认证路由）→ api 限流（API 路由）
//! → JSON 请求体清洗，全部通过后才交给路由处理器。任何一步拒绝都直接返回，
//! 不会触达存储。

pub mod limiter;
pub mod sanitizer;

use actix::Addr;
use actix_web::body::MessageBody;
use actix_web::dev::{Payload, ServiceRequest, ServiceResponse};
use actix_web::error::ErrorInternalServerError;
use actix_web::middleware::Next;
use actix_web::{web, Error, ResponseError};

use crate::config::{Config, RateLimitSettings};
use crate::core::error::ApiError;
use limiter::{CheckTiers, RateLimiterActor, Tier, Verdict};
use sanitizer::Sanitizer;

/// 路由到限流级别的映射
#[derive(Debug, Clone, Default)]
pub struct RouteTiers {
    pub auth_prefixes: Vec<String>,
    pub api_prefixes: Vec<String>,
    pub exempt_paths: Vec<String>,
}

fn matches_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}

impl RouteTiers {
    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self {
            auth_prefixes: settings.auth_prefixes.clone(),
            api_prefixes: settings.api_prefixes.clone(),
            exempt_paths: settings.exempt_paths.clone(),
        }
    }

    /// 按应用顺序返回适用的级别；豁免路径返回空
    pub fn tiers_for(&self, path: &str) -> Vec<Tier> {
        if self.exempt_paths.iter().any(|p| p == path) {
            return Vec::new();
        }
        let mut tiers = vec![Tier::Global];
        if self.auth_prefixes.iter().any(|p| matches_prefix(path, p)) {
            tiers.push(Tier::Auth);
        }
        if self.api_prefixes.iter().any(|p| matches_prefix(path, p)) {
            tiers.push(Tier::Api);
        }
        tiers
    }
}

/// 准入控制服务，通过 `web::Data` 显式交给中间件
pub struct AdmissionControl {
    limiter: Addr<RateLimiterActor>,
    routes: RouteTiers,
    sanitizer: Sanitizer,
}

impl AdmissionControl {
    pub fn new(limiter: Addr<RateLimiterActor>, routes: RouteTiers, sanitizer: Sanitizer) -> Self {
        Self {
            limiter,
            routes,
            sanitizer,
        }
    }

    pub fn from_config(limiter: Addr<RateLimiterActor>, config: &Config) -> Self {
        Self::new(
            limiter,
            RouteTiers::from_settings(&config.rate_limit),
            Sanitizer::from_settings(&config.sanitizer),
        )
    }
}

/// 客户端标识：对端 IP
fn client_key(req: &ServiceRequest) -> String {
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn bytes_to_payload(buf: web::Bytes) -> Payload {
    let (_, mut payload) = actix_http::h1::Payload::create(true);
    payload.unread_data(buf);
    Payload::from(payload)
}

/// 准入中间件（`middleware::from_fn(admit)`）
pub async fn admit(
    mut req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let admission = req
        .app_data::<web::Data<AdmissionControl>>()
        .cloned()
        .ok_or_else(|| ErrorInternalServerError("admission control is not configured"))?;

    let tiers = admission.routes.tiers_for(req.path());
    let mut quota = None;
    if !tiers.is_empty() {
        let key = client_key(&req);
        let verdict = admission
            .limiter
            .send(CheckTiers { key: key.clone(), tiers })
            .await
            .map_err(|e| {
                log::error!("限流服务不可用: {}", e);
                ErrorInternalServerError("rate limiter unavailable")
            })?;
        match verdict {
            Verdict::Admitted { quota: q } => quota = q,
            Verdict::Rejected { tier, message, quota } => {
                log::warn!("{} 触发 {} 限流: {} {}", key, tier.as_str(), req.method(), req.path());
                let res = ApiError::RateLimited { message, quota }.error_response();
                return Ok(req.into_response(res).map_into_right_body());
            }
        }
    }

    // 不看 Content-Type：处理器会把任何请求体当 JSON 解析
    let body = match req.extract::<web::Bytes>().await {
        Ok(body) => body,
        Err(e) => return Ok(req.error_response(e).map_into_right_body()),
    };
    match admission.sanitizer.sanitize_body(&body) {
        Ok(cleaned) => req.set_payload(bytes_to_payload(cleaned.unwrap_or(body))),
        Err(e) => {
            log::warn!("请求体被拒绝 ({}): {} {}", e, req.method(), req.path());
            return Ok(req.error_response(e).map_into_right_body());
        }
    }

    let mut res = next.call(req).await?;
    if let Some(quota) = quota {
        quota.write_headers(res.headers_mut());
    }
    Ok(res.map_into_left_body())
}
