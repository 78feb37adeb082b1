//! Server: HTTP 路由
//!
//! - `POST /download`：下载对象
//! - `GET /api/ping`：存活检查
//! - 其他路径：404 `{"error":"Not found"}`
//!
//! 所有路由都包在同一个 scope 里，经过 [`admit`](crate::admission::admit) 准入中间件。

pub mod download;

use std::sync::Arc;
use std::time::Duration;

use actix_web::middleware::from_fn;
use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::admission::{admit, AdmissionControl};
use crate::config::Config;
use crate::core::error::ApiError;
use crate::core::fetcher::ObjectFetcher;
use crate::core::retry::RetryStrategy;
use crate::storage::ObjectStore;

/// 处理器共享的只读状态
#[derive(Debug)]
pub struct AppState {
    pub fetcher: ObjectFetcher,
    pub retry_strategy: RetryStrategy,
    pub request_timeout: Duration,
    pub ping_message: String,
}

impl AppState {
    pub fn from_config(config: &Config, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            fetcher: ObjectFetcher::new(store, config.download.max_bytes),
            retry_strategy: RetryStrategy::from_settings(&config.download),
            request_timeout: Duration::from_secs(config.download.request_timeout_secs),
            ping_message: config.server.ping_message.clone(),
        }
    }
}

/// 注册路由和共享数据，`App::configure` 与测试共用
pub fn configure(
    cfg: &mut web::ServiceConfig,
    state: web::Data<AppState>,
    admission: web::Data<AdmissionControl>,
    body_limit: usize,
) {
    cfg.app_data(state)
        .app_data(admission)
        .app_data(web::PayloadConfig::new(body_limit))
        .service(
            web::scope("")
                .wrap(from_fn(admit))
                .service(
                    web::resource("/download")
                        .route(web::post().to(download::download))
                        .default_service(web::to(not_found)),
                )
                .service(
                    web::resource("/api/ping")
                        .route(web::get().to(ping))
                        .default_service(web::to(not_found)),
                )
                .default_service(web::to(not_found)),
        );
}

async fn ping(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "message": state.ping_message }))
}

async fn not_found() -> Result<HttpResponse, ApiError> {
    Err(ApiError::RouteNotFound)
}
