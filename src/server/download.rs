use actix_web::{web, HttpResponse};
use serde_json::Value;
use uuid::Uuid;

use super::AppState;
use crate::core::classify::{classify, ErrorKind};
use crate::core::error::{ApiError, ApiResult};
use crate::core::retry::RetryContext;
use crate::utils::validator::extract_storage_path;

/// `POST /download`
///
/// 请求体为 `{"storagePath": "..."}`。成功时原样返回对象字节；失败时只返回固定文本，
/// 底层错误写日志。
pub async fn download(state: web::Data<AppState>, body: web::Bytes) -> ApiResult<HttpResponse> {
    let request_id = Uuid::new_v4();

    // 空体、非 JSON、字段缺失都按缺少路径处理
    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let Some(storage_path) = extract_storage_path(&payload) else {
        log::debug!("[{}] 请求缺少 storagePath", request_id);
        return Err(ApiError::InvalidRequest);
    };
    log::info!("[{}] 下载: {}", request_id, storage_path);

    let fetcher = &state.fetcher;
    let mut ctx = RetryContext::new(state.retry_strategy.clone());
    let outcome = tokio::time::timeout(
        state.request_timeout,
        ctx.run(|e| classify(e).is_retryable(), || fetcher.fetch(storage_path)),
    )
    .await;

    let result = match outcome {
        Ok(result) => result,
        Err(_) => {
            log::error!(
                "[{}] 下载超时 ({} 秒): {}，已尝试 {} 次",
                request_id,
                state.request_timeout.as_secs(),
                storage_path,
                ctx.attempts()
            );
            return Err(ApiError::Download(ErrorKind::Unknown));
        }
    };

    match result {
        Ok(bytes) => {
            log::info!(
                "[{}] 完成: {} ({} 字节, {} 次尝试)",
                request_id,
                storage_path,
                bytes.len(),
                ctx.attempts()
            );
            Ok(HttpResponse::Ok()
                .content_type("application/octet-stream")
                .body(bytes))
        }
        Err(e) => {
            let kind = classify(&e);
            let stats = ctx.get_retry_stats();
            log::error!(
                "[{}] 下载失败: {} ({:?}, 重试 {} 次, 共等待 {} ms): {}",
                request_id,
                storage_path,
                kind,
                stats.total_retries,
                stats.total_retry_time.as_millis(),
                e
            );
            Err(ApiError::Download(kind))
        }
    }
}
