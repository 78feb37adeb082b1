use actix_web::http::header::{self, HeaderValue};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::core::classify::ErrorKind;
use crate::core::quota::Quota;

/// 存储后端给出的结构化错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageErrorCode {
    RetryLimitExceeded,
    Network,
    Timeout,
    Unauthenticated,
    PermissionDenied,
    ObjectNotFound,
    TooLarge,
    Other,
}

impl StorageErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageErrorCode::RetryLimitExceeded => "storage/retry-limit-exceeded",
            StorageErrorCode::Network => "storage/network-request-failed",
            StorageErrorCode::Timeout => "storage/timeout",
            StorageErrorCode::Unauthenticated => "auth/unauthenticated",
            StorageErrorCode::PermissionDenied => "storage/permission-denied",
            StorageErrorCode::ObjectNotFound => "storage/object-not-found",
            StorageErrorCode::TooLarge => "storage/download-size-exceeded",
            StorageErrorCode::Other => "storage/unknown",
        }
    }
}

/// 存储层错误：可选的结构化错误码 + 描述文本
///
/// 后端能给出错误码时一定要带上；只有文本的错误（例如第三方 SDK 透传的消息）
/// 由 [`classify`](crate::core::classify::classify) 退回到文本匹配。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct StorageError {
    pub code: Option<StorageErrorCode>,
    pub message: String,
}

impl StorageError {
    pub fn new(code: StorageErrorCode, detail: impl AsRef<str>) -> Self {
        Self {
            code: Some(code),
            message: format!("{}: {}", code.as_str(), detail.as_ref()),
        }
    }

    /// 只有文本描述、没有错误码的错误
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn too_large(limit: u64, actual: Option<u64>) -> Self {
        let detail = match actual {
            Some(actual) => format!("object is {} bytes, limit is {} bytes", actual, limit),
            None => format!("object exceeds the {} byte limit", limit),
        };
        Self::new(StorageErrorCode::TooLarge, detail)
    }
}

impl From<String> for StorageError {
    fn from(message: String) -> Self {
        StorageError::from_message(message)
    }
}

impl From<&str> for StorageError {
    fn from(message: &str) -> Self {
        StorageError::from_message(message)
    }
}

/// 返回给客户端的错误
///
/// 文本固定，不携带底层错误细节；细节只写日志。
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Storage path is required")]
    InvalidRequest,

    #[error("{message}")]
    RateLimited { message: String, quota: Quota },

    #[error("Invalid input detected")]
    SuspiciousInput,

    #[error("Input too long")]
    InputTooLong,

    #[error("{}", .0.client_message())]
    Download(ErrorKind),

    #[error("Not found")]
    RouteNotFound,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest | ApiError::SuspiciousInput | ApiError::InputTooLong => {
                StatusCode::BAD_REQUEST
            }
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Download(kind) => kind.status_code(),
            ApiError::RouteNotFound => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            ApiError::RateLimited { message, quota } => {
                let mut res = HttpResponse::build(self.status_code())
                    .content_type("text/plain; charset=utf-8")
                    .body(message.clone());
                quota.write_headers(res.headers_mut());
                res.headers_mut().insert(
                    header::RETRY_AFTER,
                    HeaderValue::from(quota.reset_after_secs()),
                );
                res
            }
            _ => HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() })),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use std::time::Duration;

    #[test]
    fn test_storage_error_carries_code_in_message() {
        let error = StorageError::new(StorageErrorCode::ObjectNotFound, "missing/x");
        assert_eq!(error.code, Some(StorageErrorCode::ObjectNotFound));
        assert_eq!(error.to_string(), "storage/object-not-found: missing/x");
    }

    #[test]
    fn test_error_conversion() {
        let error: StorageError = "network request failed".into();
        assert_eq!(error.code, None);

        let error: StorageError = String::from("boom").into();
        assert_eq!(error.message, "boom");
    }

    #[test]
    fn test_too_large_message() {
        let error = StorageError::too_large(10, Some(11));
        assert_eq!(error.code, Some(StorageErrorCode::TooLarge));
        assert!(error.message.contains("11 bytes"));
    }

    #[actix_web::test]
    async fn test_api_error_json_shape() {
        let res = ApiError::Download(ErrorKind::NotFound).error_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(res.into_body()).await.unwrap();
        assert_eq!(body.as_ref(), br#"{"error":"File not found"}"#);
    }

    #[actix_web::test]
    async fn test_rate_limited_is_plain_text_with_headers() {
        let quota = Quota {
            limit: 5,
            remaining: 0,
            reset_after: Duration::from_secs(90),
        };
        let res = ApiError::RateLimited {
            message: "slow down".to_string(),
            quota,
        }
        .error_response();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers().get(header::RETRY_AFTER).unwrap(), "90");
        assert_eq!(res.headers().get("ratelimit-limit").unwrap(), "5");
        let body = to_bytes(res.into_body()).await.unwrap();
        assert_eq!(body.as_ref(), b"slow down");
    }
}
