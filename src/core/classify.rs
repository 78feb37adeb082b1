//! 存储错误分类
//!
//! 优先看结构化错误码；没有错误码时才按描述文本做子串匹配（区分大小写，
//! 按优先级顺序，先匹配先得）。

use actix_web::http::StatusCode;

use crate::core::error::{StorageError, StorageErrorCode};

/// 分类结果，与 HTTP 状态和对外文本一一对应
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transient,
    Unauthenticated,
    Forbidden,
    NotFound,
    TooLarge,
    Unknown,
}

const TRANSIENT_MARKERS: [&str; 3] = ["retry-limit-exceeded", "network", "timeout"];
const UNAUTHENTICATED_MARKER: &str = "auth/unauthenticated";
const FORBIDDEN_MARKER: &str = "permission-denied";
const NOT_FOUND_MARKER: &str = "object-not-found";

impl ErrorKind {
    /// 只有瞬时错误会被重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Transient | ErrorKind::TooLarge | ErrorKind::Unknown => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn client_message(&self) -> &'static str {
        match self {
            ErrorKind::Unauthenticated => "Unauthorized",
            ErrorKind::Forbidden => "Access denied",
            ErrorKind::NotFound => "File not found",
            ErrorKind::Transient | ErrorKind::TooLarge | ErrorKind::Unknown => "Download failed",
        }
    }
}

pub fn classify(error: &StorageError) -> ErrorKind {
    match error.code {
        Some(code) => classify_code(code),
        None => classify_message(&error.message),
    }
}

pub fn classify_code(code: StorageErrorCode) -> ErrorKind {
    match code {
        StorageErrorCode::RetryLimitExceeded
        | StorageErrorCode::Network
        | StorageErrorCode::Timeout => ErrorKind::Transient,
        StorageErrorCode::Unauthenticated => ErrorKind::Unauthenticated,
        StorageErrorCode::PermissionDenied => ErrorKind::Forbidden,
        StorageErrorCode::ObjectNotFound => ErrorKind::NotFound,
        StorageErrorCode::TooLarge => ErrorKind::TooLarge,
        StorageErrorCode::Other => ErrorKind::Unknown,
    }
}

/// 文本兜底匹配
pub fn classify_message(message: &str) -> ErrorKind {
    if TRANSIENT_MARKERS.iter().any(|marker| message.contains(marker)) {
        ErrorKind::Transient
    } else if message.contains(UNAUTHENTICATED_MARKER) {
        ErrorKind::Unauthenticated
    } else if message.contains(FORBIDDEN_MARKER) {
        ErrorKind::Forbidden
    } else if message.contains(NOT_FOUND_MARKER) {
        ErrorKind::NotFound
    } else {
        ErrorKind::Unknown
    }
}
