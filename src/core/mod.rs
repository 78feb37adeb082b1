//! Core: 重试退避、存储错误分类、对象获取、限流额度

pub mod classify;
pub mod error;
pub mod fetcher;
pub mod quota;
pub mod retry;

pub use classify::{classify, ErrorKind};
pub use error::{ApiError, StorageError, StorageErrorCode};
pub use fetcher::{ObjectFetcher, DEFAULT_MAX_DOWNLOAD_BYTES};
pub use quota::Quota;
pub use retry::{RetryContext, RetryStats, RetryStrategy};
