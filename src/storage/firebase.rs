use std::time::Duration;

use async_trait::async_trait;
use awc::error::{ConnectError, SendRequestError};
use awc::http::StatusCode;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use url::Url;

use super::{ObjectRef, ObjectStore};
use crate::config::StorageSettings;
use crate::core::error::{StorageError, StorageErrorCode};

/// Firebase Storage REST 后端
///
/// `GET {api_base}/v0/b/{bucket}/o/{编码后的对象路径}?alt=media`
#[derive(Debug, Clone)]
pub struct FirebaseStore {
    api_base: Url,
    bucket: String,
    token: Option<String>,
    timeout: Duration,
}

impl FirebaseStore {
    pub fn new(api_base: Url, bucket: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        Self {
            api_base,
            bucket: bucket.into(),
            token,
            timeout,
        }
    }

    pub fn from_settings(settings: &StorageSettings) -> anyhow::Result<Self> {
        if settings.bucket.trim().is_empty() {
            anyhow::bail!("firebase 后端需要配置 storage.bucket");
        }
        let api_base = Url::parse(&settings.api_base)
            .map_err(|e| anyhow::anyhow!("无效的 storage.api_base {}: {}", settings.api_base, e))?;
        Ok(Self::new(
            api_base,
            settings.bucket.trim(),
            settings.token.clone(),
            Duration::from_secs(settings.timeout_secs),
        ))
    }

    /// 对象路径整体作为一个路径段编码，`/` 会变成 `%2F`
    pub fn object_url(&self, object: &ObjectRef) -> Result<Url, StorageError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::new(StorageErrorCode::Other, "api_base cannot be a base URL"))?
            .pop_if_empty()
            .extend(["v0", "b", self.bucket.as_str(), "o", object.path.as_str()]);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }
}

#[async_trait(?Send)]
impl ObjectStore for FirebaseStore {
    fn name(&self) -> &'static str {
        "firebase"
    }

    async fn get_bytes(&self, object: &ObjectRef, max_bytes: u64) -> Result<Bytes, StorageError> {
        let url = self.object_url(object)?;
        let client = awc::Client::builder().timeout(self.timeout).finish();
        let mut request = client.get(url.as_str());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let mut response = request.send().await.map_err(send_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &object.path));
        }

        let declared = response
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        if let Some(len) = declared {
            if len > max_bytes {
                return Err(StorageError::too_large(max_bytes, Some(len)));
            }
        }

        let mut body = BytesMut::with_capacity(declared.unwrap_or(0) as usize);
        while let Some(chunk) = response.next().await {
            let chunk = chunk.map_err(|e| {
                StorageError::new(StorageErrorCode::Network, format!("body stream error: {}", e))
            })?;
            if body.len() as u64 + chunk.len() as u64 > max_bytes {
                return Err(StorageError::too_large(max_bytes, None));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}

fn send_error(error: SendRequestError) -> StorageError {
    match error {
        SendRequestError::Timeout | SendRequestError::Connect(ConnectError::Timeout) => {
            StorageError::new(StorageErrorCode::Timeout, error.to_string())
        }
        other => StorageError::new(StorageErrorCode::Network, other.to_string()),
    }
}

pub(crate) fn status_error(status: StatusCode, path: &str) -> StorageError {
    let code = match status {
        StatusCode::UNAUTHORIZED => StorageErrorCode::Unauthenticated,
        StatusCode::FORBIDDEN => StorageErrorCode::PermissionDenied,
        StatusCode::NOT_FOUND => StorageErrorCode::ObjectNotFound,
        StatusCode::REQUEST_TIMEOUT => StorageErrorCode::Timeout,
        StatusCode::TOO_MANY_REQUESTS => StorageErrorCode::RetryLimitExceeded,
        s if s.is_server_error() => StorageErrorCode::Network,
        _ => StorageErrorCode::Other,
    };
    StorageError::new(code, format!("HTTP {} for {}", status.as_u16(), path))
}
