use std::sync::Arc;

use bytes::Bytes;

use crate::core::error::StorageError;
use crate::storage::ObjectStore;

/// 单次下载的默认字节上限：500 MiB
pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 500 * 1024 * 1024;

/// 对象获取器：每次调用只向存储后端发一次请求，不缓存、不重试
#[derive(Clone)]
pub struct ObjectFetcher {
    store: Arc<dyn ObjectStore>,
    max_bytes: u64,
}

impl ObjectFetcher {
    pub fn new(store: Arc<dyn ObjectStore>, max_bytes: u64) -> Self {
        Self { store, max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub async fn fetch(&self, storage_path: &str) -> Result<Bytes, StorageError> {
        let object = self.store.reference(storage_path);
        let bytes = self.store.get_bytes(&object, self.max_bytes).await?;
        // 后端自身没有限长时在这里兜底
        if bytes.len() as u64 > self.max_bytes {
            return Err(StorageError::too_large(self.max_bytes, Some(bytes.len() as u64)));
        }
        Ok(bytes)
    }
}

impl std::fmt::Debug for ObjectFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectFetcher")
            .field("store", &self.store.name())
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}
