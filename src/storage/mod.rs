//! Storage: 对象存储后端
//!
//! 代理只依赖两个操作：按路径解析出对象引用，以及带字节上限地读取整个对象。
//! 不做列举、写入、删除。
//!
//! - `firebase`: Firebase Storage / GCS REST 接口（awc 客户端）
//! - `local`: 本地目录，开发调试用

pub mod firebase;
pub mod local;

#[cfg(test)]
pub mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::{StorageBackend, StorageSettings};
use crate::core::error::StorageError;

pub use firebase::FirebaseStore;
pub use local::LocalDirStore;

/// 指向存储中某个对象的引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub path: String,
}

impl ObjectRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// 存储后端契约
///
/// `get_bytes` 返回的 future 不要求 `Send`：awc 客户端只能在当前线程使用。
#[async_trait(?Send)]
pub trait ObjectStore: Send + Sync {
    fn name(&self) -> &'static str;

    fn reference(&self, path: &str) -> ObjectRef {
        ObjectRef::new(path)
    }

    /// 读取完整对象，超过 `max_bytes` 时返回 `TooLarge`
    async fn get_bytes(&self, object: &ObjectRef, max_bytes: u64) -> Result<Bytes, StorageError>;
}

/// 按配置创建存储后端
pub fn from_settings(settings: &StorageSettings) -> anyhow::Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match settings.backend {
        StorageBackend::Firebase => Arc::new(FirebaseStore::from_settings(settings)?),
        StorageBackend::Local => Arc::new(LocalDirStore::new(&settings.root)),
    };
    log::info!("存储后端: {}", store.name());
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings_local() {
        let settings = StorageSettings {
            backend: StorageBackend::Local,
            ..StorageSettings::default()
        };
        let store = from_settings(&settings).unwrap();
        assert_eq!(store.name(), "local");
        assert_eq!(store.reference("a/b.txt"), ObjectRef::new("a/b.txt"));
    }

    #[test]
    fn test_from_settings_firebase_requires_bucket() {
        let settings = StorageSettings {
            backend: StorageBackend::Firebase,
            bucket: String::new(),
            ..StorageSettings::default()
        };
        assert!(from_settings(&settings).is_err());
    }
}
