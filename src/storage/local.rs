use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use super::{ObjectRef, ObjectStore};
use crate::core::error::{StorageError, StorageErrorCode};

/// 本地目录后端，对象路径相对于 `root`
#[derive(Debug, Clone)]
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// 拒绝绝对路径和 `..`，防止读到根目录之外
    fn resolve(&self, object: &ObjectRef) -> Result<PathBuf, StorageError> {
        let relative = Path::new(&object.path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(StorageError::new(
                StorageErrorCode::PermissionDenied,
                format!("path escapes storage root: {}", object.path),
            ));
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(error: io::Error, path: &str) -> StorageError {
    let code = match error.kind() {
        io::ErrorKind::NotFound => StorageErrorCode::ObjectNotFound,
        io::ErrorKind::PermissionDenied => StorageErrorCode::PermissionDenied,
        io::ErrorKind::TimedOut => StorageErrorCode::Timeout,
        _ => StorageErrorCode::Other,
    };
    StorageError::new(code, format!("{}: {}", path, error))
}

#[async_trait(?Send)]
impl ObjectStore for LocalDirStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn get_bytes(&self, object: &ObjectRef, max_bytes: u64) -> Result<Bytes, StorageError> {
        let full_path = self.resolve(object)?;
        let metadata = tokio::fs::metadata(&full_path)
            .await
            .map_err(|e| io_error(e, &object.path))?;
        if !metadata.is_file() {
            return Err(StorageError::new(StorageErrorCode::ObjectNotFound, &object.path));
        }
        if metadata.len() > max_bytes {
            return Err(StorageError::too_large(max_bytes, Some(metadata.len())));
        }
        let data = tokio::fs::read(&full_path)
            .await
            .map_err(|e| io_error(e, &object.path))?;
        Ok(Bytes::from(data))
    }
}
