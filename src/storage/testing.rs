//! 测试用的脚本化存储后端：按顺序回放预设结果并记录调用

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::{ObjectRef, ObjectStore};
use crate::core::error::StorageError;

pub type Outcome = Result<Bytes, StorageError>;

pub struct ScriptedStore {
    script: Mutex<VecDeque<Outcome>>,
    calls: Mutex<Vec<(String, u64)>>,
    latency: Option<Duration>,
    enforce_limit: bool,
}

impl ScriptedStore {
    /// 每次调用都返回同一个结果
    pub fn always(outcome: Outcome) -> Self {
        Self::sequence(vec![outcome])
    }

    /// 依次返回；最后一个结果会一直重复
    pub fn sequence(outcomes: Vec<Outcome>) -> Self {
        assert!(!outcomes.is_empty(), "script needs at least one outcome");
        Self {
            script: Mutex::new(outcomes.into()),
            calls: Mutex::new(Vec::new()),
            latency: None,
            enforce_limit: true,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// 模拟不做限长的后端
    pub fn ignoring_limit(mut self) -> Self {
        self.enforce_limit = false;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn requested_paths(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn last_max_bytes(&self) -> Option<u64> {
        self.calls.lock().unwrap().last().map(|(_, m)| *m)
    }

    fn next_outcome(&self) -> Outcome {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap()
        }
    }
}

#[async_trait(?Send)]
impl ObjectStore for ScriptedStore {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn get_bytes(&self, object: &ObjectRef, max_bytes: u64) -> Result<Bytes, StorageError> {
        self.calls.lock().unwrap().push((object.path.clone(), max_bytes));
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let bytes = self.next_outcome()?;
        if self.enforce_limit && bytes.len() as u64 > max_bytes {
            return Err(StorageError::too_large(max_bytes, Some(bytes.len() as u64)));
        }
        Ok(bytes)
    }
}
