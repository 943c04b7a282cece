//! TopicRegistry - topic 名と TaskRunner の対応表
//!
//! # 学習ポイント
//! - HashMap<String, Arc<TaskRunner>> で runner を共有
//! - 二重登録はエラー (後勝ちにしない)

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{SandrunError, TaskContext, TaskOutcome};

use super::runner::TaskRunner;

/// topic → runner. Shared read-only once the worker is built.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    runners: HashMap<String, Arc<TaskRunner>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("a runner for topic '{0}' is already registered")]
    DuplicateTopic(String),
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `runner` under its own topic; a second runner for the same
    /// topic is rejected.
    pub fn register(&mut self, runner: TaskRunner) -> Result<(), RegistryError> {
        let topic = runner.topic().to_string();
        if self.runners.contains_key(&topic) {
            return Err(RegistryError::DuplicateTopic(topic));
        }
        self.runners.insert(topic, Arc::new(runner));
        Ok(())
    }

    /// 未登録の topic は `None`
    pub fn get(&self, topic: &str) -> Option<Arc<TaskRunner>> {
        self.runners.get(topic).cloned()
    }

    /// Registered topics, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.runners.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn len(&self) -> usize {
        self.runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }

    /// Dispatch one leased task to the runner of `topic`.
    pub async fn execute(
        &self,
        topic: &str,
        task: &TaskContext,
    ) -> Result<TaskOutcome, SandrunError> {
        let runner = self
            .get(topic)
            .ok_or_else(|| SandrunError::UnknownTopic(topic.to_string()))?;
        runner.execute(task).await
    }
}
