//! Where workers get their tasks from.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::{SchedulerError, TransportError};
use crate::model::{Task, TaskResult};
use crate::scheduler::Scheduler;

// ── Task source trait ───────────────────────────────────────────────

/// Pull/submit seam between the worker pool and a scheduler.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Lease the next ready task, or `None` when nothing is ready.
    async fn pull_task(&self) -> Result<Option<Task>, TransportError>;

    /// Report a task result. `Rejected` means the scheduler no longer
    /// expects this task (lease expired or expression failed).
    async fn submit_result(&self, result: TaskResult) -> Result<(), TransportError>;
}

// ── In-process source ───────────────────────────────────────────────

/// Workers sharing a process with the scheduler.
#[derive(Clone)]
pub struct LocalTaskSource {
    scheduler: Arc<Scheduler>,
    holder: String,
}

impl LocalTaskSource {
    pub fn new(scheduler: Arc<Scheduler>, holder: impl Into<String>) -> Self {
        Self {
            scheduler,
            holder: holder.into(),
        }
    }
}

#[async_trait]
impl TaskSource for LocalTaskSource {
    async fn pull_task(&self) -> Result<Option<Task>, TransportError> {
        Ok(self.scheduler.pull_task(&self.holder).await)
    }

    async fn submit_result(&self, result: TaskResult) -> Result<(), TransportError> {
        let id = result.id;
        self.scheduler
            .submit_result(result)
            .await
            .map(|_| ())
            .map_err(|err: SchedulerError| TransportError::Rejected {
                id,
                reason: err.to_string(),
            })
    }
}

// ── HTTP source ─────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TaskEnvelope {
    task: Task,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Talks to a remote orchestrator's internal task endpoints.
pub struct HttpTaskSource {
    base_url: String,
    agent_id: String,
    client: reqwest::Client,
}

impl HttpTaskSource {
    pub fn new(base_url: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent_id: agent_id.into(),
            client: reqwest::Client::new(),
        }
    }

    fn task_url(&self) -> String {
        format!("{}/internal/task", self.base_url)
    }
}

#[async_trait]
impl TaskSource for HttpTaskSource {
    async fn pull_task(&self) -> Result<Option<Task>, TransportError> {
        let resp = self
            .client
            .get(self.task_url())
            .header("x-agent-id", &self.agent_id)
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(Some(resp.json::<TaskEnvelope>().await?.task)),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(TransportError::Status {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn submit_result(&self, result: TaskResult) -> Result<(), TransportError> {
        let id = result.id;
        let resp = self
            .client
            .post(self.task_url())
            .header("x-agent-id", &self.agent_id)
            .json(&result)
            .send()
            .await?;

        match resp.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                let reason = resp
                    .json::<ErrorBody>()
                    .await
                    .map(|body| body.error)
                    .unwrap_or_else(|_| "task not found".to_string());
                Err(TransportError::Rejected { id, reason })
            }
            status => Err(TransportError::Status {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::model::OwnerId;

    #[tokio::test]
    async fn local_source_round_trip() {
        let scheduler = Scheduler::new(SchedulerConfig::default());
        scheduler
            .submit_expression(OwnerId(0), "6 * 7")
            .await
            .unwrap();
        let source = LocalTaskSource::new(Arc::clone(&scheduler), "local");

        let task = source.pull_task().await.unwrap().unwrap();
        source
            .submit_result(TaskResult::success(&task, 42.0))
            .await
            .unwrap();

        let err = source
            .submit_result(TaskResult::success(&task, 42.0))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected { id, .. } if id == task.id));
        assert!(source.pull_task().await.unwrap().is_none());
    }

    #[test]
    fn http_source_trims_base_url() {
        let source = HttpTaskSource::new("http://localhost:8080/", "agent");
        assert_eq!(source.task_url(), "http://localhost:8080/internal/task");
    }
}
