//! Background job registry.
//!
//! Submitting a job returns its id immediately; the pipeline run happens on a
//! spawned task that owns the job's `watch` sender and is its only writer.
//! Pollers read the latest published record. With persistence enabled every
//! transition, starting with `Pending`, is mirrored into the `Job` collection
//! so status lookups survive a restart, and finished jobs are served from the
//! store instead of process memory.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::pipeline::PipelineController;
use crate::cache::Cache;
use crate::store::Collection;
use crate::{metrics, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Index,
    Query,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Index => "index",
            JobKind::Query => "query",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub documents_folder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents_processed: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    fn pending(kind: JobKind, documents_folder: String, query: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4().to_string(),
            kind,
            status: JobStatus::Pending,
            documents_folder,
            query,
            error: None,
            documents_processed: None,
            answer: None,
            created_at: now,
            updated_at: now,
        }
    }
}

enum JobOutcome {
    Indexed(usize),
    Answered(String),
}

pub struct JobRegistry {
    controller: Arc<PipelineController>,
    jobs: RwLock<HashMap<String, watch::Receiver<JobRecord>>>,
    persistence: Option<Cache>,
}

impl JobRegistry {
    /// Registry that keeps job records in process memory only.
    pub fn new(controller: Arc<PipelineController>) -> Self {
        Self {
            controller,
            jobs: RwLock::new(HashMap::new()),
            persistence: None,
        }
    }

    /// Registry that also mirrors job records into the controller's store.
    pub fn with_persistence(controller: Arc<PipelineController>) -> Self {
        let cache = Cache::new(controller.store().clone());
        Self {
            controller,
            jobs: RwLock::new(HashMap::new()),
            persistence: Some(cache),
        }
    }

    pub fn controller(&self) -> &Arc<PipelineController> {
        &self.controller
    }

    /// Start indexing `folder` in the background.
    pub async fn start_index(self: &Arc<Self>, folder: impl Into<String>) -> Result<String> {
        self.start(JobRecord::pending(JobKind::Index, folder.into(), None))
            .await
    }

    /// Answer `query` over `folder` in the background.
    pub async fn start_query(
        self: &Arc<Self>,
        query: impl Into<String>,
        folder: impl Into<String>,
    ) -> Result<String> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(Error::InvalidArgument("query must not be empty".to_string()));
        }
        self.start(JobRecord::pending(JobKind::Query, folder.into(), Some(query)))
            .await
    }

    async fn start(self: &Arc<Self>, record: JobRecord) -> Result<String> {
        if let Some(cache) = &self.persistence {
            cache.put(Collection::Job, &record.job_id, &record).await?;
        }
        let job_id = record.job_id.clone();
        let (tx, rx) = watch::channel(record);
        self.jobs
            .write()
            .map_err(|_| Error::Store("job registry lock poisoned".to_string()))?
            .insert(job_id.clone(), rx);

        let registry = Arc::clone(self);
        tokio::spawn(async move { registry.run(tx).await });

        info!(%job_id, "Job submitted");
        Ok(job_id)
    }

    async fn run(&self, tx: watch::Sender<JobRecord>) {
        let job = tx.borrow().clone();
        self.publish(&tx, |r| r.status = JobStatus::Running).await;
        info!(job_id = %job.job_id, kind = job.kind.as_str(), folder = %job.documents_folder, "Job running");

        let outcome = match job.kind {
            JobKind::Index => self
                .controller
                .index_folder(PathBuf::from(&job.documents_folder))
                .await
                .map(JobOutcome::Indexed),
            JobKind::Query => self
                .controller
                .query_folder(job.query.as_deref().unwrap_or_default(), &job.documents_folder)
                .await
                .map(JobOutcome::Answered),
        };

        metrics::record_job(job.kind.as_str(), outcome.is_ok());
        match outcome {
            Ok(result) => {
                info!(job_id = %job.job_id, "Job completed");
                self.publish(&tx, |r| {
                    r.status = JobStatus::Completed;
                    match result {
                        JobOutcome::Indexed(count) => r.documents_processed = Some(count),
                        JobOutcome::Answered(answer) => r.answer = Some(answer),
                    }
                })
                .await;
            }
            Err(err) => {
                error!(job_id = %job.job_id, error = %err, "Job failed");
                self.publish(&tx, |r| {
                    r.status = JobStatus::Failed;
                    r.error = Some(err.to_string());
                })
                .await;
            }
        }
    }

    /// Apply one transition. The store is written before pollers observe it.
    async fn publish(&self, tx: &watch::Sender<JobRecord>, update: impl FnOnce(&mut JobRecord)) {
        let mut record = tx.borrow().clone();
        update(&mut record);
        record.updated_at = Utc::now();

        let mut persisted = false;
        if let Some(cache) = &self.persistence {
            match cache.put(Collection::Job, &record.job_id, &record).await {
                Ok(()) => persisted = true,
                Err(err) => {
                    warn!(job_id = %record.job_id, error = %err, "Failed to persist job record")
                }
            }
        }
        // A persisted terminal record is served from the store from now on.
        if persisted && record.status.is_terminal() {
            self.evict(&record.job_id);
        }
        tx.send_replace(record);
    }

    fn evict(&self, job_id: &str) {
        match self.jobs.write() {
            Ok(mut jobs) => {
                jobs.remove(job_id);
            }
            Err(_) => warn!(%job_id, "Job registry lock poisoned, keeping finished job"),
        }
    }

    /// Latest record for `job_id`, from memory first and the store second.
    pub async fn status(&self, job_id: &str) -> Result<JobRecord> {
        if let Some(rx) = self.receiver(job_id)? {
            let record = rx.borrow().clone();
            return Ok(record);
        }
        if let Some(cache) = &self.persistence {
            if let Some(record) = cache.get::<JobRecord>(Collection::Job, job_id).await? {
                return Ok(record);
            }
        }
        Err(Error::JobNotFound(job_id.to_string()))
    }

    /// Resolve once the job reaches a terminal status.
    pub async fn wait(&self, job_id: &str) -> Result<JobRecord> {
        let Some(mut rx) = self.receiver(job_id)? else {
            return self.status(job_id).await;
        };
        let reached = rx
            .wait_for(|r| r.status.is_terminal())
            .await
            .map(|r| (*r).clone());
        // Sender gone without a terminal record: report the last one seen.
        let record = match reached {
            Ok(record) => record,
            Err(_) => rx.borrow().clone(),
        };
        Ok(record)
    }

    fn receiver(&self, job_id: &str) -> Result<Option<watch::Receiver<JobRecord>>> {
        Ok(self
            .jobs
            .read()
            .map_err(|_| Error::Store("job registry lock poisoned".to_string()))?
            .get(job_id)
            .cloned())
    }
}
