use std::future::Future;

use crate::{ArchivedJob, JobSummary};

pub mod postgres;

pub trait DataStore {
    fn insert_job(&self, job: &ArchivedJob) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn load_job(
        &self,
        job_id: &str,
    ) -> impl Future<Output = anyhow::Result<Option<ArchivedJob>>> + Send;

    fn list_recent_jobs(
        &self,
        limit: i64,
    ) -> impl Future<Output = anyhow::Result<Vec<JobSummary>>> + Send;
}

impl<T: DataStore + Send + Sync> DataStore for &T {
    async fn insert_job(&self, job: &ArchivedJob) -> anyhow::Result<()> {
        (**self).insert_job(job).await
    }

    async fn load_job(&self, job_id: &str) -> anyhow::Result<Option<ArchivedJob>> {
        (**self).load_job(job_id).await
    }

    async fn list_recent_jobs(&self, limit: i64) -> anyhow::Result<Vec<JobSummary>> {
        (**self).list_recent_jobs(limit).await
    }
}

impl<T: DataStore + Send + Sync> DataStore for std::sync::Arc<T> {
    async fn insert_job(&self, job: &ArchivedJob) -> anyhow::Result<()> {
        (**self).insert_job(job).await
    }

    async fn load_job(&self, job_id: &str) -> anyhow::Result<Option<ArchivedJob>> {
        (**self).load_job(job_id).await
    }

    async fn list_recent_jobs(&self, limit: i64) -> anyhow::Result<Vec<JobSummary>> {
        (**self).list_recent_jobs(limit).await
    }
}
