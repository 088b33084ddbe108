use std::sync::{Arc, Mutex};

use job_datastore::{ArchivedJob, DataStore, JobSummary};

#[derive(Clone, Default)]
pub struct MockDataStore {
    pub inserted: Arc<Mutex<Vec<ArchivedJob>>>,
    pub fail_with: Option<String>,
}

impl MockDataStore {
    pub fn failing(msg: &str) -> Self {
        Self {
            fail_with: Some(msg.to_string()),
            ..Default::default()
        }
    }

    pub fn with_jobs(jobs: Vec<ArchivedJob>) -> Self {
        Self {
            inserted: Arc::new(Mutex::new(jobs)),
            fail_with: None,
        }
    }
}

impl DataStore for MockDataStore {
    async fn insert_job(&self, job: &ArchivedJob) -> anyhow::Result<()> {
        if let Some(ref msg) = self.fail_with {
            return Err(anyhow::anyhow!("{}", msg));
        }
        self.inserted.lock().unwrap().push(job.clone());
        Ok(())
    }

    async fn load_job(&self, job_id: &str) -> anyhow::Result<Option<ArchivedJob>> {
        let jobs = self.inserted.lock().unwrap();
        Ok(jobs.iter().find(|job| job.id == job_id).cloned())
    }

    async fn list_recent_jobs(&self, limit: i64) -> anyhow::Result<Vec<JobSummary>> {
        let jobs = self.inserted.lock().unwrap();
        let summaries = jobs
            .iter()
            .rev()
            .take(limit as usize)
            .map(|job| {
                let metadata = job.metadata.clone().unwrap_or_default();
                JobSummary {
                    id: job.id.clone(),
                    title: metadata.title,
                    channel: metadata.channel,
                    thumbnail: metadata.thumbnail,
                    duration: metadata.duration,
                    created_at: job.created_at,
                }
            })
            .collect();
        Ok(summaries)
    }
}
