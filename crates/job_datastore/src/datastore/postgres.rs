use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::{migrate::Migrator, postgres::PgPoolOptions, PgPool};

use crate::{
    datastore::DataStore, ArchivedJob, JobSummary, StageTimings, TranscriptSegment, VideoMetadata,
};

static MIGRATOR: Migrator = sqlx::migrate!();

#[derive(Debug, Clone)]
pub struct PgDataStore {
    pub pool: PgPool,
}

impl PgDataStore {
    /// Establish connection to database and run the jobs table migrations
    pub async fn init(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .inspect_err(
                |e| tracing::error!(error = ?e, "Failed to establish connection to database"),
            )
            .context("Failed to connect to postgres database")?;

        MIGRATOR
            .run(&pool)
            .await
            .inspect_err(|e| tracing::error!(error = ?e, "Failed to run database migrations"))
            .context("Failed to run database migrations")?;

        Ok(PgDataStore { pool })
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    url: String,
    video_id: String,
    title: String,
    channel: String,
    thumbnail: String,
    duration: i64,
    upload_date: String,
    transcript_text: String,
    transcript_segments: String,
    transcript_language: String,
    summary: String,
    created_at: DateTime<Utc>,
    download_time: f64,
    transcribe_time: f64,
    summarize_time: f64,
    whisper_model: String,
    summarizer_model: String,
}

impl TryFrom<JobRow> for ArchivedJob {
    type Error = anyhow::Error;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let transcript_segments =
            serde_json::from_str::<Vec<TranscriptSegment>>(&row.transcript_segments)
                .with_context(|| format!("Malformed transcript segments for job {}", row.id))?;

        // metadata is only recorded when the title could be fetched
        let metadata = (!row.title.is_empty()).then(|| VideoMetadata {
            video_id: row.video_id,
            title: row.title,
            channel: row.channel,
            thumbnail: row.thumbnail,
            duration: row.duration,
            upload_date: row.upload_date,
        });

        Ok(ArchivedJob {
            id: row.id,
            url: row.url,
            metadata,
            transcript_text: row.transcript_text,
            transcript_segments,
            transcript_language: row.transcript_language,
            summary: row.summary,
            created_at: row.created_at,
            timings: StageTimings {
                download_secs: row.download_time,
                transcribe_secs: row.transcribe_time,
                summarize_secs: row.summarize_time,
            },
            whisper_model: row.whisper_model,
            summarizer_model: row.summarizer_model,
        })
    }
}

impl DataStore for PgDataStore {
    async fn insert_job(&self, job: &ArchivedJob) -> anyhow::Result<()> {
        let segments = serde_json::to_string(&job.transcript_segments)
            .context("Failed to serialize transcript segments")?;
        let metadata = job.metadata.clone().unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, url, video_id, title, channel, thumbnail, duration, upload_date,
                transcript_text, transcript_segments, transcript_language, summary, created_at,
                download_time, transcribe_time, summarize_time, whisper_model, summarizer_model
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (id) DO UPDATE SET
                transcript_text = EXCLUDED.transcript_text,
                transcript_segments = EXCLUDED.transcript_segments,
                transcript_language = EXCLUDED.transcript_language,
                summary = EXCLUDED.summary
            "#,
        )
        .bind(&job.id)
        .bind(&job.url)
        .bind(&metadata.video_id)
        .bind(&metadata.title)
        .bind(&metadata.channel)
        .bind(&metadata.thumbnail)
        .bind(metadata.duration)
        .bind(&metadata.upload_date)
        .bind(&job.transcript_text)
        .bind(segments)
        .bind(&job.transcript_language)
        .bind(&job.summary)
        .bind(job.created_at)
        .bind(job.timings.download_secs)
        .bind(job.timings.transcribe_secs)
        .bind(job.timings.summarize_secs)
        .bind(&job.whisper_model)
        .bind(&job.summarizer_model)
        .execute(&self.pool)
        .await
        .inspect_err(|err| {
            tracing::error!(
                error = ?err,
                job_id = %job.id,
                "Failed to insert job"
            )
        })
        .context("Failed to insert job")?;

        Ok(())
    }

    async fn load_job(&self, job_id: &str) -> anyhow::Result<Option<ArchivedJob>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .inspect_err(|e| tracing::error!(error = ?e, %job_id, "Failed to fetch job"))
            .context("Failed to fetch job")?;

        row.map(ArchivedJob::try_from).transpose()
    }

    async fn list_recent_jobs(&self, limit: i64) -> anyhow::Result<Vec<JobSummary>> {
        #[derive(sqlx::FromRow)]
        struct SummaryRow {
            id: String,
            title: String,
            channel: String,
            thumbnail: String,
            duration: i64,
            created_at: DateTime<Utc>,
        }

        let rows = sqlx::query_as::<_, SummaryRow>(
            "SELECT id, title, channel, thumbnail, duration, created_at FROM jobs ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .inspect_err(|e| tracing::error!(error = ?e, "Failed to list recent jobs"))
        .context("Failed to list recent jobs")?;

        Ok(rows
            .into_iter()
            .map(|r| JobSummary {
                id: r.id,
                title: r.title,
                channel: r.channel,
                thumbnail: r.thumbnail,
                duration: r.duration,
                created_at: r.created_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(title: &str) -> JobRow {
        JobRow {
            id: "a1b2c3d4e5f6".into(),
            url: "https://youtu.be/dQw4w9WgXcQ".into(),
            video_id: "dQw4w9WgXcQ".into(),
            title: title.into(),
            channel: "Rick Astley".into(),
            thumbnail: String::new(),
            duration: 213,
            upload_date: "20091025".into(),
            transcript_text: "text".into(),
            transcript_segments: r#"[{"start": 0.0, "end": 2.5, "text": "text"}]"#.into(),
            transcript_language: "english".into(),
            summary: "summary".into(),
            created_at: Utc::now(),
            download_time: 1.0,
            transcribe_time: 2.0,
            summarize_time: 3.0,
            whisper_model: "whisper-1".into(),
            summarizer_model: "gemma3:4b".into(),
        }
    }

    #[test]
    fn test_row_keeps_video_id_apart_from_job_id() {
        let job = ArchivedJob::try_from(row("Never Gonna Give You Up")).unwrap();

        assert_eq!(job.id, "a1b2c3d4e5f6");
        let metadata = job.metadata.unwrap();
        assert_eq!(metadata.video_id, "dQw4w9WgXcQ");
        assert_eq!(metadata.title, "Never Gonna Give You Up");
        assert_eq!(job.transcript_segments.len(), 1);
        assert_eq!(job.timings.summarize_secs, 3.0);
    }

    #[test]
    fn test_row_without_title_has_no_metadata() {
        let job = ArchivedJob::try_from(row("")).unwrap();
        assert!(job.metadata.is_none());
    }

    #[test]
    fn test_malformed_segments_are_rejected() {
        let mut bad = row("title");
        bad.transcript_segments = "not json".into();

        let e = ArchivedJob::try_from(bad).unwrap_err();
        assert!(e.to_string().contains("a1b2c3d4e5f6"));
    }
}
