use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use job_datastore::DataStore;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::{
    job::{JobId, ProgressMessage},
    processor::Pipeline,
    registry::{JobRegistry, JobSubscription},
    server::{error::ApiError, AppState},
};

/// `GET /api/jobs/{job_id}/events`
#[tracing::instrument(skip(state))]
pub async fn job_events<P, D>(
    State(state): State<AppState<P, D>>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError>
where
    P: Pipeline,
    D: DataStore + Send + Sync + 'static,
{
    let id = JobId::from(job_id);
    let subscription = state
        .registry
        .subscribe(&id)
        .ok_or_else(|| ApiError::JobNotFound(id.clone()))?;

    let stream = progress_stream(
        state.registry.clone(),
        id,
        subscription,
        state.sse_max_lifetime,
        state.shutdown.clone(),
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Current snapshot first, then every distinct update until the job reaches
/// a terminal status, `max_lifetime` elapses or the server shuts down.
pub fn progress_stream(
    registry: Arc<JobRegistry>,
    id: JobId,
    subscription: JobSubscription,
    max_lifetime: Duration,
    shutdown: CancellationToken,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let JobSubscription {
        snapshot,
        mut receiver,
    } = subscription;
    let deadline = tokio::time::Instant::now() + max_lifetime;

    async_stream::stream! {
        yield Ok(to_event(&snapshot));
        if snapshot.status.is_terminal() {
            return;
        }

        let mut last = snapshot;
        loop {
            let received = tokio::select! {
                received = receiver.recv() => received,
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::debug!(job_id = %id, "Event stream reached its max lifetime");
                    break;
                }
                _ = shutdown.cancelled() => break,
            };

            let message = match received {
                Ok(message) => message,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(job_id = %id, skipped, "Event stream lagged, resyncing");
                    // resubscribe so the snapshot and the new receiver line up
                    let Some(resync) = registry.subscribe(&id) else {
                        break;
                    };
                    receiver = resync.receiver;
                    resync.snapshot
                }
                Err(RecvError::Closed) => break,
            };

            if message == last {
                continue;
            }

            let terminal = message.status.is_terminal();
            yield Ok(to_event(&message));
            last = message;

            if terminal {
                break;
            }
        }
    }
}

fn to_event(message: &ProgressMessage) -> Event {
    Event::default().json_data(message).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialize progress message");
        Event::default().event("error").data("serialization failed")
    })
}

#[cfg(test)]
mod tests {
    use axum::{body::to_bytes, response::IntoResponse};

    use super::*;
    use crate::{client::SseDecoder, job::JobStatus};

    async fn collect(
        stream: impl Stream<Item = Result<Event, Infallible>> + Send + 'static,
    ) -> Vec<ProgressMessage> {
        let response = Sse::new(stream).into_response();
        let body = tokio::time::timeout(
            Duration::from_secs(2),
            to_bytes(response.into_body(), usize::MAX),
        )
        .await
        .expect("event stream did not end")
        .unwrap();

        SseDecoder::default()
            .push(&body)
            .iter()
            .map(|payload| serde_json::from_str(payload).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_lagged_stream_resyncs_to_latest_state() {
        let registry = Arc::new(JobRegistry::default().with_channel_capacity(2));
        let handle = registry.create("https://youtu.be/dQw4w9WgXcQ");
        let id = handle.id().clone();
        handle
            .set_status(JobStatus::Downloading, "Downloading audio...")
            .unwrap();
        let subscription = registry.subscribe(&id).unwrap();
        let stream = progress_stream(
            Arc::clone(&registry),
            id,
            subscription,
            Duration::from_secs(60),
            CancellationToken::new(),
        );

        // far more updates than the channel holds, before anything is read
        for pct in 1..=10 {
            handle.report_progress(pct * 10, format!("{}%", pct * 10)).unwrap();
        }
        handle.fail("Download failed: HTTP 403").unwrap();

        let messages = collect(stream).await;

        assert_eq!(messages.first().unwrap().status, JobStatus::Downloading);
        assert_eq!(messages.first().unwrap().progress, 0);
        let last = messages.last().unwrap();
        assert_eq!(last.status, JobStatus::Failed);
        assert_eq!(last.error.as_deref(), Some("Download failed: HTTP 403"));
        assert!(messages[..messages.len() - 1]
            .iter()
            .all(|msg| msg.status == JobStatus::Downloading));
        assert!(messages
            .windows(2)
            .filter(|pair| pair[1].status == JobStatus::Downloading)
            .all(|pair| pair[0].progress < pair[1].progress));
    }

    #[tokio::test]
    async fn test_stream_ends_at_max_lifetime() {
        let registry = Arc::new(JobRegistry::default());
        let handle = registry.create("https://youtu.be/dQw4w9WgXcQ");
        let id = handle.id().clone();
        let subscription = registry.subscribe(&id).unwrap();

        let stream = progress_stream(
            Arc::clone(&registry),
            id,
            subscription,
            Duration::from_millis(50),
            CancellationToken::new(),
        );
        let messages = collect(stream).await;

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status, JobStatus::Pending);
        // the job itself keeps running
        assert_eq!(handle.snapshot().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_stream_ends_on_shutdown() {
        let registry = Arc::new(JobRegistry::default());
        let handle = registry.create("https://youtu.be/dQw4w9WgXcQ");
        let id = handle.id().clone();
        handle
            .set_status(JobStatus::Transcribing, "Transcribing...")
            .unwrap();
        let subscription = registry.subscribe(&id).unwrap();
        let shutdown = CancellationToken::new();

        let stream = progress_stream(
            Arc::clone(&registry),
            id,
            subscription,
            Duration::from_secs(3600),
            shutdown.clone(),
        );
        shutdown.cancel();
        let messages = collect(stream).await;

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status, JobStatus::Transcribing);
    }
}
