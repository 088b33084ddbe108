//! Terminal client for a job's event stream, driving the
//! [`ProgressRenderer`](crate::renderer::ProgressRenderer).

use std::time::Instant;

use anyhow::Context;
use futures::StreamExt;
use itertools::Itertools;
use reqwest::{header::ACCEPT, StatusCode};

use crate::{
    job::JobId,
    renderer::{
        ChannelState, ConnectionMonitor, ProgressRenderer, RenderInstruction, StageVisual,
        STAGE_NAMES,
    },
};

/// Incremental decoder for `text/event-stream` bodies.
///
/// Only `data:` fields matter here; comments (keep-alives) and other fields
/// are skipped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feeds a chunk of the body, returning the payloads of every event it
    /// completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line = self.buf.drain(..=pos).collect::<Vec<_>>();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data
                    .push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
        }
        events
    }
}

/// How a watched job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The job reached a terminal status; its result lives at `url`
    Finished { url: String },
}

/// How one connection to the event stream ended.
enum StreamEnd {
    Finished(WatchOutcome),
    Closed,
    NotFound,
}

pub struct WatchClient {
    http: reqwest::Client,
    base_url: String,
    monitor: ConnectionMonitor,
}

impl WatchClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            monitor: ConnectionMonitor::default(),
        }
    }

    pub fn with_monitor(mut self, monitor: ConnectionMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    /// Follows `job_id` until it finishes, handing every render instruction
    /// to `render`.
    ///
    /// A stream that dies before the job finishes is reconnected with a
    /// fresh renderer, like reloading a page. Each reconnect that delivers an
    /// event starts over with a fresh monitor, so every later loss gets its
    /// own reload. Failing to get an event after a reload is an error.
    pub async fn watch(
        mut self,
        job_id: &JobId,
        mut render: impl FnMut(&RenderInstruction),
    ) -> anyhow::Result<WatchOutcome> {
        let mut renderer = ProgressRenderer::new(job_id.clone());

        loop {
            match self.follow(job_id, &mut renderer, &mut render).await {
                Ok(StreamEnd::Finished(outcome)) => return Ok(outcome),
                Ok(StreamEnd::NotFound) => anyhow::bail!("Job {job_id} not found"),
                Ok(StreamEnd::Closed) => {
                    tracing::debug!(job_id = %job_id, "Event stream closed early")
                }
                Err(e) => tracing::warn!(job_id = %job_id, error = ?e, "Event stream failed"),
            }

            let Some(wait) = self.monitor.on_error(Instant::now()) else {
                anyhow::bail!("Lost connection to the progress stream of job {job_id}");
            };
            tokio::time::sleep(wait).await;

            // a fresh response is needed either way, so the channel is closed
            let instructions = self.monitor.check(Instant::now(), ChannelState::Closed);
            if instructions.is_empty() {
                anyhow::bail!("Lost connection to the progress stream of job {job_id}");
            }

            for instruction in &instructions {
                render(instruction);
                if let RenderInstruction::Reload { delay } = instruction {
                    tokio::time::sleep(*delay).await;
                }
            }
            renderer = ProgressRenderer::new(job_id.clone());
        }
    }

    /// Streams events until the job finishes or the stream ends.
    async fn follow(
        &mut self,
        job_id: &JobId,
        renderer: &mut ProgressRenderer,
        render: &mut impl FnMut(&RenderInstruction),
    ) -> anyhow::Result<StreamEnd> {
        let url = format!("{}/api/jobs/{job_id}/events", self.base_url);
        let resp = self
            .http
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .with_context(|| format!("Failed to connect to {url}"))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(StreamEnd::NotFound);
        }
        let resp = resp.error_for_status()?;
        self.monitor.on_open();

        let mut decoder = SseDecoder::default();
        let mut body = resp.bytes_stream();
        let mut received = false;
        while let Some(chunk) = body.next().await {
            for payload in decoder.push(&chunk?) {
                if !received {
                    received = true;
                    self.monitor.reset();
                }
                for instruction in renderer.apply_json(&payload) {
                    render(&instruction);
                    if let RenderInstruction::Redirect { url, delay } = instruction {
                        self.monitor.on_terminal();
                        tokio::time::sleep(delay).await;
                        return Ok(StreamEnd::Finished(WatchOutcome::Finished {
                            url: format!("{}{url}", self.base_url),
                        }));
                    }
                }
            }
        }

        Ok(StreamEnd::Closed)
    }
}

/// Renders instructions as a single status line per change.
#[derive(Debug, Default)]
pub struct TerminalView {
    stages: [StageVisual; 3],
    progress: u8,
    detail: String,
}

impl TerminalView {
    /// Applies `instruction`, returning the line to print, if any.
    pub fn apply(&mut self, instruction: &RenderInstruction) -> Option<String> {
        match instruction {
            RenderInstruction::SetStage { stage, visual } => {
                if let Some(slot) = self.stages.get_mut(*stage) {
                    *slot = *visual;
                }
                None
            }
            RenderInstruction::SetProgress(progress) => {
                self.progress = *progress;
                Some(self.status_line())
            }
            RenderInstruction::SetDetail(detail) => {
                self.detail.clone_from(detail);
                Some(self.status_line())
            }
            RenderInstruction::ShowError(error) => Some(format!("!! {error}")),
            RenderInstruction::Redirect { url, .. } => Some(format!("-> {url}")),
            RenderInstruction::ShowReconnecting => Some("Connection lost, reconnecting...".into()),
            RenderInstruction::Reload { .. } => None,
        }
    }

    pub fn status_line(&self) -> String {
        let stages = STAGE_NAMES
            .iter()
            .zip(self.stages)
            .map(|(name, visual)| {
                let mark = match visual {
                    StageVisual::Pending => ' ',
                    StageVisual::Active => '>',
                    StageVisual::Done => 'x',
                    StageVisual::Failed => '!',
                };
                format!("[{mark}] {name}")
            })
            .join("  ");

        format!("{stages}  {:>3}%  {}", self.progress, self.detail)
    }
}
