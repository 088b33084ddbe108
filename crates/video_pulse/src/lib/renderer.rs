//! # Client Progress Renderer
//!
//! Pure state machine behind a progress view. It is fed the messages of a
//! job's event stream and answers with the render instructions needed to
//! bring the view up to date: stage indicators, progress, detail text, and
//! the navigation to the result page once the job is over.
//!
//! [`ConnectionMonitor`] covers the transport side. A dropped stream is
//! given a grace period to recover before the view is reloaded, once.

use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::job::{self, JobId};

/// Stages shown to the user, in stage index order.
pub const STAGE_NAMES: [&str; 3] = ["Download", "Transcribe", "Summarize"];

/// Visual class of a single stage indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageVisual {
    #[default]
    Pending,
    Active,
    Done,
    /// The job failed while this stage was running
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderInstruction {
    SetStage { stage: usize, visual: StageVisual },
    SetProgress(u8),
    SetDetail(String),
    ShowError(String),
    /// Navigate to `url` once `delay` has passed
    Redirect { url: String, delay: Duration },
    ShowReconnecting,
    /// Reload the whole view once `delay` has passed
    Reload { delay: Duration },
}

/// Loosely typed push message; unknown statuses must not fail parsing.
#[derive(Debug, Deserialize)]
struct RawMessage {
    status: String,
    #[serde(default)]
    progress: i64,
    #[serde(default)]
    stage_detail: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressRenderer {
    job_id: JobId,
    stages: [StageVisual; 3],
    progress: Option<u8>,
    detail: String,
    /// Last visible stage reached, if any
    active_stage: Option<usize>,
    terminal: bool,
    redirect_delay: Duration,
}

impl ProgressRenderer {
    pub const REDIRECT_DELAY: Duration = Duration::from_secs(1);

    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            stages: [StageVisual::Pending; 3],
            progress: None,
            detail: String::new(),
            active_stage: None,
            terminal: false,
            redirect_delay: Self::REDIRECT_DELAY,
        }
    }

    pub fn with_redirect_delay(mut self, delay: Duration) -> Self {
        self.redirect_delay = delay;
        self
    }

    pub fn stages(&self) -> [StageVisual; 3] {
        self.stages
    }

    pub fn progress(&self) -> Option<u8> {
        self.progress
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn result_url(&self) -> String {
        format!("/result/{}", self.job_id)
    }

    /// Parses one event payload and applies it. Malformed payloads render
    /// nothing.
    pub fn apply_json(&mut self, payload: &str) -> Vec<RenderInstruction> {
        match serde_json::from_str::<RawMessage>(payload) {
            Ok(msg) => {
                let progress = msg.progress.clamp(0, 100) as u8;
                let detail = msg.stage_detail.unwrap_or_default();
                self.apply(&msg.status, progress, &detail, msg.error.as_deref())
            }
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed progress message");
                Vec::new()
            }
        }
    }

    /// Applies one status update.
    ///
    /// Returns only the instructions that change the view. Unknown statuses
    /// and anything arriving after a terminal status render nothing.
    pub fn apply(
        &mut self,
        status: &str,
        progress: u8,
        detail: &str,
        error: Option<&str>,
    ) -> Vec<RenderInstruction> {
        if self.terminal {
            return Vec::new();
        }
        let Some(index) = job::stage_index(status) else {
            return Vec::new();
        };

        let mut instructions = Vec::new();

        let stages = self.stage_visuals(index);
        for (stage, (old, new)) in self.stages.iter().zip(stages).enumerate() {
            if *old != new {
                instructions.push(RenderInstruction::SetStage { stage, visual: new });
            }
        }
        self.stages = stages;
        if (0..3).contains(&index) {
            self.active_stage = Some(index as usize);
        }

        let progress = if index == 3 { 100 } else { progress.min(100) };
        if self.progress != Some(progress) {
            self.progress = Some(progress);
            instructions.push(RenderInstruction::SetProgress(progress));
        }

        if self.detail != detail {
            self.detail = detail.to_string();
            instructions.push(RenderInstruction::SetDetail(self.detail.clone()));
        }

        if index == 3 || index == -2 {
            self.terminal = true;
            if index == -2 {
                let cause = error.unwrap_or(detail);
                instructions.push(RenderInstruction::ShowError(cause.to_string()));
            }
            instructions.push(RenderInstruction::Redirect {
                url: self.result_url(),
                delay: self.redirect_delay,
            });
        }

        instructions
    }

    fn stage_visuals(&self, index: i8) -> [StageVisual; 3] {
        let mut stages = [StageVisual::Pending; 3];
        match index {
            3 => stages = [StageVisual::Done; 3],
            -2 => {
                // the stage that was running is marked as interrupted
                if let Some(active) = self.active_stage {
                    for (i, stage) in stages.iter_mut().enumerate() {
                        *stage = match i.cmp(&active) {
                            std::cmp::Ordering::Less => StageVisual::Done,
                            std::cmp::Ordering::Equal => StageVisual::Failed,
                            std::cmp::Ordering::Greater => StageVisual::Pending,
                        };
                    }
                }
            }
            0..=2 => {
                let current = index as usize;
                for (i, stage) in stages.iter_mut().enumerate() {
                    *stage = match i.cmp(&current) {
                        std::cmp::Ordering::Less => StageVisual::Done,
                        std::cmp::Ordering::Equal => StageVisual::Active,
                        std::cmp::Ordering::Greater => StageVisual::Pending,
                    };
                }
            }
            _ => {}
        }
        stages
    }
}

/// Transport state of the event stream as observed by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

/// Decides when a broken event stream warrants reloading the view.
///
/// An error starts a grace period. If the channel is still closed when it
/// ends, a reconnect message and a single reload are issued. Errors that
/// recover within the grace period are forgotten. A reloaded view starts
/// over with [`ConnectionMonitor::reset`].
#[derive(Debug, Clone)]
pub struct ConnectionMonitor {
    grace: Duration,
    reload_delay: Duration,
    error_at: Option<Instant>,
    reloaded: bool,
    finished: bool,
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new(Self::GRACE_PERIOD, Self::RELOAD_DELAY)
    }
}

impl ConnectionMonitor {
    pub const GRACE_PERIOD: Duration = Duration::from_secs(3);
    pub const RELOAD_DELAY: Duration = Duration::from_secs(1);

    pub fn new(grace: Duration, reload_delay: Duration) -> Self {
        Self {
            grace,
            reload_delay,
            error_at: None,
            reloaded: false,
            finished: false,
        }
    }

    /// Forgets every earlier loss, as a freshly loaded view would.
    pub fn reset(&mut self) {
        *self = Self::new(self.grace, self.reload_delay);
    }

    pub fn has_reloaded(&self) -> bool {
        self.reloaded
    }

    pub fn on_open(&mut self) {
        self.error_at = None;
    }

    /// Records a transport error. Returns how long to wait before calling
    /// [`ConnectionMonitor::check`], or `None` when nothing will be done.
    pub fn on_error(&mut self, now: Instant) -> Option<Duration> {
        if self.finished || self.reloaded {
            return None;
        }
        let since = *self.error_at.get_or_insert(now);
        Some(self.grace.saturating_sub(now.duration_since(since)))
    }

    /// The job reached a terminal status; the stream closing is expected.
    pub fn on_terminal(&mut self) {
        self.finished = true;
        self.error_at = None;
    }

    pub fn check(&mut self, now: Instant, channel: ChannelState) -> Vec<RenderInstruction> {
        let Some(error_at) = self.error_at else {
            return Vec::new();
        };
        if now.duration_since(error_at) < self.grace {
            return Vec::new();
        }
        self.error_at = None;

        if channel != ChannelState::Closed || self.finished || self.reloaded {
            return Vec::new();
        }

        self.reloaded = true;
        vec![
            RenderInstruction::ShowReconnecting,
            RenderInstruction::Reload {
                delay: self.reload_delay,
            },
        ]
    }
}
