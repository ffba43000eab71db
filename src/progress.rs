use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;

/// Minimum gap between persisted writes during continuous scrolling.
pub const SAVE_INTERVAL: Duration = Duration::from_secs(5);

/// One reading-progress record per (user, book); the user is implicit in
/// the store's credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingProgress {
    pub scroll_percent: f64,
    pub last_updated: DateTime<Utc>,
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn fetch(&self, book_id: &str) -> anyhow::Result<Option<ReadingProgress>>;
    async fn save(&self, book_id: &str, scroll_percent: f64) -> anyhow::Result<()>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveProgressBody {
    scroll_percent: f64,
}

/// Progress store backed by the external progress API
/// (`GET`/`PUT /api/progress/:bookId`), scoped to the authenticated
/// principal carried in the bearer token.
#[derive(Debug, Clone)]
pub struct HttpProgressStore {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpProgressStore {
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            auth_token,
        }
    }

    fn progress_url(&self, book_id: &str) -> String {
        format!("{}/api/progress/{book_id}", self.base_url)
    }
}

#[async_trait]
impl ProgressStore for HttpProgressStore {
    async fn fetch(&self, book_id: &str) -> anyhow::Result<Option<ReadingProgress>> {
        let mut request = self.client.get(self.progress_url(book_id));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .context("send progress fetch request")?
            .error_for_status()
            .context("progress fetch rejected")?;
        response.json().await.context("parse progress record")
    }

    async fn save(&self, book_id: &str, scroll_percent: f64) -> anyhow::Result<()> {
        let mut request = self
            .client
            .put(self.progress_url(book_id))
            .json(&SaveProgressBody { scroll_percent });
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        request
            .send()
            .await
            .context("send progress save request")?
            .error_for_status()
            .context("progress save rejected")?;
        Ok(())
    }
}

/// Scroll geometry of the rendered container at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl Viewport {
    fn max_scroll(&self) -> f64 {
        self.scroll_height - self.client_height
    }

    /// Position as a fraction of the scrollable height. A zero or
    /// negative denominator is replaced by 1.
    pub fn scroll_percent(&self) -> f64 {
        let max_scroll = self.max_scroll();
        let denominator = if max_scroll <= 0.0 { 1.0 } else { max_scroll };
        (self.scroll_top / denominator).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    Restoring,
    Tracking,
}

/// Tracks one reading session: restores the saved position once, then
/// throttles persistence of scroll samples to one write per
/// [`SAVE_INTERVAL`], with a single best-effort flush at teardown.
///
/// Save failures are logged and dropped — losing one progress update is
/// acceptable degradation, not a usage-blocking error.
pub struct PositionTracker {
    store: Arc<dyn ProgressStore>,
    clock: Arc<dyn Clock>,
    book_id: String,
    save_interval: Duration,
    state: TrackerState,
    last_sent: Option<Instant>,
    queued: Option<f64>,
}

impl PositionTracker {
    pub fn new(store: Arc<dyn ProgressStore>, book_id: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            book_id: book_id.into(),
            save_interval: SAVE_INTERVAL,
            state: TrackerState::Idle,
            last_sent: None,
            queued: None,
        }
    }

    pub fn with_save_interval(mut self, save_interval: Duration) -> Self {
        self.save_interval = save_interval;
        self
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Fetches the stored progress and returns the absolute scroll offset
    /// to jump to, or `None` when nothing was saved, the fetch failed, or
    /// the content is not scrollable. Runs at most once per session and
    /// always leaves the tracker in `Tracking`.
    pub async fn restore(&mut self, viewport: &Viewport) -> Option<f64> {
        if self.state != TrackerState::Idle {
            return None;
        }
        self.state = TrackerState::Restoring;

        let stored = match self.store.fetch(&self.book_id).await {
            Ok(stored) => stored,
            Err(err) => {
                tracing::debug!(book_id = %self.book_id, ?err, "progress fetch failed; starting from the top");
                None
            }
        };

        self.state = TrackerState::Tracking;
        self.last_sent = Some(self.clock.now());

        let progress = stored?;
        let max_scroll = viewport.max_scroll();
        if max_scroll <= 0.0 {
            return None;
        }
        Some(progress.scroll_percent * max_scroll)
    }

    /// O(1) per scroll event: either sends immediately (watermark gap
    /// elapsed) or overwrites the queued sample.
    pub async fn on_scroll(&mut self, viewport: &Viewport) {
        if self.state != TrackerState::Tracking {
            return;
        }
        let percent = viewport.scroll_percent();
        let now = self.clock.now();
        let due = match self.last_sent {
            Some(sent) => now.duration_since(sent) >= self.save_interval,
            None => true,
        };
        if due {
            self.last_sent = Some(now);
            self.queued = None;
            self.send(percent).await;
        } else {
            self.queued = Some(percent);
        }
    }

    /// Session teardown: flush the queued-but-unsent sample, if any, in
    /// one final send.
    pub async fn finish(&mut self) {
        if let Some(percent) = self.queued.take() {
            self.send(percent).await;
        }
        self.state = TrackerState::Idle;
    }

    async fn send(&self, percent: f64) {
        if let Err(err) = self.store.save(&self.book_id, percent).await {
            tracing::warn!(book_id = %self.book_id, ?err, "dropping reading-progress write");
        }
    }
}
