//! Client-side synchronization over a polled message list.
//!
//! There is no push channel. Each client re-fetches the whole list on a timer
//! and reconciles it against what it last saw:
//!
//! - changed  = count differs OR trailing message id differs
//! - at newest message → replace, auto-scroll, clear the unseen badge
//! - scrolled up       → replace, add positive deltas to the unseen badge
//!
//! The local list is always replaced wholesale; there is no incremental merge.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use uuid::Uuid;

use crate::client::HandoffClient;
use crate::models::Message;

/// Anything that can produce the full, ordered message list of a session.
#[async_trait]
pub trait MessageFeed: Send + Sync {
    async fn fetch(&self, session_id: Uuid) -> Result<Vec<Message>>;
}

#[async_trait]
impl MessageFeed for HandoffClient {
    async fn fetch(&self, session_id: Uuid) -> Result<Vec<Message>> {
        Ok(self.list_messages(session_id).await?)
    }
}

/// Result of reconciling one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Unchanged,
    Replaced {
        /// Local length before the replace.
        previous_count: usize,
        /// `new length - previous length`; may be negative after a reset.
        delta: isize,
        /// Every previously held message is still at its old position.
        prefix_kept: bool,
        /// The reader was at the newest message, so the view follows it.
        auto_scroll: bool,
        /// Unseen badge after this fetch.
        unseen: usize,
    },
}

impl SyncOutcome {
    pub fn is_changed(&self) -> bool {
        !matches!(self, SyncOutcome::Unchanged)
    }
}

#[derive(Debug, Clone)]
pub struct SyncView {
    messages: Vec<Message>,
    last_known_count: usize,
    last_known_trailing_id: Option<Uuid>,
    unseen: usize,
    at_newest: bool,
}

impl Default for SyncView {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncView {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            last_known_count: 0,
            last_known_trailing_id: None,
            unseen: 0,
            at_newest: true,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn unseen(&self) -> usize {
        self.unseen
    }

    pub fn is_at_newest(&self) -> bool {
        self.at_newest
    }

    pub fn reconcile(&mut self, fetched: Vec<Message>) -> SyncOutcome {
        let previous_count = self.last_known_count;
        let delta = fetched.len() as isize - previous_count as isize;
        let trailing_id = fetched.last().map(|m| m.id);

        if delta == 0 && trailing_id == self.last_known_trailing_id {
            return SyncOutcome::Unchanged;
        }

        let prefix_kept = fetched.len() >= self.messages.len()
            && self
                .messages
                .iter()
                .zip(&fetched)
                .all(|(held, new)| held.id == new.id);

        // The first load of a session is history, not news.
        if !self.at_newest && previous_count > 0 && delta > 0 {
            self.unseen += delta as usize;
        }
        if self.at_newest {
            self.unseen = 0;
        }

        self.last_known_count = fetched.len();
        self.last_known_trailing_id = trailing_id;
        self.messages = fetched;

        SyncOutcome::Replaced {
            previous_count,
            delta,
            prefix_kept,
            auto_scroll: self.at_newest,
            unseen: self.unseen,
        }
    }

    /// Record whether the reader is looking at the newest message.
    /// Reaching it acknowledges everything unseen.
    pub fn set_at_newest(&mut self, at_newest: bool) {
        self.at_newest = at_newest;
        if at_newest {
            self.unseen = 0;
        }
    }

    /// Messages added by the replace that produced `outcome`, when it only
    /// appended. `None` means the list changed in some other way, including
    /// a late commit landing between messages already shown.
    pub fn appended_since(&self, outcome: &SyncOutcome) -> Option<&[Message]> {
        match outcome {
            SyncOutcome::Replaced {
                previous_count,
                delta,
                prefix_kept: true,
                ..
            } if *delta > 0 => self.messages.get(*previous_count..),
            _ => None,
        }
    }

    /// Forget everything; used when detaching from a session.
    pub fn reset(&mut self) {
        *self = SyncView::new();
    }
}

/// Drives a `SyncView` from a `MessageFeed` on a fixed interval.
pub struct Poller<F> {
    feed: F,
    session_id: Uuid,
    period: Duration,
    view: SyncView,
}

impl<F: MessageFeed> Poller<F> {
    pub fn new(feed: F, session_id: Uuid, period: Duration) -> Self {
        Self {
            feed,
            session_id,
            period,
            view: SyncView::new(),
        }
    }

    pub fn view(&self) -> &SyncView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut SyncView {
        &mut self.view
    }

    /// One poll tick. A failed fetch is logged and skipped; the next tick retries.
    pub async fn tick(&mut self) -> Option<SyncOutcome> {
        match self.feed.fetch(self.session_id).await {
            Ok(messages) => Some(self.view.reconcile(messages)),
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "Message poll failed");
                None
            }
        }
    }

    /// Poll until `shutdown` fires, calling `on_change` after every changed fetch.
    /// The first tick runs immediately. Returns the final view.
    pub async fn run<C>(mut self, mut on_change: C, mut shutdown: broadcast::Receiver<()>) -> SyncView
    where
        C: FnMut(&SyncView, &SyncOutcome) + Send,
    {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::debug!(
            session_id = %self.session_id,
            interval_ms = self.period.as_millis() as u64,
            "Poller started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(outcome) = self.tick().await {
                        if outcome.is_changed() {
                            on_change(&self.view, &outcome);
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!(session_id = %self.session_id, "Poller detached");
                    break;
                }
            }
        }

        self.view
    }
}
