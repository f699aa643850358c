use std::collections::{vec_deque, HashSet, VecDeque};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use md_stream::Commit;

use crate::adapter::{ConversationItem, Role};
use crate::config::{ChatConfig, HistoryPayloadSize};
use crate::message::{Direction, Message, MessageId, MessageStatus, StatusCallback, Step};
use crate::source::{normalize, Source, SourceKind, SourceObserver};
use crate::{Error, Result, SourceError};

/// Called once for every producer error, after it has been logged.
pub type ErrorCallback = Box<dyn FnMut(&MessageId, &SourceError)>;

/// Something the rendering layer has to act on, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// Apply to the message's container
    Commit { id: MessageId, commit: Commit },
    Status { id: MessageId, status: MessageStatus },
    ScrollTo(MessageId),
    Removed(MessageId),
}

/// Viewport geometry reported with a user scroll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub offset: f32,
    pub viewport_height: f32,
    pub content_height: f32,
}

impl ScrollMetrics {
    pub fn distance_from_bottom(&self) -> f32 {
        (self.content_height - self.offset - self.viewport_height).max(0.0)
    }

    pub fn is_pinned(&self, tolerance: f32) -> bool {
        self.distance_from_bottom() <= tolerance
    }
}

/// State shared by every message of a conversation.
struct Tracker {
    streaming: HashSet<MessageId>,
    follow_stream: bool,
    updates: VecDeque<Update>,
    on_error: Option<ErrorCallback>,
}

impl Tracker {
    fn step(&mut self, id: &MessageId, step: Step) {
        if !step.commits.is_empty() {
            tracing::trace!("{} commits for {id}", step.commits.len());
        }
        self.updates
            .extend(step.commits.into_iter().map(|commit| Update::Commit {
                id: id.clone(),
                commit,
            }));

        let Some(status) = step.status else {
            return;
        };

        if status == MessageStatus::Streaming {
            self.streaming.insert(id.clone());
        } else {
            self.streaming.remove(id);
        }
        self.updates.push_back(Update::Status {
            id: id.clone(),
            status,
        });
    }
}

/// Routes one message's source signals into its state machine.
struct Delivery<'a> {
    message: &'a mut Message,
    tracker: &'a mut Tracker,
    now: Instant,
}

impl SourceObserver for Delivery<'_> {
    fn on_fragment(&mut self, text: &str) {
        let step = self.message.push_fragment(text, self.now);
        self.tracker.step(self.message.id(), step);
    }

    fn on_complete(&mut self) {
        let step = self.message.complete();
        let loaded = step.status == Some(MessageStatus::Loaded);
        self.tracker.step(self.message.id(), step);

        if loaded && self.message.source_kind() == SourceKind::Promise {
            self.tracker
                .updates
                .push_back(Update::ScrollTo(self.message.id().clone()));
        }
    }

    fn on_error(&mut self, err: SourceError) {
        let step = self.message.fail();
        if step.status.is_none() {
            return;
        }

        let id = self.message.id();
        tracing::error!("message {id} failed: {err}");
        self.tracker.step(id, step);
        if let Some(on_error) = &mut self.tracker.on_error {
            on_error(id, &err);
        }
    }
}

/// Ordered list of messages, their live sources and the auto-scroll
/// policy shared between them.
///
/// Everything happens on the caller's thread: sources are drained in
/// [`Conversation::poll`], and the results are read back with
/// [`Conversation::updates`].
pub struct Conversation {
    messages: IndexMap<MessageId, Message>,
    tracker: Tracker,
    streaming_timeout: Duration,
    scroll_bottom_tolerance: f32,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(&ChatConfig::default())
    }
}

impl Conversation {
    pub fn new(config: &ChatConfig) -> Self {
        Conversation {
            messages: IndexMap::new(),
            tracker: Tracker {
                streaming: HashSet::new(),
                follow_stream: config.auto_scroll,
                updates: VecDeque::new(),
                on_error: None,
            },
            streaming_timeout: config.streaming_timeout(),
            scroll_bottom_tolerance: config.scroll_bottom_tolerance,
        }
    }

    /// Register the observer that receives producer errors.
    pub fn on_error(&mut self, callback: impl FnMut(&MessageId, &SourceError) + 'static) {
        self.tracker.on_error = Some(Box::new(callback));
    }

    /// Add a message fed by `source`. Text sources are delivered right
    /// away, everything else on the next [`Conversation::poll`].
    pub fn add_message(
        &mut self,
        direction: Direction,
        source: impl Into<Source>,
        created_at: DateTime<Utc>,
        on_status: Option<StatusCallback>,
    ) -> MessageId {
        let id = MessageId::new();
        let source = normalize(source.into());
        let kind = source.kind();
        let message = Message::new(
            id.clone(),
            direction,
            created_at,
            source,
            self.streaming_timeout,
            on_status,
        );

        tracing::debug!("adding {direction:?} message {id} ({kind:?} source)");
        self.messages.insert(id.clone(), message);
        self.tracker.updates.push_back(Update::ScrollTo(id.clone()));

        if kind == SourceKind::Text {
            self.pump(&id, Instant::now());
        }

        id
    }

    /// Remove a message. Its source is dropped with it, so anything the
    /// producer sends afterwards goes nowhere.
    pub fn remove_message(&mut self, id: &MessageId) -> Result<Message> {
        let Some(mut message) = self.messages.shift_remove(id) else {
            return Err(Error::UnknownMessage(id.clone()));
        };

        message.source = None;
        message.release();
        self.tracker.streaming.remove(id);
        self.tracker.updates.push_back(Update::Removed(id.clone()));
        tracing::debug!("removed message {id}");
        Ok(message)
    }

    pub fn get_message(&self, id: &MessageId) -> Option<&Message> {
        self.messages.get(id)
    }

    /// Messages in the order they were added.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.values()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn streaming_ids(&self) -> impl Iterator<Item = &MessageId> {
        self.tracker.streaming.iter()
    }

    pub fn is_streaming(&self, id: &MessageId) -> bool {
        self.tracker.streaming.contains(id)
    }

    pub fn follow_stream(&self) -> bool {
        self.tracker.follow_stream
    }

    /// Drain pending updates for the rendering layer.
    pub fn updates(&mut self) -> vec_deque::Drain<'_, Update> {
        self.tracker.updates.drain(..)
    }

    /// Deliver whatever every live source has produced, then fire expired
    /// safety timers.
    pub fn poll(&mut self, now: Instant) {
        let ids: Vec<MessageId> = self
            .messages
            .values()
            .filter(|m| m.source.is_some() || m.safety_timer().is_some())
            .map(|m| m.id().clone())
            .collect();

        for id in &ids {
            self.pump(id, now);
            self.expire(id, now);
        }
    }

    /// A message's rendered size changed. Returns true when it caused a
    /// scroll.
    pub fn message_resized(&mut self, id: &MessageId) -> bool {
        let listening = self
            .messages
            .get(id)
            .is_some_and(Message::has_resize_listener);

        let scroll = listening
            && self.tracker.follow_stream
            && self.tracker.streaming.len() == 1
            && self.tracker.streaming.contains(id);

        if scroll {
            tracing::trace!("following {id}");
            self.tracker.updates.push_back(Update::ScrollTo(id.clone()));
        }
        scroll
    }

    /// The user scrolled; `pinned` says whether the viewport ended up at the
    /// bottom.
    pub fn user_scrolled(&mut self, pinned: bool) {
        if self.tracker.follow_stream != pinned {
            tracing::debug!("follow stream: {pinned}");
        }
        self.tracker.follow_stream = pinned;
    }

    pub fn user_scrolled_metrics(&mut self, metrics: ScrollMetrics) {
        self.user_scrolled(metrics.is_pinned(self.scroll_bottom_tolerance));
    }

    /// Loaded messages as prompt history, oldest first, bounded by `size`.
    pub fn history(&self, size: HistoryPayloadSize) -> Option<Vec<ConversationItem>> {
        let limit = match size {
            HistoryPayloadSize::None | HistoryPayloadSize::Count(0) => return None,
            HistoryPayloadSize::Count(n) => n,
            HistoryPayloadSize::All => usize::MAX,
        };

        let mut items: Vec<ConversationItem> = self
            .messages
            .values()
            .rev()
            .filter(|m| m.status() == MessageStatus::Loaded)
            .take(limit)
            .map(|m| ConversationItem {
                role: match m.direction() {
                    Direction::Out => Role::User,
                    Direction::In => Role::Assistant,
                },
                message: m.text().to_owned(),
            })
            .collect();
        items.reverse();
        Some(items)
    }

    fn pump(&mut self, id: &MessageId, now: Instant) {
        let Some(message) = self.messages.get_mut(id) else {
            return;
        };

        // Take the source out to avoid borrow conflicts
        let Some(mut source) = message.source.take() else {
            return;
        };

        let done = source.pump(&mut Delivery {
            message: &mut *message,
            tracker: &mut self.tracker,
            now,
        });

        if !done {
            message.source = Some(source);
        }
    }

    fn expire(&mut self, id: &MessageId, now: Instant) {
        let Some(message) = self.messages.get_mut(id) else {
            return;
        };

        if message.timer_expired(now) {
            tracing::debug!("message {id} streamed too long, releasing auto-scroll");
            message.release();
            self.tracker.streaming.remove(id);
        }
    }
}
