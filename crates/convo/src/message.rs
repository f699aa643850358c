use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use md_stream::{Commit, Document, StreamParser};
use uuid::Uuid;

use crate::source::{NormalizedSource, SourceKind};

/// Opaque message identity, stable for the message's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(String);

impl MessageId {
    pub fn new() -> Self {
        MessageId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        MessageId(s.to_owned())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From the assistant/adapter
    In,
    /// From the user
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageStatus {
    /// Source attached, nothing received yet
    Loading,
    Streaming,
    Loaded,
    Error,
}

impl MessageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageStatus::Loaded | MessageStatus::Error)
    }

    pub fn name(&self) -> &'static str {
        match self {
            MessageStatus::Loading => "loading",
            MessageStatus::Streaming => "streaming",
            MessageStatus::Loaded => "loaded",
            MessageStatus::Error => "error",
        }
    }

    fn can_become(self, next: MessageStatus) -> bool {
        use MessageStatus::*;
        matches!(
            (self, next),
            (Loading, Streaming) | (Loading | Streaming, Loaded | Error)
        )
    }
}

/// Called with every status transition of a message.
pub type StatusCallback = Box<dyn FnMut(&MessageId, MessageStatus)>;

/// Deadline after which a streaming message gives up its auto-scroll lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyTimer {
    deadline: Instant,
}

impl SafetyTimer {
    pub fn arm(now: Instant, timeout: Duration) -> Self {
        SafetyTimer {
            deadline: now + timeout,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

/// Registration for resize-driven auto-scroll. Held while the message
/// streams, detached when dropped.
#[derive(Debug)]
pub struct ResizeListener {
    id: MessageId,
}

impl ResizeListener {
    fn attach(id: &MessageId) -> Self {
        tracing::trace!("resize listener attached to {id}");
        ResizeListener { id: id.clone() }
    }
}

impl Drop for ResizeListener {
    fn drop(&mut self) {
        tracing::trace!("resize listener detached from {}", self.id);
    }
}

/// What one source signal did to a message.
#[derive(Debug, Default)]
pub(crate) struct Step {
    pub commits: Vec<Commit>,
    pub status: Option<MessageStatus>,
}

/// One conversation message and the state machine that renders it.
pub struct Message {
    id: MessageId,
    direction: Direction,
    created_at: DateTime<Utc>,
    status: MessageStatus,
    source_kind: SourceKind,

    /// Everything received so far
    raw: String,

    /// Dropped on error; no more commits after that
    parser: Option<StreamParser>,
    document: Document,

    streaming_timeout: Duration,
    timer: Option<SafetyTimer>,
    resize_listener: Option<ResizeListener>,
    on_status: Option<StatusCallback>,

    /// Taken out while being pumped
    pub(crate) source: Option<NormalizedSource>,
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("status", &self.status)
            .field("source_kind", &self.source_kind)
            .field("raw", &self.raw)
            .field("timer", &self.timer)
            .finish_non_exhaustive()
    }
}

impl Message {
    pub(crate) fn new(
        id: MessageId,
        direction: Direction,
        created_at: DateTime<Utc>,
        source: NormalizedSource,
        streaming_timeout: Duration,
        on_status: Option<StatusCallback>,
    ) -> Self {
        Message {
            id,
            direction,
            created_at,
            status: MessageStatus::Loading,
            source_kind: source.kind(),
            raw: String::new(),
            parser: Some(StreamParser::new()),
            document: Document::new(),
            streaming_timeout,
            timer: None,
            resize_listener: None,
            on_status,
            source: Some(source),
        }
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> MessageStatus {
        self.status
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    /// Raw markdown received so far.
    pub fn text(&self) -> &str {
        &self.raw
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn safety_timer(&self) -> Option<&SafetyTimer> {
        self.timer.as_ref()
    }

    pub fn has_resize_listener(&self) -> bool {
        self.resize_listener.is_some()
    }

    pub(crate) fn push_fragment(&mut self, fragment: &str, now: Instant) -> Step {
        let mut step = Step::default();
        if fragment.is_empty() || self.status.is_terminal() {
            return step;
        }

        if self.status == MessageStatus::Loading {
            self.timer = Some(SafetyTimer::arm(now, self.streaming_timeout));
            self.resize_listener = Some(ResizeListener::attach(&self.id));
            step.status = self.transition(MessageStatus::Streaming);
        }

        self.raw.push_str(fragment);
        if let Some(parser) = &mut self.parser {
            step.commits.extend(parser.feed(fragment));
        }
        self.document.extend(step.commits.iter().cloned());
        step
    }

    pub(crate) fn complete(&mut self) -> Step {
        let mut step = Step::default();
        if self.status.is_terminal() {
            return step;
        }

        if let Some(parser) = &mut self.parser {
            step.commits.extend(parser.finalize());
        }
        self.document.extend(step.commits.iter().cloned());
        self.release();
        step.status = self.transition(MessageStatus::Loaded);
        step
    }

    pub(crate) fn fail(&mut self) -> Step {
        let mut step = Step::default();
        if self.status.is_terminal() {
            return step;
        }

        self.parser = None;
        self.release();
        step.status = self.transition(MessageStatus::Error);
        step
    }

    pub(crate) fn timer_expired(&self, now: Instant) -> bool {
        self.timer.is_some_and(|timer| timer.expired(now))
    }

    /// Stop holding the auto-scroll lock. The message keeps its status and
    /// still accepts fragments.
    pub(crate) fn release(&mut self) {
        self.timer = None;
        self.resize_listener = None;
    }

    fn transition(&mut self, next: MessageStatus) -> Option<MessageStatus> {
        if !self.status.can_become(next) {
            tracing::warn!(
                "ignoring {} -> {} for message {}",
                self.status.name(),
                next.name(),
                self.id
            );
            return None;
        }

        tracing::debug!(
            "message {} {} -> {}",
            self.id,
            self.status.name(),
            next.name()
        );
        self.status = next;
        if let Some(on_status) = &mut self.on_status {
            on_status(&self.id, next);
        }
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::normalize;
    use md_stream::ElementKind;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn message(on_status: Option<StatusCallback>) -> Message {
        Message::new(
            MessageId::new(),
            Direction::In,
            Utc::now(),
            normalize("".into()),
            Duration::from_secs(120),
            on_status,
        )
    }

    fn recorded() -> (Rc<RefCell<Vec<MessageStatus>>>, StatusCallback) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let callback: StatusCallback =
            Box::new(move |_: &MessageId, status: MessageStatus| sink.borrow_mut().push(status));
        (seen, callback)
    }

    #[test]
    fn empty_fragment_is_not_a_transition() {
        let mut msg = message(None);
        let step = msg.push_fragment("", Instant::now());

        assert!(step.status.is_none());
        assert!(step.commits.is_empty());
        assert_eq!(msg.status(), MessageStatus::Loading);
        assert!(msg.safety_timer().is_none());
    }

    #[test]
    fn first_fragment_arms_timer_and_listener() {
        let now = Instant::now();
        let mut msg = message(None);
        let step = msg.push_fragment("Hi", now);

        assert_eq!(step.status, Some(MessageStatus::Streaming));
        assert_eq!(
            msg.safety_timer().map(SafetyTimer::deadline),
            Some(now + Duration::from_secs(120))
        );
        assert!(msg.has_resize_listener());

        let step = msg.push_fragment(" there", now);
        assert!(step.status.is_none());
        assert_eq!(msg.text(), "Hi there");
    }

    #[test]
    fn complete_finalizes_and_releases() {
        let mut msg = message(None);
        msg.push_fragment("*open", Instant::now());
        let step = msg.complete();

        assert_eq!(step.status, Some(MessageStatus::Loaded));
        assert_eq!(step.commits.last(), Some(&Commit::Close));
        assert!(msg.safety_timer().is_none());
        assert!(!msg.has_resize_listener());
        assert_eq!(msg.document().text(), "*open");
    }

    #[test]
    fn error_stops_rendering() {
        let mut msg = message(None);
        msg.push_fragment("partial", Instant::now());
        let step = msg.fail();
        assert_eq!(step.status, Some(MessageStatus::Error));

        let late = msg.push_fragment("more", Instant::now());
        assert!(late.commits.is_empty());
        assert!(msg.complete().status.is_none());
        assert_eq!(msg.status(), MessageStatus::Error);
    }

    #[test]
    fn callback_sees_each_transition_once() {
        let (seen, callback) = recorded();
        let mut msg = message(Some(callback));

        msg.push_fragment("a", Instant::now());
        msg.push_fragment("b", Instant::now());
        msg.complete();
        msg.complete();
        msg.fail();

        assert_eq!(
            *seen.borrow(),
            vec![MessageStatus::Streaming, MessageStatus::Loaded]
        );
    }

    #[test]
    fn loading_straight_to_loaded() {
        let (seen, callback) = recorded();
        let mut msg = message(Some(callback));
        let step = msg.complete();

        assert_eq!(step.status, Some(MessageStatus::Loaded));
        assert_eq!(step.commits, Vec::<Commit>::new());
        assert_eq!(*seen.borrow(), vec![MessageStatus::Loaded]);
    }

    #[test]
    fn document_tracks_commits() {
        let mut msg = message(None);
        msg.push_fragment("# Ti", Instant::now());
        msg.push_fragment("tle\n", Instant::now());
        msg.complete();

        let md_stream::Node::Element { kind, .. } = &msg.document().nodes()[0] else {
            panic!("expected an element");
        };
        assert_eq!(kind, &ElementKind::Heading(1));
    }

    #[test]
    fn status_graph() {
        use MessageStatus::*;
        assert!(Loading.can_become(Streaming));
        assert!(Loading.can_become(Error));
        assert!(Streaming.can_become(Loaded));
        assert!(!Streaming.can_become(Loading));
        assert!(!Loaded.can_become(Error));
        assert!(!Error.can_become(Loaded));
    }
}
