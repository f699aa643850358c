//! Normalizes the three producer shapes (immediate text, a pending
//! result, a push stream of chunks) into one fragment stream with a single
//! terminal signal.

use std::sync::mpsc;

use tokio::sync::oneshot;

use crate::SourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Text,
    Promise,
    Stream,
}

/// Where a message's text comes from.
#[derive(Debug)]
pub enum Source {
    Text(String),
    Promise(PendingText),
    Stream(TextStream),
}

impl Source {
    pub fn kind(&self) -> SourceKind {
        match self {
            Source::Text(_) => SourceKind::Text,
            Source::Promise(_) => SourceKind::Promise,
            Source::Stream(_) => SourceKind::Stream,
        }
    }
}

impl From<String> for Source {
    fn from(text: String) -> Self {
        Source::Text(text)
    }
}

impl From<&str> for Source {
    fn from(text: &str) -> Self {
        Source::Text(text.to_owned())
    }
}

impl From<PendingText> for Source {
    fn from(pending: PendingText) -> Self {
        Source::Promise(pending)
    }
}

impl From<TextStream> for Source {
    fn from(stream: TextStream) -> Self {
        Source::Stream(stream)
    }
}

/// A reply that arrives all at once, some time later.
#[derive(Debug)]
pub struct PendingText {
    rx: oneshot::Receiver<Result<String, SourceError>>,
}

/// Producer half of a [`PendingText`].
#[derive(Debug)]
pub struct TextResolver {
    tx: oneshot::Sender<Result<String, SourceError>>,
}

pub fn pending_text() -> (TextResolver, PendingText) {
    let (tx, rx) = oneshot::channel();
    (TextResolver { tx }, PendingText { rx })
}

impl TextResolver {
    pub fn resolve(self, text: impl Into<String>) {
        self.settle(Ok(text.into()));
    }

    pub fn reject(self, err: impl Into<SourceError>) {
        self.settle(Err(err.into()));
    }

    fn settle(self, result: Result<String, SourceError>) {
        if self.tx.send(result).is_err() {
            tracing::trace!("pending text settled after its message went away");
        }
    }
}

#[derive(Debug)]
enum StreamEvent {
    Next(String),
    Complete,
    Error(SourceError),
}

/// Producer half of a [`TextStream`]. `complete` and `error` consume the
/// observer, so at most one terminal signal can be sent.
#[derive(Debug)]
pub struct StreamObserver {
    tx: mpsc::Sender<StreamEvent>,
}

/// A reply that arrives chunk by chunk.
#[derive(Debug)]
pub struct TextStream {
    rx: mpsc::Receiver<StreamEvent>,
}

pub fn text_stream() -> (StreamObserver, TextStream) {
    let (tx, rx) = mpsc::channel();
    (StreamObserver { tx }, TextStream { rx })
}

impl StreamObserver {
    pub fn next(&self, chunk: impl Into<String>) {
        self.send(StreamEvent::Next(chunk.into()));
    }

    pub fn complete(self) {
        self.send(StreamEvent::Complete);
    }

    pub fn error(self, err: impl Into<SourceError>) {
        self.send(StreamEvent::Error(err.into()));
    }

    fn send(&self, event: StreamEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("stream consumer went away, dropping event");
        }
    }
}

/// Receives normalized source signals.
pub trait SourceObserver {
    fn on_fragment(&mut self, text: &str);
    fn on_complete(&mut self);
    fn on_error(&mut self, err: SourceError);
}

#[derive(Debug)]
enum State {
    Text(String),
    Promise(PendingText),
    Stream(TextStream),
    Done,
}

/// A source behind the uniform fragment/complete/error interface.
///
/// Once `on_complete` or `on_error` has been delivered the source is done
/// and delivers nothing else.
#[derive(Debug)]
pub struct NormalizedSource {
    kind: SourceKind,
    state: State,
}

pub fn normalize(source: Source) -> NormalizedSource {
    let kind = source.kind();
    let state = match source {
        Source::Text(text) => State::Text(text),
        Source::Promise(pending) => State::Promise(pending),
        Source::Stream(stream) => State::Stream(stream),
    };
    NormalizedSource { kind, state }
}

impl NormalizedSource {
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    /// Deliver everything the producer has sent so far, without blocking.
    /// Returns true once the source is done.
    pub fn pump(&mut self, observer: &mut impl SourceObserver) -> bool {
        match std::mem::replace(&mut self.state, State::Done) {
            State::Done => {}

            State::Text(text) => {
                observer.on_fragment(&text);
                observer.on_complete();
            }

            State::Promise(mut pending) => match pending.rx.try_recv() {
                Ok(Ok(text)) => {
                    observer.on_fragment(&text);
                    observer.on_complete();
                }
                Ok(Err(err)) => observer.on_error(err),
                Err(oneshot::error::TryRecvError::Empty) => {
                    self.state = State::Promise(pending);
                }
                Err(oneshot::error::TryRecvError::Closed) => {
                    observer.on_error(SourceError::Dropped);
                }
            },

            State::Stream(stream) => loop {
                match stream.rx.try_recv() {
                    Ok(StreamEvent::Next(chunk)) => observer.on_fragment(&chunk),
                    Ok(StreamEvent::Complete) => {
                        observer.on_complete();
                        break;
                    }
                    Ok(StreamEvent::Error(err)) => {
                        observer.on_error(err);
                        break;
                    }
                    Err(mpsc::TryRecvError::Empty) => {
                        self.state = State::Stream(stream);
                        break;
                    }
                    Err(mpsc::TryRecvError::Disconnected) => {
                        observer.on_error(SourceError::Dropped);
                        break;
                    }
                }
            },
        }

        self.is_done()
    }
}
