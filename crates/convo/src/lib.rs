//! Conversation state for a chat interface that renders replies while
//! they stream in.
//!
//! Messages take their text from a [`Source`] (immediate text, a pending
//! reply, or a stream of chunks), render it through their own
//! [`md_stream::StreamParser`], and move through
//! loading -> streaming -> loaded | error. The [`Conversation`] keeps them
//! in order, tracks which ones are streaming and decides when the view
//! should follow them.

mod adapter;
mod config;
mod conversation;
mod error;
mod message;
mod session;
mod source;

pub use adapter::{Adapter, AdapterExtras, ConversationItem, Role, TransferModes};
pub use config::{ChatConfig, DataTransferMode, HistoryPayloadSize};
pub use conversation::{Conversation, ErrorCallback, ScrollMetrics, Update};
pub use error::{Error, Result, SourceError};
pub use message::{
    Direction, Message, MessageId, MessageStatus, ResizeListener, SafetyTimer, StatusCallback,
};
pub use session::{ChatSession, Exchange};
pub use source::{
    normalize, pending_text, text_stream, NormalizedSource, PendingText, Source, SourceKind,
    SourceObserver, StreamObserver, TextResolver, TextStream,
};
