//! The boundary with whatever produces assistant replies.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::config::ChatConfig;
use crate::source::{pending_text, PendingText, StreamObserver};

bitflags! {
    /// Transfer modes an adapter implements.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TransferModes: u8 {
        const FETCH = 1 << 0;
        const STREAM = 1 << 1;
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One prior message sent along as context.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConversationItem {
    pub role: Role,
    pub message: String,
}

/// Context handed to the adapter with each prompt.
#[derive(Debug, Clone)]
pub struct AdapterExtras {
    pub config: ChatConfig,

    /// Only present when the config asks for history
    pub conversation_history: Option<Vec<ConversationItem>>,
}

/// Produces replies to prompts.
///
/// Implement at least one of the two transfer methods and advertise it in
/// [`Adapter::modes`]. Long-running work belongs on another thread or
/// task: both methods must return right away and report back through the
/// resolver or observer.
pub trait Adapter {
    fn modes(&self) -> TransferModes;

    /// Request the whole reply at once.
    fn fetch_text(&self, message: &str, extras: AdapterExtras) -> PendingText {
        let _ = (message, extras);
        let (resolver, pending) = pending_text();
        resolver.reject("adapter does not support fetch");
        pending
    }

    /// Stream the reply into `observer`.
    fn stream_text(&self, message: &str, observer: StreamObserver, extras: AdapterExtras) {
        let _ = (message, extras);
        observer.error("adapter does not support streaming");
    }
}

impl<A: Adapter + ?Sized> Adapter for Box<A> {
    fn modes(&self) -> TransferModes {
        (**self).modes()
    }

    fn fetch_text(&self, message: &str, extras: AdapterExtras) -> PendingText {
        (**self).fetch_text(message, extras)
    }

    fn stream_text(&self, message: &str, observer: StreamObserver, extras: AdapterExtras) {
        (**self).stream_text(message, observer, extras)
    }
}
