use std::time::Instant;

use chrono::Utc;

use crate::adapter::{Adapter, AdapterExtras, TransferModes};
use crate::config::{ChatConfig, DataTransferMode};
use crate::conversation::{Conversation, ScrollMetrics, Update};
use crate::message::{Direction, MessageId, MessageStatus};
use crate::source::{text_stream, Source};
use crate::{Error, Result};

/// Prompt and reply ids of one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub prompt: MessageId,
    pub reply: MessageId,
}

/// A conversation wired to an adapter.
///
/// One exchange is in flight at a time: while its reply is loading or
/// streaming, `send` is refused. A reply that fails takes its prompt out
/// of the conversation.
pub struct ChatSession<A> {
    adapter: A,
    config: ChatConfig,
    conversation: Conversation,
    in_flight: Option<Exchange>,
}

impl<A: Adapter> ChatSession<A> {
    pub fn new(adapter: A, config: ChatConfig) -> Result<Self> {
        if adapter.modes().is_empty() {
            return Err(Error::InvalidAdapter);
        }

        tracing::info!(
            "chat session started (theme {}, {:?} transfer)",
            config.theme_id,
            config.data_transfer_mode
        );

        Ok(ChatSession {
            conversation: Conversation::new(&config),
            adapter,
            config,
            in_flight: None,
        })
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut Conversation {
        &mut self.conversation
    }

    /// The configured mode if the adapter supports it, else the other one.
    pub fn transfer_mode(&self) -> DataTransferMode {
        let preferred = self.config.data_transfer_mode;
        if self.adapter.modes().contains(mode_flag(preferred)) {
            preferred
        } else {
            preferred.other()
        }
    }

    /// The exchange whose reply has not finished yet.
    pub fn in_flight(&self) -> Option<&Exchange> {
        self.in_flight.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Add the user's prompt and ask the adapter for a reply.
    pub fn send(&mut self, prompt: &str) -> Result<Exchange> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(Error::EmptyPrompt);
        }

        self.settle();
        if let Some(exchange) = &self.in_flight {
            return Err(Error::ReplyInProgress(exchange.reply.clone()));
        }

        let extras = AdapterExtras {
            config: self.config.clone(),
            conversation_history: self
                .conversation
                .history(self.config.history_payload_size),
        };

        let prompt_id = self
            .conversation
            .add_message(Direction::Out, prompt, Utc::now(), None);

        let mode = self.transfer_mode();
        tracing::debug!("requesting reply to {prompt_id} via {mode:?}");
        let source = match mode {
            DataTransferMode::Fetch => Source::Promise(self.adapter.fetch_text(prompt, extras)),
            DataTransferMode::Stream => {
                let (observer, stream) = text_stream();
                self.adapter.stream_text(prompt, observer, extras);
                Source::Stream(stream)
            }
        };

        let reply = self
            .conversation
            .add_message(Direction::In, source, Utc::now(), None);

        let exchange = Exchange {
            prompt: prompt_id,
            reply,
        };
        self.in_flight = Some(exchange.clone());
        Ok(exchange)
    }

    pub fn poll(&mut self, now: Instant) {
        self.conversation.poll(now);
        self.settle();
    }

    /// Release the in-flight exchange once its reply is terminal.
    fn settle(&mut self) {
        let Some(exchange) = &self.in_flight else {
            return;
        };

        let status = self
            .conversation
            .get_message(&exchange.reply)
            .map(|m| m.status());

        match status {
            Some(MessageStatus::Loading | MessageStatus::Streaming) => {}
            Some(MessageStatus::Error) => {
                tracing::debug!(
                    "reply {} failed, dropping prompt {}",
                    exchange.reply,
                    exchange.prompt
                );
                if self.conversation.remove_message(&exchange.prompt).is_err() {
                    tracing::debug!("prompt {} was already removed", exchange.prompt);
                }
                self.in_flight = None;
            }
            Some(MessageStatus::Loaded) | None => self.in_flight = None,
        }
    }

    pub fn updates(&mut self) -> impl Iterator<Item = Update> + '_ {
        self.conversation.updates()
    }

    pub fn message_resized(&mut self, id: &MessageId) -> bool {
        self.conversation.message_resized(id)
    }

    pub fn user_scrolled(&mut self, metrics: ScrollMetrics) {
        self.conversation.user_scrolled_metrics(metrics);
    }
}

fn mode_flag(mode: DataTransferMode) -> TransferModes {
    match mode {
        DataTransferMode::Fetch => TransferModes::FETCH,
        DataTransferMode::Stream => TransferModes::STREAM,
    }
}
