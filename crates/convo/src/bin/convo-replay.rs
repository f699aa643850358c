//! Replays a markdown file through a conversation as if an assistant were
//! streaming it, then prints the rendered tree.
//!
//! Usage:
//!   convo-replay reply.md                  # stream word by word
//!   convo-replay --fetch reply.md          # deliver in one piece
//!   convo-replay --config chat.json reply.md

use std::path::PathBuf;
use std::time::{Duration, Instant};

use convo::{
    pending_text, Adapter, AdapterExtras, ChatConfig, ChatSession, DataTransferMode,
    MessageStatus, PendingText, StreamObserver, TransferModes, Update,
};
use tracing_subscriber::EnvFilter;

const CHUNK_DELAY: Duration = Duration::from_millis(15);

/// Answers every prompt with the same text.
struct ReplayAdapter {
    reply: String,
}

impl Adapter for ReplayAdapter {
    fn modes(&self) -> TransferModes {
        TransferModes::FETCH | TransferModes::STREAM
    }

    fn fetch_text(&self, _message: &str, _extras: AdapterExtras) -> PendingText {
        let (resolver, pending) = pending_text();
        let reply = self.reply.clone();
        tokio::spawn(async move {
            tokio::time::sleep(CHUNK_DELAY).await;
            resolver.resolve(reply);
        });
        pending
    }

    fn stream_text(&self, _message: &str, observer: StreamObserver, extras: AdapterExtras) {
        let reply = self.reply.clone();
        if let Some(history) = &extras.conversation_history {
            tracing::debug!("replaying with {} history items", history.len());
        }

        tokio::spawn(async move {
            for chunk in reply.split_inclusive(|c: char| c == ' ' || c == '\n') {
                tokio::time::sleep(CHUNK_DELAY).await;
                observer.next(chunk);
            }
            observer.complete();
        });
    }
}

struct Args {
    path: PathBuf,
    config: Option<PathBuf>,
    fetch: bool,
}

fn parse_args() -> Option<Args> {
    let mut path = None;
    let mut config = None;
    let mut fetch = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--fetch" => fetch = true,
            "--config" => config = Some(PathBuf::from(args.next()?)),
            _ => path = Some(PathBuf::from(arg)),
        }
    }

    Some(Args {
        path: path?,
        config,
        fetch,
    })
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let Some(args) = parse_args() else {
        eprintln!("usage: convo-replay [--fetch] [--config chat.json] <file.md>");
        std::process::exit(2);
    };

    let mut config = match &args.config {
        Some(path) => match ChatConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("could not load {}: {err}", path.display());
                std::process::exit(1);
            }
        },
        None => ChatConfig::default(),
    };
    if args.fetch {
        config.data_transfer_mode = DataTransferMode::Fetch;
    }

    let reply = match std::fs::read_to_string(&args.path) {
        Ok(reply) => reply,
        Err(err) => {
            eprintln!("could not read {}: {err}", args.path.display());
            std::process::exit(1);
        }
    };

    let mut session = match ChatSession::new(ReplayAdapter { reply }, config) {
        Ok(session) => session,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    let prompt = format!("replay {}", args.path.display());
    let exchange = match session.send(&prompt) {
        Ok(exchange) => exchange,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    let status = loop {
        session.poll(Instant::now());

        let mut resized = false;
        for update in session.updates() {
            match update {
                Update::Commit { id, commit } => {
                    tracing::trace!("{id}: {commit:?}");
                    resized |= id == exchange.reply;
                }
                Update::Status { id, status } => tracing::info!("{id} is {}", status.name()),
                Update::ScrollTo(id) => tracing::debug!("scroll to {id}"),
                Update::Removed(id) => tracing::debug!("{id} removed"),
            }
        }
        if resized {
            session.message_resized(&exchange.reply);
        }

        let status = session
            .conversation()
            .get_message(&exchange.reply)
            .map(|m| m.status());
        match status {
            Some(MessageStatus::Loading | MessageStatus::Streaming) => {
                tokio::time::sleep(CHUNK_DELAY).await
            }
            other => break other,
        }
    };

    let Some(message) = session.conversation().get_message(&exchange.reply) else {
        return;
    };

    if status == Some(MessageStatus::Error) {
        eprintln!("reply failed");
        std::process::exit(1);
    }

    print!("{}", message.document());
}
