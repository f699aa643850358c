use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use convo::{
    pending_text, Adapter, AdapterExtras, ChatConfig, ChatSession, ConversationItem,
    DataTransferMode, Direction, Error, HistoryPayloadSize, MessageStatus, PendingText, Role,
    StreamObserver, TransferModes, Update,
};
use pretty_assertions::assert_eq;

/// Replies with the prompt upper-cased, recording what it was asked.
struct Shout {
    modes: TransferModes,
    seen: Rc<RefCell<Vec<(String, Option<Vec<ConversationItem>>)>>>,
}

impl Shout {
    fn new(modes: TransferModes) -> Self {
        Shout {
            modes,
            seen: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl Adapter for Shout {
    fn modes(&self) -> TransferModes {
        self.modes
    }

    fn fetch_text(&self, message: &str, extras: AdapterExtras) -> PendingText {
        self.seen
            .borrow_mut()
            .push((message.to_owned(), extras.conversation_history));
        let (resolver, pending) = pending_text();
        resolver.resolve(message.to_uppercase());
        pending
    }

    fn stream_text(&self, message: &str, observer: StreamObserver, extras: AdapterExtras) {
        self.seen
            .borrow_mut()
            .push((message.to_owned(), extras.conversation_history));
        for word in message.split_inclusive(' ') {
            observer.next(word.to_uppercase());
        }
        observer.complete();
    }
}

fn config(mode: DataTransferMode, history: HistoryPayloadSize) -> ChatConfig {
    ChatConfig {
        data_transfer_mode: mode,
        history_payload_size: history,
        ..ChatConfig::new()
    }
}

fn reply_text<A: Adapter>(session: &ChatSession<A>, id: &convo::MessageId) -> String {
    session
        .conversation()
        .get_message(id)
        .map(|m| m.document().text())
        .unwrap_or_default()
}

#[test]
fn adapter_without_modes_is_rejected() {
    let result = ChatSession::new(Shout::new(TransferModes::empty()), ChatConfig::new());
    assert!(matches!(result, Err(Error::InvalidAdapter)));
}

#[test]
fn empty_prompt_is_usage_error() {
    let mut session = ChatSession::new(
        Shout::new(TransferModes::all()),
        config(DataTransferMode::Stream, HistoryPayloadSize::None),
    )
    .unwrap();

    assert!(matches!(session.send("   "), Err(Error::EmptyPrompt)));
    assert!(session.conversation().is_empty());
}

#[test]
fn stream_exchange() {
    let mut session = ChatSession::new(
        Shout::new(TransferModes::all()),
        config(DataTransferMode::Stream, HistoryPayloadSize::None),
    )
    .unwrap();

    let exchange = session.send("hello there").unwrap();
    session.poll(Instant::now());

    let conversation = session.conversation();
    let prompt = conversation.get_message(&exchange.prompt).unwrap();
    assert_eq!(prompt.direction(), Direction::Out);
    assert_eq!(prompt.status(), MessageStatus::Loaded);

    let reply = conversation.get_message(&exchange.reply).unwrap();
    assert_eq!(reply.direction(), Direction::In);
    assert_eq!(reply.status(), MessageStatus::Loaded);
    assert_eq!(reply.text(), "HELLO THERE");
}

#[test]
fn falls_back_to_supported_mode() {
    let session = ChatSession::new(
        Shout::new(TransferModes::FETCH),
        config(DataTransferMode::Stream, HistoryPayloadSize::None),
    )
    .unwrap();
    assert_eq!(session.transfer_mode(), DataTransferMode::Fetch);

    let session = ChatSession::new(
        Shout::new(TransferModes::all()),
        config(DataTransferMode::Fetch, HistoryPayloadSize::None),
    )
    .unwrap();
    assert_eq!(session.transfer_mode(), DataTransferMode::Fetch);
}

#[test]
fn fetch_exchange_scrolls_when_loaded() {
    let mut session = ChatSession::new(
        Shout::new(TransferModes::FETCH),
        config(DataTransferMode::Fetch, HistoryPayloadSize::None),
    )
    .unwrap();

    let exchange = session.send("*quiet*").unwrap();
    session.updates().for_each(drop);
    session.poll(Instant::now());

    let updates: Vec<Update> = session.updates().collect();
    assert_eq!(updates.last(), Some(&Update::ScrollTo(exchange.reply.clone())));
    assert_eq!(reply_text(&session, &exchange.reply), "QUIET");
}

#[test]
fn history_is_bounded_and_excludes_current_prompt() {
    let adapter = Shout::new(TransferModes::STREAM);
    let seen = adapter.seen.clone();
    let mut session = ChatSession::new(
        adapter,
        config(DataTransferMode::Stream, HistoryPayloadSize::Count(3)),
    )
    .unwrap();

    session.send("one").unwrap();
    session.poll(Instant::now());
    session.send("two").unwrap();
    session.poll(Instant::now());
    session.send("three").unwrap();

    let seen = seen.borrow();
    assert_eq!(seen[0], ("one".to_string(), Some(vec![])));

    let item = |role, message: &str| ConversationItem {
        role,
        message: message.to_owned(),
    };
    assert_eq!(
        seen[2],
        (
            "three".to_string(),
            Some(vec![
                item(Role::Assistant, "ONE"),
                item(Role::User, "two"),
                item(Role::Assistant, "TWO"),
            ])
        )
    );
}

#[test]
fn history_omitted_unless_configured() {
    let adapter = Shout::new(TransferModes::STREAM);
    let seen = adapter.seen.clone();
    let mut session = ChatSession::new(
        adapter,
        config(DataTransferMode::Stream, HistoryPayloadSize::None),
    )
    .unwrap();

    session.send("one").unwrap();
    session.poll(Instant::now());
    session.send("two").unwrap();

    assert!(seen.borrow().iter().all(|(_, history)| history.is_none()));
}

/// Keeps every observer it is handed so the test decides when replies end.
#[derive(Default)]
struct Held {
    observers: RefCell<Vec<StreamObserver>>,
}

impl Adapter for &Held {
    fn modes(&self) -> TransferModes {
        TransferModes::STREAM
    }

    fn stream_text(&self, _message: &str, observer: StreamObserver, _extras: AdapterExtras) {
        self.observers.borrow_mut().push(observer);
    }
}

#[test]
fn second_send_refused_while_reply_in_progress() {
    let held = Held::default();
    let mut session = ChatSession::new(&held, ChatConfig::new()).unwrap();

    let first = session.send("one").unwrap();
    session.poll(Instant::now());
    assert_eq!(session.in_flight(), Some(&first));

    match session.send("two") {
        Err(Error::ReplyInProgress(id)) => assert_eq!(id, first.reply),
        other => panic!("expected ReplyInProgress, got {other:?}"),
    }
    assert_eq!(session.conversation().len(), 2);

    held.observers.borrow()[0].next("partial");
    session.poll(Instant::now());
    assert!(matches!(session.send("two"), Err(Error::ReplyInProgress(_))));

    let observer = held.observers.borrow_mut().remove(0);
    observer.complete();
    session.poll(Instant::now());
    assert!(!session.is_busy());

    let second = session.send("two").unwrap();
    assert_eq!(session.in_flight(), Some(&second));
    assert_eq!(session.conversation().len(), 4);
}

#[test]
fn failed_reply_removes_its_prompt() {
    struct Broken;

    impl Adapter for Broken {
        fn modes(&self) -> TransferModes {
            TransferModes::STREAM
        }

        fn stream_text(&self, _message: &str, observer: StreamObserver, _extras: AdapterExtras) {
            observer.error("boom");
        }
    }

    let mut session = ChatSession::new(Broken, ChatConfig::new()).unwrap();
    let exchange = session.send("hello").unwrap();
    session.updates().for_each(drop);
    session.poll(Instant::now());

    let conversation = session.conversation();
    assert!(conversation.get_message(&exchange.prompt).is_none());
    assert_eq!(
        conversation.get_message(&exchange.reply).map(|m| m.status()),
        Some(MessageStatus::Error)
    );

    let updates: Vec<Update> = session.updates().collect();
    assert_eq!(updates.last(), Some(&Update::Removed(exchange.prompt.clone())));
    assert!(!session.is_busy());
    assert!(session.send("again").is_ok());
}

#[test]
fn rejected_fetch_removes_its_prompt() {
    struct Refuses;

    impl Adapter for Refuses {
        fn modes(&self) -> TransferModes {
            TransferModes::FETCH
        }

        fn fetch_text(&self, _message: &str, _extras: AdapterExtras) -> PendingText {
            let (resolver, pending) = pending_text();
            resolver.reject("offline");
            pending
        }
    }

    let mut session = ChatSession::new(Refuses, ChatConfig::new()).unwrap();
    let exchange = session.send("hello").unwrap();
    session.poll(Instant::now());

    assert!(session.conversation().get_message(&exchange.prompt).is_none());
    assert_eq!(session.conversation().len(), 1);
}

#[tokio::test]
async fn reply_from_another_task() {
    struct Later;

    impl Adapter for Later {
        fn modes(&self) -> TransferModes {
            TransferModes::STREAM
        }

        fn stream_text(&self, _message: &str, observer: StreamObserver, _extras: AdapterExtras) {
            tokio::spawn(async move {
                observer.next("# Done");
                tokio::task::yield_now().await;
                observer.next("\n\n- a\n- b");
                observer.complete();
            });
        }
    }

    let mut session = ChatSession::new(Later, ChatConfig::new()).unwrap();
    let exchange = session.send("go").unwrap();

    let mut status = MessageStatus::Loading;
    for _ in 0..1000 {
        session.poll(Instant::now());
        status = session
            .conversation()
            .get_message(&exchange.reply)
            .unwrap()
            .status();
        if status.is_terminal() {
            break;
        }
        tokio::task::yield_now().await;
    }

    assert_eq!(status, MessageStatus::Loaded);
    assert_eq!(
        session
            .conversation()
            .get_message(&exchange.reply)
            .unwrap()
            .document()
            .to_string(),
        "heading(1)\n  \"Done\"\nunordered-list\n  list-item\n    \"a\"\n  list-item\n    \"b\"\n"
    );
}
