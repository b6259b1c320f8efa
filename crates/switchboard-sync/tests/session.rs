mod common;

use common::{message, message_frame, FakeApi, FakePush, RecordingSink};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use switchboard_http::{Frame, PushEvent, Scope};
use switchboard_sync::{EngineInput, PendingStatus, SyncConfig, SyncError, SyncSession};

struct Harness {
    api: Arc<FakeApi>,
    push: Arc<FakePush>,
    sink: Arc<RecordingSink>,
    session: Arc<SyncSession>,
}

fn harness() -> Harness {
    let api = FakeApi::new();
    let push = FakePush::new();
    let sink = RecordingSink::new();
    let session = Arc::new(SyncSession::new(
        SyncConfig::default(),
        api.clone(),
        push.clone(),
        sink.clone(),
    ));
    Harness {
        api,
        push,
        sink,
        session,
    }
}

#[tokio::test(start_paused = true)]
async fn test_first_snapshot_is_silent_and_later_messages_alert() {
    let h = harness();
    h.api.messages.lock().extend([
        message(42, Some(1), "hello", 0, true),
        message(42, Some(2), "anyone there?", 10, true),
        message(42, Some(3), "hello??", 20, true),
    ]);

    h.session.open_conversation(42).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.session.engine().messages(42).await.unwrap().len(), 3);
    assert!(h.sink.sounds.lock().is_empty());
    assert_eq!(h.sink.blink_starts(), 0);

    h.api
        .messages
        .lock()
        .push(message(42, Some(4), "ok bye", 30, true));
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.session.engine().messages(42).await.unwrap().len(), 4);
    assert_eq!(*h.sink.sounds.lock(), vec!["message".to_string()]);
    assert_eq!(h.sink.blink_starts(), 1);
    assert!(h.session.signaler().is_blinking());

    h.session.signaler().set_focused(true);
    assert!(!h.session.signaler().is_blinking());
    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_push_after_snapshot_appends_newest_last() {
    let h = harness();
    h.api.messages.lock().extend([
        message(42, Some(1), "one", 10, true),
        message(42, Some(3), "three", 30, false),
        message(42, Some(2), "two", 20, true),
    ]);

    h.session.open_conversation(42).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    h.push
        .latest()
        .send(message_frame(&message(42, Some(4), "four", 40, true)))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let messages = h.session.engine().messages(42).await.unwrap();
    let ids: Vec<_> = messages.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![Some(1), Some(2), Some(3), Some(4)]);
    assert_eq!(*h.sink.sounds.lock(), vec!["message".to_string()]);
    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_echo_before_send_response_yields_one_message() {
    let h = harness();
    *h.api.send_delay.lock() = Duration::from_secs(1);
    h.api.send_ids.lock().push_back(55);

    h.session.open_conversation(42).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let session = h.session.clone();
    let send = tokio::spawn(async move { session.send("Hello").await });

    tokio::time::sleep(Duration::from_millis(400)).await;
    let pending = h.session.tracker().pending_for(42);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].status, PendingStatus::Pending);
    let key = pending[0].client_key;

    h.push
        .latest()
        .send(message_frame(&message(42, Some(55), "Hello", 0, false)))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        h.session.tracker().get(key).unwrap().status,
        PendingStatus::Confirmed
    );

    let returned = send.await.unwrap().unwrap();
    assert_eq!(returned, key);

    let messages = h.session.engine().messages(42).await.unwrap();
    let hellos: Vec<_> = messages.iter().filter(|m| m.content == "Hello").collect();
    assert_eq!(hellos.len(), 1);
    assert_eq!(hellos[0].id, Some(55));
    assert_eq!(hellos[0].client_key, Some(key));
    assert!(!hellos[0].transient);

    // An agent's own message never alerts.
    assert!(h.sink.sounds.lock().is_empty());
    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_send_leaves_no_placeholder() {
    let h = harness();
    *h.api.fail_sends.lock() = true;
    h.session.open_conversation(42).await.unwrap();

    let err = h.session.send("  will   fail ").await.unwrap_err();
    match err {
        SyncError::SendFailed { content, .. } => assert_eq!(content, "  will   fail "),
        other => panic!("expected SendFailed, got {:?}", other),
    }
    assert!(h.session.engine().messages(42).await.unwrap().is_empty());

    let failed = h.session.tracker().pending_for(42);
    assert_eq!(failed[0].status, PendingStatus::Failed);

    *h.api.fail_sends.lock() = false;
    h.session.resubmit(failed[0].client_key).await.unwrap();
    let messages = h.session.engine().messages(42).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "  will   fail ");
    assert_eq!(h.api.sends.load(Ordering::SeqCst), 2);
    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_send_without_open_conversation_is_rejected() {
    let h = harness();
    assert_eq!(h.session.send("hi").await, Err(SyncError::NoConversation));

    h.session.open_dashboard(1).await.unwrap();
    assert_eq!(h.session.send("hi").await, Err(SyncError::NoConversation));
    assert_eq!(h.api.sends.load(Ordering::SeqCst), 0);
    h.session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_switching_scope_discards_previous_state() {
    let h = harness();
    h.api.messages.lock().extend([
        message(42, Some(1), "old", 0, true),
        message(7, Some(2), "first", 0, true),
        message(7, Some(3), "second", 5, true),
    ]);

    h.session.open_conversation(42).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.session.engine().messages(42).await.unwrap().len(), 1);
    let first_generation = h.session.engine().generation();

    h.session.open_conversation(7).await.unwrap();
    assert_eq!(h.session.active_scope().await, Some(Scope::Conversation(7)));
    assert!(h.session.engine().generation() > first_generation);
    assert!(h.session.engine().messages(42).await.unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.session.engine().messages(7).await.unwrap().len(), 2);
    assert_eq!(h.push.live(), 1);
    assert!(h.push.server(0).send(Frame::Text("{}".into())).is_err());

    // Input stamped with the old generation is dropped.
    let stale = PushEvent::Message {
        kind: "message.created".into(),
        record: message(42, Some(9), "late", 1, true),
    };
    h.session
        .engine()
        .submit(first_generation, EngineInput::Push(stale))
        .await
        .unwrap();
    assert!(h.session.engine().messages(42).await.unwrap().is_empty());

    // The new conversation's first snapshot was suppressed too.
    assert!(h.sink.sounds.lock().is_empty());

    let state = h.session.connection_state().await.unwrap();
    assert!(state.borrow().is_online());
    h.session.shutdown().await;
    assert_eq!(h.push.live(), 0);
}
