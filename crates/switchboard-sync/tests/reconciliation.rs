mod common;

use common::{at, message};
use std::time::Duration;
use switchboard_http::{Direction, PushEvent};
use switchboard_sync::{
    Change, EngineInput, EngineState, Message, ReconciliationEngine, Source, SyncConfig,
};
use tokio::time::Instant;
use uuid::Uuid;

fn push(record: switchboard_http::MessageRecord) -> EngineInput {
    EngineInput::Push(PushEvent::Message {
        kind: "message.created".into(),
        record,
    })
}

fn assert_sorted(messages: &[Message]) {
    assert!(
        messages.windows(2).all(|w| w[0].created_at <= w[1].created_at),
        "not sorted: {:?}",
        messages.iter().map(|m| m.created_at).collect::<Vec<_>>()
    );
}

#[test]
fn test_applying_identified_message_twice_is_idempotent() {
    let mut state = EngineState::new(&SyncConfig::default());
    let now = Instant::now();
    state.apply(push(message(1, Some(10), "a", 0, true)), now);
    state.apply(push(message(1, Some(11), "b", 5, false)), now);
    let once = state.messages(1);

    state.apply(push(message(1, Some(11), "b", 5, false)), now);
    state.apply(
        EngineInput::MessageSnapshot {
            conversation_id: 1,
            messages: vec![message(1, Some(10), "a", 0, true)],
        },
        now,
    );
    assert_eq!(state.messages(1), once);
}

#[test]
fn test_list_stays_sorted_after_every_merge() {
    let mut state = EngineState::new(&SyncConfig::default());
    let start = Instant::now();
    let mut seed: u64 = 42;

    for step in 0..200u64 {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let secs = (seed >> 33) as i64 % 600;
        let now = start + Duration::from_millis(step * 50);
        let input = match step % 4 {
            0 => push(message(1, Some(step), &format!("m{}", step), secs, true)),
            1 => EngineInput::Optimistic(Message::optimistic(
                1,
                format!("local{}", step),
                Uuid::new_v4(),
                at(secs),
            )),
            2 => push(message(1, None, &format!("anon{}", step), secs, false)),
            _ => EngineInput::MessageSnapshot {
                conversation_id: 1,
                messages: vec![
                    message(1, Some(step), &format!("s{}", step), secs, false),
                    message(1, Some(step.saturating_sub(3)), "edited", secs / 2, true),
                ],
            },
        };
        state.apply(input, now);
        assert_sorted(&state.messages(1));
    }
}

#[test]
fn test_equal_timestamps_keep_arrival_order() {
    let mut state = EngineState::new(&SyncConfig::default());
    let now = Instant::now();
    for id in [5, 3, 9] {
        state.apply(push(message(1, Some(id), "same second", 0, true)), now);
    }
    let ids: Vec<_> = state.messages(1).iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![Some(5), Some(3), Some(9)]);
}

#[test]
fn test_transient_followed_by_echo_collapses() {
    let mut state = EngineState::new(&SyncConfig::default());
    let now = Instant::now();
    let key = Uuid::new_v4();
    state.apply(
        EngineInput::Optimistic(Message::optimistic(1, "hi", key, at(0))),
        now,
    );

    let set = state
        .apply(
            push(message(1, Some(77), "hi", 1, false)),
            now + Duration::from_millis(1900),
        )
        .unwrap();
    assert!(matches!(
        &set.changes[..],
        [Change::MessagePromoted { client_key: Some(k), .. }] if *k == key
    ));

    let messages = state.messages(1);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, Some(77));
    assert_eq!(messages[0].direction, Direction::Agent);
    assert!(!messages[0].transient);
}

#[test]
fn test_echo_from_other_direction_does_not_promote() {
    let mut state = EngineState::new(&SyncConfig::default());
    let now = Instant::now();
    state.apply(
        EngineInput::Optimistic(Message::optimistic(1, "hi", Uuid::new_v4(), at(0))),
        now,
    );
    state.apply(push(message(1, Some(77), "hi", 0, true)), now);
    assert_eq!(state.messages(1).len(), 2);
}

#[test]
fn test_scenario_snapshot_then_push() {
    let mut state = EngineState::new(&SyncConfig::default());
    let now = Instant::now();
    let set = state
        .apply(
            EngineInput::MessageSnapshot {
                conversation_id: 42,
                messages: vec![
                    message(42, Some(1), "one", 10, true),
                    message(42, Some(3), "three", 30, true),
                    message(42, Some(2), "two", 20, false),
                ],
            },
            now,
        )
        .unwrap();
    assert_eq!(set.source, Source::Snapshot);
    assert_eq!(set.changes.len(), 3);

    state.apply(push(message(42, Some(4), "four", 40, true)), now);

    let messages = state.messages(42);
    let ids: Vec<_> = messages.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![Some(1), Some(2), Some(3), Some(4)]);
    assert_sorted(&messages);
}

#[tokio::test(start_paused = true)]
async fn test_unpromoted_transient_is_swept_after_ttl() {
    let engine = ReconciliationEngine::spawn(&SyncConfig::default());
    let mut feed = engine.subscribe();
    let key = Uuid::new_v4();

    engine
        .submit(
            0,
            EngineInput::Optimistic(Message::optimistic(1, "lost", key, at(0))),
        )
        .await
        .unwrap();
    let added = feed.recv().await.unwrap();
    assert!(matches!(&added.changes[..], [Change::MessageAdded(_)]));

    tokio::time::sleep(Duration::from_secs(14)).await;
    assert_eq!(engine.messages(1).await.unwrap().len(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(engine.messages(1).await.unwrap().is_empty());

    let set = feed.recv().await.unwrap();
    assert!(matches!(
        &set.changes[..],
        [Change::TransientExpired { client_key: Some(k), .. }] if *k == key
    ));
}

#[tokio::test(start_paused = true)]
async fn test_promoted_entry_survives_sweep() {
    let engine = ReconciliationEngine::spawn(&SyncConfig::default());
    let key = Uuid::new_v4();

    engine
        .submit(0, EngineInput::Optimistic(Message::optimistic(1, "hi", key, at(0))))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    engine
        .submit(0, push(message(1, Some(5), "hi", 0, false)))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    let messages = engine.messages(1).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].client_key, Some(key));
}
