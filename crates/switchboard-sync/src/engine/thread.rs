//! Per-conversation message list and its merge rules.

use super::Change;
use crate::models::Message;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Dedup and expiry windows, measured on local arrival time.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Windows {
    pub optimistic: Duration,
    pub echo: Duration,
    pub ttl: Duration,
}

#[derive(Debug, Clone)]
struct Entry {
    message: Message,
    received_at: Instant,
    /// Arrival order, the tie-breaker for equal `created_at`.
    seq: u64,
}

/// A conversation's canonical message list, sorted by `(created_at, seq)`.
#[derive(Debug, Default)]
pub(crate) struct MessageThread {
    entries: Vec<Entry>,
    next_seq: u64,
}

impl MessageThread {
    pub fn messages(&self) -> Vec<Message> {
        self.entries.iter().map(|e| e.message.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Merge one arriving message.
    pub fn merge(
        &mut self,
        incoming: Message,
        arrival_optimistic: bool,
        windows: &Windows,
        now: Instant,
    ) -> Option<Change> {
        let change = match incoming.id {
            Some(id) => self.merge_identified(id, incoming, windows, now),
            None => {
                let window = if arrival_optimistic {
                    windows.optimistic
                } else {
                    windows.echo
                };
                if self.find_transient(&incoming, window, now).is_some() {
                    debug!(
                        "[Engine] Dropping duplicate transient in conversation {}",
                        incoming.conversation_id
                    );
                    return None;
                }
                let mut message = incoming;
                message.transient = true;
                self.push(message.clone(), now);
                Some(Change::MessageAdded(message))
            }
        };
        if change.is_some() {
            self.sort();
        }
        change
    }

    fn merge_identified(
        &mut self,
        id: u64,
        mut incoming: Message,
        windows: &Windows,
        now: Instant,
    ) -> Option<Change> {
        incoming.transient = false;

        if let Some(pos) = self.position_of(id) {
            let entry = &mut self.entries[pos];
            incoming.client_key = incoming.client_key.or(entry.message.client_key);
            if entry.message == incoming {
                return None;
            }
            let previous = std::mem::replace(&mut entry.message, incoming.clone());
            return Some(Change::MessageReplaced {
                previous,
                current: incoming,
            });
        }

        if let Some(pos) = self.find_transient(&incoming, windows.echo, now) {
            return Some(self.promote(pos, incoming));
        }

        self.push(incoming.clone(), now);
        Some(Change::MessageAdded(incoming))
    }

    /// Apply the send response for `client_key`.
    pub fn confirm(&mut self, client_key: Uuid, mut confirmed: Message, now: Instant) -> Vec<Change> {
        let Some(id) = confirmed.id else {
            return Vec::new();
        };
        confirmed.transient = false;
        confirmed.client_key = Some(client_key);

        let mut changes = Vec::new();
        let transient = self.position_of_key(client_key);
        match (transient, self.position_of(id)) {
            (Some(pos), None) => changes.push(self.promote(pos, confirmed)),
            (Some(pos), Some(_)) => {
                // The echo landed outside the window and was appended on its own.
                let removed = self.entries.remove(pos);
                changes.push(Change::MessageRemoved(removed.message));
                if let Some(existing) = self.position_of(id) {
                    let entry = &mut self.entries[existing];
                    if entry.message != confirmed {
                        let previous = std::mem::replace(&mut entry.message, confirmed.clone());
                        changes.push(Change::MessageReplaced {
                            previous,
                            current: confirmed,
                        });
                    }
                }
            }
            (None, Some(existing)) => {
                let entry = &mut self.entries[existing];
                if entry.message != confirmed {
                    let previous = std::mem::replace(&mut entry.message, confirmed.clone());
                    changes.push(Change::MessageReplaced {
                        previous,
                        current: confirmed,
                    });
                }
            }
            (None, None) => {
                self.push(confirmed.clone(), now);
                changes.push(Change::MessageAdded(confirmed));
            }
        }
        if !changes.is_empty() {
            self.sort();
        }
        changes
    }

    /// Remove the optimistic entry for a failed send.
    pub fn retract(&mut self, client_key: Uuid) -> Option<Change> {
        let pos = self.position_of_key(client_key)?;
        Some(Change::MessageRemoved(self.entries.remove(pos).message))
    }

    /// Drop transient entries older than the TTL.
    pub fn sweep(&mut self, ttl: Duration, now: Instant) -> Vec<Change> {
        let mut expired = Vec::new();
        self.entries.retain(|entry| {
            let stale = entry.message.transient
                && now.saturating_duration_since(entry.received_at) >= ttl;
            if stale {
                expired.push(Change::TransientExpired {
                    client_key: entry.message.client_key,
                    message: entry.message.clone(),
                });
            }
            !stale
        });
        expired
    }

    /// The transient takes the authoritative message; its client key,
    /// arrival time and arrival position are kept.
    fn promote(&mut self, pos: usize, mut message: Message) -> Change {
        let entry = &mut self.entries[pos];
        let client_key = entry.message.client_key;
        message.transient = false;
        message.client_key = client_key;
        entry.message = message.clone();
        Change::MessagePromoted { client_key, message }
    }

    /// Oldest transient entry with the same content and direction that
    /// arrived within `window`.
    fn find_transient(&self, incoming: &Message, window: Duration, now: Instant) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| {
                e.message.transient
                    && now.saturating_duration_since(e.received_at) <= window
                    && e.message.same_content(incoming)
            })
            .min_by_key(|(_, e)| e.seq)
            .map(|(pos, _)| pos)
    }

    fn position_of(&self, id: u64) -> Option<usize> {
        self.entries.iter().position(|e| e.message.id == Some(id))
    }

    fn position_of_key(&self, client_key: Uuid) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.message.transient && e.message.client_key == Some(client_key))
    }

    fn push(&mut self, message: Message, now: Instant) {
        self.entries.push(Entry {
            message,
            received_at: now,
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }

    fn sort(&mut self) {
        self.entries.sort_by(|a, b| {
            a.message
                .created_at
                .cmp(&b.message.created_at)
                .then(a.seq.cmp(&b.seq))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use switchboard_http::Direction;

    fn windows() -> Windows {
        Windows {
            optimistic: Duration::from_secs(1),
            echo: Duration::from_secs(2),
            ttl: Duration::from_secs(15),
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn server(id: u64, content: &str, secs: i64) -> Message {
        Message {
            id: Some(id),
            conversation_id: 1,
            direction: Direction::Agent,
            content: content.into(),
            created_at: at(secs),
            transient: false,
            client_key: None,
        }
    }

    #[test]
    fn test_replace_in_place_is_idempotent() {
        let now = Instant::now();
        let mut thread = MessageThread::default();
        let msg = server(1, "hi", 0);
        assert!(matches!(
            thread.merge(msg.clone(), false, &windows(), now),
            Some(Change::MessageAdded(_))
        ));
        assert!(thread.merge(msg.clone(), false, &windows(), now).is_none());

        let mut edited = msg;
        edited.content = "hi there".into();
        assert!(matches!(
            thread.merge(edited, false, &windows(), now),
            Some(Change::MessageReplaced { .. })
        ));
        assert_eq!(thread.len(), 1);
        assert_eq!(thread.messages()[0].content, "hi there");
    }

    #[test]
    fn test_equal_timestamps_keep_arrival_order() {
        let now = Instant::now();
        let mut thread = MessageThread::default();
        thread.merge(server(2, "b", 5), false, &windows(), now);
        thread.merge(server(1, "a", 5), false, &windows(), now);
        thread.merge(server(3, "c", 1), false, &windows(), now);
        let ids: Vec<_> = thread.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![Some(3), Some(2), Some(1)]);
    }

    #[test]
    fn test_promotion_keeps_client_key_and_position() {
        let now = Instant::now();
        let key = Uuid::new_v4();
        let mut thread = MessageThread::default();
        thread.merge(server(1, "earlier", 0), false, &windows(), now);
        thread.merge(Message::optimistic(1, "hi", key, at(10)), true, &windows(), now);

        let change = thread.merge(
            server(7, "hi", 10),
            false,
            &windows(),
            now + Duration::from_millis(1500),
        );
        match change {
            Some(Change::MessagePromoted { client_key, message }) => {
                assert_eq!(client_key, Some(key));
                assert_eq!(message.id, Some(7));
                assert!(!message.transient);
            }
            other => panic!("expected promotion, got {:?}", other),
        }
        assert_eq!(thread.len(), 2);
    }

    #[test]
    fn test_echo_outside_window_is_appended() {
        let now = Instant::now();
        let mut thread = MessageThread::default();
        thread.merge(
            Message::optimistic(1, "hi", Uuid::new_v4(), at(0)),
            true,
            &windows(),
            now,
        );
        let change = thread.merge(server(7, "hi", 0), false, &windows(), now + Duration::from_secs(3));
        assert!(matches!(change, Some(Change::MessageAdded(_))));
        assert_eq!(thread.len(), 2);
    }

    #[test]
    fn test_optimistic_window_is_narrower() {
        let now = Instant::now();
        let mut thread = MessageThread::default();
        thread.merge(
            Message::optimistic(1, "hi", Uuid::new_v4(), at(0)),
            true,
            &windows(),
            now,
        );

        // A second local copy 1.5s later is a separate message.
        let local = Message::optimistic(1, "hi", Uuid::new_v4(), at(1));
        assert!(thread
            .merge(local, true, &windows(), now + Duration::from_millis(1500))
            .is_some());

        // An id-less server echo within 2s is a duplicate.
        let mut echo = server(0, "hi", 1);
        echo.id = None;
        assert!(thread
            .merge(echo, false, &windows(), now + Duration::from_millis(1800))
            .is_none());
        assert_eq!(thread.len(), 2);
    }

    #[test]
    fn test_confirm_after_push_promotion_is_noop() {
        let now = Instant::now();
        let key = Uuid::new_v4();
        let mut thread = MessageThread::default();
        thread.merge(Message::optimistic(1, "hi", key, at(0)), true, &windows(), now);
        thread.merge(server(55, "hi", 0), false, &windows(), now);

        let changes = thread.confirm(key, server(55, "hi", 0), now);
        assert!(changes.is_empty());
        assert_eq!(thread.messages()[0].client_key, Some(key));
    }

    #[test]
    fn test_echo_after_confirm_is_dropped() {
        let now = Instant::now();
        let key = Uuid::new_v4();
        let mut thread = MessageThread::default();
        thread.merge(Message::optimistic(1, "hi", key, at(0)), true, &windows(), now);
        thread.confirm(key, server(55, "hi", 0), now + Duration::from_millis(300));

        let later = now + Duration::from_millis(600);
        let echo = thread.merge(server(55, "hi", 0), false, &windows(), later);
        assert!(echo.is_none());
        assert_eq!(thread.len(), 1);
        let kept = &thread.messages()[0];
        assert_eq!(kept.id, Some(55));
        assert_eq!(kept.client_key, Some(key));
        assert!(!kept.transient);

        // An edit arriving later still replaces in place.
        let later = now + Duration::from_secs(9);
        let edited = thread.merge(server(55, "hi!", 0), false, &windows(), later);
        assert!(matches!(edited, Some(Change::MessageReplaced { .. })));
        assert_eq!(thread.len(), 1);
        assert_eq!(thread.messages()[0].client_key, Some(key));
    }

    #[test]
    fn test_confirm_collapses_late_echo() {
        let now = Instant::now();
        let key = Uuid::new_v4();
        let mut thread = MessageThread::default();
        thread.merge(Message::optimistic(1, "hi", key, at(0)), true, &windows(), now);
        thread.merge(server(55, "hi", 0), false, &windows(), now + Duration::from_secs(5));
        assert_eq!(thread.len(), 2);

        let changes = thread.confirm(key, server(55, "hi", 0), now + Duration::from_secs(6));
        assert!(matches!(changes[0], Change::MessageRemoved(_)));
        assert_eq!(thread.len(), 1);
        assert_eq!(thread.messages()[0].client_key, Some(key));
    }

    #[test]
    fn test_retract_and_sweep() {
        let now = Instant::now();
        let kept = Uuid::new_v4();
        let dropped = Uuid::new_v4();
        let mut thread = MessageThread::default();
        thread.merge(Message::optimistic(1, "a", kept, at(0)), true, &windows(), now);
        thread.merge(Message::optimistic(1, "b", dropped, at(1)), true, &windows(), now);

        assert!(matches!(thread.retract(dropped), Some(Change::MessageRemoved(_))));
        assert!(thread.retract(dropped).is_none());

        assert!(thread.sweep(Duration::from_secs(15), now + Duration::from_secs(14)).is_empty());
        let expired = thread.sweep(Duration::from_secs(15), now + Duration::from_secs(15));
        assert_eq!(expired.len(), 1);
        assert_eq!(thread.len(), 0);
    }
}
