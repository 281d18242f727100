/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

use meshmeet_types::responses::{ChatHistoryEntry, ChatTimestamp};
use meshmeet_types::signaling::{ChatPayload, Sender};
use meshmeet_types::ParticipantId;
use web_time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Local sequence number, unique within the session.
    pub seq: u64,
    pub sender_id: Option<ParticipantId>,
    pub sender: String,
    pub text: String,
    pub timestamp: Option<ChatTimestamp>,
    pub is_self: bool,
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Chat transcript plus the unread badge.
#[derive(Debug)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
    unread: u32,
    unread_cap: u32,
    panel_open: bool,
    next_seq: u64,
}

impl ChatLog {
    pub fn new(unread_cap: u32) -> Self {
        Self {
            messages: Vec::new(),
            unread: 0,
            unread_cap,
            panel_open: false,
            next_seq: 0,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn unread(&self) -> u32 {
        self.unread
    }

    pub fn is_panel_open(&self) -> bool {
        self.panel_open
    }

    fn push(&mut self, mut message: ChatMessage) -> &ChatMessage {
        message.seq = self.next_seq;
        self.next_seq += 1;
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    /// Replace the transcript with persisted history. History never counts
    /// as unread.
    pub fn load_history(&mut self, entries: Vec<ChatHistoryEntry>) {
        self.messages.clear();
        for entry in entries {
            self.push(ChatMessage {
                seq: 0,
                sender_id: None,
                sender: entry.name,
                text: entry.message,
                timestamp: entry.timestamp,
                is_self: false,
            });
        }
    }

    /// Append a message the local user just sent.
    pub fn push_local(&mut self, sender_id: ParticipantId, name: &str, text: &str) -> ChatMessage {
        self.push(ChatMessage {
            seq: 0,
            sender_id: Some(sender_id),
            sender: name.to_string(),
            text: text.to_string(),
            timestamp: Some(ChatTimestamp::Millis(now_millis())),
            is_self: true,
        })
        .clone()
    }

    /// Append a message relayed from another participant. Returns the stored
    /// message and whether the unread count changed.
    pub fn push_remote(&mut self, sender: Option<&Sender>, payload: ChatPayload) -> (ChatMessage, bool) {
        let message = self
            .push(ChatMessage {
                seq: 0,
                sender_id: sender.map(|s| s.id),
                sender: sender.map(|s| s.name.clone()).unwrap_or_default(),
                text: payload.text,
                timestamp: payload.timestamp,
                is_self: false,
            })
            .clone();
        let bumped = !self.panel_open && self.unread < self.unread_cap;
        if bumped {
            self.unread += 1;
        }
        (message, bumped)
    }

    /// Opening the panel marks everything read. Returns whether the unread
    /// count changed.
    pub fn set_panel_open(&mut self, open: bool) -> bool {
        self.panel_open = open;
        if open && self.unread > 0 {
            self.unread = 0;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.messages.clear();
        self.unread = 0;
        self.panel_open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(text: &str) -> ChatPayload {
        ChatPayload {
            text: text.to_string(),
            timestamp: None,
        }
    }

    fn sender(id: ParticipantId) -> Sender {
        Sender {
            id,
            name: format!("user{id}"),
        }
    }

    #[test]
    fn unread_saturates_at_cap() {
        let mut chat = ChatLog::new(99);
        for i in 0..120 {
            chat.push_remote(Some(&sender(2)), payload(&format!("m{i}")));
        }
        assert_eq!(chat.unread(), 99);
        assert_eq!(chat.messages().len(), 120);
        assert!(chat.set_panel_open(true));
        assert_eq!(chat.unread(), 0);
    }

    #[test]
    fn open_panel_does_not_count() {
        let mut chat = ChatLog::new(99);
        chat.set_panel_open(true);
        let (msg, bumped) = chat.push_remote(Some(&sender(3)), payload("hi"));
        assert!(!bumped);
        assert_eq!(msg.sender, "user3");
        assert_eq!(msg.sender_id, Some(3));
        assert!(!chat.set_panel_open(true));
    }

    #[test]
    fn local_messages_are_marked_and_ordered() {
        let mut chat = ChatLog::new(99);
        chat.load_history(vec![ChatHistoryEntry {
            id: 10,
            name: "Bo".into(),
            message: "earlier".into(),
            timestamp: Some(ChatTimestamp::Text("2024-01-01T00:00:00Z".into())),
        }]);
        let mine = chat.push_local(1, "Me", "hello");
        assert!(mine.is_self);
        assert!(matches!(mine.timestamp, Some(ChatTimestamp::Millis(ms)) if ms > 0));
        assert_eq!(chat.unread(), 0);
        let seqs: Vec<u64> = chat.messages().iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![0, 1]);
        chat.reset();
        assert!(chat.messages().is_empty());
    }
}
