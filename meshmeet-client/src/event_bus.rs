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

//! Per-session event bus.
//!
//! A MPMC broadcast channel of [`MeetingEvent`]s. Every subscriber receives
//! every event emitted after it subscribed. Each session owns its own bus,
//! so two sessions in one process never see each other's events.
//!
//! # Example
//!
//! ```ignore
//! let mut rx = handle.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = rx.recv().await {
//!         if let MeetingEvent::RosterUpdated(list) = event {
//!             println!("{} participant(s)", list.len());
//!         }
//!     }
//! });
//! ```

use async_broadcast::{broadcast, InactiveReceiver, Receiver, Sender};

use crate::events::MeetingEvent;

#[derive(Clone)]
pub struct EventBus {
    sender: Sender<MeetingEvent>,
    // Keeps the channel open while nobody is subscribed.
    _keepalive: InactiveReceiver<MeetingEvent>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (mut sender, receiver) = broadcast(capacity.max(1));
        sender.set_overflow(true);
        Self {
            sender,
            _keepalive: receiver.deactivate(),
        }
    }

    /// Subscribe to session events.
    ///
    /// Returns a receiver that will receive all future events.
    pub fn subscribe(&self) -> Receiver<MeetingEvent> {
        self.sender.new_receiver()
    }

    /// Emit an event to all subscribers.
    ///
    /// Never blocks. If a subscriber lags behind, its oldest events are
    /// dropped to make room (overflow behavior).
    pub fn emit(&self, event: MeetingEvent) {
        let _ = self.sender.try_broadcast(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_broadcast::TryRecvError;

    #[test]
    fn emit_without_subscribers_is_fine() {
        let bus = EventBus::new(4);
        bus.emit(MeetingEvent::Connected);
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
        bus.emit(MeetingEvent::MeetingEnded);
        assert!(matches!(rx.try_recv(), Ok(MeetingEvent::MeetingEnded)));
    }

    #[test]
    fn every_subscriber_sees_every_event() {
        let bus = EventBus::new(4);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.emit(MeetingEvent::UnreadChanged(3));
        assert!(matches!(a.try_recv(), Ok(MeetingEvent::UnreadChanged(3))));
        assert!(matches!(b.try_recv(), Ok(MeetingEvent::UnreadChanged(3))));
    }

    #[test]
    fn overflow_drops_oldest() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for n in 1..=3 {
            bus.emit(MeetingEvent::UnreadChanged(n));
        }
        let mut seen = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(MeetingEvent::UnreadChanged(n)) => seen.push(n),
                Ok(_) => {}
                Err(TryRecvError::Overflowed(_)) => continue,
                Err(_) => break,
            }
        }
        assert_eq!(seen, vec![2, 3]);
    }

    #[test]
    fn buses_are_isolated() {
        let one = EventBus::new(4);
        let two = EventBus::new(4);
        let mut rx = two.subscribe();
        one.emit(MeetingEvent::Connected);
        assert!(rx.try_recv().is_err());
    }
}
