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

//! Participant roster and presenter tracking.
//!
//! The roster merges three sources: the join response, room snapshots from
//! the relay, and incremental join/leave/media events. Snapshots are
//! authoritative only for the fields they carry; anything they omit keeps
//! its previous value, and participants a snapshot does not list are kept.

use std::collections::BTreeMap;

use log::debug;
use meshmeet_types::responses::ParticipantSummary;
use meshmeet_types::signaling::{MediaFlags, RoomState};
use meshmeet_types::ParticipantId;

use crate::media::MediaStream;

#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub is_self: bool,
    pub is_host: bool,
    pub is_muted: bool,
    pub is_camera_on: bool,
    pub stream: Option<MediaStream>,
}

impl Participant {
    pub fn new(id: ParticipantId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_self: false,
            is_host: false,
            is_muted: false,
            is_camera_on: true,
            stream: None,
        }
    }
}

#[derive(Debug)]
pub struct Roster {
    self_id: ParticipantId,
    self_name: String,
    entries: BTreeMap<ParticipantId, Participant>,
    host_id: Option<ParticipantId>,
    local_stream: Option<MediaStream>,
}

impl Roster {
    pub fn new(self_id: ParticipantId, self_name: impl Into<String>) -> Self {
        let mut roster = Self {
            self_id,
            self_name: self_name.into(),
            entries: BTreeMap::new(),
            host_id: None,
            local_stream: None,
        };
        roster.ensure_self();
        roster
    }

    pub fn self_id(&self) -> ParticipantId {
        self.self_id
    }

    pub fn host_id(&self) -> Option<ParticipantId> {
        self.host_id
    }

    pub fn is_self_host(&self) -> bool {
        self.host_id == Some(self.self_id)
    }

    pub fn get(&self, id: ParticipantId) -> Option<&Participant> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ensure_self(&mut self) {
        let self_id = self.self_id;
        let entry = self
            .entries
            .entry(self_id)
            .or_insert_with(|| Participant::new(self_id, self.self_name.clone()));
        entry.is_self = true;
        entry.stream = self.local_stream.clone();
    }

    fn set_host(&mut self, host_id: Option<ParticipantId>) {
        if host_id.is_none() {
            return;
        }
        self.host_id = host_id;
        for p in self.entries.values_mut() {
            p.is_host = Some(p.id) == host_id;
        }
    }

    /// Seed from the join response.
    pub fn seed(&mut self, participants: &[ParticipantSummary], host_id: Option<ParticipantId>) {
        for summary in participants {
            self.entries
                .entry(summary.id)
                .and_modify(|p| p.name = summary.name.clone())
                .or_insert_with(|| Participant::new(summary.id, summary.name.clone()));
        }
        self.ensure_self();
        self.set_host(host_id);
    }

    /// Record the local capture: attach the preview stream and the current
    /// toggle state to the self entry.
    pub fn set_local_media(&mut self, stream: Option<MediaStream>, mic_on: bool, camera_on: bool) {
        self.local_stream = stream;
        self.ensure_self();
        let self_id = self.self_id;
        if let Some(me) = self.entries.get_mut(&self_id) {
            me.is_muted = !mic_on;
            me.is_camera_on = camera_on;
        }
    }

    /// Mirror the local toggle state onto the self entry. Returns whether it
    /// changed.
    pub fn set_local_flags(&mut self, mic_on: bool, camera_on: bool) -> bool {
        let self_id = self.self_id;
        self.update_flags(
            self_id,
            &MediaFlags {
                mic: Some(mic_on),
                cam: Some(camera_on),
            },
        )
    }

    pub fn set_local_stream(&mut self, stream: Option<MediaStream>) {
        self.local_stream = stream;
        self.ensure_self();
    }

    /// Merge a room snapshot. Returns the ids greater than the local id, in
    /// ascending order: the peers this client is expected to dial.
    ///
    /// Mic and camera flags for the local id are ignored; those follow the
    /// local capture.
    pub fn apply_snapshot(&mut self, snapshot: &RoomState) -> Vec<ParticipantId> {
        let self_id = self.self_id;
        for rp in &snapshot.participants {
            let entry = self.entries.entry(rp.id).or_insert_with(|| {
                Participant::new(rp.id, rp.name.clone().unwrap_or_default())
            });
            if let Some(name) = &rp.name {
                entry.name = name.clone();
            }
            if rp.id == self_id {
                continue;
            }
            if let Some(mic) = rp.mic {
                entry.is_muted = !mic;
            }
            if let Some(cam) = rp.cam {
                entry.is_camera_on = cam;
            }
        }
        self.ensure_self();
        self.set_host(snapshot.host_id);
        debug!(
            "Applied room snapshot with {} participant(s), roster now {}",
            snapshot.participants.len(),
            self.entries.len()
        );
        self.ids_above_self()
    }

    pub fn ids_above_self(&self) -> Vec<ParticipantId> {
        self.entries
            .range(self.self_id.saturating_add(1)..)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Apply a `media` event to one remote participant. Unknown ids and the
    /// local id are ignored.
    pub fn apply_media(&mut self, id: ParticipantId, flags: &MediaFlags) -> bool {
        if id == self.self_id {
            return false;
        }
        self.update_flags(id, flags)
    }

    fn update_flags(&mut self, id: ParticipantId, flags: &MediaFlags) -> bool {
        let Some(p) = self.entries.get_mut(&id) else {
            return false;
        };
        let before = (p.is_muted, p.is_camera_on);
        if let Some(mic) = flags.mic {
            p.is_muted = !mic;
        }
        if let Some(cam) = flags.cam {
            p.is_camera_on = cam;
        }
        before != (p.is_muted, p.is_camera_on)
    }

    pub fn set_muted(&mut self, id: ParticipantId, muted: bool) -> bool {
        self.apply_media(
            id,
            &MediaFlags {
                mic: Some(!muted),
                cam: None,
            },
        )
    }

    pub fn set_camera_on(&mut self, id: ParticipantId, on: bool) -> bool {
        self.apply_media(
            id,
            &MediaFlags {
                mic: None,
                cam: Some(on),
            },
        )
    }

    /// Add a participant announced by `user-joined`. No-op if present.
    pub fn add(&mut self, id: ParticipantId, name: &str) -> bool {
        if self.entries.contains_key(&id) {
            return false;
        }
        let mut participant = Participant::new(id, name);
        participant.is_host = self.host_id == Some(id);
        self.entries.insert(id, participant);
        true
    }

    /// Remove a remote participant. The local entry is never removed.
    pub fn remove(&mut self, id: ParticipantId) -> Option<Participant> {
        if id == self.self_id {
            return None;
        }
        self.entries.remove(&id)
    }

    pub fn attach_stream(&mut self, id: ParticipantId, stream: MediaStream) -> bool {
        match self.entries.get_mut(&id) {
            Some(p) if p.stream.as_ref() != Some(&stream) => {
                p.stream = Some(stream);
                true
            }
            _ => false,
        }
    }

    /// Self first, then ascending id.
    pub fn participants(&self) -> Vec<Participant> {
        let mut list: Vec<Participant> = Vec::with_capacity(self.entries.len());
        list.extend(self.entries.get(&self.self_id).cloned());
        list.extend(
            self.entries
                .values()
                .filter(|p| p.id != self.self_id)
                .cloned(),
        );
        list
    }

    /// Drop everything, including the local entry.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.host_id = None;
        self.local_stream = None;
    }
}

/// Who is presenting, if anyone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresenterState {
    current: Option<ParticipantId>,
}

impl PresenterState {
    pub fn current(&self) -> Option<ParticipantId> {
        self.current
    }

    pub fn is_presenting(&self, id: ParticipantId) -> bool {
        self.current == Some(id)
    }

    /// `screen-share-start`: the sender becomes the presenter.
    pub fn start(&mut self, id: ParticipantId) -> bool {
        self.replace(Some(id))
    }

    /// `screen-share-stop`: honored only from the current presenter.
    pub fn stop(&mut self, id: ParticipantId) -> bool {
        if self.current == Some(id) {
            self.replace(None)
        } else {
            false
        }
    }

    /// A leaving participant takes their presentation with them.
    pub fn participant_left(&mut self, id: ParticipantId) -> bool {
        self.stop(id)
    }

    /// A snapshot sets the presenter only when it names one.
    pub fn apply_snapshot(&mut self, presenter_id: Option<ParticipantId>) -> bool {
        match presenter_id {
            Some(id) => self.replace(Some(id)),
            None => false,
        }
    }

    pub fn clear(&mut self) -> bool {
        self.replace(None)
    }

    fn replace(&mut self, next: Option<ParticipantId>) -> bool {
        let changed = self.current != next;
        self.current = next;
        changed
    }
}
