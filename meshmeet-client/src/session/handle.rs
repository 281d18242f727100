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

use futures::StreamExt;
use log::{debug, info};
use meshmeet_types::ParticipantId;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use super::{EndScope, MeetingSession, SessionError, SessionPhase};
use crate::chat::ChatMessage;
use crate::event_bus::EventBus;
use crate::events::MeetingEvent;
use crate::roster::Participant;

/// Requests a [`SessionHandle`] forwards to the running session.
#[derive(Debug)]
pub enum SessionCommand {
    ToggleMic,
    ToggleCamera,
    SetMicEnabled(bool),
    SetCameraEnabled(bool),
    SetScreenShare(bool),
    SendChat(String, oneshot::Sender<Result<ChatMessage, SessionError>>),
    SetChatOpen(bool),
    UserGesture,
    EndMeeting(EndScope, oneshot::Sender<Result<(), SessionError>>),
    Leave,
}

/// Cloneable control surface for a session running on its own task.
///
/// Dropping every handle leaves the meeting.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    bus: EventBus,
    phase: watch::Receiver<SessionPhase>,
    roster: watch::Receiver<Vec<Participant>>,
    presenter: watch::Receiver<Option<ParticipantId>>,
    chat_open: watch::Receiver<bool>,
    unread: watch::Receiver<u32>,
}

impl SessionHandle {
    fn command(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .map_err(|_| SessionError::Stopped)
    }

    pub fn toggle_mic(&self) -> Result<(), SessionError> {
        self.command(SessionCommand::ToggleMic)
    }

    pub fn toggle_camera(&self) -> Result<(), SessionError> {
        self.command(SessionCommand::ToggleCamera)
    }

    pub fn set_mic_enabled(&self, enabled: bool) -> Result<(), SessionError> {
        self.command(SessionCommand::SetMicEnabled(enabled))
    }

    pub fn set_camera_enabled(&self, enabled: bool) -> Result<(), SessionError> {
        self.command(SessionCommand::SetCameraEnabled(enabled))
    }

    pub fn set_screen_share(&self, on: bool) -> Result<(), SessionError> {
        self.command(SessionCommand::SetScreenShare(on))
    }

    pub fn set_chat_open(&self, open: bool) -> Result<(), SessionError> {
        self.command(SessionCommand::SetChatOpen(open))
    }

    pub fn user_gesture(&self) -> Result<(), SessionError> {
        self.command(SessionCommand::UserGesture)
    }

    pub fn leave(&self) -> Result<(), SessionError> {
        self.command(SessionCommand::Leave)
    }

    pub async fn send_chat(&self, text: impl Into<String>) -> Result<ChatMessage, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.command(SessionCommand::SendChat(text.into(), tx))?;
        rx.await.map_err(|_| SessionError::Stopped)?
    }

    pub async fn end_meeting(&self, scope: EndScope) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.command(SessionCommand::EndMeeting(scope, tx))?;
        rx.await.map_err(|_| SessionError::Stopped)?
    }

    pub fn subscribe(&self) -> async_broadcast::Receiver<MeetingEvent> {
        self.bus.subscribe()
    }

    pub fn phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.clone()
    }

    pub fn roster(&self) -> watch::Receiver<Vec<Participant>> {
        self.roster.clone()
    }

    pub fn presenter(&self) -> watch::Receiver<Option<ParticipantId>> {
        self.presenter.clone()
    }

    pub fn chat_open(&self) -> watch::Receiver<bool> {
        self.chat_open.clone()
    }

    pub fn unread(&self) -> watch::Receiver<u32> {
        self.unread.clone()
    }

    /// Resolves once the session has ended, for whatever reason.
    pub async fn ended(&self) {
        let mut phase = self.phase.clone();
        let _ = phase.wait_for(|p| *p == SessionPhase::Ended).await;
    }
}

impl MeetingSession {
    /// Move the session onto its own task.
    pub fn spawn(self) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SessionHandle {
            commands: tx,
            bus: self.bus.clone(),
            phase: self.cells.phase.subscribe(),
            roster: self.cells.roster.subscribe(),
            presenter: self.cells.presenter.subscribe(),
            chat_open: self.cells.chat_open.subscribe(),
            unread: self.cells.unread.subscribe(),
        };
        tokio::spawn(self.run(rx));
        handle
    }

    /// Drive the session until it ends. Returns when the meeting is over,
    /// the user left, or every command sender was dropped.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
        info!("Session loop for meeting {} started", self.options.meeting_code);
        while self.phase != SessionPhase::Ended {
            let deadline = self.dial_at.unwrap_or_else(Instant::now);
            tokio::select! {
                Some(event) = self.channel_events.recv(), if !self.channel_events.is_finished() => {
                    self.handle_channel_event(event);
                }
                Some(event) = self.peer_events.recv() => {
                    self.handle_peer_event(event);
                }
                Some(track_id) = self.screen_ended.recv() => {
                    self.handle_screen_track_ended(&track_id);
                }
                Some(outcome) = self.pending.next(), if !self.pending.is_empty() => {
                    self.apply_outcome(outcome);
                }
                _ = tokio::time::sleep_until(deadline), if self.dial_at.is_some() => {
                    self.dial_due();
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("All session handles dropped");
                        self.leave();
                    }
                },
            }
        }
        info!("Session loop for meeting {} stopped", self.options.meeting_code);
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::ToggleMic => self.toggle_mic(),
            SessionCommand::ToggleCamera => self.toggle_camera(),
            SessionCommand::SetMicEnabled(enabled) => self.set_mic_enabled(enabled),
            SessionCommand::SetCameraEnabled(enabled) => self.set_camera_enabled(enabled),
            SessionCommand::SetScreenShare(on) => self.set_screen_share(on),
            SessionCommand::SendChat(text, reply) => {
                let _ = reply.send(self.send_chat(&text));
            }
            SessionCommand::SetChatOpen(open) => self.set_chat_open(open),
            SessionCommand::UserGesture => self.user_gesture(),
            SessionCommand::EndMeeting(scope, reply) => self.request_end_meeting(scope, reply),
            SessionCommand::Leave => self.leave(),
        }
    }
}
