/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use tokio::sync::mpsc;

use super::ConnectionState;
use super::Iq;
use super::Jid;
use super::Message;
use super::Presence;
use super::muc::Affiliation;
use super::muc::Role;

/// The bridge facing stream categories.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EventCategory {
    ConnectionState,
    Message,
    Presence,
    Iq,
    Room,
    Diagnostic,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::ConnectionState => "connection-state",
            EventCategory::Message => "message",
            EventCategory::Presence => "presence",
            EventCategory::Iq => "iq",
            EventCategory::Room => "room",
            EventCategory::Diagnostic => "diagnostic",
        }
    }
}

/// Something the client reports without being asked.
///
/// Events are delivered in one FIFO channel, in the order the
/// underlying stanzas arrived.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    ConnectionState(ConnectionState),
    Message(Message),
    Presence(Presence),
    /// An inbound IQ which did not answer one of our requests.
    Iq(Iq),
    Room(RoomEvent),
    /// Certificate checks were disabled for this connection.
    SecurityWarning(String),
    /// A problem which did not affect the connection, like a failing
    /// stanza handler.
    Diagnostic(String),
}

impl Event {
    pub fn category(&self) -> EventCategory {
        match self {
            Event::ConnectionState(_) => EventCategory::ConnectionState,
            Event::Message(_) => EventCategory::Message,
            Event::Presence(_) => EventCategory::Presence,
            Event::Iq(_) => EventCategory::Iq,
            Event::Room(_) => EventCategory::Room,
            Event::SecurityWarning(_) | Event::Diagnostic(_) => EventCategory::Diagnostic,
        }
    }
}

/// Receiving side of the event stream.
pub type Events = mpsc::UnboundedReceiver<Event>;

/// What happened in a room.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RoomEventKind {
    /// Our own presence was reflected, the room is usable.
    Joined { nickname: String, created: bool },
    ParticipantJoined {
        participant: String,
        jid: Option<Jid>,
        affiliation: Affiliation,
        role: Role,
    },
    ParticipantLeft {
        participant: String,
        reason: Option<String>,
    },
    Kicked {
        participant: String,
        actor: Option<String>,
        reason: Option<String>,
        is_self: bool,
    },
    Banned {
        participant: String,
        actor: Option<String>,
        reason: Option<String>,
        is_self: bool,
    },
    NicknameChanged {
        participant: String,
        new_nickname: String,
    },
    AffiliationChanged {
        participant: Option<String>,
        jid: Option<Jid>,
        affiliation: Affiliation,
        actor: Option<String>,
        reason: Option<String>,
    },
    RoleChanged {
        participant: String,
        role: Role,
        actor: Option<String>,
        reason: Option<String>,
    },
    SubjectChanged {
        subject: String,
        actor: Option<String>,
    },
    Destroyed {
        reason: Option<String>,
        alternate_room: Option<Jid>,
    },
    /// We are no longer in the room.
    Left { reason: Option<String> },
    InvitationReceived {
        inviter: Option<Jid>,
        reason: Option<String>,
        password: Option<String>,
    },
    InvitationDeclined {
        invitee: Option<Jid>,
        reason: Option<String>,
    },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RoomEvent {
    /// Bare address of the room.
    pub room: Jid,
    pub kind: RoomEventKind,
}

impl RoomEvent {
    pub fn new(room: &Jid, kind: RoomEventKind) -> RoomEvent {
        RoomEvent {
            room: room.clone(),
            kind,
        }
    }

    /// String tag of the event kind.
    pub fn kind(&self) -> &'static str {
        match self.kind {
            RoomEventKind::Joined { .. } => "joined",
            RoomEventKind::ParticipantJoined { .. } => "participant_joined",
            RoomEventKind::ParticipantLeft { .. } => "participant_left",
            RoomEventKind::Kicked { .. } => "kicked",
            RoomEventKind::Banned { .. } => "banned",
            RoomEventKind::NicknameChanged { .. } => "nickname_changed",
            RoomEventKind::AffiliationChanged { .. } => "affiliation_changed",
            RoomEventKind::RoleChanged { .. } => "role_changed",
            RoomEventKind::SubjectChanged { .. } => "subject_changed",
            RoomEventKind::Destroyed { .. } => "destroyed",
            RoomEventKind::Left { .. } => "left",
            RoomEventKind::InvitationReceived { .. } => "invitation_received",
            RoomEventKind::InvitationDeclined { .. } => "invitation_declined",
        }
    }

    /// The occupant nickname the event is about.
    pub fn participant(&self) -> Option<&str> {
        match &self.kind {
            RoomEventKind::Joined { nickname, .. } => Some(nickname),
            RoomEventKind::ParticipantJoined { participant, .. }
            | RoomEventKind::ParticipantLeft { participant, .. }
            | RoomEventKind::Kicked { participant, .. }
            | RoomEventKind::Banned { participant, .. }
            | RoomEventKind::NicknameChanged { participant, .. }
            | RoomEventKind::RoleChanged { participant, .. } => Some(participant),
            RoomEventKind::AffiliationChanged { participant, .. } => participant.as_deref(),
            _ => None,
        }
    }

    pub fn actor(&self) -> Option<&str> {
        match &self.kind {
            RoomEventKind::Kicked { actor, .. }
            | RoomEventKind::Banned { actor, .. }
            | RoomEventKind::AffiliationChanged { actor, .. }
            | RoomEventKind::RoleChanged { actor, .. }
            | RoomEventKind::SubjectChanged { actor, .. } => actor.as_deref(),
            RoomEventKind::InvitationReceived { inviter, .. } => inviter.as_ref().map(Jid::full),
            RoomEventKind::InvitationDeclined { invitee, .. } => invitee.as_ref().map(Jid::full),
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match &self.kind {
            RoomEventKind::ParticipantLeft { reason, .. }
            | RoomEventKind::Kicked { reason, .. }
            | RoomEventKind::Banned { reason, .. }
            | RoomEventKind::AffiliationChanged { reason, .. }
            | RoomEventKind::RoleChanged { reason, .. }
            | RoomEventKind::Destroyed { reason, .. }
            | RoomEventKind::Left { reason }
            | RoomEventKind::InvitationReceived { reason, .. }
            | RoomEventKind::InvitationDeclined { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }

    pub fn new_nickname(&self) -> Option<&str> {
        match &self.kind {
            RoomEventKind::NicknameChanged { new_nickname, .. } => Some(new_nickname),
            _ => None,
        }
    }

    pub fn alternate_room(&self) -> Option<&Jid> {
        match &self.kind {
            RoomEventKind::Destroyed { alternate_room, .. } => alternate_room.as_ref(),
            _ => None,
        }
    }

    pub fn subject(&self) -> Option<&str> {
        match &self.kind {
            RoomEventKind::SubjectChanged { subject, .. } => Some(subject),
            _ => None,
        }
    }
}
