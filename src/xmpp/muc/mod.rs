/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

//! Multi-User Chat ([XEP-0045](https://xmpp.org/extensions/xep-0045.html))
//! room state.
//!
//! [MucManager] owns the room table. It does no I/O: commands get the
//! stanzas to send from it, and inbound presence and message stanzas
//! are fed to it to drive room state and produce [RoomEvent]s. Occupant
//! state only ever changes in response to what the room reports.

pub mod stanzas;

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt::Display;

use tokio::sync::oneshot;
use tracing::debug;
use tracing::info;

use crate::Element;

use super::ErrorCondition;
use super::Jid;
use super::Message;
use super::MessageType;
use super::Presence;
use super::PresenceType;
use super::RoomEvent;
use super::RoomEventKind;
use super::XmppError;
use super::constants::MUC_NS;
use stanzas::MucUser;
use stanzas::STATUS_AFFILIATION_REMOVED;
use stanzas::STATUS_BANNED;
use stanzas::STATUS_CREATED;
use stanzas::STATUS_KICKED;
use stanzas::STATUS_MEMBERS_ONLY_REMOVED;
use stanzas::STATUS_NICK_CHANGED;
use stanzas::STATUS_SELF;

macro_rules! muc_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn parse(text: &str) -> Option<$name> {
                match text {
                    $($text => Some($name::$variant)),+,
                    _ => None,
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

muc_enum!(
    /// Long term membership level.
    Affiliation {
        Owner => "owner",
        Admin => "admin",
        Member => "member",
        Outcast => "outcast",
        None => "none",
    }
);

muc_enum!(
    /// In-room privilege level for the current visit.
    Role {
        Moderator => "moderator",
        Participant => "participant",
        Visitor => "visitor",
        None => "none",
    }
);

/// How much discussion history to ask for when joining.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct History {
    pub max_stanzas: Option<u32>,
    pub max_chars: Option<u32>,
    pub seconds: Option<u32>,
    /// XEP-0082 timestamp.
    pub since: Option<String>,
}

impl History {
    /// The `<history/>` element, or `None` to accept the room default.
    pub fn to_element(&self) -> Option<Element> {
        if *self == History::default() {
            return None;
        }
        let mut history = Element::new("history", MUC_NS);
        if let Some(n) = self.max_stanzas {
            history.set_attribute("maxstanzas", n.to_string());
        }
        if let Some(n) = self.max_chars {
            history.set_attribute("maxchars", n.to_string());
        }
        if let Some(n) = self.seconds {
            history.set_attribute("seconds", n.to_string());
        }
        if let Some(since) = &self.since {
            history.set_attribute("since", since.as_str());
        }
        Some(history)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RoomState {
    Joining,
    Joined,
    Left,
    Destroyed,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Occupant {
    pub nickname: String,
    /// Real address, if the room discloses it to us.
    pub jid: Option<Jid>,
    pub affiliation: Affiliation,
    pub role: Role,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Room {
    pub jid: Jid,
    pub nickname: String,
    pub state: RoomState,
    pub subject: Option<String>,
    pub occupants: BTreeMap<String, Occupant>,
}

impl Room {
    fn new(jid: &Jid, nickname: &str) -> Room {
        Room {
            jid: jid.clone(),
            nickname: nickname.to_string(),
            state: RoomState::Joining,
            subject: None,
            occupants: BTreeMap::new(),
        }
    }

    /// Our own occupant entry.
    pub fn me(&self) -> Option<&Occupant> {
        self.occupants.get(&self.nickname)
    }
}

/// Result of a join: true if the room was created by it.
pub type JoinResult = Result<bool, XmppError>;

/// The room table.
#[derive(Debug, Default)]
pub struct MucManager {
    rooms: HashMap<Jid, Room>,
    join_waiters: HashMap<Jid, oneshot::Sender<JoinResult>>,
    leave_waiters: HashMap<Jid, oneshot::Sender<Result<(), XmppError>>>,
    /// Last affiliation of occupants who left, by room and bare real
    /// address.
    departed: HashMap<Jid, HashMap<String, Affiliation>>,
}

fn room_key(jid: &Jid) -> Jid {
    jid.to_bare()
}

impl MucManager {
    pub fn new() -> Self {
        MucManager::default()
    }

    /// Snapshot of every room in the table.
    pub fn rooms(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self.rooms.values().cloned().collect();
        rooms.sort_by(|a, b| a.jid.cmp(&b.jid));
        rooms
    }

    pub fn room(&self, jid: &Jid) -> Option<Room> {
        self.rooms.get(&room_key(jid)).cloned()
    }

    /// Fails with `NotJoined` unless the room is joined.
    pub fn require_joined(&self, jid: &Jid) -> Result<&Room, XmppError> {
        match self.rooms.get(&room_key(jid)) {
            Some(room) if room.state == RoomState::Joined => Ok(room),
            _ => Err(XmppError::NotJoined(jid.bare().to_string())),
        }
    }

    /// Adds a `Joining` entry and returns the join presence with a
    /// receiver completed by the self-presence.
    pub fn begin_join(
        &mut self,
        room: &Jid,
        nickname: &str,
        password: Option<&str>,
        history: &History,
    ) -> Result<(Presence, oneshot::Receiver<JoinResult>), XmppError> {
        let key = room_key(room);
        if self.rooms.contains_key(&key) {
            return Err(XmppError::InvalidArgument(format!(
                "room {key} is already joined"
            )));
        }
        let presence = stanzas::join_presence(&key, nickname, password, history)?;
        let (sender, receiver) = oneshot::channel();
        debug!(room = %key, nickname, "joining room");
        self.rooms.insert(key.clone(), Room::new(&key, nickname));
        self.join_waiters.insert(key, sender);
        Ok((presence, receiver))
    }

    /// Drops a room whose join did not complete.
    pub fn abort_join(&mut self, room: &Jid) {
        let key = room_key(room);
        if self.join_waiters.remove(&key).is_some() {
            self.rooms.remove(&key);
        }
    }

    /// Returns the leave presence and a receiver completed when the
    /// room confirms. Joining rooms can be left too.
    pub fn begin_leave(
        &mut self,
        room: &Jid,
    ) -> Result<(Presence, oneshot::Receiver<Result<(), XmppError>>), XmppError> {
        let key = room_key(room);
        let room = match self.rooms.get(&key) {
            Some(room) if matches!(room.state, RoomState::Joining | RoomState::Joined) => room,
            _ => return Err(XmppError::NotJoined(key.to_string())),
        };
        let presence = stanzas::leave_presence(&key, &room.nickname)?;
        let (sender, receiver) = oneshot::channel();
        self.leave_waiters.insert(key, sender);
        Ok((presence, receiver))
    }

    /// Removes a room entry, failing a join still in progress.
    pub fn remove(&mut self, room: &Jid) -> Option<Room> {
        let key = room_key(room);
        if let Some(waiter) = self.join_waiters.remove(&key) {
            let _ = waiter.send(Err(XmppError::Cancelled));
        }
        if let Some(waiter) = self.leave_waiters.remove(&key) {
            let _ = waiter.send(Ok(()));
        }
        self.departed.remove(&key);
        self.rooms.remove(&key)
    }

    /// Empties the table when the connection goes away.
    pub fn fail_all(&mut self, error: &XmppError) {
        for (_, waiter) in self.join_waiters.drain() {
            let _ = waiter.send(Err(error.clone()));
        }
        for (_, waiter) in self.leave_waiters.drain() {
            let _ = waiter.send(Err(error.clone()));
        }
        self.departed.clear();
        self.rooms.clear();
    }

    /// Applies a confirmed affiliation change to the occupants with the
    /// target real address. Nothing is reported when the room already
    /// announced the change, as with the presence of a banned occupant.
    pub fn apply_affiliation(
        &mut self,
        room: &Jid,
        target: &Jid,
        affiliation: Affiliation,
    ) -> Vec<RoomEvent> {
        let key = room_key(room);
        let Some(room) = self.rooms.get_mut(&key) else {
            return Vec::new();
        };
        let mut events = Vec::new();
        let mut present = false;
        for occupant in room.occupants.values_mut() {
            let matches = occupant
                .jid
                .as_ref()
                .is_some_and(|jid| jid.bare() == target.bare());
            present |= matches;
            if matches && occupant.affiliation != affiliation {
                occupant.affiliation = affiliation;
                events.push(RoomEvent::new(
                    &key,
                    RoomEventKind::AffiliationChanged {
                        participant: Some(occupant.nickname.clone()),
                        jid: occupant.jid.clone(),
                        affiliation,
                        actor: None,
                        reason: None,
                    },
                ));
            }
        }
        let announced = self
            .departed
            .get(&key)
            .and_then(|departed| departed.get(target.bare()))
            == Some(&affiliation);
        if !present && !announced {
            events.push(RoomEvent::new(
                &key,
                RoomEventKind::AffiliationChanged {
                    participant: None,
                    jid: Some(target.to_bare()),
                    affiliation,
                    actor: None,
                    reason: None,
                },
            ));
        }
        events
    }

    /// Marks a room destroyed by our own request and removes it.
    pub fn destroyed(
        &mut self,
        room: &Jid,
        reason: Option<String>,
        alternate_room: Option<Jid>,
    ) -> Vec<RoomEvent> {
        let key = room_key(room);
        match self.remove(&key) {
            Some(_) => vec![RoomEvent::new(
                &key,
                RoomEventKind::Destroyed {
                    reason,
                    alternate_room,
                },
            )],
            None => Vec::new(),
        }
    }

    /// Processes a presence. Presences from rooms not in the table are
    /// ignored.
    pub fn handle_presence(&mut self, presence: &Presence) -> Vec<RoomEvent> {
        let Some(from) = presence.from() else {
            return Vec::new();
        };
        let key = room_key(from);
        let Some(nickname) = from.resourcepart() else {
            return Vec::new();
        };
        let Some(room) = self.rooms.get_mut(&key) else {
            return Vec::new();
        };

        if presence.presence_type() == PresenceType::Error {
            if let Some(waiter) = self.join_waiters.remove(&key) {
                let error = presence
                    .error()
                    .map(XmppError::from)
                    .unwrap_or_else(|| XmppError::from(ErrorCondition::new("cancel", "undefined-condition")));
                info!(room = %key, %error, "join failed");
                let _ = waiter.send(Err(error));
                self.rooms.remove(&key);
            }
            return Vec::new();
        }

        let user = MucUser::from_payloads(presence.payloads()).unwrap_or_default();
        let item = user.item().cloned().unwrap_or_default();
        let is_self = user.has_status(STATUS_SELF) || nickname == room.nickname;
        let mut events = Vec::new();

        if presence.presence_type() == PresenceType::Unavailable {
            if let Some((alternate_room, reason)) = user.destroy {
                room.state = RoomState::Destroyed;
                info!(room = %key, "room destroyed");
                events.push(RoomEvent::new(
                    &key,
                    RoomEventKind::Destroyed {
                        reason,
                        alternate_room,
                    },
                ));
                self.remove(&key);
                return events;
            }

            let removed = room.occupants.remove(nickname);
            let real_jid = item
                .jid
                .clone()
                .or_else(|| removed.as_ref().and_then(|occupant| occupant.jid.clone()));

            if user.has_status(STATUS_NICK_CHANGED) {
                if let Some(new_nickname) = item.nick {
                    if is_self {
                        room.nickname = new_nickname.clone();
                    }
                    if let Some(mut occupant) = removed {
                        occupant.nickname = new_nickname.clone();
                        room.occupants.insert(new_nickname.clone(), occupant);
                    }
                    events.push(RoomEvent::new(
                        &key,
                        RoomEventKind::NicknameChanged {
                            participant: nickname.to_string(),
                            new_nickname,
                        },
                    ));
                    return events;
                }
            }

            if let Some(real_jid) = real_jid {
                self.departed
                    .entry(key.clone())
                    .or_default()
                    .insert(real_jid.bare().to_string(), item.affiliation.unwrap_or(Affiliation::None));
            }
            let participant = nickname.to_string();
            let kind = if user.has_status(STATUS_KICKED) {
                RoomEventKind::Kicked {
                    participant,
                    actor: item.actor,
                    reason: item.reason.clone(),
                    is_self,
                }
            } else if user.has_status(STATUS_BANNED) {
                RoomEventKind::Banned {
                    participant,
                    actor: item.actor,
                    reason: item.reason.clone(),
                    is_self,
                }
            } else if user.has_status(STATUS_AFFILIATION_REMOVED) {
                RoomEventKind::ParticipantLeft {
                    participant,
                    reason: item
                        .reason
                        .clone()
                        .or_else(|| Some("removed by an affiliation change".to_string())),
                }
            } else if user.has_status(STATUS_MEMBERS_ONLY_REMOVED) {
                RoomEventKind::ParticipantLeft {
                    participant,
                    reason: item
                        .reason
                        .clone()
                        .or_else(|| Some("room is now members-only".to_string())),
                }
            } else {
                RoomEventKind::ParticipantLeft {
                    participant,
                    reason: presence.status(),
                }
            };
            let left_reason = match &kind {
                RoomEventKind::ParticipantLeft { reason, .. } => reason.clone(),
                _ => item.reason,
            };
            if !(is_self && matches!(kind, RoomEventKind::ParticipantLeft { .. })) {
                events.push(RoomEvent::new(&key, kind));
            }
            if is_self {
                room.state = RoomState::Left;
                debug!(room = %key, "left room");
                events.push(RoomEvent::new(
                    &key,
                    RoomEventKind::Left {
                        reason: left_reason,
                    },
                ));
                if let Some(waiter) = self.join_waiters.remove(&key) {
                    let _ = waiter.send(Err(XmppError::NotJoined(key.to_string())));
                }
                self.remove(&key);
            }
            return events;
        }

        let affiliation = item.affiliation.unwrap_or(Affiliation::None);
        let role = item.role.unwrap_or(Role::None);
        match room.occupants.get_mut(nickname) {
            Some(occupant) => {
                if occupant.affiliation != affiliation {
                    occupant.affiliation = affiliation;
                    events.push(RoomEvent::new(
                        &key,
                        RoomEventKind::AffiliationChanged {
                            participant: Some(nickname.to_string()),
                            jid: occupant.jid.clone(),
                            affiliation,
                            actor: item.actor.clone(),
                            reason: item.reason.clone(),
                        },
                    ));
                }
                if occupant.role != role {
                    occupant.role = role;
                    events.push(RoomEvent::new(
                        &key,
                        RoomEventKind::RoleChanged {
                            participant: nickname.to_string(),
                            role,
                            actor: item.actor.clone(),
                            reason: item.reason.clone(),
                        },
                    ));
                }
            }
            None => {
                room.occupants.insert(
                    nickname.to_string(),
                    Occupant {
                        nickname: nickname.to_string(),
                        jid: item.jid.clone(),
                        affiliation,
                        role,
                    },
                );
                if !is_self {
                    events.push(RoomEvent::new(
                        &key,
                        RoomEventKind::ParticipantJoined {
                            participant: nickname.to_string(),
                            jid: item.jid.clone(),
                            affiliation,
                            role,
                        },
                    ));
                }
            }
        }

        if is_self && room.state == RoomState::Joining {
            room.state = RoomState::Joined;
            // The server may have adjusted our nickname.
            room.nickname = nickname.to_string();
            let created = user.has_status(STATUS_CREATED);
            info!(room = %key, nickname, created, "joined room");
            events.push(RoomEvent::new(
                &key,
                RoomEventKind::Joined {
                    nickname: nickname.to_string(),
                    created,
                },
            ));
            if let Some(waiter) = self.join_waiters.remove(&key) {
                let _ = waiter.send(Ok(created));
            }
        }
        events
    }

    /// Processes a message: subject changes of joined rooms, and
    /// mediated invitations or declines from any room.
    pub fn handle_message(&mut self, message: &Message) -> Vec<RoomEvent> {
        let Some(from) = message.from() else {
            return Vec::new();
        };
        let key = room_key(from);
        let mut events = Vec::new();

        if message.message_type() == MessageType::Groupchat && message.body().is_none() {
            if let (Some(subject), Some(room)) =
                (stanzas::message_subject(message), self.rooms.get_mut(&key))
            {
                room.subject = Some(subject.clone());
                events.push(RoomEvent::new(
                    &key,
                    RoomEventKind::SubjectChanged {
                        subject,
                        actor: from.resourcepart().map(str::to_string),
                    },
                ));
            }
            return events;
        }

        if let Some(user) = MucUser::from_payloads(message.payloads()) {
            if let Some((inviter, reason)) = user.invite {
                events.push(RoomEvent::new(
                    &key,
                    RoomEventKind::InvitationReceived {
                        inviter,
                        reason,
                        password: user.password,
                    },
                ));
            } else if let Some((invitee, reason)) = user.decline {
                events.push(RoomEvent::new(
                    &key,
                    RoomEventKind::InvitationDeclined { invitee, reason },
                ));
            }
        }
        events
    }
}
