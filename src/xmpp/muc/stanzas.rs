/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use crate::Element;
use crate::xmpp::Iq;
use crate::xmpp::Jid;
use crate::xmpp::Message;
use crate::xmpp::MessageType;
use crate::xmpp::Presence;
use crate::xmpp::PresenceType;
use crate::xmpp::XmppError;
use crate::xmpp::constants::CLIENT_NS;
use crate::xmpp::constants::DATA_FORMS_NS;
use crate::xmpp::constants::MUC_ADMIN_NS;
use crate::xmpp::constants::MUC_NS;
use crate::xmpp::constants::MUC_OWNER_NS;
use crate::xmpp::constants::MUC_USER_NS;

use super::Affiliation;
use super::History;
use super::Role;

pub(crate) const STATUS_SELF: u16 = 110;
pub(crate) const STATUS_CREATED: u16 = 201;
pub(crate) const STATUS_BANNED: u16 = 301;
pub(crate) const STATUS_NICK_CHANGED: u16 = 303;
pub(crate) const STATUS_KICKED: u16 = 307;
pub(crate) const STATUS_AFFILIATION_REMOVED: u16 = 321;
pub(crate) const STATUS_MEMBERS_ONLY_REMOVED: u16 = 322;

fn occupant(room: &Jid, nickname: &str) -> Result<Jid, XmppError> {
    if nickname.trim().is_empty() {
        return Err(XmppError::InvalidArgument("nickname is empty".to_string()));
    }
    Ok(room.with_resource(nickname)?)
}

fn text_element(name: &str, namespace: &str, text: &str) -> Element {
    Element::new(name, namespace).with_text(text)
}

pub fn join_presence(
    room: &Jid,
    nickname: &str,
    password: Option<&str>,
    history: &History,
) -> Result<Presence, XmppError> {
    let mut x = Element::new("x", MUC_NS);
    if let Some(history) = history.to_element() {
        x.append_child(history);
    }
    if let Some(password) = password {
        x.append_child(text_element("password", MUC_NS, password));
    }
    Ok(Presence::available()
        .with_to(occupant(room, nickname)?)
        .with_payload(x))
}

pub fn leave_presence(room: &Jid, nickname: &str) -> Result<Presence, XmppError> {
    Ok(Presence::new(PresenceType::Unavailable).with_to(occupant(room, nickname)?))
}

pub fn nickname_presence(room: &Jid, nickname: &str) -> Result<Presence, XmppError> {
    Ok(Presence::available().with_to(occupant(room, nickname)?))
}

pub fn groupchat(room: &Jid, body: &str) -> Message {
    Message::groupchat(room.clone(), body)
}

pub fn private_message(room: &Jid, nickname: &str, body: &str) -> Result<Message, XmppError> {
    Ok(Message::chat(occupant(room, nickname)?, body).with_payload(Element::new("x", MUC_USER_NS)))
}

pub fn subject(room: &Jid, subject: &str) -> Message {
    Message::new(MessageType::Groupchat)
        .with_to(room.clone())
        .with_subject(subject)
}

/// A mediated invitation, sent through the room.
pub fn invite(room: &Jid, invitee: &Jid, reason: Option<&str>) -> Message {
    let mut invite = Element::new("invite", MUC_USER_NS).with_attribute("to", invitee.full());
    if let Some(reason) = reason {
        invite.append_child(text_element("reason", MUC_USER_NS, reason));
    }
    Message::new(MessageType::Normal)
        .with_to(room.clone())
        .with_payload(Element::new("x", MUC_USER_NS).with_child(invite))
}

pub fn decline(room: &Jid, inviter: &Jid, reason: Option<&str>) -> Message {
    let mut decline = Element::new("decline", MUC_USER_NS).with_attribute("to", inviter.full());
    if let Some(reason) = reason {
        decline.append_child(text_element("reason", MUC_USER_NS, reason));
    }
    Message::new(MessageType::Normal)
        .with_to(room.clone())
        .with_payload(Element::new("x", MUC_USER_NS).with_child(decline))
}

/// Who an admin item is about.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AdminItem {
    Role { nickname: String, role: Role },
    Affiliation { jid: Jid, affiliation: Affiliation },
}

pub fn admin_iq(id: &str, room: &Jid, item: &AdminItem, reason: Option<&str>) -> Iq {
    let mut element = Element::new("item", MUC_ADMIN_NS);
    match item {
        AdminItem::Role { nickname, role } => {
            element.set_attribute("nick", nickname.as_str());
            element.set_attribute("role", role.as_str());
        }
        AdminItem::Affiliation { jid, affiliation } => {
            element.set_attribute("affiliation", affiliation.as_str());
            element.set_attribute("jid", jid.bare());
        }
    }
    if let Some(reason) = reason {
        element.append_child(text_element("reason", MUC_ADMIN_NS, reason));
    }
    Iq::set(id, Element::new("query", MUC_ADMIN_NS).with_child(element)).with_to(room.clone())
}

/// Accepts the default configuration of a newly created room.
pub fn instant_room_iq(id: &str, room: &Jid) -> Iq {
    let form = Element::new("x", DATA_FORMS_NS).with_attribute("type", "submit");
    Iq::set(id, Element::new("query", MUC_OWNER_NS).with_child(form)).with_to(room.clone())
}

pub fn destroy_iq(id: &str, room: &Jid, reason: Option<&str>, alternate: Option<&Jid>) -> Iq {
    let mut destroy = Element::new("destroy", MUC_OWNER_NS);
    if let Some(alternate) = alternate {
        destroy.set_attribute("jid", alternate.bare());
    }
    if let Some(reason) = reason {
        destroy.append_child(text_element("reason", MUC_OWNER_NS, reason));
    }
    Iq::set(id, Element::new("query", MUC_OWNER_NS).with_child(destroy)).with_to(room.clone())
}

/// An `<item/>` of a `muc#user` payload.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UserItem {
    pub affiliation: Option<Affiliation>,
    pub role: Option<Role>,
    pub jid: Option<Jid>,
    pub nick: Option<String>,
    pub actor: Option<String>,
    pub reason: Option<String>,
}

impl UserItem {
    fn parse(item: &Element) -> UserItem {
        let actor = item.get_child("actor", MUC_USER_NS).and_then(|actor| {
            actor
                .attribute("nick")
                .or_else(|| actor.attribute("jid"))
                .map(str::to_string)
        });
        UserItem {
            affiliation: item.attribute("affiliation").and_then(Affiliation::parse),
            role: item.attribute("role").and_then(Role::parse),
            jid: item.attribute("jid").and_then(|jid| Jid::new(jid).ok()),
            nick: item.attribute("nick").map(str::to_string),
            actor,
            reason: item.child_text("reason", MUC_USER_NS),
        }
    }
}

/// A decoded `<x xmlns='http://jabber.org/protocol/muc#user'/>`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MucUser {
    pub statuses: Vec<u16>,
    pub items: Vec<UserItem>,
    /// Present when the room was destroyed: (alternate room, reason).
    pub destroy: Option<(Option<Jid>, Option<String>)>,
    pub invite: Option<(Option<Jid>, Option<String>)>,
    pub decline: Option<(Option<Jid>, Option<String>)>,
    pub password: Option<String>,
}

fn addressed(element: &Element, attribute: &str) -> (Option<Jid>, Option<String>) {
    (
        element
            .attribute(attribute)
            .and_then(|jid| Jid::new(jid).ok()),
        element.child_text("reason", MUC_USER_NS),
    )
}

impl MucUser {
    pub fn from_payloads(payloads: &[Element]) -> Option<MucUser> {
        let x = payloads.iter().find(|e| e.is("x", MUC_USER_NS))?;
        Some(MucUser {
            statuses: x
                .get_children("status", MUC_USER_NS)
                .filter_map(|s| s.attribute("code")?.parse().ok())
                .collect(),
            items: x.get_children("item", MUC_USER_NS).map(UserItem::parse).collect(),
            destroy: x
                .get_child("destroy", MUC_USER_NS)
                .map(|d| addressed(d, "jid")),
            invite: x.get_child("invite", MUC_USER_NS).map(|i| addressed(i, "from")),
            decline: x.get_child("decline", MUC_USER_NS).map(|d| addressed(d, "from")),
            password: x.child_text("password", MUC_USER_NS),
        })
    }

    pub fn has_status(&self, code: u16) -> bool {
        self.statuses.contains(&code)
    }

    pub fn item(&self) -> Option<&UserItem> {
        self.items.first()
    }
}

/// The `<subject/>` of a groupchat message, present even when empty.
pub fn message_subject(message: &Message) -> Option<String> {
    message
        .payloads()
        .iter()
        .find(|e| e.is("subject", CLIENT_NS))
        .map(Element::text)
}
