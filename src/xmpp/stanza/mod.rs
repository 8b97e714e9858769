/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod error;

use std::fmt::Display;

pub use error::BadStanza;
use error::description;

use crate::Element;
use crate::xmpp::Jid;
use crate::xmpp::XmppError;
use crate::xmpp::constants::CLIENT_NS;
use crate::xmpp::constants::STANZAS_NS;

/// Generates a unique stanza id.
pub fn generate_id() -> String {
    format!("fx{}", uuid::Uuid::new_v4().simple())
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum StanzaKind {
    Message,
    Presence,
    Iq,
}

impl StanzaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StanzaKind::Message => "message",
            StanzaKind::Presence => "presence",
            StanzaKind::Iq => "iq",
        }
    }

    fn from_name(name: &str) -> Option<StanzaKind> {
        match name {
            "message" => Some(StanzaKind::Message),
            "presence" => Some(StanzaKind::Presence),
            "iq" => Some(StanzaKind::Iq),
            _ => None,
        }
    }
}

impl Display for StanzaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! stanza_type {
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

            fn parse(text: &str) -> Result<$name, BadStanza> {
                match text {
                    $($text => Ok($name::$variant)),+,
                    _ => Err(BadStanza::Invalid(description::BAD_TYPE)),
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

stanza_type!(MessageType {
    Normal => "normal",
    Chat => "chat",
    Groupchat => "groupchat",
    Headline => "headline",
    Error => "error",
});

stanza_type!(
    /// Presence type; `Available` is the absence of the type attribute.
    PresenceType {
        Available => "available",
        Unavailable => "unavailable",
        Subscribe => "subscribe",
        Subscribed => "subscribed",
        Unsubscribe => "unsubscribe",
        Unsubscribed => "unsubscribed",
        Probe => "probe",
        Error => "error",
    }
);

stanza_type!(IqType {
    Get => "get",
    Set => "set",
    Result => "result",
    Error => "error",
});

/// Parsed content of an `<error/>` child.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ErrorCondition {
    /// The `type` attribute: cancel, continue, modify, auth or wait.
    pub error_type: String,
    /// Local name of the defined condition element, like `forbidden`.
    pub condition: String,
    pub text: Option<String>,
}

impl ErrorCondition {
    pub fn new(error_type: &str, condition: &str) -> ErrorCondition {
        ErrorCondition {
            error_type: error_type.to_string(),
            condition: condition.to_string(),
            text: None,
        }
    }

    pub fn from_element(error: &Element) -> ErrorCondition {
        let condition = error
            .elements()
            .find(|e| e.namespace() == STANZAS_NS && e.name() != "text")
            .map_or("undefined-condition", Element::name);
        ErrorCondition {
            error_type: error.attribute("type").unwrap_or("cancel").to_string(),
            condition: condition.to_string(),
            text: error.child_text("text", STANZAS_NS),
        }
    }

    pub fn to_element(&self) -> Element {
        let mut error = Element::new("error", CLIENT_NS)
            .with_attribute("type", self.error_type.as_str())
            .with_child(Element::new(self.condition.as_str(), STANZAS_NS));
        if let Some(text) = &self.text {
            error.append_child(Element::new("text", STANZAS_NS).with_text(text));
        }
        error
    }
}

impl From<ErrorCondition> for XmppError {
    fn from(err: ErrorCondition) -> Self {
        XmppError::StanzaError {
            condition: err.condition,
            text: err.text,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct Header {
    id: Option<String>,
    from: Option<Jid>,
    to: Option<Jid>,
    extra: Vec<(String, String)>,
}

impl Header {
    fn parse(element: &Element) -> Result<(Header, Option<String>), BadStanza> {
        let mut header = Header::default();
        let mut kind = None;
        for (name, value) in element.attributes() {
            match name {
                "id" => header.id = Some(value.to_string()),
                "from" => header.from = Some(Jid::new(value)?),
                "to" => header.to = Some(Jid::new(value)?),
                "type" => kind = Some(value.to_string()),
                _ => header.extra.push((name.to_string(), value.to_string())),
            }
        }
        Ok((header, kind))
    }

    fn write(&self, element: &mut Element, kind: Option<&str>) {
        if let Some(from) = &self.from {
            element.set_attribute("from", from.full());
        }
        if let Some(to) = &self.to {
            element.set_attribute("to", to.full());
        }
        if let Some(kind) = kind {
            element.set_attribute("type", kind);
        }
        if let Some(id) = &self.id {
            element.set_attribute("id", id.as_str());
        }
        for (name, value) in &self.extra {
            element.set_attribute(name.as_str(), value.as_str());
        }
    }
}

fn payloads(element: Element) -> Vec<Element> {
    element.elements().cloned().collect()
}

macro_rules! common_accessors {
    () => {
        pub fn from(&self) -> Option<&Jid> {
            self.header.from.as_ref()
        }

        pub fn to(&self) -> Option<&Jid> {
            self.header.to.as_ref()
        }

        /// Value of an attribute not modelled by the type.
        pub fn extra_attribute(&self, name: &str) -> Option<&str> {
            self.header
                .extra
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str())
        }

        /// Child elements in document order.
        pub fn payloads(&self) -> &[Element] {
            &self.payloads
        }

        pub fn payload(&self, name: &str, namespace: &str) -> Option<&Element> {
            self.payloads.iter().find(|e| e.is(name, namespace))
        }

        pub fn with_from(mut self, from: Jid) -> Self {
            self.header.from = Some(from);
            self
        }

        pub fn with_to(mut self, to: Jid) -> Self {
            self.header.to = Some(to);
            self
        }

        pub fn with_payload(mut self, payload: Element) -> Self {
            self.payloads.push(payload);
            self
        }

        pub fn with_extra_attribute(mut self, name: &str, value: &str) -> Self {
            self.header.extra.retain(|(n, _)| n != name);
            self.header.extra.push((name.to_string(), value.to_string()));
            self
        }

        /// Parsed `<error/>` child, if there is one.
        pub fn error(&self) -> Option<ErrorCondition> {
            self.payload("error", CLIENT_NS)
                .map(ErrorCondition::from_element)
        }
    };
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    header: Header,
    kind: Option<MessageType>,
    payloads: Vec<Element>,
}

impl Message {
    pub fn new(kind: MessageType) -> Message {
        Message {
            header: Header::default(),
            kind: Some(kind),
            payloads: Vec::new(),
        }
    }

    pub fn chat(to: Jid, body: &str) -> Message {
        Message::new(MessageType::Chat).with_to(to).with_body(body)
    }

    pub fn groupchat(to: Jid, body: &str) -> Message {
        Message::new(MessageType::Groupchat).with_to(to).with_body(body)
    }

    common_accessors!();

    pub fn id(&self) -> Option<&str> {
        self.header.id.as_deref()
    }

    pub fn with_id(mut self, id: &str) -> Message {
        self.header.id = Some(id.to_string());
        self
    }

    pub fn message_type(&self) -> MessageType {
        self.kind.unwrap_or(MessageType::Normal)
    }

    pub fn body(&self) -> Option<String> {
        self.payload("body", CLIENT_NS).map(Element::text)
    }

    pub fn subject(&self) -> Option<String> {
        self.payload("subject", CLIENT_NS).map(Element::text)
    }

    pub fn thread(&self) -> Option<String> {
        self.payload("thread", CLIENT_NS).map(Element::text)
    }

    pub fn with_body(self, body: &str) -> Message {
        self.with_payload(Element::new("body", CLIENT_NS).with_text(body))
    }

    pub fn with_subject(self, subject: &str) -> Message {
        self.with_payload(Element::new("subject", CLIENT_NS).with_text(subject))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Presence {
    header: Header,
    kind: Option<PresenceType>,
    payloads: Vec<Element>,
}

impl Presence {
    pub fn new(kind: PresenceType) -> Presence {
        Presence {
            header: Header::default(),
            kind: match kind {
                PresenceType::Available => None,
                kind => Some(kind),
            },
            payloads: Vec::new(),
        }
    }

    pub fn available() -> Presence {
        Presence::new(PresenceType::Available)
    }

    pub fn unavailable() -> Presence {
        Presence::new(PresenceType::Unavailable)
    }

    common_accessors!();

    pub fn id(&self) -> Option<&str> {
        self.header.id.as_deref()
    }

    pub fn with_id(mut self, id: &str) -> Presence {
        self.header.id = Some(id.to_string());
        self
    }

    pub fn presence_type(&self) -> PresenceType {
        self.kind.unwrap_or(PresenceType::Available)
    }

    pub fn show(&self) -> Option<String> {
        self.payload("show", CLIENT_NS).map(Element::text)
    }

    pub fn status(&self) -> Option<String> {
        self.payload("status", CLIENT_NS).map(Element::text)
    }

    pub fn with_show(self, show: &str) -> Presence {
        self.with_payload(Element::new("show", CLIENT_NS).with_text(show))
    }

    pub fn with_status(self, status: &str) -> Presence {
        self.with_payload(Element::new("status", CLIENT_NS).with_text(status))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Iq {
    header: Header,
    kind: IqType,
    payloads: Vec<Element>,
}

impl Iq {
    pub fn new(kind: IqType, id: &str) -> Iq {
        Iq {
            header: Header {
                id: Some(id.to_string()),
                ..Header::default()
            },
            kind,
            payloads: Vec::new(),
        }
    }

    pub fn get(id: &str, payload: Element) -> Iq {
        Iq::new(IqType::Get, id).with_payload(payload)
    }

    pub fn set(id: &str, payload: Element) -> Iq {
        Iq::new(IqType::Set, id).with_payload(payload)
    }

    common_accessors!();

    pub fn id(&self) -> &str {
        self.header.id.as_deref().unwrap_or_default()
    }

    pub fn with_id(mut self, id: &str) -> Iq {
        self.header.id = Some(id.to_string());
        self
    }

    pub fn iq_type(&self) -> IqType {
        self.kind
    }

    pub fn is_response(&self) -> bool {
        matches!(self.kind, IqType::Result | IqType::Error)
    }

    /// The first child which is not an `<error/>`.
    pub fn query(&self) -> Option<&Element> {
        self.payloads.iter().find(|e| !e.is("error", CLIENT_NS))
    }

    /// Creates an empty result addressed back to the sender.
    pub fn make_result(&self) -> Iq {
        let mut result = Iq::new(IqType::Result, self.id());
        result.header.to = self.header.from.clone();
        result
    }

    /// Creates an error response addressed back to the sender.
    pub fn make_error(&self, condition: &ErrorCondition) -> Iq {
        let mut result = Iq::new(IqType::Error, self.id()).with_payload(condition.to_element());
        result.header.to = self.header.from.clone();
        result
    }
}

/// A top level XMPP unit.
///
/// Stanzas are values: builder methods consume and return a new stanza
/// instead of changing one in place.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Stanza {
    Message(Message),
    Presence(Presence),
    Iq(Iq),
}

impl Stanza {
    /// Parses a standalone stanza. Unprefixed elements without a
    /// namespace declaration are taken to be in `jabber:client`.
    pub fn from_xml(xml: &str) -> Result<Stanza, BadStanza> {
        Stanza::try_from(Element::parse_in(xml, CLIENT_NS)?)
    }

    pub fn kind(&self) -> StanzaKind {
        match self {
            Stanza::Message(_) => StanzaKind::Message,
            Stanza::Presence(_) => StanzaKind::Presence,
            Stanza::Iq(_) => StanzaKind::Iq,
        }
    }

    fn header(&self) -> &Header {
        match self {
            Stanza::Message(message) => &message.header,
            Stanza::Presence(presence) => &presence.header,
            Stanza::Iq(iq) => &iq.header,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.header().id.as_deref()
    }

    pub fn from(&self) -> Option<&Jid> {
        self.header().from.as_ref()
    }

    pub fn to(&self) -> Option<&Jid> {
        self.header().to.as_ref()
    }

    pub fn payloads(&self) -> &[Element] {
        match self {
            Stanza::Message(message) => &message.payloads,
            Stanza::Presence(presence) => &presence.payloads,
            Stanza::Iq(iq) => &iq.payloads,
        }
    }

    /// True if any child element is in `namespace`.
    pub fn has_payload_ns(&self, namespace: &str) -> bool {
        self.payloads().iter().any(|e| e.namespace() == namespace)
    }

    /// The `type` attribute as it appears on the wire, if any.
    pub fn type_str(&self) -> Option<&'static str> {
        match self {
            Stanza::Message(message) => message.kind.map(|k| k.as_str()),
            Stanza::Presence(presence) => presence.kind.map(|k| k.as_str()),
            Stanza::Iq(iq) => Some(iq.kind.as_str()),
        }
    }

    pub fn to_element(&self) -> Element {
        let mut element = Element::new(self.kind().as_str(), CLIENT_NS);
        self.header().write(&mut element, self.type_str());
        for payload in self.payloads() {
            element.append_child(payload.clone());
        }
        element
    }

    /// Serializes the stanza as it is sent inside a client stream.
    pub fn to_xml(&self) -> String {
        self.to_element().to_xml_in(CLIENT_NS)
    }
}

impl Display for Stanza {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_xml())
    }
}

impl TryFrom<Element> for Stanza {
    type Error = BadStanza;

    fn try_from(element: Element) -> Result<Self, Self::Error> {
        let kind = StanzaKind::from_name(element.name())
            .ok_or(BadStanza::Invalid(description::NOT_A_STANZA))?;
        if element.namespace() != CLIENT_NS {
            return Err(BadStanza::Invalid(description::WRONG_NAMESPACE));
        }
        let (header, type_attr) = Header::parse(&element)?;
        let type_attr = type_attr.as_deref();
        Ok(match kind {
            StanzaKind::Message => Stanza::Message(Message {
                header,
                kind: type_attr.map(MessageType::parse).transpose()?,
                payloads: payloads(element),
            }),
            StanzaKind::Presence => {
                let kind = match type_attr {
                    // "available" is not a wire value
                    Some("available") => return Err(BadStanza::Invalid(description::BAD_TYPE)),
                    Some(text) => Some(PresenceType::parse(text)?),
                    None => None,
                };
                Stanza::Presence(Presence {
                    header,
                    kind,
                    payloads: payloads(element),
                })
            }
            StanzaKind::Iq => {
                if header.id.is_none() {
                    return Err(BadStanza::Invalid(description::IQ_WITHOUT_ID));
                }
                let kind = IqType::parse(
                    type_attr.ok_or(BadStanza::Invalid(description::IQ_WITHOUT_TYPE))?,
                )?;
                Stanza::Iq(Iq {
                    header,
                    kind,
                    payloads: payloads(element),
                })
            }
        })
    }
}

impl From<&Stanza> for Element {
    fn from(stanza: &Stanza) -> Self {
        stanza.to_element()
    }
}

impl From<Message> for Stanza {
    fn from(message: Message) -> Self {
        Stanza::Message(message)
    }
}

impl From<Presence> for Stanza {
    fn from(presence: Presence) -> Self {
        Stanza::Presence(presence)
    }
}

impl From<Iq> for Stanza {
    fn from(iq: Iq) -> Self {
        Stanza::Iq(iq)
    }
}
