/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

//! XMPP client: stream codec, connection negotiation, stanza routing
//! and multi-user chat.

mod client;
mod config;
pub(crate) mod constants;
mod error;
mod event;
mod jid;
pub mod muc;
mod parser;
mod protocol;
mod reconnect;
mod router;
mod sasl;
mod stanza;
mod state;
mod transport;

pub use client::IqRequest;
pub use client::XmppClient;
pub use config::ConnectOptions;
pub use config::ConnectionConfig;
pub use config::ConnectionConfigBuilder;
pub use config::Credentials;
pub use config::JoinOptions;
pub use config::SecurityMode;
pub use error::StreamError;
pub use error::XmppError;
pub use event::Event;
pub use event::EventCategory;
pub use event::Events;
pub use event::RoomEvent;
pub use event::RoomEventKind;
pub use jid::BadJid;
pub use jid::Jid;
pub use muc::Affiliation;
pub use muc::History;
pub use muc::MucManager;
pub use muc::Occupant;
pub use muc::Role;
pub use muc::Room;
pub use muc::RoomState;
pub use parser::STREAM_FOOTER;
pub use parser::StreamEvent;
pub use parser::StreamParser;
pub use parser::serialize;
pub use parser::stream_header;
pub use protocol::Features;
pub use protocol::Session;
pub use protocol::negotiate;
pub use reconnect::ReconnectPolicy;
pub use router::FnHandler;
pub use router::Filter;
pub use router::HandlerError;
pub use router::IqResult;
pub use router::PendingTable;
pub use router::Router;
pub use router::StanzaHandler;
pub use router::SubscriptionId;
pub use stanza::BadStanza;
pub use stanza::ErrorCondition;
pub use stanza::Iq;
pub use stanza::IqType;
pub use stanza::Message;
pub use stanza::MessageType;
pub use stanza::Presence;
pub use stanza::PresenceType;
pub use stanza::Stanza;
pub use stanza::StanzaKind;
pub use stanza::generate_id;
pub use state::ConnectionState;
pub use state::StateMachine;
pub use transport::Connector;
pub use transport::NetworkStream;
pub use transport::TcpConnector;
pub use transport::Transport;
pub use transport::TrustPolicy;
pub use transport::tls_config;

#[cfg(test)]
mod testing;

#[cfg(test)]
mod tests;
