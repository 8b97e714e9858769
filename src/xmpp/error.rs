/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use thiserror::Error;

use crate::Location;
use crate::SaxError;

use super::jid::BadJid;
use super::stanza::BadStanza;

fn with_text(condition: &str, text: &Option<String>) -> String {
    match text {
        Some(text) => format!("{condition}: {text}"),
        None => condition.to_string(),
    }
}

/// Error type of every command of the client.
///
/// Connection fatal errors ([is_connection_fatal()](XmppError::is_connection_fatal))
/// tear down the connection; the rest only fail the command which
/// caused them.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum XmppError {
    #[error("network error: {0}")]
    Network(String),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("authentication failed: {}", with_text(.condition, .text))]
    AuthFailed {
        condition: String,
        text: Option<String>,
    },

    #[error("malformed xml: {0}")]
    MalformedXml(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not joined to room {0}")]
    NotJoined(String),

    #[error("not connected")]
    NotConnected,

    #[error("operation timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,

    /// The peer answered with an error stanza.
    #[error("stanza error: {}", with_text(.condition, .text))]
    StanzaError {
        condition: String,
        text: Option<String>,
    },
}

impl XmppError {
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            XmppError::Network(_)
                | XmppError::Tls(_)
                | XmppError::AuthFailed { .. }
                | XmppError::MalformedXml(_)
        )
    }

    pub(crate) fn auth_failed(condition: impl Into<String>) -> XmppError {
        XmppError::AuthFailed {
            condition: condition.into(),
            text: None,
        }
    }
}

impl From<std::io::Error> for XmppError {
    fn from(err: std::io::Error) -> Self {
        XmppError::Network(err.to_string())
    }
}

impl From<BadJid> for XmppError {
    fn from(err: BadJid) -> Self {
        XmppError::InvalidArgument(err.to_string())
    }
}

impl From<BadStanza> for XmppError {
    fn from(err: BadStanza) -> Self {
        XmppError::InvalidArgument(err.to_string())
    }
}

impl From<StreamError> for XmppError {
    fn from(err: StreamError) -> Self {
        XmppError::MalformedXml(err.to_string())
    }
}

/// Error from decoding the inbound stream.
#[derive(Debug, Eq, PartialEq, Clone, Error)]
pub enum StreamError {
    #[error("{error} at {location}")]
    BadXml { error: SaxError, location: Location },

    #[error("invalid stream protocol: {0}")]
    BadStream(&'static str),
}

pub(super) mod description {
    pub(in super::super) const NO_STREAM_HEADER: &str = "stream does not start with a stream tag";
    pub(in super::super) const REUSE_AFTER_END: &str = "stream is already closed";
}
