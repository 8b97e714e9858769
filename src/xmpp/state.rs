/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::fmt::Display;

use serde::Serialize;
use tracing::debug;
use tracing::warn;

/// Lifecycle of a client connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// TCP is up, stream negotiation is in progress.
    Connected,
    Authenticating,
    Ready,
    AuthFailed,
    Error,
    /// A ready connection was closed by the peer or the network.
    ConnectionLost,
}

impl ConnectionState {
    /// Stable integer code for bridges.
    pub fn code(&self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Ready => 2,
            ConnectionState::Authenticating => 3,
            ConnectionState::Error => 4,
            ConnectionState::AuthFailed => 5,
            ConnectionState::ConnectionLost => 6,
            ConnectionState::Connected => 7,
        }
    }

    pub fn from_code(code: u8) -> Option<ConnectionState> {
        Some(match code {
            0 => ConnectionState::Disconnected,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Ready,
            3 => ConnectionState::Authenticating,
            4 => ConnectionState::Error,
            5 => ConnectionState::AuthFailed,
            6 => ConnectionState::ConnectionLost,
            7 => ConnectionState::Connected,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Ready => "ready",
            ConnectionState::AuthFailed => "auth-failed",
            ConnectionState::Error => "error",
            ConnectionState::ConnectionLost => "connection-lost",
        }
    }

    /// True for the states from which `connect()` may start over.
    pub fn is_idle(&self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected
                | ConnectionState::Error
                | ConnectionState::AuthFailed
                | ConnectionState::ConnectionLost
        )
    }

    /// True while a connection attempt is in progress.
    pub fn is_negotiating(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Authenticating
        )
    }

    fn allows(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (*self, next) {
            (from, Connecting) => from.is_idle(),
            (Connecting, Connected) => true,
            (Connected, Authenticating) => true,
            (Authenticating, Ready) => true,
            (Authenticating, AuthFailed) => true,
            (from, Error) => from.is_negotiating() || from == Ready,
            (Ready, ConnectionLost) => true,
            (from, Disconnected) => from.is_negotiating() || from == Ready,
            _ => false,
        }
    }
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Holds the current state and rejects invalid transitions.
#[derive(Debug)]
pub struct StateMachine {
    state: ConnectionState,
}

impl StateMachine {
    pub fn new() -> Self {
        StateMachine {
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Moves to `next`. Returns false and keeps the current state when
    /// the transition is not allowed.
    pub fn transition(&mut self, next: ConnectionState) -> bool {
        if !self.state.allows(next) {
            warn!(from = %self.state, to = %next, "rejected state transition");
            return false;
        }
        debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
        true
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
