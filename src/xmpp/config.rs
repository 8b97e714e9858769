/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde::Serialize;

use super::Jid;
use super::TrustPolicy;
use super::XmppError;
use super::constants::CLIENT_PORT;
use super::constants::DEFAULT_CONNECT_TIMEOUT;
use super::constants::DEFAULT_IQ_TIMEOUT;
use super::constants::DEFAULT_MAX_STANZA_SIZE;
use super::constants::DEFAULT_RESOURCE;
use super::muc::History;

/// Whether the stream must, may or must not be encrypted with STARTTLS.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SecurityMode {
    #[default]
    Required,
    Allowed,
    Disabled,
}

#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Credentials {
        Credentials {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<hidden>")
            .finish()
    }
}

/// Everything needed to establish one connection.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub domain: String,
    pub resource: String,
    pub security: SecurityMode,
    pub credentials: Credentials,
    pub trust: TrustPolicy,
    /// Bound for the whole negotiation, from TCP connect to bind.
    pub connect_timeout: Duration,
    pub iq_timeout: Duration,
    pub max_stanza_size: usize,
}

impl ConnectionConfig {
    pub fn builder(domain: &str, username: &str, password: &str) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new(domain, username, password)
    }

    /// The account address, without a resource.
    pub fn jid(&self) -> Result<Jid, XmppError> {
        Ok(Jid::from_parts(
            Some(self.credentials.username.as_str()),
            &self.domain,
            None,
        )?)
    }
}

pub struct ConnectionConfigBuilder {
    host: Option<String>,
    port: u16,
    domain: String,
    resource: String,
    security: SecurityMode,
    credentials: Credentials,
    trust: TrustPolicy,
    connect_timeout: Duration,
    iq_timeout: Duration,
    max_stanza_size: usize,
}

impl ConnectionConfigBuilder {
    pub fn new(domain: &str, username: &str, password: &str) -> Self {
        ConnectionConfigBuilder {
            host: None,
            port: CLIENT_PORT,
            domain: domain.to_string(),
            resource: DEFAULT_RESOURCE.to_string(),
            security: SecurityMode::default(),
            credentials: Credentials::new(username, password),
            trust: TrustPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            iq_timeout: DEFAULT_IQ_TIMEOUT,
            max_stanza_size: DEFAULT_MAX_STANZA_SIZE,
        }
    }

    /// Takes the domain, username and resource from a JID.
    pub fn from_jid(jid: &Jid, password: &str) -> Self {
        let mut builder =
            ConnectionConfigBuilder::new(jid.domainpart(), jid.localpart().unwrap_or_default(), password);
        if let Some(resource) = jid.resourcepart() {
            builder.resource = resource.to_string();
        }
        builder
    }

    /// Server host name or address, the domain is used if not given.
    pub fn host(mut self, host: Option<String>) -> Self {
        self.host = host.filter(|host| !host.is_empty());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn resource(mut self, resource: &str) -> Self {
        self.resource = resource.to_string();
        self
    }

    pub fn security(mut self, security: SecurityMode) -> Self {
        self.security = security;
        self
    }

    pub fn trust(mut self, trust: TrustPolicy) -> Self {
        self.trust = trust;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn iq_timeout(mut self, timeout: Duration) -> Self {
        self.iq_timeout = timeout;
        self
    }

    pub fn max_stanza_size(mut self, size: usize) -> Self {
        self.max_stanza_size = size;
        self
    }

    pub fn build(self) -> Result<ConnectionConfig, XmppError> {
        if self.credentials.username.is_empty() {
            return Err(XmppError::InvalidArgument("username is empty".to_string()));
        }
        // Validates the account address and resource in one go.
        Jid::from_parts(
            Some(self.credentials.username.as_str()),
            &self.domain,
            Some(self.resource.as_str()),
        )?;
        if self.port == 0 {
            return Err(XmppError::InvalidArgument("port is zero".to_string()));
        }
        Ok(ConnectionConfig {
            host: self.host.unwrap_or_else(|| self.domain.clone()),
            port: self.port,
            domain: self.domain.to_ascii_lowercase(),
            resource: self.resource,
            security: self.security,
            credentials: self.credentials,
            trust: self.trust,
            connect_timeout: self.connect_timeout,
            iq_timeout: self.iq_timeout,
            max_stanza_size: self.max_stanza_size,
        })
    }
}

/// Connection options in the form a bridge sends them.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectOptions {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub domain: String,
    pub username: String,
    pub password: String,
    /// Older form of `security_mode`: true is required, false disabled.
    #[serde(rename = "useSSL")]
    pub use_ssl: Option<bool>,
    pub allow_self_signed_certificates: bool,
    pub resource: Option<String>,
    pub security_mode: Option<SecurityMode>,
    /// Base64 encoded DER certificate.
    pub pinned_certificate: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub iq_timeout_secs: Option<u64>,
}

impl TryFrom<ConnectOptions> for ConnectionConfig {
    type Error = XmppError;

    fn try_from(options: ConnectOptions) -> Result<Self, Self::Error> {
        let security = match (options.security_mode, options.use_ssl) {
            (Some(mode), _) => mode,
            (None, Some(false)) => SecurityMode::Disabled,
            (None, _) => SecurityMode::Required,
        };
        let trust = match (&options.pinned_certificate, options.allow_self_signed_certificates) {
            (Some(pinned), _) => TrustPolicy::Pinned(STANDARD.decode(pinned.trim()).map_err(
                |err| XmppError::InvalidArgument(format!("pinnedCertificate: {err}")),
            )?),
            (None, true) => TrustPolicy::AcceptAll,
            (None, false) => TrustPolicy::SystemDefault,
        };
        let mut builder = ConnectionConfig::builder(&options.domain, &options.username, &options.password)
            .host(options.host)
            .port(options.port.unwrap_or(CLIENT_PORT))
            .security(security)
            .trust(trust);
        if let Some(resource) = &options.resource {
            builder = builder.resource(resource);
        }
        if let Some(secs) = options.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = options.iq_timeout_secs {
            builder = builder.iq_timeout(Duration::from_secs(secs));
        }
        builder.build()
    }
}

/// Room join options in the form a bridge sends them.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JoinOptions {
    pub room_jid: String,
    pub nickname: String,
    pub password: Option<String>,
    /// Maximum number of history messages to receive.
    pub history_limit: Option<u32>,
    /// Only receive history after this XEP-0082 timestamp.
    pub since_timestamp: Option<String>,
}

impl JoinOptions {
    /// Validates the options into a bare room address, nickname,
    /// password and history request.
    pub fn into_parts(self) -> Result<(Jid, String, Option<String>, History), XmppError> {
        let room = Jid::new(&self.room_jid)?;
        if !room.is_bare() || room.localpart().is_none() {
            return Err(XmppError::InvalidArgument(format!(
                "room address must be a bare room@service: {}",
                self.room_jid
            )));
        }
        room.with_resource(&self.nickname)?;
        let history = History {
            max_stanzas: self.history_limit,
            since: self.since_timestamp,
            ..History::default()
        };
        Ok((room, self.nickname, self.password, history))
    }
}
