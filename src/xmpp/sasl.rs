/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sasl::client::Mechanism;
use sasl::client::mechanisms::Plain;
use sasl::client::mechanisms::Scram;
use sasl::common::ChannelBinding;
use sasl::common::scram::Sha1;
use sasl::common::scram::Sha256;
use tracing::debug;

use crate::Element;

use super::XmppError;
use super::config::Credentials;
use super::constants::SASL_NS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectedMechanism {
    ScramSha256,
    ScramSha1,
    Plain,
}

impl SelectedMechanism {
    pub fn name(&self) -> &'static str {
        match self {
            SelectedMechanism::ScramSha256 => "SCRAM-SHA-256",
            SelectedMechanism::ScramSha1 => "SCRAM-SHA-1",
            SelectedMechanism::Plain => "PLAIN",
        }
    }
}

impl std::fmt::Display for SelectedMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

const MECHANISM_PREFERENCE: &[SelectedMechanism] = &[
    SelectedMechanism::ScramSha256,
    SelectedMechanism::ScramSha1,
    SelectedMechanism::Plain,
];

/// Picks the strongest mechanism offered by the server.
pub fn select_mechanism<S: AsRef<str>>(offered: &[S]) -> Option<SelectedMechanism> {
    MECHANISM_PREFERENCE
        .iter()
        .find(|m| offered.iter().any(|o| o.as_ref() == m.name()))
        .copied()
}

/// Mechanism names listed in a `<mechanisms/>` stream feature.
pub fn offered_mechanisms(mechanisms: &Element) -> Vec<String> {
    mechanisms
        .get_children("mechanism", SASL_NS)
        .map(|m| m.text().trim().to_string())
        .collect()
}

fn build_mechanism(
    selected: SelectedMechanism,
    credentials: &Credentials,
) -> Result<Box<dyn Mechanism + Send>, XmppError> {
    let credentials = sasl::common::Credentials::default()
        .with_username(credentials.username.as_str())
        .with_password(credentials.password.as_str())
        .with_channel_binding(ChannelBinding::None);
    let mechanism = match selected {
        SelectedMechanism::ScramSha256 => Scram::<Sha256>::from_credentials(credentials)
            .map(|m| Box::new(m) as Box<dyn Mechanism + Send>),
        SelectedMechanism::ScramSha1 => Scram::<Sha1>::from_credentials(credentials)
            .map(|m| Box::new(m) as Box<dyn Mechanism + Send>),
        SelectedMechanism::Plain => {
            Plain::from_credentials(credentials).map(|m| Box::new(m) as Box<dyn Mechanism + Send>)
        }
    };
    mechanism.map_err(|err| XmppError::auth_failed(format!("cannot initialize {selected}: {err:?}")))
}

fn encode(data: &[u8]) -> String {
    if data.is_empty() {
        // zero length initial response
        "=".to_string()
    } else {
        STANDARD.encode(data)
    }
}

fn decode(element: &Element) -> Result<Vec<u8>, XmppError> {
    let text = element.text();
    let text = text.trim();
    if text.is_empty() || text == "=" {
        return Ok(Vec::new());
    }
    STANDARD
        .decode(text)
        .map_err(|err| XmppError::MalformedXml(format!("bad base64 in sasl {}: {err}", element.name())))
}

/// One SASL exchange on the wire.
pub struct SaslSession {
    selected: SelectedMechanism,
    mechanism: Box<dyn Mechanism + Send>,
}

impl SaslSession {
    /// Selects a mechanism and creates the `<auth/>` element.
    pub fn start(
        offered: &[String],
        credentials: &Credentials,
    ) -> Result<(SaslSession, Element), XmppError> {
        let selected = select_mechanism(offered)
            .ok_or_else(|| XmppError::auth_failed("no supported sasl mechanism"))?;
        debug!(mechanism = %selected, "sasl start");
        let mut mechanism = build_mechanism(selected, credentials)?;
        let auth = Element::new("auth", SASL_NS)
            .with_attribute("mechanism", selected.name())
            .with_text(&encode(&mechanism.initial()));
        Ok((SaslSession { selected, mechanism }, auth))
    }

    pub fn selected(&self) -> SelectedMechanism {
        self.selected
    }

    /// Answers a `<challenge/>` with a `<response/>`.
    pub fn challenge(&mut self, challenge: &Element) -> Result<Element, XmppError> {
        let data = decode(challenge)?;
        let response = self
            .mechanism
            .response(&data)
            .map_err(|err| XmppError::auth_failed(format!("{err:?}")))?;
        Ok(Element::new("response", SASL_NS).with_text(&encode(&response)))
    }

    /// Verifies the additional data of `<success/>`.
    pub fn success(&mut self, success: &Element) -> Result<(), XmppError> {
        let data = decode(success)?;
        self.mechanism
            .success(&data)
            .map_err(|err| XmppError::auth_failed(format!("server verification failed: {err:?}")))
    }
}

/// Converts a `<failure/>` into an error with its condition and text.
pub fn failure(failure: &Element) -> XmppError {
    let condition = failure
        .elements()
        .find(|e| e.name() != "text")
        .map_or("not-authorized", Element::name);
    XmppError::AuthFailed {
        condition: condition.to_string(),
        text: failure.child_text("text", SASL_NS),
    }
}
