/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

//! Client stream negotiation ([RFC 6120](https://www.rfc-editor.org/rfc/rfc6120)):
//! stream header, STARTTLS, SASL, resource binding and the legacy
//! session request.

use std::collections::VecDeque;

use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::Element;

use super::ConnectionState;
use super::Connector;
use super::ErrorCondition;
use super::Iq;
use super::IqType;
use super::Jid;
use super::SecurityMode;
use super::Stanza;
use super::StreamEvent;
use super::StreamParser;
use super::Transport;
use super::XmppError;
use super::config::ConnectionConfig;
use super::constants::BIND_NS;
use super::constants::CLIENT_NS;
use super::constants::FEATURES_TAG;
use super::constants::SASL_NS;
use super::constants::SESSION_NS;
use super::constants::STREAMS_ERROR_NS;
use super::constants::STREAM_NS;
use super::constants::TLS_NS;
use super::parser::serialize;
use super::parser::serialize_element;
use super::parser::stream_header;
use super::sasl::SaslSession;
use super::sasl::SelectedMechanism;
use super::sasl::failure;
use super::stanza::generate_id;

pub(super) mod description {
    pub(in super::super) const CLOSED_DURING_NEGOTIATION: &str =
        "server closed the stream during negotiation";
    pub(in super::super) const NO_STARTTLS: &str = "server does not offer starttls";
    pub(in super::super) const TLS_REQUIRED: &str = "server requires tls but it is disabled";
    pub(in super::super) const STARTTLS_REFUSED: &str = "server refused starttls";
    pub(in super::super) const NO_BIND: &str = "server does not offer resource binding";
}

/// What the server offered in `<stream:features/>`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Features {
    /// `Some(required)` when STARTTLS is offered.
    pub starttls: Option<bool>,
    pub mechanisms: Vec<String>,
    pub bind: bool,
    /// True if a session must be established after binding.
    pub session: bool,
}

impl Features {
    pub fn parse(features: &Element) -> Features {
        Features {
            starttls: features
                .get_child("starttls", TLS_NS)
                .map(|tls| tls.has_child("required", TLS_NS)),
            mechanisms: features
                .get_child("mechanisms", SASL_NS)
                .map(super::sasl::offered_mechanisms)
                .unwrap_or_default(),
            bind: features.has_child("bind", BIND_NS),
            session: features
                .get_child("session", SESSION_NS)
                .is_some_and(|session| !session.has_child("optional", SESSION_NS)),
        }
    }
}

/// Converts a `<stream:error/>` into the error of the connection.
pub fn stream_error(error: &Element) -> XmppError {
    let condition = error
        .elements()
        .find(|e| e.namespace() == STREAMS_ERROR_NS && e.name() != "text")
        .map_or("undefined-condition", Element::name);
    let text = error.child_text("text", STREAMS_ERROR_NS);
    let message = match text {
        Some(text) => format!("stream error {condition}: {text}"),
        None => format!("stream error {condition}"),
    };
    match condition {
        "bad-format" | "not-well-formed" | "invalid-xml" | "invalid-namespace"
        | "restricted-xml" | "unsupported-encoding" => XmppError::MalformedXml(message),
        _ => XmppError::Network(message),
    }
}

/// A negotiated stream, ready for stanzas.
pub struct Session<S> {
    pub transport: Transport<S>,
    pub parser: StreamParser,
    /// The full address the server bound for us.
    pub jid: Jid,
    /// Events decoded together with the last negotiation reply.
    pub backlog: VecDeque<StreamEvent>,
    pub secured: bool,
}

struct Negotiation<S> {
    transport: Transport<S>,
    parser: StreamParser,
    queue: VecDeque<StreamEvent>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Negotiation<S> {
    fn new(stream: S, max_stanza_size: usize) -> Self {
        Negotiation {
            transport: Transport::new(stream),
            parser: StreamParser::with_limit(max_stanza_size),
            queue: VecDeque::new(),
        }
    }

    async fn next_event(&mut self) -> Result<StreamEvent, XmppError> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Ok(event);
            }
            let Some(bytes) = self.transport.read_chunk().await? else {
                return Err(XmppError::Network(
                    description::CLOSED_DURING_NEGOTIATION.to_string(),
                ));
            };
            let events = self.parser.feed(bytes)?;
            self.queue.extend(events);
        }
    }

    /// The next top level element, failing on stream errors and ends.
    async fn next_element(&mut self) -> Result<Element, XmppError> {
        match self.next_event().await? {
            StreamEvent::Element(element) if element.is("error", STREAM_NS) => {
                Err(stream_error(&element))
            }
            StreamEvent::Element(element) => Ok(element),
            StreamEvent::StreamStart(_) => Err(XmppError::MalformedXml(
                "unexpected stream header".to_string(),
            )),
            StreamEvent::End => Err(XmppError::Network(
                description::CLOSED_DURING_NEGOTIATION.to_string(),
            )),
        }
    }

    async fn send(&mut self, element: &Element) -> Result<(), XmppError> {
        self.transport.write_frame(&serialize_element(element)).await
    }

    /// Sends a fresh stream header and waits for the server features.
    async fn open_stream(&mut self, domain: &str, from: Option<&Jid>) -> Result<Features, XmppError> {
        self.parser.reset();
        self.queue.clear();
        self.transport.write_frame(&stream_header(domain, from)).await?;
        match self.next_event().await? {
            StreamEvent::StreamStart(header) => {
                debug!(
                    id = header.attribute("id").unwrap_or_default(),
                    from = header.attribute("from").unwrap_or_default(),
                    "stream opened"
                );
            }
            _ => return Err(XmppError::MalformedXml("expected stream header".to_string())),
        }
        let features = self.next_element().await?;
        if !features.is(FEATURES_TAG, STREAM_NS) {
            return Err(XmppError::MalformedXml(format!(
                "expected stream features, got <{}>",
                features.name()
            )));
        }
        Ok(Features::parse(&features))
    }

    /// Negotiates TLS if the security mode and the server agree on it.
    /// Returns true if the caller must upgrade the stream now.
    async fn starttls(&mut self, mode: SecurityMode, features: &Features) -> Result<bool, XmppError> {
        let use_tls = match (mode, features.starttls) {
            (SecurityMode::Disabled, Some(true)) => {
                return Err(XmppError::Tls(description::TLS_REQUIRED.to_string()));
            }
            (SecurityMode::Disabled, _) => false,
            (SecurityMode::Required, None) => {
                return Err(XmppError::Tls(description::NO_STARTTLS.to_string()));
            }
            (_, offered) => offered.is_some(),
        };
        if !use_tls {
            return Ok(false);
        }
        self.send(&Element::new("starttls", TLS_NS)).await?;
        let reply = self.next_element().await?;
        if reply.is("proceed", TLS_NS) {
            Ok(true)
        } else {
            Err(XmppError::Tls(description::STARTTLS_REFUSED.to_string()))
        }
    }

    async fn authenticate(
        &mut self,
        config: &ConnectionConfig,
        features: &Features,
        secured: bool,
    ) -> Result<(), XmppError> {
        let (mut session, auth) = SaslSession::start(&features.mechanisms, &config.credentials)?;
        if session.selected() == SelectedMechanism::Plain && !secured {
            warn!(domain = %config.domain, "sending PLAIN credentials over an unencrypted stream");
        }
        self.send(&auth).await?;
        loop {
            let element = self.next_element().await?;
            if element.namespace() != SASL_NS {
                return Err(XmppError::MalformedXml(format!(
                    "unexpected <{}> during authentication",
                    element.name()
                )));
            }
            match element.name() {
                "challenge" => {
                    let response = session.challenge(&element)?;
                    self.send(&response).await?;
                }
                "success" => {
                    session.success(&element)?;
                    info!(mechanism = %session.selected(), "authenticated");
                    return Ok(());
                }
                "failure" => return Err(failure(&element)),
                name => {
                    return Err(XmppError::MalformedXml(format!(
                        "unexpected sasl element <{name}>"
                    )));
                }
            }
        }
    }

    /// Sends an IQ set and waits for the response with the same id.
    /// Unrelated elements arriving meanwhile are kept for the caller.
    async fn request(
        &mut self,
        payload: Element,
        backlog: &mut VecDeque<StreamEvent>,
    ) -> Result<Iq, XmppError> {
        let id = generate_id();
        let iq = Iq::set(&id, payload);
        self.transport.write_frame(&serialize(&Stanza::Iq(iq))).await?;
        loop {
            let element = self.next_element().await?;
            if element.is("iq", CLIENT_NS) && element.attribute("id") == Some(id.as_str()) {
                let Stanza::Iq(response) = Stanza::try_from(element)? else {
                    return Err(XmppError::MalformedXml("bad iq response".to_string()));
                };
                return match response.iq_type() {
                    IqType::Result => Ok(response),
                    _ => Err(response
                        .error()
                        .unwrap_or_else(|| ErrorCondition::new("cancel", "undefined-condition"))
                        .into()),
                };
            }
            backlog.push_back(StreamEvent::Element(element));
        }
    }

    async fn bind(
        &mut self,
        resource: &str,
        backlog: &mut VecDeque<StreamEvent>,
    ) -> Result<Jid, XmppError> {
        let mut bind = Element::new("bind", BIND_NS);
        if !resource.is_empty() {
            bind.append_child(Element::new("resource", BIND_NS).with_text(resource));
        }
        let response = self.request(bind, backlog).await?;
        let jid = response
            .payload("bind", BIND_NS)
            .and_then(|bind| bind.child_text("jid", BIND_NS))
            .ok_or_else(|| XmppError::MalformedXml("bind result without jid".to_string()))?;
        Ok(Jid::new(jid.trim())?)
    }
}

/// Opens a connection and negotiates it up to a bound resource.
///
/// `on_state` is called with `Connected` once the first stream header
/// is answered, and with `Authenticating` when SASL starts. The whole
/// exchange is bounded by the connect timeout of the configuration.
pub async fn negotiate<C: Connector>(
    connector: &C,
    config: &ConnectionConfig,
    on_state: impl FnMut(ConnectionState) + Send,
) -> Result<Session<C::Stream>, XmppError> {
    tokio::time::timeout(
        config.connect_timeout,
        negotiate_inner(connector, config, on_state),
    )
    .await
    .map_err(|_| XmppError::Timeout)?
}

async fn negotiate_inner<C: Connector>(
    connector: &C,
    config: &ConnectionConfig,
    mut on_state: impl FnMut(ConnectionState) + Send,
) -> Result<Session<C::Stream>, XmppError> {
    let account = config.jid()?;
    let stream = connector
        .open(&config.host, config.port, config.connect_timeout)
        .await?;
    let mut negotiation = Negotiation::new(stream, config.max_stanza_size);
    let mut features = negotiation.open_stream(&config.domain, None).await?;
    on_state(ConnectionState::Connected);

    let mut secured = false;
    if negotiation.starttls(config.security, &features).await? {
        let stream = negotiation.transport.into_inner();
        let stream = connector
            .upgrade_to_tls(stream, &config.domain, &config.trust)
            .await?;
        negotiation = Negotiation::new(stream, config.max_stanza_size);
        secured = true;
        features = negotiation.open_stream(&config.domain, Some(&account)).await?;
    }

    on_state(ConnectionState::Authenticating);
    negotiation.authenticate(config, &features, secured).await?;

    let features = negotiation
        .open_stream(&config.domain, secured.then_some(&account))
        .await?;
    if !features.bind {
        return Err(XmppError::Network(description::NO_BIND.to_string()));
    }
    let mut backlog = VecDeque::new();
    let jid = negotiation.bind(&config.resource, &mut backlog).await?;
    if features.session {
        negotiation
            .request(Element::new("session", SESSION_NS), &mut backlog)
            .await?;
    }
    info!(%jid, secured, "stream established");

    backlog.extend(negotiation.queue.drain(..));
    Ok(Session {
        transport: negotiation.transport,
        parser: negotiation.parser,
        jid,
        backlog,
        secured,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::xmpp::testing::PipeConnector;
    use crate::xmpp::testing::Step;
    use crate::xmpp::testing::login_script;
    use crate::xmpp::testing::serve;
    use crate::xmpp::testing::SERVER_HEADER;

    fn config(security: SecurityMode) -> ConnectionConfig {
        ConnectionConfig::builder("example.com", "alice", "secret")
            .security(security)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap()
    }

    #[test]
    fn features() {
        let features = Element::parse_in(
            "<stream:features xmlns:stream='http://etherx.jabber.org/streams'>\
             <starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'><required/></starttls>\
             <mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>\
             <mechanism>PLAIN</mechanism><mechanism>SCRAM-SHA-1</mechanism></mechanisms>\
             <session xmlns='urn:ietf:params:xml:ns:xmpp-session'><optional/></session>\
             </stream:features>",
            CLIENT_NS,
        )
        .unwrap();
        let features = Features::parse(&features);
        assert_eq!(features.starttls, Some(true));
        assert_eq!(features.mechanisms, ["PLAIN", "SCRAM-SHA-1"]);
        assert!(!features.bind);
        assert!(!features.session);
    }

    #[test]
    fn stream_errors() {
        let error = Element::parse_in(
            "<stream:error xmlns:stream='http://etherx.jabber.org/streams'>\
             <not-well-formed xmlns='urn:ietf:params:xml:ns:xmpp-streams'/></stream:error>",
            CLIENT_NS,
        )
        .unwrap();
        assert!(matches!(stream_error(&error), XmppError::MalformedXml(_)));
        let error = Element::parse_in(
            "<stream:error xmlns:stream='http://etherx.jabber.org/streams'>\
             <conflict xmlns='urn:ietf:params:xml:ns:xmpp-streams'/>\
             <text xmlns='urn:ietf:params:xml:ns:xmpp-streams'>replaced</text></stream:error>",
            CLIENT_NS,
        )
        .unwrap();
        assert_eq!(
            stream_error(&error),
            XmppError::Network("stream error conflict: replaced".to_string())
        );
    }

    #[tokio::test]
    async fn login() {
        let (connector, server) = PipeConnector::new();
        let script = tokio::spawn(serve(server, login_script()));
        let mut states = Vec::new();
        let session = negotiate(&connector, &config(SecurityMode::Allowed), |state| {
            states.push(state)
        })
        .await
        .unwrap();
        assert_eq!(session.jid, Jid::new("alice@example.com/fxmpp").unwrap());
        assert!(!session.secured);
        assert_eq!(
            states,
            [ConnectionState::Connected, ConnectionState::Authenticating]
        );
        let (_, transcript) = script.await.unwrap();
        assert!(transcript.contains("mechanism=\"PLAIN\""));
        assert!(transcript.contains("<resource>fxmpp</resource>"));
    }

    #[tokio::test]
    async fn starttls_and_session() {
        let (connector, server) = PipeConnector::new();
        let features = "<stream:features>\
             <mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><mechanism>PLAIN</mechanism></mechanisms>\
             </stream:features>";
        let script = vec![
            Step::Expect("<stream:stream"),
            Step::Send(format!(
                "{SERVER_HEADER}<stream:features>\
                 <starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'/></stream:features>"
            )),
            Step::Expect("<starttls"),
            Step::Send("<proceed xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>".to_string()),
            Step::Expect("<stream:stream"),
            Step::Send(format!("{SERVER_HEADER}{features}")),
            Step::Expect("</auth>"),
            Step::Send("<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>".to_string()),
            Step::Expect("<stream:stream"),
            Step::Send(format!(
                "{SERVER_HEADER}<stream:features>\
                 <bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'/>\
                 <session xmlns='urn:ietf:params:xml:ns:xmpp-session'/></stream:features>"
            )),
            Step::Expect("</bind>"),
            Step::Send(
                "<iq type='result' id='{id}'><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'>\
                 <jid>alice@example.com/desk</jid></bind></iq>"
                    .to_string(),
            ),
            Step::Expect("xmpp-session"),
            Step::Send(
                "<iq type='result' id='{id}'/><message from='bob@example.com'><body>early</body></message>"
                    .to_string(),
            ),
        ];
        let script = tokio::spawn(serve(server, script));
        let session = negotiate(&connector, &config(SecurityMode::Required), |_| {})
            .await
            .unwrap();
        assert!(session.secured);
        assert_eq!(session.jid.resourcepart(), Some("desk"));
        assert!(matches!(
            session.backlog.front(),
            Some(StreamEvent::Element(e)) if e.name() == "message"
        ));
        let (_, transcript) = script.await.unwrap();
        assert!(transcript.contains("from='alice@example.com'"));
    }

    #[tokio::test]
    async fn auth_failure() {
        let (connector, server) = PipeConnector::new();
        let script = vec![
            Step::Expect("<stream:stream"),
            Step::Send(format!(
                "{SERVER_HEADER}<stream:features>\
                 <mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><mechanism>PLAIN</mechanism></mechanisms>\
                 </stream:features>"
            )),
            Step::Expect("</auth>"),
            Step::Send(
                "<failure xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><not-authorized/>\
                 <text>Wrong password</text></failure>"
                    .to_string(),
            ),
        ];
        let _script = tokio::spawn(serve(server, script));
        let err = negotiate(&connector, &config(SecurityMode::Allowed), |_| {})
            .await
            .err()
            .unwrap();
        assert_eq!(
            err,
            XmppError::AuthFailed {
                condition: "not-authorized".to_string(),
                text: Some("Wrong password".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn security_modes() {
        let (connector, server) = PipeConnector::new();
        let script = vec![
            Step::Expect("<stream:stream"),
            Step::Send(format!("{SERVER_HEADER}<stream:features/>")),
        ];
        let _script = tokio::spawn(serve(server, script));
        let err = negotiate(&connector, &config(SecurityMode::Required), |_| {})
            .await
            .err()
            .unwrap();
        assert_eq!(err, XmppError::Tls(description::NO_STARTTLS.to_string()));

        let (connector, server) = PipeConnector::new();
        let script = vec![
            Step::Expect("<stream:stream"),
            Step::Send(format!(
                "{SERVER_HEADER}<stream:features>\
                 <starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'><required/></starttls>\
                 </stream:features>"
            )),
        ];
        let _script = tokio::spawn(serve(server, script));
        let err = negotiate(&connector, &config(SecurityMode::Disabled), |_| {})
            .await
            .err()
            .unwrap();
        assert_eq!(err, XmppError::Tls(description::TLS_REQUIRED.to_string()));
    }

    #[tokio::test]
    async fn server_stream_error() {
        let (connector, server) = PipeConnector::new();
        let script = vec![
            Step::Expect("<stream:stream"),
            Step::Send(format!(
                "{SERVER_HEADER}<stream:error>\
                 <host-unknown xmlns='urn:ietf:params:xml:ns:xmpp-streams'/></stream:error>"
            )),
        ];
        let _script = tokio::spawn(serve(server, script));
        let err = negotiate(&connector, &config(SecurityMode::Allowed), |_| {})
            .await
            .err()
            .unwrap();
        assert_eq!(err, XmppError::Network("stream error host-unknown".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_server_times_out() {
        let (connector, _server) = PipeConnector::new();
        let err = negotiate(&connector, &config(SecurityMode::Allowed), |_| {})
            .await
            .err()
            .unwrap();
        assert_eq!(err, XmppError::Timeout);
    }
}
