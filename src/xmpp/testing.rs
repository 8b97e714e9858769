/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

//! Scripted in-memory servers for protocol tests.

use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::DuplexStream;

use super::Connector;
use super::TrustPolicy;
use super::XmppError;

pub(crate) const SERVER_HEADER: &str = "<?xml version='1.0'?>\
    <stream:stream xmlns='jabber:client' xmlns:stream='http://etherx.jabber.org/streams' \
    id='s1' from='example.com' version='1.0'>";

/// Hands out one end of an in-memory pipe. The TLS upgrade is a no-op.
pub(crate) struct PipeConnector {
    stream: Mutex<Option<DuplexStream>>,
}

impl PipeConnector {
    /// Returns the connector and the server end of its pipe.
    pub(crate) fn new() -> (PipeConnector, DuplexStream) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        (
            PipeConnector {
                stream: Mutex::new(Some(client)),
            },
            server,
        )
    }
}

impl Connector for PipeConnector {
    type Stream = DuplexStream;

    async fn open(&self, _host: &str, _port: u16, _timeout: Duration) -> Result<DuplexStream, XmppError> {
        let stream = self
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        stream.ok_or_else(|| XmppError::Network("connection refused".to_string()))
    }

    async fn upgrade_to_tls(
        &self,
        stream: DuplexStream,
        _domain: &str,
        _trust: &TrustPolicy,
    ) -> Result<DuplexStream, XmppError> {
        Ok(stream)
    }
}

pub(crate) enum Step {
    /// Reads until the client has sent this text.
    Expect(&'static str),
    /// Writes the text, with `{id}` replaced by the id attribute of the
    /// element holding the last expected text.
    Send(String),
}

/// Runs a script against the server end of a pipe. Returns the pipe
/// and everything the client sent.
pub(crate) async fn serve(mut stream: DuplexStream, script: Vec<Step>) -> (DuplexStream, String) {
    let mut received = String::new();
    let mut cursor = 0;
    let mut id = String::new();
    let mut buffer = vec![0; 4096];
    for step in script {
        match step {
            Step::Expect(needle) => loop {
                if let Some(pos) = received[cursor..].find(needle) {
                    let end = cursor + pos + needle.len();
                    if let Some(start) = received[..end].rfind(" id=\"") {
                        let rest = &received[start + 5..];
                        id = rest[..rest.find('"').unwrap()].to_string();
                    }
                    cursor = end;
                    break;
                }
                let len = stream.read(&mut buffer).await.unwrap();
                assert!(len > 0, "client closed before sending {needle}: {received}");
                received.push_str(std::str::from_utf8(&buffer[..len]).unwrap());
            },
            Step::Send(text) => {
                stream
                    .write_all(text.replace("{id}", &id).as_bytes())
                    .await
                    .unwrap();
            }
        }
    }
    (stream, received)
}

/// Reads whatever the client sends until it closes the pipe.
pub(crate) async fn drain(mut stream: DuplexStream) -> String {
    let mut received = Vec::new();
    let _ = stream.read_to_end(&mut received).await;
    String::from_utf8_lossy(&received).into_owned()
}

/// Server side of a plain PLAIN login binding `alice@example.com/fxmpp`.
pub(crate) fn login_script() -> Vec<Step> {
    vec![
        Step::Expect("<stream:stream"),
        Step::Send(format!(
            "{SERVER_HEADER}<stream:features>\
             <mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><mechanism>PLAIN</mechanism></mechanisms>\
             </stream:features>"
        )),
        Step::Expect("</auth>"),
        Step::Send("<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>".to_string()),
        Step::Expect("<stream:stream"),
        Step::Send(format!(
            "{SERVER_HEADER}<stream:features>\
             <bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'/></stream:features>"
        )),
        Step::Expect("</bind>"),
        Step::Send(
            "<iq type='result' id='{id}'><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'>\
             <jid>alice@example.com/fxmpp</jid></bind></iq>"
                .to_string(),
        ),
    ]
}
