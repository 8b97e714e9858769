/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use crate::Built;
use crate::Element;
use crate::ElementBuilder;
use crate::SaxParser;
use crate::entities::escape;

use super::Jid;
use super::Stanza;
use super::StreamError;
use super::constants::CLIENT_NS;
use super::constants::DEFAULT_MAX_STANZA_SIZE;
use super::constants::STREAM_NS;
use super::constants::STREAM_TAG;
use super::error::description;

/// Something decoded from the inbound stream.
#[derive(Debug, PartialEq)]
pub enum StreamEvent {
    /// The `<stream:stream>` header with its attributes.
    StreamStart(Element),
    /// A complete top level element, stanza or otherwise.
    Element(Element),
    /// The server closed the stream.
    End,
}

/// Incremental decoder for an XMPP stream.
///
/// Bytes can be fed in chunks of any size; an element split across
/// chunks is reported once, when its last byte arrives.
///
/// ```
/// use fxmpp_core::xmpp::StreamEvent;
/// use fxmpp_core::xmpp::StreamParser;
///
/// let mut parser = StreamParser::new();
/// let mut events = parser
///     .feed(b"<stream:stream xmlns='jabber:client' xmlns:stream='http://etherx.jabber.org/streams'><mess")
///     .unwrap();
/// assert_eq!(events.len(), 1);
/// events = parser.feed(b"age><body>hi</body></message>").unwrap();
/// assert!(matches!(&events[0], StreamEvent::Element(e) if e.name() == "message"));
/// ```
pub struct StreamParser {
    parser: SaxParser,
    builder: ElementBuilder,
    max_stanza_size: usize,
    started: bool,
    ended: bool,
}

impl StreamParser {
    pub fn new() -> Self {
        StreamParser::with_limit(DEFAULT_MAX_STANZA_SIZE)
    }

    /// Creates a parser which fails when a single top level element is
    /// larger than `max_stanza_size` bytes.
    pub fn with_limit(max_stanza_size: usize) -> Self {
        StreamParser {
            parser: SaxParser::with_limit(max_stanza_size),
            builder: ElementBuilder::for_stream(max_stanza_size),
            max_stanza_size,
            started: false,
            ended: false,
        }
    }

    pub fn max_stanza_size(&self) -> usize {
        self.max_stanza_size
    }

    /// Forgets everything seen so far. Used for the stream restarts
    /// after STARTTLS and SASL.
    pub fn reset(&mut self) {
        self.parser.reset();
        self.builder.reset();
        self.started = false;
        self.ended = false;
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<StreamEvent>, StreamError> {
        if self.ended {
            return Err(StreamError::BadStream(description::REUSE_AFTER_END));
        }
        let result = self.parser.parse_bytes(&mut self.builder, bytes);
        let built = self.builder.take_output();
        if let Err(error) = result {
            return Err(StreamError::BadXml {
                error,
                location: self.parser.location(),
            });
        }
        let mut events = Vec::with_capacity(built.len());
        for item in built {
            match item {
                Built::StreamHeader(header) => {
                    if !header.is(STREAM_TAG, STREAM_NS) {
                        return Err(StreamError::BadStream(description::NO_STREAM_HEADER));
                    }
                    self.started = true;
                    events.push(StreamEvent::StreamStart(header));
                }
                Built::Element(element) => events.push(StreamEvent::Element(element)),
                Built::StreamEnd => {
                    self.ended = true;
                    events.push(StreamEvent::End);
                    break;
                }
            }
        }
        Ok(events)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializes a stanza as it is written into a client stream.
pub fn serialize(stanza: &Stanza) -> Vec<u8> {
    stanza.to_element().to_xml_in(CLIENT_NS).into_bytes()
}

/// Serializes a non stanza element, like SASL or STARTTLS negotiation.
pub fn serialize_element(element: &Element) -> Vec<u8> {
    element.to_xml_in(CLIENT_NS).into_bytes()
}

/// The opening tag of a client to server stream.
pub fn stream_header(to: &str, from: Option<&Jid>) -> Vec<u8> {
    let mut header = String::with_capacity(200);
    header.push_str("<?xml version='1.0'?><stream:stream xmlns='");
    header.push_str(CLIENT_NS);
    header.push_str("' xmlns:stream='");
    header.push_str(STREAM_NS);
    header.push_str("' version='1.0' to='");
    // Writing into a String cannot fail.
    let _ = escape(to, &mut header);
    if let Some(from) = from {
        header.push_str("' from='");
        let _ = escape(from.bare(), &mut header);
    }
    header.push_str("'>");
    header.into_bytes()
}

pub const STREAM_FOOTER: &[u8] = b"</stream:stream>";
