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
use crate::SaxError;

use super::parser::serialize;
use super::parser::stream_header;
use super::*;

const STREAM_START: &str = "<?xml version='1.0'?>\
    <stream:stream xmlns='jabber:client' xmlns:stream='http://etherx.jabber.org/streams' \
                   version='1.0' from='example.com' id='s1'>";

fn collect(parser: &mut StreamParser, chunks: &[&[u8]]) -> (Option<Element>, Vec<String>, bool) {
    let mut header = None;
    let mut elements = Vec::new();
    let mut ended = false;
    for chunk in chunks {
        for event in parser.feed(chunk).unwrap() {
            assert!(!ended);
            match event {
                StreamEvent::StreamStart(element) => {
                    assert!(header.is_none());
                    header = Some(element);
                }
                StreamEvent::Element(element) => elements.push(element.to_xml_in("jabber:client")),
                StreamEvent::End => ended = true,
            }
        }
    }
    (header, elements, ended)
}

fn check_stream(stream_text: &str, expected: &[&str]) {
    let mut parser = StreamParser::new();
    let (header, elements, ended) = collect(&mut parser, &[stream_text.as_bytes()]);
    let header = header.unwrap();
    assert_eq!(header.attribute("from"), Some("example.com"));
    assert_eq!(elements, expected);
    assert!(ended);

    // Same result for every possible split point
    let bytes = stream_text.as_bytes();
    for split in 1..bytes.len() {
        let mut parser = StreamParser::new();
        let (_, elements, ended) = collect(&mut parser, &[&bytes[..split], &bytes[split..]]);
        assert_eq!(elements, expected, "split at {split}");
        assert!(ended);
    }

    // Byte by byte
    let chunks: Vec<&[u8]> = bytes.chunks(1).collect();
    let mut parser = StreamParser::new();
    let (_, elements, ended) = collect(&mut parser, &chunks);
    assert_eq!(elements, expected);
    assert!(ended);
}

#[test]
fn stream_elements() {
    check_stream(
        &format!(
            "{STREAM_START}\
             <stream:features><bind xmlns='urn:ietf:params:xml:ns:xmpp-bind'/></stream:features>\n\
             <message to='user@example.com'>\
                 <body>Hello &amp; welcome!</body>\
             </message>\n\
             <presence/>\
             </stream:stream>"
        ),
        &[
            "<features xmlns=\"http://etherx.jabber.org/streams\"><bind xmlns=\"urn:ietf:params:xml:ns:xmpp-bind\"/></features>",
            "<message to=\"user@example.com\"><body>Hello &amp; welcome!</body></message>",
            "<presence/>",
        ],
    );
}

#[test]
fn multibyte_split() {
    check_stream(
        &format!("{STREAM_START}<message><body>Grüße, 世界 🎉</body></message></stream:stream>"),
        &["<message><body>Grüße, 世界 🎉</body></message>"],
    );
}

#[test]
fn stream_restart() {
    let mut parser = StreamParser::new();
    let (header, _, _) = collect(&mut parser, &[STREAM_START.as_bytes()]);
    assert!(header.is_some());
    assert!(parser.is_started());
    parser.reset();
    assert!(!parser.is_started());
    let (header, elements, ended) = collect(
        &mut parser,
        &[STREAM_START.as_bytes(), b"<presence/>"],
    );
    assert!(header.is_some());
    assert_eq!(elements, ["<presence/>"]);
    assert!(!ended);
}

#[test]
fn stream_errors() {
    let mut parser = StreamParser::new();
    assert_eq!(
        parser.feed(b"<message/>").unwrap_err(),
        StreamError::BadStream(error::description::NO_STREAM_HEADER)
    );

    let mut parser = StreamParser::new();
    parser.feed(STREAM_START.as_bytes()).unwrap();
    assert!(matches!(
        parser.feed(b"<message><body>x</message>"),
        Err(StreamError::BadXml { .. })
    ));

    let mut parser = StreamParser::with_limit(64);
    parser.feed(STREAM_START.as_bytes()).unwrap();
    assert!(matches!(
        parser.feed(&[b"<message><body>".as_slice(), [b'a'; 100].as_slice(), b"</body></message>".as_slice()].concat()),
        Err(StreamError::BadXml {
            error: SaxError::TooLarge(64),
            ..
        })
    ));

    let mut parser = StreamParser::new();
    parser.feed(STREAM_START.as_bytes()).unwrap();
    let events = parser.feed(b"</stream:stream>").unwrap();
    assert_eq!(events, [StreamEvent::End]);
    assert_eq!(
        parser.feed(b"<presence/>").unwrap_err(),
        StreamError::BadStream(error::description::REUSE_AFTER_END)
    );
}

#[test]
fn serialize_parse_cycle() {
    let xml = "<message from=\"lobby@conf.example.com/bob\" type=\"groupchat\" id=\"g7\">\
               <body>x &lt; y</body>\
               <delay xmlns=\"urn:xmpp:delay\" stamp=\"2002-09-10T23:08:25Z\"/>\
               </message>";
    let mut parser = StreamParser::new();
    parser.feed(STREAM_START.as_bytes()).unwrap();
    let events = parser.feed(xml.as_bytes()).unwrap();
    let [StreamEvent::Element(element)] = events.as_slice() else {
        panic!("expected one element");
    };
    let stanza = Stanza::try_from(element.clone()).unwrap();
    assert_eq!(String::from_utf8(serialize(&stanza)).unwrap(), xml);
}

#[test]
fn header() {
    let header = String::from_utf8(stream_header("example.com", None)).unwrap();
    assert_eq!(
        header,
        "<?xml version='1.0'?><stream:stream xmlns='jabber:client' \
         xmlns:stream='http://etherx.jabber.org/streams' version='1.0' to='example.com'>"
    );
    let mut parser = StreamParser::new();
    let events = parser.feed(header.as_bytes()).unwrap();
    assert!(matches!(&events[..], [StreamEvent::StreamStart(e)] if e.attribute("to") == Some("example.com")));
}
