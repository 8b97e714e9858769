/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use super::*;
use crate::SaxError;
use crate::parser::description;

fn check_xml(element: &Element, expected: &str) {
    let xml = element.to_string();
    assert_eq!(xml, expected);
    assert_eq!(element.serialized_size(""), xml.len());
    let xml2 = format!("{}", element);
    assert_eq!(xml2, expected);
}

#[test]
fn build_and_print() {
    let element = Element::new("iq", "jabber:client")
        .with_attribute("type", "set")
        .with_attribute("id", "b1")
        .with_child(
            Element::new("bind", "urn:ietf:params:xml:ns:xmpp-bind")
                .with_child(Element::new("resource", "urn:ietf:params:xml:ns:xmpp-bind").with_text("fxmpp")),
        );
    check_xml(
        &element,
        "<iq xmlns=\"jabber:client\" type=\"set\" id=\"b1\">\
         <bind xmlns=\"urn:ietf:params:xml:ns:xmpp-bind\"><resource>fxmpp</resource></bind></iq>",
    );
    assert_eq!(
        element.to_xml_in("jabber:client"),
        "<iq type=\"set\" id=\"b1\">\
         <bind xmlns=\"urn:ietf:params:xml:ns:xmpp-bind\"><resource>fxmpp</resource></bind></iq>"
    );
}

#[test]
fn escaping() {
    let element = Element::new("body", "")
        .with_attribute("a", "1'2\"3")
        .with_text("<b>&amp;</b>");
    check_xml(
        &element,
        "<body a=\"1&apos;2&quot;3\">&lt;b&gt;&amp;amp;&lt;/b&gt;</body>",
    );
}

#[test]
fn empty_namespace_inside_default() {
    let element = Element::new("a", "urn:x").with_child(Element::new("b", ""));
    check_xml(&element, "<a xmlns=\"urn:x\"><b xmlns=\"\"/></a>");
}

#[test]
fn attributes() {
    let mut element = Element::new("item", "");
    element.set_attribute("role", "none");
    element.set_attribute("nick", "thirdwitch");
    element.set_attribute("role", "participant");
    assert_eq!(element.attribute("role"), Some("participant"));
    assert_eq!(element.attributes().count(), 2);
    assert_eq!(element.remove_attribute("nick"), Some("thirdwitch".to_string()));
    assert_eq!(element.remove_attribute("nick"), None);
    assert_eq!(element.attribute("nick"), None);
}

#[test]
fn text_merging() {
    let mut element = Element::new("body", "");
    element.append_text("a");
    element.append_text("");
    element.append_text("b");
    element.append_child(Element::new("x", ""));
    element.append_text("c");
    assert_eq!(element.children().len(), 3);
    assert_eq!(element.text(), "abc");
}

#[test]
fn parse_resolves_namespaces() {
    let element: Element = "<message xmlns='jabber:client' to='room@muc.example.com' type='groupchat'>\
         <body>hi</body><x xmlns='http://jabber.org/protocol/muc#user'><item role='moderator'/></x></message>"
        .parse()
        .unwrap();
    assert!(element.is("message", "jabber:client"));
    assert_eq!(element.attribute("xmlns"), None);
    assert_eq!(element.child_text("body", "jabber:client"), Some("hi".to_string()));
    let x = element
        .get_child("x", "http://jabber.org/protocol/muc#user")
        .unwrap();
    let item = x.get_child("item", "http://jabber.org/protocol/muc#user").unwrap();
    assert_eq!(item.attribute("role"), Some("moderator"));
}

#[test]
fn parse_prefixed() {
    let element: Element =
        "<s:features xmlns:s='http://etherx.jabber.org/streams'><s:x/><y/></s:features>"
            .parse()
            .unwrap();
    assert!(element.is("features", "http://etherx.jabber.org/streams"));
    assert!(element.has_child("x", "http://etherx.jabber.org/streams"));
    assert!(element.has_child("y", ""));
}

#[test]
fn parse_prefixed_attribute_keeps_declaration() {
    let element: Element = "<a xmlns:p='urn:p'><b p:k='v' xml:lang='en'/></a>".parse().unwrap();
    let b = element.get_child("b", "").unwrap();
    assert_eq!(b.attribute("p:k"), Some("v"));
    assert_eq!(b.attribute("xmlns:p"), Some("urn:p"));
    assert_eq!(b.attribute("xml:lang"), Some("en"));
    let reparsed: Element = b.to_string().parse().unwrap();
    assert_eq!(&reparsed, b);
}

#[test]
fn equality_ignores_attribute_order() {
    let a: Element = "<presence to='a@b' type='unavailable'/>".parse().unwrap();
    let b: Element = "<presence type='unavailable' to='a@b'/>".parse().unwrap();
    assert_eq!(a, b);
    let c: Element = "<presence type='unavailable' to='a@c'/>".parse().unwrap();
    assert_ne!(a, c);
}

#[test]
fn print_parse_cycle() {
    let original: Element = "<iq xmlns='jabber:client' type='result' id='x'>\
         <query xmlns='http://jabber.org/protocol/muc#admin'>\
         <item affiliation='owner' jid='crone1@shakespeare.lit'/>text&amp;more</query></iq>"
        .parse()
        .unwrap();
    let again: Element = original.to_string().parse().unwrap();
    assert_eq!(original, again);
}

#[test]
fn parse_errors() {
    let err = "<a><b></a>".parse::<Element>().unwrap_err();
    assert_eq!(err.error, SaxError::BadXml(description::HANDLER_TAG_MISMATCH));
    assert_eq!(err.location.bytes, 9);

    let err = "<p:a/>".parse::<Element>().unwrap_err();
    assert_eq!(err.error, SaxError::BadXml(description::HANDLER_UNBOUND_PREFIX));

    let err = "<a x='1' x='2'/>".parse::<Element>().unwrap_err();
    assert_eq!(err.error, SaxError::BadXml(description::HANDLER_DUPLICATE_ATTRIBUTE));

    assert!("<a>".parse::<Element>().is_err());
    assert!("".parse::<Element>().is_err());
}

#[test]
fn stream_mode() {
    let mut parser = SaxParser::new();
    let mut builder = ElementBuilder::for_stream(1024);
    parser
        .parse_bytes(
            &mut builder,
            b"<stream:stream xmlns='jabber:client' xmlns:stream='http://etherx.jabber.org/streams' \
              from='example.com' id='s1' version='1.0'> <presence/>\n<message><body>x",
        )
        .unwrap();
    let output = builder.take_output();
    assert_eq!(output.len(), 2);
    match &output[0] {
        Built::StreamHeader(header) => {
            assert!(header.is("stream", "http://etherx.jabber.org/streams"));
            assert_eq!(header.attribute("id"), Some("s1"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(output[1], Built::Element(Element::new("presence", "jabber:client")));

    parser
        .parse_bytes(&mut builder, b"</body></message></stream:stream>")
        .unwrap();
    let output = builder.take_output();
    assert_eq!(output.len(), 2);
    match &output[0] {
        Built::Element(message) => {
            assert_eq!(message.child_text("body", "jabber:client"), Some("x".to_string()));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(output[1], Built::StreamEnd);
}

#[test]
fn stream_mode_limits() {
    let mut parser = SaxParser::new();
    let mut builder = ElementBuilder::for_stream(16);
    parser
        .parse_bytes(&mut builder, b"<stream:stream xmlns:stream='http://etherx.jabber.org/streams'>")
        .unwrap();
    parser.parse_bytes(&mut builder, b"<a>0123456789</a>").unwrap();
    assert_eq!(
        parser.parse_bytes(&mut builder, b"<b>0123456789abcdef</b>"),
        Err(SaxError::TooLarge(16))
    );
}

#[test]
fn stream_mode_rejects_text() {
    let mut parser = SaxParser::new();
    let mut builder = ElementBuilder::for_stream(1024);
    assert_eq!(
        parser.parse_bytes(&mut builder, b"<stream:stream xmlns:stream='urn:s'>junk"),
        Ok(())
    );
    assert_eq!(
        parser.parse_bytes(&mut builder, b"<a/>"),
        Err(SaxError::BadXml(description::HANDLER_TEXT_BETWEEN_STANZAS))
    );
}
