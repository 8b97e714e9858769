/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use crate::SaxElement;
use crate::SaxError;
use crate::SaxHandler;
use crate::parser::description;

use super::Element;
use super::Node;

pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// A completed piece of the tree reported by [ElementBuilder].
#[derive(Debug, PartialEq)]
pub enum Built {
    /// The root tag of a stream, without children.
    StreamHeader(Element),
    /// A complete top level element.
    Element(Element),
    /// The root tag of a stream is closed.
    StreamEnd,
}

struct PendingTag {
    name: String,
    attributes: Vec<(String, String)>,
    declarations: Vec<(String, String)>,
}

/// Turns tokens into namespace resolved [Element] trees.
///
/// In document mode the single root element is reported when it closes.
/// In stream mode the root tag is reported as soon as its start tag is
/// complete, and each of its children is reported when it closes.
pub struct ElementBuilder {
    stream_mode: bool,
    scopes: Vec<Vec<(String, String)>>,
    names: Vec<String>,
    open: Vec<Element>,
    pending: Option<PendingTag>,
    max_size: usize,
    current_size: usize,
    output: Vec<Built>,
}

fn split_name(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

impl ElementBuilder {
    pub fn new() -> Self {
        ElementBuilder::with_mode(false, usize::MAX)
    }

    /// Creates a builder which fails when a single top level element
    /// holds more than `max_size` bytes of names, attributes and text.
    pub fn for_stream(max_size: usize) -> Self {
        ElementBuilder::with_mode(true, max_size)
    }

    fn with_mode(stream_mode: bool, max_size: usize) -> Self {
        ElementBuilder {
            stream_mode,
            scopes: Vec::new(),
            names: Vec::new(),
            open: Vec::new(),
            pending: None,
            max_size,
            current_size: 0,
            output: Vec::new(),
        }
    }

    /// Creates a document mode builder where unprefixed names without a
    /// declaration fall into `namespace` instead of the empty namespace.
    pub fn with_default_namespace(namespace: &str) -> Self {
        let mut builder = ElementBuilder::new();
        builder
            .scopes
            .push(vec![(String::new(), namespace.to_string())]);
        builder
    }

    pub fn reset(&mut self) {
        *self = ElementBuilder::with_mode(self.stream_mode, self.max_size);
    }

    /// Takes everything completed since the last call.
    pub fn take_output(&mut self) -> Vec<Built> {
        std::mem::take(&mut self.output)
    }

    fn account(&mut self, size: usize) -> Result<(), SaxError> {
        if self.stream_mode && self.names.is_empty() {
            // stream root tag
            return Ok(());
        }
        self.current_size = self.current_size.saturating_add(size);
        if self.current_size > self.max_size {
            return Err(SaxError::TooLarge(self.max_size));
        }
        Ok(())
    }

    fn resolve(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NS);
        }
        for scope in self.scopes.iter().rev() {
            if let Some((_, uri)) = scope.iter().find(|(p, _)| p == prefix) {
                return Some(uri);
            }
        }
        if prefix.is_empty() { Some("") } else { None }
    }

    fn open_tag(&mut self, is_empty: bool) -> Result<(), SaxError> {
        let tag = self
            .pending
            .take()
            .ok_or(SaxError::BadXml(description::HANDLER_TAG_MISMATCH))?;
        self.scopes.push(tag.declarations);

        let (prefix, local) = split_name(&tag.name);
        let namespace = self
            .resolve(prefix.unwrap_or(""))
            .ok_or(SaxError::BadXml(description::HANDLER_UNBOUND_PREFIX))?
            .to_string();

        let mut element = Element::new(local, namespace);
        for (name, value) in tag.attributes {
            if let (Some(prefix), _) = split_name(&name) {
                if prefix != "xml" {
                    let uri = self
                        .resolve(prefix)
                        .ok_or(SaxError::BadXml(description::HANDLER_UNBOUND_PREFIX))?
                        .to_string();
                    let declaration = format!("xmlns:{prefix}");
                    if element.attribute(&declaration).is_none() {
                        element.attributes.push((declaration, uri));
                    }
                }
            }
            element.attributes.push((name, value));
        }

        if self.stream_mode && self.names.is_empty() {
            self.output.push(Built::StreamHeader(element));
            self.current_size = 0;
            if is_empty {
                self.scopes.pop();
                self.output.push(Built::StreamEnd);
            } else {
                self.names.push(tag.name);
            }
            return Ok(());
        }

        self.names.push(tag.name);
        self.open.push(element);
        if is_empty {
            self.close_tag();
        }
        Ok(())
    }

    fn close_tag(&mut self) {
        self.names.pop();
        self.scopes.pop();
        match self.open.pop() {
            Some(element) => match self.open.last_mut() {
                Some(parent) => parent.children.push(Node::Element(element)),
                None => {
                    self.current_size = 0;
                    self.output.push(Built::Element(element));
                }
            },
            None => self.output.push(Built::StreamEnd),
        }
    }
}

impl SaxHandler for ElementBuilder {
    fn handle_element(&mut self, element: &SaxElement) -> Result<(), SaxError> {
        match element {
            SaxElement::StartTag(name) => {
                self.account(name.len())?;
                self.pending = Some(PendingTag {
                    name: name.to_string(),
                    attributes: Vec::new(),
                    declarations: Vec::new(),
                });
            }
            SaxElement::Attribute(name, value) => {
                self.account(name.len() + value.len())?;
                let tag = self
                    .pending
                    .as_mut()
                    .ok_or(SaxError::BadXml(description::HANDLER_TAG_MISMATCH))?;
                if *name == "xmlns" {
                    tag.declarations.push((String::new(), value.to_string()));
                } else if let Some(prefix) = name.strip_prefix("xmlns:") {
                    tag.declarations.push((prefix.to_string(), value.to_string()));
                } else {
                    if tag.attributes.iter().any(|(n, _)| n == name) {
                        return Err(SaxError::BadXml(description::HANDLER_DUPLICATE_ATTRIBUTE));
                    }
                    tag.attributes.push((name.to_string(), value.to_string()));
                }
            }
            SaxElement::StartTagContent => self.open_tag(false)?,
            SaxElement::StartTagEmpty => self.open_tag(true)?,
            SaxElement::CData(text) => match self.open.last_mut() {
                Some(parent) => {
                    parent.append_text(text);
                    self.account(text.len())?;
                }
                None => {
                    if !text.trim().is_empty() {
                        return Err(SaxError::BadXml(description::HANDLER_TEXT_BETWEEN_STANZAS));
                    }
                }
            },
            SaxElement::EndTag(name) => {
                if self.names.last().map(String::as_str) != Some(*name) {
                    return Err(SaxError::BadXml(description::HANDLER_TAG_MISMATCH));
                }
                self.close_tag();
            }
        }
        Ok(())
    }
}

impl Default for ElementBuilder {
    fn default() -> Self {
        Self::new()
    }
}
