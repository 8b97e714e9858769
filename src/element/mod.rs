/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod builder;
mod error;

pub use builder::Built;
pub use builder::ElementBuilder;
pub use builder::XML_NS;
pub use error::ElementError;

use std::fmt::Write;
use std::str::FromStr;

use crate::SaxError;
use crate::SaxParser;
use crate::entities::escape;
use crate::entities::escaped_size;
use crate::parser::description;

/// Content of an element.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An owned XML element with a resolved namespace.
///
/// Namespace declarations are not kept as attributes. The serializer
/// emits an `xmlns` attribute wherever an element's namespace differs
/// from its parent's, so a tree always prints as well formed XML no
/// matter where it is placed.
///
/// ```
/// use fxmpp_core::Element;
///
/// let body = Element::new("body", "jabber:client").with_text("hi & bye");
/// let message = Element::new("message", "jabber:client")
///     .with_attribute("to", "juliet@example.com")
///     .with_child(body);
/// assert_eq!(
///     message.to_string(),
///     "<message xmlns=\"jabber:client\" to=\"juliet@example.com\"><body>hi &amp; bye</body></message>"
/// );
/// ```
#[derive(Clone, Debug, Eq)]
pub struct Element {
    name: String,
    namespace: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Element {
        Element {
            name: name.into(),
            namespace: namespace.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Local name of the element, without any prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn is(&self, name: &str, namespace: &str) -> bool {
        self.name == name && self.namespace == namespace
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Sets an attribute, replacing an existing value with the same name.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some(attr) => attr.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let pos = self.attributes.iter().position(|(n, _)| n == name)?;
        Some(self.attributes.remove(pos).1)
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Element {
        self.set_attribute(name, value);
        self
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Iterates over the child elements, skipping text.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    pub fn get_child(&self, name: &str, namespace: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(name, namespace))
    }

    pub fn get_children<'a>(
        &'a self,
        name: &'a str,
        namespace: &'a str,
    ) -> impl Iterator<Item = &'a Element> {
        self.elements().filter(move |e| e.is(name, namespace))
    }

    pub fn has_child(&self, name: &str, namespace: &str) -> bool {
        self.get_child(name, namespace).is_some()
    }

    pub fn append_child(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn with_child(mut self, child: Element) -> Element {
        self.append_child(child);
        self
    }

    /// Appends text content. Adjacent text is merged into one node.
    pub fn append_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.children.last_mut() {
            Some(Node::Text(last)) => last.push_str(text),
            _ => self.children.push(Node::Text(text.to_string())),
        }
    }

    pub fn with_text(mut self, text: &str) -> Element {
        self.append_text(text);
        self
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    pub fn child_text(&self, name: &str, namespace: &str) -> Option<String> {
        self.get_child(name, namespace).map(Element::text)
    }

    fn serialized_size(&self, parent_ns: &str) -> usize {
        let mut size = 1 + self.name.len();
        if self.namespace != parent_ns {
            size += " xmlns=\"\"".len() + escaped_size(&self.namespace);
        }
        for (name, value) in &self.attributes {
            // name="value" plus a leading space
            size += name.len() + 4 + escaped_size(value);
        }
        if self.children.is_empty() {
            return size + 2;
        }
        size += 1;
        for child in &self.children {
            size += match child {
                Node::Element(element) => element.serialized_size(&self.namespace),
                Node::Text(text) => escaped_size(text),
            };
        }
        size + 3 + self.name.len()
    }

    /// Serializes the element as if it was placed inside an element in
    /// the `parent_ns` namespace.
    pub fn to_xml_in(&self, parent_ns: &str) -> String {
        let mut xml = String::with_capacity(self.serialized_size(parent_ns));
        // Writing into a String cannot fail.
        let _ = self.write_xml(&mut xml, parent_ns);
        xml
    }

    fn write_xml(&self, out: &mut impl Write, parent_ns: &str) -> std::fmt::Result {
        out.write_char('<')?;
        out.write_str(&self.name)?;
        if self.namespace != parent_ns {
            out.write_str(" xmlns=\"")?;
            escape(&self.namespace, out)?;
            out.write_char('"')?;
        }
        for (name, value) in &self.attributes {
            out.write_char(' ')?;
            out.write_str(name)?;
            out.write_str("=\"")?;
            escape(value, out)?;
            out.write_char('"')?;
        }
        if self.children.is_empty() {
            return out.write_str("/>");
        }
        out.write_char('>')?;
        for child in &self.children {
            match child {
                Node::Element(element) => element.write_xml(out, &self.namespace)?,
                Node::Text(text) => escape(text, out)?,
            }
        }
        out.write_str("</")?;
        out.write_str(&self.name)?;
        out.write_char('>')
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Element) -> bool {
        if self.name != other.name
            || self.namespace != other.namespace
            || self.attributes.len() != other.attributes.len()
            || self.children != other.children
        {
            return false;
        }
        self.attributes
            .iter()
            .all(|(name, value)| other.attribute(name) == Some(value.as_str()))
    }
}

impl std::fmt::Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.write_xml(f, "")
    }
}

impl Element {
    /// Parses a standalone element as if it appeared inside an element
    /// with `namespace` as the default namespace.
    pub fn parse_in(s: &str, namespace: &str) -> Result<Element, ElementError> {
        parse_with(s, ElementBuilder::with_default_namespace(namespace))
    }
}

impl FromStr for Element {
    type Err = ElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_with(s, ElementBuilder::new())
    }
}

fn parse_with(s: &str, mut builder: ElementBuilder) -> Result<Element, ElementError> {
    let mut parser = SaxParser::new();
    parser
        .parse_bytes_finish(&mut builder, s.as_bytes())
        .map_err(|err| ElementError::new(err, parser.location()))?;
    builder
        .take_output()
        .into_iter()
        .find_map(|built| match built {
            Built::Element(element) => Some(element),
            _ => None,
        })
        .ok_or_else(|| {
            ElementError::new(
                SaxError::BadXml(description::DOC_NO_CONTENT),
                parser.location(),
            )
        })
}

#[cfg(test)]
mod tests;
