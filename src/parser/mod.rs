/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod error;
mod location;

pub(crate) use error::description;
pub use error::SaxError;
pub use location::Location;

/// A token returned from the tokenizer.
#[derive(Debug, Eq, PartialEq)]
pub enum SaxElement<'a> {
    /// Name of a start tag or an empty element tag.
    ///
    /// Sent as soon as the name is complete. Attributes of the tag follow,
    /// and the tag is terminated with either a [StartTagContent](SaxElement::StartTagContent)
    /// or a [StartTagEmpty](SaxElement::StartTagEmpty).
    StartTag(&'a str),

    /// A tag attribute for the last StartTag.
    ///
    /// First argument is the attribute name and the second argument is the
    /// attribute value with all references replaced.
    Attribute(&'a str, &'a str),

    /// The last StartTag is closed with '>' and will have content.
    StartTagContent,

    /// The last StartTag is closed with '/>' and has no content.
    StartTagEmpty,

    /// An end tag with its full name.
    EndTag(&'a str),

    /// Character data with all references and character data sections resolved.
    ///
    /// A continuous block of text is delivered in one piece when the next
    /// markup starts, even when it arrives over several
    /// [parse_bytes()](SaxParser::parse_bytes) calls.
    CData(&'a str),
}

pub trait SaxHandler {
    fn handle_element(&mut self, element: &SaxElement) -> Result<(), SaxError>;
}

/// Incremental XML tokenizer for XMPP streams.
///
/// Input bytes can be fed in arbitrary pieces; tokens are reported to a
/// [SaxHandler] as soon as they are complete. The accepted language is the
/// restricted XML profile of XMPP: comments, document type declarations,
/// processing instructions other than the leading XML declaration, and
/// non-predefined entities are rejected.
///
/// # Examples
///
/// ```
/// use fxmpp_core::{SaxElement, SaxError, SaxHandler, SaxParser};
///
/// struct Printer;
/// impl SaxHandler for Printer {
///     fn handle_element(&mut self, element: &SaxElement) -> Result<(), SaxError> {
///         println!("{:?}", element);
///         Ok(())
///     }
/// }
///
/// let mut parser = SaxParser::new();
/// parser.parse_bytes(&mut Printer, b"<message><bo").unwrap();
/// parser.parse_bytes(&mut Printer, b"dy>hi</body></message>").unwrap();
/// parser.parse_finish().unwrap();
/// ```
pub struct SaxParser {
    state: State,
    uni_len: u32,
    uni_left: u32,
    uni_char: u32,
    depth: usize,
    is_end_tag: bool,
    quote: u8,
    seen_root: bool,
    seen_declaration: bool,
    failed: bool,
    value_pos: usize,
    buffer: Vec<u8>,
    ref_buffer: Vec<u8>,
    char_ref_value: u32,
    char_ref_digits: bool,
    is_value_ref: bool,
    max_token_size: usize,
    location: Location,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
    Prolog,
    TagStart,
    Declaration,
    DeclarationEnd,
    Markup,
    CDataSectionStart(usize),
    CDataSectionBody,
    CDataSectionMaybeEnd(usize),
    TagName,
    EndTagWhitespace,
    EmptyTagEnd,
    AttributeWhitespace,
    AttributeName,
    AttributeEq,
    AttributeValueStart,
    AttributeValue,
    CData,
    Reference,
    Entity,
    CharReference,
    DecimalCharReference,
    HexCharReference,
    Epilog,
}

const INITIAL_BUFFER_CAPACITY: usize = 128;

const REF_BUFFER_SIZE: usize = 8;

/// Default upper bound for a single buffered token.
pub const DEFAULT_MAX_TOKEN_SIZE: usize = 1024 * 1024;

const CDATA_SECTION_START: &[u8] = b"CDATA[";

macro_rules! whitespace {
    () => {
        b' ' | b'\t' | b'\r' | b'\n'
    };
}

fn is_valid_xml_char(c: u32) -> bool {
    matches!(
        c,
        0x09 | 0x0a | 0x0d | 0x20..=0xd7ff | 0xe000..=0xfffd | 0x10000..=0x10ffff
    )
}

macro_rules! xml_error {
    ($a:ident) => {
        return Err(SaxError::BadXml(description::$a))
    };
}

macro_rules! not_supported {
    ($a:ident) => {
        return Err(SaxError::NotSupported(description::$a))
    };
}

fn as_str(bytes: &[u8]) -> Result<&str, SaxError> {
    // Token boundaries are ASCII so a validated buffer never splits a sequence.
    std::str::from_utf8(bytes).map_err(|_| SaxError::BadXml(description::UTF8_INVALID_PREFIX_BYTE))
}

impl SaxParser {
    /// Creates a new tokenizer with the default token size limit.
    ///
    /// The instance can be reused for a new stream with the [reset()](SaxParser::reset) method.
    pub fn new() -> SaxParser {
        SaxParser::with_limit(DEFAULT_MAX_TOKEN_SIZE)
    }

    /// Creates a new tokenizer which fails with [SaxError::TooLarge] when a
    /// single tag or text block needs more than `max_token_size` bytes.
    pub fn with_limit(max_token_size: usize) -> SaxParser {
        SaxParser {
            state: State::Prolog,
            uni_len: 0,
            uni_left: 0,
            uni_char: 0,
            depth: 0,
            is_end_tag: false,
            quote: b'"',
            seen_root: false,
            seen_declaration: false,
            failed: false,
            value_pos: 0,
            buffer: Vec::with_capacity(INITIAL_BUFFER_CAPACITY),
            ref_buffer: Vec::with_capacity(REF_BUFFER_SIZE),
            char_ref_value: 0,
            char_ref_digits: false,
            is_value_ref: false,
            max_token_size,
            location: Location::new(),
        }
    }

    /// Resets the tokenizer into a clean state, keeping the size limit.
    pub fn reset(&mut self) {
        *self = SaxParser::with_limit(self.max_token_size);
    }

    /// Nesting depth of the currently open tags.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn location(&self) -> Location {
        self.location
    }

    fn push(&mut self, c: u8) -> Result<(), SaxError> {
        if self.buffer.len() >= self.max_token_size {
            return Err(SaxError::TooLarge(self.max_token_size));
        }
        self.buffer.push(c);
        Ok(())
    }

    fn push_str(&mut self, s: &str) -> Result<(), SaxError> {
        for c in s.bytes() {
            self.push(c)?;
        }
        Ok(())
    }

    fn push_char_ref(&mut self) -> Result<(), SaxError> {
        let c = match char::from_u32(self.char_ref_value) {
            Some(c) if is_valid_xml_char(self.char_ref_value) => c,
            _ => xml_error!(CHAR_INVALID),
        };
        let mut utf8 = [0u8; 4];
        self.push_str(c.encode_utf8(&mut utf8))?;
        self.end_reference();
        Ok(())
    }

    fn end_reference(&mut self) {
        if self.is_value_ref {
            self.state = State::AttributeValue;
        } else {
            self.state = State::CData;
        }
    }

    fn close_tag(&mut self) {
        self.depth -= 1;
        if self.depth == 0 {
            self.state = State::Epilog;
        } else {
            self.state = State::CData;
        }
    }

    fn flush_cdata(&mut self, handler: &mut impl SaxHandler) -> Result<(), SaxError> {
        if !self.buffer.is_empty() {
            handler.handle_element(&SaxElement::CData(as_str(&self.buffer)?))?;
            self.buffer.clear();
        }
        Ok(())
    }

    /// Checks that a complete document has been parsed.
    ///
    /// A complete document has a closed root tag and no unfinished markup.
    /// Streams never complete this way, so this is only useful for
    /// standalone fragments.
    pub fn parse_finish(&mut self) -> Result<(), SaxError> {
        if !self.seen_root {
            xml_error!(DOC_NO_CONTENT);
        }
        if self.depth > 0 {
            xml_error!(DOC_OPEN_TAGS);
        }
        if self.state != State::Epilog {
            xml_error!(DOC_OPEN_MARKUP);
        }
        Ok(())
    }

    /// Parses given bytes and checks if the document is complete.
    pub fn parse_bytes_finish(
        &mut self,
        handler: &mut impl SaxHandler,
        bytes: &[u8],
    ) -> Result<(), SaxError> {
        self.parse_bytes(handler, bytes)?;
        self.parse_finish()
    }

    /// Parses the next piece of input.
    ///
    /// After an error the tokenizer refuses further input until
    /// [reset()](SaxParser::reset) is called.
    pub fn parse_bytes(
        &mut self,
        handler: &mut impl SaxHandler,
        bytes: &[u8],
    ) -> Result<(), SaxError> {
        if self.failed {
            xml_error!(PARSER_REUSE_WITHOUT_RESET);
        }
        for &c in bytes {
            if let Err(err) = self.parse_byte(handler, c) {
                self.failed = true;
                return Err(err);
            }
            self.location.advance(c);
        }
        Ok(())
    }

    fn check_utf8(&mut self, c: u8) -> Result<(), SaxError> {
        if self.uni_left > 0 {
            if c & 0xc0 != 0x80 {
                xml_error!(UTF8_INVALID_CONT_BYTE);
            }
            self.uni_char = (self.uni_char << 6) | (c as u32 & 0x3f);
            self.uni_left -= 1;
            if self.uni_left == 0 {
                if (self.uni_len == 2 && self.uni_char <= 0x7f)
                    || (self.uni_len == 3 && self.uni_char <= 0x7ff)
                    || (self.uni_len == 4 && self.uni_char <= 0xffff)
                {
                    xml_error!(UTF8_OVERLONG_SEQUENCE);
                }
                if !is_valid_xml_char(self.uni_char) {
                    xml_error!(CHAR_INVALID);
                }
            }
        } else if c & 0x80 == 0x80 {
            if c & 0xe0 == 0xc0 {
                self.uni_len = 2;
                self.uni_left = 1;
                self.uni_char = c as u32 & 0x1f;
            } else if c & 0xf0 == 0xe0 {
                self.uni_len = 3;
                self.uni_left = 2;
                self.uni_char = c as u32 & 0x0f;
            } else if c & 0xf8 == 0xf0 {
                self.uni_len = 4;
                self.uni_left = 3;
                self.uni_char = c as u32 & 0x07;
            } else {
                xml_error!(UTF8_INVALID_PREFIX_BYTE);
            }
        } else if c < 0x20 && c != 0x09 && c != 0x0a && c != 0x0d {
            xml_error!(CHAR_INVALID);
        }
        Ok(())
    }

    fn parse_byte(&mut self, handler: &mut impl SaxHandler, c: u8) -> Result<(), SaxError> {
        self.check_utf8(c)?;

        match self.state {
            State::Prolog => match c {
                b'<' => self.state = State::TagStart,
                whitespace!() => (),
                _ => xml_error!(DOC_CDATA_WITHOUT_PARENT),
            },

            State::TagStart => match c {
                b'?' => {
                    if self.seen_root || self.seen_declaration {
                        not_supported!(PI_NOT_DECLARATION);
                    }
                    self.state = State::Declaration;
                }
                b'!' => self.state = State::Markup,
                b'/' => {
                    if self.depth == 0 {
                        xml_error!(TAG_CLOSE_WITHOUT_OPEN);
                    }
                    self.is_end_tag = true;
                    self.state = State::TagName;
                }
                whitespace!() => xml_error!(TAG_WHITESPACE_START),
                b'>' => xml_error!(TAG_EMPTY_NAME),
                b'<' | b'=' | b'"' | b'\'' => xml_error!(TAG_BAD_NAME),
                _ => {
                    if self.depth == 0 && self.seen_root {
                        xml_error!(TAG_OUTSIDE_ROOT);
                    }
                    self.depth += 1;
                    self.seen_root = true;
                    self.is_end_tag = false;
                    self.push(c)?;
                    self.state = State::TagName;
                }
            },

            State::Declaration => {
                if c == b'?' {
                    self.state = State::DeclarationEnd;
                }
            }

            State::DeclarationEnd => match c {
                b'>' => {
                    self.seen_declaration = true;
                    self.state = State::Prolog;
                }
                _ => xml_error!(PI_MISSING_END),
            },

            State::Markup => match c {
                b'[' => {
                    if self.depth == 0 {
                        xml_error!(MARKUP_CDATA_SECTION_OUTSIDE_ROOT);
                    }
                    self.state = State::CDataSectionStart(0);
                }
                b'-' => not_supported!(MARKUP_COMMENT),
                b'D' => not_supported!(MARKUP_DOCTYPE),
                _ => xml_error!(MARKUP_UNRECOGNIZED),
            },

            State::CDataSectionStart(matched) => {
                if c != CDATA_SECTION_START[matched] {
                    xml_error!(MARKUP_CDATA_SECTION_BAD_START);
                }
                if matched + 1 == CDATA_SECTION_START.len() {
                    self.state = State::CDataSectionBody;
                } else {
                    self.state = State::CDataSectionStart(matched + 1);
                }
            }

            State::CDataSectionBody => match c {
                b']' => self.state = State::CDataSectionMaybeEnd(1),
                _ => self.push(c)?,
            },

            State::CDataSectionMaybeEnd(brackets) => match c {
                b']' if brackets == 1 => self.state = State::CDataSectionMaybeEnd(2),
                b']' => self.push(b']')?,
                b'>' if brackets == 2 => self.state = State::CData,
                _ => {
                    for _ in 0..brackets {
                        self.push(b']')?;
                    }
                    self.push(c)?;
                    self.state = State::CDataSectionBody;
                }
            },

            State::TagName => match c {
                b'/' | b'>' | whitespace!() => {
                    if self.buffer.is_empty() {
                        xml_error!(TAG_EMPTY_NAME);
                    }
                    let name = as_str(&self.buffer)?;
                    if self.is_end_tag {
                        if c == b'/' {
                            xml_error!(TAG_DOUBLE_END);
                        }
                        handler.handle_element(&SaxElement::EndTag(name))?;
                    } else {
                        handler.handle_element(&SaxElement::StartTag(name))?;
                    }
                    self.buffer.clear();
                    match c {
                        b'/' => self.state = State::EmptyTagEnd,
                        b'>' => {
                            if self.is_end_tag {
                                self.close_tag();
                            } else {
                                handler.handle_element(&SaxElement::StartTagContent)?;
                                self.state = State::CData;
                            }
                        }
                        _ => {
                            if self.is_end_tag {
                                self.state = State::EndTagWhitespace;
                            } else {
                                self.state = State::AttributeWhitespace;
                            }
                        }
                    }
                }
                b'<' | b'=' | b'"' | b'\'' => xml_error!(TAG_BAD_NAME),
                _ => self.push(c)?,
            },

            State::EmptyTagEnd => match c {
                b'>' => {
                    handler.handle_element(&SaxElement::StartTagEmpty)?;
                    self.close_tag();
                }
                _ => xml_error!(TAG_EMPTY_TAG_MISSING_END),
            },

            State::EndTagWhitespace => match c {
                b'>' => self.close_tag(),
                whitespace!() => (),
                _ => xml_error!(TAG_END_TAG_ATTRIBUTES),
            },

            State::AttributeWhitespace => match c {
                whitespace!() => (),
                b'/' => self.state = State::EmptyTagEnd,
                b'>' => {
                    handler.handle_element(&SaxElement::StartTagContent)?;
                    self.state = State::CData;
                }
                b'<' | b'=' | b'"' | b'\'' => xml_error!(TAG_ATTRIBUTE_BAD_NAME),
                _ => {
                    self.push(c)?;
                    self.state = State::AttributeName;
                }
            },

            State::AttributeName => match c {
                b'=' => {
                    self.value_pos = self.buffer.len();
                    self.state = State::AttributeValueStart;
                }
                whitespace!() => self.state = State::AttributeEq,
                b'/' | b'>' | b'<' | b'"' | b'\'' => xml_error!(TAG_ATTRIBUTE_BAD_NAME),
                _ => self.push(c)?,
            },

            State::AttributeEq => match c {
                b'=' => {
                    self.value_pos = self.buffer.len();
                    self.state = State::AttributeValueStart;
                }
                whitespace!() => (),
                _ => xml_error!(TAG_ATTRIBUTE_WITHOUT_EQUAL),
            },

            State::AttributeValueStart => match c {
                b'"' | b'\'' => {
                    self.quote = c;
                    self.state = State::AttributeValue;
                }
                whitespace!() => (),
                _ => xml_error!(TAG_ATTRIBUTE_WITHOUT_QUOTE),
            },

            State::AttributeValue => match c {
                b'&' => {
                    self.ref_buffer.clear();
                    self.is_value_ref = true;
                    self.state = State::Reference;
                }
                b'<' => xml_error!(TAG_ATTRIBUTE_BAD_VALUE),
                _ if c == self.quote => {
                    let name = as_str(&self.buffer[..self.value_pos])?;
                    let value = as_str(&self.buffer[self.value_pos..])?;
                    handler.handle_element(&SaxElement::Attribute(name, value))?;
                    self.buffer.clear();
                    self.state = State::AttributeWhitespace;
                }
                _ => self.push(c)?,
            },

            State::CData => match c {
                b'<' => {
                    self.flush_cdata(handler)?;
                    self.state = State::TagStart;
                }
                b'&' => {
                    self.ref_buffer.clear();
                    self.is_value_ref = false;
                    self.state = State::Reference;
                }
                _ => self.push(c)?,
            },

            State::Reference => match c {
                b'#' => {
                    self.char_ref_value = 0;
                    self.char_ref_digits = false;
                    self.state = State::CharReference;
                }
                b';' => xml_error!(REFERENCE_EMPTY),
                _ => {
                    self.ref_buffer.push(c);
                    self.state = State::Entity;
                }
            },

            State::Entity => match c {
                b';' => {
                    let ent = match self.ref_buffer.as_slice() {
                        b"amp" => "&",
                        b"lt" => "<",
                        b"gt" => ">",
                        b"quot" => "\"",
                        b"apos" => "'",
                        _ => not_supported!(REFERENCE_CUSTOM_ENTITY),
                    };
                    self.push_str(ent)?;
                    self.end_reference();
                }
                _ => {
                    if self.ref_buffer.len() >= REF_BUFFER_SIZE {
                        not_supported!(REFERENCE_CUSTOM_ENTITY);
                    }
                    self.ref_buffer.push(c);
                }
            },

            State::CharReference => match c {
                b'x' => self.state = State::HexCharReference,
                b'0'..=b'9' => {
                    self.char_ref_value = (c - b'0') as u32;
                    self.state = State::DecimalCharReference;
                }
                _ => xml_error!(REFERENCE_INVALID_DECIMAL),
            },

            State::DecimalCharReference => match c {
                b';' => self.push_char_ref()?,
                b'0'..=b'9' => {
                    self.char_ref_value = self.char_ref_value * 10 + (c - b'0') as u32;
                    if self.char_ref_value > 0x10ffff {
                        xml_error!(CHAR_INVALID);
                    }
                }
                _ => xml_error!(REFERENCE_INVALID_DECIMAL),
            },

            State::HexCharReference => match c {
                b';' => {
                    if !self.char_ref_digits {
                        xml_error!(REFERENCE_INVALID_HEX);
                    }
                    self.push_char_ref()?;
                }
                _ => match (c as char).to_digit(16) {
                    Some(digit) => {
                        self.char_ref_digits = true;
                        self.char_ref_value = self.char_ref_value * 16 + digit;
                        if self.char_ref_value > 0x10ffff {
                            xml_error!(CHAR_INVALID);
                        }
                    }
                    None => xml_error!(REFERENCE_INVALID_HEX),
                },
            },

            State::Epilog => match c {
                whitespace!() => (),
                _ => xml_error!(DOC_CONTENT_AFTER_ROOT),
            },
        }

        Ok(())
    }
}

impl Default for SaxParser {
    fn default() -> Self {
        Self::new()
    }
}
