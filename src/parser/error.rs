/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use thiserror::Error;

/// Type of the error which happened during tokenizing.
///
/// These categories correspond to the distinct actions the caller
/// might take. The position of the failing byte is available via the
/// [location()](super::SaxParser::location) method.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum SaxError {
    /// A syntax error is encountered in the XML input.
    ///
    /// The argument is a human readable description of the problem.
    #[error("invalid xml syntax: {0}")]
    BadXml(&'static str),

    /// The input uses an XML construct which is not allowed on an
    /// XMPP stream, such as comments, document type declarations,
    /// processing instructions, or custom entities.
    #[error("xml construct not allowed: {0}")]
    NotSupported(&'static str),

    /// A single token or a buffered element grew over the configured
    /// limit. The argument is the limit in bytes.
    #[error("xml token exceeds {0} bytes")]
    TooLarge(usize),

    /// Element handler returned this error.
    ///
    /// This lets a handler abort the processing while signalling that
    /// the interruption is not caused by the tokenizer itself.
    #[error("handler error: {0}")]
    HandlerError(String),
}

pub(crate) mod description {
    pub const PARSER_REUSE_WITHOUT_RESET: &str = "cannot continue after an error without a reset";
    pub const UTF8_INVALID_CONT_BYTE: &str = "invalid UTF8 continuation byte";
    pub const UTF8_OVERLONG_SEQUENCE: &str = "overlong UTF8 sequence";
    pub const UTF8_INVALID_PREFIX_BYTE: &str = "invalid UTF8 prefix byte";
    pub const CHAR_INVALID: &str = "invalid XML character";
    pub const DOC_NO_CONTENT: &str = "document has no root tag";
    pub const DOC_OPEN_TAGS: &str = "document has unclosed tags";
    pub const DOC_OPEN_MARKUP: &str = "document ends inside markup";
    pub const DOC_CDATA_WITHOUT_PARENT: &str = "character data not allowed outside of the root tag";
    pub const DOC_CONTENT_AFTER_ROOT: &str = "nothing but whitespace may follow the root tag";
    pub const TAG_CLOSE_WITHOUT_OPEN: &str = "close tag without open";
    pub const TAG_WHITESPACE_START: &str = "tag cannot start with whitespace";
    pub const TAG_OUTSIDE_ROOT: &str = "tags cannot be outside of the root tag";
    pub const TAG_EMPTY_NAME: &str = "tag has no name";
    pub const TAG_BAD_NAME: &str = "tag names cannot have '<', '=' or quotes";
    pub const TAG_DOUBLE_END: &str = "end tag has standalone ending too";
    pub const TAG_END_TAG_ATTRIBUTES: &str = "end tag cannot have attributes";
    pub const TAG_EMPTY_TAG_MISSING_END: &str = "empty element tags must end after the '/'";
    pub const TAG_ATTRIBUTE_WITHOUT_EQUAL: &str = "tag attributes must have '=' before the value";
    pub const TAG_ATTRIBUTE_WITHOUT_QUOTE: &str = "tag attribute value must be in double or single quotes";
    pub const TAG_ATTRIBUTE_BAD_NAME: &str = "tag attribute names cannot have '/', '<', '>' or quotes";
    pub const TAG_ATTRIBUTE_BAD_VALUE: &str = "tag attribute value cannot have '<' character";
    pub const REFERENCE_EMPTY: &str = "reference has no name";
    pub const REFERENCE_INVALID_DECIMAL: &str = "non digit in decimal character reference";
    pub const REFERENCE_INVALID_HEX: &str = "non hex digit in hexadecimal character reference";
    pub const REFERENCE_CUSTOM_ENTITY: &str = "only the predefined entities are allowed";
    pub const MARKUP_CDATA_SECTION_BAD_START: &str = "character data sections must start with '[CDATA['";
    pub const MARKUP_CDATA_SECTION_OUTSIDE_ROOT: &str = "character data sections cannot be outside of the root tag";
    pub const MARKUP_UNRECOGNIZED: &str = "markup is not a character data section";
    pub const MARKUP_COMMENT: &str = "comments are not allowed";
    pub const MARKUP_DOCTYPE: &str = "document type declarations are not allowed";
    pub const PI_NOT_DECLARATION: &str = "processing instructions other than the xml declaration are not allowed";
    pub const PI_MISSING_END: &str = "xml declaration must end after the '?'";
    pub const HANDLER_UNBOUND_PREFIX: &str = "namespace prefix is not bound";
    pub const HANDLER_TAG_MISMATCH: &str = "end tag does not match the start tag";
    pub const HANDLER_DUPLICATE_ATTRIBUTE: &str = "attribute is repeated";
    pub const HANDLER_TEXT_BETWEEN_STANZAS: &str = "only whitespace may appear between top level elements";
}
