/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

//! XMPP client core with multi-user chat.
//!
//! The crate root holds the streaming XML layer: a SAX parser and the
//! owned [Element] tree built from it. The [xmpp] module builds the
//! client on top.

mod element;
mod entities;
mod parser;

#[cfg(feature = "xmpp")]
pub mod xmpp;

pub use parser::Location;
pub use parser::SaxElement;
pub use parser::SaxError;
pub use parser::SaxHandler;
pub use parser::SaxParser;

pub use element::Built;
pub use element::Element;
pub use element::ElementBuilder;
pub use element::ElementError;
pub use element::Node;
pub use element::XML_NS;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
