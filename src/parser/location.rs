/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::fmt::Display;

/// A position in the tokenizer input byte stream.
///
/// Returned from [SaxParser::location()](crate::SaxParser::location),
/// it points just after the last consumed byte. Stream decode errors
/// carry it so a bad server frame can be found in a wire trace.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Location {
    /// Bytes consumed since the last reset.
    pub bytes: usize,
    /// Newline characters consumed.
    pub lines: usize,
    /// Bytes consumed after the last newline.
    pub column: usize,
}

impl Location {
    pub fn new() -> Self {
        Location::default()
    }

    pub(super) fn advance(&mut self, c: u8) {
        self.bytes += 1;
        if c == b'\n' {
            self.lines += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "byte {}, line {}, column {}",
            self.bytes, self.lines, self.column
        )
    }
}
