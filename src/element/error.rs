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

use crate::Location;
use crate::SaxError;

/// Error returned when text cannot be turned into an [Element](super::Element).
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{error} at {location}")]
pub struct ElementError {
    pub error: SaxError,
    pub location: Location,
}

impl ElementError {
    pub(super) fn new(error: SaxError, location: Location) -> Self {
        ElementError { error, location }
    }
}
