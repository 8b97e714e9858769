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

use crate::ElementError;
use crate::xmpp::BadJid;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum BadStanza {
    #[error("invalid stanza xml: {0}")]
    Xml(#[from] ElementError),

    #[error("invalid stanza address: {0}")]
    Jid(#[from] BadJid),

    #[error("invalid stanza: {0}")]
    Invalid(&'static str),
}

pub(super) mod description {
    pub(in super::super) const NOT_A_STANZA: &str = "top level element is not message, presence or iq";
    pub(in super::super) const WRONG_NAMESPACE: &str = "stanza is not in the jabber:client namespace";
    pub(in super::super) const BAD_TYPE: &str = "unknown type attribute";
    pub(in super::super) const IQ_WITHOUT_ID: &str = "iq stanza has no id";
    pub(in super::super) const IQ_WITHOUT_TYPE: &str = "iq stanza has no type";
}
