/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::time::Duration;

pub const CLIENT_PORT: u16 = 5222;

pub const DEFAULT_RESOURCE: &str = "fxmpp";

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_IQ_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_MAX_STANZA_SIZE: usize = 1024 * 1024;

pub const STREAM_TAG: &str = "stream";

pub const FEATURES_TAG: &str = "features";

pub const STREAM_NS: &str = "http://etherx.jabber.org/streams";

pub const CLIENT_NS: &str = "jabber:client";

pub const TLS_NS: &str = "urn:ietf:params:xml:ns:xmpp-tls";

pub const SASL_NS: &str = "urn:ietf:params:xml:ns:xmpp-sasl";

pub const BIND_NS: &str = "urn:ietf:params:xml:ns:xmpp-bind";

pub const SESSION_NS: &str = "urn:ietf:params:xml:ns:xmpp-session";

pub const STANZAS_NS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";

pub const STREAMS_ERROR_NS: &str = "urn:ietf:params:xml:ns:xmpp-streams";

pub const PING_NS: &str = "urn:xmpp:ping";

pub const DATA_FORMS_NS: &str = "jabber:x:data";

pub const MUC_NS: &str = "http://jabber.org/protocol/muc";

pub const MUC_USER_NS: &str = "http://jabber.org/protocol/muc#user";

pub const MUC_ADMIN_NS: &str = "http://jabber.org/protocol/muc#admin";

pub const MUC_OWNER_NS: &str = "http://jabber.org/protocol/muc#owner";

/// Trace target for raw socket bytes.
pub const WIRE_TARGET: &str = "fxmpp_core::wire";
