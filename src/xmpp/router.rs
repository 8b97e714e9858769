/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::collections::HashMap;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::debug;

use super::Iq;
use super::IqType;
use super::Stanza;
use super::StanzaKind;
use super::XmppError;
use super::constants::PING_NS;

/// Selects inbound stanzas for a subscriber.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Filter {
    All,
    Kind(StanzaKind),
    /// Stanzas with a child element in this namespace.
    Namespace(String),
    /// IQ stanzas with this id, including responses to our own requests.
    IqId(String),
    Any(Vec<Filter>),
}

impl Filter {
    pub fn any(filters: impl IntoIterator<Item = Filter>) -> Filter {
        Filter::Any(filters.into_iter().collect())
    }

    pub fn matches(&self, stanza: &Stanza) -> bool {
        match self {
            Filter::All => true,
            Filter::Kind(kind) => stanza.kind() == *kind,
            Filter::Namespace(ns) => stanza.has_payload_ns(ns),
            Filter::IqId(id) => stanza.kind() == StanzaKind::Iq && stanza.id() == Some(id.as_str()),
            Filter::Any(filters) => filters.iter().any(|f| f.matches(stanza)),
        }
    }

    /// True if the filter asks for this IQ by its id.
    fn names_iq(&self, stanza: &Stanza) -> bool {
        match self {
            Filter::IqId(_) => self.matches(stanza),
            Filter::Any(filters) => filters.iter().any(|f| f.names_iq(stanza)),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler can take no more stanzas and should be removed.
    #[error("handler is closed")]
    Closed,

    #[error("handler failed: {0}")]
    Failed(String),
}

/// Receives the stanzas a subscription matched.
///
/// Handlers are called on the reader task, so they must not block.
pub trait StanzaHandler: Send {
    fn handle(&mut self, stanza: &Stanza) -> Result<(), HandlerError>;
}

impl StanzaHandler for mpsc::UnboundedSender<Stanza> {
    fn handle(&mut self, stanza: &Stanza) -> Result<(), HandlerError> {
        self.send(stanza.clone()).map_err(|_| HandlerError::Closed)
    }
}

/// Adapts a closure into a [StanzaHandler].
pub struct FnHandler<F>(pub F);

impl<F> StanzaHandler for FnHandler<F>
where
    F: FnMut(&Stanza) -> Result<(), HandlerError> + Send,
{
    fn handle(&mut self, stanza: &Stanza) -> Result<(), HandlerError> {
        (self.0)(stanza)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    filter: Filter,
    handler: Box<dyn StanzaHandler>,
}

/// Delivers inbound stanzas to subscribers.
#[derive(Default)]
pub struct Router {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl Router {
    pub fn new() -> Self {
        Router::default()
    }

    pub fn subscribe(&mut self, filter: Filter, handler: Box<dyn StanzaHandler>) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        debug!(subscription = id.0, ?filter, "subscribe");
        self.subscriptions.push(Subscription {
            id,
            filter,
            handler,
        });
        id
    }

    /// Returns false if there was no such subscription.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        before != self.subscriptions.len()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Delivers a stanza in subscription order.
    ///
    /// When `resolved` is set the stanza answered a pending request, and
    /// only subscribers asking for its id see it. Handler failures are
    /// returned as diagnostics; closed handlers are dropped.
    pub fn deliver(&mut self, stanza: &Stanza, resolved: bool) -> Vec<String> {
        let mut diagnostics = Vec::new();
        self.subscriptions.retain_mut(|sub| {
            let wanted = if resolved {
                sub.filter.names_iq(stanza)
            } else {
                sub.filter.matches(stanza)
            };
            if !wanted {
                return true;
            }
            match sub.handler.handle(stanza) {
                Ok(()) => true,
                Err(HandlerError::Closed) => {
                    debug!(subscription = sub.id.0, "dropping closed handler");
                    false
                }
                Err(err) => {
                    diagnostics.push(format!("subscription {}: {err}", sub.id.0));
                    true
                }
            }
        });
        diagnostics
    }
}

/// The result of an IQ request.
pub type IqResult = Result<Iq, XmppError>;

/// An IQ request waiting for its response.
#[derive(Debug)]
pub struct PendingRequest {
    pub id: String,
    pub issued_at: Instant,
    pub expected: StanzaKind,
    sender: oneshot::Sender<IqResult>,
}

/// Outstanding IQ requests keyed by id.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<String, PendingRequest>,
}

impl PendingTable {
    pub fn new() -> Self {
        PendingTable::default()
    }

    /// Adds an entry, failing if the id is already waiting.
    pub fn register(&mut self, id: &str) -> Result<oneshot::Receiver<IqResult>, XmppError> {
        if id.is_empty() {
            return Err(XmppError::InvalidArgument("iq id is empty".to_string()));
        }
        if self.entries.contains_key(id) {
            return Err(XmppError::InvalidArgument(format!(
                "iq id {id} is already pending"
            )));
        }
        let (sender, receiver) = oneshot::channel();
        self.entries.insert(
            id.to_string(),
            PendingRequest {
                id: id.to_string(),
                issued_at: Instant::now(),
                expected: StanzaKind::Iq,
                sender,
            },
        );
        Ok(receiver)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Completes the request this IQ answers. Returns false if the IQ
    /// is not a response or no request has its id.
    pub fn resolve(&mut self, iq: &Iq) -> bool {
        if !iq.is_response() {
            return false;
        }
        let Some(request) = self.entries.remove(iq.id()) else {
            return false;
        };
        debug!(
            id = %request.id,
            kind = %request.expected,
            elapsed_ms = request.issued_at.elapsed().as_millis() as u64,
            "iq resolved"
        );
        let result = match iq.iq_type() {
            IqType::Error => Err(iq
                .error()
                .map(XmppError::from)
                .unwrap_or_else(|| XmppError::StanzaError {
                    condition: "undefined-condition".to_string(),
                    text: None,
                })),
            _ => Ok(iq.clone()),
        };
        // The waiter may be gone already.
        let _ = request.sender.send(result);
        true
    }

    /// Drops an entry and fails it with `error`.
    pub fn fail(&mut self, id: &str, error: XmppError) -> bool {
        match self.entries.remove(id) {
            Some(request) => {
                let _ = request.sender.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Resolves an entry with `Cancelled`.
    pub fn cancel(&mut self, id: &str) -> bool {
        self.fail(id, XmppError::Cancelled)
    }

    /// Drops an entry without completing it.
    pub fn remove(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Fails every entry with a clone of `error`.
    pub fn fail_all(&mut self, error: &XmppError) {
        for (_, request) in self.entries.drain() {
            let _ = request.sender.send(Err(error.clone()));
        }
    }
}

/// Builds the automatic answer to an XEP-0199 ping.
pub fn ping_reply(stanza: &Stanza) -> Option<Stanza> {
    match stanza {
        Stanza::Iq(iq) if iq.iq_type() == IqType::Get && iq.payload("ping", PING_NS).is_some() => {
            Some(Stanza::Iq(iq.make_result()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use super::*;
    use crate::xmpp::constants::MUC_USER_NS;

    fn stanza(xml: &str) -> Stanza {
        Stanza::from_xml(xml).unwrap()
    }

    #[test]
    fn filters() {
        let message = stanza("<message><x xmlns='http://jabber.org/protocol/muc#user'/></message>");
        let iq = stanza("<iq type='result' id='abc1'/>");
        assert!(Filter::All.matches(&message));
        assert!(Filter::Kind(StanzaKind::Message).matches(&message));
        assert!(!Filter::Kind(StanzaKind::Presence).matches(&message));
        assert!(Filter::Namespace(MUC_USER_NS.to_string()).matches(&message));
        assert!(!Filter::Namespace(MUC_USER_NS.to_string()).matches(&iq));
        assert!(Filter::IqId("abc1".to_string()).matches(&iq));
        assert!(!Filter::IqId("abc2".to_string()).matches(&iq));
        let any = Filter::any([
            Filter::Kind(StanzaKind::Presence),
            Filter::IqId("abc1".to_string()),
        ]);
        assert!(any.matches(&iq));
        assert!(!any.matches(&message));
    }

    #[test]
    fn delivery_order_and_failures() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut router = Router::new();
        for n in 0..3 {
            let seen = seen.clone();
            router.subscribe(
                Filter::All,
                Box::new(FnHandler(move |_: &Stanza| {
                    seen.lock().unwrap().push(n);
                    if n == 1 {
                        Err(HandlerError::Failed("boom".to_string()))
                    } else {
                        Ok(())
                    }
                })),
            );
        }
        let diagnostics = router.deliver(&stanza("<presence/>"), false);
        assert_eq!(*seen.lock().unwrap(), [0, 1, 2]);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].contains("boom"));
        assert_eq!(router.len(), 3);
    }

    #[test]
    fn closed_channels_are_dropped() {
        let mut router = Router::new();
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = router.subscribe(Filter::Kind(StanzaKind::Message), Box::new(sender));
        router.deliver(&stanza("<message/>"), false);
        drop(receiver);
        assert!(router.deliver(&stanza("<message/>"), false).is_empty());
        assert!(router.is_empty());
        assert!(!router.unsubscribe(id));
    }

    #[test]
    fn resolved_responses() {
        let mut router = Router::new();
        let (by_kind, mut by_kind_rx) = mpsc::unbounded_channel();
        let (by_id, mut by_id_rx) = mpsc::unbounded_channel();
        router.subscribe(Filter::Kind(StanzaKind::Iq), Box::new(by_kind));
        router.subscribe(Filter::IqId("abc1".to_string()), Box::new(by_id));

        let response = stanza("<iq type='result' id='abc1'/>");
        router.deliver(&response, true);
        assert!(by_kind_rx.try_recv().is_err());
        assert_eq!(by_id_rx.try_recv().unwrap(), response);

        router.deliver(&response, false);
        assert_eq!(by_kind_rx.try_recv().unwrap(), response);
    }

    fn iq(xml: &str) -> Iq {
        match stanza(xml) {
            Stanza::Iq(iq) => iq,
            _ => panic!("not an iq"),
        }
    }

    #[test]
    fn pending_by_id() {
        let mut table = PendingTable::new();
        let mut receiver = table.register("abc1").unwrap();
        assert!(matches!(
            table.register("abc1"),
            Err(XmppError::InvalidArgument(_))
        ));

        assert!(!table.resolve(&iq("<iq type='result' id='abc2'/>")));
        assert!(!table.resolve(&iq("<iq type='get' id='abc1'/>")));
        assert!(receiver.try_recv().is_err());
        assert!(table.contains("abc1"));

        assert!(table.resolve(&iq("<iq type='result' id='abc1'/>")));
        assert_eq!(receiver.try_recv().unwrap().unwrap().id(), "abc1");
        assert!(table.is_empty());
    }

    #[test]
    fn pending_errors() {
        let mut table = PendingTable::new();
        let mut receiver = table.register("e1").unwrap();
        table.resolve(&iq(
            "<iq type='error' id='e1'><error type='cancel'>\
             <item-not-found xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/></error></iq>",
        ));
        assert_eq!(
            receiver.try_recv().unwrap(),
            Err(XmppError::StanzaError {
                condition: "item-not-found".to_string(),
                text: None
            })
        );

        let mut a = table.register("a").unwrap();
        let mut b = table.register("b").unwrap();
        assert!(table.cancel("a"));
        assert!(!table.cancel("a"));
        assert_eq!(a.try_recv().unwrap(), Err(XmppError::Cancelled));
        table.fail_all(&XmppError::NotConnected);
        assert_eq!(b.try_recv().unwrap(), Err(XmppError::NotConnected));
        assert!(table.is_empty());
    }

    #[test]
    fn pings() {
        let reply = ping_reply(&stanza(
            "<iq type='get' id='p1' from='example.com'><ping xmlns='urn:xmpp:ping'/></iq>",
        ))
        .unwrap();
        assert_eq!(
            reply.to_xml(),
            "<iq to=\"example.com\" type=\"result\" id=\"p1\"/>"
        );
        assert!(ping_reply(&stanza("<iq type='get' id='p2'><query xmlns='jabber:iq:version'/></iq>")).is_none());
    }
}
