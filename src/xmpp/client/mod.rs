/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

//! The command surface of the library.
//!
//! An [XmppClient] drives one connection at a time. Commands are async
//! methods which complete exactly once with a `Result`; everything the
//! client learns without being asked arrives on the [Events] channel
//! returned by the constructor.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::io::ReadHalf;
use tokio::io::WriteHalf;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::Element;

use super::ConnectionConfig;
use super::ConnectionState;
use super::Connector;
use super::Event;
use super::Events;
use super::Filter;
use super::Iq;
use super::IqResult;
use super::Jid;
use super::JoinOptions;
use super::Message;
use super::Presence;
use super::Room;
use super::RoomEvent;
use super::Router;
use super::Stanza;
use super::StanzaHandler;
use super::StateMachine;
use super::StreamEvent;
use super::StreamParser;
use super::SubscriptionId;
use super::TcpConnector;
use super::Transport;
use super::TrustPolicy;
use super::XmppError;
use super::constants::STREAM_NS;
use super::muc::Affiliation;
use super::muc::MucManager;
use super::muc::Role;
use super::muc::stanzas;
use super::muc::stanzas::AdminItem;
use super::parser::STREAM_FOOTER;
use super::parser::serialize;
use super::protocol::Session;
use super::protocol::negotiate;
use super::protocol::stream_error;
use super::router::PendingTable;
use super::router::ping_reply;
use super::stanza::generate_id;

/// How long `disconnect()` waits for the closing tag to be written.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Outbound {
    Frame(Vec<u8>),
    Close,
}

/// A live connection: exists only while the state is `Ready`.
struct Link {
    generation: u64,
    outbound: mpsc::UnboundedSender<Outbound>,
    jid: Jid,
    iq_timeout: Duration,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Why the reader stopped: the state to enter and the error to report.
type Exit = (ConnectionState, XmppError);

struct Shared {
    events: mpsc::UnboundedSender<Event>,
    state: Mutex<StateMachine>,
    router: Mutex<Router>,
    pending: Mutex<PendingTable>,
    muc: Mutex<MucManager>,
    link: Mutex<Option<Link>>,
    generation: AtomicU64,
}

impl Shared {
    fn emit(&self, event: Event) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    fn emit_room(&self, events: Vec<RoomEvent>) {
        for event in events {
            self.emit(Event::Room(event));
        }
    }

    fn set_state(&self, next: ConnectionState) -> bool {
        let mut machine = lock(&self.state);
        if !machine.transition(next) {
            return false;
        }
        self.emit(Event::ConnectionState(next));
        true
    }

    fn begin_connect(&self) -> bool {
        let mut machine = lock(&self.state);
        if !machine.state().is_idle() || !machine.transition(ConnectionState::Connecting) {
            return false;
        }
        self.emit(Event::ConnectionState(ConnectionState::Connecting));
        true
    }

    fn iq_timeout(&self) -> Result<Duration, XmppError> {
        lock(&self.link)
            .as_ref()
            .map(|link| link.iq_timeout)
            .ok_or(XmppError::NotConnected)
    }

    fn send(&self, stanza: &Stanza) -> Result<(), XmppError> {
        let link = lock(&self.link);
        let Some(link) = link.as_ref() else {
            return Err(XmppError::NotConnected);
        };
        link.outbound
            .send(Outbound::Frame(serialize(stanza)))
            .map_err(|_| XmppError::NotConnected)
    }

    fn start<S>(self: &Arc<Self>, session: Session<S>, iq_timeout: Duration)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let Session {
            transport,
            parser,
            jid,
            backlog,
            ..
        } = session;
        let (reader, writer) = transport.split();
        let (outbound, queue) = mpsc::unbounded_channel();
        // Held until the link is stored, so an early exit of the tasks
        // cannot miss it.
        let mut link = lock(&self.link);
        self.set_state(ConnectionState::Ready);
        let writer = tokio::spawn(write_loop(Arc::clone(self), generation, writer, queue));
        let reader = tokio::spawn(read_loop(
            Arc::clone(self),
            generation,
            reader,
            parser,
            backlog,
        ));
        *link = Some(Link {
            generation,
            outbound,
            jid,
            iq_timeout,
            reader,
            writer,
        });
    }

    /// Tears down the link of `generation` after a fatal error. The
    /// state event goes out before any waiting command is failed.
    fn teardown(&self, generation: u64, state: ConnectionState, error: XmppError) {
        let link = {
            let mut link = lock(&self.link);
            if link.as_ref().is_some_and(|current| current.generation == generation) {
                link.take()
            } else {
                None
            }
        };
        let Some(link) = link else {
            return;
        };
        warn!(%error, %state, "connection closed");
        link.reader.abort();
        drop(link);
        self.set_state(state);
        lock(&self.pending).fail_all(&error);
        lock(&self.muc).fail_all(&error);
    }

    fn process(&self, event: StreamEvent) -> Result<(), Exit> {
        match event {
            StreamEvent::Element(element) if element.is("error", STREAM_NS) => {
                Err((ConnectionState::Error, stream_error(&element)))
            }
            StreamEvent::Element(element) => {
                self.dispatch(element);
                Ok(())
            }
            StreamEvent::End => Err((
                ConnectionState::ConnectionLost,
                XmppError::Network("server closed the stream".to_string()),
            )),
            StreamEvent::StreamStart(_) => Err((
                ConnectionState::Error,
                XmppError::MalformedXml("unexpected stream header".to_string()),
            )),
        }
    }

    fn dispatch(&self, element: Element) {
        let name = element.name().to_string();
        let stanza = match Stanza::try_from(element) {
            Ok(stanza) => stanza,
            Err(err) => {
                debug!(element = %name, %err, "ignoring top level element");
                self.emit(Event::Diagnostic(format!("ignored <{name}>: {err}")));
                return;
            }
        };

        let resolved = match &stanza {
            Stanza::Iq(iq) => lock(&self.pending).resolve(iq),
            _ => false,
        };
        let diagnostics = lock(&self.router).deliver(&stanza, resolved);
        for diagnostic in diagnostics {
            self.emit(Event::Diagnostic(diagnostic));
        }
        if let Some(reply) = ping_reply(&stanza) {
            debug!(from = ?stanza.from(), "answering ping");
            if let Err(err) = self.send(&reply) {
                debug!(%err, "ping reply not sent");
            }
            return;
        }

        match stanza {
            Stanza::Message(message) => {
                let events = lock(&self.muc).handle_message(&message);
                self.emit(Event::Message(message));
                self.emit_room(events);
            }
            Stanza::Presence(presence) => {
                let events = lock(&self.muc).handle_presence(&presence);
                self.emit(Event::Presence(presence));
                self.emit_room(events);
            }
            Stanza::Iq(iq) if !resolved => self.emit(Event::Iq(iq)),
            Stanza::Iq(_) => {}
        }
    }
}

async fn read_stream<S: AsyncRead>(
    shared: &Shared,
    transport: &mut Transport<ReadHalf<S>>,
    parser: &mut StreamParser,
    backlog: VecDeque<StreamEvent>,
) -> Exit {
    for event in backlog {
        if let Err(exit) = shared.process(event) {
            return exit;
        }
    }
    loop {
        let bytes = match transport.read_chunk().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                return (
                    ConnectionState::ConnectionLost,
                    XmppError::Network("connection closed by server".to_string()),
                );
            }
            Err(err) => return (ConnectionState::ConnectionLost, err),
        };
        let events = match parser.feed(bytes) {
            Ok(events) => events,
            Err(err) => return (ConnectionState::Error, err.into()),
        };
        for event in events {
            if let Err(exit) = shared.process(event) {
                return exit;
            }
        }
    }
}

async fn read_loop<S: AsyncRead>(
    shared: Arc<Shared>,
    generation: u64,
    mut transport: Transport<ReadHalf<S>>,
    mut parser: StreamParser,
    backlog: VecDeque<StreamEvent>,
) {
    let (state, error) = read_stream(&shared, &mut transport, &mut parser, backlog).await;
    shared.teardown(generation, state, error);
}

async fn write_loop<S: AsyncWrite>(
    shared: Arc<Shared>,
    generation: u64,
    mut transport: Transport<WriteHalf<S>>,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(item) = queue.recv().await {
        let result = match item {
            Outbound::Frame(bytes) => transport.write_frame(&bytes).await,
            Outbound::Close => {
                if transport.write_frame(STREAM_FOOTER).await.is_ok() {
                    let _ = transport.close().await;
                }
                return;
            }
        };
        if let Err(error) = result {
            shared.teardown(generation, ConnectionState::ConnectionLost, error);
            return;
        }
    }
}

/// An IQ request in flight.
///
/// Awaiting it yields the `result` response, or the error: a
/// `StanzaError` for an `error` response, `Timeout` when no response
/// arrives within the IQ timeout, `Cancelled` after [cancel()](IqRequest::cancel),
/// or the connection error if the connection goes away. Dropping the
/// request forgets it.
pub struct IqRequest {
    id: String,
    receiver: oneshot::Receiver<IqResult>,
    deadline: Pin<Box<Sleep>>,
    shared: Arc<Shared>,
    finished: bool,
}

impl IqRequest {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Resolves the request with `Cancelled`. A response arriving
    /// later is treated as an unsolicited IQ.
    pub fn cancel(&self) -> bool {
        lock(&self.shared.pending).cancel(&self.id)
    }
}

impl Future for IqRequest {
    type Output = IqResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<IqResult> {
        let this = &mut *self;
        if this.finished {
            return Poll::Ready(Err(XmppError::Cancelled));
        }
        if let Poll::Ready(result) = Pin::new(&mut this.receiver).poll(cx) {
            this.finished = true;
            return Poll::Ready(result.unwrap_or(Err(XmppError::Cancelled)));
        }
        if this.deadline.as_mut().poll(cx).is_ready() {
            this.finished = true;
            lock(&this.shared.pending).remove(&this.id);
            debug!(id = %this.id, "iq timed out");
            return Poll::Ready(Err(XmppError::Timeout));
        }
        Poll::Pending
    }
}

impl Drop for IqRequest {
    fn drop(&mut self) {
        if !self.finished {
            lock(&self.shared.pending).remove(&self.id);
        }
    }
}

/// An XMPP client connection with multi-user chat support.
///
/// ```no_run
/// use fxmpp_core::xmpp::ConnectionConfig;
/// use fxmpp_core::xmpp::Event;
/// use fxmpp_core::xmpp::JoinOptions;
/// use fxmpp_core::xmpp::XmppClient;
///
/// # async fn example() -> Result<(), fxmpp_core::xmpp::XmppError> {
/// let (client, mut events) = XmppClient::new();
/// client
///     .connect(ConnectionConfig::builder("example.com", "alice", "secret").build()?)
///     .await?;
/// let room = client
///     .join_room(JoinOptions {
///         room_jid: "lobby@conference.example.com".to_string(),
///         nickname: "alice".to_string(),
///         ..JoinOptions::default()
///     })
///     .await?;
/// client.send_room_message(&room.jid, "hello").await?;
/// while let Some(event) = events.recv().await {
///     if let Event::Room(event) = event {
///         println!("{}: {:?}", event.kind(), event.participant());
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct XmppClient<C: Connector = TcpConnector> {
    connector: C,
    shared: Arc<Shared>,
}

impl XmppClient {
    pub fn new() -> (XmppClient, Events) {
        XmppClient::with_connector(TcpConnector)
    }
}

impl<C: Connector> XmppClient<C> {
    pub fn with_connector(connector: C) -> (XmppClient<C>, Events) {
        let (events, receiver) = mpsc::unbounded_channel();
        let client = XmppClient {
            connector,
            shared: Arc::new(Shared {
                events,
                state: Mutex::new(StateMachine::new()),
                router: Mutex::new(Router::new()),
                pending: Mutex::new(PendingTable::new()),
                muc: Mutex::new(MucManager::new()),
                link: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        };
        (client, receiver)
    }

    pub fn connection_state(&self) -> ConnectionState {
        lock(&self.shared.state).state()
    }

    /// The full address bound by the server, while connected.
    pub fn bound_jid(&self) -> Option<Jid> {
        lock(&self.shared.link).as_ref().map(|link| link.jid.clone())
    }

    /// Connects and negotiates a stream, then sends initial presence.
    ///
    /// Only allowed when no connection exists or is being made.
    pub async fn connect(&self, config: ConnectionConfig) -> Result<(), XmppError> {
        if !self.shared.begin_connect() {
            return Err(XmppError::InvalidArgument(
                "client is already connected or connecting".to_string(),
            ));
        }
        info!(domain = %config.domain, host = %config.host, port = config.port, "connecting");
        if config.trust == TrustPolicy::AcceptAll {
            self.shared.emit(Event::SecurityWarning(format!(
                "certificate verification is disabled for {}",
                config.domain
            )));
        }

        let shared = Arc::clone(&self.shared);
        let negotiated = negotiate(&self.connector, &config, move |state| {
            shared.set_state(state);
        })
        .await;
        let session = match negotiated {
            Ok(session) => session,
            Err(error) => {
                warn!(%error, "connection failed");
                let state = match error {
                    XmppError::AuthFailed { .. } => ConnectionState::AuthFailed,
                    _ => ConnectionState::Error,
                };
                self.shared.set_state(state);
                return Err(error);
            }
        };
        self.shared.start(session, config.iq_timeout);
        self.shared.send(&Stanza::Presence(Presence::available()))
    }

    /// Closes the stream. Waiting commands fail with `NotConnected`.
    pub async fn disconnect(&self) -> Result<(), XmppError> {
        let link = lock(&self.shared.link).take();
        let Some(Link {
            outbound,
            reader,
            writer,
            ..
        }) = link
        else {
            if self.connection_state().is_idle() {
                return Ok(());
            }
            return Err(XmppError::NotConnected);
        };
        info!("disconnecting");
        reader.abort();
        let _ = outbound.send(Outbound::Close);
        drop(outbound);
        self.shared.set_state(ConnectionState::Disconnected);
        lock(&self.shared.pending).fail_all(&XmppError::NotConnected);
        lock(&self.shared.muc).fail_all(&XmppError::NotConnected);
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, writer).await;
        Ok(())
    }

    /// Sends any stanza as is.
    pub async fn send_stanza(&self, stanza: impl Into<Stanza>) -> Result<(), XmppError> {
        self.shared.send(&stanza.into())
    }

    /// Sends a message, adding an id if it has none.
    pub async fn send_message(&self, message: Message) -> Result<(), XmppError> {
        let message = match message.id() {
            Some(_) => message,
            None => message.with_id(&generate_id()),
        };
        self.shared.send(&Stanza::Message(message))
    }

    pub async fn send_presence(&self, presence: Presence) -> Result<(), XmppError> {
        self.shared.send(&Stanza::Presence(presence))
    }

    /// Sends an IQ `get` or `set` and returns the pending request. An
    /// empty id is replaced with a generated one.
    pub async fn send_iq(&self, iq: Iq) -> Result<IqRequest, XmppError> {
        if iq.is_response() {
            return Err(XmppError::InvalidArgument(
                "iq responses are sent with send_stanza".to_string(),
            ));
        }
        let iq = if iq.id().is_empty() {
            iq.with_id(&generate_id())
        } else {
            iq
        };
        let timeout = self.shared.iq_timeout()?;
        let receiver = lock(&self.shared.pending).register(iq.id())?;
        let request = IqRequest {
            id: iq.id().to_string(),
            receiver,
            deadline: Box::pin(tokio::time::sleep(timeout)),
            shared: Arc::clone(&self.shared),
            finished: false,
        };
        self.shared.send(&Stanza::Iq(iq))?;
        Ok(request)
    }

    /// Resolves a pending IQ request with `Cancelled`.
    pub fn cancel_iq(&self, id: &str) -> bool {
        lock(&self.shared.pending).cancel(id)
    }

    /// Parses and sends a stanza given as XML text.
    pub async fn send_xml(&self, xml: &str) -> Result<(), XmppError> {
        let stanza = Stanza::from_xml(xml)?;
        self.shared.send(&stanza)
    }

    /// Adds a stanza subscriber. Handlers run on the reader task and
    /// must not call back into the subscription methods.
    pub fn subscribe(
        &self,
        filter: Filter,
        handler: impl StanzaHandler + 'static,
    ) -> SubscriptionId {
        lock(&self.shared.router).subscribe(filter, Box::new(handler))
    }

    /// Subscribes a new channel and returns its receiving side.
    pub fn subscribe_channel(
        &self,
        filter: Filter,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<Stanza>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (self.subscribe(filter, sender), receiver)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.shared.router).unsubscribe(id)
    }

    /// Snapshot of all rooms being joined or joined.
    pub fn rooms(&self) -> Vec<Room> {
        lock(&self.shared.muc).rooms()
    }

    pub fn room(&self, room: &Jid) -> Option<Room> {
        lock(&self.shared.muc).room(room)
    }

    fn require_joined(&self, room: &Jid) -> Result<(), XmppError> {
        lock(&self.shared.muc).require_joined(room).map(|_| ())
    }

    async fn join(&self, options: JoinOptions) -> Result<(Room, bool), XmppError> {
        let (room, nickname, password, history) = options.into_parts()?;
        let timeout = self.shared.iq_timeout()?;
        let (presence, done) =
            lock(&self.shared.muc).begin_join(&room, &nickname, password.as_deref(), &history)?;
        if let Err(err) = self.shared.send(&Stanza::Presence(presence)) {
            lock(&self.shared.muc).abort_join(&room);
            return Err(err);
        }
        let created = match tokio::time::timeout(timeout, done).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => return Err(XmppError::Cancelled),
            Err(_) => {
                lock(&self.shared.muc).abort_join(&room);
                return Err(XmppError::Timeout);
            }
        };
        let snapshot = self
            .room(&room)
            .ok_or_else(|| XmppError::NotJoined(room.to_string()))?;
        Ok((snapshot, created))
    }

    /// Joins a room. Completes when the room reflects our own presence.
    pub async fn join_room(&self, options: JoinOptions) -> Result<Room, XmppError> {
        self.join(options).await.map(|(room, _)| room)
    }

    /// Joins a room, and accepts the default configuration if the join
    /// created it.
    pub async fn create_room(&self, options: JoinOptions) -> Result<Room, XmppError> {
        let (room, created) = self.join(options).await?;
        if created {
            info!(room = %room.jid, "configuring new room");
            let iq = stanzas::instant_room_iq(&generate_id(), &room.jid);
            self.send_iq(iq).await?.await?;
        }
        Ok(room)
    }

    /// Leaves a room. Rooms still joining can be left too.
    pub async fn leave_room(&self, room: &Jid) -> Result<(), XmppError> {
        let timeout = self.shared.iq_timeout()?;
        let (presence, done) = lock(&self.shared.muc).begin_leave(room)?;
        self.shared.send(&Stanza::Presence(presence))?;
        match tokio::time::timeout(timeout, done).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(XmppError::Cancelled),
            Err(_) => {
                lock(&self.shared.muc).remove(room);
                Err(XmppError::Timeout)
            }
        }
    }

    /// Destroys a room we own, optionally pointing occupants elsewhere.
    pub async fn destroy_room(
        &self,
        room: &Jid,
        reason: Option<&str>,
        alternate_room: Option<&Jid>,
    ) -> Result<(), XmppError> {
        self.require_joined(room)?;
        let iq = stanzas::destroy_iq(&generate_id(), room, reason, alternate_room);
        self.send_iq(iq).await?.await?;
        let events = lock(&self.shared.muc).destroyed(
            room,
            reason.map(str::to_string),
            alternate_room.cloned(),
        );
        self.shared.emit_room(events);
        Ok(())
    }

    pub async fn send_room_message(&self, room: &Jid, body: &str) -> Result<(), XmppError> {
        self.require_joined(room)?;
        let message = stanzas::groupchat(room, body).with_id(&generate_id());
        self.shared.send(&Stanza::Message(message))
    }

    pub async fn send_private_message(
        &self,
        room: &Jid,
        nickname: &str,
        body: &str,
    ) -> Result<(), XmppError> {
        self.require_joined(room)?;
        let message = stanzas::private_message(room, nickname, body)?.with_id(&generate_id());
        self.shared.send(&Stanza::Message(message))
    }

    pub async fn change_subject(&self, room: &Jid, subject: &str) -> Result<(), XmppError> {
        self.require_joined(room)?;
        self.shared.send(&Stanza::Message(stanzas::subject(room, subject)))
    }

    /// Asks for a new nickname. The room confirms it with a nickname
    /// change event.
    pub async fn change_nickname(&self, room: &Jid, nickname: &str) -> Result<(), XmppError> {
        self.require_joined(room)?;
        let presence = stanzas::nickname_presence(room, nickname)?;
        self.shared.send(&Stanza::Presence(presence))
    }

    pub async fn invite(
        &self,
        room: &Jid,
        invitee: &Jid,
        reason: Option<&str>,
    ) -> Result<(), XmppError> {
        self.require_joined(room)?;
        self.shared
            .send(&Stanza::Message(stanzas::invite(room, invitee, reason)))
    }

    /// Declines an invitation received from `inviter` to `room`.
    pub async fn decline_invitation(
        &self,
        room: &Jid,
        inviter: &Jid,
        reason: Option<&str>,
    ) -> Result<(), XmppError> {
        self.shared
            .send(&Stanza::Message(stanzas::decline(room, inviter, reason)))
    }

    async fn set_role(
        &self,
        room: &Jid,
        nickname: &str,
        role: Role,
        reason: Option<&str>,
    ) -> Result<(), XmppError> {
        self.require_joined(room)?;
        if nickname.trim().is_empty() {
            return Err(XmppError::InvalidArgument("nickname is empty".to_string()));
        }
        let item = AdminItem::Role {
            nickname: nickname.to_string(),
            role,
        };
        let iq = stanzas::admin_iq(&generate_id(), room, &item, reason);
        self.send_iq(iq).await?.await?;
        Ok(())
    }

    async fn set_affiliation(
        &self,
        room: &Jid,
        jid: &Jid,
        affiliation: Affiliation,
        reason: Option<&str>,
    ) -> Result<(), XmppError> {
        self.require_joined(room)?;
        let item = AdminItem::Affiliation {
            jid: jid.clone(),
            affiliation,
        };
        let iq = stanzas::admin_iq(&generate_id(), room, &item, reason);
        self.send_iq(iq).await?.await?;
        let events = lock(&self.shared.muc).apply_affiliation(room, jid, affiliation);
        self.shared.emit_room(events);
        Ok(())
    }

    pub async fn kick(&self, room: &Jid, nickname: &str, reason: Option<&str>) -> Result<(), XmppError> {
        self.set_role(room, nickname, Role::None, reason).await
    }

    pub async fn grant_voice(&self, room: &Jid, nickname: &str) -> Result<(), XmppError> {
        self.set_role(room, nickname, Role::Participant, None).await
    }

    pub async fn revoke_voice(&self, room: &Jid, nickname: &str) -> Result<(), XmppError> {
        self.set_role(room, nickname, Role::Visitor, None).await
    }

    pub async fn grant_moderator(&self, room: &Jid, nickname: &str) -> Result<(), XmppError> {
        self.set_role(room, nickname, Role::Moderator, None).await
    }

    pub async fn revoke_moderator(&self, room: &Jid, nickname: &str) -> Result<(), XmppError> {
        self.set_role(room, nickname, Role::Participant, None).await
    }

    pub async fn ban(&self, room: &Jid, jid: &Jid, reason: Option<&str>) -> Result<(), XmppError> {
        self.set_affiliation(room, jid, Affiliation::Outcast, reason).await
    }

    pub async fn grant_membership(&self, room: &Jid, jid: &Jid) -> Result<(), XmppError> {
        self.set_affiliation(room, jid, Affiliation::Member, None).await
    }

    pub async fn revoke_membership(&self, room: &Jid, jid: &Jid) -> Result<(), XmppError> {
        self.set_affiliation(room, jid, Affiliation::None, None).await
    }

    pub async fn grant_admin(&self, room: &Jid, jid: &Jid) -> Result<(), XmppError> {
        self.set_affiliation(room, jid, Affiliation::Admin, None).await
    }

    pub async fn grant_owner(&self, room: &Jid, jid: &Jid) -> Result<(), XmppError> {
        self.set_affiliation(room, jid, Affiliation::Owner, None).await
    }
}

impl<C: Connector> Drop for XmppClient<C> {
    fn drop(&mut self) {
        let link = lock(&self.shared.link).take();
        if let Some(link) = link {
            link.reader.abort();
            link.writer.abort();
        }
    }
}

#[cfg(test)]
mod tests;
