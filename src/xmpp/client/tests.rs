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

use tokio::io::DuplexStream;

use super::*;
use crate::xmpp::RoomState;
use crate::xmpp::SecurityMode;
use crate::xmpp::StanzaKind;
use crate::xmpp::testing::PipeConnector;
use crate::xmpp::testing::SERVER_HEADER;
use crate::xmpp::testing::Step;
use crate::xmpp::testing::drain;
use crate::xmpp::testing::login_script;
use crate::xmpp::testing::serve;
use ConnectionState::*;

const ROOM: &str = "lobby@conf.example.com";

const SELF_PRESENCE: &str = "<presence from='lobby@conf.example.com/alice'>\
    <x xmlns='http://jabber.org/protocol/muc#user'>\
    <item affiliation='owner' role='moderator'/><status code='110'/></x></presence>";

fn jid(s: &str) -> Jid {
    Jid::new(s).unwrap()
}

fn config() -> ConnectionConfig {
    ConnectionConfig::builder("example.com", "alice", "secret")
        .security(SecurityMode::Allowed)
        .iq_timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

fn version_query() -> Element {
    Element::new("query", "jabber:iq:version")
}

fn join_options() -> JoinOptions {
    JoinOptions {
        room_jid: ROOM.to_string(),
        nickname: "alice".to_string(),
        ..JoinOptions::default()
    }
}

async fn next(events: &mut Events) -> Event {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no event in time")
        .expect("event channel closed")
}

/// Skips events until one matches.
async fn wait_for(events: &mut Events, wanted: impl Fn(&Event) -> bool) -> Event {
    loop {
        let event = next(events).await;
        if wanted(&event) {
            return event;
        }
    }
}

fn queued_states(events: &mut Events) -> Vec<ConnectionState> {
    let mut states = Vec::new();
    while let Ok(Event::ConnectionState(state)) = events.try_recv() {
        states.push(state);
    }
    states
}

type Script = JoinHandle<(DuplexStream, String)>;

/// A client logged in to a scripted server which runs `extra` after
/// receiving the initial presence.
async fn connected(
    config: ConnectionConfig,
    extra: Vec<Step>,
) -> (XmppClient<PipeConnector>, Events, Script) {
    let (connector, server) = PipeConnector::new();
    let mut steps = login_script();
    steps.push(Step::Expect("<presence/>"));
    steps.extend(extra);
    let script = tokio::spawn(serve(server, steps));
    let (client, events) = XmppClient::with_connector(connector);
    client.connect(config).await.unwrap();
    (client, events, script)
}

#[tokio::test]
async fn connect_and_disconnect() {
    let (client, mut events, script) = connected(config(), vec![]).await;
    assert_eq!(client.connection_state(), Ready);
    assert_eq!(client.bound_jid(), Some(jid("alice@example.com/fxmpp")));
    let (server, _) = script.await.unwrap();
    assert_eq!(
        queued_states(&mut events),
        [Connecting, Connected, Authenticating, Ready]
    );

    assert!(matches!(
        client.connect(config()).await,
        Err(XmppError::InvalidArgument(_))
    ));

    client.disconnect().await.unwrap();
    assert_eq!(next(&mut events).await, Event::ConnectionState(Disconnected));
    assert_eq!(client.bound_jid(), None);
    assert!(drain(server).await.ends_with("</stream:stream>"));
    assert_eq!(
        client
            .send_message(Message::chat(jid("bob@example.com"), "hi"))
            .await,
        Err(XmppError::NotConnected)
    );
    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn auth_failure() {
    let (connector, server) = PipeConnector::new();
    let script = vec![
        Step::Expect("<stream:stream"),
        Step::Send(format!(
            "{SERVER_HEADER}<stream:features>\
             <mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><mechanism>PLAIN</mechanism></mechanisms>\
             </stream:features>"
        )),
        Step::Expect("</auth>"),
        Step::Send(
            "<failure xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><not-authorized/></failure>".to_string(),
        ),
    ];
    let _script = tokio::spawn(serve(server, script));
    let (client, mut events) = XmppClient::with_connector(connector);
    let mut config = config();
    config.trust = TrustPolicy::AcceptAll;

    let err = client.connect(config).await.unwrap_err();
    assert!(matches!(err, XmppError::AuthFailed { .. }));
    assert_eq!(client.connection_state(), AuthFailed);
    assert_eq!(next(&mut events).await, Event::ConnectionState(Connecting));
    assert!(matches!(next(&mut events).await, Event::SecurityWarning(_)));
    assert_eq!(
        queued_states(&mut events),
        [Connected, Authenticating, AuthFailed]
    );
}

#[tokio::test]
async fn room_commands_need_a_joined_room() {
    let (client, _events, script) = connected(config(), vec![Step::Expect("marker")]).await;
    let room = jid(ROOM);
    assert_eq!(
        client.send_room_message(&room, "hi").await,
        Err(XmppError::NotJoined(ROOM.to_string()))
    );
    assert!(matches!(
        client.kick(&room, "bob", None).await,
        Err(XmppError::NotJoined(_))
    ));
    assert!(matches!(
        client.ban(&room, &jid("bob@example.com"), None).await,
        Err(XmppError::NotJoined(_))
    ));
    assert!(matches!(
        client.change_subject(&room, "topic").await,
        Err(XmppError::NotJoined(_))
    ));
    assert!(matches!(
        client.leave_room(&room).await,
        Err(XmppError::NotJoined(_))
    ));

    client
        .send_message(Message::chat(jid("bob@example.com"), "marker"))
        .await
        .unwrap();
    let (_, transcript) = script.await.unwrap();
    let after_login = &transcript[transcript.find("<presence/>").unwrap()..];
    assert!(!after_login.contains(ROOM));
}

#[tokio::test]
async fn join_and_ban() {
    let extra = vec![
        Step::Expect("lobby@conf.example.com/alice"),
        Step::Send(format!(
            "<presence from='lobby@conf.example.com/bob'>\
             <x xmlns='http://jabber.org/protocol/muc#user'>\
             <item affiliation='member' role='participant' jid='bob@example.com/home'/></x></presence>\
             {SELF_PRESENCE}"
        )),
        Step::Expect("muc#admin"),
        Step::Send(
            "<iq type='result' id='{id}' from='lobby@conf.example.com'/>\
             <presence from='lobby@conf.example.com/bob' type='unavailable'>\
             <x xmlns='http://jabber.org/protocol/muc#user'>\
             <item affiliation='outcast' role='none'><reason>spam</reason></item>\
             <status code='301'/></x></presence>"
                .to_string(),
        ),
    ];
    let (client, mut events, script) = connected(config(), extra).await;

    let room = client.join_room(join_options()).await.unwrap();
    assert_eq!(room.state, RoomState::Joined);
    assert_eq!(room.occupants.len(), 2);
    let event = wait_for(&mut events, |e| matches!(e, Event::Room(_))).await;
    assert!(matches!(event, Event::Room(e) if e.kind() == "participant_joined"));
    let event = wait_for(&mut events, |e| matches!(e, Event::Room(_))).await;
    assert!(matches!(event, Event::Room(e) if e.kind() == "joined"));

    client
        .ban(&room.jid, &jid("bob@example.com"), Some("spam"))
        .await
        .unwrap();
    let event = wait_for(
        &mut events,
        |e| matches!(e, Event::Room(e) if e.kind() == "banned"),
    )
    .await;
    let Event::Room(event) = event else {
        unreachable!();
    };
    assert_eq!(event.participant(), Some("bob"));
    assert_eq!(event.reason(), Some("spam"));
    assert!(!client.room(&room.jid).unwrap().occupants.contains_key("bob"));
    // The room announced the ban, the result adds nothing.
    assert!(events.try_recv().is_err());

    let (_, transcript) = script.await.unwrap();
    assert!(transcript.contains("affiliation=\"outcast\" jid=\"bob@example.com\""));
}

#[tokio::test]
async fn create_room() {
    let extra = vec![
        Step::Expect("lobby@conf.example.com/alice"),
        Step::Send(
            "<presence from='lobby@conf.example.com/alice'>\
             <x xmlns='http://jabber.org/protocol/muc#user'>\
             <item affiliation='owner' role='moderator'/>\
             <status code='110'/><status code='201'/></x></presence>"
                .to_string(),
        ),
        Step::Expect("muc#owner"),
        Step::Send("<iq type='result' id='{id}' from='lobby@conf.example.com'/>".to_string()),
    ];
    let (client, mut events, script) = connected(config(), extra).await;
    let room = client.create_room(join_options()).await.unwrap();
    assert_eq!(room.jid, jid(ROOM));
    let event = wait_for(&mut events, |e| matches!(e, Event::Room(_))).await;
    assert_eq!(
        event,
        Event::Room(RoomEvent::new(
            &room.jid,
            crate::xmpp::RoomEventKind::Joined {
                nickname: "alice".to_string(),
                created: true,
            }
        ))
    );
    let (_, transcript) = script.await.unwrap();
    assert!(transcript.contains("<x xmlns=\"jabber:x:data\" type=\"submit\"/>"));
    assert_eq!(client.rooms().len(), 1);
}

#[tokio::test]
async fn iq_responses_are_matched_by_id() {
    let extra = vec![
        Step::Expect("jabber:iq:version"),
        Step::Send(
            "<iq type='get' id='other' from='example.com'><query xmlns='jabber:iq:version'/></iq>\
             <iq type='result' id='{id}' from='example.com'>\
             <query xmlns='jabber:iq:version'><name>srv</name></query></iq>"
                .to_string(),
        ),
    ];
    let (client, mut events, _script) = connected(config(), extra).await;
    let (subscription, mut stanzas) = client.subscribe_channel(Filter::Kind(StanzaKind::Iq));

    let request = client
        .send_iq(Iq::get("", version_query()).with_to(jid("example.com")))
        .await
        .unwrap();
    assert!(!request.id().is_empty());
    let response = request.await.unwrap();
    assert_eq!(
        response
            .query()
            .and_then(|q| q.child_text("name", "jabber:iq:version"))
            .as_deref(),
        Some("srv")
    );

    let Event::Iq(iq) = wait_for(&mut events, |e| matches!(e, Event::Iq(_))).await else {
        unreachable!();
    };
    assert_eq!(iq.id(), "other");
    assert_eq!(stanzas.try_recv().unwrap().id(), Some("other"));
    assert!(stanzas.try_recv().is_err());
    assert!(client.unsubscribe(subscription));
}

#[tokio::test]
async fn iq_cancel_and_timeout() {
    let config = ConnectionConfig {
        iq_timeout: Duration::from_millis(200),
        ..config()
    };
    let (client, _events, _script) = connected(config, vec![]).await;

    let request = client.send_iq(Iq::get("q1", version_query())).await.unwrap();
    assert!(request.cancel());
    assert_eq!(request.await, Err(XmppError::Cancelled));

    let request = client.send_iq(Iq::get("q2", version_query())).await.unwrap();
    assert_eq!(request.await, Err(XmppError::Timeout));

    let first = client.send_iq(Iq::get("q3", version_query())).await.unwrap();
    assert!(matches!(
        client.send_iq(Iq::get("q3", version_query())).await,
        Err(XmppError::InvalidArgument(_))
    ));
    drop(first);
    let again = client.send_iq(Iq::get("q3", version_query())).await.unwrap();
    assert!(client.cancel_iq("q3"));
    assert_eq!(again.await, Err(XmppError::Cancelled));

    assert!(matches!(
        client
            .send_iq(Iq::new(crate::xmpp::IqType::Result, "r1"))
            .await,
        Err(XmppError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn ping_then_connection_lost() {
    let extra = vec![
        Step::Send(
            "<iq type='get' id='ping1' from='example.com'><ping xmlns='urn:xmpp:ping'/></iq>".to_string(),
        ),
        Step::Expect("\"ping1\""),
    ];
    let (client, mut events, script) = connected(config(), extra).await;
    let request = client.send_iq(Iq::get("q9", version_query())).await.unwrap();
    let (server, transcript) = script.await.unwrap();
    assert!(transcript.contains("<iq to=\"example.com\" type=\"result\" id=\"ping1\"/>"));

    drop(server);
    loop {
        match next(&mut events).await {
            Event::ConnectionState(ConnectionLost) => break,
            Event::Iq(iq) => panic!("ping was reported: {iq:?}"),
            _ => {}
        }
    }
    assert!(matches!(request.await, Err(XmppError::Network(_))));
    assert_eq!(client.connection_state(), ConnectionLost);
}

#[tokio::test]
async fn stream_error_fails_the_connection() {
    let extra = vec![Step::Send(
        "<stream:error><conflict xmlns='urn:ietf:params:xml:ns:xmpp-streams'/></stream:error>"
            .to_string(),
    )];
    let (client, mut events, _script) = connected(config(), extra).await;
    wait_for(&mut events, |e| *e == Event::ConnectionState(Error)).await;
    assert_eq!(client.connection_state(), Error);

    // The pipe connector has no second connection to give.
    assert_eq!(
        client.connect(config()).await,
        Err(XmppError::Network("connection refused".to_string()))
    );
    assert_eq!(
        queued_states(&mut events),
        [Connecting, Error]
    );
}

fn join_steps() -> Vec<Step> {
    vec![
        Step::Expect("lobby@conf.example.com/alice"),
        Step::Send(SELF_PRESENCE.to_string()),
    ]
}

fn with_join(extra: Vec<Step>) -> Vec<Step> {
    let mut steps = join_steps();
    steps.extend(extra);
    steps
}

#[tokio::test]
async fn leave_is_confirmed_by_the_room() {
    let extra = with_join(vec![
        Step::Expect("type=\"unavailable\""),
        Step::Send(
            "<presence from='lobby@conf.example.com/alice' type='unavailable'>\
             <x xmlns='http://jabber.org/protocol/muc#user'>\
             <item affiliation='owner' role='none'/><status code='110'/></x></presence>"
                .to_string(),
        ),
    ]);
    let (client, mut events, _script) = connected(config(), extra).await;
    let room = client.join_room(join_options()).await.unwrap();
    assert!(client.room(&room.jid).is_some());

    client.leave_room(&room.jid).await.unwrap();
    assert!(client.rooms().is_empty());
    let event = wait_for(
        &mut events,
        |e| matches!(e, Event::Room(e) if e.kind() == "left"),
    )
    .await;
    assert!(matches!(event, Event::Room(e) if e.room == room.jid));
    assert!(matches!(
        client.send_room_message(&room.jid, "still here?").await,
        Err(XmppError::NotJoined(_))
    ));
}

#[tokio::test]
async fn leave_fails_when_the_connection_is_lost() {
    let extra = with_join(vec![Step::Expect("type=\"unavailable\"")]);
    let (client, mut events, script) = connected(config(), extra).await;
    let room = client.join_room(join_options()).await.unwrap();

    let (result, ()) = tokio::join!(client.leave_room(&room.jid), async {
        let (server, _) = script.await.unwrap();
        drop(server);
    });
    assert!(matches!(result, Err(XmppError::Network(_))));
    wait_for(&mut events, |e| *e == Event::ConnectionState(ConnectionLost)).await;
    assert!(client.rooms().is_empty());
}

#[tokio::test]
async fn join_fails_when_the_connection_is_lost() {
    let extra = vec![Step::Expect("lobby@conf.example.com/alice")];
    let (client, _events, script) = connected(config(), extra).await;

    let (result, ()) = tokio::join!(client.join_room(join_options()), async {
        let (server, _) = script.await.unwrap();
        drop(server);
    });
    assert!(matches!(result, Err(XmppError::Network(_))));
    assert!(client.rooms().is_empty());
}

#[tokio::test]
async fn leave_fails_on_disconnect() {
    let extra = with_join(vec![Step::Expect("type=\"unavailable\"")]);
    let (client, _events, _script) = connected(config(), extra).await;
    let room = client.join_room(join_options()).await.unwrap();

    let (result, disconnected) = tokio::join!(client.leave_room(&room.jid), async {
        tokio::task::yield_now().await;
        client.disconnect().await
    });
    disconnected.unwrap();
    assert_eq!(result, Err(XmppError::NotConnected));
}

#[tokio::test]
async fn destroy_room() {
    let extra = with_join(vec![
        Step::Expect("muc#owner"),
        Step::Send("<iq type='result' id='{id}' from='lobby@conf.example.com'/>".to_string()),
    ]);
    let (client, mut events, script) = connected(config(), extra).await;
    let room = client.join_room(join_options()).await.unwrap();

    client
        .destroy_room(&room.jid, Some("closing"), Some(&jid("other@conf.example.com")))
        .await
        .unwrap();
    assert!(client.rooms().is_empty());
    let Event::Room(event) = wait_for(
        &mut events,
        |e| matches!(e, Event::Room(e) if e.kind() == "destroyed"),
    )
    .await
    else {
        unreachable!();
    };
    assert_eq!(event.reason(), Some("closing"));
    assert_eq!(event.alternate_room(), Some(&jid("other@conf.example.com")));

    let (_, transcript) = script.await.unwrap();
    assert!(transcript.contains(
        "<destroy jid=\"other@conf.example.com\"><reason>closing</reason></destroy>"
    ));
}

#[tokio::test]
async fn room_messages_on_the_wire() {
    let extra = with_join(vec![Step::Expect("marker")]);
    let (client, _events, script) = connected(config(), extra).await;
    let room = client.join_room(join_options()).await.unwrap();

    client
        .send_private_message(&room.jid, "bob", "psst")
        .await
        .unwrap();
    assert!(matches!(
        client.send_private_message(&room.jid, " ", "psst").await,
        Err(XmppError::InvalidArgument(_))
    ));
    client
        .invite(&room.jid, &jid("carol@example.com"), Some("hi"))
        .await
        .unwrap();
    assert!(matches!(
        client.send_xml("<message><body>unclosed").await,
        Err(XmppError::InvalidArgument(_))
    ));
    client
        .send_xml("<message to='bob@example.com' type='chat'><body>raw</body></message>")
        .await
        .unwrap();
    client
        .send_message(Message::chat(jid("bob@example.com"), "marker"))
        .await
        .unwrap();

    let (_, transcript) = script.await.unwrap();
    assert!(transcript.contains("to=\"lobby@conf.example.com/bob\" type=\"chat\""));
    assert!(transcript.contains(
        "<body>psst</body><x xmlns=\"http://jabber.org/protocol/muc#user\"/></message>"
    ));
    assert!(transcript.contains(
        "<x xmlns=\"http://jabber.org/protocol/muc#user\">\
         <invite to=\"carol@example.com\"><reason>hi</reason></invite></x>"
    ));
    assert!(transcript.contains(
        "<message to=\"bob@example.com\" type=\"chat\"><body>raw</body></message>"
    ));
}
