/*
** This file is a part of fxmpp-core (XMPP client core library)
** Copyright (C) 2000-2025 Gurer Ozen
**
** fxmpp-core is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::env;
use std::process::ExitCode;

use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use fxmpp_core::xmpp::ConnectionConfig;
use fxmpp_core::xmpp::Event;
use fxmpp_core::xmpp::Jid;
use fxmpp_core::xmpp::JoinOptions;
use fxmpp_core::xmpp::Message;
use fxmpp_core::xmpp::SecurityMode;
use fxmpp_core::xmpp::TrustPolicy;
use fxmpp_core::xmpp::XmppClient;
use fxmpp_core::xmpp::XmppError;

fn print_version() {
    println!("fxmppc (fxmpp-core) v{}", fxmpp_core::VERSION);
}

fn print_usage() {
    println!(concat!(
        "Usage: fxmppc [OPTIONS]\n",
        "This tool can chat over XMPP.\n",
        "Options:\n",
        "  -j, --jid <JID>        Jabber ID\n",
        "  -s, --host <HOST>      Server host, if different from the JID domain\n",
        "  -p, --port <PORT>      Server port\n",
        "  -r, --room <ROOM>      Join this multi-user chat room\n",
        "  -n, --nick <NICK>      Nickname in the room\n",
        "      --insecure         Accept any server certificate\n",
        "      --no-tls           Do not use STARTTLS\n",
        "  -d, --debug            Log protocol traffic\n",
        "  -h, --help             Display this help message and exit\n",
        "  -v, --version          Display the version and exit\n",
        "Commands after connecting:\n",
        "  /msg <JID> <TEXT>      Send a chat message\n",
        "  /nick <NICK>           Change nickname in the room\n",
        "  /subject <TEXT>        Change the room subject\n",
        "  /kick <NICK>           Kick an occupant\n",
        "  /xml <XML>             Send a raw stanza\n",
        "  /quit                  Disconnect and exit\n",
        "Other lines are sent to the room.\n",
        "The password is read from FXMPP_PASSWORD or prompted for.\n",
        "Report issues at https://github.com/meduketto/fxmpp-core/issues"
    ));
}

#[derive(Default)]
struct Options {
    jid: Option<Jid>,
    host: Option<String>,
    port: Option<u16>,
    room: Option<Jid>,
    nick: Option<String>,
    insecure: bool,
    no_tls: bool,
    debug: bool,
}

enum Parsed {
    Run(Options),
    Exit(ExitCode),
}

fn value(args: &mut env::Args, arg: &str) -> Result<String, String> {
    args.next().ok_or_else(|| format!("value expected after {arg}"))
}

fn parse_args() -> Result<Parsed, String> {
    let mut args = env::args();
    let mut options = Options::default();

    // Skip the first argument (program name)
    args.next();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-j" | "--jid" => {
                let jid = value(&mut args, &arg)?;
                options.jid = Some(Jid::new(&jid).map_err(|err| err.to_string())?);
            }
            "-s" | "--host" => options.host = Some(value(&mut args, &arg)?),
            "-p" | "--port" => {
                let port = value(&mut args, &arg)?;
                options.port = Some(port.parse().map_err(|_| format!("bad port {port}"))?);
            }
            "-r" | "--room" => {
                let room = value(&mut args, &arg)?;
                options.room = Some(Jid::new(&room).map_err(|err| err.to_string())?);
            }
            "-n" | "--nick" => options.nick = Some(value(&mut args, &arg)?),
            "--insecure" => options.insecure = true,
            "--no-tls" => options.no_tls = true,
            "-d" | "--debug" => options.debug = true,
            "-h" | "--help" => {
                print_usage();
                return Ok(Parsed::Exit(ExitCode::SUCCESS));
            }
            "-v" | "--version" => {
                print_version();
                return Ok(Parsed::Exit(ExitCode::SUCCESS));
            }
            _ => return Err(format!("unknown option {arg}")),
        }
    }
    Ok(Parsed::Run(options))
}

fn init_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "trace" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_event(event: &Event) {
    match event {
        Event::ConnectionState(state) => println!("* {state}"),
        Event::Message(message) => {
            if let Some(body) = message.body() {
                let from = message.from().map(Jid::to_string).unwrap_or_default();
                println!("<{from}> {body}");
            }
        }
        Event::Presence(_) | Event::Iq(_) => {}
        Event::Room(event) => {
            let who = event.participant().unwrap_or("");
            match event.reason() {
                Some(reason) => println!("* {} {} {who} ({reason})", event.room, event.kind()),
                None => println!("* {} {} {who}", event.room, event.kind()),
            }
        }
        Event::SecurityWarning(warning) => eprintln!("Warning: {warning}"),
        Event::Diagnostic(text) => eprintln!("Diagnostic: {text}"),
    }
}

async fn command(
    client: &XmppClient,
    room: Option<&Jid>,
    line: &str,
) -> Result<bool, XmppError> {
    let (name, rest) = match line.strip_prefix('/') {
        Some(command) => command.split_once(' ').unwrap_or((command, "")),
        None => {
            let room = room.ok_or(XmppError::InvalidArgument("no room joined".to_string()))?;
            client.send_room_message(room, line).await?;
            return Ok(true);
        }
    };
    let in_room = || room.ok_or(XmppError::InvalidArgument("no room joined".to_string()));
    match name {
        "quit" => return Ok(false),
        "msg" => {
            let (to, text) = rest
                .split_once(' ')
                .ok_or(XmppError::InvalidArgument("usage: /msg <JID> <TEXT>".to_string()))?;
            client.send_message(Message::chat(Jid::new(to)?, text)).await?;
        }
        "nick" => client.change_nickname(in_room()?, rest.trim()).await?,
        "subject" => client.change_subject(in_room()?, rest).await?,
        "kick" => client.kick(in_room()?, rest.trim(), None).await?,
        "xml" => client.send_xml(rest).await?,
        _ => {
            return Err(XmppError::InvalidArgument(format!("unknown command /{name}")));
        }
    }
    Ok(true)
}

async fn run(options: Options) -> Result<(), XmppError> {
    let jid = options
        .jid
        .ok_or(XmppError::InvalidArgument("a Jabber ID is required".to_string()))?;
    let password = match env::var("FXMPP_PASSWORD") {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password("Password: ")?,
    };

    let mut builder = ConnectionConfig::builder(
        jid.domainpart(),
        jid.localpart().unwrap_or_default(),
        &password,
    )
    .host(options.host);
    if let Some(resource) = jid.resourcepart() {
        builder = builder.resource(resource);
    }
    if let Some(port) = options.port {
        builder = builder.port(port);
    }
    if options.no_tls {
        builder = builder.security(SecurityMode::Disabled);
    }
    if options.insecure {
        builder = builder.trust(TrustPolicy::AcceptAll);
    }
    let config = builder.build()?;

    let (client, mut events) = XmppClient::new();
    client.connect(config).await?;

    let mut room = None;
    if let Some(room_jid) = options.room {
        let nickname = options
            .nick
            .unwrap_or_else(|| jid.localpart().unwrap_or("fxmppc").to_string());
        let joined = client
            .join_room(JoinOptions {
                room_jid: room_jid.to_string(),
                nickname,
                ..JoinOptions::default()
            })
            .await?;
        println!("* joined {} with {} occupants", joined.jid, joined.occupants.len());
        room = Some(joined.jid);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                print_event(&event);
                if let Event::ConnectionState(state) = event {
                    if state.is_idle() {
                        break;
                    }
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match command(&client, room.as_ref(), &line).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(err) => eprintln!("Error: {err}"),
                }
            }
        }
    }

    client.disconnect().await
}

#[tokio::main]
async fn main() -> ExitCode {
    let options = match parse_args() {
        Ok(Parsed::Run(options)) => options,
        Ok(Parsed::Exit(code)) => return code,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(options.debug);

    match run(options).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
