//! minimx - minimal single-room Matrix chat client.
//!
//! Wiring only: configuration, session, room, then three concurrent
//! activities sharing one transport - the sync engine feeding the event
//! channel, the router draining it into the console, and the stdin loop
//! dispatching outbound operations.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use minimx::api::{HttpTransport, Transport};
use minimx::config::Config;
use minimx::event::{Event, MembershipChange, StatePayload};
use minimx::outbound::OutboundDispatcher;
use minimx::room::{self, Member};
use minimx::router::{EventRouter, UiSink};
use minimx::session::{self, Session};
use minimx::sync::SyncEngine;
use minimx::telemetry;

/// Capacity of the engine-to-router channel. When the console falls behind,
/// the engine blocks instead of dropping events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("incomplete configuration")?;
    telemetry::init(config.debug, Path::new(telemetry::DEBUG_LOG_FILE))?;

    info!(server = %config.server_url, room = %config.room_alias, "starting minimx");

    let transport: Arc<dyn Transport> = Arc::new(
        HttpTransport::new(&config.server_url)
            .context("server URL not usable; did you forget the 'https://' scheme?")?,
    );

    let session = Arc::new(
        session::establish(
            transport.as_ref(),
            &config.server_url,
            &config.username,
            &config.password,
        )
        .await?,
    );

    let room = room::resolve_or_create(transport.as_ref(), &session, &config.room_alias).await?;
    let members = room::joined_members(transport.as_ref(), &session, &room.room_id).await?;

    println!("== {} ({})", room.alias, room.room_id);
    let ui = ConsoleUi::new(members);

    let (event_tx, event_rx) = mpsc::channel::<Event>(EVENT_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let router_task = tokio::spawn(EventRouter::new(ui).run(event_rx));

    let mut engine = SyncEngine::new(Arc::clone(&transport), Arc::clone(&session), &room);
    let mut engine_task = tokio::spawn(async move { engine.run(event_tx, shutdown_rx).await });

    let dispatcher = OutboundDispatcher::new(
        Arc::clone(&transport),
        Arc::clone(&session),
        room.room_id.clone(),
    );

    let mut exit_code = 0;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            outcome = &mut engine_task => {
                report_engine_exit(outcome);
                exit_code = 1;
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if handle_line(&dispatcher, line.trim()) {
                        break;
                    }
                }
                // stdin closed (piped input ended): keep displaying until
                // interrupted or the engine stops.
                Ok(None) => {}
                Err(err) => {
                    error!(error = %err, "stdin read failed");
                    break;
                }
            }
        }
    }

    shutdown(shutdown_tx, engine_task, transport.as_ref(), &session).await;
    let _ = router_task.await;

    std::process::exit(exit_code);
}

/// Dispatch one console line; returns true when the user asked to quit.
/// Outbound calls run in their own task so a slow send never blocks input
/// handling or the sync loop.
fn handle_line(dispatcher: &OutboundDispatcher, line: &str) -> bool {
    if line.is_empty() {
        return false;
    }

    if let Some(rest) = line.strip_prefix('/') {
        let mut parts = rest.splitn(2, ' ');
        let command = parts.next().unwrap_or_default();
        let argument = parts.next().unwrap_or_default().trim().to_owned();
        match (command, argument.as_str()) {
            ("quit", _) => return true,
            ("invite", user_id) if !user_id.is_empty() => {
                let dispatcher = dispatcher.clone();
                let user_id = user_id.to_owned();
                tokio::spawn(async move {
                    if let Err(err) = dispatcher.invite(&user_id).await {
                        println!("! invite failed: {err}");
                    }
                });
            }
            ("nick", name) if !name.is_empty() => {
                let dispatcher = dispatcher.clone();
                let name = name.to_owned();
                tokio::spawn(async move {
                    if let Err(err) = dispatcher.set_display_name(&name).await {
                        println!("! nick change failed: {err}");
                    }
                });
            }
            ("help", _) => {
                println!("commands: /invite <user_id>, /nick <name>, /quit, /help");
            }
            _ => println!("unknown command; /help lists the available ones"),
        }
        return false;
    }

    let dispatcher = dispatcher.clone();
    let body = line.to_owned();
    tokio::spawn(async move {
        if let Err(err) = dispatcher.send(&body).await {
            println!("! message not sent: {err}");
        }
    });
    false
}

fn report_engine_exit(
    outcome: Result<Result<(), minimx::error::SyncFatalError>, tokio::task::JoinError>,
) {
    match outcome {
        Ok(Ok(())) => info!("sync engine finished"),
        Ok(Err(err)) => {
            error!(code = err.error_code(), error = %err, "sync engine failed");
            eprintln!("fatal: {err}");
        }
        Err(err) => {
            error!(error = %err, "sync engine task panicked");
            eprintln!("fatal: sync engine task failed");
        }
    }
}

async fn shutdown(
    shutdown_tx: watch::Sender<bool>,
    engine_task: tokio::task::JoinHandle<Result<(), minimx::error::SyncFatalError>>,
    transport: &dyn Transport,
    session: &Session,
) {
    // Aborts an in-flight long-poll promptly; the engine observes the flag
    // inside its select loop.
    let _ = shutdown_tx.send(true);
    if !engine_task.is_finished() {
        let _ = engine_task.await;
    }
    session::logout(transport, session).await;
}

/// Console rendering of the event feed. Keeps the display-name map so lines
/// show nicks instead of raw user ids.
struct ConsoleUi {
    names: std::collections::HashMap<String, String>,
}

impl ConsoleUi {
    fn new(members: Vec<Member>) -> Self {
        let mut ui = Self {
            names: std::collections::HashMap::new(),
        };
        println!("== {} member(s) in the room", members.len());
        for member in members {
            if let Some(name) = member.display_name {
                ui.names.insert(member.user_id, name);
            }
        }
        ui
    }

    fn name(&self, user_id: Option<&str>) -> String {
        let Some(user_id) = user_id else {
            return "?".to_owned();
        };
        self.names
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| user_id.to_owned())
    }

    fn stamp(ts: Option<DateTime<Utc>>) -> String {
        ts.map(|ts| ts.with_timezone(&Local).format("%H:%M").to_string())
            .unwrap_or_else(|| "--:--".to_owned())
    }
}

impl UiSink for ConsoleUi {
    fn on_message(&mut self, event: &Event, body: &str) {
        println!(
            "[{}] <{}> {}",
            Self::stamp(event.origin_ts),
            self.name(event.sender.as_deref()),
            body
        );
    }

    fn on_membership(&mut self, event: &Event, change: &MembershipChange) {
        let stamp = Self::stamp(event.origin_ts);
        let who = self.name(event.sender.as_deref());
        match change {
            MembershipChange::Join => {
                if let (Some(user_id), Some(name)) = (&event.sender, displayname_of(event)) {
                    self.names.insert(user_id.clone(), name);
                }
                println!("[{stamp}] * {} joined", self.name(event.sender.as_deref()));
            }
            MembershipChange::Leave => {
                println!("[{stamp}] * {who} left");
                if let Some(user_id) = &event.sender {
                    self.names.remove(user_id);
                }
            }
            MembershipChange::Invite { invited } => {
                println!("[{stamp}] * {who} invited {invited}");
            }
            MembershipChange::ProfileChange { new_displayname } => {
                let new_name = new_displayname.clone().unwrap_or_else(|| "?".to_owned());
                println!("[{stamp}] * {who} is now known as {new_name}");
                if let Some(user_id) = &event.sender {
                    self.names.insert(user_id.clone(), new_name);
                }
            }
        }
    }

    fn on_state(&mut self, _event: &Event, payload: &StatePayload) {
        match payload {
            StatePayload::Typing { user_ids } if !user_ids.is_empty() => {
                let names: Vec<String> =
                    user_ids.iter().map(|id| self.name(Some(id))).collect();
                println!("* typing: {}", names.join(", "));
            }
            StatePayload::Name { name } => println!("* room name: {name}"),
            StatePayload::Topic { topic } => println!("* topic: {topic}"),
            // Read receipts and other state changes stay quiet on the console.
            _ => {}
        }
    }
}

fn displayname_of(event: &Event) -> Option<String> {
    match &event.kind {
        minimx::event::EventKind::Membership {
            displayname: Some(name),
            ..
        } => Some(name.clone()),
        _ => None,
    }
}
