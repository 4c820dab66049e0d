use crate::avatars::FrameHandle;
use crate::game::{Applied, GameState};
use crate::input::{self, KeyEvent};
use crate::rendering::{FrameOutcome, Hud, MacroquadCanvas, Renderer};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use macroquad::prelude::{clear_background, next_frame, BLACK};
use shared::{ClientMessage, ServerMessage};
use std::fmt;
use std::path::Path;
use std::thread;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// What the socket thread reports to the frame loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Closed(String),
}

/// WebSocket connection running on its own thread.
///
/// The frame loop talks to it only through channels: `send` never blocks
/// and `try_recv` returns immediately.
pub struct Transport {
    outbound: mpsc::UnboundedSender<ClientMessage>,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

impl Transport {
    pub fn connect(url: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let url = url.to_string();

        thread::Builder::new()
            .name("transport".to_string())
            .spawn(move || runtime.block_on(run_socket(url, outbound_rx, inbound_tx)))?;

        Ok(Transport {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }

    /// Queues a message; dropped if the connection is already gone.
    pub fn send(&self, message: ClientMessage) {
        if self.outbound.send(message).is_err() {
            debug!("Transport closed, dropping outbound message");
        }
    }

    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        self.inbound.try_recv().ok()
    }
}

async fn run_socket(
    url: String,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
) {
    info!("Connecting to {}", url);
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            warn!("Failed to connect: {}", e);
            let _ = inbound.send(TransportEvent::Closed(e.to_string()));
            return;
        }
    };

    info!("Connected to the game server.");
    if inbound.send(TransportEvent::Opened).is_err() {
        return;
    }

    let (mut sink, mut source) = stream.split();

    let reason = loop {
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if inbound.send(TransportEvent::Message(text)).is_err() {
                        break "viewer closed".to_string();
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame
                        .map(|f| f.reason.to_string())
                        .filter(|reason| !reason.is_empty())
                        .unwrap_or_else(|| "closed by server".to_string());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break e.to_string(),
                None => break "connection closed".to_string(),
            },

            message = outbound.recv() => match message {
                Some(message) => match message.to_json() {
                    Ok(text) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            break e.to_string();
                        }
                    }
                    Err(e) => error!("Failed to encode {:?}: {}", message, e),
                },
                None => {
                    let _ = sink.close().await;
                    break "viewer closed".to_string();
                }
            },
        }
    };

    warn!("Disconnected: {}", reason);
    let _ = inbound.send(TransportEvent::Closed(reason));
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Joining,
    InGame,
    Rejected(String),
    Closed(String),
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "Connecting..."),
            ConnectionStatus::Joining => write!(f, "Connected, joining game..."),
            ConnectionStatus::InGame => write!(f, "In game"),
            ConnectionStatus::Rejected(error) => write!(f, "Join rejected: {}", error),
            ConnectionStatus::Closed(reason) => write!(f, "Connection closed: {}", reason),
        }
    }
}

/// Everything the frame loop owns about the game, independent of any window
/// or socket.
pub struct Session {
    username: String,
    pub game_state: GameState,
    status: ConnectionStatus,
    last_error: Option<String>,
    render_started: bool,
}

impl Session {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            game_state: GameState::new(),
            status: ConnectionStatus::Connecting,
            last_error: None,
            render_started: false,
        }
    }

    /// Handles one transport event, returning a message to send back.
    pub fn on_transport_event(&mut self, event: TransportEvent) -> Option<ClientMessage> {
        match event {
            TransportEvent::Opened => {
                self.status = ConnectionStatus::Joining;
                info!("Joining as {}", self.username);
                Some(ClientMessage::JoinGame {
                    username: self.username.clone(),
                })
            }
            TransportEvent::Message(text) => {
                self.on_message(&text);
                None
            }
            TransportEvent::Closed(reason) => {
                self.status = ConnectionStatus::Closed(reason);
                None
            }
        }
    }

    fn on_message(&mut self, text: &str) {
        let message = match ServerMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping message: {}", e);
                return;
            }
        };

        match self.game_state.apply(message) {
            Applied::Joined => {
                self.status = ConnectionStatus::InGame;
                self.last_error = None;
                self.render_started = true;
            }
            Applied::JoinRejected(error) => {
                self.status = ConnectionStatus::Rejected(error.clone());
                self.last_error = Some(error);
            }
            Applied::ServerError(error) => self.last_error = Some(error),
            Applied::Updated | Applied::RosterChanged | Applied::Ignored => {}
        }
    }

    /// Maps a key edge to an intent, only while the connection is open.
    pub fn on_key_event(&self, event: KeyEvent) -> Option<ClientMessage> {
        if self.is_open() {
            input::intent_for(event)
        } else {
            None
        }
    }

    fn is_open(&self) -> bool {
        matches!(
            self.status,
            ConnectionStatus::Joining | ConnectionStatus::InGame | ConnectionStatus::Rejected(_)
        )
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn status_line(&self) -> String {
        match self.status {
            ConnectionStatus::InGame => {
                format!("{} ({} players)", self.status, self.game_state.players.len())
            }
            _ => self.status.to_string(),
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Set by the first successful join and never cleared.
    pub fn is_render_started(&self) -> bool {
        self.render_started
    }
}

/// The viewer: socket, session state and window, driven once per frame.
pub struct Client {
    transport: Transport,
    session: Session,
    renderer: Renderer,
    canvas: MacroquadCanvas,
    hud: Hud,
}

impl Client {
    pub fn new(
        server_url: &str,
        username: &str,
        map_path: impl AsRef<Path>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let transport = Transport::connect(server_url)?;
        let background = FrameHandle::load_file(map_path);

        Ok(Client {
            transport,
            session: Session::new(username),
            renderer: Renderer::new(background),
            canvas: MacroquadCanvas::new(),
            hud: Hud::new(),
        })
    }

    fn pump_transport(&mut self) {
        while let Some(event) = self.transport.try_recv() {
            if let Some(reply) = self.session.on_transport_event(event) {
                self.transport.send(reply);
            }
        }
    }

    fn handle_input(&mut self) {
        let (controls, events) = input::poll_keyboard();
        if controls.toggle_roster {
            self.hud.toggle_roster();
        }
        for event in events {
            if let Some(intent) = self.session.on_key_event(event) {
                self.transport.send(intent);
            }
        }
    }

    fn draw(&mut self) {
        let outcome = if self.session.is_render_started() {
            self.renderer
                .render(&self.session.game_state, &mut self.canvas)
        } else {
            FrameOutcome::NotReady
        };
        if outcome == FrameOutcome::NotReady {
            clear_background(BLACK);
        }

        let roster = self.session.game_state.roster();
        self.hud
            .draw(&self.session.status_line(), self.session.last_error(), &roster);
        self.canvas.end_frame();
    }

    /// Runs until the window closes, yielding to the host once per frame.
    pub async fn run(&mut self) {
        loop {
            self.pump_transport();
            self.handle_input();
            self.draw();
            next_frame().await;
        }
    }
}
