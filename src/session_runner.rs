//! Session runner - connects the chat channel, the decoder and the output
//! sink to the chat state machine
//!
//! Everything runs on one task. Inbound frames, decode completions, timer
//! expiry, token changes and host commands are taken one at a time from a
//! single `select!` loop, so the state machine never sees interleaved events.
//! Decodes run on the blocking pool but are consumed oldest first.

use crate::chat_fsm::ChatFsm;
use crate::config::SessionConfig;
use crate::decoder::DecodeQueue;
use crate::error::ChatError;
use crate::events::{ChannelState, Command, Event, SessionUpdate};
use crate::playback::AudioSink;
use crate::transcript::EntryId;
use crate::ws_client::{ChatChannel, Inbound};
use std::future::pending;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Host side of a running session.
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    updates: mpsc::UnboundedReceiver<SessionUpdate>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Queue a command. Returns false once the session has stopped.
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn commands(&self) -> mpsc::UnboundedSender<Command> {
        self.commands.clone()
    }

    /// Next view update, `None` once the session has stopped and all
    /// updates were read.
    pub async fn recv(&mut self) -> Option<SessionUpdate> {
        self.updates.recv().await
    }

    /// Stop the session and wait for its teardown.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            error!("Session task failed: {}", e);
        }
    }
}

/// Start a session on the current runtime.
pub fn spawn(config: SessionConfig, tokens: watch::Receiver<Option<String>>) -> SessionHandle {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (update_tx, update_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(config, tokens, command_rx, update_tx));
    SessionHandle {
        commands: command_tx,
        updates: update_rx,
        task,
    }
}

/// Run a session until `Shutdown` or until every command sender is gone.
pub async fn run(
    config: SessionConfig,
    mut tokens: watch::Receiver<Option<String>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
) {
    let token = tokens.borrow_and_update().clone();
    let mut session = Session::new(config, token, updates);
    let mut tokens_open = true;

    info!("Chat session started");
    session.emit(SessionUpdate::Status(ChannelState::Idle));
    session.emit(SessionUpdate::AudioEnabled(session.fsm.audio_enabled()));
    if session.token.is_some() {
        session.connect().await;
    } else {
        session.fsm.sign_out();
    }

    loop {
        session.publish();
        let deadline = session.fsm.turn_deadline();

        tokio::select! {
            command = commands.recv() => match command {
                None | Some(Command::Shutdown) => break,
                Some(command) => session.handle_command(command).await,
            },

            changed = tokens.changed(), if tokens_open => {
                if changed.is_err() {
                    debug!("Token source closed, keeping current token");
                    tokens_open = false;
                } else {
                    let token = tokens.borrow_and_update().clone();
                    session.on_token(token).await;
                }
            }

            inbound = recv_inbound(&mut session.channel) => session.on_inbound(inbound),

            Some(result) = session.decodes.next(), if !session.decodes.is_empty() => {
                session.fsm.on_event(Event::FrameDecoded(result));
            }

            _ = wait_until(deadline) => {
                session.fsm.check_turn_timeout(std::time::Instant::now());
            }
        }

        session.transmit().await;
    }

    session.teardown().await;
}

/// Everything one session owns. Dropping it releases the channel, the
/// in-flight decodes and the output sink.
struct Session {
    config: SessionConfig,
    fsm: ChatFsm,
    token: Option<String>,
    channel: Option<ChatChannel>,
    decodes: DecodeQueue,
    sink: Option<Box<dyn AudioSink>>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
}

impl Session {
    fn new(
        config: SessionConfig,
        token: Option<String>,
        updates: mpsc::UnboundedSender<SessionUpdate>,
    ) -> Self {
        Self {
            fsm: ChatFsm::new(config.quiet_period, config.audio_enabled),
            decodes: DecodeQueue::new(config.chunk_format.decoder()),
            config,
            token,
            channel: None,
            sink: None,
            updates,
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::SendText(text) => {
                // chunks received before the send belong before it
                for result in self.decodes.drain().await {
                    self.fsm.on_event(Event::FrameDecoded(result));
                }
                match self.fsm.send_text(&text) {
                    Ok(id) => debug!("📤 Queued message {}", id),
                    Err(e) => self.notify(e),
                }
            }
            Command::Play(id) => self.play(id).await,
            Command::SetAudioEnabled(enabled) => self.fsm.set_audio_enabled(enabled),
            Command::Reconnect => self.connect().await,
            Command::Shutdown => {}
        }
    }

    async fn on_token(&mut self, token: Option<String>) {
        self.token = token;
        if self.token.is_none() {
            info!("Signed out, closing chat channel");
            self.close_channel().await;
            self.fsm.sign_out();
            return;
        }
        match self.fsm.state() {
            ChannelState::Idle | ChannelState::Closed => self.connect().await,
            ChannelState::Connecting | ChannelState::Open => {
                debug!("Token refreshed, keeping it for the next connect");
            }
        }
    }

    fn on_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Text(text) => self.fsm.on_event(Event::TextReceived(text)),
            Inbound::Binary(chunk) => {
                self.fsm.on_event(Event::BinaryReceived);
                if self.fsm.audio_enabled() {
                    self.decodes.push(chunk);
                } else {
                    debug!("Audio disabled, skipping {} byte chunk", chunk.len());
                }
            }
            Inbound::Closed(reason) => {
                self.channel = None;
                let aborted = self.decodes.abort_all();
                if aborted > 0 {
                    debug!("Aborted {} in-flight decodes", aborted);
                }
                self.fsm.on_event(Event::Disconnected(reason));
            }
        }
    }

    async fn connect(&mut self) {
        let Some(token) = self.token.clone() else {
            self.fsm.sign_out();
            return;
        };
        if !self.fsm.begin_connect() {
            return;
        }
        self.publish();

        let url = match self.config.endpoint(&token) {
            Ok(url) => url,
            Err(e) => {
                self.fsm.on_event(Event::ConnectFailed(e.to_string()));
                return;
            }
        };
        match ChatChannel::connect(&url, self.fsm.generation()).await {
            Ok(channel) => {
                self.channel = Some(channel);
                self.fsm.on_event(Event::Connected);
            }
            Err(e) => {
                error!("Failed to connect to chat server: {}", e);
                self.fsm.on_event(Event::ConnectFailed(e.to_string()));
            }
        }
    }

    async fn play(&mut self, id: EntryId) {
        let audio = match self.fsm.play(id) {
            Ok(audio) => audio,
            Err(e) => return self.notify(e),
        };

        if self.sink.is_none() {
            let output = self.config.output.clone();
            match tokio::task::spawn_blocking(move || output.open()).await {
                Ok(Ok(sink)) => self.sink = Some(sink),
                Ok(Err(e)) => return self.notify(e.into()),
                Err(e) => return self.notify(ChatError::Output(e.to_string())),
            }
        }

        if let Some(sink) = self.sink.as_mut() {
            info!("▶️ Playing entry {} ({:.2}s)", id, audio.duration().as_secs_f32());
            if let Err(e) = sink.play(&audio) {
                self.notify(e.into());
            }
        }
    }

    /// Send whatever text the state machine queued.
    async fn transmit(&mut self) {
        for text in self.fsm.drain_outbound() {
            let Some(channel) = self.channel.as_mut() else {
                warn!("Dropping outbound message, no channel");
                break;
            };
            if let Err(e) = channel.send_text(text).await {
                error!("❌ Failed to send message: {}", e);
                self.channel = None;
                self.decodes.abort_all();
                self.fsm.on_event(Event::Disconnected(e.to_string()));
                break;
            }
        }
    }

    async fn close_channel(&mut self) {
        self.decodes.abort_all();
        if let Some(channel) = self.channel.take() {
            debug!("Closing channel #{}", channel.generation());
            channel.close().await;
        }
    }

    async fn teardown(&mut self) {
        self.close_channel().await;
        self.fsm.shutdown();
        self.sink = None;
        self.publish();
        info!("Chat session stopped");
    }

    fn notify(&mut self, error: ChatError) {
        warn!("{}", error);
        self.publish();
        self.emit(SessionUpdate::Notice(error));
    }

    fn publish(&mut self) {
        for update in self.fsm.drain_updates() {
            self.emit(update);
        }
    }

    fn emit(&self, update: SessionUpdate) {
        // the host may have stopped listening; the session keeps running
        let _ = self.updates.send(update);
    }
}

async fn recv_inbound(channel: &mut Option<ChatChannel>) -> Inbound {
    match channel {
        Some(channel) => channel.recv().await,
        None => pending().await,
    }
}

async fn wait_until(deadline: Option<std::time::Instant>) {
    match deadline {
        Some(deadline) => sleep_until(Instant::from_std(deadline)).await,
        None => pending().await,
    }
}
