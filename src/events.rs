//! Session events
//!
//! `Event` feeds the chat state machine, `Command` comes from the host and
//! `SessionUpdate` goes back to it.

use crate::audio_frame::AudioFrame;
use crate::error::{ChatError, DecodeError};
use crate::transcript::{EntryId, TranscriptEntry};
use serde::Serialize;

/// Lifecycle of one channel handle. `Closed` is terminal for that handle;
/// reconnecting starts a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// Inputs to the chat state machine from the channel and the decoder.
#[derive(Debug)]
pub enum Event {
    Connected,
    ConnectFailed(String),
    Disconnected(String),
    TextReceived(String),
    /// A binary frame arrived; its decode may still be in flight
    BinaryReceived,
    /// Decode result for the oldest received binary frame
    FrameDecoded(Result<AudioFrame, DecodeError>),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Connected => "Connected",
            Event::ConnectFailed(_) => "ConnectFailed",
            Event::Disconnected(_) => "Disconnected",
            Event::TextReceived(_) => "TextReceived",
            Event::BinaryReceived => "BinaryReceived",
            Event::FrameDecoded(_) => "FrameDecoded",
        }
    }
}

/// Requests from whoever hosts the session.
#[derive(Debug, Clone)]
pub enum Command {
    SendText(String),
    Play(EntryId),
    SetAudioEnabled(bool),
    Reconnect,
    Shutdown,
}

/// Everything a view needs to render the conversation.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    Status(ChannelState),
    EntryAppended(TranscriptEntry),
    AwaitingReply(bool),
    AudioEnabled(bool),
    SignInRequired,
    /// Recoverable problem worth showing to the user
    Notice(ChatError),
}
